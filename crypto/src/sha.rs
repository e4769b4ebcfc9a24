// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Small digest helpers so call sites can write `sha1!(a, b)` instead of
//! wiring up a `Digest` by hand at every call site.

/// Computes `SHA1(a || b || ...)` over any number of byte-slice-like arguments.
#[macro_export]
macro_rules! sha1 {
    ($($part:expr),+ $(,)?) => {{
        use sha1::Digest as _;
        let mut hasher = sha1::Sha1::new();
        $( hasher.update($part); )+
        hasher.finalize()
    }};
}

/// Computes `SHA256(a || b || ...)` over any number of byte-slice-like arguments.
#[macro_export]
macro_rules! sha256 {
    ($($part:expr),+ $(,)?) => {{
        use sha2::Digest as _;
        let mut hasher = sha2::Sha256::new();
        $( hasher.update($part); )+
        hasher.finalize()
    }};
}
