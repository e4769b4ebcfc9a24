// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use std::collections::HashMap;
use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use snafu::prelude::*;

use crate::defs::{ChannelState, DcOption, UpdateState, UpdatesState, DEFAULT_DC};
use crate::Session;

/// The schema version written by this crate. Bumped whenever the on-disk
/// layout changes in a way that isn't a pure append.
const SCHEMA_VERSION: u8 = 1;

/// Things that can go wrong loading or saving a [`FileSession`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[snafu(module(error))]
pub enum Error {
    #[snafu(display("i/o error accessing session file"))]
    Io { source: io::Error },

    #[snafu(display("session file has an unsupported schema version {got}"))]
    UnsupportedVersion { got: u8 },

    #[snafu(display("session file is truncated or corrupt"))]
    InvalidFormat,

    #[snafu(display("session file is already open and locked by another process"))]
    Locked,
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}

#[derive(Default)]
struct State {
    home_dc_id: i32,
    dc_options: HashMap<i32, DcOption>,
    access_hashes: HashMap<i64, i64>,
    updates: UpdatesState,
    channels: HashMap<i64, i32>,
}

/// A crash-safe, file-backed [`Session`].
///
/// Every [`Session::save`] call serializes the entire state and replaces
/// the file atomically: the new contents are written to a sibling temp
/// file, `fsync`'d, then renamed over the original. A crash at any point
/// during that sequence leaves either the old file or the new one intact,
/// never a half-written one.
///
/// `open` takes an exclusive, advisory lock on a sibling `.lock` file and
/// holds it for as long as the `FileSession` lives, so that two processes
/// (or two `FileSession`s in the same process) pointed at the same path
/// can't race each other's `save`s; the second `open` fails fast with
/// [`Error::Locked`] instead of silently clobbering the first writer.
pub struct FileSession {
    path: PathBuf,
    state: Mutex<State>,
    _lock: std::fs::File,
}

impl FileSession {
    /// Loads a session from `path`, or starts a brand-new one if the file
    /// does not exist yet. The file is not created until the first
    /// [`Session::save`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let lock = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.with_extension("lock"))?;
        lock.try_lock_exclusive().map_err(|err| match err.kind() {
            io::ErrorKind::WouldBlock => Error::Locked,
            _ => err.into(),
        })?;

        let state = match std::fs::read(&path) {
            Ok(bytes) => decode(&bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => State {
                home_dc_id: DEFAULT_DC,
                ..Default::default()
            },
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
            _lock: lock,
        })
    }

    fn write_atomic(&self, bytes: &[u8]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            tmp.write_all(bytes)?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)
    }
}

impl Session for FileSession {
    fn home_dc_id(&self) -> i32 {
        self.state.lock().unwrap().home_dc_id
    }

    fn set_home_dc_id(&self, dc_id: i32) {
        self.state.lock().unwrap().home_dc_id = dc_id;
    }

    fn dc_option(&self, dc_id: i32) -> Option<DcOption> {
        self.state.lock().unwrap().dc_options.get(&dc_id).cloned()
    }

    fn set_dc_option(&self, dc_option: &DcOption) {
        self.state
            .lock()
            .unwrap()
            .dc_options
            .insert(dc_option.id, dc_option.clone());
    }

    fn access_hash(&self, id: i64) -> Option<i64> {
        self.state.lock().unwrap().access_hashes.get(&id).copied()
    }

    fn cache_access_hash(&self, id: i64, access_hash: i64) {
        self.state
            .lock()
            .unwrap()
            .access_hashes
            .insert(id, access_hash);
    }

    fn updates_state(&self) -> UpdatesState {
        self.state.lock().unwrap().updates
    }

    fn channel_pts(&self, channel_id: i64) -> Option<i32> {
        self.state.lock().unwrap().channels.get(&channel_id).copied()
    }

    fn set_update_state(&self, update: UpdateState) {
        let mut state = self.state.lock().unwrap();
        match update {
            UpdateState::All { state: s, channels } => {
                state.updates = s;
                state.channels = channels
                    .into_iter()
                    .map(|ChannelState { id, pts }| (id, pts))
                    .collect();
            }
            UpdateState::Primary { pts, date, seq } => {
                state.updates.pts = pts;
                state.updates.date = date;
                state.updates.seq = seq;
            }
            UpdateState::Secondary { qts } => {
                state.updates.qts = qts;
            }
            UpdateState::Channel { id, pts } => {
                state.channels.insert(id, pts);
            }
        }
    }

    fn save(&self) -> io::Result<()> {
        let bytes = encode(&self.state.lock().unwrap());
        self.write_atomic(&bytes)
    }
}

// --- on-disk encoding -------------------------------------------------------
//
// Little-endian, schema-versioned, append-friendly:
// version:u8 home_dc:i32
// dc_count:u32 { id:i32 ipv4:[u8;4] ipv4_port:u16 ipv6:[u8;16] ipv6_port:u16 has_key:u8 [key:[u8;256]] }
// pts:i32 qts:i32 date:i32 seq:i32
// channel_count:u32 { id:i64 pts:i32 }
// hash_count:u32 { id:i64 hash:i64 }

fn encode(state: &State) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(SCHEMA_VERSION);
    buf.extend(state.home_dc_id.to_le_bytes());

    buf.extend((state.dc_options.len() as u32).to_le_bytes());
    for opt in state.dc_options.values() {
        buf.extend(opt.id.to_le_bytes());
        buf.extend(opt.ipv4.ip().octets());
        buf.extend(opt.ipv4.port().to_le_bytes());
        buf.extend(opt.ipv6.ip().octets());
        buf.extend(opt.ipv6.port().to_le_bytes());
        match opt.auth_key {
            Some(key) => {
                buf.push(1);
                buf.extend(key);
            }
            None => buf.push(0),
        }
    }

    buf.extend(state.updates.pts.to_le_bytes());
    buf.extend(state.updates.qts.to_le_bytes());
    buf.extend(state.updates.date.to_le_bytes());
    buf.extend(state.updates.seq.to_le_bytes());

    buf.extend((state.channels.len() as u32).to_le_bytes());
    for (&id, &pts) in &state.channels {
        buf.extend(id.to_le_bytes());
        buf.extend(pts.to_le_bytes());
    }

    buf.extend((state.access_hashes.len() as u32).to_le_bytes());
    for (&id, &hash) in &state.access_hashes {
        buf.extend(id.to_le_bytes());
        buf.extend(hash.to_le_bytes());
    }

    buf
}

fn decode(bytes: &[u8]) -> Result<State, Error> {
    let mut cur = ByteReader(bytes);

    let version = cur.u8()?;
    if version != SCHEMA_VERSION {
        return Err(Error::UnsupportedVersion { got: version });
    }

    let home_dc_id = cur.i32()?;

    let dc_count = cur.u32()?;
    let mut dc_options = HashMap::with_capacity(dc_count as usize);
    for _ in 0..dc_count {
        let id = cur.i32()?;
        let ipv4_ip = Ipv4Addr::from(cur.bytes::<4>()?);
        let ipv4_port = cur.u16()?;
        let ipv6_ip = Ipv6Addr::from(cur.bytes::<16>()?);
        let ipv6_port = cur.u16()?;
        let auth_key = if cur.u8()? == 1 {
            Some(cur.bytes::<256>()?)
        } else {
            None
        };
        dc_options.insert(
            id,
            DcOption {
                id,
                ipv4: SocketAddrV4::new(ipv4_ip, ipv4_port),
                ipv6: SocketAddrV6::new(ipv6_ip, ipv6_port, 0, 0),
                auth_key,
            },
        );
    }

    let updates = UpdatesState {
        pts: cur.i32()?,
        qts: cur.i32()?,
        date: cur.i32()?,
        seq: cur.i32()?,
    };

    let channel_count = cur.u32()?;
    let mut channels = HashMap::with_capacity(channel_count as usize);
    for _ in 0..channel_count {
        let id = cur.i64()?;
        let pts = cur.i32()?;
        channels.insert(id, pts);
    }

    let hash_count = cur.u32()?;
    let mut access_hashes = HashMap::with_capacity(hash_count as usize);
    for _ in 0..hash_count {
        let id = cur.i64()?;
        let hash = cur.i64()?;
        access_hashes.insert(id, hash);
    }

    Ok(State {
        home_dc_id,
        dc_options,
        access_hashes,
        updates,
        channels,
    })
}

struct ByteReader<'a>(&'a [u8]);

impl<'a> ByteReader<'a> {
    fn bytes<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        if self.0.len() < N {
            return Err(Error::InvalidFormat);
        }
        let (head, tail) = self.0.split_at(N);
        self.0 = tail;
        Ok(head.try_into().unwrap())
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.bytes::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_le_bytes(self.bytes()?))
    }

    fn u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_le_bytes(self.bytes()?))
    }

    fn i32(&mut self) -> Result<i32, Error> {
        Ok(i32::from_le_bytes(self.bytes()?))
    }

    fn i64(&mut self) -> Result<i64, Error> {
        Ok(i64::from_le_bytes(self.bytes()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let dir = std::env::temp_dir().join(format!("tgproto-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.bin");
        let _ = std::fs::remove_file(&path);

        let session = FileSession::open(&path).unwrap();
        assert_eq!(session.home_dc_id(), DEFAULT_DC);

        session.set_home_dc_id(4);
        session.set_dc_option(&DcOption {
            id: 4,
            ipv4: SocketAddrV4::new(Ipv4Addr::new(1, 2, 3, 4), 443),
            ipv6: SocketAddrV6::new(Ipv6Addr::LOCALHOST, 443, 0, 0),
            auth_key: Some([7; 256]),
        });
        session.cache_access_hash(42, 1337);
        session.set_update_state(UpdateState::Primary {
            pts: 10,
            date: 20,
            seq: 30,
        });
        session.set_update_state(UpdateState::Channel { id: 100, pts: 5 });
        session.save().unwrap();
        drop(session);

        let reloaded = FileSession::open(&path).unwrap();
        assert_eq!(reloaded.home_dc_id(), 4);
        assert_eq!(reloaded.dc_option(4).unwrap().auth_key, Some([7; 256]));
        assert_eq!(reloaded.access_hash(42), Some(1337));
        assert_eq!(reloaded.channel_pts(100), Some(5));
        let updates = reloaded.updates_state();
        assert_eq!((updates.pts, updates.date, updates.seq), (10, 20, 30));
        drop(reloaded);

        std::fs::remove_file(&path).ok();
        std::fs::remove_file(path.with_extension("tmp")).ok();
        std::fs::remove_file(path.with_extension("lock")).ok();
        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = std::env::temp_dir().join(format!("tgproto-test-lock-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.bin");
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("lock"));

        let first = FileSession::open(&path).unwrap();
        match FileSession::open(&path) {
            Err(Error::Locked) => {}
            other => panic!("expected Error::Locked, got {other:?}"),
        }
        drop(first);

        // Once the first handle is dropped the lock is released.
        let second = FileSession::open(&path).unwrap();
        drop(second);

        std::fs::remove_file(&path).ok();
        std::fs::remove_file(path.with_extension("tmp")).ok();
        std::fs::remove_file(path.with_extension("lock")).ok();
        std::fs::remove_dir(&dir).ok();
    }
}
