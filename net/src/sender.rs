// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::io;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use web_time::Instant;

use tgproto_crypto::RingBuffer;
use tgproto_mtproto::transport::{self, Transport};
use tgproto_mtproto::{authentication, mtp, MsgId};
use tgproto_session::updates;
use tgproto_tl::{self as tl, Deserializable, Identifiable, RemoteCall, Serializable};

use crate::errors::{AuthorizationError, InvocationError, ReadError, RpcError};
use crate::net::{NetStream, ServerAddr};
use crate::reconnection::ReconnectionPolicy;
use crate::utils::{sleep, sleep_until};

/// A connection will be considered dead if no data is received for this
/// long and there is nothing of our own to send either, so a keepalive is
/// due.
const PING_DELAY: Duration = Duration::from_secs(60);

/// Sent as `ping_delay_disconnect`'s `disconnect_delay`: a hint for the
/// *server* to close the connection if it doesn't hear from us again
/// within this many seconds. This is enforced server-side, not locally.
const NO_PING_DISCONNECT: i32 = 75;

/// Large enough to hold the biggest single message MTProto allows plus
/// transport framing overhead.
const READ_CAPACITY: usize = (1024 * 1024) + (8 * 1024);

fn generate_random_id() -> i64 {
    static COUNTER: AtomicI64 = AtomicI64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// `ping_delay_disconnect#f3427b8c ping_id:long disconnect_delay:int = Pong`.
///
/// Not part of `tgproto_tl`'s schema: it is only ever issued by this
/// driver's own keepalive logic, never by a caller, so it lives here
/// rather than among the request types a user is expected to construct.
struct PingDelayDisconnect {
    ping_id: i64,
    disconnect_delay: i32,
}

impl Identifiable for PingDelayDisconnect {
    const CONSTRUCTOR_ID: u32 = 0xf3427b8c;
}

impl Serializable for PingDelayDisconnect {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        Self::CONSTRUCTOR_ID.serialize(buf);
        self.ping_id.serialize(buf);
        self.disconnect_delay.serialize(buf);
    }
}

impl RemoteCall for PingDelayDisconnect {
    type Return = tl::enums::Pong;
}

enum RequestState {
    /// Not yet handed to the `Mtp`.
    NotSerialized,
    /// Pushed into the `Mtp`'s internal buffer, not yet flushed to the
    /// transport.
    Serialized(MsgId),
    /// Flushed; a response is expected for this `msg_id`.
    Sent(MsgId),
}

struct Request {
    body: Vec<u8>,
    state: RequestState,
    result: oneshot::Sender<Result<Vec<u8>, InvocationError>>,
    cancel_token: Arc<()>,
}

/// A handle to a still-pending request, returned by [`Sender::enqueue_body`].
///
/// Passing it to [`Sender::cancel`] is idempotent: it is a no-op once the
/// reply has already been delivered, since the request is no longer
/// tracked by then.
#[derive(Clone)]
pub struct CancelHandle(Arc<()>);

/// Drives a [`Transport`] and an [`mtp::Mtp`] together over a real socket:
/// queues requests, flushes them in batches, and demultiplexes responses
/// and server-pushed updates out of whatever comes back.
pub struct Sender<T: Transport, M> {
    stream: NetStream,
    transport: T,
    mtp: M,
    addr: ServerAddr,
    requests: Vec<Request>,
    next_ping: Instant,
    read_buffer: BytesMut,
}

impl<T: Transport, M: mtp::Mtp> Sender<T, M> {
    fn new(stream: NetStream, transport: T, mtp: M, addr: ServerAddr) -> Self {
        Self {
            stream,
            transport,
            mtp,
            addr,
            requests: Vec::new(),
            next_ping: Instant::now() + PING_DELAY,
            read_buffer: BytesMut::with_capacity(READ_CAPACITY),
        }
    }

    /// Queues `body` for sending, resolving `result` with its response
    /// once one arrives (or the connection gives up on it). The returned
    /// [`CancelHandle`] can later be passed to [`Sender::cancel`].
    pub fn enqueue_body(
        &mut self,
        body: Vec<u8>,
        result: oneshot::Sender<Result<Vec<u8>, InvocationError>>,
    ) -> CancelHandle {
        let cancel_token = Arc::new(());
        let handle = CancelHandle(Arc::clone(&cancel_token));
        self.requests.push(Request {
            body,
            state: RequestState::NotSerialized,
            result,
            cancel_token,
        });
        handle
    }

    /// Cancels a request previously enqueued through this sender.
    ///
    /// If it has not been flushed to the transport yet, it is dropped
    /// without ever being sent. If it was already sent, this sender stops
    /// tracking it: its handle is completed with [`InvocationError::Cancelled`]
    /// right away, and any `rpc_result` that later arrives for it is
    /// silently discarded by [`Sender::process_result`]. Returns `false`
    /// if no matching pending request was found (it may have already
    /// completed).
    pub fn cancel(&mut self, handle: &CancelHandle) -> bool {
        let Some(index) = self
            .requests
            .iter()
            .position(|r| Arc::ptr_eq(&r.cancel_token, &handle.0))
        else {
            return false;
        };
        let request = self.requests.remove(index);
        let _ = request.result.send(Err(InvocationError::Cancelled));
        true
    }

    /// Enqueues `request` and drives the connection until its response
    /// arrives.
    pub async fn invoke<R: RemoteCall>(&mut self, request: &R) -> Result<R::Return, InvocationError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue_body(request.to_bytes(), tx);
        let body = self.step_until_receive(rx).await?;
        Ok(R::Return::from_bytes(&body)?)
    }

    async fn step_until_receive(
        &mut self,
        mut rx: oneshot::Receiver<Result<Vec<u8>, InvocationError>>,
    ) -> Result<Vec<u8>, InvocationError> {
        loop {
            match rx.try_recv() {
                Ok(result) => return result,
                Err(TryRecvError::Closed) => return Err(InvocationError::Dropped),
                Err(TryRecvError::Empty) => {}
            }
            self.step().await?;
        }
    }

    /// Drives the connection for one round: flushes anything pending,
    /// waits for either new data or the next keepalive, and returns
    /// whatever server-pushed updates were found along the way.
    pub async fn step(&mut self) -> Result<Vec<updates::UpdatesLike>, ReadError> {
        if let Err(err) = self.try_fill_write().await {
            self.fail_all(&err);
            return Err(err);
        }

        let next_ping = self.next_ping;
        let result = tokio::select! {
            biased;
            n = self.read_some() => n.map_err(ReadError::from).and_then(|n| {
                if n == 0 {
                    Err(ReadError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by peer",
                    )))
                } else {
                    self.on_net_read()
                }
            }),
            _ = sleep_until(next_ping) => {
                self.on_ping_timeout();
                Ok(Vec::new())
            }
        };

        if let Err(err) = &result {
            self.fail_all(err);
        }
        result
    }

    async fn try_fill_write(&mut self) -> Result<(), ReadError> {
        let mut pushed_any = false;
        for request in &mut self.requests {
            if matches!(request.state, RequestState::NotSerialized) {
                match self.mtp.push(&request.body) {
                    Some(msg_id) => {
                        request.state = RequestState::Serialized(msg_id);
                        pushed_any = true;
                    }
                    None => break,
                }
            }
        }

        if !pushed_any {
            return Ok(());
        }

        let payload = self.mtp.finalize();
        if payload.is_empty() {
            return Ok(());
        }

        for request in &mut self.requests {
            if let RequestState::Serialized(msg_id) = request.state {
                request.state = RequestState::Sent(msg_id);
            }
        }

        let mut framed = RingBuffer::with_capacity(payload.len(), 0);
        framed.extend(payload);
        self.transport.pack(&mut framed);

        let (_, mut write_half) = self.stream.split();
        write_half.write_all(framed.as_ref()).await?;
        Ok(())
    }

    async fn read_some(&mut self) -> io::Result<usize> {
        if self.read_buffer.capacity() - self.read_buffer.len() < 4096 {
            self.read_buffer.reserve(READ_CAPACITY);
        }
        let (mut read_half, _) = self.stream.split();
        read_half.read_buf(&mut self.read_buffer).await
    }

    fn on_net_read(&mut self) -> Result<Vec<updates::UpdatesLike>, ReadError> {
        let mut out = Vec::new();
        loop {
            let offset = match self.transport.unpack(&mut self.read_buffer[..]) {
                Ok(offset) => offset,
                Err(transport::Error::MissingBytes) => break,
                Err(err) => return Err(err.into()),
            };

            let payload = self.read_buffer[offset.data_start..offset.data_end].to_vec();
            self.read_buffer.advance(offset.next_offset);

            let deserialization = self.mtp.deserialize(&payload)?;
            for (msg_id, result) in deserialization.rpc_results {
                self.process_result(msg_id, result);
            }
            out.extend(
                deserialization
                    .updates
                    .iter()
                    .map(|bytes| updates::classify(bytes)),
            );
        }
        Ok(out)
    }

    fn process_result(&mut self, msg_id: MsgId, result: Result<Vec<u8>, mtp::RequestError>) {
        let Some(index) = self.requests.iter().position(
            |r| matches!(r.state, RequestState::Sent(id) if id == msg_id),
        ) else {
            return;
        };

        match result {
            Ok(body) => {
                let request = self.requests.remove(index);
                let _ = request.result.send(Ok(body));
            }
            Err(mtp::RequestError::RpcError(rpc)) => {
                let request = self.requests.remove(index);
                let _ = request.result.send(Err(InvocationError::Rpc(RpcError {
                    code: rpc.code,
                    name: rpc.name,
                    value: rpc.value,
                    caused_by: None,
                })));
            }
            Err(_) => {
                // `BadMessage`, a dropped delivery, or a corrupt response:
                // every one of these is defined as retransmittable by
                // `RequestError::should_retransmit`, so push the same body
                // again on the next `try_fill_write`.
                self.requests[index].state = RequestState::NotSerialized;
            }
        }
    }

    fn on_ping_timeout(&mut self) {
        self.next_ping = Instant::now() + PING_DELAY;
        let ping = PingDelayDisconnect {
            ping_id: generate_random_id(),
            disconnect_delay: NO_PING_DISCONNECT,
        };
        // The response (a `Pong`) carries nothing this driver needs to
        // act on; dropping the receiver is fine, `process_result` simply
        // finds no matching request once it arrives.
        let (tx, _rx) = oneshot::channel();
        self.enqueue_body(ping.to_bytes(), tx);
    }

    fn fail_all(&mut self, err: &ReadError) {
        for request in self.requests.drain(..) {
            let _ = request.result.send(Err(InvocationError::from(err.clone())));
        }
    }
}

impl<T: Transport> Sender<T, mtp::Encrypted> {
    /// The auth key negotiated for this connection, suitable for caching
    /// and reusing via [`connect_with_auth`].
    pub fn auth_key(&self) -> [u8; 256] {
        self.mtp.auth_key()
    }
}

async fn dial(addr: &ServerAddr, policy: &dyn ReconnectionPolicy) -> io::Result<NetStream> {
    let mut attempts = 0;
    loop {
        match NetStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(err) => match policy.should_retry(attempts) {
                ControlFlow::Continue(delay) => {
                    attempts += 1;
                    sleep(delay).await;
                }
                ControlFlow::Break(()) => return Err(err),
            },
        }
    }
}

/// Connects to `addr` and performs the full, unauthenticated MTProto
/// handshake, retrying the initial dial according to `policy`.
pub async fn connect<T: Transport>(
    transport: T,
    addr: ServerAddr,
    policy: &dyn ReconnectionPolicy,
) -> Result<Sender<T, mtp::Encrypted>, AuthorizationError> {
    let stream = dial(&addr, policy).await?;
    let sender = Sender::new(stream, transport, mtp::Plain::new(), addr);
    generate_auth_key(sender).await
}

/// Connects to `addr` reusing a previously negotiated `auth_key`, skipping
/// the handshake entirely.
pub async fn connect_with_auth<T: Transport>(
    transport: T,
    addr: ServerAddr,
    auth_key: [u8; 256],
    policy: &dyn ReconnectionPolicy,
) -> Result<Sender<T, mtp::Encrypted>, io::Error> {
    let stream = dial(&addr, policy).await?;
    Ok(Sender::new(
        stream,
        transport,
        mtp::Encrypted::build().finish(auth_key),
        addr,
    ))
}

/// Drives the `req_pq_multi` / `req_DH_params` / `set_client_DH_params`
/// exchange over an already-connected, unencrypted [`Sender`], returning
/// one reconfigured to use the freshly negotiated auth key.
pub async fn generate_auth_key<T: Transport>(
    mut sender: Sender<T, mtp::Plain>,
) -> Result<Sender<T, mtp::Encrypted>, AuthorizationError> {
    let (request, data) = authentication::step1()?;
    let response = invoke_raw(&mut sender, request).await?;

    let (request, data) = authentication::step2(data, &response)?;
    let response = invoke_raw(&mut sender, request).await?;

    let (request, data) = authentication::step3(data, &response)?;
    let response = invoke_raw(&mut sender, request).await?;

    let finished = authentication::create_key(data, &response)?;

    let Sender {
        stream,
        transport,
        addr,
        ..
    } = sender;

    Ok(Sender::new(
        stream,
        transport,
        mtp::Encrypted::build()
            .time_offset(finished.time_offset)
            .first_salt(finished.first_salt)
            .finish(finished.auth_key),
        addr,
    ))
}

async fn invoke_raw<T: Transport>(
    sender: &mut Sender<T, mtp::Plain>,
    body: Vec<u8>,
) -> Result<Vec<u8>, InvocationError> {
    let (tx, rx) = oneshot::channel();
    sender.enqueue_body(body, tx);
    sender.step_until_receive(rx).await
}
