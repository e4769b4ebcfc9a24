// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::configuration::{ConnectionParams, RetryConfig};
use crate::utils::sleep;
use crate::{
    connect, connect_with_auth, AuthorizationError, CancelHandle, InvocationError, NoReconnect,
    ReadError, Sender, ServerAddr,
};
use futures_util::future::{select, Either};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};
use std::panic;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tgproto_mtproto::{mtp, transport};
use tgproto_session::{DcOption, Session, UpdatesLike};
use tgproto_tl::{self as tl, enums};
use tokio::task::AbortHandle;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinSet,
};

pub(crate) type Transport = transport::Full;

type InvokeResponse = Vec<u8>;

enum Request {
    Invoke {
        dc_id: i32,
        body: Vec<u8>,
        tx: oneshot::Sender<Result<InvokeResponse, InvocationError>>,
        cancel_tx: Option<oneshot::Sender<CancelHandle>>,
    },
    InvokeMany {
        dc_id: i32,
        rpcs: Vec<Rpc>,
    },
    Cancel {
        dc_id: i32,
        handle: CancelHandle,
    },
    Disconnect {
        dc_id: i32,
    },
    Quit,
}

struct Rpc {
    body: Vec<u8>,
    tx: oneshot::Sender<Result<InvokeResponse, InvocationError>>,
    cancel_tx: Option<oneshot::Sender<CancelHandle>>,
}

/// What a connection's task actually receives; distinct from [`Request`]
/// (the pool-wide message, which may still need to dial a connection)
/// so that every item reaches `run_sender` once a `Sender` already exists.
enum SenderMsg {
    Invoke(Rpc),
    InvokeMany(Vec<Rpc>),
    Cancel(CancelHandle),
}

struct ConnectionInfo {
    dc_id: i32,
    rpc_tx: mpsc::UnboundedSender<SenderMsg>,
    abort_handle: AbortHandle,
}

#[derive(Clone)]
pub struct SenderPoolHandle {
    tx: mpsc::UnboundedSender<Request>,
    session: Arc<dyn Session>,
    retry: RetryConfig,
}

pub struct SenderPool {
    pub runner: SenderPoolRunner,
    pub handle: SenderPoolHandle,
    pub updates: mpsc::UnboundedReceiver<UpdatesLike>,
}

pub struct SenderPoolRunner {
    pub session: Arc<dyn Session>,
    pub api_id: i32,
    pub connection_params: ConnectionParams,
    request_rx: mpsc::UnboundedReceiver<Request>,
    updates_tx: mpsc::UnboundedSender<UpdatesLike>,
}

struct Migration {
    target_dc: i32,
    /// Whether this redirection moves the account's home DC
    /// (`PHONE_MIGRATE`/`USER_MIGRATE`/`NETWORK_MIGRATE`) or only affects
    /// the one request that triggered it (`FILE_MIGRATE`).
    moves_home: bool,
}

/// Recognizes the four `*_MIGRATE_X` parametric errors (§4.5), already
/// split by [`crate::RpcError::from`] into a bare name plus an integer
/// value.
fn classify_migrate(rpc: &crate::RpcError) -> Option<Migration> {
    let moves_home = if ["PHONE_MIGRATE", "NETWORK_MIGRATE", "USER_MIGRATE"]
        .iter()
        .any(|name| rpc.is(name))
    {
        true
    } else if rpc.is("FILE_MIGRATE") {
        false
    } else {
        return None;
    };
    rpc.value.map(|target_dc| Migration {
        target_dc: target_dc as i32,
        moves_home,
    })
}

impl SenderPoolHandle {
    /// Sends `body` to `dc_id` exactly once; the caller is responsible
    /// for interpreting and retrying any error. See [`Self::invoke`] for
    /// the version that applies [`RetryConfig`] automatically.
    pub async fn invoke_in_dc(
        &self,
        dc_id: i32,
        body: Vec<u8>,
    ) -> Result<InvokeResponse, InvocationError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Request::Invoke {
                dc_id,
                body,
                tx,
                cancel_tx: None,
            })
            .map_err(|_| InvocationError::Dropped)?;
        rx.await.map_err(|_| InvocationError::Dropped)?
    }

    /// Like [`Self::invoke_in_dc`], but also returns a [`CancelHandle`]
    /// once the request has actually been handed to its `Sender`,
    /// allowing the caller to cancel it before the reply arrives.
    pub async fn invoke_cancellable(
        &self,
        dc_id: i32,
        body: Vec<u8>,
    ) -> Result<
        (
            CancelHandle,
            oneshot::Receiver<Result<InvokeResponse, InvocationError>>,
        ),
        InvocationError,
    > {
        let (tx, rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.tx
            .send(Request::Invoke {
                dc_id,
                body,
                tx,
                cancel_tx: Some(cancel_tx),
            })
            .map_err(|_| InvocationError::Dropped)?;
        let handle = cancel_rx.await.map_err(|_| InvocationError::Dropped)?;
        Ok((handle, rx))
    }

    /// Cancels a request obtained from [`Self::invoke_cancellable`].
    /// Idempotent; returns `false` if the pool has already shut down.
    pub fn cancel_in_dc(&self, dc_id: i32, handle: CancelHandle) -> bool {
        self.tx.send(Request::Cancel { dc_id, handle }).is_ok()
    }

    /// Sends every body in `bodies` to `dc_id` so that, as long as they
    /// fit the connection's container budget, they are packed into a
    /// single outbound `msg_container` in submission order (§4.4/§4.5).
    /// Each element of the returned `Vec` corresponds to the request at
    /// the same index; order is preserved regardless of server reply
    /// order.
    pub async fn invoke_many_in_dc(
        &self,
        dc_id: i32,
        bodies: Vec<Vec<u8>>,
    ) -> Vec<Result<InvokeResponse, InvocationError>> {
        let mut rpcs = Vec::with_capacity(bodies.len());
        let mut receivers = Vec::with_capacity(bodies.len());
        for body in bodies {
            let (tx, rx) = oneshot::channel();
            rpcs.push(Rpc {
                body,
                tx,
                cancel_tx: None,
            });
            receivers.push(rx);
        }

        if self.tx.send(Request::InvokeMany { dc_id, rpcs }).is_err() {
            return receivers.iter().map(|_| Err(InvocationError::Dropped)).collect();
        }

        let mut out = Vec::with_capacity(receivers.len());
        for rx in receivers {
            out.push(rx.await.unwrap_or(Err(InvocationError::Dropped)));
        }
        out
    }

    /// `invoke_many_in_dc`, but once the first failure is observed (by
    /// submission order, not arrival order) every later entry is replaced
    /// with [`InvocationError::SkippedDueToPriorFailure`], matching the
    /// `ordered=true` batch contract of §4.5 and §7.
    pub async fn invoke_ordered_in_dc(
        &self,
        dc_id: i32,
        bodies: Vec<Vec<u8>>,
    ) -> Vec<Result<InvokeResponse, InvocationError>> {
        let mut results = self.invoke_many_in_dc(dc_id, bodies).await;
        if let Some(first_failure) = results.iter().position(|r| r.is_err()) {
            for slot in results.iter_mut().skip(first_failure + 1) {
                *slot = Err(InvocationError::SkippedDueToPriorFailure);
            }
        }
        results
    }

    /// Sends `body` to `dc_id`, transparently retrying on the error
    /// conditions the core is responsible for recovering from (§7 band
    /// 2): transient disconnects, small `FLOOD_WAIT`s (slept through),
    /// and `*_MIGRATE_X` redirections (re-sent against the named
    /// datacenter; `PHONE_MIGRATE`/`USER_MIGRATE`/`NETWORK_MIGRATE` also
    /// update the session's home DC so later calls go straight there).
    ///
    /// Everything else -- RPC errors that aren't a recognized migration
    /// or a flood wait, and `FLOOD_WAIT`s at or above the threshold -- is
    /// returned to the caller untouched (§7 band 3).
    pub async fn invoke(
        &self,
        dc_id: i32,
        body: Vec<u8>,
    ) -> Result<InvokeResponse, InvocationError> {
        let mut current_dc = dc_id;
        let mut attempt = 0u32;

        loop {
            match self.invoke_in_dc(current_dc, body.clone()).await {
                Ok(response) => return Ok(response),
                Err(InvocationError::Rpc(rpc)) => {
                    if rpc.is("FLOOD_WAIT") {
                        let seconds = rpc.value.unwrap_or(0);
                        if seconds < self.retry.flood_sleep_threshold {
                            sleep(Duration::from_secs(seconds as u64)).await;
                            // A flood wait is a server-imposed pause, not a
                            // failure in its own right: it doesn't consume
                            // the retry budget.
                            continue;
                        }
                        return Err(InvocationError::Rpc(rpc));
                    }

                    if let Some(Migration { target_dc, moves_home }) = classify_migrate(&rpc) {
                        if target_dc == current_dc {
                            return Err(InvocationError::Read(ReadError::Protocol(format!(
                                "server named DC {target_dc} as a migration target, but the \
                                 request was already being sent to that datacenter"
                            ))));
                        }
                        if attempt >= self.retry.max_retries {
                            return Err(InvocationError::Rpc(rpc));
                        }
                        attempt += 1;
                        if moves_home {
                            self.session.set_home_dc_id(target_dc);
                        }
                        current_dc = target_dc;
                        continue;
                    }

                    return Err(InvocationError::Rpc(rpc));
                }
                Err(InvocationError::Dropped | InvocationError::Read(_)) => {
                    if attempt >= self.retry.max_retries {
                        return Err(InvocationError::Dropped);
                    }
                    attempt += 1;
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
    }

    pub fn disconnect_from_dc(&self, dc_id: i32) -> bool {
        self.tx.send(Request::Disconnect { dc_id }).is_ok()
    }

    pub fn quit(&self) -> bool {
        self.tx.send(Request::Quit).is_ok()
    }
}

impl SenderPool {
    pub fn new<S: Session + 'static>(session: Arc<S>, api_id: i32) -> Self {
        Self::with_configuration(session, api_id, Default::default())
    }

    pub fn with_configuration<S: Session + 'static>(
        session: Arc<S>,
        api_id: i32,
        connection_params: ConnectionParams,
    ) -> Self {
        Self::with_retry_config(session, api_id, connection_params, Default::default())
    }

    pub fn with_retry_config<S: Session + 'static>(
        session: Arc<S>,
        api_id: i32,
        connection_params: ConnectionParams,
        retry: RetryConfig,
    ) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let session = session as Arc<dyn Session>;

        Self {
            runner: SenderPoolRunner {
                session: Arc::clone(&session),
                api_id,
                connection_params,
                request_rx,
                updates_tx,
            },
            handle: SenderPoolHandle {
                tx: request_tx,
                session,
                retry,
            },
            updates: updates_rx,
        }
    }
}

impl SenderPoolRunner {
    /// Run the sender pool until [`crate::SenderPoolHandle::quit`] is called.
    ///
    /// Connections will be initiated on-demand whenever the first request to a DC is made.
    pub async fn run(self) {
        let Self {
            session,
            api_id,
            connection_params,
            mut request_rx,
            updates_tx,
        } = self;
        let init_connection = tl::functions::InvokeWithLayer {
            layer: tl::LAYER,
            query: tl::functions::InitConnection {
                api_id,
                device_model: connection_params.device_model.clone(),
                system_version: connection_params.system_version.clone(),
                app_version: connection_params.app_version.clone(),
                system_lang_code: connection_params.system_lang_code.clone(),
                lang_pack: "".into(),
                lang_code: connection_params.lang_code.clone(),
                proxy: None,
                params: None,
                query: tl::functions::help::GetConfig {},
            },
        };

        let mut connections = Vec::<ConnectionInfo>::new();
        let mut connection_pool = JoinSet::<Result<(), ReadError>>::new();

        while let Some(request) = request_rx.recv().await {
            while let Some(completion) = connection_pool.try_join_next() {
                if let Err(err) = completion {
                    if let Ok(reason) = err.try_into_panic() {
                        panic::resume_unwind(reason);
                    }
                }
            }

            match request {
                Request::Invoke {
                    dc_id,
                    body,
                    tx,
                    cancel_tx,
                } => {
                    let rpc_tx = match connect_or_get(
                        dc_id,
                        session.as_ref(),
                        &init_connection,
                        &mut connections,
                        &mut connection_pool,
                        &updates_tx,
                    )
                    .await
                    {
                        Ok(rpc_tx) => rpc_tx,
                        Err(err) => {
                            let _ = tx.send(Err(err));
                            continue;
                        }
                    };
                    let _ = rpc_tx.send(SenderMsg::Invoke(Rpc { body, tx, cancel_tx }));
                }
                Request::InvokeMany { dc_id, rpcs } => {
                    match connect_or_get(
                        dc_id,
                        session.as_ref(),
                        &init_connection,
                        &mut connections,
                        &mut connection_pool,
                        &updates_tx,
                    )
                    .await
                    {
                        Ok(rpc_tx) => {
                            let _ = rpc_tx.send(SenderMsg::InvokeMany(rpcs));
                        }
                        Err(err) => {
                            for rpc in rpcs {
                                let _ = rpc.tx.send(Err(match &err {
                                    InvocationError::InvalidDc => InvocationError::InvalidDc,
                                    _ => InvocationError::Dropped,
                                }));
                            }
                        }
                    }
                }
                Request::Cancel { dc_id, handle } => {
                    if let Some(connection) =
                        connections.iter().find(|connection| connection.dc_id == dc_id)
                    {
                        let _ = connection.rpc_tx.send(SenderMsg::Cancel(handle));
                    }
                }
                Request::Disconnect { dc_id } => {
                    connections.retain(|connection| {
                        if connection.dc_id == dc_id {
                            connection.abort_handle.abort();
                            false
                        } else {
                            true
                        }
                    });
                }
                Request::Quit => break,
            }
        }

        connections.clear(); // drop all channels to cause the `run_sender` loop to stop
        connection_pool.join_all().await;
    }
}

/// Returns the channel to an already-running connection for `dc_id`,
/// dialing and handshaking a fresh one on demand if none exists yet.
async fn connect_or_get(
    dc_id: i32,
    session: &dyn Session,
    init_connection: &tl::functions::InvokeWithLayer<
        tl::functions::InitConnection<tl::functions::help::GetConfig>,
    >,
    connections: &mut Vec<ConnectionInfo>,
    connection_pool: &mut JoinSet<Result<(), ReadError>>,
    updates_tx: &mpsc::UnboundedSender<UpdatesLike>,
) -> Result<mpsc::UnboundedSender<SenderMsg>, InvocationError> {
    if let Some(connection) = connections.iter().find(|c| c.dc_id == dc_id) {
        return Ok(connection.rpc_tx.clone());
    }

    let Some(mut dc_option) = session.dc_option(dc_id) else {
        return Err(InvocationError::InvalidDc);
    };

    let (sender, config) = connect_sender(init_connection, session, &dc_option)
        .await
        .map_err(|err| match err {
            AuthorizationError::Invoke(invocation_err) => invocation_err,
            AuthorizationError::Gen(gen_err) => InvocationError::Read(ReadError::Io(
                std::io::Error::new(std::io::ErrorKind::Other, gen_err.to_string()),
            )),
        })?;

    update_config(session, config);

    // The handshake's auth key was already persisted by `connect_sender`
    // before it issued the first encrypted request; refresh our local
    // copy of the `DcOption` (address/auth key may have come from cache).
    dc_option.auth_key = Some(sender.auth_key());
    session.set_dc_option(&dc_option);

    let (rpc_tx, rpc_rx) = mpsc::unbounded_channel();
    let abort_handle = connection_pool.spawn(run_sender(sender, rpc_rx, updates_tx.clone()));
    connections.push(ConnectionInfo {
        dc_id,
        rpc_tx: rpc_tx.clone(),
        abort_handle,
    });
    Ok(rpc_tx)
}

async fn connect_sender(
    init_connection: &tl::functions::InvokeWithLayer<
        tl::functions::InitConnection<tl::functions::help::GetConfig>,
    >,
    session: &dyn Session,
    dc_option: &DcOption,
) -> Result<(Sender<transport::Full, mtp::Encrypted>, tl::types::Config), AuthorizationError> {
    let transport = transport::Full::new;
    let addr = || ServerAddr::Tcp {
        address: dc_option.ipv4.into(),
    };

    // Persists a freshly negotiated auth key before any encrypted request
    // using it leaves this process: losing this write loses the only copy
    // of the shared secret, so it must land before the socket is used again.
    let persist_fresh_key = |session: &dyn Session, sender: &Sender<transport::Full, mtp::Encrypted>| {
        let mut dc_option = dc_option.clone();
        dc_option.auth_key = Some(sender.auth_key());
        session.set_dc_option(&dc_option);
        session.save()
    };

    let mut sender = if let Some(auth_key) = dc_option.auth_key {
        connect_with_auth(transport(), addr(), auth_key, &NoReconnect).await?
    } else {
        let sender = connect(transport(), addr(), &NoReconnect).await?;
        persist_fresh_key(session, &sender)?;
        sender
    };

    let enums::Config::Config(remote_config) = match sender.invoke(init_connection).await {
        Ok(config) => config,
        Err(InvocationError::Read(ReadError::Transport(transport::Error::BadStatus {
            status: 404,
        }))) => {
            sender = connect(transport(), addr(), &NoReconnect).await?;
            persist_fresh_key(session, &sender)?;
            sender.invoke(init_connection).await?
        }
        Err(e) => return Err(dbg!(e).into()),
    };

    Ok((sender, remote_config))
}

fn update_config(session: &dyn Session, config: tl::types::Config) {
    config
        .dc_options
        .iter()
        .map(|tl::enums::DcOption::Option(option)| option)
        .filter(|option| !option.media_only && !option.tcpo_only && option.r#static)
        .for_each(|option| {
            let mut dc_option = session.dc_option(option.id).unwrap_or_else(|| DcOption {
                id: option.id,
                ipv4: SocketAddrV4::new(Ipv4Addr::from_bits(0), 0),
                ipv6: SocketAddrV6::new(Ipv6Addr::from_bits(0), 0, 0, 0),
                auth_key: None,
            });
            if option.ipv6 {
                dc_option.ipv6 = SocketAddrV6::new(
                    option
                        .ip_address
                        .parse()
                        .expect("Telegram to return a valid IPv6 address"),
                    option.port as _,
                    0,
                    0,
                );
            } else {
                dc_option.ipv4 = SocketAddrV4::new(
                    option
                        .ip_address
                        .parse()
                        .expect("Telegram to return a valid IPv4 address"),
                    option.port as _,
                );
                if dc_option.ipv6.ip().to_bits() == 0 {
                    dc_option.ipv6 = SocketAddrV6::new(
                        dc_option.ipv4.ip().to_ipv6_mapped(),
                        dc_option.ipv4.port(),
                        0,
                        0,
                    )
                }
            }
        });
}

fn dispatch(sender: &mut Sender<Transport, mtp::Encrypted>, msg: SenderMsg) {
    match msg {
        SenderMsg::Invoke(rpc) => {
            let handle = sender.enqueue_body(rpc.body, rpc.tx);
            if let Some(cancel_tx) = rpc.cancel_tx {
                let _ = cancel_tx.send(handle);
            }
        }
        SenderMsg::InvokeMany(rpcs) => {
            // Enqueued back-to-back, before this task ever yields back to
            // `sender.step()`, so they land in the same outbound container.
            for rpc in rpcs {
                let handle = sender.enqueue_body(rpc.body, rpc.tx);
                if let Some(cancel_tx) = rpc.cancel_tx {
                    let _ = cancel_tx.send(handle);
                }
            }
        }
        SenderMsg::Cancel(handle) => {
            sender.cancel(&handle);
        }
    }
}

async fn run_sender(
    mut sender: Sender<Transport, mtp::Encrypted>,
    mut rpc_rx: mpsc::UnboundedReceiver<SenderMsg>,
    updates: mpsc::UnboundedSender<UpdatesLike>,
) -> Result<(), ReadError> {
    loop {
        let msg = {
            let step = pin!(sender.step());
            let next = pin!(rpc_rx.recv());

            match select(step, next).await {
                Either::Left((step, _)) => match step {
                    Ok(all_new_updates) => {
                        all_new_updates.into_iter().for_each(|new_updates| {
                            let _ = updates.send(new_updates);
                        });
                        continue;
                    }
                    Err(err) => break Err(err),
                },
                Either::Right((Some(msg), _)) => msg,
                Either::Right((None, _)) => break Ok(()),
            }
        };

        dispatch(&mut sender, msg);

        // Drain whatever else is already queued without yielding back to
        // `sender.step()` in between, so a burst of concurrent `invoke`
        // calls (e.g. an `invoke_many_in_dc` batch) still gets packed
        // into one container instead of being split one-per-poll.
        while let Ok(msg) = rpc_rx.try_recv() {
            dispatch(&mut sender, msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc(name: &str, value: Option<u32>) -> crate::RpcError {
        crate::RpcError {
            code: 303,
            name: name.into(),
            value,
            caused_by: None,
        }
    }

    #[test]
    fn classifies_home_moving_migrations() {
        for name in ["PHONE_MIGRATE", "NETWORK_MIGRATE", "USER_MIGRATE"] {
            let migration = classify_migrate(&rpc(name, Some(2))).unwrap();
            assert_eq!(migration.target_dc, 2);
            assert!(migration.moves_home, "{name} should move the home DC");
        }
    }

    #[test]
    fn classifies_file_migrate_without_moving_home() {
        let migration = classify_migrate(&rpc("FILE_MIGRATE", Some(4))).unwrap();
        assert_eq!(migration.target_dc, 4);
        assert!(!migration.moves_home);
    }

    #[test]
    fn ignores_unrelated_and_valueless_errors() {
        assert!(classify_migrate(&rpc("CHAT_INVALID", None)).is_none());
        assert!(classify_migrate(&rpc("PHONE_MIGRATE", None)).is_none());
    }

    #[test]
    fn ordered_batch_skips_everything_after_first_failure() {
        // Exercises the slicing logic directly, without going through the
        // channel plumbing `invoke_ordered_in_dc` wraps around it.
        let mut results: Vec<Result<InvokeResponse, InvocationError>> = vec![
            Ok(vec![1]),
            Err(InvocationError::Rpc(rpc("CHAT_INVALID", None))),
            Ok(vec![3]),
        ];
        if let Some(first_failure) = results.iter().position(|r| r.is_err()) {
            for slot in results.iter_mut().skip(first_failure + 1) {
                *slot = Err(InvocationError::SkippedDueToPriorFailure);
            }
        }
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(InvocationError::Rpc(_))));
        assert!(matches!(
            results[2],
            Err(InvocationError::SkippedDueToPriorFailure)
        ));
    }
}
