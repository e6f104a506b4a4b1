//! Session ownership and transport failover.
//!
//! A [`ConnectionManager`] owns one logical session. The session is opened on
//! one ensemble member; when that transport fails the background driver moves
//! the same session to the next member in round-robin order, presenting the
//! session id and password so the ensemble continues it. Recovery gives up
//! once the negotiated session timeout has elapsed since the last successful
//! contact, at which point the session is `Expired`.
//!
//! ```text
//! request ──> ready_transport() ──> rpc ──> reply (xid check)
//!                   ▲                  │
//!                   │                  └─ transport loss ─> transport_lost()
//!                   │                                              │
//!   driver: ping / event stream / recover() <───────── lost.notify ┘
//! ```

use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::interval_at;
use tokio::time::timeout;
use tokio::time::timeout_at;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tonic::codec::CompressionEncoding;
use tonic::codec::Streaming;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tonic::Code;
use tonic::Status;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Notification;
use super::Session;
use super::SessionState;
use crate::constants::COORD_SERVICE_NAME;
use crate::constants::NEW_SESSION_ID;
use crate::proto::coord_service_client::CoordServiceClient;
use crate::proto::CloseSessionRequest;
use crate::proto::ErrorCode;
use crate::proto::OpenSessionRequest;
use crate::proto::PingRequest;
use crate::proto::Reply;
use crate::proto::RequestHeader;
use crate::proto::SessionRequest;
use crate::proto::WatchEvent;
use crate::proto::WatchEventsRequest;
use crate::ConnectionError;
use crate::CoordConfig;
use crate::Error;
use crate::Result;

pub(crate) type RpcClient = CoordServiceClient<Channel>;

/// What a request does when its transport fails before the reply arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnLoss {
    /// Sent again once the session is resumed
    Retry,
    /// The request may already be applied; fails with
    /// [`ConnectionError::ConnectionLoss`]
    Report,
}

/// Channel to the member currently serving the session.
///
/// `generation` increases with every established transport so that failures
/// observed on an already replaced transport are ignored.
#[derive(Clone)]
struct Transport {
    client: RpcClient,
    generation: u64,
}

/// Owns one logical session and the transport serving it.
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: CoordConfig,
    endpoints: Vec<String>,
    session: RwLock<Session>,
    transport: RwLock<Option<Transport>>,

    /// Round-robin position in `endpoints`
    cursor: AtomicUsize,
    xid: AtomicI32,
    generation: AtomicU64,
    recovering: AtomicBool,
    last_zxid: AtomicI64,
    last_contact: Mutex<Instant>,

    state_tx: watch::Sender<SessionState>,
    notify_tx: mpsc::UnboundedSender<Notification>,

    /// Wakes the driver when a request observes transport loss
    lost: Notify,
    shutdown: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
    close_lock: tokio::sync::Mutex<()>,

    /// Set while a `CloseSession` is outstanding; expiry observed meanwhile
    /// is left to `close` to settle
    closing: AtomicBool,
    ended_while_closing: AtomicBool,
    ended: Notify,
}

impl ConnectionManager {
    /// Opens a new session on the ensemble described by `config`.
    ///
    /// Watch notifications of a manager created this way are discarded; use
    /// [`ZkClient`](crate::ZkClient) to consume them.
    ///
    /// # Errors
    /// - [`ConnectionError::ConnectTimeout`] when some member accepted the
    ///   transport but no session was established within `connect_timeout`
    /// - [`ConnectionError::EnsembleUnreachable`] when no member could be
    ///   reached at all
    pub async fn connect(config: CoordConfig) -> Result<Self> {
        let (notify_tx, _notify_rx) = mpsc::unbounded_channel();
        Self::connect_with_notifier(config, notify_tx).await
    }

    pub(crate) async fn connect_with_notifier(
        config: CoordConfig,
        notify_tx: mpsc::UnboundedSender<Notification>,
    ) -> Result<Self> {
        let config = config.validate()?;
        let endpoints = config.ensemble.uris();
        let (state_tx, _) = watch::channel(SessionState::Connecting);

        let inner = Arc::new(ManagerInner {
            session: RwLock::new(Session::new(config.session.session_timeout())),
            transport: RwLock::new(None),
            cursor: AtomicUsize::new(0),
            xid: AtomicI32::new(0),
            generation: AtomicU64::new(0),
            recovering: AtomicBool::new(false),
            last_zxid: AtomicI64::new(0),
            last_contact: Mutex::new(Instant::now()),
            state_tx,
            notify_tx,
            lost: Notify::new(),
            shutdown: CancellationToken::new(),
            driver: Mutex::new(None),
            close_lock: tokio::sync::Mutex::new(()),
            closing: AtomicBool::new(false),
            ended_while_closing: AtomicBool::new(false),
            ended: Notify::new(),
            endpoints,
            config,
        });

        let events = inner.establish_first_session().await?;
        let driver = tokio::spawn(run_driver(inner.clone(), events));
        *inner.driver.lock() = Some(driver);

        Ok(Self { inner })
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    /// Receiver observing every session state transition
    pub fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn session(&self) -> Session {
        let mut session = self.inner.session.read().clone();
        session.last_zxid_seen = self.inner.last_zxid.load(Ordering::Acquire);
        session
    }

    pub fn session_id(&self) -> i64 {
        self.inner.session_id()
    }

    pub fn endpoints(&self) -> &[String] {
        &self.inner.endpoints
    }

    pub(crate) fn config(&self) -> &CoordConfig {
        &self.inner.config
    }

    /// Sends one session-scoped request and returns the reply code with the reply.
    ///
    /// Transport loss always signals the driver. With [`OnLoss::Retry`] the
    /// request waits for the session to be re-established and is sent again,
    /// all inside the operation timeout.
    pub(crate) async fn execute<Q, R, F, Fut>(
        &self,
        op: &'static str,
        on_loss: OnLoss,
        request: Q,
        call: F,
    ) -> Result<(ErrorCode, R)>
    where
        Q: SessionRequest + Clone,
        R: Reply,
        F: Fn(RpcClient, Q) -> Fut,
        Fut: Future<Output = std::result::Result<tonic::Response<R>, Status>>,
    {
        let operation_timeout = self.inner.config.session.operation_timeout();
        match timeout(operation_timeout, self.inner.execute_with_retry(op, on_loss, request, call)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, session_id = self.session_id(), "operation timed out");
                Err(Error::OperationTimeout {
                    op,
                    timeout: operation_timeout,
                })
            }
        }
    }

    /// Ends the session on the ensemble and stops the driver.
    ///
    /// The ensemble removes the session's ephemeral nodes before acknowledging.
    /// A session in `Reconnecting` is resumed first, within the operation
    /// timeout. Calling `close` again is a no-op. A session found already
    /// ended by an earlier close attempt moves to `Closed` without ever
    /// reporting `Expired`.
    ///
    /// # Errors
    /// When the ensemble does not acknowledge in time the typed failure is
    /// returned and the session stays open, so `close` can be retried.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.inner.close_lock.lock().await;
        let state = self.state();
        if state == SessionState::Closed {
            return Ok(());
        }

        let session_id = self.session_id();
        if state == SessionState::Expired {
            debug!(session_id, "closing an expired session");
        } else {
            self.inner.ended_while_closing.store(false, Ordering::Release);
            self.inner.closing.store(true, Ordering::Release);
            let acknowledged = tokio::select! {
                acknowledged = self.execute(
                    "close_session",
                    OnLoss::Retry,
                    CloseSessionRequest::default(),
                    |mut client, request| async move { client.close_session(request).await },
                ) => acknowledged,
                _ = self.inner.ended.notified() => Err(ConnectionError::SessionExpired { session_id }.into()),
            };
            let settled = match acknowledged {
                Ok((ErrorCode::Success, _)) => {
                    info!(session_id, "session closed");
                    Ok(())
                }
                Ok((code, _)) => {
                    warn!(session_id, ?code, "close session rejected");
                    Err(Error::Fatal(format!("close session rejected: {code:?}")))
                }
                // an earlier unacknowledged close was applied after all
                Err(e) if e.is_session_expired() => {
                    debug!(session_id, "session already ended on the ensemble");
                    Ok(())
                }
                Err(e) => {
                    warn!(session_id, "close session not acknowledged: {}", e);
                    Err(e)
                }
            };
            if let Err(e) = settled {
                self.inner.closing.store(false, Ordering::Release);
                if self.inner.ended_while_closing.swap(false, Ordering::AcqRel) {
                    self.inner.expire();
                }
                return Err(e);
            }
        }

        self.inner.shutdown.cancel();
        let driver = self.inner.driver.lock().take();
        if let Some(handle) = driver {
            if let Err(e) = handle.await {
                warn!("session driver ended abnormally: {:?}", e);
            }
        }
        self.inner.transport.write().take();
        self.inner.set_state(SessionState::Closed);
        Ok(())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl ManagerInner {
    fn session_id(&self) -> i64 {
        self.session.read().session_id
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn ping_interval(&self) -> Duration {
        self.session.read().ping_interval()
    }

    fn next_xid(&self) -> i32 {
        self.xid.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    fn request_header(&self) -> RequestHeader {
        RequestHeader {
            session_id: self.session_id(),
            xid: self.next_xid(),
        }
    }

    fn next_endpoint(&self) -> String {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        self.endpoints[i].clone()
    }

    fn touch(&self) {
        *self.last_contact.lock() = Instant::now();
    }

    fn observe_zxid(
        &self,
        zxid: i64,
    ) {
        self.last_zxid.fetch_max(zxid, Ordering::AcqRel);
    }

    /// Moves to `next` if the transition is legal and announces it.
    ///
    /// `Expired` only moves on to `Closed`; nothing leaves `Closed`.
    fn set_state(
        &self,
        next: SessionState,
    ) -> bool {
        let changed = self.state_tx.send_if_modified(|current| {
            let allowed = match (*current, next) {
                (a, b) if a == b => false,
                (SessionState::Closed, _) => false,
                (SessionState::Expired, SessionState::Closed) => true,
                (SessionState::Expired, _) => false,
                _ => true,
            };
            if allowed {
                *current = next;
            }
            allowed
        });

        if changed {
            self.session.write().state = next;
            debug!(session_id = self.session_id(), %next, "session state changed");
            let _ = self.notify_tx.send(Notification::State(next));
        }
        changed
    }

    fn expire(&self) {
        self.transport.write().take();
        if self.closing.load(Ordering::Acquire) {
            self.ended_while_closing.store(true, Ordering::Release);
            self.ended.notify_one();
            return;
        }
        if self.set_state(SessionState::Expired) {
            error!(session_id = self.session_id(), "session expired");
        }
    }

    /// Reports that the transport of `generation` failed.
    ///
    /// Only the first report for the live transport wakes the driver.
    fn transport_lost(
        &self,
        generation: u64,
    ) {
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        {
            let mut transport = self.transport.write();
            if transport.as_ref().map(|t| t.generation) == Some(generation) {
                *transport = None;
            }
        }
        if !self.recovering.swap(true, Ordering::AcqRel) {
            self.set_state(SessionState::Reconnecting);
            self.lost.notify_one();
        }
    }

    async fn ready_transport(&self) -> Result<Transport> {
        let mut state_rx = self.state_tx.subscribe();
        loop {
            let state = {
                let state = state_rx
                    .wait_for(|s| matches!(s, SessionState::Connected | SessionState::Expired | SessionState::Closed))
                    .await
                    .map_err(|_| Error::from(ConnectionError::Closed))?;
                *state
            };
            match state {
                SessionState::Expired => {
                    return Err(ConnectionError::SessionExpired {
                        session_id: self.session_id(),
                    }
                    .into())
                }
                SessionState::Closed => return Err(ConnectionError::Closed.into()),
                _ => {}
            }

            let current = self.transport.read().clone();
            if let Some(transport) = current {
                return Ok(transport);
            }
            state_rx
                .changed()
                .await
                .map_err(|_| Error::from(ConnectionError::Closed))?;
        }
    }

    async fn execute_with_retry<Q, R, F, Fut>(
        &self,
        op: &'static str,
        on_loss: OnLoss,
        request: Q,
        call: F,
    ) -> Result<(ErrorCode, R)>
    where
        Q: SessionRequest + Clone,
        R: Reply,
        F: Fn(RpcClient, Q) -> Fut,
        Fut: Future<Output = std::result::Result<tonic::Response<R>, Status>>,
    {
        loop {
            let transport = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(ConnectionError::Closed.into()),
                transport = self.ready_transport() => transport?,
            };
            let header = self.request_header();
            let xid = header.xid;
            let mut request = request.clone();
            request.set_header(header);

            let outcome = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(ConnectionError::Closed.into()),
                outcome = call(transport.client, request) => outcome,
            };
            match outcome {
                Ok(response) => {
                    let reply = response.into_inner();
                    self.touch();
                    let header = reply.reply_header().cloned().unwrap_or_default();
                    if header.xid != xid {
                        return Err(ConnectionError::XidMismatch {
                            expected: xid,
                            got: header.xid,
                        }
                        .into());
                    }
                    self.observe_zxid(header.zxid);

                    let code = header.code();
                    if code == ErrorCode::SessionExpired {
                        self.expire();
                        return Err(ConnectionError::SessionExpired {
                            session_id: self.session_id(),
                        }
                        .into());
                    }
                    trace!(op, xid, ?code, "reply received");
                    return Ok((code, reply));
                }
                Err(status) if is_connection_loss(&status) => {
                    self.transport_lost(transport.generation);
                    if on_loss == OnLoss::Report {
                        warn!(op, xid, "connection lost before the reply: {}", status);
                        return Err(ConnectionError::ConnectionLoss { op }.into());
                    }
                    debug!(op, xid, "connection lost, retrying: {}", status);
                }
                Err(status) => return Err(status.into()),
            }
        }
    }

    /// First session: round-robin over the endpoints until `connect_timeout`.
    async fn establish_first_session(self: &Arc<Self>) -> Result<Streaming<WatchEvent>> {
        let connect_timeout = self.config.session.connect_timeout();
        let deadline = Instant::now() + connect_timeout;
        let mut transport_reached = false;
        let mut attempt = 0u32;

        loop {
            let endpoint = self.next_endpoint();
            match timeout_at(deadline, self.dial(&endpoint)).await {
                Err(_) => break,
                Ok(Err(e)) => warn!(%endpoint, "dial failed: {}", e),
                Ok(Ok(channel)) => {
                    transport_reached = true;
                    match timeout_at(deadline, self.handshake(channel, &endpoint)).await {
                        Err(_) => break,
                        Ok(Ok(events)) => return Ok(events),
                        Ok(Err(e)) => warn!(%endpoint, "session handshake failed: {}", e),
                    }
                }
            }

            let delay = self.config.retry.delay(attempt);
            attempt = attempt.saturating_add(1);
            if Instant::now() + delay >= deadline {
                break;
            }
            tokio::time::sleep(delay).await;
        }

        if transport_reached {
            Err(ConnectionError::ConnectTimeout(connect_timeout).into())
        } else {
            Err(ConnectionError::EnsembleUnreachable {
                endpoints: self.endpoints.clone(),
            }
            .into())
        }
    }

    /// Resumes the current session on the next reachable member.
    async fn recover(self: &Arc<Self>) -> Result<Streaming<WatchEvent>> {
        self.transport.write().take();
        self.set_state(SessionState::Reconnecting);

        let (session_id, negotiated_timeout) = {
            let session = self.session.read();
            (session.session_id, session.negotiated_timeout)
        };
        let expires_at = *self.last_contact.lock() + negotiated_timeout;
        let attempt_budget = self.ping_interval();
        let mut attempt = 0u32;
        info!(session_id, "transport lost, resuming session");

        loop {
            let now = Instant::now();
            if now >= expires_at {
                self.expire();
                return Err(ConnectionError::SessionExpired { session_id }.into());
            }

            let endpoint = self.next_endpoint();
            let attempt_deadline = (now + attempt_budget).min(expires_at);
            let result = timeout_at(attempt_deadline, async {
                let channel = self.dial(&endpoint).await?;
                self.handshake(channel, &endpoint).await
            })
            .await;

            match result {
                Ok(Ok(events)) => return Ok(events),
                Ok(Err(e)) if e.is_session_expired() => {
                    self.expire();
                    return Err(e);
                }
                Ok(Err(e)) => warn!(session_id, %endpoint, "reconnect attempt failed: {}", e),
                Err(_) => warn!(session_id, %endpoint, "reconnect attempt timed out"),
            }

            let delay = self.config.retry.delay(attempt);
            attempt = attempt.saturating_add(1);
            tokio::time::sleep_until((Instant::now() + delay).min(expires_at)).await;
        }
    }

    async fn dial(
        &self,
        endpoint: &str,
    ) -> Result<Channel> {
        debug!("dial, endpoint = {:?}", endpoint);
        let network = &self.config.network;
        Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| ConnectionError::InvalidEndpoint(format!("{endpoint}: {e}")))?
            .connect_timeout(network.dial_timeout())
            .tcp_keepalive(Some(Duration::from_secs(network.tcp_keepalive_in_secs)))
            .http2_keep_alive_interval(Duration::from_secs(network.http2_keep_alive_interval_in_secs))
            .keep_alive_timeout(Duration::from_secs(network.http2_keep_alive_timeout_in_secs))
            .connect()
            .await
            .map_err(Into::into)
    }

    fn rpc_client(
        &self,
        channel: Channel,
    ) -> RpcClient {
        let client = CoordServiceClient::new(channel);
        if self.config.network.enable_compression {
            client
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip)
        } else {
            client
        }
    }

    /// Members without a health service are assumed ready.
    async fn probe(
        &self,
        channel: Channel,
        endpoint: &str,
    ) -> Result<()> {
        let mut health = HealthClient::new(channel);
        let request = HealthCheckRequest {
            service: COORD_SERVICE_NAME.to_string(),
        };
        match health.check(request).await {
            Ok(response) if response.get_ref().status == ServingStatus::Serving as i32 => Ok(()),
            Ok(_) => Err(ConnectionError::NotServing {
                endpoint: endpoint.to_string(),
            }
            .into()),
            Err(status) if matches!(status.code(), Code::Unimplemented | Code::NotFound) => Ok(()),
            Err(status) => Err(status.into()),
        }
    }

    /// Opens or resumes the session on `channel` and subscribes to its events.
    async fn handshake(
        &self,
        channel: Channel,
        endpoint: &str,
    ) -> Result<Streaming<WatchEvent>> {
        if self.config.network.health_check {
            self.probe(channel.clone(), endpoint).await?;
        }

        let mut client = self.rpc_client(channel);
        let (session_id, passwd) = {
            let session = self.session.read();
            (session.session_id, session.passwd.clone())
        };
        let requested_timeout = i32::try_from(self.config.session.session_timeout_ms).unwrap_or(i32::MAX);
        let request = OpenSessionRequest {
            session_id,
            passwd,
            timeout_ms: requested_timeout,
            last_zxid_seen: self.last_zxid.load(Ordering::Acquire),
        };

        let response = client.open_session(request).await?.into_inner();
        let header = response.header.unwrap_or_default();
        match header.code() {
            ErrorCode::Success => {}
            ErrorCode::SessionExpired => return Err(ConnectionError::SessionExpired { session_id }.into()),
            code => {
                return Err(Error::Fatal(format!(
                    "session handshake rejected by {endpoint}: {code:?}"
                )))
            }
        }
        self.observe_zxid(header.zxid);

        {
            let mut session = self.session.write();
            session.session_id = response.session_id;
            session.passwd = response.passwd;
            session.negotiated_timeout = Duration::from_millis(u64::try_from(response.timeout_ms).unwrap_or(0));
            session.endpoint = endpoint.to_string();
        }

        let mut events_request = WatchEventsRequest::default();
        events_request.set_header(self.request_header());
        let events = client.watch_events(events_request).await?.into_inner();

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *self.transport.write() = Some(Transport { client, generation });
        self.touch();
        self.recovering.store(false, Ordering::Release);
        self.set_state(SessionState::Connected);

        if session_id == NEW_SESSION_ID {
            info!(session_id = response.session_id, %endpoint, "session established");
        } else {
            info!(session_id, %endpoint, "session resumed");
        }
        Ok(events)
    }

    /// Returns `false` once the session can no longer be served.
    async fn ping(&self) -> bool {
        let current = self.transport.read().clone();
        let Some(transport) = current else {
            return true;
        };

        let mut client = transport.client;
        let mut request = PingRequest::default();
        request.set_header(self.request_header());

        match timeout(self.ping_interval(), client.ping(request)).await {
            Ok(Ok(response)) => {
                let header = response.into_inner().header.unwrap_or_default();
                if header.code() == ErrorCode::SessionExpired {
                    self.expire();
                    return false;
                }
                self.touch();
                self.observe_zxid(header.zxid);
                true
            }
            Ok(Err(status)) if is_connection_loss(&status) => {
                warn!("ping failed: {}", status);
                self.transport_lost(transport.generation);
                true
            }
            Ok(Err(status)) => {
                warn!("ping rejected: {}", status);
                true
            }
            Err(_) => {
                warn!("ping timed out");
                self.transport_lost(transport.generation);
                true
            }
        }
    }
}

fn is_connection_loss(status: &Status) -> bool {
    matches!(status.code(), Code::Unavailable | Code::Cancelled | Code::Unknown)
}

fn ping_timer(period: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn next_event(events: &mut Option<Streaming<WatchEvent>>) -> std::result::Result<Option<WatchEvent>, Status> {
    match events {
        Some(stream) => stream.message().await,
        None => std::future::pending().await,
    }
}

/// Heartbeats, watch event forwarding and session recovery.
async fn run_driver(
    inner: Arc<ManagerInner>,
    events: Streaming<WatchEvent>,
) {
    let mut events = Some(events);
    let mut ping = ping_timer(inner.ping_interval());

    loop {
        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => {
                debug!("session driver stopped");
                break;
            }
            _ = inner.lost.notified() => {
                let recovered = tokio::select! {
                    biased;
                    _ = inner.shutdown.cancelled() => None,
                    r = inner.recover() => Some(r),
                };
                match recovered {
                    Some(Ok(stream)) => {
                        events = Some(stream);
                        ping = ping_timer(inner.ping_interval());
                    }
                    Some(Err(e)) => {
                        debug!("session driver exiting: {}", e);
                        break;
                    }
                    None => break,
                }
            }
            _ = ping.tick() => {
                if !inner.ping().await {
                    break;
                }
            }
            message = next_event(&mut events) => match message {
                Ok(Some(event)) => {
                    inner.touch();
                    inner.observe_zxid(event.zxid);
                    trace!(path = %event.path, event_type = event.event_type, "watch event");
                    let _ = inner.notify_tx.send(Notification::Watch(event));
                }
                Ok(None) => {
                    debug!("event stream ended");
                    events = None;
                    inner.transport_lost(inner.generation.load(Ordering::Acquire));
                }
                Err(status) => {
                    warn!("event stream failed: {}", status);
                    events = None;
                    inner.transport_lost(inner.generation.load(Ordering::Acquire));
                }
            }
        }

        if inner.state().is_terminal() {
            break;
        }
    }
}
