//! In-process ensemble for exercising the client end to end.
//!
//! Every member serves the coordination service and a health service on its
//! own local port. All members share one node tree and one session table, so
//! a session can be resumed on any live member. Watches are one-shot and are
//! delivered on the session's event stream, or queued until the session
//! attaches a new stream after failover.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::codec::CompressionEncoding;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tonic_health::server::health_reporter;
use tonic_health::server::HealthReporter;
use tracing::debug;
use tracing::info;

use crate::node::path;
use crate::proto;
use crate::proto::coord_service_server::CoordService;
use crate::proto::coord_service_server::CoordServiceServer;
use crate::proto::CloseSessionRequest;
use crate::proto::CloseSessionResponse;
use crate::proto::CreateRequest;
use crate::proto::CreateResponse;
use crate::proto::DeleteRequest;
use crate::proto::DeleteResponse;
use crate::proto::ErrorCode;
use crate::proto::EventType;
use crate::proto::ExistsRequest;
use crate::proto::ExistsResponse;
use crate::proto::GetChildrenRequest;
use crate::proto::GetChildrenResponse;
use crate::proto::GetDataRequest;
use crate::proto::GetDataResponse;
use crate::proto::OpenSessionRequest;
use crate::proto::OpenSessionResponse;
use crate::proto::PingRequest;
use crate::proto::PingResponse;
use crate::proto::ReplyHeader;
use crate::proto::RequestHeader;
use crate::proto::SetDataRequest;
use crate::proto::SetDataResponse;
use crate::proto::WatchEvent;
use crate::proto::WatchEventsRequest;
use crate::CreateMode;
use crate::Stat;

const MIN_SESSION_TIMEOUT_MS: i32 = 200;
const MAX_SESSION_TIMEOUT_MS: i32 = 60_000;
const REAPER_PERIOD: Duration = Duration::from_millis(20);

type EventSender = mpsc::UnboundedSender<Result<WatchEvent, Status>>;

struct ZNode {
    data: Bytes,
    stat: Stat,
    children: BTreeSet<String>,
}

struct SessionEntry {
    passwd: Bytes,
    timeout: Duration,
    last_seen: Instant,
    member: usize,
    events: Option<EventSender>,
    pending: Vec<WatchEvent>,
    ephemerals: BTreeSet<String>,
}

#[derive(Clone, Copy)]
enum WatchTable {
    Data,
    Exist,
    Child,
}

struct Tree {
    nodes: BTreeMap<String, ZNode>,
    sessions: HashMap<i64, SessionEntry>,
    data_watches: HashMap<String, HashSet<i64>>,
    exist_watches: HashMap<String, HashSet<i64>>,
    child_watches: HashMap<String, HashSet<i64>>,
    zxid: i64,
    next_session_id: i64,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

impl Tree {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            path::ROOT.to_string(),
            ZNode {
                data: Bytes::new(),
                stat: Stat::default(),
                children: BTreeSet::new(),
            },
        );
        Self {
            nodes,
            sessions: HashMap::new(),
            data_watches: HashMap::new(),
            exist_watches: HashMap::new(),
            child_watches: HashMap::new(),
            zxid: 0,
            next_session_id: 0x1000,
        }
    }

    fn next_zxid(&mut self) -> i64 {
        self.zxid += 1;
        self.zxid
    }

    fn table(
        &mut self,
        table: WatchTable,
    ) -> &mut HashMap<String, HashSet<i64>> {
        match table {
            WatchTable::Data => &mut self.data_watches,
            WatchTable::Exist => &mut self.exist_watches,
            WatchTable::Child => &mut self.child_watches,
        }
    }

    fn add_watch(
        &mut self,
        table: WatchTable,
        path: &str,
        session_id: i64,
    ) {
        self.table(table).entry(path.to_string()).or_default().insert(session_id);
    }

    /// Removes the one-shot watchers of `path` from each table and notifies
    /// every watching session once.
    fn fire(
        &mut self,
        tables: &[WatchTable],
        path: &str,
        event_type: EventType,
    ) {
        let mut watchers = BTreeSet::new();
        for table in tables {
            if let Some(sessions) = self.table(*table).remove(path) {
                watchers.extend(sessions);
            }
        }
        for session_id in watchers {
            self.emit(session_id, event_type, path);
        }
    }

    fn emit(
        &mut self,
        session_id: i64,
        event_type: EventType,
        path: &str,
    ) {
        let event = WatchEvent {
            event_type: event_type as i32,
            path: path.to_string(),
            zxid: self.zxid,
        };
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };
        let delivered = match &session.events {
            Some(tx) => tx.send(Ok(event.clone())).is_ok(),
            None => false,
        };
        if !delivered {
            session.events = None;
            session.pending.push(event);
        }
    }

    fn open_session(
        &mut self,
        request: &OpenSessionRequest,
        member: usize,
    ) -> Result<(i64, Bytes, i32), ErrorCode> {
        let timeout_ms = request.timeout_ms.clamp(MIN_SESSION_TIMEOUT_MS, MAX_SESSION_TIMEOUT_MS);

        if request.session_id == 0 {
            let session_id = self.next_session_id;
            self.next_session_id += 1;
            let passwd = Bytes::copy_from_slice(&rand::thread_rng().gen::<[u8; 16]>());
            self.sessions.insert(
                session_id,
                SessionEntry {
                    passwd: passwd.clone(),
                    timeout: Duration::from_millis(timeout_ms as u64),
                    last_seen: Instant::now(),
                    member,
                    events: None,
                    pending: Vec::new(),
                    ephemerals: BTreeSet::new(),
                },
            );
            return Ok((session_id, passwd, timeout_ms));
        }

        match self.sessions.get_mut(&request.session_id) {
            Some(session) if session.passwd == request.passwd => {
                session.last_seen = Instant::now();
                session.member = member;
                let timeout_ms = session.timeout.as_millis() as i32;
                Ok((request.session_id, session.passwd.clone(), timeout_ms))
            }
            _ => Err(ErrorCode::SessionExpired),
        }
    }

    fn touch(
        &mut self,
        session_id: i64,
        member: usize,
    ) -> Result<(), ErrorCode> {
        let session = self.sessions.get_mut(&session_id).ok_or(ErrorCode::SessionExpired)?;
        session.last_seen = Instant::now();
        session.member = member;
        Ok(())
    }

    /// Drops the session, its watches and its ephemeral nodes.
    fn end_session(
        &mut self,
        session_id: i64,
    ) {
        let Some(session) = self.sessions.remove(&session_id) else {
            return;
        };
        for table in [WatchTable::Data, WatchTable::Exist, WatchTable::Child] {
            for watchers in self.table(table).values_mut() {
                watchers.remove(&session_id);
            }
        }
        for ephemeral in session.ephemerals.iter().rev() {
            if self.nodes.contains_key(ephemeral) {
                self.remove_node(ephemeral);
            }
        }
    }

    fn create(
        &mut self,
        session_id: i64,
        requested: &str,
        data: Bytes,
        mode: CreateMode,
    ) -> Result<(String, Stat), ErrorCode> {
        path::validate_create(requested, mode.is_sequential()).map_err(|_| ErrorCode::InvalidPath)?;
        let parent_path = path::parent(requested).ok_or(ErrorCode::NodeExists)?.to_string();
        let parent = self.nodes.get(&parent_path).ok_or(ErrorCode::NoParent)?;
        if parent.stat.ephemeral_owner != 0 {
            return Err(ErrorCode::NoChildrenForEphemerals);
        }

        let actual = if mode.is_sequential() {
            path::sequential_name(requested, parent.stat.cversion)
        } else {
            requested.to_string()
        };
        if self.nodes.contains_key(&actual) {
            return Err(ErrorCode::NodeExists);
        }

        let zxid = self.next_zxid();
        let now = now_ms();
        let stat = Stat {
            czxid: zxid,
            mzxid: zxid,
            ctime: now,
            mtime: now,
            ephemeral_owner: if mode.is_ephemeral() { session_id } else { 0 },
            data_length: data.len() as i32,
            pzxid: zxid,
            ..Stat::default()
        };
        self.nodes.insert(
            actual.clone(),
            ZNode {
                data,
                stat,
                children: BTreeSet::new(),
            },
        );
        if let Some(parent) = self.nodes.get_mut(&parent_path) {
            parent.children.insert(path::name(&actual).to_string());
            parent.stat.cversion += 1;
            parent.stat.num_children = parent.children.len() as i32;
            parent.stat.pzxid = zxid;
        }
        if mode.is_ephemeral() {
            if let Some(session) = self.sessions.get_mut(&session_id) {
                session.ephemerals.insert(actual.clone());
            }
        }

        self.fire(&[WatchTable::Exist, WatchTable::Data], &actual, EventType::NodeCreated);
        self.fire(&[WatchTable::Child], &parent_path, EventType::NodeChildrenChanged);
        Ok((actual, stat))
    }

    fn delete(
        &mut self,
        target: &str,
        version: i32,
    ) -> Result<(), ErrorCode> {
        path::validate(target).map_err(|_| ErrorCode::InvalidPath)?;
        if target == path::ROOT {
            return Err(ErrorCode::InvalidPath);
        }
        let node = self.nodes.get(target).ok_or(ErrorCode::NoNode)?;
        if version != -1 && version != node.stat.version {
            return Err(ErrorCode::BadVersion);
        }
        if !node.children.is_empty() {
            return Err(ErrorCode::NotEmpty);
        }
        self.remove_node(target);
        Ok(())
    }

    fn remove_node(
        &mut self,
        target: &str,
    ) {
        let Some(node) = self.nodes.remove(target) else {
            return;
        };
        let zxid = self.next_zxid();
        if node.stat.ephemeral_owner != 0 {
            if let Some(owner) = self.sessions.get_mut(&node.stat.ephemeral_owner) {
                owner.ephemerals.remove(target);
            }
        }

        let parent_path = path::parent(target).unwrap_or(path::ROOT).to_string();
        if let Some(parent) = self.nodes.get_mut(&parent_path) {
            parent.children.remove(path::name(target));
            parent.stat.cversion += 1;
            parent.stat.num_children = parent.children.len() as i32;
            parent.stat.pzxid = zxid;
        }

        self.fire(
            &[WatchTable::Data, WatchTable::Exist, WatchTable::Child],
            target,
            EventType::NodeDeleted,
        );
        self.fire(&[WatchTable::Child], &parent_path, EventType::NodeChildrenChanged);
    }

    fn set_data(
        &mut self,
        target: &str,
        data: Bytes,
        version: i32,
    ) -> Result<Stat, ErrorCode> {
        path::validate(target).map_err(|_| ErrorCode::InvalidPath)?;
        let current = self.nodes.get(target).ok_or(ErrorCode::NoNode)?.stat.version;
        if version != -1 && version != current {
            return Err(ErrorCode::BadVersion);
        }
        let zxid = self.next_zxid();
        let node = self.nodes.get_mut(target).ok_or(ErrorCode::NoNode)?;
        node.stat.version += 1;
        node.stat.mzxid = zxid;
        node.stat.mtime = now_ms();
        node.stat.data_length = data.len() as i32;
        node.data = data;
        let stat = node.stat;

        self.fire(&[WatchTable::Data], target, EventType::NodeDataChanged);
        Ok(stat)
    }

    fn exists(
        &mut self,
        session_id: i64,
        target: &str,
        watch: bool,
    ) -> Result<Stat, ErrorCode> {
        path::validate(target).map_err(|_| ErrorCode::InvalidPath)?;
        match self.nodes.get(target).map(|node| node.stat) {
            Some(stat) => {
                if watch {
                    self.add_watch(WatchTable::Data, target, session_id);
                }
                Ok(stat)
            }
            None => {
                if watch {
                    self.add_watch(WatchTable::Exist, target, session_id);
                }
                Err(ErrorCode::NoNode)
            }
        }
    }

    fn get_data(
        &mut self,
        session_id: i64,
        target: &str,
        watch: bool,
    ) -> Result<(Bytes, Stat), ErrorCode> {
        path::validate(target).map_err(|_| ErrorCode::InvalidPath)?;
        let node = self.nodes.get(target).ok_or(ErrorCode::NoNode)?;
        let reply = (node.data.clone(), node.stat);
        if watch {
            self.add_watch(WatchTable::Data, target, session_id);
        }
        Ok(reply)
    }

    fn get_children(
        &mut self,
        session_id: i64,
        target: &str,
        watch: bool,
    ) -> Result<(Vec<String>, Stat), ErrorCode> {
        path::validate(target).map_err(|_| ErrorCode::InvalidPath)?;
        let node = self.nodes.get(target).ok_or(ErrorCode::NoNode)?;
        let reply = (node.children.iter().cloned().collect(), node.stat);
        if watch {
            self.add_watch(WatchTable::Child, target, session_id);
        }
        Ok(reply)
    }

    fn expire_idle_sessions(&mut self) {
        let now = Instant::now();
        let idle: Vec<i64> = self
            .sessions
            .iter()
            .filter(|(_, s)| now.duration_since(s.last_seen) > s.timeout)
            .map(|(id, _)| *id)
            .collect();
        for session_id in idle {
            info!(session_id, "mock ensemble expired idle session");
            self.end_session(session_id);
        }
    }
}

struct EnsembleState {
    tree: Mutex<Tree>,
    response_delay_ms: AtomicU64,
    /// Operations whose requests are held without ever being answered
    held: Mutex<HashSet<&'static str>>,
    /// Operations whose next reply is dropped after the request was applied
    lose_reply: Mutex<HashSet<&'static str>>,
}

/// One member's view of the shared ensemble.
pub(crate) struct MemberService {
    id: usize,
    alive: Arc<AtomicBool>,
    state: Arc<EnsembleState>,
}

impl MemberService {
    async fn ready(
        &self,
        op: &'static str,
    ) -> Result<(), Status> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(Status::unavailable(format!("member {} is down", self.id)));
        }
        let delay = self.state.response_delay_ms.load(Ordering::Acquire);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.state.held.lock().contains(op) {
            debug!(member = self.id, op, "holding request");
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    /// Answers `op`, unless its reply is set to be lost on the way back.
    fn reply<T>(
        &self,
        op: &'static str,
        response: T,
    ) -> Result<Response<T>, Status> {
        if self.state.lose_reply.lock().remove(op) {
            debug!(member = self.id, op, "dropping reply of applied request");
            return Err(Status::unavailable("connection reset before reply"));
        }
        Ok(Response::new(response))
    }

    /// Runs `op` for the session named in `header` and builds the reply header.
    fn session_call<R>(
        &self,
        header: Option<RequestHeader>,
        op: impl FnOnce(&mut Tree, i64) -> Result<R, ErrorCode>,
    ) -> Result<(ReplyHeader, Option<R>), Status> {
        let header = header.ok_or_else(|| Status::invalid_argument("missing request header"))?;
        let mut tree = self.state.tree.lock();
        let result = match tree.touch(header.session_id, self.id) {
            Ok(()) => op(&mut *tree, header.session_id),
            Err(code) => Err(code),
        };
        let zxid = tree.zxid;
        Ok(match result {
            Ok(reply) => (ReplyHeader::success(header.xid, zxid), Some(reply)),
            Err(code) => (ReplyHeader::failure(header.xid, zxid, code), None),
        })
    }
}

#[tonic::async_trait]
impl CoordService for MemberService {
    type WatchEventsStream = UnboundedReceiverStream<Result<WatchEvent, Status>>;

    async fn open_session(
        &self,
        request: Request<OpenSessionRequest>,
    ) -> Result<Response<OpenSessionResponse>, Status> {
        self.ready("open_session").await?;
        let request = request.into_inner();
        let mut tree = self.state.tree.lock();
        let zxid = tree.zxid;
        let response = match tree.open_session(&request, self.id) {
            Ok((session_id, passwd, timeout_ms)) => {
                debug!(member = self.id, session_id, "session opened");
                OpenSessionResponse {
                    header: Some(ReplyHeader::success(0, zxid)),
                    session_id,
                    passwd,
                    timeout_ms,
                }
            }
            Err(code) => OpenSessionResponse {
                header: Some(ReplyHeader::failure(0, zxid, code)),
                ..Default::default()
            },
        };
        Ok(Response::new(response))
    }

    async fn ping(
        &self,
        request: Request<PingRequest>,
    ) -> Result<Response<PingResponse>, Status> {
        self.ready("ping").await?;
        let (header, _) = self.session_call(request.into_inner().header, |_, _| Ok(()))?;
        Ok(Response::new(PingResponse { header: Some(header) }))
    }

    async fn close_session(
        &self,
        request: Request<CloseSessionRequest>,
    ) -> Result<Response<CloseSessionResponse>, Status> {
        self.ready("close_session").await?;
        let (header, _) = self.session_call(request.into_inner().header, |tree, session_id| {
            tree.end_session(session_id);
            Ok(())
        })?;
        self.reply("close_session", CloseSessionResponse { header: Some(header) })
    }

    async fn create(
        &self,
        request: Request<CreateRequest>,
    ) -> Result<Response<CreateResponse>, Status> {
        self.ready("create").await?;
        let request = request.into_inner();
        let mode = CreateMode::from(proto::CreateMode::try_from(request.mode).unwrap_or(proto::CreateMode::Persistent));
        let (header, created) = self.session_call(request.header, |tree, session_id| {
            tree.create(session_id, &request.path, request.data.clone(), mode)
        })?;
        let (path, stat) = match created {
            Some((path, stat)) => (path, Some(stat.into())),
            None => (String::new(), None),
        };
        self.reply("create", CreateResponse {
            header: Some(header),
            path,
            stat,
        })
    }

    async fn delete(
        &self,
        request: Request<DeleteRequest>,
    ) -> Result<Response<DeleteResponse>, Status> {
        self.ready("delete").await?;
        let request = request.into_inner();
        let (header, _) = self.session_call(request.header, |tree, _| tree.delete(&request.path, request.version))?;
        self.reply("delete", DeleteResponse { header: Some(header) })
    }

    async fn exists(
        &self,
        request: Request<ExistsRequest>,
    ) -> Result<Response<ExistsResponse>, Status> {
        self.ready("exists").await?;
        let request = request.into_inner();
        let (header, stat) = self.session_call(request.header, |tree, session_id| {
            tree.exists(session_id, &request.path, request.watch)
        })?;
        self.reply("exists", ExistsResponse {
            header: Some(header),
            stat: stat.map(Into::into),
        })
    }

    async fn get_data(
        &self,
        request: Request<GetDataRequest>,
    ) -> Result<Response<GetDataResponse>, Status> {
        self.ready("get_data").await?;
        let request = request.into_inner();
        let (header, found) = self.session_call(request.header, |tree, session_id| {
            tree.get_data(session_id, &request.path, request.watch)
        })?;
        let (data, stat) = match found {
            Some((data, stat)) => (data, Some(stat.into())),
            None => (Bytes::new(), None),
        };
        self.reply("get_data", GetDataResponse {
            header: Some(header),
            data,
            stat,
        })
    }

    async fn set_data(
        &self,
        request: Request<SetDataRequest>,
    ) -> Result<Response<SetDataResponse>, Status> {
        self.ready("set_data").await?;
        let request = request.into_inner();
        let (header, stat) = self.session_call(request.header, |tree, _| {
            tree.set_data(&request.path, request.data.clone(), request.version)
        })?;
        self.reply("set_data", SetDataResponse {
            header: Some(header),
            stat: stat.map(Into::into),
        })
    }

    async fn get_children(
        &self,
        request: Request<GetChildrenRequest>,
    ) -> Result<Response<GetChildrenResponse>, Status> {
        self.ready("get_children").await?;
        let request = request.into_inner();
        let (header, found) = self.session_call(request.header, |tree, session_id| {
            tree.get_children(session_id, &request.path, request.watch)
        })?;
        let (children, stat) = match found {
            Some((children, stat)) => (children, Some(stat.into())),
            None => (Vec::new(), None),
        };
        self.reply("get_children", GetChildrenResponse {
            header: Some(header),
            children,
            stat,
        })
    }

    async fn watch_events(
        &self,
        request: Request<WatchEventsRequest>,
    ) -> Result<Response<Self::WatchEventsStream>, Status> {
        self.ready("watch_events").await?;
        let header = request
            .into_inner()
            .header
            .ok_or_else(|| Status::invalid_argument("missing request header"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut tree = self.state.tree.lock();
        let session = tree
            .sessions
            .get_mut(&header.session_id)
            .ok_or_else(|| Status::failed_precondition("session expired"))?;
        for event in session.pending.drain(..) {
            let _ = tx.send(Ok(event));
        }
        session.events = Some(tx);
        session.member = self.id;
        session.last_seen = Instant::now();
        Ok(Response::new(UnboundedReceiverStream::new(rx)))
    }
}

struct Member {
    addr: SocketAddr,
    alive: Arc<AtomicBool>,
    health: HealthReporter,
}

/// Local ensemble of `n` members sharing one tree.
pub(crate) struct MockEnsemble {
    state: Arc<EnsembleState>,
    members: Vec<Member>,
    shutdown: CancellationToken,
}

impl MockEnsemble {
    pub(crate) async fn start(n: usize) -> Self {
        let state = Arc::new(EnsembleState {
            tree: Mutex::new(Tree::new()),
            response_delay_ms: AtomicU64::new(0),
            held: Mutex::new(HashSet::new()),
            lose_reply: Mutex::new(HashSet::new()),
        });
        let shutdown = CancellationToken::new();

        let mut members = Vec::with_capacity(n);
        for id in 0..n {
            let (mut health, health_service) = health_reporter();
            health.set_serving::<CoordServiceServer<MemberService>>().await;

            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock member");
            let addr = listener.local_addr().expect("mock member address");
            let alive = Arc::new(AtomicBool::new(true));
            let service = MemberService {
                id,
                alive: alive.clone(),
                state: state.clone(),
            };
            let token = shutdown.clone();
            tokio::spawn(async move {
                let result = tonic::transport::Server::builder()
                    .add_service(health_service)
                    .add_service(
                        CoordServiceServer::new(service)
                            .accept_compressed(CompressionEncoding::Gzip)
                            .send_compressed(CompressionEncoding::Gzip),
                    )
                    .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                        token.cancelled().await
                    })
                    .await;
                if let Err(e) = result {
                    debug!("mock member {} stopped: {:?}", id, e);
                }
            });
            debug!("mock member {} listening on {}", id, addr);
            members.push(Member { addr, alive, health });
        }

        let reaper_state = state.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(REAPER_PERIOD);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => reaper_state.tree.lock().expire_idle_sessions(),
                }
            }
        });

        Self {
            state,
            members,
            shutdown,
        }
    }

    /// `host:port` of every member, in member order.
    pub(crate) fn endpoints(&self) -> Vec<String> {
        self.members.iter().map(|m| m.addr.to_string()).collect()
    }

    pub(crate) fn connect_string(&self) -> String {
        self.endpoints().join(",")
    }

    /// Stops serving on member `id` and cuts the event streams attached to it.
    pub(crate) async fn kill_member(
        &self,
        id: usize,
    ) {
        let member = &self.members[id];
        member.alive.store(false, Ordering::Release);
        member
            .health
            .clone()
            .set_not_serving::<CoordServiceServer<MemberService>>()
            .await;
        let mut tree = self.state.tree.lock();
        for session in tree.sessions.values_mut() {
            if session.member == id {
                session.events = None;
            }
        }
        info!("mock member {} killed", id);
    }

    pub(crate) async fn revive_member(
        &self,
        id: usize,
    ) {
        let member = &self.members[id];
        member.alive.store(true, Ordering::Release);
        member
            .health
            .clone()
            .set_serving::<CoordServiceServer<MemberService>>()
            .await;
    }

    /// Reports member `id` as not serving while still answering requests.
    pub(crate) async fn set_not_serving(
        &self,
        id: usize,
    ) {
        self.members[id]
            .health
            .clone()
            .set_not_serving::<CoordServiceServer<MemberService>>()
            .await;
    }

    /// Expires the session as if its timeout had lapsed on the ensemble.
    pub(crate) fn expire_session(
        &self,
        session_id: i64,
    ) {
        self.state.tree.lock().end_session(session_id);
    }

    /// Delays every reply of every member.
    pub(crate) fn set_response_delay(
        &self,
        delay: Duration,
    ) {
        self.state
            .response_delay_ms
            .store(delay.as_millis() as u64, Ordering::Release);
    }

    /// Holds every `op` request unanswered until [`Self::release`].
    pub(crate) fn hold(
        &self,
        op: &'static str,
    ) {
        self.state.held.lock().insert(op);
    }

    pub(crate) fn release(
        &self,
        op: &'static str,
    ) {
        self.state.held.lock().remove(op);
    }

    /// Applies the next `op` request but fails its reply as a dropped connection.
    pub(crate) fn lose_next_reply(
        &self,
        op: &'static str,
    ) {
        self.state.lose_reply.lock().insert(op);
    }

    pub(crate) fn has_session(
        &self,
        session_id: i64,
    ) -> bool {
        self.state.tree.lock().sessions.contains_key(&session_id)
    }

    /// Member the session last talked to.
    pub(crate) fn member_of(
        &self,
        session_id: i64,
    ) -> Option<usize> {
        self.state.tree.lock().sessions.get(&session_id).map(|s| s.member)
    }

    pub(crate) fn node_exists(
        &self,
        path: &str,
    ) -> bool {
        self.state.tree.lock().nodes.contains_key(path)
    }

    pub(crate) fn node_data(
        &self,
        path: &str,
    ) -> Option<Bytes> {
        self.state.tree.lock().nodes.get(path).map(|n| n.data.clone())
    }

    /// Writes raw bytes the way another tool sharing the ensemble would,
    /// creating the node as persistent when absent.
    pub(crate) fn write_external(
        &self,
        path: &str,
        data: Bytes,
    ) {
        let mut tree = self.state.tree.lock();
        if tree.nodes.contains_key(path) {
            let _ = tree.set_data(path, data, -1);
        } else {
            let _ = tree.create(0, path, data, CreateMode::Persistent);
        }
    }
}

impl Drop for MockEnsemble {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let mut tree = self.state.tree.lock();
        for session in tree.sessions.values_mut() {
            session.events = None;
        }
    }
}
