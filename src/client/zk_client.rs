use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::timeout_at;
use tokio::time::Instant;
use tonic::async_trait;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::ClientBuilder;
use super::ScopedTimer;
use super::SessionLink;
use crate::constants::ANY_VERSION;
use crate::node::path;
use crate::ChildListener;
use crate::Codec;
use crate::ConnectionManager;
use crate::CoordConfig;
use crate::CreateMode;
use crate::DataListener;
use crate::DecodingListener;
use crate::Error;
use crate::Listener;
use crate::ListenerId;
use crate::ListenerKind;
use crate::ListenerResult;
use crate::NodeCodec;
use crate::NodeError;
use crate::Notification;
use crate::RawDataListener;
use crate::RegistrationState;
use crate::Result;
use crate::Session;
use crate::SessionState;
use crate::Stat;
use crate::StateListener;
use crate::WatchRegistry;

/// Session-aware coordination client
///
/// Composes a [`ConnectionManager`] (session, failover, heartbeats), the watch
/// registry (permanent listeners) and a payload codec.
///
/// Created through the [`builder()`](ZkClient::builder) method:
/// ```ignore
/// let client = ZkClient::builder(vec!["127.0.0.1:2181".into()]).build().await?;
/// let path = client.create_ephemeral_sequential("/locks/lock-", &"owner").await?;
/// ```
pub struct ZkClient<C: NodeCodec = Codec> {
    link: Arc<SessionLink>,
    registry: WatchRegistry,
    codec: Arc<C>,
}

impl ZkClient {
    /// Create a configured client builder
    ///
    /// Starts client construction with the given ensemble members. Chain
    /// configuration methods before calling [`build()`](ClientBuilder::build).
    pub fn builder(endpoints: Vec<String>) -> ClientBuilder {
        ClientBuilder::new(endpoints)
    }
}

impl<C: NodeCodec> ZkClient<C> {
    pub(crate) async fn connect(
        config: CoordConfig,
        codec: C,
    ) -> Result<Self> {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::connect_with_notifier(config, notify_tx.clone()).await?;
        let link = Arc::new(SessionLink::new(manager));
        let registry = WatchRegistry::new(link.clone(), notify_tx, notify_rx);

        Ok(Self {
            link,
            registry,
            codec: Arc::new(codec),
        })
    }

    fn manager(&self) -> Arc<ConnectionManager> {
        self.link.manager()
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn config(&self) -> CoordConfig {
        self.manager().config().clone()
    }

    pub fn state(&self) -> SessionState {
        self.manager().state()
    }

    pub fn session_id(&self) -> i64 {
        self.manager().session_id()
    }

    pub fn session(&self) -> Session {
        self.manager().session()
    }

    //-----------------------------------------------------------
    // Create

    /// Creates a node holding `value` and returns its actual path.
    ///
    /// Sequential modes append the ensemble-assigned counter to `path`.
    ///
    /// # Errors
    /// - [`NodeError::NodeExists`] for plain modes on an existing path
    /// - [`NodeError::NoParent`] when the parent does not exist
    /// - [`NodeError::NoChildrenForEphemerals`] when the parent is ephemeral
    pub async fn create<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
        mode: CreateMode,
    ) -> Result<String> {
        let data = self.codec.encode(value)?;
        self.create_raw(path, data, mode).await
    }

    /// Creates a node from already encoded payload bytes.
    pub async fn create_raw(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
    ) -> Result<String> {
        let _timer = ScopedTimer::new("create", path);
        let (actual_path, _) = self.manager().create(path, data, mode).await?;
        debug!(path = %actual_path, ?mode, "node created");
        Ok(actual_path)
    }

    pub async fn create_persistent<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
    ) -> Result<String> {
        self.create(path, value, CreateMode::Persistent).await
    }

    pub async fn create_persistent_sequential<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
    ) -> Result<String> {
        self.create(path, value, CreateMode::PersistentSequential).await
    }

    pub async fn create_ephemeral<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
    ) -> Result<String> {
        self.create(path, value, CreateMode::Ephemeral).await
    }

    pub async fn create_ephemeral_sequential<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
    ) -> Result<String> {
        self.create(path, value, CreateMode::EphemeralSequential).await
    }

    /// Creates `path`, first creating missing ancestors as empty persistent nodes.
    pub async fn create_recursive<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
        mode: CreateMode,
    ) -> Result<String> {
        let data = self.codec.encode(value)?;
        match self.create_raw(path, data.clone(), mode).await {
            Err(Error::Node(NodeError::NoParent { .. })) => {}
            other => return other,
        }

        for ancestor in path::ancestors(path) {
            match self.create_raw(ancestor, Bytes::new(), CreateMode::Persistent).await {
                Ok(_) => {}
                Err(e) if e.is_node_exists() => {}
                Err(e) => return Err(e),
            }
        }
        self.create_raw(path, data, mode).await
    }

    //-----------------------------------------------------------
    // Delete

    /// Deletes the node; `false` if it did not exist.
    ///
    /// # Errors
    /// [`NodeError::NotEmpty`] when the node has children.
    pub async fn delete(
        &self,
        path: &str,
    ) -> Result<bool> {
        self.delete_versioned(path, ANY_VERSION).await
    }

    /// Deletes the node only if its data version equals `version`.
    pub async fn delete_versioned(
        &self,
        path: &str,
        version: i32,
    ) -> Result<bool> {
        let _timer = ScopedTimer::new("delete", path);
        match self.manager().delete(path, version).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_no_node() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Deletes the node and its whole subtree, depth first.
    ///
    /// Nodes removed concurrently by someone else are skipped. Returns `false`
    /// when `path` did not exist.
    pub fn delete_recursive<'a>(
        &'a self,
        path: &'a str,
    ) -> BoxFuture<'a, Result<bool>> {
        async move {
            let children = match self.manager().get_children(path, false).await {
                Ok((children, _)) => children,
                Err(e) if e.is_no_node() => return Ok(false),
                Err(e) => return Err(e),
            };
            for child in children {
                let child_path = path::join(path, &child);
                self.delete_recursive(&child_path).await?;
            }
            self.delete(path).await
        }
        .boxed()
    }

    //-----------------------------------------------------------
    // Read

    pub async fn exists(
        &self,
        path: &str,
    ) -> Result<bool> {
        Ok(self.stat(path).await?.is_some())
    }

    pub async fn stat(
        &self,
        path: &str,
    ) -> Result<Option<Stat>> {
        let _timer = ScopedTimer::new("exists", path);
        self.manager().exists(path, false).await
    }

    /// Reads and decodes the node value.
    ///
    /// # Errors
    /// - [`NodeError::NoNode`] when the node does not exist
    /// - [`DecodeError`](crate::DecodeError) when the payload was not written
    ///   with this client's codec
    pub async fn read_data<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<(T, Stat)> {
        let (data, stat) = self.read_raw(path).await?;
        Ok((self.codec.decode(&data)?, stat))
    }

    /// Like [`read_data`](ZkClient::read_data), `None` when the node is absent.
    pub async fn read_data_opt<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<(T, Stat)>> {
        match self.read_data(path).await {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.is_no_node() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn read_raw(
        &self,
        path: &str,
    ) -> Result<(Bytes, Stat)> {
        let _timer = ScopedTimer::new("read", path);
        self.manager().get_data(path, false).await
    }

    pub async fn get_children(
        &self,
        path: &str,
    ) -> Result<HashSet<String>> {
        let _timer = ScopedTimer::new("get_children", path);
        let (children, _) = self.manager().get_children(path, false).await?;
        Ok(children.into_iter().collect())
    }

    /// Number of children, 0 when the node does not exist.
    pub async fn count_children(
        &self,
        path: &str,
    ) -> Result<usize> {
        match self.get_children(path).await {
            Ok(children) => Ok(children.len()),
            Err(e) if e.is_no_node() => Ok(0),
            Err(e) => Err(e),
        }
    }

    //-----------------------------------------------------------
    // Write

    /// Replaces the node value.
    ///
    /// With `expected_version` the write only succeeds if the current data
    /// version matches, failing with [`NodeError::VersionConflict`] otherwise.
    pub async fn write_data<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
        expected_version: Option<i32>,
    ) -> Result<Stat> {
        let data = self.codec.encode(value)?;
        self.write_raw(path, data, expected_version).await
    }

    pub async fn write_raw(
        &self,
        path: &str,
        data: Bytes,
        expected_version: Option<i32>,
    ) -> Result<Stat> {
        let _timer = ScopedTimer::new("write", path);
        self.manager()
            .set_data(path, data, expected_version.unwrap_or(ANY_VERSION))
            .await
    }

    /// Read-modify-write with compare-and-set, retried on version conflicts.
    pub async fn update_data<T, F>(
        &self,
        path: &str,
        mut update: F,
    ) -> Result<(T, Stat)>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(T) -> T,
    {
        loop {
            let (current, stat) = self.read_data::<T>(path).await?;
            let next = update(current);
            match self.write_data(path, &next, Some(stat.version)).await {
                Ok(stat) => return Ok((next, stat)),
                Err(e) if e.is_version_conflict() => {
                    debug!(path, version = stat.version, "concurrent update, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    //-----------------------------------------------------------
    // Watches

    /// Registers a permanent listener for the data of `path`.
    ///
    /// The node does not need to exist; its creation is reported as a data change.
    pub async fn subscribe_data_changes<T, L>(
        &self,
        path: &str,
        listener: Arc<L>,
    ) -> Result<ListenerId>
    where
        T: DeserializeOwned + Send + 'static,
        L: DataListener<T>,
    {
        path::validate(path)?;
        let listener = Listener::Data(Arc::new(DecodingListener::<C, T, L>::new(self.codec.clone(), listener)));
        self.registry.subscribe(path, ListenerKind::DataChange, listener).await
    }

    /// Registers a permanent listener for the children of `path`.
    pub async fn subscribe_child_changes(
        &self,
        path: &str,
        listener: Arc<dyn ChildListener>,
    ) -> Result<ListenerId> {
        path::validate(path)?;
        self.registry
            .subscribe(path, ListenerKind::ChildChange, Listener::Child(listener))
            .await
    }

    pub fn subscribe_state_changes(
        &self,
        listener: Arc<dyn StateListener>,
    ) -> ListenerId {
        self.registry.subscribe_state_changes(listener)
    }

    /// Removes every data listener of `path`. Idempotent.
    pub fn unsubscribe_data_changes(
        &self,
        path: &str,
    ) -> bool {
        self.registry.unsubscribe(path, ListenerKind::DataChange)
    }

    /// Removes every child listener of `path`. Idempotent.
    pub fn unsubscribe_child_changes(
        &self,
        path: &str,
    ) -> bool {
        self.registry.unsubscribe(path, ListenerKind::ChildChange)
    }

    pub fn unsubscribe_listener(
        &self,
        path: &str,
        kind: ListenerKind,
        id: ListenerId,
    ) -> bool {
        self.registry.unsubscribe_listener(path, kind, id)
    }

    pub fn unsubscribe_state_changes(
        &self,
        id: ListenerId,
    ) -> bool {
        self.registry.unsubscribe_state_changes(id)
    }

    pub fn unsubscribe_all(&self) {
        self.registry.unsubscribe_all();
    }

    pub async fn registration_state(
        &self,
        path: &str,
        kind: ListenerKind,
    ) -> Option<RegistrationState> {
        self.registry.registration_state(path, kind).await
    }

    pub fn listener_count(
        &self,
        path: &str,
        kind: ListenerKind,
    ) -> usize {
        self.registry.listener_count(path, kind)
    }

    //-----------------------------------------------------------
    // Waiting

    /// Waits until `path` exists; `false` if it did not appear within `timeout`.
    pub async fn wait_until_exists(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = self
            .registry
            .subscribe(
                path,
                ListenerKind::DataChange,
                Listener::Data(Arc::new(ExistenceSignal { tx })),
            )
            .await?;

        let found = self.poll_exists(path, deadline, &mut rx).await;
        self.registry.unsubscribe_listener(path, ListenerKind::DataChange, id);
        found
    }

    async fn poll_exists(
        &self,
        path: &str,
        deadline: Instant,
        signal: &mut mpsc::UnboundedReceiver<()>,
    ) -> Result<bool> {
        loop {
            if self.exists(path).await? {
                return Ok(true);
            }
            match timeout_at(deadline, signal.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) | Err(_) => return Ok(false),
            }
        }
    }

    /// Waits until the session is connected; `false` on timeout or when the
    /// session has expired or been closed.
    pub async fn wait_until_connected(
        &self,
        timeout: Duration,
    ) -> bool {
        let mut state_rx = self.manager().state_receiver();
        let settled = state_rx.wait_for(|s| s.is_connected() || s.is_terminal());
        let connected = match tokio::time::timeout(timeout, settled).await {
            Ok(Ok(state)) => state.is_connected(),
            _ => false,
        };
        connected
    }

    //-----------------------------------------------------------
    // Lifecycle

    /// Replaces the current session with a fresh one.
    ///
    /// Meant for recovery after [`SessionState::Expired`]. Every watch
    /// registration is re-armed on the new session and its listeners receive
    /// the current node state; state listeners get
    /// [`handle_new_session`](StateListener::handle_new_session).
    pub async fn reconnect(&self) -> Result<i64> {
        let old = self.manager();
        if let Err(e) = old.close().await {
            warn!(session_id = old.session_id(), "closing previous session failed: {}", e);
        }

        let config = old.config().clone();
        let manager = ConnectionManager::connect_with_notifier(config, self.registry.sender()).await?;
        let session_id = manager.session_id();
        self.link.replace(manager);

        info!(session_id, "new session established");
        self.registry.notify(Notification::NewSession(session_id));
        Ok(session_id)
    }

    /// Closes the session and stops watch dispatching. Idempotent.
    ///
    /// Ephemeral nodes of the session are gone once this returns `Ok`. When the
    /// ensemble does not acknowledge within the operation timeout the typed
    /// failure is returned, the session stays open and `close` may be retried.
    pub async fn close(&self) -> Result<()> {
        self.manager().close().await?;
        self.registry.shutdown();
        Ok(())
    }
}

/// Signals data changes of a node, used while waiting for it to appear.
struct ExistenceSignal {
    tx: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl RawDataListener for ExistenceSignal {
    async fn data_changed(
        &self,
        _path: &str,
        _data: Bytes,
    ) -> ListenerResult {
        let _ = self.tx.send(());
        Ok(())
    }

    async fn data_deleted(
        &self,
        _path: &str,
    ) -> ListenerResult {
        Ok(())
    }
}
