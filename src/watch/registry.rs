//! Permanent watch registrations on top of one-shot server watches.
//!
//! The ensemble only offers one-shot watches: once fired, a watch must be set
//! again by the next read. The registry keeps one [`Registration`] per
//! (path, kind) and drives it through an explicit state machine:
//!
//! ```text
//!   subscribe ──> Armed(watch) ──event──> Fired ──> Rearming ──ok──> Armed(watch)
//!                                                      │
//!                                                      └─err─> Disarmed ──new session──> Armed
//! ```
//!
//! Re-arming re-issues the watch while reading the current state of the node,
//! and listeners are invoked exactly once per event with that state.
//! Notifications are handled sequentially on one dispatcher task, so callbacks
//! for a path run in ensemble order and never on the caller's task.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::RwLock;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::Listener;
use super::ListenerResult;
use super::StateListener;
use crate::proto::EventType;
use crate::proto::WatchEvent;
use crate::Notification;
use crate::Result;
use crate::SessionState;

/// What a registration listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    DataChange,
    ChildChange,
}

/// One-shot server watch a registration currently relies on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerWatch {
    Data,
    Children,
    /// Set while the watched node is absent
    Existence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Armed(ServerWatch),
    Fired,
    Rearming,
    /// No server watch is set; re-armed on the next (re)connected session
    Disarmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Re-issues one-shot watches while reading the current node state.
#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait WatchRearm: Send + Sync + 'static {
    /// Data of `path` with a data watch set, or `None` with an existence watch set.
    async fn rearm_data(
        &self,
        path: &str,
    ) -> Result<Option<Bytes>>;

    /// Children of `path` with a child watch set, or `None` with an existence watch set.
    async fn rearm_children(
        &self,
        path: &str,
    ) -> Result<Option<Vec<String>>>;
}

/// Node state read while re-arming, handed to listeners.
#[derive(Debug, Clone)]
enum Snapshot {
    Data(Option<Bytes>),
    Children(Option<HashSet<String>>),
}

pub(crate) struct Registration {
    path: String,
    kind: ListenerKind,
    /// Serialises read-modify-rearm for this (path, kind)
    state: Mutex<RegistrationState>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
}

impl Registration {
    fn new(
        path: &str,
        kind: ListenerKind,
    ) -> Self {
        Self {
            path: path.to_string(),
            kind,
            state: Mutex::new(RegistrationState::Disarmed),
            listeners: RwLock::new(Vec::new()),
        }
    }
}

type RegistrationKey = (String, ListenerKind);

struct RegistryInner {
    registrations: DashMap<RegistrationKey, Arc<Registration>>,
    state_listeners: RwLock<Vec<(ListenerId, Arc<dyn StateListener>)>>,
    rearm: Arc<dyn WatchRearm>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

/// Watch registrations of one client and the task dispatching their events.
pub(crate) struct WatchRegistry {
    inner: Arc<RegistryInner>,
    notify_tx: mpsc::UnboundedSender<Notification>,
}

impl WatchRegistry {
    /// Creates the registry and spawns its dispatcher on `notify_rx`.
    pub(crate) fn new(
        rearm: Arc<dyn WatchRearm>,
        notify_tx: mpsc::UnboundedSender<Notification>,
        notify_rx: mpsc::UnboundedReceiver<Notification>,
    ) -> Self {
        let inner = Arc::new(RegistryInner {
            registrations: DashMap::new(),
            state_listeners: RwLock::new(Vec::new()),
            rearm,
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(run_dispatcher(inner.clone(), notify_rx));
        Self { inner, notify_tx }
    }

    /// Sender feeding the dispatcher, handed to connection managers.
    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<Notification> {
        self.notify_tx.clone()
    }

    pub(crate) fn notify(
        &self,
        notification: Notification,
    ) {
        let _ = self.notify_tx.send(notification);
    }

    /// Adds `listener` to the registration of (path, kind), arming it if new.
    pub(crate) async fn subscribe(
        &self,
        path: &str,
        kind: ListenerKind,
        listener: Listener,
    ) -> Result<ListenerId> {
        let id = self.inner.next_listener_id();
        // The listener joins while the shard is locked, so a concurrent
        // unsubscribe_listener cannot drop the registration underneath it.
        let registration = {
            let entry = self
                .inner
                .registrations
                .entry((path.to_string(), kind))
                .or_insert_with(|| Arc::new(Registration::new(path, kind)));
            entry.listeners.write().push((id, listener));
            entry.clone()
        };

        let mut state = registration.state.lock().await;
        if *state == RegistrationState::Disarmed {
            match self.inner.arm(&registration).await {
                Ok((watch, _)) => {
                    *state = RegistrationState::Armed(watch);
                    debug!(path, ?kind, ?watch, "watch registration armed");
                }
                Err(e) => {
                    drop(state);
                    self.unsubscribe_listener(path, kind, id);
                    return Err(e);
                }
            }
        }
        Ok(id)
    }

    /// Drops the whole registration of (path, kind). Idempotent.
    pub(crate) fn unsubscribe(
        &self,
        path: &str,
        kind: ListenerKind,
    ) -> bool {
        let removed = self.inner.registrations.remove(&(path.to_string(), kind)).is_some();
        if removed {
            debug!(path, ?kind, "watch registration removed");
        }
        removed
    }

    /// Removes one listener; the registration goes away with its last listener.
    pub(crate) fn unsubscribe_listener(
        &self,
        path: &str,
        kind: ListenerKind,
        id: ListenerId,
    ) -> bool {
        let key = (path.to_string(), kind);
        let (removed, now_empty) = match self.inner.registrations.get(&key) {
            Some(registration) => {
                let mut listeners = registration.listeners.write();
                let before = listeners.len();
                listeners.retain(|(listener_id, _)| *listener_id != id);
                (listeners.len() != before, listeners.is_empty())
            }
            None => return false,
        };
        if now_empty {
            self.inner
                .registrations
                .remove_if(&key, |_, registration| registration.listeners.read().is_empty());
        }
        removed
    }

    pub(crate) fn unsubscribe_all(&self) {
        self.inner.registrations.clear();
        self.inner.state_listeners.write().clear();
    }

    pub(crate) fn subscribe_state_changes(
        &self,
        listener: Arc<dyn StateListener>,
    ) -> ListenerId {
        let id = self.inner.next_listener_id();
        self.inner.state_listeners.write().push((id, listener));
        id
    }

    pub(crate) fn unsubscribe_state_changes(
        &self,
        id: ListenerId,
    ) -> bool {
        let mut listeners = self.inner.state_listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub(crate) async fn registration_state(
        &self,
        path: &str,
        kind: ListenerKind,
    ) -> Option<RegistrationState> {
        let registration = self.inner.registrations.get(&(path.to_string(), kind))?.clone();
        let state = *registration.state.lock().await;
        Some(state)
    }

    pub(crate) fn listener_count(
        &self,
        path: &str,
        kind: ListenerKind,
    ) -> usize {
        self.inner
            .registrations
            .get(&(path.to_string(), kind))
            .map(|r| r.listeners.read().len())
            .unwrap_or(0)
    }

    /// Stops dispatching. A callback already running completes; no new ones start.
    pub(crate) fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl RegistryInner {
    fn next_listener_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn registration(
        &self,
        path: &str,
        kind: ListenerKind,
    ) -> Option<Arc<Registration>> {
        self.registrations.get(&(path.to_string(), kind)).map(|r| r.clone())
    }

    /// Sets the one-shot watch matching the node's current existence.
    async fn arm(
        &self,
        registration: &Registration,
    ) -> Result<(ServerWatch, Snapshot)> {
        match registration.kind {
            ListenerKind::DataChange => {
                let data = self.rearm.rearm_data(&registration.path).await?;
                let watch = if data.is_some() {
                    ServerWatch::Data
                } else {
                    ServerWatch::Existence
                };
                Ok((watch, Snapshot::Data(data)))
            }
            ListenerKind::ChildChange => {
                let children = self.rearm.rearm_children(&registration.path).await?;
                let watch = if children.is_some() {
                    ServerWatch::Children
                } else {
                    ServerWatch::Existence
                };
                Ok((watch, Snapshot::Children(children.map(|c| c.into_iter().collect()))))
            }
        }
    }

    /// Fired -> Rearming -> Armed, then delivers the state read while re-arming.
    ///
    /// With `only_disarmed` registrations that still hold a server watch are
    /// left untouched.
    async fn refresh(
        &self,
        registration: Arc<Registration>,
        only_disarmed: bool,
    ) {
        let snapshot = {
            let mut state = registration.state.lock().await;
            if only_disarmed && *state != RegistrationState::Disarmed {
                return;
            }
            if matches!(*state, RegistrationState::Armed(_)) {
                *state = RegistrationState::Fired;
            }
            *state = RegistrationState::Rearming;

            match self.arm(&registration).await {
                Ok((watch, snapshot)) => {
                    *state = RegistrationState::Armed(watch);
                    trace!(path = %registration.path, ?watch, "watch re-armed");
                    snapshot
                }
                Err(e) => {
                    *state = RegistrationState::Disarmed;
                    warn!(path = %registration.path, kind = ?registration.kind, "re-arming watch failed: {}", e);
                    return;
                }
            }
        };

        self.deliver(&registration, snapshot).await;
    }

    async fn deliver(
        &self,
        registration: &Registration,
        snapshot: Snapshot,
    ) {
        let listeners: Vec<Listener> = registration.listeners.read().iter().map(|(_, l)| l.clone()).collect();
        let path = registration.path.as_str();

        for listener in listeners {
            if self.shutdown.is_cancelled() {
                return;
            }
            let result = match (&listener, &snapshot) {
                (Listener::Data(l), Snapshot::Data(Some(data))) => guarded(l.data_changed(path, data.clone())).await,
                (Listener::Data(l), Snapshot::Data(None)) => guarded(l.data_deleted(path)).await,
                (Listener::Child(l), Snapshot::Children(children)) => {
                    guarded(l.handle_child_change(path, children.clone())).await
                }
                _ => Ok(()),
            };
            if let Err(e) = result {
                warn!(path, "watch listener failed: {}", e);
            }
        }
    }

    async fn deliver_state(
        &self,
        notification: &Notification,
    ) {
        let listeners: Vec<Arc<dyn StateListener>> =
            self.state_listeners.read().iter().map(|(_, l)| l.clone()).collect();

        for listener in listeners {
            if self.shutdown.is_cancelled() {
                return;
            }
            let result = match notification {
                Notification::State(state) => guarded(listener.handle_state_changed(*state)).await,
                Notification::NewSession(session_id) => guarded(listener.handle_new_session(*session_id)).await,
                Notification::Watch(_) => Ok(()),
            };
            if let Err(e) = result {
                warn!("state listener failed: {}", e);
            }
        }
    }

    async fn on_watch_event(
        &self,
        event: WatchEvent,
    ) {
        let kinds: &[ListenerKind] = match EventType::try_from(event.event_type) {
            Ok(EventType::NodeCreated) | Ok(EventType::NodeDeleted) => {
                &[ListenerKind::DataChange, ListenerKind::ChildChange]
            }
            Ok(EventType::NodeDataChanged) => &[ListenerKind::DataChange],
            Ok(EventType::NodeChildrenChanged) => &[ListenerKind::ChildChange],
            Ok(EventType::None) | Err(_) => {
                debug!(path = %event.path, event_type = event.event_type, "ignoring watch event");
                return;
            }
        };

        for kind in kinds {
            if let Some(registration) = self.registration(&event.path, *kind) {
                self.refresh(registration, false).await;
            }
        }
    }

    /// Re-arms registrations and delivers the current state of their nodes.
    async fn rearm_registrations(
        &self,
        only_disarmed: bool,
    ) {
        let registrations: Vec<Arc<Registration>> = self.registrations.iter().map(|r| r.value().clone()).collect();
        for registration in registrations {
            if self.shutdown.is_cancelled() {
                return;
            }
            self.refresh(registration, only_disarmed).await;
        }
    }

    async fn handle(
        &self,
        notification: Notification,
    ) {
        match notification {
            Notification::Watch(event) => self.on_watch_event(event).await,
            Notification::State(state) => {
                if state == SessionState::Connected {
                    self.rearm_registrations(true).await;
                }
                self.deliver_state(&Notification::State(state)).await;
            }
            Notification::NewSession(session_id) => {
                debug!(session_id, "new session, re-arming all watches");
                self.rearm_registrations(false).await;
                self.deliver_state(&Notification::NewSession(session_id)).await;
            }
        }
    }
}

/// Runs a listener callback, turning a panic into an error.
async fn guarded<F>(callback: F) -> ListenerResult
where
    F: std::future::Future<Output = ListenerResult>,
{
    match AssertUnwindSafe(callback).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            error!("watch listener panicked");
            Err("listener panicked".into())
        }
    }
}

async fn run_dispatcher(
    inner: Arc<RegistryInner>,
    mut notify_rx: mpsc::UnboundedReceiver<Notification>,
) {
    loop {
        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => {
                debug!("watch dispatcher stopped");
                break;
            }
            notification = notify_rx.recv() => match notification {
                Some(notification) => inner.handle(notification).await,
                None => break,
            }
        }
    }
}
