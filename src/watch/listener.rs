use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tonic::async_trait;

use crate::NodeCodec;
use crate::SessionState;

/// Outcome of a listener callback. Failures are logged by the dispatcher and
/// never stop delivery to other listeners.
pub type ListenerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Permanent listener for the data of one node.
#[async_trait]
pub trait DataListener<T>: Send + Sync + 'static {
    /// The node was created or its data changed; `data` is the decoded new value.
    async fn handle_data_change(
        &self,
        path: &str,
        data: T,
    ) -> ListenerResult;

    async fn handle_data_deleted(
        &self,
        path: &str,
    ) -> ListenerResult;
}

/// Permanent listener for the child list of one node.
#[async_trait]
pub trait ChildListener: Send + Sync + 'static {
    /// `children` is `None` when the parent node no longer exists.
    async fn handle_child_change(
        &self,
        parent_path: &str,
        children: Option<HashSet<String>>,
    ) -> ListenerResult;
}

/// Listener for session state transitions.
#[async_trait]
pub trait StateListener: Send + Sync + 'static {
    async fn handle_state_changed(
        &self,
        state: SessionState,
    ) -> ListenerResult;

    /// A fresh session replaced an expired one; watches have been re-armed.
    async fn handle_new_session(
        &self,
        _session_id: i64,
    ) -> ListenerResult {
        Ok(())
    }
}

/// Data listener working on payload bytes, before decoding.
#[async_trait]
pub(crate) trait RawDataListener: Send + Sync + 'static {
    async fn data_changed(
        &self,
        path: &str,
        data: Bytes,
    ) -> ListenerResult;

    async fn data_deleted(
        &self,
        path: &str,
    ) -> ListenerResult;
}

/// Decodes payloads with the client codec before handing them to a typed listener.
pub(crate) struct DecodingListener<C, T, L> {
    codec: Arc<C>,
    listener: Arc<L>,
    _value: PhantomData<fn() -> T>,
}

impl<C, T, L> DecodingListener<C, T, L> {
    pub(crate) fn new(
        codec: Arc<C>,
        listener: Arc<L>,
    ) -> Self {
        Self {
            codec,
            listener,
            _value: PhantomData,
        }
    }
}

#[async_trait]
impl<C, T, L> RawDataListener for DecodingListener<C, T, L>
where
    C: NodeCodec,
    T: DeserializeOwned + Send + 'static,
    L: DataListener<T>,
{
    async fn data_changed(
        &self,
        path: &str,
        data: Bytes,
    ) -> ListenerResult {
        let value: T = self.codec.decode(&data)?;
        self.listener.handle_data_change(path, value).await
    }

    async fn data_deleted(
        &self,
        path: &str,
    ) -> ListenerResult {
        self.listener.handle_data_deleted(path).await
    }
}

/// A listener attached to a watch registration.
#[derive(Clone)]
pub(crate) enum Listener {
    Data(Arc<dyn RawDataListener>),
    Child(Arc<dyn ChildListener>),
}
