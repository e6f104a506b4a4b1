use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use tonic::async_trait;

use crate::ConnectionManager;
use crate::Result;
use crate::WatchRearm;

/// Points at the connection manager currently serving the client.
///
/// [`reconnect`](crate::ZkClient::reconnect) swaps in a manager holding a
/// fresh session; watch re-arming always goes through the current one.
pub(crate) struct SessionLink {
    current: ArcSwap<ConnectionManager>,
}

impl SessionLink {
    pub(crate) fn new(manager: ConnectionManager) -> Self {
        Self {
            current: ArcSwap::from_pointee(manager),
        }
    }

    pub(crate) fn manager(&self) -> Arc<ConnectionManager> {
        self.current.load_full()
    }

    /// Installs `manager` and returns the one it replaced.
    pub(crate) fn replace(
        &self,
        manager: ConnectionManager,
    ) -> Arc<ConnectionManager> {
        self.current.swap(Arc::new(manager))
    }
}

#[async_trait]
impl WatchRearm for SessionLink {
    async fn rearm_data(
        &self,
        path: &str,
    ) -> Result<Option<Bytes>> {
        let manager = self.manager();
        loop {
            match manager.get_data(path, true).await {
                Ok((data, _)) => return Ok(Some(data)),
                Err(e) if e.is_no_node() => {}
                Err(e) => return Err(e),
            }
            // absent: watch for its creation, unless it was created meanwhile
            if manager.exists(path, true).await?.is_none() {
                return Ok(None);
            }
        }
    }

    async fn rearm_children(
        &self,
        path: &str,
    ) -> Result<Option<Vec<String>>> {
        let manager = self.manager();
        loop {
            match manager.get_children(path, true).await {
                Ok((children, _)) => return Ok(Some(children)),
                Err(e) if e.is_no_node() => {}
                Err(e) => return Err(e),
            }
            if manager.exists(path, true).await?.is_none() {
                return Ok(None);
            }
        }
    }
}
