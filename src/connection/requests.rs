//! Typed node requests on top of [`ConnectionManager::execute`].
//!
//! Each operation validates its path, sends one request and maps the reply
//! code onto the crate error types. Reads are resent after a transport loss;
//! writes report [`ConnectionError::ConnectionLoss`](crate::ConnectionError::ConnectionLoss)
//! instead, since the ensemble may already have applied them.

use autometrics::autometrics;
use bytes::Bytes;

use super::ConnectionManager;
use super::OnLoss;
use crate::constants::ANY_VERSION;
use crate::node::path;
use crate::proto;
use crate::proto::CreateRequest;
use crate::proto::DeleteRequest;
use crate::proto::ErrorCode;
use crate::proto::ExistsRequest;
use crate::proto::GetChildrenRequest;
use crate::proto::GetDataRequest;
use crate::proto::SetDataRequest;
use crate::CreateMode;
use crate::Result;
use crate::Stat;
use crate::API_SLO;

impl ConnectionManager {
    /// Creates a node and returns the path the ensemble assigned.
    #[autometrics(objective = API_SLO)]
    pub(crate) async fn create(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
    ) -> Result<(String, Stat)> {
        path::validate_create(path, mode.is_sequential())?;
        let request = CreateRequest {
            header: None,
            path: path.to_string(),
            data,
            mode: proto::CreateMode::from(mode) as i32,
        };
        let (code, reply) = self
            .execute("create", OnLoss::Report, request, |mut client, request| async move {
                client.create(request).await
            })
            .await?;
        code.into_result(path, ANY_VERSION, self.session_id())?;
        Ok((reply.path, reply.stat.map(Stat::from).unwrap_or_default()))
    }

    /// Deletes a node; `version` of -1 matches any version.
    #[autometrics(objective = API_SLO)]
    pub(crate) async fn delete(
        &self,
        path: &str,
        version: i32,
    ) -> Result<()> {
        path::validate(path)?;
        let request = DeleteRequest {
            header: None,
            path: path.to_string(),
            version,
        };
        let (code, _) = self
            .execute("delete", OnLoss::Report, request, |mut client, request| async move {
                client.delete(request).await
            })
            .await?;
        code.into_result(path, version, self.session_id())
    }

    /// Stat of the node, `None` when absent.
    ///
    /// With `watch` set the ensemble arms a data watch on an existing node and
    /// an existence watch on an absent one.
    #[autometrics(objective = API_SLO)]
    pub(crate) async fn exists(
        &self,
        path: &str,
        watch: bool,
    ) -> Result<Option<Stat>> {
        path::validate(path)?;
        let request = ExistsRequest {
            header: None,
            path: path.to_string(),
            watch,
        };
        let (code, reply) = self
            .execute("exists", OnLoss::Retry, request, |mut client, request| async move {
                client.exists(request).await
            })
            .await?;
        if code == ErrorCode::NoNode {
            return Ok(None);
        }
        code.into_result(path, ANY_VERSION, self.session_id())?;
        Ok(reply.stat.map(Stat::from))
    }

    #[autometrics(objective = API_SLO)]
    pub(crate) async fn get_data(
        &self,
        path: &str,
        watch: bool,
    ) -> Result<(Bytes, Stat)> {
        path::validate(path)?;
        let request = GetDataRequest {
            header: None,
            path: path.to_string(),
            watch,
        };
        let (code, reply) = self
            .execute("get_data", OnLoss::Retry, request, |mut client, request| async move {
                client.get_data(request).await
            })
            .await?;
        code.into_result(path, ANY_VERSION, self.session_id())?;
        Ok((reply.data, reply.stat.map(Stat::from).unwrap_or_default()))
    }

    #[autometrics(objective = API_SLO)]
    pub(crate) async fn set_data(
        &self,
        path: &str,
        data: Bytes,
        version: i32,
    ) -> Result<Stat> {
        path::validate(path)?;
        let request = SetDataRequest {
            header: None,
            path: path.to_string(),
            data,
            version,
        };
        let (code, reply) = self
            .execute("set_data", OnLoss::Report, request, |mut client, request| async move {
                client.set_data(request).await
            })
            .await?;
        code.into_result(path, version, self.session_id())?;
        Ok(reply.stat.map(Stat::from).unwrap_or_default())
    }

    #[autometrics(objective = API_SLO)]
    pub(crate) async fn get_children(
        &self,
        path: &str,
        watch: bool,
    ) -> Result<(Vec<String>, Stat)> {
        path::validate(path)?;
        let request = GetChildrenRequest {
            header: None,
            path: path.to_string(),
            watch,
        };
        let (code, reply) = self
            .execute("get_children", OnLoss::Retry, request, |mut client, request| async move {
                client.get_children(request).await
            })
            .await?;
        code.into_result(path, ANY_VERSION, self.session_id())?;
        Ok((reply.children, reply.stat.map(Stat::from).unwrap_or_default()))
    }
}
