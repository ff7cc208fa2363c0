//! 远端接口边界
//!
//! 同步处理器、打卡流程和定位记录都只依赖 `RemoteApi`，
//! 生产环境使用 `crate::http_client::HttpRemoteApi`。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::clock::ClockKind;
use crate::error::Result;
use crate::storage::entities::{ItemType, SyncAction, SyncQueueEntry};
use crate::utils::GeoCoordinate;

/// 工作项上传请求
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    /// 队列条目 ID，作为 Idempotency-Key 发送
    pub idempotency_key: String,
    pub item_type: ItemType,
    pub action: SyncAction,
    pub local_id: String,
    pub owner_id: String,
    /// update/delete 必须携带
    pub remote_id: Option<String>,
    pub payload: serde_json::Value,
    /// 照片等二进制内容
    pub data: Option<Vec<u8>>,
}

impl UploadRequest {
    pub fn from_entry(entry: &SyncQueueEntry, data: Option<Vec<u8>>) -> Self {
        Self {
            idempotency_key: entry.id.clone(),
            item_type: entry.item_type,
            action: entry.action,
            local_id: entry.local_id.clone(),
            owner_id: entry.owner_id.clone(),
            remote_id: entry.sync_payload().remote_id,
            payload: entry.payload.clone(),
            data,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(default)]
    pub remote_id: Option<String>,
}

/// POST clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockRequest {
    #[serde(rename = "type")]
    pub kind: ClockKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub accuracy: f64,
}

impl ClockRequest {
    pub fn new(kind: ClockKind, project_id: Option<String>, coordinate: GeoCoordinate, accuracy: f64) -> Self {
        Self {
            kind,
            project_id,
            lat: coordinate.latitude,
            lng: coordinate.longitude,
            accuracy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockStatusResponse {
    pub is_clocked_in: bool,
}

/// GET boundary/{id}
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryInfo {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
}

/// POST location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPost {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: f64,
    pub recorded_at: i64,
}

impl LocationPost {
    pub fn new(coordinate: GeoCoordinate, accuracy: f64, recorded_at: i64) -> Self {
        Self {
            lat: coordinate.latitude,
            lng: coordinate.longitude,
            accuracy,
            recorded_at,
        }
    }
}

/// 远端接口；每个调用都应带超时，超时按瞬时失败处理
#[async_trait]
pub trait RemoteApi: Send + Sync + std::fmt::Debug {
    /// POST|PUT|DELETE items/{itemType}
    async fn upload_item(&self, request: &UploadRequest) -> Result<UploadResponse>;

    /// POST clock；服务端返回 ok=false 视为拒绝（永久失败）
    async fn clock(&self, request: &ClockRequest) -> Result<()>;

    /// GET clock/status
    async fn clock_status(&self) -> Result<bool>;

    /// GET boundary/{id}
    async fn boundary_info(&self, boundary_id: &str) -> Result<BoundaryInfo>;

    /// POST location
    async fn post_location(&self, post: &LocationPost) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shapes() {
        let req = ClockRequest::new(ClockKind::ClockIn, Some("proj-1".into()), GeoCoordinate::new(1.5, -2.5), 8.0);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "clock_in");
        assert_eq!(json["projectId"], "proj-1");
        assert_eq!(json["lng"], -2.5);

        let out = ClockRequest::new(ClockKind::ClockOut, None, GeoCoordinate::new(0.0, 0.0), 5.0);
        assert!(serde_json::to_value(&out).unwrap().get("projectId").is_none());

        let info: BoundaryInfo = serde_json::from_str(r#"{"projectId":"p","projectName":"Harbor Deck"}"#).unwrap();
        assert_eq!(info.project_name.as_deref(), Some("Harbor Deck"));

        let status: ClockStatusResponse = serde_json::from_str(r#"{"isClockedIn":true}"#).unwrap();
        assert!(status.is_clocked_in);

        let post = serde_json::to_value(LocationPost::new(GeoCoordinate::new(3.0, 4.0), 10.0, 99)).unwrap();
        assert_eq!(post["recordedAt"], 99);
    }
}
