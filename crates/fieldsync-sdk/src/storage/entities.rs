//! 存储实体定义

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{FieldSyncError, Result};
use crate::utils::{now_millis, GeoCoordinate};

/// 工作项/队列条目所属类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Photo,
    Task,
    /// 项目级操作（owner 本身）
    Project,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Photo => "photo",
            ItemType::Task => "task",
            ItemType::Project => "project",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = FieldSyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "photo" => Ok(ItemType::Photo),
            "task" => Ok(ItemType::Task),
            "project" => Ok(ItemType::Project),
            other => Err(FieldSyncError::Database(format!("未知的 item_type: {}", other))),
        }
    }
}

/// 队列动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Create => "create",
            SyncAction::Update => "update",
            SyncAction::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAction {
    type Err = FieldSyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(SyncAction::Create),
            "update" => Ok(SyncAction::Update),
            "delete" => Ok(SyncAction::Delete),
            other => Err(FieldSyncError::Database(format!("未知的 action: {}", other))),
        }
    }
}

/// 工作项同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    Syncing,
    Synced,
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
            SyncState::Error => "error",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = FieldSyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SyncState::Pending),
            "syncing" => Ok(SyncState::Syncing),
            "synced" => Ok(SyncState::Synced),
            "error" => Ok(SyncState::Error),
            other => Err(FieldSyncError::Database(format!("未知的 sync_state: {}", other))),
        }
    }
}

/// 工作项元数据（照片说明、尺寸、拍摄时间、坐标）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItemMetadata {
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// 拍摄时间（UTC 毫秒）
    pub captured_at: i64,
    #[serde(default)]
    pub coordinate: Option<GeoCoordinate>,
}

/// 工作项（照片或任务）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// 本地生成的稳定 ID
    pub id: String,
    /// 所属项目/待办分组
    pub owner_id: String,
    pub item_type: ItemType,
    /// 二进制内容（照片字节等）
    #[serde(skip)]
    pub data: Vec<u8>,
    pub metadata: WorkItemMetadata,
    pub sync_state: SyncState,
    pub sync_error: Option<String>,
    /// 同步成功后服务端返回的 ID，仅在 synced 状态下存在
    pub remote_id: Option<String>,
    pub retry_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl WorkItem {
    pub fn new(
        owner_id: impl Into<String>,
        item_type: ItemType,
        data: Vec<u8>,
        metadata: WorkItemMetadata,
    ) -> Self {
        let now = now_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            item_type,
            data,
            metadata,
            sync_state: SyncState::Pending,
            sync_error: None,
            remote_id: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.sync_state == SyncState::Synced
    }
}

/// 队列条目中携带的工作项快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemSyncPayload {
    #[serde(default)]
    pub metadata: Option<WorkItemMetadata>,
    /// update/delete 需要的服务端 ID
    #[serde(default)]
    pub remote_id: Option<String>,
}

impl ItemSyncPayload {
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// 确定性队列条目 ID：sha256("{item_type}:{local_id}:{action}")
///
/// 同一逻辑操作重复入队会落到同一条目上（幂等 upsert），
/// 同时作为服务端的 Idempotency-Key。
pub fn queue_entry_id(item_type: ItemType, local_id: &str, action: SyncAction) -> String {
    let mut hasher = Sha256::new();
    hasher.update(item_type.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(local_id.as_bytes());
    hasher.update(b":");
    hasher.update(action.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// 同步队列条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    pub id: String,
    pub item_type: ItemType,
    pub local_id: String,
    pub owner_id: String,
    pub action: SyncAction,
    pub payload: serde_json::Value,
    pub retry_count: u32,
    pub last_attempt_at: Option<i64>,
    pub error: Option<String>,
    pub created_at: i64,
    /// 每次 upsert 刷新；用于判断处理期间条目是否被改写
    pub updated_at: i64,
}

impl SyncQueueEntry {
    pub fn new(
        item_type: ItemType,
        local_id: impl Into<String>,
        owner_id: impl Into<String>,
        action: SyncAction,
        payload: serde_json::Value,
    ) -> Self {
        let local_id = local_id.into();
        let now = now_millis();
        Self {
            id: queue_entry_id(item_type, &local_id, action),
            item_type,
            local_id,
            owner_id: owner_id.into(),
            action,
            payload,
            retry_count: 0,
            last_attempt_at: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn sync_payload(&self) -> ItemSyncPayload {
        ItemSyncPayload::from_value(&self.payload)
    }
}

/// 定位采样记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub id: i64,
    pub coordinate: GeoCoordinate,
    /// 精度（米）
    pub accuracy: f64,
    pub recorded_at: i64,
    pub forwarded: bool,
}

/// 级联删除结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub items_deleted: usize,
    pub entries_deleted: usize,
}

/// 本地存储统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued_entries: usize,
    pub items_pending: usize,
    pub items_syncing: usize,
    pub items_synced: usize,
    pub items_error: usize,
    pub unforwarded_locations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_entry_id_is_deterministic() {
        let a = queue_entry_id(ItemType::Photo, "local-1", SyncAction::Create);
        let b = queue_entry_id(ItemType::Photo, "local-1", SyncAction::Create);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        assert_ne!(a, queue_entry_id(ItemType::Photo, "local-1", SyncAction::Update));
        assert_ne!(a, queue_entry_id(ItemType::Task, "local-1", SyncAction::Create));
        assert_ne!(a, queue_entry_id(ItemType::Photo, "local-2", SyncAction::Create));
    }

    #[test]
    fn test_enum_string_mapping() {
        for state in [SyncState::Pending, SyncState::Syncing, SyncState::Synced, SyncState::Error] {
            assert_eq!(state.as_str().parse::<SyncState>().unwrap(), state);
        }
        assert!("bogus".parse::<SyncAction>().is_err());
        assert_eq!("project".parse::<ItemType>().unwrap(), ItemType::Project);
    }

    #[test]
    fn test_payload_tolerates_foreign_json() {
        let payload = ItemSyncPayload::from_value(&serde_json::json!("not an object"));
        assert_eq!(payload, ItemSyncPayload::default());

        let payload = ItemSyncPayload::from_value(&serde_json::json!({ "remote_id": "r-9" }));
        assert_eq!(payload.remote_id.as_deref(), Some("r-9"));
    }
}
