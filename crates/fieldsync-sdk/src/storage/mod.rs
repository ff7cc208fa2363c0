//! 本地持久化存储
//!
//! 本模块提供：
//! - 工作项（照片/任务）与同步队列的 SQLite 存储（refinery 管理 schema）
//! - 每个逻辑操作一个事务：工作项更新与对应入队要么同时生效要么都不生效
//! - 按 owner 级联删除
//! - 基于 sled 的 KV 存储（打卡重试队列等小体量状态）
//!
//! 存储失败以类型化错误直接返回给调用方，本模块不做重试。

pub mod entities;
pub mod migrate;
pub mod dao;
pub mod kv;
pub mod queue;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{FieldSyncError, Result};
use crate::utils::{now_millis, GeoCoordinate};
use dao::{DaoFactory, TransactionManager};
use entities::{
    CascadeReport, ItemSyncPayload, ItemType, LocationSample, QueueStats, SyncAction,
    SyncQueueEntry, SyncState, WorkItem,
};

pub use kv::{KvStore, KvTree};

const DB_FILE_NAME: &str = "fieldsync.db";

/// create 已被服务端接受但条目在处理期间被改写：
/// 后续工作改为携带 remote_id 的 update；工作项已被删除时改为 delete。
fn carry_remote_id(conn: &Connection, created: &SyncQueueEntry, remote_id: &str) -> Result<()> {
    let queue = DaoFactory::sync_queue_dao(conn);
    let follow_up = match queue.get(&created.id)? {
        Some(refreshed) => {
            queue.remove(&refreshed.id)?;
            let mut payload = refreshed.sync_payload();
            payload.remote_id = Some(remote_id.to_string());
            SyncQueueEntry {
                id: entities::queue_entry_id(refreshed.item_type, &refreshed.local_id, SyncAction::Update),
                action: SyncAction::Update,
                payload: payload.to_value()?,
                ..refreshed
            }
        }
        None if DaoFactory::work_item_dao(conn).get(&created.local_id)?.is_none() => {
            let payload = ItemSyncPayload { metadata: None, remote_id: Some(remote_id.to_string()) }.to_value()?;
            SyncQueueEntry::new(created.item_type, &created.local_id, &created.owner_id, SyncAction::Delete, payload)
        }
        None => return Ok(()),
    };
    debug!("create 已被接受，后续改为 {}: local_id={}", follow_up.action, follow_up.local_id);
    queue.upsert(&follow_up)
}

/// 本地存储：唯一直接接触设备存储的组件
#[derive(Debug, Clone)]
pub struct LocalStore {
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl LocalStore {
    /// 在 `data_dir` 下打开（或创建）数据库并执行迁移
    pub async fn open(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await
            .map_err(|e| FieldSyncError::IO(format!("创建数据目录失败: {}", e)))?;

        let db_path = data_dir.join(DB_FILE_NAME);
        let mut conn = Connection::open(&db_path)
            .map_err(|e| FieldSyncError::Database(format!("打开数据库失败: {}", e)))?;
        migrate::init_db(&mut conn)?;

        info!("本地存储初始化完成: {}", db_path.display());

        Ok(Self {
            db_path: Some(db_path),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 内存数据库（测试与临时会话）
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrate::init_db(&mut conn)?;
        Ok(Self {
            db_path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    // ---------------------------------------------------------------
    // 工作项
    // ---------------------------------------------------------------

    pub async fn put(&self, item: &WorkItem) -> Result<()> {
        let conn = self.conn.lock().await;
        DaoFactory::work_item_dao(&conn).upsert(item)
    }

    pub async fn get(&self, id: &str) -> Result<Option<WorkItem>> {
        let conn = self.conn.lock().await;
        DaoFactory::work_item_dao(&conn).get(id)
    }

    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WorkItem>> {
        let conn = self.conn.lock().await;
        DaoFactory::work_item_dao(&conn).list_by_owner(owner_id)
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        DaoFactory::work_item_dao(&conn).delete(id)
    }

    /// 保存工作项并入队（单事务）
    ///
    /// 之前已同步过的工作项入队 update（remote_id 转存到队列 payload），
    /// 否则入队 create。返回最终落库的队列条目。
    pub async fn save_and_enqueue(&self, item: &WorkItem) -> Result<SyncQueueEntry> {
        let conn = self.conn.lock().await;
        let entry = TransactionManager::new(&conn).execute(|conn| {
            let items = DaoFactory::work_item_dao(conn);
            let queue = DaoFactory::sync_queue_dao(conn);

            let existing = items.get(&item.id)?;
            let pending_update_remote = queue
                .get(&entities::queue_entry_id(item.item_type, &item.id, SyncAction::Update))?
                .and_then(|e| e.sync_payload().remote_id);
            let remote_id = existing
                .as_ref()
                .and_then(|e| e.remote_id.clone())
                .or(pending_update_remote)
                .or_else(|| item.remote_id.clone());

            let action = if remote_id.is_some() { SyncAction::Update } else { SyncAction::Create };

            let now = now_millis();
            let mut stored = item.clone();
            stored.sync_state = SyncState::Pending;
            stored.sync_error = None;
            stored.remote_id = None;
            stored.updated_at = now;
            if let Some(existing) = &existing {
                stored.created_at = existing.created_at;
                stored.retry_count = existing.retry_count;
            }
            items.upsert(&stored)?;

            let payload = ItemSyncPayload {
                metadata: Some(stored.metadata.clone()),
                remote_id,
            }
            .to_value()?;
            let entry = SyncQueueEntry::new(stored.item_type, &stored.id, &stored.owner_id, action, payload);
            queue.upsert(&entry)?;

            queue.get(&entry.id)?.ok_or_else(|| {
                FieldSyncError::Database(format!("入队后未找到条目: {}", entry.id))
            })
        })?;

        debug!("工作项已保存并入队: local_id={}, action={}", entry.local_id, entry.action);
        Ok(entry)
    }

    /// 删除工作项并入队 delete（单事务）
    ///
    /// 从未同步过的工作项只需丢弃其排队操作，返回 None。
    pub async fn delete_and_enqueue(&self, id: &str) -> Result<Option<SyncQueueEntry>> {
        let conn = self.conn.lock().await;
        TransactionManager::new(&conn).execute(|conn| {
            let items = DaoFactory::work_item_dao(conn);
            let queue = DaoFactory::sync_queue_dao(conn);

            let item = items
                .get(id)?
                .ok_or_else(|| FieldSyncError::NotFound(format!("工作项不存在: {}", id)))?;

            let pending_update_remote = queue
                .get(&entities::queue_entry_id(item.item_type, id, SyncAction::Update))?
                .and_then(|e| e.sync_payload().remote_id);
            let remote_id = item.remote_id.clone().or(pending_update_remote);

            items.delete(id)?;
            queue.delete_by_local_id(id)?;

            let Some(remote_id) = remote_id else {
                return Ok(None);
            };

            let payload = ItemSyncPayload { metadata: None, remote_id: Some(remote_id) }.to_value()?;
            let entry = SyncQueueEntry::new(item.item_type, id, &item.owner_id, SyncAction::Delete, payload);
            queue.upsert(&entry)?;
            queue.get(&entry.id)
        })
    }

    /// 按 owner 级联删除：工作项及所有引用它们或 owner 本身的队列条目
    pub async fn delete_owner(&self, owner_id: &str) -> Result<CascadeReport> {
        let conn = self.conn.lock().await;
        let report = TransactionManager::new(&conn).execute(|conn| {
            let items = DaoFactory::work_item_dao(conn);
            let queue = DaoFactory::sync_queue_dao(conn);

            let ids = items.list_ids_by_owner(owner_id)?;
            let entries_deleted = queue.delete_for_owner(owner_id, &ids)?;
            let items_deleted = items.delete_by_owner(owner_id)?;
            Ok(CascadeReport { items_deleted, entries_deleted })
        })?;

        info!(
            "级联删除 owner={}: items={}, queue_entries={}",
            owner_id, report.items_deleted, report.entries_deleted
        );
        Ok(report)
    }

    // ---------------------------------------------------------------
    // 同步队列
    // ---------------------------------------------------------------

    /// 幂等 upsert（确定性 ID 冲突时保留 created_at 与 retry_count）
    pub async fn enqueue(&self, entry: &SyncQueueEntry) -> Result<()> {
        let conn = self.conn.lock().await;
        DaoFactory::sync_queue_dao(&conn).upsert(entry)
    }

    pub async fn get_entry(&self, id: &str) -> Result<Option<SyncQueueEntry>> {
        let conn = self.conn.lock().await;
        DaoFactory::sync_queue_dao(&conn).get(id)
    }

    pub async fn list_pending(&self) -> Result<Vec<SyncQueueEntry>> {
        let conn = self.conn.lock().await;
        DaoFactory::sync_queue_dao(&conn).list_pending()
    }

    pub async fn remove(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        DaoFactory::sync_queue_dao(&conn).remove(id)
    }

    /// 处理开始：工作项置为 syncing，记录尝试时间
    pub async fn mark_syncing(&self, entry: &SyncQueueEntry) -> Result<()> {
        let conn = self.conn.lock().await;
        TransactionManager::new(&conn).execute(|conn| {
            DaoFactory::sync_queue_dao(conn).touch_attempt(&entry.id)?;
            if entry.action != SyncAction::Delete {
                DaoFactory::work_item_dao(conn).set_state(&entry.local_id, SyncState::Syncing, None)?;
            }
            Ok(())
        })
    }

    /// 服务端确认成功
    ///
    /// 条目在处理期间被重新入队（本地再次编辑）时保留条目，工作项维持 pending，
    /// 返回 false；否则删除条目、工作项置为 synced，返回 true。
    pub async fn complete_entry(&self, entry: &SyncQueueEntry, remote_id: Option<&str>) -> Result<bool> {
        let conn = self.conn.lock().await;
        TransactionManager::new(&conn).execute(|conn| {
            let queue = DaoFactory::sync_queue_dao(conn);
            if !queue.remove_if_unchanged(&entry.id, entry.updated_at)? {
                debug!("队列条目处理期间被改写，保留: id={}", entry.id);
                if let (SyncAction::Create, Some(remote_id)) = (entry.action, remote_id) {
                    carry_remote_id(conn, entry, remote_id)?;
                }
                return Ok(false);
            }
            if entry.action != SyncAction::Delete {
                let remote_id = remote_id.ok_or_else(|| {
                    FieldSyncError::InvalidArgument(format!("{} 成功但缺少 remote_id", entry.action))
                })?;
                DaoFactory::work_item_dao(conn).mark_synced(&entry.local_id, remote_id)?;
            }
            Ok(true)
        })
    }

    /// 瞬时失败：条目保留并累加重试次数，工作项置为 error
    pub async fn record_transient_failure(&self, entry: &SyncQueueEntry, error: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        TransactionManager::new(&conn).execute(|conn| {
            DaoFactory::sync_queue_dao(conn).record_failure(&entry.id, error)?;
            if entry.action != SyncAction::Delete {
                DaoFactory::work_item_dao(conn).record_failure(&entry.local_id, error)?;
            }
            Ok(())
        })
    }

    /// 永久失败：删除条目，工作项置为 error，不再重试
    pub async fn fail_entry_permanently(&self, entry: &SyncQueueEntry, error: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        TransactionManager::new(&conn).execute(|conn| {
            DaoFactory::sync_queue_dao(conn).remove(&entry.id)?;
            if entry.action != SyncAction::Delete {
                DaoFactory::work_item_dao(conn).set_state(&entry.local_id, SyncState::Error, Some(error))?;
            }
            Ok(())
        })
    }

    // ---------------------------------------------------------------
    // 定位采样
    // ---------------------------------------------------------------

    pub async fn append_location(&self, coordinate: &GeoCoordinate, accuracy: f64, recorded_at: i64) -> Result<i64> {
        let conn = self.conn.lock().await;
        DaoFactory::location_dao(&conn).append(coordinate, accuracy, recorded_at)
    }

    pub async fn list_unforwarded_locations(&self, limit: usize) -> Result<Vec<LocationSample>> {
        let conn = self.conn.lock().await;
        DaoFactory::location_dao(&conn).list_unforwarded(limit)
    }

    pub async fn mark_location_forwarded(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        DaoFactory::location_dao(&conn).mark_forwarded(id)
    }

    // ---------------------------------------------------------------
    // 统计
    // ---------------------------------------------------------------

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        let conn = self.conn.lock().await;
        let items = DaoFactory::work_item_dao(&conn);
        Ok(QueueStats {
            queued_entries: DaoFactory::sync_queue_dao(&conn).count()?,
            items_pending: items.count_by_state(SyncState::Pending)?,
            items_syncing: items.count_by_state(SyncState::Syncing)?,
            items_synced: items.count_by_state(SyncState::Synced)?,
            items_error: items.count_by_state(SyncState::Error)?,
            unforwarded_locations: DaoFactory::location_dao(&conn).count_unforwarded()?,
        })
    }
}

/// 构造项目级（owner 本身）的队列条目
pub fn project_entry(owner_id: &str, action: SyncAction, payload: serde_json::Value) -> SyncQueueEntry {
    SyncQueueEntry::new(ItemType::Project, owner_id, owner_id, action, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use entities::WorkItemMetadata;
    use tempfile::TempDir;

    fn photo(owner: &str) -> WorkItem {
        WorkItem::new(
            owner,
            ItemType::Photo,
            vec![0xFF, 0xD8, 0xFF],
            WorkItemMetadata {
                caption: Some("north wall".to_string()),
                width: Some(4032),
                height: Some(3024),
                captured_at: now_millis(),
                coordinate: Some(GeoCoordinate::new(47.61, -122.33)),
            },
        )
    }

    #[tokio::test]
    async fn test_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let item = photo("project-1");
        {
            let store = LocalStore::open(temp_dir.path()).await.unwrap();
            store.save_and_enqueue(&item).await.unwrap();
        }

        let store = LocalStore::open(temp_dir.path()).await.unwrap();
        let loaded = store.get(&item.id).await.unwrap().unwrap();
        assert_eq!(loaded.data, item.data);
        assert_eq!(loaded.metadata, item.metadata);
        assert_eq!(loaded.sync_state, SyncState::Pending);
        assert_eq!(store.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_enqueue_collapses_into_one_entry() {
        let store = LocalStore::open_in_memory().unwrap();

        let first = SyncQueueEntry::new(ItemType::Task, "local-1", "p", SyncAction::Create, serde_json::json!({"v": 1}));
        store.enqueue(&first).await.unwrap();

        for v in 2..=5 {
            let mut again = SyncQueueEntry::new(ItemType::Task, "local-1", "p", SyncAction::Create, serde_json::json!({"v": v}));
            again.created_at = first.created_at + 10_000 * v;
            again.retry_count = 9;
            store.enqueue(&again).await.unwrap();
        }

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);
        assert_eq!(pending[0].created_at, first.created_at);
        assert_eq!(pending[0].retry_count, 0);
        assert_eq!(pending[0].payload, serde_json::json!({"v": 5}));
    }

    #[tokio::test]
    async fn test_list_pending_is_creation_ordered() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut b = SyncQueueEntry::new(ItemType::Task, "b", "p", SyncAction::Create, serde_json::json!({}));
        b.created_at = 2_000;
        let mut a = SyncQueueEntry::new(ItemType::Task, "a", "p", SyncAction::Create, serde_json::json!({}));
        a.created_at = 1_000;
        let mut c = SyncQueueEntry::new(ItemType::Task, "c", "p", SyncAction::Create, serde_json::json!({}));
        c.created_at = 2_000;

        store.enqueue(&b).await.unwrap();
        store.enqueue(&a).await.unwrap();
        store.enqueue(&c).await.unwrap();

        let order: Vec<String> = store.list_pending().await.unwrap().into_iter().map(|e| e.local_id).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_round_trip_and_local_edit() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut item = photo("project-1");

        let entry = store.save_and_enqueue(&item).await.unwrap();
        assert_eq!(entry.action, SyncAction::Create);

        store.mark_syncing(&entry).await.unwrap();
        assert_eq!(store.get(&item.id).await.unwrap().unwrap().sync_state, SyncState::Syncing);

        assert!(store.complete_entry(&entry, Some("remote-X")).await.unwrap());
        let synced = store.get(&item.id).await.unwrap().unwrap();
        assert_eq!(synced.sync_state, SyncState::Synced);
        assert_eq!(synced.remote_id.as_deref(), Some("remote-X"));
        assert!(store.list_pending().await.unwrap().is_empty());

        // 本地再次编辑：回到 pending，remote_id 转入 update 条目
        item.metadata.caption = Some("north wall, after".to_string());
        let update = store.save_and_enqueue(&item).await.unwrap();
        assert_eq!(update.action, SyncAction::Update);
        assert_eq!(update.sync_payload().remote_id.as_deref(), Some("remote-X"));

        let edited = store.get(&item.id).await.unwrap().unwrap();
        assert_eq!(edited.sync_state, SyncState::Pending);
        assert!(edited.remote_id.is_none());

        // 再次编辑仍是同一个 update 条目
        let again = store.save_and_enqueue(&item).await.unwrap();
        assert_eq!(again.id, update.id);
        assert_eq!(again.sync_payload().remote_id.as_deref(), Some("remote-X"));
        assert_eq!(store.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_complete_entry_keeps_refreshed_entry() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut item = photo("project-1");
        let entry = store.save_and_enqueue(&item).await.unwrap();
        store.mark_syncing(&entry).await.unwrap();

        // 上传过程中本地编辑
        item.metadata.caption = Some("edited while uploading".to_string());
        store.save_and_enqueue(&item).await.unwrap();

        assert!(!store.complete_entry(&entry, Some("remote-1")).await.unwrap());
        let current = store.get(&item.id).await.unwrap().unwrap();
        assert_eq!(current.sync_state, SyncState::Pending);
        assert!(current.remote_id.is_none());

        // create 不再重发，改为携带 remote_id 的 update
        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action, SyncAction::Update);
        assert_eq!(pending[0].sync_payload().remote_id.as_deref(), Some("remote-1"));
        assert_eq!(
            pending[0].sync_payload().metadata.and_then(|m| m.caption).as_deref(),
            Some("edited while uploading")
        );

        // 再次编辑仍落在同一个 update 上
        store.save_and_enqueue(&item).await.unwrap();
        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action, SyncAction::Update);
    }

    #[tokio::test]
    async fn test_delete_during_create_upload_enqueues_remote_delete() {
        let store = LocalStore::open_in_memory().unwrap();
        let item = photo("project-1");
        let entry = store.save_and_enqueue(&item).await.unwrap();
        store.mark_syncing(&entry).await.unwrap();

        // 未同步过，删除只丢弃排队操作
        assert!(store.delete_and_enqueue(&item.id).await.unwrap().is_none());

        assert!(!store.complete_entry(&entry, Some("remote-9")).await.unwrap());
        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action, SyncAction::Delete);
        assert_eq!(pending[0].sync_payload().remote_id.as_deref(), Some("remote-9"));
    }

    #[tokio::test]
    async fn test_remote_id_iff_synced_enforced_by_schema() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut item = photo("p");
        item.remote_id = Some("r".to_string());
        item.sync_state = SyncState::Pending;
        assert!(store.put(&item).await.is_err());

        item.sync_state = SyncState::Synced;
        store.put(&item).await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_bookkeeping() {
        let store = LocalStore::open_in_memory().unwrap();
        let item = photo("p");
        let entry = store.save_and_enqueue(&item).await.unwrap();

        store.record_transient_failure(&entry, "timeout").await.unwrap();
        let queued = store.get_entry(&entry.id).await.unwrap().unwrap();
        assert_eq!(queued.retry_count, 1);
        assert_eq!(queued.error.as_deref(), Some("timeout"));
        let failed = store.get(&item.id).await.unwrap().unwrap();
        assert_eq!(failed.sync_state, SyncState::Error);
        assert_eq!(failed.retry_count, 1);

        store.fail_entry_permanently(&queued, "422 invalid caption").await.unwrap();
        assert!(store.get_entry(&entry.id).await.unwrap().is_none());
        let failed = store.get(&item.id).await.unwrap().unwrap();
        assert_eq!(failed.sync_error.as_deref(), Some("422 invalid caption"));
    }

    #[tokio::test]
    async fn test_delete_and_enqueue() {
        let store = LocalStore::open_in_memory().unwrap();

        // 未同步：只丢弃排队的 create
        let unsynced = photo("p");
        store.save_and_enqueue(&unsynced).await.unwrap();
        assert!(store.delete_and_enqueue(&unsynced.id).await.unwrap().is_none());
        assert!(store.list_pending().await.unwrap().is_empty());

        // 已同步：入队 delete 并携带 remote_id
        let synced = photo("p");
        let entry = store.save_and_enqueue(&synced).await.unwrap();
        store.complete_entry(&entry, Some("remote-7")).await.unwrap();
        let delete = store.delete_and_enqueue(&synced.id).await.unwrap().unwrap();
        assert_eq!(delete.action, SyncAction::Delete);
        assert_eq!(delete.sync_payload().remote_id.as_deref(), Some("remote-7"));
        assert!(store.get(&synced.id).await.unwrap().is_none());

        assert!(matches!(
            store.delete_and_enqueue("missing").await,
            Err(FieldSyncError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_owner_cascades() {
        let store = LocalStore::open_in_memory().unwrap();
        let a = photo("project-1");
        let b = photo("project-1");
        let other = photo("project-2");
        store.save_and_enqueue(&a).await.unwrap();
        store.save_and_enqueue(&b).await.unwrap();
        store.save_and_enqueue(&other).await.unwrap();
        store
            .enqueue(&project_entry("project-1", SyncAction::Update, serde_json::json!({"name": "x"})))
            .await
            .unwrap();

        let report = store.delete_owner("project-1").await.unwrap();
        assert_eq!(report.items_deleted, 2);
        assert_eq!(report.entries_deleted, 3);

        assert!(store.list_by_owner("project-1").await.unwrap().is_empty());
        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].local_id, other.id);
    }

    #[tokio::test]
    async fn test_locations_and_stats() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = store.append_location(&GeoCoordinate::new(1.0, 2.0), 12.0, 1_000).await.unwrap();
        store.append_location(&GeoCoordinate::new(1.1, 2.1), 8.0, 2_000).await.unwrap();

        assert_eq!(store.list_unforwarded_locations(10).await.unwrap().len(), 2);
        store.mark_location_forwarded(id).await.unwrap();
        let rest = store.list_unforwarded_locations(10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].recorded_at, 2_000);

        store.save_and_enqueue(&photo("p")).await.unwrap();
        let stats = store.queue_stats().await.unwrap();
        assert_eq!(stats.queued_entries, 1);
        assert_eq!(stats.items_pending, 1);
        assert_eq!(stats.unforwarded_locations, 1);
    }
}
