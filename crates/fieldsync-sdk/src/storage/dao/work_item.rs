//! 工作项 DAO - work_item 表

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::storage::entities::{SyncState, WorkItem, WorkItemMetadata};
use crate::utils::now_millis;

const COLUMNS: &str = "id, owner_id, item_type, data, metadata, sync_state, sync_error, remote_id, retry_count, created_at, updated_at";

pub struct WorkItemDao<'a> {
    conn: &'a Connection,
}

impl<'a> WorkItemDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, item: &WorkItem) -> Result<()> {
        let metadata = serde_json::to_string(&item.metadata)?;
        let sql = r#"
            INSERT INTO work_item (id, owner_id, item_type, data, metadata, sync_state, sync_error, remote_id, retry_count, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                item_type = excluded.item_type,
                data = excluded.data,
                metadata = excluded.metadata,
                sync_state = excluded.sync_state,
                sync_error = excluded.sync_error,
                remote_id = excluded.remote_id,
                retry_count = excluded.retry_count,
                updated_at = excluded.updated_at
        "#;
        self.conn.execute(
            sql,
            params![
                item.id,
                item.owner_id,
                item.item_type.as_str(),
                item.data,
                metadata,
                item.sync_state.as_str(),
                item.sync_error,
                item.remote_id,
                item.retry_count,
                item.created_at,
                item.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<WorkItem>> {
        let sql = format!("SELECT {} FROM work_item WHERE id = ?1", COLUMNS);
        let raw = self.conn
            .query_row(&sql, params![id], RawWorkItem::from_row)
            .optional()?;
        raw.map(RawWorkItem::into_item).transpose()
    }

    pub fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WorkItem>> {
        let sql = format!(
            "SELECT {} FROM work_item WHERE owner_id = ?1 ORDER BY created_at ASC, rowid ASC",
            COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id], RawWorkItem::from_row)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(raw?.into_item()?);
        }
        Ok(out)
    }

    pub fn list_ids_by_owner(&self, owner_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM work_item WHERE owner_id = ?1")?;
        let rows = stmt.query_map(params![owner_id], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let n = self.conn.execute("DELETE FROM work_item WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    pub fn delete_by_owner(&self, owner_id: &str) -> Result<usize> {
        let n = self.conn.execute("DELETE FROM work_item WHERE owner_id = ?1", params![owner_id])?;
        Ok(n)
    }

    /// 切换到非 synced 状态；remote_id 随之清空以保持 remote_id ⇔ synced
    pub fn set_state(&self, id: &str, state: SyncState, error: Option<&str>) -> Result<bool> {
        debug_assert!(state != SyncState::Synced, "synced 状态必须通过 mark_synced 设置");
        let n = self.conn.execute(
            "UPDATE work_item SET sync_state = ?1, sync_error = ?2, remote_id = NULL, updated_at = ?3 WHERE id = ?4",
            params![state.as_str(), error, now_millis(), id],
        )?;
        Ok(n > 0)
    }

    /// 记录一次失败：状态置为 error 并累加重试次数
    pub fn record_failure(&self, id: &str, error: &str) -> Result<bool> {
        let n = self.conn.execute(
            "UPDATE work_item SET sync_state = 'error', sync_error = ?1, remote_id = NULL, retry_count = retry_count + 1, updated_at = ?2 WHERE id = ?3",
            params![error, now_millis(), id],
        )?;
        Ok(n > 0)
    }

    pub fn mark_synced(&self, id: &str, remote_id: &str) -> Result<bool> {
        let n = self.conn.execute(
            "UPDATE work_item SET sync_state = 'synced', sync_error = NULL, remote_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![remote_id, now_millis(), id],
        )?;
        Ok(n > 0)
    }

    pub fn count_by_state(&self, state: SyncState) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM work_item WHERE sync_state = ?1",
            params![state.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

/// 行数据先按原始类型读取，再在 rusqlite 之外做枚举/JSON 解析
struct RawWorkItem {
    id: String,
    owner_id: String,
    item_type: String,
    data: Vec<u8>,
    metadata: String,
    sync_state: String,
    sync_error: Option<String>,
    remote_id: Option<String>,
    retry_count: u32,
    created_at: i64,
    updated_at: i64,
}

impl RawWorkItem {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            item_type: row.get(2)?,
            data: row.get(3)?,
            metadata: row.get(4)?,
            sync_state: row.get(5)?,
            sync_error: row.get(6)?,
            remote_id: row.get(7)?,
            retry_count: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_item(self) -> Result<WorkItem> {
        let metadata: WorkItemMetadata = serde_json::from_str(&self.metadata)?;
        Ok(WorkItem {
            id: self.id,
            owner_id: self.owner_id,
            item_type: self.item_type.parse()?,
            data: self.data,
            metadata,
            sync_state: self.sync_state.parse()?,
            sync_error: self.sync_error,
            remote_id: self.remote_id,
            retry_count: self.retry_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
