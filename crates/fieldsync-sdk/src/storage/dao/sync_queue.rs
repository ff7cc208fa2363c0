//! 同步队列 DAO - sync_queue 表

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::Result;
use crate::storage::dao::placeholders;
use crate::storage::entities::SyncQueueEntry;
use crate::utils::now_millis;

const COLUMNS: &str = "id, item_type, local_id, owner_id, action, payload, retry_count, last_attempt_at, error, created_at, updated_at";

pub struct SyncQueueDao<'a> {
    conn: &'a Connection,
}

impl<'a> SyncQueueDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 幂等 upsert：冲突时保留原 created_at / retry_count，仅替换 payload
    pub fn upsert(&self, entry: &SyncQueueEntry) -> Result<()> {
        let payload = serde_json::to_string(&entry.payload)?;
        let sql = r#"
            INSERT INTO sync_queue (id, item_type, local_id, owner_id, action, payload, retry_count, last_attempt_at, error, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                payload = excluded.payload,
                owner_id = excluded.owner_id,
                updated_at = MAX(excluded.updated_at, sync_queue.updated_at + 1)
        "#;
        self.conn.execute(
            sql,
            params![
                entry.id,
                entry.item_type.as_str(),
                entry.local_id,
                entry.owner_id,
                entry.action.as_str(),
                payload,
                entry.retry_count,
                entry.last_attempt_at,
                entry.error,
                entry.created_at,
                entry.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<SyncQueueEntry>> {
        let sql = format!("SELECT {} FROM sync_queue WHERE id = ?1", COLUMNS);
        let raw = self.conn
            .query_row(&sql, params![id], RawEntry::from_row)
            .optional()?;
        raw.map(RawEntry::into_entry).transpose()
    }

    /// 按创建顺序列出所有待处理条目
    pub fn list_pending(&self) -> Result<Vec<SyncQueueEntry>> {
        let sql = format!(
            "SELECT {} FROM sync_queue ORDER BY created_at ASC, rowid ASC",
            COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], RawEntry::from_row)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(raw?.into_entry()?);
        }
        Ok(out)
    }

    pub fn remove(&self, id: &str) -> Result<bool> {
        let n = self.conn.execute("DELETE FROM sync_queue WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    /// 仅当条目在处理期间未被改写时删除
    pub fn remove_if_unchanged(&self, id: &str, updated_at: i64) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM sync_queue WHERE id = ?1 AND updated_at = ?2",
            params![id, updated_at],
        )?;
        Ok(n > 0)
    }

    pub fn touch_attempt(&self, id: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_queue SET last_attempt_at = ?1 WHERE id = ?2",
            params![now_millis(), id],
        )?;
        Ok(())
    }

    pub fn record_failure(&self, id: &str, error: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_queue SET retry_count = retry_count + 1, last_attempt_at = ?1, error = ?2 WHERE id = ?3",
            params![now_millis(), error, id],
        )?;
        Ok(())
    }

    pub fn delete_by_local_id(&self, local_id: &str) -> Result<usize> {
        let n = self.conn.execute("DELETE FROM sync_queue WHERE local_id = ?1", params![local_id])?;
        Ok(n)
    }

    /// 删除引用给定工作项、或直接引用 owner 的所有条目
    pub fn delete_for_owner(&self, owner_id: &str, local_ids: &[String]) -> Result<usize> {
        let mut n = self.conn.execute(
            "DELETE FROM sync_queue WHERE owner_id = ?1 OR local_id = ?1",
            params![owner_id],
        )?;
        for chunk in local_ids.chunks(500) {
            let sql = format!("DELETE FROM sync_queue WHERE local_id IN ({})", placeholders(chunk.len()));
            n += self.conn.execute(&sql, params_from_iter(chunk.iter()))?;
        }
        Ok(n)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

struct RawEntry {
    id: String,
    item_type: String,
    local_id: String,
    owner_id: String,
    action: String,
    payload: String,
    retry_count: u32,
    last_attempt_at: Option<i64>,
    error: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl RawEntry {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            item_type: row.get(1)?,
            local_id: row.get(2)?,
            owner_id: row.get(3)?,
            action: row.get(4)?,
            payload: row.get(5)?,
            retry_count: row.get(6)?,
            last_attempt_at: row.get(7)?,
            error: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_entry(self) -> Result<SyncQueueEntry> {
        Ok(SyncQueueEntry {
            id: self.id,
            item_type: self.item_type.parse()?,
            local_id: self.local_id,
            owner_id: self.owner_id,
            action: self.action.parse()?,
            payload: serde_json::from_str(&self.payload)?,
            retry_count: self.retry_count,
            last_attempt_at: self.last_attempt_at,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
