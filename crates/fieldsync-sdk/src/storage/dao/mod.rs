//! 数据访问层 (DAO) - 每张表一个专门的操作模块

pub mod work_item;
pub mod sync_queue;
pub mod location;

pub use work_item::WorkItemDao;
pub use sync_queue::SyncQueueDao;
pub use location::LocationDao;

use rusqlite::Connection;
use crate::error::{FieldSyncError, Result};

/// DAO 工厂
pub struct DaoFactory;

impl DaoFactory {
    pub fn work_item_dao(conn: &Connection) -> WorkItemDao<'_> {
        WorkItemDao::new(conn)
    }

    pub fn sync_queue_dao(conn: &Connection) -> SyncQueueDao<'_> {
        SyncQueueDao::new(conn)
    }

    pub fn location_dao(conn: &Connection) -> LocationDao<'_> {
        LocationDao::new(conn)
    }
}

/// 事务管理器 - 跨表操作要么全部生效要么全部回滚
pub struct TransactionManager<'a> {
    conn: &'a Connection,
}

impl<'a> TransactionManager<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 闭包返回 Err 时事务随 drop 回滚
    pub fn execute<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let tx = self.conn.unchecked_transaction()
            .map_err(|e| FieldSyncError::Database(format!("开始事务失败: {}", e)))?;

        let result = f(self.conn)?;

        tx.commit()
            .map_err(|e| FieldSyncError::Database(format!("提交事务失败: {}", e)))?;

        Ok(result)
    }
}

/// 生成 `?1, ?2, ...` 占位符
pub(crate) fn placeholders(count: usize) -> String {
    (0..count).map(|i| format!("?{}", i + 1)).collect::<Vec<_>>().join(", ")
}
