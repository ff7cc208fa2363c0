//! KV 存储模块 - 基于 sled 的键值存储
//!
//! 承载体量小、需要跨重启保留的状态（如打卡重试队列）。
//! 每个使用方拿到一个独立命名的 Tree，值使用 bincode 编码。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, Tree};
use tracing::{info, warn};

use crate::error::{FieldSyncError, Result};

/// KV 存储组件
#[derive(Debug, Clone)]
pub struct KvStore {
    kv_path: Option<PathBuf>,
    db: Arc<Db>,
}

impl KvStore {
    /// 打开 `base_path/kv` 下的 sled 数据库
    pub async fn open(base_path: &Path) -> Result<Self> {
        let kv_path = base_path.join("kv");

        tokio::fs::create_dir_all(&kv_path).await
            .map_err(|e| FieldSyncError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        // 上一个进程实例可能刚释放文件锁，带退避重试
        const MAX_OPEN_RETRIES: u32 = 6;
        const RETRY_DELAY_MS: u64 = 200;
        let mut last_err: Option<sled::Error> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(&kv_path) {
                Ok(db) => {
                    info!("KV 存储已打开: {}", kv_path.display());
                    return Ok(Self { kv_path: Some(kv_path), db: Arc::new(db) });
                }
                Err(e) => {
                    let msg = e.to_string();
                    last_err = Some(e);
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        warn!("⚠️ KV 存储被占用，{}ms 后重试 (attempt {})", delay_ms, attempt + 1);
                        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }

        Err(FieldSyncError::KvStore(
            last_err
                .map(|e| format!("打开 sled 数据库失败: {}", e))
                .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
        ))
    }

    /// 临时数据库，drop 后即删除
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { kv_path: None, db: Arc::new(db) })
    }

    pub fn path(&self) -> Option<&Path> {
        self.kv_path.as_deref()
    }

    /// 打开命名 Tree
    pub fn tree(&self, name: &str) -> Result<KvTree> {
        let tree = self.db.open_tree(name)
            .map_err(|e| FieldSyncError::KvStore(format!("打开 Tree 失败 {}: {}", name, e)))?;
        Ok(KvTree { tree })
    }

    /// 单调递增 ID（跨重启保持递增）
    pub fn generate_id(&self) -> Result<u64> {
        Ok(self.db.generate_id()?)
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await
            .map_err(|e| FieldSyncError::KvStore(format!("刷盘失败: {}", e)))?;
        Ok(())
    }
}

/// 命名空间内的键值操作；键按字节序排列
#[derive(Debug, Clone)]
pub struct KvTree {
    tree: Tree,
}

impl KvTree {
    pub fn set<V: Serialize>(&self, key: impl AsRef<[u8]>, value: &V) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        self.tree.insert(key, bytes)
            .map_err(|e| FieldSyncError::KvStore(format!("设置键值对失败: {}", e)))?;
        Ok(())
    }

    pub fn get<V: DeserializeOwned>(&self, key: impl AsRef<[u8]>) -> Result<Option<V>> {
        match self.tree.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        Ok(self.tree.remove(key)?.is_some())
    }

    /// 前缀扫描（空前缀即全量，按键升序）
    ///
    /// 无法解码的值记日志后跳过。
    pub fn scan_prefix<V: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, V)>> {
        let mut results = Vec::new();
        for item in self.tree.scan_prefix(prefix) {
            let (key, bytes) = item
                .map_err(|e| FieldSyncError::KvStore(format!("扫描前缀失败: {}", e)))?;
            match bincode::deserialize(&bytes) {
                Ok(value) => results.push((key.to_vec(), value)),
                Err(e) => warn!("⚠️ 跳过无法解码的 KV 值 key={}: {}", String::from_utf8_lossy(&key), e),
            }
        }
        Ok(results)
    }

    /// 最小的键
    pub fn first_key(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.first()?.map(|(k, _)| k.to_vec()))
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn clear(&self) -> Result<()> {
        self.tree.clear()?;
        Ok(())
    }
}
