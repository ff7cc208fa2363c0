use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::ClockKind;
use crate::error::Result;
use crate::storage::kv::{KvStore, KvTree};
use crate::utils::{now_millis, GeoCoordinate};

const TREE_NAME: &str = "clock_retry_queue";

/// 待补发的打卡请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockRetryEntry {
    pub id: String,
    pub kind: ClockKind,
    pub boundary_id: String,
    /// 上班打卡必需，入队前已解析
    pub project_id: Option<String>,
    pub coordinate: GeoCoordinate,
    pub accuracy: f64,
    pub retry_count: u32,
    pub created_at: i64,
}

impl ClockRetryEntry {
    pub fn new(
        kind: ClockKind,
        boundary_id: impl Into<String>,
        project_id: Option<String>,
        coordinate: GeoCoordinate,
        accuracy: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            boundary_id: boundary_id.into(),
            project_id,
            coordinate,
            accuracy,
            retry_count: 0,
            created_at: now_millis(),
        }
    }
}

/// 一次补发的结果
#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    pub replayed: Vec<ClockRetryEntry>,
    /// 被丢弃的条目及原因
    pub dropped: Vec<(ClockRetryEntry, String)>,
    pub remaining: usize,
}

/// 打卡重试队列
///
/// 有界（超出时淘汰最旧条目），持久化在 sled 中，键为单调递增序号。
/// 补发按入队顺序串行执行。
#[derive(Debug)]
pub struct ClockRetryQueue {
    kv: KvStore,
    tree: KvTree,
    max_entries: usize,
    max_attempts: u32,
    replay_lock: Mutex<()>,
    /// 入队淘汰与补发回写互斥；不跨 await 持有
    write_lock: parking_lot::Mutex<()>,
}

impl ClockRetryQueue {
    pub fn new(kv: &KvStore, max_entries: usize, max_attempts: u32) -> Result<Self> {
        let tree = kv.tree(TREE_NAME)?;
        let queue = Self {
            kv: kv.clone(),
            tree,
            max_entries: max_entries.max(1),
            max_attempts: max_attempts.max(1),
            replay_lock: Mutex::new(()),
            write_lock: parking_lot::Mutex::new(()),
        };
        if !queue.is_empty() {
            info!("恢复打卡重试队列: {} 条", queue.len());
        }
        Ok(queue)
    }

    /// 入队；队列已满时先淘汰最旧条目并返回它
    pub fn push(&self, entry: ClockRetryEntry) -> Result<Option<ClockRetryEntry>> {
        let _write = self.write_lock.lock();
        let mut evicted = None;
        while self.tree.len() >= self.max_entries {
            let Some(oldest_key) = self.tree.first_key()? else {
                break;
            };
            let oldest: Option<ClockRetryEntry> = self.tree.get(&oldest_key)?;
            self.tree.delete(&oldest_key)?;
            if let Some(oldest) = oldest {
                warn!(
                    "⚠️ 打卡重试队列已满 ({}), 丢弃最旧条目: id={}, kind={:?}",
                    self.max_entries, oldest.id, oldest.kind
                );
                evicted = Some(oldest);
            }
        }

        let key = format!("{:020}", self.kv.generate_id()?);
        debug!("打卡请求入重试队列: id={}, kind={:?}", entry.id, entry.kind);
        self.tree.set(key, &entry)?;
        Ok(evicted)
    }

    /// 按入队顺序列出
    pub fn entries(&self) -> Result<Vec<ClockRetryEntry>> {
        Ok(self
            .tree
            .scan_prefix::<ClockRetryEntry>(b"")?
            .into_iter()
            .map(|(_, entry)| entry)
            .collect())
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn clear(&self) -> Result<()> {
        self.tree.clear()
    }

    /// 按顺序补发
    ///
    /// 成功或永久失败的条目移出队列；瞬时失败累加重试次数，达到上限即丢弃，
    /// 否则留在原位并结束本次补发，保证后面的条目不会越过它。
    pub async fn replay<F, Fut>(&self, mut send: F) -> Result<ReplayReport>
    where
        F: FnMut(ClockRetryEntry) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let _guard = self.replay_lock.lock().await;
        let mut report = ReplayReport::default();

        for (key, mut entry) in self.tree.scan_prefix::<ClockRetryEntry>(b"")? {
            match send(entry.clone()).await {
                Ok(()) => {
                    self.tree.delete(&key)?;
                    info!("✅ 打卡补发成功: id={}, kind={:?}", entry.id, entry.kind);
                    report.replayed.push(entry);
                }
                Err(e) if e.is_transient() => {
                    entry.retry_count += 1;
                    if entry.retry_count >= self.max_attempts {
                        self.tree.delete(&key)?;
                        warn!(
                            "⚠️ 打卡补发 {} 次仍失败，丢弃: id={}, error={}",
                            entry.retry_count, entry.id, e
                        );
                        report.dropped.push((entry, format!("重试 {} 次后放弃: {}", self.max_attempts, e)));
                        continue;
                    }
                    debug!("打卡补发失败 ({}/{}): {}", entry.retry_count, self.max_attempts, e);
                    let _write = self.write_lock.lock();
                    // 补发期间可能已被入队淘汰
                    if self.tree.get::<ClockRetryEntry>(&key)?.is_some() {
                        self.tree.set(&key, &entry)?;
                    }
                    break;
                }
                Err(e) => {
                    self.tree.delete(&key)?;
                    warn!("⚠️ 打卡补发永久失败，丢弃: id={}, error={}", entry.id, e);
                    report.dropped.push((entry, e.to_string()));
                }
            }
        }

        report.remaining = self.tree.len();
        Ok(report)
    }
}
