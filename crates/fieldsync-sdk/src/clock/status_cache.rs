//! 打卡状态缓存 - 带 TTL 的读穿缓存，远端失败时回退到过期值

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::remote::RemoteApi;
use crate::utils::now_millis;

/// 打卡状态读取结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockStatus {
    ClockedIn,
    ClockedOut,
    /// 无缓存且远端不可达
    Unknown,
}

impl ClockStatus {
    /// Unknown 按未打卡处理
    pub fn is_clocked_in(&self) -> bool {
        matches!(self, ClockStatus::ClockedIn)
    }

    fn from_flag(clocked_in: bool) -> Self {
        if clocked_in {
            ClockStatus::ClockedIn
        } else {
            ClockStatus::ClockedOut
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CachedStatus {
    is_clocked_in: bool,
    last_checked_at: i64,
}

/// 打卡状态缓存
#[derive(Debug)]
pub struct ClockStatusCache {
    remote: Arc<dyn RemoteApi>,
    ttl: Duration,
    entry: RwLock<Option<CachedStatus>>,
    /// 串行化远端读取，避免并发读穿
    fetch_lock: Mutex<()>,
}

impl ClockStatusCache {
    pub fn new(remote: Arc<dyn RemoteApi>, ttl: Duration) -> Self {
        Self {
            remote,
            ttl,
            entry: RwLock::new(None),
            fetch_lock: Mutex::new(()),
        }
    }

    fn fresh_value(&self) -> Option<bool> {
        let entry = (*self.entry.read())?;
        let age = now_millis().saturating_sub(entry.last_checked_at);
        if age >= 0 && (age as u128) < self.ttl.as_millis() {
            Some(entry.is_clocked_in)
        } else {
            None
        }
    }

    /// TTL 内直接返回缓存；过期则读远端，远端失败时回退到过期缓存；
    /// 完全没有缓存且远端失败时返回 Unknown。
    pub async fn read_through_or_stale(&self) -> ClockStatus {
        if let Some(value) = self.fresh_value() {
            return ClockStatus::from_flag(value);
        }

        let _guard = self.fetch_lock.lock().await;
        // 等锁期间可能已被刷新
        if let Some(value) = self.fresh_value() {
            return ClockStatus::from_flag(value);
        }

        match self.remote.clock_status().await {
            Ok(value) => {
                debug!("打卡状态已刷新: clocked_in={}", value);
                self.set(value);
                ClockStatus::from_flag(value)
            }
            Err(e) => match *self.entry.read() {
                Some(stale) => {
                    warn!("⚠️ 读取打卡状态失败，使用过期缓存 (clocked_in={}): {}", stale.is_clocked_in, e);
                    ClockStatus::from_flag(stale.is_clocked_in)
                }
                None => {
                    warn!("⚠️ 读取打卡状态失败且无缓存: {}", e);
                    ClockStatus::Unknown
                }
            },
        }
    }

    /// 打卡成功后直接写入
    pub fn set(&self, is_clocked_in: bool) {
        *self.entry.write() = Some(CachedStatus {
            is_clocked_in,
            last_checked_at: now_millis(),
        });
    }

    /// 标记过期；下次读取走远端，失败时仍可回退到该值
    pub fn invalidate(&self) {
        if let Some(entry) = self.entry.write().as_mut() {
            entry.last_checked_at = i64::MIN;
        }
    }

    /// 不触发远端读取的当前缓存值
    pub fn peek(&self) -> Option<bool> {
        self.entry.read().map(|e| e.is_clocked_in)
    }
}
