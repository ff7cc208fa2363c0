//! 定位采样与周期记录
//!
//! `PositionProvider` 由平台层实现；`LocationLogger` 在上班期间按固定间隔采样，
//! 写入本地存储并尽力上报。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::ClockStatusCache;
use crate::error::Result;
use crate::events::{EventManager, SDKEvent};
use crate::remote::{LocationPost, RemoteApi};
use crate::storage::LocalStore;
use crate::utils::{now_millis, GeoCoordinate};

/// 采样参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    /// 平台可取多次采样中精度最好的一次
    pub samples: u32,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self { high_accuracy: true, timeout_ms: 15_000, samples: 1 }
    }
}

/// 一次定位结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub coordinate: GeoCoordinate,
    /// 精度（米）
    pub accuracy: f64,
    pub timestamp: i64,
}

/// 平台定位能力
#[async_trait]
pub trait PositionProvider: Send + Sync + std::fmt::Debug {
    async fn current_position(&self, options: &PositionOptions) -> Result<PositionFix>;
}

/// 定位记录配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    /// 采样间隔（秒）
    pub interval_secs: u64,
    pub position: PositionOptions,
    /// 网络恢复后单次补传的最大条数
    pub flush_batch_size: usize,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            position: PositionOptions::default(),
            flush_batch_size: 100,
        }
    }
}

/// 周期定位记录器
#[derive(Debug)]
pub struct LocationLogger {
    config: LocationConfig,
    store: LocalStore,
    remote: Arc<dyn RemoteApi>,
    position: Arc<dyn PositionProvider>,
    status_cache: Arc<ClockStatusCache>,
    event_manager: Arc<EventManager>,
    token: Mutex<Option<CancellationToken>>,
}

impl LocationLogger {
    pub fn new(
        config: LocationConfig,
        store: LocalStore,
        remote: Arc<dyn RemoteApi>,
        position: Arc<dyn PositionProvider>,
        status_cache: Arc<ClockStatusCache>,
        event_manager: Arc<EventManager>,
    ) -> Self {
        Self {
            config,
            store,
            remote,
            position,
            status_cache,
            event_manager,
            token: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.token.lock().as_ref().map(|t| !t.is_cancelled()).unwrap_or(false)
    }

    /// 立即采样一次，之后按间隔采样；重复调用无副作用
    pub fn start(self: &Arc<Self>) {
        let token = {
            let mut slot = self.token.lock();
            if slot.as_ref().map(|t| !t.is_cancelled()).unwrap_or(false) {
                debug!("定位记录已在运行");
                return;
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };

        info!("📍 定位记录已启动 (间隔 {}s)", self.config.interval_secs);
        let this = Arc::clone(self);
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        tokio::spawn(async move {
            this.sample_once().await;
            loop {
                select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        if token.is_cancelled() {
                            break;
                        }
                        if !this.status_cache.read_through_or_stale().await.is_clocked_in() {
                            debug!("未处于上班状态，跳过本次采样");
                            continue;
                        }
                        this.sample_once().await;
                    }
                }
            }
            debug!("定位记录循环已退出");
        });
    }

    /// 立即停止
    pub fn stop(&self) {
        if let Some(token) = self.token.lock().take() {
            token.cancel();
            info!("📍 定位记录已停止");
        }
    }

    /// 采样一次：写本地并异步上报
    pub async fn sample_once(self: &Arc<Self>) {
        let fix = match self.position.current_position(&self.config.position).await {
            Ok(fix) => fix,
            Err(e) => {
                warn!("⚠️ 定位采样失败: {}", e);
                return;
            }
        };

        let recorded_at = now_millis();
        let id = match self.store.append_location(&fix.coordinate, fix.accuracy, recorded_at).await {
            Ok(id) => id,
            Err(e) => {
                warn!("⚠️ 写入定位记录失败: {}", e);
                return;
            }
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let post = LocationPost::new(fix.coordinate, fix.accuracy, recorded_at);
            let forwarded = match this.remote.post_location(&post).await {
                Ok(()) => this.store.mark_location_forwarded(id).await.is_ok(),
                Err(e) => {
                    debug!("定位上报失败，等待网络恢复后补传: {}", e);
                    false
                }
            };
            this.event_manager
                .emit(SDKEvent::LocationSampled {
                    coordinate: fix.coordinate,
                    accuracy: fix.accuracy,
                    forwarded,
                    timestamp: recorded_at,
                })
                .await;
        });
    }

    /// 补传未上报的记录，遇到失败即停止；返回成功条数
    pub async fn flush_pending(&self) -> Result<usize> {
        let samples = self.store.list_unforwarded_locations(self.config.flush_batch_size).await?;
        let mut flushed = 0;
        for sample in samples {
            let post = LocationPost::new(sample.coordinate, sample.accuracy, sample.recorded_at);
            if let Err(e) = self.remote.post_location(&post).await {
                debug!("补传定位记录失败: {}", e);
                break;
            }
            self.store.mark_location_forwarded(sample.id).await?;
            flushed += 1;
        }
        if flushed > 0 {
            info!("补传定位记录 {} 条", flushed);
        }
        Ok(flushed)
    }
}
