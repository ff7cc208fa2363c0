use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::clock::{ClockFeedback, ClockKind};
use crate::network::NetworkStatus;
use crate::storage::entities::{ItemType, SyncState};
use crate::storage::queue::DrainReport;
use crate::utils::{now_millis, GeoCoordinate};

/// SDK 事件类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SDKEvent {
    /// 网络可用性变化
    ConnectivityChanged {
        old_status: NetworkStatus,
        new_status: NetworkStatus,
        timestamp: i64,
    },
    /// 工作项同步状态变化
    SyncStateChanged {
        local_id: String,
        item_type: ItemType,
        new_state: SyncState,
        error: Option<String>,
        timestamp: i64,
    },
    /// 一轮队列处理结束
    SyncDrainCompleted {
        report: DrainReport,
        timestamp: i64,
    },
    /// 围栏对账完成
    GeofenceReconciled {
        added: usize,
        removed: usize,
        active: usize,
        timestamp: i64,
    },
    /// 已推送打卡提示
    ClockPromptScheduled {
        boundary_id: String,
        kind: ClockKind,
        timestamp: i64,
    },
    /// 打卡结果（每次尝试恰好一个）
    ClockOutcome {
        boundary_id: String,
        kind: ClockKind,
        feedback: ClockFeedback,
        timestamp: i64,
    },
    /// 重试队列中的打卡补发成功
    ClockRetryReplayed {
        entry_id: String,
        kind: ClockKind,
        timestamp: i64,
    },
    /// 重试队列条目被丢弃（淘汰/次数用尽/永久失败）
    ClockRetryDropped {
        entry_id: String,
        kind: ClockKind,
        reason: String,
        timestamp: i64,
    },
    /// 定位采样
    LocationSampled {
        coordinate: GeoCoordinate,
        accuracy: f64,
        forwarded: bool,
        timestamp: i64,
    },
}

impl SDKEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            SDKEvent::ConnectivityChanged { .. } => "connectivity_changed",
            SDKEvent::SyncStateChanged { .. } => "sync_state_changed",
            SDKEvent::SyncDrainCompleted { .. } => "sync_drain_completed",
            SDKEvent::GeofenceReconciled { .. } => "geofence_reconciled",
            SDKEvent::ClockPromptScheduled { .. } => "clock_prompt_scheduled",
            SDKEvent::ClockOutcome { .. } => "clock_outcome",
            SDKEvent::ClockRetryReplayed { .. } => "clock_retry_replayed",
            SDKEvent::ClockRetryDropped { .. } => "clock_retry_dropped",
            SDKEvent::LocationSampled { .. } => "location_sampled",
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            SDKEvent::ConnectivityChanged { timestamp, .. }
            | SDKEvent::SyncStateChanged { timestamp, .. }
            | SDKEvent::SyncDrainCompleted { timestamp, .. }
            | SDKEvent::GeofenceReconciled { timestamp, .. }
            | SDKEvent::ClockPromptScheduled { timestamp, .. }
            | SDKEvent::ClockOutcome { timestamp, .. }
            | SDKEvent::ClockRetryReplayed { timestamp, .. }
            | SDKEvent::ClockRetryDropped { timestamp, .. }
            | SDKEvent::LocationSampled { timestamp, .. } => *timestamp,
        }
    }
}

/// 事件监听器类型
pub type EventListener = Box<dyn Fn(&SDKEvent) + Send + Sync>;

/// 事件管理器
pub struct EventManager {
    sender: broadcast::Sender<SDKEvent>,
    /// 按事件类型注册的监听器，"*" 接收全部
    listeners: Arc<tokio::sync::RwLock<HashMap<String, Vec<EventListener>>>>,
    stats: Arc<tokio::sync::RwLock<EventStats>>,
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventManager")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub listener_count: usize,
    pub last_event_time: Option<i64>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            sender,
            listeners: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            stats: Arc::new(tokio::sync::RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub async fn emit(&self, event: SDKEvent) {
        debug!("Emitting event: {}", event.event_type());

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats.events_by_type.entry(event.event_type().to_string()).or_insert(0) += 1;
            stats.last_event_time = Some(event.timestamp());
        }

        // 无订阅者时 send 失败属正常场景
        if let Err(e) = self.sender.send(event.clone()) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }

        let listeners = self.listeners.read().await;
        if let Some(event_listeners) = listeners.get(event.event_type()) {
            for listener in event_listeners {
                listener(&event);
            }
        }
        if let Some(general_listeners) = listeners.get("*") {
            for listener in general_listeners {
                listener(&event);
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SDKEvent> {
        self.sender.subscribe()
    }

    /// 添加事件监听器
    pub async fn add_listener<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&SDKEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write().await;
        listeners.entry(event_type.to_string()).or_default().push(Box::new(listener));

        let mut stats = self.stats.write().await;
        stats.listener_count = listeners.values().map(|v| v.len()).sum();

        info!("Added listener for event type: {}", event_type);
    }

    pub async fn clear_listeners(&self) {
        self.listeners.write().await.clear();
        self.stats.write().await.listener_count = 0;
        info!("Cleared all event listeners");
    }

    pub async fn get_stats(&self) -> EventStats {
        self.stats.read().await.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub mod event_builders {
    use super::*;

    pub fn sync_state_changed(
        local_id: &str,
        item_type: ItemType,
        new_state: SyncState,
        error: Option<String>,
    ) -> SDKEvent {
        SDKEvent::SyncStateChanged {
            local_id: local_id.to_string(),
            item_type,
            new_state,
            error,
            timestamp: now_millis(),
        }
    }

    pub fn drain_completed(report: DrainReport) -> SDKEvent {
        SDKEvent::SyncDrainCompleted { report, timestamp: now_millis() }
    }

    pub fn clock_outcome(boundary_id: &str, kind: ClockKind, feedback: ClockFeedback) -> SDKEvent {
        SDKEvent::ClockOutcome {
            boundary_id: boundary_id.to_string(),
            kind,
            feedback,
            timestamp: now_millis(),
        }
    }

    pub fn clock_retry_dropped(entry_id: &str, kind: ClockKind, reason: impl Into<String>) -> SDKEvent {
        SDKEvent::ClockRetryDropped {
            entry_id: entry_id.to_string(),
            kind,
            reason: reason.into(),
            timestamp: now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_emit_reaches_subscribers_and_listeners() {
        let manager = EventManager::new(16);
        let mut receiver = manager.subscribe();

        let typed = Arc::new(AtomicUsize::new(0));
        let all = Arc::new(AtomicUsize::new(0));
        {
            let typed = typed.clone();
            manager
                .add_listener("sync_drain_completed", move |_| {
                    typed.fetch_add(1, Ordering::SeqCst);
                })
                .await;
            let all = all.clone();
            manager
                .add_listener("*", move |_| {
                    all.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        manager.emit(event_builders::drain_completed(DrainReport::default())).await;
        manager
            .emit(event_builders::sync_state_changed("l1", ItemType::Photo, SyncState::Synced, None))
            .await;

        assert_eq!(receiver.recv().await.unwrap().event_type(), "sync_drain_completed");
        assert_eq!(receiver.recv().await.unwrap().event_type(), "sync_state_changed");
        assert_eq!(typed.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 2);

        let stats = manager.get_stats().await;
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.listener_count, 2);
        assert_eq!(stats.events_by_type.get("sync_state_changed"), Some(&1));
        assert_eq!(manager.subscriber_count(), 1);

        manager.clear_listeners().await;
        manager.emit(event_builders::drain_completed(DrainReport::default())).await;
        assert_eq!(typed.load(Ordering::SeqCst), 1);
        assert_eq!(manager.get_stats().await.listener_count, 0);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_fine() {
        let manager = EventManager::new(4);
        manager.emit(event_builders::drain_completed(DrainReport::default())).await;
        assert_eq!(manager.get_stats().await.total_events, 1);
    }
}
