use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::crossing::{transition, CrossingEffect, CrossingEvent, CrossingState};
use super::{
    ClockConfig, ClockFeedback, ClockKind, ClockNotification, ClockStatusCache, NotificationAction,
    NotificationExtra, Notifier,
};
use crate::error::{FieldSyncError, Result};
use crate::events::{event_builders, EventManager, SDKEvent};
use crate::location::{LocationLogger, PositionProvider};
use crate::remote::{BoundaryInfo, ClockRequest, RemoteApi};
use crate::storage::queue::{retry_with_backoff, ClockRetryEntry, ClockRetryQueue, ReplayReport, RetryPolicy};
use crate::utils::now_millis;

const GENERIC_SITE_NAME: &str = "your job site";

/// 打卡管理器
///
/// 单一 actor：按顺序消费围栏进出事件与通知点击。
#[derive(Debug)]
pub struct ClockManager {
    config: ClockConfig,
    retry_policy: RetryPolicy,
    remote: Arc<dyn RemoteApi>,
    notifier: Arc<dyn Notifier>,
    position: Arc<dyn PositionProvider>,
    status_cache: Arc<ClockStatusCache>,
    retry_queue: Arc<ClockRetryQueue>,
    location_logger: Arc<LocationLogger>,
    event_manager: Arc<EventManager>,
    states: Mutex<HashMap<String, CrossingState>>,
    recent_prompts: Mutex<HashMap<(String, ClockKind), Instant>>,
    /// 已被点击执行过的提示；新提示发出时清除
    answered_prompts: Mutex<HashMap<(String, ClockKind), Instant>>,
}

impl ClockManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ClockConfig,
        retry_policy: RetryPolicy,
        remote: Arc<dyn RemoteApi>,
        notifier: Arc<dyn Notifier>,
        position: Arc<dyn PositionProvider>,
        status_cache: Arc<ClockStatusCache>,
        retry_queue: Arc<ClockRetryQueue>,
        location_logger: Arc<LocationLogger>,
        event_manager: Arc<EventManager>,
    ) -> Self {
        Self {
            config,
            retry_policy,
            remote,
            notifier,
            position,
            status_cache,
            retry_queue,
            location_logger,
            event_manager,
            states: Mutex::new(HashMap::new()),
            recent_prompts: Mutex::new(HashMap::new()),
            answered_prompts: Mutex::new(HashMap::new()),
        }
    }

    pub fn retry_queue(&self) -> &Arc<ClockRetryQueue> {
        &self.retry_queue
    }

    pub fn crossing_state(&self, boundary_id: &str) -> CrossingState {
        self.states.lock().get(boundary_id).copied().unwrap_or_default()
    }

    /// 启动事件循环，直到 token 取消或两个通道都关闭
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        mut crossings: mpsc::Receiver<CrossingEvent>,
        mut taps: mpsc::Receiver<NotificationAction>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            info!("打卡事件循环已启动");
            let mut crossings_open = true;
            let mut taps_open = true;
            while crossings_open || taps_open {
                select! {
                    _ = shutdown.cancelled() => break,
                    event = crossings.recv(), if crossings_open => match event {
                        Some(event) => {
                            if let Err(e) = this.handle_crossing(event).await {
                                error!("处理围栏事件失败: {}", e);
                            }
                        }
                        None => crossings_open = false,
                    },
                    tap = taps.recv(), if taps_open => match tap {
                        Some(action) => {
                            this.handle_tap(action).await;
                        }
                        None => taps_open = false,
                    },
                }
            }
            info!("打卡事件循环已退出");
        })
    }

    /// 处理一次进出事件
    #[instrument(skip(self))]
    pub async fn handle_crossing(&self, event: CrossingEvent) -> Result<()> {
        let clocked_in = self.status_cache.read_through_or_stale().await.is_clocked_in();

        let previous = self.crossing_state(&event.boundary_id);
        let t = transition(previous, event.direction, clocked_in);
        self.states.lock().insert(event.boundary_id.clone(), t.next);
        debug!(
            "围栏 {} 状态: {:?} -> {:?} (clocked_in={})",
            event.boundary_id, previous, t.next, clocked_in
        );

        match t.effect {
            CrossingEffect::None => Ok(()),
            CrossingEffect::Prompt(kind) => self.prompt(&event.boundary_id, kind).await,
        }
    }

    /// 去重窗口内已提示过则返回 false，否则登记并返回 true
    fn claim_prompt(&self, boundary_id: &str, kind: ClockKind) -> bool {
        let window = Duration::from_secs(self.config.prompt_dedup_secs);
        let now = Instant::now();
        let mut recent = self.recent_prompts.lock();
        recent.retain(|_, at| now.duration_since(*at) < window);
        let key = (boundary_id.to_string(), kind);
        if recent.contains_key(&key) {
            return false;
        }
        recent.insert(key, now);
        true
    }

    /// 通知点击：同一条提示只执行一次打卡，重复投递在去重窗口内丢弃
    pub async fn handle_tap(&self, action: NotificationAction) -> Option<ClockFeedback> {
        if !self.claim_tap(&action.boundary_id, action.kind) {
            info!("重复的通知点击，忽略: boundary={}, kind={}", action.boundary_id, action.kind);
            return None;
        }
        Some(self.perform_clock(action.kind, &action.boundary_id).await)
    }

    fn claim_tap(&self, boundary_id: &str, kind: ClockKind) -> bool {
        let window = Duration::from_secs(self.config.prompt_dedup_secs);
        let now = Instant::now();
        let mut answered = self.answered_prompts.lock();
        answered.retain(|_, at| now.duration_since(*at) < window);
        let key = (boundary_id.to_string(), kind);
        if answered.contains_key(&key) {
            return false;
        }
        answered.insert(key, now);
        true
    }

    async fn prompt(&self, boundary_id: &str, kind: ClockKind) -> Result<()> {
        if !self.claim_prompt(boundary_id, kind) {
            debug!("去重窗口内已提示过: {} {}", boundary_id, kind);
            return Ok(());
        }

        let site_name = match self.lookup_boundary(boundary_id).await {
            Ok(info) => match (kind, info.project_id.as_ref()) {
                (ClockKind::ClockIn, None) => {
                    return self.notify_manual(boundary_id, kind, "no project linked to this site").await;
                }
                _ => info.project_name.unwrap_or_else(|| GENERIC_SITE_NAME.to_string()),
            },
            Err(e) if e.is_transient() || kind == ClockKind::ClockOut => {
                debug!("查询围栏信息失败，使用通用名称: {}", e);
                GENERIC_SITE_NAME.to_string()
            }
            Err(e) => {
                return self.notify_manual(boundary_id, kind, &e.to_string()).await;
            }
        };

        let notification = build_prompt(boundary_id, kind, &site_name);
        self.answered_prompts.lock().remove(&(boundary_id.to_string(), kind));
        if let Err(e) = self.notifier.schedule_prompt(&notification).await {
            warn!("⚠️ 推送打卡提示失败: {}", e);
        }
        info!("已提示 {}: boundary={}", kind, boundary_id);
        self.event_manager
            .emit(SDKEvent::ClockPromptScheduled {
                boundary_id: boundary_id.to_string(),
                kind,
                timestamp: now_millis(),
            })
            .await;
        Ok(())
    }

    /// 无法自动打卡：只发一条"请手动打卡"提示，不入队
    async fn notify_manual(&self, boundary_id: &str, kind: ClockKind, reason: &str) -> Result<()> {
        warn!("⚠️ 无法自动{}，提示手动操作: boundary={}, reason={}", kind, boundary_id, reason);
        let feedback = ClockFeedback::Failed(reason.to_string());
        self.finish(boundary_id, kind, feedback, manual_message(kind)).await;
        Ok(())
    }

    async fn lookup_boundary(&self, boundary_id: &str) -> Result<BoundaryInfo> {
        self.call_with_timeout(self.remote.boundary_info(boundary_id)).await
    }

    async fn call_with_timeout<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(Duration::from_secs(self.config.remote_timeout_secs), call).await {
            Ok(result) => result,
            Err(_) => Err(FieldSyncError::Timeout("远端调用超时".to_string())),
        }
    }

    /// 解析 project id；上班打卡必须有
    async fn resolve_project(&self, kind: ClockKind, boundary_id: &str) -> Result<Option<String>> {
        let lookup = retry_with_backoff(&self.retry_policy, "boundary lookup", |_| {
            self.lookup_boundary(boundary_id)
        })
        .await;

        match (kind, lookup) {
            (ClockKind::ClockIn, Ok(info)) => info.project_id.map(Some).ok_or_else(|| {
                FieldSyncError::MissingAssociation(format!("围栏 {} 未关联项目", boundary_id))
            }),
            (ClockKind::ClockOut, Ok(info)) => Ok(info.project_id),
            (ClockKind::ClockOut, Err(e)) => {
                debug!("下班打卡忽略围栏查询失败: {}", e);
                Ok(None)
            }
            (ClockKind::ClockIn, Err(e)) => Err(e),
        }
    }

    /// 执行打卡；返回的反馈已展示给用户
    #[instrument(skip(self))]
    pub async fn perform_clock(&self, kind: ClockKind, boundary_id: &str) -> ClockFeedback {
        // 1. 采样位置
        let fix = match self.position.current_position(&self.config.position).await {
            Ok(fix) => fix,
            Err(e) => {
                let feedback = ClockFeedback::Failed(format!("无法获取位置: {}", e));
                return self.finish(boundary_id, kind, feedback, "Couldn't get your location. Please try again.").await;
            }
        };

        // 2. 解析项目
        let project_id = match self.resolve_project(kind, boundary_id).await {
            Ok(project_id) => project_id,
            Err(e) if e.is_transient() => {
                return self
                    .queue_for_retry(ClockRetryEntry::new(kind, boundary_id, None, fix.coordinate, fix.accuracy))
                    .await;
            }
            Err(e) => {
                let feedback = ClockFeedback::Failed(e.to_string());
                return self.finish(boundary_id, kind, feedback, manual_message(kind)).await;
            }
        };

        // 3. 带退避调用打卡接口
        let request = ClockRequest::new(kind, project_id.clone(), fix.coordinate, fix.accuracy);
        let result = retry_with_backoff(&self.retry_policy, "clock", |_| {
            self.call_with_timeout(self.remote.clock(&request))
        })
        .await;

        match result {
            // 4. 成功
            Ok(()) => {
                self.apply_clock_state(kind);
                self.finish(boundary_id, kind, ClockFeedback::Completed, success_message(kind)).await
            }
            // 5. 瞬时失败用尽
            Err(e) if e.is_transient() => {
                warn!("⚠️ {} 多次失败，进入重试队列: {}", kind, e);
                self.queue_for_retry(ClockRetryEntry::new(kind, boundary_id, project_id, fix.coordinate, fix.accuracy))
                    .await
            }
            // 6. 永久失败
            Err(e) => {
                let feedback = ClockFeedback::Failed(e.to_string());
                self.finish(boundary_id, kind, feedback, "Clock request was rejected. Please contact your supervisor.").await
            }
        }
    }

    async fn queue_for_retry(&self, entry: ClockRetryEntry) -> ClockFeedback {
        let kind = entry.kind;
        let boundary_id = entry.boundary_id.clone();

        match self.retry_queue.push(entry) {
            Ok(evicted) => {
                if let Some(evicted) = evicted {
                    self.event_manager
                        .emit(event_builders::clock_retry_dropped(&evicted.id, evicted.kind, "evicted: retry queue full"))
                        .await;
                }
            }
            Err(e) => {
                error!("写入打卡重试队列失败: {}", e);
                let feedback = ClockFeedback::Failed(e.to_string());
                return self.finish(&boundary_id, kind, feedback, manual_message(kind)).await;
            }
        }

        // 下班打卡排队即视为已下班
        if kind == ClockKind::ClockOut {
            self.location_logger.stop();
        }

        self.finish(
            &boundary_id,
            kind,
            ClockFeedback::Queued,
            "You're offline. Your clock request was saved and will sync automatically.",
        )
        .await
    }

    fn apply_clock_state(&self, kind: ClockKind) {
        match kind {
            ClockKind::ClockIn => {
                self.status_cache.set(true);
                self.location_logger.start();
            }
            ClockKind::ClockOut => {
                self.status_cache.set(false);
                self.location_logger.stop();
            }
        }
    }

    async fn finish(&self, boundary_id: &str, kind: ClockKind, feedback: ClockFeedback, message: &str) -> ClockFeedback {
        if let Err(e) = self.notifier.show_feedback(kind, &feedback, message).await {
            warn!("⚠️ 展示打卡结果失败: {}", e);
        }
        self.event_manager
            .emit(event_builders::clock_outcome(boundary_id, kind, feedback.clone()))
            .await;
        feedback
    }

    /// 联网后补发重试队列
    #[instrument(skip(self))]
    pub async fn replay_retry_queue(&self) -> Result<ReplayReport> {
        if self.retry_queue.is_empty() {
            return Ok(ReplayReport::default());
        }
        info!("补发打卡重试队列: {} 条", self.retry_queue.len());

        let report = self.retry_queue.replay(|entry| self.replay_one(entry)).await?;

        for entry in &report.replayed {
            self.apply_clock_state(entry.kind);
            self.event_manager
                .emit(SDKEvent::ClockRetryReplayed {
                    entry_id: entry.id.clone(),
                    kind: entry.kind,
                    timestamp: now_millis(),
                })
                .await;
        }
        for (entry, reason) in &report.dropped {
            self.event_manager
                .emit(event_builders::clock_retry_dropped(&entry.id, entry.kind, reason.clone()))
                .await;
        }
        Ok(report)
    }

    async fn replay_one(&self, entry: ClockRetryEntry) -> Result<()> {
        let project_id = match (entry.kind, entry.project_id.clone()) {
            (ClockKind::ClockIn, None) => Some(
                self.lookup_boundary(&entry.boundary_id)
                    .await?
                    .project_id
                    .ok_or_else(|| {
                        FieldSyncError::MissingAssociation(format!("围栏 {} 未关联项目", entry.boundary_id))
                    })?,
            ),
            (_, project_id) => project_id,
        };
        let request = ClockRequest::new(entry.kind, project_id, entry.coordinate, entry.accuracy);
        self.call_with_timeout(self.remote.clock(&request)).await
    }
}

fn build_prompt(boundary_id: &str, kind: ClockKind, site_name: &str) -> ClockNotification {
    let (title, body) = match kind {
        ClockKind::ClockIn => (
            format!("Arrived at {}", site_name),
            "Tap to clock in.".to_string(),
        ),
        ClockKind::ClockOut => (
            format!("Leaving {}", site_name),
            "Tap to clock out.".to_string(),
        ),
    };
    ClockNotification {
        title,
        body,
        extra: NotificationExtra {
            boundary_id: boundary_id.to_string(),
            action: kind.action_str().to_string(),
        },
    }
}

fn manual_message(kind: ClockKind) -> &'static str {
    match kind {
        ClockKind::ClockIn => "Automatic clock-in isn't available for this site. Please clock in manually.",
        ClockKind::ClockOut => "Automatic clock-out failed. Please clock out manually.",
    }
}

fn success_message(kind: ClockKind) -> &'static str {
    match kind {
        ClockKind::ClockIn => "You're clocked in.",
        ClockKind::ClockOut => "You're clocked out.",
    }
}
