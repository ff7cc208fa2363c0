use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::select;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{FieldSyncError, Result};
use crate::events::{event_builders, EventManager};
use crate::network::ConnectivityMonitor;
use crate::remote::{RemoteApi, UploadRequest};
use crate::storage::entities::{ItemType, SyncAction, SyncQueueEntry, SyncState};
use crate::storage::queue::retry_policy::RetryPolicy;
use crate::storage::LocalStore;

/// 同步处理器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// 不同 local_id 的最大并发数
    pub worker_limit: usize,
    /// 单次远端调用超时（秒）
    pub remote_timeout_secs: u64,
    /// 兜底定时触发间隔（秒）
    pub fallback_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            worker_limit: 3,
            remote_timeout_secs: 30,
            fallback_interval_secs: 120,
        }
    }
}

/// 一轮处理结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// 本轮实际尝试的条目数
    pub processed: usize,
    pub succeeded: usize,
    pub failed_permanently: usize,
    /// 留待下一轮的条目数（含未开始的同 key 后续条目）
    pub deferred: usize,
}

impl DrainReport {
    fn merge(&mut self, other: &DrainReport) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed_permanently += other.failed_permanently;
        self.deferred += other.deferred;
    }
}

/// 同步统计信息
#[derive(Debug, Clone, Default)]
pub struct SyncMetrics {
    pub attempt_total: u64,
    pub success_total: u64,
    pub transient_failure_total: u64,
    pub permanent_failure_total: u64,
    pub drain_total: u64,
    pub drain_skipped_offline: u64,
    pub coalesced_triggers: u64,
}

impl SyncMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.attempt_total == 0 {
            0.0
        } else {
            self.success_total as f64 / self.attempt_total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Succeeded,
    FailedPermanently,
    Deferred,
}

/// 同步队列处理器
///
/// 按创建顺序消费队列；同一 local_id 串行，不同 local_id 最多 `worker_limit` 个并发。
pub struct SyncQueueProcessor {
    config: SyncConfig,
    retry_policy: RetryPolicy,
    store: LocalStore,
    remote: Arc<dyn RemoteApi>,
    network_monitor: Arc<ConnectivityMonitor>,
    event_manager: Arc<EventManager>,

    // local_id 级串行控制
    key_locks: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,

    metrics: Arc<RwLock<SyncMetrics>>,

    draining: AtomicBool,
    rerun_requested: AtomicBool,
    /// 新触发到来时唤醒退避等待
    wake: Notify,

    shutdown_signal: Arc<Notify>,
    is_running: AtomicBool,
}

impl std::fmt::Debug for SyncQueueProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueueProcessor")
            .field("config", &self.config)
            .field("draining", &self.draining.load(Ordering::SeqCst))
            .finish()
    }
}

impl SyncQueueProcessor {
    pub fn new(
        config: SyncConfig,
        retry_policy: RetryPolicy,
        store: LocalStore,
        remote: Arc<dyn RemoteApi>,
        network_monitor: Arc<ConnectivityMonitor>,
        event_manager: Arc<EventManager>,
    ) -> Self {
        Self {
            config,
            retry_policy,
            store,
            remote,
            network_monitor,
            event_manager,
            key_locks: Arc::new(RwLock::new(HashMap::new())),
            metrics: Arc::new(RwLock::new(SyncMetrics::default())),
            draining: AtomicBool::new(false),
            rerun_requested: AtomicBool::new(false),
            wake: Notify::new(),
            shutdown_signal: Arc::new(Notify::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// 启动后台触发循环：网络恢复、兜底定时器
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(FieldSyncError::InvalidArgument("SyncQueueProcessor already running".to_string()));
        }

        info!(
            "Starting SyncQueueProcessor (workers={}, fallback={}s)",
            self.config.worker_limit, self.config.fallback_interval_secs
        );

        let this = Arc::clone(self);
        let mut network_events = self.network_monitor.subscribe_events();
        let shutdown = self.shutdown_signal.clone();
        let fallback = Duration::from_secs(self.config.fallback_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + fallback, fallback);
            loop {
                select! {
                    _ = shutdown.notified() => {
                        info!("SyncQueueProcessor received shutdown signal");
                        break;
                    }
                    event = network_events.recv() => {
                        match event {
                            Ok(event) if event.new_status.online && !event.old_status.online => {
                                info!("网络恢复，触发同步队列处理");
                                this.trigger();
                            }
                            Ok(_) => {}
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = ticker.tick() => {
                        debug!("兜底定时器触发同步队列处理");
                        this.trigger();
                    }
                }
            }
            info!("SyncQueueProcessor trigger loop stopped");
        });

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop(&self) {
        if self.is_running.swap(false, Ordering::SeqCst) {
            info!("Stopping SyncQueueProcessor");
        }
        self.shutdown_signal.notify_waiters();
        self.wake.notify_waiters();
    }

    /// 后台触发一次处理；与正在进行的处理合并
    pub fn trigger(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.drain().await;
        });
    }

    /// 执行处理
    ///
    /// 已有处理在进行时只登记一次后续处理并返回 None；
    /// 否则循环处理直到没有新的触发，返回最后一轮的结果。
    pub async fn drain(&self) -> Option<DrainReport> {
        if self.draining.swap(true, Ordering::SeqCst) {
            self.rerun_requested.store(true, Ordering::SeqCst);
            self.metrics.write().await.coalesced_triggers += 1;
            self.wake.notify_waiters();
            debug!("处理进行中，本次触发已合并");
            return None;
        }

        let mut last_report;
        loop {
            self.rerun_requested.store(false, Ordering::SeqCst);
            last_report = self.drain_once().await;

            if self.rerun_requested.swap(false, Ordering::SeqCst) {
                continue;
            }
            self.draining.store(false, Ordering::SeqCst);
            // 释放标记与新触发之间的竞态
            if self.rerun_requested.load(Ordering::SeqCst) && !self.draining.swap(true, Ordering::SeqCst) {
                continue;
            }
            break;
        }
        Some(last_report)
    }

    async fn drain_once(&self) -> DrainReport {
        if !self.network_monitor.is_online().await {
            debug!("离线，跳过同步队列处理");
            self.metrics.write().await.drain_skipped_offline += 1;
            return DrainReport::default();
        }

        let entries = match self.store.list_pending().await {
            Ok(entries) => entries,
            Err(e) => {
                error!("读取同步队列失败: {}", e);
                return DrainReport::default();
            }
        };

        if entries.is_empty() {
            return DrainReport::default();
        }

        let groups = group_by_local_id(entries);
        info!("开始处理同步队列: {} 个 local_id", groups.len());

        let report = Mutex::new(DrainReport::default());
        futures::stream::iter(groups)
            .for_each_concurrent(self.config.worker_limit.max(1), |(local_id, entries)| {
                let report = &report;
                async move {
                    let group_report = self.process_group(&local_id, entries).await;
                    report.lock().await.merge(&group_report);
                }
            })
            .await;

        let report = report.into_inner();
        self.metrics.write().await.drain_total += 1;
        info!(
            "同步队列处理完成: processed={}, succeeded={}, failed={}, deferred={}",
            report.processed, report.succeeded, report.failed_permanently, report.deferred
        );
        self.event_manager.emit(event_builders::drain_completed(report)).await;
        report
    }

    async fn get_key_lock(&self, local_id: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.key_locks.read().await;
            if let Some(lock) = locks.get(local_id) {
                return lock.clone();
            }
        }
        let mut locks = self.key_locks.write().await;
        locks
            .entry(local_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 串行处理同一 local_id 的条目；遇到需要延后的条目即停止
    async fn process_group(&self, local_id: &str, entries: Vec<SyncQueueEntry>) -> DrainReport {
        let lock = self.get_key_lock(local_id).await;
        let _guard = lock.lock().await;

        let mut report = DrainReport::default();
        let total = entries.len();
        for (index, entry) in entries.into_iter().enumerate() {
            report.processed += 1;
            match self.process_entry(entry).await {
                EntryOutcome::Succeeded => report.succeeded += 1,
                EntryOutcome::FailedPermanently => report.failed_permanently += 1,
                EntryOutcome::Deferred => {
                    report.deferred += total - index;
                    break;
                }
            }
        }

        drop(_guard);
        self.key_locks.write().await.remove(local_id);
        report
    }

    async fn process_entry(&self, entry: SyncQueueEntry) -> EntryOutcome {
        debug!("处理队列条目: id={}, local_id={}, action={}", entry.id, entry.local_id, entry.action);

        if let Err(e) = self.store.mark_syncing(&entry).await {
            error!("标记 syncing 失败: {}", e);
            return EntryOutcome::Deferred;
        }
        self.emit_state(&entry, SyncState::Syncing, None).await;

        let request = match self.build_request(&entry).await {
            Ok(request) => request,
            Err(e) if e.kind() == crate::error::FailureKind::Storage => {
                error!("读取工作项失败: {}", e);
                return EntryOutcome::Deferred;
            }
            Err(e) => return self.fail_permanently(&entry, &e).await,
        };

        let call_timeout = Duration::from_secs(self.config.remote_timeout_secs);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.metrics.write().await.attempt_total += 1;

            let result = match timeout(call_timeout, self.remote.upload_item(&request)).await {
                Ok(result) => result,
                Err(_) => Err(FieldSyncError::Timeout(format!("upload {} 超时", entry.local_id))),
            };

            let error = match result {
                Ok(response) => {
                    self.metrics.write().await.success_total += 1;
                    return self.complete(&entry, response.remote_id.as_deref()).await;
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                return self.fail_permanently(&entry, &error).await;
            }

            self.metrics.write().await.transient_failure_total += 1;
            let message = error.to_string();
            if let Err(e) = self.store.record_transient_failure(&entry, &message).await {
                error!("记录失败状态出错: {}", e);
            }
            self.emit_state(&entry, SyncState::Error, Some(message.clone())).await;

            if !self.retry_policy.should_retry(attempt) {
                warn!("⚠️ {} 连续 {} 次瞬时失败，留待下一轮: {}", entry.local_id, attempt, message);
                return EntryOutcome::Deferred;
            }

            let delay = self.retry_policy.delay_for_attempt(attempt);
            debug!("{} 第 {} 次失败，{:?} 后重试", entry.local_id, attempt, delay);
            select! {
                _ = sleep(delay) => {}
                _ = self.wake.notified() => {
                    debug!("新的触发到来，放弃本次退避");
                    return EntryOutcome::Deferred;
                }
            }
        }
    }

    async fn build_request(&self, entry: &SyncQueueEntry) -> Result<UploadRequest> {
        let data = if entry.item_type == ItemType::Photo && entry.action != SyncAction::Delete {
            let item = self.store.get(&entry.local_id).await?.ok_or_else(|| {
                FieldSyncError::MissingAssociation(format!("照片工作项不存在: {}", entry.local_id))
            })?;
            Some(item.data)
        } else {
            None
        };
        Ok(UploadRequest::from_entry(entry, data))
    }

    async fn complete(&self, entry: &SyncQueueEntry, remote_id: Option<&str>) -> EntryOutcome {
        match self.store.complete_entry(entry, remote_id).await {
            Ok(true) => {
                debug!("✅ 同步成功: local_id={}, remote_id={:?}", entry.local_id, remote_id);
                self.emit_state(entry, SyncState::Synced, None).await;
            }
            Ok(false) => {
                // 处理期间被重新入队，留给下一次处理
                self.emit_state(entry, SyncState::Pending, None).await;
            }
            Err(e) => {
                error!("写入同步结果失败: {}", e);
                return EntryOutcome::Deferred;
            }
        }
        EntryOutcome::Succeeded
    }

    async fn fail_permanently(&self, entry: &SyncQueueEntry, error: &FieldSyncError) -> EntryOutcome {
        self.metrics.write().await.permanent_failure_total += 1;
        let message = error.to_string();
        warn!("⚠️ 同步永久失败，不再重试: local_id={}, error={}", entry.local_id, message);
        if let Err(e) = self.store.fail_entry_permanently(entry, &message).await {
            error!("写入永久失败状态出错: {}", e);
        }
        self.emit_state(entry, SyncState::Error, Some(message)).await;
        EntryOutcome::FailedPermanently
    }

    async fn emit_state(&self, entry: &SyncQueueEntry, state: SyncState, error: Option<String>) {
        if entry.action == SyncAction::Delete {
            return;
        }
        self.event_manager
            .emit(event_builders::sync_state_changed(&entry.local_id, entry.item_type, state, error))
            .await;
    }

    pub async fn get_metrics(&self) -> SyncMetrics {
        self.metrics.read().await.clone()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }
}

/// 按 local_id 分组，组间保持首次出现顺序，组内保持创建顺序
fn group_by_local_id(entries: Vec<SyncQueueEntry>) -> Vec<(String, Vec<SyncQueueEntry>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<SyncQueueEntry>)> = Vec::new();
    for entry in entries {
        match index.get(&entry.local_id) {
            Some(&i) => groups[i].1.push(entry),
            None => {
                index.insert(entry.local_id.clone(), groups.len());
                groups.push((entry.local_id.clone(), vec![entry]));
            }
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ConnectionKind, DummyNetworkStatusListener, NetworkStatus};
    use crate::storage::entities::{WorkItem, WorkItemMetadata};
    use crate::testing::{FakeRemote, Scripted};

    struct Harness {
        store: LocalStore,
        remote: Arc<FakeRemote>,
        listener: Arc<DummyNetworkStatusListener>,
        processor: Arc<SyncQueueProcessor>,
    }

    fn harness() -> Harness {
        let store = LocalStore::open_in_memory().unwrap();
        let remote = Arc::new(FakeRemote::default());
        let listener = Arc::new(DummyNetworkStatusListener::new(NetworkStatus::online(ConnectionKind::Wifi)));
        let monitor = Arc::new(ConnectivityMonitor::new(listener.clone()));
        let processor = Arc::new(SyncQueueProcessor::new(
            SyncConfig::default(),
            RetryPolicy::default(),
            store.clone(),
            remote.clone(),
            monitor,
            Arc::new(EventManager::new(64)),
        ));
        Harness { store, remote, listener, processor }
    }

    fn task_entry(local_id: &str, action: SyncAction, created_at: i64) -> SyncQueueEntry {
        let mut entry = SyncQueueEntry::new(
            ItemType::Task,
            local_id,
            "project-1",
            action,
            serde_json::json!({ "remote_id": "r-existing" }),
        );
        entry.created_at = created_at;
        entry
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_serial_other_keys_concurrent() {
        let h = harness();
        h.remote.set_upload_delay(Duration::from_millis(100));

        h.store.enqueue(&task_entry("local-1", SyncAction::Create, 1)).await.unwrap();
        h.store.enqueue(&task_entry("local-1", SyncAction::Update, 2)).await.unwrap();
        h.store.enqueue(&task_entry("local-2", SyncAction::Create, 3)).await.unwrap();

        let report = h.processor.drain().await.unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.succeeded, 3);

        let log = h.remote.upload_log();
        let pos = |marker: &str| log.iter().position(|l| l == marker).unwrap();
        assert!(pos("end:create:local-1") < pos("start:update:local-1"));
        assert!(pos("start:create:local-2") < pos("end:create:local-1"));
        assert!(h.store.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_leave_entry_queued() {
        let h = harness();
        h.remote.script_upload("local-1", vec![Scripted::Transient; 5]);
        h.store.enqueue(&task_entry("local-1", SyncAction::Create, 1)).await.unwrap();
        h.store.enqueue(&task_entry("local-1", SyncAction::Update, 2)).await.unwrap();

        let started = tokio::time::Instant::now();
        let report = h.processor.drain().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.deferred, 2);
        // 1s + 2s 退避
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(h.remote.upload_count(), 3);

        let pending = h.store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].retry_count, 3);
        assert!(pending[0].error.is_some());

        // 下一轮：剩余 2 次瞬时失败后成功
        let report = h.processor.drain().await.unwrap();
        assert_eq!(report.succeeded, 2);
        assert!(h.store.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_removes_entry_and_continues() {
        let h = harness();
        let item = WorkItem::new("project-1", ItemType::Task, Vec::new(), WorkItemMetadata::default());
        let entry = h.store.save_and_enqueue(&item).await.unwrap();
        h.remote.script_upload(&item.id, vec![Scripted::Permanent]);
        h.store.enqueue(&task_entry("local-2", SyncAction::Create, entry.created_at + 1)).await.unwrap();

        let report = h.processor.drain().await.unwrap();
        assert_eq!(report.failed_permanently, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(h.remote.upload_count(), 2);

        let failed = h.store.get(&item.id).await.unwrap().unwrap();
        assert_eq!(failed.sync_state, SyncState::Error);
        assert!(failed.sync_error.is_some());
        assert!(failed.remote_id.is_none());
        assert!(h.store.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_marks_synced() {
        let h = harness();
        let item = WorkItem::new("project-1", ItemType::Photo, vec![1, 2, 3], WorkItemMetadata::default());
        h.store.save_and_enqueue(&item).await.unwrap();

        let report = h.processor.drain().await.unwrap();
        assert_eq!(report.succeeded, 1);

        let synced = h.store.get(&item.id).await.unwrap().unwrap();
        assert_eq!(synced.sync_state, SyncState::Synced);
        assert_eq!(synced.remote_id.as_deref(), Some(format!("remote-{}", item.id).as_str()));
        assert_eq!(h.remote.uploads()[0].data.as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(h.remote.uploads()[0].idempotency_key, crate::storage::entities::queue_entry_id(
            ItemType::Photo, &item.id, SyncAction::Create
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_drain_is_skipped() {
        let h = harness();
        h.listener.push(NetworkStatus::offline());
        h.store.enqueue(&task_entry("local-1", SyncAction::Create, 1)).await.unwrap();

        let report = h.processor.drain().await.unwrap();
        assert_eq!(report, DrainReport::default());
        assert_eq!(h.remote.upload_count(), 0);
        assert_eq!(h.processor.get_metrics().await.drain_skipped_offline, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_create_upload_follows_with_update() {
        let h = harness();
        h.remote.set_upload_delay(Duration::from_millis(100));
        let mut item = WorkItem::new("project-1", ItemType::Task, Vec::new(), WorkItemMetadata::default());
        h.store.save_and_enqueue(&item).await.unwrap();

        let processor = h.processor.clone();
        let running = tokio::spawn(async move { processor.drain().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        item.metadata.caption = Some("edited".to_string());
        h.store.save_and_enqueue(&item).await.unwrap();
        running.await.unwrap();

        h.processor.drain().await;

        let uploads = h.remote.uploads();
        let remote_id = format!("remote-{}", item.id);
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].action, SyncAction::Create);
        assert_eq!(uploads[1].action, SyncAction::Update);
        assert_eq!(uploads[1].remote_id.as_deref(), Some(remote_id.as_str()));
        assert_ne!(uploads[0].idempotency_key, uploads[1].idempotency_key);

        let synced = h.store.get(&item.id).await.unwrap().unwrap();
        assert_eq!(synced.sync_state, SyncState::Synced);
        assert_eq!(synced.remote_id.as_deref(), Some(remote_id.as_str()));
        assert!(h.store.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unrecorded_success_is_deferred() {
        let h = harness();
        h.remote.omit_remote_ids(true);
        let item = WorkItem::new("project-1", ItemType::Task, Vec::new(), WorkItemMetadata::default());
        h.store.save_and_enqueue(&item).await.unwrap();

        // 响应缺少 remote_id，结果无法落库
        let report = h.processor.drain().await.unwrap();
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.deferred, 1);
        assert_eq!(h.store.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_during_drain_is_coalesced() {
        let h = harness();
        h.remote.script_upload("local-1", vec![Scripted::Transient]);
        h.store.enqueue(&task_entry("local-1", SyncAction::Create, 1)).await.unwrap();

        let processor = h.processor.clone();
        let running = tokio::spawn(async move { processor.drain().await });

        // 等第一轮进入退避
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(h.processor.is_draining());
        assert!(h.processor.drain().await.is_none());
        assert!(h.processor.drain().await.is_none());

        // 退避被新触发打断，合并后的后续处理完成上传
        let report = running.await.unwrap().unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(h.remote.upload_count(), 2);
        assert_eq!(h.processor.get_metrics().await.coalesced_triggers, 2);
        assert!(h.store.list_pending().await.unwrap().is_empty());
    }

    #[test]
    fn test_success_rate() {
        assert_eq!(SyncMetrics::default().success_rate(), 0.0);
        let metrics = SyncMetrics { attempt_total: 4, success_total: 3, ..Default::default() };
        assert!((metrics.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_grouping_preserves_order() {
        let groups = group_by_local_id(vec![
            task_entry("b", SyncAction::Create, 1),
            task_entry("a", SyncAction::Create, 2),
            task_entry("b", SyncAction::Update, 3),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "b");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[0].1[1].action, SyncAction::Update);
        assert_eq!(groups[1].0, "a");
    }
}
