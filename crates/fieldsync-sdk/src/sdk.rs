//! 统一 SDK 接口 - FieldSyncSDK 主入口
//!
//! 分层结构：
//! ```text
//! FieldSyncSDK
//!   ├── LocalStore / KvStore      (存储层)
//!   ├── ConnectivityMonitor       (网络监控层)
//!   ├── SyncQueueProcessor        (同步队列层)
//!   ├── GeofenceManager           (围栏层)
//!   ├── ClockManager              (打卡层，含 ClockRetryQueue)
//!   ├── LocationLogger            (定位记录层)
//!   └── EventManager / LifecycleManager
//! ```
//!
//! 平台回调通过 `crossing_sender()` / `notification_sender()` 返回的通道送入 SDK。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::select;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::{
    ClockConfig, ClockFeedback, ClockManager, ClockStatus, ClockStatusCache, CrossingEvent,
    NotificationAction, NotificationExtra, Notifier,
};
use crate::error::{FieldSyncError, Result};
use crate::events::{EventManager, SDKEvent};
use crate::geofence::{BoundarySite, GeofenceConfig, GeofenceManager, GeofencePlatform, ReconcileReport};
use crate::http_client::HttpRemoteApi;
use crate::lifecycle::{LifecycleManager, SyncLifecycleHook};
use crate::location::{LocationConfig, LocationLogger, PositionProvider};
use crate::network::{ConnectivityMonitor, NetworkStatus, NetworkStatusListener};
use crate::remote::RemoteApi;
use crate::storage::entities::{CascadeReport, QueueStats, SyncAction, SyncQueueEntry, WorkItem};
use crate::storage::queue::{
    ClockRetryQueue, DrainReport, ReplayReport, RetryPolicy, SyncConfig, SyncMetrics, SyncQueueProcessor,
};
use crate::storage::{KvStore, LocalStore};
use crate::utils::GeoCoordinate;

/// 重试配置（指数退避）
pub type RetryConfig = RetryPolicy;

const PLATFORM_CHANNEL_CAPACITY: usize = 64;

/// HTTP 客户端配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// 远端 API 基础 URL，例如 https://api.example.com/v1
    pub base_url: String,
    /// Bearer token，由宿主负责刷新
    pub auth_token: Option<String>,
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_token: None,
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(30),
        }
    }
}

/// FieldSync SDK 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSyncConfig {
    /// 数据存储目录（SQLite 与 sled 都在此目录下）
    pub data_dir: PathBuf,
    /// 调试模式：安装 debug 级别的日志 subscriber
    pub debug_mode: bool,
    pub retry: RetryConfig,
    pub sync: SyncConfig,
    pub geofence: GeofenceConfig,
    pub clock: ClockConfig,
    pub location: LocationConfig,
    pub http: HttpClientConfig,
    /// 事件缓冲区大小
    pub event_buffer_size: usize,
}

impl Default for FieldSyncConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./fieldsync_data"),
            debug_mode: false,
            retry: RetryConfig::default(),
            sync: SyncConfig::default(),
            geofence: GeofenceConfig::default(),
            clock: ClockConfig::default(),
            location: LocationConfig::default(),
            http: HttpClientConfig::default(),
            event_buffer_size: 256,
        }
    }
}

impl FieldSyncConfig {
    pub fn builder() -> FieldSyncConfigBuilder {
        FieldSyncConfigBuilder::new()
    }

    fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(FieldSyncError::Config("data_dir 不能为空".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(FieldSyncError::Config("retry.max_attempts 至少为 1".to_string()));
        }
        if self.sync.worker_limit == 0 {
            return Err(FieldSyncError::Config("sync.worker_limit 至少为 1".to_string()));
        }
        if self.geofence.max_monitored == 0 || self.geofence.radius_miles <= 0.0 {
            return Err(FieldSyncError::Config("geofence 半径与上限必须为正".to_string()));
        }
        if self.location.interval_secs == 0 {
            return Err(FieldSyncError::Config("location.interval_secs 至少为 1".to_string()));
        }
        Ok(())
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct FieldSyncConfigBuilder {
    config: FieldSyncConfig,
}

impl FieldSyncConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.config.debug_mode = enabled;
        self
    }

    pub fn base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.http.base_url = url.into();
        self
    }

    pub fn auth_token<S: Into<String>>(mut self, token: S) -> Self {
        self.config.http.auth_token = Some(token.into());
        self
    }

    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http = config;
        self
    }

    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.config.retry = config;
        self
    }

    pub fn sync_config(mut self, config: SyncConfig) -> Self {
        self.config.sync = config;
        self
    }

    pub fn geofence_config(mut self, config: GeofenceConfig) -> Self {
        self.config.geofence = config;
        self
    }

    pub fn clock_config(mut self, config: ClockConfig) -> Self {
        self.config.clock = config;
        self
    }

    pub fn location_config(mut self, config: LocationConfig) -> Self {
        self.config.location = config;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    pub fn build(self) -> FieldSyncConfig {
        self.config
    }
}

/// 宿主平台提供的能力
#[derive(Debug, Clone)]
pub struct PlatformBindings {
    pub network: Arc<dyn NetworkStatusListener>,
    pub position: Arc<dyn PositionProvider>,
    pub geofence: Arc<dyn GeofencePlatform>,
    pub notifier: Arc<dyn Notifier>,
    /// 为空时按 `FieldSyncConfig::http` 创建 `HttpRemoteApi`
    pub remote: Option<Arc<dyn RemoteApi>>,
}

struct PlatformReceivers {
    crossings: mpsc::Receiver<CrossingEvent>,
    taps: mpsc::Receiver<NotificationAction>,
}

/// 统一 SDK 主接口
pub struct FieldSyncSDK {
    config: FieldSyncConfig,
    store: LocalStore,
    kv: KvStore,
    event_manager: Arc<EventManager>,
    network: Arc<ConnectivityMonitor>,
    processor: Arc<SyncQueueProcessor>,
    geofence: Arc<GeofenceManager>,
    clock: Arc<ClockManager>,
    status_cache: Arc<ClockStatusCache>,
    location_logger: Arc<LocationLogger>,
    lifecycle_manager: Arc<RwLock<LifecycleManager>>,

    crossing_tx: mpsc::Sender<CrossingEvent>,
    tap_tx: mpsc::Sender<NotificationAction>,
    receivers: Mutex<Option<PlatformReceivers>>,

    shutdown_token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for FieldSyncSDK {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSyncSDK")
            .field("data_dir", &self.config.data_dir)
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("shutting_down", &self.shutting_down.load(Ordering::SeqCst))
            .finish()
    }
}

impl FieldSyncSDK {
    /// 初始化 SDK
    ///
    /// 初始化顺序：存储层 → 网络层 → 事件层 → 业务层。不启动后台任务，见 `start`。
    pub async fn initialize(config: FieldSyncConfig, bindings: PlatformBindings) -> Result<Arc<Self>> {
        config.validate()?;
        if config.debug_mode {
            crate::logging::init_logging(true);
        }
        info!("正在初始化 {}", crate::version::version_string());

        // === 第1层：存储 ===
        let store = LocalStore::open(&config.data_dir).await?;
        let kv = KvStore::open(&config.data_dir).await?;

        // === 第2层：网络与远端 ===
        let network = Arc::new(ConnectivityMonitor::new(bindings.network));
        let remote: Arc<dyn RemoteApi> = match bindings.remote {
            Some(remote) => remote,
            None => Arc::new(HttpRemoteApi::new(&config.http)?),
        };

        // === 第3层：事件 ===
        let event_manager = Arc::new(EventManager::new(config.event_buffer_size));

        // === 第4层：业务组件 ===
        let processor = Arc::new(SyncQueueProcessor::new(
            config.sync.clone(),
            config.retry.clone(),
            store.clone(),
            remote.clone(),
            network.clone(),
            event_manager.clone(),
        ));

        let geofence = Arc::new(GeofenceManager::new(
            config.geofence.clone(),
            bindings.geofence,
            bindings.position.clone(),
            event_manager.clone(),
        ));

        let status_cache = Arc::new(ClockStatusCache::new(
            remote.clone(),
            Duration::from_secs(config.clock.status_ttl_secs),
        ));

        let location_logger = Arc::new(LocationLogger::new(
            config.location.clone(),
            store.clone(),
            remote.clone(),
            bindings.position.clone(),
            status_cache.clone(),
            event_manager.clone(),
        ));

        let retry_queue = Arc::new(ClockRetryQueue::new(
            &kv,
            config.clock.retry_queue_max,
            config.clock.retry_max_attempts,
        )?);

        let clock = Arc::new(ClockManager::new(
            config.clock.clone(),
            config.retry.clone(),
            remote,
            bindings.notifier,
            bindings.position,
            status_cache.clone(),
            retry_queue,
            location_logger.clone(),
            event_manager.clone(),
        ));

        // === 第5层：生命周期 ===
        let mut lifecycle = LifecycleManager::new();
        lifecycle.register_hook(Arc::new(SyncLifecycleHook::new(processor.clone())));

        let (crossing_tx, crossings) = mpsc::channel(PLATFORM_CHANNEL_CAPACITY);
        let (tap_tx, taps) = mpsc::channel(PLATFORM_CHANNEL_CAPACITY);

        let sdk = Arc::new(Self {
            config,
            store,
            kv,
            event_manager,
            network,
            processor,
            geofence,
            clock,
            status_cache,
            location_logger,
            lifecycle_manager: Arc::new(RwLock::new(lifecycle)),
            crossing_tx,
            tap_tx,
            receivers: Mutex::new(Some(PlatformReceivers { crossings, taps })),
            shutdown_token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        });

        info!("✅ FieldSyncSDK 初始化完成");
        Ok(sdk)
    }

    /// 启动后台任务：网络监听、同步触发循环、打卡事件循环
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.check_active()?;
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("SDK 已启动");
            return Ok(());
        }

        self.network.start().await?;
        self.processor.start().await?;

        let receivers = self.receivers.lock().take();
        if let Some(PlatformReceivers { crossings, taps }) = receivers {
            let handle = self.clock.spawn_event_loop(crossings, taps, self.shutdown_token.clone());
            self.tasks.lock().push(handle);
        }

        let handle = self.spawn_network_loop();
        self.tasks.lock().push(handle);

        // 启动时按远端状态恢复定位记录，并处理积压
        if self.status_cache.read_through_or_stale().await.is_clocked_in() {
            self.location_logger.start();
        }
        self.processor.trigger();
        if self.network.is_online().await {
            self.on_network_restored().await;
        }

        info!("✅ FieldSyncSDK 已启动");
        Ok(())
    }

    fn spawn_network_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut events = self.network.subscribe_events();
        let token = self.shutdown_token.clone();
        tokio::spawn(async move {
            loop {
                select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => {
                            this.event_manager
                                .emit(SDKEvent::ConnectivityChanged {
                                    old_status: event.old_status,
                                    new_status: event.new_status,
                                    timestamp: event.timestamp,
                                })
                                .await;
                            if event.new_status.online && !event.old_status.online {
                                this.on_network_restored().await;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("⚠️ 网络事件滞后，跳过 {} 条", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("网络事件循环已退出");
        })
    }

    /// 网络恢复：补发打卡、补传定位（同步队列由处理器自行触发）
    async fn on_network_restored(&self) {
        if let Err(e) = self.clock.replay_retry_queue().await {
            error!("补发打卡重试队列失败: {}", e);
        }
        if let Err(e) = self.location_logger.flush_pending().await {
            warn!("⚠️ 补传定位记录失败: {}", e);
        }
    }

    /// 关闭 SDK：停止所有后台任务并落盘
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("正在关闭 FieldSyncSDK...");

        self.shutdown_token.cancel();
        self.location_logger.stop();
        self.processor.stop().await;
        self.network.stop().await;

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("⚠️ 后台任务异常退出: {}", e);
                }
            }
        }

        self.event_manager.clear_listeners().await;
        self.kv.flush().await?;
        info!("FieldSyncSDK 关闭完成");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    fn check_active(&self) -> Result<()> {
        if self.is_shutting_down() {
            return Err(FieldSyncError::ShuttingDown("SDK 正在关闭".to_string()));
        }
        Ok(())
    }

    pub fn config(&self) -> &FieldSyncConfig {
        &self.config
    }

    // ========== 平台通道 ==========

    /// 平台围栏进出事件入口
    pub fn crossing_sender(&self) -> mpsc::Sender<CrossingEvent> {
        self.crossing_tx.clone()
    }

    /// 通知点击入口
    pub fn notification_sender(&self) -> mpsc::Sender<NotificationAction> {
        self.tap_tx.clone()
    }

    /// 解析通知 extra 并投递点击
    pub async fn handle_notification_tap(&self, extra: &NotificationExtra) -> Result<()> {
        self.check_active()?;
        let action = NotificationAction::from_extra(extra)
            .ok_or_else(|| FieldSyncError::InvalidArgument(format!("未知的通知动作: {}", extra.action)))?;
        self.tap_tx
            .send(action)
            .await
            .map_err(|_| FieldSyncError::ShuttingDown("打卡事件循环已退出".to_string()))
    }

    // ========== 工作项 ==========

    /// 保存工作项并入队，随后尝试触发同步
    pub async fn save_work_item(&self, item: &WorkItem) -> Result<SyncQueueEntry> {
        self.check_active()?;
        let entry = self.store.save_and_enqueue(item).await?;
        if self.is_started() {
            self.processor.trigger();
        }
        Ok(entry)
    }

    pub async fn delete_work_item(&self, id: &str) -> Result<Option<SyncQueueEntry>> {
        self.check_active()?;
        let entry = self.store.delete_and_enqueue(id).await?;
        if entry.is_some() && self.is_started() {
            self.processor.trigger();
        }
        Ok(entry)
    }

    /// 项目级变更（重命名、归档等）入队，与工作项共用同一队列
    pub async fn enqueue_project_change(
        &self,
        project_id: &str,
        action: SyncAction,
        payload: serde_json::Value,
    ) -> Result<SyncQueueEntry> {
        self.check_active()?;
        let entry = crate::storage::project_entry(project_id, action, payload);
        self.store.enqueue(&entry).await?;
        if self.is_started() {
            self.processor.trigger();
        }
        Ok(entry)
    }

    pub async fn get_work_item(&self, id: &str) -> Result<Option<WorkItem>> {
        self.store.get(id).await
    }

    pub async fn list_work_items(&self, owner_id: &str) -> Result<Vec<WorkItem>> {
        self.store.list_by_owner(owner_id).await
    }

    /// 删除项目下的全部工作项与队列条目
    pub async fn delete_project(&self, owner_id: &str) -> Result<CascadeReport> {
        self.check_active()?;
        self.store.delete_owner(owner_id).await
    }

    /// 立即处理同步队列；已有处理在进行时返回 None（已合并）
    pub async fn sync_now(&self) -> Result<Option<DrainReport>> {
        self.check_active()?;
        Ok(self.processor.drain().await)
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.store.queue_stats().await
    }

    pub async fn sync_metrics(&self) -> SyncMetrics {
        self.processor.get_metrics().await
    }

    // ========== 围栏与打卡 ==========

    /// 替换工地列表并对账
    pub async fn update_sites(&self, sites: Option<Vec<BoundarySite>>) -> Result<ReconcileReport> {
        self.check_active()?;
        self.geofence.update_sites(sites).await
    }

    /// 位置更新；离开服务区域时重新对账
    pub async fn on_location_update(&self, coordinate: GeoCoordinate) -> Result<Option<ReconcileReport>> {
        self.check_active()?;
        self.geofence.on_location_update(coordinate).await
    }

    /// 手动打卡（不经过通知点击去重）
    pub async fn perform_clock(&self, kind: crate::clock::ClockKind, boundary_id: &str) -> Result<ClockFeedback> {
        self.check_active()?;
        Ok(self.clock.perform_clock(kind, boundary_id).await)
    }

    pub async fn clock_status(&self) -> ClockStatus {
        self.status_cache.read_through_or_stale().await
    }

    /// 丢弃缓存后重新读取打卡状态
    pub async fn refresh_clock_status(&self) -> ClockStatus {
        self.status_cache.invalidate();
        self.status_cache.read_through_or_stale().await
    }

    /// 当前工地列表中的工地
    pub async fn boundary_site(&self, boundary_id: &str) -> Option<BoundarySite> {
        self.geofence.site(boundary_id).await
    }

    pub async fn replay_clock_queue(&self) -> Result<ReplayReport> {
        self.check_active()?;
        self.clock.replay_retry_queue().await
    }

    pub fn pending_clock_requests(&self) -> usize {
        self.clock.retry_queue().len()
    }

    pub fn is_logging_location(&self) -> bool {
        self.location_logger.is_running()
    }

    // ========== 网络、事件、生命周期 ==========

    pub async fn network_status(&self) -> NetworkStatus {
        self.network.current_status().await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SDKEvent> {
        self.event_manager.subscribe()
    }

    pub fn event_manager(&self) -> &Arc<EventManager> {
        &self.event_manager
    }

    pub async fn enter_foreground(&self) -> Result<()> {
        self.check_active()?;
        info!("应用进入前台");
        self.lifecycle_manager.read().await.notify_foreground().await
    }

    pub async fn enter_background(&self) -> Result<()> {
        self.check_active()?;
        info!("应用进入后台");
        self.lifecycle_manager.read().await.notify_background().await
    }

    pub fn clock_manager(&self) -> &Arc<ClockManager> {
        &self.clock
    }
}
