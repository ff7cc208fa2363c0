//! 网络可用性监控
//!
//! 对外提供两种读法：
//! - `current_status()`：平台监听未启动时查询平台，并发调用共享同一次查询
//! - `subscribe()` / `subscribe_events()`：变化通知，所有订阅者共享一个平台监听

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::utils::now_millis;

/// 连接类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Wifi,
    Cellular,
    Ethernet,
    Other,
    None,
    Unknown,
}

/// 网络状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub online: bool,
    pub kind: ConnectionKind,
}

impl NetworkStatus {
    pub fn online(kind: ConnectionKind) -> Self {
        Self { online: true, kind }
    }

    pub fn offline() -> Self {
        Self { online: false, kind: ConnectionKind::None }
    }

    /// 平台查询失败时的结果，按离线处理
    pub fn unknown() -> Self {
        Self { online: false, kind: ConnectionKind::Unknown }
    }
}

/// 网络状态变化事件
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkStatusEvent {
    pub old_status: NetworkStatus,
    pub new_status: NetworkStatus,
    pub timestamp: i64,
}

/// 网络状态监听器 trait（由平台层实现）
#[async_trait]
pub trait NetworkStatusListener: Send + Sync + std::fmt::Debug {
    /// 单次查询当前网络状态
    async fn query_status(&self) -> Result<NetworkStatus>;

    /// 开始监听，返回平台推送的状态流
    async fn start_monitoring(&self) -> Result<broadcast::Receiver<NetworkStatus>>;

    async fn stop_monitoring(&self);
}

type StatusCallback = Arc<dyn Fn(NetworkStatus) + Send + Sync>;
type CallbackMap = Mutex<HashMap<u64, StatusCallback>>;

/// 回调订阅句柄；drop 不会取消订阅，需显式调用 `unsubscribe`
pub struct Subscription {
    id: u64,
    callbacks: Weak<CallbackMap>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(callbacks) = self.callbacks.upgrade() {
            callbacks.lock().remove(&self.id);
            debug!("网络状态订阅已取消: {}", self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

struct InFlightQuery {
    generation: u64,
    future: Shared<BoxFuture<'static, NetworkStatus>>,
}

/// 网络监控管理器
pub struct ConnectivityMonitor {
    listener: Arc<dyn NetworkStatusListener>,
    cached: Arc<Mutex<Option<NetworkStatus>>>,
    in_flight: Mutex<Option<InFlightQuery>>,
    query_generation: AtomicU64,
    monitoring: Arc<AtomicBool>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
    start_lock: tokio::sync::Mutex<()>,
    status_sender: broadcast::Sender<NetworkStatusEvent>,
    callbacks: Arc<CallbackMap>,
    next_subscription_id: AtomicU64,
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("cached", &*self.cached.lock())
            .field("monitoring", &self.monitoring.load(Ordering::SeqCst))
            .finish()
    }
}

impl ConnectivityMonitor {
    pub fn new(listener: Arc<dyn NetworkStatusListener>) -> Self {
        let (status_sender, _) = broadcast::channel(64);
        Self {
            listener,
            cached: Arc::new(Mutex::new(None)),
            in_flight: Mutex::new(None),
            query_generation: AtomicU64::new(0),
            monitoring: Arc::new(AtomicBool::new(false)),
            monitor_task: Mutex::new(None),
            start_lock: tokio::sync::Mutex::new(()),
            status_sender,
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    /// 当前网络状态
    ///
    /// 平台监听已运行时直接返回缓存；否则查询平台，并发调用共享同一次查询。
    pub async fn current_status(&self) -> NetworkStatus {
        if self.monitoring.load(Ordering::SeqCst) {
            if let Some(status) = *self.cached.lock() {
                return status;
            }
        }

        let (generation, future) = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.as_ref() {
                Some(query) => (query.generation, query.future.clone()),
                None => {
                    let generation = self.query_generation.fetch_add(1, Ordering::SeqCst);
                    let listener = self.listener.clone();
                    let future = async move {
                        match listener.query_status().await {
                            Ok(status) => status,
                            Err(e) => {
                                warn!("⚠️ 查询网络状态失败，按离线处理: {}", e);
                                NetworkStatus::unknown()
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    *in_flight = Some(InFlightQuery { generation, future: future.clone() });
                    (generation, future)
                }
            }
        };

        let status = future.await;

        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.as_ref().map(|q| q.generation) == Some(generation) {
                *in_flight = None;
            }
        }

        Self::apply_status(&self.cached, &self.status_sender, &self.callbacks, status);
        status
    }

    /// 当前是否在线
    pub async fn is_online(&self) -> bool {
        self.current_status().await.online
    }

    /// 最后已知状态（不触发查询）
    pub fn last_known(&self) -> Option<NetworkStatus> {
        *self.cached.lock()
    }

    /// 注册状态变化回调（首次注册时启动平台监听）
    pub async fn subscribe<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(NetworkStatus) + Send + Sync + 'static,
    {
        self.start().await?;
        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        self.callbacks.lock().insert(id, Arc::new(callback));
        debug!("新增网络状态订阅: {}", id);
        Ok(Subscription { id, callbacks: Arc::downgrade(&self.callbacks) })
    }

    /// 内部组件使用的事件流
    pub fn subscribe_events(&self) -> broadcast::Receiver<NetworkStatusEvent> {
        self.status_sender.subscribe()
    }

    /// 启动平台监听（幂等）
    pub async fn start(&self) -> Result<()> {
        let _guard = self.start_lock.lock().await;
        if self.monitoring.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut receiver = self.listener.start_monitoring().await?;

        // 先拿到一次初始状态
        if self.cached.lock().is_none() {
            self.current_status().await;
        }

        let cached = self.cached.clone();
        let sender = self.status_sender.clone();
        let callbacks = self.callbacks.clone();
        let monitoring = self.monitoring.clone();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(status) => Self::apply_status(&cached, &sender, &callbacks, status),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("⚠️ 网络状态事件滞后，跳过 {} 条", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            monitoring.store(false, Ordering::SeqCst);
            debug!("平台网络监听已结束");
        });

        *self.monitor_task.lock() = Some(handle);
        self.monitoring.store(true, Ordering::SeqCst);
        info!("✅ 网络状态监听已启动");
        Ok(())
    }

    pub async fn stop(&self) {
        let handle = self.monitor_task.lock().take();
        if let Some(handle) = handle {
            handle.abort();
        }
        if self.monitoring.swap(false, Ordering::SeqCst) {
            self.listener.stop_monitoring().await;
            info!("网络状态监听已停止");
        }
    }

    /// 手动设置网络状态
    pub fn set_status(&self, status: NetworkStatus) {
        Self::apply_status(&self.cached, &self.status_sender, &self.callbacks, status);
    }

    /// 更新缓存；与旧值不同才广播和回调
    fn apply_status(
        cached: &Mutex<Option<NetworkStatus>>,
        sender: &broadcast::Sender<NetworkStatusEvent>,
        callbacks: &CallbackMap,
        new_status: NetworkStatus,
    ) {
        let old_status = cached.lock().replace(new_status);

        let Some(old_status) = old_status else {
            return;
        };
        if old_status == new_status {
            return;
        }

        info!("网络状态变化: {:?} -> {:?}", old_status, new_status);
        let _ = sender.send(NetworkStatusEvent {
            old_status,
            new_status,
            timestamp: now_millis(),
        });

        let targets: Vec<StatusCallback> = callbacks.lock().values().cloned().collect();
        for callback in targets {
            callback(new_status);
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.monitor_task.lock().take() {
            handle.abort();
        }
    }
}


#[cfg(test)]
pub use test_helpers::DummyNetworkStatusListener;
