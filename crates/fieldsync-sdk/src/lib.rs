//! FieldSync SDK - 离线优先的现场作业同步内核
//!
//! 本 SDK 提供：
//! - 📦 本地持久化存储与确定性 ID 的同步队列（SQLite + sled）
//! - 📡 网络状态监控与查询去重
//! - 🔁 同步队列处理：按 local_id 串行、指数退避、幂等上传
//! - 🗺️ 工地围栏选择：最近的至多 20 个，最小增删对账
//! - ⏱️ 围栏进出驱动的打卡提示、打卡重试队列
//! - 📍 上班期间的周期定位记录
//!
//! # 快速开始
//!
//! ```rust,ignore
//! use fieldsync_sdk::{FieldSyncConfig, FieldSyncSDK, PlatformBindings};
//!
//! let config = FieldSyncConfig::builder()
//!     .data_dir("/path/to/data")
//!     .base_url("https://api.example.com/v1")
//!     .build();
//!
//! // bindings 由宿主平台提供：网络监听、定位、围栏、通知
//! let sdk = FieldSyncSDK::initialize(config, bindings).await?;
//! sdk.start().await?;
//!
//! // 平台围栏事件送入 SDK
//! let crossings = sdk.crossing_sender();
//! crossings.send(CrossingEvent::enter("boundary-1")).await?;
//!
//! sdk.shutdown().await?;
//! ```

pub mod error;
pub mod version;
pub mod utils;
pub mod storage;
pub mod network;
pub mod events;
pub mod remote;
pub mod http_client;
pub mod geofence;
pub mod clock;
pub mod location;
pub mod lifecycle;
pub mod logging;
pub mod sdk;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{FailureKind, FieldSyncError, Result};
pub use sdk::{
    FieldSyncConfig, FieldSyncConfigBuilder, FieldSyncSDK, HttpClientConfig, PlatformBindings, RetryConfig,
};
pub use storage::entities::{
    CascadeReport, ItemType, QueueStats, SyncAction, SyncQueueEntry, SyncState, WorkItem, WorkItemMetadata,
};
pub use storage::queue::{DrainReport, ReplayReport, SyncConfig, SyncMetrics};
pub use network::{ConnectionKind, ConnectivityMonitor, NetworkStatus, NetworkStatusListener};
pub use events::{EventManager, SDKEvent};
pub use remote::RemoteApi;
pub use http_client::HttpRemoteApi;
pub use geofence::{BoundarySite, GeofenceConfig, GeofencePlatform, MonitoredBoundary, ReconcileReport};
pub use clock::{
    ClockConfig, ClockFeedback, ClockKind, ClockNotification, ClockStatus, CrossingDirection, CrossingEvent,
    NotificationAction, NotificationExtra, Notifier,
};
pub use location::{LocationConfig, PositionFix, PositionOptions, PositionProvider};
pub use lifecycle::{LifecycleHook, LifecycleManager};
pub use utils::GeoCoordinate;
