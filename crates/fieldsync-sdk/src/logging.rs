//! 日志初始化
//!
//! SDK 内部只使用 `tracing` 宏；宿主没有安装 subscriber 时，
//! 可通过 `FieldSyncConfig::debug_mode` 让 SDK 安装一个 fmt subscriber。

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "fieldsync_sdk=info,warn";
const DEBUG_FILTER: &str = "fieldsync_sdk=debug,info";

/// 安装全局 subscriber；已存在时静默跳过，返回是否由本次调用安装
pub fn init_logging(debug_mode: bool) -> bool {
    let fallback = if debug_mode { DEBUG_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
