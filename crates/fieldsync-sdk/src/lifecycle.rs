//! SDK 生命周期管理
//!
//! App 前后台切换时统一通知各模块。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::storage::queue::SyncQueueProcessor;

/// 生命周期回调 Hook
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// App 切换到后台时调用
    async fn on_background(&self) -> Result<()>;

    /// App 切换到前台时调用
    async fn on_foreground(&self) -> Result<()>;
}

/// 生命周期管理器
#[derive(Default)]
pub struct LifecycleManager {
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    pub fn register_hook(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
        info!("✅ 生命周期 Hook 已注册: 当前共 {} 个", self.hooks.len());
    }

    /// 通知所有 Hook：App 切换到后台
    ///
    /// 按注册顺序执行；单个 Hook 失败不影响其余 Hook，返回第一个错误。
    pub async fn notify_background(&self) -> Result<()> {
        info!("🔄 通知所有模块：App 切换到后台");
        let mut first_error = None;
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook.on_background().await {
                warn!("⚠️ Hook #{} 后台切换失败: {}", index, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 通知所有 Hook：App 切换到前台
    pub async fn notify_foreground(&self) -> Result<()> {
        info!("🔄 通知所有模块：App 切换到前台");
        let mut first_error = None;
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook.on_foreground().await {
                warn!("⚠️ Hook #{} 前台切换失败: {}", index, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// 回到前台时触发一轮队列处理
pub struct SyncLifecycleHook {
    processor: Arc<SyncQueueProcessor>,
}

impl SyncLifecycleHook {
    pub fn new(processor: Arc<SyncQueueProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl LifecycleHook for SyncLifecycleHook {
    async fn on_background(&self) -> Result<()> {
        debug!("后台：同步队列保持原状，等待下次触发");
        Ok(())
    }

    async fn on_foreground(&self) -> Result<()> {
        self.processor.trigger();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldSyncError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHook {
        foreground: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LifecycleHook for CountingHook {
        async fn on_background(&self) -> Result<()> {
            Ok(())
        }

        async fn on_foreground(&self) -> Result<()> {
            self.foreground.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FieldSyncError::Platform("hook failed".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_hook_does_not_stop_others() {
        let failing = Arc::new(CountingHook { foreground: AtomicUsize::new(0), fail: true });
        let ok = Arc::new(CountingHook { foreground: AtomicUsize::new(0), fail: false });

        let mut manager = LifecycleManager::new();
        manager.register_hook(failing.clone());
        manager.register_hook(ok.clone());
        assert_eq!(manager.hook_count(), 2);

        assert!(matches!(manager.notify_foreground().await, Err(FieldSyncError::Platform(_))));
        assert_eq!(failing.foreground.load(Ordering::SeqCst), 1);
        assert_eq!(ok.foreground.load(Ordering::SeqCst), 1);
        assert!(manager.notify_background().await.is_ok());
    }
}
