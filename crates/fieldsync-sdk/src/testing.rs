//! 测试替身：远端、平台围栏、定位与通知

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::clock::{ClockFeedback, ClockKind, ClockNotification, Notifier};
use crate::error::{FieldSyncError, Result};
use crate::geofence::{GeofencePlatform, MonitoredBoundary};
use crate::location::{PositionFix, PositionOptions, PositionProvider};
use crate::remote::{BoundaryInfo, ClockRequest, LocationPost, RemoteApi, UploadRequest, UploadResponse};
use crate::utils::{now_millis, GeoCoordinate};

/// 预设的单次调用结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    Transient,
    Permanent,
}

impl Scripted {
    fn into_error(self, what: &str) -> FieldSyncError {
        match self {
            Scripted::Transient => FieldSyncError::Network(format!("{} unreachable", what)),
            Scripted::Permanent => FieldSyncError::Validation(format!("{} rejected", what)),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeRemote {
    upload_delay: Mutex<Duration>,
    upload_scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    upload_log: Mutex<Vec<String>>,
    uploads: Mutex<Vec<UploadRequest>>,
    omit_remote_ids: AtomicBool,

    clock_script: Mutex<VecDeque<Scripted>>,
    clock_calls: Mutex<Vec<ClockRequest>>,

    clocked_in: Mutex<Option<bool>>,
    status_calls: AtomicUsize,

    boundaries: Mutex<HashMap<String, BoundaryInfo>>,
    fail_boundary: AtomicBool,

    locations: Mutex<Vec<LocationPost>>,
    fail_locations: AtomicBool,
}

impl FakeRemote {
    pub fn set_upload_delay(&self, delay: Duration) {
        *self.upload_delay.lock() = delay;
    }

    /// 为某个 local_id 预设接下来若干次上传结果，用完后恢复成功
    pub fn script_upload(&self, local_id: &str, results: Vec<Scripted>) {
        self.upload_scripts
            .lock()
            .entry(local_id.to_string())
            .or_default()
            .extend(results);
    }

    /// 上传成功但响应里不带 remote_id
    pub fn omit_remote_ids(&self, omit: bool) {
        self.omit_remote_ids.store(omit, Ordering::SeqCst);
    }

    /// "start:{action}:{local_id}" / "end:{action}:{local_id}"
    pub fn upload_log(&self) -> Vec<String> {
        self.upload_log.lock().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().len()
    }

    pub fn uploads(&self) -> Vec<UploadRequest> {
        self.uploads.lock().clone()
    }

    pub fn script_clock(&self, results: Vec<Scripted>) {
        self.clock_script.lock().extend(results);
    }

    pub fn clock_calls(&self) -> Vec<ClockRequest> {
        self.clock_calls.lock().clone()
    }

    /// `None` 表示 clock/status 不可达
    pub fn set_clocked_in(&self, value: Option<bool>) {
        *self.clocked_in.lock() = value;
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn add_boundary(&self, id: &str, info: BoundaryInfo) {
        self.boundaries.lock().insert(id.to_string(), info);
    }

    pub fn fail_boundary_lookups(&self, fail: bool) {
        self.fail_boundary.store(fail, Ordering::SeqCst);
    }

    /// 成功上报的定位
    pub fn locations(&self) -> Vec<LocationPost> {
        self.locations.lock().clone()
    }

    pub fn fail_locations(&self, fail: bool) {
        self.fail_locations.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn upload_item(&self, request: &UploadRequest) -> Result<UploadResponse> {
        let marker = format!("{}:{}", request.action, request.local_id);
        self.upload_log.lock().push(format!("start:{}", marker));
        self.uploads.lock().push(request.clone());

        let delay = *self.upload_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .upload_scripts
            .lock()
            .get_mut(&request.local_id)
            .and_then(|script| script.pop_front());
        self.upload_log.lock().push(format!("end:{}", marker));

        match scripted {
            Some(outcome) => Err(outcome.into_error("upload")),
            None if self.omit_remote_ids.load(Ordering::SeqCst) => Ok(UploadResponse { remote_id: None }),
            None => Ok(UploadResponse {
                remote_id: Some(format!("remote-{}", request.local_id)),
            }),
        }
    }

    async fn clock(&self, request: &ClockRequest) -> Result<()> {
        self.clock_calls.lock().push(request.clone());
        match self.clock_script.lock().pop_front() {
            Some(outcome) => Err(outcome.into_error("clock")),
            None => Ok(()),
        }
    }

    async fn clock_status(&self) -> Result<bool> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        (*self.clocked_in.lock()).ok_or_else(|| FieldSyncError::Network("clock/status unreachable".to_string()))
    }

    async fn boundary_info(&self, boundary_id: &str) -> Result<BoundaryInfo> {
        if self.fail_boundary.load(Ordering::SeqCst) {
            return Err(FieldSyncError::Network("boundary lookup unreachable".to_string()));
        }
        self.boundaries
            .lock()
            .get(boundary_id)
            .cloned()
            .ok_or_else(|| FieldSyncError::NotFound(format!("boundary {}", boundary_id)))
    }

    async fn post_location(&self, post: &LocationPost) -> Result<()> {
        if self.fail_locations.load(Ordering::SeqCst) {
            return Err(FieldSyncError::Network("location unreachable".to_string()));
        }
        self.locations.lock().push(post.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PlatformOp {
    Add(String),
    Remove(String),
}

/// 模拟平台围栏：上限 20 个，超出返回 CapacityReached
#[derive(Debug, Default)]
pub struct FakeGeofencePlatform {
    active: Mutex<Vec<String>>,
    ops: Mutex<Vec<PlatformOp>>,
    failing_removes: Mutex<Vec<String>>,
    fail_list: AtomicBool,
}

impl FakeGeofencePlatform {
    const CEILING: usize = 20;

    pub fn active(&self) -> Vec<String> {
        self.active.lock().clone()
    }

    pub fn add_calls(&self) -> usize {
        self.ops.lock().iter().filter(|op| matches!(op, PlatformOp::Add(_))).count()
    }

    pub fn remove_calls(&self) -> usize {
        self.ops.lock().iter().filter(|op| matches!(op, PlatformOp::Remove(_))).count()
    }

    pub fn preload(&self, ids: Vec<String>) {
        self.active.lock().extend(ids);
    }

    pub fn fail_remove(&self, id: &str) {
        self.failing_removes.lock().push(id.to_string());
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// 所有移除调用都发生在第一次添加之前
    pub fn first_add_after_last_remove(&self) -> bool {
        let ops = self.ops.lock();
        let last_remove = ops.iter().rposition(|op| matches!(op, PlatformOp::Remove(_)));
        let first_add = ops.iter().position(|op| matches!(op, PlatformOp::Add(_)));
        match (last_remove, first_add) {
            (Some(remove), Some(add)) => remove < add,
            _ => true,
        }
    }
}

#[async_trait]
impl GeofencePlatform for FakeGeofencePlatform {
    async fn add_boundary(&self, boundary: &MonitoredBoundary) -> Result<()> {
        self.ops.lock().push(PlatformOp::Add(boundary.id.clone()));
        let mut active = self.active.lock();
        if active.contains(&boundary.id) {
            return Ok(());
        }
        if active.len() >= Self::CEILING {
            return Err(FieldSyncError::CapacityReached(format!("{} regions", Self::CEILING)));
        }
        active.push(boundary.id.clone());
        Ok(())
    }

    async fn remove_boundary(&self, boundary_id: &str) -> Result<()> {
        self.ops.lock().push(PlatformOp::Remove(boundary_id.to_string()));
        if self.failing_removes.lock().iter().any(|id| id == boundary_id) {
            return Err(FieldSyncError::Platform(format!("cannot remove {}", boundary_id)));
        }
        self.active.lock().retain(|id| id != boundary_id);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<String>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(FieldSyncError::Platform("list unavailable".to_string()));
        }
        Ok(self.active.lock().clone())
    }
}

#[derive(Debug)]
pub struct FakePositionProvider {
    fix: Mutex<Option<(GeoCoordinate, f64)>>,
}

impl FakePositionProvider {
    pub fn at(coordinate: GeoCoordinate, accuracy: f64) -> Self {
        Self { fix: Mutex::new(Some((coordinate, accuracy))) }
    }

    pub fn set_unavailable(&self) {
        *self.fix.lock() = None;
    }
}

#[async_trait]
impl PositionProvider for FakePositionProvider {
    async fn current_position(&self, _options: &PositionOptions) -> Result<PositionFix> {
        let (coordinate, accuracy) = (*self.fix.lock())
            .ok_or_else(|| FieldSyncError::PositionUnavailable("permission denied".to_string()))?;
        Ok(PositionFix { coordinate, accuracy, timestamp: now_millis() })
    }
}

#[derive(Debug, Default)]
pub struct FakeNotifier {
    prompts: Mutex<Vec<ClockNotification>>,
    feedback: Mutex<Vec<(ClockKind, ClockFeedback, String)>>,
    prompted: Notify,
}

impl FakeNotifier {
    pub fn prompts(&self) -> Vec<ClockNotification> {
        self.prompts.lock().clone()
    }

    pub fn feedback(&self) -> Vec<(ClockKind, ClockFeedback, String)> {
        self.feedback.lock().clone()
    }

    /// 等待第一条提示
    pub async fn wait_for_prompt(&self) -> ClockNotification {
        loop {
            let notified = self.prompted.notified();
            if let Some(first) = self.prompts.lock().first().cloned() {
                return first;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn schedule_prompt(&self, notification: &ClockNotification) -> Result<()> {
        self.prompts.lock().push(notification.clone());
        self.prompted.notify_waiters();
        Ok(())
    }

    async fn show_feedback(&self, kind: ClockKind, feedback: &ClockFeedback, message: &str) -> Result<()> {
        self.feedback.lock().push((kind, feedback.clone(), message.to_string()));
        Ok(())
    }
}
