//! 围栏就近管理
//!
//! 平台同时监控的围栏数量有上限（20）。本模块从全部工地中选出
//! 25 英里内最近的至多 20 个，并以最小增删与平台当前状态对账：
//! 先删后加，加到上限即停止。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::error::{FieldSyncError, Result};
use crate::events::{EventManager, SDKEvent};
use crate::location::{PositionOptions, PositionProvider};
use crate::utils::{now_millis, GeoCoordinate};

/// 工地（只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundarySite {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl BoundarySite {
    pub fn coordinate(&self) -> GeoCoordinate {
        GeoCoordinate::new(self.latitude, self.longitude)
    }
}

/// 注册到平台的圆形围栏
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredBoundary {
    pub id: String,
    pub center: GeoCoordinate,
    pub radius_meters: f64,
}

/// 平台围栏能力
#[async_trait]
pub trait GeofencePlatform: Send + Sync + std::fmt::Debug {
    async fn add_boundary(&self, boundary: &MonitoredBoundary) -> Result<()>;
    async fn remove_boundary(&self, boundary_id: &str) -> Result<()>;
    /// 当前已注册的围栏 ID
    async fn list_active(&self) -> Result<Vec<String>>;
}

/// 围栏配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceConfig {
    /// 候选半径（英里）
    pub radius_miles: f64,
    /// 平台同时监控上限
    pub max_monitored: usize,
    /// 单个围栏半径（米）
    pub boundary_radius_meters: f64,
    /// 离开上次对账位置多远后重新对账（英里）
    pub refresh_distance_miles: f64,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            radius_miles: 25.0,
            max_monitored: 20,
            boundary_radius_meters: 150.0,
            refresh_distance_miles: 5.0,
        }
    }
}

/// 选出半径内最近的至多 `max` 个工地，按距离升序（同距离按 ID）
///
/// 坐标非法的工地被忽略。
pub fn select_targets<'a>(
    sites: &'a [BoundarySite],
    origin: &GeoCoordinate,
    radius_miles: f64,
    max: usize,
) -> Vec<(&'a BoundarySite, f64)> {
    let mut candidates: Vec<(&BoundarySite, f64)> = sites
        .iter()
        .filter(|site| {
            let valid = site.coordinate().is_valid() && !site.id.is_empty();
            if !valid {
                debug!("忽略坐标非法的工地: {:?}", site.id);
            }
            valid
        })
        .map(|site| (site, origin.distance_miles(&site.coordinate())))
        .filter(|(_, distance)| *distance <= radius_miles)
        .collect();

    candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));
    candidates.truncate(max);
    candidates
}

/// 与平台状态的差异
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundaryDiff {
    pub to_remove: Vec<String>,
    /// 按距离由近到远
    pub to_add: Vec<String>,
}

impl BoundaryDiff {
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

/// to_remove = active − target，to_add = target − active
pub fn diff(active: &[String], target: &[String]) -> BoundaryDiff {
    let active_set: HashSet<&str> = active.iter().map(String::as_str).collect();
    let target_set: HashSet<&str> = target.iter().map(String::as_str).collect();

    let mut seen = HashSet::new();
    BoundaryDiff {
        to_remove: active
            .iter()
            .filter(|id| !target_set.contains(id.as_str()) && seen.insert(id.as_str()))
            .cloned()
            .collect(),
        to_add: target
            .iter()
            .filter(|id| !active_set.contains(id.as_str()))
            .cloned()
            .collect(),
    }
}

/// 一次对账的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub added: usize,
    pub removed: usize,
    /// 对账后平台上的围栏数
    pub active: usize,
    /// 因达到上限未能添加的数量
    pub skipped_at_ceiling: usize,
}

/// 上次对账覆盖的区域
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServingArea {
    pub center: GeoCoordinate,
    pub radius_miles: f64,
}

impl ServingArea {
    pub fn contains(&self, coordinate: &GeoCoordinate) -> bool {
        self.center.distance_miles(coordinate) <= self.radius_miles
    }
}

/// 围栏管理器
#[derive(Debug)]
pub struct GeofenceManager {
    config: GeofenceConfig,
    platform: Arc<dyn GeofencePlatform>,
    position: Arc<dyn PositionProvider>,
    event_manager: Arc<EventManager>,
    sites: RwLock<Vec<BoundarySite>>,
    serving_area: RwLock<Option<ServingArea>>,
    reconcile_lock: Mutex<()>,
}

impl GeofenceManager {
    pub fn new(
        config: GeofenceConfig,
        platform: Arc<dyn GeofencePlatform>,
        position: Arc<dyn PositionProvider>,
        event_manager: Arc<EventManager>,
    ) -> Self {
        Self {
            config,
            platform,
            position,
            event_manager,
            sites: RwLock::new(Vec::new()),
            serving_area: RwLock::new(None),
            reconcile_lock: Mutex::new(()),
        }
    }

    /// 替换工地列表并立即对账；None 视为空列表
    pub async fn update_sites(&self, sites: Option<Vec<BoundarySite>>) -> Result<ReconcileReport> {
        let sites = sites.unwrap_or_default();
        info!("更新工地列表: {} 个", sites.len());
        *self.sites.write().await = sites;
        let last_center = self.serving_area.read().await.map(|area| area.center);
        self.reconcile(last_center).await
    }

    /// 位置更新：离开服务区域才重新对账
    pub async fn on_location_update(&self, coordinate: GeoCoordinate) -> Result<Option<ReconcileReport>> {
        let needs_refresh = match *self.serving_area.read().await {
            Some(area) => !area.contains(&coordinate),
            None => true,
        };
        if !needs_refresh {
            return Ok(None);
        }
        debug!("离开服务区域，重新对账围栏");
        self.reconcile(Some(coordinate)).await.map(Some)
    }

    pub async fn site(&self, boundary_id: &str) -> Option<BoundarySite> {
        self.sites.read().await.iter().find(|s| s.id == boundary_id).cloned()
    }

    pub async fn serving_area(&self) -> Option<ServingArea> {
        *self.serving_area.read().await
    }

    /// 对账；`position` 为空时通过定位能力采样
    #[instrument(skip(self))]
    pub async fn reconcile(&self, position: Option<GeoCoordinate>) -> Result<ReconcileReport> {
        let _guard = self.reconcile_lock.lock().await;

        let sites = self.sites.read().await.clone();

        let (target, origin) = if sites.is_empty() {
            (Vec::new(), position)
        } else {
            let origin = match position {
                Some(origin) => origin,
                None => {
                    let options = PositionOptions { high_accuracy: false, ..Default::default() };
                    self.position.current_position(&options).await?.coordinate
                }
            };
            if !origin.is_valid() {
                return Err(FieldSyncError::InvalidArgument(format!("非法坐标: {:?}", origin)));
            }
            let target: Vec<String> = select_targets(
                &sites,
                &origin,
                self.config.radius_miles,
                self.config.max_monitored,
            )
            .into_iter()
            .map(|(site, _)| site.id.clone())
            .collect();
            (target, Some(origin))
        };

        let report = self.apply(&sites, &target).await;

        if let Some(center) = origin {
            *self.serving_area.write().await = Some(ServingArea {
                center,
                radius_miles: self.config.refresh_distance_miles,
            });
        }

        info!(
            "围栏对账完成: +{} -{} active={}",
            report.added, report.removed, report.active
        );
        self.event_manager
            .emit(SDKEvent::GeofenceReconciled {
                added: report.added,
                removed: report.removed,
                active: report.active,
                timestamp: now_millis(),
            })
            .await;

        Ok(report)
    }

    async fn apply(&self, sites: &[BoundarySite], target: &[String]) -> ReconcileReport {
        let active = match self.platform.list_active().await {
            Ok(active) => active,
            Err(e) => {
                warn!("⚠️ 查询平台围栏失败，按 0 个处理: {}", e);
                Vec::new()
            }
        };

        let plan = diff(&active, target);
        let mut report = ReconcileReport { active: active.len(), ..Default::default() };
        if plan.is_empty() {
            return report;
        }

        for id in &plan.to_remove {
            match self.platform.remove_boundary(id).await {
                Ok(()) => {
                    report.removed += 1;
                    report.active = report.active.saturating_sub(1);
                }
                Err(e) => warn!("⚠️ 移除围栏失败 {}: {}", id, e),
            }
        }

        for (index, id) in plan.to_add.iter().enumerate() {
            if report.active >= self.config.max_monitored {
                report.skipped_at_ceiling = plan.to_add.len() - index;
                warn!(
                    "⚠️ 平台围栏已达上限 {}，剩余 {} 个未添加",
                    self.config.max_monitored, report.skipped_at_ceiling
                );
                break;
            }
            let Some(site) = sites.iter().find(|s| &s.id == id) else {
                continue;
            };
            let boundary = MonitoredBoundary {
                id: site.id.clone(),
                center: site.coordinate(),
                radius_meters: self.config.boundary_radius_meters,
            };
            match self.platform.add_boundary(&boundary).await {
                Ok(()) => {
                    report.added += 1;
                    report.active += 1;
                }
                Err(FieldSyncError::CapacityReached(msg)) => {
                    report.skipped_at_ceiling = plan.to_add.len() - index;
                    warn!("⚠️ 平台拒绝添加围栏（已达上限）: {}", msg);
                    break;
                }
                Err(e) => warn!("⚠️ 添加围栏失败 {}: {}", id, e),
            }
        }

        report
    }
}
