//! 打卡自动化
//!
//! - `crossing`：围栏进出状态机（纯函数）
//! - `status_cache`：打卡状态 TTL 缓存
//! - `manager`：消费进出事件与通知点击，执行打卡并驱动重试队列

pub mod crossing;
pub mod status_cache;
pub mod manager;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::location::PositionOptions;

pub use crossing::{transition, CrossingDirection, CrossingEffect, CrossingEvent, CrossingState, Transition};
pub use manager::ClockManager;
pub use status_cache::{ClockStatus, ClockStatusCache};

/// 打卡类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockKind {
    ClockIn,
    ClockOut,
}

impl ClockKind {
    /// 通知 extra 中的 action 取值
    pub fn action_str(&self) -> &'static str {
        match self {
            ClockKind::ClockIn => "clock-in",
            ClockKind::ClockOut => "clock-out",
        }
    }

    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "clock-in" => Some(ClockKind::ClockIn),
            "clock-out" => Some(ClockKind::ClockOut),
            _ => None,
        }
    }
}

impl fmt::Display for ClockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action_str())
    }
}

/// 一次打卡尝试对用户的反馈，每次尝试恰好一个
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockFeedback {
    Completed,
    /// 已进入重试队列，联网后自动补发
    Queued,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationExtra {
    pub boundary_id: String,
    /// "clock-in" | "clock-out"
    pub action: String,
}

/// 打卡提示通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockNotification {
    pub title: String,
    pub body: String,
    pub extra: NotificationExtra,
}

/// 用户点击通知后平台回传的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
    pub boundary_id: String,
    pub kind: ClockKind,
}

impl NotificationAction {
    pub fn from_extra(extra: &NotificationExtra) -> Option<Self> {
        Some(Self {
            boundary_id: extra.boundary_id.clone(),
            kind: ClockKind::from_action(&extra.action)?,
        })
    }
}

/// 平台通知能力
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    async fn schedule_prompt(&self, notification: &ClockNotification) -> Result<()>;

    async fn show_feedback(&self, kind: ClockKind, feedback: &ClockFeedback, message: &str) -> Result<()>;
}

/// 打卡配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// 打卡状态缓存 TTL（秒）
    pub status_ttl_secs: u64,
    /// 同一 (围栏, 动作) 的提示去重窗口（秒）
    pub prompt_dedup_secs: u64,
    pub retry_queue_max: usize,
    /// 单个重试条目的最大补发次数
    pub retry_max_attempts: u32,
    pub remote_timeout_secs: u64,
    pub position: PositionOptions,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            status_ttl_secs: 30,
            prompt_dedup_secs: 120,
            retry_queue_max: 10,
            retry_max_attempts: 5,
            remote_timeout_secs: 30,
            position: PositionOptions { high_accuracy: true, timeout_ms: 15_000, samples: 3 },
        }
    }
}
