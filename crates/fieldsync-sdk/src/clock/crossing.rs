//! 围栏进出状态机（纯函数）

use serde::{Deserialize, Serialize};

use super::ClockKind;

/// 设备相对某个围栏的位置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrossingState {
    #[default]
    Outside,
    Inside,
}

/// 平台上报的进出方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossingDirection {
    Enter,
    Exit,
}

/// 平台上报的进出事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossingEvent {
    pub boundary_id: String,
    pub direction: CrossingDirection,
}

impl CrossingEvent {
    pub fn enter(boundary_id: impl Into<String>) -> Self {
        Self { boundary_id: boundary_id.into(), direction: CrossingDirection::Enter }
    }

    pub fn exit(boundary_id: impl Into<String>) -> Self {
        Self { boundary_id: boundary_id.into(), direction: CrossingDirection::Exit }
    }
}

/// 状态迁移附带的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingEffect {
    None,
    Prompt(ClockKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: CrossingState,
    pub effect: CrossingEffect,
}

/// 进入且未打卡 → 提示上班；离开且已打卡 → 提示下班；其余无动作。
///
/// 重复的 enter（中间没有 exit）同样产生提示，去重由调用方按时间窗口处理。
pub fn transition(_state: CrossingState, direction: CrossingDirection, clocked_in: bool) -> Transition {
    match direction {
        CrossingDirection::Enter => Transition {
            next: CrossingState::Inside,
            effect: if clocked_in {
                CrossingEffect::None
            } else {
                CrossingEffect::Prompt(ClockKind::ClockIn)
            },
        },
        CrossingDirection::Exit => Transition {
            next: CrossingState::Outside,
            effect: if clocked_in {
                CrossingEffect::Prompt(ClockKind::ClockOut)
            } else {
                CrossingEffect::None
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use CrossingDirection::*;
        use CrossingState::*;

        let t = transition(Outside, Enter, false);
        assert_eq!(t, Transition { next: Inside, effect: CrossingEffect::Prompt(ClockKind::ClockIn) });

        let t = transition(Outside, Enter, true);
        assert_eq!(t, Transition { next: Inside, effect: CrossingEffect::None });

        let t = transition(Inside, Exit, true);
        assert_eq!(t, Transition { next: Outside, effect: CrossingEffect::Prompt(ClockKind::ClockOut) });

        let t = transition(Inside, Exit, false);
        assert_eq!(t, Transition { next: Outside, effect: CrossingEffect::None });

        // 缺失 exit 的重复 enter
        let t = transition(Inside, Enter, false);
        assert_eq!(t.effect, CrossingEffect::Prompt(ClockKind::ClockIn));
    }
}
