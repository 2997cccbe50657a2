//! Operations: the unit of action the agent performs on the game window
//!
//! An operation either carries concrete window-relative coordinates or names
//! a detected object whose position is resolved at execution time.

use crate::core::types::{ObjectId, Point};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Click,
    Drag,
    Scroll,
    Type,
    Wait,
    Finished,
    CallUser,
    Hotkey,
    LeftDouble,
    RightSingle,
    LongPress,
    PressBack,
    PressHome,
    PressEnter,
    /// Any kind a model or stored row names that the agent cannot perform
    #[serde(other)]
    Unknown,
}

impl OperationKind {
    pub const ALL: [OperationKind; 14] = [
        OperationKind::Click,
        OperationKind::Drag,
        OperationKind::Scroll,
        OperationKind::Type,
        OperationKind::Wait,
        OperationKind::Finished,
        OperationKind::CallUser,
        OperationKind::Hotkey,
        OperationKind::LeftDouble,
        OperationKind::RightSingle,
        OperationKind::LongPress,
        OperationKind::PressBack,
        OperationKind::PressHome,
        OperationKind::PressEnter,
    ];

    /// Kinds that act on a point and can therefore target an object
    pub fn is_pointed(&self) -> bool {
        matches!(
            self,
            OperationKind::Click
                | OperationKind::LeftDouble
                | OperationKind::RightSingle
                | OperationKind::LongPress
                | OperationKind::Scroll
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Click => "Click",
            OperationKind::Drag => "Drag",
            OperationKind::Scroll => "Scroll",
            OperationKind::Type => "Type",
            OperationKind::Wait => "Wait",
            OperationKind::Finished => "Finished",
            OperationKind::CallUser => "CallUser",
            OperationKind::Hotkey => "Hotkey",
            OperationKind::LeftDouble => "LeftDouble",
            OperationKind::RightSingle => "RightSingle",
            OperationKind::LongPress => "LongPress",
            OperationKind::PressBack => "PressBack",
            OperationKind::PressHome => "PressHome",
            OperationKind::PressEnter => "PressEnter",
            OperationKind::Unknown => "Unknown",
        }
    }

    pub fn from_name(name: &str) -> OperationKind {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(name))
            .unwrap_or(OperationKind::Unknown)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Payload of an operation
///
/// Untagged: the shape of the JSON object decides the variant, so the order
/// below matters (most specific first, `Empty` last).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationParams {
    Drag { x1: i32, y1: i32, x2: i32, y2: i32 },
    Scroll { x: i32, y: i32, direction: ScrollDirection },
    Point { x: i32, y: i32 },
    Text { content: String },
    Key { key: String },
    Empty {},
}

impl OperationParams {
    pub fn point(&self) -> Option<Point> {
        match self {
            OperationParams::Point { x, y } | OperationParams::Scroll { x, y, .. } => {
                Some(Point::new(*x, *y))
            }
            _ => None,
        }
    }

    /// Same payload with its anchor point moved to `p`
    pub fn with_point(&self, p: Point) -> OperationParams {
        match self {
            OperationParams::Scroll { direction, .. } => OperationParams::Scroll {
                x: p.x,
                y: p.y,
                direction: *direction,
            },
            _ => OperationParams::Point { x: p.x, y: p.y },
        }
    }
}

/// One action on the game window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operate: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<OperationParams>,
}

impl Operation {
    pub fn new(operate: OperationKind, params: Option<OperationParams>) -> Self {
        Self {
            operate,
            object_id: None,
            params,
        }
    }

    /// An operation on a detected object, grounded when executed
    pub fn on_object(operate: OperationKind, object_id: ObjectId) -> Self {
        Self {
            operate,
            object_id: Some(object_id),
            params: None,
        }
    }

    pub fn click(x: i32, y: i32) -> Self {
        Self::new(OperationKind::Click, Some(OperationParams::Point { x, y }))
    }

    /// Whether two operations represent the same attempt
    ///
    /// Object-bound operations compare by kind and object; coordinate ones
    /// by kind and payload.
    pub fn same_action(&self, other: &Operation) -> bool {
        if self.operate != other.operate {
            return false;
        }
        match (self.object_id, other.object_id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.params == other.params,
            _ => false,
        }
    }

    /// Copy without grounded coordinates when an object reference exists
    ///
    /// Stored skills keep the object id so replays re-ground against the live
    /// screen instead of trusting stale coordinates.
    pub fn without_grounding(&self) -> Operation {
        match self.object_id {
            Some(_) => Operation {
                operate: self.operate,
                object_id: self.object_id,
                params: None,
            },
            None => self.clone(),
        }
    }

    pub fn needs_grounding(&self) -> bool {
        self.object_id.is_some() && self.params.is_none()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operate)?;
        if let Some(id) = self.object_id {
            write!(f, " object {}", id)?;
        }
        match &self.params {
            Some(OperationParams::Point { x, y }) => write!(f, " at ({}, {})", x, y),
            Some(OperationParams::Scroll { x, y, direction }) => {
                write!(f, " {:?} at ({}, {})", direction, x, y)
            }
            Some(OperationParams::Drag { x1, y1, x2, y2 }) => {
                write!(f, " from ({}, {}) to ({}, {})", x1, y1, x2, y2)
            }
            Some(OperationParams::Text { content }) => write!(f, " '{}'", content),
            Some(OperationParams::Key { key }) => write!(f, " {}", key),
            Some(OperationParams::Empty {}) | None => Ok(()),
        }
    }
}
