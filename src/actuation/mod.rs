//! Actuation: turning operations into input events
//!
//! [`Hand`] owns the dispatch from [`OperationKind`] to input primitives;
//! the primitives themselves come from an [`InputDevice`] backend.

use crate::actions::{Operation, OperationKind, OperationParams, ScrollDirection};
use crate::core::config::ExploreConfig;
use crate::core::error::Result;
use crate::core::types::Point;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Executes operations against the game window
pub trait Actuator {
    /// Perform `op`, whose coordinates are relative to `origin`
    fn execute(&mut self, op: &Operation, origin: Point) -> Result<()>;

    /// Dismiss overlays between episodes by right-clicking `point`
    fn reset(&mut self, origin: Point, point: Point) -> Result<()>;
}

/// Low-level input backend in desktop coordinates
pub trait InputDevice {
    fn click(&mut self, at: Point) -> Result<()>;
    fn right_click(&mut self, at: Point) -> Result<()>;
    fn double_click(&mut self, at: Point) -> Result<()>;
    fn drag(&mut self, from: Point, to: Point) -> Result<()>;
    fn scroll(&mut self, at: Point, direction: ScrollDirection) -> Result<()>;
    fn long_press(&mut self, at: Point, hold: Duration) -> Result<()>;
    fn type_text(&mut self, text: &str) -> Result<()>;
    fn hotkey(&mut self, keys: &str) -> Result<()>;
    fn press_key(&mut self, key: &str) -> Result<()>;
}

/// Window-relative point right-clicked when no reset point is configured
pub const DEFAULT_RESET_POINT: Point = Point { x: 100, y: 100 };
const RESET_SETTLE: Duration = Duration::from_secs(1);

/// Clear per-episode overlays before an attempt, unless resets are closed
pub fn reset_episode<A: Actuator + ?Sized>(
    actuator: &mut A,
    origin: Point,
    config: &ExploreConfig,
) -> Result<()> {
    if config.close_reset {
        return Ok(());
    }
    let point = config
        .reset_point
        .map(|(x, y)| Point::new(x, y))
        .unwrap_or(DEFAULT_RESET_POINT);
    actuator.reset(origin, point)?;
    thread::sleep(RESET_SETTLE);
    Ok(())
}

/// Sleep for a configured number of seconds; non-positive values skip
pub fn settle(seconds: f64) {
    if seconds > 0.0 {
        thread::sleep(Duration::from_secs_f64(seconds));
    }
}

pub struct Hand<D: InputDevice> {
    device: D,
    /// Pause performed by `Wait`
    pub wait: Duration,
    pub long_press: Duration,
}

impl<D: InputDevice> Hand<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            wait: Duration::from_millis(500),
            long_press: Duration::from_secs(1),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    fn point(op: &Operation, origin: Point) -> Option<Point> {
        op.params.as_ref().and_then(|p| p.point()).map(|p| p.offset(origin))
    }
}

impl<D: InputDevice> Actuator for Hand<D> {
    fn execute(&mut self, op: &Operation, origin: Point) -> Result<()> {
        let skipped = |reason: &str| -> Result<()> {
            warn!(operation = %op, reason, "operation ignored");
            Ok(())
        };

        match op.operate {
            OperationKind::Click => match Self::point(op, origin) {
                Some(p) => self.device.click(p),
                None => skipped("missing point"),
            },
            OperationKind::RightSingle => match Self::point(op, origin) {
                Some(p) => self.device.right_click(p),
                None => skipped("missing point"),
            },
            OperationKind::LeftDouble => match Self::point(op, origin) {
                Some(p) => self.device.double_click(p),
                None => skipped("missing point"),
            },
            OperationKind::LongPress => match Self::point(op, origin) {
                Some(p) => self.device.long_press(p, self.long_press),
                None => skipped("missing point"),
            },
            OperationKind::Scroll => match &op.params {
                Some(OperationParams::Scroll { x, y, direction }) => self
                    .device
                    .scroll(Point::new(*x, *y).offset(origin), *direction),
                _ => skipped("missing scroll parameters"),
            },
            OperationKind::Drag => match &op.params {
                Some(OperationParams::Drag { x1, y1, x2, y2 }) => self.device.drag(
                    Point::new(*x1, *y1).offset(origin),
                    Point::new(*x2, *y2).offset(origin),
                ),
                _ => skipped("missing drag parameters"),
            },
            OperationKind::Type => match &op.params {
                Some(OperationParams::Text { content }) => self.device.type_text(content),
                _ => skipped("missing text"),
            },
            OperationKind::Hotkey => match &op.params {
                Some(OperationParams::Key { key }) => self.device.hotkey(key),
                _ => skipped("missing key"),
            },
            OperationKind::PressBack => self.device.press_key("backspace"),
            OperationKind::PressHome => self.device.press_key("home"),
            OperationKind::PressEnter => self.device.press_key("enter"),
            OperationKind::Wait => {
                thread::sleep(self.wait);
                Ok(())
            }
            OperationKind::Finished => {
                info!("model reports the task finished");
                Ok(())
            }
            OperationKind::CallUser => {
                info!("model asks for the user");
                Ok(())
            }
            OperationKind::Unknown => skipped("unknown operation kind"),
        }
    }

    fn reset(&mut self, origin: Point, point: Point) -> Result<()> {
        self.device.right_click(point.offset(origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ObjectId;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl InputDevice for Recorder {
        fn click(&mut self, at: Point) -> Result<()> {
            self.events.push(format!("click {} {}", at.x, at.y));
            Ok(())
        }
        fn right_click(&mut self, at: Point) -> Result<()> {
            self.events.push(format!("right {} {}", at.x, at.y));
            Ok(())
        }
        fn double_click(&mut self, at: Point) -> Result<()> {
            self.events.push(format!("double {} {}", at.x, at.y));
            Ok(())
        }
        fn drag(&mut self, from: Point, to: Point) -> Result<()> {
            self.events
                .push(format!("drag {} {} {} {}", from.x, from.y, to.x, to.y));
            Ok(())
        }
        fn scroll(&mut self, at: Point, direction: ScrollDirection) -> Result<()> {
            self.events
                .push(format!("scroll {} {} {:?}", at.x, at.y, direction));
            Ok(())
        }
        fn long_press(&mut self, at: Point, _hold: Duration) -> Result<()> {
            self.events.push(format!("long {} {}", at.x, at.y));
            Ok(())
        }
        fn type_text(&mut self, text: &str) -> Result<()> {
            self.events.push(format!("type {}", text));
            Ok(())
        }
        fn hotkey(&mut self, keys: &str) -> Result<()> {
            self.events.push(format!("hotkey {}", keys));
            Ok(())
        }
        fn press_key(&mut self, key: &str) -> Result<()> {
            self.events.push(format!("key {}", key));
            Ok(())
        }
    }

    #[test]
    fn test_coordinates_offset_by_window_origin() {
        let mut hand = Hand::new(Recorder::default());
        let origin = Point::new(100, 50);
        hand.execute(&Operation::click(10, 20), origin).unwrap();
        hand.execute(
            &Operation::new(
                OperationKind::Drag,
                Some(OperationParams::Drag {
                    x1: 0,
                    y1: 0,
                    x2: 5,
                    y2: 5,
                }),
            ),
            origin,
        )
        .unwrap();
        hand.reset(origin, Point::new(100, 100)).unwrap();

        assert_eq!(
            hand.device().events,
            vec!["click 110 70", "drag 100 50 105 55", "right 200 150"]
        );
    }

    #[test]
    fn test_unknown_and_ungrounded_operations_ignored() {
        let mut hand = Hand::new(Recorder::default());
        hand.execute(&Operation::new(OperationKind::Unknown, None), Point::default())
            .unwrap();
        hand.execute(
            &Operation::on_object(OperationKind::Click, ObjectId(3)),
            Point::default(),
        )
        .unwrap();
        hand.execute(&Operation::new(OperationKind::Finished, None), Point::default())
            .unwrap();
        assert!(hand.device().events.is_empty());
    }

    #[test]
    fn test_key_presses() {
        let mut hand = Hand::new(Recorder::default());
        hand.execute(&Operation::new(OperationKind::PressEnter, None), Point::default())
            .unwrap();
        hand.execute(
            &Operation::new(
                OperationKind::Hotkey,
                Some(OperationParams::Key { key: "ctrl+s".into() }),
            ),
            Point::default(),
        )
        .unwrap();
        assert_eq!(hand.device().events, vec!["key enter", "hotkey ctrl+s"]);
    }

    #[test]
    fn test_reset_episode_respects_config() {
        let mut hand = Hand::new(Recorder::default());
        let mut config = ExploreConfig::default();
        reset_episode(&mut hand, Point::new(10, 10), &config).unwrap();
        assert!(hand.device().events.is_empty());

        config.close_reset = false;
        config.reset_point = Some((5, 6));
        reset_episode(&mut hand, Point::new(10, 10), &config).unwrap();
        assert_eq!(hand.device().events, vec!["right 15 16"]);
    }
}
