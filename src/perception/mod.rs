//! Perception: what the agent sees of the game window
//!
//! Screen capture, embedding and region proposal are backend concerns behind
//! the [`Perception`] trait. Everything computed from pixels afterwards
//! (change detection, hashing, object tracking, grounding) lives here.

pub mod grounding;
pub mod image_ops;
pub mod objects;

pub use grounding::{Grounding, TemplateGrounder};
pub use objects::{extract_objects, rematch_objects, DetectedObject};

use crate::actions::{Operation, OperationKind, OperationParams, ScrollDirection};
use crate::core::config::PerceptionConfig;
use crate::core::error::Result;
use crate::core::types::{BoundingBox, Fingerprint, Point, Screen};
use crate::memory::records::ObjectRecord;
use crate::memory::MemoryStore;
use tracing::{info, warn};

/// Backend that captures and embeds the game window
pub trait Perception {
    /// Current frame of the game window
    fn capture_screen(&mut self) -> Result<Screen>;

    /// Embedding used to tell states apart
    fn fingerprint(&mut self, screen: &Screen) -> Result<Fingerprint>;

    /// Candidate UI element regions from a segmentation model
    fn propose_regions(&mut self, screen: &Screen) -> Result<Vec<BoundingBox>>;

    /// Top-left corner of the window on the desktop
    fn window_origin(&self) -> Point;

    /// Fraction of the frame that changed, in [0, 1]
    fn perceptual_diff(&self, before: &Screen, after: &Screen, pixel_delta: u8) -> f64 {
        image_ops::change_ratio(before, after, pixel_delta)
    }
}

/// A captured frame together with its embedding
#[derive(Debug, Clone)]
pub struct Observation {
    pub screen: Screen,
    pub fingerprint: Fingerprint,
}

pub fn observe<P: Perception + ?Sized>(perception: &mut P) -> Result<Observation> {
    let screen = perception.capture_screen()?;
    let fingerprint = perception.fingerprint(&screen)?;
    Ok(Observation {
        screen,
        fingerprint,
    })
}

/// Whether an action visibly changed the screen
pub fn acted<P: Perception + ?Sized>(
    perception: &P,
    before: &Screen,
    after: &Screen,
    config: &PerceptionConfig,
) -> bool {
    perception.perceptual_diff(before, after, config.pixel_delta) > config.change_ratio_threshold
}

/// Detect objects on `screen` and rematch them against `known`
pub fn detect_objects<P: Perception + ?Sized>(
    perception: &mut P,
    screen: &Screen,
    known: &[ObjectRecord],
    config: &PerceptionConfig,
) -> Result<Vec<DetectedObject>> {
    let regions = perception.propose_regions(screen)?;
    let mut objects = extract_objects(screen, &regions, &config.detection);
    rematch_objects(&mut objects, known, config.area_tolerance, config.hash_threshold);
    Ok(objects)
}

/// Resolve an object-bound operation to a point on the live screen
///
/// Operations that already carry coordinates pass through unchanged.
/// `None` means the object could not be found on screen.
pub fn ground_operation(
    store: &MemoryStore,
    grounder: &TemplateGrounder,
    screen: &Screen,
    op: &Operation,
) -> Result<Option<Operation>> {
    let object_id = match op.object_id {
        Some(id) if op.needs_grounding() => id,
        _ => return Ok(Some(op.clone())),
    };
    let template = match store.object_image(object_id)? {
        Some(template) => template,
        None => {
            warn!(object_id = %object_id, "object image missing; cannot ground");
            return Ok(None);
        }
    };

    let grounding = grounder.locate(screen, &template);
    match grounding.point {
        Some(p) => {
            let params = match op.operate {
                OperationKind::Scroll => OperationParams::Scroll {
                    x: p.x,
                    y: p.y,
                    direction: ScrollDirection::Down,
                },
                _ => OperationParams::Point { x: p.x, y: p.y },
            };
            Ok(Some(Operation {
                operate: op.operate,
                object_id: op.object_id,
                params: Some(params),
            }))
        }
        None => {
            info!(object_id = %object_id, score = grounding.score, "grounding failed");
            Ok(None)
        }
    }
}
