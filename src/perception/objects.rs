//! Turning raw detector regions into tracked UI objects

use super::image_ops::{average_hash, contrast, crop, hamming_distance};
use crate::core::config::DetectionFilter;
use crate::core::types::{BoundingBox, ObjectId, Point, Screen};
use crate::memory::records::ObjectRecord;

/// An object visible on the current screen
#[derive(Debug, Clone)]
pub struct DetectedObject {
    /// Stored object this one was matched to, if any
    pub id: Option<ObjectId>,
    pub bbox: BoundingBox,
    pub hash: u64,
    pub image: Screen,
}

impl DetectedObject {
    pub fn area(&self) -> u32 {
        self.bbox.area()
    }

    pub fn center(&self) -> Point {
        self.bbox.center()
    }
}

/// Filter and deduplicate detector regions
///
/// Keeps regions in the order given; a region is a duplicate of an earlier
/// kept one when their centres are within `duplicate_distance` on both axes
/// or their hashes are within `duplicate_hash_distance`.
pub fn extract_objects(
    screen: &Screen,
    regions: &[BoundingBox],
    filter: &DetectionFilter,
) -> Vec<DetectedObject> {
    let screen_area = screen.width() as f64 * screen.height() as f64;
    let mut objects: Vec<DetectedObject> = Vec::new();

    for bbox in regions {
        if screen_area == 0.0
            || bbox.area() as f64 / screen_area > filter.max_area_fraction
            || bbox.width <= filter.min_side
            || bbox.height <= filter.min_side
        {
            continue;
        }

        let image = crop(screen, bbox);
        if image.width() == 0 || image.height() == 0 || contrast(&image) < filter.min_contrast {
            continue;
        }

        let center = bbox.center();
        if center.y < filter.min_center_y {
            continue;
        }

        let hash = average_hash(&image);
        let duplicate = objects.iter().any(|prev| {
            let c = prev.center();
            ((c.x - center.x).abs() <= filter.duplicate_distance
                && (c.y - center.y).abs() <= filter.duplicate_distance)
                || hamming_distance(prev.hash, hash) <= filter.duplicate_hash_distance
        });
        if duplicate {
            continue;
        }

        objects.push(DetectedObject {
            id: None,
            bbox: *bbox,
            hash,
            image,
        });
    }
    objects
}

/// Give detected objects the id of a matching stored object
///
/// A stored object matches when its area is within `area_tolerance`
/// (relative to the stored area) and its hash within `hash_threshold`.
/// The first match in `known` order wins.
pub fn rematch_objects(
    objects: &mut [DetectedObject],
    known: &[ObjectRecord],
    area_tolerance: f64,
    hash_threshold: u32,
) {
    for object in objects.iter_mut() {
        let area = object.area() as f64;
        object.id = known
            .iter()
            .find(|k| {
                k.area > 0
                    && (area - k.area as f64).abs() / k.area as f64 <= area_tolerance
                    && hamming_distance(object.hash, k.hash) <= hash_threshold
            })
            .map(|k| k.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StateId;
    use image::Rgb;

    /// 200x200 grey screen with a few striped buttons
    fn screen_with_buttons(buttons: &[BoundingBox]) -> Screen {
        let mut screen = Screen::from_pixel(200, 200, Rgb([90, 90, 90]));
        for b in buttons {
            for y in b.y..b.y + b.height {
                for x in b.x..b.x + b.width {
                    let v = if (x + y) % 4 < 2 { 250 } else { 10 };
                    screen.put_pixel(x, y, Rgb([v, v, v]));
                }
            }
        }
        screen
    }

    #[test]
    fn test_filters_large_thin_flat_and_title_bar_regions() {
        let button = BoundingBox::new(50, 50, 20, 20);
        let screen = screen_with_buttons(&[button, BoundingBox::new(100, 2, 20, 20)]);
        let regions = [
            button,
            BoundingBox::new(0, 0, 150, 150),   // background
            BoundingBox::new(10, 100, 40, 4),   // too thin
            BoundingBox::new(150, 150, 20, 20), // flat fill
            BoundingBox::new(100, 2, 20, 20),   // title bar
        ];
        let objects = extract_objects(&screen, &regions, &DetectionFilter::default());
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].bbox, button);
        assert!(objects[0].id.is_none());
    }

    #[test]
    fn test_near_duplicate_regions_dropped() {
        let a = BoundingBox::new(50, 50, 20, 20);
        let screen = screen_with_buttons(&[a]);
        let shifted = BoundingBox::new(52, 53, 20, 20);
        let objects = extract_objects(&screen, &[a, shifted], &DetectionFilter::default());
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn test_rematch_by_area_and_hash() {
        let a = BoundingBox::new(50, 50, 20, 20);
        let screen = screen_with_buttons(&[a]);
        let mut objects = extract_objects(&screen, &[a], &DetectionFilter::default());
        let hash = objects[0].hash;

        let known = vec![
            ObjectRecord {
                id: ObjectId(1),
                state_id: StateId(1),
                name: None,
                image: Screen::new(1, 1),
                hash: !hash,
                area: 400,
            },
            ObjectRecord {
                id: ObjectId(2),
                state_id: StateId(1),
                name: None,
                image: Screen::new(1, 1),
                hash,
                area: 1000,
            },
            ObjectRecord {
                id: ObjectId(3),
                state_id: StateId(1),
                name: None,
                image: Screen::new(1, 1),
                hash: hash ^ 0b111,
                area: 420,
            },
        ];
        rematch_objects(&mut objects, &known, 0.1, 15);
        assert_eq!(objects[0].id, Some(ObjectId(3)));

        rematch_objects(&mut objects, &known[..2], 0.1, 15);
        assert_eq!(objects[0].id, None);
    }
}
