//! Locating a stored object image on the live screen
//!
//! Scores are normalised cross-correlation of mean-subtracted grayscale
//! patches, the same measure as OpenCV's `TM_CCOEFF_NORMED`.

use crate::core::config::PerceptionConfig;
use crate::core::types::{Point, Screen};
use image::imageops;
use image::{GrayImage, Luma};
use rayon::prelude::*;

/// Rotations tried by the multi-angle search, in degrees
pub const SEARCH_ANGLES: [f64; 5] = [-8.0, -4.0, 0.0, 4.0, 8.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grounding {
    /// Centre of the best match, when it clears the threshold
    pub point: Option<Point>,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct TemplateGrounder {
    pub threshold: f64,
    pub plain_threshold: f64,
    pub angles: Vec<f64>,
}

impl Default for TemplateGrounder {
    fn default() -> Self {
        Self::from_config(&PerceptionConfig::default())
    }
}

impl TemplateGrounder {
    pub fn from_config(config: &PerceptionConfig) -> Self {
        Self {
            threshold: config.grounding_threshold,
            plain_threshold: config.plain_grounding_threshold,
            angles: SEARCH_ANGLES.to_vec(),
        }
    }

    /// Best match over all search angles at scale 1.0
    pub fn ground(&self, screen: &Screen, template: &Screen) -> Grounding {
        let screen = imageops::grayscale(screen);
        let template = imageops::grayscale(template);

        let mut best_score = -1.0;
        let mut best_center = None;
        for angle in &self.angles {
            let rotated = rotate(&template, *angle);
            if let Some(m) = match_template(&screen, &rotated) {
                if m.score > best_score {
                    best_score = m.score;
                    best_center = Some(m.center);
                }
            }
        }
        Grounding {
            point: best_center.filter(|_| best_score >= self.threshold),
            score: best_score,
        }
    }

    /// Multi-angle match, falling back to the plain match when it misses
    pub fn locate(&self, screen: &Screen, template: &Screen) -> Grounding {
        let found = self.ground(screen, template);
        if found.point.is_some() {
            return found;
        }
        let plain = self.ground_plain(screen, template);
        if plain.point.is_some() {
            plain
        } else {
            found
        }
    }

    /// Single unrotated match with the looser threshold
    pub fn ground_plain(&self, screen: &Screen, template: &Screen) -> Grounding {
        let screen = imageops::grayscale(screen);
        let template = imageops::grayscale(template);
        match match_template(&screen, &template) {
            Some(m) => Grounding {
                point: (m.score >= self.plain_threshold).then_some(m.center),
                score: m.score,
            },
            None => Grounding {
                point: None,
                score: -1.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    pub center: Point,
    pub score: f64,
}

/// Summed-area tables of values and squared values
struct Integral {
    width: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let width = w + 1;
        let mut sum = vec![0.0; width * (h + 1)];
        let mut sq = vec![0.0; width * (h + 1)];
        for y in 0..h {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = image.get_pixel(x as u32, y as u32).0[0] as f64;
                row += v;
                row_sq += v * v;
                sum[(y + 1) * width + x + 1] = sum[y * width + x + 1] + row;
                sq[(y + 1) * width + x + 1] = sq[y * width + x + 1] + row_sq;
            }
        }
        Self { width, sum, sq }
    }

    fn window(&self, table: &[f64], x: usize, y: usize, w: usize, h: usize) -> f64 {
        let at = |xx: usize, yy: usize| table[yy * self.width + xx];
        at(x + w, y + h) - at(x, y + h) - at(x + w, y) + at(x, y)
    }
}

/// Best `TM_CCOEFF_NORMED` match of `template` inside `screen`
///
/// Returns None when the template does not fit or has no variance.
/// Ties resolve to the top-most, then left-most position.
pub fn match_template(screen: &GrayImage, template: &GrayImage) -> Option<TemplateMatch> {
    let (sw, sh) = (screen.width() as usize, screen.height() as usize);
    let (tw, th) = (template.width() as usize, template.height() as usize);
    if tw == 0 || th == 0 || tw > sw || th > sh {
        return None;
    }

    let n = (tw * th) as f64;
    let t_mean = template.as_raw().iter().map(|p| *p as f64).sum::<f64>() / n;
    let t_centered: Vec<f64> = template.as_raw().iter().map(|p| *p as f64 - t_mean).collect();
    let t_norm = t_centered.iter().map(|v| v * v).sum::<f64>();
    if t_norm <= f64::EPSILON {
        return None;
    }

    let integral = Integral::new(screen);
    let raw = screen.as_raw();

    let best = (0..=sh - th)
        .into_par_iter()
        .map(|y| {
            let mut row_best: Option<(f64, usize, usize)> = None;
            for x in 0..=sw - tw {
                let s = integral.window(&integral.sum, x, y, tw, th);
                let s2 = integral.window(&integral.sq, x, y, tw, th);
                let i_norm = s2 - s * s / n;
                let score = if i_norm <= f64::EPSILON {
                    0.0
                } else {
                    let mut num = 0.0;
                    for ty in 0..th {
                        let row = (y + ty) * sw + x;
                        let t_row = ty * tw;
                        for tx in 0..tw {
                            num += t_centered[t_row + tx] * raw[row + tx] as f64;
                        }
                    }
                    num / (t_norm * i_norm).sqrt()
                };
                if row_best.map(|(b, _, _)| score > b).unwrap_or(true) {
                    row_best = Some((score, x, y));
                }
            }
            row_best
        })
        .reduce(
            || None,
            |a, b| match (a, b) {
                (Some(a), Some(b)) => {
                    let a_wins = a.0 > b.0 || (a.0 == b.0 && (a.2, a.1) <= (b.2, b.1));
                    Some(if a_wins { a } else { b })
                }
                (a, None) => a,
                (None, b) => b,
            },
        )?;

    let (score, x, y) = best;
    Some(TemplateMatch {
        center: Point::new((x + tw / 2) as i32, (y + th / 2) as i32),
        score: score.clamp(-1.0, 1.0),
    })
}

/// Rotate about the centre on a same-size canvas, black outside the source
pub fn rotate(image: &GrayImage, degrees: f64) -> GrayImage {
    if degrees == 0.0 {
        return image.clone();
    }
    let (w, h) = (image.width(), image.height());
    let cx = (w / 2) as f64;
    let cy = (h / 2) as f64;
    let (sin, cos) = degrees.to_radians().sin_cos();

    GrayImage::from_fn(w, h, |x, y| {
        // inverse map: destination -> source
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let sx = cos * dx - sin * dy + cx;
        let sy = sin * dx + cos * dy + cy;
        Luma([bilinear(image, sx, sy)])
    })
}

fn bilinear(image: &GrayImage, x: f64, y: f64) -> u8 {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;
    let px = |xx: i64, yy: i64| -> f64 {
        if xx < 0 || yy < 0 || xx >= w || yy >= h {
            0.0
        } else {
            image.get_pixel(xx as u32, yy as u32).0[0] as f64
        }
    };
    let top = px(x0, y0) * (1.0 - fx) + px(x0 + 1, y0) * fx;
    let bottom = px(x0, y0 + 1) * (1.0 - fx) + px(x0 + 1, y0 + 1) * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}
