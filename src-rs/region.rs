//! Percentage-based rectangles laid over a vision board image.
//!
//! All coordinates are percentages of the image's width/height, so a region
//! survives any rescaling of the rendered board.

use crate::error::{Error, Result};

/// Extent of either image axis in percent.
pub const FULL: f64 = 100.0;

/// A freshly drawn rectangle must exceed this on both axes to become a goal.
pub const MIN_DRAW_SIZE: f64 = 2.0;

/// Resizing never shrinks a region to this size or below.
pub const MIN_RESIZE_SIZE: f64 = 5.0;

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Pins the point onto the image.
    pub fn clamped(self) -> Self {
        Self {
            x: clamp_pct(self.x),
            y: clamp_pct(self.y),
        }
    }

    /// Converts a pixel position inside a `width`×`height` surface into percentages.
    pub fn from_pixels(px: f64, py: f64, width: f64, height: f64) -> Self {
        if width <= 0.0 || height <= 0.0 {
            return Self::new(0.0, 0.0);
        }
        Self::new(px / width * FULL, py / height * FULL).clamped()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    /// Builds a region and checks it against the image bounds.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self> {
        let region = Self {
            x,
            y,
            width,
            height,
        };
        region.validate()?;
        Ok(region)
    }

    /// Normalized bounding box of two (clamped) corner points.
    pub fn from_corners(a: Point, b: Point) -> Self {
        let a = a.clamped();
        let b = b.clamped();
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [self.x, self.y, self.width, self.height];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(Error::validation("region coordinates must be finite"));
        }
        if fields.iter().any(|v| *v < -EPS || *v > FULL + EPS) {
            return Err(Error::validation(format!(
                "region {self:?} has a coordinate outside 0-100"
            )));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(Error::validation("region must have a positive size"));
        }
        if self.right() > FULL + EPS || self.bottom() > FULL + EPS {
            return Err(Error::validation(format!(
                "region {self:?} extends past the image"
            )));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// True when the rectangle is large enough to keep after a draw gesture.
    pub fn is_drawable(&self) -> bool {
        self.width > MIN_DRAW_SIZE && self.height > MIN_DRAW_SIZE
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Translates by `(dx, dy)` keeping the whole rectangle on the image.
    pub fn translated_clamped(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: (self.x + dx).min(FULL - self.width).max(0.0),
            y: (self.y + dy).min(FULL - self.height).max(0.0),
            ..*self
        }
    }

    /// Forces loosely specified coordinates (e.g. model output) onto the image.
    /// Returns `None` when nothing of the rectangle is left.
    pub fn fitted_to_image(&self) -> Option<Self> {
        let fields = [self.x, self.y, self.width, self.height];
        if fields.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let x = clamp_pct(self.x);
        let y = clamp_pct(self.y);
        let width = self.width.min(FULL - x);
        let height = self.height.min(FULL - y);
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        Some(Self {
            x,
            y,
            width,
            height,
        })
    }
}

fn clamp_pct(v: f64) -> f64 {
    v.clamp(0.0, FULL)
}
