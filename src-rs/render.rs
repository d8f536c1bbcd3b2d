//! Progressive color-fill of goal regions.
//!
//! The board is drawn as a darkened grayscale base, then each goal paints the
//! original colors back inside its region, from the region's bottom edge up
//! to a height proportional to its progress.

use crate::region::{Region, FULL};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{DynamicImage, Rgba, RgbaImage};
use std::time::Duration;

/// Time a reveal takes to travel between two progress values.
pub const FILL_DURATION: Duration = Duration::from_millis(1200);

pub const FILL_EASE: CubicBezier = CubicBezier::new(0.43, 0.13, 0.23, 0.96);

const BASE_BRIGHTNESS: f64 = 0.5;
const OUTLINE: Rgba<u8> = Rgba([255, 255, 255, 77]);
const LABEL_BG: Rgba<u8> = Rgba([0, 0, 0, 178]);
const LABEL_FG: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Visible part of a goal's color layer, in image percentages.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ClipRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl ClipRect {
    pub fn is_empty(&self) -> bool {
        self.top >= self.bottom || self.left >= self.right
    }

    /// Pixel bounds `(x0, y0, x1, y1)`, end-exclusive, or `None` if nothing is visible.
    pub fn to_pixels(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let to_px = |pct: f64, span: u32| -> u32 {
            ((pct / FULL) * f64::from(span)).round().clamp(0.0, f64::from(span)) as u32
        };
        let x0 = to_px(self.left, width);
        let x1 = to_px(self.right, width);
        let y0 = to_px(self.top, height);
        let y1 = to_px(self.bottom, height);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0, y0, x1, y1))
    }
}

/// Clip of a region at `progress` percent. Horizontal bounds are the region's;
/// the top edge rises from the region bottom (0%) to the region top (100%).
pub fn fill_clip(region: &Region, progress: f64) -> ClipRect {
    let p = progress.clamp(0.0, FULL);
    ClipRect {
        left: region.x,
        top: region.y + region.height * (1.0 - p / FULL),
        right: region.right(),
        bottom: region.bottom(),
    }
}

/// CSS-style cubic-bezier timing curve through (0,0) and (1,1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl CubicBezier {
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    fn component(a1: f64, a2: f64, s: f64) -> f64 {
        let inv = 1.0 - s;
        3.0 * inv * inv * s * a1 + 3.0 * inv * s * s * a2 + s * s * s
    }

    /// Eased value at time fraction `t`. The x component is inverted by
    /// bisection, which needs x to be monotone (true for x1, x2 in [0, 1]).
    pub fn ease(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        if t >= 1.0 {
            return 1.0;
        }
        let (mut lo, mut hi) = (0.0f64, 1.0f64);
        for _ in 0..48 {
            let mid = (lo + hi) / 2.0;
            if Self::component(self.x1, self.x2, mid) < t {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Self::component(self.y1, self.y2, (lo + hi) / 2.0).clamp(0.0, 1.0)
    }
}

/// Animated transition of one region between two progress values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillAnimation {
    pub from: f64,
    pub to: f64,
    pub duration: Duration,
    pub easing: CubicBezier,
}

impl FillAnimation {
    pub fn new(from: f64, to: f64) -> Self {
        Self {
            from: from.clamp(0.0, FULL),
            to: to.clamp(0.0, FULL),
            duration: FILL_DURATION,
            easing: FILL_EASE,
        }
    }

    /// First paint: the reveal starts empty.
    pub fn reveal(to: f64) -> Self {
        Self::new(0.0, to)
    }

    pub fn progress_at(&self, elapsed: Duration) -> f64 {
        if self.duration.is_zero() {
            return self.to;
        }
        let t = (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0);
        self.from + (self.to - self.from) * self.easing.ease(t)
    }

    pub fn clip_at(&self, region: &Region, elapsed: Duration) -> ClipRect {
        fill_clip(region, self.progress_at(elapsed))
    }

    pub fn is_finished(&self, elapsed: Duration) -> bool {
        elapsed >= self.duration
    }

    /// Elapsed times of `frames` evenly spaced samples, both ends included.
    pub fn frame_times(&self, frames: usize) -> Vec<Duration> {
        match frames {
            0 => Vec::new(),
            1 => vec![self.duration],
            n => (0..n)
                .map(|i| self.duration.mul_f64(i as f64 / (n - 1) as f64))
                .collect(),
        }
    }
}

/// One goal to paint.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FillTarget {
    pub title: String,
    pub region: Region,
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Layer {
    pub title: String,
    pub region: Region,
    pub progress: f64,
    pub clip: ClipRect,
}

/// Color layers in paint order; later layers cover earlier ones.
pub fn layers(targets: &[FillTarget]) -> Vec<Layer> {
    targets
        .iter()
        .map(|t| Layer {
            title: t.title.clone(),
            region: t.region,
            progress: t.progress.clamp(0.0, FULL),
            clip: fill_clip(&t.region, t.progress),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressRenderer {
    pub base_brightness: f64,
    pub labels: bool,
}

impl Default for ProgressRenderer {
    fn default() -> Self {
        Self {
            base_brightness: BASE_BRIGHTNESS,
            labels: true,
        }
    }
}

impl ProgressRenderer {
    pub fn render(&self, image: &DynamicImage, targets: &[FillTarget]) -> RgbaImage {
        let source = image.to_rgba8();
        let mut out = self.base_layer(&source);
        let (w, h) = out.dimensions();

        for layer in layers(targets) {
            let Some((x0, y0, x1, y1)) = layer.clip.to_pixels(w, h) else {
                continue;
            };
            for y in y0..y1 {
                for x in x0..x1 {
                    out.put_pixel(x, y, *source.get_pixel(x, y));
                }
            }
        }

        if self.labels {
            let scale = label_scale(w, h);
            for layer in layers(targets) {
                draw_labels(&mut out, &layer, scale);
            }
        }
        out
    }

    /// Frames of every target rising from `start` to its own progress.
    pub fn animate(
        &self,
        image: &DynamicImage,
        targets: &[FillTarget],
        start: f64,
        frames: usize,
    ) -> Vec<RgbaImage> {
        let animations: Vec<FillAnimation> = targets
            .iter()
            .map(|t| FillAnimation::new(start, t.progress))
            .collect();
        let times = FillAnimation::new(start, start).frame_times(frames);

        times
            .into_iter()
            .map(|elapsed| {
                let frame_targets: Vec<FillTarget> = targets
                    .iter()
                    .zip(&animations)
                    .map(|(t, anim)| FillTarget {
                        progress: anim.progress_at(elapsed),
                        ..t.clone()
                    })
                    .collect();
                self.render(image, &frame_targets)
            })
            .collect()
    }

    fn base_layer(&self, source: &RgbaImage) -> RgbaImage {
        let mut out = source.clone();
        for px in out.pixels_mut() {
            let luma = color_luma(*px) * 255.0 * self.base_brightness;
            let v = luma.round().clamp(0.0, 255.0) as u8;
            *px = Rgba([v, v, v, px[3]]);
        }
        out
    }
}

fn label_scale(w: u32, h: u32) -> u32 {
    (w.min(h) / 400).clamp(1, 4)
}

fn draw_labels(img: &mut RgbaImage, layer: &Layer, scale: u32) {
    let (w, h) = img.dimensions();
    let region_clip = fill_clip(&layer.region, FULL);
    let Some((x0, y0, x1, y1)) = region_clip.to_pixels(w, h) else {
        return;
    };
    draw_rect_outline(img, x0, y0, x1 - x0, y1 - y0, OUTLINE, scale);

    let pad = 2 * scale as i32;
    let glyph = 8 * scale as i32;
    let (x0, y0, x1, y1) = (x0 as i32, y0 as i32, x1 as i32, y1 as i32);

    let badge = format!("{}%", layer.progress.round() as u32);
    let badge_w = badge.chars().count() as i32 * glyph;
    let bx = (x1 - pad * 2 - badge_w).max(x0);
    let by = y0 + pad * 2;
    fill_rect_alpha(img, bx - pad, by - pad, bx + badge_w + pad - 1, by + glyph + pad - 1, LABEL_BG);
    draw_bitmap_text(img, bx, by, &badge, LABEL_FG, scale);

    let max_chars = ((x1 - x0 - pad * 4) / glyph).max(0) as usize;
    let title = truncate_label(&layer.title, max_chars);
    if title.is_empty() {
        return;
    }
    let tx = x0 + pad * 2;
    let ty = (y1 - pad * 2 - glyph).max(y0);
    let title_w = title.chars().count() as i32 * glyph;
    fill_rect_alpha(img, tx - pad, ty - pad, tx + title_w + pad - 1, ty + glyph + pad - 1, LABEL_BG);
    draw_bitmap_text(img, tx, ty, &title, LABEL_FG, scale);
}

fn truncate_label(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    text.chars().take(max_chars - 3).collect::<String>() + "..."
}

fn color_luma(color: Rgba<u8>) -> f64 {
    let [r, g, b, _] = color.0;
    (0.2126 * f64::from(r) + 0.7152 * f64::from(g) + 0.0722 * f64::from(b)) / 255.0
}

fn clamp_i32(value: i32, min_value: i32, max_value: i32) -> i32 {
    value.max(min_value).min(max_value)
}

fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let mix = |d: u8, s: u8| (f64::from(d) * inv + f64::from(s) * a).round().clamp(0.0, 255.0) as u8;
    let out_a = (f64::from(dst[3]) + f64::from(src[3]) * inv)
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([mix(dst[0], src[0]), mix(dst[1], src[1]), mix(dst[2], src[2]), out_a])
}

fn blend_at(img: &mut RgbaImage, x: u32, y: u32, color: Rgba<u8>) {
    let dst = *img.get_pixel(x, y);
    img.put_pixel(x, y, blend_pixel(dst, color));
}

fn fill_rect_alpha(img: &mut RgbaImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let min_x = clamp_i32(x0.min(x1), 0, img.width() as i32 - 1);
    let max_x = clamp_i32(x0.max(x1), 0, img.width() as i32 - 1);
    let min_y = clamp_i32(y0.min(y1), 0, img.height() as i32 - 1);
    let max_y = clamp_i32(y0.max(y1), 0, img.height() as i32 - 1);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            blend_at(img, x as u32, y as u32, color);
        }
    }
}

/// Inward outline, `thickness` pixels wide, blended over the image.
fn draw_rect_outline(
    img: &mut RgbaImage,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    color: Rgba<u8>,
    thickness: u32,
) {
    if w == 0 || h == 0 || img.width() == 0 || img.height() == 0 {
        return;
    }
    let x1 = (x + w - 1).min(img.width() - 1);
    let y1 = (y + h - 1).min(img.height() - 1);
    for yy in y..=y1 {
        for xx in x..=x1 {
            let edge = xx - x < thickness
                || x1 - xx < thickness
                || yy - y < thickness
                || y1 - yy < thickness;
            if edge {
                blend_at(img, xx, yy, color);
            }
        }
    }
}

fn draw_bitmap_text(img: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>, scale: u32) {
    let scale_i = scale.max(1) as i32;
    let mut cursor_x = x;
    for ch in text.chars() {
        let glyph = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?'));
        let Some(glyph) = glyph else {
            cursor_x += 8 * scale_i;
            continue;
        };
        for (row_idx, row) in glyph.iter().enumerate() {
            for col_idx in 0..8 {
                if (*row >> col_idx) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + col_idx * scale_i;
                let py = y + row_idx as i32 * scale_i;
                for sy in 0..scale_i {
                    for sx in 0..scale_i {
                        let (tx, ty) = (px + sx, py + sy);
                        if tx >= 0 && ty >= 0 && tx < img.width() as i32 && ty < img.height() as i32
                        {
                            blend_at(img, tx as u32, ty as u32, color);
                        }
                    }
                }
            }
        }
        cursor_x += 8 * scale_i;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> Region {
        Region::new(20.0, 40.0, 40.0, 50.0).unwrap()
    }

    fn solid(w: u32, h: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba(color)))
    }

    #[test]
    fn clip_rises_from_bottom() {
        let r = region();
        assert_eq!(fill_clip(&r, 0.0).top, 90.0);
        assert!(fill_clip(&r, 0.0).is_empty());
        assert_eq!(fill_clip(&r, 50.0).top, 65.0);
        let full = fill_clip(&r, 100.0);
        assert_eq!(
            full,
            ClipRect {
                left: 20.0,
                top: 40.0,
                right: 60.0,
                bottom: 90.0
            }
        );
        assert_eq!(fill_clip(&r, 250.0), full);
    }

    #[test]
    fn easing_hits_endpoints_and_is_monotone() {
        assert_eq!(FILL_EASE.ease(0.0), 0.0);
        assert_eq!(FILL_EASE.ease(1.0), 1.0);
        let mut prev = 0.0;
        for i in 0..=200 {
            let v = FILL_EASE.ease(i as f64 / 200.0);
            assert!(v >= prev - 1e-12, "ease dipped at step {i}");
            prev = v;
        }
    }

    #[test]
    fn animation_moves_clip_monotonically_both_ways() {
        let r = region();
        for (from, to) in [(0.0, 75.0), (80.0, 20.0)] {
            let anim = FillAnimation::new(from, to);
            let tops: Vec<f64> = anim
                .frame_times(30)
                .into_iter()
                .map(|t| anim.clip_at(&r, t).top)
                .collect();
            assert_eq!(tops[0], fill_clip(&r, from).top);
            assert!((tops[29] - fill_clip(&r, to).top).abs() < 1e-9);
            let rising = to > from;
            for pair in tops.windows(2) {
                if rising {
                    assert!(pair[1] <= pair[0] + 1e-9);
                } else {
                    assert!(pair[1] >= pair[0] - 1e-9);
                }
            }
            let mid = anim.clip_at(&r, FILL_DURATION / 2).top;
            assert!(mid != tops[0] && mid != tops[29]);
        }
    }

    #[test]
    fn zero_duration_jumps_to_target() {
        let mut anim = FillAnimation::reveal(40.0);
        anim.duration = Duration::ZERO;
        assert_eq!(anim.progress_at(Duration::ZERO), 40.0);
        assert!(anim.is_finished(Duration::ZERO));
    }

    #[test]
    fn base_is_dark_gray_and_fill_restores_color() {
        let img = solid(100, 100, [200, 40, 40, 255]);
        let renderer = ProgressRenderer {
            labels: false,
            ..ProgressRenderer::default()
        };
        let target = FillTarget {
            title: "Travel".to_string(),
            region: Region::new(0.0, 0.0, 50.0, 100.0).unwrap(),
            progress: 50.0,
        };
        let out = renderer.render(&img, &[target]);

        let base = out.get_pixel(80, 80);
        assert_eq!(base[0], base[1]);
        assert!(base[0] < 100);
        assert_eq!(*out.get_pixel(10, 80), Rgba([200, 40, 40, 255]));
        assert_eq!(out.get_pixel(10, 20)[0], base[0]);
    }

    #[test]
    fn labels_draw_inside_region_only() {
        let img = solid(200, 200, [0, 0, 0, 255]);
        let target = FillTarget {
            title: "A very long goal title that will not fit".to_string(),
            region: Region::new(50.0, 50.0, 50.0, 50.0).unwrap(),
            progress: 0.0,
        };
        let out = ProgressRenderer::default().render(&img, &[target]);
        for (x, y, px) in out.enumerate_pixels() {
            if x < 100 || y < 100 {
                assert_eq!(px, &Rgba([0, 0, 0, 255]), "pixel {x},{y} touched");
            }
        }
        assert!(out.pixels().any(|p| p[0] > 200));
    }

    #[test]
    fn animate_emits_requested_frames() {
        let img = solid(40, 40, [10, 200, 10, 255]);
        let target = FillTarget {
            title: String::new(),
            region: Region::new(0.0, 0.0, 100.0, 100.0).unwrap(),
            progress: 100.0,
        };
        let renderer = ProgressRenderer {
            labels: false,
            ..ProgressRenderer::default()
        };
        let frames = renderer.animate(&img, &[target], 0.0, 5);
        assert_eq!(frames.len(), 5);
        assert_ne!(frames[0].get_pixel(20, 20), &Rgba([10, 200, 10, 255]));
        assert_eq!(frames[4].get_pixel(20, 20), &Rgba([10, 200, 10, 255]));
    }

    #[test]
    fn long_titles_are_shortened() {
        assert_eq!(truncate_label("Learn Spanish", 20), "Learn Spanish");
        assert_eq!(truncate_label("Learn Spanish", 8), "Learn...");
        assert_eq!(truncate_label("Learn", 2), "Le");
    }
}
