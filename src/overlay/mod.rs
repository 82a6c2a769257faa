//! Detection overlay.
//!
//! `OverlayRenderer` owns a transparent RGBA surface and redraws it from scratch
//! for every batch: resize to the target dimensions, clear, then draw each
//! detection's box, label background and label text in batch order.
//!
//! Target dimensions are passed per call. The renderer never reads the video
//! size from anywhere else, so it runs headless in tests.

mod glyphs;

use std::path::Path;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

pub use glyphs::{measure_text, ADVANCE, TEXT_HEIGHT};

use crate::config::OverlaySettings;
use crate::detect::DetectionBatch;

/// Height of the label background strip.
pub const LABEL_HEIGHT: u32 = 20;
/// Horizontal padding added to the measured text width (split evenly per side).
pub const LABEL_PADDING: u32 = 10;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Rectangle in surface pixels. `x`/`y` may be negative for boxes that start off-surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

/// What the last `render` call drew for one detection.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayItem {
    pub box_rect: PixelRect,
    pub label: String,
    pub label_rect: PixelRect,
}

/// Colours and stroke width.
#[derive(Clone, Copy, Debug)]
pub struct OverlayStyle {
    pub box_color: Rgba<u8>,
    pub text_color: Rgba<u8>,
    pub line_width: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::from(&OverlaySettings::default())
    }
}

impl From<&OverlaySettings> for OverlayStyle {
    fn from(settings: &OverlaySettings) -> Self {
        Self {
            box_color: Rgba(settings.box_color),
            text_color: Rgba(settings.text_color),
            line_width: settings.line_width.max(1),
        }
    }
}

pub struct OverlayRenderer {
    surface: RgbaImage,
    style: OverlayStyle,
    items: Vec<OverlayItem>,
    renders: u64,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            surface: RgbaImage::new(0, 0),
            style,
            items: Vec::new(),
            renders: 0,
        }
    }

    /// Redraw the surface for `batch` at `target_width` x `target_height`.
    ///
    /// Boxes computed against a different frame size are rescaled first.
    pub fn render(&mut self, batch: &DetectionBatch, target_width: u32, target_height: u32) {
        self.renders += 1;
        if self.surface.dimensions() != (target_width, target_height) {
            log::debug!(
                "overlay surface resized {:?} -> {}x{}",
                self.surface.dimensions(),
                target_width,
                target_height
            );
            self.surface = RgbaImage::from_pixel(target_width, target_height, TRANSPARENT);
        } else {
            self.clear();
        }
        self.items.clear();

        if target_width == 0 || target_height == 0 {
            return;
        }

        let (sx, sy) = batch.scale_to(target_width, target_height);
        for detection in batch.detections() {
            let bbox = detection.bbox().scaled(sx, sy);
            let box_rect = PixelRect {
                x: bbox.x.round() as i32,
                y: bbox.y.round() as i32,
                width: bbox.width.round().max(1.0) as u32,
                height: bbox.height.round().max(1.0) as u32,
            };
            let label = detection.display_label();

            self.draw_box(box_rect);
            let label_rect = self.label_rect(box_rect, &label);
            self.draw_label(label_rect, &label);

            self.items.push(OverlayItem {
                box_rect,
                label,
                label_rect,
            });
        }
    }

    fn clear(&mut self) {
        for pixel in self.surface.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    fn draw_box(&mut self, rect: PixelRect) {
        for inset in 0..self.style.line_width {
            let shrink = inset * 2;
            if rect.width <= shrink || rect.height <= shrink {
                break;
            }
            let stroke = Rect::at(rect.x + inset as i32, rect.y + inset as i32)
                .of_size(rect.width - shrink, rect.height - shrink);
            draw_hollow_rect_mut(&mut self.surface, stroke, self.style.box_color);
        }
    }

    /// Background placed directly above the box's top-left corner, clamped on-surface.
    fn label_rect(&self, box_rect: PixelRect, label: &str) -> PixelRect {
        let (surface_w, surface_h) = self.surface.dimensions();
        let width = (measure_text(label) + LABEL_PADDING).min(surface_w);
        let height = LABEL_HEIGHT.min(surface_h);
        let max_x = (surface_w - width) as i32;
        let max_y = (surface_h - height) as i32;
        PixelRect {
            x: box_rect.x.clamp(0, max_x),
            y: (box_rect.y - LABEL_HEIGHT as i32).clamp(0, max_y),
            width,
            height,
        }
    }

    fn draw_label(&mut self, rect: PixelRect, label: &str) {
        if rect.width == 0 || rect.height == 0 {
            return;
        }
        let background = Rect::at(rect.x, rect.y).of_size(rect.width, rect.height);
        draw_filled_rect_mut(&mut self.surface, background, self.style.box_color);

        let text_x = rect.x + (LABEL_PADDING / 2) as i32;
        let text_y = rect.y + (rect.height.saturating_sub(TEXT_HEIGHT) / 2) as i32;
        glyphs::draw_text(
            &mut self.surface,
            text_x,
            text_y,
            label,
            self.style.text_color,
        );
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.surface.dimensions()
    }

    /// Items drawn by the most recent `render`.
    pub fn items(&self) -> &[OverlayItem] {
        &self.items
    }

    /// Number of `render` calls so far.
    pub fn renders(&self) -> u64 {
        self.renders
    }

    pub fn style(&self) -> OverlayStyle {
        self.style
    }

    /// Write the current surface as a PNG.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        if self.surface.width() == 0 || self.surface.height() == 0 {
            anyhow::bail!("overlay surface is empty; nothing rendered yet");
        }
        self.surface
            .save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("failed to write overlay to {}", path.display()))
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(OverlayStyle::default())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};

    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

    fn batch(items: &[(&str, f32, (f32, f32, f32, f32))], w: u32, h: u32) -> DetectionBatch {
        let detections = items
            .iter()
            .map(|(label, conf, (x, y, bw, bh))| {
                Detection::new(*label, *conf, BoundingBox::new(*x, *y, *bw, *bh))
            })
            .collect();
        DetectionBatch::new(detections, w, h, 1)
    }

    fn covered(items: &[OverlayItem], x: i32, y: i32) -> bool {
        items
            .iter()
            .any(|item| item.box_rect.contains(x, y) || item.label_rect.contains(x, y))
    }

    #[test]
    fn resizes_surface_to_target() {
        let mut renderer = OverlayRenderer::default();
        renderer.render(&DetectionBatch::empty(), 640, 480);
        assert_eq!(renderer.dimensions(), (640, 480));
        renderer.render(&DetectionBatch::empty(), 320, 240);
        assert_eq!(renderer.dimensions(), (320, 240));
    }

    #[test]
    fn draws_box_outline_and_label() {
        let mut renderer = OverlayRenderer::default();
        renderer.render(&batch(&[("person", 0.92, (10.0, 50.0, 100.0, 200.0))], 640, 480), 640, 480);

        let item = &renderer.items()[0];
        assert_eq!(item.label, "person (92%)");
        assert_eq!(
            item.box_rect,
            PixelRect {
                x: 10,
                y: 50,
                width: 100,
                height: 200
            }
        );
        assert_eq!(item.label_rect.y, 30);
        assert_eq!(item.label_rect.width, measure_text("person (92%)") + LABEL_PADDING);

        let surface = renderer.surface();
        // Two-pixel outline on the left edge, hollow interior.
        assert_eq!(*surface.get_pixel(10, 150), GREEN);
        assert_eq!(*surface.get_pixel(11, 150), GREEN);
        assert_eq!(*surface.get_pixel(12, 150), TRANSPARENT);
        assert_eq!(*surface.get_pixel(109, 150), GREEN);
        assert_eq!(*surface.get_pixel(60, 249), GREEN);
        // Label background is opaque box colour and carries dark text pixels.
        assert_eq!(*surface.get_pixel(10, 30), GREEN);
        let text_pixels = (30..50)
            .flat_map(|y| (10..10 + item.label_rect.width).map(move |x| (x, y as u32)))
            .filter(|&(x, y)| *surface.get_pixel(x, y) == Rgba([0, 0, 0, 255]))
            .count();
        assert!(text_pixels > 0);
    }

    #[test]
    fn second_render_leaves_no_trace_of_first() {
        let mut renderer = OverlayRenderer::default();
        renderer.render(&batch(&[("cat", 0.5, (400.0, 300.0, 120.0, 90.0))], 640, 480), 640, 480);
        renderer.render(&batch(&[("dog", 0.7, (20.0, 100.0, 50.0, 50.0))], 640, 480), 640, 480);

        let items = renderer.items().to_vec();
        assert_eq!(items.len(), 1);
        for (x, y, pixel) in renderer.surface().enumerate_pixels() {
            if !covered(&items, x as i32, y as i32) {
                assert_eq!(*pixel, TRANSPARENT, "artifact at ({x}, {y})");
            }
        }
    }

    #[test]
    fn empty_batch_clears_everything() {
        let mut renderer = OverlayRenderer::default();
        renderer.render(&batch(&[("cat", 0.5, (40.0, 40.0, 20.0, 20.0))], 100, 100), 100, 100);
        renderer.render(&DetectionBatch::empty(), 100, 100);
        assert!(renderer.items().is_empty());
        assert!(renderer.surface().pixels().all(|p| *p == TRANSPARENT));
    }

    #[test]
    fn label_clamps_at_top_edge() {
        let mut renderer = OverlayRenderer::default();
        renderer.render(&batch(&[("person", 0.9, (10.0, 5.0, 50.0, 50.0))], 640, 480), 640, 480);
        let label = renderer.items()[0].label_rect;
        assert_eq!(label.y, 0);
        assert_eq!(label.height, LABEL_HEIGHT);
        assert_eq!(*renderer.surface().get_pixel(10, 0), GREEN);
    }

    #[test]
    fn label_clamps_at_right_edge() {
        let mut renderer = OverlayRenderer::default();
        renderer.render(&batch(&[("person", 0.9, (190.0, 100.0, 10.0, 10.0))], 200, 200), 200, 200);
        let label = renderer.items()[0].label_rect;
        assert!(label.right() <= 200);
        assert!(label.x >= 0);
    }

    #[test]
    fn label_wider_than_surface_is_truncated() {
        let mut renderer = OverlayRenderer::default();
        renderer.render(&batch(&[("refrigerator", 0.9, (5.0, 30.0, 10.0, 10.0))], 40, 40), 40, 40);
        let label = renderer.items()[0].label_rect;
        assert_eq!((label.x, label.width), (0, 40));
    }

    #[test]
    fn batch_from_other_resolution_is_rescaled() {
        let mut renderer = OverlayRenderer::default();
        renderer.render(&batch(&[("car", 0.8, (10.0, 40.0, 30.0, 20.0))], 320, 240), 640, 480);
        assert_eq!(
            renderer.items()[0].box_rect,
            PixelRect {
                x: 20,
                y: 80,
                width: 60,
                height: 40
            }
        );
    }

    #[test]
    fn zero_sized_target_draws_nothing() {
        let mut renderer = OverlayRenderer::default();
        renderer.render(&batch(&[("car", 0.8, (1.0, 1.0, 3.0, 3.0))], 10, 10), 0, 0);
        assert!(renderer.items().is_empty());
        assert_eq!(renderer.renders(), 1);
    }
}
