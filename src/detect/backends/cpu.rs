use anyhow::Result;

use crate::detect::backend::Detector;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

const SAMPLE_STEP: u32 = 4;
const LUMA_DELTA: u8 = 24;
const MIN_CHANGED_SAMPLES: usize = 8;

/// CPU backend for motion detection.
///
/// Compares subsampled luma against the previous frame and reports the bounding
/// box of the changed region as a single `motion` detection. Confidence is the
/// share of samples inside that box which changed.
#[derive(Default)]
pub struct CpuBackend {
    previous: Option<LumaGrid>,
}

struct LumaGrid {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl LumaGrid {
    fn from_frame(frame: &Frame) -> Self {
        let mut samples = Vec::new();
        for y in (0..frame.height).step_by(SAMPLE_STEP as usize) {
            for x in (0..frame.width).step_by(SAMPLE_STEP as usize) {
                let [r, g, b] = frame.rgb_at(x, y).unwrap_or_default();
                let luma = (r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000;
                samples.push(luma as u8);
            }
        }
        Self {
            width: frame.width,
            height: frame.height,
            samples,
        }
    }

    fn columns(&self) -> u32 {
        self.width.div_ceil(SAMPLE_STEP)
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Detector for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let current = LumaGrid::from_frame(frame);
        let previous = self.previous.replace(current);
        let (Some(previous), Some(current)) = (previous, self.previous.as_ref()) else {
            return Ok(Vec::new());
        };
        if previous.width != current.width || previous.height != current.height {
            return Ok(Vec::new());
        }

        let columns = current.columns();
        let changed: Vec<(u32, u32)> = current
            .samples
            .iter()
            .zip(&previous.samples)
            .enumerate()
            .filter(|(_, (now, before))| now.abs_diff(**before) >= LUMA_DELTA)
            .map(|(idx, _)| (idx as u32 % columns, idx as u32 / columns))
            .collect();
        if changed.len() < MIN_CHANGED_SAMPLES {
            return Ok(Vec::new());
        }

        let (mut min_c, mut min_r) = (u32::MAX, u32::MAX);
        let (mut max_c, mut max_r) = (0u32, 0u32);
        for &(c, r) in &changed {
            min_c = min_c.min(c);
            min_r = min_r.min(r);
            max_c = max_c.max(c);
            max_r = max_r.max(r);
        }
        let area = ((max_c - min_c + 1) * (max_r - min_r + 1)) as f32;
        let confidence = changed.len() as f32 / area;

        let x = (min_c * SAMPLE_STEP) as f32;
        let y = (min_r * SAMPLE_STEP) as f32;
        let right = ((max_c + 1) * SAMPLE_STEP).min(frame.width) as f32;
        let bottom = ((max_r + 1) * SAMPLE_STEP).min(frame.height) as f32;

        Ok(vec![Detection::new(
            "motion",
            confidence,
            BoundingBox::new(x, y, right - x, bottom - y),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_block(seq: u64, block: Option<(u32, u32, u32, u32)>) -> Frame {
        let (w, h) = (64u32, 48u32);
        let mut pixels = vec![0u8; (w * h * 3) as usize];
        if let Some((bx, by, bw, bh)) = block {
            for y in by..by + bh {
                for x in bx..bx + bw {
                    let idx = ((y * w + x) * 3) as usize;
                    pixels[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
                }
            }
        }
        Frame::new(pixels, w, h, seq).unwrap()
    }

    #[test]
    fn cpu_backend_reports_changed_region() {
        let mut backend = CpuBackend::new();

        let first = backend.detect(&frame_with_block(1, None)).unwrap();
        assert!(first.is_empty());

        let second = backend
            .detect(&frame_with_block(2, Some((16, 8, 16, 16))))
            .unwrap();
        assert_eq!(second.len(), 1);
        let motion = &second[0];
        assert_eq!(motion.label(), "motion");
        assert_eq!(motion.bbox(), BoundingBox::new(16.0, 8.0, 16.0, 16.0));
        assert_eq!(motion.percent(), 100);

        let third = backend
            .detect(&frame_with_block(3, Some((16, 8, 16, 16))))
            .unwrap();
        assert!(third.is_empty());
    }

    #[test]
    fn cpu_backend_resets_on_resolution_change() {
        let mut backend = CpuBackend::new();
        backend.detect(&frame_with_block(1, None)).unwrap();
        let other = Frame::new(vec![255u8; 32 * 32 * 3], 32, 32, 2).unwrap();
        assert!(backend.detect(&other).unwrap().is_empty());
    }
}
