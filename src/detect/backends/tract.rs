#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use super::coco::coco_label;
use crate::detect::backend::Detector;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Tract-based backend for SSD-style ONNX detectors.
///
/// Expects a model taking a `1 x H x W x 3` u8 image and producing, in order,
/// `boxes [1, N, 4]` (normalized ymin, xmin, ymax, xmax), `classes [1, N]`
/// (COCO ids) and `scores [1, N]`. Frames of any size are resampled to the
/// model input; boxes are mapped back to frame pixels.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
    min_confidence: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    u8::datum_type(),
                    tvec!(1, height as usize, width as usize, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            min_confidence: 0.5,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.min_confidence = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let (in_w, in_h) = (self.width as usize, self.height as usize);
        let (src_w, src_h) = (frame.width as usize, frame.height as usize);
        tract_ndarray::Array4::from_shape_fn((1, in_h, in_w, 3), |(_, y, x, channel)| {
            let sx = (x * src_w / in_w).min(src_w - 1) as u32;
            let sy = (y * src_h / in_h).min(src_h - 1) as u32;
            frame.rgb_at(sx, sy).map_or(0, |rgb| rgb[channel])
        })
        .into_tensor()
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        if outputs.len() < 3 {
            return Err(anyhow!(
                "expected boxes, classes and scores outputs, model produced {}",
                outputs.len()
            ));
        }
        let boxes = outputs[0]
            .to_array_view::<f32>()
            .context("boxes output was not f32")?;
        let classes = outputs[1]
            .to_array_view::<f32>()
            .context("classes output was not f32")?;
        let scores = outputs[2]
            .to_array_view::<f32>()
            .context("scores output was not f32")?;

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let (fw, fh) = (frame.width as f32, frame.height as f32);
        let mut detections = Vec::new();
        for (idx, (&class, &score)) in classes.iter().zip(scores.iter()).enumerate() {
            if score < self.min_confidence {
                continue;
            }
            let Some(label) = coco_label(class.round() as usize) else {
                continue;
            };
            let Some(b) = boxes.get(idx * 4..idx * 4 + 4) else {
                break;
            };
            let (ymin, xmin, ymax, xmax) = (b[0], b[1], b[2], b[3]);
            let bbox = BoundingBox::new(
                xmin * fw,
                ymin * fh,
                (xmax - xmin) * fw,
                (ymax - ymin) * fh,
            );
            detections.push(Detection::new(label, score, bbox));
        }
        Ok(detections)
    }
}

impl Detector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if !frame.has_area() {
            return Err(anyhow!("cannot run inference on an empty frame"));
        }
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }
}
