/// Axis-aligned box in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Rescale into a surface whose size differs from the source frame.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }
}

/// One recognized object. Immutable once produced.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    label: String,
    confidence: f32,
    bbox: BoundingBox,
}

impl Detection {
    /// Confidence is clamped into [0, 1]; non-finite scores become 0.
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// `round(confidence * 100)`, halves rounding up.
    pub fn percent(&self) -> u32 {
        (self.confidence * 100.0).round() as u32
    }

    /// Label text drawn on the overlay and shown in prediction lists.
    pub fn display_label(&self) -> String {
        format!("{} ({}%)", self.label, self.percent())
    }
}

/// How the inference call behind a batch ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BatchOutcome {
    #[default]
    Detected,
    /// The detector failed; the batch is empty by construction.
    Failed,
}

/// All detections from one inference call, tagged with the frame they apply to.
///
/// Boxes are only meaningful against `frame_width` x `frame_height`. Drawing on
/// any other surface size requires `scale_to`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionBatch {
    detections: Vec<Detection>,
    frame_width: u32,
    frame_height: u32,
    sequence: u64,
    outcome: BatchOutcome,
}

impl DetectionBatch {
    pub fn new(detections: Vec<Detection>, frame_width: u32, frame_height: u32, sequence: u64) -> Self {
        Self {
            detections,
            frame_width,
            frame_height,
            sequence,
            outcome: BatchOutcome::Detected,
        }
    }

    /// Placeholder for a failed inference call.
    pub fn failed(frame_width: u32, frame_height: u32, sequence: u64) -> Self {
        Self {
            outcome: BatchOutcome::Failed,
            ..Self::new(Vec::new(), frame_width, frame_height, sequence)
        }
    }

    /// Initial store content before anything is published.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn frame_width(&self) -> u32 {
        self.frame_width
    }

    pub fn frame_height(&self) -> u32 {
        self.frame_height
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn outcome(&self) -> BatchOutcome {
        self.outcome
    }

    /// Scale factors mapping this batch's coordinates onto a `width` x `height` surface.
    ///
    /// Returns `(1.0, 1.0)` when the sizes match or the batch has no recorded size.
    pub fn scale_to(&self, width: u32, height: u32) -> (f32, f32) {
        if self.frame_width == 0 || self.frame_height == 0 {
            return (1.0, 1.0);
        }
        (
            width as f32 / self.frame_width as f32,
            height as f32 / self.frame_height as f32,
        )
    }
}
