use crate::backend::ModelInputShape;
use crate::error::DetectorError;
use ndarray::ArrayViewD;
use serde::Serialize;

/// Width of one row of the post-NMS output: `[batch, class, score, x1, y1, x2, y2]`.
pub const RAW_ROW_WIDTH: usize = 7;

/// One row of the model's raw output, coordinates in model-input space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub batch_index: f32,
    pub class_id: f32,
    pub score: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<[f32; RAW_ROW_WIDTH]> for RawDetection {
    fn from([batch_index, class_id, score, x1, y1, x2, y2]: [f32; RAW_ROW_WIDTH]) -> Self {
        Self {
            batch_index,
            class_id,
            score,
            x1,
            y1,
            x2,
            y2,
        }
    }
}

impl RawDetection {
    /// Split a `[N, 7]` (or `[1, N, 7]`) output tensor into rows, keeping order.
    pub fn rows(output: &ArrayViewD<'_, f32>) -> Result<Vec<RawDetection>, DetectorError> {
        if output.is_empty() {
            return Ok(Vec::new());
        }

        let shape = output.shape();
        let well_formed = match shape {
            [_, RAW_ROW_WIDTH] => true,
            [1, _, RAW_ROW_WIDTH] => true,
            _ => false,
        };
        if !well_formed {
            return Err(DetectorError::InvalidOutputShape {
                shape: shape.to_vec(),
            });
        }

        let count = output.len() / RAW_ROW_WIDTH;
        let table = output
            .to_shape((count, RAW_ROW_WIDTH))
            .map_err(|_| DetectorError::InvalidOutputShape {
                shape: shape.to_vec(),
            })?;

        Ok(table
            .rows()
            .into_iter()
            .map(|row| RawDetection::from(std::array::from_fn(|i| row[i])))
            .collect())
    }
}

/// Classes of the body/head/hand export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionClass {
    Body,
    Head,
    Hand,
}

impl DetectionClass {
    pub fn from_id(class_id: i32) -> Option<Self> {
        match class_id {
            0 => Some(Self::Body),
            1 => Some(Self::Head),
            2 => Some(Self::Hand),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Head => "head",
            Self::Hand => "hand",
        }
    }
}

/// Box in original-image pixels with the class id appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
    pub class_id: i32,
}

impl BoundingBox {
    pub fn class(&self) -> Option<DetectionClass> {
        DetectionClass::from_id(self.class_id)
    }
}

/// Caller-facing view of one surviving detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
    pub class_id: i32,
    pub score: f32,
}

/// Parallel boxes/scores in the order rows came out of the model.
///
/// Both vectors only grow together, so their lengths always match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSet {
    boxes: Vec<BoundingBox>,
    scores: Vec<f32>,
}

impl DetectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            boxes: Vec::with_capacity(capacity),
            scores: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, bbox: BoundingBox, score: f32) {
        self.boxes.push(bbox);
        self.scores.push(score);
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Detection> + '_ {
        self.boxes
            .iter()
            .zip(&self.scores)
            .map(|(bbox, &score)| Detection {
                x_min: bbox.x_min,
                y_min: bbox.y_min,
                x_max: bbox.x_max,
                y_max: bbox.y_max,
                class_id: bbox.class_id,
                score,
            })
    }

    pub fn into_parts(self) -> (Vec<BoundingBox>, Vec<f32>) {
        (self.boxes, self.scores)
    }
}

pub struct PostProcessor {
    class_score_th: f32,
    input_shape: ModelInputShape,
}

impl PostProcessor {
    pub fn new(class_score_th: f32, input_shape: ModelInputShape) -> Self {
        Self {
            class_score_th,
            input_shape,
        }
    }

    pub fn input_shape(&self) -> ModelInputShape {
        self.input_shape
    }

    pub fn class_score_th(&self) -> f32 {
        self.class_score_th
    }

    /// Parse the raw output tensor and map surviving rows to image space.
    pub fn parse_detections(
        &self,
        output: &ArrayViewD<'_, f32>,
        image_width: u32,
        image_height: u32,
    ) -> Result<DetectionSet, DetectorError> {
        let rows = RawDetection::rows(output)?;
        Ok(self.process(&rows, image_width, image_height))
    }

    /// Threshold and rescale rows, preserving their order.
    pub fn process(&self, rows: &[RawDetection], image_width: u32, image_height: u32) -> DetectionSet {
        let mut detections = DetectionSet::with_capacity(rows.len());

        for row in rows {
            // Strict: a score equal to the threshold is dropped
            if !(row.score > self.class_score_th) {
                continue;
            }

            let (x_min, x_max) = ordered(
                rescale(row.x1, self.input_shape.width, image_width),
                rescale(row.x2, self.input_shape.width, image_width),
            );
            let (y_min, y_max) = ordered(
                rescale(row.y1, self.input_shape.height, image_height),
                rescale(row.y2, self.input_shape.height, image_height),
            );

            detections.push(
                BoundingBox {
                    x_min,
                    y_min,
                    x_max,
                    y_max,
                    class_id: row.class_id as i32,
                },
                row.score,
            );
        }

        tracing::trace!(
            rows = rows.len(),
            kept = detections.len(),
            threshold = self.class_score_th,
            "Postprocessed raw detections"
        );

        detections
    }
}

/// Clamp to `[0, model_extent]`, scale to the image and truncate toward zero.
#[inline]
fn rescale(value: f32, model_extent: u32, image_extent: u32) -> u32 {
    let model_extent = model_extent as f32;
    let scaled = value.clamp(0.0, model_extent) * image_extent as f32 / model_extent;
    (scaled as u32).min(image_extent)
}

#[inline]
fn ordered(a: u32, b: u32) -> (u32, u32) {
    if a <= b { (a, b) } else { (b, a) }
}
