use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use log::info;
use tract_onnx::prelude::*;
use tract_onnx::prelude::tract_ndarray::{ArrayView2, Axis, Ix2};

use crate::config::DetectorConfig;
use crate::detector::{BoundingBox, ObjectDetector};
use crate::error::{Error, Result};

const CXYWH_OFFSET: usize = 4;
const PAD_VALUE: f32 = 144.0 / 255.0;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// YOLOv8-family ONNX detector run through tract.
///
/// Expects the standard ultralytics export: input `[1, 3, S, S]`, output
/// `[1, 4 + nc, anchors]` with rows `cx, cy, w, h` followed by class scores.
pub struct YoloDetector {
    model: Plan,
    input_size: u32,
    conf_threshold: f32,
    iou_threshold: f32,
    class_names: Vec<String>,
}

impl YoloDetector {
    pub fn load(config: &DetectorConfig) -> Result<Self> {
        let model = Self::build_plan(&config.model_path, config.input_size)?;
        info!(
            "Loaded detection model {} ({}x{} input, {} classes)",
            config.model_path.display(),
            config.input_size,
            config.input_size,
            config.class_names.len()
        );

        Ok(Self {
            model,
            input_size: config.input_size,
            conf_threshold: config.conf_threshold,
            iou_threshold: config.iou_threshold,
            class_names: config.class_names.clone(),
        })
    }

    fn build_plan(model_path: &Path, size: u32) -> Result<Plan> {
        let fail = |stage: &str, e: TractError| {
            Error::Detection(format!(
                "failed to {} model {}: {}",
                stage,
                model_path.display(),
                e
            ))
        };

        tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| fail("load", e))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, size as usize, size as usize),
                ),
            )
            .map_err(|e| fail("set input of", e))?
            .into_optimized()
            .map_err(|e| fail("optimize", e))?
            .into_runnable()
            .map_err(|e| fail("prepare", e))
    }

    /// Letterbox into the model input: keep aspect ratio, pad bottom/right.
    fn preprocess(&self, image: &DynamicImage) -> (Tensor, f32) {
        let size = self.input_size;
        let (w0, h0) = image.dimensions();
        let ratio = (size as f32 / w0 as f32).min(size as f32 / h0 as f32);
        let w_new = ((w0 as f32 * ratio).round() as u32).clamp(1, size);
        let h_new = ((h0 as f32 * ratio).round() as u32).clamp(1, size);
        let resized = image.resize_exact(w_new, h_new, FilterType::Triangle).to_rgb8();

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, channel, y, x)| {
                let (x, y) = (x as u32, y as u32);
                if x < w_new && y < h_new {
                    resized.get_pixel(x, y)[channel] as f32 / 255.0
                } else {
                    PAD_VALUE
                }
            },
        );

        (input.into_tensor(), ratio)
    }
}

impl ObjectDetector for YoloDetector {
    fn name(&self) -> &'static str {
        "yolo-tract"
    }

    fn infer(&self, image: &DynamicImage) -> Result<Vec<BoundingBox>> {
        let (input, ratio) = self.preprocess(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| Error::Detection(format!("inference failed: {}", e)))?;

        let output = outputs
            .first()
            .ok_or_else(|| Error::Detection("model produced no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| Error::Detection(format!("model output was not f32: {}", e)))?;
        if view.ndim() != 3 || view.shape()[0] == 0 {
            return Err(Error::Detection(format!(
                "unexpected output shape {:?}",
                view.shape()
            )));
        }
        let preds = view
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .map_err(|e| Error::Detection(format!("unexpected output shape: {}", e)))?;

        let (width, height) = image.dimensions();
        Ok(decode_predictions(
            preds,
            ratio,
            (width as f32, height as f32),
            self.conf_threshold,
            self.iou_threshold,
            &self.class_names,
        ))
    }
}

/// Turn a `[4 + nc, anchors]` prediction matrix into boxes in source pixels
pub fn decode_predictions(
    preds: ArrayView2<f32>,
    ratio: f32,
    (width, height): (f32, f32),
    conf_threshold: f32,
    iou_threshold: f32,
    class_names: &[String],
) -> Vec<BoundingBox> {
    if preds.nrows() <= CXYWH_OFFSET || ratio <= 0.0 {
        return Vec::new();
    }

    let mut boxes = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        let best = pred
            .iter()
            .skip(CXYWH_OFFSET)
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (id, &score)| match best {
                Some((_, s)) if s >= score => best,
                _ => Some((id, score)),
            });
        let Some((class_id, confidence)) = best else {
            continue;
        };
        if confidence < conf_threshold {
            continue;
        }

        let cx = pred[0] / ratio;
        let cy = pred[1] / ratio;
        let w = pred[2] / ratio;
        let h = pred[3] / ratio;
        let label = class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id));

        boxes.push(BoundingBox::new(
            label,
            confidence,
            (cx - w / 2.0).clamp(0.0, width),
            (cy - h / 2.0).clamp(0.0, height),
            (cx + w / 2.0).clamp(0.0, width),
            (cy + h / 2.0).clamp(0.0, height),
        ));
    }

    non_max_suppression(&mut boxes, iou_threshold);
    boxes
}

/// Greedy per-class NMS; keeps the highest-confidence box of each overlap group
pub fn non_max_suppression(boxes: &mut Vec<BoundingBox>, iou_threshold: f32) {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..boxes.len() {
        let drop = (0..kept).any(|prev| {
            boxes[prev].label == boxes[index].label
                && boxes[prev].iou(&boxes[index]) > iou_threshold
        });
        if !drop {
            boxes.swap(kept, index);
            kept += 1;
        }
    }
    boxes.truncate(kept);
}
