//! Object detection adapter.
//!
//! The model itself sits behind [`ObjectDetector`]; [`PersonDetector`] loads
//! images from disk and applies the person-class filter on top of whatever
//! the model returns.

use crate::error::{Error, Result};
use image::DynamicImage;
use log::debug;
use std::path::Path;
use std::sync::Arc;

pub mod yolo;

pub use yolo::YoloDetector;

/// Label the person-class filter matches against
pub const PERSON_LABEL: &str = "person";

/// COCO class names, indexed by YOLO class id
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Labeled axis-aligned detection box in source image pixels
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub label: String,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(label: impl Into<String>, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            x1,
            y1,
            x2,
            y2,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let l = self.x1.max(other.x1);
        let r = self.x2.min(other.x2);
        let t = self.y1.max(other.y1);
        let b = self.y2.min(other.y2);
        (r - l).max(0.0) * (b - t).max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let union = self.area() + other.area() - self.intersection_area(other);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / union
    }

    pub fn is_person(&self) -> bool {
        self.label == PERSON_LABEL
    }
}

/// Inference backend.
///
/// Implementations are shared read-only across concurrent requests. A backend
/// that cannot run concurrently must serialize internally.
pub trait ObjectDetector: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run the model on a decoded image and return detections of every class.
    fn infer(&self, image: &DynamicImage) -> Result<Vec<BoundingBox>>;
}

/// Outcome of running detection on one image
#[derive(Debug, Clone)]
pub struct Detection {
    pub person_count: usize,
    /// All detections, every class, in model output order
    pub boxes: Vec<BoundingBox>,
}

/// Number of boxes labeled as a person
pub fn count_people(boxes: &[BoundingBox]) -> usize {
    boxes.iter().filter(|b| b.is_person()).count()
}

/// Decode an image from disk
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| {
        Error::ImageLoad(format!(
            "Could not load image from path: {}: {}",
            path.display(),
            e
        ))
    })
}

/// Counts people in images using an injected detection backend
#[derive(Clone)]
pub struct PersonDetector {
    backend: Arc<dyn ObjectDetector>,
}

impl PersonDetector {
    pub fn new(backend: Arc<dyn ObjectDetector>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Detect people in the image stored at `image_path`
    pub fn detect(&self, image_path: &Path) -> Result<Detection> {
        let image = load_image(image_path)?;
        self.detect_image(&image)
    }

    pub fn detect_image(&self, image: &DynamicImage) -> Result<Detection> {
        let boxes = self.backend.infer(image)?;
        let person_count = count_people(&boxes);
        debug!(
            "{} returned {} detections, {} people",
            self.backend.name(),
            boxes.len(),
            person_count
        );
        Ok(Detection {
            person_count,
            boxes,
        })
    }
}
