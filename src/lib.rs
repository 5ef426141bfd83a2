pub mod api;
pub mod config;
pub mod db;
pub mod detector;
pub mod error;
pub mod services;

// Re-export main components for easier use
pub use detector::{BoundingBox, ObjectDetector, PersonDetector};
pub use error::Error;
pub use services::{Annotator, DetectionPipeline};
