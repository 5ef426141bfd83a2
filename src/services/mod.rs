pub mod annotator;
pub mod pipeline;

pub use annotator::{font_scale, AnnotationSummary, Annotator};
pub use pipeline::{DetectionPipeline, UploadOutcome};
