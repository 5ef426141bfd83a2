pub mod detection_models;

pub use detection_models::{
    DetectionEvent, HistoryFilter, HistoryPage, HistoryParams, NewDetectionEvent,
};
