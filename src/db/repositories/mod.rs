use crate::db::models::{DetectionEvent, HistoryFilter, HistoryPage, NewDetectionEvent};
use crate::error::Result;
use async_trait::async_trait;

pub mod detections;
pub mod memory;

pub use detections::DetectionsRepository;
pub use memory::InMemoryDetectionStore;

/// Persistence boundary for detection events.
///
/// Append-only: events are inserted once and never updated or deleted.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store an event, assigning its id and (if absent) its timestamp
    async fn insert(&self, event: NewDetectionEvent) -> Result<DetectionEvent>;

    /// Matching events in insertion order, paginated, with the total match count
    async fn query(&self, filter: &HistoryFilter) -> Result<HistoryPage>;

    /// Whether the backing engine is reachable
    async fn health_check(&self) -> bool {
        true
    }
}
