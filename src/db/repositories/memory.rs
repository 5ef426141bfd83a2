use crate::db::models::{DetectionEvent, HistoryFilter, HistoryPage, NewDetectionEvent};
use crate::db::repositories::ResultStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;

/// Process-local detection store. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryDetectionStore {
    events: Mutex<Vec<DetectionEvent>>,
}

impl InMemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for InMemoryDetectionStore {
    async fn insert(&self, event: NewDetectionEvent) -> Result<DetectionEvent> {
        let person_count = event.person_count_i32()?;
        let mut events = self
            .events
            .lock()
            .map_err(|_| Error::Internal("detection store lock poisoned".to_string()))?;

        let id = events.last().map_or(1, |last| last.id + 1);
        let stored = DetectionEvent {
            id,
            timestamp: event.timestamp.unwrap_or_else(Utc::now),
            person_count,
            output_image_path: event.output_image_path,
        };
        events.push(stored.clone());
        Ok(stored)
    }

    async fn query(&self, filter: &HistoryFilter) -> Result<HistoryPage> {
        let events = self
            .events
            .lock()
            .map_err(|_| Error::Internal("detection store lock poisoned".to_string()))?;

        let matching: Vec<&DetectionEvent> = events.iter().filter(|e| filter.matches(e)).collect();
        let records = matching
            .iter()
            .skip(filter.skip as usize)
            .take(filter.limit as usize)
            .map(|e| (*e).clone())
            .collect();

        Ok(HistoryPage {
            records,
            total: matching.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    async fn seeded_store() -> InMemoryDetectionStore {
        let store = InMemoryDetectionStore::new();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        for i in 0..25u32 {
            let mut event = NewDetectionEvent::new(i % 4, format!("outputs/vis_img{:02}.jpg", i));
            event.timestamp = Some(base + Duration::hours(i as i64));
            store.insert(event).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_timestamp() {
        let store = InMemoryDetectionStore::new();
        let before = Utc::now();
        let first = store.insert(NewDetectionEvent::new(3, "outputs/vis_a.jpg")).await.unwrap();
        let second = store.insert(NewDetectionEvent::new(0, "outputs/vis_b.jpg")).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!(first.timestamp >= before);
        assert_eq!(first.person_count, 3);
    }

    #[tokio::test]
    async fn test_unfiltered_query_in_insertion_order() {
        let store = seeded_store().await;

        let page = store.query(&HistoryFilter::default()).await.unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.records.len(), 10);
        let ids: Vec<i64> = page.records.iter().map(|e| e.id).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_total_ignores_pagination() {
        let store = seeded_store().await;

        for (skip, limit) in [(0, 1), (5, 5), (20, 10), (30, 10), (0, 0)] {
            let page = store
                .query(&HistoryFilter {
                    skip,
                    limit,
                    ..HistoryFilter::default()
                })
                .await
                .unwrap();
            assert_eq!(page.total, 25);
            let expected = 25u32.saturating_sub(skip).min(limit) as usize;
            assert_eq!(page.records.len(), expected);
            if let Some(first) = page.records.first() {
                assert_eq!(first.id, skip as i64 + 1);
            }
        }
    }

    #[tokio::test]
    async fn test_time_range_is_inclusive() {
        let store = seeded_store().await;
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        let page = store
            .query(&HistoryFilter {
                start_time: Some(base + Duration::hours(2)),
                end_time: Some(base + Duration::hours(4)),
                ..HistoryFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.records[0].id, 3);
        assert_eq!(page.records[2].id, 5);
    }

    #[tokio::test]
    async fn test_inverted_range_is_empty() {
        let store = seeded_store().await;
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        let page = store
            .query(&HistoryFilter {
                start_time: Some(base + Duration::hours(10)),
                end_time: Some(base),
                ..HistoryFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(page.records.is_empty());
    }

    #[tokio::test]
    async fn test_search_matches_path_substring() {
        let store = seeded_store().await;

        let page = store
            .query(&HistoryFilter {
                search: Some("img1".to_string()),
                ..HistoryFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 10);
        assert!(page
            .records
            .iter()
            .all(|e| e.output_image_path.contains("img1")));
    }
}
