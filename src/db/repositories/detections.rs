use crate::db::models::{DetectionEvent, HistoryFilter, HistoryPage, NewDetectionEvent};
use crate::db::repositories::ResultStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::{QueryAs, QueryScalar};
use sqlx::{PgPool, Postgres};
use std::sync::Arc;
use tracing::error;

/// Typed bind value for dynamically built filters
enum QueryArg {
    Timestamp(DateTime<Utc>),
    Text(String),
}

/// Detection results repository backed by PostgreSQL
#[derive(Clone)]
pub struct DetectionsRepository {
    pool: Arc<PgPool>,
}

impl DetectionsRepository {
    /// Create a new detections repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Build the WHERE clause for a filter, returning the next free parameter index
    fn where_clause(filter: &HistoryFilter) -> (String, Vec<QueryArg>, usize) {
        let mut sql = String::from(" WHERE 1=1");
        let mut args = Vec::new();
        let mut param_index = 1;

        if let Some(start_time) = filter.start_time {
            sql.push_str(&format!(" AND timestamp >= ${}", param_index));
            args.push(QueryArg::Timestamp(start_time));
            param_index += 1;
        }

        if let Some(end_time) = filter.end_time {
            sql.push_str(&format!(" AND timestamp <= ${}", param_index));
            args.push(QueryArg::Timestamp(end_time));
            param_index += 1;
        }

        if let Some(search) = &filter.search {
            sql.push_str(&format!(
                " AND output_image_path LIKE ${} ESCAPE '\\'",
                param_index
            ));
            args.push(QueryArg::Text(format!("%{}%", escape_like(search))));
            param_index += 1;
        }

        (sql, args, param_index)
    }
}

/// Escape LIKE wildcards so the search term matches literally
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn bind_as<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    args: &'q [QueryArg],
) -> QueryAs<'q, Postgres, O, PgArguments> {
    for arg in args {
        query = match arg {
            QueryArg::Timestamp(ts) => query.bind(ts),
            QueryArg::Text(text) => query.bind(text),
        };
    }
    query
}

fn bind_scalar<'q, O>(
    mut query: QueryScalar<'q, Postgres, O, PgArguments>,
    args: &'q [QueryArg],
) -> QueryScalar<'q, Postgres, O, PgArguments> {
    for arg in args {
        query = match arg {
            QueryArg::Timestamp(ts) => query.bind(ts),
            QueryArg::Text(text) => query.bind(text),
        };
    }
    query
}

#[async_trait]
impl ResultStore for DetectionsRepository {
    async fn insert(&self, event: NewDetectionEvent) -> Result<DetectionEvent> {
        let person_count = event.person_count_i32()?;
        let timestamp = event.timestamp.unwrap_or_else(Utc::now);

        let result = sqlx::query_as::<_, DetectionEvent>(
            r#"
            INSERT INTO detection_results (timestamp, person_count, output_image_path)
            VALUES ($1, $2, $3)
            RETURNING id, timestamp, person_count, output_image_path
            "#,
        )
        .bind(timestamp)
        .bind(person_count)
        .bind(&event.output_image_path)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create detection result: {}", e)))?;

        Ok(result)
    }

    async fn query(&self, filter: &HistoryFilter) -> Result<HistoryPage> {
        let (where_sql, args, param_index) = Self::where_clause(filter);

        let count_sql = format!("SELECT COUNT(*) FROM detection_results{}", where_sql);
        let total = bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql), &args)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count detection results: {}", e)))?;

        let select_sql = format!(
            "SELECT id, timestamp, person_count, output_image_path FROM detection_results{} \
             ORDER BY id ASC LIMIT ${} OFFSET ${}",
            where_sql,
            param_index,
            param_index + 1
        );
        let records = bind_as(sqlx::query_as::<_, DetectionEvent>(&select_sql), &args)
            .bind(i64::from(filter.limit))
            .bind(i64::from(filter.skip))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to search detection results: {}", e)))?;

        Ok(HistoryPage { records, total })
    }

    async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&*self.pool).await {
            Ok(_) => true,
            Err(e) => {
                error!("Database health check failed: {}", e);
                false
            }
        }
    }
}
