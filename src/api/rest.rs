use crate::config::{ApiConfig, StorageConfig};
use crate::error::Error;
use crate::services::DetectionPipeline;
use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{info, warn};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

pub mod history_controller;
pub mod upload_controller;

#[cfg(test)]
mod tests;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DetectionPipeline>,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
    pub status: u16,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::BadUpload(_) | Error::ImageLoad(_) | Error::InvalidFilter(_) => ApiError {
                message: err.to_string(),
                status: StatusCode::BAD_REQUEST.as_u16(),
            },
            _ => ApiError {
                message: err.to_string(),
                status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            },
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(err) = err.downcast_ref::<Error>() {
            return (*err).clone().into();
        }

        ApiError {
            message: err.to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }
}

/// Implement IntoResponse for ApiError
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!("Request failed: {}", self.message);
        }
        let body = Json(self);
        (status, body).into_response()
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}

/// Build the API router
pub fn create_router(state: AppState, api: &ApiConfig, storage: &StorageConfig) -> Router {
    Router::new()
        .route("/upload/", post(upload_controller::upload_image))
        .route("/upload", post(upload_controller::upload_image))
        .route("/history/", get(history_controller::get_history))
        .route("/history", get(history_controller::get_history))
        .route("/health", get(health))
        .with_state(state)
        // Annotated images
        .nest_service(&storage.output_route, ServeDir::new(&storage.output_dir))
        .layer(DefaultBodyLimit::max(api.max_upload_mb * 1024 * 1024))
        .layer(cors_layer(&api.cors_origins))
}

pub struct RestApi {
    api: ApiConfig,
    storage: StorageConfig,
    pipeline: Arc<DetectionPipeline>,
}

impl RestApi {
    pub fn new(api: &ApiConfig, storage: &StorageConfig, pipeline: Arc<DetectionPipeline>) -> Self {
        Self {
            api: api.clone(),
            storage: storage.clone(),
            pipeline,
        }
    }

    pub async fn run(&self) -> Result<()> {
        self.storage.validate()?;
        let state = AppState {
            pipeline: Arc::clone(&self.pipeline),
        };
        let app = create_router(state, &self.api, &self.storage);

        let addr = self.api.address.clone() + ":" + &self.api.port.to_string();
        let addr: SocketAddr = addr.parse()?;

        info!("API server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;

        axum::Server::from_tcp(listener.into_std()?)?
            .serve(app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down...");
            })
            .await?;

        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    store: bool,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if state.pipeline.store_healthy().await {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                store: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded",
                store: false,
            }),
        )
    }
}
