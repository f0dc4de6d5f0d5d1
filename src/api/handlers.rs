use crate::api::responses::{
    ErrorCode, ErrorResponse, LogsSuccessResponse, OccupancySuccessResponse,
    StatsSuccessResponse,
};
use crate::state::DashboardState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

/// Success body or an error with its status code.
pub enum ApiResponse<T> {
    Success(T),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl<T: serde::Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_logs(State(state): State<Arc<RwLock<DashboardState>>>) -> impl IntoResponse {
    build_logs_response(state, SystemTime::now())
}

pub async fn get_stats(State(state): State<Arc<RwLock<DashboardState>>>) -> impl IntoResponse {
    build_stats_response(state, SystemTime::now())
}

pub async fn get_occupancy(
    State(state): State<Arc<RwLock<DashboardState>>>,
) -> impl IntoResponse {
    build_occupancy_response(state, SystemTime::now())
}

fn build_logs_response(
    state: Arc<RwLock<DashboardState>>,
    now: SystemTime,
) -> ApiResponse<LogsSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => return internal_error("/api/logs", "state lock poisoned while reading logs"),
    };
    let logs = guard.logs().cloned().collect();
    drop(guard);

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success(LogsSuccessResponse { logs, timestamp }),
        Err(_) => internal_error("/api/logs", "timestamp formatting failure"),
    }
}

fn build_stats_response(
    state: Arc<RwLock<DashboardState>>,
    now: SystemTime,
) -> ApiResponse<StatsSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => return internal_error("/api/stats", "state lock poisoned while reading stats"),
    };
    let stats = guard.stats().clone();
    drop(guard);

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success(StatsSuccessResponse {
            total: stats.total(),
            stats,
            timestamp,
        }),
        Err(_) => internal_error("/api/stats", "timestamp formatting failure"),
    }
}

fn build_occupancy_response(
    state: Arc<RwLock<DashboardState>>,
    now: SystemTime,
) -> ApiResponse<OccupancySuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/occupancy", "state lock poisoned while reading occupancy");
        }
    };
    let occupancy = guard.occupancy().copied();
    drop(guard);

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => return internal_error("/api/occupancy", "timestamp formatting failure"),
    };

    match occupancy {
        Some(snapshot) => ApiResponse::Success(OccupancySuccessResponse {
            sitting: snapshot.sitting,
            progress: snapshot.progress,
            alert_running: snapshot.alert_running,
            timestamp,
        }),
        None => ApiResponse::Error {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: ErrorResponse {
                error_code: ErrorCode::NoData,
                error_message: "Occupancy state not available".to_string(),
                timestamp,
            },
        },
    }
}

fn internal_error<T>(route: &str, message: &str) -> ApiResponse<T> {
    error!(route = route, message = message, "Internal error while handling request");
    let formatted = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        "1970-01-01T00:00:00Z".to_string()
    });
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    }
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}
