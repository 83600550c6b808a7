//! エラー型定義 (ga-api)

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// ga-api のエラー型
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// 同期処理の致命的エラー
    #[error("{0}")]
    Sync(ga_core::Error),

    #[error("{0}")]
    Core(#[from] ga_core::Error),
}

/// Error body: `{"detail": "..."}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ApiError {
    /// Query validation failures become 400 with the bare message
    pub fn from_query(err: ga_core::Error) -> Self {
        match err {
            ga_core::Error::InvalidQuery(msg) => Self::BadRequest(msg),
            other => Self::Core(other),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Core(ga_core::Error::InvalidQuery(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Sync(_) | Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = ErrorResponse {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result 型エイリアス
pub type Result<T> = std::result::Result<T, ApiError>;
