use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::session::allocator::{STATE_CREATED, STATE_STORE_UNAVAILABLE};
use crate::session::log::LogError;
use crate::session::AllocationError;
use crate::session::SessionCode;
use crate::store::StoreError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}

/// Envelope returned by session creation: `state` 0 on success with the code in `data`,
/// negative on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEnvelope {
    pub state: i32,
    pub msg: String,
    pub data: Option<String>,
}

impl SessionEnvelope {
    pub fn created(code: &SessionCode) -> Self {
        Self {
            state: STATE_CREATED,
            msg: "Session created successfully.".to_string(),
            data: Some(code.to_string()),
        }
    }
}

impl From<&AllocationError> for SessionEnvelope {
    fn from(err: &AllocationError) -> Self {
        let msg = match err {
            AllocationError::Store(_) => "Session store unavailable.".to_string(),
            other => other.to_string(),
        };
        Self {
            state: err.state_code(),
            msg,
            data: None,
        }
    }
}

impl IntoResponse for SessionEnvelope {
    fn into_response(self) -> Response {
        // Capacity and collision failures are ordinary outcomes reported through `state`.
        let status = if self.state == STATE_STORE_UNAVAILABLE {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub is_operational: bool,
}

impl AppError {
    pub fn bad_request(code: &str, message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: code.to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND".to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn too_many_requests(message: &str) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            code: "RATE_LIMITED".to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.to_string(),
            is_operational: false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let exposed_message = if self.is_operational {
            self.message.clone()
        } else {
            "Internal server error".to_string()
        };

        if self.is_operational {
            tracing::warn!(status = %self.status, code = %self.code, error = %self.message, "API error");
        } else {
            tracing::error!(status = %self.status, code = %self.code, error = %self.message, "Internal API error");
        }

        (
            self.status,
            Json(ErrorBody {
                success: false,
                code: self.code,
                message: exposed_message,
                trace_id: None,
            }),
        )
            .into_response()
    }
}

// StoreError 转换映射：
// - Validation -> 400（调用方输入问题，可安全暴露消息）
// - NotFound -> 404
// - 其他 -> 500（is_operational=false，IntoResponse 中替换为通用消息）
impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match &value {
            StoreError::Validation(msg) => AppError::bad_request("VALIDATION_ERROR", msg),
            StoreError::NotFound { entity, .. } => AppError::not_found(&format!("{entity} not found")),
            _ => AppError::internal(&value.to_string()),
        }
    }
}

impl From<LogError> for AppError {
    fn from(value: LogError) -> Self {
        match value {
            LogError::SessionNotFound(_) => AppError::not_found("Session not found"),
            LogError::Invalid(msg) => AppError::bad_request("VALIDATION_ERROR", &msg),
            LogError::Dice(e) => AppError::bad_request("INVALID_DICE", &e.to_string()),
            LogError::Store(e) => AppError::from(e),
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}
