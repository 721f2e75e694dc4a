use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use serde::de::DeserializeOwned;

use crate::response::AppError;
use crate::session::SessionCode;

/// JSON request body whose rejections surface as [`AppError`] instead of axum's plain text.
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        axum::Json::<T>::from_request(req, state)
            .await
            .map(|axum::Json(value)| JsonBody(value))
            .map_err(|rejection| {
                tracing::warn!(kind = rejection_kind(&rejection), error = %rejection, "Rejected request body");
                if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    AppError {
                        status: StatusCode::PAYLOAD_TOO_LARGE,
                        code: "PAYLOAD_TOO_LARGE".to_string(),
                        message: "Request body too large".to_string(),
                        is_operational: true,
                    }
                } else {
                    AppError::bad_request("INVALID_REQUEST_BODY", "Invalid request body")
                }
            })
    }
}

fn rejection_kind(rejection: &JsonRejection) -> &'static str {
    match rejection {
        JsonRejection::JsonDataError(_) => "data",
        JsonRejection::JsonSyntaxError(_) => "syntax",
        JsonRejection::MissingJsonContentType(_) => "content_type",
        JsonRejection::BytesRejection(_) => "body",
        _ => "other",
    }
}

/// `{code}` path segment, validated against the session code charset.
pub struct SessionCodePath(pub SessionCode);

#[axum::async_trait]
impl<S> FromRequestParts<S> for SessionCodePath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::bad_request("INVALID_SESSION_CODE", "Missing session code"))?;
        // Unknown and malformed codes look the same to clients.
        SessionCode::parse(&raw)
            .map(SessionCodePath)
            .map_err(|_| AppError::not_found("Session not found"))
    }
}
