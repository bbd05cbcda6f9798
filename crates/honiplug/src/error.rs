//! HTTP API Errors
//!
//! Every error an endpoint can return is a constant in this table. Clients
//! match on the stable `id`, the `code` is for humans reading logs.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: &'static str,
    pub code: &'static str,
    pub id: &'static str,
}

impl ApiError {
    pub const CREDENTIAL_REQUIRED: ApiError = ApiError {
        status: StatusCode::UNAUTHORIZED,
        message: "Credential required.",
        code: "CREDENTIAL_REQUIRED",
        id: "1384574d-a912-4b81-8601-c7b1c4085df1",
    };

    pub const AUTHENTICATION_FAILED: ApiError = ApiError {
        status: StatusCode::UNAUTHORIZED,
        message: "Authentication failed. Please ensure your token is correct.",
        code: "AUTHENTICATION_FAILED",
        id: "b0a7f5f8-dc2f-4171-b91f-de88ad238e14",
    };

    pub const ROLE_REQUIRED: ApiError = ApiError {
        status: StatusCode::FORBIDDEN,
        message: "You are not assigned to a required role.",
        code: "ROLE_PERMISSION_DENIED",
        id: "c3d38592-54c0-429d-be96-5636b0431a61",
    };

    pub const RATE_LIMIT_EXCEEDED: ApiError = ApiError {
        status: StatusCode::TOO_MANY_REQUESTS,
        message: "Rate limit exceeded. Please try again later.",
        code: "RATE_LIMIT_EXCEEDED",
        id: "d5826d14-3982-4d2e-8011-b9e9f02499ef",
    };

    pub const UNSUPPORTED_SERVER_OPERATION: ApiError = ApiError {
        status: StatusCode::BAD_REQUEST,
        message: "The operation you requested is not supported on this server.",
        code: "UNSUPPORTED_SERVER_OPERATION",
        id: "113e048e-badf-4c9c-98d8-cce1b9574cd4",
    };

    pub const INTERNAL_ERROR: ApiError = ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "Internal error occurred. Please contact us if the error persists.",
        code: "INTERNAL_ERROR",
        id: "5d37dbcb-891e-41ca-a3d6-e690c97775ac",
    };
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "message": self.message,
                "code": self.code,
                "id": self.id,
            }
        });
        (self.status, Json(body)).into_response()
    }
}
