// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::passthrough::AdminApiError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<&'static str>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl From<AdminApiError> for ApiError {
    fn from(e: AdminApiError) -> Self {
        match e {
            AdminApiError::Unavailable(_) => {
                ApiError::service_unavailable("Admin API is temporarily unavailable")
                    .with_code("upstream_unavailable")
            }
            AdminApiError::Credential(_) => {
                ApiError::internal("Failed to obtain admin API credential")
                    .with_code("credential_failed")
            }
            AdminApiError::Upstream(status) => {
                ApiError::internal(format!("Failed to fetch users: admin API returned HTTP {status}"))
                    .with_code("upstream_error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code.map(str::to_string),
        });
        (self.status, body).into_response()
    }
}
