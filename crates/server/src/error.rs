// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::any::Any;

use axum::{Json, response::IntoResponse};
use drivezip_archive::JobError;
use drivezip_error::{ErrorExt, StackError, StatusCode};
use drivezip_remote::RemoteError;
use serde::Serialize;
use snafu::Snafu;
use strum::EnumProperty;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code:  StatusCode,
}

/// Body of a failed upload or rename, shaped like their success bodies.
#[derive(Debug, Serialize)]
pub struct PassthroughBody {
    pub success: bool,
    pub error:   String,
}

#[derive(Debug, Snafu, strum_macros::EnumProperty)]
#[snafu(visibility(pub))]
pub enum ApiError {
    #[snafu(display("Invalid argument: {reason}"))]
    #[strum(props(status_code = "invalid_argument"))]
    InvalidArgument { reason: String },

    #[snafu(display("Missing query parameter {name}"))]
    #[strum(props(status_code = "invalid_argument"))]
    MissingParameter { name: &'static str },

    #[snafu(display("Unknown profile {profile}"))]
    #[strum(props(status_code = "invalid_argument"))]
    UnknownProfile { profile: String },

    #[snafu(transparent)]
    Job { source: JobError },

    #[snafu(display("Failed to {action} file"))]
    Remote {
        action: &'static str,
        source: RemoteError,
    },
}

impl ErrorExt for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Job { source } => source.status_code(),
            Self::Remote { source, .. } if source.status_code() == StatusCode::NotFound => {
                StatusCode::NotFound
            }
            Self::Remote { .. } => StatusCode::Internal,
            _ => self
                .get_str("status_code")
                .and_then(|value| value.parse().ok())
                .unwrap_or(StatusCode::Unknown),
        }
    }

    fn as_any(&self) -> &dyn Any { self as _ }
}

impl StackError for ApiError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
        buf.push(format!("{layer}: {self}"));
        if let Some(next) = self.next() {
            next.debug_fmt(layer + 1, buf);
        }
    }

    fn next(&self) -> Option<&dyn StackError> {
        match self {
            Self::Job { source } => Some(source),
            Self::Remote { source, .. } => Some(source),
            _ => None,
        }
    }

    fn transparent(&self) -> bool { matches!(self, Self::Job { .. }) }
}

impl ApiError {
    /// Renders the error the way upload and rename report failures:
    /// `{success: false, error}`. Internal failures only name the action.
    pub fn into_passthrough_response(self) -> axum::response::Response {
        let status = self.status_code();
        let error = if status.is_public() {
            self.output_msg()
        } else {
            self.to_string()
        };
        let body = Json(PassthroughBody {
            success: false,
            error,
        });
        (status.http_status(), body).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ErrorBody {
            error: self.output_msg(),
            code:  self.status_code(),
        });
        (self.status_code().http_status(), body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Error of the upload and rename handlers.
#[derive(Debug)]
pub struct PassthroughError(pub ApiError);

impl From<ApiError> for PassthroughError {
    fn from(error: ApiError) -> Self { Self(error) }
}

impl IntoResponse for PassthroughError {
    fn into_response(self) -> axum::response::Response { self.0.into_passthrough_response() }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode as HttpStatusCode;

    use super::*;

    #[test]
    fn job_errors_keep_their_status() {
        let err = ApiError::from(JobError::TimedOut {
            deadline: Duration::from_secs(300),
        });
        assert_eq!(err.status_code().http_status(), HttpStatusCode::REQUEST_TIMEOUT);
        assert_eq!(err.output_msg(), "Download timed out after 300s");

        let err = ApiError::from(JobError::NoFiles);
        assert_eq!(err.status_code().http_status(), HttpStatusCode::NOT_FOUND);
        assert_eq!(err.output_msg(), "No files found");
    }

    #[test]
    fn invalid_arguments_are_bad_requests() {
        let err = ApiError::MissingParameter { name: "folderId" };
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);
        assert_eq!(err.output_msg(), "Missing query parameter folderId");
    }

    #[test]
    fn internal_remote_failures_hide_details() {
        let err = ApiError::Remote {
            action: "upload",
            source: RemoteError::Unavailable {
                message: "quota exceeded for project 1234".into(),
            },
        };
        assert_eq!(err.status_code(), StatusCode::Internal);
        assert_eq!(err.output_msg(), "Internal error: internal");
        assert_eq!(err.to_string(), "Failed to upload file");
    }

    #[test]
    fn missing_remote_file_is_not_found() {
        let err = ApiError::Remote {
            action: "rename",
            source: RemoteError::NotFound { id: "abc".into() },
        };
        assert_eq!(err.status_code(), StatusCode::NotFound);
        assert_eq!(err.output_msg(), "File abc not found");
    }
}
