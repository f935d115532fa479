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

use drivezip_error::{ErrorExt, StackError, StatusCode};
use snafu::Snafu;

pub type Result<T, E = RemoteError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RemoteError {
    #[snafu(display("Network error calling {endpoint}"))]
    Network {
        endpoint: String,
        source:   reqwest::Error,
    },

    #[snafu(display("Remote store returned HTTP {status} for {endpoint}: {message}"))]
    Http {
        status:   u16,
        endpoint: String,
        message:  String,
    },

    #[snafu(display("File {id} not found"))]
    NotFound { id: String },

    #[snafu(display("Failed to decode response from {endpoint}"))]
    Decode {
        endpoint: String,
        source:   reqwest::Error,
    },

    #[snafu(display("Access token refresh failed: {message}"))]
    TokenRefresh { message: String },

    #[snafu(display("Content stream of {id} broke off"))]
    Stream { id: String, source: reqwest::Error },

    #[snafu(display("Invalid remote store URL {url}"))]
    InvalidUrl { url: String },

    #[snafu(display("Failed to build HTTP client"))]
    Client { source: reqwest::Error },

    #[snafu(display("Remote store unavailable: {message}"))]
    Unavailable { message: String },
}

impl RemoteError {
    /// Whether repeating the same call may succeed.
    ///
    /// Transport faults, throttling and 5xx answers are retried; anything
    /// the remote rejected on its merits is not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Stream { .. } | Self::Unavailable { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::NotFound { .. }
            | Self::Decode { .. }
            | Self::TokenRefresh { .. }
            | Self::InvalidUrl { .. }
            | Self::Client { .. } => false,
        }
    }
}

impl StackError for RemoteError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
        buf.push(format!("{layer}: {self}"));
    }

    fn next(&self) -> Option<&dyn StackError> { None }
}

impl ErrorExt for RemoteError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NotFound,
            Self::Http { status, .. } if *status == 404 => StatusCode::NotFound,
            Self::Http { status, .. } if *status == 400 => StatusCode::InvalidArgument,
            Self::Http { status, .. } if *status == 401 || *status == 403 => {
                StatusCode::Unauthorized
            }
            Self::TokenRefresh { .. } => StatusCode::Unauthorized,
            Self::InvalidUrl { .. } | Self::Client { .. } => StatusCode::Internal,
            _ => StatusCode::Upstream,
        }
    }

    fn as_any(&self) -> &dyn Any { self }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> RemoteError {
        RemoteError::Http {
            status,
            endpoint: "files".into(),
            message: String::new(),
        }
    }

    #[test]
    fn server_side_failures_are_retryable() {
        assert!(http(500).is_retryable());
        assert!(http(503).is_retryable());
        assert!(http(429).is_retryable());
        assert!(
            RemoteError::Unavailable {
                message: "flaky".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn client_side_failures_are_final() {
        assert!(!http(400).is_retryable());
        assert!(!http(403).is_retryable());
        assert!(!RemoteError::NotFound { id: "x".into() }.is_retryable());
    }

    #[test]
    fn status_codes_follow_remote_answer() {
        assert_eq!(http(404).status_code(), StatusCode::NotFound);
        assert_eq!(http(401).status_code(), StatusCode::Unauthorized);
        assert_eq!(http(500).status_code(), StatusCode::Upstream);
    }
}
