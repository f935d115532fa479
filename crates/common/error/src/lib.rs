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

use std::{any::Any, error::Error as StdError, sync::Arc};

use http::StatusCode as HttpStatusCode;
use serde::Serialize;
use strum::EnumProperty;

/// Coarse error classification shared by every drivezip error type.
///
/// Each variant carries the HTTP status it maps to, so handlers never pick
/// status codes by hand.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    strum_macros::EnumProperty,
    strum_macros::EnumString,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusCode {
    #[strum(props(http_status = "400"))]
    InvalidArgument,
    #[strum(props(http_status = "404"))]
    NotFound,
    #[strum(props(http_status = "408"))]
    Timeout,
    #[strum(props(http_status = "401"))]
    Unauthorized,
    #[strum(props(http_status = "502"))]
    Upstream,
    #[strum(props(http_status = "500"))]
    Internal,
    #[strum(props(http_status = "500"))]
    Unknown,
}

impl StatusCode {
    pub fn http_status(self) -> HttpStatusCode {
        self.get_str("http_status")
            .and_then(|value| value.parse::<u16>().ok())
            .and_then(|value| HttpStatusCode::from_u16(value).ok())
            .unwrap_or(HttpStatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Whether the message of an error with this code may be shown to callers.
    pub const fn is_public(self) -> bool { !matches!(self, Self::Internal | Self::Unknown) }
}

/// Renders `error` and every source below it on one line, for log fields.
pub fn error_chain(error: &dyn StdError) -> String {
    snafu::ChainCompat::new(error)
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}

pub trait StackError: StdError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>);

    fn next(&self) -> Option<&dyn StackError>;

    fn last(&self) -> &dyn StackError
    where
        Self: Sized,
    {
        let Some(mut result) = self.next() else {
            return self;
        };
        while let Some(err) = result.next() {
            result = err;
        }
        result
    }

    fn transparent(&self) -> bool { false }
}

pub trait ErrorExt: StackError {
    fn status_code(&self) -> StatusCode { StatusCode::Unknown }

    fn as_any(&self) -> &dyn Any;

    /// Message safe to put into a response body.
    fn output_msg(&self) -> String
    where
        Self: Sized,
    {
        if !self.status_code().is_public() {
            return format!("Internal error: {}", self.status_code());
        }
        let error = self.last();
        if let Some(external_error) = error.source() {
            let mut root = external_error;
            while let Some(source) = root.source() {
                root = source;
            }
            if error.transparent() {
                format!("{root}")
            } else {
                format!("{error}: {root}")
            }
        } else {
            format!("{error}")
        }
    }

    fn root_cause(&self) -> Option<&dyn StdError>
    where
        Self: Sized,
    {
        let error = self.last();
        let mut source = error.source()?;
        while let Some(next) = source.source() {
            source = next;
        }
        Some(source)
    }
}

impl<T: ?Sized + StackError> StackError for Arc<T> {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) { self.as_ref().debug_fmt(layer, buf) }

    fn next(&self) -> Option<&dyn StackError> { self.as_ref().next() }
}

impl<T: StackError> StackError for Box<T> {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) { self.as_ref().debug_fmt(layer, buf) }

    fn next(&self) -> Option<&dyn StackError> { self.as_ref().next() }
}

#[cfg(test)]
mod tests {
    use snafu::Snafu;

    use super::*;

    #[derive(Debug, Snafu)]
    enum Leaf {
        #[snafu(display("folder {id} is gone"))]
        Gone { id: String },
    }

    impl StackError for Leaf {
        fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
            buf.push(format!("{layer}: {self}"));
        }

        fn next(&self) -> Option<&dyn StackError> { None }
    }

    impl ErrorExt for Leaf {
        fn status_code(&self) -> StatusCode { StatusCode::NotFound }

        fn as_any(&self) -> &dyn Any { self }
    }

    #[test]
    fn status_codes_map_to_http() {
        assert_eq!(StatusCode::NotFound.http_status(), HttpStatusCode::NOT_FOUND);
        assert_eq!(StatusCode::Timeout.http_status(), HttpStatusCode::REQUEST_TIMEOUT);
        assert_eq!(StatusCode::Upstream.http_status(), HttpStatusCode::BAD_GATEWAY);
        assert_eq!(
            StatusCode::Unknown.http_status(),
            HttpStatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn status_codes_round_trip_through_strings() {
        assert_eq!("not_found".parse::<StatusCode>().unwrap(), StatusCode::NotFound);
        assert_eq!(StatusCode::InvalidArgument.to_string(), "invalid_argument");
    }

    #[test]
    fn public_errors_expose_their_message() {
        let err = Leaf::Gone { id: "abc".into() };
        assert_eq!(err.output_msg(), "folder abc is gone");
    }

    #[derive(Debug, Snafu)]
    #[snafu(display("Failed to fetch {id}"))]
    struct Fetch {
        id:     String,
        source: Leaf,
    }

    #[test]
    fn error_chain_keeps_every_source_on_one_line() {
        let error = Fetch {
            id:     "a".into(),
            source: Leaf::Gone { id: "a".into() },
        };
        assert_eq!(error_chain(&error), "Failed to fetch a: folder a is gone");
        assert_eq!(error_chain(&Leaf::Gone { id: "b".into() }), "folder b is gone");
    }
}
