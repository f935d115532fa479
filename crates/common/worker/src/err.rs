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

use std::fmt;

/// Result type for worker operations.
pub type WorkResult<T = ()> = std::result::Result<T, WorkError>;

/// How the manager reacts to a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The worker keeps its schedule and runs again on the next trigger.
    Transient,

    /// The worker stops after `on_shutdown()`.
    Fatal,
}

/// Error returned from `work()`, `on_start()` and `on_shutdown()`.
#[derive(Debug)]
pub struct WorkError {
    severity: ErrorSeverity,
    message:  String,
    source:   Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl WorkError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            severity: ErrorSeverity::Transient,
            message:  message.into(),
            source:   None,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            severity: ErrorSeverity::Fatal,
            message:  message.into(),
            source:   None,
        }
    }

    pub fn transient_with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            severity: ErrorSeverity::Transient,
            message:  message.into(),
            source:   Some(Box::new(source)),
        }
    }

    pub fn fatal_with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            severity: ErrorSeverity::Fatal,
            message:  message.into(),
            source:   Some(Box::new(source)),
        }
    }

    pub const fn severity(&self) -> ErrorSeverity { self.severity }

    pub fn is_fatal(&self) -> bool { self.severity == ErrorSeverity::Fatal }

    pub fn message(&self) -> &str { &self.message }
}

impl fmt::Display for WorkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            ErrorSeverity::Transient => "transient",
            ErrorSeverity::Fatal => "fatal",
        };
        write!(f, "[{}] {}", severity, self.message)?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for WorkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_severity_and_source() {
        let io = std::io::Error::other("disk gone");
        let err = WorkError::transient_with_source("sweep failed", io);
        assert_eq!(err.to_string(), "[transient] sweep failed: disk gone");
        assert!(!err.is_fatal());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn fatal_is_fatal() {
        let err = WorkError::fatal("bad config");
        assert_eq!(err.severity(), ErrorSeverity::Fatal);
        assert_eq!(err.message(), "bad config");
    }
}
