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

use std::{any::Any, io, path::PathBuf, time::Duration};

use drivezip_error::{ErrorExt, StackError, StatusCode};
use drivezip_remote::RemoteError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ResolveError {
    #[snafu(display("Failed to list folder {folder_id}"))]
    List {
        folder_id: String,
        source:    RemoteError,
    },

    #[snafu(display("Folder {path} is nested deeper than {max_depth} levels"))]
    DepthExceeded { path: String, max_depth: usize },
}

impl ResolveError {
    /// Whether the listing failed because the requested folder is unknown.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::List {
                source: RemoteError::NotFound { .. },
                ..
            }
        )
    }
}

/// One failed attempt at fetching a file. Never fatal to the job.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FetchError {
    #[snafu(display("Remote fetch failed"))]
    Remote { source: RemoteError },

    #[snafu(display("Fetch exceeded {}ms", timeout.as_millis()))]
    AttemptTimedOut { timeout: Duration },

    #[snafu(display("Failed to spool content to disk"))]
    Spool { source: io::Error },
}

impl FetchError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Remote { source } => source.is_retryable(),
            Self::AttemptTimedOut { .. } => true,
            Self::Spool { .. } => false,
        }
    }
}

/// Local faults while encoding or sinking the archive. Always fatal.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ArchiveError {
    #[snafu(display("I/O error while trying to {action}"))]
    Io {
        action: &'static str,
        source: io::Error,
    },

    #[snafu(display("Failed to create temp file in {}", dir.display()))]
    TempFile { dir: PathBuf, source: io::Error },

    #[snafu(display("Archive encoder task failed"))]
    Encoder { source: tokio::task::JoinError },

    #[snafu(display("Archive writer already finalized"))]
    Finalized,
}

/// Job-level outcome. Per-file failures never show up here; they are
/// counted as skipped entries.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum JobError {
    #[snafu(display("No files found"))]
    NoFiles,

    #[snafu(display("Failed to resolve files"))]
    Resolve { source: ResolveError },

    #[snafu(display("Part {part} of {total} does not exist"))]
    InvalidPart { part: usize, total: usize },

    #[snafu(display("Download timed out after {}s", deadline.as_secs()))]
    TimedOut { deadline: Duration },

    #[snafu(display("Failed to build archive"))]
    Archive { source: ArchiveError },

    #[snafu(display("Failed to deliver archive"))]
    Transport { source: io::Error },

    #[snafu(display("Client went away"))]
    Cancelled,
}

impl StackError for ResolveError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
        buf.push(format!("{layer}: {self}"));
    }

    fn next(&self) -> Option<&dyn StackError> { None }
}

impl StackError for ArchiveError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
        buf.push(format!("{layer}: {self}"));
    }

    fn next(&self) -> Option<&dyn StackError> { None }
}

impl StackError for JobError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
        buf.push(format!("{layer}: {self}"));
        if let Some(next) = self.next() {
            next.debug_fmt(layer + 1, buf);
        }
    }

    fn next(&self) -> Option<&dyn StackError> {
        match self {
            Self::Resolve { source } => Some(source),
            Self::Archive { source } => Some(source),
            _ => None,
        }
    }
}

impl ErrorExt for JobError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NoFiles => StatusCode::NotFound,
            Self::InvalidPart { .. } => StatusCode::InvalidArgument,
            Self::Resolve { source } if source.is_not_found() => StatusCode::NotFound,
            Self::TimedOut { .. } => StatusCode::Timeout,
            Self::Resolve { .. } | Self::Archive { .. } | Self::Transport { .. } | Self::Cancelled => {
                StatusCode::Internal
            }
        }
    }

    fn as_any(&self) -> &dyn Any { self }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_errors_map_to_http_statuses() {
        assert_eq!(JobError::NoFiles.status_code().http_status().as_u16(), 404);
        assert_eq!(
            JobError::TimedOut {
                deadline: Duration::from_secs(300)
            }
            .status_code()
            .http_status()
            .as_u16(),
            408
        );
        let missing_root = JobError::Resolve {
            source: ResolveError::List {
                folder_id: "x".into(),
                source:    RemoteError::NotFound { id: "x".into() },
            },
        };
        assert_eq!(missing_root.status_code(), StatusCode::NotFound);
        let unreachable = JobError::Resolve {
            source: ResolveError::List {
                folder_id: "x".into(),
                source:    RemoteError::Unavailable {
                    message: "down".into(),
                },
            },
        };
        assert_eq!(unreachable.status_code(), StatusCode::Internal);
    }

    #[test]
    fn public_messages() {
        assert_eq!(JobError::NoFiles.output_msg(), "No files found");
        assert_eq!(
            JobError::TimedOut {
                deadline: Duration::from_secs(300)
            }
            .output_msg(),
            "Download timed out after 300s"
        );
        assert_eq!(JobError::Cancelled.output_msg(), "Internal error: internal");
    }
}
