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

//! Sinks the encoder writes into and the bodies the client reads from.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll, ready},
    time::{Duration, Instant, SystemTime},
};

use bytes::Bytes;
use futures::Stream;
use snafu::ResultExt;
use tempfile::TempPath;
use tokio::sync::mpsc;
use tokio_util::{io::ReaderStream, sync::DropGuard};
use tracing::{debug, info, warn};

use crate::{
    error::{ArchiveError, EncoderSnafu, JobError, TempFileSnafu},
    lifecycle::JobGuard,
    metrics::TEMP_FILES_DELETED,
};

/// Chunks buffered between the encoder and a slow client.
pub(crate) const STREAM_CHANNEL_DEPTH: usize = 16;

/// How often a temp archive being served gets its mtime bumped, keeping it
/// well clear of the sweeper's age threshold.
const KEEPALIVE_EVERY: Duration = Duration::from_secs(60);

pub(crate) type BodySender = mpsc::Sender<io::Result<Bytes>>;

/// Blocking sink that forwards every write to the response body. Only
/// used from the blocking pool.
pub(crate) struct ChannelWriter {
    tx: BodySender,
}

impl ChannelWriter {
    pub(crate) const fn new(tx: BodySender) -> Self { Self { tx } }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

/// Streaming response body. Dropping it cancels the job that feeds it.
pub struct ChannelBody {
    // Declared first so the job sees the cancellation before the channel
    // closes under it.
    _cancel_on_drop: DropGuard,
    rx:              mpsc::Receiver<io::Result<Bytes>>,
}

impl ChannelBody {
    pub(crate) const fn new(rx: mpsc::Receiver<io::Result<Bytes>>, cancel_on_drop: DropGuard) -> Self {
        Self {
            _cancel_on_drop: cancel_on_drop,
            rx,
        }
    }
}

impl Stream for ChannelBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// A temp archive on disk owned by exactly one job. The file is deleted
/// when this is dropped, once.
#[derive(Debug)]
pub struct TempArchive {
    path:   Option<TempPath>,
    handle: std::fs::File,
}

impl TempArchive {
    /// Creates `<prefix>XXXXXX.zip` in `dir` and returns it together with a
    /// handle to write the archive into.
    pub async fn create(dir: &Path, prefix: &str) -> Result<(std::fs::File, Self), ArchiveError> {
        let dir_buf = dir.to_path_buf();
        let prefix = prefix.to_string();
        let created = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(".zip")
                .tempfile_in(&dir_buf)
        })
        .await
        .context(EncoderSnafu)?
        .context(TempFileSnafu { dir })?;
        let (file, path) = created.into_parts();
        let handle = file.try_clone().context(TempFileSnafu { dir })?;
        Ok((file, Self {
            path: Some(path),
            handle,
        }))
    }

    #[must_use]
    pub fn path(&self) -> &Path { self.path.as_deref().unwrap_or_else(|| Path::new("")) }

    /// Marks the file as in use for anyone judging it by age.
    pub(crate) fn touch(&self) -> io::Result<()> { self.handle.set_modified(SystemTime::now()) }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let shown: PathBuf = path.to_path_buf();
        match path.close() {
            Ok(()) => {
                TEMP_FILES_DELETED.inc();
                info!(path = %shown.display(), "temp file deleted");
            }
            Err(e) => warn!(path = %shown.display(), error = %e, "failed to delete temp file"),
        }
    }
}

/// Serves a finished temp archive. The job completes when the last byte
/// was read; dropping the body earlier cancels it. Either way the temp file
/// goes away with the body.
pub struct TempFileBody {
    inner:   ReaderStream<tokio::fs::File>,
    job:     Option<JobGuard>,
    size:    u64,
    archive: TempArchive,
    touched: Option<Instant>,
}

impl TempFileBody {
    pub(crate) fn new(file: tokio::fs::File, archive: TempArchive, job: JobGuard, size: u64) -> Self {
        Self {
            inner: ReaderStream::new(file),
            job: Some(job),
            size,
            archive,
            touched: None,
        }
    }

    fn keep_alive(&mut self) {
        if self.touched.is_some_and(|at| at.elapsed() < KEEPALIVE_EVERY) {
            return;
        }
        self.touched = Some(Instant::now());
        if let Err(e) = self.archive.touch() {
            debug!(path = %self.archive.path().display(), error = %e, "failed to refresh temp file mtime");
        }
    }
}

impl Stream for TempFileBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let next = ready!(Pin::new(&mut this.inner).poll_next(cx));
        match &next {
            None => {
                if let Some(job) = this.job.take() {
                    job.complete(this.size);
                }
            }
            Some(Err(e)) => {
                if let Some(job) = this.job.take() {
                    let _ = job.fail(JobError::Transport {
                        source: io::Error::new(e.kind(), e.to_string()),
                    });
                }
            }
            Some(Ok(_)) => this.keep_alive(),
        }
        Poll::Ready(next)
    }
}
