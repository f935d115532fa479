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

//! Sequential ZIP encoding over any blocking byte sink.
//!
//! The encoder is moved onto the blocking pool for every append and for the
//! final central directory, so the async side never blocks on compression
//! or on a slow sink.

mod encoder;

use std::{
    io::{self, BufWriter, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

pub(crate) use encoder::Method;
use jiff::civil;
use snafu::{OptionExt, ResultExt};
use tokio::task;

use self::encoder::Encoder;
use crate::{
    config::Compression,
    error::{ArchiveError, EncoderSnafu, FinalizedSnafu, IoSnafu},
    staging::StagedBody,
};

const SINK_BUFFER: usize = 64 * 1024;

/// Shared between the writer and its sink. Once `closed`, writes are
/// swallowed so an abandoned encoder can be dropped anywhere without
/// touching the real sink.
#[derive(Debug, Default)]
struct SinkState {
    closed:  AtomicBool,
    written: AtomicU64,
}

struct Gated<W> {
    inner: W,
    state: Arc<SinkState>,
}

impl<W: Write> Gated<W> {
    fn closed(&self) -> bool { self.state.closed.load(Ordering::Acquire) }

    fn close_on_error(&self, e: &io::Error) {
        if e.kind() != io::ErrorKind::Interrupted {
            self.state.closed.store(true, Ordering::Release);
        }
    }
}

impl<W: Write> Write for Gated<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed() {
            return Ok(buf.len());
        }
        match self.inner.write(buf) {
            Ok(n) => {
                self.state.written.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => {
                self.close_on_error(&e);
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.closed() {
            return Ok(());
        }
        self.inner.flush().inspect_err(|e| self.close_on_error(e))
    }
}

pub struct ArchiveWriter<W: Write + Send + 'static> {
    encoder:     Option<Encoder<BufWriter<Gated<W>>>>,
    sink:        Arc<SinkState>,
    compression: Compression,
    entries:     usize,
    finished:    bool,
}

impl<W: Write + Send + 'static> ArchiveWriter<W> {
    pub fn new(sink: W, compression: Compression) -> Self {
        let state = Arc::new(SinkState::default());
        let gated = Gated {
            inner: sink,
            state: state.clone(),
        };
        Self {
            encoder: Some(Encoder::new(BufWriter::with_capacity(SINK_BUFFER, gated))),
            sink: state,
            compression,
            entries: 0,
            finished: false,
        }
    }

    #[must_use]
    pub const fn entries(&self) -> usize { self.entries }

    /// Encodes `body` as the next entry and returns its content length.
    /// Names are not checked against earlier entries. The body is consumed
    /// completely before this returns. Any error leaves the archive
    /// unusable.
    pub async fn append(&mut self, name: &str, body: StagedBody, modified: civil::DateTime) -> Result<u64, ArchiveError> {
        let method = self.compression.method();
        let mut encoder = self.encoder.take().context(FinalizedSnafu)?;
        let entry = name.to_string();
        let (encoder, written) = task::spawn_blocking(move || {
            let size = body.len();
            let written = encoder.append(&entry, size, method, modified, body.into_reader());
            (encoder, written)
        })
        .await
        .context(EncoderSnafu)?;
        self.encoder = Some(encoder);

        let bytes = written.context(IoSnafu {
            action: "write archive entry",
        })?;
        self.entries += 1;
        Ok(bytes)
    }

    /// Writes the central directory and flushes the sink. Returns the size
    /// of the encoded archive.
    pub async fn finalize(mut self) -> Result<u64, ArchiveError> {
        let encoder = self.encoder.take().context(FinalizedSnafu)?;
        task::spawn_blocking(move || -> Result<(), ArchiveError> {
            let mut out = encoder.finish().context(IoSnafu {
                action: "write central directory",
            })?;
            out.flush().context(IoSnafu {
                action: "flush archive",
            })
        })
        .await
        .context(EncoderSnafu)??;
        self.finished = true;
        Ok(self.sink.written.load(Ordering::Relaxed))
    }
}

impl<W: Write + Send + 'static> Drop for ArchiveWriter<W> {
    fn drop(&mut self) {
        if !self.finished {
            self.sink.closed.store(true, Ordering::Release);
        }
    }
}
