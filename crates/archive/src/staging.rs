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

//! Holds one entry's content between fetch and encode.
//!
//! Small files stay in memory; anything above the spool threshold is copied
//! into an anonymous temp file so a batch never holds more than
//! `concurrency * spool_threshold` bytes in memory.

use std::{
    fs::File,
    io::{self, Read},
    path::Path,
};

use bytes::{Bytes, BytesMut};
use drivezip_remote::ContentStream;
use futures::TryStreamExt;
use snafu::ResultExt;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::{FetchError, RemoteSnafu, SpoolSnafu};

#[derive(Debug)]
pub enum StagedBody {
    Memory(Bytes),
    /// Anonymous temp file, rewound to the start. Removed by the OS once
    /// closed.
    Disk { file: File, len: u64 },
}

impl StagedBody {
    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Self::Memory(bytes) => bytes.len() as u64,
            Self::Disk { len, .. } => *len,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Blocking reader over the content.
    pub(crate) fn into_reader(self) -> Box<dyn Read + Send> {
        match self {
            Self::Memory(bytes) => Box::new(io::Cursor::new(bytes)),
            Self::Disk { file, len } => Box::new(file.take(len)),
        }
    }
}

/// Drains `stream` completely. A stream that breaks off midway fails the
/// attempt, whatever was staged so far is discarded.
pub async fn stage(mut stream: ContentStream, threshold: usize, spool_dir: &Path) -> Result<StagedBody, FetchError> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.try_next().await.context(RemoteSnafu)? {
        if buffer.len() + chunk.len() > threshold {
            return spill(buffer, chunk, stream, spool_dir).await;
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(StagedBody::Memory(buffer.freeze()))
}

async fn spill(
    head: BytesMut,
    chunk: Bytes,
    mut stream: ContentStream,
    spool_dir: &Path,
) -> Result<StagedBody, FetchError> {
    let dir = spool_dir.to_path_buf();
    let file = tokio::task::spawn_blocking(move || tempfile::tempfile_in(dir))
        .await
        .map_err(io::Error::other)
        .and_then(|created| created)
        .context(SpoolSnafu)?;

    let mut file = tokio::fs::File::from_std(file);
    file.write_all(&head).await.context(SpoolSnafu)?;
    file.write_all(&chunk).await.context(SpoolSnafu)?;
    let mut len = (head.len() + chunk.len()) as u64;
    while let Some(chunk) = stream.try_next().await.context(RemoteSnafu)? {
        file.write_all(&chunk).await.context(SpoolSnafu)?;
        len += chunk.len() as u64;
    }
    file.flush().await.context(SpoolSnafu)?;
    file.rewind().await.context(SpoolSnafu)?;

    Ok(StagedBody::Disk {
        file: file.into_std().await,
        len,
    })
}
