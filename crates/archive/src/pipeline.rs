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

//! One configurable pipeline from listing request to archive body.

use std::{
    fmt,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use drivezip_error::error_chain;
use drivezip_remote::SharedStore;
use futures::{StreamExt, stream::BoxStream};
use snafu::{ResultExt, ensure};
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, timeout, timeout_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    config::{Compression, PipelineConfig, TransportStrategy},
    entry::{FileEntry, ListingRequest},
    error::{ArchiveSnafu, InvalidPartSnafu, JobError, ResolveSnafu},
    lifecycle::{JobGuard, JobProgress, JobState},
    multiplex::ArchiveWriter,
    plan,
    resolve::Resolver,
    scheduler::{FetchOutcome, FetchScheduler},
    transport::{ChannelBody, ChannelWriter, STREAM_CHANNEL_DEPTH, TempArchive, TempFileBody},
};

/// A committed archive response.
pub struct ArchiveDelivery {
    pub filename:       String,
    /// Known up front only when the archive was built in a temp file.
    pub content_length: Option<u64>,
    pub job_id:         Uuid,
    pub progress:       Arc<JobProgress>,
    pub state:          watch::Receiver<JobState>,
    pub body:           BoxStream<'static, io::Result<Bytes>>,
}

impl fmt::Debug for ArchiveDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveDelivery")
            .field("filename", &self.filename)
            .field("content_length", &self.content_length)
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}

struct Inner {
    store:    SharedStore,
    config:   PipelineConfig,
    temp_dir: PathBuf,
}

/// Cheap to clone; every clone shares the store handle and config.
#[derive(Clone)]
pub struct ArchivePipeline {
    inner: Arc<Inner>,
}

impl ArchivePipeline {
    pub fn new(store: SharedStore, config: PipelineConfig, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                temp_dir: temp_dir.into(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig { &self.inner.config }

    #[must_use]
    pub fn store(&self) -> &SharedStore { &self.inner.store }

    #[must_use]
    pub fn temp_dir(&self) -> &Path { &self.inner.temp_dir }

    fn resolver(&self) -> Resolver {
        Resolver::new(
            self.inner.store.clone(),
            self.config().retry_policy(),
            self.config().max_depth,
        )
    }

    fn timed_out(&self) -> JobError {
        JobError::TimedOut {
            deadline: self.config().deadline,
        }
    }

    /// Resolves a listing without building an archive, bounded by the job
    /// deadline.
    pub async fn resolve(&self, request: &ListingRequest) -> Result<Vec<FileEntry>, JobError> {
        timeout(self.config().deadline, self.resolver().resolve(request))
            .await
            .map_err(|_| self.timed_out())?
            .context(ResolveSnafu)
    }

    /// Builds the archive for `request`.
    ///
    /// Errors are only returned while no response has been committed. After
    /// that, failures surface as an error item in the body stream.
    pub async fn run(&self, request: ListingRequest) -> Result<ArchiveDelivery, JobError> {
        self.run_job(request, None).await
    }

    /// Builds part `part` (1-based) of `total` of the archive for `request`.
    pub async fn run_part(
        &self,
        request: ListingRequest,
        part: usize,
        total: usize,
    ) -> Result<ArchiveDelivery, JobError> {
        ensure!(part >= 1 && part <= total, InvalidPartSnafu { part, total });
        self.run_job(request, Some((part, total))).await
    }

    async fn run_job(
        &self,
        request: ListingRequest,
        part: Option<(usize, usize)>,
    ) -> Result<ArchiveDelivery, JobError> {
        let job = JobGuard::new(&self.config().profile);
        let span = info_span!("job", id = %job.id(), profile = %self.config().profile);
        self.drive(job, request, part).instrument(span).await
    }

    async fn drive(
        &self,
        job: JobGuard,
        request: ListingRequest,
        part: Option<(usize, usize)>,
    ) -> Result<ArchiveDelivery, JobError> {
        let deadline = Instant::now() + self.config().deadline;
        info!(?request, ?part, transport = %self.config().transport, "job started");

        job.enter(JobState::Listing);
        let listed = match timeout_at(deadline, self.resolver().resolve(&request)).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(source)) => return Err(job.fail(JobError::Resolve { source })),
            Err(_) => return Err(job.fail(self.timed_out())),
        };

        let (entries, filename) = match part {
            None => (listed, self.config().archive_name()),
            Some((part, total)) => (
                plan::part_slice(&listed, part, total).to_vec(),
                plan::part_archive_name(part, total),
            ),
        };
        if entries.is_empty() {
            return Err(job.fail(JobError::NoFiles));
        }
        job.progress().set_total(entries.len());

        match self.config().transport {
            TransportStrategy::Stream => Ok(self.stream(job, entries, deadline, filename)),
            TransportStrategy::TempFile => self.via_temp_file(job, entries, deadline, filename).await,
        }
    }

    fn compression_for(&self, total: usize) -> Compression {
        let compression = self.config().compression_for(total);
        if compression != self.config().compression {
            info!(
                total,
                threshold = self.config().store_threshold,
                "large job, storing entries uncompressed"
            );
        }
        compression
    }

    /// Commits right away and encodes into the response body from a
    /// spawned task. Failures from here on abort the connection.
    fn stream(
        &self,
        job: JobGuard,
        entries: Vec<FileEntry>,
        deadline: Instant,
        filename: String,
    ) -> ArchiveDelivery {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_DEPTH);
        let cancel = CancellationToken::new();
        let writer = ArchiveWriter::new(
            ChannelWriter::new(tx.clone()),
            self.compression_for(entries.len()),
        );

        let committed = job.try_commit();
        debug_assert!(committed, "stream job committed twice");
        let delivery = ArchiveDelivery {
            filename,
            content_length: None,
            job_id: job.id(),
            progress: job.progress().clone(),
            state: job.subscribe(),
            body: ChannelBody::new(rx, cancel.clone().drop_guard()).boxed(),
        };

        let pipeline = self.clone();
        tokio::spawn(
            async move {
                let outcome = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(JobError::Cancelled),
                    assembled = timeout_at(deadline, pipeline.assemble(&job, &entries, writer)) => {
                        assembled.unwrap_or_else(|_| Err(pipeline.timed_out()))
                    }
                };
                match outcome {
                    Ok(size) => job.complete(size),
                    Err(_) if cancel.is_cancelled() => {
                        let _ = job.fail(JobError::Cancelled);
                    }
                    Err(error) => {
                        let kind = match error {
                            JobError::TimedOut { .. } => io::ErrorKind::TimedOut,
                            _ => io::ErrorKind::Other,
                        };
                        let message = error.to_string();
                        let _ = job.fail(error);
                        // Ends the body with an error so the server resets
                        // the connection instead of finishing it cleanly.
                        let _ = tx.send(Err(io::Error::new(kind, message))).await;
                    }
                }
            }
            .instrument(Span::current()),
        );
        delivery
    }

    /// Finishes the archive in a temp file and only then commits, so every
    /// failure up to that point can still be answered properly.
    async fn via_temp_file(
        &self,
        job: JobGuard,
        entries: Vec<FileEntry>,
        deadline: Instant,
        filename: String,
    ) -> Result<ArchiveDelivery, JobError> {
        let compression = self.compression_for(entries.len());
        let assembled = timeout_at(deadline, async {
            let (file, archive) = TempArchive::create(self.temp_dir(), &self.config().temp_prefix())
                .await
                .context(ArchiveSnafu)?;
            debug!(path = %archive.path().display(), "assembling into temp file");
            let size = self
                .assemble(&job, &entries, ArchiveWriter::new(file, compression))
                .await?;
            Ok::<_, JobError>((archive, size))
        })
        .await;

        let (archive, size) = match assembled {
            Ok(Ok(done)) => done,
            Ok(Err(error)) => return Err(job.fail(error)),
            Err(_) => return Err(job.fail(self.timed_out())),
        };
        let reader = match tokio::fs::File::open(archive.path()).await {
            Ok(reader) => reader,
            Err(source) => return Err(job.fail(JobError::Transport { source })),
        };

        let committed = job.try_commit();
        debug_assert!(committed, "temp file job committed twice");
        Ok(ArchiveDelivery {
            filename,
            content_length: Some(size),
            job_id: job.id(),
            progress: job.progress().clone(),
            state: job.subscribe(),
            body: TempFileBody::new(reader, archive, job, size).boxed(),
        })
    }

    /// Fetches batch after batch and appends in listing order. Entries
    /// that cannot be fetched are skipped; only encoder faults end the job.
    async fn assemble<W: Write + Send + 'static>(
        &self,
        job: &JobGuard,
        entries: &[FileEntry],
        mut writer: ArchiveWriter<W>,
    ) -> Result<u64, JobError> {
        job.enter(JobState::Fetching);
        let config = self.config();
        let (concurrency, per_file_timeout) = config.tuning_for(entries.len());
        let scheduler = FetchScheduler::builder()
            .store(self.inner.store.clone())
            .retry(config.retry_policy())
            .concurrency(concurrency)
            .per_file_timeout(per_file_timeout)
            .spool_threshold(config.spool_threshold.as_usize())
            .spool_dir(self.temp_dir())
            .build();
        let modified = jiff::Zoned::now().datetime();
        let progress = job.progress();
        let every = config.progress_every.max(1);

        for batch in entries.chunks(scheduler.batch_size()) {
            let outcomes = scheduler.fetch_batch(batch).await;
            for (entry, outcome) in batch.iter().zip(outcomes) {
                let finished = match outcome {
                    FetchOutcome::Ready(body) => {
                        let bytes = writer
                            .append(&entry.relative_path, body, modified)
                            .await
                            .context(ArchiveSnafu)?;
                        progress.record_processed(bytes)
                    }
                    FetchOutcome::Skipped(error) => {
                        warn!(
                            entry = %entry.relative_path,
                            id = %entry.id,
                            error = %error_chain(&error),
                            "skipping entry"
                        );
                        progress.record_skipped()
                    }
                };
                if finished % every == 0 || finished == entries.len() {
                    info!(
                        finished,
                        total = entries.len(),
                        skipped = progress.skipped(),
                        bytes = progress.bytes(),
                        "progress"
                    );
                }
            }
        }

        debug_assert!(progress.is_done());
        job.enter(JobState::Finalizing);
        writer.finalize().await.context(ArchiveSnafu)
    }
}
