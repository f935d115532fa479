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

//! Streaming ZIP assembly of remote folders.
//!
//! A job flows through [`Resolver`] (listing), [`FetchScheduler`] (bounded,
//! retried fetches), [`ArchiveWriter`] (sequential encoding) and one of two
//! transports, all under the watch of a [`JobGuard`]. [`ArchivePipeline`]
//! wires these together for one [`PipelineConfig`].

mod config;
mod entry;
mod error;
mod lifecycle;
mod metrics;
mod multiplex;
mod pipeline;
pub mod plan;
mod resolve;
mod scheduler;
mod staging;
mod sweep;
mod transport;

pub use config::{Compression, GALLERY_PROFILE, PipelineConfig, STANDARD_PROFILE, TransportStrategy};
pub use entry::{FileEntry, ListingRequest};
pub use error::{ArchiveError, FetchError, JobError, ResolveError};
pub use lifecycle::{JobGuard, JobProgress, JobState};
pub use multiplex::ArchiveWriter;
pub use pipeline::{ArchiveDelivery, ArchivePipeline};
pub use resolve::Resolver;
pub use scheduler::{FetchOutcome, FetchScheduler};
pub use staging::StagedBody;
pub use sweep::{SweepConfig, SweepReport, TempSweeper};
pub use transport::{ChannelBody, TempArchive, TempFileBody};
