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

//! Background workers with a managed lifecycle.
//!
//! A [`Worker`] only implements one unit of work; the [`Manager`] drives it
//! according to its [`Trigger`], records metrics, and cancels it on
//! shutdown with a bounded grace period.
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use drivezip_common_worker::{Manager, Trigger, WorkResult, Worker, WorkerConfig, WorkerContext};
//!
//! struct Heartbeat;
//!
//! #[async_trait::async_trait]
//! impl Worker for Heartbeat {
//!     fn name(&self) -> &'static str { "heartbeat" }
//!
//!     fn trigger(&self) -> Trigger { Trigger::Interval(Duration::from_secs(5)) }
//!
//!     async fn work(&mut self, _ctx: &WorkerContext) -> WorkResult { Ok(()) }
//! }
//!
//! # async fn run() {
//! let mut manager = Manager::start(WorkerConfig::builder().build());
//! manager.register(Heartbeat);
//! manager.shutdown().await;
//! # }
//! ```

mod config;
mod context;
mod driver;
mod err;
mod manager;
mod metrics;
mod trigger;
mod worker;

pub use config::WorkerConfig;
pub use context::WorkerContext;
pub use err::{ErrorSeverity, WorkError, WorkResult};
pub use manager::Manager;
pub use trigger::Trigger;
pub use worker::Worker;
