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

use crate::{context::WorkerContext, err::WorkResult, trigger::Trigger};

/// A background task executed by the [`Manager`](crate::Manager).
///
/// Implementors define a single execution in `work()`; looping, scheduling
/// and shutdown belong to the manager.
#[async_trait::async_trait]
pub trait Worker: Send + 'static {
    /// Worker name for logs and metric labels.
    fn name(&self) -> &'static str;

    /// When `work()` runs.
    fn trigger(&self) -> Trigger;

    /// Called once before the first `work()`.
    async fn on_start(&mut self, _ctx: &WorkerContext) -> WorkResult { Ok(()) }

    /// Single execution unit. A transient error is logged and the worker
    /// keeps its schedule; a fatal one stops it.
    async fn work(&mut self, ctx: &WorkerContext) -> WorkResult;

    /// Called once after the last `work()`, also after a fatal error.
    async fn on_shutdown(&mut self, _ctx: &WorkerContext) -> WorkResult { Ok(()) }
}
