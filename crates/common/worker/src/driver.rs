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

use crate::{context::WorkerContext, trigger::Trigger};

/// Waits for the next execution according to a [`Trigger`].
pub(crate) enum TriggerDriver {
    Once { executed: bool },
    Interval(tokio::time::Interval),
}

impl TriggerDriver {
    pub fn new(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Once => Self::Once { executed: false },
            Trigger::Interval(period) => {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                Self::Interval(interval)
            }
        }
    }

    /// Returns `false` once the worker should stop.
    pub async fn wait_next(&mut self, ctx: &WorkerContext) -> bool {
        if ctx.is_cancelled() {
            return false;
        }
        match self {
            Self::Once { executed } => {
                if *executed {
                    ctx.cancelled().await;
                    false
                } else {
                    *executed = true;
                    true
                }
            }
            Self::Interval(interval) => {
                tokio::select! {
                    _ = interval.tick() => true,
                    () = ctx.cancelled() => false,
                }
            }
        }
    }
}
