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

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use drivezip_common_worker::{
    Manager, Trigger, WorkError, WorkResult, Worker, WorkerConfig, WorkerContext,
};
use tokio::time::sleep;

struct CounterWorker {
    counter: Arc<AtomicU32>,
    period:  Duration,
}

#[async_trait::async_trait]
impl Worker for CounterWorker {
    fn name(&self) -> &'static str { "counter" }

    fn trigger(&self) -> Trigger { Trigger::Interval(self.period) }

    async fn work(&mut self, _ctx: &WorkerContext) -> WorkResult {
        self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct OnceWorker {
    counter: Arc<AtomicU32>,
}

#[async_trait::async_trait]
impl Worker for OnceWorker {
    fn name(&self) -> &'static str { "once" }

    fn trigger(&self) -> Trigger { Trigger::Once }

    async fn work(&mut self, _ctx: &WorkerContext) -> WorkResult {
        self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails every run; fatal on the third.
struct FlakyWorker {
    runs:      Arc<AtomicU32>,
    shutdowns: Arc<AtomicU32>,
}

#[async_trait::async_trait]
impl Worker for FlakyWorker {
    fn name(&self) -> &'static str { "flaky" }

    fn trigger(&self) -> Trigger { Trigger::Interval(Duration::from_millis(100)) }

    async fn work(&mut self, _ctx: &WorkerContext) -> WorkResult {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        if run >= 3 {
            Err(WorkError::fatal("giving up"))
        } else {
            Err(WorkError::transient("try again"))
        }
    }

    async fn on_shutdown(&mut self, _ctx: &WorkerContext) -> WorkResult {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct HangingWorker {
    hang_duration: Duration,
}

#[async_trait::async_trait]
impl Worker for HangingWorker {
    fn name(&self) -> &'static str { "hanging" }

    fn trigger(&self) -> Trigger { Trigger::Once }

    async fn work(&mut self, ctx: &WorkerContext) -> WorkResult {
        tokio::select! {
            () = sleep(self.hang_duration) => {}
            () = ctx.cancelled() => {
                // ignores cancellation on purpose
                sleep(self.hang_duration).await;
            }
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn interval_worker_runs_on_every_tick() {
    let counter = Arc::new(AtomicU32::new(0));
    let mut manager = Manager::start(WorkerConfig::builder().build());

    manager.register(CounterWorker {
        counter: counter.clone(),
        period:  Duration::from_millis(100),
    });

    // ticks at 0, 100, ..., 500
    sleep(Duration::from_millis(550)).await;
    manager.shutdown().await;

    assert_eq!(counter.load(Ordering::SeqCst), 6);
}

#[tokio::test(start_paused = true)]
async fn once_worker_runs_exactly_once() {
    let counter = Arc::new(AtomicU32::new(0));
    let mut manager = Manager::start(WorkerConfig::builder().build());

    manager.register(OnceWorker {
        counter: counter.clone(),
    });

    sleep(Duration::from_millis(300)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(manager.len(), 1, "once worker idles until shutdown");

    manager.shutdown().await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_errors_keep_schedule_fatal_stops() {
    let runs = Arc::new(AtomicU32::new(0));
    let shutdowns = Arc::new(AtomicU32::new(0));
    let mut manager = Manager::start(WorkerConfig::builder().build());

    manager.register(FlakyWorker {
        runs:      runs.clone(),
        shutdowns: shutdowns.clone(),
    });

    sleep(Duration::from_secs(2)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    manager.shutdown().await;
}

#[tokio::test]
async fn shutdown_aborts_workers_past_the_timeout() {
    let config = WorkerConfig::builder()
        .shutdown_timeout(Duration::from_millis(200))
        .build();
    let mut manager = Manager::start(config);

    manager.register(HangingWorker {
        hang_duration: Duration::from_secs(10),
    });

    sleep(Duration::from_millis(50)).await;

    let start = std::time::Instant::now();
    manager.shutdown().await;
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_millis(1500),
        "Shutdown took {elapsed:?}, expected about 200ms"
    );
}
