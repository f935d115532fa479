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

//! End-to-end jobs against the in-memory store, for both transports.

use std::{
    io::{self, Cursor, Read, Write},
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use drivezip_archive::{
    ArchiveDelivery, ArchivePipeline, Compression, JobError, JobState, ListingRequest,
    PipelineConfig, TransportStrategy,
};
use drivezip_base::ReadableSize;
use drivezip_error::{ErrorExt, StatusCode};
use drivezip_remote::memory::{Fault, MemoryStore, ROOT_ID};
use futures::{StreamExt, TryStreamExt};
use zip::{CompressionMethod, ZipArchive};

const BOTH: [TransportStrategy; 2] = [TransportStrategy::Stream, TransportStrategy::TempFile];

fn config(transport: TransportStrategy) -> PipelineConfig {
    PipelineConfig::builder()
        .profile("test")
        .concurrency(2)
        .max_retries(1)
        .retry_min_delay(Duration::from_millis(1))
        .retry_max_delay(Duration::from_millis(2))
        .per_file_timeout(Duration::from_secs(2))
        .deadline(Duration::from_secs(10))
        .transport(transport)
        .build()
}

fn folder() -> ListingRequest {
    ListingRequest::Folder {
        root_id: ROOT_ID.into(),
    }
}

fn pipeline(store: &Arc<MemoryStore>, config: PipelineConfig, dir: &Path) -> ArchivePipeline {
    drivezip_common_telemetry::init_default_ut_logging();
    ArchivePipeline::new(store.clone(), config, dir)
}

async fn body_bytes(delivery: ArchiveDelivery) -> io::Result<Vec<u8>> {
    delivery
        .body
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
}

async fn final_state(delivery: &ArchiveDelivery) -> JobState {
    let mut state = delivery.state.clone();
    let reached = tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| s.is_terminal()))
        .await
        .expect("job did not finish in time");
    match reached {
        Ok(state) => *state,
        Err(_) => *delivery.state.borrow(),
    }
}

fn open(bytes: Vec<u8>) -> ZipArchive<Cursor<Vec<u8>>> { ZipArchive::new(Cursor::new(bytes)).expect("valid zip") }

fn names(archive: &mut ZipArchive<Cursor<Vec<u8>>>) -> Vec<String> {
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

fn read(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    archive.by_name(name).unwrap().read_to_end(&mut out).unwrap();
    out
}

fn dir_is_empty(dir: &Path) -> bool { std::fs::read_dir(dir).unwrap().next().is_none() }

fn five_files_third_broken() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for i in 1..=5 {
        store.add_file(ROOT_ID, &format!("f{i}"), &format!("file{i}.txt"), format!("content {i}"));
    }
    store.set_fault("f3", Fault::Always);
    store
}

#[tokio::test]
async fn failing_entry_is_skipped_and_the_rest_archived() {
    for transport in BOTH {
        let dir = tempfile::tempdir().unwrap();
        let store = five_files_third_broken();
        let delivery = pipeline(&store, config(transport), dir.path())
            .run(folder())
            .await
            .unwrap();
        let progress = delivery.progress.clone();
        let state = delivery.state.clone();
        let bytes = body_bytes(delivery).await.unwrap();

        let mut archive = open(bytes);
        assert_eq!(
            names(&mut archive),
            ["file1.txt", "file2.txt", "file4.txt", "file5.txt"],
            "{transport}"
        );
        assert_eq!(progress.skipped(), 1);
        assert_eq!(progress.processed(), 4);
        assert_eq!(store.content_attempts("f3"), 2);

        let mut state = state;
        let done = *state.wait_for(|s| s.is_terminal()).await.unwrap();
        assert_eq!(done, JobState::Completed, "{transport}");
        assert!(dir_is_empty(dir.path()), "{transport}: temp file left behind");
    }
}

/// Collects formatted log output of the current thread.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer { self.clone() }
}

#[tokio::test]
async fn skipped_entries_log_the_underlying_cause() {
    let dir = tempfile::tempdir().unwrap();
    let store = five_files_third_broken();
    let pipeline = pipeline(&store, config(TransportStrategy::TempFile), dir.path());
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let delivery = pipeline.run(folder()).await.unwrap();
    body_bytes(delivery).await.unwrap();

    let logs = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    let skip = logs
        .lines()
        .find(|line| line.contains("skipping entry"))
        .expect("no skip logged");
    assert!(skip.contains("Remote fetch failed: Remote store unavailable: f3 unavailable"), "{skip}");
}

#[tokio::test]
async fn extracted_content_is_byte_identical() {
    let payload = b"\x00\x01binar\xff\xfe!".to_vec();
    assert_eq!(payload.len(), 10);
    for transport in BOTH {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.add_file(ROOT_ID, "p", "payload.bin", payload.clone());
        let delivery = pipeline(&store, config(transport), dir.path())
            .run(folder())
            .await
            .unwrap();
        let expected_len = delivery.content_length;
        let bytes = body_bytes(delivery).await.unwrap();
        if transport == TransportStrategy::TempFile {
            assert_eq!(expected_len, Some(bytes.len() as u64));
        } else {
            assert_eq!(expected_len, None);
        }
        assert_eq!(read(&mut open(bytes), "payload.bin"), payload);
    }
}

#[tokio::test]
async fn nested_folders_become_paths() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store
        .add_file(ROOT_ID, "a", "top.txt", "top")
        .add_folder(ROOT_ID, "y", "2024")
        .add_folder("y", "m", "june")
        .add_file("m", "b", "beach.jpg", "sand")
        .add_file("y", "c", "index.txt", "idx");
    let bytes = body_bytes(
        pipeline(&store, config(TransportStrategy::Stream), dir.path())
            .run(folder())
            .await
            .unwrap(),
    )
    .await
    .unwrap();
    let mut archive = open(bytes);
    assert_eq!(
        names(&mut archive),
        ["top.txt", "2024/june/beach.jpg", "2024/index.txt"]
    );
    assert_eq!(read(&mut archive, "2024/june/beach.jpg"), b"sand");
}

#[tokio::test]
async fn empty_folder_fails_before_fetching() {
    for transport in BOTH {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.add_folder(ROOT_ID, "empty", "empty");
        let err = pipeline(&store, config(transport), dir.path())
            .run(ListingRequest::Folder {
                root_id: "empty".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::NoFiles));
        assert_eq!(err.status_code(), StatusCode::NotFound);
        assert!(dir_is_empty(dir.path()));
    }
}

#[tokio::test]
async fn explicit_ids_skip_unknown_ones() {
    let dir = tempfile::tempdir().unwrap();
    let store = five_files_third_broken();
    let delivery = pipeline(&store, config(TransportStrategy::TempFile), dir.path())
        .run(ListingRequest::for_folder(ROOT_ID, Some("f5,missing,f1")))
        .await
        .unwrap();
    let mut archive = open(body_bytes(delivery).await.unwrap());
    assert_eq!(names(&mut archive), ["file5.txt", "file1.txt"]);
}

#[tokio::test]
async fn deadline_before_commit_is_408_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store
        .add_file(ROOT_ID, "a", "a.txt", "a")
        .add_file(ROOT_ID, "slow", "slow.txt", "s")
        .set_fault("slow", Fault::Delay(Duration::from_secs(30)));
    let config = PipelineConfig {
        deadline: Duration::from_millis(300),
        per_file_timeout: Duration::from_secs(60),
        ..config(TransportStrategy::TempFile)
    };
    let err = pipeline(&store, config, dir.path())
        .run(folder())
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::TimedOut { .. }));
    assert_eq!(err.status_code().http_status().as_u16(), 408);
    assert!(dir_is_empty(dir.path()));
}

#[tokio::test]
async fn deadline_after_commit_aborts_the_body() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store
        .add_file(ROOT_ID, "a", "a.txt", "a")
        .add_file(ROOT_ID, "slow", "slow.txt", "s")
        .set_fault("slow", Fault::Delay(Duration::from_secs(30)));
    let config = PipelineConfig {
        deadline: Duration::from_millis(300),
        per_file_timeout: Duration::from_secs(60),
        ..config(TransportStrategy::Stream)
    };
    let delivery = pipeline(&store, config, dir.path()).run(folder()).await.unwrap();
    let state = delivery.state.clone();
    let err = body_bytes(delivery).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    assert_eq!(*state.borrow(), JobState::TimedOut);
}

#[tokio::test]
async fn client_disconnect_cancels_streaming_job() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store
        .add_file(ROOT_ID, "slow", "slow.txt", "s")
        .set_fault("slow", Fault::Delay(Duration::from_secs(30)));
    let mut delivery = pipeline(&store, config(TransportStrategy::Stream), dir.path())
        .run(folder())
        .await
        .unwrap();
    drop(std::mem::replace(&mut delivery.body, futures::stream::empty().boxed()));
    assert_eq!(final_state(&delivery).await, JobState::Cancelled);
}

#[tokio::test]
async fn client_disconnect_while_serving_temp_file_deletes_it() {
    let dir = tempfile::tempdir().unwrap();
    let store = five_files_third_broken();
    let mut delivery = pipeline(&store, config(TransportStrategy::TempFile), dir.path())
        .run(folder())
        .await
        .unwrap();
    assert!(!dir_is_empty(dir.path()));
    let first = delivery.body.next().await.unwrap().unwrap();
    assert!(first.starts_with(b"PK"));
    drop(std::mem::replace(&mut delivery.body, futures::stream::empty().boxed()));
    assert_eq!(final_state(&delivery).await, JobState::Cancelled);
    assert!(dir_is_empty(dir.path()));
}

#[tokio::test]
async fn broken_stream_midway_skips_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store
        .add_file(ROOT_ID, "a", "a.bin", vec![1u8; 10_000])
        .add_file(ROOT_ID, "b", "b.bin", vec![2u8; 10_000])
        .add_file(ROOT_ID, "c", "c.bin", "third")
        .set_fault("a", Fault::MidStream)
        .set_fault("c", Fault::FirstAttempts(1));
    let delivery = pipeline(&store, config(TransportStrategy::Stream), dir.path())
        .run(folder())
        .await
        .unwrap();
    let progress = delivery.progress.clone();
    let mut archive = open(body_bytes(delivery).await.unwrap());
    assert_eq!(names(&mut archive), ["b.bin", "c.bin"]);
    assert_eq!(read(&mut archive, "b.bin"), vec![2u8; 10_000]);
    assert_eq!(progress.skipped(), 1);
}

#[tokio::test]
async fn large_entries_spill_and_survive() {
    let dir = tempfile::tempdir().unwrap();
    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let store = Arc::new(MemoryStore::new());
    store.add_file(ROOT_ID, "big", "big.bin", content.clone());
    let config = PipelineConfig {
        spool_threshold: ReadableSize::kb(16),
        ..config(TransportStrategy::Stream)
    };
    let delivery = pipeline(&store, config, dir.path()).run(folder()).await.unwrap();
    let mut archive = open(body_bytes(delivery).await.unwrap());
    assert_eq!(read(&mut archive, "big.bin"), content);
}

#[tokio::test]
async fn jobs_above_store_threshold_are_uncompressed() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    for i in 0..3 {
        store.add_file(ROOT_ID, &format!("f{i}"), &format!("{i}.txt"), "aaaaaaaaaaaaaaaa");
    }
    let config = PipelineConfig {
        compression: Compression::Balanced,
        store_threshold: 2,
        ..config(TransportStrategy::Stream)
    };
    let delivery = pipeline(&store, config, dir.path()).run(folder()).await.unwrap();
    let mut archive = open(body_bytes(delivery).await.unwrap());
    for i in 0..archive.len() {
        assert_eq!(archive.by_index(i).unwrap().compression(), CompressionMethod::Stored);
    }
}

/// Every entry in directory order, repeated names included. `ZipArchive`
/// indexes by name and would fold those together.
fn extract_all(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let le16 = |at: usize| usize::from(u16::from_le_bytes([bytes[at], bytes[at + 1]]));
    let le32 = |at: usize| u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap()) as usize;
    let end = bytes.len() - 22;
    let mut cursor = le32(end + 16);
    let mut out = Vec::new();
    for _ in 0..le16(end + 10) {
        let name_len = le16(cursor + 28);
        let name = String::from_utf8(bytes[cursor + 46..cursor + 46 + name_len].to_vec()).unwrap();
        let local = le32(cursor + 42);
        let data = local + 30 + le16(local + 26) + le16(local + 28);
        let raw = &bytes[data..data + le32(cursor + 20)];
        let content = if le16(cursor + 10) == 8 {
            let mut inflated = Vec::new();
            flate2::read::DeflateDecoder::new(raw).read_to_end(&mut inflated).unwrap();
            inflated
        } else {
            raw.to_vec()
        };
        out.push((name, content));
        cursor += 46 + name_len + le16(cursor + 30) + le16(cursor + 32);
    }
    out
}

#[tokio::test]
async fn duplicate_paths_are_all_archived() {
    for transport in BOTH {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store
            .add_file(ROOT_ID, "a", "same.txt", "first")
            .add_file(ROOT_ID, "b", "same.txt", "second");
        let delivery = pipeline(&store, config(transport), dir.path())
            .run(folder())
            .await
            .unwrap();
        let progress = delivery.progress.clone();
        let bytes = body_bytes(delivery).await.unwrap();
        assert_eq!(
            extract_all(&bytes),
            [
                ("same.txt".to_string(), b"first".to_vec()),
                ("same.txt".to_string(), b"second".to_vec())
            ],
            "{transport}"
        );
        assert_eq!(progress.processed(), 2);
        assert_eq!(progress.skipped(), 0);
    }
}

#[tokio::test]
async fn parts_split_the_listing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    for i in 0..7 {
        store.add_file(ROOT_ID, &format!("f{i}"), &format!("{i}.txt"), "x");
    }
    let pipeline = pipeline(&store, config(TransportStrategy::Stream), dir.path());

    let last = pipeline.run_part(folder(), 3, 3).await.unwrap();
    assert_eq!(last.filename, "folder-part-3-of-3.zip");
    let mut archive = open(body_bytes(last).await.unwrap());
    assert_eq!(names(&mut archive), ["6.txt"]);

    let err = pipeline.run_part(folder(), 4, 3).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvalidArgument);
}

#[tokio::test]
async fn resolving_twice_gives_the_same_listing() {
    let dir = tempfile::tempdir().unwrap();
    let store = five_files_third_broken();
    let pipeline = pipeline(&store, config(TransportStrategy::Stream), dir.path());
    let first = pipeline.resolve(&folder()).await.unwrap();
    let second = pipeline.resolve(&folder()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 5);
}
