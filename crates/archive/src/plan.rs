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

//! Size estimates and multi-part splitting for large folders.

use serde::Serialize;

use crate::entry::FileEntry;

/// Entries whose sizes are looked at when estimating.
pub const ESTIMATE_SAMPLE: usize = 20;

/// Files per part of a multi-part download.
pub const DEFAULT_PART_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadEstimate {
    pub total_files:            usize,
    /// Extrapolated from a sample, not exact.
    pub total_size:             u64,
    pub recommended_batch_size: usize,
    pub estimated_batches:      usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiPartPlan {
    pub total_files:   usize,
    pub total_parts:   usize,
    pub chunk_size:    usize,
    pub download_urls: Vec<String>,
}

const fn recommended_batch_size(total_files: usize) -> usize {
    match total_files {
        0..=100 => 10,
        101..=500 => 5,
        _ => 2,
    }
}

/// Estimates the download from the sizes of up to `sample` entries spread
/// evenly over the listing.
#[must_use]
pub fn estimate(entries: &[FileEntry], sample: usize) -> DownloadEstimate {
    let total_files = entries.len();
    let step = total_files.div_ceil(sample.max(1)).max(1);
    let sizes: Vec<u64> = entries.iter().step_by(step).filter_map(|e| e.size).collect();
    let total_size = if sizes.is_empty() {
        0
    } else {
        let average = sizes.iter().sum::<u64>() / sizes.len() as u64;
        average.saturating_mul(total_files as u64)
    };
    let recommended_batch_size = recommended_batch_size(total_files);
    DownloadEstimate {
        total_files,
        total_size,
        recommended_batch_size,
        estimated_batches: total_files.div_ceil(recommended_batch_size),
    }
}

/// Splits a download of `total_files` into parts of `chunk_size` files,
/// each fetched from the part endpoint. A named `profile` is carried into
/// every part URL so the parts are built the same way.
#[must_use]
pub fn plan_parts(folder_id: &str, profile: Option<&str>, total_files: usize, chunk_size: usize) -> MultiPartPlan {
    let chunk_size = chunk_size.max(1);
    let total_parts = total_files.div_ceil(chunk_size).max(1);
    let folder = encode_query_value(folder_id);
    let profile = profile
        .map(|p| format!("&profile={}", encode_query_value(p)))
        .unwrap_or_default();
    let download_urls = (1..=total_parts)
        .map(|part| format!("/download-zip-part?folderId={folder}&part={part}&total={total_parts}{profile}"))
        .collect();
    MultiPartPlan {
        total_files,
        total_parts,
        chunk_size,
        download_urls,
    }
}

/// The entries of part `part` (1-based) when `entries` is cut into `total`
/// parts of equal size. The last parts may be short or empty.
#[must_use]
pub fn part_slice(entries: &[FileEntry], part: usize, total: usize) -> &[FileEntry] {
    if part == 0 || part > total {
        return &[];
    }
    let chunk = entries.len().div_ceil(total);
    let start = ((part - 1) * chunk).min(entries.len());
    let end = (start + chunk).min(entries.len());
    &entries[start..end]
}

#[must_use]
pub fn part_archive_name(part: usize, total: usize) -> String { format!("folder-part-{part}-of-{total}.zip") }

/// Percent-encodes everything outside the URL unreserved set.
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
