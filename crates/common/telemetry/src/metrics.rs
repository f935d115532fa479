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

use prometheus::{Encoder, TextEncoder};

/// Renders every metric in the default registry in the prometheus text format.
#[must_use]
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use prometheus::{IntCounter, register_int_counter};

    #[test]
    fn render_includes_registered_counters() {
        let counter: IntCounter =
            register_int_counter!("telemetry_render_probe_total", "probe counter").unwrap();
        counter.inc();
        let text = super::render();
        assert!(text.contains("telemetry_render_probe_total 1"));
    }
}
