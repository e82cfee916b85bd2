use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// The only process-wide mutable state in the gateway: plain atomics,
/// no locks, created once at startup and shared behind an `Arc`.
pub struct MetricsService {
    started_at: Instant,
    requests_total: AtomicU64,
    requests_failed: AtomicU64,
    files_ingested_total: AtomicU64,
    chunks_embedded_total: AtomicU64,
    bytes_in_use: AtomicU64,
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsService {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests_total: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            files_ingested_total: AtomicU64::new(0),
            chunks_embedded_total: AtomicU64::new(0),
            bytes_in_use: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_ingested(&self) {
        self.files_ingested_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunks_embedded(&self, n: u64) {
        self.chunks_embedded_total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_bytes_in_use(&self, bytes: u64) {
        self.bytes_in_use.store(bytes, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Render as Prometheus text exposition format for `/api/v1/metrics`.
    pub fn render_prometheus(&self) -> String {
        format!(
            "# HELP rag_gateway_requests_total Total completion requests received.\n\
             # TYPE rag_gateway_requests_total counter\n\
             rag_gateway_requests_total {}\n\
             # HELP rag_gateway_requests_failed_total Completion requests that ended in an error response.\n\
             # TYPE rag_gateway_requests_failed_total counter\n\
             rag_gateway_requests_failed_total {}\n\
             # HELP rag_gateway_files_ingested_total Files successfully ingested.\n\
             # TYPE rag_gateway_files_ingested_total counter\n\
             rag_gateway_files_ingested_total {}\n\
             # HELP rag_gateway_chunks_embedded_total Chunks embedded and stored as vectors.\n\
             # TYPE rag_gateway_chunks_embedded_total counter\n\
             rag_gateway_chunks_embedded_total {}\n\
             # HELP rag_gateway_bytes_in_use Approximate resident memory in bytes.\n\
             # TYPE rag_gateway_bytes_in_use gauge\n\
             rag_gateway_bytes_in_use {}\n\
             # HELP rag_gateway_uptime_seconds Seconds since process start.\n\
             # TYPE rag_gateway_uptime_seconds counter\n\
             rag_gateway_uptime_seconds {}\n",
            self.requests_total.load(Ordering::Relaxed),
            self.requests_failed.load(Ordering::Relaxed),
            self.files_ingested_total.load(Ordering::Relaxed),
            self.chunks_embedded_total.load(Ordering::Relaxed),
            self.bytes_in_use.load(Ordering::Relaxed),
            self.uptime_seconds(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_monotonic() {
        let m = MetricsService::new();
        m.record_request();
        m.record_request();
        m.record_request_failed();
        let text = m.render_prometheus();
        assert!(text.contains("rag_gateway_requests_total 2"));
        assert!(text.contains("rag_gateway_requests_failed_total 1"));
    }
}
