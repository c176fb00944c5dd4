use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramVec, TextEncoder, register_counter_vec,
    register_gauge_vec, register_histogram_vec,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: CounterVec = register_counter_vec!(
        "podcast_proxy_requests_total",
        "Total number of API requests",
        &["endpoint"]
    )
    .unwrap();
    pub static ref RATE_LIMITED_TOTAL: CounterVec = register_counter_vec!(
        "podcast_proxy_rate_limited_total",
        "Requests rejected by a rate limiter",
        &["limiter"]
    )
    .unwrap();
    pub static ref UPSTREAM_ERRORS: CounterVec = register_counter_vec!(
        "podcast_proxy_upstream_errors_total",
        "Failed upstream calls",
        &["endpoint", "kind"]
    )
    .unwrap();
    pub static ref UPSTREAM_LATENCY: HistogramVec = register_histogram_vec!(
        "podcast_proxy_upstream_latency_seconds",
        "Upstream call latency in seconds",
        &["endpoint"]
    )
    .unwrap();
    pub static ref TRACKED_CLIENTS: GaugeVec = register_gauge_vec!(
        "podcast_proxy_rate_limit_clients",
        "Client windows currently tracked by a rate limiter",
        &["limiter"]
    )
    .unwrap();
}

// Render the default registry in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
