use reqwest::Client;
use std::time::Duration;

pub fn build_backend_client(timeout_secs: u64, connect_timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_timeout(Duration::from_secs(connect_timeout_secs.max(1)))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Download client: no overall timeout (artifacts can be large), but a read
/// timeout so a stalled transfer fails instead of hanging the cycle.
pub fn build_download_client(connect_timeout_secs: u64, read_timeout_secs: u64) -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs.max(1)))
        .read_timeout(Duration::from_secs(read_timeout_secs.max(1)))
        .build()
        .unwrap_or_else(|_| Client::new())
}
