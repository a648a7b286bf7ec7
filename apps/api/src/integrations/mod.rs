pub mod dedup;
pub mod mailer;
pub mod messaging;
pub mod payments;
pub mod storage;
pub mod store;

use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for outbound provider calls. Every request is bounded by
/// `timeout`; connecting gets at most ten seconds of it.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(CONNECT_TIMEOUT))
        .build()
}
