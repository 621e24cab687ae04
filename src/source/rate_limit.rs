use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

pub const MAX_RETRIES: u32 = 3;
const BACKOFF_SECONDS: &[u64] = &[10, 30, 60];

/// Seconds to wait before retry number `attempt` (0-based).
/// GitLab's `Retry-After` header wins when present and numeric.
pub fn backoff_seconds(attempt: u32, headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or_else(|| {
            BACKOFF_SECONDS
                .get(attempt as usize)
                .copied()
                .unwrap_or(60)
        })
}

/// Sleep before retrying a 429 response.
pub async fn backoff_sleep(attempt: u32, headers: &HeaderMap) {
    let wait = backoff_seconds(attempt, headers);
    log::warn!(
        "Rate limited (429). Waiting {wait}s before retry {}/{}",
        attempt + 1,
        MAX_RETRIES
    );
    tokio::time::sleep(Duration::from_secs(wait)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_backoff_defaults() {
        let headers = HeaderMap::new();
        assert_eq!(backoff_seconds(0, &headers), 10);
        assert_eq!(backoff_seconds(2, &headers), 60);
        assert_eq!(backoff_seconds(9, &headers), 60);
    }

    #[test]
    fn test_backoff_honours_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(backoff_seconds(0, &headers), 7);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(backoff_seconds(1, &headers), 30);
    }
}
