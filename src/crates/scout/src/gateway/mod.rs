//! HTTP capability gateway
//!
//! Every capability the stages need is served by one HTTP gateway. This
//! module maps HTTP outcomes onto the capability error taxonomy:
//!
//! | response                     | error                           |
//! |------------------------------|---------------------------------|
//! | 429                          | `RateLimited` (pauses the job)  |
//! | 5xx, timeout, connect error  | `Transient` (retried w/ backoff)|
//! | 401 / 403                    | `Unavailable`                   |
//! | other 4xx, undecodable body  | `InvalidResponse`               |

pub mod http;

pub use http::HttpGateway;

use chrono::{DateTime, Duration, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use scout_core::{CapabilityError, RateLimitSignal};

const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
const RETRY_AFTER: &str = "retry-after";

/// Longest pause a provider can impose on a job
pub const MAX_RATE_LIMIT_PAUSE_SECS: i64 = 7 * 24 * 60 * 60;

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()
}

/// `now + secs`, with `secs` clamped to `[0, MAX_RATE_LIMIT_PAUSE_SECS]`
fn pause_until(now: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    let secs = secs.clamp(0, MAX_RATE_LIMIT_PAUSE_SECS);
    Duration::try_seconds(secs)
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(now)
}

/// When a throttled provider will accept calls again.
///
/// `X-RateLimit-Reset` is an epoch in seconds, `Retry-After` a delay in
/// seconds. Without either the pause lasts `default_pause`. Every pause is
/// capped at [`MAX_RATE_LIMIT_PAUSE_SECS`].
pub fn rate_limit_reset(headers: &HeaderMap, now: DateTime<Utc>, default_pause: Duration) -> DateTime<Utc> {
    let latest = pause_until(now, MAX_RATE_LIMIT_PAUSE_SECS);
    if let Some(reset) = header_i64(headers, RATE_LIMIT_RESET).and_then(|secs| DateTime::from_timestamp(secs, 0)) {
        return reset.clamp(now, latest);
    }
    if let Some(delay) = header_i64(headers, RETRY_AFTER).filter(|secs| *secs >= 0) {
        return pause_until(now, delay);
    }
    pause_until(now, default_pause.num_seconds())
}

/// Map a non-success response onto a capability error
pub fn classify_status(
    capability: &str,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
    default_pause: Duration,
) -> CapabilityError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, truncate(body, 300))
    };

    if status == StatusCode::TOO_MANY_REQUESTS {
        let reset_at = rate_limit_reset(headers, now, default_pause);
        return CapabilityError::RateLimited(RateLimitSignal::new(capability, reset_at, detail));
    }
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        return CapabilityError::Transient(format!("{} returned {}", capability, detail));
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return CapabilityError::Unavailable(format!("{} rejected credentials ({})", capability, detail));
    }
    CapabilityError::InvalidResponse(format!("{} returned {}", capability, detail))
}

/// Map a transport failure onto a capability error
pub fn classify_transport(capability: &str, err: &reqwest::Error) -> CapabilityError {
    if err.is_decode() {
        CapabilityError::InvalidResponse(format!("{} sent an undecodable body: {}", capability, err))
    } else if err.is_builder() {
        CapabilityError::Unavailable(format!("{} request could not be built: {}", capability, err))
    } else {
        CapabilityError::Transient(format!("{} request failed: {}", capability, err))
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
