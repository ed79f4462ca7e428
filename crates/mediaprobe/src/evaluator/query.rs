//! Parsing of free-text test queries.

use crate::result::{ProbeError, ProbeResult};
use std::str::FromStr;

/// Seek request: absolute seconds or a signed delta in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekQuery {
    /// Seek to this many seconds from the start
    Absolute {
        /// Seconds
        seconds: u64,
    },
    /// Seek relative to the starting position
    Relative {
        /// Signed seconds
        delta_seconds: i64,
    },
}

impl SeekQuery {
    /// Target position in milliseconds, clamped at zero
    #[must_use]
    pub fn target_ms(self, start_ms: u64) -> u64 {
        match self {
            Self::Absolute { seconds } => seconds.saturating_mul(1000),
            Self::Relative { delta_seconds } => {
                let delta_ms = delta_seconds.saturating_mul(1000);
                if delta_ms >= 0 {
                    start_ms.saturating_add(delta_ms.unsigned_abs())
                } else {
                    start_ms.saturating_sub(delta_ms.unsigned_abs())
                }
            }
        }
    }
}

impl FromStr for SeekQuery {
    type Err = ProbeError;

    fn from_str(query: &str) -> Result<Self, Self::Err> {
        let query = query.trim();
        let (sign, digits) = match query.as_bytes().first() {
            Some(b'+') => (Some(1_i64), &query[1..]),
            Some(b'-') => (Some(-1_i64), &query[1..]),
            _ => (None, query),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProbeError::invalid_argument(format!(
                "seek query {query:?} is not seconds or +/- seconds"
            )));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| ProbeError::invalid_argument(format!("seek query {query:?} is out of range")))?;

        match sign {
            None => Ok(Self::Absolute { seconds: value }),
            Some(sign) => {
                let magnitude = i64::try_from(value).map_err(|_| {
                    ProbeError::invalid_argument(format!("seek query {query:?} is out of range"))
                })?;
                Ok(Self::Relative {
                    delta_seconds: sign * magnitude,
                })
            }
        }
    }
}

/// Parse a seek query
pub fn parse_seek_query(query: &str) -> ProbeResult<SeekQuery> {
    query.parse()
}

/// Parse a queue item id
pub fn parse_queue_item_id(query: &str) -> ProbeResult<i64> {
    let query = query.trim();
    query
        .parse()
        .map_err(|_| ProbeError::invalid_argument(format!("queue item id {query:?} is not a number")))
}

/// Reject an empty query
pub fn require_query<'a>(query: &'a str, what: &str) -> ProbeResult<&'a str> {
    let query = query.trim();
    if query.is_empty() {
        Err(ProbeError::invalid_argument(format!("{what} is required")))
    } else {
        Ok(query)
    }
}
