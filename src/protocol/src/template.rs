//! Chaincode argument templates
//!
//! Configured arguments may request fresh random data for every proposal:
//!
//! - `uuid` expands to a random UUID
//! - `randomString<N>` expands to N alphanumeric characters (N omitted: 2..=16,
//!   N at most 65536)
//! - `randomNumber<MIN>_<MAX>` expands to an integer in `[MIN, MAX)`
//!
//! Anything else is passed through verbatim. Templates are parsed once, when
//! the run is configured, and expanded per proposal.

use crate::error::{ProtocolError, Result};
use crate::random::RandomSource;
use std::fmt;

const UUID: &str = "uuid";
const RANDOM_STRING: &str = "randomString";
const RANDOM_NUMBER: &str = "randomNumber";

/// Length bounds used when `randomString` carries no explicit length
pub const MIN_RANDOM_LEN: usize = 2;
pub const MAX_RANDOM_LEN: usize = 16;

/// Upper bound on an explicit `randomString<N>` length
pub const MAX_EXPLICIT_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgTemplate {
    Literal(String),
    Uuid,
    RandomString(Option<usize>),
    /// Half-open range, already clamped so that `0 <= min < max`
    RandomNumber { min: i64, max: i64 },
}

impl ArgTemplate {
    pub fn parse(arg: &str) -> Result<Self> {
        if arg == UUID {
            return Ok(ArgTemplate::Uuid);
        }

        if let Some(len) = arg.strip_prefix(RANDOM_STRING) {
            if len.is_empty() {
                return Ok(ArgTemplate::RandomString(None));
            }
            if !len.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ProtocolError::argument(arg, "length must be a non-negative integer"));
            }
            let len = len
                .parse::<usize>()
                .map_err(|e| ProtocolError::argument(arg, e.to_string()))?;
            if len > MAX_EXPLICIT_LEN {
                return Err(ProtocolError::argument(
                    arg,
                    format!("length exceeds {}", MAX_EXPLICIT_LEN),
                ));
            }
            return Ok(ArgTemplate::RandomString(Some(len)));
        }

        if let Some(range) = arg.strip_prefix(RANDOM_NUMBER) {
            let (min, max) = range
                .split_once('_')
                .ok_or_else(|| ProtocolError::argument(arg, "expected <MIN>_<MAX>"))?;

            let min = parse_bound(arg, min)?.map_or(0, |v| v.max(0));
            let max = parse_bound(arg, max)?.map_or(1, |v| v.max(1));
            if min >= max {
                return Err(ProtocolError::argument(
                    arg,
                    format!("empty range [{}, {}) after clamping", min, max),
                ));
            }
            return Ok(ArgTemplate::RandomNumber { min, max });
        }

        Ok(ArgTemplate::Literal(arg.to_string()))
    }

    /// Parse a whole argument list, failing on the first bad template
    pub fn parse_all<S: AsRef<str>>(args: &[S]) -> Result<Vec<Self>> {
        args.iter().map(|a| Self::parse(a.as_ref())).collect()
    }

    pub fn expand(&self, rng: &RandomSource) -> String {
        match self {
            ArgTemplate::Literal(value) => value.clone(),
            ArgTemplate::Uuid => rng.uuid().to_string(),
            ArgTemplate::RandomString(Some(len)) => rng.alphanumeric(*len),
            ArgTemplate::RandomString(None) => {
                let len = rng.usize_inclusive(MIN_RANDOM_LEN, MAX_RANDOM_LEN);
                rng.alphanumeric(len)
            }
            ArgTemplate::RandomNumber { min, max } => rng.i64_in(*min, *max).to_string(),
        }
    }
}

fn parse_bound(arg: &str, bound: &str) -> Result<Option<i64>> {
    if bound.is_empty() {
        return Ok(None);
    }
    bound
        .parse::<i64>()
        .map(Some)
        .map_err(|e| ProtocolError::argument(arg, format!("bound '{}': {}", bound, e)))
}

impl fmt::Display for ArgTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgTemplate::Literal(value) => f.write_str(value),
            ArgTemplate::Uuid => f.write_str(UUID),
            ArgTemplate::RandomString(Some(len)) => write!(f, "{}{}", RANDOM_STRING, len),
            ArgTemplate::RandomString(None) => f.write_str(RANDOM_STRING),
            ArgTemplate::RandomNumber { min, max } => write!(f, "{}{}_{}", RANDOM_NUMBER, min, max),
        }
    }
}
