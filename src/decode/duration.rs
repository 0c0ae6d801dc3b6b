//! Duration strings with day and week units.
//!
//! Accepts one or more `<number><unit>` terms written back to back, e.g.
//! `1w`, `4d3h2m1s`, `1.5h`, `250ms`. Units: `ns`, `us`/`µs`, `ms`, `s`,
//! `m`, `h`, `d` (24h), `w` (7d). A bare `0` is zero. Signs are rejected
//! because `std::time::Duration` cannot be negative.

use regex_lite::Regex;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

static TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|ms|s|m|h|d|w)").expect("duration term regex")
});

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Why a duration string was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationError {
    input: String,
    reason: &'static str,
}

impl fmt::Display for DurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid duration {:?}: {}", self.input, self.reason)
    }
}

impl std::error::Error for DurationError {}

fn unit_nanos(unit: &str) -> Option<u128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "h" => 3_600 * NANOS_PER_SEC,
        "d" => 86_400 * NANOS_PER_SEC,
        "w" => 604_800 * NANOS_PER_SEC,
        _ => return None,
    };
    Some(nanos)
}

/// Parse a duration string.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let err = |reason| DurationError {
        input: input.to_string(),
        reason,
    };

    let s = input.trim();
    if s.is_empty() {
        return Err(err("empty string"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total: u128 = 0;
    let mut expected_start = 0;
    for caps in TERM.captures_iter(s) {
        let whole = caps.get(0).ok_or_else(|| err("malformed term"))?;
        if whole.start() != expected_start {
            return Err(err("unexpected characters"));
        }
        expected_start = whole.end();

        let number = &caps[1];
        let unit = unit_nanos(&caps[2]).ok_or_else(|| err("unknown unit"))?;
        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));

        let int_value: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| err("number out of range"))?
        };
        let mut term = int_value
            .checked_mul(unit)
            .ok_or_else(|| err("number out of range"))?;

        if !frac_part.is_empty() {
            let digits = frac_part.len().min(18) as u32;
            let frac_value: u128 = frac_part[..digits as usize]
                .parse()
                .map_err(|_| err("malformed fraction"))?;
            term = term
                .checked_add(frac_value * unit / 10u128.pow(digits))
                .ok_or_else(|| err("number out of range"))?;
        }

        total = total
            .checked_add(term)
            .ok_or_else(|| err("number out of range"))?;
    }

    if expected_start == 0 {
        return Err(err("missing unit"));
    }
    if expected_start != s.len() {
        return Err(err("unexpected characters"));
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| err("number out of range"))?;
    let nanos = (total % NANOS_PER_SEC) as u32;
    Ok(Duration::new(secs, nanos))
}
