// src/config/duration.rs

use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const YEAR: u64 = 365 * DAY;

/// Parse a duration setting such as `"1800"`, `"250ms"`, `"30m"`, `"2h"`.
///
/// A bare number is read as seconds. Supported units: `ms`, `s`, `m`, `h`,
/// `d`, `y`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .unwrap_or(s.len());

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs = |mult: u64| {
        value
            .checked_mul(mult)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{}' is too large", s))
    };

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => secs(1),
        "m" => secs(MINUTE),
        "h" => secs(HOUR),
        "d" => secs(DAY),
        "y" => secs(YEAR),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, h, d, or y",
            unit
        )),
    }
}
