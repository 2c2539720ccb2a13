//! Rate-limit detector: scans lines from a subprocess's stderr for a fixed
//! set of provider rate-limit signatures. Detection is monotonic — once
//! set, `detected` and `resets_at` are never unset or overwritten.

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::{Mutex, OnceLock};

const PATTERNS: &[&str] = &[
    "usage_limit_reached",
    "rate_limit_error",
    "overloaded_error",
    "resource_exhausted",
    "too many requests",
    "rate limit",
    "429",
    "out of messages",
];

fn resets_at_json_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""resets_at"\s*:\s*(\d+)"#).unwrap())
}

fn resets_at_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)resets on (\d{1,2}) (\w{3}) (\d{4})").unwrap()
    })
}

fn retry_after_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)retry-after:\s*(\d+)").unwrap())
}

#[derive(Debug, Default)]
struct State {
    detected: bool,
    resets_at: Option<DateTime<Utc>>,
}

/// Stateful, thread-safe detector fed one line of subprocess output at a
/// time. Safe to share across the reader task and the caller that later
/// inspects the result.
#[derive(Debug, Default)]
pub struct RateLimitDetector {
    state: Mutex<State>,
}

impl RateLimitDetector {
    pub fn new() -> Self {
        RateLimitDetector::default()
    }

    /// Scan one line. Returns `true` the first time detection fires (so the
    /// caller can invoke a cancel callback exactly once).
    pub fn scan_line(&self, line: &str) -> bool {
        let lowered = line.to_lowercase();
        let matched = PATTERNS.iter().any(|p| lowered.contains(p));
        if !matched {
            return false;
        }

        let mut state = self.state.lock().unwrap();
        let newly_detected = !state.detected;
        state.detected = true;
        if state.resets_at.is_none() {
            state.resets_at = parse_resets_at(line);
        }
        newly_detected
    }

    pub fn detected(&self) -> bool {
        self.state.lock().unwrap().detected
    }

    pub fn resets_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().unwrap().resets_at
    }
}

fn parse_resets_at(line: &str) -> Option<DateTime<Utc>> {
    if let Some(caps) = resets_at_json_re().captures(line) {
        if let Ok(secs) = caps[1].parse::<i64>() {
            return Utc.timestamp_opt(secs, 0).single();
        }
    }
    if let Some(caps) = resets_at_phrase_re().captures(line) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_from_abbrev(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        return Utc
            .with_ymd_and_hms(year, month, day, 0, 0, 0)
            .single();
    }
    if let Some(caps) = retry_after_re().captures(line) {
        if let Ok(secs) = caps[1].parse::<i64>() {
            return Some(Utc::now() + chrono::Duration::seconds(secs));
        }
    }
    None
}

fn month_from_abbrev(s: &str) -> Option<u32> {
    let months = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lowered = s.to_lowercase();
    months
        .iter()
        .position(|m| *m == lowered)
        .map(|i| i as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_pattern_case_insensitively() {
        let d = RateLimitDetector::new();
        assert!(d.scan_line("Error: USAGE_LIMIT_REACHED for this key"));
        assert!(d.detected());
    }

    #[test]
    fn ignores_unrelated_lines() {
        let d = RateLimitDetector::new();
        assert!(!d.scan_line("just a normal status update"));
        assert!(!d.detected());
    }

    #[test]
    fn detection_is_monotonic_and_fires_once() {
        let d = RateLimitDetector::new();
        assert!(d.scan_line("rate limit exceeded"));
        assert!(!d.scan_line("rate limit exceeded again"));
        assert!(d.detected());
    }

    #[test]
    fn parses_resets_at_from_json_field() {
        let d = RateLimitDetector::new();
        d.scan_line(r#"{"error":"usage_limit_reached","resets_at":1750000000}"#);
        assert_eq!(
            d.resets_at(),
            Some(Utc.timestamp_opt(1_750_000_000, 0).unwrap())
        );
    }

    #[test]
    fn first_resets_at_wins() {
        let d = RateLimitDetector::new();
        d.scan_line(r#"{"resets_at":1000}"#);
        d.scan_line(r#"rate limit again {"resets_at":2000}"#);
        assert_eq!(d.resets_at(), Utc.timestamp_opt(1000, 0).single());
    }

    #[test]
    fn parses_retry_after_seconds() {
        let d = RateLimitDetector::new();
        let before = Utc::now();
        d.scan_line("429 too many requests, Retry-After: 30");
        let resets = d.resets_at().unwrap();
        assert!(resets >= before + chrono::Duration::seconds(29));
    }
}
