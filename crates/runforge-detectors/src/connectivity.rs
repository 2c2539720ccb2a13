//! Connectivity detector: layered above the rate-limit detector on the
//! same stderr stream, matching transport-level failure signatures.

use std::sync::Mutex;

const PATTERNS: &[(&str, &str)] = &[
    ("ssl certificate problem", "TLS certificate expired"),
    ("certificate has expired", "TLS certificate expired"),
    ("connection refused", "connection refused"),
    ("dns resolution failed", "DNS resolution failed"),
    ("could not resolve host", "DNS resolution failed"),
    ("error sending request", "request failed"),
    ("tls handshake timeout", "TLS handshake timeout"),
];

#[derive(Debug, Default)]
struct State {
    detected: bool,
    reason: Option<String>,
}

#[derive(Debug, Default)]
pub struct ConnectivityDetector {
    state: Mutex<State>,
}

impl ConnectivityDetector {
    pub fn new() -> Self {
        ConnectivityDetector::default()
    }

    /// Returns `true` the first time detection fires.
    pub fn scan_line(&self, line: &str) -> bool {
        let lowered = line.to_lowercase();
        let hit = PATTERNS.iter().find(|(pat, _)| lowered.contains(pat));
        let Some((_, reason)) = hit else {
            return false;
        };

        let mut state = self.state.lock().unwrap();
        let newly_detected = !state.detected;
        state.detected = true;
        if state.reason.is_none() {
            state.reason = Some(reason.to_string());
        }
        newly_detected
    }

    pub fn detected(&self) -> bool {
        self.state.lock().unwrap().detected
    }

    pub fn reason(&self) -> Option<String> {
        self.state.lock().unwrap().reason.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_connection_refused() {
        let d = ConnectivityDetector::new();
        assert!(d.scan_line("Error: connection refused (os error 111)"));
        assert_eq!(d.reason().as_deref(), Some("connection refused"));
    }

    #[test]
    fn detects_dns_failure_variants() {
        let d1 = ConnectivityDetector::new();
        assert!(d1.scan_line("could not resolve host: api.example.com"));
        let d2 = ConnectivityDetector::new();
        assert!(d2.scan_line("DNS resolution failed for host"));
    }

    #[test]
    fn fires_only_once() {
        let d = ConnectivityDetector::new();
        assert!(d.scan_line("connection refused"));
        assert!(!d.scan_line("connection refused"));
    }

    #[test]
    fn ignores_unrelated_output() {
        let d = ConnectivityDetector::new();
        assert!(!d.scan_line("task completed successfully"));
        assert!(!d.detected());
    }
}
