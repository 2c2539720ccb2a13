//! Stream decorators layered over a runner adapter's subprocess I/O:
//! rate-limit and connectivity detection on stderr, an idle-output monitor
//! on stdout, and a stateless secret-redaction pass applied to any text
//! the engine surfaces in logs or results.

pub mod connectivity;
pub mod idle;
pub mod rate_limit;
pub mod redact;

pub use connectivity::ConnectivityDetector;
pub use idle::IdleMonitor;
pub use rate_limit::RateLimitDetector;
pub use redact::redact;
