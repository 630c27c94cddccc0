//! Tracing targets used across sockreq.
//!
//! sockreq uses the `tracing` crate for instrumentation. To see logs,
//! install a subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("sockreq=debug")
//!     .init();
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Signal/slot system target.
    pub const SIGNAL: &str = "sockreq_core::signal";
    /// Named event emitter target.
    pub const EMITTER: &str = "sockreq_core::emitter";
    /// Connection lifecycle and request emission target.
    pub const CONNECTION: &str = "sockreq::connection";
    /// Offline request queue target.
    pub const QUEUE: &str = "sockreq::queue";
    /// Connection registry target.
    pub const REGISTRY: &str = "sockreq::registry";
    /// Transport adapters target.
    pub const TRANSPORT: &str = "sockreq::transport";
}
