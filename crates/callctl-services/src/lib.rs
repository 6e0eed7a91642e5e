//! Call handling services for callctl
//!
//! This crate contains the call handler that drives every call through its
//! lifecycle, reacting to signaling events and workflow requests.
//!
//! # Architecture
//!
//! The handler is a cheap-to-clone value over shared collaborators:
//! - Every collaborator is an `Arc<dyn Trait>` from `callctl_core::traits`
//! - The persisted hold flag is the only mutual exclusion between advancements
//! - Cascades (chained hangups) run as detached tasks on a task tracker
//! - Timers are delegated to the request scheduler
//!
//! # Components
//!
//! - `CallHandler` - Action dispatcher, hangup coordinator, status transitions,
//!   digit collector, health supervisor and outbound call builder
//! - `CallMetrics` - Prometheus-backed `MetricsSink` implementation
//! - `SignalingEvent` - Events delivered by the channel adapter

pub mod callhandler;
pub mod telemetry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use callhandler::events::SignalingEvent;
pub use callhandler::outgoing::OutgoingCall;
pub use callhandler::{CallHandler, CallHandlerDeps};
pub use telemetry::CallMetrics;

/// Call handling constants
pub mod constants {
    /// Dialplan context of the echo service
    pub const CONTEXT_ECHO: &str = "svc-echo";

    /// Dialplan context of the stream echo service
    pub const CONTEXT_STREAM_ECHO: &str = "svc-stream_echo";

    /// Dialplan context returning a channel to the control application
    pub const CONTEXT_STASIS: &str = "svc-stasis";

    /// Dialplan context running answering machine detection on a snoop channel
    pub const CONTEXT_AMD: &str = "svc-amd";

    /// Stasis context of answering machine detection snoop channels
    pub const CONTEXT_CALL_AMD: &str = "call-amd";

    /// Default extension and priority for context jumps
    pub const DEFAULT_EXTEN: &str = "s";
    pub const DEFAULT_PRIORITY: i32 = 1;

    /// Media played by the beep action
    pub const MEDIA_BEEP: &str = "sound:beep";

    /// Outbound pjsip endpoints
    pub const PJSIP_ENDPOINT_OUTGOING: &str = "call-out";
    pub const PJSIP_ENDPOINT_OUTGOING_DIRECT: &str = "call-out-direct-";

    /// Transport used towards providers
    pub const PROVIDER_TRANSPORT: &str = "udp";

    /// Reference type of call bridges
    pub const BRIDGE_REFERENCE_TYPE_CALL: &str = "call";

    /// Default tone length for DTMF sending in milliseconds
    pub const DTMF_DEFAULT_DURATION_MS: i64 = 100;
}
