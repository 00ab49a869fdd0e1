//! Error types for the interception engine.

use thiserror::Error;

use crate::host::SinkId;

#[derive(Debug, Error)]
pub enum MuffleError {
    /// `mute`/`capture` called while the interceptor is not idle.
    #[error("sink {sink} is already activated, call unmute/uncapture first")]
    AlreadyActivated { sink: SinkId },

    /// The same sink identity was listed twice when building an aggregate.
    #[error("sink {sink} appears more than once in the aggregate")]
    DuplicateSink { sink: SinkId },

    /// An aggregate query found its constituents disagreeing on a state
    /// property. Recoverable: reconcile the divergent constituent and retry.
    #[error("aggregate constituents disagree on {property}")]
    InconsistentState { property: &'static str },

    /// Flush found the interceptor neither muting nor capturing when
    /// re-installing its wrapper. Unreachable under correct usage.
    #[error("sink {sink} was neither muting nor capturing when re-arming after flush")]
    InvalidMode { sink: SinkId },

    /// The host has no slot with the requested member name.
    #[error("host {host} has no member named {member:?}")]
    UnknownMember { host: String, member: String },
}
