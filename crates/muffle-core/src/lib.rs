//! muffle-core: the sink interception and aggregation engine.
//!
//! Lets test code silence (`mute`) or observe (`capture`) output flowing
//! through callable sink members without losing the ability to inspect,
//! replay or discard what was written — and without permanently mutating
//! the sink. A caller-owned [`SinkRegistry`] hands out one
//! [`Interceptor`] singleton per sink identity; an
//! [`AggregateInterceptor`] composes several of them into one unit with a
//! globally ordered merged log and cross-constituent consistency checks.

pub mod aggregate;
pub mod error;
pub mod format;
pub mod host;
pub mod interceptor;
pub mod record;
pub mod registry;

pub use aggregate::{AggregateInterceptor, SinkSpec};
pub use error::MuffleError;
pub use host::{InstallHandle, SinkFn, SinkHost, SinkId, SinkKind, install};
pub use interceptor::{InterceptState, Interceptor, ListenerFn, ListenerId};
pub use record::{CallRecord, RenderFn};
pub use registry::{InterceptOptions, SinkRegistry};

pub use colored::Color;
