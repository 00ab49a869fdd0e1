//! muffle: silence or capture test output sinks without losing what was
//! written.
//!
//! ```
//! use muffle::{SinkHost, SinkRegistry};
//! use serde_json::json;
//!
//! let registry = SinkRegistry::new();
//! let console = SinkHost::console();
//! let log = registry.resolve(&console, "log").unwrap();
//!
//! log.mute().unwrap();
//! console.call("log", &[json!("Hello")]).unwrap();
//! console.call("log", &[json!("World!")]).unwrap();
//!
//! assert_eq!(log.get_logs(None).as_deref(), Some("Hello\nWorld!\n"));
//! log.unmute();
//! assert_eq!(log.get_logs(None), None);
//! ```
//!
//! The [`muted`] and [`captured`] helpers run a closure with guaranteed
//! teardown, including on panic.

pub mod scoped;

pub use muffle_core::format;
pub use muffle_core::{
    AggregateInterceptor, CallRecord, Color, InstallHandle, InterceptOptions, InterceptState,
    Interceptor, ListenerFn, ListenerId, MuffleError, RenderFn, SinkFn, SinkHost, SinkId, SinkKind,
    SinkRegistry, SinkSpec, install,
};

pub use scoped::{Silenceable, captured, muted};
