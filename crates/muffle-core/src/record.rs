//! Immutable records of intercepted calls.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::host::SinkFn;

/// Renders recorded arguments into text.
pub type RenderFn = Arc<dyn Fn(&[Value]) -> String + Send + Sync>;

/// One intercepted call, created at interception time and immutable after.
///
/// Carries everything needed to render or replay the call later without
/// consulting the interceptor again: the resolved render function, the
/// record separator, and the original (un-intercepted) callable.
#[derive(Clone)]
pub struct CallRecord {
    seq: u64,
    at: DateTime<Utc>,
    args: Vec<Value>,
    render: RenderFn,
    separator: String,
    replay: SinkFn,
}

impl CallRecord {
    pub(crate) fn new(
        seq: u64,
        at: DateTime<Utc>,
        args: Vec<Value>,
        render: RenderFn,
        separator: String,
        replay: SinkFn,
    ) -> Self {
        Self { seq, at, args, render, separator, replay }
    }

    /// Monotonic sequence number, totally ordered across all interceptors
    /// created by the same registry.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Wall-clock time of interception.
    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// The rendered arguments, without the trailing separator.
    pub fn rendered(&self) -> String {
        (self.render)(&self.args)
    }

    /// The rendered arguments followed by the record separator.
    pub fn text(&self) -> String {
        let mut text = self.rendered();
        text.push_str(&self.separator);
        text
    }

    /// Invoke the original, un-intercepted callable with the recorded args.
    pub fn replay(&self) {
        (self.replay)(&self.args);
    }
}

impl fmt::Debug for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallRecord")
            .field("seq", &self.seq)
            .field("at", &self.at)
            .field("args", &self.args)
            .field("separator", &self.separator)
            .finish_non_exhaustive()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
