//! Aggregate interceptor: several sinks observed as one unit.
//!
//! An aggregate composes a fixed set of constituent [`Interceptor`]s. It
//! never owns a constituent's install handle — it forwards lifecycle
//! calls and subscribes to each constituent's call stream, merging
//! records in arrival order. Arrival order equals true call order because
//! listener delivery is synchronous at interception time.
//!
//! Constituents remain independently-reachable singletons, so another
//! part of the program may mutate one outside the aggregate's control.
//! Every state query therefore cross-checks all constituents and reports
//! [`MuffleError::InconsistentState`] when they diverge — a recoverable
//! condition the caller reconciles and retries.

use std::sync::{Arc, Mutex};

use colored::Color;

use crate::error::MuffleError;
use crate::format;
use crate::host::{SinkHost, SinkId};
use crate::interceptor::{Interceptor, ListenerId};
use crate::record::CallRecord;
use crate::registry::{InterceptOptions, SinkRegistry};

// ─── Sink Spec ───────────────────────────────────────────────────────

/// One `(host, member, options)` entry in an aggregate request.
#[derive(Clone)]
pub struct SinkSpec {
    pub host: Arc<SinkHost>,
    pub member: String,
    pub options: InterceptOptions,
}

impl SinkSpec {
    pub fn new(host: &Arc<SinkHost>, member: impl Into<String>) -> Self {
        Self {
            host: Arc::clone(host),
            member: member.into(),
            options: InterceptOptions::default(),
        }
    }

    /// Tag this constituent's merged records with a color.
    pub fn color(mut self, color: Color) -> Self {
        self.options.color = Some(color);
        self
    }

    pub fn options(mut self, options: InterceptOptions) -> Self {
        self.options = options;
        self
    }
}

// ─── Aggregate ───────────────────────────────────────────────────────

struct Constituent {
    interceptor: Arc<Interceptor>,
    color: Option<Color>,
}

struct MergedRecord {
    record: CallRecord,
    color: Option<Color>,
}

/// A fixed set of interceptors forwarded to together and merged into one
/// globally-ordered log.
pub struct AggregateInterceptor {
    constituents: Vec<Constituent>,
    merged: Arc<Mutex<Vec<MergedRecord>>>,
    subscriptions: Mutex<Vec<(usize, ListenerId)>>,
}

impl std::fmt::Debug for AggregateInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateInterceptor")
            .field("constituents", &self.constituents.len())
            .finish_non_exhaustive()
    }
}

impl AggregateInterceptor {
    /// Resolve every spec through `registry` and compose the result.
    ///
    /// Fails with [`MuffleError::DuplicateSink`] when the same sink
    /// identity appears twice; the constructor fails entirely.
    pub(crate) fn resolve(
        registry: &SinkRegistry,
        specs: impl IntoIterator<Item = SinkSpec>,
    ) -> Result<Self, MuffleError> {
        let mut constituents: Vec<Constituent> = Vec::new();
        for spec in specs {
            let id = SinkId::new(&spec.host, &spec.member);
            if constituents.iter().any(|c| *c.interceptor.id() == id) {
                return Err(MuffleError::DuplicateSink { sink: id });
            }
            let color = spec.options.color;
            let interceptor = registry.resolve_with(&spec.host, &spec.member, spec.options)?;
            constituents.push(Constituent { interceptor, color });
        }
        Ok(Self {
            constituents,
            merged: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    // ─── Lifecycle ───────────────────────────────────────────────────

    /// Mute every constituent, then start merging their call streams.
    ///
    /// Not transactional: if a constituent is already active, its
    /// [`MuffleError::AlreadyActivated`] propagates and constituents
    /// switched before it stay muted.
    pub fn mute(&self) -> Result<(), MuffleError> {
        for constituent in &self.constituents {
            constituent.interceptor.mute()?;
        }
        self.subscribe();
        Ok(())
    }

    /// Capture on every constituent, then start merging. Same
    /// non-transactional behavior as [`mute`](Self::mute).
    pub fn capture(&self) -> Result<(), MuffleError> {
        for constituent in &self.constituents {
            constituent.interceptor.capture()?;
        }
        self.subscribe();
        Ok(())
    }

    /// Unmute every constituent, clear the merged log, stop listening.
    pub fn unmute(&self) {
        for constituent in &self.constituents {
            constituent.interceptor.unmute();
        }
        self.merged_lock().clear();
        self.unsubscribe();
    }

    /// See [`unmute`](Self::unmute); both active states unwind the same way.
    pub fn uncapture(&self) {
        for constituent in &self.constituents {
            constituent.interceptor.uncapture();
        }
        self.merged_lock().clear();
        self.unsubscribe();
    }

    fn subscribe(&self) {
        let mut subscriptions = self.subscriptions.lock().expect("subscriptions lock poisoned");
        for (index, constituent) in self.constituents.iter().enumerate() {
            let merged = Arc::clone(&self.merged);
            let color = constituent.color;
            let listener = constituent.interceptor.on(move |record| {
                merged
                    .lock()
                    .expect("merged log lock poisoned")
                    .push(MergedRecord { record: record.clone(), color });
            });
            subscriptions.push((index, listener));
        }
        tracing::debug!(constituents = self.constituents.len(), "aggregate listening");
    }

    fn unsubscribe(&self) {
        let mut subscriptions = self.subscriptions.lock().expect("subscriptions lock poisoned");
        for (index, listener) in subscriptions.drain(..) {
            self.constituents[index].interceptor.remove_listener(listener);
        }
        tracing::debug!("aggregate stopped listening");
    }

    // ─── Queries ─────────────────────────────────────────────────────

    /// Whether every constituent is muting.
    ///
    /// [`MuffleError::InconsistentState`] when constituents disagree.
    pub fn is_muting(&self) -> Result<bool, MuffleError> {
        self.agree("is_muting", Interceptor::is_muting)
    }

    /// Whether every constituent is capturing.
    pub fn is_capturing(&self) -> Result<bool, MuffleError> {
        self.agree("is_capturing", Interceptor::is_capturing)
    }

    /// Whether every constituent's wrapper is still installed.
    pub fn is_activated(&self) -> Result<bool, MuffleError> {
        self.agree("is_activated", Interceptor::is_activated)
    }

    fn agree(
        &self,
        property: &'static str,
        check: impl Fn(&Interceptor) -> bool,
    ) -> Result<bool, MuffleError> {
        let mut constituents = self.constituents.iter();
        let Some(first) = constituents.next() else {
            return Ok(true);
        };
        let expected = check(&first.interceptor);
        for constituent in constituents {
            if check(&constituent.interceptor) != expected {
                tracing::debug!(property, "aggregate constituents diverged");
                return Err(MuffleError::InconsistentState { property });
            }
        }
        Ok(expected)
    }

    // ─── Logs ────────────────────────────────────────────────────────

    /// The merged records rendered in arrival order.
    ///
    /// Each record is colorized individually; precedence is the explicit
    /// `color` argument, then the constituent's override, then none.
    /// `Ok(None)` unless consistently activated.
    pub fn get_logs(&self, color: Option<Color>) -> Result<Option<String>, MuffleError> {
        if !self.is_activated()? {
            return Ok(None);
        }
        let merged = self.merged_lock();
        let mut out = String::new();
        for entry in merged.iter() {
            let text = entry.record.text();
            match color.or(entry.color) {
                Some(color) => out.push_str(&format::colorize(color, &text)),
                None => out.push_str(&text),
            }
        }
        Ok(Some(out))
    }

    /// As [`get_logs`](Self::get_logs), then replay each merged record
    /// once via its own original callable — one call per recorded call,
    /// unlike the single-interceptor flush which coalesces — clear the
    /// merged log, and forget every constituent's buffer so nothing
    /// replays twice.
    pub fn flush(&self, color: Option<Color>) -> Result<Option<String>, MuffleError> {
        let Some(logs) = self.get_logs(color)? else {
            return Ok(None);
        };
        let drained: Vec<MergedRecord> = std::mem::take(&mut *self.merged_lock());
        for entry in &drained {
            entry.record.replay();
        }
        for constituent in &self.constituents {
            constituent.interceptor.forget(None);
        }
        tracing::debug!(records = drained.len(), "aggregate flushed");
        Ok(Some(logs))
    }

    /// As [`flush`](Self::flush) but without any replay.
    pub fn forget(&self, color: Option<Color>) -> Result<Option<String>, MuffleError> {
        let Some(logs) = self.get_logs(color)? else {
            return Ok(None);
        };
        self.merged_lock().clear();
        for constituent in &self.constituents {
            constituent.interceptor.forget(None);
        }
        Ok(Some(logs))
    }

    // ─── Introspection ───────────────────────────────────────────────

    /// The constituent interceptors, in composition order. Useful for
    /// reconciling after an [`MuffleError::InconsistentState`].
    pub fn interceptors(&self) -> impl Iterator<Item = &Arc<Interceptor>> + '_ {
        self.constituents.iter().map(|c| &c.interceptor)
    }

    pub fn len(&self) -> usize {
        self.constituents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constituents.is_empty()
    }

    fn merged_lock(&self) -> std::sync::MutexGuard<'_, Vec<MergedRecord>> {
        self.merged.lock().expect("merged log lock poisoned")
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
