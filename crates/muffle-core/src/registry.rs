//! Caller-owned registry of per-sink interceptor singletons.
//!
//! The registry is an explicit object passed around by the test code that
//! owns it; there is no hidden module-level global. `resolve` is a
//! memoized constructor: the first request for a sink identity creates an
//! interceptor, every later request returns the same `Arc`. Entries are
//! never evicted; sink identities are few and long-lived.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use colored::Color;

use crate::aggregate::{AggregateInterceptor, SinkSpec};
use crate::error::MuffleError;
use crate::format;
use crate::host::{SinkHost, SinkId};
use crate::interceptor::Interceptor;
use crate::record::RenderFn;

/// Per-sink overrides applied when an interceptor is first created.
///
/// `render` and `separator` take effect only on the resolve call that
/// constructs the interceptor; later resolves return the existing
/// singleton unchanged. `color` is aggregate-level: it tags the
/// constituent rather than the interceptor.
#[derive(Clone, Default)]
pub struct InterceptOptions {
    pub render: Option<RenderFn>,
    pub separator: Option<String>,
    pub color: Option<Color>,
}

impl InterceptOptions {
    pub fn render(mut self, render: RenderFn) -> Self {
        self.render = Some(render);
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }
}

/// Registry guaranteeing at most one [`Interceptor`] per sink identity.
///
/// Also owns the sequence source shared by every interceptor it creates,
/// so call records are totally ordered across sinks.
pub struct SinkRegistry {
    interceptors: Mutex<HashMap<SinkId, Arc<Interceptor>>>,
    seq: Arc<AtomicU64>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self {
            interceptors: Mutex::new(HashMap::new()),
            seq: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The interceptor for `host.member`, created with default
    /// render/separator on first request.
    pub fn resolve(&self, host: &Arc<SinkHost>, member: &str) -> Result<Arc<Interceptor>, MuffleError> {
        self.resolve_with(host, member, InterceptOptions::default())
    }

    /// As [`resolve`](Self::resolve), with per-sink overrides.
    pub fn resolve_with(
        &self,
        host: &Arc<SinkHost>,
        member: &str,
        options: InterceptOptions,
    ) -> Result<Arc<Interceptor>, MuffleError> {
        let kind = host.member_kind(member).ok_or_else(|| MuffleError::UnknownMember {
            host: host.label().to_string(),
            member: member.to_string(),
        })?;
        let id = SinkId::new(host, member);
        let mut interceptors = self.interceptors.lock().expect("registry lock poisoned");
        if let Some(existing) = interceptors.get(&id) {
            return Ok(Arc::clone(existing));
        }
        let render = options.render.unwrap_or_else(|| format::default_render(kind));
        let separator = options
            .separator
            .unwrap_or_else(|| format::default_separator(kind).to_string());
        let interceptor = Interceptor::new(
            Arc::clone(host),
            member,
            render,
            separator,
            Arc::clone(&self.seq),
        );
        tracing::debug!(sink = %id, "interceptor created");
        interceptors.insert(id, Arc::clone(&interceptor));
        Ok(interceptor)
    }

    /// Build an [`AggregateInterceptor`] over several sinks, resolving (or
    /// reusing) each constituent through this registry.
    ///
    /// Fails with [`MuffleError::DuplicateSink`] if the same sink identity
    /// appears twice; no partial aggregate is returned.
    pub fn resolve_many(
        &self,
        specs: impl IntoIterator<Item = SinkSpec>,
    ) -> Result<AggregateInterceptor, MuffleError> {
        AggregateInterceptor::resolve(self, specs)
    }

    /// Number of distinct sink identities ever resolved.
    pub fn len(&self) -> usize {
        self.interceptors.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
