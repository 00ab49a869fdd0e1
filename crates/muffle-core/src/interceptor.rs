//! Per-sink interception state machine.
//!
//! One [`Interceptor`] owns one sink identity for the lifetime of the
//! process (handed out as a singleton by the
//! [`SinkRegistry`](crate::registry::SinkRegistry)).
//!
//! ## States
//!
//! - `Idle` — nothing installed, the sink behaves normally
//! - `Muting` — calls are recorded, nothing reaches the original
//! - `Capturing` — calls are recorded *and* forwarded to the original
//!
//! ## Key transitions
//!
//! - `mute` / `capture`: `Idle -> {Muting, Capturing}`, anything else is
//!   [`MuffleError::AlreadyActivated`]
//! - `unmute` / `uncapture`: any state `-> Idle`, idempotent
//! - external slot replacement: detected lazily by `is_activated`, which
//!   resets to `Idle` instead of erroring
//!
//! Recording is decoupled from replay: every call is buffered at the
//! instant it occurs (monotonic sequence number, synchronous listener
//! delivery), while visible output and replay are controlled separately.
//! That separation is what lets an aggregate merge several interceptors'
//! streams into one globally ordered log without buffering raw calls
//! itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use colored::Color;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MuffleError;
use crate::format;
use crate::host::{self, InstallHandle, SinkFn, SinkHost, SinkId};
use crate::record::{CallRecord, RenderFn};

// ─── State ───────────────────────────────────────────────────────────

/// Interception state. Exactly one holds at any time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptState {
    /// No wrapper installed.
    #[default]
    Idle,
    /// Calls are recorded; the original is never invoked.
    Muting,
    /// Calls are recorded and forwarded to the original.
    Capturing,
}

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback receiving each [`CallRecord`] at interception time.
pub type ListenerFn = Arc<dyn Fn(&CallRecord) + Send + Sync>;

// ─── Interceptor ─────────────────────────────────────────────────────

/// The per-sink singleton controlling interception, buffering and replay.
pub struct Interceptor {
    id: SinkId,
    host: Arc<SinkHost>,
    render: RenderFn,
    separator: String,
    seq: Arc<AtomicU64>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    state: InterceptState,
    handle: Option<InstallHandle>,
    buffer: Vec<CallRecord>,
    listeners: Vec<(ListenerId, ListenerFn)>,
    next_listener: u64,
}

impl Interceptor {
    pub(crate) fn new(
        host: Arc<SinkHost>,
        member: &str,
        render: RenderFn,
        separator: String,
        seq: Arc<AtomicU64>,
    ) -> Arc<Self> {
        let id = SinkId::new(&host, member);
        Arc::new(Self {
            id,
            host,
            render,
            separator,
            seq,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// The sink identity this interceptor owns.
    pub fn id(&self) -> &SinkId {
        &self.id
    }

    /// The host the sink lives on.
    pub fn host(&self) -> &Arc<SinkHost> {
        &self.host
    }

    // ─── Lifecycle ───────────────────────────────────────────────────

    /// Start muting: calls are recorded, nothing reaches the original.
    ///
    /// Errors with [`MuffleError::AlreadyActivated`] unless idle.
    pub fn mute(self: &Arc<Self>) -> Result<(), MuffleError> {
        self.activate(InterceptState::Muting)
    }

    /// Start capturing: calls are recorded and still produce output.
    ///
    /// Errors with [`MuffleError::AlreadyActivated`] unless idle.
    pub fn capture(self: &Arc<Self>) -> Result<(), MuffleError> {
        self.activate(InterceptState::Capturing)
    }

    /// Restore the original callable and return to idle. Idempotent, and
    /// safe to call from either active state.
    pub fn unmute(&self) {
        self.deactivate();
    }

    /// Alias of [`unmute`](Self::unmute); both active states unwind the
    /// same way.
    pub fn uncapture(&self) {
        self.deactivate();
    }

    fn activate(self: &Arc<Self>, mode: InterceptState) -> Result<(), MuffleError> {
        let mut inner = self.lock();
        if inner.state != InterceptState::Idle {
            return Err(MuffleError::AlreadyActivated { sink: self.id.clone() });
        }
        let handle = self.install_wrapper(mode)?;
        inner.handle = Some(handle);
        inner.state = mode;
        tracing::debug!(sink = %self.id, state = ?mode, "wrapper installed");
        Ok(())
    }

    fn deactivate(&self) {
        let mut inner = self.lock();
        if let Some(handle) = inner.handle.take() {
            let restored = handle.restore(&self.host, self.id.member());
            tracing::debug!(sink = %self.id, restored, "wrapper removed");
        }
        inner.state = InterceptState::Idle;
        inner.buffer.clear();
    }

    /// Build and install the wrapper for `mode`, returning the handle that
    /// owns the displaced original.
    fn install_wrapper(self: &Arc<Self>, mode: InterceptState) -> Result<InstallHandle, MuffleError> {
        let original = self.host.current(self.id.member()).ok_or_else(|| {
            MuffleError::UnknownMember {
                host: self.host.label().to_string(),
                member: self.id.member().to_string(),
            }
        })?;
        let weak = Arc::downgrade(self);
        let forward = mode == InterceptState::Capturing;
        let passthrough = Arc::clone(&original);
        let wrapper: SinkFn = Arc::new(move |args: &[Value]| {
            if let Some(interceptor) = weak.upgrade() {
                interceptor.intercept(args, &passthrough);
            }
            if forward {
                passthrough(args);
            }
        });
        host::install(&self.host, self.id.member(), wrapper)
    }

    /// Record one intercepted call and notify listeners.
    ///
    /// Listener delivery is synchronous and happens outside the state
    /// lock, in registration order.
    fn intercept(&self, args: &[Value], original: &SinkFn) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let record = CallRecord::new(
            seq,
            Utc::now(),
            args.to_vec(),
            Arc::clone(&self.render),
            self.separator.clone(),
            Arc::clone(original),
        );
        let listeners: Vec<ListenerFn> = {
            let mut inner = self.lock();
            inner.buffer.push(record.clone());
            inner.listeners.iter().map(|(_, f)| Arc::clone(f)).collect()
        };
        tracing::trace!(sink = %self.id, seq, "call intercepted");
        for listener in &listeners {
            listener(&record);
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────

    /// Whether this interceptor's wrapper is still the sink's current
    /// callable.
    ///
    /// Self-heals: if something external replaced the slot, internal state
    /// resets to `Idle` and this returns `false`. External restoration is
    /// expected interoperability, not an error.
    pub fn is_activated(&self) -> bool {
        let mut inner = self.lock();
        match &inner.handle {
            Some(handle) if handle.is_current(&self.host, self.id.member()) => true,
            Some(_) => {
                tracing::debug!(sink = %self.id, "slot replaced externally, resetting to idle");
                inner.handle = None;
                inner.state = InterceptState::Idle;
                inner.buffer.clear();
                false
            }
            None => false,
        }
    }

    pub fn is_muting(&self) -> bool {
        self.lock().state == InterceptState::Muting
    }

    pub fn is_capturing(&self) -> bool {
        self.lock().state == InterceptState::Capturing
    }

    pub fn state(&self) -> InterceptState {
        self.lock().state
    }

    // ─── Logs ────────────────────────────────────────────────────────

    /// The buffered calls rendered and joined, each record followed by its
    /// separator; the whole string is colorized if a color is given.
    ///
    /// `None` when not activated. Does not mutate the buffer.
    pub fn get_logs(&self, color: Option<Color>) -> Option<String> {
        if !self.is_activated() {
            return None;
        }
        let text: String = {
            let inner = self.lock();
            inner.buffer.iter().map(CallRecord::text).collect()
        };
        Some(match color {
            Some(color) => format::colorize(color, &text),
            None => text,
        })
    }

    /// As [`get_logs`](Self::get_logs), then: restore the original, invoke
    /// it once with the rendered text (one combined call), clear the
    /// buffer, and re-install the wrapper in the mode it was in.
    ///
    /// [`MuffleError::InvalidMode`] if the interceptor was somehow neither
    /// muting nor capturing at re-installation; unreachable under correct
    /// usage.
    pub fn flush(self: &Arc<Self>, color: Option<Color>) -> Result<Option<String>, MuffleError> {
        let Some(logs) = self.get_logs(color) else {
            return Ok(None);
        };
        let (handle, mode) = {
            let mut inner = self.lock();
            let Some(handle) = inner.handle.take() else {
                return Ok(None);
            };
            inner.buffer.clear();
            (handle, inner.state)
        };
        let original = handle.original();
        handle.restore(&self.host, self.id.member());
        original(&[Value::String(logs.clone())]);

        let handle = match mode {
            InterceptState::Muting | InterceptState::Capturing => {
                match self.install_wrapper(mode) {
                    Ok(handle) => handle,
                    Err(err) => {
                        // Re-installation failed (e.g. the member vanished
                        // during the replay). Fall back to a consistent
                        // idle state instead of stranding state != Idle
                        // with no handle.
                        let mut inner = self.lock();
                        inner.state = InterceptState::Idle;
                        inner.buffer.clear();
                        return Err(err);
                    }
                }
            }
            InterceptState::Idle => {
                return Err(MuffleError::InvalidMode { sink: self.id.clone() });
            }
        };
        let mut inner = self.lock();
        inner.handle = Some(handle);
        tracing::debug!(sink = %self.id, state = ?mode, "flushed and re-armed");
        Ok(Some(logs))
    }

    /// As [`flush`](Self::flush) but never invokes the original: the
    /// buffer is cleared silently. Used by aggregates, which replay merged
    /// records themselves.
    pub fn forget(&self, color: Option<Color>) -> Option<String> {
        let logs = self.get_logs(color)?;
        self.lock().buffer.clear();
        tracing::debug!(sink = %self.id, "buffer forgotten");
        Some(logs)
    }

    // ─── Listeners ───────────────────────────────────────────────────

    /// Register a listener receiving each [`CallRecord`] synchronously at
    /// interception time.
    pub fn on(&self, listener: impl Fn(&CallRecord) + Send + Sync + 'static) -> ListenerId {
        let mut inner = self.lock();
        let id = ListenerId(inner.next_listener);
        inner.next_listener += 1;
        inner.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a previously registered listener. Unknown ids are a no-op.
    pub fn remove_listener(&self, id: ListenerId) {
        self.lock().listeners.retain(|(lid, _)| *lid != id);
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("interceptor lock poisoned")
    }
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Interceptor")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("buffered", &inner.buffer.len())
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SinkKind;
    use serde_json::json;

    fn spy_sink() -> (Arc<SinkHost>, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let host = SinkHost::new("spy");
        let sink = Arc::clone(&seen);
        host.add_member("log", SinkKind::Line, Arc::new(move |args: &[Value]| {
            sink.lock().unwrap().push(format::render_line(args));
        }));
        (host, seen)
    }

    fn interceptor(host: &Arc<SinkHost>) -> Arc<Interceptor> {
        Interceptor::new(
            Arc::clone(host),
            "log",
            format::default_render(SinkKind::Line),
            "\n".to_string(),
            Arc::new(AtomicU64::new(1)),
        )
    }

    // ── 1. Muting swallows output, buffers calls ────────────────────

    #[test]
    fn mute_swallows_and_records() {
        let (host, seen) = spy_sink();
        let muter = interceptor(&host);

        muter.mute().unwrap();
        host.call("log", &[json!("Hello")]).unwrap();
        host.call("log", &[json!("World!")]).unwrap();

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(muter.get_logs(None).as_deref(), Some("Hello\nWorld!\n"));
        muter.unmute();
    }

    // ── 2. Capturing records and forwards ───────────────────────────

    #[test]
    fn capture_records_and_forwards() {
        let (host, seen) = spy_sink();
        let muter = interceptor(&host);

        muter.capture().unwrap();
        host.call("log", &[json!("through")]).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["through".to_string()]);
        assert_eq!(muter.get_logs(None).as_deref(), Some("through\n"));
        muter.uncapture();
    }

    // ── 3. State exclusivity ────────────────────────────────────────

    #[test]
    fn state_is_exclusive() {
        let (host, _) = spy_sink();
        let muter = interceptor(&host);

        muter.mute().unwrap();
        assert!(muter.is_muting());
        assert!(!muter.is_capturing());
        muter.unmute();

        muter.capture().unwrap();
        assert!(muter.is_capturing());
        assert!(!muter.is_muting());
        muter.uncapture();

        assert_eq!(muter.state(), InterceptState::Idle);
    }

    // ── 4. Double activation rejected, deactivation idempotent ──────

    #[test]
    fn double_activation_is_rejected() {
        let (host, _) = spy_sink();
        let muter = interceptor(&host);

        muter.mute().unwrap();
        assert!(matches!(
            muter.mute(),
            Err(MuffleError::AlreadyActivated { .. })
        ));
        assert!(matches!(
            muter.capture(),
            Err(MuffleError::AlreadyActivated { .. })
        ));
        muter.unmute();
    }

    #[test]
    fn repeated_deactivation_is_noop() {
        let (host, _) = spy_sink();
        let muter = interceptor(&host);

        muter.mute().unwrap();
        muter.unmute();
        muter.unmute();
        muter.uncapture();
        assert!(!muter.is_activated());
    }

    // ── 5. Soft reads while idle ────────────────────────────────────

    #[test]
    fn idle_reads_return_none() {
        let (host, _) = spy_sink();
        let muter = interceptor(&host);

        assert_eq!(muter.get_logs(None), None);
        assert_eq!(muter.flush(None).unwrap(), None);
        assert_eq!(muter.forget(None), None);
    }

    // ── 6. Flush: one combined replay, empty buffer, re-armed ───────

    #[test]
    fn flush_replays_once_and_rearms() {
        let (host, seen) = spy_sink();
        let muter = interceptor(&host);

        muter.mute().unwrap();
        host.call("log", &[json!("r1")]).unwrap();
        host.call("log", &[json!("r2")]).unwrap();

        let logs = muter.flush(None).unwrap();
        assert_eq!(logs.as_deref(), Some("r1\nr2\n"));
        // exactly one combined call to the original
        assert_eq!(*seen.lock().unwrap(), vec!["r1\nr2\n".to_string()]);
        // still muting, buffer empty
        assert!(muter.is_muting());
        assert_eq!(muter.get_logs(None).as_deref(), Some(""));

        // and still intercepting
        host.call("log", &[json!("r3")]).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(muter.get_logs(None).as_deref(), Some("r3\n"));
        muter.unmute();
    }

    #[test]
    fn flush_preserves_capture_mode() {
        let (host, seen) = spy_sink();
        let muter = interceptor(&host);

        muter.capture().unwrap();
        host.call("log", &[json!("a")]).unwrap();
        seen.lock().unwrap().clear();

        muter.flush(None).unwrap();
        assert!(muter.is_capturing());
        assert_eq!(*seen.lock().unwrap(), vec!["a\n".to_string()]);
        muter.uncapture();
    }

    // ── 7. Forget clears without replay ─────────────────────────────

    #[test]
    fn forget_never_touches_original() {
        let (host, seen) = spy_sink();
        let muter = interceptor(&host);

        muter.mute().unwrap();
        host.call("log", &[json!("quiet")]).unwrap();

        let logs = muter.forget(None);
        assert_eq!(logs.as_deref(), Some("quiet\n"));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(muter.get_logs(None).as_deref(), Some(""));
        muter.unmute();
    }

    // ── 8. Self-healing on external replacement ─────────────────────

    #[test]
    fn external_replacement_self_heals() {
        let (host, _) = spy_sink();
        let muter = interceptor(&host);

        muter.mute().unwrap();
        assert!(muter.is_activated());

        // something else takes over the slot, bypassing the interceptor
        host.swap("log", Arc::new(|_: &[Value]| {})).unwrap();

        assert!(!muter.is_activated());
        assert_eq!(muter.state(), InterceptState::Idle);
        assert_eq!(muter.get_logs(None), None);

        // and the interceptor is usable again
        muter.mute().unwrap();
        muter.unmute();
    }

    #[test]
    fn flush_resets_to_idle_if_rearming_fails() {
        // the original removes its own member when invoked, so the
        // post-replay re-install finds no slot to wrap
        let host = SinkHost::new("spy");
        let weak = Arc::downgrade(&host);
        host.add_member("log", SinkKind::Line, Arc::new(move |_: &[Value]| {
            if let Some(host) = weak.upgrade() {
                host.remove_member("log");
            }
        }));
        let muter = interceptor(&host);

        muter.mute().unwrap();
        host.call("log", &[json!("doomed")]).unwrap();

        let err = muter.flush(None).unwrap_err();
        assert!(matches!(err, MuffleError::UnknownMember { .. }));

        // consistent idle state, not a stranded half-activation
        assert_eq!(muter.state(), InterceptState::Idle);
        assert!(!muter.is_activated());
        assert_eq!(muter.get_logs(None), None);
        assert!(matches!(
            muter.mute(),
            Err(MuffleError::UnknownMember { .. })
        ));
    }

    // ── 9. Listeners: synchronous, ordered, removable ───────────────

    #[test]
    fn listeners_receive_records_in_order() {
        let (host, _) = spy_sink();
        let muter = interceptor(&host);
        let heard = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&heard);
        let id = muter.on(move |record| {
            sink.lock().unwrap().push(record.rendered());
        });
        assert_eq!(muter.listener_count(), 1);

        muter.mute().unwrap();
        host.call("log", &[json!("one")]).unwrap();
        host.call("log", &[json!("two")]).unwrap();

        assert_eq!(*heard.lock().unwrap(), vec!["one".to_string(), "two".to_string()]);

        muter.remove_listener(id);
        assert_eq!(muter.listener_count(), 0);
        host.call("log", &[json!("three")]).unwrap();
        assert_eq!(heard.lock().unwrap().len(), 2);
        muter.unmute();
    }

    // ── 10. Deactivation clears the buffer ──────────────────────────

    #[test]
    fn unmute_discards_buffered_calls() {
        let (host, _) = spy_sink();
        let muter = interceptor(&host);

        muter.mute().unwrap();
        host.call("log", &[json!("stale")]).unwrap();
        muter.unmute();

        muter.mute().unwrap();
        assert_eq!(muter.get_logs(None).as_deref(), Some(""));
        muter.unmute();
    }
}
