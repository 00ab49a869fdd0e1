//! Sink hosts and the function-substitution primitive.
//!
//! A [`SinkHost`] is a shared object exposing named callable members
//! ("slots"), like a console with `log`/`warn`/`error` or a byte stream
//! with `write`. Each slot holds the currently installed [`SinkFn`] and a
//! declared [`SinkKind`] that drives default rendering.
//!
//! [`install`] swaps a wrapper into a slot and hands back an
//! [`InstallHandle`] owning the displaced original. The handle can test
//! whether its wrapper is still the current slot (reference identity on
//! the `Arc`) and restores the original only in that case, so a slot
//! replaced externally is left alone.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MuffleError;
use crate::format;

/// A callable installed in a sink slot.
pub type SinkFn = Arc<dyn Fn(&[Value]) + Send + Sync>;

// ─── Sink Kind ───────────────────────────────────────────────────────

/// Rendering category of a sink member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Structured, line-oriented logging (space-joined args, `"\n"` separator).
    Line,
    /// Raw chunk writes (first arg as-is, empty separator).
    Stream,
}

// ─── Sink Identity ───────────────────────────────────────────────────

/// Identity of a sink: host reference identity plus member name.
///
/// Two `SinkId`s are equal iff they name the same member on the same host
/// *instance* (pointer equality, not label equality).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SinkId {
    host_addr: usize,
    label: String,
    member: String,
}

impl SinkId {
    pub fn new(host: &Arc<SinkHost>, member: &str) -> Self {
        Self {
            host_addr: Arc::as_ptr(host) as usize,
            label: host.label().to_string(),
            member: member.to_string(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn member(&self) -> &str {
        &self.member
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.label, self.member)
    }
}

// ─── Sink Host ───────────────────────────────────────────────────────

struct Slot {
    kind: SinkKind,
    func: SinkFn,
}

/// A shared object carrying named, swappable callable members.
pub struct SinkHost {
    label: String,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SinkHost {
    /// Create an empty host with a diagnostic label.
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            slots: Mutex::new(HashMap::new()),
        })
    }

    /// A console-like host: line members `log` and `info` writing to
    /// stdout, `warn` and `error` writing to stderr.
    pub fn console() -> Arc<Self> {
        let host = Self::new("console");
        for member in ["log", "info"] {
            host.add_member(member, SinkKind::Line, Arc::new(|args: &[Value]| {
                println!("{}", format::render_line(args));
            }));
        }
        for member in ["warn", "error"] {
            host.add_member(member, SinkKind::Line, Arc::new(|args: &[Value]| {
                eprintln!("{}", format::render_line(args));
            }));
        }
        host
    }

    /// A stdout-like host with a single `write` stream member.
    pub fn byte_stream(label: impl Into<String>) -> Arc<Self> {
        let host = Self::new(label);
        host.add_member("write", SinkKind::Stream, Arc::new(|args: &[Value]| {
            print!("{}", format::render_chunk(args));
        }));
        host
    }

    /// Register (or replace) a member slot.
    pub fn add_member(&self, name: impl Into<String>, kind: SinkKind, func: SinkFn) {
        let mut slots = self.slots.lock().expect("sink host lock poisoned");
        slots.insert(name.into(), Slot { kind, func });
    }

    /// Remove a member slot entirely. Returns whether it existed.
    pub fn remove_member(&self, member: &str) -> bool {
        let mut slots = self.slots.lock().expect("sink host lock poisoned");
        slots.remove(member).is_some()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Declared kind of a member, if it exists.
    pub fn member_kind(&self, member: &str) -> Option<SinkKind> {
        let slots = self.slots.lock().expect("sink host lock poisoned");
        slots.get(member).map(|slot| slot.kind)
    }

    /// The currently installed callable of a member.
    pub fn current(&self, member: &str) -> Option<SinkFn> {
        let slots = self.slots.lock().expect("sink host lock poisoned");
        slots.get(member).map(|slot| Arc::clone(&slot.func))
    }

    /// Swap a member's callable, returning the previous one.
    pub fn swap(&self, member: &str, func: SinkFn) -> Result<SinkFn, MuffleError> {
        let mut slots = self.slots.lock().expect("sink host lock poisoned");
        let slot = slots.get_mut(member).ok_or_else(|| MuffleError::UnknownMember {
            host: self.label.clone(),
            member: member.to_string(),
        })?;
        Ok(std::mem::replace(&mut slot.func, func))
    }

    /// Invoke a member with the given arguments.
    ///
    /// The callable is cloned out of the slot table before the call, so a
    /// wrapper may swap slots on the same host without deadlocking.
    pub fn call(&self, member: &str, args: &[Value]) -> Result<(), MuffleError> {
        let func = self.current(member).ok_or_else(|| MuffleError::UnknownMember {
            host: self.label.clone(),
            member: member.to_string(),
        })?;
        func(args);
        Ok(())
    }
}

impl fmt::Debug for SinkHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock().expect("sink host lock poisoned");
        let mut members: Vec<&String> = slots.keys().collect();
        members.sort();
        f.debug_struct("SinkHost")
            .field("label", &self.label)
            .field("members", &members)
            .finish()
    }
}

// ─── Install / Restore ───────────────────────────────────────────────

/// Ownership of one displaced original callable.
///
/// Held exclusively by the interceptor that installed the wrapper while it
/// is not idle.
pub struct InstallHandle {
    original: SinkFn,
    wrapper: SinkFn,
}

impl InstallHandle {
    /// The displaced original callable.
    pub fn original(&self) -> SinkFn {
        Arc::clone(&self.original)
    }

    /// Whether this handle's wrapper is still the member's current callable.
    pub fn is_current(&self, host: &SinkHost, member: &str) -> bool {
        host.current(member)
            .is_some_and(|current| Arc::ptr_eq(&current, &self.wrapper))
    }

    /// Put the original back, but only if the wrapper is still installed.
    ///
    /// Returns whether a restore happened. A slot replaced externally is
    /// not touched.
    pub fn restore(self, host: &SinkHost, member: &str) -> bool {
        if self.is_current(host, member) {
            // The member existed when we installed, so the swap cannot fail.
            let _ = host.swap(member, self.original);
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for InstallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallHandle").finish_non_exhaustive()
    }
}

/// Swap `wrapper` into `host.member`, returning a handle that owns the
/// displaced original.
pub fn install(host: &SinkHost, member: &str, wrapper: SinkFn) -> Result<InstallHandle, MuffleError> {
    let original = host.swap(member, Arc::clone(&wrapper))?;
    Ok(InstallHandle { original, wrapper })
}

// ─── Tests ───────────────────────────────────────────────────────────
