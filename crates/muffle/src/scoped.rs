//! Scoped-run helpers with guaranteed teardown.
//!
//! [`muted`] and [`captured`] activate a unit, run a closure, and
//! deactivate again whether the closure returns or panics. Deactivation
//! rides on a drop guard, so an unwinding panic still restores the sink
//! before it crosses the helper's frame.

use std::sync::Arc;

use muffle_core::{AggregateInterceptor, Interceptor, MuffleError};

/// Anything that can be activated and unconditionally deactivated: a
/// single interceptor or an aggregate.
pub trait Silenceable {
    fn mute(&self) -> Result<(), MuffleError>;
    fn capture(&self) -> Result<(), MuffleError>;
    fn unmute(&self);
    fn uncapture(&self);
}

impl Silenceable for Arc<Interceptor> {
    fn mute(&self) -> Result<(), MuffleError> {
        Interceptor::mute(self)
    }

    fn capture(&self) -> Result<(), MuffleError> {
        Interceptor::capture(self)
    }

    fn unmute(&self) {
        Interceptor::unmute(self);
    }

    fn uncapture(&self) {
        Interceptor::uncapture(self);
    }
}

impl Silenceable for AggregateInterceptor {
    fn mute(&self) -> Result<(), MuffleError> {
        AggregateInterceptor::mute(self)
    }

    fn capture(&self) -> Result<(), MuffleError> {
        AggregateInterceptor::capture(self)
    }

    fn unmute(&self) {
        AggregateInterceptor::unmute(self);
    }

    fn uncapture(&self) {
        AggregateInterceptor::uncapture(self);
    }
}

struct Deactivate<'a, S: Silenceable> {
    unit: &'a S,
    capturing: bool,
}

impl<S: Silenceable> Drop for Deactivate<'_, S> {
    fn drop(&mut self) {
        if self.capturing {
            self.unit.uncapture();
        } else {
            self.unit.unmute();
        }
    }
}

/// Mute `unit`, run `f`, unmute — also on panic.
pub fn muted<S: Silenceable, T>(unit: &S, f: impl FnOnce() -> T) -> Result<T, MuffleError> {
    unit.mute()?;
    let _guard = Deactivate { unit, capturing: false };
    Ok(f())
}

/// Capture on `unit`, run `f`, uncapture — also on panic.
pub fn captured<S: Silenceable, T>(unit: &S, f: impl FnOnce() -> T) -> Result<T, MuffleError> {
    unit.capture()?;
    let _guard = Deactivate { unit, capturing: true };
    Ok(f())
}
