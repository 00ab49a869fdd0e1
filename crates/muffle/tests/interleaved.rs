//! Interleaving calls across several muted members preserves the true
//! invocation order, observed through listeners and through an aggregate.

mod common;

use std::sync::{Arc, Mutex};

use common::console_spy;
use muffle::{SinkRegistry, SinkSpec};
use proptest::prelude::*;
use serde_json::json;

const MEMBERS: [&str; 3] = ["info", "warn", "error"];

#[test]
fn listener_sees_calls_in_invocation_order() {
    let registry = SinkRegistry::new();
    let (console, _) = console_spy();

    let heard = Arc::new(Mutex::new(String::new()));
    let mut interceptors = Vec::new();
    for member in MEMBERS {
        let interceptor = registry.resolve(&console, member).unwrap();
        let sink = Arc::clone(&heard);
        interceptor.on(move |record| sink.lock().unwrap().push_str(&record.rendered()));
        interceptor.mute().unwrap();
        interceptors.push(interceptor);
    }

    let mut expected = String::new();
    for (i, member) in MEMBERS.iter().cycle().take(10).enumerate() {
        let message = format!("{member}{i}");
        console.call(member, &[json!(message)]).unwrap();
        expected.push_str(&message);
    }

    assert_eq!(*heard.lock().unwrap(), expected);

    for interceptor in &interceptors {
        // one listener each, no zombies accumulated
        assert_eq!(interceptor.listener_count(), 1);
        interceptor.unmute();
    }
}

#[test]
fn aggregate_merges_in_invocation_order() {
    let registry = SinkRegistry::new();
    let (console, _) = console_spy();
    let aggregate = registry
        .resolve_many(MEMBERS.map(|member| SinkSpec::new(&console, member)))
        .unwrap();

    aggregate.mute().unwrap();
    let mut expected = String::new();
    for (i, member) in ["warn", "info", "warn", "error", "info"].iter().enumerate() {
        let message = format!("{member}{i}");
        console.call(member, &[json!(&message)]).unwrap();
        expected.push_str(&message);
        expected.push('\n');
    }

    assert_eq!(aggregate.get_logs(None).unwrap(), Some(expected));
    aggregate.unmute();
}

proptest! {
    // Any pattern of calls across three members merges back in exactly
    // the order the calls were made.
    #[test]
    fn any_interleaving_is_order_preserving(pattern in prop::collection::vec(0usize..3, 0..32)) {
        let registry = SinkRegistry::new();
        let (console, _) = console_spy();
        let aggregate = registry
            .resolve_many(MEMBERS.map(|member| SinkSpec::new(&console, member)))
            .unwrap();

        aggregate.mute().unwrap();
        let mut expected = String::new();
        for (i, &pick) in pattern.iter().enumerate() {
            let member = MEMBERS[pick];
            let message = format!("{member}{i}");
            console.call(member, &[json!(&message)]).unwrap();
            expected.push_str(&message);
            expected.push('\n');
        }

        prop_assert_eq!(aggregate.get_logs(None).unwrap(), Some(expected));
        aggregate.unmute();
    }
}
