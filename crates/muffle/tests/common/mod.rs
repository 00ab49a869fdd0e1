#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use muffle::{SinkHost, SinkKind, format};
use serde_json::Value;

/// Everything the un-intercepted sink wrote, in call order.
pub type Spy = Arc<Mutex<Vec<String>>>;

/// A host whose members record `"member:text"` into a shared spy instead
/// of printing, so tests can count exactly what reached the original.
pub fn spy_host(label: &str, members: &[(&str, SinkKind)]) -> (Arc<SinkHost>, Spy) {
    let seen: Spy = Arc::new(Mutex::new(Vec::new()));
    let host = SinkHost::new(label);
    for (member, kind) in members {
        let sink = Arc::clone(&seen);
        let name = member.to_string();
        let kind = *kind;
        host.add_member(name.clone(), kind, Arc::new(move |args: &[Value]| {
            let text = match kind {
                SinkKind::Line => format::render_line(args),
                SinkKind::Stream => format::render_chunk(args),
            };
            sink.lock().unwrap().push(format!("{name}:{text}"));
        }));
    }
    (host, seen)
}

/// A console-shaped spy host: line members `log`, `info`, `warn`, `error`.
pub fn console_spy() -> (Arc<SinkHost>, Spy) {
    spy_host(
        "console",
        &[
            ("log", SinkKind::Line),
            ("info", SinkKind::Line),
            ("warn", SinkKind::Line),
            ("error", SinkKind::Line),
        ],
    )
}

pub fn drain(spy: &Spy) -> Vec<String> {
    std::mem::take(&mut *spy.lock().unwrap())
}
