//! Default rendering and colorization.
//!
//! The formatter resolver picks how a sink's recorded calls turn into
//! text: line sinks get structured multi-argument formatting with a
//! newline separator, stream sinks get raw chunk concatenation with no
//! separator. Both defaults are overridable per interceptor via
//! [`InterceptOptions`](crate::registry::InterceptOptions).

use std::sync::Arc;

use colored::{Color, Colorize};
use serde_json::Value;

use crate::host::SinkKind;
use crate::record::RenderFn;

/// Default render function for a sink kind.
pub fn default_render(kind: SinkKind) -> RenderFn {
    match kind {
        SinkKind::Line => Arc::new(render_line),
        SinkKind::Stream => Arc::new(render_chunk),
    }
}

/// Default record separator for a sink kind.
pub fn default_separator(kind: SinkKind) -> &'static str {
    match kind {
        SinkKind::Line => "\n",
        SinkKind::Stream => "",
    }
}

/// Space-join all arguments; strings render without quotes, everything
/// else via its JSON form.
pub fn render_line(args: &[Value]) -> String {
    args.iter().map(display_value).collect::<Vec<_>>().join(" ")
}

/// First argument as raw text; a stream write carries one chunk.
pub fn render_chunk(args: &[Value]) -> String {
    args.first().map(display_value).unwrap_or_default()
}

/// Wrap `text` in the requested color.
pub fn colorize(color: Color, text: &str) -> String {
    text.color(color).to_string()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── 1. Line rendering ───────────────────────────────────────────

    #[test]
    fn line_render_space_joins_args() {
        assert_eq!(render_line(&[json!("a"), json!("b")]), "a b");
        assert_eq!(render_line(&[json!("n ="), json!(3), json!(true)]), "n = 3 true");
        assert_eq!(render_line(&[]), "");
    }

    #[test]
    fn line_render_keeps_non_strings_as_json() {
        assert_eq!(render_line(&[json!({"k": 1})]), r#"{"k":1}"#);
        assert_eq!(render_line(&[json!(null)]), "null");
    }

    // ── 2. Chunk rendering ──────────────────────────────────────────

    #[test]
    fn chunk_render_takes_first_arg_only() {
        assert_eq!(render_chunk(&[json!("raw bytes"), json!("utf8")]), "raw bytes");
        assert_eq!(render_chunk(&[]), "");
    }

    // ── 3. Resolver defaults ────────────────────────────────────────

    #[test]
    fn defaults_match_sink_kind() {
        assert_eq!(default_separator(SinkKind::Line), "\n");
        assert_eq!(default_separator(SinkKind::Stream), "");

        let line = default_render(SinkKind::Line);
        let stream = default_render(SinkKind::Stream);
        let args = [json!("x"), json!("y")];
        assert_eq!(line(&args), "x y");
        assert_eq!(stream(&args), "x");
    }

    // ── 4. Colorize wraps the whole string ──────────────────────────

    #[test]
    fn colorize_matches_colored_crate_output() {
        colored::control::set_override(true);
        let got = colorize(Color::Green, "hi\nthere\n");
        assert_eq!(got, "hi\nthere\n".color(Color::Green).to_string());
        assert!(got.contains("hi\nthere\n"));
        colored::control::unset_override();
    }
}
