//! Bounded rendering of untrusted values for diagnostics.

use std::fmt::Write;

use serde_json::Value;

const MAX_RENDER_DEPTH: usize = 4;
const ELLIPSIS: char = '…';

/// Render `value` as compact JSON-like text of at most `limit` characters.
///
/// Containers nested deeper than a fixed bound are elided as `{…}` / `[…]`, so
/// the cost is bounded by `limit` rather than by the size of the value.
pub fn render_value(value: &Value, limit: usize) -> String {
    let mut out = BoundedWriter::new(limit);
    render_into(value, 0, &mut out);
    out.finish()
}

fn render_into(value: &Value, depth: usize, out: &mut BoundedWriter) {
    if out.is_full() {
        return;
    }
    match value {
        Value::Array(items) => {
            if depth >= MAX_RENDER_DEPTH && !items.is_empty() {
                out.push_str("[…]");
                return;
            }
            out.push_str("[");
            for (index, item) in items.iter().enumerate() {
                if out.is_full() {
                    return;
                }
                if index > 0 {
                    out.push_str(",");
                }
                render_into(item, depth + 1, out);
            }
            out.push_str("]");
        }
        Value::Object(object) => {
            if depth >= MAX_RENDER_DEPTH && !object.is_empty() {
                out.push_str("{…}");
                return;
            }
            out.push_str("{");
            for (index, (key, item)) in object.iter().enumerate() {
                if out.is_full() {
                    return;
                }
                if index > 0 {
                    out.push_str(",");
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push_str(":");
                render_into(item, depth + 1, out);
            }
            out.push_str("}");
        }
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

struct BoundedWriter {
    buf: String,
    chars: usize,
    limit: usize,
    truncated: bool,
}

impl BoundedWriter {
    fn new(limit: usize) -> Self {
        Self {
            buf: String::new(),
            chars: 0,
            limit,
            truncated: false,
        }
    }

    fn is_full(&self) -> bool {
        self.truncated
    }

    fn push_str(&mut self, s: &str) {
        for ch in s.chars() {
            if self.chars >= self.limit {
                self.truncated = true;
                return;
            }
            self.buf.push(ch);
            self.chars += 1;
        }
    }

    fn finish(mut self) -> String {
        if self.truncated {
            self.buf.push(ELLIPSIS);
        }
        self.buf
    }
}

impl Write for BoundedWriter {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.push_str(s);
        Ok(())
    }
}
