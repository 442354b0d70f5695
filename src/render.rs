//! Purpose: Format CLI output as pretty or compact JSON, optionally with ANSI color.
//! Exports: `Renderer`.
//! Invariants: Uncolored pretty output is byte-identical to `serde_json::to_string_pretty`.
use serde_json::Value;

const KEY: &str = "36";
const STRING: &str = "32";
const NUMBER: &str = "33";
const LITERAL: &str = "35";

#[derive(Clone, Copy, Debug)]
pub struct Renderer {
    pretty: bool,
    color: bool,
}

impl Renderer {
    pub fn new(pretty: bool, color: bool) -> Self {
        Self {
            pretty: pretty || color,
            color,
        }
    }

    pub fn render(&self, value: &Value) -> String {
        if !self.pretty {
            return serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
        }
        let mut out = String::new();
        self.write(value, 0, &mut out);
        out
    }

    /// Color a diagnostic label such as `error:`.
    pub fn label(&self, text: &str, code: &str) -> String {
        if self.color {
            format!("\u{1b}[{code}m{text}\u{1b}[0m")
        } else {
            text.to_string()
        }
    }

    fn paint(&self, text: &str, code: &str, out: &mut String) {
        out.push_str(&self.label(text, code));
    }

    fn write(&self, value: &Value, depth: usize, out: &mut String) {
        match value {
            Value::Null => self.paint("null", LITERAL, out),
            Value::Bool(flag) => self.paint(if *flag { "true" } else { "false" }, LITERAL, out),
            Value::Number(number) => self.paint(&number.to_string(), NUMBER, out),
            Value::String(text) => self.paint(&quoted(text), STRING, out),
            Value::Array(items) if items.is_empty() => out.push_str("[]"),
            Value::Object(map) if map.is_empty() => out.push_str("{}"),
            Value::Array(items) => {
                out.push('[');
                for (index, item) in items.iter().enumerate() {
                    separator(index, depth + 1, out);
                    self.write(item, depth + 1, out);
                }
                newline(depth, out);
                out.push(']');
            }
            Value::Object(map) => {
                out.push('{');
                for (index, (key, item)) in map.iter().enumerate() {
                    separator(index, depth + 1, out);
                    self.paint(&quoted(key), KEY, out);
                    out.push_str(": ");
                    self.write(item, depth + 1, out);
                }
                newline(depth, out);
                out.push('}');
            }
        }
    }
}

fn quoted(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

fn separator(index: usize, depth: usize, out: &mut String) {
    if index > 0 {
        out.push(',');
    }
    newline(depth, out);
}

fn newline(depth: usize, out: &mut String) {
    out.push('\n');
    out.push_str(&"  ".repeat(depth));
}

#[cfg(test)]
mod tests {
    use super::Renderer;
    use serde_json::json;

    #[test]
    fn plain_pretty_matches_serde() {
        let value = json!({"results": [[1, 2], {"V_m": -70.0, "model": "iaf_neuron"}, null, []]});
        let rendered = Renderer::new(true, false).render(&value);
        assert_eq!(rendered, serde_json::to_string_pretty(&value).expect("pretty"));
    }

    #[test]
    fn compact_when_not_pretty() {
        let value = json!({"models": ["a", "b"]});
        assert_eq!(Renderer::new(false, false).render(&value), "{\"models\":[\"a\",\"b\"]}");
    }

    #[test]
    fn color_wraps_scalars_and_keys() {
        let rendered = Renderer::new(false, true).render(&json!({"k": 1}));
        assert!(rendered.contains("\u{1b}[36m\"k\"\u{1b}[0m"));
        assert!(rendered.contains("\u{1b}[33m1\u{1b}[0m"));
    }
}
