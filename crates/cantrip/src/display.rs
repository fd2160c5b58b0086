//! Canonical source renderer.
//!
//! Turns values back into source text so they survive a re-parse. Values
//! with no source form (lists, dictionaries, commands, sourceless scripts)
//! render as an inert block-comment placeholder; they round-trip only via
//! typed commands that re-serialize them.

use crate::{
    selector::Selector,
    tokenize::{TokenKind, tokenize},
    value::{Value, format_real},
};

/// Renders a value to canonical source text.
#[must_use]
pub fn display_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        // nil reads back as the empty expression, which evaluates to nil
        Value::Nil => out.push_str("[]"),
        Value::Boolean(true) => out.push_str("true"),
        Value::Boolean(false) => out.push_str("false"),
        Value::Integer(i) => out.push_str(&i.to_string()),
        Value::Real(r) => out.push_str(&format_real(*r)),
        Value::String(s) => write_string(out, s),
        Value::Tuple(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(out, item);
            }
            out.push(')');
        }
        Value::Script(script) => match &script.source {
            Some(source) => {
                out.push('{');
                out.push_str(source);
                out.push('}');
            }
            None => write_placeholder(out, "script"),
        },
        Value::Qualified(q) => {
            write_value(out, &q.source);
            for selector in &q.selectors {
                write_selector(out, selector);
            }
        }
        Value::List(_) | Value::Dictionary(_) | Value::Command(_) => {
            write_placeholder(out, value.kind_name());
        }
    }
}

fn write_selector(out: &mut String, selector: &Selector) {
    match selector {
        Selector::Indexed(s) => {
            out.push('[');
            write_value(out, &s.index);
            out.push(']');
        }
        Selector::Keyed(s) => {
            out.push('(');
            for (i, key) in s.keys.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(out, key);
            }
            out.push(')');
        }
        Selector::Generic(s) => {
            out.push('{');
            for (i, rule) in s.rules.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(out, rule);
            }
            out.push('}');
        }
    }
}

fn write_placeholder(out: &mut String, kind: &str) {
    out.push_str("{#{undisplayable ");
    out.push_str(kind);
    out.push_str("}#}");
}

/// Renders a string with the lightest quoting that re-parses to the same
/// value: verbatim when it lexes as a single plain word, brace-quoted when
/// its braces balance, double-quoted with escapes otherwise.
fn write_string(out: &mut String, s: &str) {
    if s.is_empty() {
        out.push_str("\"\"");
        return;
    }
    if lexes_as_plain_word(s) {
        out.push_str(s);
        return;
    }
    if braces_balance(s) && !s.contains(|c: char| c.is_control() && c != '\n' && c != '\t') {
        out.push('{');
        out.push_str(s);
        out.push('}');
        return;
    }
    out.push('"');
    for c in s.chars() {
        match c {
            '"' | '\\' | '$' | '[' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// True when the text lexes as exactly one Text token (so it can stand alone
/// as a bare literal word).
fn lexes_as_plain_word(s: &str) -> bool {
    let tokens = tokenize(s);
    tokens.len() == 1 && tokens[0].kind == TokenKind::Text
}

/// True when every `{` has a matching `}` and none closes early, so the text
/// can sit between braces unescaped.
fn braces_balance(s: &str) -> bool {
    let mut depth = 0i64;
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !escaped
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&display_value(self))
    }
}
