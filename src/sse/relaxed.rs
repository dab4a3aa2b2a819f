//! Permissive JSON for event payloads.
//!
//! Servers occasionally send payloads that are "almost JSON". Instead of a
//! full lenient grammar, the text is rewritten into strict JSON by a single
//! pass and then handed to `serde_json`. Exactly these relaxations are
//! accepted:
//!
//! 1. trailing commas before `}` or `]`
//! 2. unquoted object keys made of ASCII letters, digits, `_` and `$`
//! 3. single-quoted strings
//! 4. `//` line comments and `/* */` block comments
//!
//! Everything else is still a parse error.

use serde_json::Value;

/// Parse `text` as JSON, accepting the relaxations listed in the module docs.
pub fn parse(text: &str) -> Result<Value, serde_json::Error> {
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(strict_err) => match normalize(text) {
            Some(normalized) => serde_json::from_str(&normalized),
            None => Err(strict_err),
        },
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Rewrite relaxed JSON into strict JSON.
///
/// Returns `None` when the input is broken in a way the rewrite can't
/// repair (unterminated string or comment), so the caller reports the
/// original strict error.
fn normalize(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut brackets: Vec<char> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                i = copy_string(&chars, i, &mut out)?;
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                loop {
                    if i + 1 >= chars.len() {
                        return None;
                    }
                    if chars[i] == '*' && chars[i + 1] == '/' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
                continue;
            }
            ',' => {
                // drop the comma if only whitespace/comments stand before a closer
                if next_significant(&chars, i + 1).is_some_and(|n| n == '}' || n == ']') {
                    i += 1;
                    continue;
                }
                out.push(c);
            }
            '{' | '[' => {
                brackets.push(c);
                out.push(c);
            }
            '}' | ']' => {
                brackets.pop();
                out.push(c);
            }
            c if is_ident_char(c) && brackets.last() == Some(&'{') && expects_key(&out) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                out.push('"');
                out.extend(&chars[start..i]);
                out.push('"');
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }

    Some(out)
}

/// Copy a quoted string starting at `start`, converting single quotes to
/// double quotes. Returns the index just past the closing quote.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> Option<usize> {
    let quote = chars[start];
    let mut i = start + 1;
    out.push('"');

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                let next = *chars.get(i + 1)?;
                if next == '\'' {
                    out.push('\'');
                } else {
                    out.push('\\');
                    out.push(next);
                }
                i += 2;
                continue;
            }
            c if c == quote => {
                out.push('"');
                return Some(i + 1);
            }
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
        i += 1;
    }

    None
}

/// An identifier may only be quoted where an object key is expected, which
/// is right after `{` or `,` (ignoring whitespace) inside an object.
fn expects_key(out: &str) -> bool {
    matches!(out.trim_end().chars().last(), Some('{') | Some(','))
}

fn next_significant(chars: &[char], mut i: usize) -> Option<char> {
    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i += 2;
            }
            c => return Some(c),
        }
    }
    None
}
