//! Permissive repair for near-miss JSON.
//!
//! A single left-to-right scan that tracks container nesting and string
//! state, rewriting the input into something `serde_json` accepts:
//!
//! - trailing and doubled commas are dropped, missing commas and colons are
//!   inserted between adjacent tokens;
//! - a `"` inside a string is escaped unless the next significant character
//!   ends the token (`,` `}` `]` `:`, end of input, or a quote on a new line);
//! - raw control characters inside strings are escaped;
//! - single-quoted strings become double-quoted, bare keys get quoted;
//! - `True`/`False`/`None`/`NaN`/`undefined` map to JSON literals;
//! - `//` and `/* */` comments, bidi marks and BOMs outside strings vanish;
//! - an unterminated string and unclosed containers are closed at the end
//!   (truncated generations).
//!
//! Text before the first `{`/`[` and after the root container closes is
//! ignored. If there is no container at all, the input is returned as-is.

use dealcheck_core::identity::is_bidi_control;

/// Repair `input` into (probably) valid JSON.
pub fn repair_json(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let Some(start) = chars.iter().position(|c| *c == '{' || *c == '[') else {
        return input.to_string();
    };
    Repairer::new(&chars[start..]).run()
}

struct Repairer<'a> {
    chars: &'a [char],
    pos: usize,
    out: String,
    /// Open containers, `{` or `[`.
    stack: Vec<char>,
    /// A complete value (or key) was just emitted.
    value_closed: bool,
    /// An object key was emitted and its `:` has not been seen yet.
    key_pending: bool,
}

impl<'a> Repairer<'a> {
    fn new(chars: &'a [char]) -> Self {
        Self {
            chars,
            pos: 0,
            out: String::with_capacity(chars.len() + 16),
            stack: Vec::new(),
            value_closed: false,
            key_pending: false,
        }
    }

    fn run(mut self) -> String {
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            match c {
                '{' | '[' => {
                    self.before_value();
                    self.stack.push(c);
                    self.out.push(c);
                    self.pos += 1;
                }
                '}' | ']' => {
                    self.pos += 1;
                    self.close_container(c);
                    if self.stack.is_empty() {
                        // Root closed; anything after it is prose.
                        return self.out;
                    }
                }
                ',' => {
                    self.pos += 1;
                    if self.key_pending {
                        self.out.push_str(":null");
                        self.key_pending = false;
                    }
                    if !matches!(self.last_significant(), Some(',' | '{' | '[') | None) {
                        self.out.push(',');
                    }
                    self.value_closed = false;
                }
                ':' => {
                    self.pos += 1;
                    self.out.push(':');
                    self.key_pending = false;
                    self.value_closed = false;
                }
                '"' | '\'' => {
                    self.pos += 1;
                    self.string(c);
                }
                '/' if self.peek(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek(1) == Some('*') => self.skip_block_comment(),
                c if c.is_whitespace() => {
                    self.out.push(c);
                    self.pos += 1;
                }
                c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
                c if c.is_alphanumeric() || c == '_' || c == '$' => self.word(),
                _ => {
                    // Stray punctuation, BOMs, bidi marks, backticks.
                    self.pos += 1;
                }
            }
        }
        self.finish()
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn last_significant(&self) -> Option<char> {
        self.out.trim_end().chars().last()
    }

    fn in_object(&self) -> bool {
        self.stack.last() == Some(&'{')
    }

    /// Called before emitting any value or key: inserts whatever separator
    /// the model forgot.
    fn before_value(&mut self) {
        if self.key_pending {
            self.out.push(':');
            self.key_pending = false;
        } else if self.value_closed {
            self.out.push(',');
        }
        self.value_closed = false;
    }

    /// True if the token about to be emitted sits where an object key goes.
    fn at_key_position(&self) -> bool {
        self.in_object() && matches!(self.last_significant(), Some('{' | ','))
    }

    fn after_token(&mut self, was_key: bool) {
        if was_key {
            self.key_pending = true;
        } else {
            self.value_closed = true;
        }
    }

    fn close_container(&mut self, closer: char) {
        if self.key_pending {
            self.out.push_str(":null");
            self.key_pending = false;
        }
        self.trim_trailing_comma();
        let Some(open) = self.stack.pop() else {
            return;
        };
        let expected = if open == '{' { '}' } else { ']' };
        if expected != closer {
            tracing::trace!(expected = %expected, found = %closer, "mismatched closer repaired");
        }
        self.out.push(expected);
        self.value_closed = true;
    }

    fn trim_trailing_comma(&mut self) {
        let trimmed = self.out.trim_end().len();
        if self.out[..trimmed].ends_with(',') {
            self.out.truncate(trimmed - 1);
        } else if self.out[..trimmed].ends_with(':') {
            self.out.truncate(trimmed);
            self.out.push_str("null");
        }
    }

    fn string(&mut self, quote: char) {
        self.before_value();
        let was_key = self.at_key_position();
        self.out.push('"');

        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            self.pos += 1;
            match c {
                '\\' => self.escape(quote),
                c if c == quote => {
                    if self.closes_string() {
                        self.out.push('"');
                        self.after_token(was_key);
                        return;
                    }
                    self.push_literal_quote(c);
                }
                '"' => self.out.push_str("\\\""),
                '\n' => self.out.push_str("\\n"),
                '\r' => self.out.push_str("\\r"),
                '\t' => self.out.push_str("\\t"),
                c if (c as u32) < 0x20 => self.out.push_str(&format!("\\u{:04x}", c as u32)),
                c => self.out.push(c),
            }
        }

        // Unterminated string at end of input.
        self.out.push('"');
        self.after_token(was_key);
    }

    fn push_literal_quote(&mut self, c: char) {
        if c == '"' {
            self.out.push_str("\\\"");
        } else {
            self.out.push(c);
        }
    }

    /// Decide whether a quote character ends the current string by looking
    /// at what follows it.
    fn closes_string(&self) -> bool {
        let mut i = self.pos;
        let mut saw_newline = false;
        while let Some(&c) = self.chars.get(i) {
            if c == '\n' || c == '\r' {
                saw_newline = true;
            }
            if !c.is_whitespace() {
                return match c {
                    ',' | '}' | ']' | ':' => true,
                    '"' | '\'' => saw_newline,
                    _ => false,
                };
            }
            i += 1;
        }
        true
    }

    fn escape(&mut self, quote: char) {
        match self.chars.get(self.pos).copied() {
            Some('\'') if quote == '\'' => {
                self.out.push('\'');
                self.pos += 1;
            }
            Some(e @ ('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't')) => {
                self.out.push('\\');
                self.out.push(e);
                self.pos += 1;
            }
            Some('u') if self.is_unicode_escape() => {
                self.out.push('\\');
            }
            _ => self.out.push_str("\\\\"),
        }
    }

    fn is_unicode_escape(&self) -> bool {
        (1..=4).all(|k| {
            self.chars
                .get(self.pos + k)
                .is_some_and(|c| c.is_ascii_hexdigit())
        })
    }

    fn number(&mut self) {
        let start = self.pos;
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        self.before_value();
        let was_key = self.at_key_position();
        if was_key {
            self.out.push('"');
            self.out.push_str(&raw);
            self.out.push('"');
        } else {
            self.out.push_str(&normalize_number(&raw));
        }
        self.after_token(was_key);
    }

    fn word(&mut self) {
        let start = self.pos;
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            if (c.is_alphanumeric() || c == '_' || c == '$' || c == '-') && !is_bidi_control(c) {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        self.before_value();
        let was_key = self.at_key_position();
        if was_key {
            self.out.push('"');
            self.out.push_str(&word);
            self.out.push('"');
        } else {
            match word.as_str() {
                "true" | "True" | "TRUE" => self.out.push_str("true"),
                "false" | "False" | "FALSE" => self.out.push_str("false"),
                "null" | "None" | "NULL" | "undefined" | "NaN" | "Infinity" => {
                    self.out.push_str("null")
                }
                other => {
                    self.out.push('"');
                    self.out.push_str(other);
                    self.out.push('"');
                }
            }
        }
        self.after_token(was_key);
    }

    fn skip_line_comment(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.chars.len() {
            if self.chars[self.pos] == '*' && self.peek(1) == Some('/') {
                self.pos += 2;
                return;
            }
            self.pos += 1;
        }
    }

    fn finish(mut self) -> String {
        while let Some(open) = self.stack.last().copied() {
            self.close_container(if open == '{' { '}' } else { ']' });
        }
        self.out
    }
}

/// Make a number token JSON-legal: drop a leading `+`, add a leading zero
/// to `.5`, strip a dangling `.`/exponent. Anything still unparseable
/// becomes `null`.
fn normalize_number(raw: &str) -> String {
    let mut s = raw.trim_start_matches('+').to_string();
    if s.starts_with('.') {
        s.insert(0, '0');
    } else if s.starts_with("-.") {
        s.insert(1, '0');
    }
    while s.ends_with(['.', 'e', 'E', '+', '-']) {
        s.pop();
    }
    if s.parse::<f64>().is_ok() && serde_json::from_str::<serde_json::Value>(&s).is_ok() {
        s
    } else {
        "null".to_string()
    }
}
