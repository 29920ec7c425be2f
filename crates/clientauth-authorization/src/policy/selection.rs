//! Selection rules deciding which devices belong to a group.
//!
//! Grammar (whitespace allowed between tokens):
//!
//! ```text
//! rule  := and ( "OR" rule )?
//! and   := term ( "AND" and )?
//! term  := key ":" value
//! key   := "thingName" | Namespace "." Attribute
//! value := ( [A-Za-z0-9_-] | "*" | "\:" )+
//! ```
//!
//! `AND` binds tighter than `OR` and both associate to the right, so
//! `a OR b AND c` is `Or(a, And(b, c))`. A `*` in a value is interpreted by
//! the attribute being matched (prefix/suffix wildcard for thing names).

use clientauth_core::Session;
use std::fmt;

const THING_NAME_KEY: &str = "thingName";
const THING_NAMESPACE: &str = "Thing";
const THING_NAME_ATTRIBUTE: &str = "ThingName";

/// Parsed selection rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionRule {
    And(Box<SelectionRule>, Box<SelectionRule>),
    Or(Box<SelectionRule>, Box<SelectionRule>),
    Match {
        namespace: String,
        attribute: String,
        pattern: String,
    },
}

/// Selection rule syntax error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleParseError {
    /// Byte offset into the rule text
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for RuleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

impl std::error::Error for RuleParseError {}

impl SelectionRule {
    /// Parse a rule such as `thingName: lamp-* OR thingName: fan`.
    pub fn parse(rule: &str) -> Result<Self, RuleParseError> {
        let mut parser = Parser { input: rule, pos: 0 };
        let parsed = parser.or_expr()?;
        parser.skip_whitespace();
        if parser.pos < rule.len() {
            return Err(parser.error("unexpected input"));
        }
        Ok(parsed)
    }

    /// Shorthand for a `thingName: <pattern>` term.
    pub fn thing_name(pattern: impl Into<String>) -> Self {
        Self::Match {
            namespace: THING_NAMESPACE.to_string(),
            attribute: THING_NAME_ATTRIBUTE.to_string(),
            pattern: pattern.into(),
        }
    }

    /// Evaluate against `session`, short-circuiting `AND` and `OR`.
    pub fn evaluate(&self, session: &Session) -> bool {
        match self {
            SelectionRule::Or(left, right) => left.evaluate(session) || right.evaluate(session),
            SelectionRule::And(left, right) => left.evaluate(session) && right.evaluate(session),
            SelectionRule::Match {
                namespace,
                attribute,
                pattern,
            } => session
                .session_attribute(namespace, attribute)
                .is_some_and(|attr| attr.matches(pattern)),
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn or_expr(&mut self) -> Result<SelectionRule, RuleParseError> {
        let left = self.and_expr()?;
        if self.keyword("OR") {
            let right = self.or_expr()?;
            return Ok(SelectionRule::Or(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<SelectionRule, RuleParseError> {
        let left = self.term()?;
        if self.keyword("AND") {
            let right = self.and_expr()?;
            return Ok(SelectionRule::And(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<SelectionRule, RuleParseError> {
        self.skip_whitespace();
        let key_start = self.pos;
        let key = self.take_while(|c| c.is_ascii_alphanumeric() || c == '.');
        if key.is_empty() {
            return Err(self.error("expected attribute key"));
        }
        let (namespace, attribute) = resolve_key(key).ok_or_else(|| RuleParseError {
            offset: key_start,
            message: format!("unknown attribute key {key:?}"),
        })?;

        self.skip_whitespace();
        if !self.rest().starts_with(':') {
            return Err(self.error("expected ':'"));
        }
        self.pos += 1;
        self.skip_whitespace();

        let pattern = self.value()?;
        Ok(SelectionRule::Match {
            namespace,
            attribute,
            pattern,
        })
    }

    fn value(&mut self) -> Result<String, RuleParseError> {
        let mut value = String::new();
        loop {
            let rest = self.rest();
            if rest.starts_with("\\:") {
                value.push(':');
                self.pos += 2;
                continue;
            }
            match rest.chars().next() {
                Some(c) if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '*') => {
                    value.push(c);
                    self.pos += c.len_utf8();
                }
                _ => break,
            }
        }

        if value.is_empty() {
            return Err(self.error("expected attribute value"));
        }
        let inner = value.trim_start_matches('*').trim_end_matches('*');
        if inner.contains('*') {
            return Err(self.error("'*' is only allowed at the start or end of a value"));
        }
        Ok(value)
    }

    /// Consume `word` if it is the next token and is followed by whitespace.
    fn keyword(&mut self, word: &str) -> bool {
        let save = self.pos;
        let had_space = self.skip_whitespace();
        let rest = self.rest();
        if had_space
            && rest.starts_with(word)
            && rest[word.len()..].starts_with(char::is_whitespace)
        {
            self.pos += word.len();
            return true;
        }
        self.pos = save;
        false
    }

    fn skip_whitespace(&mut self) -> bool {
        let skipped = self.take_while(char::is_whitespace);
        !skipped.is_empty()
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let input = self.input;
        let start = self.pos;
        let len = input[start..]
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map_or(input.len() - start, |(i, _)| i);
        self.pos += len;
        &input[start..start + len]
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn error(&self, message: &str) -> RuleParseError {
        RuleParseError {
            offset: self.pos,
            message: message.to_string(),
        }
    }
}

fn resolve_key(key: &str) -> Option<(String, String)> {
    if key == THING_NAME_KEY {
        return Some((THING_NAMESPACE.to_string(), THING_NAME_ATTRIBUTE.to_string()));
    }
    let (namespace, attribute) = key.split_once('.')?;
    let valid = |s: &str| {
        s.chars().next().is_some_and(|c| c.is_ascii_uppercase())
            && s.chars().all(|c| c.is_ascii_alphanumeric())
    };
    (valid(namespace) && valid(attribute))
        .then(|| (namespace.to_string(), attribute.to_string()))
}
