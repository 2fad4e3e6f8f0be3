//! Guard expression evaluation.
//!
//! A guard is a single token, optionally negated with a leading `!`:
//!
//! - `name` - a predicate bound on the machine under `name`
//! - `In(state)` / `in(state)` - true while `state` is active
//! - `!name`, `!In(state)` - negation of either form
//!
//! There is no boolean composition. Charts needing `a && b` bind a predicate
//! that computes it.

use crate::error::ScmError;

/// What a guard checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardKind {
    /// Named predicate supplied by the embedding.
    Predicate(String),
    /// Active-state check. Holds a state uid once the chart is compiled.
    InState(String),
}

/// A parsed guard expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub kind: GuardKind,
    pub negated: bool,
}

impl Guard {
    /// Parses a guard expression from a string.
    pub fn parse(s: &str) -> Result<Self, ScmError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ScmError::InvalidGuard {
                reason: "empty guard expression".to_string(),
            });
        }

        Parser::new(s).parse_guard()
    }

    /// Name of the predicate this guard calls, if any.
    pub fn predicate_name(&self) -> Option<&str> {
        match &self.kind {
            GuardKind::Predicate(name) => Some(name),
            GuardKind::InState(_) => None,
        }
    }

    /// Evaluates the guard. `predicate` resolves bound predicates by name and
    /// `in_state` answers active-state checks by uid.
    pub fn evaluate<P, S>(&self, predicate: P, in_state: S) -> bool
    where
        P: FnOnce(&str) -> bool,
        S: FnOnce(&str) -> bool,
    {
        let value = match &self.kind {
            GuardKind::Predicate(name) => predicate(name),
            GuardKind::InState(state) => in_state(state),
        };
        value != self.negated
    }
}

impl std::fmt::Display for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negated {
            f.write_str("!")?;
        }
        match &self.kind {
            GuardKind::Predicate(name) => f.write_str(name),
            GuardKind::InState(state) => write!(f, "In({})", state),
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_guard(&mut self) -> Result<Guard, ScmError> {
        let mut negated = false;
        if self.peek_char() == Some('!') {
            self.pos += 1;
            self.skip_whitespace();
            negated = true;
        }

        if self.peek_char() == Some('!') {
            return Err(ScmError::InvalidGuard {
                reason: "only a single '!' is allowed".to_string(),
            });
        }

        let kind = if self.peek_str("In(") || self.peek_str("in(") {
            self.pos += 3;
            let state = self.parse_name()?;
            self.skip_whitespace();
            if self.peek_char() != Some(')') {
                return Err(ScmError::InvalidGuard {
                    reason: "expected ')'".to_string(),
                });
            }
            self.pos += 1;
            GuardKind::InState(state)
        } else {
            GuardKind::Predicate(self.parse_name()?)
        };

        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(ScmError::InvalidGuard {
                reason: format!("unexpected trailing input: '{}'", &self.input[self.pos..]),
            });
        }

        Ok(Guard { kind, negated })
    }

    fn parse_name(&mut self) -> Result<String, ScmError> {
        self.skip_whitespace();
        let start = self.pos;

        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }

        let name = &self.input[start..self.pos];
        if name.is_empty() {
            return Err(ScmError::InvalidGuard {
                reason: "empty name".to_string(),
            });
        }

        Ok(name.to_string())
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }
}

/// Stateless helpers for optional guards.
pub struct GuardEvaluator;

impl GuardEvaluator {
    /// Evaluates an optional guard (None = always true).
    pub fn evaluate_opt<P, S>(guard: Option<&Guard>, predicate: P, in_state: S) -> bool
    where
        P: FnOnce(&str) -> bool,
        S: FnOnce(&str) -> bool,
    {
        guard.map(|g| g.evaluate(predicate, in_state)).unwrap_or(true)
    }
}
