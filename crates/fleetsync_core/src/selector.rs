//! Label selectors.
//!
//! Grammar (comma-separated requirements, all of which must hold):
//!
//! | Form              | Matches when                              |
//! |-------------------|-------------------------------------------|
//! | `k=v`, `k==v`     | label `k` is `v`                          |
//! | `k!=v`            | label `k` is absent or not `v`            |
//! | `k`               | label `k` is present                      |
//! | `!k`              | label `k` is absent                       |
//! | `k in (a,b)`      | label `k` is one of the values            |
//! | `k notin (a,b)`   | label `k` is absent or none of the values |
//!
//! The empty selector matches nothing.

use crate::error::{CoreError, CoreResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// A single selector requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// `key=value`
    Equals {
        /// Label key.
        key: String,
        /// Required value.
        value: String,
    },
    /// `key!=value`
    NotEquals {
        /// Label key.
        key: String,
        /// Excluded value.
        value: String,
    },
    /// `key`
    Exists(String),
    /// `!key`
    NotExists(String),
    /// `key in (v1,v2)`
    In {
        /// Label key.
        key: String,
        /// Allowed values.
        values: BTreeSet<String>,
    },
    /// `key notin (v1,v2)`
    NotIn {
        /// Label key.
        key: String,
        /// Excluded values.
        values: BTreeSet<String>,
    },
}

impl Requirement {
    /// Returns true if `labels` satisfy this requirement.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals { key, value } => labels.get(key) == Some(value),
            Requirement::NotEquals { key, value } => labels.get(key) != Some(value),
            Requirement::Exists(key) => labels.contains_key(key),
            Requirement::NotExists(key) => !labels.contains_key(key),
            Requirement::In { key, values } => labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::NotIn { key, values } => {
                labels.get(key).map_or(true, |v| !values.contains(v))
            }
        }
    }
}

/// A parsed label selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    raw: String,
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Parses a selector.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSelector` if the text does not follow the grammar.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self {
                raw: raw.to_string(),
                requirements: Vec::new(),
            });
        }

        let requirements = split_terms(raw, trimmed)?
            .into_iter()
            .map(|term| parse_term(raw, term))
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Self {
            raw: raw.to_string(),
            requirements,
        })
    }

    /// Returns true if every requirement holds. The empty selector never matches.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        !self.requirements.is_empty() && self.requirements.iter().all(|r| r.matches(labels))
    }

    /// Returns true if the selector has no requirements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Returns the parsed requirements.
    #[must_use]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Returns the selector text as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Selector {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Splits on commas outside parentheses.
fn split_terms<'a>(raw: &str, text: &'a str) -> CoreResult<Vec<&'a str>> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| CoreError::invalid_selector(raw, "unbalanced ')'"))?;
            }
            ',' if depth == 0 => {
                terms.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(CoreError::invalid_selector(raw, "unterminated value list"));
    }
    terms.push(text[start..].trim());

    if terms.iter().any(|t| t.is_empty()) {
        return Err(CoreError::invalid_selector(raw, "empty requirement"));
    }
    Ok(terms)
}

fn parse_term(raw: &str, term: &str) -> CoreResult<Requirement> {
    if let Some(rest) = term.strip_prefix('!') {
        if !rest.contains('=') {
            return Ok(Requirement::NotExists(key(raw, rest)?));
        }
    }

    if let Some(open) = term.find('(') {
        return parse_set(raw, term, open);
    }

    if let Some((k, v)) = term.split_once("!=") {
        return Ok(Requirement::NotEquals {
            key: key(raw, k)?,
            value: value(raw, v)?,
        });
    }
    if let Some((k, v)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Ok(Requirement::Equals {
            key: key(raw, k)?,
            value: value(raw, v)?,
        });
    }

    Ok(Requirement::Exists(key(raw, term)?))
}

fn parse_set(raw: &str, term: &str, open: usize) -> CoreResult<Requirement> {
    let head = &term[..open];
    let body = term[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| CoreError::invalid_selector(raw, "expected ')' at end of value list"))?;

    let mut words = head.split_whitespace();
    let (k, op) = match (words.next(), words.next(), words.next()) {
        (Some(k), Some(op), None) => (k, op),
        _ => {
            return Err(CoreError::invalid_selector(
                raw,
                format!("expected '<key> in|notin (...)', got {term:?}"),
            ))
        }
    };

    let values = body
        .split(',')
        .map(|v| value(raw, v))
        .collect::<CoreResult<BTreeSet<_>>>()?;
    if values.iter().all(String::is_empty) {
        return Err(CoreError::invalid_selector(raw, "empty value list"));
    }

    let key = key(raw, k)?;
    match op {
        "in" => Ok(Requirement::In { key, values }),
        "notin" => Ok(Requirement::NotIn { key, values }),
        other => Err(CoreError::invalid_selector(
            raw,
            format!("unknown set operator {other:?}"),
        )),
    }
}

fn key(raw: &str, text: &str) -> CoreResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CoreError::invalid_selector(raw, "empty key"));
    }
    if !text
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        return Err(CoreError::invalid_selector(
            raw,
            format!("invalid key {text:?}"),
        ));
    }
    Ok(text.to_string())
}

fn value(raw: &str, text: &str) -> CoreResult<String> {
    let text = text.trim();
    if !text
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(CoreError::invalid_selector(
            raw,
            format!("invalid value {text:?}"),
        ));
    }
    Ok(text.to_string())
}
