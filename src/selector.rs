// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label and field selector parsing and matching.
//!
//! One implementation serves every filtering path: the in-memory store
//! filters List/Watch results with it, the fake client filters its tracker
//! with it, and the kube-backed client renders it back to the query-string
//! syntax the API server parses. Keeping a single matcher is what makes the
//! production and test paths agree on which objects a selector selects.
//!
//! # Syntax
//!
//! Label selectors are comma-separated requirements, all of which must hold:
//!
//! - `key=value`, `key==value`, `key!=value`
//! - `key in (a,b)`, `key notin (a,b)`
//! - `key` (exists), `!key` (does not exist)
//!
//! Field selectors accept `field=value`, `field==value` and `field!=value`.
//!
//! # Example
//!
//! ```rust
//! use cluster_registry::selector::LabelSelector;
//! use std::collections::BTreeMap;
//!
//! let selector: LabelSelector = "env in (prod,staging),!canary".parse().unwrap();
//! let labels = BTreeMap::from([("env".to_string(), "prod".to_string())]);
//! assert!(selector.matches(&labels));
//! ```

use crate::validation::{validate_label_value, validate_qualified_name};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector as MetaLabelSelector;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a selector string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// The selector text is syntactically malformed.
    #[error("unable to parse requirement: {0}")]
    Syntax(String),

    /// A key is not a valid qualified name.
    #[error("invalid label key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// A value is not a valid label value.
    #[error("invalid label value {value:?}: {reason}")]
    InvalidValue { value: String, reason: String },

    /// An operator is not recognised.
    #[error("{0:?} is not a valid label selector operator")]
    InvalidOperator(String),
}

/// Relationship between a label key and a set of values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// One label requirement, e.g. `env in (prod,staging)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

impl Requirement {
    /// Build a requirement, validating key, values and operator arity.
    ///
    /// # Errors
    ///
    /// Returns an error when the key or a value is malformed, or when the
    /// number of values does not fit the operator.
    pub fn new<I, S>(key: &str, operator: Operator, values: I) -> Result<Self, SelectorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(reason) = validate_qualified_name(key).into_iter().next() {
            return Err(SelectorError::InvalidKey {
                key: key.to_string(),
                reason,
            });
        }
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        match operator {
            Operator::Equals | Operator::NotEquals if values.len() != 1 => {
                return Err(SelectorError::Syntax(format!(
                    "exact-match operators on {key:?} require exactly one value"
                )));
            }
            Operator::In | Operator::NotIn if values.is_empty() => {
                return Err(SelectorError::Syntax(format!(
                    "set-based operators on {key:?} require at least one value"
                )));
            }
            Operator::Exists | Operator::DoesNotExist if !values.is_empty() => {
                return Err(SelectorError::Syntax(format!(
                    "values must be empty for existence operators on {key:?}"
                )));
            }
            _ => {}
        }
        for value in &values {
            if let Some(reason) = validate_label_value(value).into_iter().next() {
                return Err(SelectorError::InvalidValue {
                    value: value.clone(),
                    reason,
                });
            }
        }
        Ok(Self {
            key: key.to_string(),
            operator,
            values,
        })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Whether `labels` satisfy this requirement.
    ///
    /// Negative operators (`!=`, `notin`) also match when the key is absent.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::Equals | Operator::In => value.is_some_and(|v| self.values.contains(v)),
            Operator::NotEquals | Operator::NotIn => value.is_none_or(|v| !self.values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = || self.values.iter().cloned().collect::<Vec<_>>().join(",");
        match self.operator {
            Operator::Equals => write!(f, "{}={}", self.key, joined()),
            Operator::NotEquals => write!(f, "{}!={}", self.key, joined()),
            Operator::In => write!(f, "{} in ({})", self.key, joined()),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, joined()),
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// A conjunction of label requirements. The empty selector matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// The selector that matches every object.
    #[must_use]
    pub fn everything() -> Self {
        Self::default()
    }

    /// Equality requirements for every entry of `set`.
    ///
    /// # Errors
    ///
    /// Returns an error if a key or value is not a valid label.
    pub fn from_set(set: &BTreeMap<String, String>) -> Result<Self, SelectorError> {
        let requirements = set
            .iter()
            .map(|(k, v)| Requirement::new(k, Operator::Equals, [v.clone()]))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { requirements })
    }

    /// Add one more requirement.
    #[must_use]
    pub fn and(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    #[must_use]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Whether every requirement holds for `labels`.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    /// Parse an optional selector string; `None` and `""` select everything.
    ///
    /// # Errors
    ///
    /// Returns an error if the selector text is malformed.
    pub fn parse_optional(selector: Option<&str>) -> Result<Self, SelectorError> {
        selector.map_or_else(|| Ok(Self::everything()), str::parse)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for LabelSelector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut requirements = Vec::new();
        for term in split_terms(s)? {
            requirements.push(parse_requirement(&term)?);
        }
        Ok(Self { requirements })
    }
}

impl TryFrom<&MetaLabelSelector> for LabelSelector {
    type Error = SelectorError;

    /// Convert the structured `matchLabels` / `matchExpressions` form.
    fn try_from(selector: &MetaLabelSelector) -> Result<Self, Self::Error> {
        let mut out = match &selector.match_labels {
            Some(labels) => Self::from_set(labels)?,
            None => Self::everything(),
        };
        for expr in selector.match_expressions.iter().flatten() {
            let operator = match expr.operator.as_str() {
                "In" => Operator::In,
                "NotIn" => Operator::NotIn,
                "Exists" => Operator::Exists,
                "DoesNotExist" => Operator::DoesNotExist,
                other => return Err(SelectorError::InvalidOperator(other.to_string())),
            };
            let values = expr.values.clone().unwrap_or_default();
            out = out.and(Requirement::new(&expr.key, operator, values)?);
        }
        Ok(out)
    }
}

/// Split on top-level commas, keeping commas inside `( )` value lists.
fn split_terms(s: &str) -> Result<Vec<String>, SelectorError> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in s.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| SelectorError::Syntax(format!("unbalanced ')' in {s:?}")))?;
                current.push(c);
            }
            ',' if depth == 0 => terms.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if depth != 0 {
        return Err(SelectorError::Syntax(format!("unbalanced '(' in {s:?}")));
    }
    terms.push(current);

    let terms: Vec<String> = terms.into_iter().map(|t| t.trim().to_string()).collect();
    if terms.len() == 1 && terms[0].is_empty() {
        return Ok(Vec::new());
    }
    if let Some(empty) = terms.iter().position(String::is_empty) {
        return Err(SelectorError::Syntax(format!(
            "empty requirement at position {empty} in {s:?}"
        )));
    }
    Ok(terms)
}

fn parse_requirement(term: &str) -> Result<Requirement, SelectorError> {
    if let Some(key) = term.strip_prefix('!') {
        return Requirement::new(key.trim(), Operator::DoesNotExist, Vec::<String>::new());
    }
    if let Some((key, value)) = term.split_once("!=") {
        return Requirement::new(key.trim(), Operator::NotEquals, [value.trim()]);
    }
    if let Some((key, value)) = term.split_once("==") {
        return Requirement::new(key.trim(), Operator::Equals, [value.trim()]);
    }
    if let Some((key, value)) = term.split_once('=') {
        return Requirement::new(key.trim(), Operator::Equals, [value.trim()]);
    }
    if let Some(open) = term.find('(') {
        let head = term[..open].trim();
        let close = term
            .rfind(')')
            .filter(|c| *c > open && term[c + 1..].trim().is_empty())
            .ok_or_else(|| SelectorError::Syntax(format!("expected ')' at end of {term:?}")))?;
        let (key, op) = head
            .rsplit_once(char::is_whitespace)
            .ok_or_else(|| SelectorError::Syntax(format!("missing operator in {term:?}")))?;
        let operator = match op {
            "in" => Operator::In,
            "notin" => Operator::NotIn,
            other => return Err(SelectorError::InvalidOperator(other.to_string())),
        };
        let values: Vec<&str> = term[open + 1..close]
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect();
        return Requirement::new(key.trim(), operator, values);
    }
    if term.contains(char::is_whitespace) {
        return Err(SelectorError::Syntax(format!(
            "unexpected whitespace in {term:?}"
        )));
    }
    Requirement::new(term, Operator::Exists, Vec::<String>::new())
}

// ============================================================================
// Field selectors
// ============================================================================

/// One field requirement, e.g. `metadata.name!=cluster-s`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRequirement {
    pub field: String,
    pub negated: bool,
    pub value: String,
}

/// A conjunction of field requirements. The empty selector matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<FieldRequirement>,
}

impl FieldSelector {
    #[must_use]
    pub fn everything() -> Self {
        Self::default()
    }

    /// Selector matching a single object by name.
    #[must_use]
    pub fn one_term_equal(field: &str, value: &str) -> Self {
        Self {
            requirements: vec![FieldRequirement {
                field: field.to_string(),
                negated: false,
                value: value.to_string(),
            }],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Whether every requirement holds. Missing fields compare as `""`.
    #[must_use]
    pub fn matches(&self, fields: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| {
            let actual = fields.get(&r.field).map_or("", String::as_str);
            (actual == r.value) != r.negated
        })
    }

    /// The value this selector requires for `field`, if it pins one exactly.
    #[must_use]
    pub fn requires_exact_match(&self, field: &str) -> Option<&str> {
        self.requirements
            .iter()
            .find(|r| r.field == field && !r.negated)
            .map(|r| r.value.as_str())
    }

    /// Parse an optional selector string; `None` and `""` select everything.
    ///
    /// # Errors
    ///
    /// Returns an error if the selector text is malformed.
    pub fn parse_optional(selector: Option<&str>) -> Result<Self, SelectorError> {
        selector.map_or_else(|| Ok(Self::everything()), str::parse)
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .requirements
            .iter()
            .map(|r| {
                let op = if r.negated { "!=" } else { "=" };
                format!("{}{op}{}", r.field, r.value)
            })
            .collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for FieldSelector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut requirements = Vec::new();
        for term in s.split(',').map(str::trim) {
            if term.is_empty() {
                if s.trim().is_empty() {
                    break;
                }
                return Err(SelectorError::Syntax(format!("empty field requirement in {s:?}")));
            }
            let (field, negated, value) = if let Some((f, v)) = term.split_once("!=") {
                (f, true, v)
            } else if let Some((f, v)) = term.split_once("==") {
                (f, false, v)
            } else if let Some((f, v)) = term.split_once('=') {
                (f, false, v)
            } else {
                return Err(SelectorError::Syntax(format!(
                    "invalid field selector {term:?}: no operator"
                )));
            };
            let field = field.trim();
            if field.is_empty() {
                return Err(SelectorError::Syntax(format!(
                    "invalid field selector {term:?}: empty field"
                )));
            }
            requirements.push(FieldRequirement {
                field: field.to_string(),
                negated,
                value: value.trim().to_string(),
            });
        }
        Ok(Self { requirements })
    }
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod selector_tests;
