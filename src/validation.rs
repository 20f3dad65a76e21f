// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Field-level validation errors and object metadata validation.
//!
//! Validation never stops at the first problem: every helper appends to a
//! [`FieldErrors`] list so a rejected write reports all violated fields in a
//! single response.
//!
//! # Example
//!
//! ```rust
//! use cluster_registry::validation::{FieldPath, FieldErrors, validate_dns1123_label};
//!
//! let mut errs = FieldErrors::default();
//! for msg in validate_dns1123_label("Not_A_Label") {
//!     errs.invalid(&FieldPath::new("metadata").child("name"), "Not_A_Label", msg);
//! }
//! assert_eq!(errs.len(), 1);
//! ```

use crate::constants::{
    DNS1123_LABEL_MAX_LENGTH, DNS1123_SUBDOMAIN_MAX_LENGTH, FINALIZER_DELETE_DEPENDENTS,
    FINALIZER_ORPHAN_DEPENDENTS, LABEL_VALUE_MAX_LENGTH, QUALIFIED_NAME_MAX_LENGTH,
    TOTAL_ANNOTATION_SIZE_LIMIT_BYTES,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

/// Path to a field inside an object, rendered as `spec.items[0].name`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldPath(String);

impl FieldPath {
    /// Start a path at a top-level field.
    #[must_use]
    pub fn new(root: &str) -> Self {
        Self(root.to_string())
    }

    /// The empty path, used when an error concerns the whole object.
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}.{name}", self.0))
        }
    }

    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{index}]", self.0))
    }

    #[must_use]
    pub fn key(&self, key: &str) -> Self {
        Self(format!("{}[{key}]", self.0))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category of a field validation failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldErrorType {
    /// A required field is missing or empty.
    Required,
    /// A value is malformed.
    Invalid,
    /// A field may not be set or changed.
    Forbidden,
    /// A value appears more than once where it must be unique.
    Duplicate,
    /// A value is well-formed but not one of the accepted values.
    NotSupported,
    /// A value exceeds its length limit.
    TooLong,
}

impl FieldErrorType {
    fn describe(self) -> &'static str {
        match self {
            Self::Required => "Required value",
            Self::Invalid => "Invalid value",
            Self::Forbidden => "Forbidden",
            Self::Duplicate => "Duplicate value",
            Self::NotSupported => "Unsupported value",
            Self::TooLong => "Too long",
        }
    }
}

/// A single field-level validation failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    pub error_type: FieldErrorType,
    pub field: String,
    pub bad_value: Option<String>,
    pub detail: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.field.is_empty() {
            write!(f, "{}: ", self.field)?;
        }
        write!(f, "{}", self.error_type.describe())?;
        if let Some(value) = &self.bad_value {
            write!(f, ": {value:?}")?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// Ordered list of field errors. Empty means the object is acceptable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn extend(&mut self, other: FieldErrors) {
        self.0.extend(other.0);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.0.iter()
    }

    /// Whether any error concerns exactly `field`.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    pub fn required(&mut self, path: &FieldPath, detail: impl Into<String>) {
        self.push(FieldError {
            error_type: FieldErrorType::Required,
            field: path.to_string(),
            bad_value: None,
            detail: detail.into(),
        });
    }

    pub fn invalid(&mut self, path: &FieldPath, value: impl Into<String>, detail: impl Into<String>) {
        self.push(FieldError {
            error_type: FieldErrorType::Invalid,
            field: path.to_string(),
            bad_value: Some(value.into()),
            detail: detail.into(),
        });
    }

    pub fn forbidden(&mut self, path: &FieldPath, detail: impl Into<String>) {
        self.push(FieldError {
            error_type: FieldErrorType::Forbidden,
            field: path.to_string(),
            bad_value: None,
            detail: detail.into(),
        });
    }

    pub fn duplicate(&mut self, path: &FieldPath, value: impl Into<String>) {
        self.push(FieldError {
            error_type: FieldErrorType::Duplicate,
            field: path.to_string(),
            bad_value: Some(value.into()),
            detail: String::new(),
        });
    }

    pub fn not_supported(&mut self, path: &FieldPath, value: impl Into<String>, supported: &[&str]) {
        let supported = supported
            .iter()
            .map(|s| format!("{s:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.push(FieldError {
            error_type: FieldErrorType::NotSupported,
            field: path.to_string(),
            bad_value: Some(value.into()),
            detail: format!("supported values: {supported}"),
        });
    }

    pub fn too_long(&mut self, path: &FieldPath, max: usize) {
        self.push(FieldError {
            error_type: FieldErrorType::TooLong,
            field: path.to_string(),
            bad_value: None,
            detail: format!("must have at most {max} bytes"),
        });
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => Ok(()),
            [single] => write!(f, "{single}"),
            many => {
                f.write_str("[")?;
                for (i, err) in many.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{err}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<Vec<FieldError>> for FieldErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

impl IntoIterator for FieldErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ============================================================================
// String format checks
// ============================================================================

fn is_lower_alnum(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

fn is_alnum(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// Check a DNS-1123 label (e.g. `my-name`). Returns one message per problem.
#[must_use]
pub fn validate_dns1123_label(value: &str) -> Vec<String> {
    let mut errs = Vec::new();
    if value.len() > DNS1123_LABEL_MAX_LENGTH {
        errs.push(format!(
            "must be no more than {DNS1123_LABEL_MAX_LENGTH} characters"
        ));
    }
    let well_formed = !value.is_empty()
        && value.chars().all(|c| is_lower_alnum(c) || c == '-')
        && value.starts_with(is_lower_alnum)
        && value.ends_with(is_lower_alnum);
    if !well_formed {
        errs.push(
            "a lowercase RFC 1123 label must consist of lower case alphanumeric characters or '-', \
             and must start and end with an alphanumeric character"
                .to_string(),
        );
    }
    errs
}

/// Check a DNS-1123 subdomain (e.g. `example.com`). Returns one message per problem.
#[must_use]
pub fn validate_dns1123_subdomain(value: &str) -> Vec<String> {
    let mut errs = Vec::new();
    if value.len() > DNS1123_SUBDOMAIN_MAX_LENGTH {
        errs.push(format!(
            "must be no more than {DNS1123_SUBDOMAIN_MAX_LENGTH} characters"
        ));
    }
    let well_formed = !value.is_empty()
        && value.split('.').all(|part| {
            !part.is_empty()
                && part.chars().all(|c| is_lower_alnum(c) || c == '-')
                && part.starts_with(is_lower_alnum)
                && part.ends_with(is_lower_alnum)
        });
    if !well_formed {
        errs.push(
            "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, \
             '-' or '.', and must start and end with an alphanumeric character"
                .to_string(),
        );
    }
    errs
}

fn validate_qualified_name_part(name: &str) -> Vec<String> {
    let mut errs = Vec::new();
    if name.len() > QUALIFIED_NAME_MAX_LENGTH {
        errs.push(format!(
            "name part must be no more than {QUALIFIED_NAME_MAX_LENGTH} characters"
        ));
    }
    let well_formed = !name.is_empty()
        && name
            .chars()
            .all(|c| is_alnum(c) || c == '-' || c == '_' || c == '.')
        && name.starts_with(is_alnum)
        && name.ends_with(is_alnum);
    if !well_formed {
        errs.push(
            "name part must consist of alphanumeric characters, '-', '_' or '.', \
             and must start and end with an alphanumeric character"
                .to_string(),
        );
    }
    errs
}

/// Check a qualified name such as a label key (`example.com/my-key` or `my-key`).
#[must_use]
pub fn validate_qualified_name(value: &str) -> Vec<String> {
    match value.split_once('/') {
        Some((prefix, name)) => {
            let mut errs = Vec::new();
            if prefix.is_empty() {
                errs.push("prefix part must be non-empty".to_string());
            } else {
                errs.extend(
                    validate_dns1123_subdomain(prefix)
                        .into_iter()
                        .map(|m| format!("prefix part {m}")),
                );
            }
            if name.contains('/') {
                errs.push(
                    "a qualified name must consist of an optional DNS subdomain prefix and a name, separated by '/'"
                        .to_string(),
                );
            } else {
                errs.extend(validate_qualified_name_part(name));
            }
            errs
        }
        None => validate_qualified_name_part(value),
    }
}

/// Check a label value. Empty values are allowed.
#[must_use]
pub fn validate_label_value(value: &str) -> Vec<String> {
    let mut errs = Vec::new();
    if value.len() > LABEL_VALUE_MAX_LENGTH {
        errs.push(format!(
            "must be no more than {LABEL_VALUE_MAX_LENGTH} characters"
        ));
    }
    if !value.is_empty() {
        let well_formed = value
            .chars()
            .all(|c| is_alnum(c) || c == '-' || c == '_' || c == '.')
            && value.starts_with(is_alnum)
            && value.ends_with(is_alnum);
        if !well_formed {
            errs.push(
                "a valid label must be an empty string or consist of alphanumeric characters, \
                 '-', '_' or '.', and must start and end with an alphanumeric character"
                    .to_string(),
            );
        }
    }
    errs
}

/// Check a CIDR such as `10.0.0.0/8` or `fd00::/64`.
#[must_use]
pub fn validate_cidr(value: &str) -> Vec<String> {
    let Some((addr, prefix)) = value.split_once('/') else {
        return vec!["must be a valid CIDR value, (e.g. 10.9.8.0/24 or 2001:db8::/64)".to_string()];
    };
    let Ok(ip) = addr.parse::<IpAddr>() else {
        return vec![format!("{addr:?} is not a valid IP address")];
    };
    let max = if ip.is_ipv4() { 32 } else { 128 };
    match prefix.parse::<u8>() {
        Ok(bits) if bits <= max => Vec::new(),
        _ => vec![format!("prefix length must be between 0 and {max}")],
    }
}

// ============================================================================
// Object metadata validation
// ============================================================================

/// Validate a label map.
#[must_use]
pub fn validate_labels(labels: &BTreeMap<String, String>, path: &FieldPath) -> FieldErrors {
    let mut errs = FieldErrors::default();
    for (key, value) in labels {
        for msg in validate_qualified_name(key) {
            errs.invalid(path, key.as_str(), msg);
        }
        for msg in validate_label_value(value) {
            errs.invalid(&path.key(key), value.as_str(), msg);
        }
    }
    errs
}

/// Validate an annotation map: qualified keys and a bounded total size.
#[must_use]
pub fn validate_annotations(annotations: &BTreeMap<String, String>, path: &FieldPath) -> FieldErrors {
    let mut errs = FieldErrors::default();
    let mut total = 0usize;
    for (key, value) in annotations {
        for msg in validate_qualified_name(&key.to_lowercase()) {
            errs.invalid(path, key.as_str(), msg);
        }
        total += key.len() + value.len();
    }
    if total > TOTAL_ANNOTATION_SIZE_LIMIT_BYTES {
        errs.too_long(path, TOTAL_ANNOTATION_SIZE_LIMIT_BYTES);
    }
    errs
}

/// Validate finalizer names and their mutual exclusions.
#[must_use]
pub fn validate_finalizers(finalizers: &[String], path: &FieldPath) -> FieldErrors {
    let mut errs = FieldErrors::default();
    for (i, finalizer) in finalizers.iter().enumerate() {
        for msg in validate_qualified_name(finalizer) {
            errs.invalid(&path.index(i), finalizer.as_str(), msg);
        }
    }
    let has = |name: &str| finalizers.iter().any(|f| f == name);
    if has(FINALIZER_ORPHAN_DEPENDENTS) && has(FINALIZER_DELETE_DEPENDENTS) {
        errs.invalid(
            path,
            format!("{finalizers:?}"),
            format!(
                "finalizer {FINALIZER_ORPHAN_DEPENDENTS} and {FINALIZER_DELETE_DEPENDENTS} cannot be both set"
            ),
        );
    }
    errs
}

/// Validate standard object metadata.
///
/// `namespaced` selects whether a namespace is required or forbidden, and
/// `validate_name` is the kind's name format check.
#[must_use]
pub fn validate_object_meta(
    meta: &ObjectMeta,
    namespaced: bool,
    validate_name: fn(&str) -> Vec<String>,
    path: &FieldPath,
) -> FieldErrors {
    let mut errs = FieldErrors::default();

    match meta.name.as_deref() {
        None | Some("") => {
            if meta.generate_name.as_deref().unwrap_or_default().is_empty() {
                errs.required(&path.child("name"), "name or generateName is required");
            }
        }
        Some(name) => {
            for msg in validate_name(name) {
                errs.invalid(&path.child("name"), name, msg);
            }
        }
    }

    if let Some(generate_name) = meta.generate_name.as_deref().filter(|g| !g.is_empty()) {
        // the prefix only has to be valid once a suffix is appended
        let probe = format!("{generate_name}x");
        for msg in validate_name(&probe) {
            errs.invalid(&path.child("generateName"), generate_name, msg);
        }
    }

    match (namespaced, meta.namespace.as_deref()) {
        (true, None | Some("")) => errs.required(&path.child("namespace"), ""),
        (true, Some(ns)) => {
            for msg in validate_dns1123_label(ns) {
                errs.invalid(&path.child("namespace"), ns, msg);
            }
        }
        (false, Some(ns)) if !ns.is_empty() => {
            errs.forbidden(&path.child("namespace"), "not allowed on this type");
        }
        (false, _) => {}
    }

    if let Some(generation) = meta.generation {
        if generation < 0 {
            errs.invalid(
                &path.child("generation"),
                generation.to_string(),
                "must be greater than or equal to 0",
            );
        }
    }

    if let Some(labels) = &meta.labels {
        errs.extend(validate_labels(labels, &path.child("labels")));
    }
    if let Some(annotations) = &meta.annotations {
        errs.extend(validate_annotations(annotations, &path.child("annotations")));
    }
    if let Some(finalizers) = &meta.finalizers {
        errs.extend(validate_finalizers(finalizers, &path.child("finalizers")));
    }

    errs
}

/// Validate metadata changes between the stored object and an update.
///
/// Name, namespace, uid and creation timestamp are immutable; a deletion
/// timestamp cannot be removed once set.
#[must_use]
pub fn validate_object_meta_update(new: &ObjectMeta, old: &ObjectMeta, path: &FieldPath) -> FieldErrors {
    let mut errs = FieldErrors::default();

    let immutable = |errs: &mut FieldErrors, field: &str, new: Option<&str>, old: Option<&str>| {
        if new.unwrap_or_default() != old.unwrap_or_default() {
            errs.invalid(
                &path.child(field),
                new.unwrap_or_default(),
                "field is immutable",
            );
        }
    };

    immutable(&mut errs, "name", new.name.as_deref(), old.name.as_deref());
    immutable(&mut errs, "namespace", new.namespace.as_deref(), old.namespace.as_deref());
    immutable(&mut errs, "uid", new.uid.as_deref(), old.uid.as_deref());

    if new.creation_timestamp != old.creation_timestamp {
        errs.invalid(
            &path.child("creationTimestamp"),
            new.creation_timestamp
                .as_ref()
                .and_then(|t| {
                    chrono::DateTime::from_timestamp(t.0.as_second(), t.0.subsec_nanosecond() as u32)
                })
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            "field is immutable",
        );
    }

    if old.deletion_timestamp.is_some() && new.deletion_timestamp.is_none() {
        errs.forbidden(
            &path.child("deletionTimestamp"),
            "field cannot be unset once set",
        );
    }

    errs
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod validation_tests;
