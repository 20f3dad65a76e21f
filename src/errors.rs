// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Registry error taxonomy.
//!
//! Every layer (strategy, store adapter, backing store, typed and fake
//! clients) reports failures as a [`RegistryError`]. Errors are surfaced to
//! the caller unmodified; nothing in this crate retries or suppresses them.
//!
//! The variants mirror the Kubernetes `Status` reasons so that results from
//! the in-memory store and from a live API server can be handled the same
//! way:
//!
//! | Variant | HTTP | Reason |
//! |---|---|---|
//! | `NotFound` | 404 | `NotFound` |
//! | `AlreadyExists` | 409 | `AlreadyExists` |
//! | `Conflict` | 409 | `Conflict` |
//! | `Invalid` | 422 | `Invalid` |
//! | `Forbidden` | 403 | `Forbidden` |
//! | `BadRequest` | 400 | `BadRequest` |
//! | `Expired` | 410 | `Expired` |
//! | `Aggregate` | 500 | `InternalError` |

use crate::selector::SelectorError;
use crate::validation::{FieldErrorType, FieldError, FieldErrors};
use thiserror::Error;

/// Errors returned by registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The named object does not exist.
    #[error("{kind} \"{name}\" not found")]
    NotFound {
        /// Kind of the missing object
        kind: String,
        /// Name of the missing object
        name: String,
    },

    /// An object with the same name already exists.
    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists {
        /// Kind of the conflicting object
        kind: String,
        /// Name that collided
        name: String,
    },

    /// The submitted resource version (or another precondition) is stale.
    #[error("Operation cannot be fulfilled on {kind} \"{name}\": {reason}")]
    Conflict {
        /// Kind of the object
        kind: String,
        /// Name of the object
        name: String,
        /// Why the write could not be applied
        reason: String,
    },

    /// The object failed validation. `errors` lists every violated field.
    #[error("{kind} \"{name}\" is invalid: {errors}")]
    Invalid {
        /// Kind of the rejected object
        kind: String,
        /// Name of the rejected object
        name: String,
        /// All field-level failures
        errors: FieldErrors,
    },

    /// The operation is not permitted.
    #[error("{kind} \"{name}\" is forbidden: {reason}")]
    Forbidden {
        /// Kind of the object
        kind: String,
        /// Name of the object
        name: String,
        /// Why the operation is not permitted
        reason: String,
    },

    /// The request itself is malformed (bad selector, bad patch document).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A watch was requested from a resource version no longer retained.
    #[error("too old resource version: {requested} ({oldest})")]
    Expired {
        /// The version the caller asked for
        requested: String,
        /// The oldest version still available
        oldest: String,
    },

    /// Several independent operations failed (e.g. a collection delete).
    #[error("{}", format_aggregate(.0))]
    Aggregate(Vec<RegistryError>),

    /// Any other status returned by the API server.
    #[error("{message} ({reason}, HTTP {code})")]
    Api {
        /// HTTP status code
        code: u16,
        /// Kubernetes status reason
        reason: String,
        /// Server-provided message
        message: String,
    },

    /// Connection or protocol failure talking to the API server.
    #[error("transport error: {0}")]
    Transport(#[source] kube::Error),

    /// Object (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_aggregate(errors: &[RegistryError]) -> String {
    match errors {
        [] => String::new(),
        [single] => single.to_string(),
        many => format!(
            "[{}]",
            many.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

impl RegistryError {
    pub fn not_found(kind: &str, name: &str) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub fn already_exists(kind: &str, name: &str) -> Self {
        Self::AlreadyExists {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub fn conflict(kind: &str, name: &str, reason: impl Into<String>) -> Self {
        Self::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid(kind: &str, name: &str, errors: FieldErrors) -> Self {
        Self::Invalid {
            kind: kind.to_string(),
            name: name.to_string(),
            errors,
        }
    }

    pub fn forbidden(kind: &str, name: &str, reason: impl Into<String>) -> Self {
        Self::Forbidden {
            kind: kind.to_string(),
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of errors: empty → `None`, one → itself, more → `Aggregate`.
    #[must_use]
    pub fn aggregate(mut errors: Vec<RegistryError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Aggregate(errors)),
        }
    }

    /// HTTP status code equivalent of this error.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::AlreadyExists { .. } | Self::Conflict { .. } => 409,
            Self::Invalid { .. } => 422,
            Self::Forbidden { .. } => 403,
            Self::BadRequest(_) => 400,
            Self::Expired { .. } => 410,
            Self::Api { code, .. } => *code,
            Self::Transport(_) => 503,
            Self::Aggregate(_) | Self::Serialization(_) => 500,
        }
    }

    /// Kubernetes `Status` reason equivalent of this error.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::AlreadyExists { .. } => "AlreadyExists",
            Self::Conflict { .. } => "Conflict",
            Self::Invalid { .. } => "Invalid",
            Self::Forbidden { .. } => "Forbidden",
            Self::BadRequest(_) => "BadRequest",
            Self::Expired { .. } => "Expired",
            Self::Api { reason, .. } => reason,
            Self::Transport(_) => "ServiceUnavailable",
            Self::Aggregate(_) | Self::Serialization(_) => "InternalError",
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    #[must_use]
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid { .. })
    }

    /// Field errors carried by an `Invalid` error, if any.
    #[must_use]
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Invalid { errors, .. } => Some(errors),
            _ => None,
        }
    }

    /// Map a kube client error for an operation on `kind` named `name`.
    ///
    /// API status responses are translated by code and reason; everything
    /// else is a transport failure.
    #[must_use]
    pub fn from_kube(err: kube::Error, kind: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(resp) => match (resp.code, resp.reason.as_str()) {
                (404, _) => Self::not_found(kind, name),
                (409, "AlreadyExists") => Self::already_exists(kind, name),
                (409, _) => Self::conflict(kind, name, resp.message),
                (422, _) => Self::invalid(
                    kind,
                    name,
                    FieldErrors::from(vec![FieldError {
                        error_type: FieldErrorType::Invalid,
                        field: String::new(),
                        bad_value: None,
                        detail: resp.message,
                    }]),
                ),
                (403, _) => Self::forbidden(kind, name, resp.message),
                (400, _) => Self::BadRequest(resp.message),
                (410, _) => Self::Expired {
                    requested: String::new(),
                    oldest: resp.message,
                },
                (code, _) => Self::Api {
                    code,
                    reason: resp.reason,
                    message: resp.message,
                },
            },
            other => Self::Transport(other),
        }
    }
}

impl From<SelectorError> for RegistryError {
    fn from(err: SelectorError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
