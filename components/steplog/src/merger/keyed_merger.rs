//! Upsert-by-key combination of a base collection with `key=value` override tokens.
//!
//! One algorithm serves resource bindings, parameters and labels; only the shape
//! of the value differs, which is what [`Keyed::from_override`] provides.
//!
//! - Every token is split on its first `=`; anything after it (commas included) is
//!   the value. A token without `=` fails the whole merge.
//! - Later tokens win over earlier ones for the same key.
//! - Base entries whose key is overridden are replaced in place.
//! - Overrides for keys absent from the base are appended in token order.

// Local crates
use crate::platform::models::{Label, Param, ParamValue, ResourceBinding};

// External crates
use std::collections::HashMap;
use std::fmt;
use tracing::instrument;

/// What an override token configures. Only used to word the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideKind {
    /// `-i`/`-o` resource bindings.
    Resource,
    /// `-p` parameters.
    Param,
    /// `-l` labels.
    Label,
}

impl fmt::Display for OverrideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resource => "resource",
            Self::Param => "param",
            Self::Label => "label",
        })
    }
}

/// Merge failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    /// A token without `=`, or with an empty key or value.
    #[error("invalid input format for {kind} parameter: {raw}")]
    InvalidFormat {
        /// Kind of override the token was given for.
        kind: OverrideKind,
        /// The token as typed.
        raw: String,
    },
}

/// An entry that can be upserted by key from a `key=value` token.
pub trait Keyed: Sized {
    /// Used in error messages.
    const KIND: OverrideKind;

    /// Identity used for upserts.
    fn key(&self) -> &str;

    /// Entry built from a parsed token.
    fn from_override(key: &str, value: &str) -> Self;
}

impl Keyed for ResourceBinding {
    const KIND: OverrideKind = OverrideKind::Resource;

    fn key(&self) -> &str {
        &self.name
    }

    fn from_override(key: &str, value: &str) -> Self {
        Self {
            name: key.to_string(),
            resource_ref: value.to_string(),
        }
    }
}

impl Keyed for Param {
    const KIND: OverrideKind = OverrideKind::Param;

    fn key(&self) -> &str {
        &self.name
    }

    fn from_override(key: &str, value: &str) -> Self {
        Self {
            name: key.to_string(),
            value: ParamValue::parse(value),
        }
    }
}

impl Keyed for Label {
    const KIND: OverrideKind = OverrideKind::Label;

    fn key(&self) -> &str {
        &self.key
    }

    fn from_override(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Split one raw token into `(key, value)`.
pub fn parse_override(kind: OverrideKind, raw: &str) -> Result<(&str, &str), MergeError> {
    raw.split_once('=').ok_or_else(|| MergeError::InvalidFormat {
        kind,
        raw: raw.to_string(),
    })
}

/// Merge `overrides` into `base`. See the module docs for the ordering rules.
#[instrument(
    name = "steplog_merger::merge",
    target = "merger::keyed_merger",
    level = "trace",
    skip_all,
    fields(kind = %T::KIND, base = base.len(), overrides = overrides.len())
)]
pub fn merge<T, S>(mut base: Vec<T>, overrides: &[S]) -> Result<Vec<T>, MergeError>
where
    T: Keyed,
    S: AsRef<str>,
{
    // key -> position of its last occurrence among the overrides
    let mut latest: HashMap<&str, usize> = HashMap::new();
    let mut parsed: Vec<(&str, &str)> = Vec::with_capacity(overrides.len());
    for raw in overrides {
        let (key, value) = parse_override(T::KIND, raw.as_ref())?;
        match latest.get(key) {
            Some(&at) => parsed[at] = (key, value),
            None => {
                latest.insert(key, parsed.len());
                parsed.push((key, value));
            }
        }
    }

    if parsed.is_empty() {
        return Ok(base);
    }

    let mut consumed = vec![false; parsed.len()];
    for entry in base.iter_mut() {
        if let Some(&at) = latest.get(entry.key()) {
            let (key, value) = parsed[at];
            *entry = T::from_override(key, value);
            consumed[at] = true;
        }
    }

    base.extend(
        parsed
            .into_iter()
            .zip(consumed)
            .filter(|(_, used)| !used)
            .map(|((key, value), _)| T::from_override(key, value)),
    );

    tracing::trace!(merged = base.len(), "Overrides merged");
    Ok(base)
}
