//! `KEY=VALUE` tool-argument parsing.
//!
//! Extra and override arguments for the image-builder tool travel as raw
//! `KEY=VALUE` strings (`--define` on the CLI, string arrays in the build
//! request). Parsing is strict: a missing `=` or an empty key is a
//! validation error, reported with the offending input.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One parsed `KEY=VALUE` definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineArg {
    pub key: String,
    pub value: String,
}

impl DefineArg {
    /// Parse a raw `KEY=VALUE` string. The value may contain further `=`
    /// characters; only the first one splits. Values may be empty.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| ValidationError::MalformedDefine(raw.into()))?;
        if key.is_empty() {
            return Err(ValidationError::MalformedDefine(raw.into()));
        }
        Ok(Self { key: key.to_string(), value: value.to_string() })
    }

    /// Parse a list of raw definitions, failing on the first malformed one.
    pub fn parse_all<I, S>(raw: I) -> Result<Vec<Self>, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter().map(|s| Self::parse(s.as_ref())).collect()
    }
}

impl std::fmt::Display for DefineArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}
