//! Signature-based screening of bound string values.
//!
//! Matches classic injection payloads. Legitimate text containing `;` or
//! `--` matches too; see [`InjectionPolicy`].

use crate::error::{BridgeError, BridgeResult};
use crate::value::Value;
use regex::Regex;
use std::sync::OnceLock;

/// What a service does when a bound value matches a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectionPolicy {
    /// Fail the call without executing anything.
    #[default]
    Reject,
    /// Log a warning and execute anyway.
    Warn,
    /// Skip screening.
    Off,
}

struct Signature {
    name: &'static str,
    regex: Regex,
}

fn signatures() -> &'static [Signature] {
    static SIGNATURES: OnceLock<Vec<Signature>> = OnceLock::new();
    SIGNATURES.get_or_init(|| {
        [
            ("OR 1=1", r"(?i)OR\s+1\s*=\s*1"),
            (r#"" OR ""=""#, r#"(?i)"\s+OR\s+""=""#),
            ("statement separator ';'", r";"),
            ("line comment '--'", r"--"),
            ("block comment '/* */'", r"(?s)/\*.*\*/"),
        ]
        .into_iter()
        .map(|(name, pattern)| Signature {
            name,
            regex: Regex::new(pattern).expect("invalid built-in injection signature"),
        })
        .collect()
    })
}

/// Name of the first signature `value` matches, if any.
pub fn find_signature(value: &str) -> Option<&'static str> {
    signatures()
        .iter()
        .find(|sig| sig.regex.is_match(value))
        .map(|sig| sig.name)
}

/// Check every string-typed value; return the first offender as an error.
pub fn screen<'a>(values: impl IntoIterator<Item = &'a Value>) -> BridgeResult<()> {
    for value in values {
        if let Value::Text(text) = value {
            if let Some(pattern) = find_signature(text) {
                return Err(BridgeError::SuspectedInjection {
                    value: text.clone(),
                    pattern,
                });
            }
        }
    }
    Ok(())
}
