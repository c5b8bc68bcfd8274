//! Request fingerprinting.
//!
//! A [`CacheKey`] is the hex SHA-256 of a length-prefixed sequence of
//! canonicalized fields. The hash is stable across processes, so keys
//! written to a durable store remain valid after a restart.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Namespace;
use crate::types::RequestDescriptor;

/// Deterministic cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hash `parts` under `namespace`.
    ///
    /// Parts are length-prefixed, so `["ab", "c"]` and `["a", "bc"]`
    /// produce different keys.
    pub fn from_parts(namespace: Namespace, parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_str().as_bytes());
        for part in parts {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase and collapse all runs of whitespace to a single space.
pub fn canonicalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pipeline stages enabled for one request, after request overrides are
/// applied to the orchestrator defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageSwitches {
    pub translation: bool,
    pub context: bool,
    pub evaluation: bool,
}

impl StageSwitches {
    fn as_flags(self) -> &'static str {
        const FLAGS: [&str; 8] = ["---", "--e", "-c-", "-ce", "t--", "t-e", "tc-", "tce"];
        let index = (usize::from(self.translation) << 2)
            | (usize::from(self.context) << 1)
            | usize::from(self.evaluation);
        FLAGS[index]
    }
}

/// Fingerprint the cache-relevant fields of a request.
///
/// Covered: task, priority, canonical input, canonical system instruction,
/// target language, custom selection criteria and the resolved stage
/// switches. Sampling knobs (temperature, max tokens) are left out.
pub fn fingerprint(request: &RequestDescriptor, stages: StageSwitches) -> CacheKey {
    let options = &request.options;
    let input = canonicalize(&request.input);
    let instruction = options
        .system_instruction
        .as_deref()
        .map(canonicalize)
        .unwrap_or_default();
    let target = options
        .target_language
        .as_deref()
        .map(|t| t.trim().to_ascii_lowercase())
        .unwrap_or_default();
    let criteria = options
        .criteria
        .as_ref()
        .and_then(|c| serde_json::to_string(c).ok())
        .unwrap_or_default();

    CacheKey::from_parts(
        Namespace::Generation,
        &[
            request.task.as_str(),
            request.priority.as_str(),
            &input,
            &instruction,
            &target,
            &criteria,
            stages.as_flags(),
        ],
    )
}
