//! Content-derived identifiers for build documents
//!
//! A build's identifier is `v1:<sha256 hex>` over the canonical JSON form of the
//! document. Canonical form sorts every mapping's keys, so two documents that
//! differ only in key order get the same identifier.
//!
//! Residual risk: two distinct documents hashing to the same digest is not
//! prevented here. The single-insert path compares stored content on every
//! duplicate hit and reports a mismatch as a collision (see `record_store`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Version prefix of the hashing/serialization rule
pub const HASH_SCHEME_VERSION: &str = "v1";

/// Length of a hex-encoded SHA-256 digest
const DIGEST_HEX_LEN: usize = 64;

/// Content identifier of a build record, e.g. `v1:9f86d0...`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildHash(String);

impl BuildHash {
    /// Compute the identifier of a document
    pub fn of(document: &Value) -> Self {
        let digest = Sha256::digest(canonical_json(document).as_bytes());
        Self(format!("{}:{:x}", HASH_SCHEME_VERSION, digest))
    }

    /// Parse an identifier previously produced by [`BuildHash::of`]
    ///
    /// Only for lookups (search hits, stored rows). Ingestion never accepts
    /// an identifier from outside; it always recomputes it from content.
    pub fn parse(s: &str) -> Option<Self> {
        let (scheme, digest) = s.split_once(':')?;
        if scheme != HASH_SCHEME_VERSION
            || digest.len() != DIGEST_HEX_LEN
            || !digest.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return None;
        }
        Some(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for BuildHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document paired with the identifier computed from it
///
/// The only way to build one is from the document itself, so an identifier
/// can never be supplied (or forged) by a caller.
#[derive(Debug, Clone)]
pub struct IdentifiedBuild {
    hash: BuildHash,
    document: Value,
}

impl IdentifiedBuild {
    pub fn new(document: Value) -> Self {
        Self {
            hash: BuildHash::of(&document),
            document,
        }
    }

    pub fn hash(&self) -> &BuildHash {
        &self.hash
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn into_parts(self) -> (BuildHash, Value) {
        (self.hash, self.document)
    }
}

/// Shorthand for `BuildHash::of`
pub fn identify(document: &Value) -> BuildHash {
    BuildHash::of(document)
}

/// Serialize a document with all mapping keys sorted
///
/// Independent of whether serde_json preserves insertion order: maps are
/// rebuilt in sorted order before writing.
pub fn canonical_json(document: &Value) -> String {
    canonicalize(document).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
