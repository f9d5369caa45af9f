//! Gem archive ingestion
//!
//! A `.gem` file is a plain tar archive holding `metadata.gz` (the gzipped
//! YAML gem specification), `data.tar.gz` and `checksums.yaml.gz`. Only the
//! specification is read. Each layer has its own decoder so it can be
//! exercised on its own:
//!
//! 1. [`read_metadata_entry`] finds `metadata.gz` in the tar container
//! 2. [`gunzip`] inflates it
//! 3. [`parse_specification`] turns the YAML into a [`GemMetadata`]
//!
//! [`Gem::load`] runs all three.

use bytes::Bytes;
use flate2::read::GzDecoder;
use serde_yaml_ng::Value;
use std::io::Read;
use tracing::debug;

use crate::types::{Dependency, GemMetadata};
use crate::validation;

/// Name of the specification entry inside a gem archive.
pub const METADATA_ENTRY: &str = "metadata.gz";

/// Dependency type kept in the index; development dependencies are dropped.
pub const RUNTIME_DEPENDENCY: &str = ":runtime";

/// Platform assumed when a specification does not name one.
pub const DEFAULT_PLATFORM: &str = "ruby";

#[derive(Debug, thiserror::Error)]
pub enum GemError {
    #[error("metadata.gz not found in gem archive")]
    MetadataNotFound,

    #[error("failed to read gem archive: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid gem specification: {0}")]
    Malformed(String),
}

/// An uploaded gem: the raw archive and the metadata read from it.
#[derive(Debug, Clone)]
pub struct Gem {
    raw: Bytes,
    pub metadata: GemMetadata,
}

impl Gem {
    /// Parse a raw `.gem` archive.
    pub fn load(raw: Bytes) -> Result<Self, GemError> {
        let compressed = read_metadata_entry(&raw)?;
        let spec = gunzip(&compressed)?;
        let metadata = parse_specification(&spec)?;
        debug!(gem = %metadata, dependencies = metadata.dependencies.len(), "Loaded gem specification");
        Ok(Self { raw, metadata })
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Blob store key of this gem, `gems/{name}-{number}.gem`.
    pub fn blob_key(&self) -> String {
        self.metadata.blob_key()
    }
}

/// Return the bytes of the first `metadata.gz` entry in the tar container.
///
/// Scanning stops at the first match. An archive without the entry yields
/// [`GemError::MetadataNotFound`]; an entry larger than
/// [`validation::MAX_METADATA_ENTRY_SIZE`] is [`GemError::Malformed`].
pub fn read_metadata_entry(archive: &[u8]) -> Result<Vec<u8>, GemError> {
    let mut archive = tar::Archive::new(archive);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path_bytes().as_ref() != METADATA_ENTRY.as_bytes() {
            continue;
        }

        let limit = validation::MAX_METADATA_ENTRY_SIZE as u64;
        if entry.size() > limit {
            return Err(GemError::Malformed(format!(
                "{METADATA_ENTRY} declares {} bytes, limit is {limit}",
                entry.size()
            )));
        }

        let mut contents = Vec::new();
        entry.take(limit + 1).read_to_end(&mut contents)?;
        if contents.len() as u64 > limit {
            return Err(GemError::Malformed(format!(
                "{METADATA_ENTRY} exceeds {limit} bytes"
            )));
        }
        return Ok(contents);
    }
    Err(GemError::MetadataNotFound)
}

/// Inflate a gzip stream, refusing to produce more than
/// [`validation::MAX_METADATA_SIZE`] bytes.
pub fn gunzip(compressed: &[u8]) -> Result<Vec<u8>, GemError> {
    let limit = validation::MAX_METADATA_SIZE as u64;
    let mut decoded = Vec::new();
    GzDecoder::new(compressed)
        .take(limit + 1)
        .read_to_end(&mut decoded)?;

    if decoded.len() as u64 > limit {
        return Err(GemError::Malformed(format!(
            "specification exceeds {limit} bytes when decompressed"
        )));
    }
    Ok(decoded)
}

/// Parse a YAML gem specification into normalized metadata.
pub fn parse_specification(yaml: &[u8]) -> Result<GemMetadata, GemError> {
    let document: Value = serde_yaml_ng::from_slice(yaml)
        .map_err(|e| GemError::Malformed(format!("not a YAML document: {e}")))?;
    let spec = untag(document);

    let name = spec
        .get("name")
        .and_then(scalar)
        .ok_or_else(|| GemError::Malformed("missing name".to_string()))?;
    let number = spec
        .get("version")
        .and_then(|v| v.get("version"))
        .and_then(version_text)
        .ok_or_else(|| GemError::Malformed("missing version.version".to_string()))?;
    let platform = spec
        .get("platform")
        .and_then(scalar)
        .unwrap_or_else(|| DEFAULT_PLATFORM.to_string());

    validation::validate_gem_name(&name)
        .map_err(|e| GemError::Malformed(format!("invalid name '{name}': {e}")))?;
    validation::validate_version(&number)
        .map_err(|e| GemError::Malformed(format!("invalid version '{number}': {e}")))?;

    let dependencies = match spec.get("dependencies") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(entries)) => runtime_dependencies(entries)?,
        Some(_) => {
            return Err(GemError::Malformed(
                "dependencies is not a list".to_string(),
            ))
        }
    };

    Ok(GemMetadata {
        name,
        number,
        platform,
        dependencies,
    })
}

fn runtime_dependencies(entries: &[Value]) -> Result<Vec<Dependency>, GemError> {
    let mut dependencies = Vec::new();
    for entry in entries {
        if entry.get("type").and_then(Value::as_str) != Some(RUNTIME_DEPENDENCY) {
            continue;
        }

        let name = entry
            .get("name")
            .and_then(scalar)
            .ok_or_else(|| GemError::Malformed("dependency without a name".to_string()))?;
        let requirement = first_requirement(entry).ok_or_else(|| {
            GemError::Malformed(format!("dependency {name} has no usable requirement"))
        })?;
        dependencies.push(Dependency(name, requirement));
    }
    Ok(dependencies)
}

// `requirement.requirements[0]` is `[op, {version: v}]`; the result is "op v".
fn first_requirement(dependency: &Value) -> Option<String> {
    let first = dependency
        .get("requirement")?
        .get("requirements")?
        .as_sequence()?
        .first()?
        .as_sequence()?;
    let op = first.first().and_then(scalar)?;
    let version = first.get(1)?.get("version").and_then(version_text)?;
    Some(format!("{op} {version}"))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// Versions must be YAML strings; a bare number like `1.10` has already lost
// its original text.
fn version_text(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

// Drop Ruby object tags (`!ruby/object:Gem::Version` and friends) at every level.
fn untag(value: Value) -> Value {
    match value {
        Value::Tagged(tagged) => untag(tagged.value),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(untag).collect()),
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(key, value)| (untag(key), untag(value)))
                .collect(),
        ),
        other => other,
    }
}
