//! Gem metadata records
//!
//! [`GemMetadata`] is the normalized record shared by the index, the upstream
//! dependency API and the Marshal encoder. Its JSON shape matches the RubyGems
//! `dependencies.json` endpoint:
//!
//! ```json
//! {"name": "sinatra", "number": "2.0.0", "platform": "ruby",
//!  "dependencies": [["rack", "~> 2.0"], ["tilt", "~> 2.0"]]}
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A runtime dependency as `(name, requirement)`, e.g. `("rack", "~> 2.0")`.
///
/// Serializes as a two element JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency(pub String, pub String);

impl Dependency {
    pub fn new(name: impl Into<String>, requirement: impl Into<String>) -> Self {
        Self(name.into(), requirement.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn requirement(&self) -> &str {
        &self.1
    }
}

/// Normalized metadata of one gem version.
///
/// `number` is opaque: it is compared byte-for-byte and never parsed.
/// Capitalized field names are accepted on input so index snapshots written
/// with Go-style keys still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GemMetadata {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Number")]
    pub number: String,
    #[serde(alias = "Platform", default)]
    pub platform: String,
    #[serde(
        alias = "Dependencies",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub dependencies: Vec<Dependency>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Dependency>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Dependency>>::deserialize(deserializer)?.unwrap_or_default())
}

impl GemMetadata {
    /// True when both records identify the same gem version.
    pub fn same_version(&self, name: &str, number: &str) -> bool {
        self.name == name && self.number == number
    }

    /// Blob store key of the raw `.gem` file.
    pub fn blob_key(&self) -> String {
        format!("gems/{}-{}.gem", self.name, self.number)
    }
}

impl fmt::Display for GemMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.number)
    }
}
