use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HisdbError;

/// A dataset partition in the unified layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Partition {
    #[serde(rename = "train")]
    Train,
    #[serde(rename = "val")]
    Val,
    #[serde(rename = "test")]
    Test,
    #[serde(rename = "test-public")]
    TestPublic,
}

impl Partition {
    pub const ALL: [Partition; 4] = [
        Partition::Train,
        Partition::Val,
        Partition::Test,
        Partition::TestPublic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Train => "train",
            Partition::Val => "val",
            Partition::Test => "test",
            Partition::TestPublic => "test-public",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = HisdbError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "train" => Ok(Partition::Train),
            "val" => Ok(Partition::Val),
            "test" => Ok(Partition::Test),
            "test-public" => Ok(Partition::TestPublic),
            _ => Err(HisdbError::InvalidPartition(value.to_string())),
        }
    }
}

/// Which half of a partition a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Data,
    Gt,
}

impl Kind {
    pub const ALL: [Kind; 2] = [Kind::Data, Kind::Gt];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Data => "data",
            Kind::Gt => "gt",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short alphanumeric code naming a document collection, e.g. `CB55`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionId(String);

impl CollectionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Only for literals known to be valid.
    pub(crate) fn from_str_unchecked(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CollectionId {
    type Err = HisdbError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            return Err(HisdbError::InvalidCollection(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}
