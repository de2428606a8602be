use serde::{Deserialize, Serialize};

use crate::domain::{CollectionId, Partition};
use crate::error::HisdbError;

const PUBLIC_URL: &str =
    "https://diuf.unifr.ch/main/hisdoc/sites/diuf.unifr.ch.main.hisdoc/files/uploads/diva-hisdb/hisdoc/all.zip";
const PRIVATE_URL: &str = "https://diuf.unifr.ch/main/hisdoc/sites/diuf.unifr.ch.main.hisdoc/files/uploads/diva-hisdb/hisdoc/private-test/all-privateTest.zip";

/// Naming tables describing how a dataset is packaged upstream.
///
/// Everything source-specific lives here so that a new correction or
/// partition token is a data change rather than a code change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetProfile {
    /// Folder created under the output folder.
    pub dataset_dir: String,
    pub public_url: String,
    pub private_url: String,
    pub image_marker: String,
    pub gt_marker: String,
    pub partition_tokens: Vec<PartitionToken>,
    #[serde(default)]
    pub collection_renames: Vec<CollectionRename>,
    pub private_partition: Partition,
    pub private_gt_marker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionToken {
    pub token: String,
    pub partition: Partition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRename {
    pub from: CollectionId,
    pub to: CollectionId,
}

impl DatasetProfile {
    /// The DIVA-HisDB profile used by the command line tool.
    pub fn hisdb() -> Self {
        Self {
            dataset_dir: "HisDB".to_string(),
            public_url: PUBLIC_URL.to_string(),
            private_url: PRIVATE_URL.to_string(),
            image_marker: "img".to_string(),
            gt_marker: "pixel-level-gt".to_string(),
            partition_tokens: vec![
                token("public-test", Partition::TestPublic),
                token("training", Partition::Train),
                token("validation", Partition::Val),
            ],
            collection_renames: vec![rename("CS18", "CSG18"), rename("CS863", "CSG863")],
            private_partition: Partition::Test,
            private_gt_marker: "_gt".to_string(),
        }
    }

    pub fn public_archive_name(&self) -> Result<String, HisdbError> {
        archive_name_from_url(&self.public_url)
    }

    pub fn private_archive_name(&self) -> Result<String, HisdbError> {
        archive_name_from_url(&self.private_url)
    }
}

impl Default for DatasetProfile {
    fn default() -> Self {
        Self::hisdb()
    }
}

/// Local file name for a download: the last path segment of the URL.
pub fn archive_name_from_url(url: &str) -> Result<String, HisdbError> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(HisdbError::Transfer {
            url: url.to_string(),
            message: "url has no file name".to_string(),
        }),
    }
}

fn token(token: &str, partition: Partition) -> PartitionToken {
    PartitionToken {
        token: token.to_string(),
        partition,
    }
}

fn rename(from: &str, to: &str) -> CollectionRename {
    CollectionRename {
        from: CollectionId::from_str_unchecked(from),
        to: CollectionId::from_str_unchecked(to),
    }
}
