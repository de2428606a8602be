use crate::config::CollectionRename;
use crate::error::HisdbError;
use crate::layout::LayoutBuilder;

/// Applies the collection rename table once. Entries whose source folder is
/// absent are skipped; returns the renames that were performed.
pub fn apply_collection_renames(
    layout: &mut LayoutBuilder,
    renames: &[CollectionRename],
) -> Result<Vec<CollectionRename>, HisdbError> {
    let mut applied = Vec::new();
    for rename in renames {
        if layout.rename_collection(&rename.from, &rename.to)? {
            tracing::info!(from = %rename.from, to = %rename.to, "collection renamed");
            applied.push(rename.clone());
        } else {
            tracing::debug!(from = %rename.from, "collection not present, rename skipped");
        }
    }
    Ok(applied)
}

/// Canonical name of a ground-truth file: `marker` removed.
pub fn strip_gt_marker(file_name: &str, marker: &str) -> String {
    if marker.is_empty() {
        return file_name.to_string();
    }
    file_name.replace(marker, "")
}
