use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{CollectionId, Kind, Partition};
use crate::error::{HisdbError, fs_error};

/// One mutation applied to the dataset tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LayoutOp {
    CreateDir { path: Utf8PathBuf },
    MoveFile { from: Utf8PathBuf, to: Utf8PathBuf },
    RenameCollection { from: CollectionId, to: CollectionId },
    RemoveDir { path: Utf8PathBuf },
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionCount {
    pub partition: Partition,
    pub data: usize,
    pub gt: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub collection: CollectionId,
    pub partitions: Vec<PartitionCount>,
}

/// Owns the dataset root (`<output>/HisDB`) for the duration of a run.
///
/// Every create, move, rename and remove goes through here and is appended to
/// the journal.
#[derive(Debug)]
pub struct LayoutBuilder {
    root: Utf8PathBuf,
    journal: Vec<LayoutOp>,
}

impl LayoutBuilder {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self {
            root,
            journal: Vec::new(),
        }
    }

    pub fn from_std_path(root: &Path) -> Result<Self, HisdbError> {
        let root = Utf8PathBuf::from_path_buf(root.to_path_buf()).map_err(|path| {
            HisdbError::Filesystem(format!("non UTF-8 dataset path: {}", path.display()))
        })?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn journal(&self) -> &[LayoutOp] {
        &self.journal
    }

    pub fn collection_dir(&self, collection: &CollectionId) -> Utf8PathBuf {
        self.root.join(collection.as_str())
    }

    pub fn partition_dir(
        &self,
        collection: &CollectionId,
        partition: Partition,
        kind: Kind,
    ) -> Utf8PathBuf {
        self.collection_dir(collection)
            .join(partition.as_str())
            .join(kind.as_str())
    }

    pub fn ensure_root(&mut self) -> Result<(), HisdbError> {
        let root = self.root.clone();
        self.create_dir(&root)
    }

    /// Creates a directory and its parents. Existing directories are fine.
    pub fn create_dir(&mut self, path: &Utf8Path) -> Result<(), HisdbError> {
        if path.as_std_path().is_dir() {
            return Ok(());
        }
        fs::create_dir_all(path.as_std_path()).map_err(|err| fs_error(path.as_std_path(), err))?;
        self.journal.push(LayoutOp::CreateDir {
            path: path.to_path_buf(),
        });
        Ok(())
    }

    /// Creates `<collection>/{train,val,test,test-public}/{data,gt}`.
    pub fn ensure_skeleton(&mut self, collection: &CollectionId) -> Result<(), HisdbError> {
        for partition in Partition::ALL {
            for kind in Kind::ALL {
                let dir = self.partition_dir(collection, partition, kind);
                self.create_dir(&dir)?;
            }
        }
        Ok(())
    }

    /// Moves one file. An existing target is never replaced.
    pub fn move_file(&mut self, from: &Path, to: &Utf8Path) -> Result<(), HisdbError> {
        if to.as_std_path().exists() {
            return Err(HisdbError::Layout(format!(
                "cannot move {} to {to}: target already exists",
                from.display()
            )));
        }
        fs::rename(from, to.as_std_path()).map_err(|err| {
            HisdbError::Filesystem(format!("move {} -> {to}: {err}", from.display()))
        })?;
        self.journal.push(LayoutOp::MoveFile {
            from: utf8(from)?,
            to: to.to_path_buf(),
        });
        Ok(())
    }

    /// Moves every regular file below `source` (recursively) into `dest_dir`,
    /// passing each file name through `rename`. Returns the number moved.
    pub fn move_files<F>(
        &mut self,
        source: &Path,
        dest_dir: &Utf8Path,
        rename: F,
    ) -> Result<usize, HisdbError>
    where
        F: Fn(&str) -> String,
    {
        let mut moved = 0;
        for path in walk_files(source)? {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| {
                    HisdbError::Filesystem(format!("non UTF-8 file name: {}", path.display()))
                })?;
            let target = dest_dir.join(rename(name));
            self.move_file(&path, &target)?;
            moved += 1;
        }
        Ok(moved)
    }

    /// Removes a drained staging directory. Fails if it still holds files.
    pub fn remove_dir(&mut self, path: &Path) -> Result<(), HisdbError> {
        if !path.exists() {
            return Ok(());
        }
        if let Some(leftover) = walk_files(path)?.first() {
            return Err(HisdbError::Layout(format!(
                "staging folder {} still holds {}",
                path.display(),
                leftover.display()
            )));
        }
        fs::remove_dir_all(path).map_err(|err| fs_error(path, err))?;
        self.journal.push(LayoutOp::RemoveDir { path: utf8(path)? });
        Ok(())
    }

    /// Renames a collection folder. Returns `false` if `from` does not exist.
    pub fn rename_collection(
        &mut self,
        from: &CollectionId,
        to: &CollectionId,
    ) -> Result<bool, HisdbError> {
        let source = self.collection_dir(from);
        if !source.as_std_path().is_dir() {
            return Ok(false);
        }
        let target = self.collection_dir(to);
        if target.as_std_path().exists() {
            return Err(HisdbError::Layout(format!(
                "cannot rename collection {from} to {to}: {target} already exists"
            )));
        }
        fs::rename(source.as_std_path(), target.as_std_path())
            .map_err(|err| fs_error(source.as_std_path(), err))?;
        self.journal.push(LayoutOp::RenameCollection {
            from: from.clone(),
            to: to.clone(),
        });
        Ok(true)
    }

    /// Collection folders currently under the root, sorted.
    pub fn collections(&self) -> Result<Vec<CollectionId>, HisdbError> {
        let mut found = Vec::new();
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| fs_error(self.root.as_std_path(), err))?;
        for entry in entries {
            let entry = entry.map_err(|err| fs_error(self.root.as_std_path(), err))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<CollectionId>().ok())
            {
                found.push(id);
            }
        }
        found.sort();
        Ok(found)
    }

    /// Checks that every partition holds exactly `data` and `gt` and that both
    /// contain the same file stems.
    pub fn verify(&self) -> Result<Vec<CollectionSummary>, HisdbError> {
        let mut summaries = Vec::new();
        for collection in self.collections()? {
            let mut partitions = Vec::new();
            for partition in Partition::ALL {
                let partition_dir = self.collection_dir(&collection).join(partition.as_str());
                let children = list_names(partition_dir.as_std_path())?;
                let expected: BTreeSet<String> =
                    Kind::ALL.iter().map(|kind| kind.as_str().to_string()).collect();
                if children != expected {
                    return Err(HisdbError::Layout(format!(
                        "{partition_dir} must contain exactly data and gt, found {children:?}"
                    )));
                }

                let data = file_stems(
                    self.partition_dir(&collection, partition, Kind::Data)
                        .as_std_path(),
                )?;
                let gt = file_stems(
                    self.partition_dir(&collection, partition, Kind::Gt)
                        .as_std_path(),
                )?;
                if let Some(orphan) = data.symmetric_difference(&gt).next() {
                    return Err(HisdbError::Layout(format!(
                        "{collection}/{partition}: {orphan} has no counterpart in data/gt"
                    )));
                }
                partitions.push(PartitionCount {
                    partition,
                    data: data.len(),
                    gt: gt.len(),
                });
            }
            summaries.push(CollectionSummary {
                collection,
                partitions,
            });
        }
        Ok(summaries)
    }
}

fn utf8(path: &Path) -> Result<Utf8PathBuf, HisdbError> {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .map_err(|path| HisdbError::Filesystem(format!("non UTF-8 path: {}", path.display())))
}

fn walk_files(root: &Path) -> Result<Vec<PathBuf>, HisdbError> {
    let mut items = Vec::new();
    if !root.is_dir() {
        return Ok(items);
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| fs_error(&path, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| fs_error(&path, err))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                items.push(path);
            }
        }
    }
    items.sort();
    Ok(items)
}

fn list_names(dir: &Path) -> Result<BTreeSet<String>, HisdbError> {
    let mut names = BTreeSet::new();
    let entries = fs::read_dir(dir).map_err(|err| fs_error(dir, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| fs_error(dir, err))?;
        names.insert(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

fn file_stems(dir: &Path) -> Result<BTreeSet<String>, HisdbError> {
    let mut stems = BTreeSet::new();
    let entries = fs::read_dir(dir).map_err(|err| fs_error(dir, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| fs_error(dir, err))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(stem) = path.file_stem() {
            stems.insert(stem.to_string_lossy().into_owned());
        }
    }
    Ok(stems)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn builder(temp: &tempfile::TempDir) -> LayoutBuilder {
        LayoutBuilder::from_std_path(&temp.path().join("HisDB")).unwrap()
    }

    #[test]
    fn layout_paths() {
        let layout = LayoutBuilder::new(Utf8PathBuf::from("/data/HisDB"));
        let id: CollectionId = "CB55".parse().unwrap();
        let path = layout.partition_dir(&id, Partition::TestPublic, Kind::Gt);
        assert!(path.ends_with("CB55/test-public/gt"));
    }

    #[test]
    fn skeleton_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let mut layout = builder(&temp);
        let id: CollectionId = "CB55".parse().unwrap();
        layout.ensure_skeleton(&id).unwrap();
        let created = layout.journal().len();
        assert_eq!(created, 8);

        layout.ensure_skeleton(&id).unwrap();
        assert_eq!(layout.journal().len(), created);
        layout.verify().unwrap();
    }

    #[test]
    fn verify_reports_orphans() {
        let temp = tempfile::tempdir().unwrap();
        let mut layout = builder(&temp);
        let id: CollectionId = "CB55".parse().unwrap();
        layout.ensure_skeleton(&id).unwrap();
        let data = layout.partition_dir(&id, Partition::Train, Kind::Data);
        let gt = layout.partition_dir(&id, Partition::Train, Kind::Gt);
        fs::write(data.join("e-001.jpg"), b"x").unwrap();
        fs::write(gt.join("e-001.png"), b"x").unwrap();
        assert_eq!(layout.verify().unwrap()[0].partitions[0].data, 1);

        fs::write(data.join("e-002.jpg"), b"x").unwrap();
        assert_matches!(layout.verify(), Err(HisdbError::Layout(_)));
    }

    #[test]
    fn rename_missing_collection_is_noop() {
        let temp = tempfile::tempdir().unwrap();
        let mut layout = builder(&temp);
        layout.ensure_root().unwrap();
        let from: CollectionId = "CS18".parse().unwrap();
        let to: CollectionId = "CSG18".parse().unwrap();
        assert!(!layout.rename_collection(&from, &to).unwrap());

        layout.ensure_skeleton(&from).unwrap();
        assert!(layout.rename_collection(&from, &to).unwrap());
        assert_eq!(layout.collections().unwrap(), vec![to]);
    }

    #[test]
    fn move_never_replaces_existing_target() {
        let temp = tempfile::tempdir().unwrap();
        let mut layout = builder(&temp);
        layout.ensure_root().unwrap();
        let source = temp.path().join("x.jpg");
        fs::write(&source, b"new").unwrap();
        let target = layout.root().join("x.jpg");
        fs::write(target.as_std_path(), b"old").unwrap();

        assert_matches!(layout.move_file(&source, &target), Err(HisdbError::Layout(_)));
        assert_eq!(fs::read(target.as_std_path()).unwrap(), b"old");
        assert!(source.exists());
    }

    #[test]
    fn journal_serializes_with_op_tag() {
        let temp = tempfile::tempdir().unwrap();
        let mut layout = builder(&temp);
        layout.ensure_root().unwrap();

        let json = serde_json::to_value(layout.journal()).unwrap();
        assert_eq!(json[0]["op"], "create_dir");
        assert_eq!(json[0]["path"], layout.root().as_str());
    }
}
