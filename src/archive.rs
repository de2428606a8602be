use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::{HisdbError, fs_error};

fn open_archive(zip_path: &Path) -> Result<ZipArchive<fs::File>, HisdbError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| HisdbError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    ZipArchive::new(file).map_err(|err| archive_error(zip_path, err))
}

fn archive_error(zip_path: &Path, err: impl ToString) -> HisdbError {
    HisdbError::Archive {
        path: zip_path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Names of all file members, in archive order.
pub fn list_members(zip_path: &Path) -> Result<Vec<String>, HisdbError> {
    let archive = open_archive(zip_path)?;
    Ok(archive
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .map(str::to_string)
        .collect())
}

/// Extracts every member below `target_dir` and returns the written files.
pub fn extract_all(zip_path: &Path, target_dir: &Path) -> Result<Vec<PathBuf>, HisdbError> {
    let mut archive = open_archive(zip_path)?;
    let mut written = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| archive_error(zip_path, err))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(archive_error(
                    zip_path,
                    format!("path traversal in member {}", entry.name()),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path).map_err(|err| fs_error(&entry_path, err))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| fs_error(parent, err))?;
        }
        let mut outfile = fs::File::create(&entry_path).map_err(|err| fs_error(&entry_path, err))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| archive_error(zip_path, err))?;
        written.push(entry_path);
    }
    Ok(written)
}

/// Extracts the single member `member` into `target_dir`, stored under its
/// file name, and returns the written path.
pub fn extract_member(
    zip_path: &Path,
    member: &str,
    target_dir: &Path,
) -> Result<PathBuf, HisdbError> {
    let mut archive = open_archive(zip_path)?;
    let mut entry = match archive.by_name(member) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(HisdbError::MissingMember {
                archive: zip_path.to_path_buf(),
                member: member.to_string(),
            });
        }
        Err(err) => return Err(archive_error(zip_path, err)),
    };

    let file_name = Path::new(member)
        .file_name()
        .ok_or_else(|| archive_error(zip_path, format!("member {member} has no file name")))?;
    fs::create_dir_all(target_dir).map_err(|err| fs_error(target_dir, err))?;
    let destination = target_dir.join(file_name);
    let mut outfile =
        fs::File::create(&destination).map_err(|err| fs_error(&destination, err))?;
    io::copy(&mut entry, &mut outfile).map_err(|err| archive_error(zip_path, err))?;
    Ok(destination)
}

pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Pulls `member` out of the outer archive into `staging_dir`; when the member
/// is itself an archive it is decompressed into `target_dir` and, if
/// `remove_consumed` is set, deleted once that succeeded.
///
/// Returns the files that ended up on disk.
pub fn extract_nested(
    zip_path: &Path,
    member: &str,
    staging_dir: &Path,
    target_dir: &Path,
    remove_consumed: bool,
) -> Result<Vec<PathBuf>, HisdbError> {
    let inner = extract_member(zip_path, member, staging_dir)?;
    if !is_archive(&inner) {
        return Ok(vec![inner]);
    }

    let written = extract_all(&inner, target_dir)?;
    if remove_consumed {
        fs::remove_file(&inner).map_err(|err| fs_error(&inner, err))?;
    }
    tracing::debug!(member, files = written.len(), "inner archive extracted");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let file = fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn list_skips_directories() {
        let temp = tempfile::tempdir().unwrap();
        let zip_path = temp.path().join("a.zip");
        let file = fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .add_directory("img/", SimpleFileOptions::default())
            .unwrap();
        writer
            .start_file("img/a.jpg", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"a").unwrap();
        writer.finish().unwrap();

        assert_eq!(list_members(&zip_path).unwrap(), vec!["img/a.jpg"]);
    }

    #[test]
    fn extract_member_missing() {
        let temp = tempfile::tempdir().unwrap();
        let zip_path = temp.path().join("a.zip");
        write_zip(&zip_path, &[("x.txt", b"x".to_vec())]);

        let err = extract_member(&zip_path, "y.txt", temp.path()).unwrap_err();
        assert_matches!(err, HisdbError::MissingMember { .. });
    }

    #[test]
    fn corrupt_archive_is_archive_error() {
        let temp = tempfile::tempdir().unwrap();
        let zip_path = temp.path().join("broken.zip");
        fs::write(&zip_path, b"not a zip at all").unwrap();

        assert_matches!(
            list_members(&zip_path),
            Err(HisdbError::Archive { .. })
        );
    }

    #[test]
    fn nested_extraction_removes_inner_archive() {
        let temp = tempfile::tempdir().unwrap();
        let inner = temp.path().join("img-CB55.zip");
        write_zip(&inner, &[("img/training/e1.jpg", b"jpg".to_vec())]);
        let outer = temp.path().join("all.zip");
        write_zip(&outer, &[("all/img-CB55.zip", fs::read(&inner).unwrap())]);

        let target = temp.path().join("CB55");
        let written = extract_nested(&outer, "all/img-CB55.zip", &target, &target, true).unwrap();

        assert_eq!(written, vec![target.join("img/training/e1.jpg")]);
        assert!(!target.join("img-CB55.zip").exists());
    }
}
