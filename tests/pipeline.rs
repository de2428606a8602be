use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use assert_matches::assert_matches;
use zip::write::SimpleFileOptions;

use diva_hisdb::config::DatasetProfile;
use diva_hisdb::error::HisdbError;
use diva_hisdb::fetch::Fetcher;
use diva_hisdb::layout::LayoutOp;
use diva_hisdb::pipeline::{MANIFEST_FILE, Pipeline, ProgressEvent, ProgressSink};

const PUBLIC_URL: &str = "https://fixtures.invalid/hisdoc/all.zip";
const PRIVATE_URL: &str = "https://fixtures.invalid/hisdoc/private-test/all-privateTest.zip";

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

/// Serves archives from a local folder instead of the network.
#[derive(Default)]
struct LocalFetcher {
    sources: HashMap<String, PathBuf>,
}

impl LocalFetcher {
    fn with(mut self, url: &str, path: PathBuf) -> Self {
        self.sources.insert(url.to_string(), path);
        self
    }
}

impl Fetcher for LocalFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<(), HisdbError> {
        let source = self.sources.get(url).ok_or_else(|| HisdbError::Transfer {
            url: url.to_string(),
            message: "connection refused".to_string(),
        })?;
        fs::copy(source, destination).map_err(|err| HisdbError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn files(entries: &[&str]) -> Vec<u8> {
    let owned: Vec<(&str, Vec<u8>)> = entries
        .iter()
        .map(|name| (*name, name.as_bytes().to_vec()))
        .collect();
    zip_bytes(&owned)
}

fn test_profile() -> DatasetProfile {
    DatasetProfile {
        public_url: PUBLIC_URL.to_string(),
        private_url: PRIVATE_URL.to_string(),
        ..DatasetProfile::hisdb()
    }
}

fn public_archive() -> Vec<u8> {
    zip_bytes(&[
        (
            "img-CB55.zip",
            files(&[
                "img/training/e-001.jpg",
                "img/validation/e-002.jpg",
                "img/public-test/e-003.jpg",
            ]),
        ),
        (
            "pixel-level-gt-CB55.zip",
            files(&[
                "pixel-level-gt/training/e-001.png",
                "pixel-level-gt/validation/e-002.png",
                "pixel-level-gt/public-test/e-003.png",
            ]),
        ),
        ("img-CS18.zip", files(&["img/training/c-001.jpg"])),
        (
            "pixel-level-gt-CS18.zip",
            files(&["pixel-level-gt/training/c-001.png"]),
        ),
        ("PAGE-gt-CB55.zip", files(&["PAGE-gt/training/e-001.xml"])),
    ])
}

fn private_archive() -> Vec<u8> {
    zip_bytes(&[
        (
            "img-CSG18-privateTest.zip",
            files(&["CSG18/p-001.jpg", "CSG18/p-002.jpg"]),
        ),
        (
            "pixel-level-gt-CSG18-privateTest.zip",
            files(&["CSG18/p-001_gt.png", "CSG18/p-002_gt.png"]),
        ),
        ("img-CB55-privateTest.zip", files(&["CB55/q-001.jpg"])),
        (
            "pixel-level-gt-CB55-privateTest.zip",
            files(&["CB55/q-001_gt.png"]),
        ),
    ])
}

fn fixture(dir: &Path, name: &str, bytes: Vec<u8>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn names_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn restructures_both_sources() {
    let temp = tempfile::tempdir().unwrap();
    let fixtures = temp.path().join("fixtures");
    fs::create_dir_all(&fixtures).unwrap();
    let fetcher = LocalFetcher::default()
        .with(PUBLIC_URL, fixture(&fixtures, "all.zip", public_archive()))
        .with(
            PRIVATE_URL,
            fixture(&fixtures, "all-privateTest.zip", private_archive()),
        );
    let output = temp.path().join("out");

    let pipeline = Pipeline::new(test_profile(), fetcher);
    let report = pipeline.run(&output, &NoopSink).unwrap();
    let root = output.join("HisDB");

    assert_eq!(report.public_pairs, 2);
    assert_eq!(report.private_pairs, 2);
    assert_eq!(names_in(&root.join("CB55/train/data")), vec!["e-001.jpg"]);
    assert_eq!(names_in(&root.join("CB55/train/gt")), vec!["e-001.png"]);
    assert_eq!(names_in(&root.join("CB55/val/data")), vec!["e-002.jpg"]);
    assert_eq!(names_in(&root.join("CB55/test-public/gt")), vec!["e-003.png"]);
    assert_eq!(names_in(&root.join("CB55/test/data")), vec!["q-001.jpg"]);
    assert_eq!(names_in(&root.join("CB55/test/gt")), vec!["q-001.png"]);

    // CS18 is renamed before the private source lands in CSG18.
    assert!(!root.join("CS18").exists());
    assert_eq!(names_in(&root.join("CSG18/train/data")), vec!["c-001.jpg"]);
    assert_eq!(
        names_in(&root.join("CSG18/test/gt")),
        vec!["p-001.png", "p-002.png"]
    );
    assert_eq!(report.renamed.len(), 1);
    assert_eq!(report.renamed[0].to.as_str(), "CSG18");

    for collection in ["CB55", "CSG18"] {
        assert_eq!(
            names_in(&root.join(collection)),
            vec!["test", "test-public", "train", "val"]
        );
        for partition in ["train", "val", "test", "test-public"] {
            assert_eq!(
                names_in(&root.join(collection).join(partition)),
                vec!["data", "gt"]
            );
        }
    }

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join(MANIFEST_FILE)).unwrap()).unwrap();
    assert_eq!(manifest["collections"].as_array().unwrap().len(), 2);
    assert_eq!(manifest["public_url"], PUBLIC_URL);
}

#[test]
fn training_named_inner_archives() {
    let temp = tempfile::tempdir().unwrap();
    let fixtures = temp.path().join("fixtures");
    fs::create_dir_all(&fixtures).unwrap();
    let public = zip_bytes(&[
        (
            "img-training-CB55.zip",
            files(&["img/training/a.jpg", "img/training/b.jpg"]),
        ),
        (
            "pixel-level-gt-training-CB55.zip",
            files(&["pixel-level-gt/training/a.png", "pixel-level-gt/training/b.png"]),
        ),
    ]);
    let fetcher = LocalFetcher::default()
        .with(PUBLIC_URL, fixture(&fixtures, "all.zip", public))
        .with(
            PRIVATE_URL,
            fixture(&fixtures, "all-privateTest.zip", zip_bytes(&[])),
        );
    let output = temp.path().join("out");

    Pipeline::new(test_profile(), fetcher)
        .run(&output, &NoopSink)
        .unwrap();

    let collection = output.join("HisDB/CB55");
    assert_eq!(
        names_in(&collection.join("train/data")),
        vec!["a.jpg", "b.jpg"]
    );
    assert_eq!(names_in(&collection.join("train/gt")), vec!["a.png", "b.png"]);
    assert!(!collection.join("img-training-CB55.zip").exists());
    assert!(!collection.join("pixel-level-gt-training-CB55.zip").exists());
    assert!(!collection.join("img").exists());
}

#[test]
fn missing_ground_truth_aborts_before_moving() {
    let temp = tempfile::tempdir().unwrap();
    let fixtures = temp.path().join("fixtures");
    fs::create_dir_all(&fixtures).unwrap();
    let public = zip_bytes(&[
        ("img-CB55.zip", files(&["img/training/e-001.jpg"])),
        ("img-CS18.zip", files(&["img/training/c-001.jpg"])),
        (
            "pixel-level-gt-CS18.zip",
            files(&["pixel-level-gt/training/c-001.png"]),
        ),
    ]);
    let fetcher = LocalFetcher::default()
        .with(PUBLIC_URL, fixture(&fixtures, "all.zip", public))
        .with(
            PRIVATE_URL,
            fixture(&fixtures, "all-privateTest.zip", private_archive()),
        );
    let output = temp.path().join("out");

    let err = Pipeline::new(test_profile(), fetcher)
        .run(&output, &NoopSink)
        .unwrap_err();

    assert_matches!(err, HisdbError::Layout(_));
    assert!(!output.join("HisDB/CB55").exists());
    assert!(!output.join("HisDB/CS18").exists());
}

#[test]
fn unexpected_private_name_is_layout_error() {
    let temp = tempfile::tempdir().unwrap();
    let fixtures = temp.path().join("fixtures");
    fs::create_dir_all(&fixtures).unwrap();
    let private = zip_bytes(&[
        ("img_CSG18.zip", files(&["CSG18/p-001.jpg"])),
        ("pixel-level-gt_CSG18.zip", files(&["CSG18/p-001_gt.png"])),
    ]);
    let fetcher = LocalFetcher::default()
        .with(PUBLIC_URL, fixture(&fixtures, "all.zip", public_archive()))
        .with(PRIVATE_URL, fixture(&fixtures, "all-privateTest.zip", private));

    let err = Pipeline::new(test_profile(), fetcher)
        .run(&temp.path().join("out"), &NoopSink)
        .unwrap_err();
    assert_matches!(err, HisdbError::Layout(_));
}

#[test]
fn transfer_failure_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let fixtures = temp.path().join("fixtures");
    fs::create_dir_all(&fixtures).unwrap();
    let fetcher =
        LocalFetcher::default().with(PUBLIC_URL, fixture(&fixtures, "all.zip", public_archive()));
    let output = temp.path().join("out");

    let pipeline = Pipeline::new(test_profile(), fetcher);
    let err = pipeline.run(&output, &NoopSink).unwrap_err();

    assert_matches!(err, HisdbError::Transfer { ref url, .. } if url == PRIVATE_URL);
    assert!(output.join("HisDB/all.zip").exists());
    assert!(!output.join("HisDB/CB55").exists());
}

#[test]
fn corrupt_public_archive_is_archive_error() {
    let temp = tempfile::tempdir().unwrap();
    let fixtures = temp.path().join("fixtures");
    fs::create_dir_all(&fixtures).unwrap();
    let fetcher = LocalFetcher::default()
        .with(
            PUBLIC_URL,
            fixture(&fixtures, "all.zip", b"truncated download".to_vec()),
        )
        .with(
            PRIVATE_URL,
            fixture(&fixtures, "all-privateTest.zip", private_archive()),
        );

    let err = Pipeline::new(test_profile(), fetcher)
        .run(&temp.path().join("out"), &NoopSink)
        .unwrap_err();
    assert_matches!(err, HisdbError::Archive { .. });
}

#[test]
fn journal_records_rename_once() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("HisDB");
    let mut layout = diva_hisdb::layout::LayoutBuilder::from_std_path(&root).unwrap();
    let cs18 = "CS18".parse().unwrap();
    let cs863 = "CS863".parse().unwrap();
    let cb55 = "CB55".parse().unwrap();
    layout.ensure_skeleton(&cs18).unwrap();
    layout.ensure_skeleton(&cs863).unwrap();
    layout.ensure_skeleton(&cb55).unwrap();

    let profile = DatasetProfile::hisdb();
    let applied =
        diva_hisdb::normalize::apply_collection_renames(&mut layout, &profile.collection_renames)
            .unwrap();
    assert_eq!(applied.len(), 2);

    let renames = layout
        .journal()
        .iter()
        .filter(|op| matches!(op, LayoutOp::RenameCollection { .. }))
        .count();
    assert_eq!(renames, 2);
    assert_eq!(
        names_in(&root),
        vec!["CB55".to_string(), "CSG18".to_string(), "CSG863".to_string()]
    );
}

fn run_with_private(temp: &Path, private: Vec<u8>) -> Result<(), HisdbError> {
    let fixtures = temp.join("fixtures");
    fs::create_dir_all(&fixtures).unwrap();
    let fetcher = LocalFetcher::default()
        .with(PUBLIC_URL, fixture(&fixtures, "all.zip", public_archive()))
        .with(PRIVATE_URL, fixture(&fixtures, "all-privateTest.zip", private));
    Pipeline::new(test_profile(), fetcher)
        .run(&temp.join("out"), &NoopSink)
        .map(|_| ())
}

#[test]
fn flattening_same_named_files_is_layout_error() {
    let temp = tempfile::tempdir().unwrap();
    let private = zip_bytes(&[
        (
            "img-CB55-privateTest.zip",
            zip_bytes(&[
                ("CB55/x.jpg", b"FIRST".to_vec()),
                ("CB55/extra/x.jpg", b"SECOND".to_vec()),
            ]),
        ),
        (
            "pixel-level-gt-CB55-privateTest.zip",
            files(&["CB55/x_gt.png"]),
        ),
    ]);

    let err = run_with_private(temp.path(), private).unwrap_err();

    assert_matches!(err, HisdbError::Layout(_));
    let collection = temp.path().join("out/HisDB/CB55");
    assert_eq!(names_in(&collection.join("test/data")).len(), 1);
    assert!(collection.join("img-CB55-privateTest").exists());
}

#[test]
fn gt_marker_collision_is_layout_error() {
    let temp = tempfile::tempdir().unwrap();
    let private = zip_bytes(&[
        ("img-CB55-privateTest.zip", files(&["CB55/y.jpg"])),
        (
            "pixel-level-gt-CB55-privateTest.zip",
            files(&["CB55/y.png", "CB55/y_gt.png"]),
        ),
    ]);

    let err = run_with_private(temp.path(), private).unwrap_err();

    assert_matches!(err, HisdbError::Layout(_));
    let collection = temp.path().join("out/HisDB/CB55");
    assert_eq!(names_in(&collection.join("test/gt")), vec!["y.png"]);
    assert!(collection.join("pixel-level-gt-CB55-privateTest").exists());
}

#[test]
fn rerun_into_populated_root_is_layout_error() {
    let temp = tempfile::tempdir().unwrap();
    run_with_private(temp.path(), private_archive()).unwrap();

    let err = run_with_private(temp.path(), private_archive()).unwrap_err();

    assert_matches!(err, HisdbError::Layout(_));
    let root = temp.path().join("out/HisDB");
    assert_eq!(names_in(&root.join("CB55/train/data")), vec!["e-001.jpg"]);
    assert_eq!(
        fs::read(root.join("CB55/train/data/e-001.jpg")).unwrap(),
        b"img/training/e-001.jpg"
    );
}
