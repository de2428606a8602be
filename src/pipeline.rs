use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::archive;
use crate::config::{CollectionRename, DatasetProfile};
use crate::domain::Kind;
use crate::error::HisdbError;
use crate::fetch::Fetcher;
use crate::layout::{CollectionSummary, LayoutBuilder};
use crate::mapper::{self, MemberPair};
use crate::normalize;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub tool: String,
    pub root: Utf8PathBuf,
    pub finished_at: String,
    pub public_url: String,
    pub private_url: String,
    pub public_pairs: usize,
    pub private_pairs: usize,
    pub renamed: Vec<CollectionRename>,
    pub collections: Vec<CollectionSummary>,
}

/// Downloads both HisDB archives and restructures them under
/// `<output>/<dataset_dir>`.
pub struct Pipeline<F: Fetcher> {
    profile: DatasetProfile,
    fetcher: F,
}

impl<F: Fetcher> Pipeline<F> {
    pub fn new(profile: DatasetProfile, fetcher: F) -> Self {
        Self { profile, fetcher }
    }

    pub fn profile(&self) -> &DatasetProfile {
        &self.profile
    }

    pub fn run(
        &self,
        output_folder: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<PipelineReport, HisdbError> {
        let root = output_folder.join(&self.profile.dataset_dir);
        let mut layout = LayoutBuilder::from_std_path(&root)?;
        layout.ensure_root()?;

        let public_archive = root.join(self.profile.public_archive_name()?);
        let private_archive = root.join(self.profile.private_archive_name()?);
        self.download(&self.profile.public_url, &public_archive, sink)?;
        self.download(&self.profile.private_url, &private_archive, sink)?;
        sink.event(ProgressEvent {
            message: "download complete, unpacking files".to_string(),
            elapsed: None,
        });

        let public_pairs = self.restructure_public(&mut layout, &public_archive, sink)?;
        let renamed =
            normalize::apply_collection_renames(&mut layout, &self.profile.collection_renames)?;
        let private_pairs = self.restructure_private(&mut layout, &private_archive, sink)?;

        sink.event(ProgressEvent {
            message: "verifying layout".to_string(),
            elapsed: None,
        });
        let collections = layout.verify()?;

        let report = PipelineReport {
            tool: format!("diva-hisdb/{}", env!("CARGO_PKG_VERSION")),
            root: layout.root().to_path_buf(),
            finished_at: chrono::Utc::now().to_rfc3339(),
            public_url: self.profile.public_url.clone(),
            private_url: self.profile.private_url.clone(),
            public_pairs,
            private_pairs,
            renamed,
            collections,
        };
        write_manifest(&layout, &report)?;
        tracing::debug!(operations = layout.journal().len(), "layout journal");
        sink.event(ProgressEvent {
            message: format!("finished, data set up at {}", layout.root()),
            elapsed: None,
        });
        Ok(report)
    }

    fn download(
        &self,
        url: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<(), HisdbError> {
        sink.event(ProgressEvent {
            message: format!("downloading {url}"),
            elapsed: None,
        });
        let start = Instant::now();
        self.fetcher.fetch(url, destination)?;
        sink.event(ProgressEvent {
            message: format!("saved {}", destination.display()),
            elapsed: Some(start.elapsed()),
        });
        Ok(())
    }

    /// Public archive: one inner archive per (collection, kind), each holding
    /// `<kind-marker>/<partition-token>/<files>`.
    fn restructure_public(
        &self,
        layout: &mut LayoutBuilder,
        archive_path: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<usize, HisdbError> {
        let members = archive::list_members(archive_path)?;
        let pairs = mapper::pair_public_members(&members, &self.profile)?;
        require_inner_archives(&pairs)?;

        for collection in mapper::collections_of(&pairs) {
            layout.ensure_skeleton(&collection)?;
        }

        for pair in &pairs {
            let start = Instant::now();
            let collection_dir = layout.collection_dir(&pair.collection);
            let sources = [
                (&pair.image, &self.profile.image_marker, Kind::Data),
                (&pair.ground_truth, &self.profile.gt_marker, Kind::Gt),
            ];
            for (member, marker, kind) in sources {
                archive::extract_nested(
                    archive_path,
                    member,
                    collection_dir.as_std_path(),
                    collection_dir.as_std_path(),
                    true,
                )?;

                let staging = collection_dir.join(marker);
                for entry in &self.profile.partition_tokens {
                    let source = staging.join(&entry.token);
                    if !source.as_std_path().is_dir() {
                        tracing::debug!(
                            collection = %pair.collection,
                            token = %entry.token,
                            "partition not present in archive"
                        );
                        continue;
                    }
                    let dest = layout.partition_dir(&pair.collection, entry.partition, kind);
                    let moved = layout.move_files(source.as_std_path(), &dest, str::to_string)?;
                    tracing::info!(
                        collection = %pair.collection,
                        partition = %entry.partition,
                        kind = %kind,
                        files = moved,
                        "moved"
                    );
                }
                layout.remove_dir(staging.as_std_path())?;
            }
            sink.event(ProgressEvent {
                message: format!("public {}: {}", pair.collection, pair.image),
                elapsed: Some(start.elapsed()),
            });
        }
        Ok(pairs.len())
    }

    /// Private archive: one inner archive per (collection, kind), each holding
    /// the held-out test files for that collection.
    fn restructure_private(
        &self,
        layout: &mut LayoutBuilder,
        archive_path: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<usize, HisdbError> {
        let members = archive::list_members(archive_path)?;
        let pairs = mapper::pair_private_members(&members, &self.profile)?;
        require_inner_archives(&pairs)?;

        let partition = self.profile.private_partition;
        let gt_marker = self.profile.private_gt_marker.as_str();
        for pair in &pairs {
            let start = Instant::now();
            layout.ensure_skeleton(&pair.collection)?;
            let collection_dir = layout.collection_dir(&pair.collection);

            for (member, kind) in [(&pair.image, Kind::Data), (&pair.ground_truth, Kind::Gt)] {
                let staging = collection_dir.join(mapper::private_staging_dir(member));
                archive::extract_nested(
                    archive_path,
                    member,
                    collection_dir.as_std_path(),
                    staging.as_std_path(),
                    true,
                )?;

                let dest = layout.partition_dir(&pair.collection, partition, kind);
                let moved = match kind {
                    Kind::Data => layout.move_files(staging.as_std_path(), &dest, str::to_string)?,
                    Kind::Gt => layout.move_files(staging.as_std_path(), &dest, |name| {
                        normalize::strip_gt_marker(name, gt_marker)
                    })?,
                };
                tracing::info!(
                    collection = %pair.collection,
                    partition = %partition,
                    kind = %kind,
                    files = moved,
                    "moved"
                );
                layout.remove_dir(staging.as_std_path())?;
            }
            sink.event(ProgressEvent {
                message: format!("private {}: {}", pair.collection, pair.image),
                elapsed: Some(start.elapsed()),
            });
        }
        Ok(pairs.len())
    }
}

fn require_inner_archives(pairs: &[MemberPair]) -> Result<(), HisdbError> {
    for member in pairs
        .iter()
        .flat_map(|pair| [pair.image.as_str(), pair.ground_truth.as_str()])
    {
        if !archive::is_archive(Path::new(member)) {
            return Err(HisdbError::Layout(format!(
                "member {member} is not an inner archive"
            )));
        }
    }
    Ok(())
}

fn write_manifest(layout: &LayoutBuilder, report: &PipelineReport) -> Result<(), HisdbError> {
    let root = layout.root().as_std_path();
    let json = serde_json::to_string_pretty(report)
        .map_err(|err| HisdbError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".manifest")
        .tempfile_in(root)
        .map_err(|err| HisdbError::Filesystem(err.to_string()))?;
    temp.write_all(json.as_bytes())
        .map_err(|err| HisdbError::Filesystem(err.to_string()))?;
    temp.persist(root.join(MANIFEST_FILE))
        .map_err(|err| HisdbError::Filesystem(err.to_string()))?;
    Ok(())
}

