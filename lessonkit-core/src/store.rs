//! # store: filesystem-backed artifact storage
//!
//! Three directories with distinct roles:
//! - uploads: files callers hand in and want to keep around
//! - outputs: generated documents published for download
//! - scratch: intermediate files that only live as long as an operation
//!
//! Every artifact the crate creates in scratch storage is *scoped*: the
//! [`StoredArtifact`] owns the file and deletes it when dropped, on success
//! and failure paths alike. Call [`StoredArtifact::keep`] or
//! [`ArtifactStore::publish`] to retain a result.
//!
//! A scoped artifact holds an exclusive advisory lock on its file for as long
//! as it is alive. Purges take the same lock before deleting anything, so an
//! explicit cleanup, even one running in another process, never removes a file
//! an operation is still writing. The lock goes away with the owning process,
//! so a crashed operation leaves nothing that blocks later purges. Age-based
//! expiry is available through [`ArtifactStore::purge_expired`].

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use fs2::FileExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::StorageSettings;
use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = 120;
const RESERVE_ATTEMPTS: usize = 3;

/// Which of the store's directories an artifact lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Upload,
    Output,
    Scratch,
}

impl Origin {
    pub const ALL: [Origin; 3] = [Origin::Upload, Origin::Output, Origin::Scratch];
}

/// Exclusive advisory lock on an artifact's file, held until dropped.
#[derive(Debug)]
struct Lease {
    handle: File,
}

impl Lease {
    fn acquire(file: &File) -> std::io::Result<Self> {
        let handle = file.try_clone()?;
        handle.try_lock_exclusive()?;
        Ok(Self { handle })
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let _ = self.handle.unlock();
    }
}

/// A persisted file managed by the store.
#[derive(Debug)]
pub struct StoredArtifact {
    path: PathBuf,
    size: u64,
    origin: Origin,
    lease: Option<Lease>,
}

impl StoredArtifact {
    /// Describes an existing file without taking ownership of it.
    pub fn describe(path: impl Into<PathBuf>, origin: Origin) -> Result<Self> {
        let path = path.into();
        let size = fs::metadata(&path)?.len();
        Ok(Self {
            path,
            size,
            origin,
            lease: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Whether the file is deleted when this value is dropped.
    pub fn is_scoped(&self) -> bool {
        self.lease.is_some()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Stem of the file name, used to derive names of artifacts made from this one.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string())
    }

    pub(crate) fn refresh_size(&mut self) -> Result<()> {
        self.size = fs::metadata(&self.path)?.len();
        Ok(())
    }

    /// Releases ownership: the file survives this value.
    pub fn keep(mut self) -> Self {
        self.lease = None;
        self
    }
}

impl Drop for StoredArtifact {
    fn drop(&mut self) {
        if self.lease.is_none() {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed scoped artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(error = ?e, path = %self.path.display(), "Failed to remove scoped artifact")
            }
        }
    }
}

/// Outcome of a purge pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub removed: usize,
    /// Files left in place because an operation still owns them.
    pub skipped_live: usize,
}

impl PurgeReport {
    fn absorb(&mut self, other: PurgeReport) {
        self.removed += other.removed;
        self.skipped_live += other.skipped_live;
    }
}

/// Size information about a stored upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub size: u64,
    pub size_mb: f64,
    pub readable: bool,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl ArtifactStore {
    /// Opens the store, creating any missing directory.
    pub fn open(settings: &StorageSettings) -> Result<Self> {
        let store = Self {
            upload_dir: settings.upload_dir.clone(),
            output_dir: settings.output_dir.clone(),
            scratch_dir: settings.scratch_dir.clone(),
        };
        for origin in Origin::ALL {
            let dir = store.dir(origin);
            if let Err(e) = fs::create_dir_all(dir) {
                error!(error = ?e, path = %dir.display(), "Failed to create store directory");
                return Err(e.into());
            }
        }
        info!(
            upload_dir = %store.upload_dir.display(),
            output_dir = %store.output_dir.display(),
            scratch_dir = %store.scratch_dir.display(),
            "Artifact store opened"
        );
        Ok(store)
    }

    pub fn dir(&self, origin: Origin) -> &Path {
        match origin {
            Origin::Upload => &self.upload_dir,
            Origin::Output => &self.output_dir,
            Origin::Scratch => &self.scratch_dir,
        }
    }

    /// Reserves a fresh, uniquely named empty file in `origin`'s directory.
    ///
    /// The name combines `prefix`, a random component and the sanitised
    /// `name`, so concurrent callers deriving from the same source never
    /// collide. The returned artifact is scoped.
    pub fn reserve(&self, origin: Origin, prefix: &str, name: &str) -> Result<(File, StoredArtifact)> {
        let suffix = format!("_{}", sanitize_file_name(name));
        let mut attempts = 0;
        loop {
            attempts += 1;
            let named = tempfile::Builder::new()
                .prefix(prefix)
                .suffix(&suffix)
                .rand_bytes(8)
                .tempfile_in(self.dir(origin))?;
            let (file, temp_path) = named.into_parts();
            let path = temp_path.keep().map_err(std::io::Error::from)?;
            let lease = match Lease::acquire(&file) {
                Ok(lease) => lease,
                Err(e) => {
                    warn!(error = ?e, path = %path.display(), "Failed to lock reserved file");
                    let _ = fs::remove_file(&path);
                    return Err(e.into());
                }
            };
            // A purge elsewhere may have claimed the file between creation and locking.
            if !path.exists() {
                warn!(path = %path.display(), attempts, "Reserved file was purged before it was locked");
                if attempts < RESERVE_ATTEMPTS {
                    continue;
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("reserved file {} vanished", path.display()),
                )
                .into());
            }
            return Ok((
                file,
                StoredArtifact {
                    path,
                    size: 0,
                    origin,
                    lease: Some(lease),
                },
            ));
        }
    }

    /// Creates a scoped scratch artifact whose content is produced by `write`.
    ///
    /// If `write` fails the partial file is removed before the error returns.
    pub fn write_scratch<F>(&self, prefix: &str, name: &str, write: F) -> Result<StoredArtifact>
    where
        F: FnOnce(&mut BufWriter<File>) -> Result<()>,
    {
        let (file, mut artifact) = self.reserve(Origin::Scratch, prefix, name)?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        artifact.refresh_size()?;
        debug!(path = %artifact.path.display(), size = artifact.size, "Wrote scratch artifact");
        Ok(artifact)
    }

    /// Moves an artifact into the outputs directory and keeps it there.
    ///
    /// The published name is `file_name` with a short unique tag, so
    /// concurrent publications of the same name do not overwrite each other.
    pub fn publish(&self, artifact: StoredArtifact, file_name: &str) -> Result<StoredArtifact> {
        let clean = sanitize_file_name(file_name);
        let (stem, ext) = match clean.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{ext}")),
            _ => (clean.clone(), String::new()),
        };
        let tag = uuid::Uuid::new_v4().simple().to_string();
        let dest = self
            .output_dir
            .join(format!("{stem}_{}{ext}", &tag[..8]));

        // Files the store does not own are copied, never moved. Rename also
        // fails across filesystems; the scoped source then cleans itself up.
        let moved = artifact.is_scoped() && fs::rename(&artifact.path, &dest).is_ok();
        if !moved {
            if let Err(e) = fs::copy(&artifact.path, &dest) {
                error!(error = ?e, from = %artifact.path.display(), to = %dest.display(), "Failed to publish artifact");
                return Err(e.into());
            }
        }
        let published = StoredArtifact::describe(&dest, Origin::Output)?;
        info!(path = %published.path.display(), size = published.size, "Published artifact");
        Ok(published)
    }

    /// Size information for a previously stored upload.
    pub fn file_info(&self, upload_name: &str) -> Result<FileInfo> {
        let path = self.upload_dir.join(sanitize_file_name(upload_name));
        let meta = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta,
            _ => return Err(Error::NotFound(upload_name.to_string())),
        };
        let size = meta.len();
        Ok(FileInfo {
            size,
            size_mb: (size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
            readable: File::open(&path).is_ok(),
        })
    }

    /// Deletes every file of one role that no live operation owns.
    pub fn purge(&self, origin: Origin) -> Result<PurgeReport> {
        self.purge_where(origin, |_| true)
    }

    /// Purges all three roles.
    pub fn purge_all(&self) -> Result<PurgeReport> {
        let mut report = PurgeReport::default();
        for origin in Origin::ALL {
            report.absorb(self.purge(origin)?);
        }
        info!(removed = report.removed, skipped_live = report.skipped_live, "Purged artifact store");
        Ok(report)
    }

    /// Janitor pass: deletes files last modified more than `max_age` ago.
    pub fn purge_expired(&self, max_age: Duration) -> Result<PurgeReport> {
        let now = SystemTime::now();
        let mut report = PurgeReport::default();
        for origin in Origin::ALL {
            report.absorb(self.purge_where(origin, |meta| {
                meta.modified()
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .is_some_and(|age| age > max_age)
            })?);
        }
        info!(
            removed = report.removed,
            skipped_live = report.skipped_live,
            max_age_secs = max_age.as_secs(),
            "Expired artifacts purged"
        );
        Ok(report)
    }

    fn purge_where<P>(&self, origin: Origin, mut predicate: P) -> Result<PurgeReport>
    where
        P: FnMut(&fs::Metadata) -> bool,
    {
        let dir = self.dir(origin);
        let mut report = PurgeReport::default();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => {
                error!(error = ?e, path = %dir.display(), "Failed to list store directory");
                return Err(e.into());
            }
        };
        for entry in entries {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() || !predicate(&meta) {
                continue;
            }
            let path = entry.path();
            let claim = match File::open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    error!(error = ?e, path = %path.display(), "Failed to open artifact for purge");
                    return Err(e.into());
                }
            };
            if claim.try_lock_exclusive().is_err() {
                debug!(path = %path.display(), "Skipping live artifact during purge");
                report.skipped_live += 1;
                continue;
            }
            // The claim stays locked until the file is gone.
            match fs::remove_file(&path) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    error!(error = ?e, path = %path.display(), "Failed to remove artifact");
                    return Err(e.into());
                }
            }
        }
        Ok(report)
    }
}

/// Reduces a caller-declared file name to a single safe path component.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return "file".to_string();
    }
    trimmed.chars().take(MAX_NAME_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn store_in(root: &Path) -> ArtifactStore {
        ArtifactStore::open(&StorageSettings {
            upload_dir: root.join("uploads"),
            output_dir: root.join("output"),
            scratch_dir: root.join("temp"),
        })
        .unwrap()
    }

    #[test]
    fn sanitize_strips_directories_and_traversal() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\x\\notes.pdf"), "notes.pdf");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name(""), "file");
        assert_eq!(sanitize_file_name("aula 1?.pdf"), "aula 1_.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
    }

    #[test]
    fn scoped_artifact_is_removed_on_drop() {
        let tmp = tempdir().unwrap();
        let store = store_in(tmp.path());
        let artifact = store
            .write_scratch("t_", "a.bin", |w| {
                w.write_all(b"abc")?;
                Ok(())
            })
            .unwrap();
        let path = artifact.path().to_path_buf();
        assert_eq!(artifact.size(), 3);
        assert!(path.exists());
        drop(artifact);
        assert!(!path.exists(), "scoped artifact should be deleted on drop");
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        let tmp = tempdir().unwrap();
        let store = store_in(tmp.path());
        let res = store.write_scratch("t_", "a.bin", |w| {
            w.write_all(b"partial")?;
            Err(Error::Archive("boom".into()))
        });
        assert!(res.is_err());
        let left = fs::read_dir(store.dir(Origin::Scratch)).unwrap().count();
        assert_eq!(left, 0, "partial output must be cleaned up");
    }

    #[test]
    fn kept_artifact_survives_drop() {
        let tmp = tempdir().unwrap();
        let store = store_in(tmp.path());
        let artifact = store
            .write_scratch("t_", "a.bin", |w| {
                w.write_all(b"abc")?;
                Ok(())
            })
            .unwrap()
            .keep();
        let path = artifact.path().to_path_buf();
        drop(artifact);
        assert!(path.exists());
    }

    #[test]
    fn purge_skips_live_artifacts() {
        let tmp = tempdir().unwrap();
        let store = store_in(tmp.path());
        let live = store
            .write_scratch("live_", "a.bin", |w| {
                w.write_all(b"x")?;
                Ok(())
            })
            .unwrap();
        fs::write(store.dir(Origin::Scratch).join("stale.bin"), b"y").unwrap();
        fs::write(store.dir(Origin::Output).join("old.pdf"), b"z").unwrap();

        let report = store.purge_all().unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(report.skipped_live, 1);
        assert!(live.path().exists(), "in-flight artifact must survive a purge");
    }

    #[test]
    fn purge_from_another_store_respects_live_artifacts() {
        let tmp = tempdir().unwrap();
        let writer = store_in(tmp.path());
        let janitor = store_in(tmp.path());
        let live = writer
            .write_scratch("live_", "part.pdf", |w| {
                w.write_all(b"x")?;
                Ok(())
            })
            .unwrap();
        let kept = writer
            .write_scratch("kept_", "done.pdf", |w| {
                w.write_all(b"y")?;
                Ok(())
            })
            .unwrap()
            .keep();

        let report = janitor.purge_all().unwrap();
        assert_eq!(report, PurgeReport { removed: 1, skipped_live: 1 });
        assert!(live.path().exists());
        assert!(!kept.path().exists(), "released artifacts are fair game");

        drop(live);
        assert_eq!(janitor.purge_all().unwrap(), PurgeReport::default());
    }

    #[test]
    fn purge_expired_keeps_fresh_files() {
        let tmp = tempdir().unwrap();
        let store = store_in(tmp.path());
        fs::write(store.dir(Origin::Upload).join("fresh.pdf"), b"z").unwrap();

        let report = store.purge_expired(Duration::from_secs(3600)).unwrap();
        assert_eq!(report.removed, 0);

        let report = store.purge_expired(Duration::ZERO).unwrap();
        // mtime granularity may make a just-written file exactly "now"
        assert!(report.removed <= 1);
    }

    #[test]
    fn publish_moves_into_outputs_and_keeps() {
        let tmp = tempdir().unwrap();
        let store = store_in(tmp.path());
        let artifact = store
            .write_scratch("t_", "a.pdf", |w| {
                w.write_all(b"%PDF")?;
                Ok(())
            })
            .unwrap();
        let scratch_path = artifact.path().to_path_buf();
        let published = store.publish(artifact, "merged.pdf").unwrap();
        assert!(!scratch_path.exists());
        assert_eq!(published.origin(), Origin::Output);
        assert!(!published.is_scoped());
        assert!(published.file_name().starts_with("merged_"));
        assert!(published.file_name().ends_with(".pdf"));
        assert_eq!(fs::read(published.path()).unwrap(), b"%PDF");
    }

    #[test]
    fn file_info_reports_size_or_not_found() {
        let tmp = tempdir().unwrap();
        let store = store_in(tmp.path());
        fs::write(store.dir(Origin::Upload).join("doc.pdf"), vec![0u8; 2048]).unwrap();

        let info = store.file_info("doc.pdf").unwrap();
        assert_eq!(info.size, 2048);
        assert!(info.readable);
        assert!(matches!(store.file_info("missing.pdf"), Err(Error::NotFound(_))));
    }
}
