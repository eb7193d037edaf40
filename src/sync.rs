//! The synchronization engine.
//!
//! One pass walks every selected course, applies the download policy per
//! document and finally advances the watermark (`last_check`) to the
//! pass-end time. Failures are contained at the smallest useful scope: a
//! document failure never aborts its course, a course failure never aborts
//! the pass. Only a failed course listing — nothing synced yet — aborts a
//! pass.
//!
//! Downloads go through a `.part` sibling and are renamed into place, so a
//! kill mid-write never leaves a truncated file that a later pass would
//! mistake for a finished one. Interrupted passes do not advance the
//! watermark; re-running may re-download a little, but never skips a
//! changed document.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::api::{ApiClient, ApiError, Transport};
use crate::config::{Config, ConfigError};
use crate::model::{Course, DocumentEntry, TreeModel};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("interrupted")]
    Interrupted,
}

impl SyncError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The download decision for one document.
///
/// A file that does not exist locally is always fetched; an existing file
/// is only refreshed when overwriting is enabled and the remote copy
/// changed after the last completed pass.
pub fn should_download(exists: bool, overwrite: bool, chtime: i64, last_check: i64) -> bool {
    !exists || (overwrite && chtime > last_check)
}

/// What one pass did.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Courses traversed to completion.
    pub courses_checked: usize,
    /// Courses skipped because their listing or naming failed.
    pub courses_skipped: usize,
    /// Documents fetched.
    pub downloaded: usize,
    /// Documents left alone by the download policy.
    pub unchanged: usize,
    /// Documents that failed to download or write.
    pub failed: usize,
    /// Whether the pass stopped early on a termination signal.
    pub interrupted: bool,
}

/// Drives sync passes over one API client and one config.
pub struct SyncEngine<'a, T: Transport> {
    client: &'a ApiClient<T>,
    config: &'a mut Config,
    overwrite: bool,
    cancelled: Arc<AtomicBool>,
}

impl<'a, T: Transport> SyncEngine<'a, T> {
    pub fn new(client: &'a ApiClient<T>, config: &'a mut Config) -> Self {
        let overwrite = config.settings.overwrite;
        // One flag for the engine and the client, so a signal also ends
        // any retry loop the client is currently sitting in.
        let cancelled = client.cancellation_handle();
        Self {
            client,
            config,
            overwrite,
            cancelled,
        }
    }

    /// Override the persisted overwrite policy for this run (`--force`).
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Flag shared with the signal handler and the client's retry loops;
    /// setting it stops the engine at the next document or retry boundary
    /// and skips the watermark advance.
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run a single pass over all selected courses.
    pub fn run_pass(&mut self) -> Result<PassReport, SyncError> {
        let mut report = PassReport::default();
        let last_check = self.config.settings.last_check;
        let base = self.config.base_path();

        tracing::info!(last_check, overwrite = self.overwrite, "listing courses");
        let courses = match self.client.list_courses() {
            Ok(courses) => courses,
            Err(ApiError::Interrupted) => {
                report.interrupted = true;
                Vec::new()
            }
            Err(err) => return Err(err.into()),
        };

        for descriptor in courses {
            if self.is_cancelled() {
                report.interrupted = true;
                break;
            }
            let course = Course::from(descriptor);
            if !self
                .config
                .is_selected(&course.id, &self.resolved_title_hint(&course))
            {
                tracing::debug!(course = %course.remote_title, "not selected, skipping");
                continue;
            }
            self.sync_course(&course, last_check, &base, &mut report);
        }

        if report.interrupted {
            tracing::warn!("pass interrupted; watermark left unchanged");
        } else {
            // Pass-end capture: one timestamp gates every document seen in
            // this pass, however long it took.
            let now = chrono::Utc::now().timestamp();
            self.config.advance_watermark(now)?;
        }

        tracing::info!(
            courses = report.courses_checked,
            skipped_courses = report.courses_skipped,
            downloaded = report.downloaded,
            unchanged = report.unchanged,
            failed = report.failed,
            "pass finished"
        );
        Ok(report)
    }

    /// Run passes until cancelled: once when `continuous` is false,
    /// otherwise sleeping `interval` seconds between passes. Always flushes
    /// the config before returning so watermark and name map reflect
    /// exactly the work done.
    pub fn run(&mut self, continuous: bool) -> Result<(), SyncError> {
        let interval = self.config.settings.interval;
        let result = loop {
            match self.run_pass() {
                Ok(report) if report.interrupted => break Ok(()),
                Ok(_) => {}
                Err(err) => break Err(err),
            }
            if !continuous {
                break Ok(());
            }
            tracing::info!(seconds = interval, "sleeping until next pass");
            if !self.sleep_interruptibly(interval) {
                break Ok(());
            }
        };

        self.config.save()?;
        result
    }

    /// Sleep in one-second slices so a termination signal is honored
    /// promptly. Returns false when interrupted.
    fn sleep_interruptibly(&self, seconds: u64) -> bool {
        for _ in 0..seconds {
            if self.is_cancelled() {
                return false;
            }
            std::thread::sleep(Duration::from_secs(1));
        }
        !self.is_cancelled()
    }

    /// Best-effort title for the selection check: the frozen name if one
    /// exists, else the sanitized remote title. Never fetches.
    fn resolved_title_hint(&self, course: &Course) -> String {
        match self.config.namemap_lookup(&course.id) {
            Some(frozen) => frozen.to_string(),
            None => crate::model::sanitize(
                &course.remote_title,
                self.config.settings.portable_names,
            ),
        }
    }

    /// Sync one course; all failures end here, counted in the report.
    fn sync_course(
        &mut self,
        course: &Course,
        last_check: i64,
        base: &Path,
        report: &mut PassReport,
    ) {
        let mut tree = TreeModel::new(self.client, &mut *self.config);

        let title = match tree.course_title(course) {
            Ok(title) => title,
            Err(crate::model::ModelError::Api(ApiError::Interrupted)) => {
                report.interrupted = true;
                return;
            }
            Err(err) => {
                tracing::warn!(course = %course.remote_title, error = %err, "skipping course");
                report.courses_skipped += 1;
                return;
            }
        };

        let entries = match tree.deep_documents(course, &title) {
            Ok(entries) => entries,
            Err(ApiError::Interrupted) => {
                report.interrupted = true;
                return;
            }
            Err(err) => {
                tracing::warn!(course = %title, error = %err, "course listing failed, skipping");
                report.courses_skipped += 1;
                return;
            }
        };

        tracing::info!(course = %title, documents = entries.len(), "checking course");
        for entry in &entries {
            if self.is_cancelled() {
                report.interrupted = true;
                break;
            }
            match self.sync_document(entry, last_check, base) {
                Ok(true) => report.downloaded += 1,
                Ok(false) => report.unchanged += 1,
                Err(SyncError::Interrupted) | Err(SyncError::Api(ApiError::Interrupted)) => {
                    report.interrupted = true;
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        document = %entry.rel_path.display(),
                        error = %err,
                        "document failed"
                    );
                    report.failed += 1;
                }
            }
        }
        report.courses_checked += 1;
    }

    /// Apply the download policy to one document; returns whether bytes
    /// were fetched.
    fn sync_document(
        &self,
        entry: &DocumentEntry,
        last_check: i64,
        base: &Path,
    ) -> Result<bool, SyncError> {
        let dest = base.join(&entry.rel_path);
        let exists = dest.exists();
        if !should_download(exists, self.overwrite, entry.descriptor.chtime, last_check) {
            tracing::debug!(path = %dest.display(), "up to date");
            return Ok(false);
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }

        let reader = self.client.download_document(&entry.descriptor.id)?;
        self.write_atomically(reader, &dest)?;
        tracing::info!(path = %dest.display(), "downloaded");
        Ok(true)
    }

    /// Stream to `<dest>.part`, then rename into place. The partial file
    /// is removed on any failure so a retry starts clean.
    fn write_atomically(&self, mut reader: Box<dyn Read>, dest: &Path) -> Result<(), SyncError> {
        let part = dest.with_extension(match dest.extension() {
            Some(ext) => format!("{}.part", ext.to_string_lossy()),
            None => "part".to_string(),
        });

        let result = (|| {
            let mut file = fs::File::create(&part).map_err(|e| SyncError::io(&part, e))?;
            let mut buffer = [0u8; 8192];
            loop {
                if self.is_cancelled() {
                    return Err(SyncError::Interrupted);
                }
                let n = reader.read(&mut buffer).map_err(|e| SyncError::io(&part, e))?;
                if n == 0 {
                    break;
                }
                file.write_all(&buffer[..n]).map_err(|e| SyncError::io(&part, e))?;
            }
            file.sync_all().map_err(|e| SyncError::io(&part, e))?;
            fs::rename(&part, dest).map_err(|e| SyncError::io(dest, e))
        })();

        if result.is_err() {
            let _ = fs::remove_file(&part);
        }
        result
    }
}
