//! The course/folder/document tree and its traversal.
//!
//! Nodes are transient: every pass rebuilds them from the remote API. The
//! only durable naming state is the config's name map, which freezes a
//! course's title (remote title + semester) the first time it is resolved
//! so local paths survive remote renames.
//!
//! `deep_documents` expands a course lazily with an explicit work list
//! instead of recursion, so arbitrarily deep remote hierarchies cannot
//! grow the stack. A folder whose listing fails is logged and treated as
//! empty; its siblings are unaffected.

use std::collections::VecDeque;
use std::path::PathBuf;

use thiserror::Error;

use crate::api::{ApiClient, ApiError, CourseDescriptor, DocumentDescriptor, Transport};
use crate::config::{Config, ConfigError};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The course has no name map entry and no semester id to build one.
    #[error("course {0} has no resolvable semester")]
    MissingSemester(String),
}

/// A course root, as handed to the sync engine.
#[derive(Debug, Clone)]
pub struct Course {
    pub id: String,
    pub remote_title: String,
    pub semester_id: Option<String>,
    pub chtime: i64,
}

impl From<CourseDescriptor> for Course {
    fn from(descriptor: CourseDescriptor) -> Self {
        Self {
            id: descriptor.id,
            remote_title: descriptor.title,
            semester_id: descriptor.semester_id,
            chtime: descriptor.chtime,
        }
    }
}

/// A document found by traversal, with its resolved path relative to the
/// course root's parent (i.e. starting with the course directory).
#[derive(Debug, Clone)]
pub struct DocumentEntry {
    pub descriptor: DocumentDescriptor,
    pub rel_path: PathBuf,
}

/// Path and traversal logic over one API client and the name map.
pub struct TreeModel<'a, T: Transport> {
    client: &'a ApiClient<T>,
    config: &'a mut Config,
    portable: bool,
}

impl<'a, T: Transport> TreeModel<'a, T> {
    pub fn new(client: &'a ApiClient<T>, config: &'a mut Config) -> Self {
        let portable = config.settings.portable_names;
        Self {
            client,
            config,
            portable,
        }
    }

    /// Resolve a course's directory name.
    ///
    /// First resolution composes `remote title + " " + semester title`,
    /// sanitizes it and freezes it in the name map; every later call (and
    /// every later run) returns the frozen value unchanged, even if the
    /// remote title differs by then. The entry is only written after the
    /// semester lookup succeeded, so a failed fetch never freezes a bad
    /// name.
    pub fn course_title(&mut self, course: &Course) -> Result<String, ModelError> {
        if let Some(frozen) = self.config.namemap_lookup(&course.id) {
            return Ok(frozen.to_string());
        }
        let semester_id = course
            .semester_id
            .as_deref()
            .ok_or_else(|| ModelError::MissingSemester(course.id.clone()))?;
        let semester = self.client.semester_title(semester_id)?;
        let title = sanitize(
            &format!("{} {}", course.remote_title, semester),
            self.portable,
        );
        self.config.namemap_set(&course.id, &title)?;
        tracing::debug!(course = %course.id, title = %title, "froze course title");
        Ok(title)
    }

    /// Resolve a non-root node's local name: name map override if present,
    /// else the sanitized remote title.
    fn node_title(&self, node_id: &str, remote_title: &str) -> String {
        match self.config.namemap_lookup(node_id) {
            Some(frozen) => frozen.to_string(),
            None => sanitize(remote_title, self.portable),
        }
    }

    /// Collect every document under a course, with resolved relative paths.
    ///
    /// The course root listing is mandatory; its failure propagates so the
    /// caller can skip the course. Below the root, each folder is expanded
    /// from a work list: its documents are emitted before its subfolders
    /// are queued, and a folder that cannot be listed (denied, malformed
    /// or unreachable) is logged and dropped without affecting the rest of
    /// the tree. Folders the remote flags non-readable are skipped without
    /// a fetch. A pending cancellation stops the traversal with
    /// [`ApiError::Interrupted`] before the next listing.
    pub fn deep_documents(
        &mut self,
        course: &Course,
        course_title: &str,
    ) -> Result<Vec<DocumentEntry>, ApiError> {
        struct Pending {
            folder_id: Option<String>,
            rel_dir: PathBuf,
        }

        let mut documents = Vec::new();
        let mut work = VecDeque::new();
        work.push_back(Pending {
            folder_id: None,
            rel_dir: PathBuf::from(course_title),
        });

        while let Some(pending) = work.pop_front() {
            if self.client.is_cancelled() {
                return Err(ApiError::Interrupted);
            }
            let listing = match self
                .client
                .list_folder_contents(&course.id, pending.folder_id.as_deref())
            {
                Ok(listing) => listing,
                Err(err) if pending.folder_id.is_none() => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        course = %course.id,
                        folder = %pending.rel_dir.display(),
                        error = %err,
                        "skipping unreadable folder subtree"
                    );
                    continue;
                }
            };

            for document in listing.documents {
                let name = self.node_title(&document.id, &document.filename);
                documents.push(DocumentEntry {
                    rel_path: pending.rel_dir.join(name),
                    descriptor: document,
                });
            }

            for folder in listing.folders {
                if !folder.readable() {
                    tracing::info!(
                        course = %course.id,
                        folder = %folder.title,
                        "skipping folder marked non-readable"
                    );
                    continue;
                }
                let rel_dir = pending.rel_dir.join(self.node_title(&folder.id, &folder.title));
                work.push_back(Pending {
                    folder_id: Some(folder.id),
                    rel_dir,
                });
            }
        }

        Ok(documents)
    }
}

/// Strip characters that cannot appear in a path component.
///
/// `/` and NUL are always removed. Portable mode additionally removes the
/// conventionally forbidden set (`: < > | ? * " \`) and trailing dots and
/// whitespace, so names stay valid on Windows shares. An empty result
/// falls back to `"untitled"`.
pub fn sanitize(raw: &str, portable: bool) -> String {
    let kept: String = raw
        .chars()
        .filter(|ch| {
            !matches!(ch, '/' | '\0')
                && !(portable && matches!(ch, ':' | '<' | '>' | '|' | '?' | '*' | '"' | '\\'))
        })
        .collect();

    let trimmed = if portable {
        kept.trim().trim_end_matches(['.', ' '])
    } else {
        kept.trim()
    };

    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}
