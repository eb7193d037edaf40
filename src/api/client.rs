//! Typed client for the Stud.IP Rest.IP API with bounded retry.
//!
//! Every network call runs under [`RetryPolicy`]: transient failures
//! (connection errors, non-success statuses, empty bodies) are retried on a
//! fixed delay until a total elapsed budget is spent, after which the call
//! fails with [`ApiError::Network`]. Two failure shapes short-circuit the
//! loop: the remote's access-denied marker ([`ApiError::NotAccessible`])
//! and non-parseable payloads ([`ApiError::Malformed`]).

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use thiserror::Error;

use super::transport::{RawResponse, Transport};
use super::types::{
    CourseDescriptor, CourseDetailEnvelope, CoursesEnvelope, FolderListing, SemesterEnvelope,
};

/// Errors surfaced by the API client.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Retry budget exhausted; terminal for this call.
    #[error("network failure on GET {route}: {message}")]
    Network { route: String, message: String },

    /// Credentials rejected by the server. Fatal at startup, never retried.
    #[error("credentials rejected by the server (HTTP {0})")]
    Auth(u16),

    /// The remote denies access to this node. Not retried; callers skip
    /// the affected subtree.
    #[error("remote denies access to GET {0}")]
    NotAccessible(String),

    /// Unexpected or non-parseable payload. Not retried.
    #[error("malformed response from GET {route}: {message}")]
    Malformed { route: String, message: String },

    /// A termination signal arrived while the call was retrying. Terminal;
    /// the engine flushes its state and exits.
    #[error("interrupted by a termination signal")]
    Interrupted,
}

/// Bounded retry: fixed delay between attempts, total elapsed budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Pause between attempts.
    pub delay: Duration,
    /// Total time allowed across attempts. At least one attempt always runs.
    pub budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500),
            budget: Duration::from_secs(180),
        }
    }
}

/// Client over a [`Transport`], owning the per-process semester-title cache.
pub struct ApiClient<T: Transport> {
    transport: T,
    retry: RetryPolicy,
    cancelled: Arc<AtomicBool>,
    // Semester titles are immutable facts; cache them for the process
    // lifetime to avoid a round trip per course. Single-threaded access.
    semester_titles: RefCell<HashMap<String, String>>,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            cancelled: Arc::new(AtomicBool::new(false)),
            semester_titles: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Flag observed between retry attempts. The sync engine shares this
    /// handle with the signal handler so a termination signal aborts an
    /// in-flight retry loop instead of waiting out the budget.
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// One unretried probe against `/courses` to validate credentials.
    ///
    /// HTTP 401/403 here means the credentials themselves are bad, which
    /// must abort the run before any sync work begins.
    pub fn check_auth(&self) -> Result<(), ApiError> {
        let response = self.transport.get("/courses").map_err(|e| ApiError::Network {
            route: "/courses".into(),
            message: e.to_string(),
        })?;
        match response.status {
            401 | 403 => Err(ApiError::Auth(response.status)),
            _ => Ok(()),
        }
    }

    /// List all courses the user is subscribed to, in server order.
    ///
    /// Entries missing a semester id are backfilled from the course detail
    /// route; if that lookup fails the entry keeps `None` and the caller
    /// decides whether the course is usable.
    pub fn list_courses(&self) -> Result<Vec<CourseDescriptor>, ApiError> {
        let envelope: CoursesEnvelope = self.get_json("/courses")?;
        let mut courses = envelope.courses;
        for course in &mut courses {
            if course.semester_id.is_none() {
                match self.course_semester_id(&course.id) {
                    Ok(semester_id) => course.semester_id = semester_id,
                    Err(err) => {
                        tracing::warn!(course = %course.id, error = %err, "could not resolve semester id");
                    }
                }
            }
        }
        Ok(courses)
    }

    /// List one folder's contents. `None` means the course root folder.
    pub fn list_folder_contents(
        &self,
        course_id: &str,
        folder_id: Option<&str>,
    ) -> Result<FolderListing, ApiError> {
        let route = match folder_id {
            Some(folder_id) => format!("/documents/{course_id}/folder/{folder_id}"),
            None => format!("/documents/{course_id}/folder"),
        };
        self.get_json(&route)
    }

    /// Resolve a semester id to its display title, memoized per process.
    pub fn semester_title(&self, semester_id: &str) -> Result<String, ApiError> {
        if let Some(title) = self.semester_titles.borrow().get(semester_id) {
            return Ok(title.clone());
        }
        let envelope: SemesterEnvelope = self.get_json(&format!("/semesters/{semester_id}"))?;
        self.semester_titles
            .borrow_mut()
            .insert(semester_id.to_string(), envelope.semester.title.clone());
        Ok(envelope.semester.title)
    }

    /// Open a byte stream for one document.
    pub fn download_document(&self, document_id: &str) -> Result<Box<dyn Read>, ApiError> {
        let route = format!("/documents/{document_id}/download");
        let deadline = Instant::now() + self.retry.budget;
        loop {
            match self.transport.get_stream(&route) {
                Ok(stream) if (200..300).contains(&stream.status) => return Ok(stream.reader),
                Ok(stream) => {
                    // Error payloads are small; buffer them to check for
                    // the access-denied marker.
                    let mut body = Vec::new();
                    let _ = stream.reader.take(64 * 1024).read_to_end(&mut body);
                    let response = RawResponse {
                        status: stream.status,
                        body,
                    };
                    if response.denies_access() {
                        return Err(ApiError::NotAccessible(route));
                    }
                    tracing::debug!(route = %route, status = stream.status, "transient download failure");
                }
                Err(err) => {
                    tracing::debug!(route = %route, error = %err, "transport error, will retry");
                }
            }
            if self.is_cancelled() {
                return Err(ApiError::Interrupted);
            }
            if Instant::now() >= deadline {
                return Err(ApiError::Network {
                    route,
                    message: format!("retry budget of {:?} exhausted", self.retry.budget),
                });
            }
            std::thread::sleep(self.retry.delay);
        }
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    fn course_semester_id(&self, course_id: &str) -> Result<Option<String>, ApiError> {
        let envelope: CourseDetailEnvelope = self.get_json(&format!("/courses/{course_id}"))?;
        Ok(envelope.course.semester_id)
    }

    /// Fetch a route under the retry policy and deserialize the body.
    fn get_json<D: DeserializeOwned>(&self, route: &str) -> Result<D, ApiError> {
        let response = self.get_checked(route)?;
        serde_json::from_slice(&response.body).map_err(|e| ApiError::Malformed {
            route: route.to_string(),
            message: e.to_string(),
        })
    }

    /// The retry loop. Returns the first successful non-empty response,
    /// fails fast on the access-denied marker, and gives up with
    /// [`ApiError::Network`] once the budget elapses. A cancellation
    /// request ends the loop with [`ApiError::Interrupted`] after the
    /// current attempt.
    fn get_checked(&self, route: &str) -> Result<RawResponse, ApiError> {
        let deadline = Instant::now() + self.retry.budget;
        loop {
            match self.transport.get(route) {
                Ok(response) => {
                    if response.is_success() && !response.body.is_empty() {
                        return Ok(response);
                    }
                    if response.denies_access() {
                        return Err(ApiError::NotAccessible(route.to_string()));
                    }
                    // Non-success statuses and empty bodies can reflect
                    // eventual server consistency; keep trying.
                    tracing::debug!(
                        route,
                        status = response.status,
                        bytes = response.body.len(),
                        "transient response, will retry"
                    );
                }
                Err(err) => {
                    tracing::debug!(route, error = %err, "transport error, will retry");
                }
            }
            if self.is_cancelled() {
                return Err(ApiError::Interrupted);
            }
            if Instant::now() >= deadline {
                return Err(ApiError::Network {
                    route: route.to_string(),
                    message: format!("retry budget of {:?} exhausted", self.retry.budget),
                });
            }
            std::thread::sleep(self.retry.delay);
        }
    }
}
