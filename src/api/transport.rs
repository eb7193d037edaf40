//! HTTP transport seam for the Stud.IP client.
//!
//! The typed client ([`super::client::ApiClient`]) talks to the remote API
//! through the [`Transport`] trait so that retry and parsing logic can be
//! exercised in tests without a network. The production implementation is
//! [`HttpTransport`], a thin wrapper around `reqwest::blocking` that applies
//! HTTP Basic auth to every request.

use std::borrow::Cow;
use std::io::Read;
use std::time::Duration;

use thiserror::Error;

use crate::credentials::Credentials;

/// Connection-level failure: the request never produced an HTTP response.
/// Always treated as transient by the retry layer.
#[derive(Error, Debug)]
#[error("transport failure on GET {route}: {message}")]
pub struct TransportError {
    /// Route that was being fetched.
    pub route: String,
    /// Underlying error description.
    pub message: String,
}

impl TransportError {
    pub fn new(route: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            message: message.into(),
        }
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, lossy on invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Whether the body carries the remote's access-denied marker.
    ///
    /// Stud.IP reports inaccessible nodes in the body text rather than with
    /// a dedicated status code, so this is matched on substrings.
    pub(crate) fn denies_access(&self) -> bool {
        let text = self.text();
        text.contains("not permitted") || text.contains("may not access")
    }
}

/// An HTTP response whose body is consumed as a stream (downloads).
pub struct RawStream {
    /// HTTP status code, available before the body is read.
    pub status: u16,
    /// Body reader.
    pub reader: Box<dyn Read>,
}

/// Blocking GET access to the remote API.
pub trait Transport {
    /// Fetch a route and buffer the whole body.
    fn get(&self, route: &str) -> Result<RawResponse, TransportError>;

    /// Fetch a route for streaming consumption (document downloads).
    fn get_stream(&self, route: &str) -> Result<RawStream, TransportError>;
}

/// Production transport over `reqwest::blocking` with Basic auth.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_address: String,
    credentials: Credentials,
}

impl HttpTransport {
    /// Create a transport rooted at `base_address` (e.g.
    /// `https://studip.example.edu/plugins.php/restipplugin/api`).
    pub fn new(base_address: &str, credentials: Credentials) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| TransportError::new("<client setup>", e.to_string()))?;

        Ok(Self {
            client,
            base_address: base_address.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_address, route)
    }

    fn request(&self, route: &str) -> reqwest::blocking::RequestBuilder {
        self.client.get(self.url(route)).basic_auth(
            &self.credentials.username,
            Some(&self.credentials.password),
        )
    }
}

impl Transport for HttpTransport {
    fn get(&self, route: &str) -> Result<RawResponse, TransportError> {
        tracing::trace!(route, "GET");
        let response = self
            .request(route)
            .send()
            .map_err(|e| TransportError::new(route, e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| TransportError::new(route, e.to_string()))?
            .to_vec();
        Ok(RawResponse { status, body })
    }

    fn get_stream(&self, route: &str) -> Result<RawStream, TransportError> {
        tracing::trace!(route, "GET (stream)");
        let response = self
            .request(route)
            .send()
            .map_err(|e| TransportError::new(route, e.to_string()))?;
        Ok(RawStream {
            status: response.status().as_u16(),
            reader: Box::new(response),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory transport used across the crate's unit tests.

    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io::Cursor;

    use super::*;

    #[derive(Clone)]
    pub(crate) enum FakeOutcome {
        Respond { status: u16, body: Vec<u8> },
        Fail(String),
    }

    /// Transport that serves canned responses per route.
    ///
    /// Each route holds a sequence of outcomes; once the sequence is
    /// exhausted the last outcome repeats, so a single entry behaves as a
    /// sticky response. Unknown routes answer 404.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        scripts: RefCell<HashMap<String, (usize, Vec<FakeOutcome>)>>,
        pub(crate) requests: RefCell<Vec<String>>,
    }

    impl FakeTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Serve `body` with status 200 for `route`.
        pub(crate) fn ok(self, route: &str, body: &str) -> Self {
            self.push(route, FakeOutcome::Respond {
                status: 200,
                body: body.as_bytes().to_vec(),
            });
            self
        }

        /// Serve an arbitrary status/body for `route`.
        pub(crate) fn respond(self, route: &str, status: u16, body: &str) -> Self {
            self.push(route, FakeOutcome::Respond {
                status,
                body: body.as_bytes().to_vec(),
            });
            self
        }

        /// Make `route` fail at the connection level.
        pub(crate) fn fail(self, route: &str) -> Self {
            self.push(route, FakeOutcome::Fail("connection refused".into()));
            self
        }

        fn push(&self, route: &str, outcome: FakeOutcome) {
            self.scripts
                .borrow_mut()
                .entry(route.to_string())
                .or_insert_with(|| (0, Vec::new()))
                .1
                .push(outcome);
        }

        /// Number of requests issued against `route`.
        pub(crate) fn hits(&self, route: &str) -> usize {
            self.requests
                .borrow()
                .iter()
                .filter(|r| r.as_str() == route)
                .count()
        }

        fn next(&self, route: &str) -> Result<RawResponse, TransportError> {
            self.requests.borrow_mut().push(route.to_string());
            let mut scripts = self.scripts.borrow_mut();
            let outcome = match scripts.get_mut(route) {
                Some((cursor, outcomes)) => {
                    let outcome = outcomes[(*cursor).min(outcomes.len() - 1)].clone();
                    *cursor += 1;
                    outcome
                }
                None => FakeOutcome::Respond {
                    status: 404,
                    body: b"no such route".to_vec(),
                },
            };
            match outcome {
                FakeOutcome::Respond { status, body } => Ok(RawResponse { status, body }),
                FakeOutcome::Fail(message) => Err(TransportError::new(route, message)),
            }
        }
    }

    impl Transport for FakeTransport {
        fn get(&self, route: &str) -> Result<RawResponse, TransportError> {
            self.next(route)
        }

        fn get_stream(&self, route: &str) -> Result<RawStream, TransportError> {
            let response = self.next(route)?;
            Ok(RawStream {
                status: response.status,
                reader: Box::new(Cursor::new(response.body)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denies_access_marker() {
        let resp = RawResponse {
            status: 500,
            body: b"User may not access file".to_vec(),
        };
        assert!(resp.denies_access());

        let resp = RawResponse {
            status: 500,
            body: b"Access to this resource is not permitted".to_vec(),
        };
        assert!(resp.denies_access());

        let resp = RawResponse {
            status: 200,
            body: b"{\"courses\": []}".to_vec(),
        };
        assert!(!resp.denies_access());
    }

    #[test]
    fn test_is_success() {
        assert!(RawResponse { status: 200, body: vec![] }.is_success());
        assert!(RawResponse { status: 204, body: vec![] }.is_success());
        assert!(!RawResponse { status: 301, body: vec![] }.is_success());
        assert!(!RawResponse { status: 500, body: vec![] }.is_success());
    }

    #[test]
    fn test_http_transport_url_join() {
        let creds = Credentials {
            username: "user".into(),
            password: "pass".into(),
        };
        let transport = HttpTransport::new("https://example.edu/api/", creds).unwrap();
        assert_eq!(transport.url("/courses"), "https://example.edu/api/courses");
    }
}
