//! Authenticated access to the Stud.IP Rest.IP API.
//!
//! - **transport**: the blocking HTTP seam ([`Transport`], [`HttpTransport`])
//! - **types**: descriptor records validated at the serde boundary
//! - **client**: typed operations under a bounded retry policy
//!
//! The client never interprets the hierarchy; it hands descriptor records
//! to the tree model, which decides names, paths and traversal order.

pub mod client;
pub mod transport;
pub mod types;

pub use client::{ApiClient, ApiError, RetryPolicy};
pub use transport::{HttpTransport, RawResponse, Transport, TransportError};
pub use types::{CourseDescriptor, DocumentDescriptor, FolderDescriptor, FolderListing};
