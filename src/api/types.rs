//! Descriptor records for the Stud.IP JSON payloads.
//!
//! The remote API is loosely typed; these records pin down exactly the
//! fields the sync core relies on. Deserialization failure anywhere in a
//! payload surfaces as [`crate::api::ApiError::Malformed`] at the client
//! boundary rather than as an unchecked field access later.

use serde::{Deserialize, Deserializer};

/// One course from `GET /courses`.
#[derive(Debug, Clone, Deserialize)]
pub struct CourseDescriptor {
    #[serde(rename = "course_id")]
    pub id: String,
    pub title: String,
    /// Missing in some deployments' course listings; the client backfills
    /// it from the course detail route.
    #[serde(default)]
    pub semester_id: Option<String>,
    #[serde(rename = "chdate", default, deserialize_with = "epoch_secs")]
    pub chtime: i64,
}

/// One folder entry from a folder listing.
#[derive(Debug, Clone, Deserialize)]
pub struct FolderDescriptor {
    #[serde(rename = "folder_id")]
    pub id: String,
    #[serde(rename = "name")]
    pub title: String,
    #[serde(rename = "chdate", default, deserialize_with = "epoch_secs")]
    pub chtime: i64,
    #[serde(default)]
    permissions: Option<FolderPermissions>,
}

impl FolderDescriptor {
    /// Whether the remote marked this folder readable. Absent permission
    /// data counts as readable; only an explicit `false` blocks traversal.
    pub fn readable(&self) -> bool {
        self.permissions.as_ref().map_or(true, |p| p.readable)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct FolderPermissions {
    #[serde(default = "default_true")]
    readable: bool,
}

/// One document entry from a folder listing.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentDescriptor {
    #[serde(rename = "document_id")]
    pub id: String,
    pub filename: String,
    #[serde(rename = "chdate", default, deserialize_with = "epoch_secs")]
    pub chtime: i64,
}

/// Contents of one folder: documents and subfolders.
///
/// Both keys must be present in the payload; a listing without them is
/// malformed.
#[derive(Debug, Clone, Deserialize)]
pub struct FolderListing {
    pub documents: Vec<DocumentDescriptor>,
    pub folders: Vec<FolderDescriptor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CoursesEnvelope {
    pub courses: Vec<CourseDescriptor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CourseDetailEnvelope {
    pub course: CourseDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CourseDetail {
    #[serde(default)]
    pub semester_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SemesterEnvelope {
    pub semester: SemesterDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SemesterDetail {
    pub title: String,
}

fn default_true() -> bool {
    true
}

/// Stud.IP serializes `chdate` sometimes as a number, sometimes as a
/// numeric string. Accept both.
fn epoch_secs<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Epoch {
        Num(i64),
        Text(String),
    }

    match Epoch::deserialize(deserializer)? {
        Epoch::Num(n) => Ok(n),
        Epoch::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid epoch timestamp: {s:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_descriptor_numeric_chdate() {
        let json = r#"{"course_id": "c1", "title": "Algorithms", "semester_id": "s1", "chdate": 1700000000}"#;
        let course: CourseDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(course.id, "c1");
        assert_eq!(course.semester_id.as_deref(), Some("s1"));
        assert_eq!(course.chtime, 1700000000);
    }

    #[test]
    fn test_course_descriptor_string_chdate() {
        let json = r#"{"course_id": "c1", "title": "Algorithms", "chdate": "1700000000"}"#;
        let course: CourseDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(course.chtime, 1700000000);
        assert!(course.semester_id.is_none());
    }

    #[test]
    fn test_course_descriptor_missing_id_is_error() {
        let json = r#"{"title": "Algorithms"}"#;
        assert!(serde_json::from_str::<CourseDescriptor>(json).is_err());
    }

    #[test]
    fn test_folder_readable_defaults() {
        let json = r#"{"folder_id": "f1", "name": "Slides"}"#;
        let folder: FolderDescriptor = serde_json::from_str(json).unwrap();
        assert!(folder.readable());

        let json = r#"{"folder_id": "f1", "name": "Slides", "permissions": {"readable": false}}"#;
        let folder: FolderDescriptor = serde_json::from_str(json).unwrap();
        assert!(!folder.readable());
    }

    #[test]
    fn test_folder_listing_requires_both_keys() {
        let json = r#"{"documents": []}"#;
        assert!(serde_json::from_str::<FolderListing>(json).is_err());

        let json = r#"{"documents": [], "folders": []}"#;
        let listing: FolderListing = serde_json::from_str(json).unwrap();
        assert!(listing.documents.is_empty());
        assert!(listing.folders.is_empty());
    }

    #[test]
    fn test_document_descriptor() {
        let json = r#"{"document_id": "d9", "filename": "week1.pdf", "chdate": "1000"}"#;
        let doc: DocumentDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(doc.filename, "week1.pdf");
        assert_eq!(doc.chtime, 1000);
    }

    #[test]
    fn test_bad_epoch_is_error() {
        let json = r#"{"document_id": "d9", "filename": "x", "chdate": "soon"}"#;
        assert!(serde_json::from_str::<DocumentDescriptor>(json).is_err());
    }
}
