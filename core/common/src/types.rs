//! Common types used throughout blobgate.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Maximum length of a blob name, in characters.
pub const MAX_BLOB_NAME_LEN: usize = 1024;

/// Name of the implicit root container of a storage account.
pub const ROOT_CONTAINER: &str = "$root";

/// A blob key within a container, independent of the backend.
///
/// Names are `/`-separated. Leading separators are dropped so that
/// `"/a/b.png"` and `"a/b.png"` address the same blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobName(String);

impl BlobName {
    /// Parse and validate a blob name.
    ///
    /// # Errors
    /// - Name is empty after stripping leading `/`
    /// - Name is longer than [`MAX_BLOB_NAME_LEN`] characters
    /// - Name contains `\` or control characters
    /// - Name contains an empty, `.` or `..` segment
    pub fn parse(name: &str) -> crate::Result<Self> {
        let name = name.trim_start_matches('/');
        if name.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Blob name cannot be empty".to_string(),
            ));
        }
        if name.chars().count() > MAX_BLOB_NAME_LEN {
            return Err(crate::Error::InvalidInput(format!(
                "Blob name exceeds {} characters",
                MAX_BLOB_NAME_LEN
            )));
        }
        if name.contains('\\') || name.chars().any(char::is_control) {
            return Err(crate::Error::InvalidInput(
                "Blob name contains invalid characters".to_string(),
            ));
        }
        for segment in name.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(crate::Error::InvalidInput(format!(
                    "Blob name has an invalid segment: '{}'",
                    segment
                )));
            }
        }
        Ok(Self(name.to_string()))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the `/`-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Last segment of the name.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Append `child` below this name, as if this name were a directory.
    ///
    /// # Errors
    /// - Joined name fails validation
    pub fn join(&self, child: &str) -> crate::Result<Self> {
        Self::parse(&format!("{}/{}", self.0, child.trim_start_matches('/')))
    }

    /// Extension of the last segment, if any.
    pub fn extension(&self) -> Option<&str> {
        let file_name = self.file_name();
        match file_name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&file_name[idx + 1..]),
        }
    }
}

impl TryFrom<String> for BlobName {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<BlobName> for String {
    fn from(name: BlobName) -> Self {
        name.0
    }
}

impl fmt::Display for BlobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a blob container.
///
/// Follows the Azure naming rules: 3-63 characters of lowercase ASCII
/// letters, digits and `-`, starting and ending with a letter or digit,
/// without consecutive hyphens. `$root` is accepted as the root container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerName(String);

impl ContainerName {
    /// Validate a container name.
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name == ROOT_CONTAINER {
            return Ok(Self(name));
        }

        let len = name.len();
        if !(3..=63).contains(&len) {
            return Err(crate::Error::InvalidInput(format!(
                "Container name must be 3-63 characters: '{}'",
                name
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(crate::Error::InvalidInput(format!(
                "Container name may only contain lowercase letters, digits and '-': '{}'",
                name
            )));
        }
        if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
            return Err(crate::Error::InvalidInput(format!(
                "Container name has misplaced hyphens: '{}'",
                name
            )));
        }
        Ok(Self(name))
    }

    /// The root container of the account.
    pub fn root() -> Self {
        Self(ROOT_CONTAINER.to_string())
    }

    /// Whether this is the root container.
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_CONTAINER
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContainerName {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<ContainerName> for String {
    fn from(name: ContainerName) -> Self {
        name.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sensitive data wrapper that zeroizes on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_blob_name_strips_leading_slash() {
        let name = BlobName::parse("/photos/cat.png").unwrap();
        assert_eq!(name.as_str(), "photos/cat.png");
    }

    #[test]
    fn test_blob_name_rejects_empty() {
        assert!(BlobName::parse("").is_err());
        assert!(BlobName::parse("///").is_err());
    }

    #[test]
    fn test_blob_name_rejects_bad_segments() {
        assert!(BlobName::parse("a//b").is_err());
        assert!(BlobName::parse("a/./b").is_err());
        assert!(BlobName::parse("../etc/passwd").is_err());
        assert!(BlobName::parse("dir/").is_err());
        assert!(BlobName::parse("a\\b").is_err());
        assert!(BlobName::parse("a\nb").is_err());
    }

    #[test]
    fn test_blob_name_length_limit() {
        let ok = "a".repeat(MAX_BLOB_NAME_LEN);
        assert!(BlobName::parse(&ok).is_ok());
        let too_long = "a".repeat(MAX_BLOB_NAME_LEN + 1);
        assert!(BlobName::parse(&too_long).is_err());
    }

    #[test]
    fn test_blob_name_file_name_and_extension() {
        let name = BlobName::parse("a/b/photo.large.JPG").unwrap();
        assert_eq!(name.file_name(), "photo.large.JPG");
        assert_eq!(name.extension(), Some("JPG"));
        assert_eq!(name.segments().count(), 3);

        assert_eq!(BlobName::parse(".hidden").unwrap().extension(), None);
        assert_eq!(BlobName::parse("README").unwrap().extension(), None);
    }

    #[test]
    fn test_blob_name_join() {
        let dir = BlobName::parse("photos/2024").unwrap();
        assert_eq!(dir.join("cat.png").unwrap().as_str(), "photos/2024/cat.png");
        assert_eq!(dir.join("/cat.png").unwrap().as_str(), "photos/2024/cat.png");
        assert!(dir.join("").is_err());
        assert!(dir.join("../cat.png").is_err());
    }

    #[test]
    fn test_blob_name_deserialize_validates() {
        let ok: BlobName = serde_json::from_str("\"x/y.txt\"").unwrap();
        assert_eq!(ok.as_str(), "x/y.txt");
        assert!(serde_json::from_str::<BlobName>("\"a/../b\"").is_err());
    }

    #[test]
    fn test_container_name_rules() {
        assert!(ContainerName::new("images").is_ok());
        assert!(ContainerName::new("my-images-01").is_ok());
        assert!(ContainerName::new("ab").is_err());
        assert!(ContainerName::new("Images").is_err());
        assert!(ContainerName::new("-images").is_err());
        assert!(ContainerName::new("images-").is_err());
        assert!(ContainerName::new("my--images").is_err());
        assert!(ContainerName::new("a".repeat(64)).is_err());
    }

    #[test]
    fn test_container_root() {
        let root = ContainerName::new("$root").unwrap();
        assert!(root.is_root());
        assert_eq!(root, ContainerName::root());
        assert!(!ContainerName::new("abc").unwrap().is_root());
    }

    #[test]
    fn test_sensitive_bytes_debug_is_redacted() {
        let key = SensitiveBytes::new(vec![1, 2, 3]);
        assert_eq!(format!("{:?}", key), "SensitiveBytes([REDACTED; 3 bytes])");
    }

    proptest! {
        #[test]
        fn prop_valid_segments_parse(segments in prop::collection::vec("[a-zA-Z0-9_-]{1,12}", 1..6)) {
            let joined = segments.join("/");
            let name = BlobName::parse(&joined).unwrap();
            prop_assert_eq!(name.as_str(), joined.as_str());
            prop_assert_eq!(name.segments().count(), segments.len());
        }

        #[test]
        fn prop_leading_slashes_ignored(prefix in "/{0,4}", body in "[a-z]{1,10}(/[a-z]{1,10}){0,3}") {
            let with = BlobName::parse(&format!("{}{}", prefix, body)).unwrap();
            let without = BlobName::parse(&body).unwrap();
            prop_assert_eq!(with, without);
        }
    }
}
