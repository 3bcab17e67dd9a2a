//! Logical-to-physical package manifest snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AuthzError;

use super::location::S3Location;

/// Immutable snapshot of a package manifest, as handed over by a
/// [`ManifestResolver`](crate::traits::ManifestResolver).
///
/// One logical path may map to several physical locations (replicas).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PackageMap {
    #[serde(default)]
    entries: BTreeMap<String, Vec<S3Location>>,
}

impl PackageMap {
    pub fn new(entries: BTreeMap<String, Vec<S3Location>>) -> Self {
        PackageMap { entries }
    }

    /// Physical targets for `logical_key`; empty when the key is not mapped.
    pub fn translate(&self, logical_key: &str) -> Result<&[S3Location], AuthzError> {
        if logical_key.trim().is_empty() {
            return Err(AuthzError::InvalidRequest(
                "logical key must be non-empty".into(),
            ));
        }
        Ok(self
            .entries
            .get(logical_key)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Whether `(bucket, key)` is one of the physical targets of this package.
    pub fn contains_location(&self, bucket: &str, key: &str) -> bool {
        self.entries
            .values()
            .flatten()
            .any(|loc| loc.bucket == bucket && loc.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, S3Location)> for PackageMap {
    /// Groups locations by logical path, keeping insertion order per path.
    fn from_iter<I: IntoIterator<Item = (String, S3Location)>>(iter: I) -> Self {
        let mut entries: BTreeMap<String, Vec<S3Location>> = BTreeMap::new();
        for (logical, location) in iter {
            entries.entry(logical).or_default().push(location);
        }
        PackageMap { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replicated() -> PackageMap {
        PackageMap::from_iter([
            (
                "logical/file.txt".to_string(),
                S3Location::new("physical-bucket", "data/file.txt"),
            ),
            (
                "logical/file.txt".to_string(),
                S3Location::new("archive-bucket", "data/file.txt"),
            ),
            (
                "README.md".to_string(),
                S3Location::new("physical-bucket", "README.md"),
            ),
        ])
    }

    #[test]
    fn test_translate_returns_all_targets() {
        let map = replicated();
        let targets = map.translate("logical/file.txt").unwrap();
        assert_eq!(
            targets,
            &[
                S3Location::new("physical-bucket", "data/file.txt"),
                S3Location::new("archive-bucket", "data/file.txt"),
            ]
        );
    }

    #[test]
    fn test_translate_unknown_key_is_empty() {
        let map = replicated();
        assert!(map.translate("logical/unknown.txt").unwrap().is_empty());
    }

    #[test]
    fn test_translate_rejects_blank_key() {
        assert!(replicated().translate("  ").is_err());
    }

    #[test]
    fn test_contains_location() {
        let map = replicated();
        assert!(map.contains_location("archive-bucket", "data/file.txt"));
        assert!(!map.contains_location("archive-bucket", "README.md"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_deserialize_missing_entries() {
        let map: PackageMap = serde_json::from_str("{}").unwrap();
        assert!(map.is_empty());
    }
}
