//! Seams to the systems around the core: secret storage, policy storage and
//! the package registry. Nothing in this crate performs I/O itself.

use crate::error::AuthzError;
use crate::types::PackageMap;

/// Supplies the token signing secret.
pub trait SecretProvider {
    fn signing_secret(&self) -> Result<String, AuthzError>;
}

impl SecretProvider for str {
    fn signing_secret(&self) -> Result<String, AuthzError> {
        Ok(self.to_string())
    }
}

impl SecretProvider for String {
    fn signing_secret(&self) -> Result<String, AuthzError> {
        Ok(self.clone())
    }
}

/// Lists stored policies as `(policy_id, statement text)` pairs.
pub trait PolicyStore {
    fn list_and_fetch(&self) -> Result<Vec<(String, String)>, AuthzError>;
}

/// Resolves a package URI to its logical-to-physical map.
pub trait ManifestResolver {
    fn resolve(&self, quilt_uri: &str) -> Result<PackageMap, AuthzError>;
}

impl<F> ManifestResolver for F
where
    F: Fn(&str) -> Result<PackageMap, AuthzError>,
{
    fn resolve(&self, quilt_uri: &str) -> Result<PackageMap, AuthzError> {
        self(quilt_uri)
    }
}

/// Answers whether an S3 object belongs to a package revision.
pub trait MembershipChecker {
    fn is_member(&self, quilt_uri: &str, bucket: &str, key: &str) -> Result<bool, AuthzError>;
}

impl<F> MembershipChecker for F
where
    F: Fn(&str, &str, &str) -> Result<bool, AuthzError>,
{
    fn is_member(&self, quilt_uri: &str, bucket: &str, key: &str) -> Result<bool, AuthzError> {
        self(quilt_uri, bucket, key)
    }
}

/// Membership derived from a resolved manifest: an object is a member when
/// any logical entry points at it.
pub struct ManifestMembership<R>(pub R);

impl<R: ManifestResolver> MembershipChecker for ManifestMembership<R> {
    fn is_member(&self, quilt_uri: &str, bucket: &str, key: &str) -> Result<bool, AuthzError> {
        Ok(self.0.resolve(quilt_uri)?.contains_location(bucket, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::S3Location;

    fn resolver(_uri: &str) -> Result<PackageMap, AuthzError> {
        Ok(PackageMap::from_iter([(
            "data/file.csv".to_string(),
            S3Location::new("physical", "v1/file.csv"),
        )]))
    }

    #[test]
    fn test_closure_membership_checker() {
        let checker =
            |_: &str, bucket: &str, _: &str| -> Result<bool, AuthzError> { Ok(bucket == "allowed") };
        assert!(checker.is_member("uri", "allowed", "k").unwrap());
        assert!(!checker.is_member("uri", "other", "k").unwrap());
    }

    #[test]
    fn test_manifest_membership() {
        let membership = ManifestMembership(resolver);
        assert!(membership.is_member("uri", "physical", "v1/file.csv").unwrap());
        assert!(!membership.is_member("uri", "physical", "v2/file.csv").unwrap());
    }

    #[test]
    fn test_manifest_membership_propagates_errors() {
        let failing = |_: &str| -> Result<PackageMap, AuthzError> {
            Err(AuthzError::Collaborator("registry unavailable".into()))
        };
        let err = ManifestMembership(failing)
            .is_member("uri", "b", "k")
            .unwrap_err();
        assert_eq!(err, AuthzError::Collaborator("registry unavailable".into()));
    }

    #[test]
    fn test_string_secret_provider() {
        assert_eq!("secret".signing_secret().unwrap(), "secret");
        assert_eq!(String::from("s2").signing_secret().unwrap(), "s2");
    }
}
