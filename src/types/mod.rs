//! Value types shared by the compiler, the token subsystem and the enforcer.
//!
//! Canonical string forms:
//! - Scope: `ResourceType:ResourceId:Action`, e.g. `S3Object:bucket/key.txt:s3:GetObject`
//! - S3 location: `s3://bucket/key`
//!
//! Every value here is immutable once constructed.

mod decision;
mod location;
mod package_map;
mod request;
mod scope;

pub use decision::Decision;
pub use location::{S3Location, parse_s3_path};
pub use package_map::PackageMap;
pub use request::{AuthRequest, PackageAccessRequest};
pub use scope::{SCOPE_DELIMITER, Scope};
