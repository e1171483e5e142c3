pub mod manifest_validator;
pub mod version_validator;

pub use manifest_validator::{ManifestValidator, PackageManifest, ValidationResult};
pub use version_validator::VersionValidator;
