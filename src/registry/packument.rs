//! npm registry documents
//!
//! Only the fields the workflow reads are modelled; everything else in the
//! registry response is ignored.

use crate::core::error::WorkflowError;
use crate::core::session::{RegistryLocation, tarball_file_name};
use crate::registry::archive::PackedArchive;
use crate::validation::PackageManifest;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// Package metadata document (`GET {registry}{name}`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Packument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub versions: HashMap<String, VersionDocument>,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: HashMap<String, String>,
}

impl Packument {
    pub fn has_version(&self, version: &str) -> bool {
        self.versions.contains_key(version)
    }
}

/// One entry of `versions`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionDocument {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub dist: Option<Dist>,
}

/// Where a version's tarball lives and how to check it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dist {
    pub tarball: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
}

/// Build the body of a publish request.
///
/// The document carries the manifest as the single new version, points the
/// dist-tag at it and inlines the tarball as a base64 attachment.
pub fn publish_document(
    registry: &RegistryLocation,
    manifest: &PackageManifest,
    archive: &PackedArchive,
    tag: &str,
) -> Result<Value, WorkflowError> {
    let name = manifest.name.as_str();
    let version = manifest.version.as_str();

    let mut version_doc = manifest.to_value()?;
    if let Some(fields) = version_doc.as_object_mut() {
        fields.insert("_id".to_string(), json!(format!("{}@{}", name, version)));
        fields.insert(
            "dist".to_string(),
            serde_json::to_value(Dist {
                tarball: registry.tarball_url(name, version),
                integrity: Some(archive.integrity.clone()),
                shasum: None,
            })
            .map_err(|e| WorkflowError::InvalidManifest {
                message: e.to_string(),
            })?,
        );
    }

    let mut dist_tags = Map::new();
    dist_tags.insert(tag.to_string(), json!(version));

    let mut versions = Map::new();
    versions.insert(version.to_string(), version_doc);

    let mut attachments = Map::new();
    attachments.insert(
        tarball_file_name(name, version),
        json!({
            "content_type": "application/octet-stream",
            "data": STANDARD.encode(&archive.bytes),
            "length": archive.bytes.len(),
        }),
    );

    let mut document = json!({
        "_id": name,
        "name": name,
        "dist-tags": dist_tags,
        "versions": versions,
        "_attachments": attachments,
    });
    if let (Some(description), Some(fields)) =
        (manifest.description.as_ref(), document.as_object_mut())
    {
        fields.insert("description".to_string(), json!(description));
    }

    Ok(document)
}
