//! Package tarballs
//!
//! Packing follows the npm layout: every entry lives under a single `package/`
//! directory and the set of files is driven by the manifest's `files` list.
//! Archives are built deterministically (sorted entries, fixed mtime and mode)
//! so packing the same tree twice yields the same integrity.
//!
//! Extraction strips the single top-level directory, refuses entries that
//! would escape the destination and replaces whatever was extracted before.

use crate::core::error::WorkflowError;
use crate::validation::PackageManifest;
use crate::validation::manifest_validator::MANIFEST_FILE;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use regex::Regex;
use sha2::{Digest, Sha512};
use std::fs::File;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use tar::EntryType;
use tracing::debug;
use walkdir::WalkDir;

/// Top-level directory of npm tarballs
pub const PACKAGE_PREFIX: &str = "package";

/// Never packed, whatever `files` says
const ALWAYS_EXCLUDED: &[&str] = &[
    ".git",
    "node_modules",
    ".npmrc",
    "package-lock.json",
    ".DS_Store",
    "npm-debug.log",
];

/// mtime written into every entry (1985-10-26, the value npm uses)
const FIXED_MTIME: u64 = 499_162_500;

/// A packed package
#[derive(Debug, Clone)]
pub struct PackedArchive {
    /// Gzipped tarball
    pub bytes: Vec<u8>,
    /// Packed files, relative to the package root, sorted
    pub files: Vec<String>,
    /// `sha512-<base64>` subresource integrity string
    pub integrity: String,
}

/// Compute the `sha512-<base64>` integrity of a byte slice.
///
/// # Examples
///
/// ```
/// use artifact_publisher::registry::compute_integrity;
///
/// let integrity = compute_integrity(b"");
/// assert!(integrity.starts_with("sha512-z4PhNX7vuL3xVChQ1m2AB9Yg5AULVxXcg"));
/// ```
pub fn compute_integrity(bytes: &[u8]) -> String {
    let digest = Sha512::digest(bytes);
    format!("sha512-{}", STANDARD.encode(digest))
}

/// Check bytes against an integrity string.
///
/// The string may list several space-separated hashes; any matching sha512
/// entry is accepted. Returns `None` when the string has no sha512 entry.
pub fn verify_integrity(bytes: &[u8], expected: &str) -> Option<bool> {
    let actual = compute_integrity(bytes);
    let mut candidates = expected
        .split_whitespace()
        .filter(|entry| entry.starts_with("sha512-"))
        .peekable();

    candidates.peek()?;
    Some(candidates.any(|entry| {
        // Drop `?opt` suffixes allowed by the SRI grammar
        let hash = entry.split('?').next().unwrap_or(entry);
        hash == actual
    }))
}

/// Relative paths (forward slashes) of the files a package would publish
pub fn collect_files(
    package_dir: &Path,
    manifest: &PackageManifest,
) -> Result<Vec<String>, WorkflowError> {
    let patterns = match &manifest.files {
        Some(entries) => Some(FilePatterns::new(entries)?),
        None => None,
    };

    let mut files = Vec::new();
    let walker = WalkDir::new(package_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !ALWAYS_EXCLUDED
                    .iter()
                    .any(|excluded| entry.file_name() == *excluded)
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(package_dir).to_path_buf();
            WorkflowError::io(path, std::io::Error::other(e.to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = match entry.path().strip_prefix(package_dir) {
            Ok(relative) => to_slash_path(relative),
            Err(_) => continue,
        };

        let included = is_always_included(&relative)
            || patterns
                .as_ref()
                .is_none_or(|patterns| patterns.matches(&relative));
        if included {
            files.push(relative);
        }
    }

    if !files.iter().any(|f| f.as_str() == MANIFEST_FILE) {
        return Err(WorkflowError::InvalidManifest {
            message: format!("{} has no package.json", package_dir.display()),
        });
    }

    files.sort();
    Ok(files)
}

/// Pack a package directory into an npm tarball.
///
/// `package.json` is written from `manifest`, so in-memory edits (renamed
/// package, bumped version) end up in the archive without touching the
/// directory.
pub fn pack_directory(
    package_dir: &Path,
    manifest: &PackageManifest,
) -> Result<PackedArchive, WorkflowError> {
    let files = collect_files(package_dir, manifest)?;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for relative in &files {
        let source = package_dir.join(relative);
        let content = if relative.as_str() == MANIFEST_FILE {
            manifest.to_pretty_json()?.into_bytes()
        } else {
            std::fs::read(&source).map_err(|e| WorkflowError::io(&source, e))?
        };

        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(FIXED_MTIME);
        header.set_entry_type(EntryType::Regular);

        let archive_path = format!("{}/{}", PACKAGE_PREFIX, relative);
        debug!(path = %archive_path, size = content.len(), "packing");
        builder
            .append_data(&mut header, &archive_path, content.as_slice())
            .map_err(|e| WorkflowError::io(&source, e))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| WorkflowError::io(package_dir, e))?;
    let bytes = encoder
        .finish()
        .map_err(|e| WorkflowError::io(package_dir, e))?;

    Ok(PackedArchive {
        integrity: compute_integrity(&bytes),
        bytes,
        files,
    })
}

/// Extract a gzipped tarball into `dest`, dropping its top-level directory.
///
/// The archive is unpacked into a staging directory next to `dest`, which then
/// replaces `dest` as a whole, so the result holds exactly the archive's files.
/// On failure `dest` is left as it was.
///
/// Returns the extracted files relative to `dest`, sorted. Fails with an
/// extraction error when the archive is corrupt, empty, has more than one
/// top-level directory, or contains a path leaving the destination.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> Result<Vec<String>, WorkflowError> {
    if bytes.is_empty() {
        return Err(WorkflowError::extraction("archive is empty"));
    }

    if dest.exists() && !dest.is_dir() {
        return Err(WorkflowError::extraction(format!(
            "{} exists and is not a directory",
            dest.display()
        )));
    }

    let staging = staging_dir(dest)?;
    if let Some(parent) = staging.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| WorkflowError::io(parent, e))?;
    }
    if staging.exists() {
        std::fs::remove_dir_all(&staging).map_err(|e| WorkflowError::io(&staging, e))?;
    }
    std::fs::create_dir(&staging).map_err(|e| WorkflowError::io(&staging, e))?;

    let files = match unpack_entries(bytes, &staging) {
        Ok(files) => files,
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                debug!(path = %staging.display(), error = %cleanup, "staging directory left behind");
            }
            return Err(e);
        }
    };

    if dest.is_dir() {
        debug!(path = %dest.display(), "replacing previous contents");
        std::fs::remove_dir_all(dest).map_err(|e| WorkflowError::io(dest, e))?;
    }
    std::fs::rename(&staging, dest).map_err(|e| WorkflowError::io(dest, e))?;

    Ok(files)
}

/// `.<name>.extracting` next to `dest`
fn staging_dir(dest: &Path) -> Result<PathBuf, WorkflowError> {
    let name = dest.file_name().ok_or_else(|| {
        WorkflowError::config(format!(
            "{} cannot be used as an extraction directory",
            dest.display()
        ))
    })?;
    Ok(dest.with_file_name(format!(".{}.extracting", name.to_string_lossy())))
}

fn unpack_entries(bytes: &[u8], dest: &Path) -> Result<Vec<String>, WorkflowError> {
    let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
    let entries = archive
        .entries()
        .map_err(|e| WorkflowError::extraction(format!("unreadable archive: {}", e)))?;

    let mut top_level: Option<String> = None;
    let mut files = Vec::new();

    for entry in entries {
        let mut entry =
            entry.map_err(|e| WorkflowError::extraction(format!("corrupt archive: {}", e)))?;
        let entry_path = entry
            .path()
            .map_err(|e| WorkflowError::extraction(format!("bad entry path: {}", e)))?
            .into_owned();
        let entry_type = entry.header().entry_type();
        if matches!(entry_type, EntryType::XGlobalHeader | EntryType::XHeader) {
            continue;
        }

        let mut components = entry_path
            .components()
            .filter(|c| !matches!(c, Component::CurDir));

        let first = match components.next() {
            Some(Component::Normal(first)) => first.to_string_lossy().into_owned(),
            _ => {
                return Err(WorkflowError::extraction(format!(
                    "unsafe entry path: {}",
                    entry_path.display()
                )));
            }
        };

        match &top_level {
            None => top_level = Some(first),
            Some(existing) if *existing != first => {
                return Err(WorkflowError::extraction(format!(
                    "archive has more than one top-level directory ({} and {})",
                    existing, first
                )));
            }
            Some(_) => {}
        }

        let mut relative = PathBuf::new();
        for component in components {
            match component {
                Component::Normal(part) => relative.push(part),
                _ => {
                    return Err(WorkflowError::extraction(format!(
                        "unsafe entry path: {}",
                        entry_path.display()
                    )));
                }
            }
        }
        if relative.as_os_str().is_empty() {
            if entry_type.is_dir() {
                continue;
            }
            return Err(WorkflowError::extraction(format!(
                "{} is not inside a top-level directory",
                entry_path.display()
            )));
        }

        let target = dest.join(&relative);
        match entry_type {
            EntryType::Directory => {
                std::fs::create_dir_all(&target).map_err(|e| WorkflowError::io(&target, e))?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| WorkflowError::io(parent, e))?;
                }
                entry
                    .unpack(&target)
                    .map_err(|e| WorkflowError::extraction(format!("{}: {}", relative.display(), e)))?;
                files.push(to_slash_path(&relative));
            }
            other => {
                debug!(path = %entry_path.display(), entry_type = ?other, "skipping entry");
            }
        }
    }

    if top_level.is_none() {
        return Err(WorkflowError::extraction("archive is empty"));
    }
    if files.is_empty() {
        return Err(WorkflowError::extraction("archive contains no files"));
    }

    files.sort();
    Ok(files)
}

/// Compress a directory into `<output>` as a `.tar.gz` whose single top-level
/// directory is the source directory's name.
pub fn compress_directory(source_dir: &Path, output: &Path) -> Result<u64, WorkflowError> {
    let arcname = source_dir
        .canonicalize()
        .map_err(|e| WorkflowError::io(source_dir, e))?
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| {
            WorkflowError::config(format!("{} has no directory name", source_dir.display()))
        })?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| WorkflowError::io(parent, e))?;
    }

    let file = File::create(output).map_err(|e| WorkflowError::io(output, e))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder
        .append_dir_all(&arcname, source_dir)
        .map_err(|e| WorkflowError::io(source_dir, e))?;
    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| WorkflowError::io(output, e))?;

    std::fs::metadata(output)
        .map(|meta| meta.len())
        .map_err(|e| WorkflowError::io(output, e))
}

fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// package.json, README and LICENSE at the package root are always packed
fn is_always_included(relative: &str) -> bool {
    if relative.contains('/') {
        return false;
    }
    let upper = relative.to_ascii_uppercase();
    relative == "package.json"
        || upper.starts_with("README")
        || upper.starts_with("LICENSE")
        || upper.starts_with("LICENCE")
}

/// Compiled `files` entries
struct FilePatterns {
    prefixes: Vec<String>,
    globs: Vec<Regex>,
}

impl FilePatterns {
    fn new(entries: &[String]) -> Result<Self, WorkflowError> {
        let mut prefixes = Vec::new();
        let mut globs = Vec::new();

        for entry in entries {
            let cleaned = entry.trim().trim_start_matches("./").trim_end_matches('/');
            if cleaned.is_empty() {
                continue;
            }
            if cleaned.contains(['*', '?']) {
                globs.push(glob_to_regex(cleaned)?);
            } else {
                prefixes.push(cleaned.to_string());
            }
        }

        Ok(Self { prefixes, globs })
    }

    fn matches(&self, relative: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            relative == prefix
                || relative
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        }) || self.globs.iter().any(|glob| glob.is_match(relative))
    }
}

/// `*` matches within a segment, `**` across segments, `?` one character.
/// A glob also matches everything below a matching directory.
fn glob_to_regex(glob: &str) -> Result<Regex, WorkflowError> {
    let mut pattern = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    pattern.push_str("(?:.*/)?");
                } else {
                    pattern.push_str(".*");
                }
            }
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push_str("[^/]"),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push_str("(?:/.*)?$");

    Regex::new(&pattern)
        .map_err(|e| WorkflowError::config(format!("invalid files pattern {:?}: {}", glob, e)))
}
