pub mod archive;
pub mod client;
pub mod npmrc;
pub mod packument;

pub use archive::{
    PackedArchive, collect_files, compress_directory, compute_integrity, extract_archive,
    pack_directory, verify_integrity,
};
pub use client::{NpmRegistryClient, ResolvedVersion};
pub use npmrc::{NPMRC_FILE, NpmrcWrite, NpmrcWriter};
pub use packument::{Dist, Packument, VersionDocument};
