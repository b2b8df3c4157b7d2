//! Release archive unpacking.
//!
//! libwebp ships `.tar.gz` archives for Linux and macOS and `.zip` archives
//! for Windows. Both nest the tools under `libwebp-<version>-<os>-<arch>/bin/`,
//! so extraction drops a fixed number of leading path components ("strip
//! depth"). Entries that have nothing left after stripping are skipped, and
//! entries that would land outside the destination are rejected.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("unsafe path in archive: {0}")]
    UnsafePath(String),
    #[error("unknown archive format: {0}")]
    UnknownFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    /// Guess the format from an archive file name.
    pub fn from_name(name: &str) -> Result<Self, ArchiveError> {
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(ArchiveFormat::TarGz)
        } else if name.ends_with(".zip") {
            Ok(ArchiveFormat::Zip)
        } else {
            Err(ArchiveError::UnknownFormat(name.to_string()))
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Zip => "zip",
        }
    }
}

/// Unpack `bytes` into `dest`, dropping `strip` leading path components.
///
/// Returns the number of files written.
pub fn extract(
    bytes: &[u8],
    format: ArchiveFormat,
    dest: &Path,
    strip: usize,
) -> Result<usize, ArchiveError> {
    fs::create_dir_all(dest)?;
    let count = match format {
        ArchiveFormat::TarGz => extract_tar_gz(bytes, dest, strip)?,
        ArchiveFormat::Zip => extract_zip(bytes, dest, strip)?,
    };
    debug!(files = count, dest = %dest.display(), "archive extracted");
    Ok(count)
}

fn extract_tar_gz(bytes: &[u8], dest: &Path, strip: usize) -> Result<usize, ArchiveError> {
    let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
    let mut count = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let Some(relative) = strip_components(&path, strip)? else {
            continue;
        };
        let target = dest.join(&relative);

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        // Symlinks and hard links are not part of libwebp releases
        if !kind.is_file() {
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
        count += 1;
    }

    Ok(count)
}

fn extract_zip(bytes: &[u8], dest: &Path, strip: usize) -> Result<usize, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut count = 0;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let Some(path) = file.enclosed_name() else {
            return Err(ArchiveError::UnsafePath(file.name().to_string()));
        };
        let Some(relative) = strip_components(&path, strip)? else {
            continue;
        };
        let target = dest.join(&relative);

        if file.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&target)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o777))?;
        }

        count += 1;
    }

    Ok(count)
}

/// Drop the first `strip` normal components of `path`.
///
/// `Ok(None)` when nothing remains; an error for absolute paths or `..`.
fn strip_components(path: &Path, strip: usize) -> Result<Option<PathBuf>, ArchiveError> {
    let mut normal = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normal.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::UnsafePath(path.display().to_string()));
            }
        }
    }

    if normal.len() <= strip {
        return Ok(None);
    }
    Ok(Some(normal[strip..].iter().collect()))
}
