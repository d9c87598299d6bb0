// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Folder synchronization primitives.
//!
//! Utilities to mirror a source folder into a destination folder based on
//! modification timestamp comparison.
//!
//! # One-Way Merge
//!
//! [`copy_tree`] is a one-way merge, not a full sync. Files present in the
//! destination but absent from the source are left alone. Callers that need
//! deletion must apply a separate purge pass, which is exactly what the
//! reconciliation layer does for each of its managed sets.
//!
//! # Timestamp Mirroring
//!
//! Every copy mirrors the source modification timestamp onto the
//! destination file. The timestamp therefore acts as a content identity
//! proxy: equal timestamps mean the destination already holds the source
//! revision, and any difference means it does not. The strictness of that
//! comparison is selected through [`RefreshPolicy`].

use crate::config::RefreshPolicy;

use std::{
    fs::{copy, create_dir_all, read_dir, OpenOptions},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Mirror `source` into `dest`, creating `dest` if absent.
///
/// Each file is copied when missing from the destination, or when the
/// timestamp comparison selected by `policy` calls for a refresh.
/// Subdirectories are recursed into. Destination files absent from the
/// source are never deleted.
///
/// # Errors
///
/// - Return [`Error::CreateFolder`] if the destination cannot be created.
/// - Return [`Error::ScanFolder`] if the source cannot be enumerated.
/// - Return [`Error::CopyFile`] if a file copy fails.
pub fn copy_tree(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    policy: RefreshPolicy,
) -> Result<()> {
    let (source, dest) = (source.as_ref(), dest.as_ref());
    if !dest.exists() {
        create_dir_all(dest).map_err(|err| Error::CreateFolder {
            source: err,
            folder: dest.to_path_buf(),
        })?;
    }

    let entries = read_dir(source).map_err(|err| Error::ScanFolder {
        source: err,
        folder: source.to_path_buf(),
    })?;

    for entry in entries {
        let entry = entry.map_err(|err| Error::ScanFolder {
            source: err,
            folder: source.to_path_buf(),
        })?;
        let source_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if source_path.is_dir() {
            copy_tree(&source_path, &dest_path, policy)?;
        } else if !dest_path.exists() || needs_refresh(policy, &source_path, &dest_path)? {
            debug!("copy {:?} -> {:?}", source_path.display(), dest_path.display());
            copy_file(&source_path, &dest_path)?;
        }
    }

    Ok(())
}

/// Copy one file, mirroring the source modification timestamp.
///
/// # Errors
///
/// - Return [`Error::CopyFile`] if the copy or the timestamp mirroring
///   fails.
pub fn copy_file(source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<()> {
    let (source, dest) = (source.as_ref(), dest.as_ref());
    let copy_error = |err| Error::CopyFile {
        source: err,
        from: source.to_path_buf(),
        to: dest.to_path_buf(),
    };

    copy(source, dest).map_err(copy_error)?;

    // INVARIANT: Destination timestamp always mirrors the source, so the
    // comparison in needs_refresh stays a faithful identity check.
    let modified = source
        .metadata()
        .and_then(|metadata| metadata.modified())
        .map_err(copy_error)?;
    OpenOptions::new()
        .write(true)
        .open(dest)
        .and_then(|file| file.set_modified(modified))
        .map_err(copy_error)?;

    Ok(())
}

/// Check whether a destination file is due for a refresh from its source.
///
/// # Errors
///
/// - Return [`Error::ReadTimestamp`] if either modification timestamp
///   cannot be read.
pub fn needs_refresh(
    policy: RefreshPolicy,
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
) -> Result<bool> {
    let source_ts = modified_at(source.as_ref())?;
    let dest_ts = modified_at(dest.as_ref())?;

    let due = match policy {
        RefreshPolicy::OnChange => source_ts != dest_ts,
        RefreshPolicy::SourceNewer => source_ts > dest_ts,
    };

    Ok(due)
}

fn modified_at(path: &Path) -> Result<std::time::SystemTime> {
    path.metadata()
        .and_then(|metadata| metadata.modified())
        .map_err(|err| Error::ReadTimestamp {
            source: err,
            path: path.to_path_buf(),
        })
}

/// Folder synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Destination folder cannot be created when missing.
    #[error("failed to create folder at {:?}", folder.display())]
    CreateFolder {
        #[source]
        source: std::io::Error,
        folder: PathBuf,
    },

    /// Source folder cannot be enumerated.
    #[error("failed to scan folder at {:?}", folder.display())]
    ScanFolder {
        #[source]
        source: std::io::Error,
        folder: PathBuf,
    },

    /// File cannot be copied to its destination.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    CopyFile {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Modification timestamp cannot be read.
    #[error("failed to read timestamp of {:?}", path.display())]
    ReadTimestamp {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
