// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for the per-user destination folders
//! that Suitekit manages, and for external files that need to be interacted
//! with in some way.

use crate::config::SuiteManifest;

use std::path::{Path, PathBuf};

/// Per-user destination layout.
///
/// Holds the three destination roots that reconciliation manages: installed
/// app folders, cached icons, and start menu shortcuts. The layout is built
/// once at process start and passed by reference into the reconciliation
/// and self-update components. No ambient singleton state.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Layout {
    install_root: PathBuf,
    icon_root: PathBuf,
    start_menu_root: PathBuf,
}

impl Layout {
    /// Construct layout from explicit destination roots.
    pub fn new(
        install_root: impl Into<PathBuf>,
        icon_root: impl Into<PathBuf>,
        start_menu_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            install_root: install_root.into(),
            icon_root: icon_root.into(),
            start_menu_root: start_menu_root.into(),
        }
    }

    /// Determine default per-user layout for given manifest.
    ///
    /// Installed apps land under the local (non-roaming) data directory,
    /// while icons and shortcuts land under the roaming configuration
    /// directory, matching where the platform start menu lives. Does not
    /// check if any of the paths returned actually exist.
    ///
    /// # Errors
    ///
    /// - Return [`NoWayHome`](Error::NoWayHome) if per-user base directories
    ///   cannot be determined.
    pub fn try_default(manifest: &SuiteManifest) -> Result<Self> {
        let local = dirs::data_local_dir().ok_or(Error::NoWayHome)?;
        let roaming = dirs::config_dir().ok_or(Error::NoWayHome)?;

        Ok(Self {
            install_root: local.join(&manifest.local_data_folder).join("apps"),
            icon_root: roaming.join(&manifest.local_data_folder).join("icons"),
            start_menu_root: start_menu_base()?.join(&manifest.start_menu_folder),
        })
    }

    /// Root folder of installed app folders.
    pub fn install_root(&self) -> &Path {
        self.install_root.as_path()
    }

    /// Root folder of the icon cache.
    pub fn icon_root(&self) -> &Path {
        self.icon_root.as_path()
    }

    /// Root folder of suite shortcuts in the start menu.
    pub fn start_menu_root(&self) -> &Path {
        self.start_menu_root.as_path()
    }

    /// Install folder of a single app.
    pub fn app_dir(&self, folder: &str) -> PathBuf {
        self.install_root.join(folder)
    }

    /// Icon cache path of a single icon file.
    pub fn icon_path(&self, file: &str) -> PathBuf {
        self.icon_root.join(file)
    }

    /// Shortcut file path of a single app.
    pub fn shortcut_path(&self, name: &str) -> PathBuf {
        self.start_menu_root.join(format!("{name}.lnk"))
    }

    /// Loop blocker marker path of a single app folder.
    ///
    /// The marker exists only during an in-progress self-update cycle for
    /// that folder.
    pub fn loop_blocker(&self, folder: &str) -> PathBuf {
        self.install_root.join(folder).join("loopblocker.txt")
    }
}

#[cfg(windows)]
fn start_menu_base() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(Error::NoWayHome)?
        .join("Microsoft")
        .join("Windows")
        .join("Start Menu")
        .join("Programs"))
}

#[cfg(not(windows))]
fn start_menu_base() -> Result<PathBuf> {
    Ok(dirs::data_dir().ok_or(Error::NoWayHome)?.join("applications"))
}

/// Determine leaf folder name of an existing directory path.
///
/// A trailing separator is tolerated: the parent's final component is
/// returned instead.
///
/// # Errors
///
/// - Return [`NotADirectory`](Error::NotADirectory) if path is a file.
/// - Return [`Missing`](Error::Missing) if path does not exist.
pub fn leaf_folder(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    if path.is_file() {
        return Err(Error::NotADirectory(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(Error::Missing(path.to_path_buf()));
    }

    path.file_name()
        .or_else(|| path.parent().and_then(Path::file_name))
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Missing(path.to_path_buf()))
}

/// Path resolution error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// No way to determine user's home directory.
    #[error("cannot determine absolute path to user's home directory")]
    NoWayHome,

    /// Leaf folder requested for a file path.
    #[error("input path is a file: {:?}", .0.display())]
    NotADirectory(PathBuf),

    /// Leaf folder requested for a path that does not exist.
    #[error("input path doesn't exist: {:?}", .0.display())]
    Missing(PathBuf),
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
