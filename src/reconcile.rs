// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Desired state reconciliation.
//!
//! The reconciler converges per-user local state toward the suite manifest
//! for three independently managed sets: installed app folders, cached
//! icons, and start menu shortcuts.
//!
//! # Purge Then Create
//!
//! Every set follows the same two-phase pattern. First compute the expected
//! key set from the manifest, enumerate the actual key set from the file
//! system or shortcut store, and delete every actual entry whose key is not
//! expected (or whose content no longer matches expectations). Then create
//! every expected entry missing from the actual set.
//!
//! # Bulk Install Versus Refresh
//!
//! The bulk install pass never refreshes an installed app folder that
//! already exists. It is idempotent-create-only. Refreshing a specific app
//! is the separate, explicit [`update_single`](Reconciler::update_single)
//! operation, which the self-update cycle drives.

use crate::{
    config::{AppEntry, SuiteManifest},
    fsync::{self, copy_file, copy_tree, needs_refresh},
    path::{leaf_folder, Layout},
    shortcut::{self, Shortcut, ShortcutStore, TomlShortcutStore},
};

use std::{
    collections::{HashMap, HashSet},
    fs::{create_dir_all, read_dir, remove_dir_all, remove_file},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Reconciler of per-user state against a suite manifest.
#[derive(Debug)]
pub struct Reconciler<S = TomlShortcutStore>
where
    S: ShortcutStore,
{
    manifest: SuiteManifest,
    layout: Layout,
    store: S,
}

impl<S> Reconciler<S>
where
    S: ShortcutStore,
{
    /// Construct new reconciler.
    pub fn new(manifest: SuiteManifest, layout: Layout, store: S) -> Self {
        Self {
            manifest,
            layout,
            store,
        }
    }

    /// Suite manifest being reconciled against.
    pub fn manifest(&self) -> &SuiteManifest {
        &self.manifest
    }

    /// Per-user destination layout being reconciled.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Converge all three managed sets toward the manifest.
    ///
    /// Icons and binaries are reconciled before shortcuts, so every
    /// shortcut is validated and created against artifacts that already
    /// exist.
    ///
    /// # Errors
    ///
    /// - Return [`Error`] if any reconciliation pass fails.
    #[instrument(skip(self), level = "debug")]
    pub fn install(&self) -> Result<()> {
        info!("install suite from {:?}", self.manifest.binary_source.display());
        self.update_icons()?;
        self.install_all_apps()?;
        self.update_shortcuts()?;

        Ok(())
    }

    /// Delete all three destination roots wholesale.
    ///
    /// Missing roots are not an error.
    ///
    /// # Errors
    ///
    /// - Return [`Error::RemoveRoot`] if an existing root cannot be
    ///   deleted.
    #[instrument(skip(self), level = "debug")]
    pub fn remove(&self) -> Result<()> {
        for root in [
            self.layout.install_root(),
            self.layout.icon_root(),
            self.layout.start_menu_root(),
        ] {
            if root.exists() {
                info!("remove {:?}", root.display());
                remove_dir_all(root).map_err(|err| Error::RemoveRoot {
                    source: err,
                    folder: root.to_path_buf(),
                })?;
            }
        }

        Ok(())
    }

    /// Converge the icon cache toward the manifest.
    #[instrument(skip(self), level = "debug")]
    pub fn update_icons(&self) -> Result<()> {
        self.purge_stale_icons()?;
        self.create_missing_icons()?;

        Ok(())
    }

    fn expected_icons(&self) -> HashSet<String> {
        self.manifest
            .apps
            .iter()
            .filter(|app| !app.copy_local)
            .filter_map(AppEntry::icon_name)
            .collect()
    }

    fn purge_stale_icons(&self) -> Result<()> {
        let icon_root = self.layout.icon_root();
        if !icon_root.exists() {
            return Ok(());
        }

        let expected = self.expected_icons();
        for entry in scan_folder(icon_root)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !expected.contains(&name) {
                debug!("purge stale icon {:?}", path.display());
                purge(&path)?;
            }
        }

        Ok(())
    }

    fn create_missing_icons(&self) -> Result<()> {
        let icon_root = self.layout.icon_root();
        create_dir_all(icon_root).map_err(|err| Error::CreateRoot {
            source: err,
            folder: icon_root.to_path_buf(),
        })?;

        for name in self.expected_icons() {
            let source = self.manifest.icon_source.join(&name);
            let dest = self.layout.icon_path(&name);
            if !dest.exists() || needs_refresh(self.manifest.refresh, &source, &dest)? {
                debug!("cache icon {:?}", name);
                copy_file(&source, &dest)?;
            }
        }

        Ok(())
    }

    /// Converge installed app folders toward the manifest.
    #[instrument(skip(self), level = "debug")]
    pub fn install_all_apps(&self) -> Result<()> {
        let expected: HashSet<&str> = self
            .manifest
            .apps
            .iter()
            .filter(|app| app.copy_local)
            .map(|app| app.folder.as_str())
            .collect();

        let install_root = self.layout.install_root();
        if install_root.exists() {
            for entry in scan_folder(install_root)? {
                let path = entry?.path();
                if !path.is_dir() {
                    continue;
                }

                let folder = leaf_folder(&path)?;
                if !expected.contains(folder.as_str()) {
                    info!("purge stale app folder {:?}", path.display());
                    remove_dir_all(&path).map_err(|err| Error::Purge {
                        source: err,
                        path: path.clone(),
                    })?;
                }
            }
        }

        for folder in expected {
            let dest = self.layout.app_dir(folder);
            if !dest.exists() {
                info!("install app folder {folder:?}");
                copy_tree(
                    self.manifest.binary_source.join(folder),
                    dest,
                    self.manifest.refresh,
                )?;
            }
        }

        Ok(())
    }

    /// Converge start menu shortcuts toward the manifest.
    #[instrument(skip(self), level = "debug")]
    pub fn update_shortcuts(&self) -> Result<()> {
        self.purge_stale_shortcuts()?;
        self.create_missing_shortcuts()?;

        Ok(())
    }

    fn purge_stale_shortcuts(&self) -> Result<()> {
        let start_menu = self.layout.start_menu_root();
        if !start_menu.exists() {
            return Ok(());
        }

        let expected: HashMap<&str, &AppEntry> = self
            .manifest
            .apps
            .iter()
            .map(|app| (app.name.as_str(), app))
            .collect();

        for entry in scan_folder(start_menu)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let keep = expected
                .get(name.as_str())
                .is_some_and(|app| self.shortcut_as_expected(&path, app));
            if !keep {
                debug!("purge stale shortcut {:?}", path.display());
                purge(&path)?;
            }
        }

        Ok(())
    }

    fn create_missing_shortcuts(&self) -> Result<()> {
        let start_menu = self.layout.start_menu_root();
        create_dir_all(start_menu).map_err(|err| Error::CreateRoot {
            source: err,
            folder: start_menu.to_path_buf(),
        })?;

        for app in &self.manifest.apps {
            let path = self.layout.shortcut_path(&app.name);
            if !path.exists() {
                debug!("create shortcut for {:?}", app.name);
                self.store.write(&path, &self.build_shortcut(app))?;
            }
        }

        Ok(())
    }

    /// Compare an existing shortcut record against the manifest-derived one.
    ///
    /// An unreadable record counts as a mismatch, so the purge pass deletes
    /// it and the create pass rebuilds it.
    fn shortcut_as_expected(&self, path: &Path, app: &AppEntry) -> bool {
        let expected = self.build_shortcut(app);
        match self.store.read(path) {
            Ok(actual) => {
                actual.target_path == expected.target_path
                    && actual.arguments == expected.arguments
                    && actual.icon_location == expected.icon_location
                    && actual.description == expected.description
            }
            Err(error) => {
                warn!("unreadable shortcut {:?}: {error}", path.display());
                false
            }
        }
    }

    /// Build the shortcut record an app entry calls for.
    pub fn build_shortcut(&self, app: &AppEntry) -> Shortcut {
        let target_path = if app.copy_local {
            self.layout.app_dir(&app.folder).join(&app.exe)
        } else {
            self.manifest.binary_source.join(&app.folder).join(&app.exe)
        };

        let icon_file = app
            .icon_file
            .as_deref()
            .map(|file| self.layout.icon_path(file).to_string_lossy().into_owned())
            .unwrap_or_default();
        let icon_index = app.icon_index.unwrap_or(0);

        Shortcut {
            target_path,
            arguments: app.arguments.clone().unwrap_or_default(),
            icon_location: format!("{icon_file},{icon_index}"),
            description: app.name.clone(),
            ..Default::default()
        }
    }

    /// Check whether the installed copy of an app differs from its source.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Fsync`] if either timestamp cannot be read.
    pub fn update_available(&self, folder: &str, exe: &str) -> Result<bool> {
        let source = self.manifest.binary_source.join(folder).join(exe);
        let dest = self.layout.app_dir(folder).join(exe);

        Ok(needs_refresh(self.manifest.refresh, source, dest)?)
    }

    /// Refresh one installed app folder from its source.
    ///
    /// Runs unconditionally, per file timestamp merge included, unlike the
    /// bulk install pass which skips existing folders.
    #[instrument(skip(self), level = "debug")]
    pub fn update_single(&self, folder: &str) -> Result<()> {
        info!("refresh app folder {folder:?}");
        copy_tree(
            self.manifest.binary_source.join(folder),
            self.layout.app_dir(folder),
            self.manifest.refresh,
        )?;

        Ok(())
    }
}

fn scan_folder(folder: &Path) -> Result<impl Iterator<Item = Result<std::fs::DirEntry>> + '_> {
    let entries = read_dir(folder).map_err(|err| Error::ScanFolder {
        source: err,
        folder: folder.to_path_buf(),
    })?;

    Ok(entries.map(move |entry| {
        entry.map_err(|err| Error::ScanFolder {
            source: err,
            folder: folder.to_path_buf(),
        })
    }))
}

fn purge(path: &Path) -> Result<()> {
    remove_file(path).map_err(|err| Error::Purge {
        source: err,
        path: path.to_path_buf(),
    })
}

/// Reconciliation error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Folder synchronization fails.
    #[error(transparent)]
    Fsync(#[from] fsync::Error),

    /// Path resolution fails.
    #[error(transparent)]
    Path(#[from] crate::path::Error),

    /// Shortcut record manipulation fails.
    #[error(transparent)]
    Shortcut(#[from] shortcut::Error),

    /// Destination root cannot be created when missing.
    #[error("failed to create folder at {:?}", folder.display())]
    CreateRoot {
        #[source]
        source: std::io::Error,
        folder: PathBuf,
    },

    /// Destination root cannot be deleted.
    #[error("failed to remove folder at {:?}", folder.display())]
    RemoveRoot {
        #[source]
        source: std::io::Error,
        folder: PathBuf,
    },

    /// Managed folder cannot be enumerated.
    #[error("failed to scan folder at {:?}", folder.display())]
    ScanFolder {
        #[source]
        source: std::io::Error,
        folder: PathBuf,
    },

    /// Stale entry cannot be purged.
    #[error("failed to purge {:?}", path.display())]
    Purge {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
