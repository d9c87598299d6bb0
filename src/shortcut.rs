// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Launcher shortcut records.
//!
//! A shortcut record is owned by the platform shell. Suitekit only ever
//! creates, reads back, and deletes records by path, so the capability is
//! kept behind the narrow [`ShortcutStore`] trait with exactly those two
//! operations. The reconciliation core never depends on the concrete
//! mechanism.
//!
//! [`TomlShortcutStore`] is the portable backend: it persists the record as
//! a TOML document inside the `.lnk` file itself. A platform backend (for
//! example one speaking to the Windows shell) implements the same trait and
//! drops in without touching the core.

use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};

/// A launcher shortcut record.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Shortcut {
    /// Path of the executable the shortcut launches.
    pub target_path: PathBuf,

    /// Arguments passed to the target.
    pub arguments: String,

    /// Icon spec of the form `"path,index"`.
    pub icon_location: String,

    /// Human readable description.
    pub description: String,

    /// Keyboard shortcut, empty when unset.
    pub hotkey: String,

    /// Working directory of the launched target, empty when unset.
    pub working_directory: String,

    /// Initial window state of the launched target.
    pub window_style: WindowStyle,
}

impl Default for Shortcut {
    fn default() -> Self {
        Self {
            target_path: PathBuf::new(),
            arguments: String::new(),
            icon_location: ",0".into(),
            description: String::new(),
            hotkey: String::new(),
            working_directory: String::new(),
            window_style: WindowStyle::Normal,
        }
    }
}

/// Initial window state of a launched shortcut target.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowStyle {
    #[default]
    Normal,

    Maximized,

    Minimized,
}

/// Layer of indirection for shortcut record access.
pub trait ShortcutStore {
    /// Write a shortcut record to target path.
    fn write(&self, path: &Path, shortcut: &Shortcut) -> Result<()>;

    /// Read the shortcut record back from target path.
    fn read(&self, path: &Path) -> Result<Shortcut>;
}

/// Shortcut record access through TOML documents.
///
/// Portable stand-in for a platform shell backend. The record is stored as
/// pretty TOML inside the `.lnk` file.
#[derive(Debug, Default, Clone)]
pub struct TomlShortcutStore;

impl ShortcutStore for TomlShortcutStore {
    fn write(&self, path: &Path, shortcut: &Shortcut) -> Result<()> {
        // INVARIANT: Only ever write shortcut records to ".lnk" paths with a
        // usable target.
        if path.extension().is_none_or(|ext| ext != "lnk") {
            return Err(Error::NotShortcutPath(path.to_path_buf()));
        }
        if shortcut.target_path.as_os_str().is_empty() {
            return Err(Error::MissingTarget(path.to_path_buf()));
        }

        let contents = toml::ser::to_string_pretty(shortcut).map_err(Error::Serialize)?;
        write(path, contents).map_err(|err| Error::WriteRecord {
            source: err,
            path: path.to_path_buf(),
        })?;

        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Shortcut> {
        let contents = read_to_string(path).map_err(|err| Error::ReadRecord {
            source: err,
            path: path.to_path_buf(),
        })?;

        Ok(toml::de::from_str(&contents).map_err(Error::Deserialize)?)
    }
}

/// Shortcut record error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Shortcut path lacks the ".lnk" extension.
    #[error("shortcut path must end with .lnk; is {:?}", .0.display())]
    NotShortcutPath(PathBuf),

    /// Shortcut record carries no target path.
    #[error("shortcut record for {:?} has no target path", .0.display())]
    MissingTarget(PathBuf),

    /// Shortcut record cannot be written out.
    #[error("failed to write shortcut record at {:?}", path.display())]
    WriteRecord {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Shortcut record cannot be read back.
    #[error("failed to read shortcut record at {:?}", path.display())]
    ReadRecord {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to serialize shortcut record.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to deserialize shortcut record.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[sealed_test]
    fn write_then_read_round_trip() -> anyhow::Result<()> {
        let store = TomlShortcutStore;
        let shortcut = Shortcut {
            target_path: "/srv/share/bin/Foo/Foo.exe".into(),
            arguments: "--fast".into(),
            icon_location: "/home/user/.config/ExampleCo/icons/foo.ico,1".into(),
            description: "Foo".into(),
            ..Default::default()
        };

        store.write(Path::new("Foo.lnk"), &shortcut)?;
        let result = store.read(Path::new("Foo.lnk"))?;

        assert_eq!(result, shortcut);

        Ok(())
    }

    #[test_case("Foo.txt"; "wrong extension")]
    #[test_case("Foo"; "no extension")]
    #[test]
    fn reject_non_shortcut_path(path: &str) {
        let store = TomlShortcutStore;
        let shortcut = Shortcut {
            target_path: "/srv/share/bin/Foo/Foo.exe".into(),
            ..Default::default()
        };

        let result = store.write(Path::new(path), &shortcut);
        assert!(matches!(result, Err(Error::NotShortcutPath(_))));
    }

    #[test]
    fn reject_record_without_target() {
        let store = TomlShortcutStore;

        let result = store.write(Path::new("Foo.lnk"), &Shortcut::default());
        assert!(matches!(result, Err(Error::MissingTarget(_))));
    }
}
