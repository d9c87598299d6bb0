// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Suite manifest layout.
//!
//! Specify the layout of the manifest file that Suitekit uses to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.
//!
//! # General Layout
//!
//! A suite manifest is composed of two basic parts: top-level source and
//! destination settings, and an app listing. The source settings point at
//! the shared folders that binaries and icons are deployed from. The app
//! listing declares every application that belongs to the suite, one
//! `[[app]]` table per application.
//!
//! The manifest is the __desired state__ of a deployment: reconciliation
//! converges per-user local state toward whatever this file declares. It is
//! loaded once per run and never mutated.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Suite manifest layout.
///
/// Declares the full set of applications managed by Suitekit, along with the
/// shared source folders they deploy from and the per-user destination
/// folders they deploy to.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SuiteManifest {
    /// Shared folder containing one subfolder of binaries per app.
    pub binary_source: PathBuf,

    /// Shared folder containing icon files referenced by app entries.
    pub icon_source: PathBuf,

    /// Per-user data subfolder that installed apps and icons live under.
    pub local_data_folder: String,

    /// Name of the per-user start menu folder holding suite shortcuts.
    pub start_menu_folder: String,

    /// Timestamp comparison policy for refresh operations.
    #[serde(default)]
    pub refresh: RefreshPolicy,

    /// Path of the updater binary, relative to `binary_source`.
    ///
    /// Defaults to `Installer/<platform binary name>` when unset.
    pub installer: Option<PathBuf>,

    /// Application listing.
    #[serde(rename = "app")]
    pub apps: Vec<AppEntry>,
}

impl SuiteManifest {
    /// Absolute path of the updater binary on the binary source share.
    pub fn installer_path(&self) -> PathBuf {
        match &self.installer {
            Some(rel) => self.binary_source.join(rel),
            None => self
                .binary_source
                .join("Installer")
                .join(default_installer_name()),
        }
    }
}

#[cfg(windows)]
fn default_installer_name() -> &'static str {
    "suitekit.exe"
}

#[cfg(not(windows))]
fn default_installer_name() -> &'static str {
    "suitekit"
}

impl FromStr for SuiteManifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut manifest: SuiteManifest =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on both source folder fields.
        manifest.binary_source = expand_path(&manifest.binary_source)?;
        manifest.icon_source = expand_path(&manifest.icon_source)?;

        // INVARIANT: App names key shortcut files, so they must be unique.
        for (index, app) in manifest.apps.iter().enumerate() {
            if manifest.apps[..index].iter().any(|other| other.name == app.name) {
                return Err(ConfigError::DuplicateName(app.name.clone()));
            }
        }

        // INVARIANT: Folders key install directories, so they must be unique
        // among copy-local apps.
        let copy_local: Vec<_> = manifest.apps.iter().filter(|app| app.copy_local).collect();
        for (index, app) in copy_local.iter().enumerate() {
            if copy_local[..index].iter().any(|other| other.folder == app.folder) {
                return Err(ConfigError::DuplicateFolder(app.folder.clone()));
            }
        }

        Ok(manifest)
    }
}

impl Display for SuiteManifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let expanded = shellexpand::full(path.to_string_lossy().as_ref())
        .map_err(ConfigError::ShellExpansion)?
        .into_owned();

    Ok(PathBuf::from(expanded))
}

/// A single application entry of the suite manifest.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct AppEntry {
    /// Display name, unique across the suite. Keys the shortcut file.
    pub name: String,

    /// Subfolder of the binary source holding this app. Keys the install
    /// folder for copy-local apps.
    pub folder: String,

    /// Executable file name inside the app folder.
    pub exe: String,

    /// Arguments passed through to the shortcut record.
    pub arguments: Option<String>,

    /// Whether the app is copied into per-user storage, or run directly
    /// from the binary source share.
    pub copy_local: bool,

    /// Icon spec of the form `"file"` or `"file,index"`.
    pub icon_file: Option<String>,

    /// Icon index within the icon file.
    pub icon_index: Option<i32>,
}

impl AppEntry {
    /// File name of the icon this entry expects in the icon cache.
    ///
    /// Extracted from the icon spec as the final path component of the
    /// substring before the first comma. Returns [`None`] when the entry has
    /// no icon spec, or when the spec carries no usable file name.
    pub fn icon_name(&self) -> Option<String> {
        let spec = self.icon_file.as_deref()?;
        let head = spec.split(',').next().unwrap_or_default();
        let name = Path::new(head).file_name()?.to_string_lossy().into_owned();

        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

/// Timestamp comparison policy for refresh operations.
///
/// The default policy recopies a deployed artifact whenever its timestamp
/// differs from the source at all, so the destination mirrors the source
/// even after a rollback or clock skew. The monotonic variant only reacts
/// to a strictly newer source.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshPolicy {
    /// Refresh whenever source and destination timestamps differ.
    #[default]
    OnChange,

    /// Refresh only when the source is strictly newer.
    SourceNewer,
}

/// Manifest error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize manifest.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize manifest.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on manifest.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Two app entries share one name.
    #[error("app name {0:?} appears more than once")]
    DuplicateName(String),

    /// Two copy-local app entries share one install folder.
    #[error("install folder {0:?} appears more than once")]
    DuplicateFolder(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("SUITE_SHARE", "/srv/share/apps")])]
    fn deserialize_suite_manifest() -> anyhow::Result<()> {
        let result: SuiteManifest = r#"
            binary_source = "$SUITE_SHARE/bin"
            icon_source = "$SUITE_SHARE/icons"
            local_data_folder = "ExampleCo"
            start_menu_folder = "ExampleCo Apps"

            [[app]]
            name = "Foo"
            folder = "Foo"
            exe = "Foo.exe"
            copy_local = true

            [[app]]
            name = "Bar"
            folder = "Bar"
            exe = "Bar.exe"
            arguments = "--fast"
            copy_local = false
            icon_file = "bar.ico"
            icon_index = 2
        "#
        .parse()?;

        let expect = SuiteManifest {
            binary_source: "/srv/share/apps/bin".into(),
            icon_source: "/srv/share/apps/icons".into(),
            local_data_folder: "ExampleCo".into(),
            start_menu_folder: "ExampleCo Apps".into(),
            refresh: RefreshPolicy::OnChange,
            installer: None,
            apps: vec![
                AppEntry {
                    name: "Foo".into(),
                    folder: "Foo".into(),
                    exe: "Foo.exe".into(),
                    arguments: None,
                    copy_local: true,
                    icon_file: None,
                    icon_index: None,
                },
                AppEntry {
                    name: "Bar".into(),
                    folder: "Bar".into(),
                    exe: "Bar.exe".into(),
                    arguments: Some("--fast".into()),
                    copy_local: false,
                    icon_file: Some("bar.ico".into()),
                    icon_index: Some(2),
                },
            ],
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn serialize_suite_manifest() {
        let result = SuiteManifest {
            binary_source: "/srv/share/bin".into(),
            icon_source: "/srv/share/icons".into(),
            local_data_folder: "ExampleCo".into(),
            start_menu_folder: "ExampleCo Apps".into(),
            refresh: RefreshPolicy::SourceNewer,
            installer: None,
            apps: vec![AppEntry {
                name: "Foo".into(),
                folder: "Foo".into(),
                exe: "Foo.exe".into(),
                arguments: None,
                copy_local: true,
                icon_file: None,
                icon_index: None,
            }],
        }
        .to_string();

        let expect = indoc! {r#"
            binary_source = "/srv/share/bin"
            icon_source = "/srv/share/icons"
            local_data_folder = "ExampleCo"
            start_menu_folder = "ExampleCo Apps"
            refresh = "source-newer"

            [[app]]
            name = "Foo"
            folder = "Foo"
            exe = "Foo.exe"
            copy_local = true
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn reject_duplicate_app_name() {
        let result = indoc! {r#"
            binary_source = "/srv/share/bin"
            icon_source = "/srv/share/icons"
            local_data_folder = "ExampleCo"
            start_menu_folder = "ExampleCo Apps"

            [[app]]
            name = "Foo"
            folder = "Foo"
            exe = "Foo.exe"
            copy_local = true

            [[app]]
            name = "Foo"
            folder = "Other"
            exe = "Other.exe"
            copy_local = false
        "#}
        .parse::<SuiteManifest>();

        assert!(matches!(result, Err(ConfigError::DuplicateName(name)) if name == "Foo"));
    }

    #[test]
    fn reject_duplicate_copy_local_folder() {
        let result = indoc! {r#"
            binary_source = "/srv/share/bin"
            icon_source = "/srv/share/icons"
            local_data_folder = "ExampleCo"
            start_menu_folder = "ExampleCo Apps"

            [[app]]
            name = "Foo"
            folder = "Shared"
            exe = "Foo.exe"
            copy_local = true

            [[app]]
            name = "Bar"
            folder = "Shared"
            exe = "Bar.exe"
            copy_local = true
        "#}
        .parse::<SuiteManifest>();

        assert!(matches!(result, Err(ConfigError::DuplicateFolder(folder)) if folder == "Shared"));
    }

    #[test]
    fn duplicate_folder_allowed_when_not_copy_local() {
        let result = indoc! {r#"
            binary_source = "/srv/share/bin"
            icon_source = "/srv/share/icons"
            local_data_folder = "ExampleCo"
            start_menu_folder = "ExampleCo Apps"

            [[app]]
            name = "Foo"
            folder = "Shared"
            exe = "Foo.exe"
            copy_local = true

            [[app]]
            name = "Bar"
            folder = "Shared"
            exe = "Bar.exe"
            copy_local = false
        "#}
        .parse::<SuiteManifest>();

        assert!(result.is_ok());
    }

    #[test]
    fn icon_name_extraction() {
        let mut app = AppEntry {
            icon_file: Some("icons/bar.ico,3".into()),
            ..Default::default()
        };
        assert_eq!(app.icon_name(), Some("bar.ico".into()));

        app.icon_file = Some("bar.ico".into());
        assert_eq!(app.icon_name(), Some("bar.ico".into()));

        app.icon_file = Some(",0".into());
        assert_eq!(app.icon_name(), None);

        app.icon_file = None;
        assert_eq!(app.icon_name(), None);
    }
}
