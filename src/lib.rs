// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-user application suite installer and self-updater.
//!
//! Suitekit reads a declarative __suite manifest__ describing a set of
//! applications on a shared source folder, then reconciles per-user local
//! state toward it: installed app folders, cached icons, and start menu
//! shortcuts. Deployed apps can also self-update through a
//! spawn-wait-refresh-relaunch cycle guarded against infinite relaunch
//! loops.
//!
//! Embedding apps call [`SelfUpdater::check_for_update_and_restart`] once
//! at startup and exit with code 0 when it reports
//! [`RestartOutcome::Restarting`].

pub mod config;
pub mod fsync;
pub mod path;
pub mod probe;
pub mod reconcile;
pub mod shortcut;
pub mod update;

pub use config::{AppEntry, RefreshPolicy, SuiteManifest};
pub use path::Layout;
pub use reconcile::Reconciler;
pub use shortcut::{Shortcut, ShortcutStore, TomlShortcutStore, WindowStyle};
pub use update::{ClosePrompt, ConfirmClosePrompt, RelaunchOutcome, RestartOutcome, SelfUpdater};
