// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Self-update orchestration.
//!
//! A deployed app cannot replace its own running executable, so updating
//! one is a two-process handshake. The running copy notices that its source
//! revision changed, spawns the share-side updater with its own pid, and
//! exits. The updater waits for that pid to go away, refreshes the app
//! folder, and relaunches the updated executable as a detached process.
//!
//! # Loop Blocker
//!
//! A zero-byte marker file at `<install root>/<folder>/loopblocker.txt`
//! exists only while an update cycle for that folder is in flight. Finding
//! one at the start of a new cycle means a prior update never completed,
//! and automatically retrying would risk an infinite relaunch loop against
//! a permanently broken binary. That one condition is escalated to a hard
//! error instead of being retried. A stale blocker with no update pending
//! is cleaned up silently by the relaunched app's own startup pass.

use crate::{
    path::leaf_folder,
    reconcile::{self, Reconciler},
    shortcut::{ShortcutStore, TomlShortcutStore},
};

use inquire::Confirm;
use std::{
    env::current_exe,
    fs::{remove_file, write},
    path::{Path, PathBuf},
    process::Command,
    thread::sleep,
    time::Duration,
};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, info, instrument, warn};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Outcome of a startup update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Current executable does not live under the install root, so it runs
    /// from a source or development location. No action.
    NotDeployed,

    /// Installed copy matches its source. Keep running.
    UpToDate,

    /// Updater has been spawned. Caller must exit immediately with code 0.
    Restarting,
}

/// Outcome of an updater-side refresh-and-relaunch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaunchOutcome {
    /// App folder refreshed and updated executable launched.
    Launched,

    /// Operator canceled while the target was still running. Loop blocker
    /// cleared, nothing relaunched.
    Canceled,
}

/// Close-or-cancel decision taken while the target app is still running.
///
/// The updater cannot refresh an app folder out from under a running
/// executable, so someone has to decide between "I closed it, retry" and
/// "give up". The default backend asks the operator interactively.
pub trait ClosePrompt {
    /// Ask whether to retry after the named executable was found running.
    ///
    /// `true` means check again, `false` means cancel the update.
    fn confirm_retry(&self, exe: &str) -> Result<bool>;
}

/// Interactive close-or-cancel prompt backed by [`inquire::Confirm`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfirmClosePrompt;

impl ClosePrompt for ConfirmClosePrompt {
    fn confirm_retry(&self, exe: &str) -> Result<bool> {
        let retry = Confirm::new(&format!(
            "{exe} is still running. Close it, then confirm to retry. Keep going?"
        ))
        .with_default(true)
        .prompt()?;

        Ok(retry)
    }
}

/// Self-update controller driving the spawn-wait-refresh-relaunch cycle.
#[derive(Debug)]
pub struct SelfUpdater<S = TomlShortcutStore, P = ConfirmClosePrompt>
where
    S: ShortcutStore,
    P: ClosePrompt,
{
    reconciler: Reconciler<S>,
    prompt: P,
}

impl<S> SelfUpdater<S>
where
    S: ShortcutStore,
{
    /// Construct new self-update controller with the interactive prompt.
    pub fn new(reconciler: Reconciler<S>) -> Self {
        Self {
            reconciler,
            prompt: ConfirmClosePrompt,
        }
    }
}

impl<S, P> SelfUpdater<S, P>
where
    S: ShortcutStore,
    P: ClosePrompt,
{
    /// Construct new self-update controller with a custom close prompt.
    pub fn with_prompt(reconciler: Reconciler<S>, prompt: P) -> Self {
        Self { reconciler, prompt }
    }

    /// Check whether the current executable is a deployed copy.
    ///
    /// # Errors
    ///
    /// - Return [`Error::CurrentExe`] if the executable path cannot be
    ///   determined.
    pub fn deployed_version_is_running(&self) -> Result<bool> {
        let exe_path = current_exe().map_err(Error::CurrentExe)?;

        Ok(exe_path.starts_with(self.reconciler.layout().install_root()))
    }

    /// Evaluate the startup update check for the current executable.
    ///
    /// Derives the app folder and executable name from the running binary's
    /// path when it lives under the install root, then delegates to
    /// [`check_for_update_and_close`](Self::check_for_update_and_close).
    ///
    /// # Errors
    ///
    /// - Return [`Error::LoopBlocker`] if a prior update cycle never
    ///   completed for this folder.
    #[instrument(skip(self), level = "debug")]
    pub fn check_for_update_and_restart(&self) -> Result<RestartOutcome> {
        let exe_path = current_exe().map_err(Error::CurrentExe)?;
        if !exe_path.starts_with(self.reconciler.layout().install_root()) {
            debug!("running from source location, skip update check");
            return Ok(RestartOutcome::NotDeployed);
        }

        let folder = exe_path
            .parent()
            .map(leaf_folder)
            .transpose()?
            .unwrap_or_default();
        let exe = exe_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.check_for_update_and_close(&folder, &exe)
    }

    /// Check one deployed app for an update, spawning the updater if due.
    ///
    /// When an update is available, a loop blocker marker is written, the
    /// share-side updater is spawned with `update-and-start <folder> <exe>
    /// <pid>`, and [`RestartOutcome::Restarting`] tells the caller to exit
    /// with code 0 right away. When no update is available, any stale loop
    /// blocker is removed.
    ///
    /// # Errors
    ///
    /// - Return [`Error::LoopBlocker`] if the marker already exists while
    ///   an update is due. No file is copied in that case.
    /// - Return [`Error::SpawnUpdater`] if the updater cannot be started.
    #[instrument(skip(self), level = "debug")]
    pub fn check_for_update_and_close(&self, folder: &str, exe: &str) -> Result<RestartOutcome> {
        let blocker = self.reconciler.layout().loop_blocker(folder);
        if !self.reconciler.update_available(folder, exe)? {
            // Stale marker from a completed cycle. Idempotent cleanup.
            if blocker.exists() {
                debug!("clear stale loop blocker {:?}", blocker.display());
                remove_file(&blocker).map_err(|err| Error::ClearBlocker {
                    source: err,
                    path: blocker.clone(),
                })?;
            }

            return Ok(RestartOutcome::UpToDate);
        }

        if blocker.exists() {
            return Err(Error::LoopBlocker(blocker));
        }
        write(&blocker, "").map_err(|err| Error::WriteBlocker {
            source: err,
            path: blocker.clone(),
        })?;

        let installer = self.reconciler.manifest().installer_path();
        info!("spawn updater {:?} for {folder:?}", installer.display());
        Command::new(&installer)
            .args(["update-and-start", folder, exe])
            .arg(std::process::id().to_string())
            .spawn()
            .map_err(|err| Error::SpawnUpdater {
                source: err,
                path: installer,
            })?;

        Ok(RestartOutcome::Restarting)
    }

    /// Updater-side pass: wait, refresh one app folder, relaunch.
    ///
    /// Waits for `wait_pid` to exit when given. If the target executable is
    /// still running under the install folder afterwards, the close prompt
    /// asks whether to retry or cancel. Canceling removes the loop blocker
    /// and aborts without relaunching.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Reconcile`] if the app folder refresh fails.
    /// - Return [`Error::Launch`] if the updated executable cannot be
    ///   started.
    #[instrument(skip(self), level = "debug")]
    pub fn update_and_start(
        &self,
        folder: &str,
        exe: &str,
        wait_pid: Option<u32>,
    ) -> Result<RelaunchOutcome> {
        if let Some(pid) = wait_pid {
            wait_for_exit(pid);
        }

        let target = self.reconciler.layout().app_dir(folder).join(exe);
        while find_running(&target).is_some() {
            warn!("{:?} is still running", target.display());
            if !self.prompt.confirm_retry(exe)? {
                let blocker = self.reconciler.layout().loop_blocker(folder);
                if blocker.exists() {
                    remove_file(&blocker).map_err(|err| Error::ClearBlocker {
                        source: err,
                        path: blocker.clone(),
                    })?;
                }

                info!("update of {folder:?} canceled by operator");
                return Ok(RelaunchOutcome::Canceled);
            }
        }

        self.reconciler.update_single(folder)?;
        self.launch(folder, exe)?;

        Ok(RelaunchOutcome::Launched)
    }

    /// Launch an installed app as a new detached process.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Launch`] if the executable cannot be started.
    pub fn launch(&self, folder: &str, exe: &str) -> Result<()> {
        let app_path = self.reconciler.layout().app_dir(folder).join(exe);
        info!("launch {:?}", app_path.display());
        Command::new(&app_path)
            .spawn()
            .map_err(|err| Error::Launch {
                source: err,
                path: app_path,
            })?;

        Ok(())
    }
}

/// Block until the process with given pid exits.
///
/// A pid with no matching process is treated as an already-exited process,
/// which is a normal outcome here, not an error.
pub fn wait_for_exit(pid: u32) {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();

    loop {
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing(),
        );
        if system.process(pid).is_none() {
            debug!("process {pid} has exited");
            return;
        }

        sleep(EXIT_POLL_INTERVAL);
    }
}

/// Find a running process whose executable resolves to target path.
///
/// Processes whose executable cannot be inspected are skipped as
/// non-matches. An access-denied or already-exited race is benign, not an
/// error.
pub fn find_running(target: &Path) -> Option<Pid> {
    let target = target.canonicalize().unwrap_or_else(|_| target.to_path_buf());
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_exe(UpdateKind::Always),
    );

    system
        .processes()
        .iter()
        .find_map(|(pid, process)| (process.exe()? == target).then_some(*pid))
}

/// Self-update error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Prior update cycle for this folder never completed. Retrying
    /// automatically would risk an infinite relaunch loop.
    #[error("found loop blocker at {:?}; a previous update never completed", .0.display())]
    LoopBlocker(PathBuf),

    /// Reconciliation fails.
    #[error(transparent)]
    Reconcile(#[from] reconcile::Error),

    /// Path resolution fails.
    #[error(transparent)]
    Path(#[from] crate::path::Error),

    /// Operator prompt fails.
    #[error(transparent)]
    Prompt(#[from] inquire::InquireError),

    /// Current executable path cannot be determined.
    #[error("cannot determine path of current executable")]
    CurrentExe(#[source] std::io::Error),

    /// Loop blocker marker cannot be written.
    #[error("failed to write loop blocker at {:?}", path.display())]
    WriteBlocker {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Loop blocker marker cannot be removed.
    #[error("failed to remove loop blocker at {:?}", path.display())]
    ClearBlocker {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Updater process cannot be spawned.
    #[error("failed to spawn updater at {:?}", path.display())]
    SpawnUpdater {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Updated executable cannot be launched.
    #[error("failed to launch {:?}", path.display())]
    Launch {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AppEntry, RefreshPolicy, SuiteManifest},
        path::Layout,
    };
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{create_dir_all, read_to_string, OpenOptions};
    use std::time::SystemTime;

    fn set_modified(path: impl AsRef<Path>, secs_past_epoch: u64) -> anyhow::Result<()> {
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(secs_past_epoch);
        OpenOptions::new()
            .write(true)
            .open(path)?
            .set_modified(stamp)?;

        Ok(())
    }

    fn reconciler(installer: Option<PathBuf>) -> Reconciler {
        let manifest = SuiteManifest {
            binary_source: "share/bin".into(),
            icon_source: "share/icons".into(),
            local_data_folder: "ExampleCo".into(),
            start_menu_folder: "ExampleCo Apps".into(),
            refresh: RefreshPolicy::OnChange,
            installer,
            apps: vec![AppEntry {
                name: "Foo".into(),
                folder: "Foo".into(),
                exe: "Foo.exe".into(),
                copy_local: true,
                ..Default::default()
            }],
        };
        let layout = Layout::new("local/apps", "roaming/icons", "roaming/start");

        Reconciler::new(manifest, layout, TomlShortcutStore)
    }

    fn updater(installer: Option<PathBuf>) -> SelfUpdater {
        SelfUpdater::new(reconciler(installer))
    }

    /// Scripted close prompt that always cancels.
    #[derive(Debug)]
    struct DenyPrompt;

    impl ClosePrompt for DenyPrompt {
        fn confirm_retry(&self, _exe: &str) -> Result<bool> {
            Ok(false)
        }
    }

    fn seed_deployment() -> anyhow::Result<()> {
        create_dir_all("share/bin/Foo")?;
        std::fs::write("share/bin/Foo/Foo.exe", "foo v1")?;
        set_modified("share/bin/Foo/Foo.exe", 1_000)?;
        create_dir_all("share/icons")?;

        Ok(())
    }

    #[sealed_test]
    fn existing_loop_blocker_escalates_and_copies_nothing() -> anyhow::Result<()> {
        seed_deployment()?;
        let updater = updater(None);
        updater.reconciler.install()?;

        std::fs::write("share/bin/Foo/Foo.exe", "foo v2")?;
        set_modified("share/bin/Foo/Foo.exe", 2_000)?;
        std::fs::write("local/apps/Foo/loopblocker.txt", "")?;

        let result = updater.check_for_update_and_close("Foo", "Foo.exe");

        assert!(matches!(result, Err(Error::LoopBlocker(_))));
        assert_eq!(read_to_string("local/apps/Foo/Foo.exe")?, "foo v1");

        Ok(())
    }

    #[sealed_test]
    fn stale_loop_blocker_is_cleared_when_up_to_date() -> anyhow::Result<()> {
        seed_deployment()?;
        let updater = updater(None);
        updater.reconciler.install()?;
        std::fs::write("local/apps/Foo/loopblocker.txt", "")?;

        let outcome = updater.check_for_update_and_close("Foo", "Foo.exe")?;

        assert_eq!(outcome, RestartOutcome::UpToDate);
        assert!(!Path::new("local/apps/Foo/loopblocker.txt").exists());

        Ok(())
    }

    #[cfg(unix)]
    #[sealed_test]
    fn pending_update_writes_blocker_and_spawns_updater() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        seed_deployment()?;
        std::fs::write("share/bin/updater.sh", "#!/bin/sh\nexit 0\n")?;
        std::fs::set_permissions("share/bin/updater.sh", std::fs::Permissions::from_mode(0o755))?;

        let updater = updater(Some("updater.sh".into()));
        updater.reconciler.install()?;
        std::fs::write("share/bin/Foo/Foo.exe", "foo v2")?;
        set_modified("share/bin/Foo/Foo.exe", 2_000)?;

        let outcome = updater.check_for_update_and_close("Foo", "Foo.exe")?;

        assert_eq!(outcome, RestartOutcome::Restarting);
        assert!(Path::new("local/apps/Foo/loopblocker.txt").exists());

        Ok(())
    }

    #[cfg(unix)]
    #[sealed_test]
    fn wait_for_exit_treats_finished_process_as_normal() -> anyhow::Result<()> {
        let mut child = Command::new("true").spawn()?;
        let pid = child.id();
        child.wait()?;

        // Must return promptly instead of erroring on the missing pid.
        wait_for_exit(pid);

        Ok(())
    }

    #[cfg(unix)]
    #[sealed_test]
    fn update_and_start_with_exited_pid_refreshes_and_launches() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        seed_deployment()?;
        let updater = updater(None);
        updater.reconciler.install()?;

        std::fs::write("share/bin/Foo/Foo.exe", "#!/bin/sh\nexit 0\n")?;
        std::fs::set_permissions(
            "share/bin/Foo/Foo.exe",
            std::fs::Permissions::from_mode(0o755),
        )?;
        set_modified("share/bin/Foo/Foo.exe", 2_000)?;

        let mut child = Command::new("true").spawn()?;
        let pid = child.id();
        child.wait()?;

        let outcome = updater.update_and_start("Foo", "Foo.exe", Some(pid))?;

        assert_eq!(outcome, RelaunchOutcome::Launched);
        assert_eq!(
            read_to_string("local/apps/Foo/Foo.exe")?,
            "#!/bin/sh\nexit 0\n"
        );

        Ok(())
    }

    #[cfg(unix)]
    #[sealed_test]
    fn cancel_while_target_still_runs_clears_blocker_without_relaunch() -> anyhow::Result<()> {
        seed_deployment()?;
        let updater = SelfUpdater::with_prompt(reconciler(None), DenyPrompt);
        updater.reconciler.install()?;

        std::fs::write("share/bin/Foo/Foo.exe", "foo v2")?;
        set_modified("share/bin/Foo/Foo.exe", 2_000)?;
        std::fs::write("local/apps/Foo/loopblocker.txt", "")?;

        // Occupy the installed executable with a real long-lived process so
        // the running check finds it.
        std::fs::copy("/bin/sleep", "local/apps/Foo/Foo.exe")?;
        let mut child = Command::new("./local/apps/Foo/Foo.exe").arg("30").spawn()?;

        let outcome = updater.update_and_start("Foo", "Foo.exe", None);
        child.kill()?;
        child.wait()?;

        assert_eq!(outcome?, RelaunchOutcome::Canceled);
        assert!(!Path::new("local/apps/Foo/loopblocker.txt").exists());
        // Nothing was copied over the occupied executable.
        assert_eq!(
            std::fs::read("local/apps/Foo/Foo.exe")?,
            std::fs::read("/bin/sleep")?
        );

        Ok(())
    }

    #[sealed_test]
    fn not_deployed_executable_skips_update_check() -> anyhow::Result<()> {
        seed_deployment()?;
        let updater = updater(None);

        // The test binary does not live under the install root.
        let outcome = updater.check_for_update_and_restart()?;

        assert_eq!(outcome, RestartOutcome::NotDeployed);

        Ok(())
    }
}
