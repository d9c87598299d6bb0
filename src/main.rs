// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use suitekit::{
    probe, Layout, Reconciler, RestartOutcome, SelfUpdater, SuiteManifest, TomlShortcutStore,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inquire::Select;
use std::{fs::read_to_string, path::PathBuf, process::exit};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  suitekit [options] [<command>]",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path of the suite manifest. Defaults to "suitekit.toml" next to the
    /// folder containing this executable.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    fn run(self) -> Result<i32> {
        let manifest_path = match self.config {
            Some(path) => path,
            None => default_manifest_path()?,
        };
        let contents = read_to_string(&manifest_path)
            .with_context(|| format!("failed to read manifest at {:?}", manifest_path.display()))?;
        let manifest: SuiteManifest = contents.parse()?;
        let layout = Layout::try_default(&manifest)?;

        let command = match self.command {
            Some(command) => command,
            None => match menu()? {
                Some(command) => command,
                None => return Ok(0),
            },
        };

        probe::check_sources(&manifest)?;

        let reconciler = Reconciler::new(manifest, layout, TomlShortcutStore);
        match command {
            Command::Install => reconciler.install()?,
            Command::Remove => reconciler.remove()?,
            Command::UpdateShortcuts => reconciler.update_shortcuts()?,
            Command::UpdateAndStart {
                folder,
                exe,
                wait_pid,
            } => {
                SelfUpdater::new(reconciler).update_and_start(&folder, &exe, wait_pid)?;
            }
            Command::UpdateAndClose { folder, exe } => {
                let outcome =
                    SelfUpdater::new(reconciler).check_for_update_and_close(&folder, &exe)?;
                if outcome == RestartOutcome::Restarting {
                    // Updater owns the rest of the cycle from here.
                    return Ok(0);
                }
            }
        }

        Ok(0)
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Install or reconcile the full suite: icons, app folders, shortcuts.
    #[command(alias = "Install")]
    Install,

    /// Delete all per-user suite state wholesale.
    #[command(alias = "Remove")]
    Remove,

    /// Reconcile start menu shortcuts only.
    #[command(alias = "UpdateShortcuts")]
    UpdateShortcuts,

    /// Updater-side pass: wait for a pid, refresh one app, relaunch it.
    #[command(
        alias = "UpdateAndStart",
        override_usage = "suitekit update-and-start <folder> <exe> [wait_pid]"
    )]
    UpdateAndStart {
        #[arg(value_name = "folder")]
        folder: String,

        #[arg(value_name = "exe")]
        exe: String,

        #[arg(value_name = "wait_pid")]
        wait_pid: Option<u32>,
    },

    /// Check one deployed app for an update, spawning the updater if due.
    #[command(
        alias = "UpdateAndClose",
        override_usage = "suitekit update-and-close <folder> <exe>"
    )]
    UpdateAndClose {
        #[arg(value_name = "folder")]
        folder: String,

        #[arg(value_name = "exe")]
        exe: String,
    },
}

fn main() {
    let layer = fmt::layer().compact();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry().with(layer).with(filter).init();

    match run() {
        Ok(code) => exit(code),
        Err(error) => {
            error!("{error:?}");
            present(&error);
            exit(1);
        }
    }
}

fn run() -> Result<i32> {
    Cli::parse().run()
}

fn menu() -> Result<Option<Command>> {
    let choice = Select::new(
        "Pick one of the following options:",
        vec!["Install", "Remove", "Quit"],
    )
    .prompt()?;

    Ok(match choice {
        "Install" => Some(Command::Install),
        "Remove" => Some(Command::Remove),
        _ => None,
    })
}

fn default_manifest_path() -> Result<PathBuf> {
    let exe_path =
        std::env::current_exe().context("cannot determine path of current executable")?;
    let exe_folder = exe_path.parent().unwrap_or_else(|| std::path::Path::new("."));

    Ok(exe_folder.join("..").join("suitekit.toml"))
}

/// Present a failure to the operator and wait for acknowledgment.
///
/// An unreachable source is the recoverable case and gets guidance text.
/// Everything else is unexpected and gets full diagnostics.
fn present(error: &anyhow::Error) {
    match error.downcast_ref::<probe::Error>() {
        Some(probe::Error::SourceUnreachable(folder)) => {
            println!("Error finding source folder {:?}", folder.display());
            println!();
            println!("If the source folder is on a network drive, try opening it in your file");
            println!("manager first. If it's password protected, doing so will give you the");
            println!("chance to enter your user name and password.");
            println!();
            println!("If you need to use a VPN to access the folder, double check that it's");
            println!("turned on.");
        }
        _ => {
            println!("Unexpected error. Contact your software support team.");
            println!();
            println!("{error:?}");
        }
    }

    println!();
    println!("Press enter to quit.");
    let _ = std::io::stdin().read_line(&mut String::new());
}
