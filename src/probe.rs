// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Startup source connectivity probe.
//!
//! The source folders usually live on a network share, and a dead VPN or an
//! unauthenticated mapped drive makes existence checks hang far longer than
//! an operator will wait. So the probe issues both checks concurrently and
//! gives the pair a fixed deadline. A check still outstanding at the
//! deadline keeps running on the blocking pool with its result discarded;
//! the closure returns a plain bool, so an abandoned check has no fault to
//! surface, and the runtime is shut down in the background so the abandoned
//! check cannot delay the caller either.
//!
//! Probe failure is the one user-recoverable error class of the whole
//! program, distinct from everything else: it means "source unreachable,
//! check your connection," not "something broke."

use crate::config::SuiteManifest;

use futures::future::join;
use std::{path::PathBuf, time::Duration};
use tokio::{task::spawn_blocking, time::timeout};
use tracing::{debug, instrument};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe both source folders for reachability within a fixed deadline.
///
/// # Errors
///
/// - Return [`Error::SourceUnreachable`] if either check fails or the
///   deadline passes first.
#[instrument(skip(manifest), level = "debug")]
pub fn check_sources(manifest: &SuiteManifest) -> Result<()> {
    let binary_source = manifest.binary_source.clone();
    let icon_source = manifest.icon_source.clone();
    let binary_check = {
        let path = binary_source.clone();
        move || path.is_dir()
    };
    let icon_check = {
        let path = icon_source.clone();
        move || path.is_dir()
    };

    check_within(PROBE_TIMEOUT, binary_source, icon_source, binary_check, icon_check)
}

fn check_within<B, I>(
    deadline: Duration,
    binary_source: PathBuf,
    icon_source: PathBuf,
    binary_check: B,
    icon_check: I,
) -> Result<()>
where
    B: FnOnce() -> bool + Send + 'static,
    I: FnOnce() -> bool + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()
        .map_err(Error::Runtime)?;

    let verdict = runtime.block_on(async move {
        let binary_check = spawn_blocking(binary_check);
        let icon_check = spawn_blocking(icon_check);

        let (binary_found, icon_found) =
            match timeout(deadline, join(binary_check, icon_check)).await {
                Ok(results) => results,
                Err(_elapsed) => return Err(Error::SourceUnreachable(icon_source)),
            };

        if !icon_found.unwrap_or(false) {
            return Err(Error::SourceUnreachable(icon_source));
        }
        if !binary_found.unwrap_or(false) {
            return Err(Error::SourceUnreachable(binary_source));
        }

        debug!("both source folders reachable");
        Ok(())
    });

    // INVARIANT: a hung check must not outlive the deadline from the
    // caller's point of view. Dropping the runtime inline waits for every
    // blocking task that already started, so shut it down in the background
    // and let the abandoned check finish on its own.
    runtime.shutdown_background();

    verdict
}

/// Probe error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Source folder not found within the probe deadline.
    #[error("could not find {:?}", .0.display())]
    SourceUnreachable(PathBuf),

    /// Probe runtime cannot be constructed.
    #[error("failed to build probe runtime")]
    Runtime(#[source] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use sealed_test::prelude::*;
    use std::fs::create_dir_all;
    use std::time::Instant;

    fn manifest() -> SuiteManifest {
        SuiteManifest {
            binary_source: "share/bin".into(),
            icon_source: "share/icons".into(),
            local_data_folder: "ExampleCo".into(),
            start_menu_folder: "ExampleCo Apps".into(),
            ..Default::default()
        }
    }

    #[sealed_test]
    fn reachable_sources_pass() -> anyhow::Result<()> {
        create_dir_all("share/bin")?;
        create_dir_all("share/icons")?;

        check_sources(&manifest())?;

        Ok(())
    }

    #[sealed_test]
    fn missing_binary_source_is_named() -> anyhow::Result<()> {
        create_dir_all("share/icons")?;

        let result = check_sources(&manifest());

        assert!(
            matches!(result, Err(Error::SourceUnreachable(path)) if path == PathBuf::from("share/bin"))
        );

        Ok(())
    }

    #[sealed_test]
    fn missing_icon_source_is_named() -> anyhow::Result<()> {
        create_dir_all("share/bin")?;

        let result = check_sources(&manifest());

        assert!(
            matches!(result, Err(Error::SourceUnreachable(path)) if path == PathBuf::from("share/icons"))
        );

        Ok(())
    }

    #[test]
    fn hung_check_does_not_delay_the_caller_past_the_deadline() {
        let started = Instant::now();

        let result = check_within(
            Duration::from_millis(100),
            "share/bin".into(),
            "share/icons".into(),
            || true,
            || {
                std::thread::sleep(Duration::from_secs(3));
                true
            },
        );

        assert!(
            started.elapsed() < Duration::from_secs(2),
            "caller regained control only after {:?}",
            started.elapsed()
        );
        assert!(
            matches!(result, Err(Error::SourceUnreachable(path)) if path == PathBuf::from("share/icons"))
        );
    }
}
