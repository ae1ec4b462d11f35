//! The managed SSH daemon.
//!
//! sshd is the long-lived foreground process of the container; everything
//! else in this crate runs before it (restore, provisioning) or detached
//! beside it (the deferred backup). The strict ordering lives in
//! `main::cmd_up`: restore must finish before [`launch`] is called, so the
//! daemon never binds its socket with the wrong identity on disk.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::process::ExitStatus;

use tracing::{info, warn};

use crate::config::Config;
use crate::keys;
use crate::process::Cmd;

/// Privilege-separation directory sshd refuses to start without.
const RUN_DIR: &str = "/run/sshd";

/// Candidate sshd locations; /usr/sbin is often off PATH in containers.
pub const SSHD_CANDIDATES: &[&str] = &["/usr/sbin/sshd", "/sbin/sshd"];

/// Find the sshd binary.
pub fn find_sshd() -> Option<&'static str> {
    SSHD_CANDIDATES.iter().copied().find(|p| Path::new(p).is_file())
}

/// Create the privilege-separation directory.
pub fn ensure_run_dir() -> Result<()> {
    fs::create_dir_all(RUN_DIR).with_context(|| format!("creating {}", RUN_DIR))
}

/// Generate any host keys still missing from the key directory.
///
/// `ssh-keygen -A` creates only what is absent, so restored keys are
/// never touched. Running it up front (rather than letting sshd generate
/// lazily) makes the sentinel appear promptly for the deferred backup.
/// Best-effort: sshd generates its own keys if this fails.
pub fn generate_missing_keys(config: &Config) {
    if keys::set_is_complete(&config.ssh_dir) {
        return;
    }

    let missing = keys::missing_from(&config.ssh_dir);
    let result = Cmd::new("ssh-keygen").arg("-A").allow_fail().run();
    match result {
        Ok(r) if r.success() => {
            info!(?missing, "generated missing host keys");
        }
        Ok(r) => warn!(stderr = %r.stderr.trim(), "ssh-keygen -A failed; sshd will generate its own keys"),
        Err(e) => warn!(error = %e, "could not run ssh-keygen; sshd will generate its own keys"),
    }
}

/// Run sshd in the foreground and wait for it to exit.
///
/// `-D` keeps it from daemonizing (it *is* the container's main process),
/// `-e` sends its log to stderr where the platform collects it.
pub async fn launch() -> Result<ExitStatus> {
    let sshd = find_sshd().context("sshd binary not found; is openssh-server installed?")?;
    ensure_run_dir()?;

    info!(binary = sshd, "starting sshd in the foreground");
    let mut child = tokio::process::Command::new(sshd)
        .args(["-D", "-e"])
        .spawn()
        .with_context(|| format!("failed to spawn {}", sshd))?;

    let status = child.wait().await.context("waiting for sshd")?;
    info!(%status, "sshd exited");
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_generate_skips_complete_set() {
        // A complete set means no work and no external command; this must
        // not fail even on hosts without ssh-keygen installed.
        let temp = TempDir::new().unwrap();
        for key in keys::HOST_KEY_FILES {
            std::fs::write(temp.path().join(key.name), "x").unwrap();
        }
        let mut vars = HashMap::new();
        vars.insert("SSH_USER".into(), "dev".into());
        vars.insert("SSH_PASSWORD".into(), "pw".into());
        vars.insert("SSH_DIR".into(), temp.path().display().to_string());
        let config = Config::from_map(&vars).unwrap();

        generate_missing_keys(&config);
    }
}
