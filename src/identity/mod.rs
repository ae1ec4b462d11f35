//! Identity persistence for the SSH daemon's host keys.
//!
//! Containers are disposable; the host keys sshd presents to clients must
//! not be. [`IdentityManager`] mirrors the enumerated key set between the
//! ephemeral key directory (recreated with the container) and a durable
//! directory on the mounted volume, so every redeploy presents the same
//! identity and clients never see a host-key-changed warning.
//!
//! Two halves, strictly ordered around the sshd launch:
//!
//! - **restore** runs before sshd binds its socket: any key material found
//!   in the durable store is copied into the ephemeral directory, with the
//!   permission policy re-applied after every copy.
//! - **backup** runs detached after sshd has started: once sshd has
//!   generated keys (the sentinel file appears), every key file is copied
//!   out to the durable store and the store is chowned to the configured
//!   owner.
//!
//! Every operation here is best-effort. An unreachable volume is a mode
//! switch (ephemeral-only, identity not persisted), not an error; a failed
//! copy is logged and skipped. The worst total outcome is a fresh,
//! non-persisted identity, which is what running without this module
//! would produce anyway. Nothing in this module can stop sshd from
//! starting.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::keys::{self, KeyFile, SENTINEL};

/// How often the deferred backup polls for the sentinel.
const BACKUP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound on the poll. Generously exceeds `ssh-keygen -A` on any
/// plausible host; past this the backup is abandoned until the next run.
const BACKUP_POLL_DEADLINE: Duration = Duration::from_secs(30);

/// Reachability of the durable store at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreStatus {
    /// The durable directory exists (or was created) and is writable.
    Reachable,
    /// No usable volume. Identity will not persist this run.
    Unreachable { reason: String },
}

/// Outcome of a single filesystem operation, logged uniformly and never
/// escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    Done,
    SkippedDegraded,
    FailedNonFatal,
}

/// Outcome of the restore half.
#[derive(Debug, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Store unreachable; running in ephemeral-only mode.
    Degraded,
    /// Store reachable but holds no key material. sshd will generate a
    /// fresh set; the caller should schedule the deferred backup.
    FirstRun,
    /// Key material was copied into the ephemeral directory.
    Restored { copied: usize, failed: usize },
}

/// Outcome of the backup half.
#[derive(Debug, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Store unreachable; nothing persisted.
    Degraded,
    /// sshd never produced the sentinel; durable store left untouched.
    NoSentinel,
    /// Key material was copied out to the durable store.
    BackedUp { copied: usize, failed: usize },
}

/// Mirrors host key material between the ephemeral key directory and the
/// durable store on the volume.
pub struct IdentityManager {
    ephemeral: PathBuf,
    durable: PathBuf,
    uid: u32,
    gid: u32,
    poll_interval: Duration,
    poll_deadline: Duration,
}

impl IdentityManager {
    pub fn new(config: &Config) -> Self {
        Self::with_paths(&config.ssh_dir, &config.key_backup_dir(), config.uid, config.gid)
    }

    /// Construct with explicit paths. Used directly by tests.
    pub fn with_paths(ephemeral: &Path, durable: &Path, uid: u32, gid: u32) -> Self {
        Self {
            ephemeral: ephemeral.to_path_buf(),
            durable: durable.to_path_buf(),
            uid,
            gid,
            poll_interval: BACKUP_POLL_INTERVAL,
            poll_deadline: BACKUP_POLL_DEADLINE,
        }
    }

    /// Shrink the deferred-backup poll window. Test hook.
    #[cfg(test)]
    pub fn with_poll(mut self, interval: Duration, deadline: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_deadline = deadline;
        self
    }

    /// Check whether the durable store is usable right now.
    ///
    /// The volume mount can be absent entirely (local runs, mount
    /// failure) or present but unwritable. Both are the same degraded
    /// mode. The probe creates the backup subdirectory if the volume is
    /// there, then verifies writability with a throwaway dot-file, the
    /// same way the volume itself is probed at startup.
    pub fn probe_store(&self) -> StoreStatus {
        let volume = match self.durable.parent() {
            Some(parent) => parent,
            None => return StoreStatus::Unreachable { reason: "no parent volume".into() },
        };

        if !volume.is_dir() {
            return StoreStatus::Unreachable {
                reason: format!("volume not mounted at {}", volume.display()),
            };
        }

        if let Err(e) = fs::create_dir_all(&self.durable) {
            return StoreStatus::Unreachable {
                reason: format!("cannot create {}: {}", self.durable.display(), e),
            };
        }

        let probe = self.durable.join(".write_test");
        match fs::write(&probe, b"") {
            Ok(()) => {
                let _ = fs::remove_file(&probe);
                StoreStatus::Reachable
            }
            Err(e) => StoreStatus::Unreachable {
                reason: format!("{} not writable: {}", self.durable.display(), e),
            },
        }
    }

    /// Restore half. Must complete before sshd is launched.
    ///
    /// Copies every enumerated key file that exists in the durable store
    /// into the ephemeral directory, overwriting, and re-applies the
    /// permission policy after each copy regardless of the source bits.
    /// A partial durable set restores what exists and leaves sshd to
    /// regenerate the rest; the missing files are named in a warning.
    pub fn restore(&self) -> RestoreOutcome {
        match self.probe_store() {
            StoreStatus::Reachable => {}
            StoreStatus::Unreachable { reason } => {
                info!(%reason, "durable store unreachable; host keys will not persist");
                return RestoreOutcome::Degraded;
            }
        }

        let present = keys::present_in(&self.durable);
        if present.is_empty() {
            info!(store = %self.durable.display(), "no host keys in durable store; first run");
            return RestoreOutcome::FirstRun;
        }

        if !keys::set_is_complete(&self.durable) {
            warn!(
                missing = ?keys::missing_from(&self.durable),
                "durable key set is incomplete; sshd will regenerate the missing pairs"
            );
        }

        if let Err(e) = fs::create_dir_all(&self.ephemeral) {
            warn!(dir = %self.ephemeral.display(), error = %e, "cannot create key directory");
            return RestoreOutcome::Restored { copied: 0, failed: present.len() };
        }

        let mut copied = 0;
        let mut failed = 0;
        for key in &present {
            match self.copy_key(key, &self.durable, &self.ephemeral, true) {
                OpOutcome::Done => copied += 1,
                _ => failed += 1,
            }
        }

        info!(copied, failed, "restored host keys from durable store");
        RestoreOutcome::Restored { copied, failed }
    }

    /// Backup half. Runs after sshd has had time to generate keys.
    ///
    /// Gated on the sentinel: if sshd never wrote its RSA key, nothing is
    /// copied and the durable store is left exactly as it was. On
    /// success the durable directory is chowned recursively to the
    /// configured owner; permission bits are left as the ephemeral
    /// copies had them.
    pub fn backup(&self) -> BackupOutcome {
        match self.probe_store() {
            StoreStatus::Reachable => {}
            StoreStatus::Unreachable { reason } => {
                debug!(%reason, "durable store unreachable; skipping backup");
                return BackupOutcome::Degraded;
            }
        }

        if !self.ephemeral.join(SENTINEL).is_file() {
            debug!("sentinel not present in ephemeral directory; skipping backup");
            return BackupOutcome::NoSentinel;
        }

        let mut copied = 0;
        let mut failed = 0;
        for key in keys::present_in(&self.ephemeral) {
            match self.copy_key(&key, &self.ephemeral, &self.durable, false) {
                OpOutcome::Done => copied += 1,
                _ => failed += 1,
            }
        }

        match chown_recursive(&self.durable, self.uid, self.gid) {
            OpOutcome::Done => {}
            _ => warn!(dir = %self.durable.display(), "failed to chown key backup"),
        }

        info!(copied, failed, store = %self.durable.display(), "backed up host keys");
        BackupOutcome::BackedUp { copied, failed }
    }

    /// Deferred backup task: wait for sshd to generate its keys, then run
    /// the backup half.
    ///
    /// Polls for the sentinel instead of sleeping a fixed interval, so a
    /// slow key generation doesn't race the backup and a fast one doesn't
    /// wait. Spawn this detached (`tokio::spawn`); it never blocks the
    /// provisioning sequence, and if the container dies before the
    /// deadline the backup is simply lost until the next run.
    pub async fn deferred_backup(self) -> BackupOutcome {
        let deadline = tokio::time::Instant::now() + self.poll_deadline;

        while !self.ephemeral.join(SENTINEL).is_file() {
            if tokio::time::Instant::now() >= deadline {
                info!(
                    waited_secs = self.poll_deadline.as_secs(),
                    "host keys never appeared; abandoning backup until next run"
                );
                return BackupOutcome::NoSentinel;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        self.backup()
    }

    /// Copy one key file between the two locations.
    ///
    /// `enforce_mode` re-applies the permission policy after the copy;
    /// the restore direction always does, the backup direction relies on
    /// the ephemeral copies already being normalized.
    fn copy_key(&self, key: &KeyFile, from: &Path, to: &Path, enforce_mode: bool) -> OpOutcome {
        let src = from.join(key.name);
        let dst = to.join(key.name);

        if let Err(e) = fs::copy(&src, &dst) {
            warn!(file = key.name, error = %e, "host key copy failed");
            return OpOutcome::FailedNonFatal;
        }

        if enforce_mode {
            if let Err(e) = fs::set_permissions(&dst, fs::Permissions::from_mode(key.mode())) {
                warn!(file = key.name, error = %e, "could not set host key permissions");
                return OpOutcome::FailedNonFatal;
            }
        }

        debug!(file = key.name, to = %to.display(), "host key copied");
        OpOutcome::Done
    }
}

/// Chown a directory tree. Best-effort: the first error aborts the walk
/// and is reported, but nothing is retried or escalated.
pub fn chown_recursive(dir: &Path, uid: u32, gid: u32) -> OpOutcome {
    if !dir.exists() {
        return OpOutcome::SkippedDegraded;
    }

    fn walk(dir: &Path, uid: u32, gid: u32) -> std::io::Result<()> {
        std::os::unix::fs::chown(dir, Some(uid), Some(gid))?;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(&path, uid, gid)?;
            } else {
                std::os::unix::fs::chown(&path, Some(uid), Some(gid))?;
            }
        }
        Ok(())
    }

    match walk(dir, uid, gid) {
        Ok(()) => OpOutcome::Done,
        Err(e) => {
            // Normal when not running as root; ownership is then whatever
            // the process could set.
            debug!(dir = %dir.display(), error = %e, "chown incomplete");
            OpOutcome::FailedNonFatal
        }
    }
}
