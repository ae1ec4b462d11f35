//! Persistent volume detection and directory layout.
//!
//! The platform mounts a volume at a configured path (default `/data`).
//! That mount can be absent (local runs) or unwritable (owned by root
//! while we aren't). Either way the environment still has to come up, so
//! the layout falls back to a directory under `$HOME` — with the caveat,
//! logged loudly, that nothing there survives a redeploy.
//!
//! The standard subdirectories give the user somewhere predictable to put
//! things: `app_data`, `uploads`, `logs`, `cache`, plus the
//! `ssh_host_keys` backup directory consumed by [`crate::identity`].

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{Config, KEY_BACKUP_DIR};
use crate::identity::{chown_recursive, OpOutcome};

/// Subdirectories created under the storage root.
const LAYOUT_DIRS: &[&str] = &["app_data", "uploads", "logs", "cache", KEY_BACKUP_DIR];

/// Result of laying out persistent storage.
#[derive(Debug)]
pub struct StorageLayout {
    /// Root everything was created under.
    pub root: PathBuf,
    /// True when the root is the real volume; false for the home-dir
    /// fallback, where nothing persists.
    pub persistent: bool,
}

/// Detect the volume, pick a root, and create the directory layout.
///
/// Only the final directory creation can fail; an absent or unwritable
/// volume is handled by falling back, not by erroring.
pub fn setup(config: &Config) -> Result<StorageLayout> {
    let (root, persistent) = match probe_volume(&config.volume_root) {
        Ok(()) => {
            info!(root = %config.volume_root.display(), "using mounted volume; data persists across redeploys");
            (config.volume_root.clone(), true)
        }
        Err(reason) => {
            let fallback = home_fallback();
            warn!(
                %reason,
                fallback = %fallback.display(),
                "volume unavailable; using container-local storage (data will NOT persist)"
            );
            (fallback, false)
        }
    };

    for name in LAYOUT_DIRS {
        let dir = root.join(name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    // The volume often arrives owned by root; hand it to the login user.
    if chown_recursive(&root, config.uid, config.gid) != OpOutcome::Done {
        warn!(root = %root.display(), "could not fix storage ownership");
    }

    Ok(StorageLayout { root, persistent })
}

/// Check the volume exists and is writable, via a throwaway dot-file.
fn probe_volume(volume: &Path) -> std::result::Result<(), String> {
    if !volume.is_dir() {
        return Err(format!("{} does not exist", volume.display()));
    }

    let probe = volume.join(".write_test");
    match fs::write(&probe, b"") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            Ok(())
        }
        Err(e) => Err(format!("{} is not writable: {}", volume.display(), e)),
    }
}

fn home_fallback() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/root"));
    home.join("persistent_data")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn config_with_volume(volume: &Path) -> Config {
        let mut vars = HashMap::new();
        vars.insert("SSH_USER".into(), "dev".into());
        vars.insert("SSH_PASSWORD".into(), "pw".into());
        vars.insert(
            "RAILWAY_VOLUME_MOUNT_PATH".into(),
            volume.display().to_string(),
        );
        let mut config = Config::from_map(&vars).unwrap();
        // chown to ourselves so the fixup succeeds unprivileged
        use std::os::unix::fs::MetadataExt;
        let meta = fs::metadata(volume.parent().unwrap_or(Path::new("/"))).unwrap();
        config.uid = meta.uid();
        config.gid = meta.gid();
        config
    }

    #[test]
    fn test_layout_on_mounted_volume() {
        let temp = TempDir::new().unwrap();
        let config = config_with_volume(temp.path());

        let layout = setup(&config).unwrap();
        assert!(layout.persistent);
        assert_eq!(layout.root, temp.path());
        for name in LAYOUT_DIRS {
            assert!(temp.path().join(name).is_dir(), "{} missing", name);
        }
    }

    #[test]
    fn test_fallback_when_volume_missing() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("not_mounted");
        let config = config_with_volume(&missing);

        // Point HOME at the temp dir so the fallback lands somewhere we control
        let layout = {
            let _home = temp_env_home(temp.path());
            setup(&config).unwrap()
        };

        assert!(!layout.persistent);
        assert!(layout.root.starts_with(temp.path()));
        assert!(layout.root.join("app_data").is_dir());
    }

    #[test]
    fn test_probe_detects_missing_volume() {
        let temp = TempDir::new().unwrap();
        assert!(probe_volume(temp.path()).is_ok());
        assert!(probe_volume(&temp.path().join("gone")).is_err());
        // Probe cleans up its test file
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    /// Guard that sets HOME for the duration of a test.
    struct HomeGuard(Option<std::ffi::OsString>);

    fn temp_env_home(dir: &Path) -> HomeGuard {
        let old = std::env::var_os("HOME");
        std::env::set_var("HOME", dir);
        HomeGuard(old)
    }

    impl Drop for HomeGuard {
        fn drop(&mut self) {
            match &self.0 {
                Some(old) => std::env::set_var("HOME", old),
                None => std::env::remove_var("HOME"),
            }
        }
    }
}
