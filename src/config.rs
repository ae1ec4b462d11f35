//! Runtime configuration for the sshpod entrypoint.
//!
//! All environment variables are read exactly once, at startup, into
//! [`Config`]. Every module downstream takes the struct (or fields from
//! it); nothing reads the process environment ad hoc.
//!
//! The only fatal configuration error in the whole program is a missing
//! login username or password. Everything else has a default or is
//! optional.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// Default volume mount point when the platform doesn't set one.
pub const DEFAULT_VOLUME_ROOT: &str = "/data";

/// Where sshd reads its host keys and configuration.
pub const DEFAULT_SSH_DIR: &str = "/etc/ssh";

/// Subdirectory of the volume that holds the host key backup.
pub const KEY_BACKUP_DIR: &str = "ssh_host_keys";

/// Resolved entrypoint configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Login username. Required.
    pub username: String,
    /// Login password. Required.
    pub password: String,
    /// Optional public key to install into the user's authorized_keys.
    pub public_key: Option<String>,
    /// Optional pre-auth banner text shown by sshd.
    pub banner: Option<String>,
    /// Optional timezone name (e.g. "Europe/Berlin").
    pub timezone: Option<String>,
    /// Numeric uid for the login user and for volume ownership.
    pub uid: u32,
    /// Numeric gid for the login user and for volume ownership.
    pub gid: u32,
    /// Root of the persistent volume (durable store).
    pub volume_root: PathBuf,
    /// Ephemeral host key directory.
    pub ssh_dir: PathBuf,
    /// Log verbosity passed to the tracing filter.
    pub log_level: String,
}

impl Config {
    /// Resolve configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Fails only when `SSH_USER` or `SSH_PASSWORD` is missing or empty,
    /// or when a numeric id fails to parse. These abort provisioning
    /// before anything has been touched.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_map(&vars)
    }

    /// Resolve configuration from an explicit variable map.
    ///
    /// Split out so tests can build configs without mutating the process
    /// environment.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let username = match get("SSH_USER") {
            Some(u) => u.to_string(),
            None => bail!("SSH_USER is not set; refusing to start without a login user"),
        };
        let password = match get("SSH_PASSWORD") {
            Some(p) => p.to_string(),
            None => bail!("SSH_PASSWORD is not set; refusing to start without a password"),
        };

        let uid = parse_id(get("SSH_UID"), "SSH_UID", 1000)?;
        let gid = parse_id(get("SSH_GID"), "SSH_GID", 1000)?;

        let volume_root = get("RAILWAY_VOLUME_MOUNT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VOLUME_ROOT));

        let ssh_dir = get("SSH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SSH_DIR));

        Ok(Self {
            username,
            password,
            public_key: get("SSH_PUBLIC_KEY").map(String::from),
            banner: get("SSH_BANNER").map(String::from),
            timezone: get("TZ").map(String::from),
            uid,
            gid,
            volume_root,
            ssh_dir,
            log_level: get("LOG_LEVEL").unwrap_or("info").to_string(),
        })
    }

    /// Durable location for the host key backup.
    pub fn key_backup_dir(&self) -> PathBuf {
        self.volume_root.join(KEY_BACKUP_DIR)
    }
}

fn parse_id(value: Option<&str>, name: &str, default: u32) -> Result<u32> {
    match value {
        None => Ok(default),
        Some(v) => match v.parse::<u32>() {
            Ok(id) => Ok(id),
            Err(_) => bail!("{} must be a numeric id, got '{}'", name, v),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("SSH_USER".into(), "dev".into());
        vars.insert("SSH_PASSWORD".into(), "hunter2".into());
        vars
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_map(&base_vars()).unwrap();
        assert_eq!(config.username, "dev");
        assert_eq!(config.uid, 1000);
        assert_eq!(config.gid, 1000);
        assert_eq!(config.volume_root, PathBuf::from("/data"));
        assert_eq!(config.ssh_dir, PathBuf::from("/etc/ssh"));
        assert_eq!(config.log_level, "info");
        assert!(config.public_key.is_none());
        assert!(config.banner.is_none());
        assert!(config.timezone.is_none());
    }

    #[test]
    fn test_missing_username_is_fatal() {
        let mut vars = base_vars();
        vars.remove("SSH_USER");
        assert!(Config::from_map(&vars).is_err());
    }

    #[test]
    fn test_empty_password_is_fatal() {
        let mut vars = base_vars();
        vars.insert("SSH_PASSWORD".into(), "  ".into());
        assert!(Config::from_map(&vars).is_err());
    }

    #[test]
    fn test_volume_root_from_platform() {
        let mut vars = base_vars();
        vars.insert("RAILWAY_VOLUME_MOUNT_PATH".into(), "/mnt/vol".into());
        let config = Config::from_map(&vars).unwrap();
        assert_eq!(config.volume_root, PathBuf::from("/mnt/vol"));
        assert_eq!(config.key_backup_dir(), PathBuf::from("/mnt/vol/ssh_host_keys"));
    }

    #[test]
    fn test_numeric_ids() {
        let mut vars = base_vars();
        vars.insert("SSH_UID".into(), "1234".into());
        vars.insert("SSH_GID".into(), "4321".into());
        let config = Config::from_map(&vars).unwrap();
        assert_eq!(config.uid, 1234);
        assert_eq!(config.gid, 4321);
    }

    #[test]
    fn test_bad_uid_is_fatal() {
        let mut vars = base_vars();
        vars.insert("SSH_UID".into(), "not-a-number".into());
        assert!(Config::from_map(&vars).is_err());
    }

    #[test]
    fn test_optional_fields() {
        let mut vars = base_vars();
        vars.insert("SSH_PUBLIC_KEY".into(), "ssh-ed25519 AAAA dev@laptop".into());
        vars.insert("SSH_BANNER".into(), "authorized access only".into());
        vars.insert("TZ".into(), "Europe/Berlin".into());
        let config = Config::from_map(&vars).unwrap();
        assert_eq!(config.public_key.as_deref(), Some("ssh-ed25519 AAAA dev@laptop"));
        assert_eq!(config.banner.as_deref(), Some("authorized access only"));
        assert_eq!(config.timezone.as_deref(), Some("Europe/Berlin"));
    }
}
