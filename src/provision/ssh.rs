//! SSH access provisioning: authorized key and pre-auth banner.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::info;

use crate::config::Config;

/// Name of the banner file written into the ssh directory.
const BANNER_FILE: &str = "banner.txt";

/// Install the configured public key into `~/.ssh/authorized_keys`.
///
/// No-op when no key is configured. The `.ssh` directory gets 0700 and
/// the key file 0600, chowned to the login user, or sshd's StrictModes
/// will refuse the key.
pub fn install_authorized_key(config: &Config, home: &Path) -> Result<()> {
    let key = match &config.public_key {
        Some(key) => key,
        None => return Ok(()),
    };

    let ssh_dir = home.join(".ssh");
    fs::create_dir_all(&ssh_dir)
        .with_context(|| format!("creating {}", ssh_dir.display()))?;
    fs::set_permissions(&ssh_dir, fs::Permissions::from_mode(0o700))?;

    let authorized = ssh_dir.join("authorized_keys");
    let mut content = key.trim().to_string();
    content.push('\n');
    fs::write(&authorized, content)
        .with_context(|| format!("writing {}", authorized.display()))?;
    fs::set_permissions(&authorized, fs::Permissions::from_mode(0o600))?;

    std::os::unix::fs::chown(&ssh_dir, Some(config.uid), Some(config.gid))?;
    std::os::unix::fs::chown(&authorized, Some(config.uid), Some(config.gid))?;

    info!(user = %config.username, "authorized key installed");
    Ok(())
}

/// Write the configured banner and point sshd at it via a drop-in.
///
/// No-op when no banner is configured. The drop-in goes into
/// `sshd_config.d/`, which stock sshd_config includes.
pub fn write_banner(config: &Config, ssh_dir: &Path) -> Result<()> {
    let banner = match &config.banner {
        Some(banner) => banner,
        None => return Ok(()),
    };

    fs::create_dir_all(ssh_dir)?;
    let banner_path = ssh_dir.join(BANNER_FILE);
    let mut content = banner.clone();
    if !content.ends_with('\n') {
        content.push('\n');
    }
    fs::write(&banner_path, content)
        .with_context(|| format!("writing {}", banner_path.display()))?;

    let dropin_dir = ssh_dir.join("sshd_config.d");
    fs::create_dir_all(&dropin_dir)?;
    fs::write(
        dropin_dir.join("10-banner.conf"),
        format!("Banner {}\n", banner_path.display()),
    )
    .context("writing banner drop-in")?;

    info!("pre-auth banner configured");
    Ok(())
}
