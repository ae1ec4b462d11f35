//! One-shot provisioning of the login environment.
//!
//! Runs once per container start, before sshd launches: create the login
//! user, install the optional authorized key, write the optional banner,
//! set the optional timezone.
//!
//! Policy: the only fatal provisioning error is missing credentials, and
//! that is caught at config resolution before this module runs. Every
//! step here logs its failure and lets the sequence continue — a broken
//! banner or timezone must never stop the SSH daemon from coming up.

mod ssh;
mod timezone;
mod user;

pub use ssh::{install_authorized_key, write_banner};
pub use timezone::set_timezone;
pub use user::ensure_user;

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::Config;

/// Home directory for the login user.
pub fn home_dir(config: &Config) -> PathBuf {
    Path::new("/home").join(&config.username)
}

/// Run the full provisioning sequence, best-effort per step.
pub fn run(config: &Config) {
    let home = home_dir(config);

    if let Err(e) = user::ensure_user(config) {
        warn!(error = format!("{:#}", e), "user provisioning failed; continuing");
    }
    if let Err(e) = ssh::install_authorized_key(config, &home) {
        warn!(error = format!("{:#}", e), "authorized key install failed; continuing");
    }
    if let Err(e) = ssh::write_banner(config, &config.ssh_dir) {
        warn!(error = format!("{:#}", e), "banner setup failed; continuing");
    }
    if let Err(e) = timezone::set_timezone(config, Path::new("/usr/share/zoneinfo"), Path::new("/etc")) {
        warn!(error = format!("{:#}", e), "timezone setup failed; continuing");
    }
}
