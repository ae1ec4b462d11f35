//! Login user creation.
//!
//! Creates the group and user with the configured numeric ids via the
//! system utilities, then sets the password through chpasswd. A user that
//! already exists (container restarted with the same config) is left
//! alone apart from the password refresh.

use anyhow::{Context, Result};
use std::fs;

use tracing::info;

use crate::config::Config;
use crate::process::Cmd;

/// Ensure the login user exists with the configured ids and password.
pub fn ensure_user(config: &Config) -> Result<()> {
    if user_exists(&config.username) {
        info!(user = %config.username, "login user already exists");
    } else {
        // -f: exit 0 if the group is already there
        Cmd::new("groupadd")
            .args(["-f", "-g", &config.gid.to_string(), &config.username])
            .run()
            .context("creating login group")?;

        Cmd::new("useradd")
            .args([
                "-m",
                "-u",
                &config.uid.to_string(),
                "-g",
                &config.gid.to_string(),
                "-s",
                "/bin/bash",
                &config.username,
            ])
            .run()
            .context("creating login user")?;

        info!(user = %config.username, uid = config.uid, gid = config.gid, "login user created");
    }

    // Refresh the password on every start so a config change takes effect
    Cmd::new("chpasswd")
        .stdin(format!("{}:{}\n", config.username, config.password))
        .run()
        .context("setting login password")?;

    Ok(())
}

/// Check /etc/passwd for the user, the same way the libc tools would.
fn user_exists(username: &str) -> bool {
    let prefix = format!("{}:", username);
    fs::read_to_string("/etc/passwd")
        .map(|content| content.lines().any(|line| line.starts_with(&prefix)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_exists_root() {
        // root is in /etc/passwd on any Unix system
        assert!(user_exists("root"));
    }

    #[test]
    fn test_user_exists_nonexistent() {
        assert!(!user_exists("definitely_not_a_real_user_12345"));
    }
}
