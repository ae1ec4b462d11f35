//! Timezone configuration via the /etc/localtime symlink.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::config::Config;

/// Point `/etc/localtime` at the configured zoneinfo entry.
///
/// No-op when no timezone is configured. An unknown timezone name is a
/// warning, not an error.
pub fn set_timezone(config: &Config, zoneinfo_root: &Path, etc_dir: &Path) -> Result<()> {
    let tz = match &config.timezone {
        Some(tz) => tz,
        None => return Ok(()),
    };

    let zone_file = zoneinfo_root.join(tz);
    if !zone_file.is_file() {
        warn!(timezone = %tz, "unknown timezone; leaving /etc/localtime alone");
        return Ok(());
    }

    let localtime = etc_dir.join("localtime");
    // Overwrite whatever the base image shipped
    if localtime.is_symlink() || localtime.exists() {
        fs::remove_file(&localtime)
            .with_context(|| format!("removing {}", localtime.display()))?;
    }
    std::os::unix::fs::symlink(&zone_file, &localtime)
        .with_context(|| format!("linking {} -> {}", localtime.display(), zone_file.display()))?;

    info!(timezone = %tz, "timezone configured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn config(tz: Option<&str>) -> Config {
        let mut vars = HashMap::new();
        vars.insert("SSH_USER".into(), "dev".into());
        vars.insert("SSH_PASSWORD".into(), "pw".into());
        if let Some(tz) = tz {
            vars.insert("TZ".into(), tz.into());
        }
        Config::from_map(&vars).unwrap()
    }

    #[test]
    fn test_noop_without_timezone() {
        let temp = TempDir::new().unwrap();
        set_timezone(&config(None), temp.path(), temp.path()).unwrap();
        assert!(!temp.path().join("localtime").exists());
    }

    #[test]
    fn test_symlink_created() {
        let temp = TempDir::new().unwrap();
        let zoneinfo = temp.path().join("zoneinfo");
        fs::create_dir_all(zoneinfo.join("Europe")).unwrap();
        fs::write(zoneinfo.join("Europe/Berlin"), "TZif").unwrap();
        let etc = temp.path().join("etc");
        fs::create_dir_all(&etc).unwrap();

        set_timezone(&config(Some("Europe/Berlin")), &zoneinfo, &etc).unwrap();

        let target = fs::read_link(etc.join("localtime")).unwrap();
        assert_eq!(target, zoneinfo.join("Europe/Berlin"));
    }

    #[test]
    fn test_existing_localtime_replaced() {
        let temp = TempDir::new().unwrap();
        let zoneinfo = temp.path().join("zoneinfo");
        fs::create_dir_all(&zoneinfo).unwrap();
        fs::write(zoneinfo.join("UTC"), "TZif").unwrap();
        let etc = temp.path().join("etc");
        fs::create_dir_all(&etc).unwrap();
        fs::write(etc.join("localtime"), "stale").unwrap();

        set_timezone(&config(Some("UTC")), &zoneinfo, &etc).unwrap();
        assert!(etc.join("localtime").is_symlink());
    }

    #[test]
    fn test_unknown_timezone_is_tolerated() {
        let temp = TempDir::new().unwrap();
        let zoneinfo = temp.path().join("zoneinfo");
        fs::create_dir_all(&zoneinfo).unwrap();
        let etc = temp.path().join("etc");
        fs::create_dir_all(&etc).unwrap();

        set_timezone(&config(Some("Mars/Olympus_Mons")), &zoneinfo, &etc).unwrap();
        assert!(!etc.join("localtime").exists());
    }
}
