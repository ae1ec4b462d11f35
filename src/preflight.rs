//! Preflight checks for the container environment.
//!
//! Validates the pieces the entrypoint depends on before anything is
//! touched: the SSH binaries, the key directory, and the volume mount.
//! Checks inform; they don't gate. A failed check is printed (and an
//! absent volume is expected in local runs), but only `status` shows the
//! full report — `up` proceeds regardless, per the degraded-mode policy.

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::process;
use crate::sshd;

/// Result of a single preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Human-readable message
    pub message: String,
    /// Optional suggestion for fixing the issue
    pub suggestion: Option<String>,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Create a failing check result.
    pub fn fail(
        name: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }
}

/// Comprehensive preflight report.
#[derive(Debug, Default)]
pub struct PreflightReport {
    /// All check results
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    /// Check if all preflight checks passed.
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Get all failing checks.
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    /// Print a summary of the preflight checks.
    pub fn print_summary(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let status = if check.passed { "[OK]" } else { "[FAIL]" };
            println!("{} {}: {}", status, check.name, check.message);
            if let Some(suggestion) = &check.suggestion {
                println!("     Suggestion: {}", suggestion);
            }
        }

        let passed = self.checks.iter().filter(|c| c.passed).count();
        println!();
        if self.is_ok() {
            println!("All preflight checks passed ({}/{})", passed, self.checks.len());
        } else {
            println!("Preflight checks failed: {} of {} passed", passed, self.checks.len());
        }
    }
}

/// Run all preflight checks.
pub fn run(config: &Config) -> PreflightReport {
    PreflightReport {
        checks: vec![
            check_sshd_binary(),
            check_ssh_keygen(),
            check_key_dir(&config.ssh_dir),
            check_volume(&config.volume_root),
        ],
    }
}

fn check_sshd_binary() -> CheckResult {
    match sshd::find_sshd() {
        Some(path) => CheckResult::pass("sshd binary", format!("Found at {}", path)),
        None => CheckResult::fail(
            "sshd binary",
            "Not found",
            "apt-get install openssh-server",
        ),
    }
}

fn check_ssh_keygen() -> CheckResult {
    match process::which("ssh-keygen") {
        Some(path) => CheckResult::pass("ssh-keygen tool", format!("Found at {}", path.display())),
        None => CheckResult::fail(
            "ssh-keygen tool",
            "Not found (needed to pre-generate host keys)",
            "apt-get install openssh-client",
        ),
    }
}

fn check_key_dir(ssh_dir: &Path) -> CheckResult {
    if ssh_dir.is_dir() {
        CheckResult::pass("Key directory", format!("{} exists", ssh_dir.display()))
    } else if fs::create_dir_all(ssh_dir).is_ok() {
        CheckResult::pass("Key directory", format!("{} created", ssh_dir.display()))
    } else {
        CheckResult::fail(
            "Key directory",
            format!("{} cannot be created", ssh_dir.display()),
            "Run the entrypoint as root",
        )
    }
}

fn check_volume(volume: &Path) -> CheckResult {
    if volume.is_dir() {
        CheckResult::pass("Volume mount", format!("{} is mounted", volume.display()))
    } else {
        // Expected in local runs; the entrypoint degrades, so a failing
        // check here is informational
        CheckResult::fail(
            "Volume mount",
            format!("{} not mounted (host keys will not persist)", volume.display()),
            "Attach a volume in the platform dashboard",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_check_result_pass() {
        let result = CheckResult::pass("test", "passed");
        assert!(result.passed);
        assert!(result.suggestion.is_none());
    }

    #[test]
    fn test_check_result_fail() {
        let result = CheckResult::fail("test", "failed", "fix it");
        assert!(!result.passed);
        assert!(result.suggestion.is_some());
    }

    #[test]
    fn test_report_is_ok() {
        let mut report = PreflightReport::default();
        assert!(report.is_ok()); // Empty is OK

        report.checks.push(CheckResult::pass("test1", "ok"));
        assert!(report.is_ok());

        report.checks.push(CheckResult::fail("test2", "bad", "fix"));
        assert!(!report.is_ok());
        assert_eq!(report.errors().len(), 1);
    }

    #[test]
    fn test_run_produces_all_checks() {
        let temp = TempDir::new().unwrap();
        let mut vars = HashMap::new();
        vars.insert("SSH_USER".into(), "dev".into());
        vars.insert("SSH_PASSWORD".into(), "pw".into());
        vars.insert("SSH_DIR".into(), temp.path().join("ssh").display().to_string());
        vars.insert(
            "RAILWAY_VOLUME_MOUNT_PATH".into(),
            temp.path().display().to_string(),
        );
        let config = Config::from_map(&vars).unwrap();

        let report = run(&config);
        assert_eq!(report.checks.len(), 4);
    }

    #[test]
    fn test_missing_volume_fails_check() {
        let temp = TempDir::new().unwrap();
        let result = check_volume(&temp.path().join("nope"));
        assert!(!result.passed);
    }

    #[test]
    fn test_key_dir_created_when_missing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("etc_ssh");
        let result = check_key_dir(&dir);
        assert!(result.passed);
        assert!(dir.is_dir());
    }
}
