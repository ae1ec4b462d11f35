//! SSH host key material model.
//!
//! A server's identity is the full set of host key pairs it presents: one
//! private/public pair per algorithm (RSA, ECDSA, Ed25519). This module
//! enumerates the fixed set of filenames sshd reads from its key directory
//! and the permission policy each file must carry after any copy.
//!
//! Losing even one private key rotates the identity for that algorithm's
//! negotiation path, so the persistence code in [`crate::identity`] always
//! works against this full enumerated set.

use std::path::Path;

/// Owner read/write only. Applied to every private key after every copy.
pub const PRIVATE_KEY_MODE: u32 = 0o600;

/// World-readable. Applied to every public key after every copy.
pub const PUBLIC_KEY_MODE: u32 = 0o644;

/// Marker file whose presence in the ephemeral directory means sshd has
/// finished generating keys. Gates the deferred backup.
pub const SENTINEL: &str = "ssh_host_rsa_key";

/// A single host key artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFile {
    /// Filename under the key directory (no path components).
    pub name: &'static str,
    /// Private keys are confidential; public keys are not.
    pub private: bool,
}

impl KeyFile {
    /// Permission bits this file must have after any copy, regardless of
    /// what the source had.
    pub fn mode(&self) -> u32 {
        if self.private {
            PRIVATE_KEY_MODE
        } else {
            PUBLIC_KEY_MODE
        }
    }
}

/// The complete enumerated host key set: three algorithms, one pair each.
pub const HOST_KEY_FILES: &[KeyFile] = &[
    KeyFile { name: "ssh_host_rsa_key", private: true },
    KeyFile { name: "ssh_host_rsa_key.pub", private: false },
    KeyFile { name: "ssh_host_ecdsa_key", private: true },
    KeyFile { name: "ssh_host_ecdsa_key.pub", private: false },
    KeyFile { name: "ssh_host_ed25519_key", private: true },
    KeyFile { name: "ssh_host_ed25519_key.pub", private: false },
];

/// Which of the enumerated key files exist in `dir`.
pub fn present_in(dir: &Path) -> Vec<KeyFile> {
    HOST_KEY_FILES
        .iter()
        .copied()
        .filter(|k| dir.join(k.name).is_file())
        .collect()
}

/// True if every file in the enumerated set exists in `dir`.
pub fn set_is_complete(dir: &Path) -> bool {
    HOST_KEY_FILES.iter().all(|k| dir.join(k.name).is_file())
}

/// Names of the enumerated key files missing from `dir`.
pub fn missing_from(dir: &Path) -> Vec<&'static str> {
    HOST_KEY_FILES
        .iter()
        .filter(|k| !dir.join(k.name).is_file())
        .map(|k| k.name)
        .collect()
}
