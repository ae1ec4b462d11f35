//! sshpod: container entrypoint for an SSH-accessible dev environment.
//!
//! Provisions a login user, lays out the persistent volume, keeps the SSH
//! daemon's host keys stable across container recreation, and runs sshd
//! as the foreground process.

pub mod config;
pub mod identity;
pub mod keys;
pub mod preflight;
pub mod process;
pub mod provision;
pub mod sshd;
pub mod storage;
