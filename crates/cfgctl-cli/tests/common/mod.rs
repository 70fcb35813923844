#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub fn cli_bin() -> &'static str {
    env!("CARGO_BIN_EXE_cfgctl")
}

/// A `cfgctl` command with no cfgctl settings inherited from the environment
pub fn cfgctl(dir: &Path) -> Command {
    let mut cmd = Command::new(cli_bin());
    cmd.current_dir(dir)
        .env_remove("CFGCTL_DAEMON")
        .env_remove("CFGCTL_OPTIONS")
        .env_remove("CFGCTL_DB")
        .env_remove("CFGCTL_SCHEMA")
        .env_remove("RUST_LOG");
    cmd
}

pub fn setup_db() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("conf.db");
    (temp_dir, db_path)
}

pub fn run_ok(dir: &Path, db: &Path, args: &[&str]) -> String {
    let output = cfgctl(dir)
        .arg("--db")
        .arg(db)
        .args(args)
        .output()
        .expect("Failed to execute CLI");
    assert!(
        output.status.success(),
        "cfgctl {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
