//! CLI contract tests: argument handling and device-free commands.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write as _;

const PAYLOAD_SIZE: usize = 0x10_0000;

fn ktdpflash() -> Command {
    let mut cmd = Command::cargo_bin("ktdpflash").unwrap();
    cmd.env_remove("KTDPFLASH_DEVICE").env_remove("KTDPFLASH_CHIP");
    cmd
}

/// A syntactically valid update file: 1 MiB payload plus a driver tail.
fn write_update_file(driver_len: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&vec![0u8; PAYLOAD_SIZE]).unwrap();
    file.write_all(&vec![0xDD; driver_len]).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_help_lists_subcommands() {
    ktdpflash()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("update")
                .and(predicate::str::contains("probe"))
                .and(predicate::str::contains("bank"))
                .and(predicate::str::contains("forward"))
                .and(predicate::str::contains("completions")),
        );
}

#[test]
fn test_version_flag() {
    ktdpflash()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ktdpflash"));
}

#[test]
fn test_completions_bash_emits_script() {
    ktdpflash()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ktdpflash"));
}

#[test]
fn test_info_json_reports_driver_size() {
    let file = write_update_file(300);
    ktdpflash()
        .args(["info", "--json"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"isp_driver_size\": 300")
                .and(predicate::str::contains("\"xip_enabled\": false")),
        );
}

#[test]
fn test_info_rejects_truncated_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0u8; 100]).unwrap();
    file.flush().unwrap();

    ktdpflash()
        .arg("info")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid firmware file"));
}

#[test]
fn test_update_missing_file_fails() {
    ktdpflash()
        .args(["update", "/nonexistent/firmware.bin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read firmware file"));
}

#[test]
fn test_unknown_chip_rejected() {
    ktdpflash()
        .args(["--chip", "wildcat", "bank"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_forward_port_out_of_range_rejected() {
    ktdpflash().args(["forward", "5"]).assert().failure();
}

#[test]
fn test_list_json_outputs_array() {
    ktdpflash()
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("["));
}
