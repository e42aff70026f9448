use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn vrrtest(config_dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_vrrtest"));
    command
        .env_remove("VRRTEST_CONFIG")
        .env("VRRTEST_CONFIG_DIR", config_dir)
        .env("RUST_LOG", "warn");
    command
}

#[test]
fn config_command_prints_defaults_without_a_file() {
    let root = TempDir::new().unwrap();

    let output = vrrtest(root.path())
        .arg("config")
        .output()
        .expect("failed to run vrrtest config");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("block_size = 16"), "{stdout}");
    assert!(stdout.contains("vrr = true"), "{stdout}");
    assert!(stdout.contains("visual_mode = \"none\""), "{stdout}");
    assert!(!root.path().join("config.toml").exists());
}

#[test]
fn config_command_layers_file_and_flags() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("config.toml"),
        "[renderer]\nblock_size = 32\nlogical_size = [512, 768]\nvisual_mode = \"row-column\"\n",
    )
    .unwrap();

    let output = vrrtest(root.path())
        .args(["--no-vrr", "--block-size", "8", "config"])
        .output()
        .expect("failed to run vrrtest config");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("block_size = 8"), "{stdout}");
    assert!(stdout.contains("vrr = false"), "{stdout}");
    assert!(stdout.contains("visual_mode = \"row-column\""), "{stdout}");
    assert!(stdout.contains("512"), "{stdout}");
}

#[test]
fn config_write_persists_the_resolved_file() {
    let root = TempDir::new().unwrap();
    let config_dir = root.path().join("config");

    let status = vrrtest(&config_dir)
        .args(["--visual", "block", "config", "--write"])
        .status()
        .expect("failed to run vrrtest config --write");
    assert!(status.success());

    let written = fs::read_to_string(config_dir.join("config.toml")).unwrap();
    assert!(written.contains("visual_mode = \"block\""), "{written}");

    // The written file is picked up on the next run.
    let output = vrrtest(&config_dir)
        .arg("config")
        .output()
        .expect("failed to rerun vrrtest config");
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout)
        .unwrap()
        .contains("visual_mode = \"block\""));
}

#[test]
fn invalid_configuration_fails_before_start_up() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("broken.toml");
    fs::write(&path, "[renderer]\nblock_size = 1000\n").unwrap();

    let output = vrrtest(root.path())
        .arg("--config")
        .arg(&path)
        .arg("config")
        .output()
        .expect("failed to run vrrtest");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("invalid configuration"), "{stderr}");
}
