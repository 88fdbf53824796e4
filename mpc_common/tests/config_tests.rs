//! Loading the shipped bridge configuration.
//!
//! Both processes read `config/bridge.toml` at the workspace root; these tests
//! keep that file parseable and consistent with the compiled capacities.

use mpc_common::config::{load_bridge_config, BridgeConfig, ConfigError, ConfigLoader};
use mpc_common::consts::MAX_JOINTS;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn shipped_config() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("config")
        .join("bridge.toml")
}

#[test]
fn test_shipped_config_is_valid() {
    let config = load_bridge_config(&shipped_config()).unwrap();
    let dims = config.dims().unwrap();
    assert_eq!(dims.joint_count(), 7);
    assert_eq!(dims.state_dim(), 14);
    assert!(config.ocp.time_step > 0.0);
}

#[test]
fn test_missing_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let result = load_bridge_config(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound)));
}

#[test]
fn test_raw_load_skips_semantic_validation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bridge.toml");
    fs::write(
        &path,
        r#"
[shared]
service_name = "arm"

[robot]
joint_names = []
"#,
    )
    .unwrap();

    assert!(BridgeConfig::load(&path).is_ok());
    assert!(matches!(
        load_bridge_config(&path),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn test_joint_count_above_capacity_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bridge.toml");
    let names: Vec<String> = (0..=MAX_JOINTS).map(|i| format!("\"j{i}\"")).collect();
    fs::write(
        &path,
        format!(
            "[shared]\nservice_name = \"arm\"\n[robot]\njoint_names = [{}]\n",
            names.join(", ")
        ),
    )
    .unwrap();

    let err = load_bridge_config(&path).unwrap_err();
    assert!(err.to_string().contains("exceeds capacity"));
}
