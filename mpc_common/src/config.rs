//! Configuration loading traits and types.
//!
//! Both the controller and the solver process read the same TOML file so they
//! agree on joint count, OCP time step and segment name before attaching to
//! the shared segment.
//!
//! # Usage
//!
//! ```rust,no_run
//! use mpc_common::config::{ConfigLoader, SharedConfig, ConfigError};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct MyAppConfig {
//!     shared: SharedConfig,
//!     port: u16,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = MyAppConfig::load(Path::new("config.toml"))?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::consts::{
    DEFAULT_CYCLE_TIME_US, DEFAULT_OCP_TIME_STEP, DEFAULT_SEGMENT_NAME, DEFAULT_SOLVER_FREQUENCY,
    DEFAULT_TARGET, TARGET_DIM,
};
use crate::law::Dimensions;

/// Error type for configuration loading operations.
///
/// This enum represents all possible errors that can occur when loading
/// configuration files.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Represents the verbosity level of logging output.
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

/// Common configuration fields shared by both processes.
///
/// This struct should be embedded in application-specific configuration
/// structs to provide consistent base configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "mpc-solver"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// This trait provides a default implementation that works with any type
/// implementing `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
/// - Returns `ConfigError::ValidationError` if semantic validation fails
///
/// # Example
///
/// ```rust,no_run
/// use mpc_common::config::{ConfigLoader, SharedConfig, ConfigError};
/// use serde::Deserialize;
/// use std::path::Path;
///
/// #[derive(Debug, Deserialize)]
/// struct AppConfig {
///     shared: SharedConfig,
/// }
///
/// fn main() -> Result<(), ConfigError> {
///     let config = AppConfig::load(Path::new("config.toml"))?;
///     Ok(())
/// }
/// ```
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - Successfully loaded and parsed configuration
    /// * `Err(ConfigError)` - Loading or parsing failed
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
// This allows any serde-deserializable struct to use ConfigLoader.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

/// Command channels written to the hardware each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommandMode {
    /// Full affine law evaluated here, effort only.
    #[default]
    Effort,
    /// Position/velocity/effort references plus diagonal gains for a
    /// downstream joint controller.
    Chained,
}

/// What the controller emits while no usable law is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SafeCommandPolicy {
    /// Zero effort on every joint.
    #[default]
    ZeroEffort,
    /// Repeat the last command issued from a valid law (zero before the first).
    HoldLast,
}

/// `[segment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Shared segment name.
    #[serde(default = "default_segment_name")]
    pub name: String,
    /// Unlink a leftover segment whose owner processes are all dead.
    #[serde(default = "default_true")]
    pub clear_stale: bool,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            name: default_segment_name(),
            clear_stale: true,
        }
    }
}

/// `[robot]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Actuated joints, in state-vector order.
    pub joint_names: Vec<String>,
    /// URDF published by the solver at startup.
    #[serde(default)]
    pub description_path: Option<PathBuf>,
}

/// `[ocp]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcpConfig {
    /// Time between OCP nodes [s]; also the interpolation horizon.
    #[serde(default = "default_time_step")]
    pub time_step: f64,
    /// Number of OCP nodes.
    #[serde(default = "default_horizon_length")]
    pub horizon_length: usize,
    /// Maximum solver iterations per solve.
    #[serde(default = "default_solver_iterations")]
    pub solver_iterations: usize,
    /// Solver loop rate [Hz].
    #[serde(default = "default_solver_frequency")]
    pub solver_frequency: f64,
}

impl Default for OcpConfig {
    fn default() -> Self {
        Self {
            time_step: default_time_step(),
            horizon_length: default_horizon_length(),
            solver_iterations: default_solver_iterations(),
            solver_frequency: default_solver_frequency(),
        }
    }
}

/// `[controller]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Control period [µs].
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u64,
    /// Command channels.
    #[serde(default)]
    pub command_mode: CommandMode,
    /// Output while no usable law exists.
    #[serde(default)]
    pub safe_command: SafeCommandPolicy,
    /// Law age, in OCP steps, above which a tick is counted as stale.
    #[serde(default = "default_stale_after_steps")]
    pub stale_after_steps: f64,
    /// Ticks between statistics log lines.
    #[serde(default = "default_stats_log_interval")]
    pub stats_log_interval: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cycle_time_us: default_cycle_time_us(),
            command_mode: CommandMode::default(),
            safe_command: SafeCommandPolicy::default(),
            stale_after_steps: default_stale_after_steps(),
            stats_log_interval: default_stats_log_interval(),
        }
    }
}

/// `[friction]` section. Coefficients are per joint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrictionConfig {
    /// Add the friction correction to the commanded effort.
    #[serde(default)]
    pub enabled: bool,
    /// Coulomb friction [Nm].
    #[serde(default)]
    pub static_friction: Vec<f64>,
    /// Viscous friction [Nm·s/rad].
    #[serde(default)]
    pub viscous_friction: Vec<f64>,
    /// Motor torque constants [Nm/A]; empty keeps the command in Nm.
    #[serde(default)]
    pub torque_constant: Vec<f64>,
}

/// `[target]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Target written before any external command arrives.
    #[serde(default = "default_target")]
    pub initial: [f64; TARGET_DIM],
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            initial: DEFAULT_TARGET,
        }
    }
}

/// `[telemetry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Emit telemetry records.
    #[serde(default)]
    pub enabled: bool,
    /// CSV output file.
    #[serde(default = "default_telemetry_path")]
    pub path: PathBuf,
    /// Emit one record every N ticks.
    #[serde(default = "default_decimation")]
    pub decimation: u32,
    /// Records buffered before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_telemetry_path(),
            decimation: default_decimation(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// `[solver]` section: gains of the built-in posture regulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSolverConfig {
    /// Position gain on the diagonal of `Ks`.
    #[serde(default = "default_position_gain")]
    pub position_gain: f64,
    /// Velocity gain on the diagonal of `Ks`.
    #[serde(default = "default_velocity_gain")]
    pub velocity_gain: f64,
    /// Posture to hold; the first measured posture when absent.
    #[serde(default)]
    pub posture: Option<Vec<f64>>,
}

impl Default for ReferenceSolverConfig {
    fn default() -> Self {
        Self {
            position_gain: default_position_gain(),
            velocity_gain: default_velocity_gain(),
            posture: None,
        }
    }
}

/// Complete configuration shared by the controller and the solver.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "tiago-arm"
///
/// [robot]
/// joint_names = ["arm_1_joint", "arm_2_joint"]
///
/// [ocp]
/// time_step = 0.01
/// solver_frequency = 200.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Logging and identification.
    pub shared: SharedConfig,
    /// Shared segment.
    #[serde(default)]
    pub segment: SegmentConfig,
    /// Robot joints and description.
    pub robot: RobotConfig,
    /// OCP timing.
    #[serde(default)]
    pub ocp: OcpConfig,
    /// Controller loop.
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Friction compensation.
    #[serde(default)]
    pub friction: FrictionConfig,
    /// Initial target.
    #[serde(default)]
    pub target: TargetConfig,
    /// Telemetry output.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Built-in solver gains.
    #[serde(default)]
    pub solver: ReferenceSolverConfig,
}

impl BridgeConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Joint count and state dimension.
    pub fn dims(&self) -> Result<Dimensions, ConfigError> {
        Dimensions::new(self.robot.joint_names.len())
            .map_err(|e| ConfigError::ValidationError(format!("robot.joint_names: {e}")))
    }

    /// Semantic validation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - the joint list is empty, too long or has duplicates
    /// - any period, time step or rate is not strictly positive
    /// - friction coefficient vectors do not match the joint count
    /// - the reference posture does not match the joint count
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        let n = self.dims()?.joint_count();

        for (i, name) in self.robot.joint_names.iter().enumerate() {
            if self.robot.joint_names[..i].contains(name) {
                return Err(ConfigError::ValidationError(format!(
                    "robot.joint_names: duplicate joint '{name}'"
                )));
            }
        }
        if self.segment.name.is_empty() || self.segment.name.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "segment.name '{}' must be non-empty and contain no '/'",
                self.segment.name
            )));
        }
        if !(self.ocp.time_step > 0.0) {
            return Err(ConfigError::ValidationError(
                "ocp.time_step must be > 0".to_string(),
            ));
        }
        if !(self.ocp.solver_frequency > 0.0) {
            return Err(ConfigError::ValidationError(
                "ocp.solver_frequency must be > 0".to_string(),
            ));
        }
        if self.ocp.horizon_length < 2 {
            return Err(ConfigError::ValidationError(
                "ocp.horizon_length must be >= 2".to_string(),
            ));
        }
        if self.controller.cycle_time_us == 0 {
            return Err(ConfigError::ValidationError(
                "controller.cycle_time_us must be > 0".to_string(),
            ));
        }
        if !(self.controller.stale_after_steps >= 1.0) {
            return Err(ConfigError::ValidationError(
                "controller.stale_after_steps must be >= 1".to_string(),
            ));
        }
        if self.friction.enabled {
            check_joint_vector("friction.static_friction", &self.friction.static_friction, n)?;
            check_joint_vector("friction.viscous_friction", &self.friction.viscous_friction, n)?;
            if !self.friction.torque_constant.is_empty() {
                check_joint_vector("friction.torque_constant", &self.friction.torque_constant, n)?;
                if self.friction.torque_constant.iter().any(|k| *k == 0.0) {
                    return Err(ConfigError::ValidationError(
                        "friction.torque_constant entries must be non-zero".to_string(),
                    ));
                }
            }
        }
        if let Some(posture) = &self.solver.posture {
            check_joint_vector("solver.posture", posture, n)?;
        }
        if self.telemetry.enabled && (self.telemetry.decimation == 0 || self.telemetry.queue_capacity == 0) {
            return Err(ConfigError::ValidationError(
                "telemetry.decimation and telemetry.queue_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_joint_vector(field: &str, values: &[f64], joints: usize) -> Result<(), ConfigError> {
    if values.len() != joints {
        return Err(ConfigError::ValidationError(format!(
            "{field}: expected {joints} values, got {}",
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ConfigError::ValidationError(format!(
            "{field}: values must be finite"
        )));
    }
    Ok(())
}

/// Load and validate a [`BridgeConfig`] from a TOML file.
pub fn load_bridge_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let config = BridgeConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

fn default_segment_name() -> String {
    DEFAULT_SEGMENT_NAME.to_string()
}
fn default_true() -> bool {
    true
}
fn default_time_step() -> f64 {
    DEFAULT_OCP_TIME_STEP
}
fn default_horizon_length() -> usize {
    10
}
fn default_solver_iterations() -> usize {
    1
}
fn default_solver_frequency() -> f64 {
    DEFAULT_SOLVER_FREQUENCY
}
fn default_cycle_time_us() -> u64 {
    DEFAULT_CYCLE_TIME_US
}
fn default_stale_after_steps() -> f64 {
    2.0
}
fn default_stats_log_interval() -> u64 {
    5000
}
fn default_target() -> [f64; TARGET_DIM] {
    DEFAULT_TARGET
}
fn default_telemetry_path() -> PathBuf {
    PathBuf::from("mpc_telemetry.csv")
}
fn default_decimation() -> u32 {
    10
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_position_gain() -> f64 {
    100.0
}
fn default_velocity_gain() -> f64 {
    10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    fn test_log_level_deserialization() {
        // Test deserialization within a struct (TOML requires a table)
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"trace\"")
                .unwrap()
                .level,
            LogLevel::Trace
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"debug\"")
                .unwrap()
                .level,
            LogLevel::Debug
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"info\"")
                .unwrap()
                .level,
            LogLevel::Info
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"warn\"")
                .unwrap()
                .level,
            LogLevel::Warn
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"error\"")
                .unwrap()
                .level,
            LogLevel::Error
        );
    }

    #[test]
    fn test_shared_config_validation_success() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "test-service".to_string(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        let result = config.validate();
        assert!(result.is_err());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_config_loader_file_not_found() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct TestConfig {
            value: String,
        }

        let result = TestConfig::load(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct TestConfig {
            value: String,
        }

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = TestConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_config_loader_success() {
        #[derive(Debug, Deserialize)]
        struct TestConfig {
            shared: SharedConfig,
            port: u16,
        }

        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"port = 8080

[shared]
log_level = "debug"
service_name = "test-service"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = TestConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.shared.service_name, "test-service");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_shared_config_default_log_level() {
        #[derive(Debug, Deserialize)]
        struct TestConfig {
            shared: SharedConfig,
        }

        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
service_name = "test-service"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = TestConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Info); // Default
    }

    const MINIMAL: &str = r#"
[shared]
service_name = "tiago-arm"

[robot]
joint_names = ["arm_1_joint", "arm_2_joint", "arm_3_joint"]
"#;

    #[test]
    fn test_bridge_config_defaults() {
        let config = BridgeConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.dims().unwrap().state_dim(), 6);
        assert_eq!(config.segment.name, DEFAULT_SEGMENT_NAME);
        assert!(config.segment.clear_stale);
        assert_eq!(config.ocp.time_step, DEFAULT_OCP_TIME_STEP);
        assert_eq!(config.controller.cycle_time_us, DEFAULT_CYCLE_TIME_US);
        assert_eq!(config.controller.command_mode, CommandMode::Effort);
        assert_eq!(config.controller.safe_command, SafeCommandPolicy::ZeroEffort);
        assert_eq!(config.target.initial, DEFAULT_TARGET);
        assert!(!config.friction.enabled);
        assert!(!config.telemetry.enabled);
        assert!(config.solver.posture.is_none());
    }

    #[test]
    fn test_bridge_config_full_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{MINIMAL}
[segment]
name = "bench_shm"
clear_stale = false

[ocp]
time_step = 0.02
solver_frequency = 100.0

[controller]
cycle_time_us = 2000
command_mode = "chained"
safe_command = "hold_last"

[friction]
enabled = true
static_friction = [0.1, 0.2, 0.3]
viscous_friction = [0.01, 0.02, 0.03]
torque_constant = [0.1, 0.1, 0.1]

[target]
initial = [0.5, 0.1, 0.9]

[solver]
posture = [0.0, 1.0, 0.5]
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = load_bridge_config(file.path()).unwrap();
        assert_eq!(config.segment.name, "bench_shm");
        assert!(!config.segment.clear_stale);
        assert_eq!(config.ocp.time_step, 0.02);
        assert_eq!(config.controller.command_mode, CommandMode::Chained);
        assert_eq!(config.controller.safe_command, SafeCommandPolicy::HoldLast);
        assert_eq!(config.friction.torque_constant.len(), 3);
        assert_eq!(config.target.initial, [0.5, 0.1, 0.9]);
        assert_eq!(config.solver.posture.as_deref(), Some(&[0.0, 1.0, 0.5][..]));
    }

    #[test]
    fn test_bridge_config_rejects_friction_length_mismatch() {
        let text = format!(
            "{MINIMAL}\n[friction]\nenabled = true\nstatic_friction = [0.1]\nviscous_friction = [0.0, 0.0, 0.0]\n"
        );
        let result = BridgeConfig::from_toml(&text);
        assert!(matches!(result, Err(ConfigError::ValidationError(msg)) if msg.contains("static_friction")));
    }

    #[test]
    fn test_bridge_config_ignores_friction_when_disabled() {
        let text = format!("{MINIMAL}\n[friction]\nstatic_friction = [0.1]\n");
        assert!(BridgeConfig::from_toml(&text).is_ok());
    }

    #[test]
    fn test_bridge_config_rejects_empty_joint_list() {
        let text = "[shared]\nservice_name = \"x\"\n[robot]\njoint_names = []\n";
        assert!(matches!(
            BridgeConfig::from_toml(text),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_bridge_config_rejects_duplicate_joint() {
        let text = "[shared]\nservice_name = \"x\"\n[robot]\njoint_names = [\"a\", \"a\"]\n";
        assert!(matches!(
            BridgeConfig::from_toml(text),
            Err(ConfigError::ValidationError(msg)) if msg.contains("duplicate")
        ));
    }

    #[test]
    fn test_bridge_config_rejects_non_positive_time_step() {
        let text = format!("{MINIMAL}\n[ocp]\ntime_step = 0.0\n");
        assert!(matches!(
            BridgeConfig::from_toml(&text),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_bridge_config_rejects_bad_posture() {
        let text = format!("{MINIMAL}\n[solver]\nposture = [0.0]\n");
        assert!(BridgeConfig::from_toml(&text).is_err());
    }

    #[test]
    fn test_bridge_config_rejects_unknown_command_mode() {
        let text = format!("{MINIMAL}\n[controller]\ncommand_mode = \"torque\"\n");
        assert!(matches!(
            BridgeConfig::from_toml(&text),
            Err(ConfigError::ParseError(_))
        ));
    }
}
