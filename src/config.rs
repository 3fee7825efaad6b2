//! Orchestrator configuration.
//!
//! Everything the pipeline needs to know about its environment is carried in
//! an [`OrchestratorConfig`] handed to [`crate::Orchestrator::new`]. Values
//! come from defaults, then an optional JSON file, then environment
//! overrides:
//!
//! | Variable          | Field                     |
//! |-------------------|---------------------------|
//! | `HCSRUN_CONFIG`   | path of the JSON file     |
//! | `HCSRUN_HOME`     | `driver.home_dir`         |
//! | `HCSRUN_NETWORK`  | `network`                 |
//! | `HCSRUN_COMMAND`  | `process.command_line`    |

use crate::constants::{
    DEFAULT_COMMAND_LINE, DEFAULT_HOME_DIR, DEFAULT_NETWORK, DEFAULT_OWNER, DEFAULT_SYSTEM_TYPE,
    DEFAULT_WORKING_DIRECTORY,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "HCSRUN_CONFIG";

/// Environment variable overriding the driver home directory.
pub const HOME_ENV: &str = "HCSRUN_HOME";

/// Environment variable overriding the virtual network name.
pub const NETWORK_ENV: &str = "HCSRUN_NETWORK";

/// Environment variable overriding the command line.
pub const COMMAND_ENV: &str = "HCSRUN_COMMAND";

// =============================================================================
// Storage Driver
// =============================================================================

/// Storage driver flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverFlavour {
    /// Plain directory copies.
    Vfs,
    /// Windows filter driver (copy-on-write).
    #[default]
    Filter,
}

impl DriverFlavour {
    /// Numeric flavour as the host storage API expects it.
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Vfs => 0,
            Self::Filter => 1,
        }
    }
}

/// Storage driver location and flavour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverInfo {
    /// Directory containing one folder per layer.
    pub home_dir: PathBuf,
    /// Driver flavour.
    pub flavour: DriverFlavour,
}

impl Default for DriverInfo {
    fn default() -> Self {
        Self {
            home_dir: PathBuf::from(DEFAULT_HOME_DIR),
            flavour: DriverFlavour::Filter,
        }
    }
}

impl DriverInfo {
    /// Creates driver info rooted at `home_dir`.
    pub fn new(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
            ..Self::default()
        }
    }
}

// =============================================================================
// Process
// =============================================================================

/// The single command run inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Full command line.
    pub command_line: String,
    /// Working directory inside the container.
    pub working_directory: String,
    /// Create a stdin pipe.
    pub create_std_in_pipe: bool,
    /// Create a stdout pipe.
    pub create_std_out_pipe: bool,
    /// Create a stderr pipe.
    pub create_std_err_pipe: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            command_line: DEFAULT_COMMAND_LINE.to_string(),
            working_directory: DEFAULT_WORKING_DIRECTORY.to_string(),
            create_std_in_pipe: false,
            create_std_out_pipe: false,
            create_std_err_pipe: false,
        }
    }
}

// =============================================================================
// Simulation
// =============================================================================

/// Settings for the in-process simulated host used by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Virtual networks registered with the simulated network service.
    pub networks: Vec<String>,
    /// Exit code reported for every simulated process.
    pub exit_code: i32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            networks: vec![DEFAULT_NETWORK.to_string()],
            exit_code: 0,
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Complete orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Storage driver location.
    pub driver: DriverInfo,
    /// Name of the virtual network to attach to.
    pub network: String,
    /// Owner label of created containers.
    pub owner: String,
    /// Host system type.
    pub system_type: String,
    /// Skip guest flushes while the container boots.
    pub ignore_flushes_during_boot: bool,
    /// Process run inside the container.
    pub process: ProcessConfig,
    /// Collect container statistics after start.
    pub collect_statistics: bool,
    /// Simulated host settings.
    pub simulation: SimulationConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            driver: DriverInfo::default(),
            network: DEFAULT_NETWORK.to_string(),
            owner: DEFAULT_OWNER.to_string(),
            system_type: DEFAULT_SYSTEM_TYPE.to_string(),
            ignore_flushes_during_boot: true,
            process: ProcessConfig::default(),
            collect_statistics: true,
            simulation: SimulationConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Loads configuration from a JSON file. Missing fields keep defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| Error::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Resolves configuration from file and process environment.
    ///
    /// An explicit `HCSRUN_CONFIG` must exist. The per-user default file is
    /// used only when present.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Returns the per-user configuration file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("hcsrun").join("config.json"))
    }

    /// Applies overrides looked up through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let value = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(home) = value(HOME_ENV) {
            debug!(home = %home, "Driver home overridden from environment");
            self.driver.home_dir = PathBuf::from(home);
        }
        if let Some(network) = value(NETWORK_ENV) {
            debug!(network = %network, "Network overridden from environment");
            self.network = network;
        }
        if let Some(command) = value(COMMAND_ENV) {
            debug!(command = %command, "Command line overridden from environment");
            self.process.command_line = command;
        }
    }

    /// Checks that every required value is present.
    pub fn validate(&self) -> Result<()> {
        if self.driver.home_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "driver home directory is empty".to_string(),
            ));
        }
        let required = [
            ("network", &self.network),
            ("owner", &self.owner),
            ("system type", &self.system_type),
            ("command line", &self.process.command_line),
            ("working directory", &self.process.working_directory),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{name} is empty")));
            }
        }
        Ok(())
    }
}
