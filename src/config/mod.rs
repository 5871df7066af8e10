//! Platform descriptors.
//!
//! The lowering consults the platform read-only: the thread-state register
//! width decides how many lanes `get_r0` yields, and the A32 pointer width
//! decides the integer type side-buffer addresses are built from.


use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Built-in platform names, in the order `--help` lists them.
pub const BUILTIN_PLATFORMS: [&str; 2] = ["xe-lp", "xe-hpc"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read platform config '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid platform name '{0}'")]
    InvalidName(String),
    #[error("unknown platform '{name}' (looked for '{looked_for}')")]
    Unknown { name: String, looked_for: String },
    #[error("platform '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

fn default_a32_pointer_bits() -> u32 {
    32
}

/// Target platform description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Short identifier used on the command line (e.g. "xe-hpc").
    pub name: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,
    /// Width of one general register file entry, which is also the width
    /// of the thread-state register.
    pub grf_size_bytes: u32,
    /// Integer width side-buffer addresses are formed in.
    #[serde(default = "default_a32_pointer_bits")]
    pub a32_pointer_bits: u32,
}

#[derive(Deserialize)]
struct PlatformFile {
    platform: PlatformConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::xe_lp()
    }
}

impl PlatformConfig {
    /// 32-byte GRF.
    pub fn xe_lp() -> Self {
        Self {
            name: "xe-lp".to_string(),
            display_name: "Xe-LP".to_string(),
            grf_size_bytes: 32,
            a32_pointer_bits: 32,
        }
    }

    /// 64-byte GRF.
    pub fn xe_hpc() -> Self {
        Self {
            name: "xe-hpc".to_string(),
            display_name: "Xe-HPC".to_string(),
            grf_size_bytes: 64,
            a32_pointer_bits: 32,
        }
    }

    /// Lanes of the thread-state vector.
    pub fn r0_lanes(&self) -> u32 {
        self.grf_size_bytes / 4
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            name: self.name.clone(),
            reason,
        };
        if self.grf_size_bytes == 0 || self.grf_size_bytes % 32 != 0 {
            return Err(invalid(format!(
                "grf_size_bytes must be a non-zero multiple of 32, got {}",
                self.grf_size_bytes
            )));
        }
        if !matches!(self.a32_pointer_bits, 32 | 64) {
            return Err(invalid(format!(
                "a32_pointer_bits must be 32 or 64, got {}",
                self.a32_pointer_bits
            )));
        }
        Ok(())
    }

    /// Load a platform from a TOML file with a `[platform]` table.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_toml(&content, path)
    }

    pub fn parse_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: PlatformFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = file.platform;
        if config.display_name.is_empty() {
            config.display_name = config.name.clone();
        }
        config.validate()?;
        Ok(config)
    }

    /// Resolve a platform by name: built-ins first, then
    /// `platforms/{name}.toml` next to the binary or in the working
    /// directory.
    pub fn resolve(name: &str) -> Result<Self, ConfigError> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
            || name.starts_with('.')
        {
            return Err(ConfigError::InvalidName(name.to_string()));
        }

        match name {
            "xe-lp" => return Ok(Self::xe_lp()),
            "xe-hpc" => return Ok(Self::xe_hpc()),
            _ => {}
        }

        let relative = format!("platforms/{}.toml", name);

        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                for base in dir.ancestors().take(3) {
                    let path = base.join(&relative);
                    if path.exists() {
                        return Self::load(&path);
                    }
                }
            }
        }

        let cwd_path = PathBuf::from(&relative);
        if cwd_path.exists() {
            return Self::load(&cwd_path);
        }

        Err(ConfigError::Unknown {
            name: name.to_string(),
            looked_for: relative,
        })
    }

    /// Interpret a command-line `--platform` value: a path to an existing
    /// `.toml` file, or a platform name.
    pub fn from_arg(arg: &str) -> Result<Self, ConfigError> {
        let path = Path::new(arg);
        if path.extension().is_some_and(|ext| ext == "toml") {
            return Self::load(path);
        }
        Self::resolve(arg)
    }
}
