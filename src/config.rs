//! Service configuration, read from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_UPLOAD_ROOT: &str = "/var/www-uploads";
pub const DEFAULT_OUTPUT_ROOT: &str = "/tmp/nimbus-preview-cache";
pub const DEFAULT_RESOLUTION: u32 = 256;
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(15);
pub const DEFAULT_FONT_HARNESS: &str = "assets/font-harness.html";
pub const BASE_PORT: u16 = 8100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("Cannot resolve working directory: {0}")]
    WorkingDir(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub upload_root: PathBuf,
    pub output_root: PathBuf,
    pub temp_root: PathBuf,
    /// Width and height of every artifact, in pixels.
    pub resolution: u32,
    /// Liveness deadline for a job; pushed forward on progress.
    pub deadline: Duration,
    /// Absolute path of the font rendering harness page.
    pub font_harness: PathBuf,
    pub browser_no_sandbox: bool,
    pub port: u16,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            upload_root: PathBuf::from(DEFAULT_UPLOAD_ROOT),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            temp_root: std::env::temp_dir(),
            resolution: DEFAULT_RESOLUTION,
            deadline: DEFAULT_DEADLINE,
            font_harness: PathBuf::from(DEFAULT_FONT_HARNESS),
            browser_no_sandbox: false,
            port: BASE_PORT,
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &'static str,
    value: String,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value,
        })
}

fn parse_flag(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            expected: "a boolean",
            value,
        }),
    }
}

impl PreviewConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = lookup("PREVIEW_UPLOAD_ROOT") {
            config.upload_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("PREVIEW_OUTPUT_ROOT") {
            config.output_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("PREVIEW_TEMP_ROOT") {
            config.temp_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("PREVIEW_SIZE") {
            let size: u32 = parse_number("PREVIEW_SIZE", v.clone(), "a positive integer")?;
            if size == 0 || size > 4096 {
                return Err(ConfigError::Invalid {
                    key: "PREVIEW_SIZE",
                    expected: "between 1 and 4096",
                    value: v,
                });
            }
            config.resolution = size;
        }
        if let Some(v) = lookup("PREVIEW_DEADLINE_SECS") {
            let secs: u64 =
                parse_number("PREVIEW_DEADLINE_SECS", v.clone(), "a positive integer")?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key: "PREVIEW_DEADLINE_SECS",
                    expected: "a positive integer",
                    value: v,
                });
            }
            config.deadline = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("PREVIEW_FONT_HARNESS") {
            config.font_harness = PathBuf::from(v);
        }
        if let Some(v) = lookup("PREVIEW_BROWSER_NO_SANDBOX") {
            config.browser_no_sandbox = parse_flag("PREVIEW_BROWSER_NO_SANDBOX", v)?;
        }
        if let Some(v) = lookup("PREVIEW_INSTANCE") {
            let instance: u16 = parse_number("PREVIEW_INSTANCE", v.clone(), "a small integer")?;
            config.port = BASE_PORT
                .checked_add(instance)
                .ok_or(ConfigError::Invalid {
                    key: "PREVIEW_INSTANCE",
                    expected: "a small integer",
                    value: v,
                })?;
        }

        if config.font_harness.is_relative() {
            config.font_harness = std::env::current_dir()?.join(&config.font_harness);
        }
        Ok(config)
    }

    /// Upload location for an identifier. The identifier is joined verbatim.
    pub fn upload_path(&self, file_id: &str) -> PathBuf {
        self.upload_root.join(file_id)
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_service_contract() {
        let config = PreviewConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.upload_root, PathBuf::from("/var/www-uploads"));
        assert_eq!(config.resolution, 256);
        assert_eq!(config.deadline, Duration::from_secs(15));
        assert_eq!(config.port, 8100);
        assert!(config.font_harness.is_absolute());
        assert!(config.font_harness.ends_with("assets/font-harness.html"));
    }

    #[test]
    fn instance_offsets_port() {
        let config = PreviewConfig::from_lookup(lookup(&[("PREVIEW_INSTANCE", "3")])).unwrap();
        assert_eq!(config.port, 8103);
    }

    #[test]
    fn overrides_apply() {
        let config = PreviewConfig::from_lookup(lookup(&[
            ("PREVIEW_UPLOAD_ROOT", "/srv/up"),
            ("PREVIEW_OUTPUT_ROOT", "/srv/out"),
            ("PREVIEW_SIZE", "128"),
            ("PREVIEW_DEADLINE_SECS", "5"),
            ("PREVIEW_FONT_HARNESS", "/srv/harness.html"),
            ("PREVIEW_BROWSER_NO_SANDBOX", "yes"),
        ]))
        .unwrap();
        assert_eq!(config.upload_path("a.png"), PathBuf::from("/srv/up/a.png"));
        assert_eq!(config.output_root(), Path::new("/srv/out"));
        assert_eq!(config.resolution, 128);
        assert_eq!(config.deadline, Duration::from_secs(5));
        assert_eq!(config.font_harness, PathBuf::from("/srv/harness.html"));
        assert!(config.browser_no_sandbox);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = PreviewConfig::from_lookup(lookup(&[("PREVIEW_SIZE", "big")])).unwrap_err();
        assert!(err.to_string().contains("PREVIEW_SIZE"));
        assert!(PreviewConfig::from_lookup(lookup(&[("PREVIEW_SIZE", "0")])).is_err());
        assert!(PreviewConfig::from_lookup(lookup(&[("PREVIEW_DEADLINE_SECS", "0")])).is_err());
        assert!(
            PreviewConfig::from_lookup(lookup(&[("PREVIEW_BROWSER_NO_SANDBOX", "maybe")]))
                .is_err()
        );
        assert!(PreviewConfig::from_lookup(lookup(&[("PREVIEW_INSTANCE", "65000")])).is_err());
    }
}
