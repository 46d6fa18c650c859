//! Harness configuration from `fj.toml`, the environment and flags.
//!
//! Later layers win: built-in defaults, then the config file, then
//! `FJ_VERBOSE` / `FJ_DUMP_ASM`, then command-line switches.

use crate::{CliError, Result};
use fj_harness::HarnessOptions;
use fj_jit::{OptLevel, TargetOptions};
use serde::Deserialize;
use std::path::Path;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "fj.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub harness: HarnessConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub verbose: Option<bool>,
    pub dump_asm: Option<bool>,
    pub filter: Option<String>,
    pub opt_level: Option<OptLevel>,
    pub verifier: Option<bool>,
    pub color: Option<bool>,
}

/// Switches given on the command line. `false` / `None` leave the lower
/// layers alone.
#[derive(Debug, Clone, Default)]
pub struct FlagOverrides {
    pub verbose: bool,
    pub dump_asm: bool,
    pub filter: Option<String>,
    pub opt_level: Option<OptLevel>,
    pub no_verifier: bool,
    pub no_color: bool,
}

/// Values read from `FJ_*` variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvOverrides {
    pub verbose: Option<bool>,
    pub dump_asm: Option<bool>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            verbose: fj_core::config::verbose_from_env(),
            dump_asm: fj_core::config::dump_asm_from_env(),
        }
    }
}

impl CliConfig {
    /// Loads `config_path`, or `fj.toml` if it exists, or the defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.is_file() {
                    Self::load_from_file(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;
        Self::parse(&content)
            .map_err(|e| CliError::Config(format!("Failed to parse config file {}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn harness_options(&self, env: EnvOverrides, flags: &FlagOverrides, color: bool) -> HarnessOptions {
        let file = &self.harness;
        let defaults = TargetOptions::default();

        let verbose = flags.verbose || env.verbose.or(file.verbose).unwrap_or(false);
        let dump_asm = flags.dump_asm || env.dump_asm.or(file.dump_asm).unwrap_or(false);
        let filter = flags.filter.clone().or_else(|| file.filter.clone());
        let opt_level = flags.opt_level.or(file.opt_level).unwrap_or(defaults.opt_level);
        let verifier = !flags.no_verifier && file.verifier.unwrap_or(defaults.verifier);
        let color = !flags.no_color && file.color.unwrap_or(color);

        HarnessOptions {
            verbose,
            dump_asm,
            filter,
            color,
            target: TargetOptions {
                opt_level,
                verifier,
                ..defaults
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_harness_table() {
        let config = CliConfig::parse(
            r#"
            [harness]
            verbose = true
            filter = "Alloc"
            opt_level = "speed_and_size"
            "#,
        )
        .unwrap();
        assert_eq!(config.harness.verbose, Some(true));
        assert_eq!(config.harness.filter.as_deref(), Some("Alloc"));
        assert_eq!(config.harness.opt_level, Some(OptLevel::SpeedAndSize));
        assert_eq!(config.harness.dump_asm, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(CliConfig::parse("[harness]\nverbosity = 3\n").is_err());
    }

    #[test]
    fn layers_apply_in_order() {
        let config = CliConfig::parse("[harness]\nverbose = true\ndump_asm = true\nfilter = \"Jump\"\n").unwrap();

        let env = EnvOverrides {
            verbose: Some(false),
            dump_asm: None,
        };
        let options = config.harness_options(env, &FlagOverrides::default(), false);
        assert!(!options.verbose);
        assert!(options.dump_asm);
        assert_eq!(options.filter.as_deref(), Some("Jump"));

        let flags = FlagOverrides {
            verbose: true,
            filter: Some("Call".into()),
            no_verifier: true,
            ..FlagOverrides::default()
        };
        let options = config.harness_options(env, &flags, false);
        assert!(options.verbose);
        assert_eq!(options.filter.as_deref(), Some("Call"));
        assert!(!options.target.verifier);
    }

    #[test]
    fn missing_explicit_file_is_a_config_error() {
        let err = CliConfig::load(Some(Path::new("/nonexistent/fj.toml"))).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
