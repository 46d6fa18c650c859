use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use fj_core::{Error, ErrorCode, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    #[default]
    None,
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_setting())
    }
}

impl FromStr for OptLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" | "0" => Ok(OptLevel::None),
            "speed" | "1" | "2" => Ok(OptLevel::Speed),
            "speed_and_size" | "3" => Ok(OptLevel::SpeedAndSize),
            other => Err(Error::from(format!("unknown optimization level `{other}`"))),
        }
    }
}

/// Code generation settings a runtime is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOptions {
    pub opt_level: OptLevel,
    pub verifier: bool,
    pub preserve_frame_pointers: bool,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::None,
            verifier: true,
            preserve_frame_pointers: false,
        }
    }
}

impl TargetOptions {
    /// Builds an ISA for the host machine.
    pub fn build_isa(&self) -> Result<OwnedTargetIsa> {
        let mut flags = settings::builder();
        set_flag(&mut flags, "opt_level", self.opt_level.as_setting())?;
        set_flag(&mut flags, "enable_verifier", bool_setting(self.verifier))?;
        set_flag(
            &mut flags,
            "preserve_frame_pointers",
            bool_setting(self.preserve_frame_pointers),
        )?;
        set_flag(&mut flags, "is_pic", "false")?;
        set_flag(&mut flags, "use_colocated_libcalls", "false")?;

        let isa_builder = cranelift_native::builder()
            .map_err(|msg| Error::runtime(ErrorCode::UnsupportedTarget, msg))?;
        isa_builder
            .finish(settings::Flags::new(flags))
            .map_err(|e| Error::runtime(ErrorCode::UnsupportedTarget, e.to_string()))
    }
}

fn set_flag(flags: &mut settings::Builder, name: &str, value: &str) -> Result<()> {
    flags
        .set(name, value)
        .map_err(|e| Error::runtime(ErrorCode::UnsupportedTarget, format!("{name}={value}: {e}")))
}

fn bool_setting(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

pub fn host_arch() -> &'static str {
    std::env::consts::ARCH
}

pub fn host_pointer_bits() -> usize {
    std::mem::size_of::<usize>() * 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opt_level_parses_names_and_numbers() {
        assert_eq!("speed".parse::<OptLevel>().expect("speed"), OptLevel::Speed);
        assert_eq!("0".parse::<OptLevel>().expect("0"), OptLevel::None);
        assert!("fast".parse::<OptLevel>().is_err());
    }

    #[test]
    fn host_isa_builds_with_defaults() {
        let isa = TargetOptions::default().build_isa().expect("host isa");
        assert_eq!(isa.pointer_bits() as usize, host_pointer_bits());
    }
}
