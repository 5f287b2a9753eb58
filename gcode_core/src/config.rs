//! Settings loading, validation, and hot-reload (§3, §9 supplement).
//!
//! Uses a shadow-config / `validate_reload_scope` / atomic-swap-with-
//! rollback pattern; the persisted record is
//! `gcode_common::settings::Settings` and the backing store is an
//! [`gcode_common::hal::NvramBackend`] collaborator instead of a second
//! TOML file.

use gcode_common::hal::consts::{N_STARTUP_LINE, STARTUP_LINE_LEN};
use gcode_common::hal::{Crc8, HalError, NvramBackend};
use gcode_common::settings::{Settings, SettingsError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(String),
    #[error("failed to parse settings TOML: {0}")]
    Parse(String),
    #[error("settings validation failed: {0}")]
    Validation(#[from] SettingsError),
    #[error("nvram error: {0}")]
    Nvram(#[from] HalError),
    #[error("nvram CRC mismatch at offset {offset}, restoring defaults")]
    CrcMismatch { offset: usize },
    #[error("ERR_RELOAD_SCOPE_VIOLATION: {0}")]
    ReloadScopeViolation(String),
}

/// Load settings from a TOML file on disk, validating on load (§1A).
pub fn load_settings_toml(path: &std::path::Path) -> Result<Settings, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
    let settings: Settings = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    settings.validate()?;
    Ok(settings)
}

/// Load the settings record from NVRAM, validating its CRC-8 against the
/// collaborator-provided checksum (§3: "failure to validate forces
/// restore-to-defaults").
///
/// Returns `Ok(Settings::default())` rather than an error on a CRC
/// mismatch per §7 "Fatal invariants ... restore defaults ... never
/// brick"; the mismatch is still reported via `tracing::warn!` by the
/// caller using the returned flag.
pub fn load_settings_nvram(
    backend: &dyn NvramBackend,
    crc: &dyn Crc8,
    offset: usize,
) -> Result<(Settings, bool), ConfigError> {
    use gcode_common::hal::consts::SETTINGS_RECORD_LEN;
    let mut bytes = backend.load_record(offset, SETTINGS_RECORD_LEN + 1)?;
    let stored_crc = bytes.pop().unwrap_or(0);
    let computed = crc.crc8(&bytes);
    if computed != stored_crc {
        return Ok((Settings::default(), true));
    }
    let text = String::from_utf8_lossy(&bytes);
    let text = text.trim_end_matches('\0');
    match toml::from_str::<Settings>(text) {
        Ok(settings) if settings.validate().is_ok() => Ok((settings, false)),
        _ => Ok((Settings::default(), true)),
    }
}

/// Persist the settings record to NVRAM with a collaborator-computed CRC-8
/// trailer appended. The serialized TOML is NUL-padded to
/// [`gcode_common::hal::consts::SETTINGS_RECORD_LEN`] so the record slot
/// has a fixed, known length regardless of the current field values.
pub fn store_settings_nvram(
    backend: &mut dyn NvramBackend,
    crc: &dyn Crc8,
    offset: usize,
    settings: &Settings,
) -> Result<(), ConfigError> {
    use gcode_common::hal::consts::SETTINGS_RECORD_LEN;
    let mut bytes = toml::to_string(settings)
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .into_bytes();
    if bytes.len() > SETTINGS_RECORD_LEN {
        return Err(ConfigError::Parse(format!(
            "serialized settings ({} bytes) exceed record length ({SETTINGS_RECORD_LEN})",
            bytes.len()
        )));
    }
    bytes.resize(SETTINGS_RECORD_LEN, 0);
    let checksum = crc.crc8(&bytes);
    bytes.push(checksum);
    backend.store_record(offset, &bytes)?;
    Ok(())
}

/// The two persisted startup lines (`$N0=`, `$N1=`), §9 supplement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupLines {
    pub lines: [String; N_STARTUP_LINE],
}

/// Load startup lines from NVRAM; a missing or oversized line is treated
/// as empty rather than rejected (§7: never brick on persisted state).
pub fn load_startup_lines(
    backend: &dyn NvramBackend,
    offset: usize,
) -> Result<StartupLines, ConfigError> {
    let mut lines = StartupLines::default();
    for (i, slot) in lines.lines.iter_mut().enumerate() {
        let raw = backend.load_record(offset + i * STARTUP_LINE_LEN, STARTUP_LINE_LEN)?;
        let text = String::from_utf8_lossy(&raw);
        *slot = text.trim_end_matches('\0').to_string();
    }
    Ok(lines)
}

/// Validate that a shadow [`Settings`] only changes reloadable fields
/// relative to the active one (§1A). Axis count in this record is fixed
/// at `N_AXIS`, so the only non-reloadable dimension is the homing cycle
/// topology (cycle mask count per phase) — changing which axes home
/// together changes the homing sequence contract and requires a restart.
pub fn validate_reload_scope(active: &Settings, shadow: &Settings) -> Result<(), ConfigError> {
    if active.homing_cycle_mask.len() != shadow.homing_cycle_mask.len() {
        return Err(ConfigError::ReloadScopeViolation(
            "homing cycle mask axis count changed (requires restart)".into(),
        ));
    }
    Ok(())
}

/// Result of an attempted hot-reload (§1A).
#[derive(Debug, PartialEq, Eq)]
pub enum ReloadResult {
    Success,
    ValidationFailed(String),
}

/// Parse, validate, scope-check, then atomically swap `active` for a new
/// settings record serialized as TOML (as would arrive over a `$RST=`
/// style settings-word write). On any failure `active` is left untouched.
pub fn atomic_settings_swap(active: &mut Settings, new_toml: &str) -> ReloadResult {
    let shadow: Settings = match toml::from_str(new_toml) {
        Ok(s) => s,
        Err(e) => return ReloadResult::ValidationFailed(format!("parse: {e}")),
    };
    if let Err(e) = shadow.validate() {
        return ReloadResult::ValidationFailed(format!("validation: {e}"));
    }
    if let Err(e) = validate_reload_scope(active, &shadow) {
        return ReloadResult::ValidationFailed(format!("{e}"));
    }
    *active = shadow;
    ReloadResult::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcode_common::settings::AxisSettings;

    struct MemBackend {
        bytes: std::collections::HashMap<usize, Vec<u8>>,
    }

    impl NvramBackend for MemBackend {
        fn load_record(&self, offset: usize, len: usize) -> Result<Vec<u8>, HalError> {
            let mut out = vec![0u8; len];
            if let Some(stored) = self.bytes.get(&offset) {
                let n = stored.len().min(len);
                out[..n].copy_from_slice(&stored[..n]);
            }
            Ok(out)
        }

        fn store_record(&mut self, offset: usize, bytes: &[u8]) -> Result<(), HalError> {
            self.bytes.insert(offset, bytes.to_vec());
            Ok(())
        }
    }

    struct IdentityCrc;
    impl Crc8 for IdentityCrc {
        fn crc8(&self, bytes: &[u8]) -> u8 {
            bytes.iter().fold(0u8, |acc, b| acc ^ b)
        }
    }

    #[test]
    fn store_then_load_nvram_round_trips() {
        let mut backend = MemBackend {
            bytes: Default::default(),
        };
        let crc = IdentityCrc;
        let mut settings = Settings::default();
        settings.axes[0] = AxisSettings {
            steps_per_mm: 320.0,
            ..settings.axes[0]
        };
        store_settings_nvram(&mut backend, &crc, 0, &settings).unwrap();
        let (loaded, mismatched) = load_settings_nvram(&backend, &crc, 0).unwrap();
        assert!(!mismatched);
        assert_eq!(loaded.axes[0].steps_per_mm, 320.0);
    }

    #[test]
    fn corrupt_nvram_restores_defaults() {
        let mut backend = MemBackend {
            bytes: Default::default(),
        };
        let crc = IdentityCrc;
        backend.store_record(0, &[1, 2, 3, 0xFFu8]).unwrap();
        let (loaded, mismatched) = load_settings_nvram(&backend, &crc, 0).unwrap();
        assert!(mismatched);
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn reload_accepts_in_scope_change() {
        let mut active = Settings::default();
        let mut shadow = active.clone();
        shadow.spindle_rpm_max = 2000.0;
        let toml_str = toml::to_string(&shadow).unwrap();
        assert_eq!(atomic_settings_swap(&mut active, &toml_str), ReloadResult::Success);
        assert_eq!(active.spindle_rpm_max, 2000.0);
    }

    #[test]
    fn reload_rejects_invalid_settings() {
        let mut active = Settings::default();
        let original = active.clone();
        let mut shadow = active.clone();
        shadow.spindle_rpm_min = 9000.0;
        let toml_str = toml::to_string(&shadow).unwrap();
        let result = atomic_settings_swap(&mut active, &toml_str);
        assert!(matches!(result, ReloadResult::ValidationFailed(_)));
        assert_eq!(active, original);
    }
}
