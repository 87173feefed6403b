use anyhow::{bail, Context, Result};
use mockport_core::{DataBits, FlowControl, Parity, SerialConfig, StopBits, DEFAULT_SEED};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk settings. Anything missing falls back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: String,
    pub stop_bits: u8,
    pub handshake: String,
    pub rts_enable: bool,
    pub seed: u64,
    /// Stop after this many seconds; run until Ctrl-C when unset.
    pub run_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port_name: "COM5".to_string(),
            baud_rate: 115_200,
            data_bits: 8,
            parity: "none".to_string(),
            stop_bits: 1,
            handshake: "none".to_string(),
            rts_enable: true,
            seed: DEFAULT_SEED,
            run_secs: None,
        }
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mockport").join("settings.json"))
}

impl Settings {
    /// Reads `path`, or the default location when `path` is `None`. A missing
    /// default file is not an error; a missing explicit file is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };
        if !explicit && !path.exists() {
            log::debug!("no settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings = serde_json::from_str(&text)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        log::info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn serial_config(&self) -> Result<SerialConfig> {
        let data_bits = match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            n => bail!("unsupported data bits: {n}"),
        };
        let parity = match self.parity.to_ascii_lowercase().as_str() {
            "none" => Parity::None,
            "odd" => Parity::Odd,
            "even" => Parity::Even,
            other => bail!("unsupported parity: {other}"),
        };
        let stop_bits = match self.stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            n => bail!("unsupported stop bits: {n}"),
        };
        let flow_control = match self.handshake.to_ascii_lowercase().as_str() {
            "none" => FlowControl::None,
            "software" => FlowControl::Software,
            "hardware" => FlowControl::Hardware,
            other => bail!("unsupported handshake: {other}"),
        };
        Ok(SerialConfig {
            port_name: self.port_name.clone(),
            baud_rate: self.baud_rate,
            data_bits,
            parity,
            stop_bits,
            flow_control,
            rts_enable: self.rts_enable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_map_to_conventional_port() {
        let cfg = Settings::default().serial_config().unwrap();
        assert_eq!(cfg.port_name, "COM5");
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.data_bits, DataBits::Eight);
        assert_eq!(cfg.parity, Parity::None);
        assert_eq!(cfg.stop_bits, StopBits::One);
        assert_eq!(cfg.flow_control, FlowControl::None);
        assert!(cfg.rts_enable);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port_name": "/dev/ttyUSB1", "parity": "Even", "seed": 9}}"#).unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.port_name, "/dev/ttyUSB1");
        assert_eq!(settings.seed, 9);
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.serial_config().unwrap().parity, Parity::Even);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(dir.path().join("nope.json").as_path())).unwrap_err();
        assert!(err.to_string().contains("reading settings"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("parsing settings"));
    }

    #[test]
    fn rejects_unknown_values() {
        let settings = Settings {
            data_bits: 9,
            ..Default::default()
        };
        assert!(settings.serial_config().is_err());

        let settings = Settings {
            handshake: "xon".to_string(),
            ..Default::default()
        };
        assert!(settings.serial_config().is_err());
    }
}
