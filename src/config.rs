use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::scale::ScalePreset;
use crate::phrase::tintinnabuli::TintinMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "EngineConfig::default_root_hz")]
    pub root_hz: f32,
    #[serde(default = "EngineConfig::default_scale")]
    pub scale: ScalePreset,
    #[serde(default = "EngineConfig::default_tempo_bpm")]
    pub tempo_bpm: f32,
    #[serde(default = "EngineConfig::default_drone")]
    pub drone: bool,
    #[serde(default)]
    pub tintinnabuli: TintinnabuliConfig,
}

impl EngineConfig {
    fn default_root_hz() -> f32 {
        110.0
    }
    fn default_scale() -> ScalePreset {
        ScalePreset::JustDiatonic
    }
    fn default_tempo_bpm() -> f32 {
        72.0
    }
    fn default_drone() -> bool {
        true
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root_hz: Self::default_root_hz(),
            scale: Self::default_scale(),
            tempo_bpm: Self::default_tempo_bpm(),
            drone: Self::default_drone(),
            tintinnabuli: TintinnabuliConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TintinnabuliConfig {
    #[serde(default = "TintinnabuliConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "TintinnabuliConfig::default_mode")]
    pub mode: TintinMode,
}

impl TintinnabuliConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_mode() -> TintinMode {
        TintinMode::Alternating
    }

    pub fn as_mode(&self) -> Option<TintinMode> {
        self.enabled.then_some(self.mode)
    }
}

impl Default for TintinnabuliConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            mode: Self::default_mode(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KrellConfig {
    #[serde(default = "KrellConfig::default_density")]
    pub density: f32,
    #[serde(default = "KrellConfig::default_base_interval_sec")]
    pub base_interval_sec: f64,
}

impl KrellConfig {
    fn default_density() -> f32 {
        0.65
    }
    fn default_base_interval_sec() -> f64 {
        2.5
    }
}

impl Default for KrellConfig {
    fn default() -> Self {
        Self {
            density: Self::default_density(),
            base_interval_sec: Self::default_base_interval_sec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhraseConfig {
    #[serde(default = "PhraseConfig::default_harmony")]
    pub harmony: f32,
    #[serde(default = "PhraseConfig::default_minimalism")]
    pub minimalism: f32,
}

impl PhraseConfig {
    fn default_harmony() -> f32 {
        0.5
    }
    fn default_minimalism() -> f32 {
        0.3
    }
}

impl Default for PhraseConfig {
    fn default() -> Self {
        Self {
            harmony: Self::default_harmony(),
            minimalism: Self::default_minimalism(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "ListenerConfig::default_target_level")]
    pub target_level: f32,
    #[serde(default = "ListenerConfig::default_smoothing")]
    pub smoothing: f32,
}

impl ListenerConfig {
    fn default_target_level() -> f32 {
        1.4
    }
    fn default_smoothing() -> f32 {
        0.1
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            target_level: Self::default_target_level(),
            smoothing: Self::default_smoothing(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub krell: KrellConfig,
    #[serde(default)]
    pub phrase: PhraseConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
}

impl AppConfig {
    fn format_f32_compact(x: f32) -> String {
        let mut s = format!("{:.6}", x);
        while s.contains('.') && s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        if s.is_empty() { "0".to_string() } else { s }
    }

    pub fn load_or_default(path: &str) -> Self {
        let path_obj = Path::new(path);
        if path_obj.exists() {
            match fs::read_to_string(path_obj) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(cfg) => return cfg,
                    Err(err) => {
                        eprintln!("Failed to parse config {path}: {err}. Using defaults.");
                    }
                },
                Err(err) => {
                    eprintln!("Failed to read config {path}: {err}. Using defaults.");
                }
            }
            return Self::default();
        }

        // File does not exist: write commented defaults and return them.
        let default_cfg = Self::default();
        if let Ok(text) = toml::to_string_pretty(&default_cfg) {
            let mut commented = String::new();
            for line in text.lines() {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    commented.push('\n');
                } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
                    commented.push_str(line);
                    commented.push('\n');
                } else {
                    let mut out_line = line.to_string();
                    if let Some((lhs, rhs)) = line.split_once('=') {
                        let rhs_trim = rhs.trim();
                        let has_decimal = rhs_trim.contains('.');
                        if has_decimal
                            && !rhs_trim.contains('"')
                            && rhs_trim != "true"
                            && rhs_trim != "false"
                            && let Ok(val) = rhs_trim.parse::<f32>()
                        {
                            let mut formatted = Self::format_f32_compact(val);
                            if !formatted.contains('.') {
                                formatted.push_str(".0");
                            }
                            out_line = format!("{} = {}", lhs.trim(), formatted);
                        }
                    }
                    commented.push_str("# ");
                    commented.push_str(&out_line);
                    commented.push('\n');
                }
            }
            if let Err(err) = fs::write(path_obj, commented) {
                eprintln!("Failed to write default config to {path}: {err}");
            }
        } else {
            eprintln!("Failed to serialize default config; continuing with defaults");
        }
        default_cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn unique_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!(
            "cellarium_config_test_{}_{}",
            name,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        p
    }

    #[test]
    fn load_or_default_writes_commented_defaults() {
        let path = unique_path("defaults.toml");
        let path_str = path.to_string_lossy().to_string();
        let _ = fs::remove_file(&path);

        let cfg = AppConfig::load_or_default(&path_str);
        assert!(path.exists(), "config file should be created");
        assert_eq!(cfg.engine.root_hz, 110.0);
        assert_eq!(cfg.engine.tempo_bpm, 72.0);
        assert!(cfg.engine.drone);
        assert_eq!(cfg.krell.density, 0.65);

        let contents = fs::read_to_string(&path).expect("read written config");
        assert!(contents.contains("# root_hz = 110.0"));
        assert!(contents.contains("# density = 0.65"));
        assert!(contents.contains("# enabled = true"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn load_or_default_reads_existing() {
        let path = unique_path("custom.toml");
        let path_str = path.to_string_lossy().to_string();
        let custom = AppConfig {
            engine: EngineConfig {
                root_hz: 220.0,
                scale: crate::core::scale::ScalePreset::Pentatonic,
                tempo_bpm: 96.0,
                drone: false,
                tintinnabuli: TintinnabuliConfig {
                    enabled: false,
                    mode: TintinMode::Below,
                },
            },
            krell: KrellConfig {
                density: 0.2,
                base_interval_sec: 5.0,
            },
            phrase: PhraseConfig {
                harmony: 0.9,
                minimalism: 0.1,
            },
            listener: ListenerConfig {
                target_level: 2.0,
                smoothing: 0.05,
            },
        };
        fs::write(&path, toml::to_string_pretty(&custom).unwrap()).unwrap();

        let cfg = AppConfig::load_or_default(&path_str);
        assert_eq!(cfg.engine.root_hz, 220.0);
        assert!(!cfg.engine.drone);
        assert!(cfg.engine.tintinnabuli.as_mode().is_none());
        assert_eq!(cfg.krell.base_interval_sec, 5.0);
        assert_eq!(cfg.phrase.harmony, 0.9);
        assert_eq!(cfg.listener.target_level, 2.0);

        let _ = fs::remove_file(&path);
    }
}
