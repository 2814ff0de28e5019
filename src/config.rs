use std::{
    fs::File,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{anyhow, Context, Result};
use eframe::egui;
use global_hotkey::hotkey::HotKey;
use log::debug;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::services::{
    detector::{roboflow::Roboflow, DetectorService},
    ocr::{baidu::BaiduOcr, OcrService},
};

/// Overrides the directory configuration files are read from and written to.
pub const CONFIG_DIR_ENV: &str = "FISHCARDS_CONFIG_DIR";

/// Directory holding all of this application's configuration files.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    let mut dir =
        dirs::config_dir().ok_or_else(|| anyhow!("Could not find suitable config directory"))?;
    dir.push(env!("CARGO_PKG_NAME"));
    Ok(dir)
}

pub trait Config: Serialize + DeserializeOwned + Default {
    /// Path of the configuration file, relative to `config_dir()`.
    fn path() -> &'static str;
    fn show_ui(&mut self, ui: &mut egui::Ui);

    /// Loads a configuration file, or creates a default configuration struct if the file does not exist.
    fn load() -> Result<Self> {
        Self::load_from(&config_dir()?.join(Self::path()))
    }

    fn save(&self) -> Result<()> {
        self.save_to(&config_dir()?.join(Self::path()))
    }

    fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            debug!(
                "No configuration file at `{}`, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let file = File::open(config_path).with_context(|| {
            format!(
                "Could not open configuration file: `{}`",
                config_path.display()
            )
        })?;

        let config = serde_json::from_reader(file).with_context(|| {
            format!(
                "Could not read configuration file: `{}`",
                config_path.display(),
            )
        })?;

        Ok(config)
    }

    fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(config_dir) = config_path.parent() {
            std::fs::create_dir_all(config_dir).with_context(|| {
                format!(
                    "Could not create configuration directory: `{}`",
                    config_dir.display()
                )
            })?;
        }

        let file = File::create(config_path).with_context(|| {
            format!(
                "Could not write to configuration file: `{}`",
                config_path.display()
            )
        })?;

        serde_json::to_writer_pretty(file, self).with_context(|| {
            format!(
                "Could not serialise configuration file: `{}`",
                config_path.display()
            )
        })?;

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Hotkey which captures the game and processes the screenshot, eg. `alt+KeyF`.
    pub hotkey: String,
    pub detector_service: DetectorServiceList,
    pub ocr_service: OcrServiceList,
    /// Part of the game window's title. The primary monitor is captured if this is empty or no
    /// window matches.
    pub window_title: String,
    /// Where the image of the last processed screenshot is written.
    pub result_image_path: PathBuf,
}

impl AppConfig {
    pub fn parse_hotkey(&self) -> Result<HotKey> {
        HotKey::from_str(&self.hotkey)
            .map_err(|e| anyhow!("Invalid hotkey `{}`: {e}", self.hotkey))
    }

    pub fn window_title(&self) -> Option<&str> {
        Some(self.window_title.trim()).filter(|title| !title.is_empty())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut result_image_path = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        result_image_path.push(env!("CARGO_PKG_NAME"));
        result_image_path.push("processed_image.png");

        Self {
            hotkey: "alt+KeyF".to_owned(),
            detector_service: DetectorServiceList::Roboflow,
            ocr_service: OcrServiceList::Baidu,
            window_title: "Russian Fishing 4".to_owned(),
            result_image_path,
        }
    }
}

impl Config for AppConfig {
    fn path() -> &'static str {
        "config.json"
    }

    fn show_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Capture hotkey:");
            ui.text_edit_singleline(&mut self.hotkey);
        });
        ui.horizontal(|ui| {
            ui.label("Game window title:");
            ui.text_edit_singleline(&mut self.window_title);
        });

        let mut result_image_path = self.result_image_path.display().to_string();
        ui.horizontal(|ui| {
            ui.label("Result image:");
            if ui.text_edit_singleline(&mut result_image_path).changed() {
                self.result_image_path = PathBuf::from(&result_image_path);
            }
        });

        egui::ComboBox::from_label("Detector Service")
            .selected_text(self.detector_service.name())
            .show_ui(ui, |ui| {
                for service in DetectorServiceList::ALL {
                    ui.selectable_value(&mut self.detector_service, service, service.name());
                }
            });
        egui::ComboBox::from_label("OCR Service")
            .selected_text(self.ocr_service.name())
            .show_ui(ui, |ui| {
                for service in OcrServiceList::ALL {
                    ui.selectable_value(&mut self.ocr_service, service, service.name());
                }
            });
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum DetectorServiceList {
    Roboflow,
}

impl DetectorServiceList {
    pub const ALL: [Self; 1] = [Self::Roboflow];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Roboflow => "Roboflow",
        }
    }

    pub fn create_service(&self) -> Box<dyn DetectorService> {
        match self {
            Self::Roboflow => Box::new(Roboflow::default()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum OcrServiceList {
    Baidu,
}

impl OcrServiceList {
    pub const ALL: [Self; 1] = [Self::Baidu];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Baidu => "Baidu OCR",
        }
    }

    pub fn create_service(&self) -> Box<dyn OcrService> {
        match self {
            Self::Baidu => Box::new(BaiduOcr::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "{}-config-test-{}-{name}",
            env!("CARGO_PKG_NAME"),
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = scratch_dir("missing");

        let config = AppConfig::load_from(&dir.join("config.json")).unwrap();

        assert_eq!(config.hotkey, AppConfig::default().hotkey);
        assert_eq!(config.detector_service, DetectorServiceList::Roboflow);
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = scratch_dir("saved");
        let path = dir.join("nested").join("config.json");

        let config = AppConfig {
            hotkey: "ctrl+shift+KeyR".to_owned(),
            window_title: String::new(),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.hotkey, "ctrl+shift+KeyR");
        assert_eq!(loaded.window_title(), None);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = scratch_dir("partial");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{ "window_title": "  RF4  " }"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();

        assert_eq!(config.window_title(), Some("RF4"));
        assert_eq!(config.ocr_service, OcrServiceList::Baidu);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = scratch_dir("broken");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();

        assert!(format!("{err:#}").contains("Could not read configuration file"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn default_hotkey_parses() {
        assert!(AppConfig::default().parse_hotkey().is_ok());
        assert!(AppConfig {
            hotkey: "not a hotkey".to_owned(),
            ..Default::default()
        }
        .parse_hotkey()
        .is_err());
    }
}
