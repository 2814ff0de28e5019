use std::sync::Arc;

use anyhow::{Context, Result};
use eframe::egui;
use image::RgbaImage;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::Config,
    services::{encode_png_base64, ServiceJob},
};

use super::{CenteredBox, DetectorResponse, DetectorService, DetectorServiceJob};

const API_URL: &str = "https://detect.roboflow.com";

/// Fish card detection through a model hosted on Roboflow.
#[derive(Default)]
pub struct Roboflow {
    config: RoboflowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoboflowConfig {
    pub api_key: String,
    pub model_id: String,
    pub model_version: u32,
    /// Minimum prediction confidence, in percent.
    pub confidence: u8,
    /// Only keep predictions of this class. All classes are kept if empty.
    pub class_name: String,
}

impl Default for RoboflowConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model_id: "rf4-fish-cards".to_owned(),
            model_version: 1,
            confidence: 40,
            class_name: String::new(),
        }
    }
}

impl Config for RoboflowConfig {
    fn path() -> &'static str {
        "services/roboflow.json"
    }

    fn show_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("API Key:");
            ui.text_edit_singleline(&mut self.api_key);
        });
        ui.horizontal(|ui| {
            ui.label("Model:");
            ui.text_edit_singleline(&mut self.model_id);
            ui.label("Version:");
            ui.add(egui::DragValue::new(&mut self.model_version).range(1..=u32::MAX));
        });
        ui.horizontal(|ui| {
            ui.label("Confidence:");
            ui.add(egui::Slider::new(&mut self.confidence, 0..=100).suffix("%"));
        });
        ui.horizontal(|ui| {
            ui.label("Class:");
            ui.text_edit_singleline(&mut self.class_name);
        });
    }
}

#[derive(Debug, Deserialize)]
struct RoboflowResponse {
    predictions: Vec<RoboflowPrediction>,
}

#[derive(Debug, Deserialize)]
struct RoboflowPrediction {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    class: String,
}

/// Turn a Roboflow inference response into a `DetectorResponse`, keeping the prediction order.
fn parse_response(json: Value, class_name: &str) -> Result<DetectorResponse> {
    let response: RoboflowResponse = serde_json::from_value(json)
        .context("Roboflow: Response did not contain a valid `predictions` array")?;

    let boxes = response
        .predictions
        .into_iter()
        .filter(|p| class_name.is_empty() || p.class == class_name)
        .map(|p| CenteredBox {
            x: p.x,
            y: p.y,
            width: p.width,
            height: p.height,
        })
        .collect();

    Ok(DetectorResponse::Centered(boxes))
}

impl DetectorService for Roboflow {
    fn init(&mut self) -> Result<()> {
        self.config =
            RoboflowConfig::load().context("Roboflow: Failed to load configuration file")?;
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        self.config
            .save()
            .context("Roboflow: Failed to save configuration file")?;
        Ok(())
    }

    fn show_config_ui(&mut self, ui: &mut egui::Ui) {
        self.config.show_ui(ui);
    }

    fn detect(&mut self, image: Arc<RgbaImage>) -> DetectorServiceJob {
        let config = self.config.clone();

        ServiceJob::new(move || {
            let url = format!("{API_URL}/{}/{}", config.model_id, config.model_version);
            let body = encode_png_base64(&image)?;

            debug!("Roboflow: Sending {} byte screenshot to `{url}`", body.len());

            let json: Value = attohttpc::post(&url)
                .param("api_key", &config.api_key)
                .param("confidence", config.confidence)
                .header(
                    attohttpc::header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                )
                .text(body)
                .send()
                .with_context(|| format!("Roboflow: Failed to send request to `{url}`"))?
                .error_for_status()
                .context("Roboflow: Inference request was rejected")?
                .json()
                .context("Roboflow: Response was not valid JSON")?;

            let response = parse_response(json, &config.class_name)?;

            if let DetectorResponse::Centered(boxes) = &response {
                debug!("Roboflow: {} fish card(s) detected", boxes.len());
            }

            Ok(response)
        })
    }
}
