use std::sync::Arc;

use anyhow::Result;
use eframe::egui;
use image::RgbaImage;

use crate::association::TextToken;

use super::ServiceJob;

pub mod baidu;

pub type OcrServiceJob = ServiceJob<Result<Vec<TextToken>>>;

pub trait OcrService {
    /// Initialise the service (ie. load its configuration file, etc).
    fn init(&mut self) -> Result<()>;
    /// Terminate the service (ie. save its configuration file, etc).
    fn terminate(&mut self) -> Result<()>;

    /// Show the config UI for the service's configuration.
    fn show_config_ui(&mut self, ui: &mut egui::Ui);

    /// Extract text from an image, returning every recognised piece of text with its bounds, in
    /// the order the OCR engine reported them.
    fn ocr(&mut self, image: Arc<RgbaImage>) -> OcrServiceJob;
}
