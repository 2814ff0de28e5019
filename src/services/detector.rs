use std::sync::Arc;

use anyhow::Result;
use eframe::egui;
use image::RgbaImage;
use serde::Deserialize;

use crate::{association::Detection, geometry::Rect};

use super::ServiceJob;

pub mod roboflow;

pub type DetectorServiceJob = ServiceJob<Result<DetectorResponse>>;

/// A service locating fish card panels in a screenshot.
pub trait DetectorService {
    /// Initialise the service (ie. load its configuration file, etc).
    fn init(&mut self) -> Result<()>;
    /// Terminate the service (ie. save its configuration file, etc).
    fn terminate(&mut self) -> Result<()>;

    /// Show the config UI for the service's configuration.
    fn show_config_ui(&mut self, ui: &mut egui::Ui);

    /// Find the fish card panels in an image.
    fn detect(&mut self, image: Arc<RgbaImage>) -> DetectorServiceJob;
}

/// A box anchored on its centre point, as returned by YOLO style detectors.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CenteredBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// The data returned by a detector service, in the detector's own box format.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorResponse {
    /// Boxes given by their centre point and size.
    Centered(Vec<CenteredBox>),
    /// Boxes given by their top left corner and size.
    Standard(Vec<Rect>),
}

impl DetectorResponse {
    /// Reshape the response into `Detection`s, keeping the detector's order.
    pub fn into_detections(self) -> Vec<Detection> {
        match self {
            Self::Centered(boxes) => boxes
                .into_iter()
                .map(|b| Rect::from_center(b.x, b.y, b.width, b.height).into())
                .collect(),
            Self::Standard(rects) => rects.into_iter().map(Detection::from).collect(),
        }
    }
}
