use anyhow::{Context, Result};
use eframe::egui::{self, TextureHandle};
use egui_extras::{Column, Size, StripBuilder, TableBuilder};
use image::RgbaImage;

use crate::{
    config::AppConfig,
    pipeline::{Pipeline, PipelineJob, ProcessResult},
    record::FishRecord,
    services::Services,
};

#[derive(Debug, Clone, PartialEq)]
enum Status {
    Ready,
    Processing,
    Done(usize),
    Failed(String),
}

/// Screenshot preview, results table and status line.
pub struct MainWindow {
    pub image_path: String,

    texture: Option<TextureHandle>,
    job: Option<PipelineJob>,
    fishes: Vec<FishRecord>,
    status: Status,
}

/// Something the user asked for which the window cannot do on its own.
pub enum Request {
    OpenImage,
    Capture,
}

impl Default for MainWindow {
    fn default() -> Self {
        Self {
            image_path: String::new(),
            texture: None,
            job: None,
            fishes: Vec::new(),
            status: Status::Ready,
        }
    }
}

impl MainWindow {
    pub fn is_processing(&self) -> bool {
        self.job.is_some()
    }

    /// Load the image at `image_path` from disk.
    pub fn open_image(&self) -> Result<RgbaImage> {
        let path = self.image_path.trim();
        Ok(image::open(path)
            .with_context(|| format!("Could not open screenshot `{path}`"))?
            .to_rgba8())
    }

    /// Show the image and start processing it. Any previous run is abandoned.
    pub fn process(
        &mut self,
        ctx: &egui::Context,
        image: RgbaImage,
        config: &AppConfig,
        services: &mut Services,
    ) {
        let color_image = egui::ColorImage::from_rgba_unmultiplied(
            [image.width() as usize, image.height() as usize],
            image.as_flat_samples().as_slice(),
        );
        self.texture =
            Some(ctx.load_texture("screenshot", color_image, egui::TextureOptions::LINEAR));

        let mut pipeline = Pipeline::new(
            services.detector.as_mut(),
            services.ocr.as_mut(),
            &config.result_image_path,
        );
        self.job = Some(pipeline.start(image));
        self.fishes.clear();
        self.status = Status::Processing;
    }

    /// Pick up the result of the running job, if it has finished.
    pub fn poll(&mut self) {
        let Some(result) = self.job.as_mut().and_then(|job| job.try_finish()) else {
            return;
        };
        self.job = None;

        match result {
            ProcessResult::Success { fishes, .. } => {
                self.status = Status::Done(fishes.len());
                self.fishes = fishes;
            }
            ProcessResult::Failure { error } => {
                self.status = Status::Failed(error);
            }
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui) -> Option<Request> {
        let mut request = None;

        ui.horizontal(|ui| {
            ui.heading("Catch Analysis");
        });
        ui.separator();

        ui.add_enabled_ui(!self.is_processing(), |ui| {
            ui.horizontal(|ui| {
                ui.label("Screenshot:");
                let edit = ui.add(
                    egui::TextEdit::singleline(&mut self.image_path)
                        .hint_text("path/to/screenshot.png")
                        .desired_width(320.0),
                );
                let submitted =
                    edit.lost_focus() && ui.input(|input| input.key_pressed(egui::Key::Enter));
                if ui.button("Open").clicked() || submitted {
                    request = Some(Request::OpenImage);
                }
                if ui.button("Capture game").clicked() {
                    request = Some(Request::Capture);
                }
            });
        });

        ui.separator();

        StripBuilder::new(ui)
            .size(Size::remainder())
            .size(Size::exact(22.0))
            .vertical(|mut strip| {
                strip.strip(|builder| {
                    builder
                        .size(Size::relative(0.55))
                        .size(Size::remainder())
                        .horizontal(|mut strip| {
                            strip.cell(|ui| self.show_image(ui));
                            strip.cell(|ui| self.show_results(ui));
                        });
                });
                strip.cell(|ui| {
                    ui.horizontal(|ui| {
                        if self.is_processing() {
                            ui.spinner();
                        }
                        match &self.status {
                            Status::Ready => ui.label("Ready"),
                            Status::Processing => ui.label("Processing..."),
                            Status::Done(count) => ui.label(format!("Done: {count} fish(es)")),
                            Status::Failed(error) => ui.colored_label(
                                ui.visuals().error_fg_color,
                                format!("Failed: {error}"),
                            ),
                        };
                    });
                });
            });

        request
    }

    fn show_image(&self, ui: &mut egui::Ui) {
        match &self.texture {
            Some(texture) => {
                ui.centered_and_justified(|ui| {
                    ui.add(
                        egui::Image::from_texture(egui::load::SizedTexture::from_handle(texture))
                            .shrink_to_fit(),
                    );
                });
            }
            None => {
                ui.centered_and_justified(|ui| {
                    ui.weak("Open or capture a screenshot...");
                });
            }
        }
    }

    fn show_results(&self, ui: &mut egui::Ui) {
        TableBuilder::new(ui)
            .striped(true)
            .column(Column::exact(32.0))
            .column(Column::remainder())
            .header(20.0, |mut header| {
                header.col(|ui| {
                    ui.strong("#");
                });
                header.col(|ui| {
                    ui.strong("Fish");
                });
            })
            .body(|mut body| {
                for (idx, fish) in self.fishes.iter().enumerate() {
                    body.row(18.0, |mut row| {
                        row.col(|ui| {
                            ui.label((idx + 1).to_string());
                        });
                        row.col(|ui| {
                            ui.label(fish.fields().join(", "));
                        });
                    });
                }
            });
    }
}
