use eframe::egui;

use crate::{config::Config, EframeApp};

pub fn show_config_window(app: &mut EframeApp, ui: &mut egui::Ui) {
    egui_extras::StripBuilder::new(ui)
        .size(egui_extras::Size::remainder())
        .size(egui_extras::Size::exact(0.0))
        .size(egui_extras::Size::exact(22.0))
        .vertical(|mut strip| {
            strip.cell(|ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    let header_size = 20.0;

                    ui.label(
                        egui::RichText::new(concat!(env!("CARGO_PKG_NAME"), " Configuration"))
                            .size(header_size)
                            .strong(),
                    );

                    app.config.show_ui(ui);

                    let Some(services) = app.services.as_mut() else {
                        ui.separator();
                        ui.label("Services are not initialised. Check the configuration and reload them.");
                        return;
                    };

                    ui.separator();

                    egui::CollapsingHeader::new(
                        egui::RichText::new(format!(
                            "Detector: {}",
                            app.config.detector_service.name()
                        ))
                        .size(header_size),
                    )
                    .default_open(true)
                    .show_unindented(ui, |ui| {
                        services.detector.show_config_ui(ui);
                    });

                    ui.separator();

                    egui::CollapsingHeader::new(
                        egui::RichText::new(format!("OCR: {}", app.config.ocr_service.name()))
                            .size(header_size),
                    )
                    .default_open(true)
                    .show_unindented(ui, |ui| {
                        services.ocr.show_config_ui(ui);
                    });
                });
            });

            strip.empty();

            strip.cell(|ui| {
                ui.centered_and_justified(|ui| {
                    if ui.button("Save & Reload Services").clicked() {
                        app.reload();
                    }
                });
            });
        });
}
