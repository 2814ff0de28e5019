use eframe::egui::{self, vec2};

/// Errors which happened outside of a pipeline run (configuration, services, capture),
/// each shown in its own window until the user dismisses it.
#[derive(Debug, Default)]
pub struct Popups(Vec<Popup>);

#[derive(Debug)]
struct Popup {
    title: String,
    message: String,
    first_frame: bool,
}

impl Popups {
    /// Report an error to the user under the given window title.
    pub fn error(&mut self, title: &str, e: anyhow::Error) {
        log::error!("{title}: {e:#}");

        self.0.push(Popup {
            title: title.to_owned(),
            message: describe_error(&e),
            first_frame: true,
        });
    }

    pub fn show(&mut self, ctx: &egui::Context) {
        let mut dismissed = None;

        for (idx, popup) in self.0.iter_mut().enumerate() {
            ctx.show_viewport_immediate(
                egui::ViewportId(egui::Id::new(("error_popup", idx, &popup.title))),
                egui::ViewportBuilder::default()
                    .with_title(format!("{} - {}", crate::WINDOW_TITLE, popup.title))
                    .with_inner_size(vec2(480.0, 220.0))
                    .with_always_on_top(),
                |ctx, _| {
                    if popup.first_frame {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
                        popup.first_frame = false;
                    }

                    egui::TopBottomPanel::bottom("dismiss").show(ctx, |ui| {
                        ui.vertical_centered_justified(|ui| {
                            if ui.button("Dismiss").clicked() {
                                dismissed = Some(idx);
                            }
                        });
                    });

                    egui::CentralPanel::default().show(ctx, |ui| {
                        ui.heading(&popup.title);
                        ui.separator();
                        egui::ScrollArea::vertical()
                            .auto_shrink(false)
                            .show(ui, |ui| ui.label(&popup.message));
                    });

                    if ctx.input(|input| input.viewport().close_requested()) {
                        dismissed = Some(idx);
                    }
                },
            );
        }

        if let Some(idx) = dismissed {
            self.0.remove(idx);
        }
    }
}

/// The top-level error followed by its numbered causes, one per line.
fn describe_error(e: &anyhow::Error) -> String {
    let mut chain = e.chain();
    let mut message = chain.next().map(ToString::to_string).unwrap_or_default();

    for (idx, cause) in chain.enumerate() {
        message.push_str(&format!("\n  {}. {cause}", idx + 1));
    }

    message
}
