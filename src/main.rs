use std::{path::Path, time::Duration};

use anyhow::{anyhow, Context, Result};
use config::{AppConfig, Config};
use eframe::{egui, CreationContext};
use global_hotkey::{hotkey::HotKey, GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use gui::{
    config_window::show_config_window,
    main_window::{MainWindow, Request},
    popups::Popups,
};
use log::info;
use pipeline::{Pipeline, ProcessResult};
use services::Services;

pub mod association;
pub mod capture;
pub mod config;
pub mod geometry;
pub mod gui;
pub mod pipeline;
pub mod record;
pub mod services;

const WINDOW_TITLE: &str = "RF4 Catch Helper";

fn main() -> Result<()> {
    init_logging();

    if let Some(image_path) = std::env::args().nth(1) {
        return run_headless(Path::new(&image_path));
    }

    eframe::run_native(
        WINDOW_TITLE,
        eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_title(WINDOW_TITLE)
                .with_inner_size([900.0, 700.0])
                .with_min_inner_size([640.0, 480.0]),
            ..Default::default()
        },
        Box::new(|cc| Ok(Box::new(EframeApp::new(cc)))),
    )
    .map_err(|e| anyhow!("{e}"))
}

fn init_logging() {
    let filters = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| format!("warn,{}=info", env!("CARGO_CRATE_NAME")));
    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&filters)
        .init();
}

/// Process a single screenshot from disk and print the result as JSON.
fn run_headless(image_path: &Path) -> Result<()> {
    let result = process_file(image_path).unwrap_or_else(|e| ProcessResult::Failure {
        error: format!("{e:#}"),
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Could not serialise result")?
    );

    if !result.is_success() {
        std::process::exit(1);
    }

    Ok(())
}

fn process_file(image_path: &Path) -> Result<ProcessResult> {
    let config = AppConfig::load().context("Could not load main configuration file")?;
    let mut services = Services::new(&config)?;

    let image = image::open(image_path)
        .with_context(|| format!("Could not open screenshot `{}`", image_path.display()))?
        .to_rgba8();

    Ok(Pipeline::new(
        services.detector.as_mut(),
        services.ocr.as_mut(),
        &config.result_image_path,
    )
    .process(image))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum View {
    Main,
    Config,
}

pub struct EframeApp {
    config: AppConfig,
    services: Option<Services>,
    popups: Popups,

    // NOTE: GlobalHotKeyManager needs to stay alive for the hotkey to stay registered.
    hotkey_manager: Option<GlobalHotKeyManager>,
    hotkey: Option<HotKey>,

    view: View,
    main_window: MainWindow,
}

impl EframeApp {
    pub fn new(_cc: &CreationContext) -> Self {
        let mut popups = Popups::default();
        let config = AppConfig::load()
            .context("Could not load main configuration file")
            .unwrap_or_else(|e| {
                popups.error("Configuration error", e);
                AppConfig::default()
            });

        let mut app = Self {
            config,
            services: None,
            popups,
            hotkey_manager: None,
            hotkey: None,
            view: View::Main,
            main_window: MainWindow::default(),
        };

        match GlobalHotKeyManager::new().context("Failed to initialise GlobalHotKeyManager") {
            Ok(manager) => app.hotkey_manager = Some(manager),
            Err(e) => app.popups.error("Hotkey error", e),
        }

        app.load_services();
        app.register_hotkey();

        app
    }

    fn load_services(&mut self) {
        // previous services must save their configuration before the new ones load it
        self.services = None;

        match Services::new(&self.config) {
            Ok(services) => self.services = Some(services),
            Err(e) => self.popups.error("Service error", e),
        }
    }

    fn register_hotkey(&mut self) {
        let Some(manager) = &self.hotkey_manager else {
            return;
        };

        if let Some(hotkey) = self.hotkey.take() {
            if let Err(e) = manager.unregister(hotkey) {
                log::warn!("Failed to unregister hotkey: {e}");
            }
        }

        let result = self.config.parse_hotkey().and_then(|hotkey| {
            manager
                .register(hotkey)
                .context("Failed to register hotkey with GlobalHotKeyManager")?;
            Ok(hotkey)
        });

        match result {
            Ok(hotkey) => {
                info!("Capture hotkey `{}` registered", self.config.hotkey);
                self.hotkey = Some(hotkey);
            }
            Err(e) => self.popups.error("Hotkey error", e),
        }
    }

    /// Save the main configuration, then recreate the services and hotkey from it.
    pub fn reload(&mut self) {
        if let Err(e) = self.config.save() {
            self.popups.error(
                "Configuration error",
                e.context("Could not save main configuration file"),
            );
        }
        self.load_services();
        self.register_hotkey();
    }

    fn handle_request(&mut self, ctx: &egui::Context, request: Request) {
        let (image, error_title) = match request {
            Request::OpenImage => (self.main_window.open_image(), "Could not open screenshot"),
            Request::Capture => (
                capture::capture_screenshot(self.config.window_title()),
                "Capture failed",
            ),
        };

        let image = match image {
            Ok(image) => image,
            Err(e) => return self.popups.error(error_title, e),
        };

        match self.services.as_mut() {
            Some(services) => self
                .main_window
                .process(ctx, image, &self.config, services),
            None => self.popups.error(
                "Service error",
                anyhow!("Services are not initialised, check the configuration"),
            ),
        }
    }
}

impl Drop for EframeApp {
    fn drop(&mut self) {
        // unsaved edits from the configuration view
        if let Err(e) = self.config.save() {
            log::warn!("Could not save main configuration file: {e:#}");
        }
    }
}

impl eframe::App for EframeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Ok(event) = GlobalHotKeyEvent::receiver().try_recv() {
            let is_capture_hotkey = self.hotkey.map(|hotkey| hotkey.id()) == Some(event.id);
            if is_capture_hotkey
                && event.state == HotKeyState::Pressed
                && !self.main_window.is_processing()
            {
                info!("Capture hotkey pressed");
                self.handle_request(ctx, Request::Capture);
            }
        }

        self.main_window.poll();

        let mut request = None;

        egui::TopBottomPanel::top("view_selector").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.view, View::Main, "Catch");
                ui.selectable_value(&mut self.view, View::Config, "Configuration");
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| match self.view {
            View::Main => request = self.main_window.show(ui),
            View::Config => show_config_window(self, ui),
        });

        if let Some(request) = request {
            self.handle_request(ctx, request);
        }

        self.popups.show(ctx);

        // keep polling for hotkey events and job results while idle
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}
