use std::{io::Cursor, thread::JoinHandle};

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use detector::DetectorService;
use image::{ImageFormat, RgbaImage};
use log::{debug, warn};
use ocr::OcrService;

use crate::config::AppConfig;

pub mod detector;
pub mod ocr;

/// Holds instanciated services.
pub struct Services {
    pub detector: Box<dyn DetectorService>,
    pub ocr: Box<dyn OcrService>,
}

impl Services {
    /// Create a new `Services` from the services specified in the given `AppConfig`.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let mut services = Self {
            detector: config.detector_service.create_service(),
            ocr: config.ocr_service.create_service(),
        };

        services.detector.init().with_context(|| {
            format!(
                "Failed to initialise detector service `{}`",
                config.detector_service.name()
            )
        })?;
        services.ocr.init().with_context(|| {
            format!(
                "Failed to initialise OCR service `{}`",
                config.ocr_service.name()
            )
        })?;

        debug!(
            "Services ready: detector `{}`, OCR `{}`",
            config.detector_service.name(),
            config.ocr_service.name()
        );

        Ok(services)
    }
}

impl Drop for Services {
    fn drop(&mut self) {
        if let Err(e) = self.detector.terminate() {
            warn!("Failed to terminate detector service: {e:#}");
        }
        if let Err(e) = self.ocr.terminate() {
            warn!("Failed to terminate OCR service: {e:#}");
        }
    }
}

/// A job being performed by a service on a background thread. May or may not be finished.
pub struct ServiceJob<T> {
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> ServiceJob<T> {
    pub fn new<F: FnOnce() -> T + Send + 'static>(f: F) -> Self {
        std::thread::spawn(f).into()
    }
}

impl<T> ServiceJob<T> {
    /// Wait for the job to finish and return its return value.
    ///
    /// Returns `Err` if the job panicked.
    pub fn wait(self) -> Result<T> {
        self.handle.join().map_err(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_owned());
            anyhow!("service job panicked: {message}")
        })
    }

    /// `true` once `wait()` would return without blocking.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Encode an image as a base64 PNG, the upload format both HTTP collaborators accept.
pub fn encode_png_base64(image: &RgbaImage) -> Result<String> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .context("Failed to encode screenshot as PNG")?;
    Ok(BASE64.encode(buf.into_inner()))
}

impl<T> From<JoinHandle<T>> for ServiceJob<T> {
    fn from(handle: JoinHandle<T>) -> Self {
        ServiceJob { handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_returns_the_job_value() {
        let job = ServiceJob::new(|| 40 + 2);

        assert_eq!(job.wait().unwrap(), 42);
    }

    #[test]
    fn screenshots_are_uploaded_as_png() {
        let image = RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 255]));

        let encoded = encode_png_base64(&image).unwrap();
        let bytes = BASE64.decode(encoded).unwrap();

        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, image);
    }

    #[test]
    fn panicking_job_becomes_an_error() {
        let job = ServiceJob::<()>::new(|| panic!("detector exploded"));

        let err = job.wait().unwrap_err();

        assert!(err.to_string().contains("detector exploded"), "{err}");
    }
}
