use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::{Context, Result};
use image::RgbaImage;
use log::{debug, error, info};
use serde::{ser::SerializeStruct, Serialize, Serializer};

use crate::{
    association::{associate, Detection, TextToken},
    record::{assemble, FishRecord},
    services::{
        detector::{DetectorService, DetectorServiceJob},
        ocr::{OcrService, OcrServiceJob},
        ServiceJob,
    },
};

/// The outcome of processing one screenshot.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessResult {
    Success {
        fishes: Vec<FishRecord>,
        result_image: PathBuf,
    },
    Failure {
        error: String,
    },
}

impl ProcessResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl Serialize for ProcessResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Success {
                fishes,
                result_image,
            } => {
                let mut s = serializer.serialize_struct("ProcessResult", 3)?;
                s.serialize_field("success", &true)?;
                s.serialize_field("fishes", fishes)?;
                s.serialize_field("result_image", result_image)?;
                s.end()
            }
            Self::Failure { error } => {
                let mut s = serializer.serialize_struct("ProcessResult", 2)?;
                s.serialize_field("success", &false)?;
                s.serialize_field("error", error)?;
                s.end()
            }
        }
    }
}

/// Detector and OCR output for one screenshot, reconciled into `FishRecord`s.
pub fn reconcile(detections: &[Detection], tokens: &[TextToken]) -> Vec<FishRecord> {
    let matched = associate(detections, tokens);
    assemble(&matched, detections.len())
}

/// Runs screenshots through the detector and OCR services and reconciles their output.
pub struct Pipeline<'s> {
    detector: &'s mut dyn DetectorService,
    ocr: &'s mut dyn OcrService,
    result_image_path: PathBuf,
}

impl<'s> Pipeline<'s> {
    pub fn new(
        detector: &'s mut dyn DetectorService,
        ocr: &'s mut dyn OcrService,
        result_image_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            detector,
            ocr,
            result_image_path: result_image_path.into(),
        }
    }

    /// Send the image to both services. They run concurrently, each on its own thread, and a
    /// third thread waits for both to reconcile their output and write the result image.
    pub fn start(&mut self, image: RgbaImage) -> PipelineJob {
        let image = Arc::new(image);

        debug!(
            "Processing {}x{} screenshot",
            image.width(),
            image.height()
        );

        let detector = self.detector.detect(image.clone());
        let ocr = self.ocr.ocr(image.clone());
        let result_image_path = self.result_image_path.clone();

        PipelineJob {
            job: Some(ServiceJob::new(move || {
                run(detector, ocr, &image, result_image_path)
            })),
            started: Instant::now(),
        }
    }

    /// Process the image, blocking until both services have answered.
    pub fn process(&mut self, image: RgbaImage) -> ProcessResult {
        self.start(image).wait()
    }
}

/// One screenshot being processed. Dropping the job abandons it.
pub struct PipelineJob {
    job: Option<ServiceJob<Result<(Vec<FishRecord>, PathBuf)>>>,
    started: Instant,
}

impl PipelineJob {
    /// Return the result once it is ready, without blocking.
    pub fn try_finish(&mut self) -> Option<ProcessResult> {
        if self.job.as_ref().is_some_and(|job| !job.is_finished()) {
            return None;
        }

        Some(self.finish())
    }

    /// Block until the result is ready and return it.
    pub fn wait(mut self) -> ProcessResult {
        self.finish()
    }

    fn finish(&mut self) -> ProcessResult {
        let result = self
            .job
            .take()
            .context("Pipeline job was already finished")
            .and_then(|job| job.wait())
            .and_then(|result| result);

        match result {
            Ok((fishes, result_image)) => {
                info!(
                    "Recognised {} fish(es) in {:.2?}",
                    fishes.len(),
                    self.started.elapsed()
                );
                ProcessResult::Success {
                    fishes,
                    result_image,
                }
            }
            Err(e) => {
                error!("Failed to process screenshot: {e:#}");
                ProcessResult::Failure {
                    error: format!("{e:#}"),
                }
            }
        }
    }
}

fn run(
    detector: DetectorServiceJob,
    ocr: OcrServiceJob,
    image: &RgbaImage,
    result_image_path: PathBuf,
) -> Result<(Vec<FishRecord>, PathBuf)> {
    // wait for both before inspecting either, so neither job is left running
    let detector = detector.wait();
    let ocr = ocr.wait();

    let detections = detector
        .and_then(|response| response)
        .context("Detector service failed")?
        .into_detections();
    let tokens = ocr
        .and_then(|tokens| tokens)
        .context("OCR service failed")?;

    debug!(
        "{} detection(s), {} text token(s)",
        detections.len(),
        tokens.len()
    );

    let fishes = reconcile(&detections, &tokens);

    save_result_image(image, &result_image_path)?;

    Ok((fishes, result_image_path))
}

fn save_result_image(image: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| {
            format!("Could not create result image directory: `{}`", dir.display())
        })?;
    }

    image
        .save(path)
        .with_context(|| format!("Could not write result image: `{}`", path.display()))
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use eframe::egui;
    use serde_json::json;

    use super::*;
    use crate::{
        geometry::Rect,
        services::detector::DetectorResponse,
    };

    struct FakeDetector(Result<Vec<Rect>, String>);

    impl DetectorService for FakeDetector {
        fn init(&mut self) -> Result<()> {
            Ok(())
        }

        fn terminate(&mut self) -> Result<()> {
            Ok(())
        }

        fn show_config_ui(&mut self, _ui: &mut egui::Ui) {}

        fn detect(&mut self, _image: Arc<RgbaImage>) -> DetectorServiceJob {
            let response = self.0.clone();
            ServiceJob::new(move || {
                response
                    .map(DetectorResponse::Standard)
                    .map_err(|e| anyhow!(e))
            })
        }
    }

    struct FakeOcr(Result<Vec<TextToken>, String>);

    impl OcrService for FakeOcr {
        fn init(&mut self) -> Result<()> {
            Ok(())
        }

        fn terminate(&mut self) -> Result<()> {
            Ok(())
        }

        fn show_config_ui(&mut self, _ui: &mut egui::Ui) {}

        fn ocr(&mut self, _image: Arc<RgbaImage>) -> OcrServiceJob {
            let response = self.0.clone();
            ServiceJob::new(move || response.map_err(|e| anyhow!(e)))
        }
    }

    struct PanickingDetector;

    impl DetectorService for PanickingDetector {
        fn init(&mut self) -> Result<()> {
            Ok(())
        }

        fn terminate(&mut self) -> Result<()> {
            Ok(())
        }

        fn show_config_ui(&mut self, _ui: &mut egui::Ui) {}

        fn detect(&mut self, _image: Arc<RgbaImage>) -> DetectorServiceJob {
            ServiceJob::new(|| panic!("unexpected prediction layout"))
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "{}-pipeline-test-{}-{name}",
            env!("CARGO_PKG_NAME"),
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn screenshot() -> RgbaImage {
        RgbaImage::from_pixel(320, 240, image::Rgba([0, 64, 128, 255]))
    }

    fn token(text: &str, left: f32, top: f32, width: f32, height: f32) -> TextToken {
        TextToken::new(text, Rect::new(left, top, width, height))
    }

    fn run(
        detections: Result<Vec<Rect>, String>,
        tokens: Result<Vec<TextToken>, String>,
        name: &str,
    ) -> ProcessResult {
        let dir = scratch_dir(name);
        let mut detector = FakeDetector(detections);
        let mut ocr = FakeOcr(tokens);

        let result = Pipeline::new(&mut detector, &mut ocr, dir.join("processed_image.png"))
            .process(screenshot());

        let _ = std::fs::remove_dir_all(&dir);
        result
    }

    fn failure(result: ProcessResult) -> String {
        match result {
            ProcessResult::Failure { error } => error,
            ProcessResult::Success { .. } => panic!("expected failure, got {result:?}"),
        }
    }

    fn fishes(result: &ProcessResult) -> Vec<Vec<String>> {
        match result {
            ProcessResult::Success { fishes, .. } => {
                fishes.iter().map(|fish| fish.0.clone()).collect()
            }
            ProcessResult::Failure { error } => panic!("pipeline failed: {error}"),
        }
    }

    #[test]
    fn single_panel_scenario() {
        let result = run(
            Ok(vec![Rect::new(0.0, 0.0, 100.0, 50.0)]),
            Ok(vec![
                token("Pike", 10.0, 10.0, 30.0, 10.0),
                token("3kg", 10.0, 30.0, 20.0, 10.0),
                token("X", 200.0, 200.0, 5.0, 5.0),
            ]),
            "single_panel",
        );

        assert_eq!(fishes(&result), vec![vec!["Pike", "3kg"]]);
    }

    #[test]
    fn polling_returns_the_result_once_both_services_answered() {
        let dir = scratch_dir("polled");
        let mut detector = FakeDetector(Ok(vec![Rect::new(0.0, 0.0, 100.0, 50.0)]));
        let mut ocr = FakeOcr(Ok(vec![token("Pike", 10.0, 10.0, 30.0, 10.0)]));
        let mut job = Pipeline::new(&mut detector, &mut ocr, dir.join("processed_image.png"))
            .start(screenshot());

        let result = loop {
            if let Some(result) = job.try_finish() {
                break result;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        };

        assert_eq!(fishes(&result), vec![vec!["Pike"]]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn result_image_is_written() {
        let dir = scratch_dir("written");
        let path = dir.join("nested").join("processed_image.png");
        let mut detector = FakeDetector(Ok(vec![]));
        let mut ocr = FakeOcr(Ok(vec![]));

        let result = Pipeline::new(&mut detector, &mut ocr, &path).process(screenshot());

        let ProcessResult::Success { result_image, .. } = result else {
            panic!("pipeline failed: {result:?}");
        };
        assert_eq!(result_image, path);
        let saved = image::open(&result_image).unwrap().to_rgba8();
        assert_eq!(saved, screenshot());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unwritable_result_image_aborts_the_run() {
        let dir = scratch_dir("unwritable");
        std::fs::create_dir_all(&dir).unwrap();
        let blocker = dir.join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let mut detector = FakeDetector(Ok(vec![Rect::new(0.0, 0.0, 100.0, 50.0)]));
        let mut ocr = FakeOcr(Ok(vec![token("Pike", 10.0, 10.0, 30.0, 10.0)]));

        let result = Pipeline::new(&mut detector, &mut ocr, blocker.join("processed_image.png"))
            .process(screenshot());

        let error = failure(result);
        assert!(
            error.contains("Could not create result image directory")
                || error.contains("Could not write result image"),
            "{error}"
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn panicking_detector_aborts_the_run() {
        let dir = scratch_dir("panicking_detector");
        let mut detector = PanickingDetector;
        let mut ocr = FakeOcr(Ok(vec![token("Pike", 10.0, 10.0, 30.0, 10.0)]));

        let result = Pipeline::new(&mut detector, &mut ocr, dir.join("processed_image.png"))
            .process(screenshot());

        let error = failure(result);
        assert!(error.contains("Detector service failed"), "{error}");
        assert!(error.contains("unexpected prediction layout"), "{error}");
        assert!(!dir.exists());
    }

    #[test]
    fn touching_panels_scenario() {
        let result = run(
            Ok(vec![
                Rect::new(0.0, 0.0, 50.0, 50.0),
                Rect::new(50.0, 0.0, 50.0, 50.0),
            ]),
            Ok(vec![token("Bream", 30.0, 10.0, 20.0, 10.0)]),
            "touching_panels",
        );

        assert_eq!(fishes(&result), vec![vec!["Bream"]]);
    }

    #[test]
    fn no_detections_is_an_empty_success() {
        let result = run(
            Ok(vec![]),
            Ok(vec![token("Pike", 10.0, 10.0, 30.0, 10.0)]),
            "no_detections",
        );

        assert!(result.is_success());
        assert!(fishes(&result).is_empty());
    }

    #[test]
    fn detector_failure_aborts_the_run() {
        let result = run(
            Err("connection refused".to_owned()),
            Ok(vec![token("Pike", 10.0, 10.0, 30.0, 10.0)]),
            "detector_failure",
        );

        let error = failure(result);
        assert!(error.contains("Detector service failed"), "{error}");
        assert!(error.contains("connection refused"), "{error}");
    }

    #[test]
    fn ocr_failure_aborts_the_run() {
        let result = run(
            Ok(vec![Rect::new(0.0, 0.0, 100.0, 50.0)]),
            Err("quota exceeded".to_owned()),
            "ocr_failure",
        );

        let error = failure(result);
        assert!(error.contains("OCR service failed"), "{error}");
    }

    #[test]
    fn reconcile_is_deterministic() {
        let detections: Vec<Detection> = vec![
            Rect::new(0.0, 0.0, 100.0, 50.0).into(),
            Rect::new(0.0, 60.0, 100.0, 50.0).into(),
        ];
        let tokens = vec![
            token("Perch", 5.0, 65.0, 30.0, 10.0),
            token("Pike", 5.0, 5.0, 30.0, 10.0),
            token("0.8kg", 5.0, 80.0, 30.0, 10.0),
            token("3kg", 5.0, 20.0, 30.0, 10.0),
        ];

        let first = reconcile(&detections, &tokens);

        for _ in 0..10 {
            assert_eq!(reconcile(&detections, &tokens), first);
        }
        assert_eq!(
            first,
            vec![
                FishRecord(vec!["Pike".to_owned(), "3kg".to_owned()]),
                FishRecord(vec!["Perch".to_owned(), "0.8kg".to_owned()]),
            ]
        );
    }

    #[test]
    fn results_serialize_to_the_caller_shape() {
        let success = ProcessResult::Success {
            fishes: vec![FishRecord(vec!["Pike".to_owned(), "3kg".to_owned()])],
            result_image: PathBuf::from("/tmp/processed_image.png"),
        };
        let failure = ProcessResult::Failure {
            error: "OCR service failed".to_owned(),
        };

        assert_eq!(
            serde_json::to_value(&success).unwrap(),
            json!({
                "success": true,
                "fishes": [["Pike", "3kg"]],
                "result_image": "/tmp/processed_image.png"
            })
        );
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({ "success": false, "error": "OCR service failed" })
        );
    }
}
