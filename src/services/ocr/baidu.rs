use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context, Result};
use eframe::egui;
use image::RgbaImage;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    association::TextToken,
    config::Config,
    geometry::Rect,
    services::{encode_png_base64, ServiceJob},
};

use super::{OcrService, OcrServiceJob};

const API_URL_TOKEN: &str = "https://aip.baidubce.com/oauth/2.0/token";
const API_URL_GENERAL: &str = "https://aip.baidubce.com/rest/2.0/ocr/v1/general";
const API_URL_ACCURATE: &str = "https://aip.baidubce.com/rest/2.0/ocr/v1/accurate";

/// Access tokens are refreshed this long before Baidu says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60 * 60);

/// Text recognition through Baidu's OCR API (the variants which report text locations).
#[derive(Default)]
pub struct BaiduOcr {
    config: BaiduOcrConfig,
    token: Arc<Mutex<Option<AccessToken>>>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum BaiduOcrModel {
    #[default]
    General,
    Accurate,
}

impl BaiduOcrModel {
    fn url(&self) -> &'static str {
        match self {
            Self::General => API_URL_GENERAL,
            Self::Accurate => API_URL_ACCURATE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BaiduOcrConfig {
    pub api_key: String,
    pub secret_key: String,
    pub model: BaiduOcrModel,
}

impl Config for BaiduOcrConfig {
    fn path() -> &'static str {
        "services/baidu_ocr.json"
    }

    fn show_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("API Key:");
            ui.text_edit_singleline(&mut self.api_key);
        });
        ui.horizontal(|ui| {
            ui.label("Secret Key:");
            ui.add(egui::TextEdit::singleline(&mut self.secret_key).password(true));
        });
        ui.horizontal(|ui| {
            ui.label("Model:");
            ui.radio_value(&mut self.model, BaiduOcrModel::General, "General");
            ui.radio_value(&mut self.model, BaiduOcrModel::Accurate, "Accurate");
        });
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct WordsResponse {
    words_result: Vec<WordsResult>,
}

#[derive(Debug, Deserialize)]
struct WordsResult {
    words: String,
    location: Rect,
}

/// Turn a Baidu OCR response into `TextToken`s, keeping the response order.
fn parse_response(json: Value) -> Result<Vec<TextToken>> {
    if let Some(code) = json.get("error_code") {
        let message = json
            .get("error_msg")
            .and_then(Value::as_str)
            .unwrap_or("no error message");
        bail!("Baidu OCR: API returned error {code}: {message}");
    }

    let response: WordsResponse = serde_json::from_value(json)
        .context("Baidu OCR: Response did not contain a valid `words_result` array")?;

    Ok(response
        .words_result
        .into_iter()
        .map(|w| TextToken::new(w.words, w.location))
        .collect())
}

fn fetch_access_token(config: &BaiduOcrConfig) -> Result<AccessToken> {
    let json: Value = attohttpc::post(API_URL_TOKEN)
        .param("grant_type", "client_credentials")
        .param("client_id", &config.api_key)
        .param("client_secret", &config.secret_key)
        .send()
        .with_context(|| format!("Baidu OCR: Failed to send request to `{API_URL_TOKEN}`"))?
        .json()
        .context("Baidu OCR: Token response was not valid JSON")?;

    if let Some(error) = json.get("error_description").or_else(|| json.get("error")) {
        bail!("Baidu OCR: Could not obtain access token: {error}");
    }

    let response: TokenResponse = serde_json::from_value(json).map_err(|e| {
        anyhow!("Baidu OCR: Data returned from `{API_URL_TOKEN}` is incorrect: {e}")
    })?;

    info!("Baidu OCR: Obtained new access token");

    Ok(AccessToken {
        token: response.access_token,
        expires_at: Instant::now()
            + Duration::from_secs(response.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN),
    })
}

/// Return the cached access token, fetching a new one if there is none or it is about to expire.
///
/// The cache is only locked to read or store a token, never across the token request.
fn access_token(
    config: &BaiduOcrConfig,
    cache: &Mutex<Option<AccessToken>>,
) -> Result<String> {
    let cached = cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .filter(|token| token.expires_at > Instant::now())
        .map(|token| token.token.clone());

    if let Some(token) = cached {
        return Ok(token);
    }

    let token = fetch_access_token(config)?;
    let value = token.token.clone();
    *cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    Ok(value)
}

impl BaiduOcr {
    fn forget_access_token(&self) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl OcrService for BaiduOcr {
    fn init(&mut self) -> Result<()> {
        self.config =
            BaiduOcrConfig::load().context("Baidu OCR: Failed to load configuration file")?;
        // credentials may have changed
        self.forget_access_token();
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        self.config
            .save()
            .context("Baidu OCR: Failed to save configuration file")?;
        Ok(())
    }

    fn show_config_ui(&mut self, ui: &mut egui::Ui) {
        self.config.show_ui(ui);
    }

    fn ocr(&mut self, image: Arc<RgbaImage>) -> OcrServiceJob {
        let config = self.config.clone();
        let cache = self.token.clone();

        ServiceJob::new(move || {
            let body = encode_png_base64(&image)?;
            let token = access_token(&config, &cache)?;
            let url = config.model.url();

            debug!("Baidu OCR: Sending {} byte screenshot to `{url}`", body.len());

            let json: Value = attohttpc::post(url)
                .param("access_token", token)
                .form(&[("image", body)])
                .context("Baidu OCR: Failed to encode request form")?
                .send()
                .with_context(|| format!("Baidu OCR: Failed to send request to `{url}`"))?
                .error_for_status()
                .context("Baidu OCR: Request was rejected")?
                .json()
                .context("Baidu OCR: Response was not valid JSON")?;

            let tokens = parse_response(json)?;

            debug!("Baidu OCR: {} text region(s) recognised", tokens.len());

            Ok(tokens)
        })
    }
}
