//! Configuration types.
//!
//! Two configs, two scopes:
//!
//! * [`ApiExtractorConfig`] — how to reach a remote OpenAI-compatible OCR
//!   endpoint. Usually read from the environment with
//!   [`ApiExtractorConfig::from_env`].
//! * [`ExtractionConfig`] — per-run knobs for [`crate::extract::extract_pages`]:
//!   what each page request asks for, token budget, and which page-scoped
//!   errors to skip.
//!
//! Both are built through consuming builders so callers set only what they
//! care about and rely on documented defaults for the rest.

use crate::error::{ExtractError, IgnoreOcrErrors, IgnorePdfErrors};
use crate::interrupt::Classifier;
use crate::page::OcrSize;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

/// Default endpoint (SiliconFlow, which hosts DeepSeek-OCR).
pub const DEFAULT_OCR_API_BASE_URL: &str = "https://api.siliconflow.cn/v1";

/// Default model identifier on [`DEFAULT_OCR_API_BASE_URL`].
pub const DEFAULT_OCR_API_MODEL: &str = "DeepSeek/DeepSeek-OCR";

/// Environment variables consulted by [`ApiExtractorConfig::from_env`], in
/// priority order for the key.
pub const ENV_API_KEYS: [&str; 2] = ["SILICONFLOW_API_KEY", "OCR_API_KEY"];
pub const ENV_BASE_URL: &str = "OCR_API_BASE_URL";
pub const ENV_MODEL: &str = "OCR_API_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "OCR_API_TIMEOUT_SECS";

// ── Remote API ───────────────────────────────────────────────────────────

/// Connection settings for [`crate::api::ApiPageExtractor`].
#[derive(Clone, PartialEq, Eq)]
pub struct ApiExtractorConfig {
    pub api_key: String,
    /// Base URL without a trailing `/`; requests go to
    /// `{base_url}/chat/completions`.
    pub base_url: String,
    pub model: String,
    /// Transport-level timeout in seconds. `None` leaves the HTTP client's
    /// own default in place; the extractor itself never times out.
    pub request_timeout_secs: Option<u64>,
}

impl fmt::Debug for ApiExtractorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiExtractorConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ApiExtractorConfig {
    pub fn builder(api_key: impl Into<String>) -> ApiExtractorConfigBuilder {
        ApiExtractorConfigBuilder {
            config: Self {
                api_key: api_key.into(),
                base_url: DEFAULT_OCR_API_BASE_URL.to_string(),
                model: DEFAULT_OCR_API_MODEL.to_string(),
                request_timeout_secs: None,
            },
        }
    }

    /// Read settings from the process environment.
    ///
    /// Returns `None` when no API key is set: that means "no remote backend
    /// available", not an error.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// [`Self::from_env`] over an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = ENV_API_KEYS.iter().find_map(|name| non_empty(*name))?;
        let mut builder = Self::builder(api_key);
        if let Some(url) = non_empty(ENV_BASE_URL) {
            builder = builder.base_url(url);
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            builder = builder.model(model);
        }
        if let Some(secs) = non_empty(ENV_TIMEOUT_SECS).and_then(|s| s.trim().parse().ok()) {
            builder = builder.request_timeout_secs(secs);
        }
        match builder.build() {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("OCR API key is set but the API configuration is unusable: {}", e);
                None
            }
        }
    }

    /// Full URL of the chat completions endpoint.
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Builder for [`ApiExtractorConfig`].
#[derive(Debug)]
pub struct ApiExtractorConfigBuilder {
    config: ApiExtractorConfig,
}

impl ApiExtractorConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ApiExtractorConfig, ExtractError> {
        let c = &self.config;
        if c.api_key.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("API key must not be empty".into()));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(ExtractError::InvalidConfig(format!(
                "Base URL must be http(s), got '{}'",
                c.base_url
            )));
        }
        if c.model.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("Model must not be empty".into()));
        }
        if c.request_timeout_secs == Some(0) {
            return Err(ExtractError::InvalidConfig(
                "Request timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Extraction run ───────────────────────────────────────────────────────

/// Per-run settings for [`crate::extract::extract_pages`].
#[derive(Clone, Default)]
pub struct ExtractionConfig {
    pub ocr_size: OcrSize,
    /// Ask backends to separate footnotes from body text. Default: false.
    pub includes_footnotes: bool,
    /// Keep each source image in its [`crate::page::Page`]. Default: false,
    /// since a few hundred retained page bitmaps add up quickly.
    pub includes_raw_image: bool,
    /// Directory for per-page debug plots.
    pub plot_dir: Option<PathBuf>,
    /// Token budget for the whole run (input + output). Checked before each
    /// page; forwarded to backends that enforce it themselves.
    pub max_tokens: Option<u64>,
    /// Per-page generation cap.
    pub max_output_tokens: Option<u32>,
    pub device_number: Option<u32>,
    pub ignore_pdf_errors: IgnorePdfErrors,
    pub ignore_ocr_errors: IgnoreOcrErrors,
    pub progress_callback: Option<ProgressCallback>,
    /// Interruption classifier for the run. `None` uses the process-wide
    /// one; set it when the backend's hierarchy may not be the installed one
    /// (see [`crate::local::LocalPageExtractor::classifier`]).
    pub classifier: Option<Classifier>,
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("ocr_size", &self.ocr_size)
            .field("includes_footnotes", &self.includes_footnotes)
            .field("includes_raw_image", &self.includes_raw_image)
            .field("plot_dir", &self.plot_dir)
            .field("max_tokens", &self.max_tokens)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("device_number", &self.device_number)
            .field("ignore_pdf_errors", &self.ignore_pdf_errors)
            .field("ignore_ocr_errors", &self.ignore_ocr_errors)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .field("classifier", &self.classifier)
            .finish()
    }
}

impl ExtractionConfig {
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Plot path for one page, when a plot directory is configured.
    pub fn plot_path(&self, page_index: usize) -> Option<PathBuf> {
        self.plot_dir
            .as_ref()
            .map(|dir| dir.join(format!("page_{}.png", page_index + 1)))
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn ocr_size(mut self, size: OcrSize) -> Self {
        self.config.ocr_size = size;
        self
    }

    pub fn includes_footnotes(mut self, v: bool) -> Self {
        self.config.includes_footnotes = v;
        self
    }

    pub fn includes_raw_image(mut self, v: bool) -> Self {
        self.config.includes_raw_image = v;
        self
    }

    pub fn plot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.plot_dir = Some(dir.into());
        self
    }

    pub fn max_tokens(mut self, n: u64) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = Some(n);
        self
    }

    pub fn device_number(mut self, n: u32) -> Self {
        self.config.device_number = Some(n);
        self
    }

    pub fn ignore_pdf_errors(mut self, policy: impl Into<IgnorePdfErrors>) -> Self {
        self.config.ignore_pdf_errors = policy.into();
        self
    }

    pub fn ignore_ocr_errors(mut self, policy: impl Into<IgnoreOcrErrors>) -> Self {
        self.config.ignore_ocr_errors = policy.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.config.classifier = Some(classifier);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.max_tokens == Some(0) {
            return Err(ExtractError::InvalidConfig("Token budget must be ≥ 1".into()));
        }
        if c.max_output_tokens == Some(0) {
            return Err(ExtractError::InvalidConfig(
                "Output token cap must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
