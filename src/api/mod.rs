//! Remote OCR backend over an OpenAI-compatible chat completions endpoint.
//!
//! Each page becomes one request: a single user message holding the page as
//! a PNG data URL (with a `"high"` detail hint) and a fixed instruction to
//! convert the document to Markdown. The endpoint cannot report regions, so
//! the whole page comes back as one degraded body layout spanning the full
//! image.
//!
//! ## Step indices
//!
//! | Step | Constant | Phase |
//! |------|----------|-------|
//! | 0 | [`STEP_ENCODE`]  | PNG encoding of the page image |
//! | 1 | [`STEP_REQUEST`] | client construction, request issue, response decode |

pub mod transport;
pub mod wire;

use crate::backend::{PageExtractorBackend, PageRequest};
use crate::config::ApiExtractorConfig;
use crate::error::{ExtractError, OcrError};
use crate::metering::{check_aborted, check_aborted_after};
use crate::page::{Page, PageLayout};
use crate::pipeline::encode::image_to_data_url;
use crate::prompts::{DOCUMENT_TO_MARKDOWN_PROMPT, IMAGE_DETAIL};
use async_trait::async_trait;
use image::DynamicImage;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub use transport::{ChatTransport, HttpChatTransport, TransportError};
pub use wire::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ContentPart};

/// Step index for a failure while encoding the page image.
pub const STEP_ENCODE: u32 = 0;

/// Step index for a failure while building the client, issuing the request,
/// or decoding the response.
pub const STEP_REQUEST: u32 = 1;

/// Builds the transport on first use.
pub type TransportFactory =
    Box<dyn Fn(&ApiExtractorConfig) -> Result<Arc<dyn ChatTransport>, TransportError> + Send + Sync>;

/// Page extractor backed by a remote OpenAI-compatible API.
pub struct ApiPageExtractor {
    config: ApiExtractorConfig,
    factory: TransportFactory,
    /// Built once on the first `image2page` and never replaced.
    client: OnceCell<Arc<dyn ChatTransport>>,
}

impl fmt::Debug for ApiPageExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiPageExtractor")
            .field("config", &self.config)
            .field("client_initialised", &self.client.get().is_some())
            .finish()
    }
}

impl ApiPageExtractor {
    /// Extractor using the HTTP transport.
    pub fn new(config: ApiExtractorConfig) -> Self {
        Self::with_transport_factory(config, |config| {
            Ok(Arc::new(HttpChatTransport::new(config)?) as Arc<dyn ChatTransport>)
        })
    }

    /// Extractor whose transport is built by `factory` on first use.
    pub fn with_transport_factory(
        config: ApiExtractorConfig,
        factory: impl Fn(&ApiExtractorConfig) -> Result<Arc<dyn ChatTransport>, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            config,
            factory: Box::new(factory),
            client: OnceCell::new(),
        }
    }

    /// Extractor configured from `SILICONFLOW_API_KEY` / `OCR_API_KEY`,
    /// `OCR_API_BASE_URL`, `OCR_API_MODEL`. `None` if no key is set.
    pub fn from_env() -> Option<Self> {
        ApiExtractorConfig::from_env().map(Self::new)
    }

    pub fn config(&self) -> &ApiExtractorConfig {
        &self.config
    }

    fn client(&self) -> Result<&Arc<dyn ChatTransport>, TransportError> {
        self.client.get_or_try_init(|| {
            debug!("Creating OCR API client for {}", self.config.base_url);
            (self.factory)(&self.config)
        })
    }

    fn build_request(&self, data_url: String, max_output_tokens: Option<u32>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage::user(vec![
                ContentPart::image(data_url, IMAGE_DETAIL),
                ContentPart::text(DOCUMENT_TO_MARKDOWN_PROMPT),
            ])],
            max_tokens: max_output_tokens,
        }
    }

    async fn send(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse, TransportError> {
        self.client()?.create_chat_completion(request).await
    }
}

#[async_trait]
impl PageExtractorBackend for ApiPageExtractor {
    async fn image2page(
        &self,
        image: &DynamicImage,
        request: PageRequest<'_>,
    ) -> Result<Page, ExtractError> {
        let page_index = request.page_index;
        check_aborted(request.aborted)?;
        let start = Instant::now();

        let raw_image = request.includes_raw_image.then(|| image.clone());
        let data_url = image_to_data_url(image).map_err(|e| {
            OcrError::new(
                format!("Failed to encode image for page {page_index}: {e}"),
                page_index,
                STEP_ENCODE,
            )
            .with_source(e)
        })?;
        let chat_request = self.build_request(data_url, request.max_output_tokens);

        let response = self.send(&chat_request).await.map_err(|e| {
            OcrError::new(
                format!("OCR API request failed for page {page_index}: {e}"),
                page_index,
                STEP_REQUEST,
            )
            .with_source(e)
        })?;

        let metering = response.metering();
        check_aborted_after(request.aborted, metering)?;

        let (width, height) = (image.width(), image.height());
        let layout = PageLayout::degraded(width, height, response.first_content().unwrap_or(""));

        info!(
            "Page {}: {} chars, {} input tokens, {} output tokens, {:?}",
            page_index + 1,
            layout.text.len(),
            metering.input_tokens,
            metering.output_tokens,
            start.elapsed()
        );

        Ok(Page {
            index: page_index,
            image: raw_image,
            body_layouts: vec![layout],
            footnotes_layouts: Vec::new(),
            input_tokens: metering.input_tokens,
            output_tokens: metering.output_tokens,
        })
    }
}
