//! # edgequake-ocr
//!
//! Single-page OCR behind a pluggable backend, with cooperative
//! cancellation and token metering.
//!
//! ## Why this crate?
//!
//! OCR models come in two shapes: heavyweight local runtimes that want a
//! GPU and a model download, and hosted endpoints that speak the
//! OpenAI-compatible chat completion protocol. Callers should not care
//! which one is doing the work. This crate puts both behind one contract,
//! [`PageExtractorBackend`], and normalises what comes out of them: the
//! same [`Page`] shape, the same error taxonomy, and the same way of
//! telling a clean stop (the user cancelled, the token budget ran out) from
//! a real failure.
//!
//! ## Pipeline Overview
//!
//! ```text
//! page image
//!  │
//!  ├─ 1. Abort   check the caller's probe before any external call
//!  ├─ 2. Encode  PNG → base64 data URL            (remote backend)
//!  ├─ 3. Model   POST /chat/completions │ local engine on a blocking thread
//!  ├─ 4. Abort   check again once the call returns
//!  └─ 5. Page    layouts + token counts
//! ```
//!
//! [`extract_pages`] drives a backend over a whole document, enforcing a
//! token budget and skip policies, and [`to_interrupted_error`] classifies
//! any error as a clean interruption or not.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr::{
//!     ApiPageExtractor, AssetHub, NeverAbort, PageExtractorBackend, PageRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Configured from SILICONFLOW_API_KEY / OCR_API_KEY
//!     let backend = ApiPageExtractor::from_env().ok_or("no OCR API key set")?;
//!     let image = image::open("page-1.png")?;
//!     let hub = AssetHub::new("assets");
//!
//!     let page = backend
//!         .image2page(&image, PageRequest::new(0, &hub, &NeverAbort))
//!         .await?;
//!     println!("{}", page.body_text());
//!     eprintln!("tokens: {} in / {} out", page.input_tokens, page.output_tokens);
//!     Ok(())
//! }
//! ```
//!
//! ## Environment
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SILICONFLOW_API_KEY` / `OCR_API_KEY` | none | API key; the remote backend is unavailable without one |
//! | `OCR_API_BASE_URL` | `https://api.siliconflow.cn/v1` | OpenAI-compatible endpoint root |
//! | `OCR_API_MODEL` | `DeepSeek/DeepSeek-OCR` | Model identifier |
//! | `OCR_API_TIMEOUT_SECS` | none | Per-request timeout |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod extract;
pub mod interrupt;
pub mod local;
pub mod metering;
pub mod page;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use api::ApiPageExtractor;
pub use backend::{PageExtractorBackend, PageRequest};
pub use config::{ApiExtractorConfig, ApiExtractorConfigBuilder, ExtractionConfig, ExtractionConfigBuilder};
pub use error::{
    AbortError, ErrorPolicy, ExtractError, IgnoreOcrErrors, IgnorePdfErrors, InterruptedError, OcrError,
    PdfError, TokenLimitError,
};
pub use extract::{extract_pages, ExtractionReport};
pub use interrupt::{install_hierarchy, to_interrupted_error, Classifier, ForeignInterruption, InterruptionHierarchy};
pub use local::{LocalEngine, LocalExtraction, LocalPageExtractor, LocalRequest};
pub use metering::{check_aborted, check_aborted_after, AbortFlag, AbortProbe, InterruptedKind, NeverAbort, OcrTokensMetering};
pub use page::{AssetHub, OcrSize, Page, PageLayout, Rect};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
