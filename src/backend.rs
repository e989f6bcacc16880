//! The extraction backend contract.
//!
//! Every backend implements [`PageExtractorBackend`]: the remote
//! [`crate::api::ApiPageExtractor`], the [`crate::local::LocalPageExtractor`]
//! adapter, and anything a caller plugs in. Callers pick a backend once,
//! call the lifecycle hooks, then call [`PageExtractorBackend::image2page`]
//! per page.
//!
//! ## Cancellation checkpoints
//!
//! Implementations must call [`crate::metering::check_aborted`] on
//! `request.aborted` before issuing any blocking external call and again
//! after it returns, so a cancellation requested mid-page is noticed at the
//! next checkpoint rather than at the end of the document. The second
//! checkpoint goes through [`crate::metering::check_aborted_after`] with the
//! tokens the call reported, so an abort never drops usage already spent.
//!
//! ## Thread safety
//!
//! Backends are `Send + Sync` so they can sit behind an `Arc`, but the
//! contract does not promise that concurrent `image2page` calls on one
//! instance are useful; callers wanting parallelism should prefer one
//! instance per worker unless a backend documents otherwise.

use crate::error::ExtractError;
use crate::metering::AbortProbe;
use crate::page::{AssetHub, OcrSize, Page};
use async_trait::async_trait;
use image::DynamicImage;
use std::fmt;
use std::path::Path;

/// Per-page parameters for [`PageExtractorBackend::image2page`].
#[derive(Clone, Copy)]
pub struct PageRequest<'a> {
    /// Zero-based index, copied verbatim into [`Page::index`].
    pub page_index: usize,
    pub asset_hub: &'a AssetHub,
    pub ocr_size: OcrSize,
    pub includes_footnotes: bool,
    /// Keep the source image in the result. Leave off for large documents.
    pub includes_raw_image: bool,
    /// Where a backend may write a debug plot of detected regions.
    pub plot_path: Option<&'a Path>,
    /// Token budget for backends that enforce one themselves.
    pub max_tokens: Option<u64>,
    /// Generation cap, forwarded when the backend supports one.
    pub max_output_tokens: Option<u32>,
    /// Accelerator ordinal for local engines.
    pub device_number: Option<u32>,
    pub aborted: &'a dyn AbortProbe,
}

impl<'a> PageRequest<'a> {
    /// A request with default options for `page_index`.
    pub fn new(page_index: usize, asset_hub: &'a AssetHub, aborted: &'a dyn AbortProbe) -> Self {
        Self {
            page_index,
            asset_hub,
            ocr_size: OcrSize::default(),
            includes_footnotes: false,
            includes_raw_image: false,
            plot_path: None,
            max_tokens: None,
            max_output_tokens: None,
            device_number: None,
            aborted,
        }
    }
}

impl fmt::Debug for PageRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageRequest")
            .field("page_index", &self.page_index)
            .field("asset_hub", &self.asset_hub)
            .field("ocr_size", &self.ocr_size)
            .field("includes_footnotes", &self.includes_footnotes)
            .field("includes_raw_image", &self.includes_raw_image)
            .field("plot_path", &self.plot_path)
            .field("max_tokens", &self.max_tokens)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("device_number", &self.device_number)
            .field("aborted", &"<dyn AbortProbe>")
            .finish()
    }
}

/// Capability set every extraction backend provides.
#[async_trait]
pub trait PageExtractorBackend: Send + Sync {
    /// Best-effort prefetch of model assets. A no-op is valid and must not
    /// fail for backends without local assets.
    async fn download_models(&self, revision: Option<&str>) -> Result<(), ExtractError> {
        let _ = revision;
        Ok(())
    }

    /// One-time warm-up. Must be idempotent.
    async fn load_models(&self) -> Result<(), ExtractError> {
        Ok(())
    }

    /// Recognise one page image.
    ///
    /// Failures specific to the backend surface as
    /// [`ExtractError::Ocr`] carrying `request.page_index` and a step index
    /// that is stable for the backend.
    async fn image2page(
        &self,
        image: &DynamicImage,
        request: PageRequest<'_>,
    ) -> Result<Page, ExtractError>;
}
