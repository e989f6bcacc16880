//! Document-level extraction driver.
//!
//! Feeds rasterised pages to a [`PageExtractorBackend`] one at a time,
//! applying the run-wide rules the per-page contract leaves to the caller:
//!
//! * abort is checked before every page;
//! * the token budget is checked against cumulative usage before every page;
//! * page-scoped errors are skipped or returned according to
//!   [`ExtractionConfig::ignore_pdf_errors`] and
//!   [`ExtractionConfig::ignore_ocr_errors`];
//! * anything that classifies as an interruption ends the run cleanly, with
//!   the usage of every completed page folded into the outcome;
//! * every other error propagates unchanged.
//!
//! Rasterisation is the caller's job: `pages` yields `(index, image)` pairs
//! or a [`PdfError`] for pages the renderer could not produce.

use crate::backend::{PageExtractorBackend, PageRequest};
use crate::config::ExtractionConfig;
use crate::error::{AbortError, ExtractError, InterruptedError, OcrError, PdfError, TokenLimitError};
use crate::interrupt::to_interrupted_error;
use crate::metering::{AbortProbe, OcrTokensMetering};
use crate::page::{AssetHub, Page};
use crate::progress::{ExtractionProgressCallback, NoopProgressCallback};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What a run produced.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Recognised pages in input order.
    pub pages: Vec<Page>,
    /// PDF errors skipped by policy.
    pub skipped_pdf: Vec<PdfError>,
    /// OCR errors skipped by policy.
    pub skipped_ocr: Vec<OcrError>,
    /// Tokens spent across the run, including the page that was
    /// interrupted when the signal carried counts.
    pub metering: OcrTokensMetering,
    /// Set when the run stopped early on abort or token exhaustion.
    pub interrupted: Option<InterruptedError>,
}

impl ExtractionReport {
    /// True when every page was attempted and none were skipped.
    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none() && self.skipped_pdf.is_empty() && self.skipped_ocr.is_empty()
    }
}

/// Run `backend` over `pages`.
///
/// Returns `Ok` for complete, partially skipped and cleanly interrupted
/// runs alike; inspect [`ExtractionReport::interrupted`] and
/// [`ExtractionReport::is_complete`]. `Err` means a genuine failure.
pub async fn extract_pages<B, I>(
    backend: &B,
    pages: I,
    asset_hub: &AssetHub,
    config: &ExtractionConfig,
    aborted: &dyn AbortProbe,
) -> Result<ExtractionReport, ExtractError>
where
    B: PageExtractorBackend + ?Sized,
    I: IntoIterator<Item = Result<(usize, DynamicImage), PdfError>>,
{
    let progress: Arc<dyn ExtractionProgressCallback> = config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback));
    let start = Instant::now();
    let mut report = ExtractionReport::default();

    progress.on_extraction_start();

    for item in pages {
        // Checks raised here carry the cumulative counts themselves.
        if let Err(signal) = run_checks(config, aborted, report.metering) {
            return match classify(config, &signal) {
                Some(outcome) => Ok(stop(report, outcome, &*progress)),
                None => Err(signal),
            };
        }

        let (page_index, image) = match item {
            Ok(page) => page,
            Err(e) if config.ignore_pdf_errors.should_ignore(&e) => {
                warn!("Skipping unreadable page {:?}: {}", e.page_index, e);
                progress.on_page_error(e.page_index, &e.to_string());
                report.skipped_pdf.push(e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        progress.on_page_start(page_index);
        let plot_path = config.plot_path(page_index);
        let request = PageRequest {
            page_index,
            asset_hub,
            ocr_size: config.ocr_size,
            includes_footnotes: config.includes_footnotes,
            includes_raw_image: config.includes_raw_image,
            plot_path: plot_path.as_deref(),
            max_tokens: config
                .max_tokens
                .map(|max| max.saturating_sub(report.metering.total())),
            max_output_tokens: config.max_output_tokens,
            device_number: config.device_number,
            aborted,
        };

        match backend.image2page(&image, request).await {
            Ok(page) => {
                let text_len = page.body_text().len();
                report.metering += page.metering();
                debug!(
                    "Page {}: {} chars, running total {} tokens",
                    page_index + 1,
                    text_len,
                    report.metering.total()
                );
                progress.on_page_complete(page_index, text_len);
                report.pages.push(page);
            }
            Err(err) => {
                if let Some(outcome) = classify(config, &err) {
                    let outcome = outcome.with_prior_usage(report.metering);
                    return Ok(stop(report, outcome, &*progress));
                }
                match err {
                    ExtractError::Ocr(e) if config.ignore_ocr_errors.should_ignore(&e) => {
                        warn!("Page {}: skipping OCR failure: {}", e.page_index + 1, e);
                        progress.on_page_error(Some(e.page_index), &e.to_string());
                        report.skipped_ocr.push(e);
                    }
                    ExtractError::Pdf(e) if config.ignore_pdf_errors.should_ignore(&e) => {
                        warn!("Page {}: skipping PDF failure: {}", page_index + 1, e);
                        progress.on_page_error(e.page_index.or(Some(page_index)), &e.to_string());
                        report.skipped_pdf.push(e);
                    }
                    other => return Err(other),
                }
            }
        }
    }

    info!(
        "Extracted {} pages ({} skipped) in {:?}, {} input / {} output tokens",
        report.pages.len(),
        report.skipped_pdf.len() + report.skipped_ocr.len(),
        start.elapsed(),
        report.metering.input_tokens,
        report.metering.output_tokens
    );
    progress.on_extraction_complete(report.pages.len(), report.metering);
    Ok(report)
}

/// Abort and budget checks run before each page.
fn run_checks(
    config: &ExtractionConfig,
    aborted: &dyn AbortProbe,
    used: OcrTokensMetering,
) -> Result<(), ExtractError> {
    if aborted.is_aborted() {
        return Err(AbortError::with_metering(used).into());
    }
    if let Some(max) = config.max_tokens {
        if used.total() >= max {
            return Err(TokenLimitError::new(used.input_tokens, used.output_tokens).into());
        }
    }
    Ok(())
}

fn classify(config: &ExtractionConfig, error: &ExtractError) -> Option<InterruptedError> {
    match &config.classifier {
        Some(classifier) => classifier.classify(error),
        None => to_interrupted_error(error),
    }
}

/// End the run on a classified interruption whose metering already covers
/// the whole run.
fn stop(
    mut report: ExtractionReport,
    outcome: InterruptedError,
    progress: &dyn ExtractionProgressCallback,
) -> ExtractionReport {
    info!(
        "Extraction interrupted ({:?}) after {} pages: {} input / {} output tokens",
        outcome.kind(),
        report.pages.len(),
        outcome.metering().input_tokens,
        outcome.metering().output_tokens
    );
    report.metering = outcome.metering();
    progress.on_interrupted(&outcome);
    report.interrupted = Some(outcome);
    report
}
