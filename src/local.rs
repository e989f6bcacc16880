//! Adapter for locally hosted OCR models.
//!
//! The model runtime is not part of this crate. A runtime plugs in by
//! implementing [`LocalEngine`]; [`LocalPageExtractor`] turns it into a
//! [`PageExtractorBackend`], enforcing the contract's invariants (abort
//! checkpoints, rectangles inside the image, normalised text, degraded
//! fallback layout) so engines don't each have to.
//!
//! Engine runtimes raise their own interruption errors. An engine exposes
//! them through [`LocalEngine::interruption_hierarchy`]; constructing a
//! [`LocalPageExtractor`] installs that hierarchy for
//! [`crate::interrupt::to_interrupted_error`], so the classifier learns
//! about the local library only once one is actually in use.

use crate::backend::{PageExtractorBackend, PageRequest};
use crate::error::{BoxError, ExtractError, OcrError};
use crate::interrupt::{install_hierarchy, Classifier, InterruptionHierarchy};
use crate::metering::{check_aborted, check_aborted_after, OcrTokensMetering};
use crate::page::{AssetHub, OcrSize, Page, PageLayout};
use crate::pipeline::postprocess::normalize_text;
use async_trait::async_trait;
use image::DynamicImage;
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Step index for a failure inside the engine's inference call.
pub const STEP_INFERENCE: u32 = 1;

/// What a [`LocalEngine`] is asked to do for one page.
#[derive(Debug, Clone)]
pub struct LocalRequest {
    pub image: DynamicImage,
    pub page_index: usize,
    pub asset_hub: AssetHub,
    pub ocr_size: OcrSize,
    pub includes_footnotes: bool,
    pub plot_path: Option<PathBuf>,
    pub max_tokens: Option<u64>,
    pub max_output_tokens: Option<u32>,
    pub device_number: Option<u32>,
}

/// Raw engine output, before the adapter normalises it.
#[derive(Debug, Clone, Default)]
pub struct LocalExtraction {
    pub body_layouts: Vec<PageLayout>,
    pub footnotes_layouts: Vec<PageLayout>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A blocking, locally hosted OCR model runtime.
pub trait LocalEngine: Send + Sync + 'static {
    fn download_models(&self, revision: Option<&str>) -> Result<(), BoxError>;

    fn load_models(&self) -> Result<(), BoxError>;

    /// Run the model on one page. Called on a blocking thread.
    fn extract(&self, request: &LocalRequest) -> Result<LocalExtraction, BoxError>;

    /// The runtime's own interruption errors, if it raises any.
    fn interruption_hierarchy(&self) -> Option<Arc<dyn InterruptionHierarchy>> {
        None
    }
}

/// [`PageExtractorBackend`] over a [`LocalEngine`].
pub struct LocalPageExtractor {
    engine: Arc<dyn LocalEngine>,
    hierarchy: Option<Arc<dyn InterruptionHierarchy>>,
    loaded: OnceCell<()>,
}

impl LocalPageExtractor {
    pub fn new(engine: Arc<dyn LocalEngine>) -> Self {
        let hierarchy = engine.interruption_hierarchy();
        if let Some(h) = &hierarchy {
            install_hierarchy(Arc::clone(h));
        }
        Self {
            engine,
            hierarchy,
            loaded: OnceCell::new(),
        }
    }

    /// A classifier that knows this engine's interruptions, whether or not
    /// its hierarchy is the one installed process-wide.
    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.hierarchy.clone())
    }

    fn is_interruption(&self, error: &BoxError) -> bool {
        self.hierarchy
            .as_ref()
            .is_some_and(|h| h.resolve(&**error).is_some())
    }

    /// Map an engine error: the runtime's interruptions pass through for the
    /// classifier, anything else becomes an [`OcrError`].
    fn map_engine_error(&self, error: BoxError, page_index: usize) -> ExtractError {
        if self.is_interruption(&error) {
            return ExtractError::Backend(error);
        }
        OcrError::new(
            format!("Local OCR failed for page {page_index}: {error}"),
            page_index,
            STEP_INFERENCE,
        )
        .with_source(error)
        .into()
    }
}

/// Clamp rectangles, normalise text, and give the page a usable body.
fn normalize_extraction(
    mut extraction: LocalExtraction,
    width: u32,
    height: u32,
    includes_footnotes: bool,
) -> LocalExtraction {
    let fix = |layouts: &mut Vec<PageLayout>| {
        for layout in layouts.iter_mut() {
            layout.det = layout.det.clamp_to(width, height);
            layout.text = normalize_text(Some(layout.text.as_str()));
        }
        layouts.sort_by_key(|l| l.order);
    };
    fix(&mut extraction.body_layouts);
    fix(&mut extraction.footnotes_layouts);

    if !includes_footnotes {
        extraction.footnotes_layouts.clear();
    }
    if extraction.body_layouts.is_empty() {
        extraction.body_layouts.push(PageLayout::degraded(width, height, ""));
    }
    extraction
}

#[async_trait]
impl PageExtractorBackend for LocalPageExtractor {
    async fn download_models(&self, revision: Option<&str>) -> Result<(), ExtractError> {
        let engine = Arc::clone(&self.engine);
        let revision = revision.map(str::to_string);
        tokio::task::spawn_blocking(move || engine.download_models(revision.as_deref()))
            .await
            .map_err(|e| ExtractError::Backend(e.into()))?
            .map_err(ExtractError::Backend)
    }

    async fn load_models(&self) -> Result<(), ExtractError> {
        if self.loaded.get().is_some() {
            return Ok(());
        }
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.load_models())
            .await
            .map_err(|e| ExtractError::Backend(e.into()))?
            .map_err(ExtractError::Backend)?;
        let _ = self.loaded.set(());
        info!("Local OCR models loaded");
        Ok(())
    }

    async fn image2page(
        &self,
        image: &DynamicImage,
        request: PageRequest<'_>,
    ) -> Result<Page, ExtractError> {
        let page_index = request.page_index;
        check_aborted(request.aborted)?;
        let start = Instant::now();

        let local_request = LocalRequest {
            image: image.clone(),
            page_index,
            asset_hub: request.asset_hub.clone(),
            ocr_size: request.ocr_size,
            includes_footnotes: request.includes_footnotes,
            plot_path: request.plot_path.map(|p| p.to_path_buf()),
            max_tokens: request.max_tokens,
            max_output_tokens: request.max_output_tokens,
            device_number: request.device_number,
        };
        let engine = Arc::clone(&self.engine);
        let outcome = tokio::task::spawn_blocking(move || engine.extract(&local_request)).await;

        let extraction = match outcome {
            Ok(Ok(extraction)) => extraction,
            Ok(Err(e)) => return Err(self.map_engine_error(e, page_index)),
            Err(join) => {
                warn!("Page {}: local OCR task failed: {}", page_index + 1, join);
                return Err(OcrError::new(
                    format!("Local OCR task failed for page {page_index}: {join}"),
                    page_index,
                    STEP_INFERENCE,
                )
                .with_source(join)
                .into());
            }
        };

        check_aborted_after(
            request.aborted,
            OcrTokensMetering::new(extraction.input_tokens, extraction.output_tokens),
        )?;

        let extraction = normalize_extraction(
            extraction,
            image.width(),
            image.height(),
            request.includes_footnotes,
        );
        debug!(
            "Page {}: {} body / {} footnote layouts, {} input tokens, {} output tokens, {:?}",
            page_index + 1,
            extraction.body_layouts.len(),
            extraction.footnotes_layouts.len(),
            extraction.input_tokens,
            extraction.output_tokens,
            start.elapsed()
        );

        Ok(Page {
            index: page_index,
            image: request.includes_raw_image.then(|| image.clone()),
            body_layouts: extraction.body_layouts,
            footnotes_layouts: extraction.footnotes_layouts,
            input_tokens: extraction.input_tokens,
            output_tokens: extraction.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::tests::{FakeAbortedError, FakeHierarchy, FakeSubtype};
    use crate::interrupt::installed_hierarchy;
    use crate::metering::{AbortFlag, InterruptedKind, NeverAbort};
    use crate::page::Rect;
    use image::{Rgba, RgbaImage};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    enum Behaviour {
        Layouts(LocalExtraction),
        Interrupt(FakeSubtype),
        Fail,
    }

    struct FakeEngine {
        behaviour: Mutex<Option<Behaviour>>,
        loads: AtomicUsize,
        extracts: AtomicUsize,
        seen_footnotes_flag: Mutex<Option<bool>>,
        /// Raised while inference runs.
        abort_on_extract: Option<AbortFlag>,
    }

    impl FakeEngine {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self::unshared(behaviour))
        }

        fn aborting(behaviour: Behaviour, flag: AbortFlag) -> Arc<Self> {
            Arc::new(Self {
                abort_on_extract: Some(flag),
                ..Self::unshared(behaviour)
            })
        }

        fn unshared(behaviour: Behaviour) -> Self {
            Self {
                behaviour: Mutex::new(Some(behaviour)),
                loads: AtomicUsize::new(0),
                extracts: AtomicUsize::new(0),
                seen_footnotes_flag: Mutex::new(None),
                abort_on_extract: None,
            }
        }
    }

    impl LocalEngine for FakeEngine {
        fn download_models(&self, _revision: Option<&str>) -> Result<(), BoxError> {
            Ok(())
        }

        fn load_models(&self) -> Result<(), BoxError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn extract(&self, request: &LocalRequest) -> Result<LocalExtraction, BoxError> {
            self.extracts.fetch_add(1, Ordering::SeqCst);
            *self.seen_footnotes_flag.lock().unwrap() = Some(request.includes_footnotes);
            if let Some(flag) = &self.abort_on_extract {
                flag.abort();
            }
            match self.behaviour.lock().unwrap().take() {
                Some(Behaviour::Layouts(x)) => Ok(x),
                Some(Behaviour::Interrupt(subtype)) => Err(FakeAbortedError {
                    subtype,
                    input_tokens: 900,
                    output_tokens: 100,
                }
                .into()),
                Some(Behaviour::Fail) | None => {
                    Err(io::Error::new(io::ErrorKind::Other, "CUDA out of memory").into())
                }
            }
        }

        fn interruption_hierarchy(&self) -> Option<Arc<dyn InterruptionHierarchy>> {
            Some(Arc::new(FakeHierarchy))
        }
    }

    fn layout(order: usize, det: Rect, text: &str) -> PageLayout {
        PageLayout {
            role: "text".into(),
            det,
            text: text.into(),
            order,
            hash: Some(format!("h{order}")),
        }
    }

    fn page_image() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(100, 50, Rgba([0, 0, 0, 255])))
    }

    #[tokio::test]
    async fn layouts_are_clamped_sorted_and_trimmed() {
        let engine = FakeEngine::new(Behaviour::Layouts(LocalExtraction {
            body_layouts: vec![
                layout(1, Rect::new(0, 25, 150, 80), " second "),
                layout(0, Rect::new(0, 0, 100, 25), "first\n"),
            ],
            footnotes_layouts: vec![layout(0, Rect::new(0, 45, 100, 50), "note")],
            input_tokens: 30,
            output_tokens: 4,
        }));
        let extractor = LocalPageExtractor::new(engine.clone());
        let hub = AssetHub::new("assets");
        let mut req = PageRequest::new(5, &hub, &NeverAbort);
        req.includes_footnotes = true;

        let page = extractor.image2page(&page_image(), req).await.expect("page");
        assert_eq!(page.index, 5);
        assert_eq!(page.body_layouts[0].text, "first");
        assert_eq!(page.body_layouts[1].text, "second");
        assert_eq!(page.body_layouts[1].det, Rect::new(0, 25, 100, 50));
        assert_eq!(page.body_layouts[0].hash.as_deref(), Some("h0"));
        assert_eq!(page.footnotes_layouts.len(), 1);
        assert_eq!((page.input_tokens, page.output_tokens), (30, 4));
        assert_eq!(*engine.seen_footnotes_flag.lock().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn empty_output_degrades_and_drops_unrequested_footnotes() {
        let engine = FakeEngine::new(Behaviour::Layouts(LocalExtraction {
            footnotes_layouts: vec![layout(0, Rect::new(0, 0, 10, 10), "note")],
            ..Default::default()
        }));
        let extractor = LocalPageExtractor::new(engine);
        let hub = AssetHub::new("assets");
        let page = extractor
            .image2page(&page_image(), PageRequest::new(0, &hub, &NeverAbort))
            .await
            .unwrap();
        assert_eq!(page.body_layouts.len(), 1);
        assert_eq!(page.body_layouts[0].det, Rect::full(100, 50));
        assert_eq!(page.body_layouts[0].text, "");
        assert!(page.footnotes_layouts.is_empty());
    }

    #[tokio::test]
    async fn engine_failure_is_step_one_ocr_error() {
        let extractor = LocalPageExtractor::new(FakeEngine::new(Behaviour::Fail));
        let hub = AssetHub::new("assets");
        let err = assert_err!(
            extractor
                .image2page(&page_image(), PageRequest::new(4, &hub, &NeverAbort))
                .await
        );
        assert!(matches!(
            err,
            ExtractError::Ocr(OcrError { page_index: 4, step_index: STEP_INFERENCE, .. })
        ));
        assert!(err.to_interrupted().is_none());
    }

    #[tokio::test]
    async fn engine_interruptions_reach_the_classifier() {
        let extractor = LocalPageExtractor::new(FakeEngine::new(Behaviour::Interrupt(
            FakeSubtype::TokenLimit,
        )));
        assert!(installed_hierarchy().is_some());

        let hub = AssetHub::new("assets");
        let err = assert_err!(
            extractor
                .image2page(&page_image(), PageRequest::new(0, &hub, &NeverAbort))
                .await
        );
        assert!(matches!(err, ExtractError::Backend(_)));

        let outcome = extractor.classifier().classify(&err).expect("interruption");
        assert_eq!(outcome.kind(), InterruptedKind::TokenLimitExceeded);
        assert_eq!((outcome.metering().input_tokens, outcome.metering().output_tokens), (900, 100));
        assert_eq!(err.to_interrupted(), Some(outcome));
    }

    #[tokio::test]
    async fn unknown_engine_interruption_stays_unclassified() {
        let extractor =
            LocalPageExtractor::new(FakeEngine::new(Behaviour::Interrupt(FakeSubtype::Unknown)));
        let hub = AssetHub::new("assets");
        let err = assert_err!(
            extractor
                .image2page(&page_image(), PageRequest::new(0, &hub, &NeverAbort))
                .await
        );
        assert!(matches!(err, ExtractError::Backend(_)));
        assert!(err.to_interrupted().is_none());
    }

    #[tokio::test]
    async fn abort_before_inference_skips_engine() {
        let engine = FakeEngine::new(Behaviour::Fail);
        let extractor = LocalPageExtractor::new(engine.clone());
        let hub = AssetHub::new("assets");
        let flag = AbortFlag::new();
        flag.abort();
        let err = assert_err!(
            extractor
                .image2page(&page_image(), PageRequest::new(0, &hub, &flag))
                .await
        );
        assert!(matches!(err, ExtractError::Aborted(_)));
        assert_eq!(engine.extracts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn abort_during_inference_keeps_its_usage() {
        let flag = AbortFlag::new();
        let engine = FakeEngine::aborting(
            Behaviour::Layouts(LocalExtraction {
                input_tokens: 640,
                output_tokens: 80,
                ..Default::default()
            }),
            flag.clone(),
        );
        let extractor = LocalPageExtractor::new(engine.clone());
        let hub = AssetHub::new("assets");

        let err = assert_err!(
            extractor
                .image2page(&page_image(), PageRequest::new(0, &hub, &flag))
                .await
        );
        assert_eq!(engine.extracts.load(Ordering::SeqCst), 1);
        let outcome = Classifier::default().classify(&err).expect("interruption");
        assert_eq!(outcome.kind(), InterruptedKind::Abort);
        assert_eq!(outcome.metering(), OcrTokensMetering::new(640, 80));
    }

    #[tokio::test]
    async fn load_models_runs_once() {
        let engine = FakeEngine::new(Behaviour::Fail);
        let extractor = LocalPageExtractor::new(engine.clone());
        for _ in 0..3 {
            assert_ok!(extractor.load_models().await);
        }
        assert_ok!(extractor.download_models(Some("main")).await);
        assert_eq!(engine.loads.load(Ordering::SeqCst), 1);
    }
}
