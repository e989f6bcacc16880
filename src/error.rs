//! Error types for the edgequake-ocr library.
//!
//! Four named kinds cover everything a backend can report:
//!
//! * [`PdfError`] — the source document itself is broken (bad page,
//!   unreadable object). Page-scoped; an orchestration policy may skip it.
//! * [`OcrError`] — a backend could not turn one page image into text.
//!   Carries the page index and a backend-defined step index so callers can
//!   tell request-phase failures from response-phase ones.
//! * [`TokenLimitError`] — the token budget ran out. A clean-stop signal,
//!   not a failure.
//! * [`AbortError`] — the caller cancelled. Also a clean-stop signal.
//!
//! Every fallible operation returns the umbrella [`ExtractError`]. The two
//! clean-stop signals (and their equivalents raised by a local model
//! library) are normalised by [`crate::interrupt::to_interrupted_error`]
//! into an [`InterruptedError`]; everything else is a genuine error.

use crate::metering::{InterruptedKind, OcrTokensMetering};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error used for causes the library does not own.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A problem with the source document rather than with OCR.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PdfError {
    pub message: String,
    /// Zero-based page index, when the failing page is known.
    pub page_index: Option<usize>,
}

impl PdfError {
    pub fn new(message: impl Into<String>, page_index: Option<usize>) -> Self {
        Self {
            message: message.into(),
            page_index,
        }
    }
}

/// A backend failed to produce a [`crate::page::Page`] for one page.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct OcrError {
    pub message: String,
    pub page_index: usize,
    /// Which phase failed. Values are defined per backend, see
    /// [`crate::api::STEP_REQUEST`].
    pub step_index: u32,
    #[source]
    pub source: Option<BoxError>,
}

impl OcrError {
    pub fn new(message: impl Into<String>, page_index: usize, step_index: u32) -> Self {
        Self {
            message: message.into(),
            page_index,
            step_index,
            source: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// The token budget was exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("token limit exceeded ({input_tokens} input / {output_tokens} output tokens used)")]
pub struct TokenLimitError {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenLimitError {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn metering(&self) -> OcrTokensMetering {
        OcrTokensMetering::new(self.input_tokens, self.output_tokens)
    }
}

/// The caller requested cancellation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("OCR aborted by user")]
pub struct AbortError {
    /// Usage observed before the abort, if the raiser knew it.
    pub metering: Option<OcrTokensMetering>,
}

impl AbortError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metering(metering: OcrTokensMetering) -> Self {
        Self {
            metering: Some(metering),
        }
    }

    /// Attached usage, or zero.
    pub fn metering(&self) -> OcrTokensMetering {
        self.metering.unwrap_or_default()
    }
}

/// All errors returned by edgequake-ocr operations.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    TokenLimit(#[from] TokenLimitError),

    #[error(transparent)]
    Aborted(#[from] AbortError),

    /// An error raised by a backend library the crate does not own. May
    /// still classify as an interruption if that library's hierarchy is
    /// installed.
    #[error("backend error: {0}")]
    Backend(#[source] BoxError),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ExtractError {
    /// Page-scoped errors that an orchestration policy may choose to skip.
    pub fn is_inline(&self) -> bool {
        matches!(self, ExtractError::Pdf(_) | ExtractError::Ocr(_))
    }

    /// Page index the error refers to, when known.
    pub fn page_index(&self) -> Option<usize> {
        match self {
            ExtractError::Pdf(e) => e.page_index,
            ExtractError::Ocr(e) => Some(e.page_index),
            _ => None,
        }
    }
}

/// A classified clean stop: quota exhaustion or user cancellation.
///
/// Only [`crate::interrupt::to_interrupted_error`] builds these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("OCR interrupted ({kind:?}): {} input / {} output tokens used", .metering.input_tokens, .metering.output_tokens)]
pub struct InterruptedError {
    kind: InterruptedKind,
    metering: OcrTokensMetering,
}

impl InterruptedError {
    pub(crate) fn new(kind: InterruptedKind, metering: OcrTokensMetering) -> Self {
        Self { kind, metering }
    }

    pub fn kind(&self) -> InterruptedKind {
        self.kind
    }

    pub fn metering(&self) -> OcrTokensMetering {
        self.metering
    }

    /// Fold usage spent before the signal was raised into the snapshot.
    pub(crate) fn with_prior_usage(self, prior: OcrTokensMetering) -> Self {
        Self {
            kind: self.kind,
            metering: prior + self.metering,
        }
    }
}

// ── Ignore policies ──────────────────────────────────────────────────────

/// Whether a page-scoped error should be skipped or end the run.
pub enum ErrorPolicy<E> {
    /// Return the error to the caller (default).
    Propagate,
    /// Skip every such error.
    IgnoreAll,
    /// Skip the error when the predicate returns `true`.
    Predicate(Arc<dyn Fn(&E) -> bool + Send + Sync>),
}

pub type IgnorePdfErrors = ErrorPolicy<PdfError>;
pub type IgnoreOcrErrors = ErrorPolicy<OcrError>;

impl<E> ErrorPolicy<E> {
    pub fn predicate(f: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        ErrorPolicy::Predicate(Arc::new(f))
    }

    pub fn should_ignore(&self, error: &E) -> bool {
        match self {
            ErrorPolicy::Propagate => false,
            ErrorPolicy::IgnoreAll => true,
            ErrorPolicy::Predicate(f) => f(error),
        }
    }
}

impl<E> Default for ErrorPolicy<E> {
    fn default() -> Self {
        ErrorPolicy::Propagate
    }
}

impl<E> Clone for ErrorPolicy<E> {
    fn clone(&self) -> Self {
        match self {
            ErrorPolicy::Propagate => ErrorPolicy::Propagate,
            ErrorPolicy::IgnoreAll => ErrorPolicy::IgnoreAll,
            ErrorPolicy::Predicate(f) => ErrorPolicy::Predicate(Arc::clone(f)),
        }
    }
}

impl<E> From<bool> for ErrorPolicy<E> {
    fn from(ignore: bool) -> Self {
        if ignore {
            ErrorPolicy::IgnoreAll
        } else {
            ErrorPolicy::Propagate
        }
    }
}

impl<E> fmt::Debug for ErrorPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Propagate => f.write_str("Propagate"),
            ErrorPolicy::IgnoreAll => f.write_str("IgnoreAll"),
            ErrorPolicy::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn ocr_error_display_and_source() {
        let cause = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let e = OcrError::new("OCR API request failed for page 4: reset by peer", 4, 1)
            .with_source(cause);
        assert!(e.to_string().contains("page 4"));
        let source = e.source().expect("cause should be chained");
        assert_eq!(source.to_string(), "reset by peer");
    }

    #[test]
    fn token_limit_display() {
        let e = TokenLimitError::new(100, 7);
        let msg = e.to_string();
        assert!(msg.contains("100"), "got: {msg}");
        assert!(msg.contains('7'), "got: {msg}");
    }

    #[test]
    fn abort_metering_defaults_to_zero() {
        assert_eq!(AbortError::new().metering(), OcrTokensMetering::default());
        let e = AbortError::with_metering(OcrTokensMetering::new(3, 4));
        assert_eq!(e.metering(), OcrTokensMetering::new(3, 4));
    }

    #[test]
    fn inline_errors() {
        assert!(ExtractError::from(PdfError::new("bad xref", Some(2))).is_inline());
        assert!(ExtractError::from(OcrError::new("boom", 1, 1)).is_inline());
        assert!(!ExtractError::from(AbortError::new()).is_inline());
        assert!(!ExtractError::from(TokenLimitError::new(1, 1)).is_inline());
        assert!(!ExtractError::InvalidConfig("x".into()).is_inline());
    }

    #[test]
    fn page_index_is_exposed() {
        assert_eq!(ExtractError::from(OcrError::new("boom", 9, 1)).page_index(), Some(9));
        assert_eq!(ExtractError::from(PdfError::new("bad", None)).page_index(), None);
    }

    #[test]
    fn policies() {
        let err = OcrError::new("boom", 3, 1);
        assert!(!IgnoreOcrErrors::default().should_ignore(&err));
        assert!(IgnoreOcrErrors::from(true).should_ignore(&err));
        assert!(!IgnoreOcrErrors::from(false).should_ignore(&err));

        let odd_pages = IgnoreOcrErrors::predicate(|e| e.page_index % 2 == 1);
        assert!(odd_pages.should_ignore(&err));
        assert!(!odd_pages.should_ignore(&OcrError::new("boom", 4, 1)));
        assert_eq!(format!("{:?}", odd_pages.clone()), "Predicate(<fn>)");
    }
}
