//! Interruption classifier.
//!
//! Decides whether an error is a *clean interruption* (the caller
//! cancelled, or the token budget ran out) rather than a genuine failure,
//! and if so produces an [`InterruptedError`] carrying the token usage seen
//! at that moment.
//!
//! Two tiers, first match wins:
//!
//! 1. Errors this crate defines: [`TokenLimitError`] and [`AbortError`],
//!    bare or wrapped in [`ExtractError`].
//! 2. Errors from a local model library, recognised through an
//!    [`InterruptionHierarchy`] that the library's adapter installs at
//!    runtime (see [`crate::local::LocalPageExtractor`]). When no hierarchy
//!    is installed the tier is skipped entirely, so the remote backend works
//!    without any local runtime present.
//!
//! Anything else is not an interruption and must propagate unchanged.

use crate::error::{AbortError, ExtractError, InterruptedError, TokenLimitError};
use crate::metering::{InterruptedKind, OcrTokensMetering};
use once_cell::sync::OnceCell;
use std::error::Error as StdError;
use std::sync::Arc;
use std::fmt;
use tracing::{debug, warn};

/// What a foreign hierarchy reports about an error of its base
/// interruption type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignInterruption {
    /// `None` when the error is of the base type but of a subtype this
    /// crate does not know; such errors are left unclassified.
    pub kind: Option<InterruptedKind>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Structural view of a backend library's own interruption errors.
///
/// The library's exact error types are outside this crate's control, so
/// instead of naming them the classifier asks the hierarchy whether an error
/// belongs to its base interruption type, which subtype it is, and what
/// token counts it exposes.
pub trait InterruptionHierarchy: Send + Sync {
    /// Library name, for logs.
    fn name(&self) -> &str;

    /// `Some` iff `error` is an instance of the library's base interruption
    /// type.
    fn resolve(&self, error: &(dyn StdError + 'static)) -> Option<ForeignInterruption>;
}

static INSTALLED_HIERARCHY: OnceCell<Arc<dyn InterruptionHierarchy>> = OnceCell::new();

/// Make a local library's hierarchy visible to [`to_interrupted_error`].
///
/// Only the first installation takes effect; returns `false` if another
/// hierarchy was already installed. Errors from a different library whose
/// hierarchy was refused are only classified by a [`Classifier`] built with
/// that hierarchy.
pub fn install_hierarchy(hierarchy: Arc<dyn InterruptionHierarchy>) -> bool {
    let name = hierarchy.name().to_string();
    match INSTALLED_HIERARCHY.set(hierarchy) {
        Ok(()) => {
            debug!("Installed interruption hierarchy '{}'", name);
            true
        }
        Err(_) => {
            match INSTALLED_HIERARCHY.get() {
                Some(existing) if existing.name() != name => warn!(
                    "Interruption hierarchy '{}' not installed, '{}' already is; \
                     use a Classifier to classify its errors",
                    name,
                    existing.name()
                ),
                _ => debug!("Interruption hierarchy '{}' already installed", name),
            }
            false
        }
    }
}

/// The hierarchy installed in this process, if any.
pub fn installed_hierarchy() -> Option<Arc<dyn InterruptionHierarchy>> {
    INSTALLED_HIERARCHY.get().cloned()
}

/// Classify `error` using the process-wide hierarchy.
///
/// Returns `None` when `error` is not an interruption.
pub fn to_interrupted_error(error: &(dyn StdError + 'static)) -> Option<InterruptedError> {
    Classifier::new(installed_hierarchy()).classify(error)
}

/// A classifier with an explicit optional hierarchy, independent of the
/// process-wide one.
#[derive(Clone, Default)]
pub struct Classifier {
    hierarchy: Option<Arc<dyn InterruptionHierarchy>>,
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("hierarchy", &self.hierarchy.as_ref().map(|h| h.name()))
            .finish()
    }
}

impl Classifier {
    pub fn new(hierarchy: Option<Arc<dyn InterruptionHierarchy>>) -> Self {
        Self { hierarchy }
    }

    pub fn classify(&self, error: &(dyn StdError + 'static)) -> Option<InterruptedError> {
        // Tier 1: our own signals.
        if let Some(e) = token_limit(error) {
            return Some(InterruptedError::new(
                InterruptedKind::TokenLimitExceeded,
                e.metering(),
            ));
        }
        if let Some(e) = abort(error) {
            return Some(InterruptedError::new(InterruptedKind::Abort, e.metering()));
        }

        // Tier 2: the local library's hierarchy, only if one is present.
        let hierarchy = self.hierarchy.as_ref()?;
        let foreign = match error.downcast_ref::<ExtractError>() {
            Some(ExtractError::Backend(inner)) => hierarchy.resolve(&**inner),
            Some(_) => None,
            None => hierarchy.resolve(error),
        }?;
        let kind = foreign.kind?;
        debug!("Classified {} error as {:?}", hierarchy.name(), kind);
        Some(InterruptedError::new(
            kind,
            OcrTokensMetering::new(foreign.input_tokens, foreign.output_tokens),
        ))
    }
}

fn token_limit<'a>(error: &'a (dyn StdError + 'static)) -> Option<&'a TokenLimitError> {
    match error.downcast_ref::<ExtractError>() {
        Some(ExtractError::TokenLimit(e)) => Some(e),
        Some(_) => None,
        None => error.downcast_ref::<TokenLimitError>(),
    }
}

fn abort<'a>(error: &'a (dyn StdError + 'static)) -> Option<&'a AbortError> {
    match error.downcast_ref::<ExtractError>() {
        Some(ExtractError::Aborted(e)) => Some(e),
        Some(_) => None,
        None => error.downcast_ref::<AbortError>(),
    }
}

impl ExtractError {
    /// Shorthand for [`to_interrupted_error`] on `self`.
    pub fn to_interrupted(&self) -> Option<InterruptedError> {
        to_interrupted_error(self)
    }
}
