//! Pure per-page stages shared by the backends.
//!
//! ```text
//! image ──▶ encode ──▶ (backend request) ──▶ postprocess
//!           (PNG data URL)                   (normalise text)
//! ```
//!
//! 1. [`encode`]      — PNG-encode and base64-wrap a page image for the
//!    multimodal request body
//! 2. [`postprocess`] — strip lone surrogate escapes from raw responses and
//!    normalise recognised text

pub mod encode;
pub mod postprocess;
