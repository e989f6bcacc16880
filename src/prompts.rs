//! Prompts sent alongside each page image.
//!
//! DeepSeek-OCR is steered by a short instruction rather than a long system
//! prompt: `<image>` marks where the image tokens go and the rest selects
//! the output mode. Keeping the text here lets tests assert on it without a
//! live endpoint.

/// Instruction for the remote backend: convert the page to Markdown.
pub const DOCUMENT_TO_MARKDOWN_PROMPT: &str = "<image>\nConvert the document to markdown.";

/// Detail hint for the image part of the request.
pub const IMAGE_DETAIL: &str = "high";
