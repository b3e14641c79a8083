//! Document text extraction
//!
//! Converts fetched HTML, markdown, plain text and (with the `pdf` feature)
//! PDF documents into normalized plain text.

use crate::capabilities::{
    normalize_text, truncate_chars, CapabilityError, ContentType, FetchedDocument, TextExtractor,
};
use async_trait::async_trait;
use scraper::{Html, Selector};

/// Elements whose text never belongs to the readable content.
const SKIPPED_ELEMENTS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "nav", "footer",
];

/// Default [`TextExtractor`] covering every [`ContentType`].
#[derive(Debug, Clone)]
pub struct DocumentExtractor {
    max_chars: usize,
}

impl DocumentExtractor {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new(20_000)
    }
}

/// Readable text of an HTML document.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let skipped = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| SKIPPED_ELEMENTS.contains(&el.name()))
                .unwrap_or(false)
        });
        let text = text.trim();
        if !skipped && !text.is_empty() {
            parts.push(text);
        }
    }

    normalize_text(&parts.join(" "))
}

/// Contents of the `<title>` element, if any.
pub fn html_title(html: &str) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let document = Html::parse_document(html);
    document
        .select(&selector)
        .next()
        .map(|el| normalize_text(&el.text().collect::<String>()))
        .filter(|title| !title.is_empty())
}

#[cfg(feature = "pdf")]
async fn pdf_to_text(bytes: Vec<u8>) -> Result<String, CapabilityError> {
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| CapabilityError::Extract(format!("PDF extraction task failed: {}", e)))?
        .map_err(|e| CapabilityError::Extract(format!("Invalid PDF: {}", e)))
}

#[cfg(not(feature = "pdf"))]
async fn pdf_to_text(_bytes: Vec<u8>) -> Result<String, CapabilityError> {
    Err(CapabilityError::Unavailable(
        "PDF extraction requires the 'pdf' feature".to_string(),
    ))
}

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract(&self, document: &FetchedDocument) -> Result<String, CapabilityError> {
        let text = match document.content_type {
            ContentType::Pdf => normalize_text(&pdf_to_text(document.body.clone()).await?),
            ContentType::Html => html_to_text(&String::from_utf8_lossy(&document.body)),
            ContentType::Markdown | ContentType::PlainText => {
                normalize_text(&String::from_utf8_lossy(&document.body))
            }
        };

        if text.is_empty() {
            return Err(CapabilityError::Extract(format!(
                "no readable text in {}",
                document.url
            )));
        }

        Ok(truncate_chars(&text, self.max_chars).to_string())
    }
}
