use async_trait::async_trait;

/// Black-box text extraction over uploaded document bytes.
///
/// Runs on the upload ingress path before the pipeline starts. PDF/DOCX
/// extraction plugs in behind this trait; the crate ships a plain-text
/// implementation.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// Decodes UTF-8 text uploads.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let text = String::from_utf8_lossy(bytes).into_owned();
        if text.trim().is_empty() {
            return Err(ExtractError::NoText);
        }
        Ok(text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("No extractable text in uploaded document")]
    NoText,

    #[error("Text extraction failed: {0}")]
    Failed(String),
}
