//! External checker seam.

use mdspell_core::{atd, Error, RawMatch};

#[tower_lsp::async_trait]
pub trait Checker: Send + Sync {
    /// Check already normalized text; reports carry no positions.
    async fn check(&self, language: &str, text: &str) -> Result<Vec<RawMatch>, Error>;
}

/// Posts documents to an After the Deadline service.
pub struct AtdChecker {
    http: reqwest::Client,
    key: String,
}

impl AtdChecker {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            key: atd::request_key(&atd::host_name()),
        }
    }
}

#[tower_lsp::async_trait]
impl Checker for AtdChecker {
    async fn check(&self, language: &str, text: &str) -> Result<Vec<RawMatch>, Error> {
        let request = atd::CheckRequest::new(language, text, &self.key);
        let body = self
            .http
            .post(&request.url)
            .form(&request.form)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| Error::Checker(e.to_string()))?
            .text()
            .await
            .map_err(|e| Error::Checker(e.to_string()))?;
        let matches = atd::parse_response(&body)?;
        tracing::debug!(language, count = matches.len(), "checker replied");
        Ok(matches)
    }
}
