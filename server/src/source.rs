//! REST content source adapter
//!
//! Talks to a content API exposing spaces, pages and attachments as JSON.
//! Endpoint shape (relative to the base URL):
//!
//! - `GET /api/spaces` -> `[{"key": "...", "name": "..."}]`
//! - `GET /api/spaces/{key}/pages` -> `[{"id": "...", "title": "..."}]`
//! - `GET /api/pages/{id}/body` -> plain text
//! - `GET /api/pages/{id}/attachments` -> `[{"name": "...", "mimeType": "...", "url": "..."}]`
//! - `GET /api/pages/{id}/attachments/{name}` -> raw bytes
//! - `GET /api/spaces/{key}/pages?modifiedSince=<rfc3339>` -> pages

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::ports::ContentSource;
use sentinel_core::types::{AttachmentInfo, Page, Space};
use sentinel_core::{Result, SentinelError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SpaceDto {
    key: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageDto {
    id: String,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentDto {
    name: String,
    mime_type: Option<String>,
    url: Option<String>,
}

/// Content source over a JSON REST API
pub struct RestContentSource {
    client: reqwest::Client,
    base_url: String,
}

impl RestContentSource {
    /// New source against the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SentinelError::source(format!("GET {} failed: {}", url, e)))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SentinelError::not_found(url.to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| SentinelError::source(format!("GET {} failed: {}", url, e)))?;
        response
            .json()
            .await
            .map_err(|e| SentinelError::source(format!("GET {} bad payload: {}", url, e)))
    }
}

#[async_trait]
impl ContentSource for RestContentSource {
    async fn list_spaces(&self) -> Result<Vec<Space>> {
        let spaces: Vec<SpaceDto> = self.get_json(&self.api("spaces")).await?;
        Ok(spaces
            .into_iter()
            .map(|s| Space {
                name: s.name.unwrap_or_else(|| s.key.clone()),
                key: s.key,
            })
            .collect())
    }

    async fn list_pages(&self, space_key: &str) -> Result<Vec<Page>> {
        let pages: Vec<PageDto> = self
            .get_json(&self.api(&format!("spaces/{}/pages", space_key)))
            .await?;
        Ok(pages
            .into_iter()
            .map(|p| Page {
                title: p.title.unwrap_or_else(|| p.id.clone()),
                id: p.id,
            })
            .collect())
    }

    async fn fetch_page_body(&self, page_id: &str) -> Result<String> {
        let url = self.api(&format!("pages/{}/body", page_id));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SentinelError::source(format!("GET {} failed: {}", url, e)))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SentinelError::not_found(format!("page {}", page_id)));
        }
        response
            .error_for_status()
            .map_err(|e| SentinelError::source(format!("GET {} failed: {}", url, e)))?
            .text()
            .await
            .map_err(|e| SentinelError::source(format!("GET {} bad payload: {}", url, e)))
    }

    async fn list_attachments(&self, page_id: &str) -> Result<Vec<AttachmentInfo>> {
        let attachments: Vec<AttachmentDto> = self
            .get_json(&self.api(&format!("pages/{}/attachments", page_id)))
            .await?;
        Ok(attachments
            .into_iter()
            .map(|a| {
                let mut info = AttachmentInfo::from_name(a.name);
                info.mime_type = a.mime_type;
                info.url = a.url;
                info
            })
            .collect())
    }

    async fn download_attachment(&self, page_id: &str, name: &str) -> Result<Vec<u8>> {
        let url = self.api(&format!("pages/{}/attachments/{}", page_id, name));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SentinelError::source(format!("GET {} failed: {}", url, e)))?
            .error_for_status()
            .map_err(|e| SentinelError::source(format!("GET {} failed: {}", url, e)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SentinelError::source(format!("GET {} bad payload: {}", url, e)))?;
        Ok(bytes.to_vec())
    }

    async fn list_modified_since(
        &self,
        space_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Page>> {
        let pages: Vec<PageDto> = self
            .get_json(&self.api(&format!(
                "spaces/{}/pages?modifiedSince={}",
                space_key,
                since.to_rfc3339()
            )))
            .await?;
        Ok(pages
            .into_iter()
            .map(|p| Page {
                title: p.title.unwrap_or_else(|| p.id.clone()),
                id: p.id,
            })
            .collect())
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn probe(&self) -> Result<()> {
        let _: Vec<SpaceDto> = self.get_json(&self.api("spaces")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let source = RestContentSource::new("http://wiki.internal/");
        assert_eq!(source.base_url(), "http://wiki.internal");
        assert_eq!(source.api("spaces"), "http://wiki.internal/api/spaces");
    }

    #[test]
    fn test_attachment_dto_mapping() {
        let dto: AttachmentDto = serde_json::from_str(
            r#"{"name": "report.PDF", "mimeType": "application/pdf", "url": "http://x/a"}"#,
        )
        .unwrap();
        let mut info = AttachmentInfo::from_name(dto.name);
        info.mime_type = dto.mime_type;
        info.url = dto.url;
        assert_eq!(info.extension, "pdf");
        assert_eq!(info.mime_type.as_deref(), Some("application/pdf"));
    }
}
