use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::parser;
use html_escape::decode_html_entities;
use reqwest::header::{HeaderMap, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};

use crate::app::Result;
use crate::domain::{RawEntry, RawFeedDocument, RawFeedMeta};
use crate::fetcher::Fetcher;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64, user_agent: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .gzip(true)
            .brotli(true)
            .user_agent(user_agent.to_string())
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECS, concat!("tributary/", env!("CARGO_PKG_VERSION")))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<DateTime<Utc>>,
    ) -> Result<RawFeedDocument> {
        let mut headers = HeaderMap::new();

        if let Some(etag) = etag {
            if let Ok(value) = HeaderValue::from_str(etag) {
                headers.insert(IF_NONE_MATCH, value);
            }
        }

        if let Some(last_modified) = last_modified {
            let http_date = last_modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
            if let Ok(value) = HeaderValue::from_str(&http_date) {
                headers.insert(IF_MODIFIED_SINCE, value);
            }
        }

        let response = self.client.get(url).headers(headers).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            return Ok(RawFeedDocument::status_only(status.as_u16()));
        }

        let response_etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let body = response.bytes().await?;

        // Classification of the body belongs to the scraper; an unparseable
        // payload surfaces as a document without metadata, not a hard error.
        let mut document = match parser::parse(body.as_ref()) {
            Ok(parsed) => normalize(parsed),
            Err(e) => {
                tracing::debug!(url, error = %e, "feed body did not parse");
                RawFeedDocument::status_only(status.as_u16())
            }
        };

        document.status = status.as_u16();
        document.etag = response_etag;

        Ok(document)
    }
}

/// Convert a parsed feed-rs model into the transient document consumed by
/// the scraper, decoding HTML entities and pinning dates to UTC.
fn normalize(parsed: feed_rs::model::Feed) -> RawFeedDocument {
    let meta = RawFeedMeta {
        title: parsed
            .title
            .map(|t| decode_html_entities(&t.content).to_string()),
        link: parsed.links.first().map(|l| l.href.clone()),
        version: Some(format!("{:?}", parsed.feed_type).to_lowercase()),
    };

    let entries = parsed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone());
            let comments_url = entry
                .links
                .iter()
                .find(|l| l.rel.as_deref() == Some("replies"))
                .map(|l| l.href.clone());

            RawEntry {
                guid: if entry.id.is_empty() {
                    None
                } else {
                    Some(entry.id)
                },
                link,
                title: entry
                    .title
                    .map(|t| decode_html_entities(&t.content).to_string()),
                content: entry
                    .content
                    .and_then(|c| c.body)
                    .map(|b| decode_html_entities(&b).to_string()),
                summary: entry
                    .summary
                    .map(|s| decode_html_entities(&s.content).to_string()),
                author: entry.authors.first().map(|a| a.name.clone()),
                comments_url,
                updated: entry.updated.map(|dt| dt.with_timezone(&Utc)),
                published: entry.published.map(|dt| dt.with_timezone(&Utc)),
                created: None,
            }
        })
        .collect();

    RawFeedDocument {
        status: 0,
        meta: Some(meta),
        etag: None,
        entries,
    }
}
