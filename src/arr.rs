//! Arr history lookup and failure reporting
//!
//! When a descriptor fails for content reasons, the owning arr still holds
//! the grab in its history and would wait on it forever. Reporting the grab
//! as failed lets the arr blocklist the release and grab an alternative.

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::Result;
use crate::client::RequestClient;
use crate::config::ArrConfig;
use crate::error::Error;

/// History page size requested per lookup.
const HISTORY_PAGE_SIZE: &str = "100";

/// One grab-history record from the arr v3 API.
#[derive(Debug, Deserialize)]
pub struct HistoryRecord {
    /// Record identifier, used to address the failure report.
    #[serde(default)]
    pub id: i64,

    /// Download identifier the arr tracked the grab under. For torrents
    /// this is the uppercased info-hash.
    #[serde(default, rename = "downloadId")]
    pub download_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryPage {
    #[serde(default)]
    records: Vec<HistoryRecord>,
}

/// Maps an arr history event name to its numeric id. Unknown names map to
/// zero and are omitted from the lookup query.
fn event_id(event_type: &str) -> u8 {
    match event_type {
        "grabbed" => 1,
        "seriesFolderDownloaded" => 2,
        "downloadFolderImported" => 3,
        "downloadFailed" => 4,
        "downloadIgnored" => 7,
        _ => 0,
    }
}

/// Client for one arr application's v3 HTTP API.
///
/// A pairing configured without `url` or `token` produces a disabled
/// client whose reporting calls are no-ops, so the owning watch loop can
/// run either way.
pub struct ArrClient {
    base_url: String,
    enabled: bool,
    client: RequestClient,
}

impl ArrClient {
    /// Builds a client for one watch-folder pairing.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured token contains bytes that cannot
    /// appear in an `X-Api-Key` header value.
    pub fn new(config: &ArrConfig) -> Result<Self> {
        let enabled = !config.url.is_empty() && !config.token.is_empty();
        let mut headers = HeaderMap::new();
        if enabled {
            let mut value = HeaderValue::from_str(&config.token).map_err(|e| Error::Config {
                message: format!("Arr token cannot form an X-Api-Key header: {}", e),
                key: Some("arrs.token".to_string()),
            })?;
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static("x-api-key"), value);
        }

        Ok(Self {
            base_url: format!("{}/api/v3", config.url.trim_end_matches('/')),
            enabled,
            // Arr lookups are sparse; no rate limit needed
            client: RequestClient::new(None, headers)?,
        })
    }

    /// Fetches a page of history records for a download identifier.
    ///
    /// Any transport, decode, or URL problem resolves to an empty page
    /// with a warning; history lookups are advisory and must not fail the
    /// caller.
    pub async fn get_history(&self, download_id: &str, event_type: &str) -> Vec<HistoryRecord> {
        let mut url = match Url::parse(&format!("{}/history/", self.base_url)) {
            Ok(url) => url,
            Err(e) => {
                warn!("Invalid arr history URL: {}", e);
                return Vec::new();
            }
        };
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("downloadId", download_id);
            let event = event_id(event_type);
            if event != 0 {
                pairs.append_pair("eventId", &event.to_string());
            }
            pairs.append_pair("pageSize", HISTORY_PAGE_SIZE);
        }

        let body = match self.client.execute(Method::GET, url.as_str(), None).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Arr history lookup for {} failed: {}", download_id, e);
                return Vec::new();
            }
        };
        match serde_json::from_slice::<HistoryPage>(&body) {
            Ok(page) => page.records,
            Err(e) => {
                warn!("Failed to decode arr history response: {}", e);
                Vec::new()
            }
        }
    }

    /// Reports a failed grab back to the arr so it can blocklist the
    /// release and grab an alternative.
    ///
    /// The arr tracks torrent grabs by uppercased info-hash; the matching
    /// grabbed-history record is marked failed. A disabled client, or a
    /// hash with no grabbed record, is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the failure report request itself fails.
    pub async fn report_failed(&self, info_hash: &str) -> Result<()> {
        if !self.enabled {
            debug!(
                "Arr reporting disabled; skipping failure report for {}",
                info_hash
            );
            return Ok(());
        }

        let download_id = info_hash.to_uppercase();
        let records = self.get_history(&download_id, "grabbed").await;
        let matched = records
            .iter()
            .find(|record| record.download_id.eq_ignore_ascii_case(&download_id));
        let Some(record) = matched else {
            debug!(
                "No grabbed history entry for {}; nothing to mark failed",
                download_id
            );
            return Ok(());
        };

        let url = format!("{}/history/failed/{}", self.base_url, record.id);
        self.client.execute(Method::POST, &url, None).await?;
        info!("Marked torrent {} as failed", download_id);
        Ok(())
    }
}
