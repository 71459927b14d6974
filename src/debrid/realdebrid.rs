//! RealDebrid REST backend
//!
//! Drives the torrent pipeline against a RealDebrid-shaped API:
//! `instantAvailability` for the cache gate, `addMagnet` for submission,
//! `torrents/info` for status polling, and `selectFiles` for pinning the
//! wanted files. Every request goes through the shared [`RequestClient`]
//! so the configured rate limit covers all endpoints uniformly.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::Result;
use crate::client::{RateLimit, RequestClient};
use crate::config::DebridConfig;
use crate::db::Database;
use crate::debrid::DebridProvider;
use crate::descriptor;
use crate::error::{DebridError, Error};
use crate::types::{Event, Torrent, TorrentFile, TorrentStatus};
use crate::utils::{strip_extension, trim_leading_separators};

/// File extensions treated as publishable video content.
const VIDEO_PATTERN: &str =
    r"(?i)\.(mkv|mp4|avi|mov|wmv|flv|webm|m4v|mpg|mpeg|m2ts|ts|vob|ogv|divx)$";

/// File extensions kept alongside the video files.
const SUBTITLE_PATTERN: &str = r"(?i)\.(srt|sub|ass|ssa|vtt|idx)$";

/// Provider statuses that mean the torrent can never complete.
const FAILED_STATUSES: [&str; 3] = ["error", "dead", "magnet_error"];

/// Response to an `addMagnet` submission.
#[derive(Debug, Deserialize)]
struct AddMagnetResponse {
    #[serde(default)]
    id: String,
}

/// Per-torrent status snapshot from the `torrents/info` endpoint.
#[derive(Debug, Default, Deserialize)]
struct TorrentInfo {
    #[serde(default)]
    status: String,
    #[serde(default)]
    original_filename: String,
    #[serde(default)]
    files: Vec<TorrentInfoFile>,
}

/// One file entry inside a [`TorrentInfo`] snapshot.
#[derive(Debug, Deserialize)]
struct TorrentInfoFile {
    id: i64,
    #[serde(default)]
    path: String,
    #[serde(default)]
    bytes: i64,
}

/// The RealDebrid backend.
///
/// Construct via [`RealDebrid::new`]; all state is cheap-to-share handles,
/// so the backend can sit behind an `Arc` and serve concurrent torrents.
#[derive(Debug)]
pub struct RealDebrid {
    host: String,
    download_uncached: bool,
    poll_interval: Duration,
    max_poll_attempts: u32,
    client: RequestClient,
    db: Arc<Database>,
    events: broadcast::Sender<Event>,
    video_pattern: Regex,
    subtitle_pattern: Regex,
}

impl RealDebrid {
    /// Creates a backend from the debrid section of the configuration.
    ///
    /// An empty `rate_limit` string means unlimited. The API key is baked
    /// into a default `Authorization: Bearer` header shared by every
    /// request.
    ///
    /// # Errors
    ///
    /// Returns an error if the rate limit string is malformed or the API
    /// key contains bytes that cannot appear in a header value.
    pub fn new(
        config: &DebridConfig,
        db: Arc<Database>,
        events: broadcast::Sender<Event>,
    ) -> Result<Self> {
        let limit = if config.rate_limit.trim().is_empty() {
            None
        } else {
            Some(RateLimit::parse(&config.rate_limit)?)
        };

        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", config.api_key);
        let mut value = HeaderValue::from_str(&bearer).map_err(|e| Error::Config {
            message: format!("API key cannot form an Authorization header: {}", e),
            key: Some("debrid.api_key".to_string()),
        })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);

        let video_pattern = Regex::new(VIDEO_PATTERN).map_err(|e| Error::Config {
            message: format!("Invalid video file pattern: {}", e),
            key: None,
        })?;
        let subtitle_pattern = Regex::new(SUBTITLE_PATTERN).map_err(|e| Error::Config {
            message: format!("Invalid subtitle file pattern: {}", e),
            key: None,
        })?;

        Ok(Self {
            host: config.host.trim_end_matches('/').to_string(),
            download_uncached: config.download_uncached,
            poll_interval: config.poll_interval(),
            max_poll_attempts: config.max_poll_attempts,
            client: RequestClient::new(limit, headers)?,
            db,
            events,
            video_pattern,
            subtitle_pattern,
        })
    }

    /// Keeps the provider-reported files that look like video or subtitle
    /// content, mapping them into domain [`TorrentFile`]s.
    ///
    /// Provider paths lead with a separator; it is trimmed so the name can
    /// be joined under the torrent folder.
    fn filter_files(&self, folder: &str, files: &[TorrentInfoFile]) -> Vec<TorrentFile> {
        files
            .iter()
            .filter(|file| {
                self.video_pattern.is_match(&file.path)
                    || self.subtitle_pattern.is_match(&file.path)
            })
            .map(|file| {
                let name = trim_leading_separators(&file.path).to_string();
                let relative_path = if folder.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", folder, name)
                };
                TorrentFile {
                    id: file.id.to_string(),
                    name,
                    size: file.bytes,
                    relative_path,
                }
            })
            .collect()
    }

    /// Broadcasts a lifecycle event. Nobody listening is fine.
    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    /// Best-effort persistence of the torrent row. A store failure must not
    /// lose an otherwise-successful provider transition, so it downgrades
    /// to a warning.
    async fn persist(&self, torrent: &Torrent) {
        if let Err(e) = self.db.upsert_torrent(torrent).await {
            warn!("Failed to persist torrent {}: {}", torrent.info_hash, e);
        }
    }
}

#[async_trait]
impl DebridProvider for RealDebrid {
    async fn is_available(&self, torrent: &Torrent) -> bool {
        let url = format!(
            "{}/torrents/instantAvailability/{}",
            self.host, torrent.info_hash
        );
        let body = match self.client.execute(Method::GET, &url, None).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Availability check for {} failed: {}", torrent.info_hash, e);
                return false;
            }
        };
        let entries: HashMap<String, serde_json::Value> = match serde_json::from_slice(&body) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Failed to decode availability response for {}: {}",
                    torrent.info_hash, e
                );
                return false;
            }
        };

        // The provider keys the response by lowercase hash regardless of
        // the case requested. Uncached hashes come back as an empty array
        // rather than a hoster map.
        let key = torrent.info_hash.to_lowercase();
        let cached = entries.get(&key).is_some_and(|hosters| match hosters {
            serde_json::Value::Object(map) => !map.is_empty(),
            serde_json::Value::Array(values) => !values.is_empty(),
            _ => false,
        });
        if cached {
            info!("Torrent {} is cached at the provider", torrent.name);
        } else {
            info!("Torrent {} is not cached at the provider", torrent.name);
        }
        cached
    }

    async fn submit_magnet(&self, torrent: &mut Torrent) -> Result<()> {
        let url = format!("{}/torrents/addMagnet", self.host);
        let form = [("magnet", torrent.magnet.as_str())];
        let body = self.client.execute(Method::POST, &url, Some(&form)).await?;
        let response: AddMagnetResponse = serde_json::from_slice(&body)?;
        if response.id.is_empty() {
            return Err(Error::Debrid(DebridError::EmptyTorrentId {
                hash: torrent.info_hash.clone(),
                name: torrent.name.clone(),
            }));
        }

        info!(
            "Added torrent {} with provider id {}",
            torrent.name, response.id
        );
        torrent.id = response.id;
        torrent.status = TorrentStatus::Submitted;
        self.emit(Event::Submitted {
            info_hash: torrent.info_hash.clone(),
            id: torrent.id.clone(),
        });
        Ok(())
    }

    async fn check_status(&self, torrent: &mut Torrent) -> Result<()> {
        let url = format!("{}/torrents/info/{}", self.host, torrent.id);
        for attempt in 0..self.max_poll_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.poll_interval).await;
            }

            let body = self.client.execute(Method::GET, &url, None).await?;
            let info: TorrentInfo = serde_json::from_slice(&body)?;

            // The provider names the content folder after the original
            // file, extension stripped. Refresh it every poll; it can be
            // empty until the magnet resolves.
            torrent.folder = strip_extension(&info.original_filename).to_string();

            if FAILED_STATUSES.contains(&info.status.as_str()) {
                return Err(Error::Debrid(DebridError::Provider {
                    hash: torrent.info_hash.clone(),
                    name: torrent.name.clone(),
                    status: info.status,
                }));
            }

            match info.status.as_str() {
                "waiting_files_selection" => {
                    let files = self.filter_files(&torrent.folder, &info.files);
                    if files.is_empty() {
                        return Err(Error::Debrid(DebridError::NoVideoFiles {
                            hash: torrent.info_hash.clone(),
                            name: torrent.name.clone(),
                        }));
                    }
                    let ids: Vec<String> = files.iter().map(|file| file.id.clone()).collect();
                    torrent.files = files;
                    torrent.status = TorrentStatus::SelectingFiles;
                    self.persist(torrent).await;
                    if let Err(e) = self
                        .db
                        .upsert_files(&torrent.info_hash, &torrent.files)
                        .await
                    {
                        warn!(
                            "Failed to persist file listing for {}: {}",
                            torrent.info_hash, e
                        );
                    }

                    let select_url = format!("{}/torrents/selectFiles/{}", self.host, torrent.id);
                    let joined = ids.join(",");
                    let form = [("files", joined.as_str())];
                    self.client
                        .execute(Method::POST, &select_url, Some(&form))
                        .await?;

                    torrent.status = TorrentStatus::Downloading;
                    info!(
                        "Selected {} files for torrent {}",
                        torrent.files.len(),
                        torrent.name
                    );
                    self.emit(Event::FilesSelected {
                        info_hash: torrent.info_hash.clone(),
                        file_count: torrent.files.len(),
                    });
                }
                "downloaded" => {
                    torrent.status = TorrentStatus::Downloaded;
                    self.download_link(torrent).await?;
                    info!("Torrent {} is downloaded at the provider", torrent.name);
                    self.emit(Event::Downloaded {
                        info_hash: torrent.info_hash.clone(),
                        name: torrent.name.clone(),
                    });
                    return Ok(());
                }
                "downloading" => {
                    return Err(Error::Debrid(DebridError::Uncached {
                        hash: torrent.info_hash.clone(),
                        name: torrent.name.clone(),
                    }));
                }
                other => {
                    debug!("Torrent {} is {} at the provider", torrent.name, other);
                }
            }
        }

        Err(Error::Debrid(DebridError::PollBudgetExhausted {
            hash: torrent.info_hash.clone(),
            name: torrent.name.clone(),
            attempts: self.max_poll_attempts,
        }))
    }

    async fn download_link(&self, _torrent: &Torrent) -> Result<()> {
        // Content is consumed from the mounted filesystem, so there is no
        // per-torrent link to unrestrict.
        Ok(())
    }

    async fn process(&self, descriptor: &Path, watch_folder: &Path) -> Result<Torrent> {
        let mut torrent = descriptor::parse(descriptor).await?;
        torrent.watch_folder = watch_folder.to_path_buf();
        info!("Processing torrent {} ({})", torrent.name, torrent.info_hash);
        self.emit(Event::Queued {
            info_hash: torrent.info_hash.clone(),
            name: torrent.name.clone(),
        });
        self.persist(&torrent).await;

        if !self.download_uncached && !self.is_available(&torrent).await {
            torrent.status = TorrentStatus::Skipped;
            self.persist(&torrent).await;
            return Err(Error::Debrid(DebridError::NotCached {
                hash: torrent.info_hash.clone(),
                name: torrent.name.clone(),
            }));
        }

        self.submit_magnet(&mut torrent).await?;
        self.persist(&torrent).await;

        self.check_status(&mut torrent).await?;
        self.persist(&torrent).await;

        Ok(torrent)
    }
}

#[cfg(test)]
// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const HASH: &str = "ABCDEF0123456789ABCDEF0123456789ABCDEF01";

    async fn test_backend(host: &str) -> (RealDebrid, Arc<Database>, TempDir) {
        test_backend_with(host, 5).await
    }

    async fn test_backend_with(
        host: &str,
        max_poll_attempts: u32,
    ) -> (RealDebrid, Arc<Database>, TempDir) {
        let temp = TempDir::new().unwrap();
        let db = Arc::new(
            Database::new(&temp.path().join("blackhole.db"))
                .await
                .unwrap(),
        );
        let config = DebridConfig {
            name: "realdebrid".to_string(),
            host: host.to_string(),
            api_key: "test-key".to_string(),
            folder: temp.path().join("mount"),
            download_uncached: false,
            rate_limit: String::new(),
            poll_interval_secs: 0,
            max_poll_attempts,
        };
        let (events, _rx) = broadcast::channel(64);
        let backend = RealDebrid::new(&config, Arc::clone(&db), events).unwrap();
        (backend, db, temp)
    }

    fn sample_torrent() -> Torrent {
        Torrent {
            id: String::new(),
            info_hash: HASH.to_string(),
            name: "Show.S01.1080p".to_string(),
            size: 0,
            magnet: format!("magnet:?xt=urn:btih:{}&dn=Show.S01.1080p", HASH),
            source_path: PathBuf::from("/watch/show.magnet"),
            folder: String::new(),
            files: Vec::new(),
            status: TorrentStatus::New,
            watch_folder: PathBuf::from("/watch"),
        }
    }

    // Availability Tests

    #[tokio::test]
    async fn availability_response_is_keyed_by_lowercase_hash() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        let lower = HASH.to_lowercase();
        Mock::given(method("GET"))
            .and(path(format!("/torrents/instantAvailability/{}", HASH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                lower.clone(): { "rd": [ { "1": { "filename": "e01.mkv" } } ] }
            })))
            .mount(&mock_server)
            .await;

        let (backend, _db, _temp) = test_backend(&mock_server.uri()).await;
        assert!(backend.is_available(&sample_torrent()).await);
    }

    #[tokio::test]
    async fn availability_empty_hoster_list_means_not_cached() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        let lower = HASH.to_lowercase();
        Mock::given(method("GET"))
            .and(path(format!("/torrents/instantAvailability/{}", HASH)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ lower.clone(): [] })),
            )
            .mount(&mock_server)
            .await;

        let (backend, _db, _temp) = test_backend(&mock_server.uri()).await;
        assert!(!backend.is_available(&sample_torrent()).await);
    }

    #[tokio::test]
    async fn availability_missing_hash_key_means_not_cached() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/torrents/instantAvailability/{}", HASH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&mock_server)
            .await;

        let (backend, _db, _temp) = test_backend(&mock_server.uri()).await;
        assert!(!backend.is_available(&sample_torrent()).await);
    }

    #[tokio::test]
    async fn availability_transport_failure_means_not_cached() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/torrents/instantAvailability/{}", HASH)))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let (backend, _db, _temp) = test_backend(&mock_server.uri()).await;
        assert!(!backend.is_available(&sample_torrent()).await);
    }

    // Submission Tests

    #[tokio::test]
    async fn submit_magnet_assigns_provider_id() {
        use wiremock::matchers::{body_string_contains, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/torrents/addMagnet"))
            .and(body_string_contains("magnet=magnet%3A%3Fxt%3Durn%3Abtih%3A"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "RDID01" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let (backend, _db, _temp) = test_backend(&mock_server.uri()).await;
        let mut torrent = sample_torrent();
        backend.submit_magnet(&mut torrent).await.unwrap();

        assert_eq!(torrent.id, "RDID01");
        assert_eq!(torrent.status, TorrentStatus::Submitted);
    }

    #[tokio::test]
    async fn submit_magnet_rejects_empty_provider_id() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/torrents/addMagnet"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "" })),
            )
            .mount(&mock_server)
            .await;

        let (backend, _db, _temp) = test_backend(&mock_server.uri()).await;
        let mut torrent = sample_torrent();
        let err = backend.submit_magnet(&mut torrent).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Debrid(DebridError::EmptyTorrentId { .. })
        ));
        assert!(torrent.id.is_empty());
    }

    // Status Polling Tests

    fn waiting_body() -> serde_json::Value {
        serde_json::json!({
            "id": "RDID01",
            "status": "waiting_files_selection",
            "original_filename": "Show.S01.1080p.mkv",
            "files": [
                { "id": 1, "path": "/Season 01/e01.mkv", "bytes": 700_000_000 },
                { "id": 2, "path": "/Season 01/release.nfo", "bytes": 1024 },
                { "id": 3, "path": "/Season 01/e01.srt", "bytes": 40_960 }
            ]
        })
    }

    fn downloaded_body() -> serde_json::Value {
        serde_json::json!({
            "id": "RDID01",
            "status": "downloaded",
            "original_filename": "Show.S01.1080p.mkv",
            "files": []
        })
    }

    #[tokio::test]
    async fn check_status_selects_filtered_files_then_completes() {
        use wiremock::matchers::{body_string_contains, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        // First poll reports waiting_files_selection, later polls downloaded.
        // Mocks match in mount order once the first expires.
        Mock::given(method("GET"))
            .and(path("/torrents/info/RDID01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(waiting_body()))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RDID01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(downloaded_body()))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/torrents/selectFiles/RDID01"))
            .and(body_string_contains("files=1%2C3"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (backend, db, _temp) = test_backend(&mock_server.uri()).await;
        let mut torrent = sample_torrent();
        torrent.id = "RDID01".to_string();
        backend.check_status(&mut torrent).await.unwrap();

        assert_eq!(torrent.status, TorrentStatus::Downloaded);
        assert_eq!(torrent.folder, "Show.S01.1080p");
        assert_eq!(torrent.files.len(), 2, "nfo file must be filtered out");
        assert_eq!(torrent.files[0].id, "1");
        assert_eq!(torrent.files[0].name, "Season 01/e01.mkv");
        assert_eq!(
            torrent.files[0].relative_path,
            "Show.S01.1080p/Season 01/e01.mkv"
        );
        assert_eq!(torrent.files[1].id, "3", "subtitles are kept");

        // The filtered listing was persisted at selection time
        let stored = db.get_torrent(HASH).await.unwrap().unwrap();
        assert_eq!(stored.files.len(), 2);
    }

    #[tokio::test]
    async fn check_status_downloading_means_uncached() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RDID01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "downloading",
                "original_filename": "Show.S01.1080p.mkv",
                "files": []
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (backend, _db, _temp) = test_backend(&mock_server.uri()).await;
        let mut torrent = sample_torrent();
        torrent.id = "RDID01".to_string();
        let err = backend.check_status(&mut torrent).await.unwrap_err();

        assert!(matches!(err, Error::Debrid(DebridError::Uncached { .. })));
    }

    #[tokio::test]
    async fn check_status_dead_is_provider_failure() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RDID01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "dead",
                "original_filename": "",
                "files": []
            })))
            .mount(&mock_server)
            .await;

        let (backend, _db, _temp) = test_backend(&mock_server.uri()).await;
        let mut torrent = sample_torrent();
        torrent.id = "RDID01".to_string();
        let err = backend.check_status(&mut torrent).await.unwrap_err();

        match err {
            Error::Debrid(DebridError::Provider { status, .. }) => assert_eq!(status, "dead"),
            other => panic!("expected provider failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn check_status_keeps_polling_through_unknown_statuses() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RDID01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "queued",
                "original_filename": "Show.S01.1080p.mkv",
                "files": []
            })))
            .up_to_n_times(2)
            .expect(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RDID01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(downloaded_body()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (backend, _db, _temp) = test_backend(&mock_server.uri()).await;
        let mut torrent = sample_torrent();
        torrent.id = "RDID01".to_string();
        backend.check_status(&mut torrent).await.unwrap();

        assert_eq!(torrent.status, TorrentStatus::Downloaded);
    }

    #[tokio::test]
    async fn check_status_gives_up_after_poll_budget() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RDID01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "queued",
                "original_filename": "Show.S01.1080p.mkv",
                "files": []
            })))
            .expect(3)
            .mount(&mock_server)
            .await;

        let (backend, _db, _temp) = test_backend_with(&mock_server.uri(), 3).await;
        let mut torrent = sample_torrent();
        torrent.id = "RDID01".to_string();
        let err = backend.check_status(&mut torrent).await.unwrap_err();

        match err {
            Error::Debrid(DebridError::PollBudgetExhausted { attempts, .. }) => {
                assert_eq!(attempts, 3);
            }
            other => panic!("expected poll budget exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn check_status_propagates_transport_errors() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RDID01"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (backend, _db, _temp) = test_backend(&mock_server.uri()).await;
        let mut torrent = sample_torrent();
        torrent.id = "RDID01".to_string();
        let err = backend.check_status(&mut torrent).await.unwrap_err();

        assert!(matches!(err, Error::HttpStatus { status: 503, .. }));
    }

    // File Filtering Tests

    #[tokio::test]
    async fn filter_files_joins_folder_and_trims_separators() {
        let (backend, _db, _temp) = test_backend("http://localhost:1").await;
        let files = vec![
            TorrentInfoFile {
                id: 1,
                path: "/Season 01/e01.mkv".to_string(),
                bytes: 5,
            },
            TorrentInfoFile {
                id: 2,
                path: "/sample/sample.txt".to_string(),
                bytes: 1,
            },
        ];

        let filtered = backend.filter_files("Show", &files);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "Season 01/e01.mkv");
        assert_eq!(filtered[0].relative_path, "Show/Season 01/e01.mkv");
        assert_eq!(filtered[0].id, "1");
        assert_eq!(filtered[0].size, 5);
    }

    #[tokio::test]
    async fn filter_files_without_folder_uses_bare_name() {
        let (backend, _db, _temp) = test_backend("http://localhost:1").await;
        let files = vec![TorrentInfoFile {
            id: 7,
            path: "/movie.mp4".to_string(),
            bytes: 9,
        }];

        let filtered = backend.filter_files("", &files);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].relative_path, "movie.mp4");
    }

    #[tokio::test]
    async fn filter_files_matches_extensions_case_insensitively() {
        let (backend, _db, _temp) = test_backend("http://localhost:1").await;
        let files = vec![
            TorrentInfoFile {
                id: 1,
                path: "/Movie.MKV".to_string(),
                bytes: 1,
            },
            TorrentInfoFile {
                id: 2,
                path: "/Movie.SRT".to_string(),
                bytes: 1,
            },
        ];

        assert_eq!(backend.filter_files("m", &files).len(), 2);
    }

    // Pipeline Tests

    async fn write_magnet(temp: &TempDir) -> PathBuf {
        let path = temp.path().join("show.magnet");
        let uri = format!("magnet:?xt=urn:btih:{}&dn=Show.S01.1080p", HASH);
        tokio::fs::write(&path, uri).await.unwrap();
        path
    }

    #[tokio::test]
    async fn process_skips_uncached_torrent_without_submitting() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/torrents/instantAvailability/{}", HASH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/torrents/addMagnet"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&mock_server)
            .await;

        let (backend, db, temp) = test_backend(&mock_server.uri()).await;
        let descriptor = write_magnet(&temp).await;
        let err = backend
            .process(&descriptor, temp.path())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Debrid(DebridError::NotCached { .. })));
        let stored = db.get_torrent(HASH).await.unwrap().unwrap();
        assert_eq!(stored.status, TorrentStatus::Skipped);
    }

    #[tokio::test]
    async fn process_runs_the_full_pipeline() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        let lower = HASH.to_lowercase();
        Mock::given(method("GET"))
            .and(path(format!("/torrents/instantAvailability/{}", HASH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                lower.clone(): { "rd": [ {} ] }
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/torrents/addMagnet"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "RDID01" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RDID01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(waiting_body()))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/torrents/info/RDID01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(downloaded_body()))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/torrents/selectFiles/RDID01"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (backend, db, temp) = test_backend(&mock_server.uri()).await;
        let descriptor = write_magnet(&temp).await;
        let torrent = backend.process(&descriptor, temp.path()).await.unwrap();

        assert_eq!(torrent.status, TorrentStatus::Downloaded);
        assert_eq!(torrent.id, "RDID01");
        assert_eq!(torrent.watch_folder, temp.path());
        assert_eq!(torrent.files.len(), 2);

        let stored = db.get_torrent(HASH).await.unwrap().unwrap();
        assert_eq!(stored.status, TorrentStatus::Downloaded);
        assert_eq!(stored.id, "RDID01");
        // The descriptor stays on disk; cleanup belongs to the caller
        assert!(descriptor.exists());
    }

    #[tokio::test]
    async fn backend_strips_trailing_slash_from_host() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        let lower = HASH.to_lowercase();
        Mock::given(method("GET"))
            .and(path(format!("/torrents/instantAvailability/{}", HASH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                lower.clone(): { "rd": [ {} ] }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let host = format!("{}/", mock_server.uri());
        let (backend, _db, _temp) = test_backend(&host).await;
        assert!(backend.is_available(&sample_torrent()).await);
    }
}
