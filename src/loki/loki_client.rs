//! Batched push of log lines to the Loki HTTP push API (JSON flavour).
//!
//! Entries are grouped into streams by their label set. A stream is pushed as
//! soon as it holds `batch_entries` entries; everything else goes out with the
//! periodic flush.

use super::loki_error::LokiError;
use crate::config::ExporterConfig;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use dashmap::DashMap;
use log::{debug, error, info, warn};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const DEFAULT_BATCH_WAIT: Duration = Duration::from_millis(100);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq)]
pub struct LokiEntry {
    pub labels: BTreeMap<String, String>,
    pub timestamp: DateTime<FixedOffset>,
    pub line: String,
}

#[derive(Debug, Clone)]
pub struct LokiSettings {
    pub push_url: String,
    pub name: String,
    pub tenant_id: String,
    pub batch_wait: Duration,
    pub batch_entries: usize,
    pub http_timeout: Duration,
    /// Offset of the wall clock the SAP system reports alert times in.
    pub offset: FixedOffset,
}

impl LokiSettings {
    /// `None` when no push URL is configured.
    pub fn from_config(config: &ExporterConfig) -> Option<Self> {
        if config.loki_url.is_empty() {
            info!("loki_url option is empty, will not use LOKI to push Alerts");
            return None;
        }
        let offset = match config.loki_time_offset.parse::<FixedOffset>() {
            Ok(offset) => offset,
            Err(e) => {
                error!(
                    "Option loki_time_offset incorrect ({}): {}. Use UTC",
                    config.loki_time_offset, e
                );
                Utc.fix()
            }
        };
        Some(Self {
            push_url: config.loki_url.clone(),
            name: config.loki_name.clone(),
            tenant_id: config.loki_tenant_id.clone(),
            batch_wait: non_zero(config.loki_batch_wait, DEFAULT_BATCH_WAIT),
            batch_entries: config.loki_batch_entries_number.max(1),
            http_timeout: non_zero(config.loki_http_timeout, DEFAULT_HTTP_TIMEOUT),
            offset,
        })
    }
}

fn non_zero(value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        default
    } else {
        value
    }
}

#[derive(Debug, Default)]
struct PendingStream {
    labels: BTreeMap<String, String>,
    values: Vec<(i64, String)>,
}

impl PendingStream {
    fn take(&mut self) -> PendingStream {
        PendingStream {
            labels: self.labels.clone(),
            values: std::mem::take(&mut self.values),
        }
    }
}

#[derive(Serialize)]
struct PushRequest<'a> {
    streams: Vec<PushStream<'a>>,
}

#[derive(Serialize)]
struct PushStream<'a> {
    stream: &'a BTreeMap<String, String>,
    values: Vec<[String; 2]>,
}

pub struct LokiClient {
    client: reqwest::Client,
    settings: LokiSettings,
    streams: DashMap<String, PendingStream>,
}

impl LokiClient {
    pub fn new(settings: LokiSettings) -> Result<Self, LokiError> {
        let client = reqwest::ClientBuilder::new()
            .timeout(settings.http_timeout)
            .build()
            .map_err(|e| LokiError::Request(format!("Client Create Error: {}", e)))?;
        Ok(Self {
            client,
            settings,
            streams: DashMap::new(),
        })
    }

    pub fn from_config(config: &ExporterConfig) -> Result<Option<Self>, LokiError> {
        match LokiSettings::from_config(config) {
            Some(settings) => Ok(Some(Self::new(settings)?)),
            None => Ok(None),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.settings.offset
    }

    /// Entries buffered and not yet pushed.
    pub fn pending(&self) -> usize {
        self.streams.iter().map(|s| s.values.len()).sum()
    }

    pub async fn send(&self, mut entry: LokiEntry) -> Result<(), LokiError> {
        entry
            .labels
            .entry("job".to_string())
            .or_insert_with(|| self.settings.name.clone());
        let key = stream_key(&entry.labels);
        let nanos = entry.timestamp.timestamp_nanos_opt().unwrap_or_default();

        // the map guard must be gone before the push is awaited
        let ready = {
            let mut stream = self.streams.entry(key).or_insert_with(|| PendingStream {
                labels: entry.labels,
                values: Vec::new(),
            });
            stream.values.push((nanos, entry.line));
            if stream.values.len() >= self.settings.batch_entries {
                Some(stream.take())
            } else {
                None
            }
        };

        match ready {
            Some(batch) => self.push(&[batch]).await,
            None => Ok(()),
        }
    }

    /// Pushes everything buffered in one request.
    pub async fn flush_all(&self) -> Result<usize, LokiError> {
        let batches: Vec<PendingStream> = self
            .streams
            .iter_mut()
            .filter(|s| !s.values.is_empty())
            .map(|mut s| s.take())
            .collect();
        self.streams.retain(|_, s| !s.values.is_empty());

        let sent = batches.iter().map(|b| b.values.len()).sum();
        if sent > 0 {
            self.push(&batches).await?;
            debug!("Loki flush: {} entries", sent);
        }
        Ok(sent)
    }

    pub fn spawn_flusher(self: &Arc<Self>) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(client.settings.batch_wait);
            loop {
                ticker.tick().await;
                if let Err(e) = client.flush_all().await {
                    warn!("Loki push failed: {}", e);
                }
            }
        })
    }

    pub async fn shutdown(&self) {
        match self.flush_all().await {
            Ok(sent) => info!("Loki client stopped, {} entries flushed", sent),
            Err(e) => error!("Loki client stopped, final flush failed: {}", e),
        }
    }

    async fn push(&self, batches: &[PendingStream]) -> Result<(), LokiError> {
        let request = PushRequest {
            streams: batches
                .iter()
                .map(|b| PushStream {
                    stream: &b.labels,
                    values: b
                        .values
                        .iter()
                        .map(|(ts, line)| [ts.to_string(), line.clone()])
                        .collect(),
                })
                .collect(),
        };
        let body = serde_json::to_vec(&request)?;

        let response = self
            .client
            .post(&self.settings.push_url)
            .header(CONTENT_TYPE, "application/json")
            .header("X-Scope-OrgID", &self.settings.tenant_id)
            .body(body)
            .send()
            .await
            .map_err(|e| LokiError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LokiError::HttpError(status, text));
        }
        Ok(())
    }
}

/// `{a="1",b="2"}`, stable because the labels are ordered.
fn stream_key(labels: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{}={:?}", k, v)).collect();
    format!("{{{}}}", pairs.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::{mock, Matcher};

    fn settings(path: &str, batch_entries: usize) -> LokiSettings {
        LokiSettings {
            push_url: format!("{}{}", mockito::server_url(), path),
            name: "sap_alerts".to_string(),
            tenant_id: "tenant1".to_string(),
            batch_wait: Duration::from_millis(100),
            batch_entries,
            http_timeout: Duration::from_secs(1),
            offset: FixedOffset::east_opt(3 * 3600).unwrap(),
        }
    }

    fn entry(object: &str, line: &str) -> LokiEntry {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        LokiEntry {
            labels: BTreeMap::from([
                ("Object".to_string(), object.to_string()),
                ("level".to_string(), "warning".to_string()),
            ]),
            timestamp: offset.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
            line: line.to_string(),
        }
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = ExporterConfig::default();
        assert!(LokiSettings::from_config(&config).is_none());

        config.loki_url = "http://loki:3100/loki/api/v1/push".to_string();
        config.loki_batch_entries_number = 0;
        config.loki_time_offset = "Europe/Moscow".to_string();
        let settings = LokiSettings::from_config(&config).unwrap();
        assert_eq!(settings.batch_entries, 1);
        assert_eq!(settings.offset, Utc.fix());

        config.loki_time_offset = "+03:00".to_string();
        let settings = LokiSettings::from_config(&config).unwrap();
        assert_eq!(settings.offset.local_minus_utc(), 3 * 3600);
    }

    #[test]
    fn test_stream_key_is_ordered() {
        let labels = BTreeMap::from([
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "x\"y".to_string()),
        ]);
        assert_eq!(stream_key(&labels), r#"{a="x\"y",b="2"}"#);
    }

    #[actix_rt::test]
    async fn test_full_stream_is_pushed() {
        let m = mock("POST", "/batch/loki/api/v1/push")
            .match_header("X-Scope-OrgID", "tenant1")
            .match_header("content-type", "application/json")
            .match_body(Matcher::JsonString(
                r#"{"streams":[{"stream":{"Object":"R3Services","job":"sap_alerts","level":"warning"},
                "values":[["1740812400000000000","first"],["1740812400000000000","second"]]}]}"#
                    .to_string(),
            ))
            .with_status(204)
            .expect(1)
            .create();

        let client = LokiClient::new(settings("/batch/loki/api/v1/push", 2)).unwrap();
        client.send(entry("R3Services", "first")).await.unwrap();
        assert_eq!(client.pending(), 1);
        client.send(entry("R3Services", "second")).await.unwrap();
        assert_eq!(client.pending(), 0);
        m.assert();
    }

    #[actix_rt::test]
    async fn test_flush_sends_all_streams() {
        let m = mock("POST", "/flush/loki/api/v1/push")
            .match_body(Matcher::Regex("OperatingSystem".to_string()))
            .with_status(204)
            .expect(1)
            .create();

        let client = LokiClient::new(settings("/flush/loki/api/v1/push", 100)).unwrap();
        client.send(entry("R3Services", "a")).await.unwrap();
        client.send(entry("OperatingSystem", "b")).await.unwrap();
        assert_eq!(client.pending(), 2);

        assert_eq!(client.flush_all().await.unwrap(), 2);
        assert_eq!(client.pending(), 0);
        // nothing left, no request
        assert_eq!(client.flush_all().await.unwrap(), 0);
        m.assert();
    }

    #[actix_rt::test]
    async fn test_push_error_status() {
        let _m = mock("POST", "/reject/loki/api/v1/push")
            .with_status(400)
            .with_body("entry too far behind")
            .create();

        let client = LokiClient::new(settings("/reject/loki/api/v1/push", 1)).unwrap();
        let err = client.send(entry("R3Services", "old")).await.unwrap_err();
        match err {
            LokiError::HttpError(status, body) => {
                assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
                assert_eq!(body, "entry too far behind");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
