// SAPControl web service: trait + SOAP/HTTP implementation
use super::sap_error::SapError;
use super::scrape_context::ScrapeContext;
use super::soap_envelope::{build_request, extract_response, parse_document};
use super::soap_types::*;
use crate::config::exporter_config::ExporterConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

const FALLBACK_ACCESS_POINTS: [&str; 2] = ["/SAPControl.cgi", "/sap/bc/webdynpro/sap/dba_control"];

#[async_trait]
pub trait WebService: Send + Sync {
    /// Instances of the whole SAP system, asked from the configured central instance.
    async fn list_system_instances(
        &self,
        ctx: &ScrapeContext,
    ) -> Result<GetSystemInstanceListResponse, SapError>;

    async fn get_instance_properties(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<GetInstancePropertiesResponse, SapError>;

    /// Processes started by sapstartsrv according to the start profile.
    async fn get_process_list(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<GetProcessListResponse, SapError>;

    /// Work process and ICM queues, similar to dpmon.
    async fn get_queue_statistic(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<GetQueueStatisticResponse, SapError>;

    async fn get_alerts(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<GetAlertsResponse, SapError>;

    async fn abap_get_wp_table(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<AbapGetWpTableResponse, SapError>;

    async fn enq_get_statistic(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<EnqGetStatisticResponse, SapError>;
}

#[derive(Clone)]
pub struct SoapWebService {
    client: reqwest::Client,
    sap_control_url: String,
    access_point: String,
    credentials: Option<(String, String)>,
}

impl SoapWebService {
    pub fn new(
        sap_control_url: &str,
        access_point: &str,
        credentials: Option<(String, String)>,
        tls_skip_verify: bool,
        timeout: Duration,
    ) -> Result<Self, SapError> {
        let client = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .danger_accept_invalid_certs(tls_skip_verify)
            .build()
            .map_err(|e| SapError::Request(format!("could not build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            sap_control_url: sap_control_url.trim_end_matches('/').to_string(),
            access_point: access_point.to_string(),
            credentials,
        })
    }

    pub fn from_config(config: &ExporterConfig) -> Result<Self, SapError> {
        let credentials = if config.sap_control_user.is_empty() {
            None
        } else {
            Some((
                config.sap_control_user.clone(),
                config.sap_control_password.clone(),
            ))
        };
        Self::new(
            &config.sap_control_url,
            &config.sap_control_access_point,
            credentials,
            config.tls_skip_verify,
            config.scrape_timeout,
        )
    }

    fn instance_url(&self, endpoint: &str) -> String {
        format!("{}{}", endpoint.trim_end_matches('/'), self.access_point)
    }

    async fn call<T: FromXml>(
        &self,
        ctx: &ScrapeContext,
        url: &str,
        operation: &str,
        params: &[(&str, String)],
    ) -> Result<T, SapError> {
        let envelope = build_request(operation, params);
        let mut req = self
            .client
            .post(url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", "\"\"")
            .timeout(ctx.remaining())
            .body(envelope);
        if let Some((user, password)) = &self.credentials {
            req = req.basic_auth(user, Some(password));
        }

        let start = std::time::Instant::now();
        let (status, body) = ctx
            .run(operation, async {
                let resp = req.send().await.map_err(|e| {
                    SapError::Request(format!("{} failed, endpoint={}, err={}", operation, url, e))
                })?;
                let status = resp.status();
                let body = resp.text().await.map_err(|e| {
                    SapError::HttpError(status, format!("Failed to read response: {}", e))
                })?;
                Ok((status, body))
            })
            .await?;
        log::debug!(
            "{} [{}] took: {:.4}s",
            operation,
            url,
            start.elapsed().as_secs_f64()
        );

        // SOAP faults come back as 500 with a fault body
        match status {
            StatusCode::OK | StatusCode::INTERNAL_SERVER_ERROR => {
                let document = match parse_document(&body) {
                    Ok(document) => document,
                    Err(_) if status != StatusCode::OK => {
                        return Err(SapError::HttpError(status, body));
                    }
                    Err(e) => return Err(e.context(format!("{} endpoint={}", operation, url))),
                };
                let response = extract_response(&document, operation)
                    .map_err(|e| e.context(format!("{} endpoint={}", operation, url)))?;
                if status != StatusCode::OK {
                    return Err(SapError::HttpError(status, body));
                }
                T::from_xml(response)
            }
            _ => Err(SapError::HttpError(
                status,
                format!("{} endpoint={}: {}", operation, url, body),
            )),
        }
    }
}

#[async_trait]
impl WebService for SoapWebService {
    async fn list_system_instances(
        &self,
        ctx: &ScrapeContext,
    ) -> Result<GetSystemInstanceListResponse, SapError> {
        let mut access_points = vec![self.access_point.as_str()];
        for fallback in FALLBACK_ACCESS_POINTS {
            if !access_points.contains(&fallback) {
                access_points.push(fallback);
            }
        }

        let mut errors = Vec::new();
        for access_point in access_points {
            let url = format!("{}{}", self.sap_control_url, access_point);
            let result: Result<GetSystemInstanceListResponse, SapError> = self
                .call(ctx, &url, "GetSystemInstanceList", &[("timeout", "0".to_string())])
                .await;
            match result {
                Ok(response) if response.instances.is_empty() => {
                    errors.push(format!("no instances found at {}", url));
                }
                Ok(response) => {
                    log::debug!("Got instance list from endpoint {}", url);
                    return Ok(response);
                }
                Err(err) => {
                    log::debug!("GetSystemInstanceList at {} failed: {}", url, err);
                    errors.push(err.to_string());
                    if ctx.is_expired() {
                        break;
                    }
                }
            }
        }
        Err(SapError::NoInstances(format!(
            "GetSystemInstanceList: failed to get instances from any endpoint: {}",
            errors.join(", ")
        )))
    }

    async fn get_instance_properties(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<GetInstancePropertiesResponse, SapError> {
        self.call(ctx, &self.instance_url(endpoint), "GetInstanceProperties", &[])
            .await
    }

    async fn get_process_list(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<GetProcessListResponse, SapError> {
        self.call(ctx, &self.instance_url(endpoint), "GetProcessList", &[])
            .await
    }

    async fn get_queue_statistic(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<GetQueueStatisticResponse, SapError> {
        self.call(ctx, &self.instance_url(endpoint), "GetQueueStatistic", &[])
            .await
    }

    async fn get_alerts(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<GetAlertsResponse, SapError> {
        self.call(ctx, &self.instance_url(endpoint), "GetAlerts", &[])
            .await
    }

    async fn abap_get_wp_table(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<AbapGetWpTableResponse, SapError> {
        self.call(ctx, &self.instance_url(endpoint), "ABAPGetWPTable", &[])
            .await
    }

    async fn enq_get_statistic(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<EnqGetStatisticResponse, SapError> {
        self.call(ctx, &self.instance_url(endpoint), "EnqGetStatistic", &[])
            .await
    }
}
