//! Client for the xCM cluster inventory REST API

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ApiConfig;
use crate::{Error, Result};

const CLUSTERS_PATH: &str = "api/cluster_inventory_mgmt/v1/clusters";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One cluster as reported by the inventory service
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub region: String,
}

impl ClusterSummary {
    /// Table cells in column order, with blanks shown as `unknown`
    pub fn row(&self) -> Vec<String> {
        [
            &self.id,
            &self.status,
            &self.kind,
            &self.version,
            &self.platform,
            &self.region,
        ]
        .into_iter()
        .map(|v| or_unknown(v))
        .collect()
    }
}

fn or_unknown(value: &str) -> String {
    if value.is_empty() {
        "unknown".to_string()
    } else {
        value.to_string()
    }
}

/// Authenticated inventory client built from the login state
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl RestClient {
    /// Build a client; needs a stored access token
    pub fn new(config: &ApiConfig) -> Result<Self> {
        config.require_login()?;
        if config.access_token.is_empty() {
            return Err(Error::NotLoggedIn);
        }
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| Error::command_failed(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.url.clone(),
            token: config.access_token.clone(),
        })
    }

    /// `GET .../clusters`
    pub async fn list_clusters(&self) -> Result<Vec<ClusterSummary>> {
        self.get_json(&clusters_url(&self.base_url, None)).await
    }

    /// `GET .../clusters/{id}`
    pub async fn get_cluster(&self, id: &str) -> Result<ClusterSummary> {
        self.get_json(&clusters_url(&self.base_url, Some(id))).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url = %url, "querying cluster inventory");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::command_failed(format!("failed to connect to {}: {}", url, e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::command_failed(format!(
                "inventory returned {} from {}: {}",
                status, url, body
            )));
        }

        let body = response.text().await?;
        decode(&body)
    }
}

fn clusters_url(base: &str, id: Option<&str>) -> String {
    let base = base.trim_end_matches('/');
    match id {
        Some(id) => format!("{}/{}/{}", base, CLUSTERS_PATH, id),
        None => format!("{}/{}", base, CLUSTERS_PATH),
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| Error::command_failed(format!("invalid inventory response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_tolerate_trailing_slash() {
        assert_eq!(
            clusters_url("https://api.example.com/", None),
            "https://api.example.com/api/cluster_inventory_mgmt/v1/clusters"
        );
        assert_eq!(
            clusters_url("https://api.example.com", Some("abc")),
            "https://api.example.com/api/cluster_inventory_mgmt/v1/clusters/abc"
        );
    }

    #[test]
    fn decodes_inventory_listing() {
        let body = r#"[
            {"id": "c1", "status": "Running", "type": "EKS", "version": "1.29",
             "platform": "AWS", "region": "us-west-1"},
            {"id": "c2"}
        ]"#;
        let clusters: Vec<ClusterSummary> = decode(body).unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].kind, "EKS");
        assert_eq!(
            clusters[1].row(),
            vec!["c2", "unknown", "unknown", "unknown", "unknown", "unknown"]
        );
    }

    #[test]
    fn malformed_body_is_an_error() {
        let err = decode::<ClusterSummary>("<html>").unwrap_err();
        assert!(err.to_string().contains("invalid inventory response"));
    }

    #[test]
    fn client_requires_login() {
        let err = RestClient::new(&ApiConfig::default()).err().unwrap();
        assert!(matches!(err, Error::NotLoggedIn));

        let refresh_only = ApiConfig {
            refresh_token: "r".to_string(),
            url: "https://api.example.com".to_string(),
            ..Default::default()
        };
        let err = RestClient::new(&refresh_only).err().unwrap();
        assert!(matches!(err, Error::NotLoggedIn));
    }

    #[test]
    fn serializes_kind_as_type() {
        let cluster = ClusterSummary {
            id: "c1".to_string(),
            kind: "EKS".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&cluster).unwrap();
        assert_eq!(json["type"], "EKS");
    }
}
