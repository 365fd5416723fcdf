use serde::{Deserialize, Serialize};

/// One installable app as published in the remote catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDescriptor {
    /// May hold `|`-separated fallback names, see `PackageCandidates`
    pub package_name: String,
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(rename = "icon", default)]
    pub icon_url: String,
    pub version: String,
    #[serde(rename = "apk_link")]
    pub apk_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub release_date: Option<String>,
}

/// Catalog endpoint response body
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogResponse {
    pub apps: Vec<AppDescriptor>,
}

/// Blocking HTTP client for the store backend.
#[derive(Clone)]
pub struct CatalogClient {
    pub base_url: String,
    pub apps_endpoint: String,
    pub data_endpoint: String,
    pub secret_key: String,
    pub agent: ureq::Agent,
}
