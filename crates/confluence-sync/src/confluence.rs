//! # Confluence API Client
//!
//! One interface over the two Confluence deployments.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Cloud vs Data Center                                    │
//! │                                                                         │
//! │                    Cloud                      Data Center               │
//! │  API base          api.atlassian.com/ex/      {base_url}                │
//! │                    confluence/{cloud_id}                                │
//! │  Search path       /wiki/rest/api/content/    /rest/api/content/search  │
//! │                    search                     (+ os_authType=basic)     │
//! │  Space filter      global OR collaboration    global                    │
//! │  Get by id         CQL id=… (first result)    /rest/api/content/{id}    │
//! │  Descendants       CQL ancestor IN (…)        /child/page, breadth-first│
//! │  Web URL           {base}/wiki{webui}         viewpage.action?pageId=…  │
//! │                                                                         │
//! │  Both: Bearer auth, rate-limited client, `_links.next` pagination      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use confluence_core::InstanceType;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::auth::ConfluenceAuth;
use crate::config::ConfluenceConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{with_headers, RateLimitedHttpClient};

/// Results per page for label and descendant searches.
pub const SEARCH_PAGE_SIZE: usize = 25;

/// Results per page for Data Center child listings.
pub const CHILDREN_PAGE_SIZE: usize = 50;

/// Atlassian API gateway for cloud sites.
pub const ATLASSIAN_API_BASE: &str = "https://api.atlassian.com/ex/confluence";

const SEARCH_EXPAND: &str = "metadata.labels,version,space";
const PAGE_EXPAND: &str = "body.storage,version,space,metadata.labels";

// =============================================================================
// Wire Types
// =============================================================================

/// Content item as returned by the Confluence REST v1 API.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfluencePage {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(rename = "type", default)]
    pub content_type: String,

    #[serde(default)]
    pub space: Option<SpaceRef>,

    #[serde(default)]
    pub version: Option<VersionRef>,

    #[serde(default)]
    pub body: Option<PageBody>,

    #[serde(default)]
    pub metadata: Option<PageMetadataRef>,

    #[serde(rename = "_links", default)]
    pub links: Links,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpaceRef {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionRef {
    #[serde(default)]
    pub when: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageBody {
    #[serde(default)]
    pub storage: Option<StorageBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageBody {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMetadataRef {
    #[serde(default)]
    pub labels: Option<LabelList>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelList {
    #[serde(default)]
    pub results: Vec<LabelRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelRef {
    pub name: String,
}

/// `_links` of a page or of a result envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub webui: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Result envelope of every paginated endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct PaginatedResponse<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(rename = "_links", default)]
    pub links: Links,
}

impl ConfluencePage {
    pub fn label_names(&self) -> Vec<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.labels.as_ref())
            .map(|l| l.results.iter().map(|r| r.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Storage-format body, empty when not expanded.
    pub fn storage_body(&self) -> &str {
        self.body
            .as_ref()
            .and_then(|b| b.storage.as_ref())
            .map(|s| s.value.as_str())
            .unwrap_or_default()
    }

    pub fn space(&self) -> SpaceRef {
        self.space.clone().unwrap_or_default()
    }

    pub fn version_when(&self) -> &str {
        self.version
            .as_ref()
            .map(|v| v.when.as_str())
            .unwrap_or_default()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

// =============================================================================
// Pagination
// =============================================================================

/// Follows `_links.next` from `first_url` until it disappears.
///
/// Relative `next` links are appended to `link_base`.
pub async fn fetch_all_paginated<T, F, Fut>(
    first_url: String,
    link_base: &str,
    mut fetch: F,
) -> SyncResult<Vec<T>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = SyncResult<PaginatedResponse<T>>>,
{
    let mut results = Vec::new();
    let mut next = Some(first_url);

    while let Some(url) = next {
        let page = fetch(url).await?;
        results.extend(page.results);
        next = page.links.next.map(|link| {
            if link.starts_with("http://") || link.starts_with("https://") {
                link
            } else {
                format!("{}{}", link_base, link)
            }
        });
    }

    Ok(results)
}

// =============================================================================
// Client Interface
// =============================================================================

/// Source API shared by both deployments.
#[async_trait]
pub trait ConfluenceApi: Send + Sync {
    /// All content carrying either ingest label.
    async fn search_pages_by_label(&self) -> SyncResult<Vec<ConfluencePage>>;

    /// One page with its storage body, `None` if it no longer exists.
    async fn get_page_by_id(&self, page_id: &str) -> SyncResult<Option<ConfluencePage>>;

    /// Every descendant of `root_ids`, at any depth.
    async fn get_descendant_pages(&self, root_ids: &[String]) -> SyncResult<Vec<ConfluencePage>>;

    /// Browser URL of a page.
    fn build_page_web_url(&self, page: &ConfluencePage) -> String;

    /// Site URL, used as source name and for resolving relative links.
    fn base_url(&self) -> &str;
}

/// Builds the client variant for a tenant's instance type.
pub fn confluence_api(
    config: &ConfluenceConfig,
    auth: Arc<dyn ConfluenceAuth>,
    http: Arc<RateLimitedHttpClient>,
) -> Arc<dyn ConfluenceApi> {
    match config.instance_type {
        InstanceType::Cloud => Arc::new(CloudConfluenceApi::new(config, auth, http)),
        InstanceType::DataCenter => Arc::new(DataCenterConfluenceApi::new(config, auth, http)),
    }
}

fn label_clause(single_label: &str, all_label: &str) -> String {
    format!(
        "((label=\"{}\") OR (label=\"{}\"))",
        single_label, all_label
    )
}

async fn bearer_headers(auth: &dyn ConfluenceAuth) -> SyncResult<Vec<(String, String)>> {
    let token = auth.access_token().await?;
    Ok(vec![(
        "Authorization".to_string(),
        format!("Bearer {}", token),
    )])
}

// =============================================================================
// Cloud
// =============================================================================

pub struct CloudConfluenceApi {
    base_url: String,
    api_base: String,
    single_label: String,
    all_label: String,
    auth: Arc<dyn ConfluenceAuth>,
    http: Arc<RateLimitedHttpClient>,
}

impl CloudConfluenceApi {
    pub fn new(
        config: &ConfluenceConfig,
        auth: Arc<dyn ConfluenceAuth>,
        http: Arc<RateLimitedHttpClient>,
    ) -> Self {
        let cloud_id = config.cloud_id.as_deref().unwrap_or_default();
        Self {
            base_url: config.base_url.clone(),
            api_base: format!("{}/{}", ATLASSIAN_API_BASE, cloud_id),
            single_label: config.ingest_single_label.clone(),
            all_label: config.ingest_all_label.clone(),
            auth,
            http,
        }
    }

    /// Overrides the API gateway base.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: String) -> SyncResult<T> {
        let headers = bearer_headers(self.auth.as_ref()).await?;
        self.http.get_json(&url, &headers).await
    }

    fn search_url(&self, cql: &str, start: Option<usize>) -> String {
        let mut url = format!(
            "{}/wiki/rest/api/content/search?cql={}&expand={}&limit={}",
            self.api_base,
            urlencoding::encode(cql),
            SEARCH_EXPAND,
            SEARCH_PAGE_SIZE
        );
        if let Some(start) = start {
            url.push_str(&format!("&start={}", start));
        }
        url
    }
}

#[async_trait]
impl ConfluenceApi for CloudConfluenceApi {
    async fn search_pages_by_label(&self) -> SyncResult<Vec<ConfluencePage>> {
        let cql = format!(
            "{} AND (space.type=global OR space.type=collaboration) AND type != attachment",
            label_clause(&self.single_label, &self.all_label)
        );
        let url = self.search_url(&cql, Some(0));
        fetch_all_paginated(url, &self.api_base, |u| self.get(u)).await
    }

    async fn get_page_by_id(&self, page_id: &str) -> SyncResult<Option<ConfluencePage>> {
        let url = format!(
            "{}/wiki/rest/api/content/search?cql={}&expand={}",
            self.api_base,
            urlencoding::encode(&format!("id={}", page_id)),
            PAGE_EXPAND
        );
        let response: PaginatedResponse<ConfluencePage> = self.get(url).await?;
        Ok(response.results.into_iter().next())
    }

    async fn get_descendant_pages(&self, root_ids: &[String]) -> SyncResult<Vec<ConfluencePage>> {
        if root_ids.is_empty() {
            return Ok(Vec::new());
        }
        let cql = format!(
            "ancestor IN ({}) AND type != attachment",
            root_ids.join(",")
        );
        let url = self.search_url(&cql, None);
        fetch_all_paginated(url, &self.api_base, |u| self.get(u)).await
    }

    fn build_page_web_url(&self, page: &ConfluencePage) -> String {
        format!(
            "{}/wiki{}",
            self.base_url,
            page.links.webui.as_deref().unwrap_or_default()
        )
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

// =============================================================================
// Data Center
// =============================================================================

pub struct DataCenterConfluenceApi {
    base_url: String,
    single_label: String,
    all_label: String,
    auth: Arc<dyn ConfluenceAuth>,
    http: Arc<RateLimitedHttpClient>,
}

impl DataCenterConfluenceApi {
    pub fn new(
        config: &ConfluenceConfig,
        auth: Arc<dyn ConfluenceAuth>,
        http: Arc<RateLimitedHttpClient>,
    ) -> Self {
        Self {
            base_url: config.base_url.clone(),
            single_label: config.ingest_single_label.clone(),
            all_label: config.ingest_all_label.clone(),
            auth,
            http,
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: String) -> SyncResult<T> {
        let headers = bearer_headers(self.auth.as_ref()).await?;
        self.http.get_json(&url, &headers).await
    }

    async fn get_child_pages(&self, parent_id: &str) -> SyncResult<Vec<ConfluencePage>> {
        let url = format!(
            "{}/rest/api/content/{}/child/page?limit={}&expand={}&os_authType=basic",
            self.base_url, parent_id, CHILDREN_PAGE_SIZE, SEARCH_EXPAND
        );
        fetch_all_paginated(url, &self.base_url, |u| self.get(u)).await
    }
}

#[async_trait]
impl ConfluenceApi for DataCenterConfluenceApi {
    async fn search_pages_by_label(&self) -> SyncResult<Vec<ConfluencePage>> {
        let cql = format!(
            "{} AND (space.type=global) AND type != attachment",
            label_clause(&self.single_label, &self.all_label)
        );
        let url = format!(
            "{}/rest/api/content/search?cql={}&expand={}&limit={}&os_authType=basic",
            self.base_url,
            urlencoding::encode(&cql),
            SEARCH_EXPAND,
            SEARCH_PAGE_SIZE
        );
        fetch_all_paginated(url, &self.base_url, |u| self.get(u)).await
    }

    async fn get_page_by_id(&self, page_id: &str) -> SyncResult<Option<ConfluencePage>> {
        let url = format!(
            "{}/rest/api/content/{}?os_authType=basic&expand={}",
            self.base_url, page_id, PAGE_EXPAND
        );
        let headers = bearer_headers(self.auth.as_ref()).await?;
        let response = match self
            .http
            .send(&url, |client| with_headers(client.get(&url), &headers))
            .await
        {
            Ok(response) => response,
            Err(SyncError::HttpStatus { status: 404, .. }) => {
                debug!(page_id, "Page not found");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let value: serde_json::Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) => return Ok(None),
        };
        let has_string_id = value
            .as_object()
            .and_then(|o| o.get("id"))
            .is_some_and(|id| id.is_string());
        if !has_string_id {
            debug!(page_id, "Page response has no usable id");
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| SyncError::InvalidResponse(format!("{}: {}", url, e)))
    }

    /// Breadth-first walk over `/child/page`, one level at a time.
    async fn get_descendant_pages(&self, root_ids: &[String]) -> SyncResult<Vec<ConfluencePage>> {
        if root_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut visited: HashSet<String> = root_ids.iter().cloned().collect();
        let mut queue: VecDeque<String> = root_ids.iter().cloned().collect();
        let mut descendants = Vec::new();

        while let Some(parent_id) = queue.pop_front() {
            for child in self.get_child_pages(&parent_id).await? {
                if visited.insert(child.id.clone()) {
                    queue.push_back(child.id.clone());
                    descendants.push(child);
                }
            }
        }

        Ok(descendants)
    }

    fn build_page_web_url(&self, page: &ConfluencePage) -> String {
        format!("{}/pages/viewpage.action?pageId={}", self.base_url, page.id)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::PatAuth;
    use crate::http::HttpClientConfig;
    use secrecy::SecretString;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn page_json(id: &str, content_type: &str, labels: &[&str]) -> serde_json::Value {
        json!({
            "id": id,
            "title": format!("Page {}", id),
            "type": content_type,
            "space": { "id": 98304, "key": "ENG", "name": "Engineering" },
            "version": { "when": "2026-01-01T10:00:00.000Z" },
            "metadata": { "labels": { "results": labels.iter().map(|l| json!({ "name": l })).collect::<Vec<_>>() } },
            "_links": { "webui": format!("/spaces/ENG/pages/{}", id) },
        })
    }

    pub(crate) fn http() -> Arc<RateLimitedHttpClient> {
        Arc::new(
            RateLimitedHttpClient::new(HttpClientConfig::new("confluence", 1000, Duration::from_secs(5)))
                .unwrap(),
        )
    }

    pub(crate) fn auth() -> Arc<dyn ConfluenceAuth> {
        Arc::new(PatAuth::new(&SecretString::from("tok".to_string())))
    }

    pub(crate) fn config(instance_type: &str, base_url: &str) -> ConfluenceConfig {
        let raw = format!(
            r#"
instance_type = "{}"
base_url = "{}"
cloud_id = "cloud-1"
ingest_single_label = "ai-ingest"
ingest_all_label = "ai-ingest-all"
[auth]
mode = "pat"
token = "tok"
"#,
            instance_type, base_url
        );
        toml::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_cloud_search_paginates_until_no_next() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/search"))
            .and(query_param("start", "0"))
            .and(query_param(
                "cql",
                "((label=\"ai-ingest\") OR (label=\"ai-ingest-all\")) AND (space.type=global OR space.type=collaboration) AND type != attachment",
            ))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page_json("1", "page", &["ai-ingest"])],
                "_links": { "next": "/wiki/rest/api/content/search?cursor=a&start=25" },
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/search"))
            .and(query_param("start", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page_json("2", "page", &[])],
                "_links": { "next": "/wiki/rest/api/content/search?cursor=b&start=50" },
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/search"))
            .and(query_param("start", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page_json("3", "page", &[])],
                "_links": {},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = CloudConfluenceApi::new(&config("cloud", "https://acme.atlassian.net"), auth(), http())
            .with_api_base(server.uri());
        let pages = api.search_pages_by_label().await.unwrap();
        let ids: Vec<_> = pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(pages[0].space().id, "98304");
        assert_eq!(pages[0].label_names(), vec!["ai-ingest"]);
    }

    #[tokio::test]
    async fn test_cloud_get_page_by_id_takes_first_result() {
        let server = MockServer::start().await;
        let mut page = page_json("42", "page", &[]);
        page["body"] = json!({ "storage": { "value": "<p>Hello</p>" } });
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/search"))
            .and(query_param("cql", "id=42"))
            .and(query_param("expand", "body.storage,version,space,metadata.labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [page] })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/search"))
            .and(query_param("cql", "id=404"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .mount(&server)
            .await;

        let api = CloudConfluenceApi::new(&config("cloud", "https://acme.atlassian.net"), auth(), http())
            .with_api_base(server.uri());
        let page = api.get_page_by_id("42").await.unwrap().unwrap();
        assert_eq!(page.storage_body(), "<p>Hello</p>");
        assert!(api.get_page_by_id("404").await.unwrap().is_none());
        assert_eq!(
            api.build_page_web_url(&page),
            "https://acme.atlassian.net/wiki/spaces/ENG/pages/42"
        );
    }

    #[tokio::test]
    async fn test_cloud_descendants_use_ancestor_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/rest/api/content/search"))
            .and(query_param("cql", "ancestor IN (1,2) AND type != attachment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page_json("10", "page", &[]), page_json("11", "page", &[])],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = CloudConfluenceApi::new(&config("cloud", "https://acme.atlassian.net"), auth(), http())
            .with_api_base(server.uri());
        let pages = api
            .get_descendant_pages(&["1".to_string(), "2".to_string()])
            .await
            .unwrap();
        assert_eq!(pages.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_root_ids_make_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let cloud = CloudConfluenceApi::new(&config("cloud", "https://acme.atlassian.net"), auth(), http())
            .with_api_base(server.uri());
        assert!(cloud.get_descendant_pages(&[]).await.unwrap().is_empty());

        let dc = DataCenterConfluenceApi::new(&config("data-center", &server.uri()), auth(), http());
        assert!(dc.get_descendant_pages(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_data_center_search_uses_global_spaces_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/search"))
            .and(query_param("os_authType", "basic"))
            .and(query_param("limit", "25"))
            .and(query_param(
                "cql",
                "((label=\"ai-ingest\") OR (label=\"ai-ingest-all\")) AND (space.type=global) AND type != attachment",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page_json("5", "page", &["ai-ingest"])],
                "_links": {},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = DataCenterConfluenceApi::new(&config("data-center", &server.uri()), auth(), http());
        let pages = api.search_pages_by_label().await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(
            api.build_page_web_url(&pages[0]),
            format!("{}/pages/viewpage.action?pageId=5", server.uri())
        );
    }

    #[tokio::test]
    async fn test_data_center_get_page_by_id_shapes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/42"))
            .and(query_param("os_authType", "basic"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json("42", "page", &[])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 123, "title": "P" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("not-an-object")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/3"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let api = DataCenterConfluenceApi::new(&config("data-center", &server.uri()), auth(), http());
        assert_eq!(api.get_page_by_id("42").await.unwrap().unwrap().id, "42");
        assert!(api.get_page_by_id("1").await.unwrap().is_none());
        assert!(api.get_page_by_id("2").await.unwrap().is_none());
        assert!(api.get_page_by_id("3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_data_center_missing_page_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/77"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "statusCode": 404,
                "message": "No content found with id: ContentId{id=77}"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/78"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let api = DataCenterConfluenceApi::new(&config("data-center", &server.uri()), auth(), http());
        assert!(api.get_page_by_id("77").await.unwrap().is_none());
        assert!(matches!(
            api.get_page_by_id("78").await.unwrap_err(),
            SyncError::HttpStatus { status: 403, .. }
        ));
    }

    #[tokio::test]
    async fn test_data_center_descendants_walk_children() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/1/child/page"))
            .and(query_param("limit", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page_json("2", "page", &[])],
                "_links": { "next": "/rest/api/content/1/child/page?cursor=x" },
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/1/child/page"))
            .and(query_param("cursor", "x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page_json("3", "page", &[])],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/2/child/page"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page_json("4", "page", &[]), page_json("1", "page", &[])],
            })))
            .mount(&server)
            .await;
        for leaf in ["3", "4"] {
            Mock::given(method("GET"))
                .and(path(format!("/rest/api/content/{}/child/page", leaf)))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
                .mount(&server)
                .await;
        }

        let api = DataCenterConfluenceApi::new(&config("data-center", &server.uri()), auth(), http());
        let pages = api.get_descendant_pages(&["1".to_string()]).await.unwrap();
        let ids: Vec<_> = pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "4"]);
    }
}
