//! Catalog client: one fetch per hierarchy level, routed through the relay.
//!
//! Every request is best-effort. When the relay answers with a non-success
//! status, cannot be reached, or returns something that is not JSON, the
//! client logs a warning and serves the bundled sample set for that URL
//! instead (see [`crate::samples`]). A strict client skips the fallback and
//! reports the failure.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RuntimeSettings;
use crate::models::CatalogLevel;
use crate::relay::PROXY_ROUTE;
use crate::samples::fallback_items;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Product lookup id the upstream expects on every product listing.
const PRODUCT_TYPE_LOOKUP_ID: u32 = 127;

/// Wrapper keys tried, in order, when a response is an object.
const ENVELOPE_KEYS: [&str; 4] = ["result", "Result", "data", "Data"];

/// Fixed upstream coordinates shared by every request.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub api_base: String,
    pub api_key: String,
    pub brand_id: u32,
}

impl CatalogConfig {
    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        Self {
            api_base: settings.api_base.clone(),
            api_key: settings.api_key.clone(),
            brand_id: settings.brand_id,
        }
    }

    fn common_params(&self) -> String {
        format!(
            "BrandId={}&apk={}&resources=mobile",
            self.brand_id, self.api_key
        )
    }
}

/// One request per catalog level, carrying exactly the ids that level needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogQuery {
    Classes,
    Branches { class_id: i64 },
    Products { class_id: i64, branch_id: i64 },
    Seasons { product_id: i64 },
    Episodes { product_id: i64, season_id: i64 },
    Tests { product_id: i64, episode_id: i64 },
    Teachers { product_id: i64, test_id: i64 },
}

impl CatalogQuery {
    /// Level of the items this query returns.
    pub fn level(&self) -> CatalogLevel {
        match self {
            Self::Classes => CatalogLevel::Class,
            Self::Branches { .. } => CatalogLevel::Branch,
            Self::Products { .. } => CatalogLevel::Product,
            Self::Seasons { .. } => CatalogLevel::Season,
            Self::Episodes { .. } => CatalogLevel::Episode,
            Self::Tests { .. } => CatalogLevel::Test,
            Self::Teachers { .. } => CatalogLevel::Teacher,
        }
    }

    pub fn upstream_url(&self, config: &CatalogConfig) -> String {
        let base = &config.api_base;
        let common = config.common_params();
        match *self {
            Self::Classes => {
                format!("{base}/ProductLookup?TypeKey=class&HasProduct=true&{common}")
            }
            Self::Branches { class_id } => format!(
                "{base}/ProductLookup?TypeKey=branch&HasProduct=true&RelatedId={class_id}&{common}"
            ),
            Self::Products {
                class_id,
                branch_id,
            } => format!(
                "{base}/Product?ProductLookupID={class_id}&ProductLookupID={branch_id}&ProductLookupID={PRODUCT_TYPE_LOOKUP_ID}&brandId={brand}&GetImages=true&GetSamplePage=false&{common}",
                brand = config.brand_id,
            ),
            Self::Seasons { product_id } => {
                format!("{base}/VideoSolution?ProductId={product_id}&ParentId=0&{common}")
            }
            Self::Episodes {
                product_id,
                season_id: parent_id,
            }
            | Self::Tests {
                product_id,
                episode_id: parent_id,
            }
            | Self::Teachers {
                product_id,
                test_id: parent_id,
            } => format!(
                "{base}/VideoSolution?ProductId={product_id}&ParentId={parent_id}&{common}"
            ),
        }
    }
}

/// Anything that can answer catalog queries with raw upstream items.
pub trait CatalogSource {
    fn fetch(&self, query: &CatalogQuery) -> Result<Vec<Value>>;
}

/// Pulls the item list out of whichever envelope the upstream used.
///
/// Accepts a bare array or an object with an array under `result`, `Result`,
/// `data` or `Data`. Anything else yields an empty list.
pub fn extract_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => ENVELOPE_KEYS
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Blocking HTTP client that talks to the upstream through the relay.
pub struct CatalogClient {
    config: CatalogConfig,
    relay_url: String,
    agent: ureq::Agent,
    fallback: bool,
}

impl CatalogClient {
    pub fn new(config: CatalogConfig, relay_url: impl Into<String>) -> Self {
        Self {
            config,
            relay_url: relay_url.into().trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            fallback: true,
        }
    }

    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        Self::new(
            CatalogConfig::from_settings(settings),
            settings.relay_url.clone(),
        )
    }

    /// Disables the sample-data fallback so failures surface to the caller.
    pub fn strict(mut self) -> Self {
        self.fallback = false;
        self
    }

    pub fn classes(&self) -> Result<Vec<Value>> {
        self.fetch(&CatalogQuery::Classes)
    }

    pub fn branches(&self, class_id: i64) -> Result<Vec<Value>> {
        self.fetch(&CatalogQuery::Branches { class_id })
    }

    pub fn products(&self, class_id: i64, branch_id: i64) -> Result<Vec<Value>> {
        self.fetch(&CatalogQuery::Products {
            class_id,
            branch_id,
        })
    }

    pub fn seasons(&self, product_id: i64) -> Result<Vec<Value>> {
        self.fetch(&CatalogQuery::Seasons { product_id })
    }

    pub fn episodes(&self, product_id: i64, season_id: i64) -> Result<Vec<Value>> {
        self.fetch(&CatalogQuery::Episodes {
            product_id,
            season_id,
        })
    }

    pub fn tests(&self, product_id: i64, episode_id: i64) -> Result<Vec<Value>> {
        self.fetch(&CatalogQuery::Tests {
            product_id,
            episode_id,
        })
    }

    pub fn teachers(&self, product_id: i64, test_id: i64) -> Result<Vec<Value>> {
        self.fetch(&CatalogQuery::Teachers {
            product_id,
            test_id,
        })
    }

    fn fetch_via_relay(&self, upstream: &str) -> Result<Vec<Value>> {
        let proxy = format!("{}{PROXY_ROUTE}", self.relay_url);
        let response = self
            .agent
            .get(&proxy)
            .query("url", upstream)
            .call()
            .with_context(|| format!("relay request for {upstream}"))?;
        let body: Value = response
            .into_json()
            .with_context(|| format!("decoding relay response for {upstream}"))?;
        Ok(extract_items(body))
    }
}

impl CatalogSource for CatalogClient {
    fn fetch(&self, query: &CatalogQuery) -> Result<Vec<Value>> {
        let url = query.upstream_url(&self.config);
        debug!(level = query.level().as_str(), %url, "fetching catalog level");
        match self.fetch_via_relay(&url) {
            Ok(items) => Ok(items),
            Err(err) if self.fallback => {
                warn!(error = %format!("{err:#}"), %url, "catalog fetch failed, using sample data");
                Ok(fallback_items(&url, query.level()))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{RelayState, router, tests::closed_port, tests::spawn_server};
    use crate::samples::SampleSet;
    use axum::{Router, http::StatusCode, routing::get};
    use serde_json::json;

    fn config(base: &str) -> CatalogConfig {
        CatalogConfig {
            api_base: base.to_string(),
            api_key: "KEY".to_string(),
            brand_id: 2,
        }
    }

    #[test]
    fn envelope_shapes_all_unwrap_to_the_same_list() {
        let expected = vec![json!(1), json!(2)];
        for body in [
            json!([1, 2]),
            json!({"result": [1, 2]}),
            json!({"Result": [1, 2]}),
            json!({"data": [1, 2]}),
            json!({"Data": [1, 2]}),
        ] {
            assert_eq!(extract_items(body), expected);
        }
    }

    #[test]
    fn unrecognized_envelopes_are_empty() {
        assert!(extract_items(json!({"unexpected": 1})).is_empty());
        assert!(extract_items(json!({"result": "not a list"})).is_empty());
        assert!(extract_items(json!(42)).is_empty());
        assert!(extract_items(json!(null)).is_empty());
    }

    #[test]
    fn non_array_result_falls_through_to_data() {
        assert_eq!(
            extract_items(json!({"result": null, "data": [3]})),
            vec![json!(3)]
        );
    }

    #[test]
    fn urls_match_upstream_shapes() {
        let cfg = config("https://api.test");
        assert_eq!(
            CatalogQuery::Classes.upstream_url(&cfg),
            "https://api.test/ProductLookup?TypeKey=class&HasProduct=true&BrandId=2&apk=KEY&resources=mobile"
        );
        assert_eq!(
            CatalogQuery::Branches { class_id: 9 }.upstream_url(&cfg),
            "https://api.test/ProductLookup?TypeKey=branch&HasProduct=true&RelatedId=9&BrandId=2&apk=KEY&resources=mobile"
        );
        assert_eq!(
            CatalogQuery::Products {
                class_id: 9,
                branch_id: 41
            }
            .upstream_url(&cfg),
            "https://api.test/Product?ProductLookupID=9&ProductLookupID=41&ProductLookupID=127&brandId=2&GetImages=true&GetSamplePage=false&BrandId=2&apk=KEY&resources=mobile"
        );
        assert_eq!(
            CatalogQuery::Seasons { product_id: 5 }.upstream_url(&cfg),
            "https://api.test/VideoSolution?ProductId=5&ParentId=0&BrandId=2&apk=KEY&resources=mobile"
        );
        assert_eq!(
            CatalogQuery::Teachers {
                product_id: 5,
                test_id: 77
            }
            .upstream_url(&cfg),
            "https://api.test/VideoSolution?ProductId=5&ParentId=77&BrandId=2&apk=KEY&resources=mobile"
        );
    }

    #[test]
    fn query_levels() {
        assert_eq!(CatalogQuery::Classes.level(), CatalogLevel::Class);
        assert_eq!(
            CatalogQuery::Tests {
                product_id: 1,
                episode_id: 2
            }
            .level(),
            CatalogLevel::Test
        );
    }

    async fn fetch_blocking(client: CatalogClient, query: CatalogQuery) -> Result<Vec<Value>> {
        tokio::task::spawn_blocking(move || client.fetch(&query))
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetches_through_relay_and_unwraps_envelope() {
        let upstream = Router::new().route(
            "/ProductLookup",
            get(|| async { axum::Json(json!({"Data": [{"id": 1, "value": "Live"}]})) }),
        );
        let upstream_addr = spawn_server(upstream).await;
        let relay_addr = spawn_server(router(RelayState::new(None))).await;

        let client = CatalogClient::new(
            config(&format!("http://{upstream_addr}")),
            format!("http://{relay_addr}"),
        );
        let items = fetch_blocking(client, CatalogQuery::Classes).await.unwrap();
        assert_eq!(items, vec![json!({"id": 1, "value": "Live"})]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upstream_error_status_falls_back_to_samples() {
        let upstream = Router::new().route(
            "/ProductLookup",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let upstream_addr = spawn_server(upstream).await;
        let relay_addr = spawn_server(router(RelayState::new(None))).await;

        let client = CatalogClient::new(
            config(&format!("http://{upstream_addr}")),
            format!("http://{relay_addr}"),
        );
        let items = fetch_blocking(client, CatalogQuery::Branches { class_id: 9 })
            .await
            .unwrap();
        assert_eq!(items, SampleSet::Branches.items());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_json_falls_back_to_samples() {
        let upstream = Router::new().route("/Product", get(|| async { "<html>oops</html>" }));
        let upstream_addr = spawn_server(upstream).await;
        let relay_addr = spawn_server(router(RelayState::new(None))).await;

        let client = CatalogClient::new(
            config(&format!("http://{upstream_addr}")),
            format!("http://{relay_addr}"),
        );
        let items = fetch_blocking(
            client,
            CatalogQuery::Products {
                class_id: 9,
                branch_id: 41,
            },
        )
        .await
        .unwrap();
        assert_eq!(items, SampleSet::Products.items());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_relay_falls_back_with_empty_config() {
        let port = closed_port().await;
        let client = CatalogClient::new(config(""), format!("http://127.0.0.1:{port}"));
        let items = fetch_blocking(client, CatalogQuery::Classes).await.unwrap();
        assert_eq!(items, SampleSet::Classes.items());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn level_helpers_fall_back_to_their_own_fixture() {
        let port = closed_port().await;
        let client = CatalogClient::new(config(""), format!("http://127.0.0.1:{port}"));
        let (seasons, teachers) = tokio::task::spawn_blocking(move || {
            (client.seasons(5).unwrap(), client.teachers(5, 77).unwrap())
        })
        .await
        .unwrap();
        assert_eq!(seasons, SampleSet::Seasons.items());
        assert_eq!(teachers, SampleSet::Teachers.items());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn strict_client_reports_failures() {
        let port = closed_port().await;
        let client = CatalogClient::new(config(""), format!("http://127.0.0.1:{port}")).strict();
        let result = fetch_blocking(client, CatalogQuery::Classes).await;
        assert!(result.is_err());
    }
}
