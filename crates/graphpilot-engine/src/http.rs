use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};

use graphpilot_core::analysis::EngineSize;
use graphpilot_core::config::{DatabaseConfig, EngineConfig};
use graphpilot_core::error::{GraphPilotError, Result};
use graphpilot_core::traits::{DocumentStore, EngineApi};
use graphpilot_core::types::*;

/// REST transport for the engine platform.
///
/// Management calls go to `api_url`; engine calls go to the engine's own
/// URL when the platform reports one, otherwise to the management proxy
/// path `{api_url}/v1/engines/{id}/api`.
pub struct HttpEngineApi {
    http: Client,
    api_url: String,
    family: String,
}

impl HttpEngineApi {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GraphPilotError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            family: config.family.clone(),
        })
    }

    fn engine_url(&self, engine: &EngineLease) -> String {
        match engine.url {
            Some(ref url) => url.trim_end_matches('/').to_string(),
            None => format!("{}/v1/engines/{}/api", self.api_url, engine.id),
        }
    }

    async fn get_json(&self, token: &str, url: String, what: &str) -> Result<Value> {
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| GraphPilotError::Transient(format!("{}: {}", what, e)))?;
        read_json(check_status(response, what).await?, what).await
    }

    async fn post_json(&self, token: &str, url: String, body: Value, what: &str) -> Result<Value> {
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| GraphPilotError::Transient(format!("{}: {}", what, e)))?;
        read_json(check_status(response, what).await?, what).await
    }
}

/// Map HTTP status codes onto the error taxonomy.
async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    let message = format!("{}: HTTP {}: {}", what, status, body);
    Err(match status.as_u16() {
        401 | 403 => GraphPilotError::Auth(message),
        404 => GraphPilotError::NotFound(message),
        408 | 429 | 500..=599 => GraphPilotError::Transient(message),
        code => GraphPilotError::Remote {
            status: code,
            message,
        },
    })
}

async fn read_json(response: Response, what: &str) -> Result<Value> {
    let text = response
        .text()
        .await
        .map_err(|e| GraphPilotError::Transient(format!("{}: {}", what, e)))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// Read an id that may be encoded as a string or a number.
fn id_field(value: &Value, key: &str) -> Result<String> {
    match value.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(GraphPilotError::Transient(format!(
            "Response is missing '{}': {}",
            key, value
        ))),
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

fn parse_engine(value: Value) -> Result<EngineInfo> {
    Ok(serde_json::from_value(value)?)
}

impl EngineApi for HttpEngineApi {
    fn issue_credential(&self, client_id: String, secret: String) -> BoxFuture<'_, Result<Credential>> {
        Box::pin(async move {
            let url = format!("{}/v1/auth/token", self.api_url);
            let response = self
                .http
                .post(&url)
                .json(&json!({ "client_id": client_id, "client_secret": secret }))
                .send()
                .await
                .map_err(|e| GraphPilotError::Transient(format!("issue credential: {}", e)))?;
            let body = read_json(check_status(response, "issue credential").await?, "issue credential").await?;
            let issued: TokenResponse = serde_json::from_value(body)
                .map_err(|e| GraphPilotError::Auth(format!("malformed credential response: {}", e)))?;
            let token = issued
                .token
                .ok_or_else(|| GraphPilotError::Auth("token missing from credential response".into()))?;
            Ok(Credential {
                token,
                expires_at: Utc::now() + chrono::Duration::seconds(issued.expires_in.unwrap_or(3600)),
            })
        })
    }

    fn list_engines(&self, token: String) -> BoxFuture<'_, Result<Vec<EngineInfo>>> {
        Box::pin(async move {
            let url = format!("{}/v1/engines", self.api_url);
            let body = self.get_json(&token, url, "list engines").await?;
            let items = match body {
                Value::Array(items) => items,
                Value::Object(mut obj) => match obj.remove("items") {
                    Some(Value::Array(items)) => items,
                    _ => vec![],
                },
                _ => vec![],
            };
            items.into_iter().map(parse_engine).collect()
        })
    }

    fn deploy_engine(&self, token: String, size: EngineSize) -> BoxFuture<'_, Result<EngineInfo>> {
        Box::pin(async move {
            let url = format!("{}/v1/engines", self.api_url);
            let body = json!({ "size": size.as_str(), "type": self.family });
            parse_engine(self.post_json(&token, url, body, "deploy engine").await?)
        })
    }

    fn get_engine(&self, token: String, engine_id: String) -> BoxFuture<'_, Result<EngineInfo>> {
        Box::pin(async move {
            let url = format!("{}/v1/engines/{}", self.api_url, engine_id);
            parse_engine(self.get_json(&token, url, "get engine").await?)
        })
    }

    fn probe_engine(&self, token: String, engine: EngineLease) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let url = format!("{}/v1/version", self.engine_url(&engine));
            self.get_json(&token, url, "probe engine").await?;
            Ok(())
        })
    }

    fn delete_engine(&self, token: String, engine_id: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let url = format!("{}/v1/engines/{}", self.api_url, engine_id);
            let response = self
                .http
                .delete(&url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| GraphPilotError::Transient(format!("delete engine: {}", e)))?;
            check_status(response, "delete engine").await?;
            Ok(())
        })
    }

    fn load_graph(
        &self,
        token: String,
        engine: EngineLease,
        request: LoadGraphRequest,
    ) -> BoxFuture<'_, Result<LoadedGraph>> {
        Box::pin(async move {
            let url = format!("{}/v1/loaddata", self.engine_url(&engine));
            let body = self
                .post_json(&token, url, serde_json::to_value(&request)?, "load graph")
                .await?;
            Ok(LoadedGraph {
                job_id: id_field(&body, "job_id")?,
                graph_id: id_field(&body, "graph_id")?,
            })
        })
    }

    fn run_algorithm(
        &self,
        token: String,
        engine: EngineLease,
        request: AlgorithmRequest,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let url = format!("{}/v1/{}", self.engine_url(&engine), request.algorithm.as_str());
            let mut body = request.params.clone();
            body.insert("graph_id".into(), Value::String(request.graph_id.clone()));
            let response = self
                .post_json(&token, url, Value::Object(body), "run algorithm")
                .await?;
            id_field(&response, "job_id")
        })
    }

    fn store_results(
        &self,
        token: String,
        engine: EngineLease,
        request: StoreRequest,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let url = format!("{}/v1/storeresults", self.engine_url(&engine));
            let response = self
                .post_json(&token, url, serde_json::to_value(&request)?, "store results")
                .await?;
            id_field(&response, "job_id")
        })
    }

    fn get_job(
        &self,
        token: String,
        engine: EngineLease,
        job_id: String,
    ) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let url = format!("{}/v1/jobs/{}", self.engine_url(&engine), job_id);
            self.get_json(&token, url, "get job").await
        })
    }

    fn get_graph(
        &self,
        token: String,
        engine: EngineLease,
        graph_id: String,
    ) -> BoxFuture<'_, Result<GraphStats>> {
        Box::pin(async move {
            let url = format!("{}/v1/graphs/{}", self.engine_url(&engine), graph_id);
            let body = self.get_json(&token, url, "get graph").await?;
            Ok(GraphStats {
                vertex_count: body.get("vertex_count").and_then(Value::as_u64).unwrap_or(0),
                edge_count: body.get("edge_count").and_then(Value::as_u64).unwrap_or(0),
            })
        })
    }
}

/// Reads result documents through the database cursor API.
pub struct HttpDocumentStore {
    http: Client,
    endpoint: String,
    username: String,
    password: Option<String>,
}

impl HttpDocumentStore {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            http: Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

impl DocumentStore for HttpDocumentStore {
    fn sample_documents(
        &self,
        database: String,
        collection: String,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Value>>> {
        Box::pin(async move {
            let url = format!("{}/_db/{}/_api/cursor", self.endpoint, database);
            let body = json!({
                "query": "FOR d IN @@col LIMIT @n RETURN d",
                "bindVars": { "@col": collection, "n": limit },
                "batchSize": limit.max(1),
            });
            let response = self
                .http
                .post(&url)
                .basic_auth(&self.username, self.password.as_deref())
                .json(&body)
                .send()
                .await
                .map_err(|e| GraphPilotError::Transient(format!("sample documents: {}", e)))?;
            let body = read_json(check_status(response, "sample documents").await?, "sample documents").await?;
            match body.get("result") {
                Some(Value::Array(docs)) => Ok(docs.clone()),
                _ => Ok(vec![]),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn api(server: &MockServer) -> HttpEngineApi {
        HttpEngineApi::new(&EngineConfig {
            api_url: server.uri(),
            ..EngineConfig::default()
        })
        .unwrap()
    }

    fn lease(id: &str) -> EngineLease {
        EngineLease {
            id: id.into(),
            url: None,
            size: None,
            reused: false,
        }
    }

    #[tokio::test]
    async fn issues_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "token": "abc", "expires_in": 600 })),
            )
            .mount(&server)
            .await;

        let cred = api(&server)
            .await
            .issue_credential("id".into(), "secret".into())
            .await
            .unwrap();
        assert_eq!(cred.token, "abc");
        assert!(cred.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/engines"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let err = api(&server).await.list_engines("t".into()).await.unwrap_err();
        assert!(matches!(err, GraphPilotError::Auth(_)));
    }

    #[tokio::test]
    async fn missing_engine_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/engines/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = api(&server)
            .await
            .delete_engine("t".into(), "gone".into())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphPilotError::NotFound(_)));
    }

    #[tokio::test]
    async fn server_error_maps_to_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/engines/e1/api/v1/loaddata"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let request = LoadGraphRequest {
            database: "db".into(),
            vertex_collections: vec!["users".into()],
            edge_collections: vec![],
            vertex_attributes: vec![],
        };
        let err = api(&server)
            .await
            .load_graph("t".into(), lease("e1"), request)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphPilotError::Transient(_)));
    }

    #[tokio::test]
    async fn lists_engines_from_items_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/engines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    { "id": "e1", "status": { "started": true, "succeeded": true }, "size_class": "e16" }
                ]
            })))
            .mount(&server)
            .await;

        let engines = api(&server).await.list_engines("t".into()).await.unwrap();
        assert_eq!(engines.len(), 1);
        assert!(engines[0].status.is_ready());
    }

    #[tokio::test]
    async fn load_graph_accepts_numeric_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/engines/e1/api/v1/loaddata"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "job_id": 7, "graph_id": 3 })),
            )
            .mount(&server)
            .await;

        let request = LoadGraphRequest {
            database: "db".into(),
            vertex_collections: vec!["users".into()],
            edge_collections: vec!["follows".into()],
            vertex_attributes: vec![],
        };
        let loaded = api(&server)
            .await
            .load_graph("t".into(), lease("e1"), request)
            .await
            .unwrap();
        assert_eq!(loaded.job_id, "7");
        assert_eq!(loaded.graph_id, "3");
    }
}
