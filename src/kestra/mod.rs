use std::time::Duration;

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::{
    StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::KestraConfig;

/// Namespace and flow this dashboard watches. The flow is fixed upstream;
/// changing it changes what the dashboard is about.
const NAMESPACE: &str = "thanos";
const FLOW_ID: &str = "self_heal_pipeline";
/// Number of executions fetched per request. The executions endpoint is paged,
/// but the dashboard only ever shows the most recent page.
const PAGE_SIZE: u32 = 20;

#[derive(Debug, Error)]
pub enum KestraError {
    /// The engine replied with a non-2xx status. The body is not inspected.
    #[error("Kestra API error: {}", .status.as_u16())]
    Api { status: StatusCode },
    /// DNS failure, refused connection, timeout, or an unparseable body.
    /// Callers get a generic message; the source carries the detail for logs.
    #[error("Failed to connect to Kestra API")]
    Unreachable(#[from] reqwest::Error),
}

/// Read-only client for the Kestra executions API.
#[derive(Debug, Clone)]
pub struct Kestra {
    client: reqwest::Client,
    executions_url: Url,
}

impl Kestra {
    pub fn new(config: &KestraConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth =
            HeaderValue::from_str(&format!("Basic {}", BASE64.encode(&config.credential)))
                .context("Invalid Kestra credential")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build HTTP client")?;
        let executions_url = Url::parse(&config.base_url)
            .and_then(|base| base.join("/api/v1/main/executions"))
            .with_context(|| format!("Invalid Kestra base URL {}", config.base_url))?;
        Ok(Self { client, executions_url })
    }

    /// Fetch the latest executions of the self-heal flow, newest first.
    pub async fn list_executions(&self) -> std::result::Result<Vec<Execution>, KestraError> {
        let mut url = self.executions_url.clone();
        url.query_pairs_mut()
            .append_pair("namespace", NAMESPACE)
            .append_pair("flowId", FLOW_ID)
            .append_pair("size", &PAGE_SIZE.to_string());
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(KestraError::Api { status });
        }
        let page: ExecutionPage = response.json().await?;
        Ok(page.results)
    }
}

/// Envelope returned by the executions endpoint. Only `results` is consumed;
/// a missing field degrades to an empty page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExecutionPage {
    pub results: Vec<Execution>,
}

/// One run of the flow, as the engine reports it. Every nested object is
/// optional so that partial records (e.g. executions still queuing) never
/// fail to parse.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Execution {
    pub id: String,
    pub state: Option<ExecutionState>,
    pub inputs: Option<ExecutionInputs>,
    pub task_run_list: Option<Vec<TaskRun>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionState {
    pub current: Option<String>,
    pub start_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExecutionInputs {
    pub payload: Option<Payload>,
}

/// The webhook payload the flow was triggered with. Field names follow the
/// GitHub event shape, hence snake_case.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Payload {
    pub issue: Option<Issue>,
    pub repository: Option<Repository>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Issue {
    pub number: Option<u64>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskRun {
    pub task_id: Option<String>,
    pub state: Option<ExecutionState>,
    pub outputs: Option<TaskOutputs>,
}

/// Task outputs nest the script's own output map one level down
/// (`outputs.outputs` on the wire).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskOutputs {
    pub outputs: Option<ScriptOutputs>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScriptOutputs {
    pub exit_code: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: &str) -> KestraConfig {
        KestraConfig {
            base_url: base_url.to_string(),
            credential: "user:pass".to_string(),
            timeout_ms: 2_000,
        }
    }

    #[tokio::test]
    async fn fetches_and_parses_executions() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/main/executions")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("namespace".into(), "thanos".into()),
                mockito::Matcher::UrlEncoded("flowId".into(), "self_heal_pipeline".into()),
                mockito::Matcher::UrlEncoded("size".into(), "20".into()),
            ]))
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .match_header("accept", "application/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "total": 1,
                    "results": [{
                        "id": "1za3kq4zbae4H0hragEsj3",
                        "state": {"current": "SUCCESS", "startDate": "2024-12-14T10:30:00Z"},
                        "inputs": {"payload": {
                            "issue": {"number": 42, "title": "Fix authentication bug"},
                            "repository": {"full_name": "samblackspy/thanos-ai"}
                        }},
                        "taskRunList": [{
                            "taskId": "attempt_0",
                            "state": {"current": "SUCCESS"},
                            "outputs": {"outputs": {"exit_code": 0}}
                        }]
                    }]
                }"#,
            )
            .create_async()
            .await;

        let kestra = Kestra::new(&test_config(&server.url())).unwrap();
        let executions = kestra.list_executions().await.unwrap();
        mock.assert_async().await;

        assert_eq!(executions.len(), 1);
        let exec = &executions[0];
        assert_eq!(exec.id, "1za3kq4zbae4H0hragEsj3");
        assert_eq!(
            exec.state.as_ref().and_then(|s| s.current.as_deref()),
            Some("SUCCESS")
        );
        let run = &exec.task_run_list.as_ref().unwrap()[0];
        assert_eq!(run.task_id.as_deref(), Some("attempt_0"));
        assert_eq!(
            run.outputs
                .as_ref()
                .and_then(|o| o.outputs.as_ref())
                .and_then(|o| o.exit_code),
            Some(0)
        );
    }

    #[tokio::test]
    async fn missing_results_field_is_an_empty_page() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/main/executions")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{}")
            .create_async()
            .await;

        let kestra = Kestra::new(&test_config(&server.url())).unwrap();
        let executions = kestra.list_executions().await.unwrap();
        assert!(executions.is_empty());
    }

    #[tokio::test]
    async fn upstream_error_carries_the_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/main/executions")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let kestra = Kestra::new(&test_config(&server.url())).unwrap();
        let err = kestra.list_executions().await.unwrap_err();
        match err {
            KestraError::Api { status } => assert_eq!(status.as_u16(), 503),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upstream_error_message_names_the_status() {
        let err = KestraError::Api { status: StatusCode::SERVICE_UNAVAILABLE };
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_generic_transport_error() {
        // Bind and immediately drop a listener so the port is known-closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let kestra = Kestra::new(&test_config(&format!("http://{addr}"))).unwrap();
        let err = kestra.list_executions().await.unwrap_err();
        assert!(matches!(err, KestraError::Unreachable(_)));
        assert_eq!(err.to_string(), "Failed to connect to Kestra API");
    }

    #[tokio::test]
    async fn stalled_server_times_out_within_the_bound() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept the connection and never respond.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let config = KestraConfig {
            base_url: format!("http://{addr}"),
            credential: "user:pass".to_string(),
            timeout_ms: 200,
        };
        let kestra = Kestra::new(&config).unwrap();
        let start = std::time::Instant::now();
        let err = kestra.list_executions().await.unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(2));
        match err {
            KestraError::Unreachable(source) => assert!(source.is_timeout()),
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
