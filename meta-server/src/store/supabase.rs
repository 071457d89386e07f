//! Supabase backend over the PostgREST HTTP interface.

use super::{AnalysisRecord, NewAnalysis, RecordBackend};
use async_trait::async_trait;
use meta_common::util::trim_base_url;
use meta_common::{Error, Result};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

/// Stores analyses in a Supabase table.
pub struct SupabaseBackend {
    base_url: String,
    api_key: String,
    table: String,
    client: Client,
}

impl SupabaseBackend {
    pub fn new(url: &str, api_key: &str, table: &str) -> Self {
        Self {
            base_url: trim_base_url(url).to_string(),
            api_key: api_key.to_string(),
            table: table.to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(15))
                .connect_timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorized(request).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout
            } else {
                Error::External(format!("Supabase request failed: {}", e.without_url()))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("Supabase returned {}: {}", status.as_u16(), body);
        if status.is_server_error() {
            Err(Error::External(message))
        } else {
            Err(Error::Storage(message))
        }
    }

    async fn decode(response: Response) -> Result<Vec<AnalysisRecord>> {
        response
            .json()
            .await
            .map_err(|e| Error::Storage(format!("Unreadable Supabase response: {}", e.without_url())))
    }
}

#[async_trait]
impl RecordBackend for SupabaseBackend {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn insert(&self, row: &NewAnalysis) -> Result<AnalysisRecord> {
        let request = self
            .client
            .post(self.table_url())
            .header("Prefer", "return=representation")
            .json(row);

        let rows = Self::decode(self.send(request).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::Storage("Supabase insert returned no rows".into()))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AnalysisRecord>> {
        let limit = limit.to_string();
        let request = self.client.get(self.table_url()).query(&[
            ("select", "*"),
            ("order", "id.desc"),
            ("limit", limit.as_str()),
        ]);

        Self::decode(self.send(request).await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn row() -> NewAnalysis {
        NewAnalysis {
            old_schema: r#"{"id": 1}"#.into(),
            new_schema: r#"{"id": "1"}"#.into(),
            is_breaking: true,
            ai_summary: r#"{"is_breaking":true,"summary":"id type","changes":[]}"#.into(),
        }
    }

    #[tokio::test]
    async fn insert_posts_row_and_returns_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/metadata_analyses"))
            .and(header("apikey", "service-key"))
            .and(header("Authorization", "Bearer service-key"))
            .and(header("Prefer", "return=representation"))
            .and(body_partial_json(json!({"is_breaking": true, "old_schema": "{\"id\": 1}"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
                "id": 42,
                "old_schema": "{\"id\": 1}",
                "new_schema": "{\"id\": \"1\"}",
                "is_breaking": true,
                "ai_summary": "{}",
                "created_at": "2024-05-01T12:00:00.123456+00:00"
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let backend = SupabaseBackend::new(&format!("{}/", server.uri()), "service-key", "metadata_analyses");
        let record = backend.insert(&row()).await.unwrap();

        assert_eq!(record.id, 42);
        assert!(record.created_at.is_some());
    }

    #[tokio::test]
    async fn recent_queries_newest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/metadata_analyses"))
            .and(query_param("order", "id.desc"))
            .and(query_param("limit", "20"))
            .and(query_param("select", "*"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 2, "old_schema": "a", "new_schema": "b", "is_breaking": false, "ai_summary": "{}"},
                {"id": 1, "old_schema": "a", "new_schema": "b", "is_breaking": true, "ai_summary": "{}"}
            ])))
            .mount(&server)
            .await;

        let backend = SupabaseBackend::new(&server.uri(), "k", "metadata_analyses");
        let records = backend.recent(20).await.unwrap();

        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 1]);
        assert!(records[0].created_at.is_none());
    }

    #[tokio::test]
    async fn naive_timestamps_keep_history_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/metadata_analyses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 2, "old_schema": "a", "new_schema": "b", "is_breaking": true, "ai_summary": "{}", "created_at": "2024-05-01T12:00:00.123456"},
                {"id": 1, "old_schema": "a", "new_schema": "b", "is_breaking": false, "ai_summary": "{}", "created_at": null}
            ])))
            .mount(&server)
            .await;

        let backend = SupabaseBackend::new(&server.uri(), "k", "metadata_analyses");
        let store = crate::store::AnalysisStore::new(std::sync::Arc::new(backend));
        let records = store.list_recent(20).await;

        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 1]);
        assert!(records[0].created_at.is_some());
        assert!(records[1].created_at.is_none());
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let backend = SupabaseBackend::new(&server.uri(), "k", "metadata_analyses");
        let err = backend.insert(&row()).await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn client_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid API key"})))
            .mount(&server)
            .await;

        let backend = SupabaseBackend::new(&server.uri(), "bad", "metadata_analyses");
        let err = backend.insert(&row()).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("Invalid API key"));
    }

    #[tokio::test]
    async fn empty_insert_response_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .mount(&server)
            .await;

        let backend = SupabaseBackend::new(&server.uri(), "k", "metadata_analyses");
        assert!(matches!(backend.insert(&row()).await, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn closed_port_is_transient() {
        let backend = SupabaseBackend::new("http://127.0.0.1:9", "k", "metadata_analyses");
        let err = backend.recent(5).await.unwrap_err();
        assert!(err.is_transient());
    }
}
