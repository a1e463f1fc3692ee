use crate::{
    error::UpstreamError,
    resource::{
        GetRequest,
        ListRequest,
        Page,
        PageInfo,
        ResourceKind,
    },
    UpstreamClient,
    UpstreamFuture,
};
use reqwest::{
    header,
    Client as HttpClient,
};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bearer-token authenticated client for the Cloudflare v4 API.
#[derive(Debug, Clone)]
pub struct CloudflareClient {
    http: HttpClient,
    base_url: Url,
    api_token: String,
}

/// The `{success, errors, messages, result, result_info}` wrapper around every v4 response.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    #[serde(default)]
    messages: Vec<serde_json::Value>,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    result_info: Option<PageInfo>,
}

fn default_success() -> bool {
    true
}

impl CloudflareClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.cloudflare.com/client/v4/";

    pub fn new(mut base_url: Url, api_token: impl Into<String>) -> Result<Self, reqwest::Error> {
        // `Url::join` replaces the last path segment unless the base ends in a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_token: api_token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, kind: ResourceKind, account_id: &str, resource_id: Option<&str>) -> Result<Url, UpstreamError> {
        Ok(self.base_url.join(&kind.path(account_id, resource_id))?)
    }

    async fn fetch(&self, url: Url, query: &[(String, String)]) -> Result<Envelope, UpstreamError> {
        let url_str = url.to_string();
        debug!(url = %url_str, "requesting");

        let response = self
            .http
            .get(url)
            .query(query)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_token))
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                url: url_str.clone(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| UpstreamError::Transport {
            url: url_str.clone(),
            source,
        })?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                url: url_str,
                status,
                body,
            });
        }

        let envelope: Envelope = serde_json::from_str(&body).map_err(|source| UpstreamError::Decode {
            url: url_str.clone(),
            source,
        })?;

        if !envelope.success {
            let messages = serde_json::json!({
                "errors": envelope.errors,
                "messages": envelope.messages,
            });
            return Err(UpstreamError::Unsuccessful {
                url: url_str,
                messages: messages.to_string(),
            });
        }

        Ok(envelope)
    }

    async fn list_page(&self, request: ListRequest<'_>) -> Result<Page, UpstreamError> {
        let url = self.endpoint(request.kind, request.account_id, None)?;
        let url_str = url.to_string();
        let envelope = self.fetch(url, &request.query()).await?;

        let items = match request.kind.items_key() {
            Some(key) => envelope.result.get(key).cloned().unwrap_or_default(),
            None => envelope.result,
        };
        let items = match items {
            serde_json::Value::Null => Vec::new(),
            items => serde_json::from_value(items).map_err(|source| UpstreamError::Decode { url: url_str, source })?,
        };

        Ok(Page {
            items,
            info: envelope.result_info.unwrap_or_default(),
        })
    }

    async fn get_one(&self, request: GetRequest<'_>) -> Result<serde_json::Value, UpstreamError> {
        let url = self.endpoint(request.kind, request.account_id, Some(request.resource_id))?;
        let envelope = self.fetch(url, &request.query()).await?;
        Ok(envelope.result)
    }
}

impl UpstreamClient for CloudflareClient {
    fn list<'a>(&'a self, request: ListRequest<'a>) -> UpstreamFuture<'a, Page> {
        Box::pin(self.list_page(request))
    }

    fn get<'a>(&'a self, request: GetRequest<'a>) -> UpstreamFuture<'a, serde_json::Value> {
        Box::pin(self.get_one(request))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use mockito::{
        Matcher,
        Server,
    };
    use pretty_assertions::assert_eq;

    fn client_for(server: &Server) -> CloudflareClient {
        CloudflareClient::new(Url::parse(&server.url()).unwrap(), "test-token").unwrap()
    }

    #[tokio::test]
    async fn lists_users_with_auth_and_paging() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/accounts/acc/access/users")
            .match_header("authorization", "Bearer test-token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "2".into()),
                Matcher::UrlEncoded("per_page".into(), "50".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"success":true,"errors":[],"messages":[],
                    "result":[{"id":"u1","email":"a@x"},{"id":"u2","email":"c@x"}],
                    "result_info":{"page":2,"per_page":50,"total_count":52,"total_pages":2}}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let page = client
            .list(ListRequest::new(ResourceKind::Users, "acc").with_page(2))
            .await
            .unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0]["email"], "a@x");
        assert_eq!(page.info.total_pages, 2);
        assert!(page.info.is_last(2));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn dex_tests_are_unwrapped_from_the_result_object() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/accounts/acc/dex/tests")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "1".into()),
                Matcher::Regex("timeStart=".into()),
                Matcher::Regex("timeEnd=".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"success":true,"result":{"tests":[{"id":"t1"}]},"result_info":{"total_pages":1}}"#)
            .create_async()
            .await;

        let page = client_for(&server)
            .list(ListRequest::new(ResourceKind::DexTests, "acc"))
            .await
            .unwrap();

        assert_eq!(page.items, vec![serde_json::json!({"id": "t1"})]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn service_unavailable_is_a_retryable_status_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/accounts/acc/dex/traceroute-tests/t1")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("try later")
            .create_async()
            .await;

        let err = client_for(&server)
            .get(GetRequest::new(ResourceKind::TracerouteTest, "acc", "t1"))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn forbidden_is_terminal() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/accounts/acc/cfd_tunnel")
            .match_query(Matcher::UrlEncoded("is_deleted".into(), "false".into()))
            .with_status(403)
            .create_async()
            .await;

        let err = client_for(&server)
            .list(ListRequest::new(ResourceKind::Tunnels, "acc"))
            .await
            .unwrap_err();

        assert!(matches!(err, UpstreamError::Status { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unsuccessful_envelope_is_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/accounts/acc/access/users")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"success":false,"errors":[{"code":1003,"message":"bad account"}],"messages":[],"result":null}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .list(ListRequest::new(ResourceKind::Users, "acc"))
            .await
            .unwrap_err();

        match err {
            UpstreamError::Unsuccessful { messages, .. } => assert!(messages.contains("bad account")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/accounts/acc/access/users")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let err = client_for(&server)
            .list(ListRequest::new(ResourceKind::Users, "acc"))
            .await
            .unwrap_err();

        assert!(matches!(err, UpstreamError::Decode { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn get_returns_the_result_object() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/accounts/acc/dex/traceroute-tests/t1")
            .match_query(Matcher::UrlEncoded("interval".into(), "minute".into()))
            .with_status(200)
            .with_body(r#"{"success":true,"result":{"kind":"traceroute","name":"dns","host":"1.1.1.1"}}"#)
            .create_async()
            .await;

        let result = client_for(&server)
            .get(GetRequest::new(ResourceKind::TracerouteTest, "acc", "t1"))
            .await
            .unwrap();

        assert_eq!(result["kind"], "traceroute");
    }

    #[test]
    fn base_url_without_trailing_slash_keeps_its_path() {
        let client = CloudflareClient::new(Url::parse("https://api.example.com/client/v4").unwrap(), "t").unwrap();
        let url = client.endpoint(ResourceKind::Users, "acc", None).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/client/v4/accounts/acc/access/users");
    }
}
