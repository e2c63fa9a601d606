// Request gateway for the KSL Cars proxy API.
//
// Every call goes through one POST endpoint that takes
// `{"endpoint": ..., "options": {"body": [...]}}` and answers `{"data": ...}`.
// `Transport` is the raw HTTP seam and `ProxyApi` the decoded one; both are
// traits so the pipeline can run against mocks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::CONTENT_TYPE};
use serde_json::{Value, json};
use tokio::time::sleep;

use crate::config::Settings;
use crate::error::{KslError, Result};

pub const DEFAULT_PROXY_URL: &str = "https://cars.ksl.com/nextjs-api/proxy";
pub const SEARCH_ENDPOINT: &str = "/classifieds/cars/search/searchByUrlParams";
pub const TRIMS_ENDPOINT: &str = "/classifieds/cars/category/getTrimsForMakeModel";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

const STATUS_OK: u16 = 200;
const STATUS_SERVICE_UNAVAILABLE: u16 = 503;

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<RawResponse>;

    /// Waits out the delay before a retry.
    async fn pause(&self, delay: Duration) {
        sleep(delay).await;
    }
}

#[async_trait]
impl Transport for Client {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<RawResponse> {
        let response = self
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}

/// Decoded access to the proxy: returns the `data` member of a successful reply.
#[async_trait]
pub trait ProxyApi: Send + Sync {
    async fn post(&self, endpoint: &str, body: Option<Vec<String>>) -> Result<Value>;
}

/// Fixed-delay retry on 503. `max_retries` counts retries, not attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_retries,
            delay: settings.retry_delay(),
        }
    }
}

/// Builds the shared HTTP client with the browser-like user agent.
pub fn build_client(settings: &Settings) -> Result<Client> {
    let client = Client::builder().user_agent(&settings.user_agent).build()?;
    Ok(client)
}

pub struct ProxyClient<T = Client> {
    transport: T,
    url: String,
    retry: RetryPolicy,
}

impl ProxyClient<Client> {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            build_client(settings)?,
            settings.proxy_url.clone(),
            RetryPolicy::from_settings(settings),
        ))
    }
}

impl<T: Transport> ProxyClient<T> {
    pub fn new(transport: T, url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            url: url.into(),
            retry,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

/// Request envelope understood by the proxy.
pub fn envelope(endpoint: &str, body: Option<Vec<String>>) -> Value {
    match body {
        Some(body) => json!({ "endpoint": endpoint, "options": { "body": body } }),
        None => json!({ "endpoint": endpoint }),
    }
}

#[async_trait]
impl<T: Transport> ProxyApi for ProxyClient<T> {
    async fn post(&self, endpoint: &str, body: Option<Vec<String>>) -> Result<Value> {
        let payload = envelope(endpoint, body);
        tracing::debug!(endpoint, payload = %payload, "Proxy request payload");

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let response = self.transport.post_json(&self.url, &payload).await?;
            tracing::debug!(endpoint, attempt, status = response.status, "Received proxy response");

            match response.status {
                STATUS_OK => {
                    let decoded: Value = serde_json::from_str(&response.body)?;
                    return match decoded {
                        Value::Object(mut map) => map.remove("data").ok_or_else(|| {
                            KslError::MalformedResponse(format!("no 'data' member in reply to {}", endpoint))
                        }),
                        other => Err(KslError::MalformedResponse(format!(
                            "expected a JSON object from {}, got {}",
                            endpoint, other
                        ))),
                    };
                }
                STATUS_SERVICE_UNAVAILABLE => {
                    if attempt > self.retry.max_retries {
                        tracing::error!(endpoint, attempt, "Proxy still unavailable, giving up");
                        return Err(KslError::MaxRetriesExceeded {
                            endpoint: endpoint.to_string(),
                            attempts: attempt,
                        });
                    }
                    tracing::warn!(
                        endpoint,
                        attempt,
                        delay_ms = self.retry.delay.as_millis() as u64,
                        "Proxy returned 503. Retrying..."
                    );
                    self.transport.pause(self.retry.delay).await;
                }
                status => {
                    tracing::debug!(endpoint, status, response_body = %response.body, "HTTP error details");
                    return Err(KslError::Service {
                        status,
                        body: response.body,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays canned HTTP responses and records every payload sent and
    /// every retry delay requested. Delays are not actually slept.
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<VecDeque<RawResponse>>,
        repeat: Option<RawResponse>,
        pub payloads: Mutex<Vec<Value>>,
        pub pauses: Mutex<Vec<Duration>>,
    }

    impl MockTransport {
        pub fn with_responses(responses: Vec<RawResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        /// Answers every request with the same response.
        pub fn always(response: RawResponse) -> Self {
            Self {
                repeat: Some(response),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.payloads.lock().unwrap().len()
        }

        pub fn pauses(&self) -> Vec<Duration> {
            self.pauses.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn post_json(&self, _url: &str, payload: &Value) -> Result<RawResponse> {
            self.payloads.lock().unwrap().push(payload.clone());
            if let Some(response) = self.responses.lock().unwrap().pop_front() {
                return Ok(response);
            }
            self.repeat
                .clone()
                .ok_or_else(|| KslError::MalformedResponse("mock transport exhausted".into()))
        }

        async fn pause(&self, delay: Duration) {
            self.pauses.lock().unwrap().push(delay);
        }
    }

    /// Replays decoded `data` values and records `(endpoint, body)` per call.
    #[derive(Default)]
    pub struct MockApi {
        responses: Mutex<VecDeque<Result<Value>>>,
        pub calls: Mutex<Vec<(String, Option<Vec<String>>)>>,
    }

    impl MockApi {
        pub fn with_data(data: Vec<Value>) -> Self {
            Self {
                responses: Mutex::new(data.into_iter().map(Ok).collect()),
                ..Self::default()
            }
        }

        pub fn with_results(results: Vec<Result<Value>>) -> Self {
            Self {
                responses: Mutex::new(results.into()),
                ..Self::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn bodies(&self) -> Vec<Vec<String>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(_, body)| body.clone().unwrap_or_default())
                .collect()
        }
    }

    #[async_trait]
    impl ProxyApi for MockApi {
        async fn post(&self, endpoint: &str, body: Option<Vec<String>>) -> Result<Value> {
            self.calls.lock().unwrap().push((endpoint.to_string(), body));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(KslError::MalformedResponse("mock api exhausted".into())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    const DELAY: Duration = Duration::from_millis(2000);

    fn client(transport: MockTransport, max_retries: u32) -> ProxyClient<MockTransport> {
        ProxyClient::new(
            transport,
            DEFAULT_PROXY_URL,
            RetryPolicy {
                max_retries,
                delay: DELAY,
            },
        )
    }

    fn reply(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn test_post_success() {
        let api = client(MockTransport::always(reply(200, r#"{"data": {}}"#)), 3);
        let data = api.post(SEARCH_ENDPOINT, None).await.unwrap();
        assert_eq!(data, json!({}));
        assert_eq!(api.transport().calls(), 1);
        assert!(api.transport().pauses().is_empty());
    }

    #[tokio::test]
    async fn test_envelope_carries_endpoint_and_body() {
        let api = client(MockTransport::always(reply(200, r#"{"data": []}"#)), 0);
        api.post(SEARCH_ENDPOINT, Some(vec!["page".into(), "1".into()]))
            .await
            .unwrap();
        api.post(TRIMS_ENDPOINT, None).await.unwrap();

        let payloads = api.transport().payloads.lock().unwrap().clone();
        assert_eq!(
            payloads[0],
            json!({ "endpoint": SEARCH_ENDPOINT, "options": { "body": ["page", "1"] } })
        );
        assert_eq!(payloads[1], json!({ "endpoint": TRIMS_ENDPOINT }));
    }

    #[tokio::test]
    async fn test_post_retry_on_503_gives_up() {
        let api = client(MockTransport::always(reply(503, "busy")), 3);
        let err = api.post(SEARCH_ENDPOINT, None).await.unwrap_err();
        assert!(matches!(err, KslError::MaxRetriesExceeded { attempts: 4, .. }));
        // one initial attempt plus exactly max_retries retries
        assert_eq!(api.transport().calls(), 4);
        assert_eq!(api.transport().pauses(), vec![DELAY; 3]);
    }

    #[tokio::test]
    async fn test_post_recovers_after_503() {
        let transport = MockTransport::with_responses(vec![
            reply(503, "busy"),
            reply(503, "busy"),
            reply(200, r#"{"data": {"items": []}}"#),
        ]);
        let api = client(transport, 5);
        let data = api.post(SEARCH_ENDPOINT, None).await.unwrap();
        assert_eq!(data, json!({ "items": [] }));
        assert_eq!(api.transport().calls(), 3);
        assert_eq!(api.transport().pauses(), vec![DELAY; 2]);
    }

    #[tokio::test]
    async fn test_other_status_fails_immediately() {
        let api = client(MockTransport::always(reply(404, "not here")), 5);
        let err = api.post(SEARCH_ENDPOINT, None).await.unwrap_err();
        match err {
            KslError::Service { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "not here");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(api.transport().calls(), 1);
        assert!(api.transport().pauses().is_empty());
    }

    #[tokio::test]
    async fn test_missing_data_member_is_malformed() {
        let api = client(MockTransport::always(reply(200, r#"{"items": []}"#)), 0);
        let err = api.post(SEARCH_ENDPOINT, None).await.unwrap_err();
        assert!(matches!(err, KslError::MalformedResponse(_)));
    }
}
