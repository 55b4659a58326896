//! Firebase Realtime Database cart store.
//!
//! Uses the REST API with `reqwest`: point reads and writes go to
//! `carts/{uid}/{productId}.json`, and subscriptions use the REST streaming
//! protocol (`Accept: text/event-stream`) on `carts/{uid}.json`.

mod events;
mod tree;

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::StreamExt;
use reqwest::header::{ACCEPT, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use shopez_core::{ProductId, UserId};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::FirebaseConfig;

use super::{CartStore, SnapshotStream, StoreError};
use events::{StreamEvent, extract_sse_event, parse_sse_event};
use tree::CartTree;

const CARTS_ROOT: &str = "carts";
const FORBIDDEN_KEY_CHARS: &[char] = &['.', '$', '#', '[', ']', '/'];
const MAX_ERROR_BODY: usize = 200;

/// Cart store backed by Firebase Realtime Database.
#[derive(Clone)]
pub struct FirebaseCartStore {
    inner: Arc<FirebaseCartStoreInner>,
}

struct FirebaseCartStoreInner {
    client: reqwest::Client,
    database_url: Url,
    auth_token: Option<SecretString>,
    keepalive_timeout: Duration,
    request_timeout: Duration,
}

impl FirebaseCartStore {
    /// Create a new Firebase cart store.
    ///
    /// Point reads and writes are bounded by `request_timeout`. The
    /// subscription stream is not; it relies on the keep-alive timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &FirebaseConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(FirebaseCartStoreInner {
                client,
                database_url: config.database_url.clone(),
                auth_token: config.auth_token.clone(),
                keepalive_timeout: config.keepalive_timeout,
                request_timeout: config.request_timeout,
            }),
        })
    }

    /// Send a point request under the request deadline.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let response = request
            .timeout(self.inner.request_timeout)
            .send()
            .await
            .map_err(request_error)?;
        check_status(response).await
    }

    /// Build `{db}/carts/{user}[/{product}].json?auth=…`.
    fn location(&self, user: &UserId, product: Option<&ProductId>) -> Result<Url, StoreError> {
        validate_key(user.as_str())?;
        if let Some(product) = product {
            validate_key(product.as_str())?;
        }

        let mut url = self.inner.database_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| StoreError::InvalidKey(self.inner.database_url.to_string()))?;
            segments.pop_if_empty().push(CARTS_ROOT);
            match product {
                Some(product) => {
                    segments.push(user.as_str());
                    segments.push(&format!("{product}.json"));
                }
                None => {
                    segments.push(&format!("{user}.json"));
                }
            }
        }

        if let Some(token) = &self.inner.auth_token {
            url.query_pairs_mut()
                .append_pair("auth", token.expose_secret());
        }
        Ok(url)
    }
}

impl CartStore for FirebaseCartStore {
    #[instrument(skip_all, fields(user = %user))]
    async fn subscribe(&self, user: &UserId) -> Result<SnapshotStream, StoreError> {
        let url = self.location(user, None)?;

        let response = self
            .inner
            .client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .send()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let response = check_status(response).await?;
        debug!("cart stream opened");

        let keepalive_timeout = self.inner.keepalive_timeout;

        Ok(Box::pin(stream! {
            let mut tree = CartTree::default();
            let mut buffer: Vec<u8> = Vec::new();
            let mut byte_stream = std::pin::pin!(response.bytes_stream());

            'stream: loop {
                let chunk = match tokio::time::timeout(keepalive_timeout, byte_stream.next()).await {
                    Err(_) => {
                        yield Err(StoreError::Connection("no data within keep-alive timeout".into()));
                        break;
                    }
                    Ok(None) => {
                        yield Err(StoreError::Connection("stream closed by server".into()));
                        break;
                    }
                    Ok(Some(Err(e))) => {
                        yield Err(StoreError::Connection(e.to_string()));
                        break;
                    }
                    Ok(Some(Ok(chunk))) => chunk,
                };

                buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

                while let Some(event) = extract_sse_event(&mut buffer) {
                    let Some(parsed) = parse_sse_event(&event) else {
                        continue;
                    };

                    match parsed {
                        Ok(StreamEvent::Put(update)) => {
                            tree.put(&update.path, update.data);
                            yield Ok(tree.snapshot());
                        }
                        Ok(StreamEvent::Patch(update)) => {
                            tree.patch(&update.path, update.data);
                            yield Ok(tree.snapshot());
                        }
                        Ok(StreamEvent::KeepAlive) => {}
                        Ok(StreamEvent::Cancel(reason)) => {
                            yield Err(StoreError::PermissionDenied(reason));
                            break 'stream;
                        }
                        Ok(StreamEvent::AuthRevoked) => {
                            yield Err(StoreError::AuthRevoked);
                            break 'stream;
                        }
                        Err(e) => {
                            // The local tree can no longer be trusted.
                            warn!(error = %e, "unparseable stream event");
                            yield Err(StoreError::Parse(e));
                            break 'stream;
                        }
                    }
                }
            }
        }))
    }

    #[instrument(skip_all, fields(user = %user, product = %product))]
    async fn get(&self, user: &UserId, product: &ProductId) -> Result<Option<Value>, StoreError> {
        let url = self.location(user, Some(product))?;
        let response = self.send(self.inner.client.get(url)).await?;

        let body = response.text().await.map_err(request_error)?;
        match serde_json::from_str::<Value>(&body)? {
            Value::Null => Ok(None),
            record => Ok(Some(record)),
        }
    }

    #[instrument(skip_all, fields(user = %user, product = %product))]
    async fn put(&self, user: &UserId, product: &ProductId, record: Value) -> Result<(), StoreError> {
        let mut url = self.location(user, Some(product))?;
        url.query_pairs_mut().append_pair("print", "silent");

        self.send(self.inner.client.put(url).json(&record)).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(user = %user, product = %product))]
    async fn delete(&self, user: &UserId, product: &ProductId) -> Result<(), StoreError> {
        let url = self.location(user, Some(product))?;
        self.send(self.inner.client.delete(url)).await?;
        Ok(())
    }
}

/// Firebase keys must be non-empty and free of `. $ # [ ] /` and control characters.
fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.contains(FORBIDDEN_KEY_CHARS) || key.chars().any(char::is_control) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Timeouts are lost connections; everything else stays an HTTP error.
fn request_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Connection(format!("request timed out: {e}"))
    } else {
        StoreError::Http(e)
    }
}

/// Map non-success responses onto store errors.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(StoreError::RateLimited(retry_after));
    }

    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(MAX_ERROR_BODY)
        .collect();

    if matches!(
        status,
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN
    ) {
        return Err(StoreError::PermissionDenied(body));
    }

    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    fn config(database_url: &str, token: Option<&str>) -> FirebaseConfig {
        FirebaseConfig {
            database_url: Url::parse(database_url).unwrap(),
            auth_token: token.map(|t| SecretString::from(t.to_string())),
            keepalive_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_millis(200),
        }
    }

    fn store(token: Option<&str>) -> FirebaseCartStore {
        FirebaseCartStore::new(&config(
            "https://shopez-fcad8-default-rtdb.firebaseio.com",
            token,
        ))
        .unwrap()
    }

    /// A server that accepts connections and never answers.
    async fn silent_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_cart_location() {
        let url = store(None).location(&UserId::new("uid-1"), None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://shopez-fcad8-default-rtdb.firebaseio.com/carts/uid-1.json"
        );
    }

    #[test]
    fn test_item_location_with_token() {
        let url = store(Some("tok"))
            .location(&UserId::new("uid-1"), Some(&ProductId::new("7")))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://shopez-fcad8-default-rtdb.firebaseio.com/carts/uid-1/7.json?auth=tok"
        );
    }

    #[test]
    fn test_forbidden_keys_are_rejected() {
        let store = store(None);
        for key in ["", "a.b", "a/b", "a#b", "$x", "[0]"] {
            let result = store.location(&UserId::new("uid"), Some(&ProductId::new(key)));
            assert!(
                matches!(result, Err(StoreError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_stalled_writes_time_out_as_connection_errors() {
        let store = FirebaseCartStore::new(&config(&silent_server().await, None)).unwrap();
        let user = UserId::new("uid-1");
        let product = ProductId::new("7");

        let put = tokio::time::timeout(
            Duration::from_secs(5),
            store.put(&user, &product, serde_json::json!({"id": 7})),
        )
        .await
        .unwrap();
        assert!(matches!(put, Err(StoreError::Connection(_))));

        let delete = tokio::time::timeout(Duration::from_secs(5), store.delete(&user, &product))
            .await
            .unwrap();
        assert!(matches!(delete, Err(StoreError::Connection(_))));
    }

    #[test]
    fn test_firebase_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FirebaseCartStore>();
    }
}
