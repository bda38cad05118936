use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::{Node, NodeKind};
use crate::error::PolymixError;
use crate::store::{EntityStore, Query};

#[derive(Debug, Deserialize)]
struct UidResponse {
    uid: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

/// [`EntityStore`] backed by the repository's REST API.
#[derive(Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
    user_uid: String,
}

impl HttpStore {
    /// Builds the client and resolves the uid of the token's owner.
    pub fn connect(host: &str, token: &str, tls: bool) -> Result<Self, PolymixError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("polymix/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PolymixError::StoreHttp(err.to_string()))?,
        );
        let mut auth = HeaderValue::from_str(&format!("Token {}", token.trim())).map_err(|_| {
            PolymixError::InvalidConfig {
                field: "token",
                message: "token contains characters not allowed in a header".to_string(),
            }
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| PolymixError::StoreHttp(err.to_string()))?;

        let mut store = Self {
            client,
            base_url: Self::api_base(host, tls),
            user_uid: String::new(),
        };

        let url = format!("{}/user/", store.base_url);
        let response = store.send_with_retries(|| store.client.get(&url))?;
        let user: UidResponse = Self::handle_status(response)?
            .json()
            .map_err(|err| PolymixError::StoreDecode(err.to_string()))?;
        debug!(user = %user.uid, "connected to {}", store.base_url);
        store.user_uid = user.uid;
        Ok(store)
    }

    pub fn api_base(host: &str, tls: bool) -> String {
        let host = host
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        let scheme = if tls { "https" } else { "http" };
        format!("{scheme}://{host}/api/v1")
    }

    fn kind_url(&self, kind: NodeKind) -> String {
        format!("{}/{}/", self.base_url, kind.as_str())
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, PolymixError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(status, attempt, "retrying store request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(attempt, "retrying store request: {err}");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(PolymixError::StoreHttp(err.to_string()));
                }
            }
        }
    }

    fn handle_status(response: Response) -> Result<Response, PolymixError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "store request failed".to_string());
        Err(PolymixError::StoreStatus { status, message })
    }
}

impl EntityStore for HttpStore {
    fn user_uid(&self) -> &str {
        &self.user_uid
    }

    fn get<N: Node>(&self, query: &Query) -> Result<N, PolymixError> {
        let url = format!("{}search/", self.kind_url(N::KIND));
        debug!(kind = %N::KIND, query = %query.describe(), "store get");
        let response = self.send_with_retries(|| self.client.post(&url).json(query))?;
        let found: SearchResponse = Self::handle_status(response)?
            .json()
            .map_err(|err| PolymixError::StoreDecode(err.to_string()))?;
        let first = found
            .results
            .into_iter()
            .next()
            .ok_or_else(|| PolymixError::NotFound {
                kind: N::KIND,
                query: query.describe(),
            })?;
        serde_json::from_value(first).map_err(|err| PolymixError::StoreDecode(err.to_string()))
    }

    fn save<N: Node>(&self, node: &mut N) -> Result<(), PolymixError> {
        if let Some(uid) = node.uid() {
            let url = format!("{}{uid}/", self.kind_url(N::KIND));
            debug!(kind = %N::KIND, uid, "store update");
            let response = self.send_with_retries(|| self.client.put(&url).json(&*node))?;
            Self::handle_status(response)?;
            return Ok(());
        }

        let url = self.kind_url(N::KIND);
        debug!(kind = %N::KIND, key = %node.natural_key(), "store create");
        let response = self.send_with_retries(|| self.client.post(&url).json(&*node))?;
        let status = response.status();
        if status == StatusCode::CONFLICT || status == StatusCode::BAD_REQUEST {
            let body = response.text().unwrap_or_default();
            return Err(classify_create(
                N::KIND,
                node.natural_key(),
                status.as_u16(),
                body,
            ));
        }
        let created: UidResponse = Self::handle_status(response)?
            .json()
            .map_err(|err| PolymixError::StoreDecode(err.to_string()))?;
        node.set_uid(created.uid);
        Ok(())
    }
}

/// Error for a rejected create. A 409, or a 400 whose body mentions a
/// duplicate, means the natural key is taken.
fn classify_create(kind: NodeKind, key: String, status: u16, body: String) -> PolymixError {
    let duplicate = status == StatusCode::CONFLICT.as_u16()
        || (status == StatusCode::BAD_REQUEST.as_u16()
            && body.to_lowercase().contains("duplicate"));
    if duplicate {
        PolymixError::Duplicate { kind, key }
    } else {
        PolymixError::StoreStatus {
            status,
            message: body,
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
