//! Request assembly as plain data.
//!
//! [`UsergridRequest`] collects everything an HTTP call needs and
//! [`UsergridRequest::build`] renders it into a [`PreparedRequest`] without
//! touching the network. The execution engine owns the actual I/O.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::asset::UsergridAsset;
use crate::auth::Credential;
use crate::models::{HttpMethod, JSON_CONTENT_TYPE};
use crate::query::UsergridQuery;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const AUTHORIZATION: &str = "Authorization";
pub const ACCEPT: &str = "Accept";

pub const MULTIPART_BOUNDARY: &str = "usergrid-asset-upload-boundary";

/// Unreserved characters (RFC 3986) pass through path segments and params
const COMPONENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Binary(Vec<u8>),
}

/// A fully rendered request, ready for any HTTP transport
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value));
    }
}

#[must_use]
#[derive(Debug, Clone)]
pub struct UsergridRequest {
    pub method: HttpMethod,
    base_url: String,
    paths: Vec<String>,
    query: Option<UsergridQuery>,
    auth: Option<Credential>,
    headers: Vec<(String, String)>,
    body: Option<RequestBody>,
    query_params: Vec<(String, String)>,
}

impl UsergridRequest {
    pub fn new(method: HttpMethod, base_url: impl Into<String>) -> Self {
        Self {
            method,
            base_url: base_url.into(),
            paths: Vec::new(),
            query: None,
            auth: None,
            headers: Vec::new(),
            body: None,
            query_params: Vec::new(),
        }
    }

    pub fn path(mut self, segment: impl Into<String>) -> Self {
        self.paths.push(segment.into());
        self
    }

    pub fn paths<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths.extend(segments.into_iter().map(Into::into));
        self
    }

    pub fn query(mut self, query: UsergridQuery) -> Self {
        self.query = Some(query);
        self
    }

    pub fn maybe_query(mut self, query: Option<UsergridQuery>) -> Self {
        self.query = query;
        self
    }

    pub fn auth(mut self, credential: Option<Credential>) -> Self {
        self.auth = credential;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    /// Like [`query_param`](Self::query_param), replacing any earlier value for `key`
    pub fn set_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.query_params.retain(|(k, _)| *k != key);
        self.query_params.push((key, value.into()));
        self
    }

    /// Serialize `value` as the JSON body. Unserializable values leave the
    /// request without a body.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => self.body = Some(RequestBody::Json(json)),
            Err(e) => {
                debug!("Dropping request body that is not valid JSON: {}", e);
                self.body = None;
            }
        }
        self
    }

    /// Parse `raw` as the JSON body, dropping it when malformed
    pub fn json_str(mut self, raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(json) => self.body = Some(RequestBody::Json(json)),
            Err(e) => {
                debug!("Dropping request body that is not valid JSON: {}", e);
                self.body = None;
            }
        }
        self
    }

    pub fn binary(mut self, data: Vec<u8>) -> Self {
        self.body = Some(RequestBody::Binary(data));
        self
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn query_ref(&self) -> Option<&UsergridQuery> {
        self.query.as_ref()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.auth.as_ref()
    }

    pub fn url(&self) -> String {
        let mut url = self.base_url.trim_end_matches('/').to_string();
        for segment in self.paths.iter().filter(|s| !s.is_empty()) {
            url.push('/');
            url.push_str(&utf8_percent_encode(segment, COMPONENT_ENCODE_SET).to_string());
        }
        if let Some(query) = &self.query {
            url.push_str(&query.build());
        }
        for (key, value) in &self.query_params {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&utf8_percent_encode(key, COMPONENT_ENCODE_SET).to_string());
            url.push('=');
            url.push_str(&utf8_percent_encode(value, COMPONENT_ENCODE_SET).to_string());
        }
        url
    }

    pub fn build(&self) -> PreparedRequest {
        let mut prepared = PreparedRequest {
            method: self.method,
            url: self.url(),
            headers: self.headers.clone(),
            body: None,
        };

        let body = match &self.body {
            Some(RequestBody::Json(json)) => {
                if prepared.header(CONTENT_TYPE).is_none() {
                    prepared.set_header(CONTENT_TYPE, JSON_CONTENT_TYPE.to_string());
                }
                serde_json::to_vec(json).ok()
            }
            Some(RequestBody::Binary(data)) => Some(data.clone()),
            None => None,
        };
        if let Some(bytes) = body {
            prepared.set_header(CONTENT_LENGTH, bytes.len().to_string());
            prepared.body = Some(bytes);
        }

        if let Some(token) = self
            .auth
            .as_ref()
            .filter(|c| c.is_valid())
            .and_then(Credential::access_token)
        {
            prepared.set_header(AUTHORIZATION, format!("Bearer {}", token));
        }

        prepared
    }
}

/// A PUT carrying a single file part as `multipart/form-data`
#[derive(Debug, Clone)]
pub struct AssetUploadRequest {
    request: UsergridRequest,
    asset: UsergridAsset,
}

impl AssetUploadRequest {
    pub fn new(base_url: impl Into<String>, asset: UsergridAsset) -> Self {
        Self {
            request: UsergridRequest::new(HttpMethod::Put, base_url),
            asset,
        }
    }

    /// Customize the underlying request (paths, auth, headers)
    pub fn with_request<F>(mut self, f: F) -> Self
    where
        F: FnOnce(UsergridRequest) -> UsergridRequest,
    {
        self.request = f(self.request);
        self
    }

    pub fn asset(&self) -> &UsergridAsset {
        &self.asset
    }

    pub fn multipart_body(&self) -> Vec<u8> {
        multipart_body(&self.asset)
    }

    pub fn build(&self) -> PreparedRequest {
        let mut prepared = self.request.build();
        let body = self.multipart_body();
        prepared.set_header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
        );
        prepared.set_header(CONTENT_LENGTH, body.len().to_string());
        prepared.body = Some(body);
        prepared
    }
}

pub fn multipart_body(asset: &UsergridAsset) -> Vec<u8> {
    let head = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=file; filename={filename}\r\nContent-Type: {content_type}\r\n\r\n",
        boundary = MULTIPART_BOUNDARY,
        filename = asset.filename,
        content_type = asset.content_type,
    );
    let tail = format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY);

    let mut body = Vec::with_capacity(head.len() + asset.data.len() + tail.len());
    body.extend_from_slice(head.as_bytes());
    body.extend_from_slice(&asset.data);
    body.extend_from_slice(tail.as_bytes());
    body
}
