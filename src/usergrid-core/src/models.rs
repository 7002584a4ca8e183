use serde::{Deserialize, Serialize};
use std::fmt;

/// Header value used for JSON request bodies
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Default page size used by the backend when no limit is sent
pub const DEFAULT_LIMIT: u32 = 10;

/// HTTP verbs understood by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a connection to traverse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Entities connecting *to* the subject
    In,
    /// Entities the subject connects *to*
    Out,
}

impl Direction {
    /// Path segment the backend uses for this direction
    pub fn path_segment(&self) -> &'static str {
        match self {
            Direction::In => "connecting",
            Direction::Out => "connections",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Comparison operators of the query language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Equal,
    GreaterThan,
    GreaterThanEqualTo,
    LessThan,
    LessThanEqualTo,
}

impl QueryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOperator::Equal => "=",
            QueryOperator::GreaterThan => ">",
            QueryOperator::GreaterThanEqualTo => ">=",
            QueryOperator::LessThan => "<",
            QueryOperator::LessThanEqualTo => "<=",
        }
    }
}

/// Which credential the client attaches to outgoing requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    None,
    #[default]
    User,
    App,
}

/// Image content types accepted for asset uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageContentType {
    Png,
    Jpeg,
}

impl ImageContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageContentType::Png => "image/png",
            ImageContentType::Jpeg => "image/jpeg",
        }
    }
}

/// Token grant response returned by `POST /<org>/<app>/token`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}
