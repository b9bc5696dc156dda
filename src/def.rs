use std::fmt::{self, Display, Formatter};

pub const CONNECTION: &str = "Connection";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const ETAG: &str = "ETag";
pub const HOST: &str = "Host";
pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
pub const IF_NONE_MATCH: &str = "If-None-Match";
pub const LAST_MODIFIED: &str = "Last-Modified";
pub const LOCATION: &str = "Location";
pub const SERVER: &str = "Server";
pub const USER_AGENT: &str = "User-Agent";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    POST,
    Other(String),
}

impl Method {
    pub fn parse(method: &str) -> Self {
        match method.to_uppercase().as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            _ => Method::Other(method.to_string()),
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Method::GET => write!(f, "GET"),
            Method::POST => write!(f, "POST"),
            Method::Other(method) => write!(f, "{}", method),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Version {
    V1,
    V11,
    Other(String),
}

impl Version {
    pub fn parse(version: &str) -> Self {
        match version {
            "HTTP/1.0" => Version::V1,
            "HTTP/1.1" => Version::V11,
            other => Version::Other(other.to_string()),
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Version::V1 => write!(f, "HTTP/1.0"),
            Version::V11 => write!(f, "HTTP/1.1"),
            Version::Other(version) => write!(f, "{}", version),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    MovedPermanently,
    Found,
    NotModified,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
    Other(u16),
}

impl Status {
    /// Accepts any numeric code; `None` only for non-numeric input.
    pub fn parse(status: &str) -> Option<Self> {
        status.parse::<u16>().ok().map(Self::from_code)
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            200 => Status::Ok,
            301 => Status::MovedPermanently,
            302 => Status::Found,
            304 => Status::NotModified,
            404 => Status::NotFound,
            405 => Status::MethodNotAllowed,
            500 => Status::InternalServerError,
            other => Status::Other(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::MovedPermanently => 301,
            Status::Found => 302,
            Status::NotModified => 304,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::InternalServerError => 500,
            Status::Other(code) => *code,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::MovedPermanently => "Moved Permanently",
            Status::Found => "Found",
            Status::NotModified => "Not Modified",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::InternalServerError => "Internal Server Error",
            Status::Other(_) => "Unknown Status",
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, Status::MovedPermanently | Status::Found)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
const CONTENT_TYPE_PNG: &str = "image/png";
const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
const CONTENT_TYPE_JSON: &str = "application/json";

pub trait Parsable where Self: Sized {
    fn parse(value: &str) -> Option<Self>;
}

/// A typed value that lives in a single well-known header.
pub trait ToHeader where Self: Parsable {
    fn name() -> &'static str;
    fn value(&self) -> &'static str;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    Html,
    Png,
    Text,
    Json,
}

impl ContentType {
    /// Unknown extensions fall back to plain text.
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_lowercase().as_str() {
            "html" | "htm" => ContentType::Html,
            "png" => ContentType::Png,
            "json" => ContentType::Json,
            _ => ContentType::Text,
        }
    }

    pub fn is_binary(value: &str) -> bool {
        !value.starts_with("text") && !value.starts_with(CONTENT_TYPE_JSON)
    }
}

impl Parsable for ContentType {
    fn parse(value: &str) -> Option<Self> {
        let essence = value.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "text/html" => Some(ContentType::Html),
            "image/png" => Some(ContentType::Png),
            "text/plain" => Some(ContentType::Text),
            "application/json" => Some(ContentType::Json),
            _ => None,
        }
    }
}

impl ToHeader for ContentType {
    fn name() -> &'static str { CONTENT_TYPE }
    fn value(&self) -> &'static str {
        match self {
            ContentType::Html => CONTENT_TYPE_HTML,
            ContentType::Png => CONTENT_TYPE_PNG,
            ContentType::Text => CONTENT_TYPE_TEXT,
            ContentType::Json => CONTENT_TYPE_JSON,
        }
    }
}

const CONNECTION_CLOSE: &str = "close";
const CONNECTION_KEEP_ALIVE: &str = "keep-alive";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connection {
    Close,
    KeepAlive,
}

impl Parsable for Connection {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            CONNECTION_CLOSE => Some(Connection::Close),
            CONNECTION_KEEP_ALIVE => Some(Connection::KeepAlive),
            _ => None,
        }
    }
}

impl ToHeader for Connection {
    fn name() -> &'static str { CONNECTION }
    fn value(&self) -> &'static str {
        match self {
            Connection::Close => CONNECTION_CLOSE,
            Connection::KeepAlive => CONNECTION_KEEP_ALIVE,
        }
    }
}

impl From<bool> for Connection {
    fn from(keep_alive: bool) -> Self {
        if keep_alive { Connection::KeepAlive } else { Connection::Close }
    }
}
