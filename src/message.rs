use std::fmt::{self, Display, Formatter};
use std::io::{self, BufRead, Read};
use tracing::trace;
use crate::def::*;
use crate::error::{Error, Result};

const NEWLINE: &str = "\r\n";

/// Upper bound on start line plus headers, in bytes.
pub const MAX_HEAD_LENGTH: usize = 16 * 1024;

// body buffers grow past this only as bytes actually arrive
const BODY_PREALLOCATION: usize = 64 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self { name: name.into(), value: value.into() }
    }

    pub fn from<T: ToHeader>(to_header: T) -> Self {
        Self::new(T::name(), to_header.value())
    }

    /// Splits at the first colon and trims both halves.
    pub fn parse(line: &str) -> Option<Self> {
        let (name, value) = line.split_once(':')?;
        let name = name.trim();
        if name.is_empty() { return None }

        Some(Self::new(name, value.trim()))
    }

    pub fn construct(&self) -> String {
        format!("{}: {}", self.name, self.value)
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.construct())
    }
}

/// Ordered header list with case-insensitive names. Writing an existing
/// name replaces it in place, so the first position wins and the last value wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn add(&mut self, header: Header) {
        match self.0.iter_mut().find(|h| h.name.eq_ignore_ascii_case(&header.name)) {
            Some(existing) => *existing = header,
            None => self.0.push(header),
        }
    }

    pub fn set<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.add(Header::new(name, value));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn typed<T: ToHeader>(&self) -> Option<T> {
        self.get(T::name()).and_then(T::parse)
    }

    pub fn list(&self) -> std::slice::Iter<'_, Header> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(None)` when the header is absent.
    pub fn content_length(&self) -> Result<Option<usize>> {
        match self.get(CONTENT_LENGTH) {
            Some(value) => value.trim().parse::<usize>()
                .map(Some)
                .map_err(|_| Error::InvalidContentLength(value.to_string())),
            None => Ok(None),
        }
    }

    fn parse<R: BufRead>(reader: &mut R, head: &mut usize) -> Result<Self> {
        let mut headers = Self::new();

        while let Some(line) = read_line(reader, head)? {
            if line.is_empty() { break }
            match Header::parse(&line) {
                Some(header) => headers.add(header),
                None => trace!(line = %line, "skipping header line without a name"),
            }
        }

        Ok(headers)
    }

    pub fn construct(&self) -> Vec<u8> {
        let mut headers = Vec::new();
        for header in self.list() {
            headers.extend(header.construct().as_bytes());
            headers.extend(NEWLINE.as_bytes());
        }

        headers
    }
}

impl Display for Headers {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for header in self.list() {
            write!(f, "{}{}", header, NEWLINE)?;
        }

        Ok(())
    }
}

/// Headers plus body. An empty body means no body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a body and sets `Content-Length` to match it.
    pub fn set_body(&mut self, body: Vec<u8>) {
        self.headers.set(CONTENT_LENGTH, body.len().to_string());
        self.body = body;
    }

    pub fn set_content(&mut self, content_type: ContentType, body: Vec<u8>) {
        self.headers.add(Header::from(content_type));
        self.set_body(body);
    }

    pub fn declared_length(&self) -> Option<usize> {
        self.headers.content_length().ok().flatten()
    }

    /// An explicit `Connection` header decides; otherwise only HTTP/1.1 persists.
    pub fn keep_alive(&self, version: &Version) -> bool {
        match self.headers.typed::<Connection>() {
            Some(Connection::Close) => false,
            Some(Connection::KeepAlive) => true,
            None => *version == Version::V11,
        }
    }

    pub fn text(&self) -> String {
        if self.body.is_empty() { return String::new() }
        match self.headers.get(CONTENT_TYPE) {
            Some(content_type) if ContentType::is_binary(content_type) =>
                format!("[binary data - {} bytes]", self.body.len()),
            _ => String::from_utf8_lossy(&self.body).into_owned(),
        }
    }

    fn parse<R: BufRead>(reader: &mut R, head: &mut usize, read_body: bool) -> Result<Self> {
        let headers = Headers::parse(reader, head)?;
        let length = headers.content_length()?.unwrap_or(0);
        let body = if read_body && length > 0 { read_body_exact(reader, length)? } else { Vec::new() };

        Ok(Self { headers, body })
    }

    pub fn construct(&self) -> Vec<u8> {
        let mut message = self.headers.construct();
        message.extend(NEWLINE.as_bytes());
        message.extend(&self.body);
        message
    }
}

struct Headline(String, String, String);

impl Headline {
    /// Two leading tokens, then the trimmed remainder of the line.
    fn parse(line: &str) -> Result<Self> {
        let malformed = || Error::MalformedStartLine(line.to_string());
        let (first, rest) = line.trim().split_once(char::is_whitespace).ok_or_else(malformed)?;
        let (second, third) = rest.trim_start().split_once(char::is_whitespace).ok_or_else(malformed)?;
        let third = third.trim();
        if first.is_empty() || second.is_empty() || third.is_empty() { return Err(malformed()) }

        Ok(Headline(first.to_string(), second.to_string(), third.to_string()))
    }

    fn construct(first: impl Display, second: impl Display, third: impl Display) -> Vec<u8> {
        format!("{} {} {}{}", first, second, third, NEWLINE).into_bytes()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub message: Message,
}

impl Request {
    pub fn new<S: Into<String>>(method: Method, target: S) -> Self {
        Self { method, target: target.into(), version: Version::V11, message: Message::new() }
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.message.set_body(body);
        self
    }

    /// `Ok(None)` when the peer closed before sending anything.
    pub fn parse<R: BufRead>(reader: &mut R) -> Result<Option<Self>> {
        let mut head = 0;
        let line = match read_line(reader, &mut head)? {
            Some(line) => line,
            None => return Ok(None),
        };
        let Headline(method, target, version) = Headline::parse(&line)?;

        Ok(Some(Self {
            method: Method::parse(&method),
            target,
            version: Version::parse(&version),
            message: Message::parse(reader, &mut head, true)?,
        }))
    }

    pub fn keep_alive(&self) -> bool {
        self.message.keep_alive(&self.version)
    }

    pub fn is_truncated(&self) -> bool {
        self.message.declared_length().map_or(false, |length| self.message.body.len() < length)
    }

    pub fn construct(&self) -> Vec<u8> {
        let mut request = Headline::construct(&self.method, &self.target, &self.version);
        request.extend(self.message.construct());
        request
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.method, self.target, self.version)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub version: Version,
    pub status: Status,
    pub message: Message,
}

impl Response {
    pub fn new(status: Status) -> Self {
        Self { version: Version::V11, status, message: Message::new() }
    }

    pub fn with_content(status: Status, content_type: ContentType, body: Vec<u8>) -> Self {
        let mut response = Self::new(status);
        response.message.set_content(content_type, body);
        response
    }

    pub fn html(status: Status, html: &str) -> Self {
        Self::with_content(status, ContentType::Html, html.as_bytes().to_vec())
    }

    pub fn redirect(status: Status, location: &str) -> Self {
        let html = format!(
            "<html><body><h1>{} {}</h1><p>Redirect to <a href=\"{}\">{}</a></p></body></html>",
            status, status.message(), location, location);
        let mut response = Self::html(status, &html);
        response.message.headers.set(LOCATION, location);
        response
    }

    /// `Ok(None)` when the peer closed before sending anything.
    /// A 304 never reads a body, whatever its `Content-Length` says.
    pub fn parse<R: BufRead>(reader: &mut R) -> Result<Option<Self>> {
        let mut head = 0;
        let line = match read_line(reader, &mut head)? {
            Some(line) => line,
            None => return Ok(None),
        };
        let Headline(version, status, reason) = Headline::parse(&line)?;
        let status = Status::parse(&status).ok_or_else(|| Error::MalformedStartLine(line.clone()))?;
        if reason != status.message() {
            trace!(%status, reason = %reason, "reason phrase differs from status table");
        }
        let read_body = status != Status::NotModified;

        Ok(Some(Self {
            version: Version::parse(&version),
            message: Message::parse(reader, &mut head, read_body)?,
            status,
        }))
    }

    pub fn keep_alive(&self) -> bool {
        self.message.keep_alive(&self.version)
    }

    pub fn is_truncated(&self) -> bool {
        self.status != Status::NotModified
            && self.message.declared_length().map_or(false, |length| self.message.body.len() < length)
    }

    pub fn construct(&self) -> Vec<u8> {
        let mut response = Headline::construct(&self.version, self.status, self.status.message());
        response.extend(self.message.construct());
        response
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.version, self.status, self.status.message())
    }
}

fn read_error(error: io::Error) -> Error {
    match error.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::IdleTimeout,
        _ => Error::Io(error),
    }
}

/// Reads one line, tolerating both `\r\n` and `\n`. `Ok(None)` at end of stream.
fn read_line<R: BufRead>(reader: &mut R, head: &mut usize) -> Result<Option<String>> {
    let mut buffer = Vec::new();
    let remaining = MAX_HEAD_LENGTH.saturating_sub(*head) as u64 + 1;
    let size = reader.by_ref().take(remaining).read_until(b'\n', &mut buffer).map_err(read_error)?;
    if size == 0 { return Ok(None) }

    *head += size;
    if *head > MAX_HEAD_LENGTH { return Err(Error::HeadTooLarge(MAX_HEAD_LENGTH)) }
    if buffer.ends_with(b"\n") { buffer.pop(); }
    if buffer.ends_with(b"\r") { buffer.pop(); }

    Ok(Some(String::from_utf8_lossy(&buffer).into_owned()))
}

/// Reads up to `length` bytes; a stream that ends early yields a shorter body.
fn read_body_exact<R: BufRead>(reader: &mut R, length: usize) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(length.min(BODY_PREALLOCATION));
    reader.by_ref().take(length as u64).read_to_end(&mut body).map_err(read_error)?;
    if body.len() < length {
        trace!(declared = length, received = body.len(), "body truncated by end of stream");
    }

    Ok(body)
}
