use std::fs;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use chrono::Utc;
use tracing::{debug, info, warn};
use crate::cache::ResponseCache;
use crate::def::*;
use crate::error::{Error, Result};
use crate::http::Address;
use crate::message::{Header, Request, Response};
use crate::redirect::{resolve_location, RedirectChain, MAX_REDIRECTS};
use crate::session::SessionState;

pub const USER_AGENT_NAME: &str = "tinyhttp/0.1";

/// The reply surfaced for one logical request, after redirects and cache handling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exchange {
    /// Target of the request that produced `response`.
    pub target: String,
    pub response: Response,
    pub redirects: usize,
    pub too_many_redirects: bool,
    pub cache_miss_on_304: bool,
    pub saved_path: Option<PathBuf>,
}

/// Keep-alive client over one already-connected stream.
pub struct Client<S: Read + Write> {
    reader: BufReader<S>,
    origin: Address,
    cache: ResponseCache,
    state: SessionState,
    max_redirects: usize,
    user_agent: String,
    save_dir: Option<PathBuf>,
}

impl<S: Read + Write> Client<S> {
    pub fn new(stream: S, origin: Address) -> Self {
        Self {
            reader: BufReader::new(stream),
            origin,
            cache: ResponseCache::new(),
            state: SessionState::Active,
            max_redirects: MAX_REDIRECTS,
            user_agent: USER_AGENT_NAME.to_string(),
            save_dir: None,
        }
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_user_agent<U: Into<String>>(mut self, user_agent: U) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Directory for PNG bodies received with a `200`.
    pub fn with_save_dir<P: Into<PathBuf>>(mut self, save_dir: P) -> Self {
        self.save_dir = Some(save_dir.into());
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Sends `request`, following up to the redirect limit on this connection.
    pub fn send(&mut self, request: Request) -> Result<Exchange> {
        let mut chain = RedirectChain::new(self.max_redirects);
        let mut request = request;

        loop {
            let response = self.roundtrip(&request)?;

            let location = match redirect_location(&response) {
                Some(location) => location,
                None => return Ok(self.settle(request, response, &chain)),
            };

            if !chain.advance() {
                warn!(path = %request.target, hops = chain.hops(), "too many redirects, giving up");
                return Ok(Exchange {
                    target: request.target,
                    response,
                    redirects: chain.hops(),
                    too_many_redirects: true,
                    cache_miss_on_304: false,
                    saved_path: None,
                });
            }

            let target = resolve_location(&location, &self.origin)?;
            info!(from = %request.target, to = %target, status = %response.status, "following redirect");
            request.target = target;
        }
    }

    /// One request out, one response back. Marks the session closed when
    /// either side declared closure or the stream ended.
    fn roundtrip(&mut self, request: &Request) -> Result<Response> {
        if self.state == SessionState::Closed {
            return Err(Error::ConnectionClosed);
        }

        let outgoing = self.prepare(request);
        info!(request = %outgoing, bytes = outgoing.message.body.len(), "sending request");
        debug!(body = %outgoing.message.text(), "request body");
        if let Err(err) = self.write(&outgoing) {
            self.state = SessionState::Closed;
            return Err(err.into());
        }

        let response = match Response::parse(&mut self.reader) {
            Ok(Some(response)) => response,
            Ok(None) => {
                self.state = SessionState::Closed;
                return Err(Error::ConnectionClosed);
            }
            Err(err) => {
                self.state = SessionState::Closed;
                return Err(err);
            }
        };
        info!(response = %response, bytes = response.message.body.len(), "received response");
        debug!(body = %response.message.text(), "response body");
        if response.is_truncated() {
            warn!(response = %response, received = response.message.body.len(), "response body shorter than declared");
        }

        if !outgoing.keep_alive() || !response.keep_alive() {
            debug!("connection will not be reused");
            self.state = SessionState::Closed;
        }

        Ok(response)
    }

    fn prepare(&self, request: &Request) -> Request {
        let mut outgoing = request.clone();
        let headers = &mut outgoing.message.headers;
        if !headers.contains(HOST) {
            headers.set(HOST, self.origin.to_string());
        }
        if !headers.contains(USER_AGENT) {
            headers.set(USER_AGENT, self.user_agent.as_str());
        }
        if !headers.contains(CONNECTION) {
            headers.add(Header::from(Connection::KeepAlive));
        }
        self.cache.apply(&mut outgoing);
        outgoing
    }

    fn write(&mut self, request: &Request) -> std::io::Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(&request.construct())?;
        stream.flush()
    }

    fn settle(&mut self, request: Request, mut response: Response, chain: &RedirectChain) -> Exchange {
        let mut cache_miss_on_304 = false;
        let mut saved_path = None;

        match response.status {
            Status::NotModified => match self.cache.revalidate(&request.method, &request.target, &mut response) {
                Some(entry) => saved_path = entry.saved_path.clone(),
                None => {
                    warn!(path = %request.target, "received 304 but nothing is cached for it");
                    cache_miss_on_304 = true;
                }
            },
            Status::Ok => {
                saved_path = self.save_image(&response);
                self.cache.store(&request.method, &request.target, &response, saved_path.clone());
            }
            _ => {}
        }

        Exchange {
            target: request.target,
            response,
            redirects: chain.hops(),
            too_many_redirects: false,
            cache_miss_on_304,
            saved_path,
        }
    }

    fn save_image(&self, response: &Response) -> Option<PathBuf> {
        let directory = self.save_dir.as_ref()?;
        if response.message.body.is_empty()
            || response.message.headers.typed::<ContentType>() != Some(ContentType::Png) {
            return None;
        }

        match write_unique(directory, &response.message.body) {
            Ok(path) => {
                info!(path = %path.display(), "image saved");
                Some(path)
            }
            Err(err) => {
                warn!(error = %err, directory = %directory.display(), "could not save image");
                None
            }
        }
    }
}

fn redirect_location(response: &Response) -> Option<String> {
    if !response.status.is_redirect() { return None }
    response.message.headers.get(LOCATION).map(str::to_string)
}

fn write_unique(directory: &Path, bytes: &[u8]) -> std::io::Result<PathBuf> {
    fs::create_dir_all(directory)?;
    let stamp = Utc::now().timestamp_millis();
    let mut path = directory.join(format!("{}.png", stamp));
    let mut suffix = 1;
    while path.exists() {
        path = directory.join(format!("{}-{}.png", stamp, suffix));
        suffix += 1;
    }

    fs::write(&path, bytes)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::testing::{Duplex, Stalled};

    fn origin() -> Address {
        Address::new("localhost", 8080)
    }

    fn client(script: &[u8]) -> Client<Duplex> {
        Client::new(Duplex::new(script), origin())
    }

    fn sent(client: &Client<Duplex>) -> Vec<Request> {
        let mut reader = Cursor::new(client.get_ref().output.clone());
        let mut requests = Vec::new();
        while let Some(request) = Request::parse(&mut reader).unwrap() {
            requests.push(request);
        }
        requests
    }

    fn ok(body: &str, extra: &str) -> String {
        format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}\r\n{}", body.len(), extra, body)
    }

    fn redirect(status: Status, location: &str) -> String {
        format!("HTTP/1.1 {} {}\r\nLocation: {}\r\nContent-Length: 0\r\n\r\n", status.code(), status.message(), location)
    }

    /// Odd hops answer 301 and even hops 302.
    fn hop(hop: usize) -> String {
        let status = if hop % 2 == 1 { Status::MovedPermanently } else { Status::Found };
        redirect(status, &format!("/hop{}", hop))
    }

    #[test]
    fn adds_default_headers() {
        let mut client = client(ok("hi", "").as_bytes());
        let exchange = client.send(Request::new(Method::GET, "/")).unwrap();

        assert_eq!(exchange.response.message.body, b"hi");
        let request = &sent(&client)[0];
        assert_eq!(request.message.headers.get(HOST), Some("localhost:8080"));
        assert_eq!(request.message.headers.get(USER_AGENT), Some(USER_AGENT_NAME));
        assert!(request.keep_alive());
        assert_eq!(client.state(), SessionState::Active);
    }

    #[test]
    fn cached_etag_becomes_if_none_match() {
        let script = ok("x", "ETag: \"abc\"\r\n") + &ok("x", "");
        let mut client = client(script.as_bytes());
        client.send(Request::new(Method::GET, "/x")).unwrap();
        client.send(Request::new(Method::GET, "/x")).unwrap();

        let requests = sent(&client);
        assert!(!requests[0].message.headers.contains(IF_NONE_MATCH));
        assert_eq!(requests[1].message.headers.get(IF_NONE_MATCH), Some("\"abc\""));
        assert!(!requests[1].message.headers.contains(IF_MODIFIED_SINCE));
    }

    #[test]
    fn not_modified_surfaces_cached_body() {
        let script = ok("B", "ETag: \"1\"\r\n") + "HTTP/1.1 304 Not Modified\r\nContent-Length: 1\r\n\r\n";
        let mut client = client(script.as_bytes());
        client.send(Request::new(Method::GET, "/x")).unwrap();
        let exchange = client.send(Request::new(Method::GET, "/x")).unwrap();

        assert_eq!(exchange.response.status, Status::NotModified);
        assert_eq!(exchange.response.message.body, b"B");
        assert!(!exchange.cache_miss_on_304);
    }

    #[test]
    fn not_modified_without_cache_is_reported() {
        let mut client = client(b"HTTP/1.1 304 Not Modified\r\n\r\n");
        let exchange = client.send(Request::new(Method::GET, "/y")).unwrap();

        assert!(exchange.cache_miss_on_304);
        assert!(exchange.response.message.body.is_empty());
    }

    #[test]
    fn five_redirects_reach_the_final_response() {
        let mut script = String::new();
        for n in 1..=5 {
            script += &hop(n);
        }
        script += &ok("done", "");
        let mut client = client(script.as_bytes());

        let exchange = client.send(Request::new(Method::GET, "/start")).unwrap();
        assert_eq!(exchange.response.status, Status::Ok);
        assert_eq!(exchange.response.message.body, b"done");
        assert_eq!(exchange.redirects, 5);
        assert_eq!(exchange.target, "/hop5");
        assert!(!exchange.too_many_redirects);
        let requests = sent(&client);
        assert_eq!(requests.len(), 6);
        assert_eq!(requests[1].target, "/hop1");
        assert_eq!(requests[2].target, "/hop2");
    }

    #[test]
    fn sixth_redirect_is_surfaced() {
        let mut script = String::new();
        for n in 1..=6 {
            script += &hop(n);
        }
        let mut client = client(script.as_bytes());

        let exchange = client.send(Request::new(Method::GET, "/start")).unwrap();
        assert_eq!(exchange.response.status, Status::Found);
        assert_eq!(exchange.response.message.headers.get(LOCATION), Some("/hop6"));
        assert!(exchange.too_many_redirects);
        assert_eq!(exchange.redirects, 5);
        assert_eq!(sent(&client).len(), 6);
    }

    #[test]
    fn hop_budget_is_per_request() {
        let mut script = String::new();
        for _ in 0..2 {
            for n in 1..=5 {
                script += &hop(n);
            }
            script += &ok("done", "");
        }
        let mut client = client(script.as_bytes());

        for _ in 0..2 {
            let exchange = client.send(Request::new(Method::GET, "/start")).unwrap();
            assert!(!exchange.too_many_redirects);
            assert_eq!(exchange.response.status, Status::Ok);
        }
    }

    #[test]
    fn redirect_reissues_method_and_body() {
        let script = redirect(Status::Found, "/login") + &ok("{}", "");
        let mut client = client(script.as_bytes());
        client.send(Request::new(Method::POST, "/old-login").with_body(b"username=a&password=b".to_vec())).unwrap();

        let requests = sent(&client);
        assert_eq!(requests[1].method, Method::POST);
        assert_eq!(requests[1].target, "/login");
        assert_eq!(requests[1].message.body, b"username=a&password=b");
    }

    #[test]
    fn cross_origin_redirect_is_rejected() {
        let mut client = client(redirect(Status::MovedPermanently, "http://example.com/elsewhere").as_bytes());
        let error = client.send(Request::new(Method::GET, "/")).unwrap_err();
        assert!(matches!(error, Error::UnsupportedRedirectTarget(_)));
    }

    #[test]
    fn server_close_ends_session() {
        let script = ok("bye", "Connection: close\r\n") + &ok("never", "");
        let mut client = client(script.as_bytes());
        client.send(Request::new(Method::GET, "/")).unwrap();

        assert_eq!(client.state(), SessionState::Closed);
        assert!(matches!(client.send(Request::new(Method::GET, "/")), Err(Error::ConnectionClosed)));
        assert_eq!(sent(&client).len(), 1);
    }

    #[test]
    fn caller_close_ends_session() {
        let mut client = client(ok("bye", "").as_bytes());
        let mut request = Request::new(Method::GET, "/");
        request.message.headers.add(Header::from(Connection::Close));
        client.send(request).unwrap();

        assert_eq!(client.state(), SessionState::Closed);
    }

    #[test]
    fn peer_hangup_closes_session() {
        let mut client = client(b"");
        assert!(matches!(client.send(Request::new(Method::GET, "/")), Err(Error::ConnectionClosed)));
        assert_eq!(client.state(), SessionState::Closed);
    }

    #[test]
    fn idle_timeout_closes_session() {
        let mut client = Client::new(Stalled::default(), origin());
        assert!(matches!(client.send(Request::new(Method::GET, "/")), Err(Error::IdleTimeout)));
        assert_eq!(client.state(), SessionState::Closed);
    }

    #[test]
    fn png_bodies_are_saved_and_restored() {
        let directory = std::env::temp_dir().join(format!("tinyhttp-{}", uuid::Uuid::new_v4()));
        let script = ok("PNG", "Content-Type: image/png\r\nETag: \"p\"\r\n") + "HTTP/1.1 304 Not Modified\r\n\r\n";
        let mut client = client(script.as_bytes()).with_save_dir(&directory);

        let first = client.send(Request::new(Method::GET, "/image")).unwrap();
        let saved = first.saved_path.clone().unwrap();
        assert_eq!(fs::read(&saved).unwrap(), b"PNG");

        let second = client.send(Request::new(Method::GET, "/image")).unwrap();
        assert_eq!(second.saved_path, Some(saved));
        assert_eq!(second.response.message.body, b"PNG");
    }
}
