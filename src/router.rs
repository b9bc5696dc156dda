use std::collections::HashMap;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};
use crate::def::*;
use crate::error::Result;
use crate::message::{Header, Request, Response};
use crate::registry::{Registration, UserStore};

pub const SERVER_NAME: &str = "tinyhttp/0.1";

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

const INDEX_HTML: &str = "<html><body>\
    <h1>HTTP Server</h1>\
    <p>Available endpoints:</p>\
    <ul>\
    <li>POST /register username=123&amp;password=456 - register a user</li>\
    <li>POST /login username=123&amp;password=456 - log in</li>\
    <li>GET /image - download the image</li>\
    <li>POST /image &lt;file&gt; - upload the image</li>\
    </ul>\
    </body></html>";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route {
    Index,
    Register,
    Login,
    Image,
}

impl Route {
    fn find(path: &str) -> Option<Self> {
        match path {
            "/" | "/index.html" => Some(Route::Index),
            "/register" => Some(Route::Register),
            "/login" => Some(Route::Login),
            "/image" => Some(Route::Image),
            _ => None,
        }
    }
}

/// Domain-level result carried in a `200` body.
#[derive(Debug, Serialize)]
struct Outcome<'a> {
    success: bool,
    message: &'a str,
}

/// Fixed route table for the demo server.
pub struct Router {
    users: Arc<dyn UserStore>,
    image_path: PathBuf,
    conditional_get: bool,
}

impl Router {
    pub fn new<P: Into<PathBuf>>(users: Arc<dyn UserStore>, image_path: P) -> Self {
        Self { users, image_path: image_path.into(), conditional_get: true }
    }

    /// Whether `GET /image` honours `If-None-Match` / `If-Modified-Since`.
    pub fn with_conditional_get(mut self, enabled: bool) -> Self {
        self.conditional_get = enabled;
        self
    }

    /// Always produces a response; handler errors and panics become a 500.
    pub fn dispatch(&self, request: &Request) -> Response {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.route(request)));
        let mut response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                error!(request = %request, error = %err, "handler failed");
                internal_server_error()
            }
            Err(_) => {
                error!(request = %request, "handler panicked");
                internal_server_error()
            }
        };

        response.message.headers.set(SERVER, SERVER_NAME);
        response.message.headers.add(Header::from(Connection::from(request.keep_alive())));
        response
    }

    fn route(&self, request: &Request) -> Result<Response> {
        let route = match Route::find(&request.target) {
            Some(route) => route,
            None => return Ok(not_found()),
        };

        match (route, &request.method) {
            (Route::Index, Method::GET) => Ok(Response::html(Status::Ok, INDEX_HTML)),
            (Route::Register, Method::POST) => self.register(request),
            (Route::Login, Method::POST) => self.login(request),
            (Route::Image, Method::GET) => self.download(request),
            (Route::Image, Method::POST) => self.upload(request),
            _ => Ok(method_not_allowed()),
        }
    }

    fn register(&self, request: &Request) -> Result<Response> {
        let body = String::from_utf8_lossy(&request.message.body);
        let (username, password) = match credentials(&body) {
            Some(credentials) => credentials,
            None => return outcome(false, "username and password are required"),
        };

        match self.users.register(username, password)? {
            Registration::Created => {
                info!(username, "user registered");
                outcome(true, "registration succeeded")
            }
            Registration::Duplicate => outcome(false, "username already exists"),
        }
    }

    fn login(&self, request: &Request) -> Result<Response> {
        let body = String::from_utf8_lossy(&request.message.body);
        let (username, password) = match credentials(&body) {
            Some(credentials) => credentials,
            None => return outcome(false, "username and password are required"),
        };

        if self.users.verify(username, password)? {
            info!(username, "user logged in");
            outcome(true, "login succeeded")
        } else {
            outcome(false, "invalid username or password")
        }
    }

    fn download(&self, request: &Request) -> Result<Response> {
        let bytes = match fs::read(&self.image_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(not_found()),
            Err(err) => return Err(err.into()),
        };
        let modified: DateTime<Utc> = fs::metadata(&self.image_path)?.modified()?.into();
        let validators = Validators::new(&bytes, modified);

        if self.conditional_get && validators.fresh(request) {
            debug!(etag = %validators.etag, "image unchanged, answering 304");
            let mut response = Response::new(Status::NotModified);
            validators.attach(&mut response);
            return Ok(response);
        }

        let mut response = Response::with_content(Status::Ok, ContentType::Png, bytes);
        if self.conditional_get {
            validators.attach(&mut response);
        }
        Ok(response)
    }

    // no lock: a concurrent download may observe a partial write
    fn upload(&self, request: &Request) -> Result<Response> {
        if request.message.body.is_empty() {
            return outcome(false, "upload failed, the request carried no file");
        }

        if let Some(parent) = self.image_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.image_path, &request.message.body)?;
        info!(path = %self.image_path.display(), bytes = request.message.body.len(), "image stored");

        outcome(true, "upload succeeded")
    }
}

struct Validators {
    etag: String,
    modified: DateTime<Utc>,
}

impl Validators {
    fn new(contents: &[u8], modified: DateTime<Utc>) -> Self {
        Self { etag: content_tag(contents), modified }
    }

    /// `If-None-Match` takes precedence over `If-Modified-Since`.
    fn fresh(&self, request: &Request) -> bool {
        let headers = &request.message.headers;
        if let Some(tags) = headers.get(IF_NONE_MATCH) {
            return tags.split(',').map(str::trim).any(|tag| tag == "*" || tag == self.etag);
        }

        headers.get(IF_MODIFIED_SINCE)
            .and_then(|since| DateTime::parse_from_rfc2822(since).ok())
            .map_or(false, |since| self.modified.timestamp() <= since.timestamp())
    }

    fn attach(&self, response: &mut Response) {
        response.message.headers.set(LAST_MODIFIED, self.modified.format(HTTP_DATE).to_string());
        response.message.headers.set(ETAG, self.etag.as_str());
    }
}

/// Length plus an FNV-1a hash of the file contents.
fn content_tag(contents: &[u8]) -> String {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let hash = contents.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    });
    format!("\"{:x}-{:016x}\"", contents.len(), hash)
}

fn credentials(body: &str) -> Option<(&str, &str)> {
    let form: HashMap<&str, &str> = body.split('&').filter_map(|pair| pair.split_once('=')).collect();
    Some((*form.get("username")?, *form.get("password")?))
}

fn outcome(success: bool, message: &str) -> Result<Response> {
    let body = serde_json::to_vec(&Outcome { success, message })?;
    Ok(Response::with_content(Status::Ok, ContentType::Json, body))
}

fn not_found() -> Response {
    Response::html(Status::NotFound,
        "<html><body><h1>404 Not Found</h1><p>The requested resource was not found on this server.</p></body></html>")
}

fn method_not_allowed() -> Response {
    Response::html(Status::MethodNotAllowed,
        "<html><body><h1>405 Method Not Allowed</h1><p>The request method is not supported for the requested resource.</p></body></html>")
}

fn internal_server_error() -> Response {
    Response::html(Status::InternalServerError,
        "<html><body><h1>500 Internal Server Error</h1><p>Something went wrong on the server.</p></body></html>")
}
