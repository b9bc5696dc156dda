use std::fmt::{self, Display, Formatter};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};
use crate::client::Client;
use crate::error::Result;
use crate::router::Router;
use crate::session::ServerSession;

const PORT_HTTP: u16 = 80;
const PORT_HTTPS: u16 = 443;

lazy_static! {
    static ref URI_REGEX: Regex = Regex::new(r"(?ix)
        ^(?:(?P<protocol>https?)://
            (?P<host>[a-z0-9\-\.]+|\[[0-9a-f:\.]+\])
            (?::(?P<port>\d+))?)?
        (?P<location>/[^\s]*)?$").expect("URI pattern compiles");
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn parse(protocol: &str) -> Option<Self> {
        match protocol.to_lowercase().as_str() {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            _ => None,
        }
    }

    fn default_port(&self) -> u16 {
        match self {
            Self::Http => PORT_HTTP,
            Self::Https => PORT_HTTPS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// `host[:port]`, port defaulting to 80.
    pub fn parse(address: &str) -> Option<Self> {
        let address = address.trim();
        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.ends_with(':') =>
                Some(Self::new(host, port.parse().ok()?)),
            Some(_) => None,
            None if !address.is_empty() => Some(Self::new(address, PORT_HTTP)),
            None => None,
        }
    }

    pub fn same_origin(&self, other: &Address) -> bool {
        self.host.eq_ignore_ascii_case(&other.host) && self.port == other.port
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Either an absolute `http(s)://host[:port][/path]` or an origin-relative `/path`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Uri {
    pub protocol: Option<Protocol>,
    pub address: Option<Address>,
    pub target: String,
}

impl Uri {
    pub fn parse(uri: &str) -> Option<Self> {
        let capture = URI_REGEX.captures(uri)?;
        let protocol = capture.name("protocol").and_then(|p| Protocol::parse(p.as_str()));
        let location = capture.name("location").map(|l| l.as_str().to_string());

        let address = match (protocol, capture.name("host")) {
            (Some(protocol), Some(host)) => {
                let port = match capture.name("port") {
                    Some(port) => port.as_str().parse::<u16>().ok()?,
                    None => protocol.default_port(),
                };
                Some(Address::new(host.as_str(), port))
            }
            _ => None,
        };
        if address.is_none() && location.is_none() { return None }

        Some(Self { protocol, address, target: location.unwrap_or_else(|| "/".to_string()) })
    }
}

/// Accepts connections and runs one session thread per connection.
pub struct Server {
    listener: TcpListener,
    router: Arc<Router>,
    idle_timeout: Duration,
}

impl Server {
    pub fn bind(address: &str, router: Router, idle_timeout: Duration) -> Result<Self> {
        let listener = TcpListener::bind(address)?;
        Ok(Self { listener, router: Arc::new(router), idle_timeout })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the accept loop. Only a failing accept ends it.
    pub fn run(self) -> Result<()> {
        info!(address = %self.local_addr()?, "listening for connections");

        loop {
            let (stream, peer) = self.listener.accept()?;
            debug!(%peer, "accepted connection");
            if let Err(error) = stream.set_read_timeout(Some(self.idle_timeout)) {
                warn!(%peer, %error, "could not set idle timeout, dropping connection");
                continue;
            }

            let router = Arc::clone(&self.router);
            thread::spawn(move || {
                let state = ServerSession::new(stream).run(&router);
                debug!(%peer, ?state, "connection finished");
            });
        }
    }

    pub fn spawn(self) -> thread::JoinHandle<Result<()>> {
        thread::spawn(move || self.run())
    }
}

impl Client<TcpStream> {
    pub fn connect(address: &Address, idle_timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect(address.to_string())?;
        stream.set_read_timeout(Some(idle_timeout))?;
        info!(%address, "connected");
        Ok(Client::new(stream, address.clone()))
    }
}
