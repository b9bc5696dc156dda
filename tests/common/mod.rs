//! Shared helpers for loopback integration tests.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tinyhttp::registry::MemoryUserStore;
use tinyhttp::{Address, Client, Router, Server};

/// A fresh directory path under the system temp dir. Not created.
pub fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("tinyhttp-it-{}", uuid::Uuid::new_v4()))
}

/// Starts a server on an ephemeral port and returns its address.
pub fn start_server(idle_timeout: Duration) -> SocketAddr {
    let router = Router::new(Arc::new(MemoryUserStore::new()), temp_dir().join("image.png"));
    let server = Server::bind("127.0.0.1:0", router, idle_timeout).unwrap();
    let addr = server.local_addr().unwrap();
    server.spawn();
    addr
}

pub fn connect(addr: SocketAddr) -> Client<std::net::TcpStream> {
    let address = Address::new(addr.ip().to_string(), addr.port());
    Client::connect(&address, Duration::from_secs(5)).unwrap()
}
