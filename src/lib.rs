//! A small HTTP/1.1 message layer: parsing and building messages,
//! keep-alive sessions, a fixed-route server, and a client with redirect
//! following and a validator cache.

pub mod cache;
pub mod client;
pub mod config;
pub mod def;
pub mod error;
pub mod http;
pub mod logging;
pub mod message;
pub mod redirect;
pub mod registry;
pub mod router;
pub mod session;

#[cfg(test)]
mod testing;

pub use client::{Client, Exchange};
pub use error::{Error, Result};
pub use http::{Address, Server};
pub use message::{Header, Headers, Message, Request, Response};
pub use router::Router;
pub use session::{ServerSession, SessionState};
