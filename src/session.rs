use std::io::{BufReader, Read, Write};
use tracing::{debug, info, warn};
use crate::error::Error;
use crate::message::{Request, Response};
use crate::router::Router;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Closed,
}

/// Serves requests from one connection, one at a time, until either side
/// asks to close, the peer goes away or the read times out.
pub struct ServerSession<S: Read + Write> {
    reader: BufReader<S>,
    state: SessionState,
}

impl<S: Read + Write> ServerSession<S> {
    pub fn new(stream: S) -> Self {
        Self { reader: BufReader::new(stream), state: SessionState::Active }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    pub fn run(&mut self, router: &Router) -> SessionState {
        while self.state == SessionState::Active {
            self.step(router);
        }

        self.state
    }

    /// Reads one request and writes exactly one response, or closes.
    pub fn step(&mut self, router: &Router) -> SessionState {
        if self.state == SessionState::Closed { return self.state }

        let request = match Request::parse(&mut self.reader) {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("peer closed the connection");
                return self.close();
            }
            Err(Error::IdleTimeout) => {
                debug!("connection idle, closing");
                return self.close();
            }
            Err(error) => {
                warn!(%error, "unreadable request, closing");
                return self.close();
            }
        };

        info!(request = %request, bytes = request.message.body.len(), "received request");
        debug!(body = %request.message.text(), "request body");
        if request.is_truncated() {
            warn!(request = %request, received = request.message.body.len(), "request body shorter than declared");
        }

        let response = router.dispatch(&request);
        if let Err(error) = self.respond(&response) {
            warn!(%error, "failed to write response, closing");
            return self.close();
        }
        info!(response = %response, bytes = response.message.body.len(), "sent response");
        debug!(body = %response.message.text(), "response body");

        if !request.keep_alive() || !response.keep_alive() {
            return self.close();
        }

        self.state
    }

    fn respond(&mut self, response: &Response) -> std::io::Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(&response.construct())?;
        stream.flush()
    }

    fn close(&mut self) -> SessionState {
        self.state = SessionState::Closed;
        self.state
    }
}
