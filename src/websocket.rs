//! Bidirectional sessions without a terminal response, the websocket
//! equivalent of a request exchange.

use {
    crate::{
        app::Application,
        channel::Session,
        client::{self, Client},
        error::Error,
        message::{AppMessage, ClientMessage, Event, Frame, Scope, Signal},
    },
    bytes::Bytes,
    http::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, HOST},
    serde::{de::DeserializeOwned, Serialize},
    std::collections::HashMap,
};

/// A builder for a websocket session.
#[allow(missing_debug_implementations)]
pub struct WebSocketBuilder<'a, S> {
    client: &'a mut Client<S>,
    path: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    cookies: Option<HashMap<String, String>>,
    err: Option<Error>,
}

impl<'a, S> WebSocketBuilder<'a, S>
where
    S: Application,
{
    pub(crate) fn new(client: &'a mut Client<S>, path: String) -> Self {
        Self {
            client,
            path,
            headers: vec![],
            cookies: None,
            err: None,
        }
    }

    /// Adds a header to the connect scope.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match client::parse_header(name, value) {
            Ok(pair) => self.headers.push(pair),
            Err(err) => {
                if self.err.is_none() {
                    self.err = Some(err);
                }
            }
        }
        self
    }

    /// Replaces the client's cookie jar with the specified one for this
    /// session.
    pub fn cookies(mut self, jar: HashMap<String, String>) -> Self {
        self.cookies = Some(jar);
        self
    }

    /// Spawns the application and performs the connect handshake.
    ///
    /// The application must reply with `websocket.accept`; a
    /// `websocket.close` reply rejects the connection and surfaces as an
    /// error carrying the close code.
    pub fn connect(mut self) -> crate::Result<WebSocket<'a, S>> {
        if let Some(err) = self.err.take() {
            return Err(err);
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            headers.append(name.clone(), value.clone());
        }
        if !headers.contains_key(HOST) {
            headers.insert(HOST, HeaderValue::from_static("localhost"));
        }

        let jar = match self.cookies.as_ref() {
            Some(jar) => Some(jar),
            None => self.client.cookies.as_ref(),
        };
        if let Some(jar) = jar {
            if !jar.is_empty() {
                headers.insert(COOKIE, client::cookie_header(jar)?);
            }
        }

        let (path, query_string) = client::split_target(&self.path);
        let mut scope = Scope::websocket(path, query_string, client::flatten_headers(&headers));
        if let Some(hook) = &self.client.scope_hook {
            hook(&mut scope);
        }

        let mut session = Session::start(&mut self.client.runtime, &self.client.app, scope);
        session.send(ClientMessage::WebSocketConnect);

        let timeout = self.client.timeout;
        match self.client.runtime.block_on(session.receive(timeout))? {
            Event::Message(AppMessage::WebSocketAccept) => {}
            Event::Message(AppMessage::WebSocketClose { code, .. }) => {
                return Err(Error::closed(code));
            }
            Event::Message(message) => {
                return Err(Error::unexpected_message("websocket.accept", message.kind()));
            }
            Event::Signal(Signal::Fault(err)) => return Err(Error::app(err)),
            Event::Signal(Signal::TimedOut) => return Err(Error::timeout()),
            Event::Signal(signal) => {
                return Err(Error::protocol(format!(
                    "expected a `websocket.accept` message, but the application task \
                     completed with `{}`",
                    signal.kind()
                )));
            }
        }

        Ok(WebSocket {
            client: self.client,
            session,
            closed: false,
        })
    }
}

/// An open bidirectional session.
///
/// Frames may be sent and received in any order until [`close`] is called
/// or the session is dropped, both of which deliver the disconnect notice
/// to the application.
///
/// [`close`]: #method.close
#[allow(missing_debug_implementations)]
pub struct WebSocket<'a, S> {
    client: &'a mut Client<S>,
    session: Session,
    closed: bool,
}

impl<'a, S> std::fmt::Debug for WebSocket<'a, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket")
            .field("closed", &self.closed)
            .finish()
    }
}

impl<'a, S> WebSocket<'a, S> {
    /// Sends a frame to the application.
    pub fn send(&mut self, frame: Frame) {
        self.session.send(ClientMessage::WebSocketReceive(frame));
    }

    /// Sends a text frame.
    pub fn send_text(&mut self, text: impl Into<String>) {
        self.send(Frame::Text(text.into()));
    }

    /// Sends a binary frame.
    pub fn send_bytes(&mut self, data: impl Into<Bytes>) {
        self.send(Frame::Binary(data.into()));
    }

    /// Serializes the specified value and sends it as a text frame.
    pub fn send_json<T>(&mut self, value: &T) -> crate::Result<()>
    where
        T: Serialize,
    {
        let text = serde_json::to_string(value)
            .map_err(|e| Error::usage(format!("failed to serialize the json frame: {}", e)))?;
        self.send(Frame::Text(text));
        Ok(())
    }

    fn next_event(&mut self) -> crate::Result<Event> {
        let timeout = self.client.timeout;
        self.client.runtime.block_on(self.session.receive(timeout))
    }

    /// Awaits the next inbound frame.
    pub fn receive(&mut self) -> crate::Result<Frame> {
        match self.next_event()? {
            Event::Message(AppMessage::WebSocketSend(frame)) => Ok(frame),
            Event::Message(AppMessage::WebSocketClose { code, .. }) => Err(Error::closed(code)),
            Event::Message(message) => {
                Err(Error::unexpected_message("websocket.send", message.kind()))
            }
            Event::Signal(Signal::Fault(err)) => Err(Error::app(err)),
            Event::Signal(Signal::TimedOut) => Err(Error::timeout()),
            Event::Signal(signal) => Err(Error::protocol(format!(
                "expected a `websocket.send` message, but the application task \
                 completed with `{}`",
                signal.kind()
            ))),
        }
    }

    /// Awaits the next inbound frame and requires it to be text.
    pub fn receive_text(&mut self) -> crate::Result<String> {
        match self.receive()? {
            Frame::Text(text) => Ok(text),
            Frame::Binary(..) => Err(Error::protocol(
                "expected a text frame, but received a binary frame",
            )),
        }
    }

    /// Awaits the next inbound frame and requires it to be binary.
    pub fn receive_bytes(&mut self) -> crate::Result<Bytes> {
        match self.receive()? {
            Frame::Binary(data) => Ok(data),
            Frame::Text(..) => Err(Error::protocol(
                "expected a binary frame, but received a text frame",
            )),
        }
    }

    /// Awaits the next inbound frame and deserializes its payload as JSON.
    pub fn receive_json<T>(&mut self) -> crate::Result<T>
    where
        T: DeserializeOwned,
    {
        match self.receive()? {
            Frame::Text(text) => serde_json::from_str(&text).map_err(|e| Error::decode(e)),
            Frame::Binary(data) => serde_json::from_slice(&data).map_err(|e| Error::decode(e)),
        }
    }

    /// Awaits the next inbound frame, or `Ok(None)` once the application
    /// task has completed.
    ///
    /// Iterating this way treats the completion of the application as the
    /// end of the sequence rather than as an error.
    pub fn try_next(&mut self) -> crate::Result<Option<Frame>> {
        match self.next_event()? {
            Event::Signal(Signal::Exit) => Ok(None),
            Event::Message(AppMessage::WebSocketSend(frame)) => Ok(Some(frame)),
            Event::Message(AppMessage::WebSocketClose { code, .. }) => Err(Error::closed(code)),
            Event::Message(message) => {
                Err(Error::unexpected_message("websocket.send", message.kind()))
            }
            Event::Signal(Signal::Fault(err)) => Err(Error::app(err)),
            Event::Signal(Signal::TimedOut) => Err(Error::timeout()),
            Event::Signal(Signal::Killed) => Err(Error::app(failure::format_err!(
                "the application task was killed"
            ))),
        }
    }

    /// Returns an iterator over the remaining inbound frames.
    pub fn messages(&mut self) -> Messages<'_, 'a, S> {
        Messages {
            session: self,
            done: false,
        }
    }

    /// Sends the disconnect notice with the specified close code.
    ///
    /// Further sends are not meaningful after this.
    pub fn close(&mut self, code: u16) {
        if !self.closed {
            self.session.send(ClientMessage::WebSocketDisconnect { code });
            self.closed = true;
        }
    }
}

impl<S> Drop for WebSocket<'_, S> {
    fn drop(&mut self) {
        if !self.closed {
            self.session
                .send(ClientMessage::WebSocketDisconnect { code: 1000 });
        }
    }
}

/// An iterator over the inbound frames of a [`WebSocket`], ending when the
/// application task completes.
///
/// [`WebSocket`]: ./struct.WebSocket.html
#[allow(missing_debug_implementations)]
pub struct Messages<'w, 'a, S> {
    session: &'w mut WebSocket<'a, S>,
    done: bool,
}

impl<S> Iterator for Messages<'_, '_, S> {
    type Item = crate::Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.session.try_next() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
