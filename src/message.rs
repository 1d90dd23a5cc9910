//! The message vocabulary exchanged between the session engine and the
//! application under test.

use {bytes::Bytes, http::Method};

/// The protocol version reported to every application through the scope.
pub const PROTOCOL_VERSION: &str = "3.0";

const HTTP_VERSION: &str = "1.1";

/// The logical kind of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Http,
    WebSocket,
    Lifespan,
}

impl ScopeKind {
    /// Returns the wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::Http => "http",
            ScopeKind::WebSocket => "websocket",
            ScopeKind::Lifespan => "lifespan",
        }
    }
}

/// An immutable descriptor of a single exchange, handed to the application
/// when it is invoked.
///
/// A fresh scope is constructed for every session and never reused.
#[derive(Debug, Clone)]
pub struct Scope {
    kind: ScopeKind,
    method: Method,
    scheme: String,
    path: String,
    query_string: Bytes,
    root_path: String,
    headers: Vec<(Bytes, Bytes)>,
}

impl Scope {
    pub(crate) fn http(
        method: Method,
        scheme: String,
        path: String,
        query_string: Bytes,
        headers: Vec<(Bytes, Bytes)>,
    ) -> Self {
        Self {
            kind: ScopeKind::Http,
            method,
            scheme,
            path,
            query_string,
            root_path: String::new(),
            headers,
        }
    }

    pub(crate) fn websocket(
        path: String,
        query_string: Bytes,
        headers: Vec<(Bytes, Bytes)>,
    ) -> Self {
        Self {
            kind: ScopeKind::WebSocket,
            method: Method::GET,
            scheme: "ws".to_owned(),
            path,
            query_string,
            root_path: String::new(),
            headers,
        }
    }

    pub(crate) fn lifespan() -> Self {
        Self {
            kind: ScopeKind::Lifespan,
            method: Method::GET,
            scheme: String::new(),
            path: String::new(),
            query_string: Bytes::new(),
            root_path: String::new(),
            headers: vec![],
        }
    }

    /// Returns the kind of the exchange described by this scope.
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Returns the protocol version, which is fixed for every exchange.
    pub fn version(&self) -> &'static str {
        PROTOCOL_VERSION
    }

    /// Returns the HTTP version reported to the application.
    pub fn http_version(&self) -> &'static str {
        HTTP_VERSION
    }

    /// Returns the request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the scheme of the request.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the request path, with any query fragment already split off.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the percent-encoded query bytes.
    pub fn query_string(&self) -> &[u8] {
        &self.query_string
    }

    /// Returns the root path under which the application is mounted.
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Sets the root path under which the application is mounted.
    pub fn set_root_path(&mut self, root_path: impl Into<String>) {
        self.root_path = root_path.into();
    }

    /// Returns the ordered header pairs, with names lowercased.
    ///
    /// Pairs sharing a name keep the relative order in which they were
    /// supplied to the client.
    pub fn headers(&self) -> &[(Bytes, Bytes)] {
        &self.headers
    }
}

/// A websocket payload, either a text or a binary frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    /// Returns the text payload of this frame, if it is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Frame::Text(text) => Some(text),
            Frame::Binary(..) => None,
        }
    }

    /// Returns the binary payload of this frame, if it is a binary frame.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Frame::Text(..) => None,
            Frame::Binary(data) => Some(data),
        }
    }
}

/// A message sent by the session engine and read by the application.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    HttpRequest { body: Bytes, more_body: bool },
    HttpDisconnect,
    LifespanStartup,
    LifespanShutdown,
    WebSocketConnect,
    WebSocketReceive(Frame),
    WebSocketDisconnect { code: u16 },
}

impl ClientMessage {
    /// Returns the wire name of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::HttpRequest { .. } => "http.request",
            ClientMessage::HttpDisconnect => "http.disconnect",
            ClientMessage::LifespanStartup => "lifespan.startup",
            ClientMessage::LifespanShutdown => "lifespan.shutdown",
            ClientMessage::WebSocketConnect => "websocket.connect",
            ClientMessage::WebSocketReceive(..) => "websocket.receive",
            ClientMessage::WebSocketDisconnect { .. } => "websocket.disconnect",
        }
    }
}

/// A message sent by the application and read by the session engine.
#[derive(Debug, Clone)]
pub enum AppMessage {
    HttpResponseStart {
        status: u16,
        headers: Vec<(Bytes, Bytes)>,
    },
    HttpResponseBody {
        body: Bytes,
        more_body: bool,
    },
    LifespanStartupComplete,
    LifespanStartupFailed {
        message: String,
    },
    LifespanShutdownComplete,
    LifespanShutdownFailed {
        message: String,
    },
    WebSocketAccept,
    WebSocketClose {
        code: u16,
        reason: String,
    },
    WebSocketSend(Frame),
}

impl AppMessage {
    /// Starts a response with the specified status and header pairs.
    pub fn response_start(status: u16, headers: Vec<(Bytes, Bytes)>) -> Self {
        AppMessage::HttpResponseStart { status, headers }
    }

    /// A chunk of the response body, with the continuation flag.
    pub fn response_body(body: impl Into<Bytes>, more_body: bool) -> Self {
        AppMessage::HttpResponseBody {
            body: body.into(),
            more_body,
        }
    }

    /// An outbound websocket text frame.
    pub fn send_text(text: impl Into<String>) -> Self {
        AppMessage::WebSocketSend(Frame::Text(text.into()))
    }

    /// An outbound websocket binary frame.
    pub fn send_bytes(data: impl Into<Bytes>) -> Self {
        AppMessage::WebSocketSend(Frame::Binary(data.into()))
    }

    /// Returns the wire name of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            AppMessage::HttpResponseStart { .. } => "http.response.start",
            AppMessage::HttpResponseBody { .. } => "http.response.body",
            AppMessage::LifespanStartupComplete => "lifespan.startup.complete",
            AppMessage::LifespanStartupFailed { .. } => "lifespan.startup.failed",
            AppMessage::LifespanShutdownComplete => "lifespan.shutdown.complete",
            AppMessage::LifespanShutdownFailed { .. } => "lifespan.shutdown.failed",
            AppMessage::WebSocketAccept => "websocket.accept",
            AppMessage::WebSocketClose { .. } => "websocket.close",
            AppMessage::WebSocketSend(..) => "websocket.send",
        }
    }
}

/// The disposition of a spawned application task, delivered through the same
/// queue as its messages.
///
/// Once a signal has been read from a session's output queue, no further
/// messages will follow it for that exchange.
#[derive(Debug)]
pub(crate) enum Signal {
    /// The task returned normally.
    Exit,
    /// The task raised a failure, captured here.
    Fault(failure::Error),
    /// The task was dropped before completing.
    Killed,
    /// The deadline elapsed before any message arrived. Pushed by the
    /// watchdog, not by the task itself.
    TimedOut,
}

impl Signal {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Signal::Exit => "exit",
            Signal::Fault(..) => "err",
            Signal::Killed => "killed",
            Signal::TimedOut => "timeout",
        }
    }
}

/// An item on a session's output queue.
#[derive(Debug)]
pub(crate) enum Event {
    Message(AppMessage),
    Signal(Signal),
}
