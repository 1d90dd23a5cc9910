use std::fmt;

/// The error type returned from this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

#[derive(Debug, failure::Fail)]
enum ErrorKind {
    #[fail(display = "usage error: {}", _0)]
    Usage(String),

    #[fail(display = "protocol violation: {}", _0)]
    Protocol(String),

    #[fail(display = "application error: {}", _0)]
    App(failure::Error),

    #[fail(display = "no message received before the deadline")]
    Timeout,

    #[fail(display = "lifespan {} failed: {}", _0, _1)]
    Lifespan(&'static str, String),

    #[fail(display = "the application closed the connection with code {}", _0)]
    Closed(u16),

    #[fail(display = "stopped after {} redirects", _0)]
    TooManyRedirects(usize),

    #[fail(display = "failed to decode the response body: {}", _0)]
    Decode(failure::Error),

    #[fail(display = "runtime error: {}", _0)]
    Runtime(failure::Error),
}

impl Error {
    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        ErrorKind::Usage(msg.into()).into()
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        ErrorKind::Protocol(msg.into()).into()
    }

    pub(crate) fn unexpected_message(expected: &str, actual: &str) -> Self {
        ErrorKind::Protocol(format!(
            "expected a `{}` message, but received `{}`",
            expected, actual
        ))
        .into()
    }

    pub(crate) fn app(err: failure::Error) -> Self {
        ErrorKind::App(err).into()
    }

    pub(crate) fn timeout() -> Self {
        ErrorKind::Timeout.into()
    }

    pub(crate) fn lifespan(phase: &'static str, message: String) -> Self {
        ErrorKind::Lifespan(phase, message).into()
    }

    pub(crate) fn closed(code: u16) -> Self {
        ErrorKind::Closed(code).into()
    }

    pub(crate) fn too_many_redirects(hops: usize) -> Self {
        ErrorKind::TooManyRedirects(hops).into()
    }

    pub(crate) fn decode(err: impl Into<failure::Error>) -> Self {
        ErrorKind::Decode(err.into()).into()
    }

    pub(crate) fn runtime(err: impl Into<failure::Error>) -> Self {
        ErrorKind::Runtime(err.into()).into()
    }

    /// Returns `true` if the error was caused by contradictory call arguments.
    pub fn is_usage(&self) -> bool {
        match self.kind {
            ErrorKind::Usage(..) => true,
            _ => false,
        }
    }

    /// Returns `true` if the application emitted a message that is not valid
    /// at the current point of the exchange.
    pub fn is_protocol_violation(&self) -> bool {
        match self.kind {
            ErrorKind::Protocol(..) => true,
            _ => false,
        }
    }

    /// Returns `true` if the error is a failure raised by the application
    /// itself and captured by the session engine.
    pub fn is_app_error(&self) -> bool {
        match self.kind {
            ErrorKind::App(..) => true,
            _ => false,
        }
    }

    /// Returns `true` if the expected message did not arrive in time.
    pub fn is_timeout(&self) -> bool {
        match self.kind {
            ErrorKind::Timeout => true,
            _ => false,
        }
    }

    /// Returns `true` if the application reported an explicit lifespan
    /// startup or shutdown failure.
    pub fn is_lifespan_failure(&self) -> bool {
        match self.kind {
            ErrorKind::Lifespan(..) => true,
            _ => false,
        }
    }

    /// Returns `true` if redirect following gave up after too many hops.
    pub fn is_too_many_redirects(&self) -> bool {
        match self.kind {
            ErrorKind::TooManyRedirects(..) => true,
            _ => false,
        }
    }

    /// Returns the close code sent by the application, if the error was
    /// caused by a `websocket.close` message.
    pub fn close_code(&self) -> Option<u16> {
        match self.kind {
            ErrorKind::Closed(code) => Some(code),
            _ => None,
        }
    }

    pub(crate) fn app_fault(&self) -> Option<&failure::Error> {
        match self.kind {
            ErrorKind::App(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl failure::Fail for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

pub type Result<T = ()> = std::result::Result<T, Error>;
