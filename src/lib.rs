//! An in-process session engine for testing message-driven web applications.
//!
//! The purpose of this crate is to exercise a server-side application
//! without using the low level I/O: the client constructs the scope
//! describing a request, drives the application's message loop directly
//! through a pair of queues, and collects the reply messages into an
//! ergonomic response value. No socket is bound and no wire bytes are
//! produced at any point.
//!
//! # Example
//!
//! ```
//! use {
//!     futures::Future,
//!     kagami::{AppMessage, Client, Receiver, Scope, ScopeKind, Sender},
//! };
//!
//! # fn main() -> kagami::Result<()> {
//! // the application to be tested.
//! fn app(scope: Scope, receive: Receiver, send: Sender) -> kagami::AppFuture {
//!     match scope.kind() {
//!         ScopeKind::Http => Box::new(receive.recv().map(move |(_request, _receive)| {
//!             send.send(AppMessage::response_start(200, vec![]));
//!             send.send(AppMessage::response_body("hello", false));
//!         })),
//!         _ => Box::new(futures::future::err(failure::format_err!(
//!             "unsupported scope"
//!         ))),
//!     }
//! }
//!
//! // create a `Client` bound to the application and drive one
//! // request/response exchange against it.
//! let mut client = Client::new(app)?;
//!
//! let mut response = client.get("/").send()?;
//! assert_eq!(response.status(), 200);
//! assert_eq!(response.text()?, "hello");
//!
//! client.shutdown()?;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/kagami/0.1.0-preview.1")]
#![deny(
    missing_debug_implementations,
    nonstandard_style,
    rust_2018_idioms,
    rust_2018_compatibility,
    unused
)]
#![forbid(clippy::unimplemented)]

mod app;
mod channel;
mod client;
mod error;
mod lifespan;
mod message;
pub mod multipart;
mod response;
mod runtime;
mod timeout;
mod websocket;

pub use crate::{
    app::{legacy, AppFuture, Application, Legacy},
    channel::{Receiver, Sender},
    client::{Client, ClientBuilder, RequestBuilder},
    error::{Error, Result},
    message::{AppMessage, ClientMessage, Frame, Scope, ScopeKind, PROTOCOL_VERSION},
    response::Response,
    websocket::{Messages, WebSocket, WebSocketBuilder},
};
