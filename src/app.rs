use {
    crate::{
        channel::{Receiver, Sender},
        message::Scope,
    },
    futures::{Future, IntoFuture},
    std::fmt,
};

/// The type of future returned by an application invocation.
pub type AppFuture = Box<dyn Future<Item = (), Error = failure::Error>>;

/// An application under test, reachable through the protocol entrypoint.
///
/// An invocation receives the immutable [`Scope`] describing the exchange
/// and the two queue ends connecting it to the client. The returned future
/// resolves once the exchange is logically complete; a raised failure is
/// captured by the engine and surfaced to the client as a completion
/// sentinel rather than being lost.
///
/// The trait is implemented for any
/// `Fn(Scope, Receiver, Sender) -> impl IntoFuture<Item = (), Error = failure::Error>`,
/// so plain functions and closures can be used directly.
///
/// [`Scope`]: ../struct.Scope.html
pub trait Application {
    /// Invokes the application for one exchange.
    fn call(&self, scope: Scope, receive: Receiver, send: Sender) -> AppFuture;
}

impl<F, R> Application for F
where
    F: Fn(Scope, Receiver, Sender) -> R,
    R: IntoFuture<Item = (), Error = failure::Error>,
    R::Future: 'static,
{
    fn call(&self, scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
        Box::new((self)(scope, receive, send).into_future())
    }
}

/// Adapts a legacy two-stage entrypoint into an [`Application`].
///
/// The wrapped callable receives the scope and returns the handler driving
/// the exchange. An error from the first stage fails the invocation as a
/// whole, exactly as if the handler itself had raised it.
///
/// [`Application`]: ./trait.Application.html
pub fn legacy<F, H, R>(factory: F) -> Legacy<F>
where
    F: Fn(Scope) -> Result<H, failure::Error>,
    H: FnOnce(Receiver, Sender) -> R,
    R: IntoFuture<Item = (), Error = failure::Error>,
    R::Future: 'static,
{
    Legacy { factory }
}

/// An [`Application`] adapted from a two-stage entrypoint by [`legacy`].
///
/// [`Application`]: ./trait.Application.html
/// [`legacy`]: ./fn.legacy.html
pub struct Legacy<F> {
    factory: F,
}

impl<F> fmt::Debug for Legacy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Legacy").finish()
    }
}

impl<F, H, R> Application for Legacy<F>
where
    F: Fn(Scope) -> Result<H, failure::Error>,
    H: FnOnce(Receiver, Sender) -> R,
    R: IntoFuture<Item = (), Error = failure::Error>,
    R::Future: 'static,
{
    fn call(&self, scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
        match (self.factory)(scope) {
            Ok(handler) => Box::new(handler(receive, send).into_future()),
            Err(err) => Box::new(futures::future::err(err)),
        }
    }
}
