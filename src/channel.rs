//! The queue pair connecting the session engine with a spawned application,
//! and the monitor translating task outcomes into completion sentinels.

use {
    crate::{
        app::{AppFuture, Application},
        error::Error,
        message::{AppMessage, ClientMessage, Event, Scope, Signal},
        runtime::Runtime,
        timeout::Receive,
    },
    futures::{sync::mpsc, Async, Future, Poll, Stream},
    std::time::Duration,
};

/// The receive end of a session, handed to the application when it is
/// invoked.
#[derive(Debug)]
pub struct Receiver {
    rx: mpsc::UnboundedReceiver<ClientMessage>,
}

impl Receiver {
    /// Awaits the next message from the client, yielding the message
    /// together with the receiver so that it can be awaited again.
    pub fn recv(self) -> impl Future<Item = (ClientMessage, Receiver), Error = failure::Error> {
        self.rx.into_future().then(|result| match result {
            Ok((Some(message), rx)) => Ok((message, Receiver { rx })),
            Ok((None, ..)) | Err(..) => {
                Err(failure::format_err!("the request queue has been closed"))
            }
        })
    }
}

impl Stream for Receiver {
    type Item = ClientMessage;
    type Error = failure::Error;

    fn poll(&mut self) -> Poll<Option<Self::Item>, Self::Error> {
        self.rx
            .poll()
            .map_err(|()| failure::format_err!("the request queue has been closed"))
    }
}

/// The send end of a session, handed to the application when it is invoked.
#[derive(Debug, Clone)]
pub struct Sender {
    tx: mpsc::UnboundedSender<Event>,
}

impl Sender {
    /// Sends a protocol message back to the client.
    ///
    /// The queue is unbounded, so the send never blocks. A client that has
    /// lost interest in the exchange is not an application error, and such
    /// sends are silently dropped.
    pub fn send(&self, message: AppMessage) {
        let _ = self.tx.unbounded_send(Event::Message(message));
    }
}

/// The engine-side ends of one exchange: the input queue feeding the
/// application and the output queue it replies on.
#[derive(Debug)]
pub(crate) struct Session {
    tx: mpsc::UnboundedSender<ClientMessage>,
    rx: mpsc::UnboundedReceiver<Event>,
    tx_events: mpsc::UnboundedSender<Event>,
}

impl Session {
    /// Spawns one application instance bound to a fresh queue pair.
    pub(crate) fn start<S>(runtime: &mut Runtime, app: &S, scope: Scope) -> Self
    where
        S: Application + ?Sized,
    {
        let (tx, rx_app) = mpsc::unbounded();
        let (tx_events, rx) = mpsc::unbounded();

        let receiver = Receiver { rx: rx_app };
        let sender = Sender {
            tx: tx_events.clone(),
        };
        let future = app.call(scope, receiver, sender);
        runtime.spawn(Monitored::new(future, tx_events.clone()));

        Self { tx, rx, tx_events }
    }

    /// Delivers a message to the application.
    ///
    /// Best-effort: an application that has already returned no longer reads
    /// its queue, and that is not an error on the engine side.
    pub(crate) fn send(&self, message: ClientMessage) {
        let _ = self.tx.unbounded_send(message);
    }

    /// Reads the next event from the output queue, racing the optional
    /// deadline.
    pub(crate) fn receive(&mut self, timeout: Option<Duration>) -> Receive<'_> {
        Receive::new(&mut self.rx, self.tx_events.clone(), timeout)
    }

    /// Reads the next protocol message, translating signals into errors.
    ///
    /// `expected` names the message the caller is waiting for and is used
    /// for diagnostics only.
    pub(crate) fn expect(
        &mut self,
        runtime: &mut Runtime,
        timeout: Option<Duration>,
        expected: &str,
    ) -> crate::Result<AppMessage> {
        match runtime.block_on(self.receive(timeout))? {
            Event::Message(message) => Ok(message),
            Event::Signal(Signal::Fault(err)) => Err(Error::app(err)),
            Event::Signal(Signal::TimedOut) => Err(Error::timeout()),
            Event::Signal(signal) => Err(Error::protocol(format!(
                "expected a `{}` message, but the application task completed with `{}`",
                expected,
                signal.kind()
            ))),
        }
    }
}

/// Wraps a spawned application future so that its eventual disposition is
/// pushed onto the output queue as a completion sentinel.
///
/// The sentinel is sent only after the inner future has returned, so every
/// message the task pushed itself is delivered first.
struct Monitored {
    future: AppFuture,
    tx: mpsc::UnboundedSender<Event>,
    finished: bool,
}

impl Monitored {
    fn new(future: AppFuture, tx: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            future,
            tx,
            finished: false,
        }
    }

    fn complete(&mut self, signal: Signal) {
        self.finished = true;
        let _ = self.tx.unbounded_send(Event::Signal(signal));
    }
}

impl Future for Monitored {
    type Item = ();
    type Error = ();

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        match self.future.poll() {
            Ok(Async::NotReady) => Ok(Async::NotReady),
            Ok(Async::Ready(())) => {
                self.complete(Signal::Exit);
                Ok(Async::Ready(()))
            }
            Err(err) => {
                self.complete(Signal::Fault(err));
                Ok(Async::Ready(()))
            }
        }
    }
}

impl Drop for Monitored {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.tx.unbounded_send(Event::Signal(Signal::Killed));
        }
    }
}
