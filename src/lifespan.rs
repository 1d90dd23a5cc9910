use {
    crate::{
        app::Application,
        channel::Session,
        error::Error,
        message::{AppMessage, ClientMessage, Event, Scope, Signal},
        runtime::Runtime,
    },
    std::time::Duration,
};

/// Drives the startup/shutdown handshake phase of the protocol.
///
/// The controller owns a session spanning the whole client lifetime, fully
/// independent of request sessions. An application that does not implement
/// the phase at all is tolerated; an explicit failure report is not.
#[derive(Debug)]
pub(crate) struct Lifespan {
    session: Session,
    supported: bool,
}

impl Lifespan {
    /// Spawns the lifespan instance of the application and performs the
    /// startup handshake.
    pub(crate) fn startup<S>(
        runtime: &mut Runtime,
        app: &S,
        timeout: Option<Duration>,
    ) -> crate::Result<Self>
    where
        S: Application,
    {
        let mut session = Session::start(runtime, app, Scope::lifespan());
        session.send(ClientMessage::LifespanStartup);

        let mut supported = true;
        match runtime.block_on(session.receive(timeout))? {
            Event::Message(AppMessage::LifespanStartupComplete) => {}
            Event::Message(AppMessage::LifespanStartupFailed { message }) => {
                return Err(Error::lifespan("startup", message));
            }
            Event::Message(message) => {
                return Err(Error::unexpected_message(
                    "lifespan.startup.complete",
                    message.kind(),
                ));
            }
            Event::Signal(Signal::Fault(err)) => {
                log::warn!("the application does not implement the lifespan phase: {}", err);
                supported = false;
            }
            Event::Signal(Signal::Exit) => {
                log::warn!("the application exited without completing the lifespan handshake");
                supported = false;
            }
            Event::Signal(Signal::TimedOut) => return Err(Error::timeout()),
            Event::Signal(Signal::Killed) => {
                return Err(Error::app(failure::format_err!(
                    "the lifespan task was killed before completing startup"
                )));
            }
        }

        Ok(Self { session, supported })
    }

    /// Performs the shutdown handshake. A no-op if the application rejected
    /// the phase during startup.
    pub(crate) fn shutdown(
        &mut self,
        runtime: &mut Runtime,
        timeout: Option<Duration>,
    ) -> crate::Result<()> {
        if !self.supported {
            return Ok(());
        }

        self.session.send(ClientMessage::LifespanShutdown);
        match runtime.block_on(self.session.receive(timeout))? {
            Event::Message(AppMessage::LifespanShutdownComplete) => Ok(()),
            Event::Message(AppMessage::LifespanShutdownFailed { message }) => {
                Err(Error::lifespan("shutdown", message))
            }
            Event::Message(message) => Err(Error::unexpected_message(
                "lifespan.shutdown.complete",
                message.kind(),
            )),
            Event::Signal(Signal::Fault(err)) => Err(Error::app(err)),
            Event::Signal(Signal::TimedOut) => Err(Error::timeout()),
            Event::Signal(..) => {
                // The task is already gone; there is nothing left to drain.
                log::debug!("the application exited before acknowledging shutdown");
                Ok(())
            }
        }
    }
}
