use {
    crate::{
        error::Error,
        message::{Event, Signal},
    },
    futures::{sync::mpsc, Async, Future, Poll, Stream},
    std::time::{Duration, Instant},
    tokio::timer::Delay,
};

/// A future that reads the next event from a session's output queue, racing
/// the read against an optional deadline.
///
/// When the deadline elapses first, a synthetic `Signal::TimedOut` is pushed
/// onto the same queue and the read resolves with whatever the queue yields,
/// so a single call always terminates. The queue is polled before the timer
/// on every wakeup, which means a message enqueued before the deadline fired
/// wins the race.
#[derive(Debug)]
pub(crate) struct Receive<'a> {
    rx: &'a mut mpsc::UnboundedReceiver<Event>,
    tx: mpsc::UnboundedSender<Event>,
    delay: Option<Delay>,
}

impl<'a> Receive<'a> {
    pub(crate) fn new(
        rx: &'a mut mpsc::UnboundedReceiver<Event>,
        tx: mpsc::UnboundedSender<Event>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            rx,
            tx,
            delay: timeout.map(|timeout| Delay::new(Instant::now() + timeout)),
        }
    }
}

impl Future for Receive<'_> {
    type Item = Event;
    type Error = Error;

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        loop {
            match self.rx.poll() {
                Ok(Async::Ready(Some(event))) => return Ok(Async::Ready(event)),
                Ok(Async::Ready(None)) => {
                    return Err(Error::protocol("the session's output queue has been closed"));
                }
                Ok(Async::NotReady) | Err(()) => {}
            }

            match self.delay {
                Some(ref mut delay) => match delay.poll() {
                    Ok(Async::Ready(())) => {}
                    Ok(Async::NotReady) => return Ok(Async::NotReady),
                    Err(err) => return Err(Error::runtime(err)),
                },
                None => return Ok(Async::NotReady),
            }

            // The deadline has elapsed; push the sentinel onto the queue and
            // loop back to read it, unless a message slipped in ahead of it.
            let _ = self.tx.unbounded_send(Event::Signal(Signal::TimedOut));
            self.delay = None;
        }
    }
}
