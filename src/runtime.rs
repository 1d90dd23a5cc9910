use futures::Future;

/// A single-threaded runtime driving the client and every spawned
/// application task on the current thread.
///
/// The client and the applications it spawns communicate only through
/// session queues, so cooperative scheduling on one thread is the only form
/// of concurrency the engine relies on.
#[derive(Debug)]
pub(crate) struct Runtime {
    inner: tokio::runtime::current_thread::Runtime,
}

impl Runtime {
    pub(crate) fn new() -> crate::Result<Self> {
        Ok(Self {
            inner: tokio::runtime::current_thread::Runtime::new()
                .map_err(|e| crate::Error::runtime(e))?,
        })
    }

    /// Spawns a background task onto this runtime.
    ///
    /// The task makes progress whenever the client blocks on one of its own
    /// futures.
    pub(crate) fn spawn(&mut self, future: impl Future<Item = (), Error = ()> + 'static) {
        self.inner.spawn(future);
    }

    /// Runs the specified future to completion on this runtime.
    pub(crate) fn block_on<F>(&mut self, future: F) -> Result<F::Item, F::Error>
    where
        F: Future,
    {
        self.inner.block_on(future)
    }
}
