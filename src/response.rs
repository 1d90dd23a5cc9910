use {
    crate::{
        channel::Session,
        client::Client,
        error::Error,
        message::{AppMessage, ClientMessage, Event, Signal},
        runtime::Runtime,
    },
    bytes::Bytes,
    http::{header::HeaderValue, HeaderMap, StatusCode},
    serde::de::DeserializeOwned,
    std::{
        collections::{HashMap, VecDeque},
        time::Duration,
    },
};

/// The state of one request/response exchange, owned independently of the
/// client so that redirect hops can be inspected and abandoned freely.
#[derive(Debug)]
pub(crate) struct Exchange {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) chunks: VecDeque<Bytes>,
    pub(crate) more_body: bool,
    pub(crate) done: bool,
    pub(crate) cookies: HashMap<String, String>,
    session: Session,
}

impl Exchange {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, session: Session) -> Self {
        Self {
            status,
            headers,
            chunks: VecDeque::new(),
            more_body: false,
            done: false,
            cookies: HashMap::new(),
            session,
        }
    }

    /// A synthesized 500 response replacing an exchange whose application
    /// task raised before producing a response.
    pub(crate) fn fault(
        session: Session,
        description: String,
        cookies: HashMap<String, String>,
    ) -> Self {
        session.send(ClientMessage::HttpDisconnect);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: HeaderMap::new(),
            chunks: vec![Bytes::from(description)].into(),
            more_body: false,
            done: true,
            cookies,
            session,
        }
    }

    /// Replaces the state collected so far with a synthesized 500 response.
    pub(crate) fn synthesize_fault(&mut self, description: String) {
        self.session.send(ClientMessage::HttpDisconnect);
        self.status = StatusCode::INTERNAL_SERVER_ERROR;
        self.headers = HeaderMap::new();
        self.chunks.clear();
        self.chunks.push_back(Bytes::from(description));
        self.more_body = false;
        self.done = true;
    }

    /// Reads one `http.response.body` message into the buffer.
    pub(crate) fn read_chunk(
        &mut self,
        runtime: &mut Runtime,
        timeout: Option<Duration>,
    ) -> crate::Result<()> {
        match self
            .session
            .expect(runtime, timeout, "http.response.body")?
        {
            AppMessage::HttpResponseBody { body, more_body } => {
                self.chunks.push_back(body);
                self.more_body = more_body;
                Ok(())
            }
            message => Err(Error::unexpected_message(
                "http.response.body",
                message.kind(),
            )),
        }
    }

    /// Buffers every remaining body chunk and confirms the orderly shutdown
    /// of the application task.
    pub(crate) fn drain(
        &mut self,
        runtime: &mut Runtime,
        timeout: Option<Duration>,
    ) -> crate::Result<()> {
        while self.more_body {
            self.read_chunk(runtime, timeout)?;
        }
        self.finish(runtime, timeout)
    }

    /// Sends the disconnect notice and awaits the completion sentinel of the
    /// application task.
    pub(crate) fn finish(
        &mut self,
        runtime: &mut Runtime,
        timeout: Option<Duration>,
    ) -> crate::Result<()> {
        if self.done {
            return Ok(());
        }
        self.session.send(ClientMessage::HttpDisconnect);
        match runtime.block_on(self.session.receive(timeout))? {
            Event::Signal(Signal::Exit) => {
                self.done = true;
                Ok(())
            }
            Event::Signal(Signal::Fault(err)) => Err(Error::app(err)),
            Event::Signal(Signal::TimedOut) => Err(Error::timeout()),
            Event::Signal(Signal::Killed) => Err(Error::app(failure::format_err!(
                "the application task was killed before completing the exchange"
            ))),
            Event::Message(message) => Err(Error::protocol(format!(
                "the application sent `{}` after the final response body",
                message.kind()
            ))),
        }
    }

    /// Pulls the next body chunk, reading from the queue once the pre-read
    /// buffer is exhausted.
    fn next_chunk(
        &mut self,
        runtime: &mut Runtime,
        timeout: Option<Duration>,
    ) -> crate::Result<Option<Bytes>> {
        if let Some(chunk) = self.chunks.pop_front() {
            return Ok(Some(chunk));
        }
        if !self.more_body {
            self.finish(runtime, timeout)?;
            return Ok(None);
        }
        self.read_chunk(runtime, timeout)?;
        if !self.more_body {
            self.finish(runtime, timeout)?;
        }
        Ok(self.chunks.pop_front())
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        // The consumer stopped early; let the application know.
        if !self.done {
            self.session.send(ClientMessage::HttpDisconnect);
        }
    }
}

/// A response received from the application.
///
/// The response keeps a borrow of the client for as long as it is alive,
/// since a streamed body is pulled through the client's runtime. A fully
/// buffered response releases the borrow at its last use.
#[allow(missing_debug_implementations)]
pub struct Response<'a, S> {
    exchange: Exchange,
    client: &'a mut Client<S>,
}

impl<'a, S> std::fmt::Debug for Response<'a, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("exchange", &self.exchange)
            .finish()
    }
}

impl<'a, S> Response<'a, S> {
    pub(crate) fn new(exchange: Exchange, client: &'a mut Client<S>) -> Self {
        Self { exchange, client }
    }

    /// Returns the response status.
    pub fn status(&self) -> StatusCode {
        self.exchange.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.exchange.headers
    }

    /// Returns the value of the header with the specified name, if any.
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.exchange.headers.get(name)
    }

    /// Returns the cookie jar as it stood after this response was processed.
    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.exchange.cookies
    }

    /// Pulls the next chunk of the response body.
    ///
    /// The sequence is finite and not restartable: once the body has ended
    /// and the disconnect notice has been delivered, every further call
    /// returns `Ok(None)`. A failure raised by the application after some
    /// chunks were produced surfaces here, on the pull that would have
    /// yielded the next chunk; chunks already returned stay valid.
    pub fn chunk(&mut self) -> crate::Result<Option<Bytes>> {
        let client = &mut *self.client;
        self.exchange.next_chunk(&mut client.runtime, client.timeout)
    }

    /// Buffers the rest of the body and returns everything not yet consumed
    /// through [`chunk`].
    ///
    /// [`chunk`]: #method.chunk
    pub fn content(&mut self) -> crate::Result<Bytes> {
        let client = &mut *self.client;
        self.exchange.drain(&mut client.runtime, client.timeout)?;

        let total: usize = self.exchange.chunks.iter().map(Bytes::len).sum();
        let mut buf = Vec::with_capacity(total);
        for chunk in &self.exchange.chunks {
            buf.extend_from_slice(chunk);
        }
        Ok(Bytes::from(buf))
    }

    /// Returns the body decoded as a string, replacing invalid sequences.
    pub fn text(&mut self) -> crate::Result<String> {
        let content = self.content()?;
        Ok(String::from_utf8_lossy(&content).into_owned())
    }

    /// Deserializes the body as JSON.
    pub fn json<T>(&mut self) -> crate::Result<T>
    where
        T: DeserializeOwned,
    {
        let content = self.content()?;
        serde_json::from_slice(&content).map_err(|e| Error::decode(e))
    }
}
