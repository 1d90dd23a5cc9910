//! The client bound to an application for testing, and the request builder
//! driving a single exchange through a dedicated session.

use {
    crate::{
        app::Application,
        channel::Session,
        error::Error,
        lifespan::Lifespan,
        message::{AppMessage, ClientMessage, Scope},
        multipart::{self, Part},
        response::{Exchange, Response},
        runtime::Runtime,
        websocket::WebSocketBuilder,
    },
    bytes::Bytes,
    cookie::Cookie,
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        Method, StatusCode, Uri,
    },
    std::{collections::HashMap, fmt, time::Duration},
};

const MAX_REDIRECTS: usize = 10;

/// A client bound to an application for testing.
///
/// The client drives the lifespan handshake of the application when it is
/// built, issues request and websocket exchanges against it, and performs
/// the shutdown handshake when [`shutdown`] is called.
///
/// [`shutdown`]: #method.shutdown
pub struct Client<S> {
    pub(crate) app: S,
    pub(crate) runtime: Runtime,
    pub(crate) cookies: Option<HashMap<String, String>>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) default_headers: HeaderMap,
    pub(crate) raise_app_errors: bool,
    pub(crate) scope_hook: Option<Box<dyn Fn(&mut Scope)>>,
    lifespan: Option<Lifespan>,
}

impl<S> fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("cookies", &self.cookies)
            .field("timeout", &self.timeout)
            .field("raise_app_errors", &self.raise_app_errors)
            .finish()
    }
}

impl<S> Client<S>
where
    S: Application,
{
    /// Creates a client with the default configuration and performs the
    /// lifespan startup handshake.
    pub fn new(app: S) -> crate::Result<Self> {
        Self::builder(app).build()
    }

    /// Starts building a client.
    pub fn builder(app: S) -> ClientBuilder<S> {
        ClientBuilder {
            app,
            cookies: true,
            timeout: None,
            default_headers: HeaderMap::new(),
            raise_app_errors: true,
            scope_hook: None,
            err: None,
        }
    }

    /// Returns the value of the cookie with the specified name stored on
    /// this client.
    ///
    /// Returns `None` if the cookie is missing or cookie tracking is
    /// disabled.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.as_ref()?.get(name).map(|s| s.as_str())
    }

    /// Registers a cookie with the specified name and value.
    ///
    /// This method forces cookie tracking to be enabled.
    pub fn set_cookie(&mut self, name: &str, value: impl Into<String>) {
        self.cookies
            .get_or_insert_with(HashMap::new)
            .insert(name.to_owned(), value.into());
    }

    /// Starts building a request with the specified method.
    pub fn request(&mut self, method: Method, path: impl Into<String>) -> RequestBuilder<'_, S> {
        RequestBuilder {
            client: self,
            method,
            path: path.into(),
            headers: vec![],
            query: None,
            data: None,
            chunks: None,
            json: None,
            form: None,
            parts: vec![],
            scheme: "http".to_owned(),
            cookies: None,
            stream: false,
            follow_redirects: true,
            err: None,
        }
    }

    /// Starts building a DELETE request.
    pub fn delete(&mut self, path: impl Into<String>) -> RequestBuilder<'_, S> {
        self.request(Method::DELETE, path)
    }

    /// Starts building a GET request.
    pub fn get(&mut self, path: impl Into<String>) -> RequestBuilder<'_, S> {
        self.request(Method::GET, path)
    }

    /// Starts building a HEAD request.
    pub fn head(&mut self, path: impl Into<String>) -> RequestBuilder<'_, S> {
        self.request(Method::HEAD, path)
    }

    /// Starts building an OPTIONS request.
    pub fn options(&mut self, path: impl Into<String>) -> RequestBuilder<'_, S> {
        self.request(Method::OPTIONS, path)
    }

    /// Starts building a PATCH request.
    pub fn patch(&mut self, path: impl Into<String>) -> RequestBuilder<'_, S> {
        self.request(Method::PATCH, path)
    }

    /// Starts building a POST request.
    pub fn post(&mut self, path: impl Into<String>) -> RequestBuilder<'_, S> {
        self.request(Method::POST, path)
    }

    /// Starts building a PUT request.
    pub fn put(&mut self, path: impl Into<String>) -> RequestBuilder<'_, S> {
        self.request(Method::PUT, path)
    }

    /// Starts building a TRACE request.
    pub fn trace(&mut self, path: impl Into<String>) -> RequestBuilder<'_, S> {
        self.request(Method::TRACE, path)
    }

    /// Starts building a websocket session.
    pub fn websocket(&mut self, path: impl Into<String>) -> WebSocketBuilder<'_, S> {
        WebSocketBuilder::new(self, path.into())
    }

    /// Performs the lifespan shutdown handshake and releases the runtime.
    ///
    /// Application tasks abandoned after a timeout are dropped rather than
    /// awaited.
    pub fn shutdown(mut self) -> crate::Result<()> {
        if let Some(mut lifespan) = self.lifespan.take() {
            lifespan.shutdown(&mut self.runtime, self.timeout)?;
        }
        Ok(())
    }
}

/// A builder for a [`Client`].
///
/// [`Client`]: ./struct.Client.html
pub struct ClientBuilder<S> {
    app: S,
    cookies: bool,
    timeout: Option<Duration>,
    default_headers: HeaderMap,
    raise_app_errors: bool,
    scope_hook: Option<Box<dyn Fn(&mut Scope)>>,
    err: Option<Error>,
}

impl<S> fmt::Debug for ClientBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("cookies", &self.cookies)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<S> ClientBuilder<S> {
    /// Sets whether to track cookies across requests.
    ///
    /// Enabled by default.
    pub fn cookies(mut self, enabled: bool) -> Self {
        self.cookies = enabled;
        self
    }

    /// Sets the deadline applied to every wait for an application message.
    ///
    /// By default no deadline is applied and a silent application blocks
    /// its caller indefinitely.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds a header sent with every request issued by this client.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match parse_header(name, value) {
            Ok((name, value)) => {
                self.default_headers.append(name, value);
            }
            Err(err) => {
                if self.err.is_none() {
                    self.err = Some(err);
                }
            }
        }
        self
    }

    /// Sets whether failures raised by the application are re-raised to the
    /// caller.
    ///
    /// Enabled by default. When disabled, a captured failure is converted
    /// into a 500 response whose body is the failure's description.
    pub fn raise_app_errors(mut self, enabled: bool) -> Self {
        self.raise_app_errors = enabled;
        self
    }

    /// Registers a hook applied to every request and websocket scope before
    /// it is handed to the application.
    pub fn map_scope(mut self, hook: impl Fn(&mut Scope) + 'static) -> Self {
        self.scope_hook = Some(Box::new(hook));
        self
    }

    /// Consumes the builder, starts the runtime and performs the lifespan
    /// startup handshake.
    ///
    /// An explicit `lifespan.startup.failed` reported by the application
    /// fails the build; an application that does not implement the lifespan
    /// phase at all does not.
    pub fn build(self) -> crate::Result<Client<S>>
    where
        S: Application,
    {
        if let Some(err) = self.err {
            return Err(err);
        }

        let mut runtime = Runtime::new()?;
        let lifespan = Lifespan::startup(&mut runtime, &self.app, self.timeout)?;

        Ok(Client {
            app: self.app,
            runtime,
            cookies: if self.cookies {
                Some(HashMap::new())
            } else {
                None
            },
            timeout: self.timeout,
            default_headers: self.default_headers,
            raise_app_errors: self.raise_app_errors,
            scope_hook: self.scope_hook,
            lifespan: Some(lifespan),
        })
    }
}

/// A builder for one request exchange.
///
/// At most one of [`data`], [`data_chunks`], [`json`], [`form`] and [`part`]
/// may be used per request, and an explicit [`query`] excludes a query
/// fragment embedded in the path. Violations are reported by [`send`]
/// before any application instance is spawned.
///
/// [`data`]: #method.data
/// [`data_chunks`]: #method.data_chunks
/// [`json`]: #method.json
/// [`form`]: #method.form
/// [`part`]: #method.part
/// [`query`]: #method.query
/// [`send`]: #method.send
#[allow(missing_debug_implementations)]
pub struct RequestBuilder<'a, S> {
    client: &'a mut Client<S>,
    method: Method,
    path: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    query: Option<Vec<(String, String)>>,
    data: Option<Bytes>,
    chunks: Option<Vec<Bytes>>,
    json: Option<Vec<u8>>,
    form: Option<Vec<(String, String)>>,
    parts: Vec<(String, Part)>,
    scheme: String,
    cookies: Option<HashMap<String, String>>,
    stream: bool,
    follow_redirects: bool,
    err: Option<Error>,
}

impl<'a, S> RequestBuilder<'a, S>
where
    S: Application,
{
    /// Adds a header to this request.
    ///
    /// A header set here replaces every equally named default header of the
    /// client.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match parse_header(name, value) {
            Ok(pair) => self.headers.push(pair),
            Err(err) => {
                if self.err.is_none() {
                    self.err = Some(err);
                }
            }
        }
        self
    }

    /// Sets the query string from the specified pairs.
    pub fn query(mut self, pairs: &[(&str, &str)]) -> Self {
        self.query = Some(
            pairs
                .iter()
                .map(|&(name, value)| (name.to_owned(), value.to_owned()))
                .collect(),
        );
        self
    }

    /// Sets the raw request body.
    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Sets the request body to be delivered chunk by chunk, with the last
    /// chunk marked final.
    pub fn data_chunks(mut self, chunks: impl IntoIterator<Item = Bytes>) -> Self {
        self.chunks = Some(chunks.into_iter().collect());
        self
    }

    /// Serializes the specified value as the JSON request body.
    ///
    /// Forces the content type to `application/json`.
    pub fn json<T>(mut self, value: &T) -> Self
    where
        T: serde::Serialize,
    {
        match serde_json::to_vec(value) {
            Ok(encoded) => self.json = Some(encoded),
            Err(err) => {
                if self.err.is_none() {
                    self.err = Some(Error::usage(format!(
                        "failed to serialize the json body: {}",
                        err
                    )));
                }
            }
        }
        self
    }

    /// URL-encodes the specified pairs as the form request body.
    ///
    /// Forces the content type to `application/x-www-form-urlencoded`.
    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        self.form = Some(
            pairs
                .iter()
                .map(|&(name, value)| (name.to_owned(), value.to_owned()))
                .collect(),
        );
        self
    }

    /// Adds a field to the multipart request body.
    ///
    /// Forces the content type to `multipart/form-data` with the generated
    /// boundary.
    pub fn part(mut self, name: &str, part: Part) -> Self {
        self.parts.push((name.to_owned(), part));
        self
    }

    /// Sets the scheme reported in the scope, `"http"` by default.
    pub fn scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_owned();
        self
    }

    /// Replaces the client's cookie jar with the specified one for this
    /// request only.
    pub fn cookies(mut self, jar: HashMap<String, String>) -> Self {
        self.cookies = Some(jar);
        self
    }

    /// Adds a cookie to the per-request jar, creating the jar if needed.
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies
            .get_or_insert_with(HashMap::new)
            .insert(name.to_owned(), value.to_owned());
        self
    }

    /// Leaves the response body streamed instead of buffering it.
    pub fn stream(mut self, enabled: bool) -> Self {
        self.stream = enabled;
        self
    }

    /// Sets whether redirect responses are followed, `true` by default.
    pub fn follow_redirects(mut self, enabled: bool) -> Self {
        self.follow_redirects = enabled;
        self
    }

    /// Performs the exchange and awaits the response.
    ///
    /// Exactly one application instance is spawned per dispatched request;
    /// a followed redirect dispatches a fresh GET request to the target
    /// named by the `Location` header.
    pub fn send(mut self) -> crate::Result<Response<'a, S>> {
        if let Some(err) = self.err.take() {
            return Err(err);
        }

        let sources = self.data.is_some() as usize
            + self.chunks.is_some() as usize
            + self.json.is_some() as usize
            + self.form.is_some() as usize
            + (!self.parts.is_empty()) as usize;
        if sources > 1 {
            return Err(Error::usage(
                "the body arguments `data`, `data_chunks`, `json`, `form` and `part` \
                 are mutually exclusive",
            ));
        }
        if self.query.is_some() && self.path.contains('?') {
            return Err(Error::usage(
                "the query string is defined both in the path and as an argument",
            ));
        }

        let mut content_type = None;
        let mut body = if let Some(data) = self.data.take() {
            BodyKind::Single(data)
        } else if let Some(chunks) = self.chunks.take() {
            BodyKind::Chunked(chunks)
        } else if let Some(json) = self.json.take() {
            content_type = Some("application/json".to_owned());
            BodyKind::Single(Bytes::from(json))
        } else if let Some(form) = self.form.take() {
            content_type = Some("application/x-www-form-urlencoded".to_owned());
            BodyKind::Single(encode_pairs(&form))
        } else if !self.parts.is_empty() {
            let (encoded, mime) = multipart::encode(&self.parts);
            content_type = Some(mime);
            BodyKind::Single(Bytes::from(encoded))
        } else {
            BodyKind::Single(Bytes::new())
        };

        let mut override_jar = self.cookies.take();
        let mut method = self.method.clone();
        let mut target = self.path.clone();
        let mut call_headers: &[(HeaderName, HeaderValue)] = &self.headers;
        let mut query = self.query.as_deref();
        let mut hops = 0;

        loop {
            let exchange = dispatch(
                &mut *self.client,
                &method,
                &self.scheme,
                &target,
                call_headers,
                query,
                content_type.take(),
                body,
                override_jar.as_mut(),
                self.stream,
            )?;

            if self.follow_redirects && exchange.status.is_redirection() {
                if let Some(location) = exchange.headers.get(header::LOCATION) {
                    hops += 1;
                    if hops > MAX_REDIRECTS {
                        return Err(Error::too_many_redirects(MAX_REDIRECTS));
                    }
                    let location = location.to_str().map_err(|e| {
                        Error::protocol(format!("invalid Location header: {}", e))
                    })?;
                    target = redirect_target(location)?;
                    method = Method::GET;
                    call_headers = &[];
                    query = None;
                    body = BodyKind::Single(Bytes::new());
                    continue;
                }
            }

            return Ok(Response::new(exchange, self.client));
        }
    }
}

enum BodyKind {
    Single(Bytes),
    Chunked(Vec<Bytes>),
}

/// Runs one request exchange against a freshly spawned application instance.
fn dispatch<S>(
    client: &mut Client<S>,
    method: &Method,
    scheme: &str,
    target: &str,
    call_headers: &[(HeaderName, HeaderValue)],
    query: Option<&[(String, String)]>,
    content_type: Option<String>,
    body: BodyKind,
    override_jar: Option<&mut HashMap<String, String>>,
    stream: bool,
) -> crate::Result<Exchange>
where
    S: Application,
{
    let Client {
        app,
        runtime,
        cookies,
        timeout,
        default_headers,
        raise_app_errors,
        scope_hook,
        ..
    } = client;
    let timeout = *timeout;
    let raise_app_errors = *raise_app_errors;

    // Merge the client's default headers with the per-request ones; the
    // latter win on conflict.
    let mut headers = default_headers.clone();
    for (name, _) in call_headers {
        headers.remove(name);
    }
    for (name, value) in call_headers {
        headers.append(name.clone(), value.clone());
    }
    if !headers.contains_key("remote-addr") {
        headers.insert(
            HeaderName::from_static("remote-addr"),
            HeaderValue::from_static("127.0.0.1"),
        );
    }
    if !headers.contains_key(header::USER_AGENT) {
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(concat!("kagami/", env!("CARGO_PKG_VERSION"))),
        );
    }
    if !headers.contains_key(header::HOST) {
        headers.insert(header::HOST, HeaderValue::from_static("localhost"));
    }
    if let Some(content_type) = content_type {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&content_type)
                .map_err(|e| Error::usage(format!("invalid content type: {}", e)))?,
        );
    }
    if let BodyKind::Single(ref data) = body {
        if !data.is_empty() && !headers.contains_key(header::CONTENT_LENGTH) {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(data.len()));
        }
    }

    let jar = match override_jar {
        Some(jar) => Some(jar),
        None => cookies.as_mut(),
    };
    if let Some(ref jar) = jar {
        if !jar.is_empty() {
            headers.insert(header::COOKIE, cookie_header(jar)?);
        }
    }

    let (path, query_string) = match query {
        Some(pairs) => (target.to_owned(), encode_pairs(pairs)),
        None => split_target(target),
    };

    let mut scope = Scope::http(
        method.clone(),
        scheme.to_owned(),
        path,
        query_string,
        flatten_headers(&headers),
    );
    if let Some(hook) = scope_hook {
        hook(&mut scope);
    }

    let mut session = Session::start(runtime, app, scope);

    match body {
        BodyKind::Single(data) => session.send(ClientMessage::HttpRequest {
            body: data,
            more_body: false,
        }),
        BodyKind::Chunked(chunks) => {
            if chunks.is_empty() {
                session.send(ClientMessage::HttpRequest {
                    body: Bytes::new(),
                    more_body: false,
                });
            } else {
                let last = chunks.len() - 1;
                for (index, chunk) in chunks.into_iter().enumerate() {
                    session.send(ClientMessage::HttpRequest {
                        body: chunk,
                        more_body: index < last,
                    });
                }
            }
        }
    }

    let (status, raw_headers) = match session.expect(runtime, timeout, "http.response.start") {
        Ok(AppMessage::HttpResponseStart { status, headers }) => (status, headers),
        Ok(message) => {
            return Err(Error::unexpected_message(
                "http.response.start",
                message.kind(),
            ));
        }
        Err(err) => {
            if !raise_app_errors {
                if let Some(fault) = err.app_fault() {
                    let description = fault.to_string();
                    let snapshot = jar.as_ref().map(|jar| (**jar).clone()).unwrap_or_default();
                    return Ok(Exchange::fault(session, description, snapshot));
                }
            }
            return Err(err);
        }
    };
    let status = StatusCode::from_u16(status)
        .map_err(|_| Error::protocol(format!("invalid response status: {}", status)))?;
    let headers = decode_headers(raw_headers)?;
    let mut exchange = Exchange::new(status, headers, session);

    let mut result = exchange.read_chunk(runtime, timeout);
    if result.is_ok() && !stream {
        result = exchange.drain(runtime, timeout);
    }
    if let Err(err) = result {
        match err.app_fault() {
            Some(fault) if !raise_app_errors => exchange.synthesize_fault(fault.to_string()),
            _ => return Err(err),
        }
    }

    if let Some(jar) = jar {
        for value in exchange.headers.get_all(header::SET_COOKIE) {
            let raw = value
                .to_str()
                .map_err(|e| Error::protocol(format!("invalid Set-Cookie header: {}", e)))?;
            let parsed = Cookie::parse_encoded(raw)
                .map_err(|e| Error::protocol(format!("invalid Set-Cookie header: {}", e)))?;
            if parsed.value().is_empty() {
                jar.remove(parsed.name());
            } else {
                jar.insert(parsed.name().to_owned(), parsed.value().to_owned());
            }
        }
        exchange.cookies = jar.clone();
    }

    Ok(exchange)
}

pub(crate) fn parse_header(name: &str, value: &str) -> crate::Result<(HeaderName, HeaderValue)> {
    let name = name
        .parse::<HeaderName>()
        .map_err(|e| Error::usage(format!("invalid header name `{}`: {}", name, e)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| Error::usage(format!("invalid header value: {}", e)))?;
    Ok((name, value))
}

/// Builds the `Cookie` header from the jar in use.
pub(crate) fn cookie_header(jar: &HashMap<String, String>) -> crate::Result<HeaderValue> {
    let value = jar
        .iter()
        .map(|(name, value)| Cookie::new(name.clone(), value.clone()).to_string())
        .collect::<Vec<_>>()
        .join("; ");
    HeaderValue::from_str(&value).map_err(|e| Error::usage(format!("invalid cookie value: {}", e)))
}

/// Splits a query fragment embedded in the path off into raw query bytes.
pub(crate) fn split_target(target: &str) -> (String, Bytes) {
    match target.find('?') {
        Some(pos) => (
            target[..pos].to_owned(),
            Bytes::from(target[pos + 1..].to_owned()),
        ),
        None => (target.to_owned(), Bytes::new()),
    }
}

/// Percent-encodes the specified pairs, for query strings and form bodies.
pub(crate) fn encode_pairs(pairs: &[(String, String)]) -> Bytes {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in pairs {
        serializer.append_pair(name, value);
    }
    Bytes::from(serializer.finish())
}

/// Flattens a header map into the ordered lowercased pairs of a scope.
pub(crate) fn flatten_headers(headers: &HeaderMap) -> Vec<(Bytes, Bytes)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                Bytes::from(name.as_str().to_owned()),
                Bytes::from(value.as_bytes().to_vec()),
            )
        })
        .collect()
}

fn decode_headers(raw: Vec<(Bytes, Bytes)>) -> crate::Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for (name, value) in raw {
        let name = HeaderName::from_bytes(&name)
            .map_err(|e| Error::protocol(format!("invalid response header name: {}", e)))?;
        let value = HeaderValue::from_bytes(&value)
            .map_err(|e| Error::protocol(format!("invalid response header value: {}", e)))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn redirect_target(location: &str) -> crate::Result<String> {
    let uri = location
        .parse::<Uri>()
        .map_err(|e| Error::protocol(format!("invalid Location header: {}", e)))?;
    Ok(match uri.path_and_query() {
        Some(path_and_query) => path_and_query.as_str().to_owned(),
        None => uri.path().to_owned(),
    })
}
