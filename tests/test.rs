use {
    bytes::Bytes,
    futures::{future, Future},
    kagami::{
        multipart::Part, AppFuture, AppMessage, Client, ClientMessage, Receiver, Scope, ScopeKind,
        Sender,
    },
    std::{cell::Cell, collections::HashMap, rc::Rc, time::Duration},
};

#[test]
fn version_sync() {
    version_sync::assert_html_root_url_updated!("src/lib.rs");
}

// ==== fixture applications ====

/// The usual lifespan handshake, acknowledging startup and shutdown.
fn lifespan(receive: Receiver, send: Sender) -> AppFuture {
    let done = send.clone();
    Box::new(receive.recv().and_then(move |(_startup, receive)| {
        send.send(AppMessage::LifespanStartupComplete);
        receive.recv().map(move |(_shutdown, _receive)| {
            done.send(AppMessage::LifespanShutdownComplete);
        })
    }))
}

fn unsupported() -> AppFuture {
    Box::new(future::err(failure::format_err!("unsupported scope")))
}

fn hello(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
    match scope.kind() {
        ScopeKind::Lifespan => lifespan(receive, send),
        ScopeKind::Http => Box::new(receive.recv().map(move |(_request, _receive)| {
            send.send(AppMessage::response_start(200, vec![]));
            send.send(AppMessage::response_body("full response", false));
        })),
        ScopeKind::WebSocket => unsupported(),
    }
}

/// Reports the scope and the request body back to the caller as JSON.
fn reflect(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
    match scope.kind() {
        ScopeKind::Lifespan => lifespan(receive, send),
        ScopeKind::Http => Box::new(receive.recv().map(move |(message, _receive)| {
            let body = match message {
                ClientMessage::HttpRequest { body, .. } => body,
                _ => Bytes::new(),
            };
            let headers: Vec<(String, String)> = scope
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        String::from_utf8_lossy(name).into_owned(),
                        String::from_utf8_lossy(value).into_owned(),
                    )
                })
                .collect();
            let reflected = serde_json::json!({
                "version": scope.version(),
                "method": scope.method().as_str(),
                "scheme": scope.scheme(),
                "path": scope.path(),
                "query": String::from_utf8_lossy(scope.query_string()),
                "headers": headers,
                "body": String::from_utf8_lossy(&body),
            });
            send.send(AppMessage::response_start(
                200,
                vec![(
                    Bytes::from_static(b"content-type"),
                    Bytes::from_static(b"application/json"),
                )],
            ));
            send.send(AppMessage::response_body(reflected.to_string(), false));
        })),
        ScopeKind::WebSocket => unsupported(),
    }
}

fn reflected_headers(value: &serde_json::Value) -> Vec<(String, String)> {
    serde_json::from_value(value["headers"].clone()).unwrap()
}

// ==== request/response ====

#[test]
fn request_response_roundtrip() -> kagami::Result<()> {
    let mut client = Client::new(hello)?;
    let mut response = client.get("/").send()?;
    assert_eq!(response.status(), 200);
    assert!(response.headers().is_empty());
    assert_eq!(response.text()?, "full response");
    client.shutdown()
}

#[test]
fn header_only_response() -> kagami::Result<()> {
    fn app(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
        match scope.kind() {
            ScopeKind::Lifespan => lifespan(receive, send),
            _ => Box::new(receive.recv().map(move |(_request, _receive)| {
                send.send(AppMessage::response_start(
                    204,
                    vec![(
                        Bytes::from_static(b"x-header"),
                        Bytes::from_static(b"Value"),
                    )],
                ));
                send.send(AppMessage::response_body("", false));
            })),
        }
    }

    let mut client = Client::new(app)?;
    let mut response = client.get("/header").send()?;
    assert_eq!(response.status(), 204);
    assert_eq!(
        response
            .header("x-header")
            .and_then(|value| value.to_str().ok()),
        Some("Value")
    );
    assert_eq!(response.text()?, "");
    client.shutdown()
}

#[test]
fn json_response_is_decodable() -> kagami::Result<()> {
    fn app(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
        match scope.kind() {
            ScopeKind::Lifespan => lifespan(receive, send),
            _ => Box::new(receive.recv().map(move |(_request, _receive)| {
                send.send(AppMessage::response_start(
                    200,
                    vec![(
                        Bytes::from_static(b"content-type"),
                        Bytes::from_static(b"application/json"),
                    )],
                ));
                send.send(AppMessage::response_body(r#"{"hello":"world"}"#, false));
            })),
        }
    }

    let mut client = Client::new(app)?;
    let value: serde_json::Value = client.get("/json").send()?.json()?;
    assert_eq!(value, serde_json::json!({"hello": "world"}));
    client.shutdown()
}

// ==== scope construction ====

#[test]
fn scope_headers_are_normalized() -> kagami::Result<()> {
    let mut client = Client::new(reflect)?;
    let value: serde_json::Value = client
        .get("/")
        .header("X-Dup", "one")
        .header("X-Dup", "two")
        .header("X-Custom-Header", "value")
        .send()?
        .json()?;

    assert_eq!(value["version"], "3.0");
    assert_eq!(value["method"], "GET");

    let headers = reflected_headers(&value);
    let dups: Vec<&str> = headers
        .iter()
        .filter(|(name, _)| name == "x-dup")
        .map(|(_, value)| value.as_str())
        .collect();
    assert_eq!(dups, ["one", "two"]);
    assert!(headers
        .iter()
        .any(|(name, value)| name == "x-custom-header" && value == "value"));
    assert!(headers.iter().any(|(name, _)| name == "host"));
    assert!(headers.iter().any(|(name, _)| name == "remote-addr"));
    assert!(headers.iter().any(|(name, _)| name == "user-agent"));
    client.shutdown()
}

#[test]
fn query_roundtrip() -> kagami::Result<()> {
    let mut client = Client::new(reflect)?;
    let embedded: serde_json::Value = client.get("/x?a=1").send()?.json()?;
    let explicit: serde_json::Value = client.get("/x").query(&[("a", "1")]).send()?.json()?;
    assert_eq!(embedded["query"], "a=1");
    assert_eq!(embedded["query"], explicit["query"]);
    assert_eq!(embedded["path"], "/x");
    assert_eq!(explicit["path"], "/x");
    client.shutdown()
}

#[test]
fn call_headers_override_client_defaults() -> kagami::Result<()> {
    let mut client = Client::builder(reflect).header("x-flavor", "default").build()?;

    let value: serde_json::Value = client.get("/").send()?.json()?;
    assert!(reflected_headers(&value)
        .iter()
        .any(|(name, value)| name == "x-flavor" && value == "default"));

    let value: serde_json::Value = client.get("/").header("x-flavor", "call").send()?.json()?;
    let headers = reflected_headers(&value);
    assert!(headers
        .iter()
        .any(|(name, value)| name == "x-flavor" && value == "call"));
    assert!(!headers.iter().any(|(_, value)| value == "default"));
    client.shutdown()
}

// ==== body sources ====

#[test]
fn data_body_sets_content_length() -> kagami::Result<()> {
    let mut client = Client::new(reflect)?;
    let value: serde_json::Value = client.post("/").data("hello").send()?.json()?;
    assert_eq!(value["body"], "hello");
    assert_eq!(value["method"], "POST");
    assert!(reflected_headers(&value)
        .iter()
        .any(|(name, value)| name == "content-length" && value == "5"));
    client.shutdown()
}

#[test]
fn json_body_forces_content_type() -> kagami::Result<()> {
    let mut client = Client::new(reflect)?;
    let value: serde_json::Value = client
        .post("/")
        .json(&serde_json::json!({"hello": "world"}))
        .send()?
        .json()?;
    assert_eq!(value["body"], r#"{"hello":"world"}"#);
    assert!(reflected_headers(&value)
        .iter()
        .any(|(name, value)| name == "content-type" && value == "application/json"));
    client.shutdown()
}

#[test]
fn form_body_is_url_encoded() -> kagami::Result<()> {
    let mut client = Client::new(reflect)?;
    let value: serde_json::Value = client
        .post("/")
        .form(&[("user", "root"), ("pswd", "12 34")])
        .send()?
        .json()?;
    assert_eq!(value["body"], "user=root&pswd=12+34");
    assert!(reflected_headers(&value)
        .iter()
        .any(|(name, value)| name == "content-type"
            && value == "application/x-www-form-urlencoded"));
    client.shutdown()
}

#[test]
fn multipart_body_carries_the_boundary() -> kagami::Result<()> {
    let mut client = Client::new(reflect)?;
    let value: serde_json::Value = client
        .post("/")
        .part("note", Part::text("hello"))
        .part(
            "avatar",
            Part::bytes(&b"binary"[..])
                .filename("a.png")
                .content_type("image/png"),
        )
        .send()?
        .json()?;

    let headers = reflected_headers(&value);
    let content_type = headers
        .iter()
        .find(|(name, _)| name == "content-type")
        .map(|(_, value)| value.clone())
        .unwrap();
    assert!(content_type.starts_with("multipart/form-data; boundary="));

    let body = value["body"].as_str().unwrap();
    assert!(body.contains("name=\"note\""));
    assert!(body.contains("hello"));
    assert!(body.contains("filename=\"a.png\""));
    assert!(body.contains("Content-Type: image/png"));
    client.shutdown()
}

#[test]
fn chunked_upload_is_delivered_in_order() -> kagami::Result<()> {
    fn echo_body(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
        match scope.kind() {
            ScopeKind::Lifespan => lifespan(receive, send),
            ScopeKind::Http => Box::new(
                future::loop_fn((receive, Vec::new()), |(receive, mut buf)| {
                    receive.recv().map(move |(message, receive)| match message {
                        ClientMessage::HttpRequest { body, more_body } => {
                            buf.extend_from_slice(&body);
                            if more_body {
                                future::Loop::Continue((receive, buf))
                            } else {
                                future::Loop::Break(buf)
                            }
                        }
                        _ => future::Loop::Break(buf),
                    })
                })
                .map(move |buf| {
                    send.send(AppMessage::response_start(200, vec![]));
                    send.send(AppMessage::response_body(buf, false));
                }),
            ),
            ScopeKind::WebSocket => unsupported(),
        }
    }

    let mut client = Client::new(echo_body)?;
    let chunks = vec![
        Bytes::from_static(b"first,"),
        Bytes::from_static(b"second,"),
        Bytes::from_static(b"third"),
    ];
    assert_eq!(
        client.post("/").data_chunks(chunks).send()?.text()?,
        "first,second,third"
    );
    assert_eq!(client.post("/").data("single").send()?.text()?, "single");
    client.shutdown()
}

// ==== usage errors ====

#[test]
fn conflicting_body_sources_are_rejected() {
    let mut client = Client::new(hello).unwrap();
    let err = client
        .post("/")
        .data("raw")
        .json(&serde_json::json!({"a": 1}))
        .send()
        .unwrap_err();
    assert!(err.is_usage());
    client.shutdown().unwrap();
}

#[test]
fn embedded_and_explicit_query_are_rejected() {
    let mut client = Client::new(hello).unwrap();
    let err = client
        .get("/x?a=1")
        .query(&[("b", "2")])
        .send()
        .unwrap_err();
    assert!(err.is_usage());
    client.shutdown().unwrap();
}

// ==== cookies ====

fn cookie_app(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
    match scope.kind() {
        ScopeKind::Lifespan => lifespan(receive, send),
        ScopeKind::Http => Box::new(receive.recv().map(move |(_request, _receive)| {
            if scope.path() == "/set" {
                send.send(AppMessage::response_start(
                    200,
                    vec![(
                        Bytes::from_static(b"set-cookie"),
                        Bytes::from_static(b"my-cookie=1234"),
                    )],
                ));
                send.send(AppMessage::response_body("", false));
            } else {
                let cookie = scope
                    .headers()
                    .iter()
                    .find(|(name, _)| name.as_ref() == b"cookie")
                    .map(|(_, value)| String::from_utf8_lossy(value).into_owned())
                    .unwrap_or_default();
                send.send(AppMessage::response_start(200, vec![]));
                send.send(AppMessage::response_body(cookie, false));
            }
        })),
        ScopeKind::WebSocket => unsupported(),
    }
}

#[test]
fn cookies_persist_across_requests() -> kagami::Result<()> {
    let mut client = Client::new(cookie_app)?;

    let response = client.post("/set").send()?;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.cookies().get("my-cookie").map(String::as_str),
        Some("1234")
    );
    assert_eq!(client.cookie("my-cookie"), Some("1234"));

    // the cookie set by the first request rides along on both later ones
    assert_eq!(client.get("/read").send()?.text()?, "my-cookie=1234");
    assert_eq!(client.get("/read").send()?.text()?, "my-cookie=1234");
    client.shutdown()
}

#[test]
fn per_request_jar_overrides_the_client_jar() -> kagami::Result<()> {
    let mut client = Client::new(cookie_app)?;
    client.post("/set").send()?;

    let mut jar = HashMap::new();
    jar.insert("my-cookie".to_owned(), "6666".to_owned());
    assert_eq!(
        client.get("/read").cookies(jar).send()?.text()?,
        "my-cookie=6666"
    );

    // the client's own jar is untouched by the override
    assert_eq!(client.get("/read").send()?.text()?, "my-cookie=1234");
    client.shutdown()
}

#[test]
fn cookie_tracking_can_be_disabled() -> kagami::Result<()> {
    let mut client = Client::builder(cookie_app).cookies(false).build()?;
    let response = client.post("/set").send()?;
    assert_eq!(response.status(), 200);
    assert!(response.cookies().is_empty());
    assert_eq!(client.get("/read").send()?.text()?, "");
    client.shutdown()
}

#[test]
fn preset_cookies_are_sent() -> kagami::Result<()> {
    let mut client = Client::new(cookie_app)?;
    client.set_cookie("my-cookie", "42");
    assert_eq!(client.get("/read").send()?.text()?, "my-cookie=42");
    client.shutdown()
}

// ==== failures, timeouts and protocol violations ====

fn faulty(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
    match scope.kind() {
        ScopeKind::Lifespan => lifespan(receive, send),
        _ => Box::new(future::err(failure::format_err!("boom"))),
    }
}

#[test]
fn app_fault_is_reraised() -> kagami::Result<()> {
    let mut client = Client::new(faulty)?;
    let err = client.get("/").send().unwrap_err();
    assert!(err.is_app_error());
    assert!(err.to_string().contains("boom"));
    client.shutdown()
}

#[test]
fn app_fault_becomes_500_when_tolerated() -> kagami::Result<()> {
    let mut client = Client::builder(faulty).raise_app_errors(false).build()?;
    let mut response = client.get("/").send()?;
    assert_eq!(response.status(), 500);
    assert!(response.text()?.contains("boom"));
    client.shutdown()
}

#[test]
fn timeout_is_distinguished_from_a_violation() -> kagami::Result<()> {
    fn stuck(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
        match scope.kind() {
            ScopeKind::Lifespan => lifespan(receive, send),
            _ => Box::new(future::empty::<(), failure::Error>()),
        }
    }

    let mut client = Client::builder(stuck)
        .timeout(Duration::from_millis(50))
        .build()?;
    let err = client.get("/stuck").send().unwrap_err();
    assert!(err.is_timeout());
    assert!(!err.is_protocol_violation());
    client.shutdown()
}

#[test]
fn unexpected_message_is_a_protocol_violation() -> kagami::Result<()> {
    fn confused(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
        match scope.kind() {
            ScopeKind::Lifespan => lifespan(receive, send),
            _ => Box::new(receive.recv().map(move |(_request, _receive)| {
                send.send(AppMessage::WebSocketAccept);
            })),
        }
    }

    let mut client = Client::new(confused)?;
    let err = client.get("/").send().unwrap_err();
    assert!(err.is_protocol_violation());
    let message = err.to_string();
    assert!(message.contains("http.response.start"));
    assert!(message.contains("websocket.accept"));
    client.shutdown()
}

// ==== streaming ====

fn streaming(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
    match scope.kind() {
        ScopeKind::Lifespan => lifespan(receive, send),
        _ => Box::new(receive.recv().map(move |(_request, _receive)| {
            send.send(AppMessage::response_start(200, vec![]));
            send.send(AppMessage::response_body(vec![b'X'; 1024], true));
            send.send(AppMessage::response_body(vec![b'X'; 1024], true));
            send.send(AppMessage::response_body(vec![b'X'; 1024], false));
        })),
    }
}

#[test]
fn streamed_body_arrives_in_three_chunks() -> kagami::Result<()> {
    let mut client = Client::new(streaming)?;
    let mut response = client.get("/download").stream(true).send()?;
    assert_eq!(response.status(), 200);

    let mut total = 0;
    let mut reads = 0;
    while let Some(chunk) = response.chunk()? {
        total += chunk.len();
        reads += 1;
    }
    assert_eq!(total, 3 * 1024);
    assert_eq!(reads, 3);
    assert_eq!(response.chunk()?, None);
    client.shutdown()
}

#[test]
fn buffered_body_collects_every_chunk() -> kagami::Result<()> {
    let mut client = Client::new(streaming)?;
    let mut response = client.get("/download").send()?;
    assert_eq!(response.content()?.len(), 3 * 1024);
    client.shutdown()
}

#[test]
fn stream_crash_surfaces_on_the_next_pull() -> kagami::Result<()> {
    fn crashing(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
        match scope.kind() {
            ScopeKind::Lifespan => lifespan(receive, send),
            _ => Box::new(receive.recv().and_then(move |(_request, _receive)| {
                send.send(AppMessage::response_start(200, vec![]));
                send.send(AppMessage::response_body(vec![b'X'; 1024], true));
                send.send(AppMessage::response_body(vec![b'X'; 1024], true));
                Err(failure::format_err!("stream crashed"))
            })),
        }
    }

    let mut client = Client::new(crashing)?;
    let mut response = client.get("/download").stream(true).send()?;
    assert_eq!(response.status(), 200);
    assert_eq!(response.chunk()?.unwrap().len(), 1024);
    assert_eq!(response.chunk()?.unwrap().len(), 1024);
    let err = response.chunk().unwrap_err();
    assert!(err.is_app_error());
    assert!(err.to_string().contains("stream crashed"));
    client.shutdown()
}

// ==== redirects ====

fn redirecting(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
    match scope.kind() {
        ScopeKind::Lifespan => lifespan(receive, send),
        ScopeKind::Http => Box::new(receive.recv().map(move |(_request, _receive)| {
            match scope.path() {
                "/" => {
                    send.send(AppMessage::response_start(200, vec![]));
                    send.send(AppMessage::response_body("home", false));
                }
                "/loop" => {
                    send.send(AppMessage::response_start(
                        302,
                        vec![(
                            Bytes::from_static(b"location"),
                            Bytes::from_static(b"/loop"),
                        )],
                    ));
                    send.send(AppMessage::response_body("", false));
                }
                _ => {
                    send.send(AppMessage::response_start(
                        302,
                        vec![(Bytes::from_static(b"location"), Bytes::from_static(b"/"))],
                    ));
                    send.send(AppMessage::response_body("", false));
                }
            }
        })),
        ScopeKind::WebSocket => unsupported(),
    }
}

#[test]
fn redirects_are_followed_by_default() -> kagami::Result<()> {
    let mut client = Client::new(redirecting)?;
    let mut response = client.get("/redir").send()?;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text()?, "home");
    client.shutdown()
}

#[test]
fn redirects_are_returned_when_disabled() -> kagami::Result<()> {
    let mut client = Client::new(redirecting)?;
    let response = client.get("/redir").follow_redirects(false).send()?;
    assert_eq!(response.status(), 302);
    assert_eq!(
        response
            .header("location")
            .and_then(|value| value.to_str().ok()),
        Some("/")
    );
    client.shutdown()
}

#[test]
fn redirect_loops_are_capped() -> kagami::Result<()> {
    let mut client = Client::new(redirecting)?;
    let err = client.get("/loop").send().unwrap_err();
    assert!(err.is_too_many_redirects());
    client.shutdown()
}

// ==== lifespan ====

#[test]
fn lifespan_startup_runs_before_requests() -> kagami::Result<()> {
    let started = Rc::new(Cell::new(false));
    let flag = started.clone();
    let app = move |scope: Scope, receive: Receiver, send: Sender| -> AppFuture {
        match scope.kind() {
            ScopeKind::Lifespan => {
                let flag = flag.clone();
                let done = send.clone();
                Box::new(receive.recv().and_then(move |(_startup, receive)| {
                    flag.set(true);
                    send.send(AppMessage::LifespanStartupComplete);
                    receive.recv().map(move |(_shutdown, _receive)| {
                        done.send(AppMessage::LifespanShutdownComplete);
                    })
                }))
            }
            ScopeKind::Http => {
                let flag = flag.clone();
                Box::new(receive.recv().map(move |(_request, _receive)| {
                    let body = if flag.get() { "yes" } else { "no" };
                    send.send(AppMessage::response_start(200, vec![]));
                    send.send(AppMessage::response_body(body, false));
                }))
            }
            ScopeKind::WebSocket => unsupported(),
        }
    };

    let mut client = Client::new(app)?;
    assert_eq!(client.get("/").send()?.text()?, "yes");
    assert!(started.get());
    client.shutdown()
}

#[test]
fn lifespan_unaware_application_is_tolerated() -> kagami::Result<()> {
    fn http_only(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
        match scope.kind() {
            ScopeKind::Http => Box::new(receive.recv().map(move |(_request, _receive)| {
                send.send(AppMessage::response_start(200, vec![]));
                send.send(AppMessage::response_body("ok", false));
            })),
            _ => unsupported(),
        }
    }

    let mut client = Client::new(http_only)?;
    assert_eq!(client.get("/").send()?.text()?, "ok");
    client.shutdown()
}

#[test]
fn lifespan_startup_failure_fails_the_build() {
    fn failing(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
        match scope.kind() {
            ScopeKind::Lifespan => Box::new(receive.recv().map(move |(_startup, _receive)| {
                send.send(AppMessage::LifespanStartupFailed {
                    message: "database unavailable".to_owned(),
                });
            })),
            _ => unsupported(),
        }
    }

    let err = Client::new(failing).unwrap_err();
    assert!(err.is_lifespan_failure());
    assert!(err.to_string().contains("database unavailable"));
}

// ==== legacy entrypoints ====

#[test]
fn legacy_entrypoints_are_adapted() -> kagami::Result<()> {
    let app = kagami::legacy(|scope: Scope| {
        if scope.kind() != ScopeKind::Http {
            return Err(failure::format_err!("unsupported scope"));
        }
        Ok(move |receive: Receiver, send: Sender| -> AppFuture {
            Box::new(receive.recv().map(move |(_request, _receive)| {
                send.send(AppMessage::response_start(200, vec![]));
                send.send(AppMessage::response_body("legacy", false));
            }))
        })
    });

    let mut client = Client::new(app)?;
    assert_eq!(client.get("/").send()?.text()?, "legacy");
    client.shutdown()
}

// ==== websocket sessions ====

fn ws_echo(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
    match scope.kind() {
        ScopeKind::Lifespan => lifespan(receive, send),
        ScopeKind::WebSocket => Box::new(receive.recv().and_then(move |(_connect, receive)| {
            send.send(AppMessage::WebSocketAccept);
            future::loop_fn((receive, send), |(receive, send)| {
                receive.recv().map(move |(message, receive)| match message {
                    ClientMessage::WebSocketReceive(frame) => {
                        send.send(AppMessage::WebSocketSend(frame));
                        future::Loop::Continue((receive, send))
                    }
                    _ => future::Loop::Break(()),
                })
            })
        })),
        ScopeKind::Http => unsupported(),
    }
}

#[test]
fn websocket_echoes_frames() -> kagami::Result<()> {
    let mut client = Client::new(ws_echo)?;
    {
        let mut session = client.websocket("/ws").connect()?;
        session.send_text("hello");
        assert_eq!(session.receive_text()?, "hello");

        session.send_bytes(&b"\x01\x02"[..]);
        assert_eq!(&*session.receive_bytes()?, &b"\x01\x02"[..]);

        session.send_json(&serde_json::json!({"n": 1}))?;
        let value: serde_json::Value = session.receive_json()?;
        assert_eq!(value, serde_json::json!({"n": 1}));

        session.close(1000);
    }
    client.shutdown()
}

#[test]
fn websocket_iteration_ends_at_task_exit() -> kagami::Result<()> {
    fn feed(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
        match scope.kind() {
            ScopeKind::Lifespan => lifespan(receive, send),
            ScopeKind::WebSocket => Box::new(receive.recv().map(move |(_connect, _receive)| {
                send.send(AppMessage::WebSocketAccept);
                send.send(AppMessage::send_text("one"));
                send.send(AppMessage::send_text("two"));
                send.send(AppMessage::send_bytes(&b"three"[..]));
            })),
            ScopeKind::Http => unsupported(),
        }
    }

    let mut client = Client::new(feed)?;
    {
        let mut session = client.websocket("/feed").connect()?;
        let frames = session.messages().collect::<kagami::Result<Vec<_>>>()?;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].as_text(), Some("one"));
        assert_eq!(frames[1].as_text(), Some("two"));
        assert_eq!(frames[2].as_bytes(), Some(&b"three"[..]));
    }
    client.shutdown()
}

#[test]
fn websocket_rejection_carries_the_close_code() -> kagami::Result<()> {
    fn reject(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
        match scope.kind() {
            ScopeKind::Lifespan => lifespan(receive, send),
            ScopeKind::WebSocket => Box::new(receive.recv().map(move |(_connect, _receive)| {
                send.send(AppMessage::WebSocketClose {
                    code: 4403,
                    reason: "forbidden".to_owned(),
                });
            })),
            ScopeKind::Http => unsupported(),
        }
    }

    let mut client = Client::new(reject)?;
    let err = client.websocket("/ws").connect().unwrap_err();
    assert_eq!(err.close_code(), Some(4403));
    client.shutdown()
}

#[test]
fn websocket_scope_carries_headers_and_cookies() -> kagami::Result<()> {
    fn reflect_ws(scope: Scope, receive: Receiver, send: Sender) -> AppFuture {
        match scope.kind() {
            ScopeKind::Lifespan => lifespan(receive, send),
            ScopeKind::WebSocket => Box::new(receive.recv().map(move |(_connect, _receive)| {
                send.send(AppMessage::WebSocketAccept);
                let headers = scope
                    .headers()
                    .iter()
                    .map(|(name, value)| {
                        format!(
                            "{}={}",
                            String::from_utf8_lossy(name),
                            String::from_utf8_lossy(value)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("&");
                send.send(AppMessage::send_text(headers));
            })),
            ScopeKind::Http => unsupported(),
        }
    }

    let mut client = Client::new(reflect_ws)?;
    client.set_cookie("session", "abc");
    {
        let mut session = client
            .websocket("/ws")
            .header("X-Token", "secret")
            .connect()?;
        let reflected = session.receive_text()?;
        assert!(reflected.contains("x-token=secret"));
        assert!(reflected.contains("host=localhost"));
        assert!(reflected.contains("cookie=session=abc"));
    }
    client.shutdown()
}
