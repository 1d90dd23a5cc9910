//! Encoding of `multipart/form-data` request bodies.

use {bytes::Bytes, rand::Rng};

/// A single field of a multipart form body.
#[derive(Debug, Clone)]
pub struct Part {
    data: Bytes,
    filename: Option<String>,
    content_type: Option<String>,
}

impl Part {
    /// Creates a part carrying a text value.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(value.into()),
            filename: None,
            content_type: None,
        }
    }

    /// Creates a part carrying raw bytes.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            filename: None,
            content_type: None,
        }
    }

    /// Attaches a file name to this part.
    pub fn filename(self, filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..self
        }
    }

    /// Attaches a content type to this part.
    pub fn content_type(self, content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            ..self
        }
    }
}

/// Encodes the specified fields into a multipart body, returning the body
/// and the `Content-Type` value carrying the boundary.
pub(crate) fn encode(parts: &[(String, Part)]) -> (Vec<u8>, String) {
    let boundary = boundary();

    let mut body = Vec::new();
    for (name, part) in parts {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
                boundary, name
            )
            .as_bytes(),
        );
        if let Some(ref filename) = part.filename {
            body.extend_from_slice(format!("; filename=\"{}\"", filename).as_bytes());
        }
        if let Some(ref content_type) = part.content_type {
            body.extend_from_slice(format!("\r\nContent-Type: {}", content_type).as_bytes());
        }
        body.extend_from_slice(b"\r\n\r\n");
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    let content_type = format!("multipart/form-data; boundary={}", boundary);
    (body, content_type)
}

fn boundary() -> String {
    format!("{:032x}", rand::thread_rng().gen::<u128>())
}
