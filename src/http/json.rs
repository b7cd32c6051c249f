//! JSON request bodies read through the streaming reader.
//!
//! The body is decoded chunk by chunk into a buffer sized from the declared
//! `Content-Length`, then exposed as a [`JsonReader`] instead of a typed value.

use axum::body::Body;
use axum::extract::FromRequest;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde_json::json;
use thiserror::Error;

use crate::codec::{DecodeError, MessageDecoder};
use crate::json::{JsonError, JsonReader};

/// Reader settings carried as a request extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonOptions {
    pub lenient: bool,
}

/// Failure to read or parse a JSON body. Always answered with `400`.
#[derive(Debug, Error)]
pub enum JsonRejection {
    #[error("failed to read request body: {0}")]
    Body(#[source] axum::Error),
    #[error("request body is not valid text: {0}")]
    Decode(#[from] DecodeError),
    #[error("request body ended after {received} of {declared} bytes")]
    Truncated { declared: usize, received: usize },
    #[error("malformed JSON: {0}")]
    Json(#[from] JsonError),
}

impl IntoResponse for JsonRejection {
    fn into_response(self) -> Response {
        let (line, column) = match &self {
            JsonRejection::Json(error) => (error.line(), error.column()),
            _ => (None, None),
        };
        tracing::debug!(error = %self, "Rejecting JSON body");
        let body = json!({
            "error": self.to_string(),
            "line": line,
            "column": column,
        });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// A request body ready to be read with [`JsonReader`].
#[derive(Debug, Clone)]
pub struct JsonBody {
    text: String,
    options: JsonOptions,
}

impl JsonBody {
    pub fn new(text: impl Into<String>, options: JsonOptions) -> Self {
        Self {
            text: text.into(),
            options,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// A fresh reader over the body, honouring the configured leniency.
    pub fn reader(&self) -> JsonReader<'_> {
        JsonReader::new(&self.text).lenient(self.options.lenient)
    }
}

impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = JsonRejection;

    async fn from_request(request: Request<Body>, _state: &S) -> Result<Self, Self::Rejection> {
        let options = request
            .extensions()
            .get::<JsonOptions>()
            .copied()
            .unwrap_or_default();
        let declared = content_length(request.headers());
        let text = read_text(request.into_body(), declared).await?;
        Ok(JsonBody { text, options })
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Decode the body as UTF-8, stopping as soon as `declared` bytes are in.
///
/// Without a declared length the whole stream is read first.
async fn read_text(body: Body, declared: Option<usize>) -> Result<String, JsonRejection> {
    let mut decoder = MessageDecoder::new();
    let mut chunks = body.into_data_stream();
    let mut received = 0usize;

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(JsonRejection::Body)?;
        received += chunk.len();
        decoder.feed(chunk);
        if let Some(len) = declared {
            if let Some(text) = decoder.read_chars(len)? {
                return Ok(text.to_owned());
            }
        }
    }

    let len = declared.unwrap_or(received);
    match decoder.read_chars(len)? {
        Some(text) => Ok(text.to_owned()),
        None => Err(JsonRejection::Truncated {
            declared: len,
            received,
        }),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn chunked(parts: &[&'static [u8]]) -> Body {
        let stream = futures_util::stream::iter(
            parts
                .iter()
                .map(|part| Ok::<_, std::io::Error>(Bytes::from_static(part)))
                .collect::<Vec<_>>(),
        );
        Body::from_stream(stream)
    }

    #[tokio::test]
    async fn reassembles_split_code_points() {
        let text = read_text(chunked(&[b"{\"k\":\"\xc3", b"\xa9\"}"]), Some(10))
            .await
            .unwrap();
        assert_eq!(text, "{\"k\":\"é\"}");
    }

    #[tokio::test]
    async fn reads_without_content_length() {
        let text = read_text(chunked(&[b"[1,", b"2]"]), None).await.unwrap();
        assert_eq!(text, "[1,2]");
    }

    #[tokio::test]
    async fn short_body_is_truncated() {
        let err = read_text(chunked(&[b"[1"]), Some(5)).await.unwrap_err();
        assert!(matches!(
            err,
            JsonRejection::Truncated {
                declared: 5,
                received: 2
            }
        ));
    }

    #[tokio::test]
    async fn invalid_utf8_is_rejected() {
        let err = read_text(chunked(&[b"[\xff]"]), Some(3)).await.unwrap_err();
        assert!(matches!(err, JsonRejection::Decode(_)));
    }

    #[tokio::test]
    async fn extractor_uses_request_options() {
        let mut request = Request::post("/")
            .header(header::CONTENT_LENGTH, "6")
            .body(Body::from("{a:1}\n"))
            .unwrap();
        request.extensions_mut().insert(JsonOptions { lenient: true });

        let body = JsonBody::from_request(request, &()).await.unwrap();
        let mut reader = body.reader();
        reader.begin_object().unwrap();
        assert_eq!(reader.next_name().unwrap(), "a");
    }

    #[test]
    fn json_errors_become_bad_request() {
        let body = JsonBody::new("{a:1}", JsonOptions::default());
        let mut reader = body.reader();
        reader.begin_object().unwrap();
        let rejection = JsonRejection::from(reader.next_name().unwrap_err());
        assert_eq!(rejection.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
