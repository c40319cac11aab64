//! Tokio codec for the guider's line-delimited JSON stream

use bytes::{BufMut, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder, LinesCodec};

use crate::error::ProtocolError;
use crate::event::GuiderEvent;
use crate::rpc::{RpcRequest, RpcResponse};

/// Maximum accepted line length.
///
/// Star-image responses are the largest messages the guider sends
/// (base64 pixel data), so the limit is generous.
pub const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// One decoded line from the guider
#[derive(Debug, Clone, PartialEq)]
pub enum GuiderMessage {
    /// Response to a request we sent
    Response(RpcResponse),
    /// Unsolicited event notification
    Event(GuiderEvent),
    /// A line that is not valid protocol JSON; kept for diagnostics
    Malformed { line: String, reason: String },
}

impl GuiderMessage {
    /// Classify a single line of text
    pub fn parse(line: &str) -> GuiderMessage {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => return Self::malformed(line, e.to_string()),
        };

        if value.get("Event").is_some() {
            match serde_json::from_value(value) {
                Ok(event) => GuiderMessage::Event(event),
                Err(e) => Self::malformed(line, e.to_string()),
            }
        } else if value.get("id").is_some() {
            match serde_json::from_value(value) {
                Ok(response) => GuiderMessage::Response(response),
                Err(e) => Self::malformed(line, e.to_string()),
            }
        } else {
            Self::malformed(line, "neither an event nor a response".to_string())
        }
    }

    fn malformed(line: &str, reason: String) -> GuiderMessage {
        tracing::trace!("Malformed guider line: {}", reason);
        GuiderMessage::Malformed {
            line: line.to_string(),
            reason,
        }
    }
}

/// Codec for the guider connection.
///
/// Decodes lines into [`GuiderMessage`]s and encodes [`RpcRequest`]s as
/// CRLF-terminated JSON. Undecodable lines surface as
/// [`GuiderMessage::Malformed`] so one bad line does not end the stream;
/// only framing failures are errors.
#[derive(Debug)]
pub struct GuiderCodec {
    lines: LinesCodec,
}

impl GuiderCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        }
    }
}

impl Default for GuiderCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for GuiderCodec {
    type Item = GuiderMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.lines.decode(src)? {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    return Ok(Some(GuiderMessage::parse(line)));
                }
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.lines.decode_eof(src)? {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    return Ok(Some(GuiderMessage::parse(line)));
                }
                None => return Ok(None),
            }
        }
    }
}

impl Encoder<RpcRequest> for GuiderCodec {
    type Error = ProtocolError;

    fn encode(&mut self, request: RpcRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&request)?;
        dst.reserve(json.len() + 2);
        dst.put_slice(&json);
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Servers (and test doubles) write responses with the same framing
impl Encoder<RpcResponse> for GuiderCodec {
    type Error = ProtocolError;

    fn encode(&mut self, response: RpcResponse, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&response)?;
        dst.reserve(json.len() + 2);
        dst.put_slice(&json);
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcErrorKind;
    use serde_json::json;

    #[test]
    fn test_encode_request() {
        let mut codec = GuiderCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(RpcRequest::new(1, "loop", None), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"{\"method\":\"loop\",\"id\":1}\r\n");
    }

    #[test]
    fn test_decode_interleaved_event_and_response() {
        let mut codec = GuiderCodec::new();
        let mut buf = BytesMut::from(
            "{\"Event\":\"AppState\",\"State\":\"Stopped\"}\r\n{\"jsonrpc\":\"2.0\",\"result\":\"Stopped\",\"id\":9}\r\n",
        );

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            first,
            GuiderMessage::Event(GuiderEvent::AppState {
                state: "Stopped".to_string()
            })
        );

        let second = codec.decode(&mut buf).unwrap().unwrap();
        match second {
            GuiderMessage::Response(response) => {
                assert_eq!(response.id, 9);
                assert_eq!(response.into_result().unwrap(), json!("Stopped"));
            }
            other => panic!("Expected response, got {:?}", other),
        }

        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_partial_line() {
        let mut codec = GuiderCodec::new();
        let mut buf = BytesMut::from("{\"jsonrpc\":\"2.0\",\"error\":{\"code\":1,");

        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\"message\":\"no star selected\"},\"id\":2}\n");
        match codec.decode(&mut buf).unwrap().unwrap() {
            GuiderMessage::Response(response) => {
                let err = response.into_result().unwrap_err();
                assert_eq!(err.kind, RpcErrorKind::NoStarSelected);
            }
            other => panic!("Expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_skips_blank_lines_and_flags_garbage() {
        let mut codec = GuiderCodec::new();
        let mut buf = BytesMut::from("\r\n\r\nnot json\r\n");

        match codec.decode(&mut buf).unwrap().unwrap() {
            GuiderMessage::Malformed { line, .. } => assert_eq!(line, "not json"),
            other => panic!("Expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_eof_without_newline() {
        let mut codec = GuiderCodec::new();
        let mut buf = BytesMut::from("{\"Event\":\"Resumed\"}");

        assert!(codec.decode(&mut buf).unwrap().is_none());
        let message = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(message, GuiderMessage::Event(GuiderEvent::Resumed));
    }
}
