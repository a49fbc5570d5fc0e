//! Line-oriented transport over a byte stream
//!
//! Each posted frame is written as one line of JSON followed by `\n`.

use std::io::Write;

use tracing::debug;

use super::{OutboundFrame, PostedFrame, Transport};
use crate::error::BridgeError;

/// Writes frames as JSON lines to any writer (stdout in the `cb` binary)
pub struct StdioTransport<W: Write> {
    writer: W,
}

impl<W: Write> StdioTransport<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Transport for StdioTransport<W> {
    fn post(&mut self, frame: OutboundFrame, target_origin: &str) -> Result<(), BridgeError> {
        let posted = PostedFrame {
            target_origin: target_origin.to_string(),
            message: frame,
        };
        let line = serde_json::to_string(&posted).map_err(BridgeError::Encode)?;
        debug!(%target_origin, bytes = line.len(), "StdioTransport::post: writing frame");

        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_writes_one_line_per_frame() {
        let mut transport = StdioTransport::new(Vec::new());
        transport
            .post(OutboundFrame::Structured(json!({"action": "a"})), "https://host")
            .unwrap();
        transport
            .post(OutboundFrame::Text(r#"{"action":"b"}"#.to_string()), "https://host")
            .unwrap();

        let output = String::from_utf8(transport.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"target-origin":"https://host","message":{"action":"a"}}"#
        );

        let second: PostedFrame = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.message, OutboundFrame::Text(r#"{"action":"b"}"#.to_string()));
    }
}
