// ============================================================================
// Wire Frames
// Transport-agnostic message frames exchanged with driver clients
// ============================================================================

use crate::domain::AssignmentNotice;

/// One framed message on a driver connection.
///
/// Any message-oriented transport (WebSocket, a framed TCP codec) adapts to
/// a `Sink<Frame>` for the writer side and a `Stream<Item = Result<Frame, _>>`
/// for the reader side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl Frame {
    /// Encode an assignment notice as a text frame
    pub fn notice(notice: &AssignmentNotice) -> Result<Self, serde_json::Error> {
        serde_json::to_string(notice).map(Frame::Text)
    }

    /// Payload size in bytes, used for the inbound frame limit
    pub fn payload_len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Ping(data) | Frame::Pong(data) => data.len(),
            Frame::Close => 0,
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Frame::Close)
    }
}
