//! Length-prefixed, type-tagged binary framing.
//!
//! Frame layout: `[u32 LE body length][u8 message tag][bincode body]`.
//! The length covers the tag byte plus the body, so a reader can skip
//! unknown message kinds wholesale.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("Frame truncated ({len} bytes)")]
    Truncated { len: usize },
    #[error("Unknown message tag: {0:#04x}")]
    UnknownTag(u8),
    #[error("Frame body failed to decode: {0}")]
    BadBody(String),
    #[error("Frame declares {declared} bytes but {available} are available")]
    LengthMismatch { declared: usize, available: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
    NeighborsRequest,
    NeighborsResponse,
    ScanVertexRequest,
    ScanEdgeRequest,
    ScanResponse,
    LookupRequest,
    LookupResponse,
}

impl MsgKind {
    fn tag(self) -> u8 {
        match self {
            MsgKind::NeighborsRequest => 0x01,
            MsgKind::NeighborsResponse => 0x02,
            MsgKind::ScanVertexRequest => 0x03,
            MsgKind::ScanEdgeRequest => 0x04,
            MsgKind::ScanResponse => 0x05,
            MsgKind::LookupRequest => 0x06,
            MsgKind::LookupResponse => 0x07,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0x01 => MsgKind::NeighborsRequest,
            0x02 => MsgKind::NeighborsResponse,
            0x03 => MsgKind::ScanVertexRequest,
            0x04 => MsgKind::ScanEdgeRequest,
            0x05 => MsgKind::ScanResponse,
            0x06 => MsgKind::LookupRequest,
            0x07 => MsgKind::LookupResponse,
            _ => return None,
        })
    }
}

/// Encode one message into a self-delimiting frame.
pub fn encode_frame<T: Serialize>(kind: MsgKind, message: &T) -> Result<Vec<u8>, WireError> {
    let body = bincode::serialize(message).map_err(|e| WireError::BadBody(e.to_string()))?;
    let mut frame = Vec::with_capacity(4 + 1 + body.len());
    frame.extend_from_slice(&((body.len() + 1) as u32).to_le_bytes());
    frame.push(kind.tag());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Split one frame off the front of `bytes`: returns the kind, the body,
/// and the remainder (frames may be concatenated back to back).
pub fn split_frame(bytes: &[u8]) -> Result<(MsgKind, &[u8], &[u8]), WireError> {
    if bytes.len() < 5 {
        return Err(WireError::Truncated { len: bytes.len() });
    }
    let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if declared == 0 {
        return Err(WireError::Truncated { len: bytes.len() });
    }
    let available = bytes.len() - 4;
    if declared > available {
        return Err(WireError::LengthMismatch { declared, available });
    }
    let kind = MsgKind::from_tag(bytes[4]).ok_or(WireError::UnknownTag(bytes[4]))?;
    let body = &bytes[5..4 + declared];
    let rest = &bytes[4 + declared..];
    Ok((kind, body, rest))
}

/// Decode the body produced by [`split_frame`].
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, WireError> {
    bincode::deserialize(body).map_err(|e| WireError::BadBody(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{NeighborsRequest, RequestCommon, TraverseSpec};
    use std::collections::BTreeMap;

    fn request() -> NeighborsRequest {
        let mut parts = BTreeMap::new();
        parts.insert(1, vec![b"Tim Duncan".to_vec()]);
        NeighborsRequest {
            space_id: 1,
            parts,
            traverse_spec: TraverseSpec { edge_types: vec![101], ..Default::default() },
            common: RequestCommon { session_id: 7, plan_id: 9, concurrently: false },
        }
    }

    #[test]
    fn frame_round_trip() {
        let req = request();
        let frame = encode_frame(MsgKind::NeighborsRequest, &req).expect("encode");
        let (kind, body, rest) = split_frame(&frame).expect("split");
        assert_eq!(kind, MsgKind::NeighborsRequest);
        assert!(rest.is_empty());
        let decoded: NeighborsRequest = decode_body(body).expect("decode");
        assert_eq!(decoded.space_id, 1);
        assert_eq!(decoded.common.plan_id, 9);
        assert_eq!(decoded.parts[&1], vec![b"Tim Duncan".to_vec()]);
    }

    #[test]
    fn concatenated_frames() {
        let req = request();
        let mut stream = encode_frame(MsgKind::NeighborsRequest, &req).expect("encode");
        stream.extend(encode_frame(MsgKind::NeighborsRequest, &req).expect("encode"));
        let (_, _, rest) = split_frame(&stream).expect("first");
        let (kind, _, rest2) = split_frame(rest).expect("second");
        assert_eq!(kind, MsgKind::NeighborsRequest);
        assert!(rest2.is_empty());
    }

    #[test]
    fn truncated_frame_fails() {
        let req = request();
        let frame = encode_frame(MsgKind::NeighborsRequest, &req).expect("encode");
        assert!(matches!(
            split_frame(&frame[..frame.len() - 1]),
            Err(WireError::LengthMismatch { .. })
        ));
        assert!(matches!(split_frame(&frame[..3]), Err(WireError::Truncated { .. })));
    }

    #[test]
    fn unknown_tag_fails() {
        let mut frame = vec![1, 0, 0, 0, 0x7f];
        frame.extend_from_slice(&[]);
        assert_eq!(split_frame(&frame), Err(WireError::UnknownTag(0x7f)));
    }
}
