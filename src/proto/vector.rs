//! Vector-index protocol messages: INSERT, SEARCH, DELETE, MATCH_RESULT.

use super::{encode, parse, MsgType, ProtocolError};
use crate::wire::FrameBuf;

/// Serialize an INSERT request: `[id, [f32; D]]`.
pub fn write_insert(buf: &mut FrameBuf, id: u64, vector: &[f32]) -> Result<(), ProtocolError> {
    encode(buf, MsgType::Insert, &(id, vector))
}

/// Parse an INSERT request into (id, vector).
pub fn read_insert(buf: &FrameBuf) -> Result<(u64, Vec<f32>), ProtocolError> {
    parse(buf)
}

/// Serialize a SEARCH request: `[[f32; D], k]`.
pub fn write_search(buf: &mut FrameBuf, vector: &[f32], k: u32) -> Result<(), ProtocolError> {
    encode(buf, MsgType::Search, &(vector, k))
}

/// Parse a SEARCH request into (vector, k).
pub fn read_search(buf: &FrameBuf) -> Result<(Vec<f32>, u32), ProtocolError> {
    parse(buf)
}

/// Serialize a DELETE request: `[id]`.
pub fn write_delete(buf: &mut FrameBuf, id: u64) -> Result<(), ProtocolError> {
    encode(buf, MsgType::Delete, &(id,))
}

/// Parse a DELETE request.
pub fn read_delete(buf: &FrameBuf) -> Result<u64, ProtocolError> {
    let (id,): (u64,) = parse(buf)?;
    Ok(id)
}

/// Serialize a MATCH_RESULT response: `[[id, distance], ...]`,
/// order preserved from the index.
pub fn write_match_result(
    buf: &mut FrameBuf,
    matches: &[(u64, f32)],
) -> Result<(), ProtocolError> {
    encode(buf, MsgType::MatchResult, &matches)
}

/// Parse a MATCH_RESULT response.
pub fn read_match_result(buf: &FrameBuf) -> Result<Vec<(u64, f32)>, ProtocolError> {
    parse(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_round_trip() {
        let mut buf = FrameBuf::new();
        write_insert(&mut buf, 42, &[1.0, 0.0, 0.5, -2.5]).unwrap();
        assert_eq!(buf.kind, MsgType::Insert as u8);

        let (id, vector) = read_insert(&buf).unwrap();
        assert_eq!(id, 42);
        assert_eq!(vector, vec![1.0, 0.0, 0.5, -2.5]);
    }

    #[test]
    fn test_insert_wire_shape() {
        let mut buf = FrameBuf::new();
        write_insert(&mut buf, 1, &[0.0]).unwrap();
        let payload = buf.payload();
        // [1, [0.0]] -> 0x82 (array of 2), 0x01, 0x81 (array of 1), 0xfa (float32)
        assert_eq!(payload[0], 0x82);
        assert_eq!(payload[1], 0x01);
        assert_eq!(payload[2], 0x81);
        assert_eq!(payload[3], 0xFA);
    }

    #[test]
    fn test_insert_max_id() {
        let mut buf = FrameBuf::new();
        write_insert(&mut buf, u64::MAX, &[1.0]).unwrap();
        let (id, _) = read_insert(&buf).unwrap();
        assert_eq!(id, u64::MAX);
    }

    #[test]
    fn test_insert_accepts_float64_elements() {
        // A peer may encode the vector as CBOR float64; parsers narrow.
        let mut buf = FrameBuf::new();
        let wide: Vec<f64> = vec![1.5, -0.25];
        encode(&mut buf, MsgType::Insert, &(7u64, wide)).unwrap();

        let (id, vector) = read_insert(&buf).unwrap();
        assert_eq!(id, 7);
        assert_eq!(vector, vec![1.5f32, -0.25]);
    }

    #[test]
    fn test_insert_rejects_wrong_arity() {
        let mut buf = FrameBuf::new();
        encode(&mut buf, MsgType::Insert, &(7u64,)).unwrap();
        assert!(read_insert(&buf).is_err());
    }

    #[test]
    fn test_insert_rejects_non_numeric_elements() {
        let mut buf = FrameBuf::new();
        encode(&mut buf, MsgType::Insert, &(7u64, vec!["no"])).unwrap();
        assert!(read_insert(&buf).is_err());
    }

    #[test]
    fn test_search_round_trip() {
        let mut buf = FrameBuf::new();
        write_search(&mut buf, &[0.25, 0.75], 10).unwrap();
        assert_eq!(buf.kind, MsgType::Search as u8);

        let (vector, k) = read_search(&buf).unwrap();
        assert_eq!(vector, vec![0.25, 0.75]);
        assert_eq!(k, 10);
    }

    #[test]
    fn test_search_accepts_wide_k() {
        // k may arrive in any unsigned width up to what fits in u32.
        let mut buf = FrameBuf::new();
        encode(&mut buf, MsgType::Search, &(vec![1.0f32], 1000u64)).unwrap();
        let (_, k) = read_search(&buf).unwrap();
        assert_eq!(k, 1000);
    }

    #[test]
    fn test_delete_round_trip() {
        let mut buf = FrameBuf::new();
        write_delete(&mut buf, 42).unwrap();
        assert_eq!(buf.kind, MsgType::Delete as u8);
        assert_eq!(read_delete(&buf).unwrap(), 42);
        // [42] -> 0x81 (definite array of 1)
        assert_eq!(buf.payload()[0], 0x81);
    }

    #[test]
    fn test_match_result_round_trip() {
        let matches = vec![(42u64, 0.0f32), (7, 0.5), (u64::MAX, 1.25)];
        let mut buf = FrameBuf::new();
        write_match_result(&mut buf, &matches).unwrap();
        assert_eq!(buf.kind, MsgType::MatchResult as u8);

        assert_eq!(read_match_result(&buf).unwrap(), matches);
    }

    #[test]
    fn test_match_result_empty() {
        let mut buf = FrameBuf::new();
        write_match_result(&mut buf, &[]).unwrap();
        assert!(read_match_result(&buf).unwrap().is_empty());
        // 0x80 = definite-length array of 0
        assert_eq!(buf.payload(), &[0x80]);
    }
}
