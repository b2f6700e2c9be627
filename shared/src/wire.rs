//! Byte-level wire format for the streamed visualization.
//!
//! The server answers a data-channel request with a chunked
//! `multipart/x-mixed-replace` response. Every later transmission is one
//! or more transfer chunks, each wrapping a fixed textual part header,
//! the raw payload, and the multipart boundary footer. Payloads carry a
//! `CLRS` preamble followed by binary records laid out in little-endian
//! 16-bit units: `[r, g, b, count, x0, y0, x1, y1, ...]`.

use crate::Point;
use thiserror::Error;

/// Multipart boundary token, fixed for viewer compatibility.
pub const BOUNDARY: &str = "loldongz101";

/// Part header written at the start of every transfer chunk. The bare
/// `\n\n` separator (no carriage returns) is part of the legacy framing.
pub const PART_HEADER: &str = "Content-type: text/plain; charset=x-user-defined\n\n";

/// Boundary footer closing every part.
pub const PART_FOOTER: &str = "--loldongz101\r\n";

/// Magic prefix opening each amalgamation transmission.
pub const STREAM_MAGIC: &[u8; 4] = b"CLRS";

/// Record header size in 16-bit units: three color channels plus the
/// point count.
pub const RECORD_HEADER_UNITS: usize = 4;

/// Hard ceiling on points per record; the count travels in one 16-bit
/// field.
pub const MAX_RECORD_POINTS: usize = u16::MAX as usize;

/// Longest run whose encoded record fits in `capacity` bytes.
pub fn max_points_in(capacity: usize) -> usize {
    ((capacity / 2).saturating_sub(RECORD_HEADER_UNITS) / 2).min(MAX_RECORD_POINTS)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("run of {len} points exceeds the limit of {max}")]
    RunTooLong { len: usize, max: usize },
    #[error("record truncated: need {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("record of {0} bytes is not a whole number of 16-bit units")]
    Misaligned(usize),
}

/// One decoded visible run with its display color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub color: [u16; 3],
    pub points: Vec<Point>,
}

/// Encodes one run into the fixed record layout. Runs longer than
/// `max_points` are rejected outright, never truncated.
///
/// Coordinates are emitted as wrapping 16-bit casts; entry anchors that
/// fall outside the view rectangle wrap the way the legacy stream did.
pub fn encode_record(
    color: [u16; 3],
    points: &[Point],
    max_points: usize,
) -> Result<Vec<u8>, WireError> {
    let max = max_points.min(MAX_RECORD_POINTS);
    if points.len() > max {
        return Err(WireError::RunTooLong {
            len: points.len(),
            max,
        });
    }
    let mut out = Vec::with_capacity((RECORD_HEADER_UNITS + points.len() * 2) * 2);
    for channel in color {
        out.extend_from_slice(&channel.to_le_bytes());
    }
    out.extend_from_slice(&(points.len() as u16).to_le_bytes());
    for point in points {
        out.extend_from_slice(&(point.x as u16).to_le_bytes());
        out.extend_from_slice(&(point.y as u16).to_le_bytes());
    }
    Ok(out)
}

/// Decodes one record from the front of `bytes`, returning it together
/// with the number of bytes consumed.
pub fn decode_record(bytes: &[u8]) -> Result<(Record, usize), WireError> {
    if bytes.len() % 2 != 0 {
        return Err(WireError::Misaligned(bytes.len()));
    }
    let header = RECORD_HEADER_UNITS * 2;
    if bytes.len() < header {
        return Err(WireError::Truncated {
            expected: header,
            actual: bytes.len(),
        });
    }
    let unit = |i: usize| u16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
    let color = [unit(0), unit(1), unit(2)];
    let count = unit(3) as usize;
    let expected = (RECORD_HEADER_UNITS + count * 2) * 2;
    if bytes.len() < expected {
        return Err(WireError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    let points = (0..count)
        .map(|i| {
            Point::new(
                i32::from(unit(RECORD_HEADER_UNITS + i * 2)),
                i32::from(unit(RECORD_HEADER_UNITS + i * 2 + 1)),
            )
        })
        .collect();
    Ok((Record { color, points }, expected))
}

/// Wraps a payload as one transfer chunk: hex length of the part, CRLF,
/// part header, payload, boundary footer, CRLF.
pub fn chunk(payload: &[u8]) -> Vec<u8> {
    let part_len = PART_HEADER.len() + payload.len() + PART_FOOTER.len();
    let mut out = format!("{part_len:x}\r\n").into_bytes();
    out.extend_from_slice(PART_HEADER.as_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(PART_FOOTER.as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

/// Extracts the payload from one part body (the bytes between the chunk
/// length line and its trailing CRLF): everything after the first blank
/// separator and before the boundary footer.
pub fn part_payload(part: &[u8]) -> Option<&[u8]> {
    let start = part.windows(2).position(|w| w == b"\n\n")? + 2;
    let body = &part[start..];
    body.strip_suffix(PART_FOOTER.as_bytes()).or(Some(body))
}

/// Response head establishing a data channel. The doubled Content-Type
/// is intentional; existing viewers expect the multipart line last.
pub const DATA_RESPONSE_HEAD: &str = "HTTP/1.1 200 OK\r\n\
Cache-Control: no-cache\r\n\
Expires: Thu, 01 Dec 1994 16:00:00 GMT\r\n\
Connection: Keep-Alive\r\n\
Content-Type: text/plain; charset=x-user-defined\r\n\
Transfer-Encoding: chunked\r\n\
Content-Type: multipart/x-mixed-replace;boundary=\"loldongz101\"\r\n\r\n";

/// First chunk on a fresh data channel: a part whose payload is the
/// channel's own identifier as decimal text, so the viewer can address
/// it from a control connection.
pub fn identity_chunk(id: u32) -> Vec<u8> {
    let part = format!("--{BOUNDARY}\r\nContent-type: text/plain\n\n{id}\n--{BOUNDARY}\r\n");
    let mut out = format!("{:x}\r\n", part.len()).into_bytes();
    out.extend_from_slice(part.as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

/// Trivial acknowledgement sent to a control connection.
pub fn control_ack() -> Vec<u8> {
    plain_response("200 OK", "keep-alive")
}

/// Answer to a control request whose parameters failed to parse or
/// validate.
pub fn bad_request() -> Vec<u8> {
    plain_response("400 Bad Request", "keep-alive")
}

/// Answer to an unknown path; the connection is closed afterwards.
pub fn not_found() -> Vec<u8> {
    plain_response("404 Not Found", "close")
}

/// Response head for the static control page.
pub fn html_head(content_length: usize) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Cache-Control: no-cache\r\n\
         Connection: keep-alive\r\n\
         Content-Length: {content_length}\r\n\
         Expires: Thu, 01 Dec 1994 16:00:00 GMT\r\n\
         Content-Type: text/html\r\n\r\n"
    )
    .into_bytes()
}

fn plain_response(status: &str, connection: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {status}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: {connection}\r\n\
         Expires: Thu, 01 Dec 1994 16:00:00 GMT\r\n\
         Content-Length: 3\r\n\
         Content-Type: text/plain\r\n\r\n0\r\n"
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrip_is_exact() {
        let points = vec![
            Point::new(0, 0),
            Point::new(12, 399),
            Point::new(65535, 1),
        ];
        let encoded = encode_record([255, 127, 0], &points, MAX_RECORD_POINTS).unwrap();
        let (record, consumed) = decode_record(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(record.color, [255, 127, 0]);
        assert_eq!(record.points, points);
    }

    #[test]
    fn record_layout_is_little_endian_units() {
        let encoded =
            encode_record([180, 0, 0], &[Point::new(258, 5)], MAX_RECORD_POINTS).unwrap();
        assert_eq!(
            encoded,
            vec![180, 0, 0, 0, 0, 0, 1, 0, 2, 1, 5, 0],
        );
    }

    #[test]
    fn record_capacity_derives_from_byte_capacity() {
        // header is 8 bytes, each point 4
        assert_eq!(max_points_in(16), 2);
        assert_eq!(max_points_in(8), 0);
        assert_eq!(max_points_in(7), 0);
        assert_eq!(max_points_in(usize::MAX), MAX_RECORD_POINTS);
    }

    #[test]
    fn oversize_run_is_rejected_not_truncated() {
        let points: Vec<Point> = (0..5).map(|i| Point::new(i, i)).collect();
        let err = encode_record([0, 0, 0], &points, 4).unwrap_err();
        assert_eq!(err, WireError::RunTooLong { len: 5, max: 4 });
    }

    #[test]
    fn truncated_record_is_detected() {
        let encoded =
            encode_record([1, 2, 3], &[Point::new(9, 9)], MAX_RECORD_POINTS).unwrap();
        let err = decode_record(&encoded[..encoded.len() - 2]).unwrap_err();
        assert_eq!(
            err,
            WireError::Truncated {
                expected: 12,
                actual: 10
            }
        );
    }

    #[test]
    fn records_decode_sequentially_from_a_stream() {
        let mut stream = encode_record([1, 1, 1], &[Point::new(1, 2)], 100).unwrap();
        stream.extend(encode_record([2, 2, 2], &[Point::new(3, 4), Point::new(5, 6)], 100).unwrap());
        let (first, used) = decode_record(&stream).unwrap();
        let (second, _) = decode_record(&stream[used..]).unwrap();
        assert_eq!(first.points.len(), 1);
        assert_eq!(second.color, [2, 2, 2]);
        assert_eq!(second.points, vec![Point::new(3, 4), Point::new(5, 6)]);
    }

    #[test]
    fn chunk_length_counts_header_and_footer() {
        let framed = chunk(b"abc");
        let expected_len = PART_HEADER.len() + 3 + PART_FOOTER.len();
        let head = format!("{expected_len:x}\r\n");
        assert!(framed.starts_with(head.as_bytes()));
        assert!(framed.ends_with(b"\r\n"));
    }

    #[test]
    fn chunk_payload_extracts_back() {
        let framed = chunk(b"CLRSxyz");
        let line_end = framed.windows(2).position(|w| w == b"\r\n").unwrap() + 2;
        let part = &framed[line_end..framed.len() - 2];
        assert_eq!(part_payload(part), Some(&b"CLRSxyz"[..]));
    }

    #[test]
    fn identity_chunk_carries_decimal_id() {
        let framed = identity_chunk(3);
        let text = String::from_utf8(framed).unwrap();
        assert!(text.contains("\n\n3\n"));
        assert!(text.contains(BOUNDARY));
    }

    #[test]
    fn plain_responses_have_fixed_body() {
        for response in [control_ack(), bad_request(), not_found()] {
            let text = String::from_utf8(response).unwrap();
            assert!(text.contains("Content-Length: 3"));
            assert!(text.ends_with("\r\n\r\n0\r\n"));
        }
        assert!(String::from_utf8(not_found()).unwrap().contains("Connection: close"));
    }
}
