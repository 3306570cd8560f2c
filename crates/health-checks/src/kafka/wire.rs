//! Minimal Kafka wire codec for the Metadata API (key 3, version 1).
//!
//! Requests and responses are framed by a big-endian `i32` size prefix.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Metadata API key
pub const METADATA_API_KEY: i16 = 3;
/// Metadata API version spoken by the probe
pub const METADATA_API_VERSION: i16 = 1;
/// Upper bound on an accepted response frame
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Decoding failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Frame ended before a field was complete
    #[error("truncated response: needed {needed} bytes at offset {offset}")]
    Truncated {
        /// Offset of the incomplete field
        offset: usize,
        /// Bytes the field required
        needed: usize,
    },

    /// A length prefix was negative where that is not allowed
    #[error("invalid length {0}")]
    InvalidLength(i32),

    /// A frame size prefix was out of range
    #[error("invalid frame size {0}")]
    InvalidFrameSize(i32),

    /// A string was not UTF-8
    #[error("invalid utf-8 in string field")]
    InvalidString,
}

/// Broker entry of a metadata response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broker {
    /// Broker id
    pub node_id: i32,
    /// Advertised host
    pub host: String,
    /// Advertised port
    pub port: i32,
    /// Rack, if configured
    pub rack: Option<String>,
}

/// Topic entry of a metadata response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// Topic-level error code
    pub error_code: i16,
    /// Topic name
    pub name: String,
    /// Internal topic such as `__consumer_offsets`
    pub is_internal: bool,
    /// Number of partitions
    pub partitions: usize,
}

/// Decoded metadata response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResponse {
    /// Correlation id echoed by the broker
    pub correlation_id: i32,
    /// Live brokers
    pub brokers: Vec<Broker>,
    /// Controller broker id, `-1` if none
    pub controller_id: i32,
    /// Topics
    pub topics: Vec<Topic>,
}

/// Encode a size-prefixed Metadata v1 request for all topics
pub fn encode_metadata_request(correlation_id: i32, client_id: &str) -> Bytes {
    let mut body = BytesMut::with_capacity(16 + client_id.len());
    body.put_i16(METADATA_API_KEY);
    body.put_i16(METADATA_API_VERSION);
    body.put_i32(correlation_id);
    body.put_i16(client_id.len() as i16);
    body.extend_from_slice(client_id.as_bytes());
    // null topic array: every topic
    body.put_i32(-1);

    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.put_i32(body.len() as i32);
    frame.extend_from_slice(&body);
    frame.freeze()
}

/// Split one complete size-prefixed frame off the front of `buffer`.
///
/// Returns `None` until the whole frame has arrived.
pub fn try_parse_frame(buffer: &mut BytesMut) -> Result<Option<Bytes>, WireError> {
    if buffer.len() < 4 {
        return Ok(None);
    }
    let size = i32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
    if size < 4 || size as usize > MAX_FRAME_SIZE {
        return Err(WireError::InvalidFrameSize(size));
    }
    let len = size as usize;
    if buffer.len() < 4 + len {
        return Ok(None);
    }

    buffer.advance(4);
    Ok(Some(buffer.split_to(len).freeze()))
}

struct Reader<'a> {
    buf: &'a [u8],
    total: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            total: buf.len(),
        }
    }

    fn need(&self, n: usize) -> Result<(), WireError> {
        if self.buf.remaining() < n {
            return Err(WireError::Truncated {
                offset: self.total - self.buf.remaining(),
                needed: n,
            });
        }
        Ok(())
    }

    fn skip(&mut self, n: usize) -> Result<(), WireError> {
        self.need(n)?;
        self.buf.advance(n);
        Ok(())
    }

    fn i8(&mut self) -> Result<i8, WireError> {
        self.need(1)?;
        Ok(self.buf.get_i8())
    }

    fn i16(&mut self) -> Result<i16, WireError> {
        self.need(2)?;
        Ok(self.buf.get_i16())
    }

    fn i32(&mut self) -> Result<i32, WireError> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    fn nullable_string(&mut self) -> Result<Option<String>, WireError> {
        let len = self.i16()?;
        if len < 0 {
            return Ok(None);
        }
        let len = len as usize;
        self.need(len)?;
        let value = std::str::from_utf8(&self.buf[..len])
            .map(str::to_string)
            .map_err(|_| WireError::InvalidString)?;
        self.buf.advance(len);
        Ok(Some(value))
    }

    fn string(&mut self) -> Result<String, WireError> {
        self.nullable_string().map(Option::unwrap_or_default)
    }

    fn array_len(&mut self) -> Result<usize, WireError> {
        match self.i32()? {
            -1 => Ok(0),
            n if n < 0 => Err(WireError::InvalidLength(n)),
            n => Ok(n as usize),
        }
    }
}

/// Decode a Metadata v1 response body (without the size prefix)
pub fn decode_metadata_response(body: &[u8]) -> Result<MetadataResponse, WireError> {
    let mut r = Reader::new(body);
    let correlation_id = r.i32()?;

    let broker_count = r.array_len()?;
    let mut brokers = Vec::with_capacity(broker_count.min(1024));
    for _ in 0..broker_count {
        brokers.push(Broker {
            node_id: r.i32()?,
            host: r.string()?,
            port: r.i32()?,
            rack: r.nullable_string()?,
        });
    }

    let controller_id = r.i32()?;

    let topic_count = r.array_len()?;
    let mut topics = Vec::with_capacity(topic_count.min(1024));
    for _ in 0..topic_count {
        let error_code = r.i16()?;
        let name = r.string()?;
        let is_internal = r.i8()? != 0;
        let partitions = r.array_len()?;
        for _ in 0..partitions {
            // error_code, partition_index, leader_id
            r.skip(2 + 4 + 4)?;
            let replicas = r.array_len()?;
            r.skip(replicas * 4)?;
            let isr = r.array_len()?;
            r.skip(isr * 4)?;
        }
        topics.push(Topic {
            error_code,
            name,
            is_internal,
            partitions,
        });
    }

    Ok(MetadataResponse {
        correlation_id,
        brokers,
        controller_id,
        topics,
    })
}

/// Encode a Metadata v1 response body, used by tests and fakes
pub fn encode_metadata_response(response: &MetadataResponse) -> Bytes {
    fn string(out: &mut BytesMut, s: Option<&str>) {
        match s {
            Some(s) => {
                out.put_i16(s.len() as i16);
                out.extend_from_slice(s.as_bytes());
            }
            None => out.put_i16(-1),
        }
    }

    let mut out = BytesMut::new();
    out.put_i32(response.correlation_id);
    out.put_i32(response.brokers.len() as i32);
    for b in &response.brokers {
        out.put_i32(b.node_id);
        string(&mut out, Some(&b.host));
        out.put_i32(b.port);
        string(&mut out, b.rack.as_deref());
    }
    out.put_i32(response.controller_id);
    out.put_i32(response.topics.len() as i32);
    for t in &response.topics {
        out.put_i16(t.error_code);
        string(&mut out, Some(&t.name));
        out.put_u8(u8::from(t.is_internal));
        out.put_i32(t.partitions as i32);
        for p in 0..t.partitions as i32 {
            out.put_i16(0);
            out.put_i32(p);
            out.put_i32(0);
            // one replica, one isr
            out.put_i32(1);
            out.put_i32(0);
            out.put_i32(1);
            out.put_i32(0);
        }
    }
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout() {
        let frame = encode_metadata_request(7, "fw");
        // size, key, version, correlation, client id, topics
        assert_eq!(
            frame.to_vec(),
            vec![
                0, 0, 0, 16, // size
                0, 3, // api key
                0, 1, // api version
                0, 0, 0, 7, // correlation id
                0, 2, b'f', b'w', // client id
                0xff, 0xff, 0xff, 0xff, // null topics
            ]
        );
    }

    #[test]
    fn test_decode_response() {
        let response = MetadataResponse {
            correlation_id: 7,
            brokers: vec![
                Broker {
                    node_id: 1,
                    host: "kafka-1".into(),
                    port: 9092,
                    rack: None,
                },
                Broker {
                    node_id: 2,
                    host: "kafka-2".into(),
                    port: 9092,
                    rack: Some("eu-1a".into()),
                },
            ],
            controller_id: 2,
            topics: vec![Topic {
                error_code: 0,
                name: "analytics_events".into(),
                is_internal: false,
                partitions: 3,
            }],
        };
        let body = encode_metadata_response(&response);
        assert_eq!(decode_metadata_response(&body).unwrap(), response);
    }

    #[test]
    fn test_frames_split_only_when_complete() {
        let body = encode_metadata_response(&MetadataResponse {
            correlation_id: 9,
            brokers: Vec::new(),
            controller_id: -1,
            topics: Vec::new(),
        });
        let mut framed = BytesMut::new();
        framed.put_i32(body.len() as i32);
        framed.extend_from_slice(&body);

        let mut buffer = BytesMut::from(&framed[..6]);
        assert_eq!(try_parse_frame(&mut buffer).unwrap(), None);
        buffer.extend_from_slice(&framed[6..]);
        buffer.extend_from_slice(&[0, 0]);

        let frame = try_parse_frame(&mut buffer).unwrap().unwrap();
        assert_eq!(frame, body);
        assert_eq!(&buffer[..], &[0, 0]);
        assert_eq!(decode_metadata_response(&frame).unwrap().correlation_id, 9);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buffer = BytesMut::new();
        buffer.put_i32(i32::MAX);
        assert_eq!(
            try_parse_frame(&mut buffer).unwrap_err(),
            WireError::InvalidFrameSize(i32::MAX)
        );
    }

    #[test]
    fn test_truncated_response() {
        let err = decode_metadata_response(&[0, 0, 0, 7, 0, 0]).unwrap_err();
        assert!(matches!(err, WireError::Truncated { offset: 4, .. }));
    }
}
