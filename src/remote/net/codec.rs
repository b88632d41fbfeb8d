use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{Error, ErrorKind};
use tokio_util::codec::{Decoder, Encoder};

const LENGTH_PREFIX_BYTES: usize = 4;

/// Length-prefixed framing: a big-endian `u32` length followed by that many
/// payload bytes. Frames above the configured maximum are rejected so a
/// corrupt prefix cannot make the reader allocate unbounded memory.
pub struct FrameCodec {
    max_frame_bytes: usize,
}

impl FrameCodec {
    pub fn new(max_frame_bytes: usize) -> FrameCodec {
        FrameCodec { max_frame_bytes }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Error> {
        if item.len() > self.max_frame_bytes {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "frame of {} bytes exceeds maximum of {}",
                    item.len(),
                    self.max_frame_bytes
                ),
            ));
        }

        dst.reserve(LENGTH_PREFIX_BYTES + item.len());
        dst.put_u32(item.len() as u32);
        dst.put_slice(&item);

        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Vec<u8>;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Vec<u8>>, Error> {
        if src.len() < LENGTH_PREFIX_BYTES {
            return Ok(None);
        }

        let len = BigEndian::read_u32(src.as_ref()) as usize;
        if len > self.max_frame_bytes {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!(
                    "peer announced frame of {} bytes, maximum is {}",
                    len, self.max_frame_bytes
                ),
            ));
        }

        if src.len() - LENGTH_PREFIX_BYTES < len {
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_BYTES);
        let frame = src.split_to(len);
        Ok(Some(frame.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_round_trip() {
        let mut codec = FrameCodec::new(1024);
        let mut buffer = BytesMut::new();

        codec
            .encode(Bytes::from_static(b"first"), &mut buffer)
            .unwrap();
        codec
            .encode(Bytes::from_static(b"second"), &mut buffer)
            .unwrap();

        assert_eq!(codec.decode(&mut buffer).unwrap(), Some(b"first".to_vec()));
        assert_eq!(codec.decode(&mut buffer).unwrap(), Some(b"second".to_vec()));
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
    }

    #[test]
    fn partial_frames_wait_for_more_input() {
        let mut codec = FrameCodec::new(1024);
        let mut buffer = BytesMut::new();
        buffer.put_u32(8);
        buffer.put_slice(b"1234");

        assert_eq!(codec.decode(&mut buffer).unwrap(), None);

        buffer.put_slice(b"5678");
        assert_eq!(codec.decode(&mut buffer).unwrap(), Some(b"12345678".to_vec()));
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let mut codec = FrameCodec::new(16);
        let mut buffer = BytesMut::new();
        buffer.put_u32(1024);
        buffer.put_slice(&[0u8; 32]);

        assert!(codec.decode(&mut buffer).is_err());
    }
}
