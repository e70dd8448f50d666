//! Stream framing for OSC over byte streams (TCP, serial, pipes)
//!
//! OSC 1.0 stream format:
//! ```text
//! ┌─────────────────────────────────────┐
//! │ packet size (u32 big-endian)        │
//! ├─────────────────────────────────────┤
//! │ packet bytes (message or bundle)    │
//! └─────────────────────────────────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{Read, Write};

use crate::error::{Result, TransportError};

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Prefix `packet` with its length
pub fn encode_frame(packet: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + packet.len());
    encode_frame_to(&mut buf, packet)?;
    Ok(buf.freeze())
}

pub fn encode_frame_to(buf: &mut BytesMut, packet: &[u8]) -> Result<()> {
    let len = u32::try_from(packet.len()).map_err(|_| TransportError::FrameTooLarge {
        size: packet.len(),
        max: u32::MAX as usize,
    })?;
    buf.put_u32(len);
    buf.put_slice(packet);
    Ok(())
}

/// Total frame size if `buf` starts with a complete frame
pub fn check_complete(buf: &[u8]) -> Option<usize> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return None;
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let total = LENGTH_PREFIX_SIZE + len;
    (buf.len() >= total).then_some(total)
}

/// Incremental decoder for a stream of length-prefixed packets
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(oscwire_core::DEFAULT_MAX_PACKET_SIZE)
    }
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Append bytes read from the stream
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Take the next complete packet, if one is buffered.
    ///
    /// An oversized length prefix is reported as soon as it is seen, before
    /// its payload arrives; the stream cannot be resynchronised after that.
    pub fn decode(&mut self) -> Result<Option<Bytes>> {
        if self.buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }
        if self.buf.len() < LENGTH_PREFIX_SIZE + len {
            return Ok(None);
        }

        self.buf.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    /// Bytes held that do not yet form a complete packet
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Write one framed packet to a blocking stream
pub fn write_frame<W: Write>(writer: &mut W, packet: &[u8]) -> Result<()> {
    let frame = encode_frame(packet)?;
    writer
        .write_all(&frame)
        .map_err(|e| TransportError::SendFailed(e.to_string()))
}

/// Read one framed packet from a blocking stream.
///
/// Returns `Ok(None)` on a clean end of stream between frames.
pub fn read_frame<R: Read>(reader: &mut R, max_frame_size: usize) -> Result<Option<Bytes>> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        match reader.read(&mut prefix[filled..])? {
            0 if filled == 0 => return Ok(None),
            0 => return Err(TransportError::ConnectionClosed),
            n => filled += n,
        }
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: max_frame_size,
        });
    }

    let mut packet = vec![0u8; len];
    reader.read_exact(&mut packet).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => TransportError::ConnectionClosed,
        _ => TransportError::Io(e),
    })?;
    Ok(Some(Bytes::from(packet)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        assert_eq!(&encode_frame(&[]).unwrap()[..], &[0, 0, 0, 0]);
        assert_eq!(&encode_frame(b"test").unwrap()[..], b"\0\0\0\x04test");

        let large = encode_frame(&[b'x'; 300]).unwrap();
        assert_eq!(large.len(), 304);
        assert_eq!(&large[..4], &[0, 0, 1, 44]);
    }

    #[test]
    fn test_check_complete() {
        let frame = encode_frame(b"abcdefgh").unwrap();
        assert_eq!(check_complete(&frame), Some(12));
        assert_eq!(check_complete(&frame[..3]), None);
        assert_eq!(check_complete(&frame[..9]), None);
    }

    #[test]
    fn test_decoder_split_reads() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_frame(b"first!!!").unwrap());
        stream.extend_from_slice(&encode_frame(b"2nd.").unwrap());

        let mut decoder = FrameDecoder::default();
        let mut frames = Vec::new();
        for chunk in stream.chunks(3) {
            decoder.extend(chunk);
            while let Some(frame) = decoder.decode().unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(frames, [&b"first!!!"[..], &b"2nd."[..]]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_rejects_oversized_prefix() {
        let mut decoder = FrameDecoder::new(16);
        decoder.extend(&[0, 0, 0, 17]);
        let err = decoder.decode().unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { size: 17, max: 16 }));
    }

    #[test]
    fn test_read_frame() {
        let mut data = Vec::new();
        write_frame(&mut data, b"one.").unwrap();
        write_frame(&mut data, b"").unwrap();

        let mut reader = &data[..];
        assert_eq!(read_frame(&mut reader, 64).unwrap().unwrap(), &b"one."[..]);
        assert_eq!(read_frame(&mut reader, 64).unwrap().unwrap(), &b""[..]);
        assert!(read_frame(&mut reader, 64).unwrap().is_none());

        let mut truncated: &[u8] = &[0, 0, 0, 8, 1, 2];
        assert!(matches!(
            read_frame(&mut truncated, 64),
            Err(TransportError::ConnectionClosed)
        ));
    }
}
