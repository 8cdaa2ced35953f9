//! Length-prefixed message framing.
//!
//! Every message is a 4-byte little-endian unsigned length followed by
//! exactly that many bytes of JSON. JSON carries nested maps, ordered
//! sequences, strings, integers, booleans and null without loss, which is
//! all the protocol needs.
//!
//! The channel is split into a [`FrameReader`] and a [`FrameWriter`] so the
//! two directions can live on different threads. Usage is strictly
//! half-duplex: one outstanding request per direction, no request ids.

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ChannelError;

/// Width of the length prefix in bytes.
pub const PREFIX_LEN: usize = 4;

// ---------------------------------------------------------------------------
// FrameReader
// ---------------------------------------------------------------------------

/// Reading half of a framed channel.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Block until a complete frame arrives and return its raw payload.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Closed`] if the stream ends before a full prefix or
    ///   a full body was read.
    /// - [`ChannelError::Io`] for any other read failure.
    pub fn read_frame(&mut self) -> Result<Vec<u8>, ChannelError> {
        let mut prefix = [0u8; PREFIX_LEN];
        read_exact_or_closed(&mut self.inner, &mut prefix)?;
        let len = u32::from_le_bytes(prefix) as usize;

        let mut payload = vec![0u8; len];
        read_exact_or_closed(&mut self.inner, &mut payload)?;
        Ok(payload)
    }

    /// Block until a complete frame arrives and decode it.
    pub fn receive<T: DeserializeOwned>(&mut self) -> Result<T, ChannelError> {
        let payload = self.read_frame()?;
        Ok(serde_json::from_slice(&payload)?)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn read_exact_or_closed<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ChannelError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ChannelError::Closed),
        Err(e) => Err(ChannelError::Io(e)),
    }
}

// ---------------------------------------------------------------------------
// FrameWriter
// ---------------------------------------------------------------------------

/// Writing half of a framed channel. Every frame is flushed.
#[derive(Debug)]
pub struct FrameWriter<W: Write> {
    inner: W,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one raw payload as a frame.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::FrameTooLarge`] if `payload` exceeds `u32::MAX` bytes.
    /// - [`ChannelError::Io`] if the write or flush fails.
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        let len = u32::try_from(payload.len())
            .map_err(|_| ChannelError::FrameTooLarge { len: payload.len() })?;
        self.inner.write_all(&len.to_le_bytes())?;
        self.inner.write_all(payload)?;
        self.inner.flush()?;
        Ok(())
    }

    /// Encode `value` and write it as one frame.
    pub fn send<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ChannelError> {
        let payload = serde_json::to_vec(value)?;
        self.write_frame(&payload)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn framed(values: &[serde_json::Value]) -> Vec<u8> {
        let mut wire = Vec::new();
        let mut writer = FrameWriter::new(&mut wire);
        for value in values {
            writer.send(value).unwrap();
        }
        wire
    }

    #[test]
    fn prefix_is_little_endian_payload_length() {
        let wire = framed(&[serde_json::json!("ready")]);
        assert_eq!(&wire[..PREFIX_LEN], &7u32.to_le_bytes());
        assert_eq!(&wire[PREFIX_LEN..], b"\"ready\"");
    }

    #[test]
    fn frames_are_read_back_in_order() {
        let wire = framed(&[serde_json::json!(1), serde_json::json!([true, null])]);
        let mut reader = FrameReader::new(Cursor::new(wire));
        assert_eq!(reader.receive::<serde_json::Value>().unwrap(), serde_json::json!(1));
        assert_eq!(
            reader.receive::<serde_json::Value>().unwrap(),
            serde_json::json!([true, null])
        );
        assert!(matches!(
            reader.receive::<serde_json::Value>(),
            Err(ChannelError::Closed)
        ));
    }

    #[test]
    fn empty_stream_is_closed() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        assert!(matches!(reader.read_frame(), Err(ChannelError::Closed)));
    }

    #[test]
    fn partial_prefix_is_closed() {
        let mut reader = FrameReader::new(Cursor::new(vec![5u8, 0]));
        assert!(matches!(reader.read_frame(), Err(ChannelError::Closed)));
    }

    #[test]
    fn partial_body_is_closed() {
        let mut wire = framed(&[serde_json::json!({"key": "value"})]);
        wire.truncate(wire.len() - 3);
        let mut reader = FrameReader::new(Cursor::new(wire));
        assert!(matches!(reader.read_frame(), Err(ChannelError::Closed)));
    }

    #[test]
    fn malformed_payload_is_a_codec_error() {
        let mut wire = Vec::new();
        FrameWriter::new(&mut wire).write_frame(b"{not json").unwrap();
        let mut reader = FrameReader::new(Cursor::new(wire));
        assert!(matches!(
            reader.receive::<serde_json::Value>(),
            Err(ChannelError::Codec(_))
        ));
    }

    #[test]
    fn zero_length_frame_is_valid() {
        let mut wire = Vec::new();
        FrameWriter::new(&mut wire).write_frame(&[]).unwrap();
        let mut reader = FrameReader::new(Cursor::new(wire));
        assert!(reader.read_frame().unwrap().is_empty());
    }
}
