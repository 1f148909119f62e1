//! Length-prefixed framing over a TCP stream.
//!
//! Every message on the wire is a 4-byte little-endian length followed
//! by exactly that many payload bytes. Payloads are opaque at this
//! layer; the handler chain and the agent loop interpret them as
//! protobuf envelopes.
//!
//! The stream is split into read and write halves so the connection
//! engine can run its send and receive pumps independently.

use crate::defaults;
use crate::error::OefError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

/// Reading half of a framed stream.
pub struct FrameReader {
    half: OwnedReadHalf,
    max_frame_size: usize,
}

/// Writing half of a framed stream.
pub struct FrameWriter {
    half: OwnedWriteHalf,
}

/// Split an established stream into framed halves.
pub fn split(stream: TcpStream) -> (FrameReader, FrameWriter) {
    let (read, write) = stream.into_split();
    (
        FrameReader {
            half: read,
            max_frame_size: defaults::MAX_FRAME_SIZE,
        },
        FrameWriter { half: write },
    )
}

impl FrameReader {
    /// Read one frame: the 4-byte header, then exactly the announced
    /// number of payload bytes.
    ///
    /// A peer that closes the stream at any point, header or body,
    /// surfaces `EndOfStream`. A length beyond the cap surfaces
    /// `FrameTooLarge` and the connection must be torn down.
    pub async fn receive(&mut self) -> Result<Vec<u8>, OefError> {
        let mut header = [0u8; 4];
        read_exact_or_eof(&mut self.half, &mut header).await?;
        let len = u32::from_le_bytes(header) as usize;

        if len > self.max_frame_size {
            return Err(OefError::FrameTooLarge {
                len,
                max: self.max_frame_size,
            });
        }

        let mut body = vec![0u8; len];
        read_exact_or_eof(&mut self.half, &mut body).await?;
        trace!("received {} byte frame", len);
        Ok(body)
    }
}

impl FrameWriter {
    /// Write `u32_le(len(body)) || body` and flush before returning,
    /// so a cancelled task never leaves a frame half-queued in the
    /// stream buffers.
    pub async fn send(&mut self, body: &[u8]) -> Result<(), OefError> {
        let header = (body.len() as u32).to_le_bytes();
        self.half.write_all(&header).await?;
        self.half.write_all(body).await?;
        self.half.flush().await?;
        trace!("sent {} byte frame", body.len());
        Ok(())
    }
}

async fn read_exact_or_eof(half: &mut OwnedReadHalf, buf: &mut [u8]) -> Result<(), OefError> {
    match half.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(OefError::EndOfStream),
        Err(e) => Err(e.into()),
    }
}
