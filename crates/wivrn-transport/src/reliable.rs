//! The reliable ("control") channel: a `u16`-length-prefixed framing over a
//! TCP stream. Grounded on `TCP`/`typed_socket` in
//! `examples/original_source/common/wivrn_sockets.h` — the mutex-serialized
//! scatter-gather send and the growable-buffer, non-blocking receive are
//! ported onto `tokio::net::TcpStream` with a `Mutex`-guarded write half and
//! an owned read buffer instead of raw `writev`/`recv`.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use wivrn_proto::{DeserializationPacket, SerializationPacket, WireEncode};

use crate::error::{Result, TransportError};

const LENGTH_PREFIX_LEN: usize = 2;
/// Initial growable receive buffer capacity; grows as needed for larger
/// frames, never shrinks back (a session reuses the same allocation).
const INITIAL_RECV_CAPACITY: usize = 64 * 1024;

/// A framed, mutex-serialized TCP connection carrying control-class
/// messages.
pub struct ReliableChannel {
    write_half: Mutex<tokio::net::tcp::OwnedWriteHalf>,
    read_half: tokio::net::tcp::OwnedReadHalf,
    recv_buffer: BytesMut,
}

impl ReliableChannel {
    pub fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        Ok(ReliableChannel {
            write_half: Mutex::new(write_half),
            read_half,
            recv_buffer: BytesMut::with_capacity(INITIAL_RECV_CAPACITY),
        })
    }

    /// Serializes `message` and writes `length | payload` while holding the
    /// channel's write mutex, so no other caller's frame can interleave
    /// between the length prefix and its payload.
    pub async fn send<T: WireEncode>(&self, message: &T) -> Result<()> {
        let mut packet = SerializationPacket::new();
        packet.serialize(message);
        self.send_raw(&packet.into_bytes()).await
    }

    /// Writes `length | payload` for an already-encoded (and, post-handshake,
    /// already-encrypted) frame. [`ControlChannel`](crate::ControlChannel)
    /// builds on this instead of re-framing by hand.
    pub async fn send_raw(&self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Err(TransportError::ZeroLengthFrame);
        }
        let length = u16::try_from(payload.len())
            .map_err(|_| TransportError::Io(std::io::Error::other("frame too large for u16 length prefix")))?;

        let mut framed = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
        framed.extend_from_slice(&length.to_le_bytes());
        framed.extend_from_slice(payload);

        let mut guard = self.write_half.lock().await;
        guard.write_all(&framed).await?;
        Ok(())
    }

    /// Reads exactly one framed message, blocking until `2 + length` bytes
    /// have arrived. Returns `Ok(None)` on a clean peer shutdown.
    pub async fn receive<T: WireEncode>(&mut self) -> Result<Option<T>> {
        let Some(frame) = self.receive_raw().await? else {
            return Ok(None);
        };
        let mut reader = DeserializationPacket::new(&frame);
        Ok(Some(T::deserialize(&mut reader)?))
    }

    /// Reads exactly one framed message's raw bytes without interpreting
    /// them, so a caller can decrypt before deserializing.
    pub async fn receive_raw(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(frame) = self.try_take_frame()? {
                return Ok(Some(frame.to_vec()));
            }
            let mut chunk = [0u8; 16 * 1024];
            let n = self.read_half.read(&mut chunk).await?;
            if n == 0 {
                if self.recv_buffer.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::ConnectionClosed);
            }
            self.recv_buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Extracts one complete frame from the buffer if enough bytes have
    /// accumulated, leaving any remainder for the next call.
    fn try_take_frame(&mut self) -> Result<Option<BytesMut>> {
        if self.recv_buffer.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }
        let length = u16::from_le_bytes([self.recv_buffer[0], self.recv_buffer[1]]) as usize;
        if length == 0 {
            return Err(TransportError::ZeroLengthFrame);
        }
        if self.recv_buffer.len() < LENGTH_PREFIX_LEN + length {
            return Ok(None);
        }
        self.recv_buffer.advance(LENGTH_PREFIX_LEN);
        Ok(Some(self.recv_buffer.split_to(length)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use wivrn_proto::packets::ClientAnnounce;

    #[tokio::test]
    async fn single_message_round_trips() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let channel = ReliableChannel::new(stream).unwrap();
            channel
                .send(&ClientAnnounce {
                    protocol_version: 42,
                    client_version: "test".into(),
                })
                .await
                .unwrap();
        });

        let (stream, _) = listener.accept().await.unwrap();
        let mut channel = ReliableChannel::new(stream).unwrap();
        let message: ClientAnnounce = channel.receive().await.unwrap().unwrap();
        assert_eq!(message.protocol_version, 42);
        assert_eq!(message.client_version, "test");

        client_task.await.unwrap();
    }

    #[tokio::test]
    async fn split_stream_yields_same_messages_as_unsplit() {
        // Simulates a stream delivered in small chunks: two frames whose
        // bytes straddle a read boundary must still demux cleanly.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let mut packet = SerializationPacket::new();
            packet.serialize(&ClientAnnounce {
                protocol_version: 1,
                client_version: "a".into(),
            });
            let payload = packet.into_bytes();
            let mut framed = Vec::new();
            framed.extend_from_slice(&(payload.len() as u16).to_le_bytes());
            framed.extend_from_slice(&payload);

            let mut packet2 = SerializationPacket::new();
            packet2.serialize(&ClientAnnounce {
                protocol_version: 2,
                client_version: "bb".into(),
            });
            let payload2 = packet2.into_bytes();
            framed.extend_from_slice(&(payload2.len() as u16).to_le_bytes());
            framed.extend_from_slice(&payload2);

            for byte in framed {
                stream.write_all(&[byte]).await.unwrap();
            }
        });

        let (stream, _) = listener.accept().await.unwrap();
        let mut channel = ReliableChannel::new(stream).unwrap();
        let first: ClientAnnounce = channel.receive().await.unwrap().unwrap();
        let second: ClientAnnounce = channel.receive().await.unwrap().unwrap();
        assert_eq!(first.protocol_version, 1);
        assert_eq!(second.protocol_version, 2);

        client_task.await.unwrap();
    }
}
