//! The encrypted control channel, installed once the handshake derives
//! session keys.
//!
//! Wraps [`ReliableChannel`] the same way [`crate::StreamChannel`] wraps
//! [`crate::DatagramChannel`], but the IV is fixed for the session's
//! lifetime rather than re-derived per message: spec.md §4.C reuses one IV
//! per direction here because the underlying TCP stream is already ordered
//! and lossless, unlike the datagram path. `ControlCipher` still advances
//! its own internal keystream position across every `send`/`receive` call
//! on this fixed IV, the same way a long-lived `EVP_CIPHER_CTX` keeps
//! advancing in the reference implementation — reusing the IV is only safe
//! because the keystream itself never repeats.

use wivrn_crypto::ControlCipher;
use wivrn_proto::{DeserializationPacket, SerializationPacket, WireEncode};

use crate::error::Result;
use crate::reliable::ReliableChannel;

pub struct ControlChannel {
    reliable: ReliableChannel,
    tx_cipher: ControlCipher,
    rx_cipher: ControlCipher,
}

impl ControlChannel {
    /// `tx_cipher` encrypts what this side sends, `rx_cipher` decrypts what
    /// it receives — callers pass the IV matching each direction (§4.C), not
    /// the same cipher twice, or the peer's decrypt will desync from byte 0.
    pub fn new(reliable: ReliableChannel, tx_cipher: ControlCipher, rx_cipher: ControlCipher) -> Self {
        ControlChannel {
            reliable,
            tx_cipher,
            rx_cipher,
        }
    }

    pub async fn send<T: WireEncode>(&self, message: &T) -> Result<()> {
        let mut packet = SerializationPacket::new();
        packet.serialize(message);
        let mut payload = packet.into_bytes();
        self.tx_cipher.apply_keystream(&mut payload)?;
        self.reliable.send_raw(&payload).await
    }

    pub async fn receive<T: WireEncode>(&mut self) -> Result<Option<T>> {
        let Some(mut payload) = self.reliable.receive_raw().await? else {
            return Ok(None);
        };
        self.rx_cipher.apply_keystream(&mut payload)?;
        let mut reader = DeserializationPacket::new(&payload);
        Ok(Some(T::deserialize(&mut reader)?))
    }
}
