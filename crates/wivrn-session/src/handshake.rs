//! The five-step session handshake: version check, key exchange, optional
//! SMP pairing, secret derivation, and confirmation (spec.md §4.D).
//!
//! `Msg1..Msg4` are defined in `wivrn_crypto::smp` and carry only `Vec<u8>`
//! fields, so the orphan rule blocks a local `WireEncode` impl for them —
//! instead the `encode_msg*`/`decode_msg*` functions below call the already
//! existing `Vec<u8>: WireEncode` impl field by field and wrap the result in
//! a `CryptoHandshake{stage, payload}` envelope. Every message on the wire
//! before promotion to the encrypted `ControlChannel` still travels inside
//! the ordinary `FromHeadset`/`ToHeadset` tagged unions, the same as any
//! other application message — there is no separate untagged path.

use rand::Rng;
use wivrn_crypto::smp::{Msg1, Msg2, Msg3, Msg4, Smp};
use wivrn_crypto::{ControlCipher, DhKeypair, Secrets};
use wivrn_proto::packets::{CryptoHandshake, FromHeadset, HandshakeComplete, SessionKeyExchange, ToHeadset};
use wivrn_proto::{protocol_version, DeserializationPacket, SerializationPacket, WireEncode};
use wivrn_transport::{ControlChannel, ReliableChannel};

use crate::error::{Result, SessionError};
use crate::keystore::KeyStore;

const STAGE_PAIRING_REQUIRED: u8 = 0;
const STAGE_MSG1: u8 = 1;
const STAGE_MSG2: u8 = 2;
const STAGE_MSG3: u8 = 3;
const STAGE_MSG4: u8 = 4;

/// Shown out-of-band by the caller (log line, on-screen PIN) and entered
/// identically on both sides before pairing proceeds.
pub fn generate_pin() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{value:06}")
}

fn encode_vecs(fields: &[&Vec<u8>]) -> Vec<u8> {
    let mut packet = SerializationPacket::new();
    for field in fields {
        packet.serialize(*field);
    }
    packet.into_bytes()
}

fn decode_vecs<const N: usize>(payload: &[u8]) -> Result<[Vec<u8>; N]> {
    let mut reader = DeserializationPacket::new(payload);
    let mut out: [Vec<u8>; N] = std::array::from_fn(|_| Vec::new());
    for slot in out.iter_mut() {
        *slot = Vec::<u8>::deserialize(&mut reader)?;
    }
    Ok(out)
}

fn encode_msg1(msg: &Msg1) -> Vec<u8> {
    encode_vecs(&[&msg.g2a, &msg.c2, &msg.d2, &msg.g3a, &msg.c3, &msg.d3])
}

fn decode_msg1(payload: &[u8]) -> Result<Msg1> {
    let [g2a, c2, d2, g3a, c3, d3] = decode_vecs::<6>(payload)?;
    Ok(Msg1 { g2a, c2, d2, g3a, c3, d3 })
}

fn encode_msg2(msg: &Msg2) -> Vec<u8> {
    encode_vecs(&[
        &msg.g2b, &msg.c2, &msg.d2, &msg.g3b, &msg.c3, &msg.d3, &msg.pb, &msg.qb, &msg.cp, &msg.d5, &msg.d6,
    ])
}

fn decode_msg2(payload: &[u8]) -> Result<Msg2> {
    let [g2b, c2, d2, g3b, c3, d3, pb, qb, cp, d5, d6] = decode_vecs::<11>(payload)?;
    Ok(Msg2 {
        g2b,
        c2,
        d2,
        g3b,
        c3,
        d3,
        pb,
        qb,
        cp,
        d5,
        d6,
    })
}

fn encode_msg3(msg: &Msg3) -> Vec<u8> {
    encode_vecs(&[&msg.pa, &msg.qa, &msg.cp, &msg.d5, &msg.d6, &msg.ra, &msg.cr, &msg.d7])
}

fn decode_msg3(payload: &[u8]) -> Result<Msg3> {
    let [pa, qa, cp, d5, d6, ra, cr, d7] = decode_vecs::<8>(payload)?;
    Ok(Msg3 {
        pa,
        qa,
        cp,
        d5,
        d6,
        ra,
        cr,
        d7,
    })
}

/// Msg4 plus a trailing `matched` byte: Bob's own `step4` verdict, carried
/// alongside the proof so Alice's independent `step5` check has something
/// to agree with rather than trusting Bob's silence.
fn encode_msg4(msg: &Msg4, matched: bool) -> Vec<u8> {
    let mut bytes = encode_vecs(&[&msg.rb, &msg.cr, &msg.d7]);
    bytes.push(matched as u8);
    bytes
}

fn decode_msg4(payload: &[u8]) -> Result<(Msg4, bool)> {
    if payload.is_empty() {
        return Err(SessionError::UnexpectedMessage("empty CryptoHandshake stage 4 payload"));
    }
    let (body, flag) = payload.split_at(payload.len() - 1);
    let [rb, cr, d7] = decode_vecs::<3>(body)?;
    Ok((Msg4 { rb, cr, d7 }, flag[0] != 0))
}

/// Everything a caller needs once the handshake completes: the encrypted
/// control channel and the peer's identity.
pub struct HandshakeOutcome {
    pub control: ControlChannel,
    pub secrets: Secrets,
    pub peer_public_key: [u8; 32],
    pub peer_display_name: Option<String>,
}

fn local_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn dh_public_bytes(keypair: &DhKeypair) -> Result<[u8; 32]> {
    keypair
        .public_key_bytes()
        .try_into()
        .map_err(|_| SessionError::UnexpectedMessage("local DH keypair is not X25519"))
}

async fn recv_from_headset(reliable: &mut ReliableChannel) -> Result<FromHeadset> {
    reliable
        .receive()
        .await?
        .ok_or(SessionError::UnexpectedMessage("connection closed mid-handshake"))
}

async fn recv_to_headset(reliable: &mut ReliableChannel) -> Result<ToHeadset> {
    reliable
        .receive()
        .await?
        .ok_or(SessionError::UnexpectedMessage("connection closed mid-handshake"))
}

/// Server side: accepts `ClientAnnounce`, pairs if the peer is unknown, and
/// returns the encrypted channel once secrets are derived (step 5).
pub async fn run_server_handshake(
    mut reliable: ReliableChannel,
    keystore: &mut KeyStore,
    local_keypair: &DhKeypair,
    server_display_name: Option<String>,
    pin: impl FnOnce() -> String,
) -> Result<HandshakeOutcome> {
    let announce = match recv_from_headset(&mut reliable).await? {
        FromHeadset::ClientAnnounce(announce) => announce,
        _ => return Err(SessionError::UnexpectedMessage("expected client_announce first")),
    };

    let local_version = protocol_version();
    if announce.protocol_version != local_version {
        reliable
            .send(&ToHeadset::ProtocolMismatch {
                server_version: local_version,
            })
            .await?;
        return Err(SessionError::ProtocolMismatch {
            local: local_version,
            peer: announce.protocol_version,
        });
    }

    let peer_exchange = match recv_from_headset(&mut reliable).await? {
        FromHeadset::SessionKeyExchange(exchange) => exchange,
        _ => return Err(SessionError::UnexpectedMessage("expected session_key_exchange")),
    };

    let already_paired = keystore.contains(&peer_exchange.public_key);
    if !already_paired {
        reliable
            .send(&ToHeadset::CryptoHandshake(CryptoHandshake {
                stage: STAGE_PAIRING_REQUIRED,
                payload: vec![1],
            }))
            .await?;

        let mut bob = Smp::new();
        let secret = pin();

        let msg1 = match recv_from_headset(&mut reliable).await? {
            FromHeadset::CryptoHandshake(ch) if ch.stage == STAGE_MSG1 => decode_msg1(&ch.payload)?,
            _ => return Err(SessionError::UnexpectedMessage("expected smp msg1")),
        };
        let msg2 = bob.step2(&msg1, &secret)?;
        reliable
            .send(&ToHeadset::CryptoHandshake(CryptoHandshake {
                stage: STAGE_MSG2,
                payload: encode_msg2(&msg2),
            }))
            .await?;

        let msg3 = match recv_from_headset(&mut reliable).await? {
            FromHeadset::CryptoHandshake(ch) if ch.stage == STAGE_MSG3 => decode_msg3(&ch.payload)?,
            _ => return Err(SessionError::UnexpectedMessage("expected smp msg3")),
        };
        let (msg4, matched) = bob.step4(&msg3)?;
        reliable
            .send(&ToHeadset::CryptoHandshake(CryptoHandshake {
                stage: STAGE_MSG4,
                payload: encode_msg4(&msg4, matched),
            }))
            .await?;

        if !matched {
            return Err(SessionError::PairingRejected);
        }

        let display_name = peer_exchange
            .display_name
            .clone()
            .unwrap_or_else(|| "unnamed headset".to_string());
        keystore.add(peer_exchange.public_key, display_name)?;
    }

    reliable
        .send(&ToHeadset::SessionKeyExchange(SessionKeyExchange {
            public_key: dh_public_bytes(local_keypair)?,
            display_name: server_display_name,
        }))
        .await?;

    let dh = local_keypair.diffie_hellman(&peer_exchange.public_key)?;
    let secrets = Secrets::derive(&dh)?;

    let tx_cipher = ControlCipher::new(secrets.control_key, secrets.control_iv_to_headset);
    let rx_cipher = ControlCipher::new(secrets.control_key, secrets.control_iv_from_headset);
    let mut control = ControlChannel::new(reliable, tx_cipher, rx_cipher);

    // Plain `HandshakeComplete` serializes to zero bytes; sending it bare
    // would trip `ReliableChannel`'s zero-length-frame rejection, so the
    // confirmation travels tagged like every other post-handshake message.
    control.send(&ToHeadset::HandshakeComplete(HandshakeComplete)).await?;
    match control
        .receive::<FromHeadset>()
        .await?
        .ok_or(SessionError::UnexpectedMessage("connection closed awaiting handshake_complete"))?
    {
        FromHeadset::HandshakeComplete(_) => {}
        _ => return Err(SessionError::UnexpectedMessage("expected handshake_complete")),
    }

    Ok(HandshakeOutcome {
        control,
        secrets,
        peer_public_key: peer_exchange.public_key,
        peer_display_name: keystore.display_name(&peer_exchange.public_key).map(|s| s.to_string()),
    })
}

/// Headset side: sends `ClientAnnounce`, participates as Alice in pairing
/// when the server requests it, and confirms the derived keys.
pub async fn run_client_handshake(
    mut reliable: ReliableChannel,
    local_keypair: &DhKeypair,
    client_display_name: Option<String>,
    pin: Option<String>,
) -> Result<HandshakeOutcome> {
    reliable
        .send(&FromHeadset::ClientAnnounce(wivrn_proto::packets::ClientAnnounce {
            protocol_version: protocol_version(),
            client_version: local_client_version(),
        }))
        .await?;

    reliable
        .send(&FromHeadset::SessionKeyExchange(SessionKeyExchange {
            public_key: dh_public_bytes(local_keypair)?,
            display_name: client_display_name,
        }))
        .await?;

    let first_reply = recv_to_headset(&mut reliable).await?;

    let (peer_public_key, peer_display_name) = match first_reply {
        ToHeadset::ProtocolMismatch { server_version } => {
            return Err(SessionError::ProtocolMismatch {
                local: protocol_version(),
                peer: server_version,
            });
        }
        ToHeadset::CryptoHandshake(msg) if msg.stage == STAGE_PAIRING_REQUIRED => {
            let secret = pin.ok_or(SessionError::UnexpectedMessage(
                "server requested pairing but no PIN was supplied",
            ))?;
            let mut alice = Smp::new();
            let msg1 = alice.step1(&secret);
            reliable
                .send(&FromHeadset::CryptoHandshake(CryptoHandshake {
                    stage: STAGE_MSG1,
                    payload: encode_msg1(&msg1),
                }))
                .await?;

            let msg2 = match recv_to_headset(&mut reliable).await? {
                ToHeadset::CryptoHandshake(ch) if ch.stage == STAGE_MSG2 => decode_msg2(&ch.payload)?,
                _ => return Err(SessionError::UnexpectedMessage("expected smp msg2")),
            };
            let msg3 = alice.step3(&msg2)?;
            reliable
                .send(&FromHeadset::CryptoHandshake(CryptoHandshake {
                    stage: STAGE_MSG3,
                    payload: encode_msg3(&msg3),
                }))
                .await?;

            let (msg4, bob_matched) = match recv_to_headset(&mut reliable).await? {
                ToHeadset::CryptoHandshake(ch) if ch.stage == STAGE_MSG4 => decode_msg4(&ch.payload)?,
                _ => return Err(SessionError::UnexpectedMessage("expected smp msg4")),
            };
            let alice_matched = alice.step5(&msg4)?;
            if !alice_matched || !bob_matched {
                return Err(SessionError::PairingRejected);
            }

            match recv_to_headset(&mut reliable).await? {
                ToHeadset::SessionKeyExchange(exchange) => (exchange.public_key, exchange.display_name),
                _ => return Err(SessionError::UnexpectedMessage("expected server session_key_exchange")),
            }
        }
        ToHeadset::SessionKeyExchange(exchange) => (exchange.public_key, exchange.display_name),
        _ => return Err(SessionError::UnexpectedMessage("unexpected message before key exchange completed")),
    };

    let dh = local_keypair.diffie_hellman(&peer_public_key)?;
    let secrets = Secrets::derive(&dh)?;

    let tx_cipher = ControlCipher::new(secrets.control_key, secrets.control_iv_from_headset);
    let rx_cipher = ControlCipher::new(secrets.control_key, secrets.control_iv_to_headset);
    let mut control = ControlChannel::new(reliable, tx_cipher, rx_cipher);

    match control
        .receive::<ToHeadset>()
        .await?
        .ok_or(SessionError::UnexpectedMessage("connection closed awaiting handshake_complete"))?
    {
        ToHeadset::HandshakeComplete(_) => {}
        _ => return Err(SessionError::UnexpectedMessage("expected handshake_complete")),
    }
    control.send(&FromHeadset::HandshakeComplete(HandshakeComplete)).await?;

    Ok(HandshakeOutcome {
        control,
        secrets,
        peer_public_key,
        peer_display_name,
    })
}
