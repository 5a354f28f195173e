//! Server-side mirror of `wivrn_session::SessionRuntime`: the same
//! channel-multiplexing shape (a `tokio::select!` over the control channel,
//! the stream channel, a cancellation branch, and a periodic tick — see
//! `wivrn_session::runtime`'s own grounding in the teacher's
//! `run_media_loop`), but driving the outbound video path instead of a
//! shard accumulator, since the server has nothing to reassemble.

use std::net::SocketAddr;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wivrn_proto::packets::{FromHeadset, ToHeadset, VideoCodec, VideoStreamDescription};
use wivrn_session::{Codec, Result, SessionError};
use wivrn_transport::{ControlChannel, StreamChannel};

use crate::video::{split_into_shards, VideoSource};

/// Upper bound on how often the video source is polled; actual frame
/// cadence is whatever the (out-of-scope) encoder produces, not this tick.
const VIDEO_POLL_INTERVAL: Duration = Duration::from_millis(4);

fn now_ns() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

fn to_nal_codec(codec: VideoCodec) -> Codec {
    match codec {
        VideoCodec::H264 => Codec::H264,
        VideoCodec::H265 => Codec::H265,
    }
}

pub struct ServerRuntime<V: VideoSource> {
    control: ControlChannel,
    stream: StreamChannel,
    video: V,
    stream_index: u8,
    codec: VideoCodec,
    width: u32,
    height: u32,
    /// Learned from the first stream-channel datagram the headset sends;
    /// nothing is sent on the stream channel before then (the server never
    /// initiates the UDP path, only replies on it — see spec.md §1's NAT
    /// traversal Non-goal).
    peer_addr: Option<SocketAddr>,
    description_sent: bool,
    next_frame_index: u64,
}

impl<V: VideoSource> ServerRuntime<V> {
    pub fn new(
        control: ControlChannel,
        stream: StreamChannel,
        video: V,
        codec: VideoCodec,
        width: u32,
        height: u32,
    ) -> Self {
        ServerRuntime {
            control,
            stream,
            video,
            stream_index: 0,
            codec,
            width,
            height,
            peer_addr: None,
            description_sent: false,
            next_frame_index: 0,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let mut video_tick = tokio::time::interval(VIDEO_POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("server session runtime shutting down");
                    return Ok(());
                }

                msg = self.control.receive::<FromHeadset>() => {
                    match msg {
                        Ok(Some(FromHeadset::HeadsetInfo(info))) => {
                            info!(device = %info.device_name, refresh_rate = info.refresh_rate_hz, "headset advertised static info");
                        }
                        Ok(Some(other)) => warn!("unexpected control message from headset: {other:?}"),
                        Ok(None) => return Err(SessionError::QueueClosed),
                        Err(e) => return Err(e),
                    }
                }

                msg = self.stream.receive_from::<FromHeadset>() => {
                    match msg {
                        Ok(Some((from_headset, addr))) => {
                            self.peer_addr = Some(addr);
                            self.handle_stream_message(from_headset);
                        }
                        Ok(None) => return Err(SessionError::QueueClosed),
                        Err(e) => warn!("stream channel receive error, continuing: {e}"),
                    }
                }

                _ = video_tick.tick() => {
                    if let Some(peer) = self.peer_addr {
                        self.pump_video(peer).await;
                    }
                }
            }
        }
    }

    fn handle_stream_message(&mut self, msg: FromHeadset) {
        match msg {
            FromHeadset::Tracking(_) | FromHeadset::HandTracking(_) => {
                // Pose prediction / engine integration is out of scope
                // (spec.md §1); a real server hands this to the render
                // loop here.
            }
            FromHeadset::Feedback(feedback) => {
                debug!(frame_index = feedback.frame_index, "received feedback");
            }
            FromHeadset::AudioData(_) => {
                // Host audio I/O is out of scope (spec.md §1).
            }
            other => warn!("unexpected stream message from headset: {other:?}"),
        }
    }

    async fn pump_video(&mut self, peer: SocketAddr) {
        if !self.description_sent {
            let desc = VideoStreamDescription {
                stream_index: self.stream_index,
                codec: self.codec,
                width: self.width,
                height: self.height,
            };
            if let Err(e) = self.control.send(&ToHeadset::VideoStreamDescription(desc)).await {
                warn!("failed to send video_stream_description: {e}");
                return;
            }
            self.description_sent = true;
        }

        let Some(unit) = self.video.next_access_unit(now_ns()) else {
            return;
        };
        let frame_index = self.next_frame_index;
        self.next_frame_index += 1;
        let send_begin_ns = now_ns();
        let shards = split_into_shards(self.stream_index, frame_index, to_nal_codec(self.codec), &unit, send_begin_ns, now_ns());
        for shard in shards {
            if let Err(e) = self.stream.send_to(&ToHeadset::VideoStreamDataShard(shard), peer).await {
                warn!("failed to send video shard: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::AccessUnit;
    use wivrn_crypto::{ControlCipher, StreamCipherKey};
    use wivrn_proto::shard::{Pose, ViewInfo};
    use wivrn_transport::{DatagramChannel, ReliableChannel};

    struct OneFrameSource {
        sent: bool,
    }

    impl VideoSource for OneFrameSource {
        fn next_access_unit(&mut self, _now_ns: i64) -> Option<AccessUnit> {
            if self.sent {
                return None;
            }
            self.sent = true;
            let mut data = vec![0, 0, 0, 1, 0x65];
            data.extend_from_slice(&[1u8; 32]);
            Some(AccessUnit {
                view_info: ViewInfo {
                    poses: vec![Pose::default(); 2],
                    fovs: vec![],
                    display_time_ns: 0,
                },
                data,
                encode_begin_ns: 0,
                encode_end_ns: 0,
            })
        }
    }

    async fn loopback_runtime() -> (ServerRuntime<OneFrameSource>, tokio::net::TcpStream, DatagramChannel) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = tokio::net::TcpStream::connect(addr);
        let (accepted, client_stream) = tokio::join!(listener.accept(), connect);
        let (server_tcp, _) = accepted.unwrap();
        let client_tcp = client_stream.unwrap();

        let cipher_a = ControlCipher::new([1u8; 16], [2u8; 16]);
        let cipher_b = ControlCipher::new([1u8; 16], [3u8; 16]);
        let control = ControlChannel::new(ReliableChannel::new(server_tcp).unwrap(), cipher_a, cipher_b);

        let server_datagram = DatagramChannel::bind(0).await.unwrap();
        let server_addr = server_datagram.local_addr().unwrap();
        let stream = StreamChannel::new(
            server_datagram,
            StreamCipherKey::new([4u8; 16], [5u8; 8]),
            StreamCipherKey::new([4u8; 16], [6u8; 8]),
        );

        let client_datagram = DatagramChannel::bind(0).await.unwrap();
        client_datagram.connect(server_addr).await.unwrap();

        let runtime = ServerRuntime::new(
            control,
            stream,
            OneFrameSource { sent: false },
            VideoCodec::H264,
            1600,
            1440,
        );
        (runtime, client_tcp, client_datagram)
    }

    #[tokio::test]
    async fn shutdown_via_cancellation_token_returns_cleanly() {
        let (runtime, _client_tcp, _client_datagram) = loopback_runtime().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(runtime.run(cancel).await.is_ok());
    }
}
