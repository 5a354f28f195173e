//! The unreliable ("stream") channel: a UDP/IPv6 dual-stack datagram socket
//! with `recvmmsg`-batched receive.
//!
//! Grounded on `UDP::receive_raw`/`UDP::send_raw` in
//! `examples/original_source/common/wivrn_sockets.cpp`, which pulls a batch
//! of up to 20 datagrams (2048 bytes each) out of the kernel in a single
//! `recvmmsg` call and hands them out one at a time before the next syscall.
//! The raw `libc::recvmmsg` FFI plumbing (zeroed `mmsghdr`/`iovec` arrays,
//! `MSG_DONTWAIT`, manual `errno` handling) follows the style of
//! `Dicklesworthstone-glibc_rust`'s direct syscall wrappers.

use std::io;
use std::mem::MaybeUninit;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;

use tokio::net::UdpSocket;

use crate::error::{Result, TransportError};

const MESSAGE_SIZE: usize = 2048;
const NUM_MESSAGES: usize = 20;

/// One datagram pulled out of a batched `recvmmsg` call.
pub struct ReceivedDatagram {
    pub data: Vec<u8>,
    pub from: SocketAddr,
}

/// A UDP socket carrying stream-class (video/tracking/audio) datagrams.
///
/// Binds dual-stack (an IPv6 socket that also accepts IPv4-mapped peers) so
/// a single socket serves both address families, mirroring the original's
/// `in6_addr`-based bind path.
pub struct DatagramChannel {
    socket: UdpSocket,
    /// Batch drained by the last `recvmmsg` call, in receive order; `recv`
    /// serves from here before issuing another syscall.
    pending: Vec<ReceivedDatagram>,
}

impl DatagramChannel {
    pub async fn bind(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind((std::net::Ipv6Addr::UNSPECIFIED, port)).await?;
        set_receive_buffer_size(&socket, 5 * 1024 * 1024)?;
        Ok(DatagramChannel {
            socket,
            pending: Vec::new(),
        })
    }

    pub async fn connect(&self, peer: SocketAddr) -> Result<()> {
        self.socket.connect(peer).await?;
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn send_to(&self, data: &[u8], peer: SocketAddr) -> Result<()> {
        self.socket.send_to(data, peer).await?;
        Ok(())
    }

    pub async fn send(&self, data: &[u8]) -> Result<()> {
        self.socket.send(data).await?;
        Ok(())
    }

    /// Returns the next datagram, serving from the last batch if one is
    /// still pending, otherwise waiting for the socket to become readable
    /// and draining a fresh batch with `recvmmsg`.
    pub async fn recv(&mut self) -> Result<ReceivedDatagram> {
        loop {
            if let Some(datagram) = self.pending.pop() {
                return Ok(datagram);
            }
            self.socket.readable().await?;
            match recv_batch(&self.socket) {
                Ok(mut batch) => {
                    if batch.is_empty() {
                        continue;
                    }
                    // `pending` is drained via `pop`, so keep receive order
                    // by pushing in reverse.
                    batch.reverse();
                    self.pending = batch;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }
}

fn set_receive_buffer_size(socket: &UdpSocket, size: i32) -> Result<()> {
    let fd = socket.as_raw_fd();
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &size as *const i32 as *const libc::c_void,
            std::mem::size_of::<i32>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(TransportError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Issues one `recvmmsg` call against a pool of `NUM_MESSAGES` slots of
/// `MESSAGE_SIZE` bytes each, returning every datagram the kernel handed
/// back in a single syscall.
fn recv_batch(socket: &UdpSocket) -> io::Result<Vec<ReceivedDatagram>> {
    let fd = socket.as_raw_fd();

    let mut buffer = vec![0u8; MESSAGE_SIZE * NUM_MESSAGES];
    let mut iovecs: Vec<libc::iovec> = (0..NUM_MESSAGES)
        .map(|i| libc::iovec {
            iov_base: buffer[i * MESSAGE_SIZE..].as_mut_ptr() as *mut libc::c_void,
            iov_len: MESSAGE_SIZE,
        })
        .collect();
    let mut addrs: Vec<MaybeUninit<libc::sockaddr_in6>> =
        (0..NUM_MESSAGES).map(|_| MaybeUninit::uninit()).collect();
    let mut mmsgs: Vec<libc::mmsghdr> = (0..NUM_MESSAGES)
        .map(|i| {
            let mut hdr: libc::mmsghdr = unsafe { std::mem::zeroed() };
            hdr.msg_hdr.msg_iov = &mut iovecs[i];
            hdr.msg_hdr.msg_iovlen = 1;
            hdr.msg_hdr.msg_name = addrs[i].as_mut_ptr() as *mut libc::c_void;
            hdr.msg_hdr.msg_namelen = std::mem::size_of::<libc::sockaddr_in6>() as u32;
            hdr
        })
        .collect();

    let received = unsafe {
        libc::recvmmsg(
            fd,
            mmsgs.as_mut_ptr(),
            NUM_MESSAGES as u32,
            libc::MSG_DONTWAIT,
            std::ptr::null_mut(),
        )
    };

    if received < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut out = Vec::with_capacity(received as usize);
    for i in 0..received as usize {
        let len = mmsgs[i].msg_len as usize;
        let data = buffer[i * MESSAGE_SIZE..i * MESSAGE_SIZE + len].to_vec();
        let from = sockaddr_to_std(unsafe { addrs[i].assume_init() });
        out.push(ReceivedDatagram { data, from });
    }
    Ok(out)
}

fn sockaddr_to_std(addr: libc::sockaddr_in6) -> SocketAddr {
    let ip = std::net::Ipv6Addr::from(addr.sin6_addr.s6_addr);
    let port = u16::from_be(addr.sin6_port);
    SocketAddr::new(std::net::IpAddr::V6(ip), port)
}
