//! Packet channel over a Unix `SOCK_SEQPACKET` socket

use std::fs::File;
use std::io::{self, IoSlice, IoSliceMut, Read, Seek, SeekFrom, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::sys::socket::{
    getsockopt, recvmsg, sendmsg, shutdown, socketpair, sockopt, AddressFamily, ControlMessage,
    ControlMessageOwned, MsgFlags, Shutdown, SockFlag, SockType,
};
use osforge_errors::ProtocolError;
use tokio::io::unix::AsyncFd;

use crate::fdset::FdSet;
use crate::protocol::{self, Frame, HEADER_LEN, INLINE_LIMIT, MAX_FDS, MAX_PACKET};

/// One end of a host/worker connection.
///
/// Each [`Channel::send`] becomes exactly one packet, so frames never split
/// or merge. A frame too big for the socket's send buffer carries its body
/// in an anonymous file attached as the packet's last descriptor. Reads and
/// writes go through the tokio reactor.
#[derive(Debug)]
pub struct Channel {
    fd: AsyncFd<OwnedFd>,
    name: String,
}

fn transport(err: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::Transport {
        message: err.to_string(),
    }
}

impl Channel {
    /// Create a connected pair of channels.
    ///
    /// # Errors
    /// Fails if the socket pair cannot be created or registered with the
    /// runtime.
    pub fn pair(name: &str) -> Result<(Self, Self), ProtocolError> {
        let (host, worker) = socketpair(
            AddressFamily::Unix,
            SockType::SeqPacket,
            None,
            SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC,
        )
        .map_err(transport)?;
        Ok((Self::new(host, name)?, Self::new(worker, name)?))
    }

    /// Wrap a connected nonblocking socket.
    ///
    /// # Errors
    /// Fails if the descriptor cannot be registered with the runtime.
    pub fn new(fd: OwnedFd, name: &str) -> Result<Self, ProtocolError> {
        Ok(Self {
            fd: AsyncFd::new(fd)?,
            name: name.to_string(),
        })
    }

    /// Adopt a socket inherited from the parent process.
    ///
    /// # Errors
    /// Fails if `raw` is not an open descriptor or cannot be made
    /// nonblocking.
    pub fn from_inherited_fd(raw: RawFd, name: &str) -> Result<Self, ProtocolError> {
        let flags = fcntl(raw, FcntlArg::F_GETFL).map_err(transport)?;
        let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
        fcntl(raw, FcntlArg::F_SETFL(flags)).map_err(transport)?;
        fcntl(raw, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(transport)?;

        // SAFETY: the descriptor was checked to be open above and the
        // process never uses it through any other handle.
        #[allow(unsafe_code)]
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        Self::new(fd, name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }

    /// Hand over ownership of the underlying socket, e.g. to pass it to a
    /// child process.
    #[must_use]
    pub fn into_owned_fd(self) -> OwnedFd {
        self.fd.into_inner()
    }

    /// Largest packet the socket accepts in one datagram right now.
    ///
    /// The kernel reports twice the usable send buffer; half of it always
    /// fits a single packet.
    fn inline_limit(&self) -> usize {
        getsockopt(self.fd.get_ref(), sockopt::SndBuf)
            .map_or(INLINE_LIMIT, |size| (size / 2).min(INLINE_LIMIT))
    }

    /// Send one frame with optional descriptors.
    ///
    /// # Errors
    /// Fails if the frame cannot be encoded or the peer is gone.
    pub async fn send(&self, frame: &Frame, fds: &[BorrowedFd<'_>]) -> Result<(), ProtocolError> {
        let packet = frame.encode()?;
        let mut raw: Vec<RawFd> = fds.iter().map(AsRawFd::as_raw_fd).collect();

        let header;
        let body;
        let data: &[u8] = if packet.len() > self.inline_limit() {
            if raw.len() >= MAX_FDS {
                return Err(ProtocolError::Malformed {
                    message: format!(
                        "a {} byte frame needs a descriptor slot beyond the {MAX_FDS} attached",
                        packet.len()
                    ),
                });
            }
            body = spill(&packet[HEADER_LEN..]).map_err(transport)?;
            raw.push(body.as_raw_fd());
            header = frame.spilled_header();
            &header
        } else {
            &packet
        };

        loop {
            let mut guard = self.fd.writable().await?;
            match guard.try_io(|inner| send_packet(inner.get_ref().as_raw_fd(), data, &raw)) {
                Ok(result) => {
                    return result.map_err(|e| {
                        if e.kind() == io::ErrorKind::BrokenPipe {
                            ProtocolError::ChannelClosed {
                                service: self.name.clone(),
                            }
                        } else {
                            e.into()
                        }
                    });
                }
                Err(_would_block) => continue,
            }
        }
    }

    /// Receive one frame. `None` means the peer closed the connection.
    ///
    /// # Errors
    /// Fails on transport errors or a malformed packet.
    pub async fn recv(&self) -> Result<Option<(Frame, FdSet)>, ProtocolError> {
        let received = loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| recv_packet(inner.get_ref().as_raw_fd())) {
                Ok(result) => break result,
                Err(_would_block) => continue,
            }
        };

        match received {
            Ok(Received::Closed) => Ok(None),
            Ok(Received::Packet { data, mut fds }) => {
                let frame = if protocol::is_spilled(&data) {
                    let body = fds.pop().ok_or_else(|| ProtocolError::Malformed {
                        message: "spilled frame arrived without its body".to_string(),
                    })?;
                    let body = read_spilled(body)?;
                    Frame::decode(&protocol::unspill(&data, &body)?)?
                } else {
                    Frame::decode(&data)?
                };
                Ok(Some((frame, FdSet::from(fds))))
            }
            Ok(Received::Malformed(message)) => Err(ProtocolError::Malformed { message }),
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Close both directions. Pending and future reads on the peer see EOF.
    pub fn shutdown(&self) {
        let _ = shutdown(self.as_raw_fd(), Shutdown::Both);
    }
}

impl AsFd for Channel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.get_ref().as_fd()
    }
}

enum Received {
    Closed,
    Packet { data: Vec<u8>, fds: Vec<OwnedFd> },
    Malformed(String),
}

fn send_packet(fd: RawFd, packet: &[u8], fds: &[RawFd]) -> io::Result<()> {
    let iov = [IoSlice::new(packet)];
    let rights = [ControlMessage::ScmRights(fds)];
    let cmsgs: &[ControlMessage<'_>] = if fds.is_empty() { &[] } else { &rights };

    let sent = sendmsg::<()>(fd, &iov, cmsgs, MsgFlags::MSG_NOSIGNAL, None).map_err(io::Error::from)?;
    if sent == packet.len() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short write of {sent} of {} bytes", packet.len()),
        ))
    }
}

/// Write a frame body to an unlinked file, rewound for the reader
fn spill(body: &[u8]) -> io::Result<File> {
    let mut file = tempfile::tempfile()?;
    file.write_all(body)?;
    file.rewind()?;
    Ok(file)
}

fn read_spilled(fd: OwnedFd) -> Result<Vec<u8>, ProtocolError> {
    let mut file = File::from(fd);
    let size = file.metadata().map_err(transport)?.len();
    let size = usize::try_from(size)
        .ok()
        .filter(|size| *size <= MAX_PACKET - HEADER_LEN)
        .ok_or_else(|| ProtocolError::Malformed {
            message: format!("spilled body of {size} bytes exceeds {MAX_PACKET} bytes"),
        })?;

    let mut body = Vec::with_capacity(size);
    file.seek(SeekFrom::Start(0)).map_err(transport)?;
    file.take(size as u64)
        .read_to_end(&mut body)
        .map_err(transport)?;
    Ok(body)
}

fn recv_packet(fd: RawFd) -> io::Result<Received> {
    let mut data = vec![0u8; INLINE_LIMIT];
    let mut cmsg_buffer = nix::cmsg_space!([RawFd; MAX_FDS]);

    let (bytes, truncated, raw_fds, cmsg_error) = {
        let mut iov = [IoSliceMut::new(&mut data)];
        let msg = recvmsg::<()>(
            fd,
            &mut iov,
            Some(&mut cmsg_buffer),
            MsgFlags::MSG_CMSG_CLOEXEC,
        )
        .map_err(io::Error::from)?;

        let mut raw_fds = Vec::new();
        let mut cmsg_error = None;
        match msg.cmsgs() {
            Ok(cmsgs) => {
                for cmsg in cmsgs {
                    if let ControlMessageOwned::ScmRights(received) = cmsg {
                        raw_fds.extend(received);
                    }
                }
            }
            Err(Errno::ENOBUFS) => cmsg_error = Some("descriptor buffer overflow".to_string()),
            Err(e) => return Err(e.into()),
        }
        let truncated = msg
            .flags
            .intersects(MsgFlags::MSG_TRUNC | MsgFlags::MSG_CTRUNC);
        (msg.bytes, truncated, raw_fds, cmsg_error)
    };

    // SAFETY: SCM_RIGHTS installed these descriptors into this process for
    // us alone; nothing else refers to them yet.
    #[allow(unsafe_code)]
    let fds: Vec<OwnedFd> = raw_fds
        .into_iter()
        .map(|raw| unsafe { OwnedFd::from_raw_fd(raw) })
        .collect();

    if let Some(message) = cmsg_error {
        return Ok(Received::Malformed(message));
    }
    if truncated {
        return Ok(Received::Malformed(format!(
            "packet exceeds {INLINE_LIMIT} bytes or {MAX_FDS} descriptors"
        )));
    }
    if bytes == 0 && fds.is_empty() {
        return Ok(Received::Closed);
    }

    data.truncate(bytes);
    Ok(Received::Packet { data, fds })
}
