//! Framed message I/O over TCP or UDP, with optional block-level encryption.
//!
//! A logical message is split into fixed-size blocks of [`Channel::block_len`]
//! bytes. The first block starts with the total message length as a 4-byte
//! big-endian integer; the last block is zero-padded. With encryption enabled
//! every block is sealed with XChaCha20-Poly1305 under the channel's current
//! nonce, so the wire never exposes logical message boundaries and the
//! receiver always knows how many ciphertext bytes feed each tag check.
//!
//! Nonces are counters: the client writes with even nonces and reads with odd
//! ones, the server the mirror image, each side stepping its counter by two
//! per block.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::Mutex;
use std::time::Duration;
use std::{fmt, thread};

use capone_crypto::{Nonce, SymmetricKey, TAG_LEN};
use capone_wire::{Deserializable, Serializable, deserialize};

/// Smallest permitted block length: length prefix + tag + one payload byte.
pub const MIN_BLOCK_LEN: usize = 4 + TAG_LEN + 1;
/// Largest permitted block length.
pub const MAX_BLOCK_LEN: usize = 4096;
/// Block length used unless [`Channel::set_block_len`] is called.
pub const DEFAULT_BLOCK_LEN: usize = 512;

/// Upper bound for a single structured message.
const MAX_TYPED_LEN: usize = 4096;

/// Buffer size for [`Channel::relay`] pumps.
const RELAY_BUF_LEN: usize = 2048;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors produced by channel operations.
#[derive(Debug)]
pub enum ChannelError {
    /// Underlying socket I/O failed.
    Io(io::Error),
    /// The peer closed the connection in the middle of a message.
    PeerClosed,
    /// A datagram was shorter than one block.
    ShortRead,
    /// Block length outside `[MIN_BLOCK_LEN, MAX_BLOCK_LEN]`.
    BlockLengthOutOfRange(usize),
    /// The declared message length exceeds the caller's limit.
    LengthExceedsMax {
        /// Length announced by the peer.
        got: usize,
        /// Limit imposed by the caller.
        max: usize,
    },
    /// A block failed authentication. The channel is poisoned.
    DecryptFailed,
    /// A previous decryption failure; no further traffic is possible.
    Poisoned,
    /// A structured message could not be deserialized.
    InvalidMessage(deserialize::Error),
    /// `connect` called on a UDP channel or one that is already connected.
    NotConnectable,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e)            => write!(f, "I/O error: {e}"),
            Self::PeerClosed       => write!(f, "peer closed the connection"),
            Self::ShortRead        => write!(f, "short read: incomplete block"),
            Self::BlockLengthOutOfRange(len)
                => write!(f, "block length {len} not in [{MIN_BLOCK_LEN}, {MAX_BLOCK_LEN}]"),
            Self::LengthExceedsMax { got, max }
                => write!(f, "message length {got} exceeds maximum {max}"),
            Self::DecryptFailed    => write!(f, "block failed authentication"),
            Self::Poisoned         => write!(f, "channel poisoned by earlier decryption failure"),
            Self::InvalidMessage(e) => write!(f, "invalid message: {e}"),
            Self::NotConnectable   => write!(f, "channel cannot be connected"),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<io::Error> for ChannelError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Self::PeerClosed,
            _ => Self::Io(e),
        }
    }
}

impl From<deserialize::Error> for ChannelError {
    fn from(e: deserialize::Error) -> Self {
        Self::InvalidMessage(e)
    }
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Transport flavour of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelType {
    /// Stream transport; must be connected before use.
    Tcp,
    /// Datagram transport; one block per datagram.
    Udp,
}

enum Transport {
    /// TCP with a resolved peer address, not yet connected.
    TcpPending(SocketAddr),
    Tcp(TcpStream),
    Udp { socket: UdpSocket, peer: SocketAddr },
}

impl Transport {
    fn send_block(&mut self, block: &[u8]) -> Result<(), ChannelError> {
        match self {
            Self::TcpPending(_) => Err(ChannelError::NotConnectable),
            Self::Tcp(stream) => {
                stream.write_all(block)?;
                Ok(())
            }
            Self::Udp { socket, peer } => {
                socket.send_to(block, *peer)?;
                Ok(())
            }
        }
    }

    fn recv_block(&mut self, block: &mut [u8]) -> Result<(), ChannelError> {
        match self {
            Self::TcpPending(_) => Err(ChannelError::NotConnectable),
            Self::Tcp(stream) => {
                let mut received = 0;
                while received < block.len() {
                    let n = stream.read(&mut block[received..])?;
                    if n == 0 {
                        return Err(ChannelError::PeerClosed);
                    }
                    received += n;
                }
                Ok(())
            }
            Self::Udp { socket, peer } => {
                let (n, from) = socket.recv_from(block)?;
                *peer = from;
                if n != block.len() {
                    return Err(ChannelError::ShortRead);
                }
                Ok(())
            }
        }
    }
}

// ─── Crypto state ────────────────────────────────────────────────────────────

/// Which end of the nonce asymmetry this channel takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// Handshake initiator: writes with nonce 0, reads with nonce 1.
    Client,
    /// Handshake responder: writes with nonce 1, reads with nonce 0.
    Server,
}

enum Crypto {
    None,
    Symmetric {
        key:          SymmetricKey,
        local_nonce:  Nonce,
        remote_nonce: Nonce,
    },
}

// ─── Framing (shared between Channel and the relay halves) ───────────────────

fn write_framed(
    transport: &mut Transport,
    block_len: usize,
    crypto: Option<(&SymmetricKey, &mut Nonce)>,
    data: &[u8],
) -> Result<(), ChannelError> {
    let tag_len = if crypto.is_some() { TAG_LEN } else { 0 };
    let plain_len = block_len - tag_len;
    let mut crypto = crypto;

    let mut written = 0;
    let mut offset = 4;
    while offset > 0 || written < data.len() {
        let mut block = vec![0u8; plain_len];
        if offset > 0 {
            block[..4].copy_from_slice(&(data.len() as u32).to_be_bytes());
        }

        let take = (data.len() - written).min(plain_len - offset);
        block[offset..offset + take].copy_from_slice(&data[written..written + take]);

        match crypto {
            Some((key, ref mut nonce)) => {
                let sealed = key
                    .seal(nonce, &block)
                    .map_err(|e| ChannelError::Io(io::Error::other(e)))?;
                transport.send_block(&sealed)?;
                nonce.advance(2);
            }
            None => transport.send_block(&block)?,
        }

        written += take;
        offset = 0;
    }

    Ok(())
}

fn read_framed(
    transport: &mut Transport,
    block_len: usize,
    crypto: Option<(&SymmetricKey, &mut Nonce)>,
    max_len: usize,
) -> Result<Vec<u8>, ChannelError> {
    let tag_len = if crypto.is_some() { TAG_LEN } else { 0 };
    let plain_len = block_len - tag_len;
    let mut crypto = crypto;

    let mut message = Vec::new();
    let mut declared = 0;
    let mut offset = 4;
    while offset > 0 || message.len() < declared {
        let mut wire = vec![0u8; block_len];
        transport.recv_block(&mut wire)?;

        let block = match crypto {
            Some((key, ref mut nonce)) => {
                let plain = key.open(nonce, &wire).map_err(|_| ChannelError::DecryptFailed)?;
                nonce.advance(2);
                plain
            }
            None => wire,
        };

        if offset > 0 {
            let mut len = [0u8; 4];
            len.copy_from_slice(&block[..4]);
            declared = u32::from_be_bytes(len) as usize;
            if declared > max_len {
                return Err(ChannelError::LengthExceedsMax { got: declared, max: max_len });
            }
        }

        let take = (declared - message.len()).min(plain_len - offset);
        message.extend_from_slice(&block[offset..offset + take]);
        offset = 0;
    }

    Ok(message)
}

// ─── Channel ─────────────────────────────────────────────────────────────────

/// A message channel over one socket, exclusively owned by one task.
pub struct Channel {
    transport: Transport,
    crypto:    Crypto,
    block_len: usize,
    poisoned:  bool,
}

impl Channel {
    /// Resolve `host:port` and create an unconnected channel.
    ///
    /// For TCP the socket is not connected until [`Channel::connect`]; for
    /// UDP a local socket is bound immediately and datagrams are addressed
    /// to the resolved peer.
    pub fn from_host(host: &str, port: u16, kind: ChannelType) -> Result<Self, ChannelError> {
        let peer = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ChannelError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("could not resolve {host}:{port}"),
            )))?;

        let transport = match kind {
            ChannelType::Tcp => Transport::TcpPending(peer),
            ChannelType::Udp => {
                let bind_addr: SocketAddr = if peer.is_ipv4() {
                    "0.0.0.0:0".parse().map_err(|_| ChannelError::NotConnectable)?
                } else {
                    "[::]:0".parse().map_err(|_| ChannelError::NotConnectable)?
                };
                Transport::Udp { socket: UdpSocket::bind(bind_addr)?, peer }
            }
        };

        Ok(Self::with_transport(transport))
    }

    /// Adopt an already established TCP stream (the accept side).
    pub fn from_stream(stream: TcpStream) -> Self {
        Self::with_transport(Transport::Tcp(stream))
    }

    /// Adopt a bound UDP socket together with a peer address.
    pub fn from_udp(socket: UdpSocket, peer: SocketAddr) -> Self {
        Self::with_transport(Transport::Udp { socket, peer })
    }

    fn with_transport(transport: Transport) -> Self {
        Self {
            transport,
            crypto: Crypto::None,
            block_len: DEFAULT_BLOCK_LEN,
            poisoned: false,
        }
    }

    /// Transport flavour of this channel.
    pub fn channel_type(&self) -> ChannelType {
        match self.transport {
            Transport::TcpPending(_) | Transport::Tcp(_) => ChannelType::Tcp,
            Transport::Udp { .. } => ChannelType::Udp,
        }
    }

    /// Change the block length. Fails outside `[MIN_BLOCK_LEN, MAX_BLOCK_LEN]`.
    pub fn set_block_len(&mut self, len: usize) -> Result<(), ChannelError> {
        if !(MIN_BLOCK_LEN..=MAX_BLOCK_LEN).contains(&len) {
            return Err(ChannelError::BlockLengthOutOfRange(len));
        }
        self.block_len = len;
        Ok(())
    }

    /// Current block length.
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Establish the TCP connection. Fails if already connected or UDP.
    pub fn connect(&mut self) -> Result<(), ChannelError> {
        match self.transport {
            Transport::TcpPending(peer) => {
                self.transport = Transport::Tcp(TcpStream::connect(peer)?);
                Ok(())
            }
            _ => Err(ChannelError::NotConnectable),
        }
    }

    /// Apply a read timeout to the underlying socket (`None` clears it).
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), ChannelError> {
        match &self.transport {
            Transport::TcpPending(_) => Err(ChannelError::NotConnectable),
            Transport::Tcp(stream) => Ok(stream.set_read_timeout(timeout)?),
            Transport::Udp { socket, .. } => Ok(socket.set_read_timeout(timeout)?),
        }
    }

    /// Install a symmetric key and reset the nonce counters.
    ///
    /// The [`Side`] fixes the nonce asymmetry: the client starts writing at
    /// nonce 0 and reading at nonce 1, the server the other way around.
    pub fn enable_encryption(&mut self, key: SymmetricKey, side: Side) {
        let mut local_nonce = Nonce::zero();
        let mut remote_nonce = Nonce::zero();
        match side {
            Side::Client => remote_nonce.advance(1),
            Side::Server => local_nonce.advance(1),
        }
        self.crypto = Crypto::Symmetric { key, local_nonce, remote_nonce };
    }

    /// Whether encryption is currently enabled.
    pub fn is_encrypted(&self) -> bool {
        matches!(self.crypto, Crypto::Symmetric { .. })
    }

    /// Frame `data` into blocks and send them.
    pub fn write_message(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        if self.poisoned {
            return Err(ChannelError::Poisoned);
        }
        if data.len() > u32::MAX as usize {
            return Err(ChannelError::LengthExceedsMax { got: data.len(), max: u32::MAX as usize });
        }
        let crypto = match &mut self.crypto {
            Crypto::None => None,
            Crypto::Symmetric { key, local_nonce, .. } => Some((&*key, local_nonce)),
        };
        write_framed(&mut self.transport, self.block_len, crypto, data)
    }

    /// Receive one framed message of at most `max_len` bytes.
    pub fn read_message(&mut self, max_len: usize) -> Result<Vec<u8>, ChannelError> {
        if self.poisoned {
            return Err(ChannelError::Poisoned);
        }
        let crypto = match &mut self.crypto {
            Crypto::None => None,
            Crypto::Symmetric { key, remote_nonce, .. } => Some((&*key, remote_nonce)),
        };
        let result = read_framed(&mut self.transport, self.block_len, crypto, max_len);
        if matches!(result, Err(ChannelError::DecryptFailed)) {
            self.poisoned = true;
        }
        result
    }

    /// Serialize a structured message and send it.
    pub fn write_typed<M: Serializable>(&mut self, message: &M) -> Result<(), ChannelError> {
        let bytes = message.to_bytes();
        if bytes.len() > MAX_TYPED_LEN {
            return Err(ChannelError::LengthExceedsMax { got: bytes.len(), max: MAX_TYPED_LEN });
        }
        self.write_message(&bytes)
    }

    /// Receive and deserialize a structured message.
    pub fn read_typed<M: Deserializable>(&mut self) -> Result<M, ChannelError> {
        let bytes = self.read_message(MAX_TYPED_LEN)?;
        Ok(M::from_bytes(&bytes)?)
    }

    /// Shut down the socket, unblocking any task waiting on it.
    pub fn shutdown(&self) -> Result<(), ChannelError> {
        if let Transport::Tcp(stream) = &self.transport {
            stream.shutdown(Shutdown::Both)?;
        }
        Ok(())
    }

    /// Pump data between this channel and local endpoints until either side
    /// reaches end of file.
    ///
    /// Messages received from the peer are written to `to_local`; every
    /// `sources` reader is drained into the channel as framed messages from
    /// its own thread. Consumes the channel: once a relay ends, the
    /// connection is done.
    pub fn relay(
        self,
        mut to_local: impl Write,
        sources: Vec<Box<dyn Read + Send>>,
    ) -> Result<(), ChannelError> {
        if self.poisoned {
            return Err(ChannelError::Poisoned);
        }

        let Transport::Tcp(stream) = self.transport else {
            return Err(ChannelError::NotConnectable);
        };

        let (key, local_nonce, remote_nonce) = match self.crypto {
            Crypto::None => (None, Nonce::zero(), Nonce::zero()),
            Crypto::Symmetric { key, local_nonce, remote_nonce } => {
                (Some(key), local_nonce, remote_nonce)
            }
        };

        let writer = Mutex::new(RelayWriter {
            transport: Transport::Tcp(stream.try_clone()?),
            block_len: self.block_len,
            key: key.clone(),
            nonce: local_nonce,
        });
        let mut reader = RelayReader {
            transport: Transport::Tcp(stream.try_clone()?),
            block_len: self.block_len,
            key,
            nonce: remote_nonce,
        };

        let result = thread::scope(|scope| {
            for mut source in sources {
                let writer = &writer;
                let stream = &stream;
                scope.spawn(move || {
                    let mut buf = [0u8; RELAY_BUF_LEN];
                    loop {
                        let n = match source.read(&mut buf) {
                            Ok(0) | Err(_) => break,
                            Ok(n) => n,
                        };
                        let mut writer = match writer.lock() {
                            Ok(writer) => writer,
                            Err(_) => break,
                        };
                        if writer.write(&buf[..n]).is_err() {
                            break;
                        }
                    }
                    // Source drained: tear the connection down so the peer
                    // and the reader loop below stop as well.
                    let _ = stream.shutdown(Shutdown::Both);
                });
            }

            let result = loop {
                let message = match reader.read() {
                    Ok(message) => message,
                    Err(ChannelError::PeerClosed) => break Ok(()),
                    Err(e) => break Err(e),
                };
                if let Err(e) = to_local.write_all(&message) {
                    break Err(ChannelError::Io(e));
                }
            };
            // Close the socket before the scope joins the source pumps so
            // none of them stays blocked on a dead connection.
            let _ = stream.shutdown(Shutdown::Both);
            result
        });

        result
    }
}

struct RelayWriter {
    transport: Transport,
    block_len: usize,
    key:       Option<SymmetricKey>,
    nonce:     Nonce,
}

impl RelayWriter {
    fn write(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        let crypto = self.key.as_ref().map(|key| (key, &mut self.nonce));
        write_framed(&mut self.transport, self.block_len, crypto, data)
    }
}

struct RelayReader {
    transport: Transport,
    block_len: usize,
    key:       Option<SymmetricKey>,
    nonce:     Nonce,
}

impl RelayReader {
    fn read(&mut self) -> Result<Vec<u8>, ChannelError> {
        let crypto = self.key.as_ref().map(|key| (key, &mut self.nonce));
        read_framed(&mut self.transport, self.block_len, crypto, RELAY_BUF_LEN)
    }
}

#[cfg(test)]
impl Channel {
    pub(crate) fn nonce_state(&self) -> Option<(Nonce, Nonce)> {
        match &self.crypto {
            Crypto::None => None,
            Crypto::Symmetric { local_nonce, remote_nonce, .. } => {
                Some((*local_nonce, *remote_nonce))
            }
        }
    }

    pub(crate) fn symmetric_key(&self) -> Option<&SymmetricKey> {
        match &self.crypto {
            Crypto::None => None,
            Crypto::Symmetric { key, .. } => Some(key),
        }
    }
}

// ─── Listener ────────────────────────────────────────────────────────────────

/// A TCP listener handing out [`Channel`]s, one per accepted connection.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind to `host:port`.
    pub fn bind(host: &str, port: u16) -> Result<Self, ChannelError> {
        Ok(Self { inner: TcpListener::bind((host, port))? })
    }

    /// The locally bound address (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ChannelError> {
        Ok(self.inner.local_addr()?)
    }

    /// Block until a client connects.
    pub fn accept(&self) -> Result<Channel, ChannelError> {
        let (stream, _) = self.inner.accept()?;
        Ok(Channel::from_stream(stream))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_pair() -> (Channel, Channel) {
        let listener = Listener::bind("127.0.0.1", 0).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || {
            let mut channel =
                Channel::from_host("127.0.0.1", addr.port(), ChannelType::Tcp).unwrap();
            channel.connect().unwrap();
            channel
        });
        let server = listener.accept().unwrap();
        (client.join().unwrap(), server)
    }

    fn encrypted_pair() -> (Channel, Channel) {
        let (mut client, mut server) = loopback_pair();
        let key = SymmetricKey::generate().unwrap();
        client.enable_encryption(key.clone(), Side::Client);
        server.enable_encryption(key, Side::Server);
        (client, server)
    }

    #[test]
    fn plaintext_roundtrip() {
        let (mut client, mut server) = loopback_pair();
        client.write_message(b"block framing test").unwrap();
        assert_eq!(server.read_message(4096).unwrap(), b"block framing test");
    }

    #[test]
    fn encrypted_roundtrip() {
        let (mut client, mut server) = encrypted_pair();
        client.write_message(b"sealed payload").unwrap();
        assert_eq!(server.read_message(4096).unwrap(), b"sealed payload");
        server.write_message(b"reply").unwrap();
        assert_eq!(client.read_message(4096).unwrap(), b"reply");
    }

    #[test]
    fn empty_message_roundtrip() {
        let (mut client, mut server) = encrypted_pair();
        client.write_message(b"").unwrap();
        assert_eq!(server.read_message(4096).unwrap(), b"");
    }

    #[test]
    fn multi_block_roundtrip() {
        let (mut client, mut server) = encrypted_pair();
        let data: Vec<u8> = (0..10_000).map(|i| i as u8).collect();
        client.write_message(&data).unwrap();
        assert_eq!(server.read_message(16_384).unwrap(), data);
    }

    #[test]
    fn minimum_block_len_carries_one_byte() {
        let (mut client, mut server) = encrypted_pair();
        client.set_block_len(MIN_BLOCK_LEN).unwrap();
        server.set_block_len(MIN_BLOCK_LEN).unwrap();
        client.write_message(b"z").unwrap();
        assert_eq!(server.read_message(4096).unwrap(), b"z");
    }

    #[test]
    fn block_len_bounds() {
        let (mut client, _server) = loopback_pair();
        assert!(matches!(
            client.set_block_len(MIN_BLOCK_LEN - 1),
            Err(ChannelError::BlockLengthOutOfRange(_))
        ));
        assert!(matches!(
            client.set_block_len(MAX_BLOCK_LEN + 1),
            Err(ChannelError::BlockLengthOutOfRange(_))
        ));
        assert!(client.set_block_len(MIN_BLOCK_LEN).is_ok());
        assert!(client.set_block_len(MAX_BLOCK_LEN).is_ok());
    }

    #[test]
    fn declared_length_over_max_is_rejected() {
        let (mut client, mut server) = loopback_pair();
        client.write_message(&[0u8; 600]).unwrap();
        assert!(matches!(
            server.read_message(100),
            Err(ChannelError::LengthExceedsMax { got: 600, max: 100 })
        ));
    }

    #[test]
    fn failed_authentication_poisons_channel() {
        let (mut client, mut server) = loopback_pair();
        client.enable_encryption(SymmetricKey::generate().unwrap(), Side::Client);
        server.enable_encryption(SymmetricKey::generate().unwrap(), Side::Server);

        client.write_message(b"payload").unwrap();
        assert!(matches!(server.read_message(4096), Err(ChannelError::DecryptFailed)));
        // Channel stays unusable afterwards.
        assert!(matches!(server.read_message(4096), Err(ChannelError::Poisoned)));
        assert!(matches!(server.write_message(b"x"), Err(ChannelError::Poisoned)));
    }

    #[test]
    fn nonces_mirror_after_traffic() {
        let (mut client, mut server) = encrypted_pair();
        client.write_message(b"one").unwrap();
        server.read_message(4096).unwrap();
        server.write_message(b"two").unwrap();
        client.read_message(4096).unwrap();

        let (client_local, client_remote) = client.nonce_state().unwrap();
        let (server_local, server_remote) = server.nonce_state().unwrap();
        assert_eq!(client_local, server_remote);
        assert_eq!(client_remote, server_local);
        assert_ne!(client_local, client_remote);
    }

    #[test]
    fn typed_roundtrip() {
        use capone_wire::messages::{Command, CommandEnvelope};

        let (mut client, mut server) = encrypted_pair();
        client.write_typed(&CommandEnvelope { command: Command::Request }).unwrap();
        let envelope: CommandEnvelope = server.read_typed().unwrap();
        assert_eq!(envelope.command, Command::Request);
    }

    #[test]
    fn typed_read_rejects_garbage() {
        use capone_wire::messages::CommandEnvelope;

        let (mut client, mut server) = encrypted_pair();
        client.write_message(&[0xff; 8]).unwrap();
        assert!(matches!(
            server.read_typed::<CommandEnvelope>(),
            Err(ChannelError::InvalidMessage(_))
        ));
    }

    #[test]
    fn connect_twice_fails() {
        let listener = Listener::bind("127.0.0.1", 0).unwrap();
        let addr = listener.local_addr().unwrap();
        let mut channel = Channel::from_host("127.0.0.1", addr.port(), ChannelType::Tcp).unwrap();
        channel.connect().unwrap();
        let _accepted = listener.accept().unwrap();
        assert!(matches!(channel.connect(), Err(ChannelError::NotConnectable)));
    }

    #[test]
    fn udp_roundtrip() {
        let server_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = server_socket.local_addr().unwrap().port();
        let placeholder = "127.0.0.1:1".parse().unwrap();
        let mut server = Channel::from_udp(server_socket, placeholder);

        let mut client = Channel::from_host("127.0.0.1", port, ChannelType::Udp).unwrap();
        client.write_message(b"datagram framing").unwrap();
        assert_eq!(server.read_message(4096).unwrap(), b"datagram framing");

        // The server learned the peer address from the first datagram.
        server.write_message(b"pong").unwrap();
        assert_eq!(client.read_message(4096).unwrap(), b"pong");
    }

    #[test]
    fn relay_pumps_sources_to_peer() {
        let (client, mut server) = encrypted_pair();

        let pump = thread::spawn(move || {
            let source: Box<dyn Read + Send> = Box::new(io::Cursor::new(b"relayed data".to_vec()));
            client.relay(io::sink(), vec![source]).unwrap();
        });

        assert_eq!(server.read_message(4096).unwrap(), b"relayed data");
        // Source EOF shuts the connection down.
        assert!(server.read_message(4096).is_err());
        pump.join().unwrap();
    }
}
