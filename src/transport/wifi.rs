//! Wi-Fi transport
//!
//! Finds a writer by UDP broadcast, then talks to it over a plain TCP
//! connection. Writers listen for the discovery probe on port 5012 and answer
//! from port 5015; the packet exchange itself runs on TCP port 80.

use bytes::BytesMut;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use super::{classify_response, Transport, TransportError, TransportResult};
use crate::protocol::{pack, Decoder, Packet, HEADER_SIZE};

/// Address the discovery probe is broadcast to
pub const BROADCAST_ADDRESS: &str = "255.255.255.255";

/// Port writers listen on for the discovery probe
pub const BROADCAST_PORT: u16 = 5012;

/// TCP port the writer serves the packet protocol on
pub const WRITER_PORT: u16 = 80;

/// Probe datagram writers recognize
const PROBE: &[u8] = b"Calling All Miras...\x00\x00\x00\x00\x00\x00\x00\x00";

/// Substring of the datagram a writer answers with
const PROBE_REPLY: &[u8] = b"Mira in the neighborhood";

/// Wi-Fi transport settings
#[derive(Debug, Clone)]
pub struct WifiConfig {
    /// Writer address, skipping discovery when set
    pub address: Option<IpAddr>,
    /// Port for the discovery broadcast
    pub broadcast_port: u16,
    /// Port for the TCP connection
    pub port: u16,
    /// Overall discovery budget
    pub discovery_timeout_ms: u64,
    /// How long to wait for an answer before re-broadcasting the probe
    pub probe_interval_ms: u64,
    /// TCP connect timeout
    pub connect_timeout_ms: u64,
    /// Per-exchange timeout
    pub exchange_timeout_ms: u64,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            address: None,
            broadcast_port: BROADCAST_PORT,
            port: WRITER_PORT,
            discovery_timeout_ms: 10_000,
            probe_interval_ms: 1_200,
            connect_timeout_ms: 10_000,
            exchange_timeout_ms: 3_000,
        }
    }
}

/// Broadcast the discovery probe until a writer answers.
pub async fn find_writer(config: &WifiConfig) -> TransportResult<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    socket.set_broadcast(true)?;

    let deadline =
        tokio::time::Instant::now() + Duration::from_millis(config.discovery_timeout_ms);
    let mut buf = [0u8; 1024];

    tracing::debug!("Searching for Wi-Fi writers...");
    while tokio::time::Instant::now() < deadline {
        socket
            .send_to(PROBE, (BROADCAST_ADDRESS, config.broadcast_port))
            .await?;

        match tokio::time::timeout(
            Duration::from_millis(config.probe_interval_ms),
            socket.recv_from(&mut buf),
        )
        .await
        {
            Ok(Ok((n, addr))) => {
                if buf[..n]
                    .windows(PROBE_REPLY.len())
                    .any(|window| window == PROBE_REPLY)
                {
                    tracing::info!("Writer found at {}", addr.ip());
                    return Ok(addr.ip());
                }
                // Some other broadcast traffic; keep probing.
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {}
        }
    }

    Err(TransportError::DeviceNotFound)
}

/// Wi-Fi link to a writer
pub struct WifiTransport {
    config: WifiConfig,
    stream: Option<TcpStream>,
    decoder: Decoder,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl WifiTransport {
    pub fn new(config: WifiConfig) -> Self {
        Self {
            config,
            stream: None,
            decoder: Decoder::new(),
            read_buf: BytesMut::with_capacity(1024),
            write_buf: BytesMut::with_capacity(HEADER_SIZE + 16),
        }
    }

    /// Address of the connected writer
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }
}

#[async_trait::async_trait]
impl Transport for WifiTransport {
    async fn connect(&mut self) -> TransportResult<()> {
        // Re-connecting an already connected transport starts over.
        self.disconnect().await;

        let address = match self.config.address {
            Some(address) => address,
            None => find_writer(&self.config).await?,
        };

        let target = SocketAddr::new(address, self.config.port);
        let stream = tokio::time::timeout(
            Duration::from_millis(self.config.connect_timeout_ms),
            TcpStream::connect(target),
        )
        .await
        .map_err(|_| TransportError::Timeout)??;

        tracing::info!("Connected to writer at {}", target);
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.decoder = Decoder::new();
        self.read_buf.clear();
    }

    async fn send_receive(&mut self, request: &Packet) -> TransportResult<Packet> {
        let Self {
            stream,
            decoder,
            read_buf,
            write_buf,
            config,
        } = self;
        let stream = stream.as_mut().ok_or(TransportError::NotConnected)?;

        write_buf.clear();
        pack(request, write_buf);

        let exchange = async {
            stream.write_all(write_buf).await?;
            stream.flush().await?;

            loop {
                if let Some(response) = decoder.decode(read_buf)? {
                    return Ok(response);
                }

                let mut chunk = [0u8; 1024];
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(TransportError::NoResponse);
                }
                read_buf.extend_from_slice(&chunk[..n]);
            }
        };

        let response = tokio::time::timeout(
            Duration::from_millis(config.exchange_timeout_ms),
            exchange,
        )
        .await
        .map_err(|_| TransportError::Timeout)??;

        classify_response(request, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{unpack, PacketType, SequenceCounter, MAX_READ};
    use tokio::net::TcpListener;

    fn local_config(port: u16) -> WifiConfig {
        WifiConfig {
            address: Some("127.0.0.1".parse().unwrap()),
            port,
            exchange_timeout_ms: 500,
            ..Default::default()
        }
    }

    /// Accept one connection and answer every request with an echo carrying
    /// the given payload.
    async fn serve_one(listener: TcpListener, payload: Vec<u8>) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 1024];
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            let request = unpack(&buf[..n]).unwrap();
            let mut response = request.clone();
            response.data_length = payload.len() as u32;
            response.payload = payload.clone();

            let mut out = BytesMut::new();
            pack(&response, &mut out);
            stream.write_all(&out).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_send_receive_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_one(listener, vec![0xC0; 8]));

        let counter = SequenceCounter::new();
        let mut transport = WifiTransport::new(local_config(port));
        transport.connect().await.unwrap();

        let request = Packet::read_request(&counter, 0, MAX_READ);
        let response = transport.send_receive(&request).await.unwrap();
        assert_eq!(response.packet_type, PacketType::ReadFile);
        assert_eq!(response.sequence_number, request.sequence_number);
        assert_eq!(response.data_length, 8);

        transport.disconnect().await;
        assert!(transport.peer_addr().is_none());
    }

    #[tokio::test]
    async fn test_send_receive_times_out_without_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accept but never answer.
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let counter = SequenceCounter::new();
        let mut transport = WifiTransport::new(local_config(port));
        transport.connect().await.unwrap();

        let request = Packet::read_request(&counter, 0, MAX_READ);
        let result = transport.send_receive(&request).await;
        assert!(matches!(result, Err(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn test_send_receive_requires_connection() {
        let counter = SequenceCounter::new();
        let mut transport = WifiTransport::new(local_config(1));
        let request = Packet::read_request(&counter, 0, MAX_READ);
        assert!(matches!(
            transport.send_receive(&request).await,
            Err(TransportError::NotConnected)
        ));
    }
}
