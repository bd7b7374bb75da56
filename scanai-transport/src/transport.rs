use std::net::SocketAddr;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, ByteOrder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use scanai_proto::fragment;

use crate::error::{TransportError, TransportResult};
use crate::quota::ReassemblyQuota;
use crate::reassembly::{ReassemblyMetrics, ReassemblyTable};

/// A remote endpoint, tagged by the transport scheme it selects.
/// Selection happens once at connect time and is not renegotiated
/// mid-session: prefer this sum type over subtype polymorphism so
/// callers can't accidentally mix datagram and stream semantics on one
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Datagram(SocketAddr),
    Stream(SocketAddr),
}

impl Endpoint {
    /// Parses `udp://host:port` or `tcp://host:port`.
    pub fn parse(s: &str) -> TransportResult<Self> {
        if let Some(rest) = s.strip_prefix("udp://") {
            return rest
                .parse()
                .map(Endpoint::Datagram)
                .map_err(|e| TransportError::Resolve(e.to_string()));
        }
        if let Some(rest) = s.strip_prefix("tcp://") {
            return rest
                .parse()
                .map(Endpoint::Stream)
                .map_err(|e| TransportError::Resolve(e.to_string()));
        }
        Err(TransportError::Resolve(format!(
            "endpoint missing udp:// or tcp:// scheme: {s}"
        )))
    }
}

/// Counters incremented per successful local send/receive, surfaced on
/// the metrics stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportMetrics {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub chunks_sent: u64,
    pub frames_received: u64,
    pub reassembly: ReassemblyMetrics,
}

enum Backend {
    Datagram { socket: UdpSocket, peer: SocketAddr },
    Stream { stream: TcpStream },
}

/// A connected transport: either a datagram socket fragmenting each
/// payload into envelopes, or a framed stream delivering whole
/// payloads with fragmentation elided.
pub struct Transport {
    backend: Backend,
    next_message_id: u64,
    reassembly: ReassemblyTable,
    metrics: TransportMetrics,
}

const STREAM_LENGTH_PREFIX_BYTES: usize = 4;

impl Transport {
    /// Binds and connects to `endpoint`, selecting the backend implied
    /// by its scheme. `local_addr` is used only for the datagram case.
    pub async fn connect(
        endpoint: Endpoint,
        local_addr: SocketAddr,
        reassembly_timeout: Duration,
        reassembly_quota_bytes: usize,
        connect_timeout: Duration,
    ) -> TransportResult<Self> {
        let backend = tokio::time::timeout(connect_timeout, async {
            match endpoint {
                Endpoint::Datagram(peer) => {
                    let socket = UdpSocket::bind(local_addr).await?;
                    Ok::<Backend, std::io::Error>(Backend::Datagram { socket, peer })
                }
                Endpoint::Stream(peer) => {
                    let stream = TcpStream::connect(peer).await?;
                    Ok(Backend::Stream { stream })
                }
            }
        })
        .await
        .map_err(|_| TransportError::Timeout(connect_timeout))?
        .map_err(TransportError::Bind)?;

        Ok(Self {
            backend,
            next_message_id: 0,
            reassembly: ReassemblyTable::new(
                ReassemblyQuota::new(reassembly_quota_bytes),
                reassembly_timeout,
            ),
            metrics: TransportMetrics::default(),
        })
    }

    pub fn metrics(&self) -> TransportMetrics {
        let mut m = self.metrics;
        m.reassembly = self.reassembly.metrics();
        m
    }

    /// Fragments (if datagram) and transmits `payload`. Chunks are
    /// written without internal retransmission.
    pub async fn send(&mut self, payload: &[u8]) -> TransportResult<()> {
        match &mut self.backend {
            Backend::Datagram { socket, peer } => {
                let message_id = self.next_message_id;
                self.next_message_id = scanai_proto::next_message_id(message_id);
                let chunks = fragment(payload, message_id)
                    .map_err(|e| TransportError::Resolve(e.to_string()))?;
                for chunk in &chunks {
                    let bytes = chunk.encode();
                    socket.send_to(&bytes, *peer).await?;
                    self.metrics.chunks_sent += 1;
                    self.metrics.bytes_sent += bytes.len() as u64;
                }
                self.metrics.frames_sent += 1;
            }
            Backend::Stream { stream } => {
                let mut len_buf = [0u8; STREAM_LENGTH_PREFIX_BYTES];
                BigEndian::write_u32(&mut len_buf, payload.len() as u32);
                stream.write_all(&len_buf).await?;
                stream.write_all(payload).await?;
                self.metrics.frames_sent += 1;
                self.metrics.chunks_sent += 1;
                self.metrics.bytes_sent += payload.len() as u64;
            }
        }
        Ok(())
    }

    /// Waits for and returns the next fully reassembled payload. For
    /// the datagram backend this may consume several inbound
    /// datagrams before one completes; for the stream backend each
    /// call yields exactly one payload. Returns `Ok(None)` on a clean
    /// stream shutdown.
    pub async fn recv(&mut self) -> TransportResult<Option<Vec<u8>>> {
        match &mut self.backend {
            Backend::Datagram { socket, .. } => {
                let mut buf = vec![0u8; scanai_proto::MAX_BODY_BYTES + 64];
                loop {
                    let (len, _from) = socket.recv_from(&mut buf).await?;
                    let now = Instant::now();
                    if let Some(payload) = self.reassembly.ingest_datagram(&buf[..len], now) {
                        self.metrics.frames_received += 1;
                        return Ok(Some(payload));
                    }
                    self.reassembly.evict_stale(now);
                }
            }
            Backend::Stream { stream } => {
                let mut len_buf = [0u8; STREAM_LENGTH_PREFIX_BYTES];
                if let Err(e) = stream.read_exact(&mut len_buf).await {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        return Ok(None);
                    }
                    return Err(TransportError::Bind(e));
                }
                let len = BigEndian::read_u32(&len_buf) as usize;
                let mut payload = vec![0u8; len];
                stream.read_exact(&mut payload).await?;
                self.metrics.frames_received += 1;
                Ok(Some(payload))
            }
        }
    }

    /// Evicts stale reassembly partials independent of the receive
    /// loop, e.g. from a dedicated timer task.
    pub fn evict_stale_reassembly(&mut self, now: Instant) -> usize {
        self.reassembly.evict_stale(now)
    }

    /// Closes the underlying socket. Synchronous from the caller's
    /// perspective: any in-flight send is left to complete at the OS
    /// level.
    pub fn disconnect(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_datagram_and_stream_endpoints() {
        assert_eq!(
            Endpoint::parse("udp://127.0.0.1:9000").unwrap(),
            Endpoint::Datagram("127.0.0.1:9000".parse().unwrap())
        );
        assert_eq!(
            Endpoint::parse("tcp://127.0.0.1:9000").unwrap(),
            Endpoint::Stream("127.0.0.1:9000".parse().unwrap())
        );
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(Endpoint::parse("127.0.0.1:9000").is_err());
    }

    #[tokio::test]
    async fn datagram_round_trip_reassembles_fragmented_payload() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let mut client = Transport::connect(
            Endpoint::Datagram(server_addr),
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_secs(5),
            1 << 20,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let payload = vec![0x42u8; scanai_proto::MAX_BODY_BYTES * 2 + 100];
        client.send(&payload).await.unwrap();

        // Relay every chunk the client sent back through a second
        // Transport acting as the receiving side.
        let mut received_chunks = Vec::new();
        let mut buf = vec![0u8; 2048];
        loop {
            let (len, _from) =
                tokio::time::timeout(Duration::from_millis(200), server.recv_from(&mut buf))
                    .await
                    .unwrap()
                    .unwrap();
            received_chunks.push(buf[..len].to_vec());
            if received_chunks.len()
                == payload.len().div_ceil(scanai_proto::MAX_BODY_BYTES).max(1)
            {
                break;
            }
        }

        let mut table = ReassemblyTable::new(ReassemblyQuota::new(1 << 20), Duration::from_secs(5));
        let mut assembled = None;
        for chunk in received_chunks {
            assembled = table.ingest_datagram(&chunk, Instant::now());
        }
        assert_eq!(assembled, Some(payload));
        assert_eq!(client.metrics().frames_sent, 1);
    }

    #[tokio::test]
    async fn stream_round_trip_delivers_whole_payload() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).await.unwrap();
            let len = BigEndian::read_u32(&len_buf) as usize;
            let mut payload = vec![0u8; len];
            stream.read_exact(&mut payload).await.unwrap();
            payload
        });

        let mut client = Transport::connect(
            Endpoint::Stream(addr),
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_secs(5),
            1 << 20,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let payload = b"a whole unfragmented stream payload".to_vec();
        client.send(&payload).await.unwrap();

        let received = server_task.await.unwrap();
        assert_eq!(received, payload);
    }
}
