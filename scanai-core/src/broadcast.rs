use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::consensus::PublishPayload;

/// Counters for the local loopback broadcast server, surfaced on the
/// metrics stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastMetrics {
    pub payloads_published: u64,
    pub payloads_dropped_no_client: u64,
    pub clients_accepted: u64,
}

/// Accepts a single POS-consumer client on `127.0.0.1:<port>` and
/// forwards consensus publications to it as newline-delimited JSON.
/// A client that never connects does not block publication: payloads
/// are simply dropped (and counted) until one attaches, matching the
/// pipeline's no-delivery-guarantee stance on individual snapshots.
pub async fn run_broadcast_server(
    port: u16,
    mut payloads: mpsc::Receiver<PublishPayload>,
    metrics_tx: mpsc::UnboundedSender<BroadcastMetrics>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let mut metrics = BroadcastMetrics::default();
    let mut client: Option<tokio::net::TcpStream> = None;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _addr) = accepted?;
                client = Some(stream);
                metrics.clients_accepted += 1;
                let _ = metrics_tx.send(metrics);
            }
            payload = payloads.recv() => {
                let Some(payload) = payload else { break };
                match &mut client {
                    Some(stream) => {
                        let mut line = serde_json::to_vec(&payload).unwrap_or_default();
                        line.push(b'\n');
                        if stream.write_all(&line).await.is_err() {
                            client = None;
                        } else {
                            metrics.payloads_published += 1;
                        }
                    }
                    None => {
                        metrics.payloads_dropped_no_client += 1;
                    }
                }
                let _ = metrics_tx.send(metrics);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn delivers_payload_to_connected_client_as_jsonl() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // free the port, run_broadcast_server rebinds it

        let (tx, rx) = mpsc::channel(4);
        let (metrics_tx, _metrics_rx) = mpsc::unbounded_channel();
        let server = tokio::spawn(run_broadcast_server(addr.port(), rx, metrics_tx));

        // Give the listener a moment to bind before connecting.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();

        tx.send(PublishPayload {
            t: 1_700_000_000_000,
            status: "active",
            items: vec![],
        })
        .await
        .unwrap();

        let mut buf = vec![0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        let text = String::from_utf8(buf[..n].to_vec()).unwrap();
        assert!(text.contains("\"status\":\"active\""));
        assert!(text.ends_with('\n'));

        drop(tx);
        let _ = server.await;
    }
}
