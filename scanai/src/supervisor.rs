use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, mpsc, watch};

use scanai_core::{
    run_broadcast_server, Admission, BroadcastMetrics, Consensus, DisplaySync, FlatMap,
    PipelineMetrics, PublishPayload, Throttler,
};
use scanai_proto::{decode_response, ClassTable, Detection, Heartbeat, PipelineConfig, ResponseOutcome, UploadRecord};
use scanai_transport::{ConnectionStatus, Endpoint, RttEstimator, Session, SessionState, Transport};

use crate::collaborators::{AuthTokenProvider, Encoder, FrameMetadataSource};
use crate::error::SupervisorError;
use crate::logging::LogThrottle;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

const LOCAL_BIND_ADDR: &str = "0.0.0.0:0";

/// External-facing streams the core exposes to the sibling POS app and
/// any host-app UI: stabilized detection snapshots, coarse connection
/// status, aggregated metrics, and the raw per-response detection
/// list (for overlays that want more than the stabilized view).
/// Cloned receivers so multiple collaborators can each subscribe.
pub struct PipelineHandles {
    pub status: watch::Receiver<ConnectionStatus>,
    pub metrics: watch::Receiver<PipelineMetrics>,
    pub detections: broadcast::Receiver<Vec<Detection>>,
    pub stabilized: broadcast::Receiver<PublishPayload>,
}

/// Lifecycle supervisor: constructs every component in dependency
/// order, owns the single-threaded cooperative run loop, and
/// aggregates metrics and throttled logging across the pipeline. The
/// camera callback, encoder, auth token getter, and transport socket
/// are the only points where control leaves this loop.
pub struct Supervisor {
    config: PipelineConfig,
    class_table: ClassTable,
    endpoint: Endpoint,
    camera: Box<dyn FrameMetadataSource>,
    encoder: Box<dyn Encoder>,
    auth: Box<dyn AuthTokenProvider>,
    status_tx: watch::Sender<ConnectionStatus>,
    metrics_tx: watch::Sender<PipelineMetrics>,
    detections_tx: broadcast::Sender<Vec<Detection>>,
    stabilized_tx: broadcast::Sender<PublishPayload>,
}

impl Supervisor {
    pub fn new(
        config: PipelineConfig,
        class_table: ClassTable,
        endpoint: Endpoint,
        camera: Box<dyn FrameMetadataSource>,
        encoder: Box<dyn Encoder>,
        auth: Box<dyn AuthTokenProvider>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::default());
        let (metrics_tx, _) = watch::channel(PipelineMetrics::default());
        let (detections_tx, _) = broadcast::channel(64);
        let (stabilized_tx, _) = broadcast::channel(64);
        Self {
            config,
            class_table,
            endpoint,
            camera,
            encoder,
            auth,
            status_tx,
            metrics_tx,
            detections_tx,
            stabilized_tx,
        }
    }

    /// Subscribes to the pipeline's external streams. Can be called
    /// any number of times, including after `run` has started.
    pub fn handles(&self) -> PipelineHandles {
        PipelineHandles {
            status: self.status_tx.subscribe(),
            metrics: self.metrics_tx.subscribe(),
            detections: self.detections_tx.subscribe(),
            stabilized: self.stabilized_tx.subscribe(),
        }
    }

    fn publish_status(&self, session: &Session, latest_error: Option<String>) {
        let mut status = ConnectionStatus::from_state(session.state());
        status.latest_error = latest_error;
        let _ = self.status_tx.send(status);
    }

    /// Publishes status for an actual transport failure, classifying
    /// it into `{ServerDown, NoInternet, AppError}` per the
    /// error-handling design rather than just stringifying it.
    fn publish_transport_error(&self, session: &Session, error: &scanai_transport::TransportError) {
        let status = ConnectionStatus::from_transport_error(session.state(), error);
        let _ = self.status_tx.send(status);
    }

    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let mut session = Session::new(
            now_ms(),
            Duration::from_millis(self.config.backoff_initial_ms),
            Duration::from_millis(self.config.backoff_max_ms),
            self.config.max_retries,
        );
        session.begin_connect();
        self.publish_status(&session, None);

        let local_addr: SocketAddr = LOCAL_BIND_ADDR.parse().unwrap();
        let mut transport = match Transport::connect(
            self.endpoint,
            local_addr,
            self.config.reassembly_timeout(),
            self.config.reassembly_quota_bytes,
            self.config.connect_timeout(),
        )
        .await
        {
            Ok(t) => {
                session.connect_succeeded();
                self.publish_status(&session, None);
                tracing::info!(session_id = session.session_id(), "connected");
                Some(t)
            }
            Err(e) => {
                let now = Instant::now();
                session.connect_failed(now);
                self.publish_transport_error(&session, &e);
                tracing::warn!(error = %e, "initial connect failed, scheduling reconnect");
                None
            }
        };

        let mut throttler = Throttler::with_ghost_timeout(Instant::now(), self.config.ghost_timeout());
        let mut display_sync = DisplaySync::new(self.config.display_max_buffer);
        let mut consensus = Consensus::new(
            self.config.consensus_window(),
            self.config.presence_threshold,
            self.config.stability_iou_threshold,
            self.config.stability_presence_threshold,
            self.config.soft_carry_enabled,
        );
        consensus.start();

        let mut rtt = RttEstimator::new();
        let mut sent_at: FlatMap<u64, Instant> = FlatMap::new();

        let (broadcast_metrics_tx, mut broadcast_metrics_rx) = mpsc::unbounded_channel::<BroadcastMetrics>();
        let (server_payload_tx, server_payload_rx) = mpsc::channel::<PublishPayload>(32);
        tokio::spawn(run_broadcast_server(
            self.config.broadcast_port,
            server_payload_rx,
            broadcast_metrics_tx,
        ));

        let mut consensus_tick = tokio::time::interval(self.config.consensus_tick());
        let mut heartbeat_tick = tokio::time::interval(self.config.heartbeat_interval());
        let mut log_throttle = LogThrottle::new(Duration::from_secs(30));
        let mut next_sequence: u64 = 0;
        let mut last_broadcast_metrics = BroadcastMetrics::default();
        let mut server_reported_failures: u64 = 0;

        loop {
            let reconnect_sleep = match session.state() {
                SessionState::Reconnecting { retry_at, .. } => {
                    tokio::time::sleep_until(tokio::time::Instant::from_std(*retry_at))
                }
                _ => tokio::time::sleep(Duration::from_secs(3600)),
            };
            tokio::pin!(reconnect_sleep);

            tokio::select! {
                frame = self.camera.next_frame(),
                    if transport.is_some() && *session.state() == SessionState::Connected =>
                {
                    let Some(frame) = frame else { break };
                    if throttler.decide(Instant::now()) == Admission::Skip {
                        continue;
                    }
                    let sequence = next_sequence;
                    next_sequence += 1;

                    let encoded_bytes = self.encoder.encode(frame.frame_id).await?;
                    if let Err(e) = display_sync.insert(sequence, None, encoded_bytes.clone()) {
                        if log_throttle.should_emit("display_sync_overflow", Instant::now()) {
                            tracing::warn!(error = %e, "display sync buffer overflow");
                        }
                    }

                    let token = self.auth.current_token();
                    if token.is_none() && log_throttle.should_emit("missing_token", Instant::now()) {
                        tracing::warn!("sending upload without auth token");
                    }

                    let record = UploadRecord {
                        token: token.unwrap_or_default(),
                        session_id: session.session_id().to_string(),
                        sequence,
                        width: self.encoder.width(),
                        height: self.encoder.height(),
                        format: self.encoder.format().to_string(),
                        payload: encoded_bytes,
                    };

                    match record.encode() {
                        Ok(bytes) => {
                            let transport_ref = transport.as_mut().expect("guarded by select condition");
                            match transport_ref.send(&bytes).await {
                                Ok(()) => {
                                    throttler.record_sent();
                                    sent_at.insert(sequence, Instant::now());
                                }
                                Err(e) => {
                                    session.connection_lost(Instant::now());
                                    self.publish_transport_error(&session, &e);
                                }
                            }
                        }
                        Err(e) => {
                            if log_throttle.should_emit("field_too_long", Instant::now()) {
                                tracing::warn!(error = %e, "dropping oversized upload record");
                            }
                        }
                    }
                }

                received = async { transport.as_mut().unwrap().recv().await }, if transport.is_some() => {
                    match received {
                        Ok(Some(bytes)) => {
                            match decode_response(&bytes, &self.class_table) {
                                Ok(ResponseOutcome::Response(record)) => {
                                    throttler.record_ack(Instant::now(), record.buffer_size);
                                    display_sync.on_response(&record);

                                    if !record.success {
                                        server_reported_failures += 1;
                                        if log_throttle.should_emit("server_reported_failure", Instant::now()) {
                                            tracing::warn!(
                                                frame_sequence = ?record.frame_sequence,
                                                "server reported failure for frame"
                                            );
                                        }
                                    }

                                    if let Some(seq) = record.frame_sequence {
                                        if let Some(sent) = sent_at.remove_through(&seq) {
                                            rtt.update(Instant::now().duration_since(sent));
                                        }
                                    }

                                    if !record.objects.is_empty() {
                                        let _ = self.detections_tx.send(record.objects.clone());
                                        consensus.enqueue_frame(&record.objects, Instant::now());
                                    }
                                }
                                Ok(ResponseOutcome::AuthExpired(message)) => {
                                    tracing::warn!(%message, "auth expired, tearing down session");
                                    session.disconnect();
                                    self.publish_status(&session, Some(message));
                                    break;
                                }
                                Err(e) => {
                                    if log_throttle.should_emit("decode_error", Instant::now()) {
                                        tracing::warn!(error = %e, "dropping malformed response");
                                    }
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            if log_throttle.should_emit("transport_error", Instant::now()) {
                                tracing::warn!(error = %e, "transport error");
                            }
                            session.connection_lost(Instant::now());
                            transport = None;
                            self.publish_transport_error(&session, &e);
                        }
                    }
                }

                _ = consensus_tick.tick() => {
                    if let Some(payload) = consensus.tick(Instant::now(), now_ms(), &self.class_table) {
                        let _ = self.stabilized_tx.send(payload.clone());
                        let _ = server_payload_tx.try_send(payload);
                    }

                    while let Ok(m) = broadcast_metrics_rx.try_recv() {
                        last_broadcast_metrics = m;
                    }

                    let transport_metrics = transport.as_ref().map(|t| t.metrics()).unwrap_or_default();
                    let snapshot = PipelineMetrics {
                        frames_sent: transport_metrics.frames_sent,
                        bytes_sent: transport_metrics.bytes_sent,
                        chunks_sent: transport_metrics.chunks_sent,
                        frames_received: transport_metrics.frames_received,
                        reassembly_completed: transport_metrics.reassembly.completed,
                        reassembly_evicted: transport_metrics.reassembly.evicted,
                        reassembly_quota_rejected: transport_metrics.reassembly.quota_rejected,
                        reassembly_malformed_dropped: transport_metrics.reassembly.malformed_dropped,
                        server_reported_failures,
                        throttle_stage: throttler.stage(),
                        throttle_skipped: throttler.skipped_total(),
                        throttle_admitted: throttler.admitted_total(),
                        display_sync_misses: display_sync.misses(),
                        display_sync_overflows: display_sync.overflows(),
                        display_sync_pending: display_sync.pending_len(),
                        consensus_running: consensus.state() == scanai_core::ConsensusState::Running,
                        consensus_published: consensus.published_total(),
                        consensus_dropped_classes: consensus.dropped_classes_total(),
                        broadcast: last_broadcast_metrics,
                        heartbeat_rtt_ms: (rtt.samples() > 0).then(|| rtt.smoothed().as_millis() as u64),
                    };
                    let _ = self.metrics_tx.send(snapshot);
                }

                _ = heartbeat_tick.tick(), if transport.is_some() && *session.state() == SessionState::Connected => {
                    let heartbeat = Heartbeat::new(now_ms(), self.auth.current_token());
                    let bytes = heartbeat.to_json()?;
                    let transport_ref = transport.as_mut().expect("guarded by select condition");
                    if let Err(e) = transport_ref.send(&bytes).await {
                        if log_throttle.should_emit("heartbeat_failed", Instant::now()) {
                            tracing::warn!(error = %e, "heartbeat send failed");
                        }
                        session.connection_lost(Instant::now());
                        transport = None;
                        self.publish_transport_error(&session, &e);
                    }
                }

                _ = &mut reconnect_sleep, if matches!(session.state(), SessionState::Reconnecting { .. }) => {
                    tracing::info!(session_id = session.session_id(), "attempting reconnect");
                    match Transport::connect(
                        self.endpoint,
                        local_addr,
                        self.config.reassembly_timeout(),
                        self.config.reassembly_quota_bytes,
                        self.config.connect_timeout(),
                    )
                    .await
                    {
                        Ok(t) => {
                            transport = Some(t);
                            session.connect_succeeded();
                            self.publish_status(&session, None);
                            tracing::info!(session_id = session.session_id(), "reconnected");
                        }
                        Err(e) => {
                            session.reconnect_failed(Instant::now());
                            self.publish_transport_error(&session, &e);
                            if log_throttle.should_emit("reconnect_failed", Instant::now()) {
                                tracing::warn!(error = %e, "reconnect attempt failed");
                            }
                        }
                    }
                }
            }

            if session.is_terminal() {
                self.publish_status(&session, Some("reconnect attempts exhausted".to_string()));
                return Err(SupervisorError::SessionFailed);
            }
        }

        Ok(())
    }
}
