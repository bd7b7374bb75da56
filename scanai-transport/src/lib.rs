//! Networking layer for the ScanAI vision pipeline client: the
//! datagram/stream transport, reassembly, the reconnect-aware session
//! state machine, and their supporting primitives. Wire formats live
//! in `scanai-proto`; this crate is where they meet an actual socket.

pub mod backoff;
pub mod error;
pub mod identity;
pub mod quota;
pub mod reassembly;
pub mod rtt;
pub mod session;
pub mod status;
pub mod transport;

pub use backoff::Backoff;
pub use error::{TransportError, TransportResult};
pub use identity::generate_session_id;
pub use quota::ReassemblyQuota;
pub use reassembly::{ReassemblyMetrics, ReassemblyTable};
pub use rtt::RttEstimator;
pub use session::{Session, SessionState};
pub use status::{classify, ConnectionPhase, ConnectionStatus, ErrorCategory};
pub use transport::{Endpoint, Transport, TransportMetrics};
