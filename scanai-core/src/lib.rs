//! Frame admission throttling, frame/response synchronization, and
//! temporal consensus stabilization for the ScanAI vision pipeline.
//! Networking lives in `scanai-transport`; this crate is the part of
//! the data plane that never touches a socket directly.

pub mod broadcast;
pub mod consensus;
pub mod display_sync;
pub mod flat_map;
pub mod metrics;
pub mod throttle;

pub use broadcast::{run_broadcast_server, BroadcastMetrics};
pub use consensus::{iou, Consensus, ConsensusState, PublishItem, PublishPayload};
pub use display_sync::{DisplaySync, DisplaySyncError};
pub use flat_map::FlatMap;
pub use metrics::PipelineMetrics;
pub use throttle::{Admission, Throttler};
