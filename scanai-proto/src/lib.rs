//! Wire protocol for the ScanAI vision pipeline.
//!
//! Two codecs live here: the binary upload record and its fragment
//! envelope (§6.1), and the JSON control/response records exchanged
//! with the inference server (§6.2, §6.3). Neither codec owns any
//! network I/O — that belongs to `scanai-transport`.

pub mod class_table;
pub mod config;
pub mod control;
pub mod error;
pub mod fragment;
pub mod response;
pub mod upload;

pub use class_table::ClassTable;
pub use config::PipelineConfig;
pub use control::{Heartbeat, HeartbeatKind};
pub use error::{ProtoError, ProtoResult};
pub use fragment::{fragment, next_message_id, FragmentEnvelope, MAX_BODY_BYTES};
pub use response::{decode_response, BBox, Detection, ResponseOutcome, ResponseRecord};
pub use upload::UploadRecord;
