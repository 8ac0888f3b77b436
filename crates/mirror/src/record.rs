use crossbeam_channel::{Receiver, Sender};
use crossframe_buffer::TripleBufferReader;
use crossframe_common::{InstanceId, ThreadId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::args::ConstructorArgs;

/// Request to build a proxy for one origin on one target thread.
///
/// Produced once by `OriginBuilder::finalize`, consumed once by the target
/// thread's `ProxyRegistry`. The reader end of the origin's triple buffer for
/// that thread travels inside it.
#[derive(Debug)]
pub struct ConstructionRecord {
    pub type_tag: String,
    pub instance_id: InstanceId,
    pub buffer: TripleBufferReader,
    /// `Schema::fingerprint` of the origin's layout.
    pub layout: u64,
    pub args: ConstructorArgs,
    pub origin_thread: ThreadId,
}

impl ConstructionRecord {
    pub fn header(&self) -> RecordHeader {
        RecordHeader {
            type_tag: self.type_tag.clone(),
            id: self.instance_id.0,
            tb: BufferInfo {
                byte_length: self.buffer.byte_length(),
            },
            args: self.args.to_value(),
            origin_thread: self.origin_thread.0,
        }
    }
}

/// Serializable view of a construction record, without the shared memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordHeader {
    pub type_tag: String,
    pub id: u32,
    pub tb: BufferInfo,
    pub args: Value,
    pub origin_thread: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferInfo {
    pub byte_length: usize,
}

/// Everything an origin thread sends to a target thread.
#[derive(Debug)]
pub enum MirrorMessage {
    Construct(ConstructionRecord),
    /// The origin was dropped; the proxy should be removed.
    Retire {
        instance_id: InstanceId,
        origin_thread: ThreadId,
    },
}

pub type RecordSender = Sender<MirrorMessage>;
pub type RecordReceiver = Receiver<MirrorMessage>;

/// Unbounded channel from one origin thread to one target thread.
pub fn record_channel() -> (RecordSender, RecordReceiver) {
    crossbeam_channel::unbounded()
}
