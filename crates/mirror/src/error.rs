use crossframe_buffer::BufferError;
use crossframe_common::ThreadId;
use crossframe_layout::LayoutError;

/// Errors from declaring, building, publishing or reading mirrored objects.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("type `{0}` is not mirrored from this thread")]
    NotMirrored(String),
    #[error("`{type_name}` mirrors to {target} but no channel to it is connected")]
    NoRoute { type_name: String, target: ThreadId },
    #[error("instance ids exhausted")]
    IdsExhausted,
    #[error("constructor argument {index} could not be encoded: {source}")]
    ArgEncode {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("proxy type tag `{0}` is already registered")]
    DuplicateTag(String),
}
