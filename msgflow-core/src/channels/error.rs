use thiserror::Error;

/// Wiring and routing errors.
///
/// All of these are configuration mistakes: they surface while the pipeline
/// is being wired (or on the first publish) and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel name must not be empty")]
    InvalidName,

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("channel {channel} carries {expected}, not {found}")]
    TypeMismatch {
        channel: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("channel {channel} already feeds a transform stage")]
    DuplicateTransform { channel: String },

    #[error("transform stages form a cycle through channel {channel}")]
    TransformCycle { channel: String },

    #[error("channel {channel} has consumers but nothing produces into it")]
    NoProducer { channel: String },
}

impl ChannelError {
    pub(crate) fn type_mismatch<T>(channel: &str, expected: &'static str) -> Self {
        ChannelError::TypeMismatch {
            channel: channel.to_string(),
            expected,
            found: std::any::type_name::<T>(),
        }
    }
}
