use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("Not connected to the realtime server")]
    NotConnected,

    #[error("Timed out joining channel {0}")]
    JoinTimeout(String),

    #[error("Channel {channel} rejected the join: {reason}")]
    JoinRejected { channel: String, reason: String },

    #[error("Unknown channel {0}")]
    UnknownChannel(String),

    #[error("Invalid realtime url {0}")]
    InvalidUrl(String),

    #[error("Websocket error: {0}")]
    Transport(#[from] Box<tungstenite::Error>),

    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tungstenite::Error> for RealtimeError {
    fn from(err: tungstenite::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}
