pub mod ids;
pub mod protocol;

pub use ids::{ChatAddr, ConnId};
pub use protocol::{
    parse_chat, ChatMessage, ClientFrame, FrameError, HistoryEntry, ServerEvent, RELAYED_SENDER,
};
