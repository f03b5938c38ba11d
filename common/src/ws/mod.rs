mod ws_session;

pub use ws_session::{Message, WsSession, WsStream};
