pub mod connection;
pub mod error;
pub mod frame;
pub mod reconnect;
pub mod subscription;

pub use connection::{FrameReader, StreamConnection};
pub use error::StreamError;
pub use frame::{parse_frame, Frame};
pub use reconnect::{ReconnectDecision, ReconnectionController, MAX_RECONNECT_ATTEMPTS, RECONNECT_INTERVAL};
pub use subscription::Subscription;
