//! Chatbus - Kafka chat participants
//!
//! Every participant waits for the shared chat topic, consumes it on a
//! background task and publishes operator lines from the foreground, tagged
//! with its identity. The broker handler is a participant that may create
//! the topic and appends every message it sees to an audit log.
//!
//! ```text
//! stdin --> PublishLoop --> Publisher --> [topic] --> Subscription --> ConsumeLoop --> MessageSink
//! ```

pub mod bus;
pub mod config;
pub mod console;
pub mod consume;
pub mod identity;
pub mod message;
pub mod publish;
pub mod readiness;
pub mod session;
pub mod shutdown;
pub mod sink;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use bus::{BusError, ChannelBus, ChatBus, OffsetPolicy};
pub use config::ChatConfig;
pub use identity::{Identity, Role};
pub use session::{Session, SessionError, SessionSummary};
