pub mod blocks;
pub mod client;
pub mod error;
pub mod event;
pub mod extract;
pub mod message;
pub mod run;
pub mod session;
pub mod sse;
pub mod stream;
pub mod threads;
pub mod transport;

pub use blocks::RichBlock;
pub use client::CortexAgentClient;
pub use error::AgentError;
pub use event::{EventKind, NormalizedEvent};
pub use message::{AgentMessage, ContentBlock, Role};
pub use run::{AgentRunRequest, AgentRunResult, RunStatus, ToolChoice};
pub use session::SessionContext;
pub use stream::{RunOutcome, RunSummary, StreamChunk};
pub use threads::{ThreadDescription, ThreadMessage, ThreadRecord};
pub use transport::ClientConfig;
