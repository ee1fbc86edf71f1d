pub mod checkpoint;
pub mod relay;
pub mod types;

pub use checkpoint::MemoryCheckpointer;
pub use relay::ChatRelay;
pub use types::{AttachmentRef, ChatTurn};
