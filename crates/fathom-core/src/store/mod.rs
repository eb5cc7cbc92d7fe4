//! Durable conversation persistence.

mod conversations;
mod storage;

pub use conversations::{ConversationStore, EMPTY_PLACEHOLDER, OPTIONS_PLACEHOLDER};
pub use storage::{detail_key, FileStorage, KvStorage, MemoryStorage, SUMMARY_INDEX_KEY};
