//! History store trait: recent conversation messages per user.

use async_trait::async_trait;
use crate::error::HistoryError;
use crate::message::Message;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The backend name.
    fn name(&self) -> &str;

    /// The last `limit` messages for a user, oldest first.
    async fn recent(&self, user_id: &str, limit: usize) -> std::result::Result<Vec<Message>, HistoryError>;

    /// Append one message to a user's history.
    async fn append(&self, user_id: &str, message: Message) -> std::result::Result<(), HistoryError>;
}
