// libs/notification-cell/src/services/sender.rs
use async_trait::async_trait;

use crate::models::{Channel, NotificationError, OutboundMessage, SendReceipt};

/// A delivery channel to a third-party provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSender: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, NotificationError>;
}
