pub mod email;
pub mod event_bus;
pub mod message_log;
pub mod outbox;
pub mod sender;
pub mod whatsapp;

pub use email::EmailClient;
pub use event_bus::{EventBus, InngestClient};
pub use message_log::{MessageLog, SupabaseMessageLog};
pub use outbox::{retry_delay, OutboxRelay, OutboxStore, SupabaseOutboxStore};
pub use sender::MessageSender;
pub use whatsapp::{normalize_phone, WhatsAppClient};
