pub mod models;
pub mod services;

pub use models::*;
pub use services::{
    EmailClient, EventBus, InngestClient, MessageLog, MessageSender, OutboxRelay, OutboxStore,
    SupabaseMessageLog, SupabaseOutboxStore, WhatsAppClient,
};
