use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use shared_models::error::AppError;

// ==============================================================================
// CHANNELS AND TEMPLATES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    WhatsApp,
    Email,
}

impl Channel {
    /// Event name the reactivation workflow listens on for this channel.
    pub fn reactivation_event(&self) -> &'static str {
        match self {
            Channel::WhatsApp => "whatsapp/reactivation",
            Channel::Email => "email/reactivation",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::WhatsApp => write!(f, "whatsapp"),
            Channel::Email => write!(f, "email"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTemplate {
    AppointmentReminder24h,
    AppointmentReminder2h,
    PatientReactivation,
}

impl MessageTemplate {
    /// Approved WhatsApp Business template name.
    pub fn whatsapp_template_name(&self) -> &'static str {
        match self {
            MessageTemplate::AppointmentReminder24h => "appointment_reminder_24h",
            MessageTemplate::AppointmentReminder2h => "appointment_reminder",
            MessageTemplate::PatientReactivation => "patient_reactivation",
        }
    }

    /// Value stored in `whatsapp_messages.message_type`.
    pub fn message_type(&self) -> &'static str {
        match self {
            MessageTemplate::AppointmentReminder24h => "reminder_24h",
            MessageTemplate::AppointmentReminder2h => "reminder_2h",
            MessageTemplate::PatientReactivation => "reactivation",
        }
    }

    pub fn email_subject(&self, context: &MessageContext) -> String {
        match self {
            MessageTemplate::AppointmentReminder24h => format!(
                "Lembrete: sua sessão de fisioterapia é amanhã - {}",
                context.clinic_name
            ),
            MessageTemplate::AppointmentReminder2h => format!(
                "Sua sessão começa em breve - {}",
                context.clinic_name
            ),
            MessageTemplate::PatientReactivation => format!(
                "Sentimos sua falta! - {}",
                context.clinic_name
            ),
        }
    }

    pub fn email_html(&self, context: &MessageContext) -> String {
        let greeting = format!("<p>Olá {},</p>", context.patient_name);
        let body = match self {
            MessageTemplate::AppointmentReminder24h | MessageTemplate::AppointmentReminder2h => {
                let when = match self {
                    MessageTemplate::AppointmentReminder24h => "amanhã",
                    _ => "hoje",
                };
                let mut text = format!(
                    "<p>Lembramos que sua sessão está marcada para {}, {} às {}",
                    when,
                    context.formatted_date(),
                    context.formatted_time(),
                );
                if let Some(therapist) = &context.therapist_name {
                    text.push_str(&format!(" com {}", therapist));
                }
                text.push_str(".</p>");
                text
            }
            MessageTemplate::PatientReactivation => {
                "<p>Faz algum tempo desde sua última sessão. Que tal agendar um retorno para continuar seu tratamento?</p>"
                    .to_string()
            }
        };
        format!("{}{}<p>{}</p>", greeting, body, context.clinic_name)
    }

    /// Positional `{{n}}` parameters of the WhatsApp template body.
    pub fn whatsapp_parameters(&self, context: &MessageContext) -> Vec<String> {
        match self {
            MessageTemplate::AppointmentReminder24h | MessageTemplate::AppointmentReminder2h => vec![
                context.patient_name.clone(),
                context.formatted_date(),
                context.formatted_time(),
                context
                    .therapist_name
                    .clone()
                    .unwrap_or_else(|| context.clinic_name.clone()),
            ],
            MessageTemplate::PatientReactivation => vec![
                context.patient_name.clone(),
                context.clinic_name.clone(),
            ],
        }
    }

    pub fn render(&self, channel: Channel, to: &str, context: &MessageContext) -> OutboundMessage {
        OutboundMessage {
            channel,
            to: to.to_string(),
            template: *self,
            parameters: self.whatsapp_parameters(context),
            subject: self.email_subject(context),
            html: self.email_html(context),
        }
    }
}

/// Values interpolated into message text.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageContext {
    pub patient_name: String,
    pub clinic_name: String,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<NaiveTime>,
    pub therapist_name: Option<String>,
}

impl MessageContext {
    pub fn formatted_date(&self) -> String {
        self.appointment_date
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_default()
    }

    pub fn formatted_time(&self) -> String {
        self.appointment_time
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub channel: Channel,
    pub to: String,
    pub template: MessageTemplate,
    pub parameters: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub channel: Channel,
    pub provider_message_id: Option<String>,
}

// ==============================================================================
// PROVIDER PAYLOADS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct WhatsAppSendResponse {
    #[serde(default)]
    pub messages: Vec<WhatsAppMessageId>,
}

#[derive(Debug, Deserialize)]
pub struct WhatsAppMessageId {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendSendResponse {
    pub id: Option<String>,
}

// ==============================================================================
// MESSAGE LOG
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// One row of `whatsapp_messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatsAppMessageLog {
    pub appointment_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub organization_id: Uuid,
    pub to_phone: String,
    pub message_type: String,
    pub template_name: String,
    pub message_id: Option<String>,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// EVENTS AND OUTBOX
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub name: String,
    pub data: Value,
}

impl NotificationEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Dispatched,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub name: String,
    pub data: Value,
    pub status: OutboxStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    pub fn event(&self) -> NotificationEvent {
        NotificationEvent::new(self.name.clone(), self.data.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelaySummary {
    pub dispatched: usize,
    pub retried: usize,
    pub failed: usize,
}

// ==============================================================================
// ERROR HANDLING
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    #[error("{0} is not configured")]
    NotConfigured(Channel),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Provider error: {message}")]
    ProviderError { message: String },

    #[error("Event bus not configured")]
    EventBusNotConfigured,

    #[error("Event bus error: {message}")]
    EventBusError { message: String },

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        NotificationError::ProviderError {
            message: err.to_string(),
        }
    }
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::NotConfigured(_) | NotificationError::EventBusNotConfigured => {
                AppError::Internal(err.to_string())
            }
            NotificationError::InvalidRecipient(msg) => AppError::ValidationError(msg),
            NotificationError::DatabaseError(msg) => AppError::Database(msg),
            other => AppError::ExternalService(other.to_string()),
        }
    }
}
