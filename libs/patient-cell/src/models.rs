use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    #[serde(alias = "full_name")]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub organization_id: Uuid,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub notification_preferences: NotificationPreferences,
}

fn default_active() -> bool {
    true
}

impl Patient {
    pub fn has_phone(&self) -> bool {
        self.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    pub fn has_email(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    pub fn has_contact(&self) -> bool {
        self.has_phone() || self.has_email()
    }
}

/// Per-channel opt-in. An unset channel counts as enabled; only an explicit
/// `false` disables it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default)]
    pub whatsapp: Option<bool>,
    #[serde(default)]
    pub email: Option<bool>,
}

impl NotificationPreferences {
    pub fn whatsapp_allowed(&self) -> bool {
        self.whatsapp != Some(false)
    }

    pub fn email_allowed(&self) -> bool {
        self.email != Some(false)
    }

    pub fn opted_out_of_all(&self) -> bool {
        !self.whatsapp_allowed() && !self.email_allowed()
    }
}

/// Tenant boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub settings: OrganizationSettings,
}

impl Organization {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("FisioFlow")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationSettings {
    #[serde(default)]
    pub whatsapp_enabled: Option<bool>,
    #[serde(default)]
    pub email_enabled: Option<bool>,
}

impl OrganizationSettings {
    pub fn whatsapp_enabled(&self) -> bool {
        self.whatsapp_enabled.unwrap_or(true)
    }

    pub fn email_enabled(&self) -> bool {
        self.email_enabled.unwrap_or(true)
    }
}

/// Channels a message may actually be delivered on for one patient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEligibility {
    pub whatsapp: bool,
    pub email: bool,
}

impl ChannelEligibility {
    pub fn any(&self) -> bool {
        self.whatsapp || self.email
    }

    pub fn count(&self) -> usize {
        self.whatsapp as usize + self.email as usize
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
