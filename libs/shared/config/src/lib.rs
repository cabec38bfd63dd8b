use std::env;
use std::str::FromStr;

use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub whatsapp_api_url: String,
    pub whatsapp_phone_number_id: String,
    pub whatsapp_access_token: String,
    pub whatsapp_template_language: String,
    pub resend_api_url: String,
    pub resend_api_key: String,
    pub email_from: String,
    pub inngest_base_url: String,
    pub inngest_event_key: String,
    /// Clinic wall-clock offset from UTC, in minutes (America/Sao_Paulo is -180).
    pub clinic_utc_offset_minutes: i32,
    pub reminder_scan_interval_minutes: u64,
    pub outbox_relay_interval_minutes: u64,
    pub outbox_max_attempts: u32,
    pub scheduler_enabled: bool,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            whatsapp_api_url: env::var("WHATSAPP_API_URL")
                .unwrap_or_else(|_| "https://graph.facebook.com/v18.0".to_string()),
            whatsapp_phone_number_id: env::var("WHATSAPP_PHONE_NUMBER_ID")
                .unwrap_or_else(|_| {
                    warn!("WHATSAPP_PHONE_NUMBER_ID not set, WhatsApp sends will fail");
                    String::new()
                }),
            whatsapp_access_token: env::var("WHATSAPP_ACCESS_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("WHATSAPP_ACCESS_TOKEN not set, WhatsApp sends will fail");
                    String::new()
                }),
            whatsapp_template_language: env::var("WHATSAPP_TEMPLATE_LANGUAGE")
                .unwrap_or_else(|_| "pt_BR".to_string()),
            resend_api_url: env::var("RESEND_API_URL")
                .unwrap_or_else(|_| "https://api.resend.com".to_string()),
            resend_api_key: env::var("RESEND_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("RESEND_API_KEY not set, email sends will fail");
                    String::new()
                }),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "FisioFlow <noreply@fisioflow.app>".to_string()),
            inngest_base_url: env::var("INNGEST_BASE_URL")
                .unwrap_or_else(|_| "https://inn.gs".to_string()),
            inngest_event_key: env::var("INNGEST_EVENT_KEY")
                .unwrap_or_else(|_| {
                    warn!("INNGEST_EVENT_KEY not set, outbox relay will not publish");
                    String::new()
                }),
            clinic_utc_offset_minutes: parse_or("CLINIC_UTC_OFFSET_MINUTES", -180),
            reminder_scan_interval_minutes: parse_or("REMINDER_SCAN_INTERVAL_MINUTES", 30),
            outbox_relay_interval_minutes: parse_or("OUTBOX_RELAY_INTERVAL_MINUTES", 5),
            outbox_max_attempts: parse_or("OUTBOX_MAX_ATTEMPTS", 5),
            scheduler_enabled: parse_or("SCHEDULER_ENABLED", true),
            port: parse_or("PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_service_role_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_whatsapp_configured(&self) -> bool {
        !self.whatsapp_api_url.is_empty()
            && !self.whatsapp_phone_number_id.is_empty()
            && !self.whatsapp_access_token.is_empty()
    }

    pub fn is_email_configured(&self) -> bool {
        !self.resend_api_url.is_empty() && !self.resend_api_key.is_empty()
    }

    pub fn is_event_bus_configured(&self) -> bool {
        !self.inngest_base_url.is_empty() && !self.inngest_event_key.is_empty()
    }

    /// Offset used to turn UTC instants into clinic wall-clock time.
    /// Out-of-range values fall back to UTC.
    pub fn clinic_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.clinic_utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!(
                "CLINIC_UTC_OFFSET_MINUTES={} is out of range, using UTC",
                self.clinic_utc_offset_minutes
            );
            Utc.fix()
        })
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
