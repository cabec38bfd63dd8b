use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::SERVICE_ROLE;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_service_role_key: "test-service-role-key".to_string(),
        }
    }
}

impl TestConfig {
    /// Config pointing every external collaborator at one mock server.
    pub fn with_mock_server(uri: &str) -> Self {
        Self {
            supabase_url: uri.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_role_key: self.supabase_service_role_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            whatsapp_api_url: self.supabase_url.clone(),
            whatsapp_phone_number_id: "test-phone-number-id".to_string(),
            whatsapp_access_token: "test-whatsapp-token".to_string(),
            whatsapp_template_language: "pt_BR".to_string(),
            resend_api_url: self.supabase_url.clone(),
            resend_api_key: "test-resend-key".to_string(),
            email_from: "Clinic <noreply@clinic.test>".to_string(),
            inngest_base_url: self.supabase_url.clone(),
            inngest_event_key: "test-event-key".to_string(),
            clinic_utc_offset_minutes: -180,
            reminder_scan_interval_minutes: 30,
            outbox_relay_interval_minutes: 5,
            outbox_max_attempts: 5,
            scheduler_enabled: false,
            port: 0,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "authenticated".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn staff(email: &str) -> Self {
        Self::new(email, "authenticated")
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        Self::sign(json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        }), secret)
    }

    /// Token shaped like the ones Supabase issues for the service role key.
    pub fn create_service_role_token(secret: &str) -> String {
        let now = Utc::now();
        Self::sign(json!({
            "role": SERVICE_ROLE,
            "iss": "supabase",
            "iat": now.timestamp(),
            "exp": (now + Duration::hours(1)).timestamp()
        }), secret)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }

    fn sign(payload: Value, secret: &str) -> String {
        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }
}

/// Canned PostgREST rows for the tables the scanners read.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn appointment_row(
        id: Uuid,
        patient_id: Uuid,
        organization_id: Uuid,
        date: &str,
        start_time: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": id,
            "patient_id": patient_id,
            "therapist_id": Uuid::new_v4(),
            "organization_id": organization_id,
            "date": date,
            "start_time": start_time,
            "end_time": start_time,
            "status": status,
            "therapist_name": "Dra. Ana",
            "reminder_sent_24h": null,
            "reminder_sent_2h": null,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        })
    }

    pub fn patient_row(id: Uuid, organization_id: Uuid, phone: Option<&str>, email: Option<&str>) -> Value {
        json!({
            "id": id,
            "name": "Maria Souza",
            "phone": phone,
            "email": email,
            "organization_id": organization_id,
            "active": true,
            "notification_preferences": {}
        })
    }

    pub fn organization_row(id: Uuid, whatsapp_enabled: bool, email_enabled: bool) -> Value {
        json!({
            "id": id,
            "name": "Clinica Movimento",
            "settings": {
                "whatsapp_enabled": whatsapp_enabled,
                "email_enabled": email_enabled
            }
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
