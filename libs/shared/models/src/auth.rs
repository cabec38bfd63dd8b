use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role carried by Supabase tokens minted from the service role key.
pub const SERVICE_ROLE: &str = "service_role";

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Service role tokens carry no subject.
    #[serde(default)]
    pub sub: Option<String>,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_service_role(&self) -> bool {
        self.role.as_deref() == Some(SERVICE_ROLE)
    }
}
