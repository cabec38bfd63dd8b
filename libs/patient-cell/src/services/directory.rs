// libs/patient-cell/src/services/directory.rs
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{in_filter, SupabaseClient};

use crate::models::{Organization, Patient, PatientError};

/// Read-only access to patients and the organizations they belong to.
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn active_patients(&self) -> Result<Vec<Patient>, PatientError>;

    async fn patients_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Patient>, PatientError>;

    async fn get_patient(&self, patient_id: Uuid) -> Result<Patient, PatientError>;

    async fn organizations_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Organization>, PatientError>;
}

pub struct SupabasePatientDirectory {
    supabase: SupabaseClient,
}

impl SupabasePatientDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::with_service_role(config),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, PatientError> {
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let mut parsed = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<T>(row) {
                Ok(item) => parsed.push(item),
                // Malformed rows are skipped, not fatal.
                Err(e) => warn!("Skipping unreadable row from {}: {}", path, e),
            }
        }
        Ok(parsed)
    }
}

#[async_trait]
impl PatientDirectory for SupabasePatientDirectory {
    async fn active_patients(&self) -> Result<Vec<Patient>, PatientError> {
        let patients: Vec<Patient> = self
            .fetch("/rest/v1/patients?active=eq.true&select=*")
            .await?;
        debug!("Loaded {} active patients", patients.len());
        Ok(patients)
    }

    async fn patients_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Patient>, PatientError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let path = format!("/rest/v1/patients?id={}&select=*", in_filter(ids));
        self.fetch(&path).await
    }

    async fn get_patient(&self, patient_id: Uuid) -> Result<Patient, PatientError> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=*", patient_id);
        self.fetch::<Patient>(&path)
            .await?
            .into_iter()
            .next()
            .ok_or(PatientError::NotFound)
    }

    async fn organizations_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Organization>, PatientError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let path = format!(
            "/rest/v1/organizations?id={}&select=id,name,settings",
            in_filter(ids)
        );
        self.fetch(&path).await
    }
}
