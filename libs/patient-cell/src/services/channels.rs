use crate::models::{ChannelEligibility, Organization, Patient};

/// Every send is gated by the organization switch AND the patient's own
/// preference AND a contact on that channel.
pub struct ChannelPolicy;

impl ChannelPolicy {
    pub fn evaluate(patient: &Patient, organization: Option<&Organization>) -> ChannelEligibility {
        let settings = organization.map(|org| org.settings.clone()).unwrap_or_default();
        let prefs = &patient.notification_preferences;

        ChannelEligibility {
            whatsapp: settings.whatsapp_enabled() && prefs.whatsapp_allowed() && patient.has_phone(),
            email: settings.email_enabled() && prefs.email_allowed() && patient.has_email(),
        }
    }
}
