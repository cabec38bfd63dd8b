pub mod channels;
pub mod directory;

pub use channels::ChannelPolicy;
pub use directory::{PatientDirectory, SupabasePatientDirectory};
