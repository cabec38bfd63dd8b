pub mod supabase;

pub use supabase::{in_filter, SupabaseClient};
