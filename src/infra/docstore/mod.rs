//! Document-store backend adapters.

pub mod supabase;

pub use supabase::{SupabaseConfig, SupabaseDocumentStore};
