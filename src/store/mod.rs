//! Data store modules for Supabase integration

pub mod credentials;
pub mod inventory;
pub mod listings;
pub mod market;
pub mod orders;
pub mod platform;
pub mod predictions;
pub mod purchases;
pub mod supabase;

pub use credentials::CredentialStore;
pub use inventory::InventoryStore;
pub use listings::ListingStore;
pub use market::MarketStore;
pub use orders::OrderStore;
pub use platform::Platform;
pub use predictions::PredictionStore;
pub use purchases::PurchaseStore;
pub use supabase::SupabaseClient;
