//! SSE-driven listing creation and refresh

pub mod events;
pub mod workflow;

pub use events::WorkflowEvent;
pub use workflow::{CreateListingRequest, ListingWorkflow};
