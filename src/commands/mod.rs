pub mod claim;
pub mod info;

// Re-export command functions for convenience
pub use claim::{claim, ClaimArgs};
pub use info::{labels, user};
