// Declare modules at the root level
pub mod aggregation;
pub mod config;
pub mod dashboard;
pub mod domain;
pub mod error;
pub mod id_generator;
pub mod logging;
pub mod producer;
pub mod retry;
pub mod seeding;
pub mod shutdown;
pub mod status;
pub mod store;
pub mod time;

// Test utilities module (available in test and integration test builds)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export everything under a shared namespace for external access
pub mod shared {
    pub use super::aggregation;
    pub use super::config;
    pub use super::dashboard;
    pub use super::domain;
    pub use super::error;
    pub use super::id_generator;
    pub use super::logging;
    pub use super::producer;
    pub use super::retry;
    pub use super::seeding;
    pub use super::shutdown;
    pub use super::status;
    pub use super::store;
    pub use super::time;
}

// Also re-export at root for convenience
pub use aggregation::*;
pub use config::*;
pub use dashboard::*;
pub use domain::*;
pub use error::*;
pub use id_generator::*;
pub use logging::*;
pub use producer::*;
pub use retry::*;
pub use seeding::*;
pub use shutdown::*;
pub use status::*;
pub use store::*;
pub use time::*;
