pub mod agent;
pub mod conversation;
pub mod errors;
pub mod models;
pub mod protocol;
pub mod providers;
pub mod reconcile;
pub mod sse;
pub mod toolkit;
