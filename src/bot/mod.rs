/// Allow-list and access-denied cooldown
pub mod access;
/// Command and message handlers
pub mod handlers;
/// Reply delivery
pub mod messaging;
/// Dispatcher setup and startup
pub mod runner;

pub use access::AccessGate;
pub use runner::run_bot;
