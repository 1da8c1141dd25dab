/// Router Module Index
///
/// Splits the console's routes by who may call them. Access control is attached per module in
/// `create_router`, so a route's exposure is decided by where it is registered.

/// Entry pages, health check and the sign-in/sign-up actions. Open to everyone.
pub mod public;

/// Protected pages and the publisher API. Requires a session.
pub mod authenticated;

/// User and role management. Requires a session plus the matching capability.
pub mod admin;
