//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the auth flow, activity tracking and the admin
//! dashboard so route handlers can stay focused on cookies, forms and
//! rendering.

pub mod auth;
pub mod dashboard;
pub mod events;
pub mod session;
pub mod tracking;
