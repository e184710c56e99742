//! # cosmic-client
//!
//! Client-side shell for the Cosmic field-service dashboard: build-time
//! environment resolution, the authenticated session lifecycle, and the
//! hardcoded-URL migration tool.
//!
//! The three pieces are independent. Only [`session`] carries state; it is
//! constructed by the application root and passed to whatever needs it.

pub mod config;
pub mod migrate;
pub mod session;
