//! Client authentication session.
//!
//! DESIGN
//! ======
//! Split by concern so each piece can be tested alone: `types` (domain and
//! envelope), `api` (backend seam), `storage` (token and snapshot stores),
//! and `controller` (the lifecycle that ties them together).

pub mod api;
pub mod controller;
pub mod storage;
pub mod types;

pub use api::{ApiError, AuthApi, HttpAuthApi, HttpTimeouts};
pub use controller::{SessionController, SessionOptions, SessionPhase, SessionState};
pub use storage::{ClientStorage, FileStore, KeyValueStore, MemoryStore, StorageError};
pub use types::{Credentials, Envelope, LoginGrant, Role, RoleParseError, User, UserPatch};
