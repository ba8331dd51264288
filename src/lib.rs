//! Client-side session and identity management.
//!
//! `identeco` authenticates against a remote credential service, decodes the
//! claims embedded in the returned access token, and keeps a single reactive
//! source of truth for "who is currently logged in", persisted across
//! restarts through a pluggable [`SessionStorage`].
//!
//! The moving parts, leaf first: [`token::decode`] extracts the claim set
//! from a compact token, [`Identity`] is the immutable authenticated
//! principal built from the login response plus those claims,
//! [`SessionStore`] is the single writer of session state with a
//! replay-latest subscription stream, and [`AuthService`] drives the store
//! through the login / update / delete / logout protocol.
//!
//! Claims are extracted, never verified: signature validation, token
//! refresh, and permission evaluation belong to other layers.

pub mod error;
pub mod identity;
pub mod service;
pub mod storage;
pub mod store;
pub mod token;

pub use error::Error;
pub use identity::{Identity, IdentityData, RawCredentialResponse};
pub use service::{AccessGateResponse, AuthService};
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
pub use store::SessionStore;
pub use token::ClaimSet;
