//! Session credentials and endpoint calls
//!
//! Holds the token pair model, the credential store capability (file and
//! in-memory implementations), the refresh and sign-in endpoint calls, and
//! the forced sign-out collaborator. Nothing here knows about the refresh
//! coordinator; `auth-client` builds on top of it.
//!
//! Session flow:
//! 1. `token::sign_in()` exchanges email/password for a `TokenPair`
//! 2. The pair is stored via `CredentialStore::set()`
//! 3. On an expired access token, `token::refresh_session()` swaps the pair
//! 4. Unrecoverable failures call `SessionTerminator::sign_out()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod session;
pub mod token;

pub use constants::*;
pub use credentials::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, PersistOptions, TokenPair,
};
pub use error::{Error, Result};
pub use session::{ClearCredentials, SessionState, SessionTerminator};
pub use token::{SignIn, User, refresh_session, sign_in};
