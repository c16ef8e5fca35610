pub mod identity;
pub mod kv;
pub mod session;
pub mod token;
pub mod validation;

pub use carepoint_shared::Role;
pub use identity::{AuthTokens, IdentityProvider, MockIdentityProvider, SignUpRequest};
pub use kv::{KeyValueStore, MemoryStore};
pub use session::{Session, SessionStore, SESSION_KEY};
pub use token::{decode_payload, DecodeError, TokenPayload};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Storage failure: {0}")]
    StorageError(String),
    #[error("Identity provider rejected the request: {0}")]
    IdentityError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
