//! Core library for the BookStore service: identity management, JWT
//! issuance and the book catalogue, over pluggable stores.

pub mod books;
mod error;
pub mod identity;
pub mod store;

pub use books::{Book, BookModel, BookRepository};
pub use error::{FieldError, Result, ServiceError};
pub use identity::{
    AuthToken, IdentityManager, JwtSettings, LockoutPolicy, SignInRequest, SignUpRequest,
    SignUpResult, TokenClaims, TokenIssuer, UserSummary,
};
pub use store::{BookStore, FileStore, IdentityStore, MemoryStore};
