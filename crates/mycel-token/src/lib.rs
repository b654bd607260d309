//! # Mycel Tokens
//!
//! Short-lived, signed identity tokens with per-identity replay protection.
//!
//! ## Lifecycle
//!
//! 1. An identity is enrolled with [`TokenIssuer::enroll`]
//! 2. [`TokenIssuer::issue`] hands out a token bound to a state digest
//! 3. Status checks call [`TokenIssuer::verify`], which never consumes
//! 4. Mutating operations call [`TokenIssuer::consume`] or
//!    [`TokenIssuer::rotate`]; a consumed token verifies as
//!    [`TokenStatus::Replayed`] for the rest of its life
//!
//! Only the most recently issued token of an identity is ever valid.

pub mod error;
pub mod issuer;
pub mod token;

pub use error::{Result, TokenError};
pub use issuer::{TokenIssuer, TokenPolicy};
pub use token::{Token, TokenDigest, TokenStatus, DEFAULT_TOKEN_TTL_MS};
