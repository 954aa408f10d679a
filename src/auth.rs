//! Credential models: redacted secrets, the principal behind an identity, and identity tokens.

pub mod principal;
pub mod secret;
pub mod token;

pub use principal::*;
pub use secret::*;
pub use token::*;
