//! Authentication for psylab.
//!
//! Tokens are HS256 JWTs carrying the identity id (`_id`). Login stores
//! the issued token in the signed session; [`AuthGuard`] verifies it on
//! each request, reloads the identity and enforces the route's role.
//!
//! ```
//! use psylab_auth::TokenService;
//! use std::time::Duration;
//!
//! let tokens = TokenService::new("Shhh", Duration::from_secs(86400)).unwrap();
//! let token = tokens.issue("u1").unwrap();
//! assert_eq!(tokens.verify(&token).unwrap().id, "u1");
//! ```

mod error;
mod guard;
mod identity;
mod token;

pub use error::{AuthError, Result};
pub use guard::{AuthGuard, IdentityExt};
pub use identity::{Identity, IdentityResolver, MemoryIdentities};
pub use token::{Claims, TokenService};
