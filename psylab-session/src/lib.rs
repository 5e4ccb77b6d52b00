//! Signed-cookie sessions for psylab.
//!
//! The whole session lives in one cookie (default `user.sess`) holding a
//! JSON [`SessionData`] signed with HMAC-SHA256. Nothing is stored server
//! side, so any instance can serve any request.
//!
//! ```
//! use psylab_session::{Role, SessionCodec, SessionConfig, SessionData};
//!
//! let codec = SessionCodec::new(SessionConfig::default(), "Shhh").unwrap();
//! let data = SessionData::new().with_id("u1").with_role(Role::Subject);
//!
//! let raw = codec.encode_value(&data).unwrap();
//! assert_eq!(codec.decode_value(&raw).unwrap(), data);
//! ```
//!
//! In a server, register [`SessionMiddleware`]; handlers read the session
//! with [`SessionExt::session`] and replace it with
//! [`SetSessionExt::with_session`]. A corrupt cookie reads as an empty
//! session and an empty replacement clears the cookie.

mod codec;
mod data;
mod error;
mod middleware;
mod signer;

pub use codec::{SessionCodec, SessionConfig};
pub use data::{Role, SessionData};
pub use error::{SessionError, SessionResult};
pub use middleware::{SessionExt, SessionMiddleware, SessionUpdate, SetSessionExt};
pub use signer::CookieSigner;
