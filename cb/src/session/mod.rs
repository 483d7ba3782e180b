//! Session table
//!
//! SessionStore owns every live conversation. Each session sits behind its
//! own async mutex so turns on one session are serialized while different
//! sessions proceed in parallel.

mod id;
mod store;

pub use id::generate_session_id;
pub use store::{Session, SessionError, SessionGuard, SessionHandle, SessionStore};
