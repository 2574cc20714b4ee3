//! # Rockpool Invite
//!
//! Cryptographic bootstrap of mutual trust: a pool [`Config`] is carried
//! inside a signed token readable only by the intended recipients, with no
//! prior channel required. Re-invites travel through the pool itself.
//!
//! [`Config`]: rockpool_pool::Config

pub mod error;
mod invite;
mod token;

pub use error::{InviteError, Result};
pub use invite::{add, receive, Invite};
pub use token::{decode, encode};
