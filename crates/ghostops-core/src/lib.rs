//! `ghostops-core` — signed session tokens and usage metering.
//!
//! The paid GhostOps endpoints gate a limited number of AI-generation calls
//! per purchase. All session state lives in a self-contained, HMAC-signed
//! bearer token that the client holds and resubmits; the server keeps no
//! session table. This crate is the pure-logic half of that scheme:
//!
//! ```text
//! token string ──► token::decode ──► gate::evaluate ──► TokenState
//!                                          │
//!                                          ▼ (Active)
//!                              Session::settle ──► token::encode
//! ```
//!
//! Everything here is deterministic and I/O-free: callers pass in the
//! current unix time and the signing secret. The HTTP surface and the
//! collaborator clients (payment, identity, text generation) live in
//! `ghostops-server`.

pub mod deny;
pub mod gate;
pub mod history;
pub mod policy;
pub mod token;

pub use deny::DenyReason;
pub use gate::{CallKind, Session, TokenState};
pub use policy::{Product, SessionPolicy};
pub use token::{TokenError, TokenPayload};
