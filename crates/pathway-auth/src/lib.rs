//! Authentication and authorization for the Pathway gateway.
//!
//! Every GraphQL request moves through a small per-request state machine:
//!
//! ```text
//! unauthenticated --verify token--> authenticated --check policy--> authorized
//!                                        |                              |
//!                                        +---------> denied <-----------+
//! ```
//!
//! [`TokenVerifier`] handles the first transition: it parses the bearer
//! token and verifies signature, expiry, issuer, and audience, producing
//! [`AccessClaims`]. [`AuthContext`] is the immutable caller identity built
//! from those claims and attached to the request. [`AccessGuard`] handles
//! the second transition against a resolver's [`FieldPolicy`], and
//! re-validates tenant ownership on every entity a resolver loads.
//!
//! Authorization failures are deliberately generic ("insufficient
//! permissions") so a denied caller cannot learn whether an entity exists.

pub mod claims;
pub mod context;
pub mod error;
pub mod guard;
pub mod token;

pub use claims::{AccessClaims, Role};
pub use context::AuthContext;
pub use error::AuthError;
pub use guard::{AccessGuard, FieldPolicy};
pub use token::TokenVerifier;
