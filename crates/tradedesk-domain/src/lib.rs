//! Domain types shared across tradedesk services.
//!
//! Pure types only, no framework dependencies. Import in `usecase/` and `domain/`
//! layers and in the outbox relay.

pub mod outbox;
pub mod pagination;
pub mod verification;
