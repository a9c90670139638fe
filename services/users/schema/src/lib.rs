//! sea-orm entities for the users service database.

pub mod login_credentials;
pub mod outbox_events;
pub mod users;
pub mod verification_tokens;
