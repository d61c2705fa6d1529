/// Verified identity registry for bouncer.
///
/// Reads the identities that forum users attached to their profiles:
/// - **Postgres**: read-only, time-bounded query against the forum's
///   `user_custom_fields` table
pub mod postgres;

pub use postgres::PgIdentityRegistry;
