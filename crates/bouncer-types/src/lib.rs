/// Shared types, traits, and errors for the bouncer join-request gatekeeper.
///
/// This crate is the foundation that all other bouncer crates depend on.
/// It contains:
/// - **Trait contracts** (`traits`) for the messaging platform and the identity registry
/// - **Shared data types** (`models`) for requests, updates and identity snapshots
/// - **Error types** (`errors`) for unified error handling
/// - **Config types** (`config`, `config_loader`) and typed message templates (`template`)
pub mod config;
pub mod config_loader;
pub mod errors;
pub mod models;
pub mod template;
pub mod traits;

// Re-export commonly used types at the crate root for convenience.
pub use errors::BouncerError;
pub use models::*;
pub use traits::*;
