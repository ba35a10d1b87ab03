pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod server;
pub mod telemetry;

/**
 * \brief SDK prelude with the commonly used modules.
 */
pub mod prelude {
    pub use crate::config;
    pub use crate::error;
    pub use crate::llm;
    pub use crate::models;
    pub use crate::server;
    pub use crate::telemetry;
}
