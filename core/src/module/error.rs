use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Provided type '{0}' isn't a constructible module type")]
    InvalidModule(String),

    #[error("Discovery failed for '{unit}': {reason}")]
    Discovery { unit: String, reason: String },

    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Reloading module '{name}' failed: {reason}")]
    ReloadFailed { name: String, reason: String },

    #[error("Constructing module '{name}' failed: {reason}")]
    Construction { name: String, reason: String },

    #[error("Module '{module}' failed to handle command: {reason}")]
    Command { module: String, reason: String },
}

pub type ModuleResult<T> = Result<T, ModuleError>;
