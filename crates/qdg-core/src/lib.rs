//! Persistence and identity core for qdg: project store layout, task ids, settings,
//! task records and the prompt text for the three-stage workflow.

pub mod analysis;
pub mod config;
pub mod environment;
pub mod identity;
pub mod lock;
pub mod prompts;
pub mod record;
pub mod store;
pub mod workflow;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::version;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
