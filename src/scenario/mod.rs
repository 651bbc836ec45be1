pub mod loader;
pub mod types;

pub use loader::{load_scenario, LoadError, ScenarioDir, ScenarioMeta, ScenarioSource};
pub use types::{FileEntry, Node, Scenario, GLOBAL_HINTS};
