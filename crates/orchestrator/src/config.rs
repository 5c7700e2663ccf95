use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Engine knobs. Deserializes from the `[engine]` table of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Developer/reviewer rounds per task before escalating.
    pub max_iterations: u32,
    /// A positive value lets the task loop continue past failed tasks.
    pub max_retries: u32,
    /// Wait for a continue signal after each task.
    pub pause_after_task: bool,
    pub loop_event_capacity: usize,
    pub task_event_capacity: usize,
    /// Directory the agents run in.
    #[serde(skip)]
    pub working_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            max_retries: 0,
            pause_after_task: false,
            loop_event_capacity: 100,
            task_event_capacity: 250,
            working_dir: PathBuf::from("."),
        }
    }
}

impl EngineConfig {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_pause_after_task(mut self, pause: bool) -> Self {
        self.pause_after_task = pause;
        self
    }

    pub fn with_event_capacities(mut self, loop_capacity: usize, task_capacity: usize) -> Self {
        self.loop_event_capacity = loop_capacity;
        self.task_event_capacity = task_capacity;
        self
    }

    pub fn continue_on_failure(&self) -> bool {
        self.max_retries > 0
    }

    /// Iteration budget, never below one round.
    pub fn iteration_budget(&self) -> u32 {
        self.max_iterations.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.loop_event_capacity, 100);
        assert_eq!(config.task_event_capacity, 250);
        assert!(!config.continue_on_failure());
        assert!(!config.pause_after_task);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new("/repo")
            .with_max_iterations(0)
            .with_max_retries(2)
            .with_pause_after_task(true);

        assert_eq!(config.iteration_budget(), 1);
        assert!(config.continue_on_failure());
        assert!(config.pause_after_task);
        assert_eq!(config.working_dir, PathBuf::from("/repo"));
    }

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_iterations": 5}"#).unwrap();
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.task_event_capacity, 250);
    }
}
