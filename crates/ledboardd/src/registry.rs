//! Last-known boolean state per entity.
//!
//! Owned by the engine task, which serializes updates with renders; entities
//! that have never been observed read as off.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct StateRegistry {
    states: HashMap<String, bool>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `on` for `entity`, returning whether the value changed.
    ///
    /// A `false` return means downstream recomputation can be skipped.
    pub fn update(&mut self, entity: &str, on: bool) -> bool {
        match self.states.get_mut(entity) {
            Some(existing) if *existing == on => false,
            Some(existing) => {
                *existing = on;
                true
            }
            None => {
                self.states.insert(entity.to_string(), on);
                // Unseen entities default to off.
                on
            }
        }
    }

    pub fn get(&self, entity: &str) -> bool {
        self.states.get(entity).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_entity_is_off() {
        let registry = StateRegistry::new();
        assert!(!registry.get("light.hall"));
    }

    #[test]
    fn test_update_reports_changes() {
        let mut registry = StateRegistry::new();

        assert!(registry.update("light.hall", true));
        assert!(registry.get("light.hall"));

        // Repeating the same value is a no-op.
        assert!(!registry.update("light.hall", true));

        assert!(registry.update("light.hall", false));
        assert!(!registry.get("light.hall"));
    }

    #[test]
    fn test_first_update_to_off_is_not_a_change() {
        let mut registry = StateRegistry::new();
        // Matches the default, so nothing needs recomputing.
        assert!(!registry.update("light.hall", false));
    }
}
