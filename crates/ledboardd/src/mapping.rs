//! Static LED-to-entity mapping table.
//!
//! Built once from validated configuration and immutable afterwards. Each LED
//! index holds an ordered list of `(entity_id, on_color)` pairs; list order is
//! configuration order and is the tie-break when several entities on the same
//! LED are on at once.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fmt::Write;

use crate::color::Color;
use crate::color::InvalidColorFormat;

/// Errors raised while building the mapping table. All are fatal to startup.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("LED {led}, entity {entity:?}: {source}")]
    InvalidColorFormat {
        led: usize,
        entity: String,
        #[source]
        source: InvalidColorFormat,
    },

    #[error("duplicate mapping: entity {entity:?} configured twice for LED {led}")]
    DuplicateMapping { led: usize, entity: String },
}

/// Immutable lookup from LED index to the entities displayed on it.
#[derive(Debug, Default)]
pub struct LedMapTable {
    /// LED index -> ordered (entity, on-color) pairs.
    leds: BTreeMap<usize, Vec<(String, Color)>>,

    /// Reverse index so one entity change recomputes only its own LEDs.
    by_entity: HashMap<String, BTreeSet<usize>>,
}

impl LedMapTable {
    /// Build the table from `(led, entity_id, on_color_text)` entries.
    ///
    /// Entry order is preserved per LED. Duplicate `(led, entity)` pairs and
    /// malformed colors are rejected.
    pub fn build<I, S, C>(entries: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (usize, S, C)>,
        S: Into<String>,
        C: AsRef<str>,
    {
        let mut table = Self::default();

        for (led, entity, color_text) in entries {
            let entity = entity.into();

            let color = Color::parse(color_text.as_ref()).map_err(|source| {
                MappingError::InvalidColorFormat {
                    led,
                    entity: entity.clone(),
                    source,
                }
            })?;

            let slot = table.leds.entry(led).or_default();
            if slot.iter().any(|(existing, _)| *existing == entity) {
                return Err(MappingError::DuplicateMapping { led, entity });
            }

            table.by_entity.entry(entity.clone()).or_default().insert(led);
            slot.push((entity, color));
        }

        Ok(table)
    }

    /// Ordered `(entity, on-color)` pairs configured for `led`.
    pub fn entities_for(&self, led: usize) -> &[(String, Color)] {
        self.leds.get(&led).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every LED index with at least one mapping, in ascending order.
    pub fn lit_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.leds.keys().copied()
    }

    /// LEDs affected by a state change of `entity`, if it is mapped at all.
    pub fn leds_for_entity(&self, entity: &str) -> Option<&BTreeSet<usize>> {
        self.by_entity.get(entity)
    }

    pub fn contains_entity(&self, entity: &str) -> bool {
        self.by_entity.contains_key(entity)
    }

    /// The distinct entity identifiers in the table (subscription set).
    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.by_entity.keys().map(String::as_str)
    }

    /// Highest configured LED index, if any. Used for strip-length validation.
    pub fn max_index(&self) -> Option<usize> {
        self.leds.keys().next_back().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.leds.is_empty()
    }

    /// Human-readable table dump, one line per mapping entry.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for (led, entries) in &self.leds {
            for (entity, color) in entries {
                let _ = writeln!(out, "LED {led} -> {entity} {color}");
            }
        }
        out
    }
}
