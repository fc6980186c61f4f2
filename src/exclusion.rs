use std::collections::BTreeSet;

use crate::config::{InstrumentConfig, DEFAULT_EXCLUSIONS};

/// Fully-qualified names whose calls are left alone.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    names: BTreeSet<String>,
}

impl ExclusionFilter {
    pub fn from_config(config: &InstrumentConfig) -> Self {
        let mut filter = Self::default();
        if !config.replace_default_exclusions {
            filter.extend(DEFAULT_EXCLUSIONS.iter().copied());
        }
        filter.extend(config.exclude.iter().map(String::as_str));
        // The sink's own calls must never be wrapped.
        filter.insert(&config.runtime_ident);
        filter
    }

    pub fn insert(&mut self, name: &str) {
        self.names.insert(name.to_string());
    }

    pub fn extend<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for n in names {
            self.insert(n);
        }
    }

    /// False when `name` is excluded or is a dotted member of an excluded name.
    pub fn should_instrument(&self, name: &str) -> bool {
        !self.names.iter().any(|ex| {
            name == ex
                || name
                    .strip_prefix(ex.as_str())
                    .map_or(false, |rest| rest.starts_with('.'))
        })
    }
}
