//! Language → injector registry
//!
//! Built once during startup and then only read. Registration goes through
//! the map's entry API so concurrent registrations of the same language
//! resolve to exactly one winner.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::config::ConfigInjector;
use super::injector::ProfileInjector;
use super::Injector;
use crate::crd::Language;
use crate::{Error, Result};

/// Registry of injectors keyed by the language they handle
#[derive(Default)]
pub struct InjectorRegistry {
    injectors: DashMap<Language, Arc<dyn Injector>>,
}

impl InjectorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in injector for every [`Language`]
    pub fn with_default_injectors(config: Arc<dyn ConfigInjector>) -> Result<Self> {
        let registry = Self::new();
        for language in Language::ALL {
            registry.register(Arc::new(ProfileInjector::for_language(
                *language,
                config.clone(),
            )))?;
        }
        Ok(registry)
    }

    /// Bind `injector` under its language.
    ///
    /// Fails with [`Error::DuplicateLanguage`] if the language is taken.
    pub fn register(&self, injector: Arc<dyn Injector>) -> Result<()> {
        let language = injector.language();
        match self.injectors.entry(language) {
            Entry::Occupied(_) => Err(Error::DuplicateLanguage(language)),
            Entry::Vacant(slot) => {
                slot.insert(injector);
                Ok(())
            }
        }
    }

    /// Injector for `language`
    pub fn lookup(&self, language: Language) -> Result<Arc<dyn Injector>> {
        self.injectors
            .get(&language)
            .map(|entry| entry.value().clone())
            .ok_or(Error::UnknownLanguage(language))
    }

    /// Registered languages, sorted
    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<_> = self.injectors.iter().map(|e| *e.key()).collect();
        languages.sort();
        languages
    }

    /// Number of registered injectors
    pub fn len(&self) -> usize {
        self.injectors.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.injectors.is_empty()
    }
}
