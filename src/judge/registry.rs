use crate::config::engine::Toolchain;
use crate::config::types::{EngineError, Language, Result};
use crate::judge::adapter::LanguageDriver;
use crate::judge::languages::{
    cpp::CppDriver, java::JavaDriver, javascript::JavaScriptDriver, python::PythonDriver,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Language → driver lookup. Supporting a new language means registering one
/// more driver here.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<Language, Arc<dyn LanguageDriver>>,
}

impl DriverRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// All built-in drivers wired to the configured toolchain
    pub fn with_toolchain(toolchain: &Toolchain) -> Self {
        let mut registry = Self::empty();
        registry.register(PythonDriver::new(&toolchain.python));
        registry.register(JavaScriptDriver::new(&toolchain.node));
        registry.register(JavaDriver::new(&toolchain.javac, &toolchain.java));
        registry.register(CppDriver::new(&toolchain.cxx));
        registry
    }

    /// Add or replace the driver for its language
    pub fn register<D: LanguageDriver + 'static>(&mut self, driver: D) {
        self.drivers.insert(driver.language(), Arc::new(driver));
    }

    /// Resolve a caller-supplied language identifier
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn LanguageDriver>> {
        Language::parse(name)
            .and_then(|language| self.drivers.get(&language).cloned())
            .ok_or_else(|| EngineError::UnsupportedLanguage(name.to_string()))
    }

    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.drivers.keys().copied().collect();
        languages.sort_by_key(|l| l.as_str());
        languages
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}
