//! Fixture registration table.
//!
//! Built once before a run starts: method name → descriptor, plus the
//! fixture instances that want to be handed the run's reporter.

use crate::hub::TestRunReportable;
use crate::method::FixtureMethod;
use crate::result::{EnsayoError, EnsayoResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Registry of fixture methods and reportable fixtures.
///
/// # Example
///
/// ```ignore
/// let mut registry = FixtureRegistry::new();
/// registry.register(type_into)?;
/// registry.register(click)?;
/// registry.register_reportable(Arc::new(SampleFixture::default()));
/// let registry = Arc::new(registry);
/// ```
#[derive(Default)]
pub struct FixtureRegistry {
    methods: HashMap<String, FixtureMethod>,
    reportables: Vec<Arc<dyn TestRunReportable>>,
}

impl fmt::Debug for FixtureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureRegistry")
            .field("method_count", &self.methods.len())
            .field("reportable_count", &self.reportables.len())
            .finish()
    }
}

impl FixtureRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fixture method.
    ///
    /// # Errors
    ///
    /// Fails if a method with the same name is already registered.
    pub fn register(&mut self, method: FixtureMethod) -> EnsayoResult<()> {
        if self.methods.contains_key(method.name()) {
            return Err(EnsayoError::DuplicateMethod {
                name: method.name().to_string(),
            });
        }
        tracing::debug!(method = method.name(), "registered fixture method");
        self.methods.insert(method.name().to_string(), method);
        Ok(())
    }

    /// Register several methods at once
    pub fn register_all<I>(&mut self, methods: I) -> EnsayoResult<()>
    where
        I: IntoIterator<Item = FixtureMethod>,
    {
        methods.into_iter().try_for_each(|m| self.register(m))
    }

    /// Register a fixture that receives the reporter at run start
    pub fn register_reportable(&mut self, fixture: Arc<dyn TestRunReportable>) {
        self.reportables.push(fixture);
    }

    /// Look up a method by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FixtureMethod> {
        self.methods.get(name)
    }

    /// Look up a method by name, failing if absent
    pub fn resolve(&self, name: &str) -> EnsayoResult<&FixtureMethod> {
        self.get(name).ok_or_else(|| EnsayoError::UnknownMethod {
            name: name.to_string(),
        })
    }

    /// Check if a method is registered
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Number of registered methods
    #[must_use]
    pub fn count(&self) -> usize {
        self.methods.len()
    }

    /// Fixtures to initialise at run start
    #[must_use]
    pub fn reportables(&self) -> &[Arc<dyn TestRunReportable>] {
        &self.reportables
    }

    /// Remove a method by name
    pub fn unregister(&mut self, name: &str) -> bool {
        self.methods.remove(name).is_some()
    }

    /// All registered method names, sorted
    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
