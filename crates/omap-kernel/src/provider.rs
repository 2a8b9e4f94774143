//! Lazily built rule sets shared by every mapper that asks for one.

use crate::declaration::ConfigurationBuilder;
use crate::engine::ObjectMapper;
use crate::error::ConfigError;
use crate::resolver::DependencyResolver;
use crate::rules::RuleSet;
use crate::types::TypeRegistry;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

type Configure = Box<dyn Fn(&TypeRegistry, &mut ConfigurationBuilder) + Send + Sync>;

/// Runs a configuration closure on first use and hands out the same
/// [`RuleSet`] afterwards.
///
/// A failed build is not cached; the next call configures again.
pub struct RuleSetProvider {
    types: Arc<TypeRegistry>,
    configure: Configure,
    rules: OnceLock<Arc<RuleSet>>,
}

impl RuleSetProvider {
    pub fn new<F>(types: Arc<TypeRegistry>, configure: F) -> Self
    where
        F: Fn(&TypeRegistry, &mut ConfigurationBuilder) + Send + Sync + 'static,
    {
        Self {
            types,
            configure: Box::new(configure),
            rules: OnceLock::new(),
        }
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Whether a rule set has been built yet.
    pub fn is_built(&self) -> bool {
        self.rules.get().is_some()
    }

    pub fn rules(&self) -> Result<Arc<RuleSet>, ConfigError> {
        if let Some(rules) = self.rules.get() {
            return Ok(Arc::clone(rules));
        }

        let mut builder = ConfigurationBuilder::new();
        (self.configure)(&self.types, &mut builder);
        let built = Arc::new(builder.build(Arc::clone(&self.types))?);
        debug!(entries = built.entries().len(), "rule set provider built");

        // A concurrent caller may have won; everyone shares the stored set.
        Ok(Arc::clone(self.rules.get_or_init(|| built)))
    }

    /// A mapper over the shared rule set.
    pub fn mapper(
        &self,
        resolver: Arc<dyn DependencyResolver>,
    ) -> Result<ObjectMapper, ConfigError> {
        Ok(ObjectMapper::new(self.rules()?, resolver))
    }
}

impl fmt::Debug for RuleSetProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSetProvider")
            .field("built", &self.is_built())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigIssueKind;
    use crate::resolver::NoDependencies;
    use crate::types::{Member, ScalarKind};
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> Arc<TypeRegistry> {
        let mut types = TypeRegistry::new();
        let int = types.scalar(ScalarKind::I32);
        let foo = types.declare_class("Foo").unwrap();
        let bar = types.declare_class("Bar").unwrap();
        types.add_member(foo, Member::new("Property1", int)).unwrap();
        types.add_member(bar, Member::new("Property1", int)).unwrap();
        Arc::new(types)
    }

    #[test]
    fn configures_once_and_shares_the_rule_set() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let provider = RuleSetProvider::new(registry(), move |types, builder| {
            counter.fetch_add(1, Ordering::SeqCst);
            let foo = types.lookup("Foo").unwrap();
            let bar = types.lookup("Bar").unwrap();
            builder.map(foo, bar).map_all();
        });
        assert!(!provider.is_built());

        let first = provider.rules().unwrap();
        let second = provider.rules().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(provider.is_built());
        assert_eq!(first.describe(), vec!["Foo.Property1 -> Bar.Property1"]);
    }

    #[test]
    fn mappers_from_one_provider_share_rules() {
        let provider = RuleSetProvider::new(registry(), |types, builder| {
            let foo = types.lookup("Foo").unwrap();
            let bar = types.lookup("Bar").unwrap();
            builder.map(foo, bar).map_all();
        });
        let types = Arc::clone(provider.types());
        let foo = types.lookup("Foo").unwrap();
        let bar = types.lookup("Bar").unwrap();

        let mapper = provider.mapper(Arc::new(NoDependencies)).unwrap();
        let other = provider.mapper(Arc::new(NoDependencies)).unwrap();
        assert!(std::ptr::eq(mapper.rules(), other.rules()));

        let source = types.instantiate(foo).unwrap();
        source.set("Property1", Value::I32(4)).unwrap();
        let target = mapper.map(&source, bar).unwrap();
        assert_eq!(target.get("Property1"), Some(Value::I32(4)));
    }

    #[test]
    fn failed_build_is_retried() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let provider = RuleSetProvider::new(registry(), move |types, builder| {
            counter.fetch_add(1, Ordering::SeqCst);
            let foo = types.lookup("Foo").unwrap();
            let bar = types.lookup("Bar").unwrap();
            builder.map(foo, bar).property("Missing", "Property1");
        });

        let err = provider.rules().unwrap_err();
        assert_eq!(err.issues().len(), 1);
        assert_eq!(err.issues()[0].kind, ConfigIssueKind::MissingMemberOnSource);

        assert!(provider.rules().is_err());
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert!(!provider.is_built());
    }
}
