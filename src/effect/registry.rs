// Effect registry
// Factory-registration table for looking up effects by id

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::builtin::builtins;
use super::EffectFactory;

/// Registry for effect factories, indexed by effect id
pub struct EffectRegistry {
    by_id: BTreeMap<String, Arc<dyn EffectFactory>>,
}

impl EffectRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            by_id: BTreeMap::new(),
        }
    }

    /// Create a registry with builtin effects pre-loaded
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.load_builtins();
        registry
    }

    /// Register all builtin effects
    pub fn load_builtins(&mut self) {
        for factory in builtins() {
            self.register(Arc::new(factory));
        }
    }

    /// Register a factory, replacing any previous one with the same id
    pub fn register(&mut self, factory: Arc<dyn EffectFactory>) {
        let id = factory.id().to_string();
        if self.by_id.insert(id.clone(), factory).is_some() {
            debug!(effect_id = %id, "replaced registered effect");
        }
    }

    pub fn find(&self, id: &str) -> Option<Arc<dyn EffectFactory>> {
        self.by_id.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> Vec<&str> {
        self.by_id.keys().map(String::as_str).collect()
    }

    pub fn all(&self) -> Vec<Arc<dyn EffectFactory>> {
        self.by_id.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Global builtin effect registry
/// Use `effect_registry()` to access
static REGISTRY: std::sync::OnceLock<EffectRegistry> = std::sync::OnceLock::new();

/// Get the global effect registry
/// Initializes with builtin effects on first access
pub fn effect_registry() -> &'static EffectRegistry {
    REGISTRY.get_or_init(EffectRegistry::with_builtins)
}
