//! Static registry of function classes

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::schema::{parse_metadata, FunctionSchema};
use super::{AgentFunctions, FileSystemFunctions, FunctionClass, TestFunctions};
use crate::{DispatchError, RegistryError};

struct RegisteredClass {
    instance: Arc<dyn FunctionClass>,
    schemas: BTreeMap<String, FunctionSchema>,
}

/// A method bound to its class instance
#[derive(Clone)]
pub struct ResolvedFunction {
    pub instance: Arc<dyn FunctionClass>,
    pub schema: FunctionSchema,
}

/// Maps `(class, method)` to a callable and its schema
#[derive(Default)]
pub struct FunctionRegistry {
    classes: HashMap<String, RegisteredClass>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `Agent`, `FileSystem` and `TestFunctions`
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(Arc::new(AgentFunctions::new()))?;
        registry.register(Arc::new(FileSystemFunctions::new()))?;
        registry.register(Arc::new(TestFunctions::new()))?;
        Ok(registry)
    }

    /// Add a class, checking its metadata covers exactly its methods
    pub fn register(&mut self, class: Arc<dyn FunctionClass>) -> Result<(), RegistryError> {
        let class_name = class.name().to_string();
        if self.classes.contains_key(&class_name) {
            return Err(RegistryError::Duplicate(class_name));
        }

        let documents = parse_metadata(class.metadata()).map_err(|source| {
            RegistryError::InvalidMetadata {
                class: class_name.clone(),
                source,
            }
        })?;

        let mut schemas = BTreeMap::new();
        for schema in documents.into_iter().filter(|s| s.class == class_name) {
            if !class.methods().contains(&schema.name.as_str()) {
                return Err(RegistryError::UndeclaredMethod {
                    class: class_name,
                    method: schema.name,
                });
            }
            schemas.insert(schema.name.clone(), schema);
        }

        if let Some(missing) = class.methods().iter().find(|m| !schemas.contains_key(**m)) {
            return Err(RegistryError::MissingMetadata(format!(
                "{}.{}",
                class_name, missing
            )));
        }

        debug!("registered class {} ({} methods)", class_name, schemas.len());
        self.classes.insert(
            class_name,
            RegisteredClass {
                instance: class,
                schemas,
            },
        );
        Ok(())
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Registered class names, sorted
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Fail with `FunctionNotFound` for any unknown class name
    pub fn validate_classes(&self, names: &[String]) -> Result<(), DispatchError> {
        match names.iter().find(|n| !self.has_class(n)) {
            Some(unknown) => Err(DispatchError::FunctionNotFound {
                name: unknown.clone(),
                available: self.class_names(),
            }),
            None => Ok(()),
        }
    }

    /// Look up a method among the `active` classes
    pub fn resolve(
        &self,
        active: &[String],
        class: &str,
        method: &str,
    ) -> Result<ResolvedFunction, DispatchError> {
        let qualified = format!("{}.{}", class, method);

        let registered = self
            .classes
            .get(class)
            .filter(|_| active.iter().any(|a| a == class))
            .ok_or_else(|| DispatchError::FunctionNotFound {
                name: qualified.clone(),
                available: self
                    .class_names()
                    .into_iter()
                    .filter(|c| active.contains(c))
                    .collect(),
            })?;

        let schema = registered
            .schemas
            .get(method)
            .ok_or_else(|| DispatchError::FunctionNotFound {
                name: qualified,
                available: registered
                    .schemas
                    .values()
                    .map(|s| s.qualified_name())
                    .collect(),
            })?;

        Ok(ResolvedFunction {
            instance: Arc::clone(&registered.instance),
            schema: schema.clone(),
        })
    }

    /// Schemas of the given classes, in class then method order
    pub fn schemas_for(&self, classes: &[String]) -> Vec<FunctionSchema> {
        let mut names: Vec<&String> = classes.iter().filter(|c| self.has_class(c)).collect();
        names.sort();
        names.dedup();
        names
            .into_iter()
            .filter_map(|c| self.classes.get(c.as_str()))
            .flat_map(|c| c.schemas.values().cloned())
            .collect()
    }
}
