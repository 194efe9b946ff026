// SPDX-License-Identifier: Apache-2.0
//! Resolves every activity's declared [`Dependencies`] against the registered
//! activities, singletons, per-activity factories, and configuration tree.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::activity::{Activity, Dependencies};
use crate::domain::config::{ConfigError, Configuration};
use crate::domain::identity::ActivityIdentity;

#[derive(Debug, Clone, thiserror::Error)]
pub enum InjectorError {
    #[error("{identity}: dependency on {type_name} is unsatisfiable: no matching activity, factory, or singleton is registered")]
    MissingDependency {
        identity: ActivityIdentity,
        type_name: &'static str,
    },
    #[error("{identity}: field of type {type_name} names a registered activity, but was wired as a value collaborator (use an activity reference instead)")]
    BadDependencyType {
        identity: ActivityIdentity,
        type_name: &'static str,
    },
    #[error("{identity}: config binding failed: {source}")]
    Config {
        identity: ActivityIdentity,
        #[source]
        source: ConfigError,
    },
}

type AnyArc = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn(&ActivityIdentity) -> AnyArc + Send + Sync>;

/// The registries the injector resolves against. Populated by
/// `Orchestrator::inject`/`provide`/`add_activity` before `Execute` begins.
#[derive(Default)]
pub struct Injector {
    singletons: HashMap<TypeId, AnyArc>,
    factories: HashMap<TypeId, Factory>,
    activities_by_type: HashMap<TypeId, AnyArc>,
    config: Configuration,
}

impl Injector {
    pub fn new() -> Self {
        Self {
            singletons: HashMap::new(),
            factories: HashMap::new(),
            activities_by_type: HashMap::new(),
            config: Configuration::empty(),
        }
    }

    pub fn set_config(&mut self, config: Configuration) {
        self.config = config;
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn register_singleton<T: Send + Sync + 'static>(&mut self, value: T) {
        self.singletons.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn register_factory<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&ActivityIdentity) -> T + Send + Sync + 'static,
    {
        self.factories.insert(
            TypeId::of::<T>(),
            Box::new(move |identity| Arc::new(factory(identity)) as AnyArc),
        );
    }

    /// Records a concrete activity instance under its own type, so other
    /// activities' `activity_ref`/`anonymous_ref` bindings can resolve it.
    pub fn register_activity<T: Activity>(&mut self, instance: Arc<T>) {
        self.activities_by_type
            .insert(TypeId::of::<T>(), instance as AnyArc);
    }

    pub fn is_registered_activity_type(&self, type_id: TypeId) -> bool {
        self.activities_by_type.contains_key(&type_id)
    }

    /// Apply every binding on `deps` for the activity identified by `identity`.
    pub fn resolve(&self, identity: &ActivityIdentity, deps: &Dependencies) -> Result<(), InjectorError> {
        for binding in &deps.collaborators {
            if self.activities_by_type.contains_key(&binding.type_id) {
                return Err(InjectorError::BadDependencyType {
                    identity: identity.clone(),
                    type_name: binding.type_name,
                });
            }
            if let Some(value) = self.resolve_collaborator(binding.type_id, identity) {
                let _ = (binding.apply)(value);
            }
        }

        for binding in &deps.activity_refs {
            if let Some(activity) = self.activities_by_type.get(&binding.type_id) {
                let _ = (binding.apply)(Arc::clone(activity));
                continue;
            }
            match self.resolve_collaborator(binding.type_id, identity) {
                Some(value) => {
                    let _ = (binding.apply)(value);
                }
                None => {
                    return Err(InjectorError::MissingDependency {
                        identity: identity.clone(),
                        type_name: binding.type_name,
                    });
                }
            }
        }

        // anonymous_refs contribute graph edges only; nothing to assign.

        for binding in &deps.configs {
            if let Some(value) = self.config.get_path(&binding.path) {
                (binding.apply)(value).map_err(|source| InjectorError::Config {
                    identity: identity.clone(),
                    source,
                })?;
            }
        }

        Ok(())
    }

    fn resolve_collaborator(&self, type_id: TypeId, identity: &ActivityIdentity) -> Option<AnyArc> {
        if let Some(factory) = self.factories.get(&type_id) {
            return Some(factory(identity));
        }
        self.singletons.get(&type_id).cloned()
    }
}
