//! Dependency resolution scope.
//!
//! A `Scope` is a type-keyed bag of shared instances with an optional parent.
//! Lookups walk from the innermost scope outwards, so a child can shadow what
//! its parent provides without affecting siblings:
//!
//! ```text
//! root ── MessageLogger, Config, ...
//!  ├─ child(handler A) ── Span(A), TransactionalQueue#1
//!  └─ child(handler B) ── Span(B), TransactionalQueue#2
//! ```
//!
//! The processor creates one child per handler invocation, so per-handler
//! registrations never leak between handlers or across concurrent pumps.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::ResolveError;

type Instances = HashMap<TypeId, Vec<Box<dyn Any + Send + Sync>>>;

struct ScopeInner {
    parent: Option<Scope>,
    instances: RwLock<Instances>,
}

/// A cheap-to-clone handle to a resolution scope.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// An empty root scope.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                parent: None,
                instances: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// A child scope that falls back to `self` for anything it does not hold.
    pub fn nested(&self) -> Scope {
        Self {
            inner: Arc::new(ScopeInner {
                parent: Some(self.clone()),
                instances: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register an instance under `T`. Trait objects register under the
    /// trait object type, e.g. `scope.register::<dyn Bus>(bus)`.
    ///
    /// Registering a second instance of the same type makes it the one
    /// `resolve` returns; `resolve_all` returns both.
    pub fn register<T>(&self, instance: Arc<T>) -> &Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let mut instances = match self.inner.instances.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        instances
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Box::new(instance));
        self
    }

    /// Register an owned value under its own type.
    pub fn register_value<T: Send + Sync + 'static>(&self, value: T) -> &Self {
        self.register(Arc::new(value))
    }

    fn local<T: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        let instances = match self.inner.instances.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        instances
            .get(&TypeId::of::<T>())
            .map(|boxed| {
                boxed
                    .iter()
                    .filter_map(|b| b.downcast_ref::<Arc<T>>().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The most recently registered `T`, searching this scope then its parents.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(found) = scope.local::<T>().pop() {
                return Some(found);
            }
            current = scope.inner.parent.as_ref();
        }
        None
    }

    /// Like `resolve`, but a missing registration is an error.
    pub fn require<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        self.resolve::<T>()
            .ok_or(ResolveError::Missing(std::any::type_name::<T>()))
    }

    /// Every registered `T`, parents first, in registration order.
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        let mut all = match &self.inner.parent {
            Some(parent) => parent.resolve_all::<T>(),
            None => Vec::new(),
        };
        all.extend(self.local::<T>());
        all
    }

    pub fn contains<T: ?Sized + Send + Sync + 'static>(&self) -> bool {
        self.resolve::<T>().is_some()
    }
}

/// Construction of a value from what a scope provides.
///
/// Handlers implement this so the registry can build a fresh instance per
/// invocation from the handler's child scope.
///
/// ```
/// use std::sync::Arc;
/// use transit_bus::{FromScope, ResolveError, Scope};
///
/// struct Greeter {
///     greeting: Arc<String>,
/// }
///
/// impl FromScope for Greeter {
///     fn from_scope(scope: &Scope) -> Result<Self, ResolveError> {
///         Ok(Self { greeting: scope.require()? })
///     }
/// }
///
/// let scope = Scope::new();
/// scope.register_value("hello".to_string());
/// assert_eq!(Greeter::from_scope(&scope).unwrap().greeting.as_str(), "hello");
/// ```
pub trait FromScope: Sized {
    fn from_scope(scope: &Scope) -> Result<Self, ResolveError>;
}

impl<T: Default> FromScope for T {
    fn from_scope(_scope: &Scope) -> Result<Self, ResolveError> {
        Ok(T::default())
    }
}
