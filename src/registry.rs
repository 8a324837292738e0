//! Handler registry and dispatch resolution.
//!
//! Handlers are keyed by [`FailureType`]. Resolution picks the most
//! specific registered type the failure is an instance of. Specificity is
//! path depth, so a subtype always beats its supertypes; unrelated
//! candidates of equal depth fall back to registration order.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::call::Handler;
use crate::error::{GuardError, Result};
use crate::failure::{Failure, FailureType};

/// Per-handler debug setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugOverride {
    /// Use the guard's global debug flag.
    #[default]
    Inherit,
    /// Always bypass this handler and re-raise.
    On,
    /// Never bypass this handler.
    Off,
}

impl DebugOverride {
    /// Effective debug flag given the guard's global default.
    #[must_use]
    pub const fn resolve(self, global: bool) -> bool {
        match self {
            Self::Inherit => global,
            Self::On => true,
            Self::Off => false,
        }
    }
}

impl From<Option<bool>> for DebugOverride {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Self::Inherit,
            Some(true) => Self::On,
            Some(false) => Self::Off,
        }
    }
}

/// Options attached to a handler registration.
#[derive(Debug, Clone, Default)]
pub struct HandlerOptions {
    /// Debug override for this handler.
    pub debug: DebugOverride,
    /// Context attribute the caught failure is exposed under.
    pub alias: Option<String>,
}

impl HandlerOptions {
    /// Options with no override and no alias.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces debug on or off for this handler.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = if enabled {
            DebugOverride::On
        } else {
            DebugOverride::Off
        };
        self
    }

    /// Exposes the caught failure as `ctx.failure(alias)` while the handler runs.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// One registered failure type and what to do about it.
pub struct HandlerEntry<A, T> {
    /// Type this entry was registered for
    pub failure_type: FailureType,
    /// Handler to invoke
    pub handler: Handler<A, T>,
    /// Debug override
    pub debug: DebugOverride,
    /// Alias for the failure in the context
    pub alias: Option<String>,
}

impl<A, T> Clone for HandlerEntry<A, T> {
    fn clone(&self) -> Self {
        Self {
            failure_type: self.failure_type.clone(),
            handler: Arc::clone(&self.handler),
            debug: self.debug,
            alias: self.alias.clone(),
        }
    }
}

impl<A, T> std::fmt::Debug for HandlerEntry<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("failure_type", &self.failure_type)
            .field("debug", &self.debug)
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

/// Except/else/finally handlers for one guard.
pub struct HandlerRegistry<A, T> {
    handlers: IndexMap<FailureType, HandlerEntry<A, T>>,
    else_handler: Option<Handler<A, T>>,
    finally_handler: Option<Handler<A, T>>,
}

impl<A, T> Default for HandlerRegistry<A, T> {
    fn default() -> Self {
        Self {
            handlers: IndexMap::new(),
            else_handler: None,
            finally_handler: None,
        }
    }
}

impl<A, T> HandlerRegistry<A, T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates every type in `types` with `handler`.
    ///
    /// Re-registering a type replaces its entry but keeps its original
    /// position for tie-breaking.
    pub fn register_handler<I>(
        &mut self,
        types: I,
        handler: &Handler<A, T>,
        options: &HandlerOptions,
    ) where
        I: IntoIterator<Item = FailureType>,
    {
        for failure_type in types {
            let entry = HandlerEntry {
                failure_type: failure_type.clone(),
                handler: Arc::clone(handler),
                debug: options.debug,
                alias: options.alias.clone(),
            };
            tracing::debug!(failure_type = %failure_type, "registered handler");
            self.handlers.insert(failure_type, entry);
        }
    }

    /// Registers `handler` for every failure.
    pub fn register_catch_all(&mut self, handler: &Handler<A, T>) {
        self.register_handler([FailureType::any()], handler, &HandlerOptions::default());
    }

    /// Sets the else handler, replacing any previous one.
    pub fn register_else(&mut self, handler: Handler<A, T>) {
        self.else_handler = Some(handler);
    }

    /// Sets the finally handler, replacing any previous one.
    pub fn register_finally(&mut self, handler: Handler<A, T>) {
        self.finally_handler = Some(handler);
    }

    /// The else handler, if any.
    #[must_use]
    pub const fn else_handler(&self) -> Option<&Handler<A, T>> {
        self.else_handler.as_ref()
    }

    /// The finally handler, if any.
    #[must_use]
    pub const fn finally_handler(&self) -> Option<&Handler<A, T>> {
        self.finally_handler.as_ref()
    }

    /// Finds the most specific entry `failure` is an instance of.
    #[must_use]
    pub fn resolve(&self, failure: &Failure) -> Option<&HandlerEntry<A, T>> {
        let mut best: Option<&HandlerEntry<A, T>> = None;
        for entry in self.handlers.values() {
            if !entry.failure_type.matches(failure) {
                continue;
            }
            best = match best {
                Some(current) if entry.failure_type.depth() <= current.failure_type.depth() => {
                    Some(current)
                }
                _ => Some(entry),
            };
        }
        best
    }

    /// Checks that the registry can be executed.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Configuration`] when an else handler is set
    /// but no failure handlers are.
    pub fn validate(&self) -> Result<()> {
        if self.else_handler.is_some() && self.handlers.is_empty() {
            return Err(GuardError::Configuration(
                "else clause should come with except clause(s)".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of registered failure types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` when no failure handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered failure types in registration order.
    pub fn failure_types(&self) -> impl Iterator<Item = &FailureType> {
        self.handlers.keys()
    }
}
