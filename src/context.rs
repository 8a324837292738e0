//! Invocation-scoped execution context.
//!
//! Each guarded invocation gets its own [`Context`]: an attribute namespace
//! shared by the body and whichever else/except/finally stages run for that
//! invocation. The context is handed to every stage explicitly and is also
//! reachable through [`Context::current`] on the task running the
//! invocation. Once the invocation finishes the namespace is closed and
//! every accessor fails with [`GuardError::Usage`], including on clones that
//! escaped the invocation.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{GuardError, Result};
use crate::failure::Failure;

type Slot = Arc<dyn Any + Send + Sync>;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT: Context;
}

/// Handle to one invocation's attribute namespace.
///
/// Cloning yields another handle to the same namespace.
#[derive(Clone)]
pub struct Context {
    id: u64,
    slots: Arc<Mutex<Option<HashMap<String, Slot>>>>,
}

impl Context {
    /// Opens a fresh, empty namespace.
    pub(crate) fn open() -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            slots: Arc::new(Mutex::new(Some(HashMap::new()))),
        }
    }

    /// Returns the context of the invocation running on this task.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Usage`] when called outside a guarded invocation.
    pub fn current() -> Result<Self> {
        CURRENT
            .try_with(Clone::clone)
            .map_err(|_| GuardError::Usage)
    }

    /// Runs `fut` with this context installed as [`Context::current`].
    pub(crate) fn scope<F: Future>(&self, fut: F) -> impl Future<Output = F::Output> {
        CURRENT.scope(self.clone(), fut)
    }

    /// Closes the namespace, dropping every attribute.
    pub(crate) fn close(&self) {
        self.lock().take();
    }

    /// Process-unique id of the invocation this context belongs to.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns `true` while the owning invocation is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Sets (or replaces) an attribute.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Usage`] if the invocation has finished.
    pub fn set<V>(&self, name: impl Into<String>, value: V) -> Result<()>
    where
        V: Any + Send + Sync,
    {
        self.with_slots(|slots| {
            slots.insert(name.into(), Arc::new(value));
            Ok(())
        })
    }

    /// Reads an attribute as `V`.
    ///
    /// # Errors
    ///
    /// - [`GuardError::Usage`] if the invocation has finished
    /// - [`GuardError::MissingAttribute`] if `name` was never set
    /// - [`GuardError::AttributeType`] if it holds something other than `V`
    pub fn get<V>(&self, name: &str) -> Result<Arc<V>>
    where
        V: Any + Send + Sync,
    {
        let slot = self.with_slots(|slots| {
            slots
                .get(name)
                .cloned()
                .ok_or_else(|| GuardError::MissingAttribute {
                    name: name.to_string(),
                })
        })?;
        slot.downcast::<V>().map_err(|_| GuardError::AttributeType {
            name: name.to_string(),
            expected: std::any::type_name::<V>(),
        })
    }

    /// Reads the failure stored under `alias` by the dispatcher.
    ///
    /// # Errors
    ///
    /// Same as [`Context::get`].
    pub fn failure(&self, alias: &str) -> Result<Failure> {
        self.get::<Failure>(alias).map(|f| Failure::clone(&f))
    }

    /// Returns `true` if `name` is set.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Usage`] if the invocation has finished.
    pub fn contains(&self, name: &str) -> Result<bool> {
        self.with_slots(|slots| Ok(slots.contains_key(name)))
    }

    /// Deletes an attribute.
    ///
    /// # Errors
    ///
    /// - [`GuardError::Usage`] if the invocation has finished
    /// - [`GuardError::MissingAttribute`] if `name` was never set
    pub fn remove(&self, name: &str) -> Result<()> {
        self.with_slots(|slots| {
            slots
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| GuardError::MissingAttribute {
                    name: name.to_string(),
                })
        })
    }

    /// Attribute names currently set, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Usage`] if the invocation has finished.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.with_slots(|slots| {
            let mut keys: Vec<String> = slots.keys().cloned().collect();
            keys.sort();
            Ok(keys)
        })
    }

    fn with_slots<R>(&self, f: impl FnOnce(&mut HashMap<String, Slot>) -> Result<R>) -> Result<R> {
        let mut guard = self.lock();
        let slots = guard.as_mut().ok_or(GuardError::Usage)?;
        f(slots)
    }

    fn lock(&self) -> MutexGuard<'_, Option<HashMap<String, Slot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Closes its context when dropped.
///
/// Held for the duration of an invocation so that teardown also happens
/// when the invocation future is dropped early or a stage panics.
pub(crate) struct Activation {
    context: Context,
}

impl Activation {
    pub(crate) const fn new(context: Context) -> Self {
        Self { context }
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        self.context.close();
        tracing::trace!(context_id = self.context.id(), "context closed");
    }
}
