//! Failures and failure types.
//!
//! A [`Failure`] is a shared handle to whatever error a guarded body or
//! handler produced. A [`FailureType`] is the key handlers are registered
//! under: a path that starts at the root ("any failure"), optionally names
//! a concrete error type, and may be narrowed further by labelled
//! predicates. Specificity between failure types is path-prefix ordering.

use std::any::TypeId;
use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use thiserror::Error;

type DynError = dyn StdError + Send + Sync + 'static;

// ============================================================================
// Failure
// ============================================================================

/// A caught or propagating error value.
///
/// Cloning is cheap and keeps identity: clones compare equal under
/// [`Failure::ptr_eq`]. The concrete error type is recoverable with
/// [`Failure::downcast_ref`]. `Failure` deliberately does not implement
/// `std::error::Error` so that every error type converts into it with `?`.
#[derive(Clone)]
pub struct Failure {
    error: Arc<DynError>,
    backtrace: Arc<Backtrace>,
}

impl Failure {
    /// Wraps an error value, capturing a backtrace if `RUST_BACKTRACE` is set.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            error: Arc::new(error),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    /// Creates a failure carrying only a message.
    ///
    /// The resulting failure downcasts to [`MessageFailure`].
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(MessageFailure(message.into()))
    }

    /// Adopts an already boxed error.
    #[must_use]
    pub fn from_boxed(error: Box<DynError>) -> Self {
        Self {
            error: Arc::from(error),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    /// Returns `true` if the underlying error is an `E`.
    #[must_use]
    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.error.is::<E>()
    }

    /// Returns the underlying error as `E`, if it is one.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }

    /// Returns `true` if both handles point at the same error value.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.error, &b.error)
    }

    /// Borrows the underlying error.
    #[must_use]
    pub fn as_error(&self) -> &DynError {
        &*self.error
    }

    /// Iterates the error and its `source()` chain, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &(dyn StdError + 'static)> {
        let head: &(dyn StdError + 'static) = &*self.error;
        std::iter::successors(Some(head), |&e| e.source())
    }

    /// Backtrace captured when the failure was created.
    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.error, f)
    }
}

/// Plain message failure produced by [`Failure::msg`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MessageFailure(pub String);

// ============================================================================
// FailureType
// ============================================================================

type Predicate = Arc<dyn Fn(&Failure) -> bool + Send + Sync>;

#[derive(Clone)]
enum Segment {
    Class {
        id: TypeId,
        name: &'static str,
        is_instance: fn(&Failure) -> bool,
    },
    Refine {
        label: String,
        predicate: Predicate,
    },
}

impl Segment {
    fn matches(&self, failure: &Failure) -> bool {
        match self {
            Self::Class { is_instance, .. } => is_instance(failure),
            Self::Refine { predicate, .. } => predicate(failure),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Class { name, .. } => *name,
            Self::Refine { label, .. } => label.as_str(),
        }
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Class { id: a, .. }, Self::Class { id: b, .. }) => a == b,
            (Self::Refine { label: a, .. }, Self::Refine { label: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for Segment {}

impl Hash for Segment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Class { id, .. } => {
                0u8.hash(state);
                id.hash(state);
            }
            Self::Refine { label, .. } => {
                1u8.hash(state);
                label.hash(state);
            }
        }
    }
}

fn is_instance<E: StdError + Send + Sync + 'static>(failure: &Failure) -> bool {
    failure.is::<E>()
}

/// Dispatch key for handlers.
///
/// ```text
/// any()                                   depth 0, matches everything
/// of::<io::Error>()                       depth 1
/// of::<io::Error>().narrow("missing", p)  depth 2, subtype of the above
/// ```
///
/// Two failure types are the same key when their paths agree: same error
/// type and the same refinement labels in the same order.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FailureType {
    path: Vec<Segment>,
}

impl FailureType {
    /// The root of the hierarchy; every failure is an instance of it.
    #[must_use]
    pub const fn any() -> Self {
        Self { path: Vec::new() }
    }

    /// Failures whose underlying error is an `E`.
    #[must_use]
    pub fn of<E>() -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            path: vec![Segment::Class {
                id: TypeId::of::<E>(),
                name: std::any::type_name::<E>(),
                is_instance: is_instance::<E>,
            }],
        }
    }

    /// Derives a subtype that additionally requires `predicate` to hold.
    ///
    /// The label is part of the type's identity.
    #[must_use]
    pub fn narrow<F>(mut self, label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Failure) -> bool + Send + Sync + 'static,
    {
        self.path.push(Segment::Refine {
            label: label.into(),
            predicate: Arc::new(predicate),
        });
        self
    }

    /// Number of segments below the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Returns `true` if `failure` is an instance of this type.
    #[must_use]
    pub fn matches(&self, failure: &Failure) -> bool {
        self.path.iter().all(|segment| segment.matches(failure))
    }

    /// Returns `true` if `self` is `other` or derives from it.
    #[must_use]
    pub fn is_subtype_of(&self, other: &Self) -> bool {
        self.path.starts_with(&other.path)
    }

    /// Human-readable path, e.g. `std::io::error::Error/missing`.
    #[must_use]
    pub fn name(&self) -> String {
        if self.path.is_empty() {
            return "any".to_string();
        }
        self.path
            .iter()
            .map(Segment::name)
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Debug for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FailureType({})", self.name())
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
