//! Persistent middleware chains.

use std::fmt;
use std::sync::Arc;

use super::bound::BoundRoute;
use super::context::{ContextFragment, RequestContext};
use super::handler::Handler;
use super::unit::{Middleware, MiddlewareUnit};

struct Node {
    unit: MiddlewareUnit,
    prev: Option<Arc<Node>>,
}

/// An immutable, ordered sequence of units.
///
/// Appending returns a new chain that shares its prefix with the original,
/// so one base chain can branch into several routes without copying and
/// without either branch seeing the other's units.
///
/// # Example
///
/// ```rust
/// use request_pipeline::pipeline::{from_fn, Chain, ChainResult};
///
/// let base = Chain::new().with(from_fn("a", |_, _| Ok(ChainResult::proceed())));
/// let left = base.with(from_fn("b", |_, _| Ok(ChainResult::proceed())));
/// let right = base.with(from_fn("c", |_, _| Ok(ChainResult::proceed())));
///
/// assert_eq!(base.names(), vec!["a"]);
/// assert_eq!(left.names(), vec!["a", "b"]);
/// assert_eq!(right.names(), vec!["a", "c"]);
/// ```
#[derive(Clone, Default)]
pub struct Chain {
    tail: Option<Arc<Node>>,
    len: usize,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a unit. `self` is left untouched.
    #[must_use]
    pub fn with(&self, middleware: impl Middleware) -> Self {
        self.with_unit(MiddlewareUnit::new(middleware))
    }

    /// Append a unit that also contributes `fragment` to every request's
    /// initial context.
    #[must_use]
    pub fn with_context(&self, middleware: impl Middleware, fragment: ContextFragment) -> Self {
        self.with_unit(MiddlewareUnit::with_context(middleware, fragment))
    }

    #[must_use]
    pub fn with_unit(&self, unit: MiddlewareUnit) -> Self {
        Self {
            tail: Some(Arc::new(Node {
                unit,
                prev: self.tail.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Units in registration order.
    pub fn units(&self) -> Vec<MiddlewareUnit> {
        let mut units = Vec::with_capacity(self.len);
        let mut cursor = self.tail.as_deref();
        while let Some(node) = cursor {
            units.push(node.unit.clone());
            cursor = node.prev.as_deref();
        }
        units.reverse();
        units
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.units().iter().map(MiddlewareUnit::name).collect()
    }

    /// Bind the chain to `handler`.
    ///
    /// The units are snapshotted and their static fragments merged once, in
    /// registration order, into the context every request starts from.
    pub fn route(&self, handler: impl Handler) -> BoundRoute {
        self.route_named("route", handler)
    }

    /// Like [`Chain::route`], with a name used in logs and metric labels.
    pub fn route_named(&self, name: impl Into<String>, handler: impl Handler) -> BoundRoute {
        let units = self.units();
        let mut initial = RequestContext::new();
        for fragment in units.iter().filter_map(MiddlewareUnit::static_fragment) {
            initial.merge(fragment.clone());
        }
        BoundRoute::new(name.into(), units, initial, Box::new(handler))
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("units", &self.names())
            .finish()
    }
}
