//! Ordered middleware chains in front of a handler.
//!
//! # Lifecycle
//!
//! ```text
//! Chain::new()  ──with(unit)──▶  Chain  ──with(unit)──▶  Chain  ──route(handler)──▶  BoundRoute
//!   (empty)                    (building, immutable)                               (snapshot)
//! ```
//!
//! Every `with` returns a new chain and leaves the receiver untouched, so a
//! shared prefix can branch into many routes. Binding snapshots the units;
//! appending to the builder afterwards never changes a bound route.
//!
//! # Execution
//!
//! Per request, [`BoundRoute`] clones its initial context and runs each unit
//! in registration order, awaiting one before starting the next:
//!
//! - [`ChainResult::Continue`] merges the unit's fragment into the context
//! - [`ChainResult::ShortCircuit`] returns that response immediately
//! - `Err` or a panic becomes an `INTERNAL_ERROR` response
//!
//! When every unit continues, the handler runs with the final context.

mod bound;
mod chain;
mod context;
mod handler;
mod unit;

pub use bound::BoundRoute;
pub use chain::Chain;
pub use context::{ContextFragment, RequestContext};
pub use handler::Handler;
pub use unit::{ChainResult, FnMiddleware, Middleware, MiddlewareUnit, from_fn};
