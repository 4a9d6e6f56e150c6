//! Stream combinators for rendering feeds

mod coalesce;

pub use coalesce::{Coalesce, CoalesceExt};
