//! Partial worlds for open-universe models
//!
//! This crate holds the pieces of a particle that know nothing about
//! populations or weights:
//!
//! - [`PartialWorld`]: a copy-on-write map from variables to bindings
//! - [`EvalContext`]: lazy, self-supporting instantiation with
//!   value-dependent parents
//! - [`Model`] and [`DependencyModel`]: where distributions come from
//! - [`Query`]: named expressions with weighted histograms
//!
//! # Example
//!
//! ```
//! use openpf_world::prelude::*;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let model = StaticModel::builder()
//!     .random("Coin", DependencyModel::fixed(bernoulli(0.5)))
//!     .build();
//! let mut world = PartialWorld::new();
//! let mut rng = StdRng::seed_from_u64(1);
//! let mut ctx = EvalContext::new(&mut world, &model, &mut rng);
//! let v = ctx.ensure_instantiated(&Variable::constant("Coin")).unwrap();
//! assert!(v.as_bool().is_some());
//! ```

pub mod context;
pub mod distrib;
pub mod error;
pub mod model;
pub mod query;
pub mod world;

pub use context::{EvalContext, ForcedValues};
pub use distrib::{Bernoulli, Categorical, Distribution, PointMass};
pub use error::{WorldError, WorldResult};
pub use model::{Clause, DependencyModel, Model, ModelBuilder, StaticModel};
pub use query::{Expression, FnExpression, Query};
pub use world::{Binding, PartialWorld};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::distrib::{bernoulli, categorical, point};
    pub use crate::{
        Clause, DependencyModel, Distribution, EvalContext, Expression, FnExpression, Model,
        PartialWorld, Query, StaticModel, WorldError, WorldResult,
    };
    pub use openpf_types::{Evidence, EvidenceKind, GeneratorId, Histogram, Value, Variable};
}
