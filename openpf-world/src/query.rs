//! Queries and the expressions they evaluate

use crate::context::EvalContext;
use crate::error::WorldResult;
use openpf_types::{Histogram, Value, Variable};
use std::fmt;
use std::sync::Arc;

/// Something that can be evaluated in a partial world
pub trait Expression: Send + Sync {
    /// Value of the expression, instantiating whatever it needs
    fn evaluate(&self, ctx: &mut EvalContext<'_>) -> WorldResult<Value>;

    fn describe(&self) -> String;
}

impl Expression for Variable {
    fn evaluate(&self, ctx: &mut EvalContext<'_>) -> WorldResult<Value> {
        ctx.ensure_instantiated(self)
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

type EvalFn = dyn Fn(&mut EvalContext<'_>) -> WorldResult<Value> + Send + Sync;

/// Expression backed by a closure
#[derive(Clone)]
pub struct FnExpression {
    description: String,
    eval: Arc<EvalFn>,
}

impl FnExpression {
    pub fn new<F>(description: impl Into<String>, eval: F) -> Self
    where
        F: Fn(&mut EvalContext<'_>) -> WorldResult<Value> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            eval: Arc::new(eval),
        }
    }
}

impl Expression for FnExpression {
    fn evaluate(&self, ctx: &mut EvalContext<'_>) -> WorldResult<Value> {
        (self.eval)(ctx)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

impl fmt::Debug for FnExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnExpression").field(&self.description).finish()
    }
}

/// A named expression and the weighted histogram of its answers
#[derive(Clone)]
pub struct Query {
    name: String,
    expr: Arc<dyn Expression>,
    histogram: Histogram,
}

impl Query {
    pub fn new(name: impl Into<String>, expr: Arc<dyn Expression>) -> Self {
        Self {
            name: name.into(),
            expr,
            histogram: Histogram::new(),
        }
    }

    /// Query the value of a single variable
    pub fn variable(var: Variable) -> Self {
        Self::new(var.to_string(), Arc::new(var))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &dyn Expression {
        self.expr.as_ref()
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    pub fn zero_out(&mut self) {
        self.histogram.zero_out();
    }

    /// Accumulate one weighted answer; zero weights are skipped
    pub fn record(&mut self, value: Value, weight: f64) {
        if weight > 0.0 {
            self.histogram.add(value, weight);
        }
    }

    /// Probability of `value` among the answers recorded so far
    pub fn probability(&self, value: &Value) -> f64 {
        self.histogram.probability(value)
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("name", &self.name)
            .field("expr", &self.expr.describe())
            .field("histogram", &self.histogram)
            .finish()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.name, self.histogram)
    }
}
