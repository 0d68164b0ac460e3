use std::sync::Arc;

use tracing::{debug, trace};

use riffle_common::{AnalyzerConfig, Result, RiffleError};
use riffle_sql::{Catalog, Context, Plan};

use crate::rules;

/// Signature every rule implements: a pure function from plan to plan.
/// A rule must leave a resolved plan resolved.
pub type RuleFn = fn(&Context, &Analyzer, Plan) -> Result<Plan>;

/// A named rewrite in the pipeline.
#[derive(Clone)]
pub struct Rule {
    pub name: &'static str,
    pub apply: RuleFn,
}

/// The rule pipeline driver. `analyze` applies the rules in order,
/// repeatedly, until a full pass leaves the plan structurally unchanged.
pub struct Analyzer {
    pub catalog: Arc<Catalog>,
    /// Database unqualified table names resolve against. Settable per
    /// session.
    pub current_database: String,
    /// Ordered rule list; overrideable for tests.
    pub rules: Vec<Rule>,
    max_iterations: usize,
}

impl Analyzer {
    /// Analyzer with the default rule pipeline and configuration.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_config(catalog, AnalyzerConfig::default())
    }

    pub fn with_config(catalog: Arc<Catalog>, config: AnalyzerConfig) -> Self {
        Self {
            catalog,
            current_database: config.current_database,
            rules: rules::default_rules(),
            max_iterations: config.max_iterations,
        }
    }

    /// Run the pipeline to a fixed point. Fails with `MaxAnalysisIters`
    /// when the bound is exceeded, with `Cancelled` when the context is
    /// cancelled between iterations, and with `InvalidPlan` when the
    /// fixed point still contains unresolved nodes.
    pub fn analyze(&self, ctx: &Context, plan: Plan) -> Result<Plan> {
        let mut plan = plan;
        for iteration in 0..self.max_iterations {
            ctx.ensure_active()?;
            let before = plan.clone();
            for rule in &self.rules {
                let before_rule = plan.clone();
                plan = (rule.apply)(ctx, self, plan)?;
                trace!(rule = rule.name, changed = plan != before_rule, "applied rule");
            }
            if plan == before {
                debug!(iterations = iteration + 1, "analysis reached fixed point");
                if !plan.resolved() {
                    return Err(RiffleError::InvalidPlan(
                        "plan still contains unresolved nodes after analysis".to_string(),
                    ));
                }
                return Ok(plan);
            }
        }
        Err(RiffleError::MaxAnalysisIters(self.max_iterations))
    }
}
