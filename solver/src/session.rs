use std::collections::HashSet;

use common::expr::{Assignment, Expr, Value};
use common::{log_debug, log_trace};

use crate::channel::Channel;
use crate::error::BackendError;
use crate::model;
use crate::script::{self, Objective};

/// The assignment produced by a successful `sat` query.
pub type Model = Assignment;

/// Tagged outcome of a model query. Unsatisfiability is an expected result
/// carried as data, never an error; the attached text is the solver's
/// diagnostic line.
#[derive(Debug)]
pub enum QueryResult {
    Sat(Model),
    Unsat(String),
}

/// One logical query pipeline over a solver channel: renders scripts, drives
/// the exchange, and decodes what comes back.
///
/// A session is exclusively owned by one caller; there is no internal
/// locking, and exactly one query is in flight at a time. A failed query
/// does not poison the session (except for a closed channel), but it is
/// never retried automatically either.
pub struct SmtSession<C: Channel> {
    channel: C,
    objective: Option<Objective>,
}

impl<C: Channel> SmtSession<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            objective: None,
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Appends to the session's persistent constraint set. `track` hints
    /// that the assertion should be trackable by name on solvers that
    /// support it; the text protocol has no use for it.
    pub fn add_constraints(&mut self, constraints: impl IntoIterator<Item = Expr>, track: bool) {
        self.channel.add_constraints(constraints, track);
    }

    /// Installs an optimization objective rendered into subsequent model
    /// queries. Only meaningful against an optimizing solver.
    pub fn set_objective(&mut self, objective: Objective) {
        self.objective = Some(objective);
    }

    /// Asks for a bare verdict over the session constraints plus the given
    /// extra ones. Anything but `sat`/`unsat` (including `unknown`) is a
    /// protocol error, never coerced to a verdict.
    pub fn check_satisfiable(&mut self, extra_constraints: &[Expr]) -> Result<bool, BackendError> {
        let smt_script = script::satisfiability_script(
            extra_constraints.iter().chain(self.channel.constraints()),
        );
        self.channel.reset()?;
        log_trace!("Sending script to solver:\n{}", smt_script);
        self.channel.write(&smt_script)?;
        let verdict = self.channel.read_verdict()?;
        match verdict.as_str() {
            "sat" => Ok(true),
            "unsat" => Ok(false),
            _ => Err(BackendError::UnexpectedResponse(verdict)),
        }
    }

    /// Like [`Self::check_satisfiable`], but also retrieves and decodes the
    /// model on `sat`. On `unsat` the next line is the solver's diagnostic
    /// for the unanswerable model request.
    pub fn get_model(&mut self, extra_constraints: &[Expr]) -> Result<QueryResult, BackendError> {
        let smt_script = script::full_model_script(
            extra_constraints.iter().chain(self.channel.constraints()),
            self.objective.as_ref(),
        );
        self.channel.reset()?;
        log_trace!("Sending script to solver:\n{}", smt_script);
        self.channel.write(&smt_script)?;
        let verdict = self.channel.read_verdict()?;
        match verdict.as_str() {
            "sat" => {
                let block = self.channel.read_model_block()?;
                let assignments = model::parse_assignments(&block)?;
                log_debug!("Solver returned a model with {} symbols", assignments.len());
                Ok(QueryResult::Sat(assignments.into_iter().collect()))
            }
            "unsat" => {
                let diagnostic = self.channel.read_line()?;
                Ok(QueryResult::Unsat(diagnostic.trim().to_string()))
            }
            _ => Err(BackendError::UnexpectedResponse(verdict)),
        }
    }

    /// Collects up to `n` distinct satisfying values of `expr` by excluding
    /// each found value and re-solving. Stops early, without error, when the
    /// constraints admit fewer than `n` values.
    #[tracing::instrument(level = "debug", skip(self, expr, extra_constraints))]
    pub fn eval(
        &mut self,
        expr: &Expr,
        n: usize,
        extra_constraints: &[Expr],
    ) -> Result<Vec<Value>, BackendError> {
        if let Some(value) = expr.constant_value() {
            return Ok(vec![value]);
        }

        let mut exclusions = extra_constraints.to_vec();
        let mut results = Vec::new();
        let mut seen = HashSet::new();
        while results.len() < n {
            let model = match self.get_model(&exclusions)? {
                QueryResult::Sat(model) => model,
                QueryResult::Unsat(_) => break,
            };

            let value = value_for_expr(&model, expr)?;
            // A value that was excluded in this very query cannot come back
            // from a correct solver.
            if !seen.insert(value) {
                return Err(BackendError::DuplicateValue);
            }
            results.push(value);
            exclusions.push(expr.clone()._neq(Expr::Const(value)));
        }
        Ok(results)
    }
}

/// Substitutes a model into the expression and extracts the constant it
/// collapses to. The solver claimed an assignment for every free symbol, so
/// a leftover symbolic term is an integration bug, not a user error.
pub fn value_for_expr(model: &Model, expr: &Expr) -> Result<Value, BackendError> {
    expr.substitute(model)
        .simplify()
        .constant_value()
        .ok_or(BackendError::InconsistentModel)
}
