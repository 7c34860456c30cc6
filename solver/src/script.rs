use std::fmt::Write;

use common::expr::{free_symbols_of, sort_smtlib, Expr};

/// What the rendered script asks of the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Satisfiability,
    FullModel,
}

/// Optimization directive rendered ahead of the satisfiability check.
#[derive(Debug, Clone)]
pub enum Objective {
    Minimize(Expr),
    Maximize(Expr),
}

pub fn satisfiability_script<'a>(
    constraints: impl Iterator<Item = &'a Expr> + Clone,
) -> String {
    build_script(constraints, Request::Satisfiability, None)
}

pub fn full_model_script<'a>(
    constraints: impl Iterator<Item = &'a Expr> + Clone,
    objective: Option<&'a Objective>,
) -> String {
    build_script(constraints, Request::FullModel, objective)
}

/// Renders a complete script: symbol declarations in first-use order (so the
/// same constraint set always produces the same text), one assert per
/// constraint, the optional objective, then the check and model request.
/// Pure string construction; no I/O.
pub fn build_script<'a>(
    constraints: impl Iterator<Item = &'a Expr> + Clone,
    request: Request,
    objective: Option<&'a Objective>,
) -> String {
    let mut script = String::new();
    if request == Request::FullModel {
        script.push_str("(set-option :produce-models true)\n");
    }

    let objective_expr = objective.map(|o| match o {
        Objective::Minimize(e) | Objective::Maximize(e) => e,
    });
    for (name, sort) in free_symbols_of(constraints.clone().chain(objective_expr)) {
        writeln!(script, "(declare-fun {name} () {})", sort_smtlib(&sort)).unwrap();
    }

    for constraint in constraints {
        writeln!(script, "(assert {})", constraint.to_smtlib()).unwrap();
    }

    if let Some(objective) = objective {
        let (directive, expr) = match objective {
            Objective::Minimize(e) => ("minimize", e),
            Objective::Maximize(e) => ("maximize", e),
        };
        writeln!(script, "({directive} {})", expr.to_smtlib()).unwrap();
    }

    script.push_str("(check-sat)\n");
    if request == Request::FullModel {
        script.push_str("(get-model)\n");
    }
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satisfiability_script_declares_and_asserts_in_order() {
        let x = Expr::bv_symbol("x", 8);
        let y = Expr::bv_symbol("y", 8);
        let constraints = vec![
            x.clone().bvugt(Expr::bv_const(8, 10)),
            y.bvult(x),
        ];

        let script = satisfiability_script(constraints.iter());
        assert_eq!(
            script,
            "(declare-fun x () (_ BitVec 8))\n\
             (declare-fun y () (_ BitVec 8))\n\
             (assert (bvugt x #x0a))\n\
             (assert (bvult y x))\n\
             (check-sat)\n"
        );
    }

    #[test]
    fn full_model_script_requests_a_model() {
        let p = Expr::bool_symbol("p");
        let script = full_model_script(std::iter::once(&p), None);
        assert!(script.starts_with("(set-option :produce-models true)\n"));
        assert!(script.contains("(declare-fun p () Bool)\n"));
        assert!(script.ends_with("(check-sat)\n(get-model)\n"));
    }

    #[test]
    fn objective_is_rendered_before_the_check() {
        let d = Expr::bv_symbol("d", 4);
        let constraint = d.clone()._neq(Expr::bv_const(4, 0));
        let script = full_model_script(
            std::iter::once(&constraint),
            Some(&Objective::Minimize(d)),
        );

        let minimize = script.find("(minimize d)").unwrap();
        let check = script.find("(check-sat)").unwrap();
        assert!(minimize < check);
    }

    #[test]
    fn symbols_only_in_the_objective_are_still_declared() {
        let p = Expr::bool_symbol("p");
        let d = Expr::bv_symbol("d", 4);
        let script = full_model_script(std::iter::once(&p), Some(&Objective::Minimize(d)));
        assert!(script.contains("(declare-fun d () (_ BitVec 4))\n"));
    }

    #[test]
    fn repeated_symbols_are_declared_once() {
        let x = Expr::bv_symbol("x", 8);
        let constraints = vec![
            x.clone().bvugt(Expr::bv_const(8, 10)),
            x.bvult(Expr::bv_const(8, 20)),
        ];
        let script = satisfiability_script(constraints.iter());
        assert_eq!(script.matches("declare-fun x").count(), 1);
    }
}
