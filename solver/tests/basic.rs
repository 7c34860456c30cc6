use tethersolver::{Expr, QueryResult, SamplerParams, Sort, SolverCommand, Value};

#[test]
fn test_expression_building() {
    let x = Expr::bv_symbol("x", 8);
    assert_eq!(x.sort(), Sort::BitVec(8));
    assert_eq!(x.size(), 8);
    assert!(!x.is_constant());

    let constraint = x.bvugt(Expr::bv_const(8, 10));
    assert_eq!(constraint.sort(), Sort::Bool);
}

#[test]
fn test_constant_values() {
    let c = Expr::bv_const(8, 0x2a);
    assert!(c.is_constant());
    assert_eq!(c.constant_value(), Some(Value::bv(8, 0x2a)));
    assert_eq!(c.constant_value().unwrap().as_u128(), Some(0x2a));

    let b = Expr::bool_const(true);
    assert_eq!(b.constant_value(), Some(Value::Bool(true)));
    assert_eq!(b.constant_value().unwrap().as_bool(), Some(true));
}

#[test]
fn test_query_result_enum() {
    let sat = QueryResult::Sat(Default::default());
    let unsat = QueryResult::Unsat("(error \"no model\")".to_string());

    match sat {
        QueryResult::Sat(model) => assert!(model.is_empty()),
        _ => panic!("Expected Sat"),
    }

    match unsat {
        QueryResult::Unsat(diagnostic) => assert!(diagnostic.contains("no model")),
        _ => panic!("Expected Unsat"),
    }
}

#[test]
fn test_sampler_params_defaults() {
    let params = SamplerParams::default();
    assert_eq!(params.max_combine_level, 3);
    assert_eq!(params.max_anchor_bits, 128);
}

#[test]
fn test_solver_command_presets() {
    let z3 = SolverCommand::z3(None);
    assert_eq!(z3.program.to_str(), Some("z3"));
    assert!(z3.args.contains(&"-in".to_string()));

    let cvc5 = SolverCommand::cvc5(None);
    assert!(cvc5.args.contains(&"--produce-models".to_string()));
}
