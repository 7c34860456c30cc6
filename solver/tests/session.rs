use std::collections::VecDeque;
use std::io;

use tethersolver::{BackendError, Channel, Expr, QueryResult, SmtSession, Value};

/// A channel whose responses are queued up front; what the session sends is
/// recorded and otherwise ignored.
struct ScriptedChannel {
    responses: VecDeque<u8>,
    sent: Vec<String>,
    constraints: Vec<Expr>,
}

impl ScriptedChannel {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: responses.concat().into_bytes().into(),
            sent: Vec::new(),
            constraints: Vec::new(),
        }
    }
}

impl Channel for ScriptedChannel {
    fn write(&mut self, text: &str) -> Result<(), BackendError> {
        self.sent.push(text.to_string());
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, BackendError> {
        self.responses
            .pop_front()
            .ok_or_else(|| BackendError::ChannelClosed(io::ErrorKind::UnexpectedEof.into()))
    }

    fn add_constraints(&mut self, constraints: impl IntoIterator<Item = Expr>, _track: bool) {
        self.constraints.extend(constraints);
    }

    fn constraints(&self) -> &[Expr] {
        &self.constraints
    }
}

#[test]
fn check_satisfiable_reads_verdicts() {
    let x = Expr::bv_symbol("x", 8);
    let constraint = x.clone()._eq(Expr::bv_const(8, 1));

    let mut session = SmtSession::new(ScriptedChannel::new(&["sat\n"]));
    assert!(session.check_satisfiable(&[constraint.clone()]).unwrap());

    let mut session = SmtSession::new(ScriptedChannel::new(&["unsat\n"]));
    assert!(!session.check_satisfiable(&[constraint]).unwrap());
}

#[test]
fn unknown_verdict_is_a_protocol_error() {
    let mut session = SmtSession::new(ScriptedChannel::new(&["unknown\n"]));
    let constraint = Expr::bool_symbol("p");

    match session.check_satisfiable(&[constraint]) {
        Err(BackendError::UnexpectedResponse(verdict)) => assert_eq!(verdict, "unknown"),
        _ => panic!("Expected a protocol error, not a coerced verdict"),
    }
}

#[test]
fn model_response_is_parsed_into_sat() {
    let mut session = SmtSession::new(ScriptedChannel::new(&["sat\n(\n(x #x05)\n)\n"]));

    match session.get_model(&[]).unwrap() {
        QueryResult::Sat(model) => {
            assert_eq!(model.len(), 1);
            assert_eq!(model.get("x"), Some(&Value::bv(8, 5)));
        }
        QueryResult::Unsat(_) => panic!("Expected a model"),
    }
}

#[test]
fn unsat_model_query_carries_the_diagnostic_line() {
    let mut session = SmtSession::new(ScriptedChannel::new(&[
        "unsat\n(error \"model is not available\")\n",
    ]));

    match session.get_model(&[]).unwrap() {
        QueryResult::Unsat(diagnostic) => {
            assert_eq!(diagnostic, "(error \"model is not available\")");
        }
        QueryResult::Sat(_) => panic!("Expected unsat"),
    }
}

#[test]
fn model_query_resets_and_requests_a_model() {
    let mut session = SmtSession::new(ScriptedChannel::new(&["sat\n(\n(x #x05)\n)\n"]));
    session.get_model(&[]).unwrap();

    let sent = &session.channel().sent;
    assert_eq!(sent[0], "(reset)\n");
    assert!(sent[1].starts_with("(set-option :produce-models true)\n"));
    assert!(sent[1].ends_with("(check-sat)\n(get-model)\n"));
}

#[test]
fn eval_enumerates_distinct_values_until_unsat() {
    // An 8-bit x constrained to (10, 20): exactly the nine values 11..=19
    // exist, and the tenth query comes back unsat.
    let mut responses: Vec<String> = (11..=19)
        .map(|v| format!("sat\n(\n(x #x{v:02x})\n)\n"))
        .collect();
    responses.push("unsat\n(error \"no model\")\n".to_string());
    let responses: Vec<&str> = responses.iter().map(String::as_str).collect();

    let mut session = SmtSession::new(ScriptedChannel::new(&responses));
    let x = Expr::bv_symbol("x", 8);
    session.add_constraints(
        [
            x.clone().bvugt(Expr::bv_const(8, 10)),
            x.clone().bvult(Expr::bv_const(8, 20)),
        ],
        false,
    );

    let values = session.eval(&x, 20, &[]).unwrap();
    let expected: Vec<Value> = (11..=19).map(|v| Value::bv(8, v)).collect();
    assert_eq!(values, expected);
}

#[test]
fn eval_of_a_constant_never_touches_the_channel() {
    let mut session = SmtSession::new(ScriptedChannel::new(&[]));
    let values = session.eval(&Expr::bv_const(8, 42), 5, &[]).unwrap();

    assert_eq!(values, vec![Value::bv(8, 42)]);
    assert!(session.channel().sent.is_empty());
}

#[test]
fn repeated_model_value_is_a_backend_inconsistency() {
    let mut session = SmtSession::new(ScriptedChannel::new(&[
        "sat\n(\n(x #x05)\n)\n",
        "sat\n(\n(x #x05)\n)\n",
    ]));
    let x = Expr::bv_symbol("x", 8);

    match session.eval(&x, 3, &[]) {
        Err(BackendError::DuplicateValue) => {}
        _ => panic!("Expected DuplicateValue"),
    }
}

#[test]
fn model_missing_a_symbol_is_a_backend_inconsistency() {
    let mut session = SmtSession::new(ScriptedChannel::new(&["sat\n(\n(y #x05)\n)\n"]));
    let x = Expr::bv_symbol("x", 8);

    match session.eval(&x, 1, &[]) {
        Err(BackendError::InconsistentModel) => {}
        _ => panic!("Expected InconsistentModel"),
    }
}

#[test]
fn failed_query_does_not_poison_the_session() {
    let mut session = SmtSession::new(ScriptedChannel::new(&["unknown\n", "sat\n"]));
    let constraint = Expr::bool_symbol("p");

    assert!(session.check_satisfiable(&[constraint.clone()]).is_err());
    assert!(session.check_satisfiable(&[constraint]).unwrap());
}
