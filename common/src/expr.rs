use std::collections::{HashMap, HashSet};
use std::fmt::Write;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Widths above this are not representable by [`Value::BitVec`].
pub const MAX_BV_WIDTH: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Sort {
    Bool,
    BitVec(u32),
}

impl Sort {
    pub fn size(&self) -> u32 {
        match self {
            Self::Bool => 1,
            Self::BitVec(width) => *width,
        }
    }
}

/// A constant, either boolean or a bit vector of up to 128 bits.
/// The `bits` field is always masked down to `width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
    Bool(bool),
    BitVec { width: u32, bits: u128 },
}

/// All-ones mask for the low `width` bits.
pub fn bit_mask(width: u32) -> u128 {
    if width >= MAX_BV_WIDTH {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

impl Value {
    pub fn bv(width: u32, bits: u128) -> Self {
        debug_assert!(width > 0 && width <= MAX_BV_WIDTH);
        Self::BitVec {
            width,
            bits: bits & bit_mask(width),
        }
    }

    pub fn sort(&self) -> Sort {
        match self {
            Self::Bool(_) => Sort::Bool,
            Self::BitVec { width, .. } => Sort::BitVec(*width),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::BitVec { .. } => None,
        }
    }

    pub fn as_u128(&self) -> Option<u128> {
        match self {
            Self::BitVec { bits, .. } => Some(*bits),
            Self::Bool(_) => None,
        }
    }
}

/// An assignment of constant values to free symbols, as produced by a solver
/// model.
pub type Assignment = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UnaryOp {
    Not,
    BvNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BinaryOp {
    And,
    Or,
    Implies,
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    BvAnd,
    BvOr,
    BvXor,
    BvAdd,
    BvSub,
}

impl BinaryOp {
    fn result_sort(&self, lhs: &Expr) -> Sort {
        use BinaryOp::*;
        match self {
            And | Or | Implies | Eq | Ne | Ult | Ule | Ugt | Uge => Sort::Bool,
            BvAnd | BvOr | BvXor | BvAdd | BvSub => lhs.sort(),
        }
    }
}

/// An immutable symbolic expression over booleans and bit vectors.
///
/// Expressions self-describe their free symbols, so the protocol layer can
/// derive the declarations a script needs from the constraints alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Expr {
    Const(Value),
    Symbol { name: String, sort: Sort },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Extract { hi: u32, lo: u32, operand: Box<Expr> },
    ZeroExt { added: u32, operand: Box<Expr> },
}

impl Expr {
    pub fn bool_const(value: bool) -> Self {
        Self::Const(Value::Bool(value))
    }

    pub fn bv_const(width: u32, bits: u128) -> Self {
        Self::Const(Value::bv(width, bits))
    }

    pub fn bool_symbol(name: impl Into<String>) -> Self {
        Self::Symbol {
            name: name.into(),
            sort: Sort::Bool,
        }
    }

    pub fn bv_symbol(name: impl Into<String>, width: u32) -> Self {
        Self::Symbol {
            name: name.into(),
            sort: Sort::BitVec(width),
        }
    }

    fn unary(op: UnaryOp, operand: Expr) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn not(self) -> Self {
        Self::unary(UnaryOp::Not, self)
    }

    pub fn and(self, other: Expr) -> Self {
        Self::binary(BinaryOp::And, self, other)
    }

    pub fn or(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Or, self, other)
    }

    pub fn implies(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Implies, self, other)
    }

    pub fn _eq(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Eq, self, other)
    }

    pub fn _neq(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Ne, self, other)
    }

    pub fn bvult(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Ult, self, other)
    }

    pub fn bvule(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Ule, self, other)
    }

    pub fn bvugt(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Ugt, self, other)
    }

    pub fn bvuge(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Uge, self, other)
    }

    pub fn bvnot(self) -> Self {
        Self::unary(UnaryOp::BvNot, self)
    }

    pub fn bvand(self, other: Expr) -> Self {
        Self::binary(BinaryOp::BvAnd, self, other)
    }

    pub fn bvor(self, other: Expr) -> Self {
        Self::binary(BinaryOp::BvOr, self, other)
    }

    pub fn bvxor(self, other: Expr) -> Self {
        Self::binary(BinaryOp::BvXor, self, other)
    }

    pub fn bvadd(self, other: Expr) -> Self {
        Self::binary(BinaryOp::BvAdd, self, other)
    }

    pub fn bvsub(self, other: Expr) -> Self {
        Self::binary(BinaryOp::BvSub, self, other)
    }

    pub fn extract(self, hi: u32, lo: u32) -> Self {
        Self::Extract {
            hi,
            lo,
            operand: Box::new(self),
        }
    }

    pub fn zero_ext(self, added: u32) -> Self {
        Self::ZeroExt {
            added,
            operand: Box::new(self),
        }
    }
}

impl Expr {
    pub fn sort(&self) -> Sort {
        match self {
            Self::Const(value) => value.sort(),
            Self::Symbol { sort, .. } => *sort,
            Self::Unary { op, operand } => match op {
                UnaryOp::Not => Sort::Bool,
                UnaryOp::BvNot => operand.sort(),
            },
            Self::Binary { op, lhs, .. } => op.result_sort(lhs),
            Self::Extract { hi, lo, .. } => Sort::BitVec(hi - lo + 1),
            Self::ZeroExt { added, operand } => Sort::BitVec(operand.size() + added),
        }
    }

    /// The bit width of a bit-vector expression.
    pub fn size(&self) -> u32 {
        match self.sort() {
            Sort::BitVec(width) => width,
            Sort::Bool => panic!("Expected the expression to be a bit vector."),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Const(_))
    }

    pub fn constant_value(&self) -> Option<Value> {
        match self {
            Self::Const(value) => Some(*value),
            _ => None,
        }
    }

    /// Replaces every symbol bound in the assignment with its constant.
    pub fn substitute(&self, assignment: &Assignment) -> Expr {
        match self {
            Self::Const(_) => self.clone(),
            Self::Symbol { name, .. } => match assignment.get(name) {
                Some(value) => Self::Const(*value),
                None => self.clone(),
            },
            Self::Unary { op, operand } => Self::unary(*op, operand.substitute(assignment)),
            Self::Binary { op, lhs, rhs } => Self::binary(
                *op,
                lhs.substitute(assignment),
                rhs.substitute(assignment),
            ),
            Self::Extract { hi, lo, operand } => {
                operand.substitute(assignment).extract(*hi, *lo)
            }
            Self::ZeroExt { added, operand } => operand.substitute(assignment).zero_ext(*added),
        }
    }

    /// Recursively folds constant subterms.
    pub fn simplify(&self) -> Expr {
        match self {
            Self::Const(_) | Self::Symbol { .. } => self.clone(),
            Self::Unary { op, operand } => {
                let operand = operand.simplify();
                match (op, operand.constant_value()) {
                    (UnaryOp::Not, Some(Value::Bool(b))) => Self::bool_const(!b),
                    (UnaryOp::BvNot, Some(Value::BitVec { width, bits })) => {
                        Self::bv_const(width, !bits)
                    }
                    _ => Self::unary(*op, operand),
                }
            }
            Self::Binary { op, lhs, rhs } => {
                let lhs = lhs.simplify();
                let rhs = rhs.simplify();
                fold_binary(*op, lhs, rhs)
            }
            Self::Extract { hi, lo, operand } => {
                let operand = operand.simplify();
                match operand.constant_value() {
                    Some(Value::BitVec { bits, .. }) => {
                        Self::bv_const(hi - lo + 1, bits >> lo)
                    }
                    _ => operand.extract(*hi, *lo),
                }
            }
            Self::ZeroExt { added, operand } => {
                let operand = operand.simplify();
                match operand.constant_value() {
                    Some(Value::BitVec { width, bits }) => Self::bv_const(width + added, bits),
                    _ => operand.zero_ext(*added),
                }
            }
        }
    }

    /// Collects free symbols in first-use order, without duplicates.
    pub fn free_symbols(&self) -> Vec<(String, Sort)> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        self.collect_symbols(&mut found, &mut seen);
        found
    }

    pub(crate) fn collect_symbols(
        &self,
        found: &mut Vec<(String, Sort)>,
        seen: &mut HashSet<String>,
    ) {
        match self {
            Self::Const(_) => {}
            Self::Symbol { name, sort } => {
                if seen.insert(name.clone()) {
                    found.push((name.clone(), *sort));
                }
            }
            Self::Unary { operand, .. }
            | Self::Extract { operand, .. }
            | Self::ZeroExt { operand, .. } => operand.collect_symbols(found, seen),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_symbols(found, seen);
                rhs.collect_symbols(found, seen);
            }
        }
    }
}

/// Collects the free symbols of several expressions in first-use order,
/// without duplicates across them.
pub fn free_symbols_of<'a>(exprs: impl Iterator<Item = &'a Expr>) -> Vec<(String, Sort)> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    for expr in exprs {
        expr.collect_symbols(&mut found, &mut seen);
    }
    found
}

fn fold_binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    use BinaryOp::*;
    let (l, r) = (lhs.constant_value(), rhs.constant_value());
    match (op, l, r) {
        (And, Some(Value::Bool(a)), Some(Value::Bool(b))) => Expr::bool_const(a && b),
        (And, Some(Value::Bool(false)), _) | (And, _, Some(Value::Bool(false))) => {
            Expr::bool_const(false)
        }
        (Or, Some(Value::Bool(a)), Some(Value::Bool(b))) => Expr::bool_const(a || b),
        (Or, Some(Value::Bool(true)), _) | (Or, _, Some(Value::Bool(true))) => {
            Expr::bool_const(true)
        }
        (Implies, Some(Value::Bool(a)), Some(Value::Bool(b))) => Expr::bool_const(!a || b),
        (Eq, Some(a), Some(b)) => Expr::bool_const(a == b),
        (Ne, Some(a), Some(b)) => Expr::bool_const(a != b),
        (Ult, Some(a), Some(b)) => fold_cmp(a, b, |a, b| a < b, lhs, rhs, op),
        (Ule, Some(a), Some(b)) => fold_cmp(a, b, |a, b| a <= b, lhs, rhs, op),
        (Ugt, Some(a), Some(b)) => fold_cmp(a, b, |a, b| a > b, lhs, rhs, op),
        (Uge, Some(a), Some(b)) => fold_cmp(a, b, |a, b| a >= b, lhs, rhs, op),
        (BvAnd, Some(a), Some(b)) => fold_bits(a, b, |a, b| a & b, lhs, rhs, op),
        (BvOr, Some(a), Some(b)) => fold_bits(a, b, |a, b| a | b, lhs, rhs, op),
        (BvXor, Some(a), Some(b)) => fold_bits(a, b, |a, b| a ^ b, lhs, rhs, op),
        (BvAdd, Some(a), Some(b)) => fold_bits(a, b, u128::wrapping_add, lhs, rhs, op),
        (BvSub, Some(a), Some(b)) => fold_bits(a, b, u128::wrapping_sub, lhs, rhs, op),
        _ => Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    }
}

fn fold_cmp(
    a: Value,
    b: Value,
    f: impl FnOnce(u128, u128) -> bool,
    lhs: Expr,
    rhs: Expr,
    op: BinaryOp,
) -> Expr {
    match (a.as_u128(), b.as_u128()) {
        (Some(a), Some(b)) => Expr::bool_const(f(a, b)),
        _ => Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    }
}

fn fold_bits(
    a: Value,
    b: Value,
    f: impl FnOnce(u128, u128) -> u128,
    lhs: Expr,
    rhs: Expr,
    op: BinaryOp,
) -> Expr {
    match (a, b) {
        (Value::BitVec { width, bits: a }, Value::BitVec { bits: b, .. }) => {
            Expr::bv_const(width, f(a, b))
        }
        _ => Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    }
}

impl Expr {
    pub fn to_smtlib(&self) -> String {
        let mut out = String::new();
        self.write_smtlib(&mut out);
        out
    }

    fn write_smtlib(&self, out: &mut String) {
        match self {
            Self::Const(value) => write_value(value, out),
            Self::Symbol { name, .. } => out.push_str(name),
            Self::Unary { op, operand } => {
                let name = match op {
                    UnaryOp::Not => "not",
                    UnaryOp::BvNot => "bvnot",
                };
                write!(out, "({name} ").unwrap();
                operand.write_smtlib(out);
                out.push(')');
            }
            Self::Binary { op, lhs, rhs } => {
                use BinaryOp::*;
                let name = match op {
                    And => "and",
                    Or => "or",
                    Implies => "=>",
                    Eq => "=",
                    Ne => "distinct",
                    Ult => "bvult",
                    Ule => "bvule",
                    Ugt => "bvugt",
                    Uge => "bvuge",
                    BvAnd => "bvand",
                    BvOr => "bvor",
                    BvXor => "bvxor",
                    BvAdd => "bvadd",
                    BvSub => "bvsub",
                };
                write!(out, "({name} ").unwrap();
                lhs.write_smtlib(out);
                out.push(' ');
                rhs.write_smtlib(out);
                out.push(')');
            }
            Self::Extract { hi, lo, operand } => {
                write!(out, "((_ extract {hi} {lo}) ").unwrap();
                operand.write_smtlib(out);
                out.push(')');
            }
            Self::ZeroExt { added, operand } => {
                write!(out, "((_ zero_extend {added}) ").unwrap();
                operand.write_smtlib(out);
                out.push(')');
            }
        }
    }
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::BitVec { width, bits } => {
            if width % 4 == 0 {
                write!(out, "#x{bits:0digits$x}", digits = (*width / 4) as usize).unwrap();
            } else {
                write!(out, "#b{bits:0digits$b}", digits = *width as usize).unwrap();
            }
        }
    }
}

pub fn sort_smtlib(sort: &Sort) -> String {
    match sort {
        Sort::Bool => "Bool".to_string(),
        Sort::BitVec(width) => format!("(_ BitVec {width})"),
    }
}
