//! Operators for Jac expressions.
//!
//! These operator enums are shared by the IR, the bytecode VM and the tree
//! walking interpreter so both execution paths evaluate with identical rules.

use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueError};

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `a + b`, also string and list concatenation.
    Add,
    /// `a - b`.
    Sub,
    /// `a * b`, also string and list repetition.
    Mul,
    /// `a / b`, always yields a float.
    Div,
    /// `a % b`, result takes the sign of the divisor.
    Mod,
    /// `a ^ b`.
    Pow,
}

/// Comparison operators (`cmp_op`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    /// Membership: `a in b`.
    In,
    /// Negated membership: `a not in b`.
    NotIn,
}

/// Short-circuit logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Numeric negation: `-x`.
    Neg,
    /// Logical not: `not x`.
    Not,
}

/// In-place update operators (`+=`, `-=`, `*=`, `/=`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
        }
    }

    /// Evaluate `lhs <op> rhs`.
    pub fn apply(self, lhs: &Value, rhs: &Value) -> Result<Value, ValueError> {
        let mismatch = || ValueError::TypeMismatch {
            op: self.symbol(),
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        };
        let overflow = || ValueError::Overflow { op: self.symbol() };

        match (self, lhs, rhs) {
            (BinaryOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            (BinaryOp::Add, Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.iter().chain(b).cloned().collect()))
            }
            (BinaryOp::Mul, Value::Str(s), Value::Int(n)) | (BinaryOp::Mul, Value::Int(n), Value::Str(s)) => {
                Ok(Value::Str(s.repeat((*n).max(0) as usize)))
            }
            (BinaryOp::Mul, Value::List(l), Value::Int(n)) | (BinaryOp::Mul, Value::Int(n), Value::List(l)) => {
                let times = (*n).max(0) as usize;
                Ok(Value::List(
                    l.iter().cycle().take(l.len() * times).cloned().collect(),
                ))
            }
            (op, Value::Int(a), Value::Int(b)) => match op {
                BinaryOp::Add => a.checked_add(*b).map(Value::Int).ok_or_else(overflow),
                BinaryOp::Sub => a.checked_sub(*b).map(Value::Int).ok_or_else(overflow),
                BinaryOp::Mul => a.checked_mul(*b).map(Value::Int).ok_or_else(overflow),
                BinaryOp::Div => {
                    if *b == 0 {
                        Err(ValueError::DivisionByZero)
                    } else {
                        Ok(Value::Float(*a as f64 / *b as f64))
                    }
                }
                BinaryOp::Mod => {
                    if *b == 0 {
                        Err(ValueError::DivisionByZero)
                    } else {
                        let r = a.checked_rem(*b).ok_or_else(overflow)?;
                        Ok(Value::Int(if r != 0 && (r < 0) != (*b < 0) { r + b } else { r }))
                    }
                }
                BinaryOp::Pow => {
                    if *b < 0 {
                        Ok(Value::Float((*a as f64).powf(*b as f64)))
                    } else {
                        let exp = u32::try_from(*b).map_err(|_| overflow())?;
                        a.checked_pow(exp).map(Value::Int).ok_or_else(overflow)
                    }
                }
            },
            (op, l, r) => {
                let (a, b) = match (l, r) {
                    (Value::Int(_) | Value::Float(_) | Value::Bool(_), Value::Int(_) | Value::Float(_) | Value::Bool(_)) => {
                        (l.as_f64().ok_or_else(mismatch)?, r.as_f64().ok_or_else(mismatch)?)
                    }
                    _ => return Err(mismatch()),
                };
                match op {
                    BinaryOp::Add => Ok(Value::Float(a + b)),
                    BinaryOp::Sub => Ok(Value::Float(a - b)),
                    BinaryOp::Mul => Ok(Value::Float(a * b)),
                    BinaryOp::Div if b == 0.0 => Err(ValueError::DivisionByZero),
                    BinaryOp::Div => Ok(Value::Float(a / b)),
                    BinaryOp::Mod if b == 0.0 => Err(ValueError::DivisionByZero),
                    BinaryOp::Mod => {
                        let r = a % b;
                        Ok(Value::Float(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }))
                    }
                    BinaryOp::Pow => Ok(Value::Float(a.powf(b))),
                }
            }
        }
    }
}

impl UnaryOp {
    pub fn apply(self, operand: &Value) -> Result<Value, ValueError> {
        match (self, operand) {
            (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
            (UnaryOp::Neg, Value::Int(i)) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or(ValueError::Overflow { op: "-" }),
            (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::Neg, other) => Err(ValueError::UnaryMismatch {
                op: "-",
                operand: other.type_name(),
            }),
        }
    }
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::Le => "<=",
            CmpOp::Ge => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        }
    }

    /// Evaluate `lhs <op> rhs`.
    pub fn apply(self, lhs: &Value, rhs: &Value) -> Result<bool, ValueError> {
        match self {
            CmpOp::Eq => Ok(values_equal(lhs, rhs)),
            CmpOp::Ne => Ok(!values_equal(lhs, rhs)),
            CmpOp::In => contains(rhs, lhs),
            CmpOp::NotIn => contains(rhs, lhs).map(|found| !found),
            CmpOp::Lt | CmpOp::Gt | CmpOp::Le | CmpOp::Ge => {
                let ordering = order(lhs, rhs).ok_or(ValueError::TypeMismatch {
                    op: self.symbol(),
                    lhs: lhs.type_name(),
                    rhs: rhs.type_name(),
                })?;
                Ok(match self {
                    CmpOp::Lt => ordering.is_lt(),
                    CmpOp::Gt => ordering.is_gt(),
                    CmpOp::Le => ordering.is_le(),
                    _ => ordering.is_ge(),
                })
            }
        }
    }
}

impl IncOp {
    pub fn binary(self) -> BinaryOp {
        match self {
            IncOp::Add => BinaryOp::Add,
            IncOp::Sub => BinaryOp::Sub,
            IncOp::Mul => BinaryOp::Mul,
            IncOp::Div => BinaryOp::Div,
        }
    }

    pub fn apply(self, current: &Value, by: &Value) -> Result<Value, ValueError> {
        self.binary().apply(current, by)
    }
}

/// Equality with numeric promotion (`1 == 1.0`).
pub fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            lhs.as_f64() == rhs.as_f64()
        }
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => lhs == rhs,
    }
}

/// Total order used by comparisons and sorting, where one exists.
pub fn order(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                match order(x, y)? {
                    std::cmp::Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => lhs.as_f64()?.partial_cmp(&rhs.as_f64()?),
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool, ValueError> {
    match haystack {
        Value::List(items) => Ok(items.iter().any(|item| values_equal(item, needle))),
        Value::Dict(map) => Ok(needle.as_str().is_some_and(|key| map.contains_key(key))),
        Value::Str(s) => match needle {
            Value::Str(sub) => Ok(s.contains(sub.as_str())),
            other => Err(ValueError::TypeMismatch {
                op: "in",
                lhs: other.type_name(),
                rhs: "str",
            }),
        },
        other => Err(ValueError::TypeMismatch {
            op: "in",
            lhs: needle.type_name(),
            rhs: other.type_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(BinaryOp::Add.apply(&Value::Int(2), &Value::Int(3)), Ok(Value::Int(5)));
        assert_eq!(BinaryOp::Div.apply(&Value::Int(7), &Value::Int(2)), Ok(Value::Float(3.5)));
        assert_eq!(BinaryOp::Pow.apply(&Value::Int(2), &Value::Int(10)), Ok(Value::Int(1024)));
        assert_eq!(
            BinaryOp::Add.apply(&Value::Int(i64::MAX), &Value::Int(1)),
            Err(ValueError::Overflow { op: "+" })
        );
    }

    #[test]
    fn test_modulo_follows_divisor_sign() {
        assert_eq!(BinaryOp::Mod.apply(&Value::Int(-7), &Value::Int(3)), Ok(Value::Int(2)));
        assert_eq!(BinaryOp::Mod.apply(&Value::Int(7), &Value::Int(-3)), Ok(Value::Int(-2)));
        assert_eq!(
            BinaryOp::Mod.apply(&Value::Int(1), &Value::Int(0)),
            Err(ValueError::DivisionByZero)
        );
    }

    #[test]
    fn test_mixed_and_sequence_arithmetic() {
        assert_eq!(BinaryOp::Mul.apply(&Value::Int(2), &Value::Float(1.5)), Ok(Value::Float(3.0)));
        assert_eq!(BinaryOp::Add.apply(&Value::str("a"), &Value::str("b")), Ok(Value::str("ab")));
        assert_eq!(BinaryOp::Mul.apply(&Value::str("ab"), &Value::Int(2)), Ok(Value::str("abab")));
        assert!(BinaryOp::Sub.apply(&Value::str("a"), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(CmpOp::Eq.apply(&Value::Int(1), &Value::Float(1.0)), Ok(true));
        assert_eq!(CmpOp::Lt.apply(&Value::str("a"), &Value::str("b")), Ok(true));
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(CmpOp::In.apply(&Value::Int(2), &list), Ok(true));
        assert_eq!(CmpOp::NotIn.apply(&Value::Int(3), &list), Ok(true));
        assert!(CmpOp::Gt.apply(&Value::str("a"), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_unary() {
        assert_eq!(UnaryOp::Neg.apply(&Value::Int(4)), Ok(Value::Int(-4)));
        assert_eq!(UnaryOp::Not.apply(&Value::Null), Ok(Value::Bool(true)));
    }
}
