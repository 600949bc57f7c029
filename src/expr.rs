//! Scalar expressions used by filters and derived columns.
//!
//! Expressions are plain data. They are type checked against the schema of
//! the query node they are attached to, and only ever evaluated by the
//! backing engine after compilation.

use crate::column::ScalarValue;
use crate::error::{PivotError, Result};
use crate::query::SortKey;
use crate::schema::{DataType, Schema};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Op {
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IsNull,
    IsNotNull,
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    pub fn is_comparison(&self) -> bool {
        matches!(self, Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expType", rename_all = "camelCase")]
pub enum Expr {
    ColumnRef {
        column: String,
    },
    Const {
        value: ScalarValue,
        #[serde(rename = "type")]
        data_type: DataType,
    },
    Combinator {
        op: Op,
        operands: Vec<Expr>,
    },
    /// Rank of the row under `keys`, starting at 1. Only valid in derived columns.
    RowNumber {
        keys: Vec<SortKey>,
    },
}

pub fn col(column: &str) -> Expr {
    Expr::ColumnRef { column: column.to_string() }
}

/// Constant with the type of its value. A bare null is typed as text.
pub fn lit(value: impl Into<ScalarValue>) -> Expr {
    let value = value.into();
    let data_type = value.data_type().unwrap_or(DataType::Utf8);
    Expr::Const { value, data_type }
}

/// Constant with an explicit type; fails if the value does not fit it.
pub fn typed_lit(value: impl Into<ScalarValue>, data_type: DataType) -> Result<Expr> {
    let value = value.into();
    check_const(&value, &data_type)?;
    Ok(Expr::Const { value, data_type })
}

pub fn null(data_type: DataType) -> Expr {
    Expr::Const { value: ScalarValue::Null, data_type }
}

fn combinator(op: Op, operands: Vec<Expr>) -> Expr {
    Expr::Combinator { op, operands }
}

pub fn and(operands: Vec<Expr>) -> Expr { combinator(Op::And, operands) }
pub fn or(operands: Vec<Expr>) -> Expr { combinator(Op::Or, operands) }
pub fn not(operand: Expr) -> Expr { combinator(Op::Not, vec![operand]) }
pub fn eq(lhs: Expr, rhs: Expr) -> Expr { combinator(Op::Eq, vec![lhs, rhs]) }
pub fn ne(lhs: Expr, rhs: Expr) -> Expr { combinator(Op::Ne, vec![lhs, rhs]) }
pub fn lt(lhs: Expr, rhs: Expr) -> Expr { combinator(Op::Lt, vec![lhs, rhs]) }
pub fn le(lhs: Expr, rhs: Expr) -> Expr { combinator(Op::Le, vec![lhs, rhs]) }
pub fn gt(lhs: Expr, rhs: Expr) -> Expr { combinator(Op::Gt, vec![lhs, rhs]) }
pub fn ge(lhs: Expr, rhs: Expr) -> Expr { combinator(Op::Ge, vec![lhs, rhs]) }
pub fn is_null(operand: Expr) -> Expr { combinator(Op::IsNull, vec![operand]) }
pub fn is_not_null(operand: Expr) -> Expr { combinator(Op::IsNotNull, vec![operand]) }
pub fn add(lhs: Expr, rhs: Expr) -> Expr { combinator(Op::Add, vec![lhs, rhs]) }
pub fn sub(lhs: Expr, rhs: Expr) -> Expr { combinator(Op::Sub, vec![lhs, rhs]) }
pub fn mul(lhs: Expr, rhs: Expr) -> Expr { combinator(Op::Mul, vec![lhs, rhs]) }
pub fn div(lhs: Expr, rhs: Expr) -> Expr { combinator(Op::Div, vec![lhs, rhs]) }

pub fn row_number(keys: Vec<SortKey>) -> Expr {
    Expr::RowNumber { keys }
}

fn check_const(value: &ScalarValue, data_type: &DataType) -> Result<()> {
    match value.data_type() {
        None => Ok(()),
        Some(t) if t == *data_type || (t == DataType::Int64 && *data_type == DataType::Float64) => Ok(()),
        Some(t) => Err(PivotError::TypeError(format!(
            "Constant {} of type {} declared as {}", value, t, data_type
        ))),
    }
}

impl Expr {
    /// Infers the result type against `schema`, rejecting operands the
    /// combinator cannot accept.
    pub fn data_type(&self, schema: &Schema) -> Result<DataType> {
        match self {
            Expr::ColumnRef { column } => schema.column_type(column).ok_or_else(|| {
                PivotError::QueryBuildError(format!("Unknown column '{}' in expression", column))
            }),
            Expr::Const { value, data_type } => {
                check_const(value, data_type)?;
                Ok(*data_type)
            }
            Expr::Combinator { op, operands } => self.combinator_type(*op, operands, schema),
            Expr::RowNumber { keys } => {
                if keys.is_empty() {
                    return Err(PivotError::QueryBuildError("row_number requires a sort key".to_string()));
                }
                for key in keys {
                    if !schema.has_column(&key.column) {
                        return Err(PivotError::QueryBuildError(format!(
                            "Unknown sort column '{}' in row_number", key.column
                        )));
                    }
                }
                Ok(DataType::Int64)
            }
        }
    }

    fn combinator_type(&self, op: Op, operands: &[Expr], schema: &Schema) -> Result<DataType> {
        let types = operands.iter()
            .map(|e| e.data_type(schema))
            .collect::<Result<Vec<_>>>()?;
        let arity_ok = match op {
            Op::And | Op::Or => !types.is_empty(),
            Op::Not | Op::IsNull | Op::IsNotNull => types.len() == 1,
            _ => types.len() == 2,
        };
        if !arity_ok {
            return Err(PivotError::TypeError(format!(
                "{:?} does not take {} operand(s)", op, types.len()
            )));
        }
        match op {
            Op::And | Op::Or | Op::Not => {
                if let Some(t) = types.iter().find(|t| **t != DataType::Boolean) {
                    return Err(PivotError::TypeError(format!(
                        "{:?} expects boolean operands, got {}", op, t
                    )));
                }
                Ok(DataType::Boolean)
            }
            Op::IsNull | Op::IsNotNull => Ok(DataType::Boolean),
            _ if op.is_comparison() => {
                if types[0].widen(&types[1]).is_none() {
                    return Err(PivotError::TypeError(format!(
                        "Cannot compare {} with {}", types[0], types[1]
                    )));
                }
                Ok(DataType::Boolean)
            }
            _ => {
                if !types[0].is_numeric() || !types[1].is_numeric() {
                    return Err(PivotError::TypeError(format!(
                        "{:?} expects numeric operands, got {} and {}", op, types[0], types[1]
                    )));
                }
                Ok(types[0].widen(&types[1]).unwrap_or(DataType::Float64))
            }
        }
    }

    pub fn contains_row_number(&self) -> bool {
        match self {
            Expr::RowNumber { .. } => true,
            Expr::Combinator { operands, .. } => operands.iter().any(Expr::contains_row_number),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDef;

    fn emp_schema() -> Schema {
        Schema::new(vec![
            ColumnDef::new("Name", DataType::Utf8),
            ColumnDef::new("Base", DataType::Int64),
            ColumnDef::new("TCOE", DataType::Int64),
            ColumnDef::new("Ratio", DataType::Float64),
        ])
        .unwrap()
    }

    #[test]
    fn arithmetic_widens() {
        let schema = emp_schema();
        assert_eq!(sub(col("TCOE"), col("Base")).data_type(&schema).unwrap(), DataType::Int64);
        assert_eq!(mul(col("Base"), col("Ratio")).data_type(&schema).unwrap(), DataType::Float64);
    }

    #[test]
    fn boolean_operand_to_arithmetic() {
        let schema = emp_schema();
        let err = add(lit(true), col("Base")).data_type(&schema).unwrap_err();
        assert!(matches!(err, PivotError::TypeError(_)));
    }

    #[test]
    fn text_compared_with_number() {
        let schema = emp_schema();
        let err = eq(col("Name"), lit(3i64)).data_type(&schema).unwrap_err();
        assert!(matches!(err, PivotError::TypeError(_)));
    }

    #[test]
    fn and_requires_booleans() {
        let schema = emp_schema();
        let ok = and(vec![gt(col("Base"), lit(100i64)), is_not_null(col("Name"))]);
        assert_eq!(ok.data_type(&schema).unwrap(), DataType::Boolean);
        assert!(and(vec![col("Base")]).data_type(&schema).is_err());
        assert!(and(vec![]).data_type(&schema).is_err());
    }

    #[test]
    fn unknown_column() {
        let err = col("Salary").data_type(&emp_schema()).unwrap_err();
        assert!(matches!(err, PivotError::QueryBuildError(_)));
    }

    #[test]
    fn typed_constant_mismatch() {
        assert!(typed_lit("x", DataType::Int64).is_err());
        assert!(typed_lit(1i64, DataType::Float64).is_ok());
    }

    #[test]
    fn tagged_form() {
        let e = eq(col("JobFamily"), lit("Safety"));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["expType"], "combinator");
        assert_eq!(json["op"], "eq");
        assert_eq!(json["operands"][1], serde_json::json!({"expType": "const", "value": "Safety", "type": "text"}));
        let back: Expr = serde_json::from_value(json).unwrap();
        assert_eq!(back, e);
    }
}
