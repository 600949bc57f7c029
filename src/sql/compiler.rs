//! Lowers a `QueryExp` tree to a single SQLite SELECT statement.
//!
//! Each non-leaf child becomes a parenthesized subquery under a fresh alias
//! and every output column is listed explicitly, so the positional layout of
//! the result always matches the query's schema.

use crate::column::ScalarValue;
use crate::error::{PivotError, Result};
use crate::expr::{self, Op};
use crate::query::{AggColumn, AggFn, JoinType, QueryExp, QueryOp, SortKey};
use crate::schema::{DataType, Schema};
use crate::sql::ast::*;

#[derive(Debug, Default)]
pub struct QueryCompiler {
    next_alias: usize,
}

impl QueryCompiler {
    pub fn new() -> Self {
        Self { next_alias: 0 }
    }

    /// Compiles `query` to SQL text.
    pub fn compile(query: &QueryExp) -> Result<String> {
        Ok(Self::new().compile_statement(query)?.to_string())
    }

    /// `SELECT count(*)` over the compiled `query`.
    pub fn compile_row_count(query: &QueryExp) -> Result<String> {
        let mut compiler = Self::new();
        let inner = compiler.compile_statement(query)?;
        let count = SelectItem::Expr {
            expr: Expr::function("count", vec![Expr::Wildcard]),
            alias: Some("rowCount".to_string()),
        };
        let from = TableRef::Subquery { query: Box::new(inner), alias: compiler.fresh_alias() };
        Ok(Statement::Select(SelectStatement::new(vec![count], from)).to_string())
    }

    pub fn compile_statement(&mut self, query: &QueryExp) -> Result<Statement> {
        let schema = query.schema();
        let stmt = match query.op() {
            QueryOp::Table { table_name, .. } => {
                SelectStatement::new(passthrough(schema)?, TableRef::Table {
                    name: ident(table_name)?,
                    alias: None,
                })
            }
            QueryOp::Project { from, .. } => {
                SelectStatement::new(passthrough(schema)?, self.source(from)?)
            }
            QueryOp::Filter { from, predicate } => {
                let mut select = SelectStatement::new(passthrough(schema)?, self.source(from)?);
                select.where_clause = Some(compile_expr(predicate, from.schema())?);
                select
            }
            QueryOp::GroupBy { from, columns, aggs } => {
                let mut items = Vec::with_capacity(columns.len() + aggs.len());
                let mut group_by = Vec::with_capacity(columns.len());
                for c in columns {
                    let id = canonical(from.schema(), c)?;
                    items.push(SelectItem::Expr { expr: Expr::column(&id), alias: None });
                    group_by.push(Expr::column(&id));
                }
                for agg in aggs {
                    let input = from.schema().find_column(&agg.column)
                        .ok_or_else(|| PivotError::CompileError(format!("Unknown column '{}'", agg.column)))?;
                    items.push(SelectItem::Expr {
                        expr: agg_expr(agg, &ident(&input.id)?, input.data_type),
                        alias: Some(input.id.clone()),
                    });
                }
                let mut select = SelectStatement::new(items, self.source(from)?);
                select.group_by = group_by;
                select
            }
            QueryOp::Sort { from, keys } => {
                let mut select = SelectStatement::new(passthrough(schema)?, self.source(from)?);
                select.order_by = order_by(keys, from.schema())?;
                select
            }
            QueryOp::Extend { from, column, data_type, value } => {
                let mut items = passthrough(from.schema())?;
                let mut compiled = compile_expr(value, from.schema())?;
                if value.data_type(from.schema())? != *data_type {
                    compiled = Expr::Cast { expr: Box::new(compiled), data_type: *data_type };
                }
                items.push(SelectItem::Expr { expr: compiled, alias: Some(ident(column)?) });
                SelectStatement::new(items, self.source(from)?)
            }
            QueryOp::MapColumns { from, .. } | QueryOp::MapColumnsByIndex { from, .. } => {
                let items = from.schema().columns().iter()
                    .zip(schema.columns())
                    .map(|(src, dst)| {
                        let alias = if src.id == dst.id { None } else { Some(ident(&dst.id)?) };
                        Ok(SelectItem::Expr { expr: Expr::column(&ident(&src.id)?), alias })
                    })
                    .collect::<Result<Vec<_>>>()?;
                SelectStatement::new(items, self.source(from)?)
            }
            QueryOp::Concat { from, target } => {
                let left = SelectStatement::new(passthrough(from.schema())?, self.source(from)?);
                let right = SelectStatement::new(passthrough(target.schema())?, self.source(target)?);
                return Ok(Statement::SetOp(SetOpStatement {
                    op: SetOp::Union,
                    all: true,
                    left: Box::new(Statement::Select(left)),
                    right: Box::new(Statement::Select(right)),
                }));
            }
            QueryOp::Join { from, target, on, join_type, null_safe } => {
                self.compile_join(schema, from, target, on, *join_type, *null_safe)?
            }
        };
        Ok(Statement::Select(stmt))
    }

    fn compile_join(
        &mut self,
        schema: &Schema,
        from: &QueryExp,
        target: &QueryExp,
        on: &[String],
        join_type: JoinType,
        null_safe: bool,
    ) -> Result<SelectStatement> {
        let lhs = self.source(from)?;
        let rhs = self.source(target)?;
        let (la, ra) = (alias_of(&lhs), alias_of(&rhs));
        let items = schema.columns().iter()
            .map(|c| {
                let owner = if from.schema().has_column(&c.id) { &la } else { &ra };
                Ok(SelectItem::Expr { expr: Expr::qualified(owner, &ident(&c.id)?), alias: None })
            })
            .collect::<Result<Vec<_>>>()?;
        let cmp = if null_safe { BinOp::Is } else { BinOp::Eq };
        let condition = on.iter()
            .map(|k| {
                let l = canonical(from.schema(), k)?;
                let r = canonical(target.schema(), k)?;
                Ok(Expr::binary(Expr::qualified(&la, &l), cmp, Expr::qualified(&ra, &r)))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .reduce(|acc, e| Expr::binary(acc, BinOp::And, e))
            .ok_or_else(|| PivotError::CompileError("Join without key columns".to_string()))?;
        let mut select = SelectStatement::new(items, lhs);
        select.joins.push(Join {
            join_type: match join_type {
                JoinType::Inner => crate::sql::ast::JoinType::Inner,
                JoinType::LeftOuter => crate::sql::ast::JoinType::Left,
            },
            table: rhs,
            condition: JoinCondition::On(condition),
        });
        Ok(select)
    }

    fn fresh_alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    /// FROM item for a child: tables are referenced directly, anything else
    /// is inlined as a subquery.
    fn source(&mut self, query: &QueryExp) -> Result<TableRef> {
        let alias = self.fresh_alias();
        match query.op() {
            QueryOp::Table { table_name, .. } => Ok(TableRef::Table {
                name: ident(table_name)?,
                alias: Some(alias),
            }),
            _ => Ok(TableRef::Subquery { query: Box::new(self.compile_statement(query)?), alias }),
        }
    }
}

fn alias_of(table: &TableRef) -> String {
    match table {
        TableRef::Table { name, alias } => alias.clone().unwrap_or_else(|| name.clone()),
        TableRef::Subquery { alias, .. } => alias.clone(),
    }
}

fn ident(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(PivotError::CompileError("Empty identifier".to_string()));
    }
    if name.contains('\0') {
        return Err(PivotError::CompileError(format!("Identifier contains NUL: {:?}", name)));
    }
    Ok(name.to_string())
}

fn canonical(schema: &Schema, column: &str) -> Result<String> {
    let def = schema.find_column(column)
        .ok_or_else(|| PivotError::CompileError(format!("Unknown column '{}'", column)))?;
    ident(&def.id)
}

fn passthrough(schema: &Schema) -> Result<Vec<SelectItem>> {
    schema.columns().iter()
        .map(|c| Ok(SelectItem::Expr { expr: Expr::column(&ident(&c.id)?), alias: None }))
        .collect()
}

fn order_by(keys: &[SortKey], schema: &Schema) -> Result<Vec<OrderByItem>> {
    keys.iter()
        .map(|k| Ok(OrderByItem { expr: Expr::column(&canonical(schema, &k.column)?), ascending: k.ascending }))
        .collect()
}

fn agg_expr(agg: &AggColumn, column: &str, input: DataType) -> Expr {
    let arg = || Expr::column(column);
    match agg.func {
        AggFn::Sum => Expr::function("sum", vec![arg()]),
        AggFn::Avg => Expr::function("avg", vec![arg()]),
        AggFn::Count => Expr::function("count", vec![arg()]),
        AggFn::Min => Expr::function("min", vec![arg()]),
        AggFn::Max => Expr::function("max", vec![arg()]),
        AggFn::Uniq => Expr::Case {
            when_clauses: vec![(
                Expr::binary(
                    Expr::function("min", vec![arg()]),
                    BinOp::Eq,
                    Expr::function("max", vec![arg()]),
                ),
                Expr::function("min", vec![arg()]),
            )],
            else_clause: Some(Box::new(Expr::Literal(LiteralValue::Null))),
        },
        AggFn::Null => Expr::Cast {
            expr: Box::new(Expr::Literal(LiteralValue::Null)),
            data_type: input,
        },
    }
}

fn literal(value: &ScalarValue, data_type: DataType) -> Result<Expr> {
    let lit = match value {
        ScalarValue::Null => LiteralValue::Null,
        ScalarValue::Boolean(b) => LiteralValue::Boolean(*b),
        ScalarValue::Int64(i) if data_type == DataType::Float64 => LiteralValue::Float(*i as f64),
        ScalarValue::Int64(i) => LiteralValue::Integer(*i),
        ScalarValue::Float64(v) if !v.is_finite() => {
            return Err(PivotError::CompileError(format!("Non-finite constant {}", v)));
        }
        ScalarValue::Float64(v) => LiteralValue::Float(*v),
        ScalarValue::Utf8(s) => {
            if s.contains('\0') {
                return Err(PivotError::CompileError("String constant contains NUL".to_string()));
            }
            LiteralValue::String(s.clone())
        }
    };
    Ok(Expr::Literal(lit))
}

/// Lowers a scalar expression evaluated over rows of `schema`.
pub fn compile_expr(e: &expr::Expr, schema: &Schema) -> Result<Expr> {
    match e {
        expr::Expr::ColumnRef { column } => Ok(Expr::column(&canonical(schema, column)?)),
        expr::Expr::Const { value, data_type } => literal(value, *data_type),
        expr::Expr::RowNumber { keys } => Ok(Expr::Function {
            name: "row_number".to_string(),
            args: vec![],
            over: Some(WindowSpec { order_by: order_by(keys, schema)? }),
        }),
        expr::Expr::Combinator { op, operands } => {
            let mut args = operands.iter()
                .map(|o| compile_expr(o, schema))
                .collect::<Result<Vec<_>>>()?;
            let bin = match op {
                Op::And | Op::Or => {
                    let joiner = if *op == Op::And { BinOp::And } else { BinOp::Or };
                    return args.into_iter()
                        .reduce(|acc, e| Expr::binary(acc, joiner, e))
                        .ok_or_else(|| PivotError::CompileError(format!("{:?} without operands", op)));
                }
                Op::Not | Op::IsNull | Op::IsNotNull => {
                    let operand = args.pop()
                        .ok_or_else(|| PivotError::CompileError(format!("{:?} without operand", op)))?;
                    return Ok(match op {
                        Op::Not => Expr::UnaryOp { op: UnaryOp::Not, expr: Box::new(operand) },
                        _ => Expr::IsNull { expr: Box::new(operand), negated: *op == Op::IsNotNull },
                    });
                }
                Op::Eq => BinOp::Eq,
                Op::Ne => BinOp::NotEq,
                Op::Lt => BinOp::Lt,
                Op::Le => BinOp::LtEq,
                Op::Gt => BinOp::Gt,
                Op::Ge => BinOp::GtEq,
                Op::Add => BinOp::Add,
                Op::Sub => BinOp::Sub,
                Op::Mul => BinOp::Mul,
                Op::Div => BinOp::Div,
            };
            match <[Expr; 2]>::try_from(args) {
                Ok([lhs, rhs]) => Ok(Expr::binary(lhs, bin, rhs)),
                Err(args) => Err(PivotError::CompileError(format!(
                    "{:?} takes 2 operands, got {}", op, args.len()
                ))),
            }
        }
    }
}
