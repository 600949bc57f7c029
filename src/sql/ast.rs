//! SELECT-statement AST for the SQLite dialect. Built by the compiler and
//! rendered through `Display`.

use crate::schema::DataType;
use std::fmt;

#[derive(Debug, Clone)]
pub enum Statement {
    Select(SelectStatement),
    SetOp(SetOpStatement),
}

#[derive(Debug, Clone)]
pub struct SelectStatement {
    pub columns: Vec<SelectItem>,
    pub from: Option<TableRef>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderByItem>,
}

impl SelectStatement {
    pub fn new(columns: Vec<SelectItem>, from: TableRef) -> Self {
        Self {
            columns,
            from: Some(from),
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SelectItem {
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone)]
pub enum TableRef {
    Table { name: String, alias: Option<String> },
    Subquery { query: Box<Statement>, alias: String },
}

#[derive(Debug, Clone)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    pub condition: JoinCondition,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JoinType {
    Inner,
    Left,
}

#[derive(Debug, Clone)]
pub enum JoinCondition {
    On(Expr),
}

#[derive(Debug, Clone)]
pub struct OrderByItem {
    pub expr: Expr,
    pub ascending: bool,
}

#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub order_by: Vec<OrderByItem>,
}

#[derive(Debug, Clone)]
pub struct SetOpStatement {
    pub op: SetOp,
    pub all: bool,
    pub left: Box<Statement>,
    pub right: Box<Statement>,
}

#[derive(Debug, Clone, Copy)]
pub enum SetOp { Union }

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(LiteralValue),
    Column(ColumnRef),
    BinaryOp { left: Box<Expr>, op: BinOp, right: Box<Expr> },
    UnaryOp { op: UnaryOp, expr: Box<Expr> },
    Function { name: String, args: Vec<Expr>, over: Option<WindowSpec> },
    Cast { expr: Box<Expr>, data_type: DataType },
    Case {
        when_clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
    },
    IsNull { expr: Box<Expr>, negated: bool },
    Wildcard,
}

#[derive(Debug, Clone)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone)]
pub enum LiteralValue {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add, Sub, Mul, Div,
    Eq, NotEq, Lt, LtEq, Gt, GtEq,
    Is,
    And, Or,
}

#[derive(Debug, Clone, Copy)]
pub enum UnaryOp { Not }

impl Expr {
    pub fn column(name: &str) -> Expr {
        Expr::Column(ColumnRef { table: None, name: name.to_string() })
    }

    pub fn qualified(table: &str, name: &str) -> Expr {
        Expr::Column(ColumnRef { table: Some(table.to_string()), name: name.to_string() })
    }

    pub fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
        Expr::BinaryOp { left: Box::new(left), op, right: Box::new(right) }
    }

    pub fn function(name: &str, args: Vec<Expr>) -> Expr {
        Expr::Function { name: name.to_string(), args, over: None }
    }
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Select(s) => write!(f, "{}", s),
            Statement::SetOp(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        write_list(f, &self.columns)?;
        if let Some(from) = &self.from {
            write!(f, " FROM {}", from)?;
        }
        for join in &self.joins {
            write!(f, " {}", join)?;
        }
        if let Some(pred) = &self.where_clause {
            write!(f, " WHERE {}", pred)?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            write_list(f, &self.group_by)?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            write_list(f, &self.order_by)?;
        }
        Ok(())
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectItem::Expr { expr, alias: None } => write!(f, "{}", expr),
            SelectItem::Expr { expr, alias: Some(alias) } => write!(f, "{} AS {}", expr, quote_ident(alias)),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableRef::Table { name, alias: None } => write!(f, "{}", quote_ident(name)),
            TableRef::Table { name, alias: Some(alias) } => {
                write!(f, "{} AS {}", quote_ident(name), quote_ident(alias))
            }
            TableRef::Subquery { query, alias } => write!(f, "({}) AS {}", query, quote_ident(alias)),
        }
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kw = match self.join_type {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT OUTER JOIN",
        };
        match &self.condition {
            JoinCondition::On(cond) => write!(f, "{} {} ON {}", kw, self.table, cond),
        }
    }
}

impl fmt::Display for OrderByItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expr, if self.ascending { "ASC" } else { "DESC" })
    }
}

impl fmt::Display for SetOpStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            SetOp::Union => "UNION",
        };
        write!(f, "{} {}{} {}", self.left, op, if self.all { " ALL" } else { "" }, self.right)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "=",
            BinOp::NotEq => "<>",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::Is => "IS",
            BinOp::And => "AND",
            BinOp::Or => "OR",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Integer(i) => write!(f, "{}", i),
            // Debug keeps the decimal point, so SQLite reads it back as REAL.
            LiteralValue::Float(v) => write!(f, "{:?}", v),
            LiteralValue::String(s) => write!(f, "{}", quote_string(s)),
            LiteralValue::Boolean(b) => write!(f, "{}", if *b { 1 } else { 0 }),
            LiteralValue::Null => write!(f, "NULL"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Column(ColumnRef { table: None, name }) => write!(f, "{}", quote_ident(name)),
            Expr::Column(ColumnRef { table: Some(t), name }) => {
                write!(f, "{}.{}", quote_ident(t), quote_ident(name))
            }
            Expr::BinaryOp { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::UnaryOp { op: UnaryOp::Not, expr } => write!(f, "(NOT {})", expr),
            Expr::Function { name, args, over } => {
                write!(f, "{}(", name)?;
                write_list(f, args)?;
                write!(f, ")")?;
                if let Some(window) = over {
                    write!(f, " OVER (ORDER BY ")?;
                    write_list(f, &window.order_by)?;
                    write!(f, ")")?;
                }
                Ok(())
            }
            Expr::Cast { expr, data_type } => write!(f, "CAST({} AS {})", expr, data_type.sql_name()),
            Expr::Case { when_clauses, else_clause } => {
                write!(f, "CASE")?;
                for (cond, value) in when_clauses {
                    write!(f, " WHEN {} THEN {}", cond, value)?;
                }
                if let Some(e) = else_clause {
                    write!(f, " ELSE {}", e)?;
                }
                write!(f, " END")
            }
            Expr::IsNull { expr, negated } => {
                write!(f, "({} IS {}NULL)", expr, if *negated { "NOT " } else { "" })
            }
            Expr::Wildcard => write!(f, "*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_and_strings_escape() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_string("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn float_literal_keeps_point() {
        assert_eq!(LiteralValue::Float(2.0).to_string(), "2.0");
        assert_eq!(LiteralValue::Boolean(true).to_string(), "1");
    }

    #[test]
    fn window_function() {
        let e = Expr::Function {
            name: "row_number".to_string(),
            args: vec![],
            over: Some(WindowSpec {
                order_by: vec![OrderByItem { expr: Expr::column("TCOE"), ascending: false }],
            }),
        };
        assert_eq!(e.to_string(), "row_number() OVER (ORDER BY \"TCOE\" DESC)");
    }
}
