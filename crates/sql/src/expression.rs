use std::fmt;
use std::sync::Arc;

use arrow_schema::DataType;

use riffle_common::{Result, RiffleError};

use crate::schema::{Column, Schema};
use crate::value::Value;

/// Comparison operator kinds. `IS NULL` is the unary [`Expression::IsNull`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl ArithmeticOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Plus => "+",
            ArithmeticOp::Minus => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
        }
    }
}

/// A resolved positional column reference. `index` points into the schema
/// of the owning plan node's direct child; `table` is the origin tag when
/// the reference survives qualification (alias-introduced columns have
/// none).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    pub index: usize,
    pub data_type: DataType,
    pub table: Option<String>,
    pub name: String,
    pub nullable: bool,
}

/// Signature of a registered scalar function.
pub type ScalarFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A named scalar function bound from the catalog. Equality compares the
/// registration identity (name + callable), so re-resolving against the
/// same catalog is a fixed point.
#[derive(Clone)]
pub struct FunctionRef {
    name: String,
    return_type: DataType,
    func: Arc<ScalarFn>,
}

impl FunctionRef {
    pub fn new(
        name: impl Into<String>,
        return_type: DataType,
        func: Arc<ScalarFn>,
    ) -> Self {
        Self {
            name: name.into(),
            return_type,
            func,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> &DataType {
        &self.return_type
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.func)(args)
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRef")
            .field("name", &self.name)
            .field("return_type", &self.return_type)
            .finish()
    }
}

impl PartialEq for FunctionRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.func, &other.func)
    }
}

/// The scalar expression algebra used inside plan nodes.
///
/// `Column` and `Star` are the unresolved forms the analyzer rewrites
/// away; a plan is resolved only once every expression is a literal, a
/// [`FieldRef`], or a combinator over those.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal {
        value: Value,
        data_type: DataType,
    },
    /// Unresolved column reference, optionally table-qualified.
    Column {
        table: Option<String>,
        name: String,
    },
    /// Resolved positional reference.
    Field(FieldRef),
    /// `*` or `table.*`, expanded by the analyzer.
    Star {
        table: Option<String>,
    },
    Alias {
        expr: Box<Expression>,
        name: String,
    },
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    IsNull(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    /// Membership test; the right-hand side is a [`Expression::Tuple`]
    /// when built from a literal list.
    In {
        expr: Box<Expression>,
        tuple: Box<Expression>,
    },
    Tuple(Vec<Expression>),
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Unresolved function call.
    Call {
        name: String,
        args: Vec<Expression>,
    },
    /// Function call bound to a catalog function.
    ScalarFunction {
        function: FunctionRef,
        args: Vec<Expression>,
    },
}

// -----------------------------
// Constructors
// -----------------------------

impl Expression {
    pub fn literal(value: Value) -> Self {
        let data_type = value.data_type();
        Expression::Literal { value, data_type }
    }

    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column {
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified_column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expression::Column {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn field(index: usize, data_type: DataType, name: impl Into<String>, nullable: bool) -> Self {
        Expression::Field(FieldRef {
            index,
            data_type,
            table: None,
            name: name.into(),
            nullable,
        })
    }

    pub fn field_with_table(
        index: usize,
        data_type: DataType,
        table: impl Into<String>,
        name: impl Into<String>,
        nullable: bool,
    ) -> Self {
        Expression::Field(FieldRef {
            index,
            data_type,
            table: Some(table.into()),
            name: name.into(),
            nullable,
        })
    }

    pub fn alias(expr: Expression, name: impl Into<String>) -> Self {
        Expression::Alias {
            expr: Box::new(expr),
            name: name.into(),
        }
    }

    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Expression::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn equals(left: Expression, right: Expression) -> Self {
        Expression::compare(CompareOp::Eq, left, right)
    }

    pub fn is_null(expr: Expression) -> Self {
        Expression::IsNull(Box::new(expr))
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Expression::Or(Box::new(left), Box::new(right))
    }

    pub fn in_list(expr: Expression, list: Vec<Expression>) -> Self {
        Expression::In {
            expr: Box::new(expr),
            tuple: Box::new(Expression::Tuple(list)),
        }
    }

    pub fn tuple(exprs: Vec<Expression>) -> Self {
        Expression::Tuple(exprs)
    }

    pub fn star() -> Self {
        Expression::Star { table: None }
    }

    pub fn qualified_star(table: impl Into<String>) -> Self {
        Expression::Star {
            table: Some(table.into()),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Call {
            name: name.into(),
            args,
        }
    }

    /// Left fold of a conjunction; `None` on an empty input.
    pub fn and_all(exprs: Vec<Expression>) -> Option<Expression> {
        let mut iter = exprs.into_iter();
        let first = iter.next()?;
        Some(iter.fold(first, Expression::and))
    }
}

// -----------------------------
// Introspection
// -----------------------------

impl Expression {
    /// Whether the expression contains no unresolved column, star, or
    /// unbound function call.
    pub fn resolved(&self) -> bool {
        match self {
            Expression::Column { .. } | Expression::Star { .. } | Expression::Call { .. } => false,
            Expression::Literal { .. } | Expression::Field(_) => true,
            Expression::Alias { expr, .. }
            | Expression::IsNull(expr)
            | Expression::Not(expr) => expr.resolved(),
            Expression::Compare { left, right, .. }
            | Expression::Arithmetic { left, right, .. } => left.resolved() && right.resolved(),
            Expression::And(l, r) | Expression::Or(l, r) => l.resolved() && r.resolved(),
            Expression::In { expr, tuple } => expr.resolved() && tuple.resolved(),
            Expression::Tuple(list) => list.iter().all(|e| e.resolved()),
            Expression::ScalarFunction { args, .. } => args.iter().all(|e| e.resolved()),
        }
    }

    /// Result type. Unresolved expressions report [`DataType::Null`] until
    /// the analyzer rewrites them.
    pub fn data_type(&self) -> DataType {
        match self {
            Expression::Literal { data_type, .. } => data_type.clone(),
            Expression::Field(f) => f.data_type.clone(),
            Expression::Alias { expr, .. } => expr.data_type(),
            Expression::Compare { .. }
            | Expression::IsNull(_)
            | Expression::And(..)
            | Expression::Or(..)
            | Expression::Not(_)
            | Expression::In { .. } => DataType::Boolean,
            Expression::Arithmetic { left, .. } => left.data_type(),
            Expression::ScalarFunction { function, .. } => function.return_type().clone(),
            Expression::Column { .. }
            | Expression::Star { .. }
            | Expression::Tuple(_)
            | Expression::Call { .. } => DataType::Null,
        }
    }

    pub fn nullable(&self) -> bool {
        match self {
            Expression::Literal { value, .. } => value.is_null(),
            Expression::Field(f) => f.nullable,
            Expression::Alias { expr, .. } => expr.nullable(),
            Expression::IsNull(_) => false,
            Expression::Compare { left, right, .. }
            | Expression::Arithmetic { left, right, .. } => left.nullable() || right.nullable(),
            Expression::And(l, r) | Expression::Or(l, r) => l.nullable() || r.nullable(),
            Expression::Not(e) => e.nullable(),
            Expression::In { expr, .. } => expr.nullable(),
            _ => true,
        }
    }

    /// Output name when the expression heads a projection.
    pub fn output_name(&self) -> String {
        match self {
            Expression::Alias { name, .. } => name.clone(),
            Expression::Field(f) => f.name.clone(),
            Expression::Column { name, .. } => name.clone(),
            other => other.to_string(),
        }
    }

    /// Schema column this expression produces when projected.
    pub fn schema_column(&self) -> Column {
        match self {
            Expression::Field(f) => Column::new(
                f.name.clone(),
                f.data_type.clone(),
                f.table.clone().unwrap_or_default(),
                f.nullable,
            ),
            other => Column::new(other.output_name(), other.data_type(), "", other.nullable()),
        }
    }

    /// Origin tables referenced by resolved fields, in first-seen order.
    pub fn referenced_tables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.visit(&mut |e| {
            if let Expression::Field(FieldRef {
                table: Some(t), ..
            }) = e
            {
                if !out.contains(t) {
                    out.push(t.clone());
                }
            }
        });
        out
    }

    /// Pre-order walk over the expression tree.
    pub fn visit(&self, f: &mut impl FnMut(&Expression)) {
        f(self);
        match self {
            Expression::Alias { expr, .. }
            | Expression::IsNull(expr)
            | Expression::Not(expr) => expr.visit(f),
            Expression::Compare { left, right, .. }
            | Expression::Arithmetic { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expression::And(l, r) | Expression::Or(l, r) => {
                l.visit(f);
                r.visit(f);
            }
            Expression::In { expr, tuple } => {
                expr.visit(f);
                tuple.visit(f);
            }
            Expression::Tuple(list) => {
                for e in list {
                    e.visit(f);
                }
            }
            Expression::Call { args, .. } | Expression::ScalarFunction { args, .. } => {
                for e in args {
                    e.visit(f);
                }
            }
            Expression::Literal { .. }
            | Expression::Column { .. }
            | Expression::Field(_)
            | Expression::Star { .. } => {}
        }
    }
}

// -----------------------------
// Rewriting
// -----------------------------

impl Expression {
    /// Bottom-up rewrite: children are rebuilt first, then `f` is applied
    /// to the node carrying the rewritten children. A callback returning
    /// its input unchanged yields a tree structurally equal to the
    /// original, which the analyzer's fixed-point detection relies on.
    pub fn transform_up<F>(self, f: &mut F) -> Result<Expression>
    where
        F: FnMut(Expression) -> Result<Expression>,
    {
        let rebuilt = match self {
            Expression::Alias { expr, name } => Expression::Alias {
                expr: Box::new(expr.transform_up(f)?),
                name,
            },
            Expression::Compare { op, left, right } => Expression::Compare {
                op,
                left: Box::new(left.transform_up(f)?),
                right: Box::new(right.transform_up(f)?),
            },
            Expression::IsNull(expr) => Expression::IsNull(Box::new(expr.transform_up(f)?)),
            Expression::And(l, r) => {
                Expression::And(Box::new(l.transform_up(f)?), Box::new(r.transform_up(f)?))
            }
            Expression::Or(l, r) => {
                Expression::Or(Box::new(l.transform_up(f)?), Box::new(r.transform_up(f)?))
            }
            Expression::Not(expr) => Expression::Not(Box::new(expr.transform_up(f)?)),
            Expression::In { expr, tuple } => Expression::In {
                expr: Box::new(expr.transform_up(f)?),
                tuple: Box::new(tuple.transform_up(f)?),
            },
            Expression::Tuple(list) => Expression::Tuple(
                list.into_iter()
                    .map(|e| e.transform_up(f))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Expression::Arithmetic { op, left, right } => Expression::Arithmetic {
                op,
                left: Box::new(left.transform_up(f)?),
                right: Box::new(right.transform_up(f)?),
            },
            Expression::Call { name, args } => Expression::Call {
                name,
                args: args
                    .into_iter()
                    .map(|e| e.transform_up(f))
                    .collect::<Result<Vec<_>>>()?,
            },
            Expression::ScalarFunction { function, args } => Expression::ScalarFunction {
                function,
                args: args
                    .into_iter()
                    .map(|e| e.transform_up(f))
                    .collect::<Result<Vec<_>>>()?,
            },
            leaf => leaf,
        };
        f(rebuilt)
    }
}

// -----------------------------
// Evaluation
// -----------------------------

fn bool3(v: &Value) -> Option<bool> {
    match v {
        Value::Null => None,
        other => other.as_bool(),
    }
}

impl Expression {
    /// Evaluate against a single row. Used by in-memory filtered scans and
    /// the reference checks in tests; unresolved expressions fail.
    pub fn eval(&self, row: &[Value]) -> Result<Value> {
        match self {
            Expression::Literal { value, .. } => Ok(value.clone()),
            Expression::Field(f) => row.get(f.index).cloned().ok_or_else(|| {
                RiffleError::InvalidPlan(format!(
                    "field index {} out of range for row of width {}",
                    f.index,
                    row.len()
                ))
            }),
            Expression::Alias { expr, .. } => expr.eval(row),
            Expression::Compare { op, left, right } => {
                let l = left.eval(row)?;
                let r = right.eval(row)?;
                Ok(match l.compare(&r) {
                    None => Value::Null,
                    Some(ord) => Value::Boolean(match op {
                        CompareOp::Eq => ord.is_eq(),
                        CompareOp::NotEq => !ord.is_eq(),
                        CompareOp::Lt => ord.is_lt(),
                        CompareOp::LtEq => ord.is_le(),
                        CompareOp::Gt => ord.is_gt(),
                        CompareOp::GtEq => ord.is_ge(),
                    }),
                })
            }
            Expression::IsNull(expr) => Ok(Value::Boolean(expr.eval(row)?.is_null())),
            Expression::And(l, r) => {
                let l = bool3(&l.eval(row)?);
                let r = bool3(&r.eval(row)?);
                Ok(match (l, r) {
                    (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
                    (Some(true), Some(true)) => Value::Boolean(true),
                    _ => Value::Null,
                })
            }
            Expression::Or(l, r) => {
                let l = bool3(&l.eval(row)?);
                let r = bool3(&r.eval(row)?);
                Ok(match (l, r) {
                    (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
                    (Some(false), Some(false)) => Value::Boolean(false),
                    _ => Value::Null,
                })
            }
            Expression::Not(e) => Ok(match bool3(&e.eval(row)?) {
                Some(b) => Value::Boolean(!b),
                None => Value::Null,
            }),
            Expression::In { expr, tuple } => {
                let needle = expr.eval(row)?;
                if needle.is_null() {
                    return Ok(Value::Null);
                }
                let list: &[Expression] = match tuple.as_ref() {
                    Expression::Tuple(list) => list,
                    other => std::slice::from_ref(other),
                };
                for e in list {
                    if needle
                        .compare(&e.eval(row)?)
                        .is_some_and(|ord| ord.is_eq())
                    {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            }
            Expression::Tuple(_) => Err(RiffleError::InvalidPlan(format!(
                "tuple {self} cannot be evaluated outside IN"
            ))),
            Expression::Arithmetic { op, left, right } => {
                let l = left.eval(row)?;
                let r = right.eval(row)?;
                eval_arithmetic(*op, l, r)
            }
            Expression::ScalarFunction { function, args } => {
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(a.eval(row)?);
                }
                function.call(&values)
            }
            Expression::Column { .. } | Expression::Star { .. } | Expression::Call { .. } => {
                Err(RiffleError::InvalidPlan(format!(
                    "cannot evaluate unresolved expression {self}"
                )))
            }
        }
    }
}

fn eval_arithmetic(op: ArithmeticOp, l: Value, r: Value) -> Result<Value> {
    use Value::*;
    Ok(match (l, op, r) {
        (Null, _, _) | (_, _, Null) => Null,
        (Int64(a), ArithmeticOp::Plus, Int64(b)) => Int64(a + b),
        (Int64(a), ArithmeticOp::Minus, Int64(b)) => Int64(a - b),
        (Int64(a), ArithmeticOp::Multiply, Int64(b)) => Int64(a * b),
        (Int64(a), ArithmeticOp::Divide, Int64(b)) if b != 0 => Int64(a / b),
        (Int64(_), ArithmeticOp::Divide, Int64(_)) => Null,
        (Float64(a), ArithmeticOp::Plus, Float64(b)) => Float64(a + b),
        (Float64(a), ArithmeticOp::Minus, Float64(b)) => Float64(a - b),
        (Float64(a), ArithmeticOp::Multiply, Float64(b)) => Float64(a * b),
        (Float64(a), ArithmeticOp::Divide, Float64(b)) if b != 0.0 => Float64(a / b),
        (Float64(_), ArithmeticOp::Divide, Float64(_)) => Null,
        (Int64(a), op, Float64(b)) => return eval_arithmetic(op, Float64(a as f64), Float64(b)),
        (Float64(a), op, Int64(b)) => return eval_arithmetic(op, Float64(a), Float64(b as f64)),
        (l, op, r) => {
            return Err(RiffleError::InvalidPlan(format!(
                "cannot apply {} to {l} and {r}",
                op.symbol()
            )))
        }
    })
}

// -----------------------------
// Rendering
// -----------------------------

impl fmt::Display for Expression {
    /// Canonical rendering. Positional fields render as `table.name`
    /// without their index, so the rendered form doubles as the key the
    /// index registry matches indexed expressions with.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal { value, .. } => write!(f, "{value}"),
            Expression::Column { table: None, name } => write!(f, "{name}"),
            Expression::Column {
                table: Some(t),
                name,
            } => write!(f, "{t}.{name}"),
            Expression::Field(fr) => match &fr.table {
                Some(t) => write!(f, "{t}.{}", fr.name),
                None => write!(f, "{}", fr.name),
            },
            Expression::Star { table: None } => write!(f, "*"),
            Expression::Star { table: Some(t) } => write!(f, "{t}.*"),
            Expression::Alias { expr, name } => write!(f, "{expr} AS {name}"),
            Expression::Compare { op, left, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }
            Expression::IsNull(e) => write!(f, "{e} IS NULL"),
            Expression::And(l, r) => write!(f, "({l} AND {r})"),
            Expression::Or(l, r) => write!(f, "({l} OR {r})"),
            Expression::Not(e) => write!(f, "NOT {e}"),
            Expression::In { expr, tuple } => write!(f, "{expr} IN {tuple}"),
            Expression::Tuple(list) => {
                write!(f, "(")?;
                for (i, e) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ")")
            }
            Expression::Arithmetic { op, left, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }
            Expression::Call { name, args } => write_call(f, name, args),
            Expression::ScalarFunction { function, args } => write_call(f, function.name(), args),
        }
    }
}

fn write_call(f: &mut fmt::Formatter<'_>, name: &str, args: &[Expression]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, e) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{e}")?;
    }
    write!(f, ")")
}
