//! Bind parameter resolution
//!
//! Accepted spellings:
//!
//! - positional `$1`, `$2`, ...
//! - named `$name`
//! - sign form `@name` (the `@` prefix operator applied to a name)
//! - function form `<schema>.arg('name')`, and `<schema>.narg('name')` for a
//!   nullable parameter, where `<schema>` is the reserved parameter schema
//!
//! The resolver walks a statement once, left to right in source order, and
//! rewrites every parameter reference into [`Expr::Parameter`] carrying its
//! ordinal. Named parameters are numbered by first appearance, so planning
//! the same text twice always yields the same ordinals.

use std::collections::BTreeMap;
use std::fmt;

use crate::sql::ast::*;
use crate::sql::error::{SqlError, SqlResult};
use crate::sql::syntax::segments;

/// Default reserved schema for `arg`/`narg` parameter functions
pub const DEFAULT_PARAM_SCHEMA: &str = "params";

const ARG_FUNC: &str = "arg";
const NARG_FUNC: &str = "narg";
const SIGN_OP: &str = "@";

/// Characters that only ever spell parameter prefixes
const SIGIL_CHARS: &[char] = &['@', '$', ':', '?'];

/// True if the call is exactly `<schema>.arg(..)` or `<schema>.narg(..)`
pub fn is_param_func(call: &FunctionCall, schema: &str) -> bool {
    call.schema.as_deref() == Some(schema) && (call.name == ARG_FUNC || call.name == NARG_FUNC)
}

/// True if the expression is an operator whose joined name is exactly `@`
pub fn is_param_sign(expr: &Expr) -> bool {
    matches!(expr, Expr::Operator { op, .. } if op.concat() == SIGN_OP)
}

/// Reject parameter sigils other than `$n`, `$name`, and `@name` in raw
/// statement text
///
/// Runs before tokenizing: the tokenizer reads some of these spellings as
/// something else entirely (`$$` opens a dollar-quoted string). Literals,
/// quoted identifiers, and comments are skipped.
pub fn check_prefixes(sql: &str) -> SqlResult<()> {
    let is_word = |c: Option<&char>| c.is_some_and(|c| c.is_alphanumeric() || *c == '_');

    for segment in segments(sql).into_iter().filter(|s| s.code) {
        let chars: Vec<char> = segment.text.chars().collect();
        for (i, c) in chars.iter().enumerate() {
            let next = chars.get(i + 1);
            let rejected = match c {
                '$' => !is_word(next),
                '@' => next == Some(&'@'),
                // `::` casts are not parameters
                ':' => {
                    (i == 0 || chars[i - 1] != ':')
                        && next.is_some_and(|n| n.is_alphabetic() || *n == '_')
                }
                '?' => true,
                _ => false,
            };
            if rejected {
                let prefix: String = chars[i..]
                    .iter()
                    .take_while(|c| SIGIL_CHARS.contains(c))
                    .collect();
                return Err(SqlError::BindParameterPrefixNotSupported(prefix));
            }
        }
    }
    Ok(())
}

/// How a parameter was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamIdentity {
    Positional(u32),
    Named(String),
}

impl fmt::Display for ParamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamIdentity::Positional(n) => write!(f, "${}", n),
            ParamIdentity::Named(name) => write!(f, "@{}", name),
        }
    }
}

/// One distinct bind parameter of a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindParameter {
    /// Ordinal used in the canonical text (`$ordinal`)
    pub ordinal: u32,
    pub identity: ParamIdentity,
    /// Index of the first reference among all parameter references of the
    /// statement, in source order
    pub position: usize,
    /// Declared nullable (`narg`)
    pub nullable: bool,
}

/// Ordered parameters of one statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    /// Sorted by ordinal
    params: Vec<BindParameter>,
}

impl ParameterSet {
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindParameter> {
        self.params.iter()
    }

    pub fn get(&self, ordinal: u32) -> Option<&BindParameter> {
        self.params.iter().find(|p| p.ordinal == ordinal)
    }

    pub fn by_name(&self, name: &str) -> Option<&BindParameter> {
        self.params
            .iter()
            .find(|p| matches!(&p.identity, ParamIdentity::Named(n) if n == name))
    }

    /// Names of named parameters in ordinal order
    pub fn names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter_map(|p| match &p.identity {
                ParamIdentity::Named(n) => Some(n.as_str()),
                ParamIdentity::Positional(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Positional,
    Named,
}

/// Single-pass parameter resolver
#[derive(Debug)]
pub struct ParameterResolver {
    param_schema: String,
    style: Option<Style>,
    /// Lookup only; output order comes from `params`
    by_name: BTreeMap<String, u32>,
    params: Vec<BindParameter>,
    references: usize,
}

impl ParameterResolver {
    pub fn new(param_schema: impl Into<String>) -> Self {
        Self {
            param_schema: param_schema.into(),
            style: None,
            by_name: BTreeMap::new(),
            params: Vec::new(),
            references: 0,
        }
    }

    /// Rewrite every parameter reference in `stmt` and return the set
    pub fn resolve(mut self, stmt: &mut Statement) -> SqlResult<ParameterSet> {
        match stmt {
            Statement::Query(query) => self.query(query)?,
            Statement::Insert(insert) => {
                match &mut insert.source {
                    InsertSource::Values(rows) => self.rows(rows)?,
                    InsertSource::Query(query) => self.query(query)?,
                }
                if let Some(conflict) = &mut insert.on_conflict {
                    if let ConflictAction::DoUpdate {
                        assignments,
                        selection,
                    } = &mut conflict.action
                    {
                        self.assignments(assignments)?;
                        self.opt_expr(selection)?;
                    }
                }
            }
            Statement::Update(update) => {
                self.assignments(&mut update.assignments)?;
                if let Some(from) = &mut update.from {
                    self.from(from)?;
                }
                self.opt_expr(&mut update.selection)?;
            }
            Statement::Delete(delete) => {
                if let Some(using) = &mut delete.using {
                    self.from(using)?;
                }
                self.opt_expr(&mut delete.selection)?;
            }
        }

        let mut params = self.params;
        params.sort_by_key(|p| p.ordinal);
        Ok(ParameterSet { params })
    }

    fn query(&mut self, query: &mut Query) -> SqlResult<()> {
        for cte in &mut query.ctes {
            self.query(&mut cte.query)?;
        }
        self.set_expr(&mut query.body)?;
        for item in &mut query.order_by {
            self.expr(&mut item.expr)?;
        }
        self.opt_expr(&mut query.limit)?;
        self.opt_expr(&mut query.offset)
    }

    fn set_expr(&mut self, body: &mut SetExpr) -> SqlResult<()> {
        match body {
            SetExpr::Select(select) => self.select(select),
            SetExpr::SetOperation { left, right, .. } => {
                self.set_expr(left)?;
                self.set_expr(right)
            }
            SetExpr::Query(query) => self.query(query),
            SetExpr::Values(rows) => self.rows(rows),
        }
    }

    fn select(&mut self, select: &mut Select) -> SqlResult<()> {
        for item in &mut select.projection {
            if let SelectItem::Expr { expr, .. } = item {
                self.expr(expr)?;
            }
        }
        if let Some(from) = &mut select.from {
            self.from(from)?;
        }
        self.opt_expr(&mut select.selection)?;
        self.exprs(&mut select.group_by)?;
        self.opt_expr(&mut select.having)?;
        for def in &mut select.windows {
            self.window_spec(&mut def.spec)?;
        }
        Ok(())
    }

    fn from(&mut self, from: &mut FromClause) -> SqlResult<()> {
        self.table_ref(&mut from.relation)?;
        for join in &mut from.joins {
            self.table_ref(&mut join.relation)?;
            self.expr(&mut join.on)?;
        }
        Ok(())
    }

    fn table_ref(&mut self, table: &mut TableRef) -> SqlResult<()> {
        match table {
            TableRef::Table { .. } => Ok(()),
            TableRef::Subquery { query, .. } => self.query(query),
        }
    }

    fn window_spec(&mut self, spec: &mut WindowSpec) -> SqlResult<()> {
        self.exprs(&mut spec.partition_by)?;
        for item in &mut spec.order_by {
            self.expr(&mut item.expr)?;
        }
        Ok(())
    }

    fn rows(&mut self, rows: &mut [Vec<Expr>]) -> SqlResult<()> {
        for row in rows {
            self.exprs(row)?;
        }
        Ok(())
    }

    fn assignments(&mut self, assignments: &mut [Assignment]) -> SqlResult<()> {
        for assignment in assignments {
            self.expr(&mut assignment.value)?;
        }
        Ok(())
    }

    fn exprs(&mut self, exprs: &mut [Expr]) -> SqlResult<()> {
        for expr in exprs {
            self.expr(expr)?;
        }
        Ok(())
    }

    fn opt_expr(&mut self, expr: &mut Option<Expr>) -> SqlResult<()> {
        match expr {
            Some(expr) => self.expr(expr),
            None => Ok(()),
        }
    }

    fn expr(&mut self, expr: &mut Expr) -> SqlResult<()> {
        if let Some(ordinal) = self.parameter_reference(expr)? {
            *expr = Expr::Parameter(ordinal);
            return Ok(());
        }

        match expr {
            Expr::Column { .. } | Expr::Literal(_) | Expr::Parameter(_) => Ok(()),
            // Every placeholder is consumed by parameter_reference
            Expr::Placeholder(_) => Ok(()),
            Expr::BinaryOp { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            Expr::UnaryOp { expr, .. } => self.expr(expr),
            Expr::Operator { left, right, .. } => {
                if let Some(left) = left {
                    self.expr(left)?;
                }
                self.expr(right)
            }
            Expr::Function(call) => {
                self.exprs(&mut call.args)?;
                if let Some(filter) = &mut call.filter {
                    self.expr(filter)?;
                }
                if let Some(Over::Spec(spec)) = &mut call.over {
                    self.window_spec(spec)?;
                }
                Ok(())
            }
            Expr::IsNull { expr, .. } => self.expr(expr),
            Expr::InList { expr, list, .. } => {
                self.expr(expr)?;
                self.exprs(list)
            }
            Expr::InSubquery { expr, query, .. } => {
                self.expr(expr)?;
                self.query(query)
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                self.expr(expr)?;
                self.expr(low)?;
                self.expr(high)
            }
            Expr::Like { expr, pattern, .. } => {
                self.expr(expr)?;
                self.expr(pattern)
            }
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                if let Some(operand) = operand {
                    self.expr(operand)?;
                }
                for (when, then) in branches {
                    self.expr(when)?;
                    self.expr(then)?;
                }
                if let Some(else_result) = else_result {
                    self.expr(else_result)?;
                }
                Ok(())
            }
            Expr::Cast { expr, .. } => self.expr(expr),
            Expr::Subquery(query) => self.query(query),
            Expr::Exists { query, .. } => self.query(query),
            Expr::Nested(inner) => self.expr(inner),
        }
    }

    /// Ordinal if `expr` is a parameter reference
    fn parameter_reference(&mut self, expr: &Expr) -> SqlResult<Option<u32>> {
        match expr {
            Expr::Placeholder(raw) => self.placeholder(raw).map(Some),
            Expr::Function(call) if is_param_func(call, &self.param_schema) => {
                let name = param_func_name(call)?;
                let nullable = call.name == NARG_FUNC;
                self.named(name, nullable).map(Some)
            }
            Expr::Operator { op, left, right } => {
                if is_param_sign(expr) {
                    if left.is_some() {
                        return Err(SqlError::InvalidParameter(
                            "@ must directly prefix a parameter name".to_string(),
                        ));
                    }
                    return match right.as_ref() {
                        Expr::Column {
                            relation: None,
                            name,
                        } => self.named(name, false).map(Some),
                        _ => Err(SqlError::InvalidParameter(
                            "@ must be followed by a parameter name".to_string(),
                        )),
                    };
                }
                let joined = op.concat();
                if !joined.is_empty() && joined.chars().all(|c| SIGIL_CHARS.contains(&c)) {
                    return Err(SqlError::BindParameterPrefixNotSupported(joined));
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn placeholder(&mut self, raw: &str) -> SqlResult<u32> {
        let Some(body) = raw.strip_prefix('$') else {
            let prefix: String = raw.chars().take_while(|c| !c.is_alphanumeric()).collect();
            return Err(SqlError::BindParameterPrefixNotSupported(prefix));
        };
        if body.is_empty() {
            return Err(SqlError::InvalidParameter(raw.to_string()));
        }
        if body.chars().all(|c| c.is_ascii_digit()) {
            let n: u32 = body
                .parse()
                .map_err(|_| SqlError::InvalidParameter(raw.to_string()))?;
            if n == 0 {
                return Err(SqlError::InvalidParameter(raw.to_string()));
            }
            return self.positional(n);
        }
        if body.starts_with(|c: char| c.is_alphabetic() || c == '_')
            && body.chars().all(|c| c.is_alphanumeric() || c == '_')
        {
            return self.named(&body.to_lowercase(), false);
        }
        Err(SqlError::BindParameterPrefixNotSupported(raw.to_string()))
    }

    fn set_style(&mut self, style: Style) -> SqlResult<()> {
        match self.style {
            Some(existing) if existing != style => Err(SqlError::MixedParameterStyles),
            _ => {
                self.style = Some(style);
                Ok(())
            }
        }
    }

    fn positional(&mut self, n: u32) -> SqlResult<u32> {
        self.set_style(Style::Positional)?;
        let position = self.next_reference();
        if !self.params.iter().any(|p| p.ordinal == n) {
            self.params.push(BindParameter {
                ordinal: n,
                identity: ParamIdentity::Positional(n),
                position,
                nullable: false,
            });
        }
        Ok(n)
    }

    fn named(&mut self, name: &str, nullable: bool) -> SqlResult<u32> {
        self.set_style(Style::Named)?;
        let position = self.next_reference();
        if let Some(&ordinal) = self.by_name.get(name) {
            if nullable {
                if let Some(p) = self.params.iter_mut().find(|p| p.ordinal == ordinal) {
                    p.nullable = true;
                }
            }
            return Ok(ordinal);
        }
        let ordinal = self.params.len() as u32 + 1;
        self.by_name.insert(name.to_string(), ordinal);
        self.params.push(BindParameter {
            ordinal,
            identity: ParamIdentity::Named(name.to_string()),
            position,
            nullable,
        });
        Ok(ordinal)
    }

    fn next_reference(&mut self) -> usize {
        let position = self.references;
        self.references += 1;
        position
    }
}

/// The name argument of an `arg`/`narg` call
fn param_func_name(call: &FunctionCall) -> SqlResult<&str> {
    if call.distinct || call.star || call.filter.is_some() || call.over.is_some() {
        return Err(SqlError::InvalidParameter(format!(
            "{} takes a single parameter name",
            call.name
        )));
    }
    match call.args.as_slice() {
        [Expr::Literal(Literal::String(name))] if !name.is_empty() => Ok(name),
        [Expr::Column {
            relation: None,
            name,
        }] => Ok(name),
        _ => Err(SqlError::InvalidParameter(format!(
            "{} takes a single parameter name",
            call.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::Parser;
    use crate::sql::writer::ToSql;

    fn resolve(sql: &str) -> SqlResult<(String, ParameterSet)> {
        let mut stmt = Parser::parse_one(sql)?;
        let params = ParameterResolver::new(DEFAULT_PARAM_SCHEMA).resolve(&mut stmt)?;
        Ok((stmt.to_sql(), params))
    }

    #[test]
    fn test_is_param_func() {
        let call = FunctionCall {
            schema: Some("schema".to_string()),
            ..FunctionCall::new("arg", vec![Expr::Literal(Literal::String("foo".into()))])
        };
        assert!(is_param_func(&call, "schema"));
        assert!(!is_param_func(&call, "params"));

        let other = FunctionCall {
            schema: Some("schema".to_string()),
            ..FunctionCall::new("args", vec![])
        };
        assert!(!is_param_func(&other, "schema"));
        assert!(!is_param_func(&FunctionCall::new("arg", vec![]), "schema"));
    }

    #[test]
    fn test_is_param_sign() {
        let sign = Expr::Operator {
            op: vec!["@".to_string()],
            left: Some(Box::new(Expr::column("col"))),
            right: Box::new(Expr::Literal(Literal::String("x".into()))),
        };
        assert!(is_param_sign(&sign));

        let dollars = Expr::Operator {
            op: vec!["$$".to_string()],
            left: Some(Box::new(Expr::column("col"))),
            right: Box::new(Expr::Literal(Literal::String("x".into()))),
        };
        assert!(!is_param_sign(&dollars));

        let at_at = Expr::Operator {
            op: vec!["@".to_string(), "@".to_string()],
            left: None,
            right: Box::new(Expr::column("x")),
        };
        assert!(!is_param_sign(&at_at));
    }

    fn select_where(selection: Expr) -> Statement {
        Statement::Query(Query::from_body(SetExpr::Select(Box::new(Select {
            projection: vec![SelectItem::Wildcard],
            from: Some(FromClause {
                relation: TableRef::Table {
                    name: "t".to_string(),
                    alias: None,
                },
                joins: vec![],
            }),
            selection: Some(selection),
            ..Select::default()
        }))))
    }

    #[test]
    fn test_rejects_other_prefixes() {
        let mut stmt = select_where(Expr::Operator {
            op: vec!["$$".to_string()],
            left: Some(Box::new(Expr::column("col"))),
            right: Box::new(Expr::Literal(Literal::String("x".into()))),
        });
        let err = ParameterResolver::new(DEFAULT_PARAM_SCHEMA)
            .resolve(&mut stmt)
            .unwrap_err();
        assert_eq!(err, SqlError::BindParameterPrefixNotSupported("$$".to_string()));

        let mut stmt = select_where(Expr::binary(
            Expr::column("a"),
            BinaryOp::Eq,
            Expr::Placeholder(":name".to_string()),
        ));
        let err = ParameterResolver::new(DEFAULT_PARAM_SCHEMA)
            .resolve(&mut stmt)
            .unwrap_err();
        assert_eq!(err, SqlError::BindParameterPrefixNotSupported(":".to_string()));
    }

    #[test]
    fn test_rejects_other_prefixes_in_text() {
        for (sql, prefix) in [
            ("SELECT * FROM t WHERE col $$ 'x'", "$$"),
            ("SELECT * FROM t WHERE a = :name", ":"),
            ("SELECT * FROM t WHERE a = @@x", "@@"),
            ("SELECT * FROM t WHERE a = ?", "?"),
            ("SELECT * FROM t WHERE a = $", "$"),
        ] {
            assert_eq!(
                resolve(sql).unwrap_err(),
                SqlError::BindParameterPrefixNotSupported(prefix.to_string()),
                "{}",
                sql
            );
        }
    }

    #[test]
    fn test_prefix_check_skips_opaque_text() {
        assert!(check_prefixes("SELECT '$$', \"a?\" FROM t -- :name").is_ok());
        assert!(check_prefixes("SELECT a::text FROM t WHERE b = $1 /* @@x */").is_ok());
        assert!(check_prefixes("SELECT * FROM t WHERE a = $first AND b = @second").is_ok());
    }

    #[test]
    fn test_sign_form_from_text() {
        let (sql, params) = resolve("SELECT @Name FROM t WHERE a = @name").unwrap();
        assert_eq!(sql, r#"SELECT $1 FROM "t" WHERE "a" = $1"#);
        assert_eq!(params.names(), vec!["name"]);
    }

    #[test]
    fn test_named_ordinals_follow_source_order() {
        let (sql, params) =
            resolve("SELECT * FROM t WHERE b = @second_seen AND a = $first OR c = @second_seen")
                .unwrap();
        // Source order, not alphabetical
        assert_eq!(params.names(), vec!["second_seen", "first"]);
        assert_eq!(
            sql,
            r#"SELECT * FROM "t" WHERE "b" = $1 AND "a" = $2 OR "c" = $1"#
        );
        assert_eq!(params.by_name("first").unwrap().position, 1);
    }

    #[test]
    fn test_param_functions() {
        let (sql, params) = resolve(
            "UPDATE t SET a = params.arg('value'), b = params.narg('maybe') \
             WHERE id = params.arg('value')",
        )
        .unwrap();
        assert_eq!(sql, r#"UPDATE "t" SET "a" = $1 , "b" = $2 WHERE "id" = $1"#);
        assert_eq!(params.len(), 2);
        assert!(!params.get(1).unwrap().nullable);
        assert!(params.get(2).unwrap().nullable);
    }

    #[test]
    fn test_positional_keep_numbers() {
        let (sql, params) = resolve("SELECT * FROM t WHERE a = $2 AND b = $1 AND c = $2").unwrap();
        assert_eq!(sql, r#"SELECT * FROM "t" WHERE "a" = $2 AND "b" = $1 AND "c" = $2"#);
        let ordinals: Vec<u32> = params.iter().map(|p| p.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2]);
        assert_eq!(params.get(2).unwrap().position, 0);
    }

    #[test]
    fn test_mixed_styles_rejected() {
        assert_eq!(
            resolve("SELECT * FROM t WHERE a = $1 AND b = @name").unwrap_err(),
            SqlError::MixedParameterStyles
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let sql = "INSERT INTO t (a, b) VALUES (@x, @y), (@y, params.arg('z'))";
        let first = resolve(sql).unwrap();
        let second = resolve(sql).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.1.names(), vec!["x", "y", "z"]);
    }
}
