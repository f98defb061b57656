//! SQL parser wrapper around sqlparser crate
//!
//! Parses with the PostgreSQL dialect and converts the result into the
//! internal AST. Statement forms the planner does not support are rejected
//! here, before any planning work happens.

use sqlparser::ast as sp;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser as SqlParser;

use crate::catalog::DataType;
use crate::sql::ast::*;
use crate::sql::error::{SqlError, SqlResult};
use crate::sql::params::check_prefixes;

/// SQL parser
pub struct Parser;

impl Parser {
    /// Parse a single SQL statement
    pub fn parse_one(sql: &str) -> SqlResult<Statement> {
        let stmt = Self::parse_raw(sql)?;
        convert_statement(stmt)
    }

    /// Parse a single statement without converting it
    pub fn parse_raw(sql: &str) -> SqlResult<sp::Statement> {
        check_prefixes(sql)?;
        let dialect = PostgreSqlDialect {};
        let mut ast = SqlParser::parse_sql(&dialect, sql)?.into_iter();

        match (ast.next(), ast.next()) {
            (Some(stmt), None) => Ok(stmt),
            (None, _) => Err(SqlError::Parse("Empty SQL statement".to_string())),
            (Some(_), Some(_)) => Err(SqlError::Parse(
                "Multiple statements not supported".to_string(),
            )),
        }
    }
}

fn convert_statement(stmt: sp::Statement) -> SqlResult<Statement> {
    match stmt {
        sp::Statement::Query(query) => Ok(Statement::Query(convert_query(*query)?)),
        sp::Statement::Insert(insert) => convert_insert(insert),
        sp::Statement::Update {
            table,
            assignments,
            from,
            selection,
            returning,
            ..
        } => {
            if returning.is_some() {
                return Err(SqlError::unsupported("RETURNING"));
            }
            let (name, alias) = target_table(table)?;
            Ok(Statement::Update(Update {
                table: name,
                alias,
                assignments: assignments
                    .into_iter()
                    .map(convert_assignment)
                    .collect::<SqlResult<_>>()?,
                from: from.map(convert_from).transpose()?,
                selection: selection.map(convert_expr).transpose()?,
            }))
        }
        sp::Statement::Delete(delete) => convert_delete(delete),
        sp::Statement::CreateTable(_)
        | sp::Statement::CreateIndex(_)
        | sp::Statement::CreateView { .. }
        | sp::Statement::AlterTable { .. }
        | sp::Statement::Drop { .. } => Err(SqlError::unsupported(
            "schema statements (CREATE/ALTER/DROP) cannot be planned",
        )),
        _ => Err(SqlError::unsupported("statement type")),
    }
}

fn convert_insert(insert: sp::Insert) -> SqlResult<Statement> {
    let sp::Insert {
        table_name,
        table_alias,
        columns,
        source,
        on,
        returning,
        ..
    } = insert;

    if returning.is_some() {
        return Err(SqlError::unsupported("RETURNING"));
    }
    let source =
        source.ok_or_else(|| SqlError::unsupported("INSERT without a VALUES or query source"))?;

    let query = convert_query(*source)?;
    let source = match query {
        Query {
            ctes,
            body: SetExpr::Values(rows),
            order_by,
            limit: None,
            offset: None,
        } if ctes.is_empty() && order_by.is_empty() => InsertSource::Values(rows),
        other => InsertSource::Query(Box::new(other)),
    };

    let on_conflict = match on {
        None => None,
        Some(sp::OnInsert::OnConflict(conflict)) => Some(convert_on_conflict(conflict)?),
        Some(_) => return Err(SqlError::unsupported("ON DUPLICATE KEY UPDATE")),
    };

    Ok(Statement::Insert(Insert {
        table: object_name(table_name)?,
        alias: table_alias.as_ref().map(ident).transpose()?,
        columns: columns.iter().map(ident).collect::<SqlResult<_>>()?,
        source,
        on_conflict,
    }))
}

fn convert_on_conflict(conflict: sp::OnConflict) -> SqlResult<OnConflict> {
    let target = match conflict.conflict_target {
        None => Vec::new(),
        Some(sp::ConflictTarget::Columns(cols)) => {
            cols.iter().map(ident).collect::<SqlResult<_>>()?
        }
        Some(_) => return Err(SqlError::unsupported("ON CONFLICT ON CONSTRAINT")),
    };
    let action = match conflict.action {
        sp::OnConflictAction::DoNothing => ConflictAction::DoNothing,
        sp::OnConflictAction::DoUpdate(update) => ConflictAction::DoUpdate {
            assignments: update
                .assignments
                .into_iter()
                .map(convert_assignment)
                .collect::<SqlResult<_>>()?,
            selection: update.selection.map(convert_expr).transpose()?,
        },
    };
    Ok(OnConflict { target, action })
}

fn convert_delete(delete: sp::Delete) -> SqlResult<Statement> {
    let sp::Delete {
        tables,
        from,
        using,
        selection,
        returning,
        order_by,
        limit,
        ..
    } = delete;

    if !tables.is_empty() {
        return Err(SqlError::unsupported("multi-table DELETE"));
    }
    if returning.is_some() {
        return Err(SqlError::unsupported("RETURNING"));
    }
    if !order_by.is_empty() || limit.is_some() {
        return Err(SqlError::unsupported("ORDER BY or LIMIT on DELETE"));
    }

    let mut targets = match from {
        sp::FromTable::WithFromKeyword(t) | sp::FromTable::WithoutKeyword(t) => t,
    };
    if targets.len() != 1 {
        return Err(SqlError::unsupported("DELETE from more than one table"));
    }
    let (table, alias) = target_table(targets.remove(0))?;

    let using = match using {
        None => None,
        Some(mut sources) => {
            if sources.len() != 1 {
                return Err(SqlError::unsupported("implicit cross joins"));
            }
            Some(convert_from(sources.remove(0))?)
        }
    };

    Ok(Statement::Delete(Delete {
        table,
        alias,
        using,
        selection: selection.map(convert_expr).transpose()?,
    }))
}

/// Target of UPDATE/DELETE: a plain table without joins
fn target_table(target: sp::TableWithJoins) -> SqlResult<(String, Option<String>)> {
    if !target.joins.is_empty() {
        return Err(SqlError::unsupported("joins in the target of a write"));
    }
    match convert_table_factor(target.relation)? {
        TableRef::Table { name, alias } => Ok((name, alias)),
        TableRef::Subquery { .. } => Err(SqlError::unsupported("writing to a subquery")),
    }
}

fn convert_assignment(assignment: sp::Assignment) -> SqlResult<Assignment> {
    let column = match assignment.target {
        sp::AssignmentTarget::ColumnName(name) => object_name(name)?,
        _ => return Err(SqlError::unsupported("tuple assignment")),
    };
    Ok(Assignment {
        column,
        value: convert_expr(assignment.value)?,
    })
}

fn convert_query(query: sp::Query) -> SqlResult<Query> {
    let sp::Query {
        with,
        body,
        order_by,
        limit,
        offset,
        fetch,
        locks,
        ..
    } = query;

    if fetch.is_some() {
        return Err(SqlError::unsupported("FETCH"));
    }
    if !locks.is_empty() {
        return Err(SqlError::unsupported("locking clauses"));
    }

    let mut ctes = Vec::new();
    if let Some(with) = with {
        if with.recursive {
            return Err(SqlError::unsupported("recursive common table expressions"));
        }
        for cte in with.cte_tables {
            if !cte.alias.columns.is_empty() {
                return Err(SqlError::unsupported("column lists on common table expressions"));
            }
            ctes.push(Cte {
                name: ident(&cte.alias.name)?,
                query: convert_query(*cte.query)?,
            });
        }
    }

    let order_by = match order_by {
        None => Vec::new(),
        Some(order_by) => {
            if order_by.interpolate.is_some() {
                return Err(SqlError::unsupported("INTERPOLATE"));
            }
            order_by
                .exprs
                .into_iter()
                .map(convert_order_by)
                .collect::<SqlResult<_>>()?
        }
    };

    Ok(Query {
        ctes,
        body: convert_set_expr(*body)?,
        order_by,
        limit: limit.map(convert_expr).transpose()?,
        offset: offset.map(|o| convert_expr(o.value)).transpose()?,
    })
}

fn convert_set_expr(body: sp::SetExpr) -> SqlResult<SetExpr> {
    match body {
        sp::SetExpr::Select(select) => Ok(SetExpr::Select(Box::new(convert_select(*select)?))),
        sp::SetExpr::Query(query) => Ok(SetExpr::Query(Box::new(convert_query(*query)?))),
        sp::SetExpr::SetOperation {
            op,
            set_quantifier,
            left,
            right,
        } => {
            let op = match op {
                sp::SetOperator::Union => SetOperator::Union,
                sp::SetOperator::Intersect => SetOperator::Intersect,
                sp::SetOperator::Except => SetOperator::Except,
                #[allow(unreachable_patterns)]
                _ => return Err(SqlError::unsupported("set operator")),
            };
            let all = match set_quantifier {
                sp::SetQuantifier::All => true,
                sp::SetQuantifier::Distinct | sp::SetQuantifier::None => false,
                _ => return Err(SqlError::unsupported("BY NAME set operations")),
            };
            Ok(SetExpr::SetOperation {
                op,
                all,
                left: Box::new(convert_set_expr(*left)?),
                right: Box::new(convert_set_expr(*right)?),
            })
        }
        sp::SetExpr::Values(values) => Ok(SetExpr::Values(
            values
                .rows
                .into_iter()
                .map(|row| row.into_iter().map(convert_expr).collect())
                .collect::<SqlResult<_>>()?,
        )),
        _ => Err(SqlError::unsupported("query body")),
    }
}

fn convert_select(select: sp::Select) -> SqlResult<Select> {
    let sp::Select {
        distinct,
        top,
        projection,
        into,
        from,
        lateral_views,
        selection,
        group_by,
        having,
        named_window,
        qualify,
        ..
    } = select;

    if top.is_some() {
        return Err(SqlError::unsupported("TOP"));
    }
    if into.is_some() {
        return Err(SqlError::unsupported("SELECT INTO"));
    }
    if !lateral_views.is_empty() {
        return Err(SqlError::unsupported("LATERAL VIEW"));
    }
    if qualify.is_some() {
        return Err(SqlError::unsupported("QUALIFY"));
    }

    let distinct = match distinct {
        None => false,
        Some(sp::Distinct::Distinct) => true,
        Some(sp::Distinct::On(_)) => return Err(SqlError::unsupported("DISTINCT ON")),
    };

    let mut from = from.into_iter();
    let from = match (from.next(), from.next()) {
        (None, _) => None,
        (Some(twj), None) => Some(convert_from(twj)?),
        (Some(_), Some(_)) => return Err(SqlError::unsupported("implicit cross joins")),
    };

    let group_by = match group_by {
        sp::GroupByExpr::Expressions(exprs, modifiers) => {
            if !modifiers.is_empty() {
                return Err(SqlError::unsupported("GROUP BY modifiers"));
            }
            exprs
                .into_iter()
                .map(convert_expr)
                .collect::<SqlResult<_>>()?
        }
        sp::GroupByExpr::All(_) => return Err(SqlError::unsupported("GROUP BY ALL")),
    };

    let mut windows = Vec::new();
    for sp::NamedWindowDefinition(name, window) in named_window {
        let spec = match window {
            sp::NamedWindowExpr::NamedWindow(base) => WindowSpec {
                base: Some(ident(&base)?),
                ..WindowSpec::default()
            },
            sp::NamedWindowExpr::WindowSpec(spec) => convert_window_spec(spec)?,
        };
        windows.push(WindowDef {
            name: ident(&name)?,
            spec,
        });
    }

    Ok(Select {
        distinct,
        projection: projection
            .into_iter()
            .map(convert_select_item)
            .collect::<SqlResult<_>>()?,
        from,
        selection: selection.map(convert_expr).transpose()?,
        group_by,
        having: having.map(convert_expr).transpose()?,
        windows,
    })
}

fn convert_select_item(item: sp::SelectItem) -> SqlResult<SelectItem> {
    match item {
        sp::SelectItem::UnnamedExpr(expr) => Ok(SelectItem::Expr {
            expr: convert_expr(expr)?,
            alias: None,
        }),
        sp::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expr {
            expr: convert_expr(expr)?,
            alias: Some(ident(&alias)?),
        }),
        sp::SelectItem::QualifiedWildcard(name, _) => {
            Ok(SelectItem::QualifiedWildcard(object_name(name)?))
        }
        sp::SelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
    }
}

fn convert_from(twj: sp::TableWithJoins) -> SqlResult<FromClause> {
    let relation = convert_table_factor(twj.relation)?;
    let mut joins = Vec::with_capacity(twj.joins.len());
    for join in twj.joins {
        let (join_type, constraint) = match join.join_operator {
            sp::JoinOperator::Inner(c) => (JoinType::Inner, c),
            sp::JoinOperator::LeftOuter(c) => (JoinType::Left, c),
            sp::JoinOperator::RightOuter(c) => (JoinType::Right, c),
            sp::JoinOperator::FullOuter(c) => (JoinType::Full, c),
            sp::JoinOperator::CrossJoin => return Err(SqlError::unsupported("CROSS JOIN")),
            _ => return Err(SqlError::unsupported("join type")),
        };
        let on = match constraint {
            sp::JoinConstraint::On(expr) => convert_expr(expr)?,
            sp::JoinConstraint::Using(_) => return Err(SqlError::unsupported("USING joins")),
            sp::JoinConstraint::Natural => return Err(SqlError::unsupported("NATURAL joins")),
            sp::JoinConstraint::None => {
                return Err(SqlError::unsupported("joins without an ON condition"))
            }
        };
        joins.push(Join {
            join_type,
            relation: convert_table_factor(join.relation)?,
            on,
        });
    }
    Ok(FromClause { relation, joins })
}

fn convert_table_factor(factor: sp::TableFactor) -> SqlResult<TableRef> {
    match factor {
        sp::TableFactor::Table {
            name, alias, args, ..
        } => {
            if args.is_some() {
                return Err(SqlError::unsupported("table functions"));
            }
            Ok(TableRef::Table {
                name: object_name(name)?,
                alias: alias.map(convert_alias).transpose()?,
            })
        }
        sp::TableFactor::Derived {
            lateral,
            subquery,
            alias,
            ..
        } => {
            if lateral {
                return Err(SqlError::unsupported("LATERAL subqueries"));
            }
            let alias = alias
                .map(convert_alias)
                .transpose()?
                .ok_or_else(|| SqlError::unsupported("subquery in FROM without an alias"))?;
            Ok(TableRef::Subquery {
                query: Box::new(convert_query(*subquery)?),
                alias,
            })
        }
        _ => Err(SqlError::unsupported("table expression")),
    }
}

fn convert_alias(alias: sp::TableAlias) -> SqlResult<String> {
    if !alias.columns.is_empty() {
        return Err(SqlError::unsupported("column aliases on relations"));
    }
    ident(&alias.name)
}

fn convert_order_by(item: sp::OrderByExpr) -> SqlResult<OrderByItem> {
    Ok(OrderByItem {
        expr: convert_expr(item.expr)?,
        asc: item.asc,
        nulls_first: item.nulls_first,
    })
}

fn convert_window_spec(spec: sp::WindowSpec) -> SqlResult<WindowSpec> {
    if spec.window_frame.is_some() {
        return Err(SqlError::unsupported("window frames"));
    }
    Ok(WindowSpec {
        base: spec.window_name.as_ref().map(ident).transpose()?,
        partition_by: spec
            .partition_by
            .into_iter()
            .map(convert_expr)
            .collect::<SqlResult<_>>()?,
        order_by: spec
            .order_by
            .into_iter()
            .map(convert_order_by)
            .collect::<SqlResult<_>>()?,
    })
}

/// Convert a sqlparser expression
pub(crate) fn convert_expr(expr: sp::Expr) -> SqlResult<Expr> {
    let expr = match expr {
        sp::Expr::Identifier(id) => Expr::Column {
            relation: None,
            name: ident(&id)?,
        },
        sp::Expr::CompoundIdentifier(parts) => {
            let mut parts = parts.iter().map(ident).collect::<SqlResult<Vec<_>>>()?;
            if parts.len() != 2 {
                return Err(SqlError::unsupported(
                    "column references with more than one qualifier",
                ));
            }
            let name = parts.remove(1);
            Expr::Column {
                relation: Some(parts.remove(0)),
                name,
            }
        }
        sp::Expr::Value(value) => convert_value(value)?,
        sp::Expr::BinaryOp { left, op, right } => {
            let left = convert_expr(*left)?;
            let right = convert_expr(*right)?;
            match convert_binary_op(op)? {
                Ok(op) => Expr::BinaryOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                Err(parts) => Expr::Operator {
                    op: parts,
                    left: Some(Box::new(left)),
                    right: Box::new(right),
                },
            }
        }
        sp::Expr::UnaryOp { op, expr } => {
            let inner = convert_expr(*expr)?;
            match op {
                sp::UnaryOperator::Not => Expr::UnaryOp {
                    op: UnaryOp::Not,
                    expr: Box::new(inner),
                },
                sp::UnaryOperator::Minus => Expr::UnaryOp {
                    op: UnaryOp::Neg,
                    expr: Box::new(inner),
                },
                sp::UnaryOperator::Plus => inner,
                // PostgreSQL reads `@name` as the absolute-value operator
                sp::UnaryOperator::PGAbs => Expr::Operator {
                    op: vec!["@".to_string()],
                    left: None,
                    right: Box::new(inner),
                },
                other => return Err(SqlError::unsupported(format!("operator {}", other))),
            }
        }
        sp::Expr::Nested(inner) => Expr::Nested(Box::new(convert_expr(*inner)?)),
        sp::Expr::IsNull(inner) => Expr::IsNull {
            expr: Box::new(convert_expr(*inner)?),
            negated: false,
        },
        sp::Expr::IsNotNull(inner) => Expr::IsNull {
            expr: Box::new(convert_expr(*inner)?),
            negated: true,
        },
        sp::Expr::InList {
            expr,
            list,
            negated,
        } => Expr::InList {
            expr: Box::new(convert_expr(*expr)?),
            list: list
                .into_iter()
                .map(convert_expr)
                .collect::<SqlResult<_>>()?,
            negated,
        },
        sp::Expr::InSubquery {
            expr,
            subquery,
            negated,
        } => Expr::InSubquery {
            expr: Box::new(convert_expr(*expr)?),
            query: Box::new(convert_query(*subquery)?),
            negated,
        },
        sp::Expr::Between {
            expr,
            negated,
            low,
            high,
        } => Expr::Between {
            expr: Box::new(convert_expr(*expr)?),
            low: Box::new(convert_expr(*low)?),
            high: Box::new(convert_expr(*high)?),
            negated,
        },
        sp::Expr::Like {
            negated,
            expr,
            pattern,
            escape_char,
            ..
        } => convert_like(*expr, *pattern, negated, escape_char.is_some(), false)?,
        sp::Expr::ILike {
            negated,
            expr,
            pattern,
            escape_char,
            ..
        } => convert_like(*expr, *pattern, negated, escape_char.is_some(), true)?,
        sp::Expr::Function(func) => Expr::Function(convert_function(func)?),
        sp::Expr::Cast {
            kind,
            expr,
            data_type,
            format,
            ..
        } => {
            if !matches!(kind, sp::CastKind::Cast | sp::CastKind::DoubleColon) {
                return Err(SqlError::unsupported(format!("{:?}", kind)));
            }
            if format.is_some() {
                return Err(SqlError::unsupported("CAST ... FORMAT"));
            }
            Expr::Cast {
                expr: Box::new(convert_expr(*expr)?),
                data_type: convert_data_type(&data_type)?,
            }
        }
        sp::Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            if conditions.len() != results.len() {
                return Err(SqlError::Parse("CASE branch count mismatch".to_string()));
            }
            let branches = conditions
                .into_iter()
                .zip(results)
                .map(|(c, r)| Ok((convert_expr(c)?, convert_expr(r)?)))
                .collect::<SqlResult<_>>()?;
            Expr::Case {
                operand: operand
                    .map(|o| convert_expr(*o).map(Box::new))
                    .transpose()?,
                branches,
                else_result: else_result
                    .map(|e| convert_expr(*e).map(Box::new))
                    .transpose()?,
            }
        }
        sp::Expr::Subquery(query) => Expr::Subquery(Box::new(convert_query(*query)?)),
        sp::Expr::Exists { subquery, negated } => Expr::Exists {
            query: Box::new(convert_query(*subquery)?),
            negated,
        },
        other => return Err(SqlError::unsupported(format!("expression {}", other))),
    };
    Ok(expr)
}

fn convert_like(
    expr: sp::Expr,
    pattern: sp::Expr,
    negated: bool,
    has_escape: bool,
    case_insensitive: bool,
) -> SqlResult<Expr> {
    if has_escape {
        return Err(SqlError::unsupported("LIKE ... ESCAPE"));
    }
    Ok(Expr::Like {
        expr: Box::new(convert_expr(expr)?),
        pattern: Box::new(convert_expr(pattern)?),
        negated,
        case_insensitive,
    })
}

/// Known operator, or the name parts of an operator without built-in meaning
fn convert_binary_op(op: sp::BinaryOperator) -> SqlResult<Result<BinaryOp, Vec<String>>> {
    let op = match op {
        sp::BinaryOperator::Eq => BinaryOp::Eq,
        sp::BinaryOperator::NotEq => BinaryOp::NotEq,
        sp::BinaryOperator::Lt => BinaryOp::Lt,
        sp::BinaryOperator::LtEq => BinaryOp::LtEq,
        sp::BinaryOperator::Gt => BinaryOp::Gt,
        sp::BinaryOperator::GtEq => BinaryOp::GtEq,
        sp::BinaryOperator::And => BinaryOp::And,
        sp::BinaryOperator::Or => BinaryOp::Or,
        sp::BinaryOperator::Plus => BinaryOp::Add,
        sp::BinaryOperator::Minus => BinaryOp::Sub,
        sp::BinaryOperator::Multiply => BinaryOp::Mul,
        sp::BinaryOperator::Divide => BinaryOp::Div,
        sp::BinaryOperator::Modulo => BinaryOp::Mod,
        sp::BinaryOperator::StringConcat => BinaryOp::Concat,
        sp::BinaryOperator::PGCustomBinaryOperator(parts) => return Ok(Err(parts)),
        sp::BinaryOperator::Custom(name) => return Ok(Err(vec![name])),
        other => return Err(SqlError::unsupported(format!("operator {}", other))),
    };
    Ok(Ok(op))
}

fn convert_value(value: sp::Value) -> SqlResult<Expr> {
    let literal = match value {
        sp::Value::Null => Literal::Null,
        sp::Value::Boolean(b) => Literal::Boolean(b),
        sp::Value::SingleQuotedString(s) => Literal::String(s),
        sp::Value::Number(n, _) => {
            if n.contains(['.', 'e', 'E']) {
                return Err(SqlError::unsupported("floating point literals"));
            }
            let value = n
                .parse::<i64>()
                .map_err(|_| SqlError::unsupported(format!("integer literal {} out of range", n)))?;
            Literal::Integer(value)
        }
        sp::Value::Placeholder(p) => return Ok(convert_placeholder(p)),
        other => return Err(SqlError::unsupported(format!("literal {}", other))),
    };
    Ok(Expr::Literal(literal))
}

/// `@name` is the sign form of a named parameter: the `@` prefix operator
/// applied to the parameter name. Every other spelling stays a raw
/// placeholder for the parameter resolver to judge.
fn convert_placeholder(raw: String) -> Expr {
    match raw.strip_prefix('@') {
        Some(name) if !name.is_empty() && !name.starts_with('@') => Expr::Operator {
            op: vec!["@".to_string()],
            left: None,
            right: Box::new(Expr::column(name.to_lowercase())),
        },
        _ => Expr::Placeholder(raw),
    }
}

fn convert_function(func: sp::Function) -> SqlResult<FunctionCall> {
    let sp::Function {
        name,
        args,
        filter,
        over,
        ..
    } = func;

    let mut parts = name.0.iter().map(ident).collect::<SqlResult<Vec<_>>>()?;
    let (schema, name) = match parts.len() {
        1 => (None, parts.remove(0)),
        2 => {
            let name = parts.remove(1);
            (Some(parts.remove(0)), name)
        }
        _ => return Err(SqlError::unsupported("function names with more than one qualifier")),
    };

    let mut call = FunctionCall {
        schema,
        name,
        args: Vec::new(),
        distinct: false,
        star: false,
        filter: None,
        over: None,
    };

    match args {
        sp::FunctionArguments::None => {}
        sp::FunctionArguments::Subquery(_) => {
            return Err(SqlError::unsupported("subquery as function arguments"))
        }
        sp::FunctionArguments::List(list) => {
            if !list.clauses.is_empty() {
                return Err(SqlError::unsupported("function argument clauses"));
            }
            call.distinct = matches!(
                list.duplicate_treatment,
                Some(sp::DuplicateTreatment::Distinct)
            );
            for arg in list.args {
                match arg {
                    sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Expr(expr)) => {
                        call.args.push(convert_expr(expr)?)
                    }
                    sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Wildcard) => call.star = true,
                    _ => {
                        return Err(SqlError::unsupported(
                            "named or qualified wildcard function arguments",
                        ))
                    }
                }
            }
            if call.star && !call.args.is_empty() {
                return Err(SqlError::unsupported("* mixed with other function arguments"));
            }
        }
    }

    call.filter = filter
        .map(|f| convert_expr(*f).map(Box::new))
        .transpose()?;
    call.over = match over {
        None => None,
        Some(sp::WindowType::NamedWindow(name)) => Some(Over::Named(ident(&name)?)),
        Some(sp::WindowType::WindowSpec(spec)) => Some(Over::Spec(convert_window_spec(spec)?)),
    };
    Ok(call)
}

fn convert_data_type(data_type: &sp::DataType) -> SqlResult<DataType> {
    let dt = match data_type {
        sp::DataType::Boolean | sp::DataType::Bool => DataType::Boolean,
        sp::DataType::SmallInt(_) | sp::DataType::Int2(_) => DataType::SmallInt,
        sp::DataType::Int(_) | sp::DataType::Integer(_) | sp::DataType::Int4(_) => DataType::Int,
        sp::DataType::BigInt(_) | sp::DataType::Int8(_) => DataType::BigInt,
        sp::DataType::Real | sp::DataType::Float4 => DataType::Float,
        sp::DataType::DoublePrecision | sp::DataType::Float8 => DataType::Double,
        sp::DataType::Varchar(len) => match len {
            Some(sp::CharacterLength::IntegerLength { length, .. }) => {
                let length = u32::try_from(*length)
                    .map_err(|_| SqlError::unsupported("VARCHAR length out of range"))?;
                DataType::Varchar(length)
            }
            _ => DataType::Text,
        },
        sp::DataType::Text => DataType::Text,
        sp::DataType::Bytea => DataType::Blob,
        sp::DataType::Timestamp(_, _) => DataType::Timestamp,
        other => return Err(SqlError::unsupported(format!("type {}", other))),
    };
    Ok(dt)
}

/// Single-part object name (tables, assignment targets)
fn object_name(name: sp::ObjectName) -> SqlResult<String> {
    let mut parts = name.0;
    if parts.len() != 1 {
        return Err(SqlError::unsupported("schema-qualified names"));
    }
    ident(&parts.remove(0))
}

/// Normalize an identifier: unquoted names fold to lower case, quoted names
/// keep their case. Identifiers containing a double quote are refused since
/// the canonical renderer does not escape them.
fn ident(id: &sp::Ident) -> SqlResult<String> {
    if id.value.contains('"') {
        return Err(SqlError::unsupported(
            "identifiers containing a double quote",
        ));
    }
    match id.quote_style {
        None => Ok(id.value.to_lowercase()),
        Some('"') => Ok(id.value.clone()),
        Some(_) => Err(SqlError::unsupported("identifier quoting style")),
    }
}
