//! Canonical SQL rendering
//!
//! Every replica must produce the same bytes for the same statement, so the
//! output format is fixed:
//!
//! - tokens are separated by exactly one space
//! - identifiers are always double quoted (never escaped; the parser refuses
//!   identifiers containing `"`)
//! - keywords are upper case, function names lower case and unquoted
//! - lists go through [`SqlWriter::write_list`], which places a comma token
//!   between elements by index
//! - bind parameters render as `$<ordinal>`
//!
//! ```text
//! ( "orders" , "items" )
//! ```

use crate::sql::ast::*;

/// Token-oriented SQL text builder
#[derive(Debug, Default)]
pub struct SqlWriter {
    buf: String,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    /// Append one token, separated from the previous one by a single space
    pub fn token(&mut self, token: &str) {
        if !self.buf.is_empty() {
            self.buf.push(' ');
        }
        self.buf.push_str(token);
    }

    /// Append a keyword (callers pass upper case)
    pub fn keyword(&mut self, keyword: &str) {
        self.token(keyword);
    }

    /// Append a double-quoted identifier
    pub fn ident(&mut self, name: &str) {
        self.token(&quote(name));
    }

    /// Append `"relation"."name"` (or `"name"`) as a single token
    pub fn qualified(&mut self, relation: Option<&str>, name: &str) {
        match relation {
            Some(rel) => self.token(&format!("{}.{}", quote(rel), quote(name))),
            None => self.ident(name),
        }
    }

    /// Append a single-quoted string literal, doubling embedded quotes
    pub fn string_literal(&mut self, value: &str) {
        self.token(&format!("'{}'", value.replace('\'', "''")));
    }

    /// Render `len` elements with a comma token between them
    pub fn write_list<F>(&mut self, len: usize, mut element: F)
    where
        F: FnMut(&mut Self, usize),
    {
        for i in 0..len {
            if i > 0 {
                self.token(",");
            }
            element(self, i);
        }
    }

    /// [`write_list`](Self::write_list) wrapped in parenthesis tokens
    pub fn paren_list<F>(&mut self, len: usize, element: F)
    where
        F: FnMut(&mut Self, usize),
    {
        self.token("(");
        self.write_list(len, element);
        self.token(")");
    }

    /// Render a node in place
    pub fn write<T: ToSql + ?Sized>(&mut self, node: &T) {
        node.write_sql(self);
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Types with a canonical SQL rendering
pub trait ToSql {
    fn write_sql(&self, w: &mut SqlWriter);

    fn to_sql(&self) -> String {
        let mut w = SqlWriter::new();
        self.write_sql(&mut w);
        w.finish()
    }
}

impl ToSql for Statement {
    fn write_sql(&self, w: &mut SqlWriter) {
        match self {
            Statement::Query(query) => query.write_sql(w),
            Statement::Insert(insert) => insert.write_sql(w),
            Statement::Update(update) => update.write_sql(w),
            Statement::Delete(delete) => delete.write_sql(w),
        }
    }
}

impl ToSql for Query {
    fn write_sql(&self, w: &mut SqlWriter) {
        if !self.ctes.is_empty() {
            w.keyword("WITH");
            w.write_list(self.ctes.len(), |w, i| {
                let cte = &self.ctes[i];
                w.ident(&cte.name);
                w.keyword("AS");
                w.token("(");
                cte.query.write_sql(w);
                w.token(")");
            });
        }
        self.body.write_sql(w);
        if !self.order_by.is_empty() {
            w.keyword("ORDER BY");
            w.write_list(self.order_by.len(), |w, i| self.order_by[i].write_sql(w));
        }
        if let Some(limit) = &self.limit {
            w.keyword("LIMIT");
            limit.write_sql(w);
        }
        if let Some(offset) = &self.offset {
            w.keyword("OFFSET");
            offset.write_sql(w);
        }
    }
}

impl ToSql for SetExpr {
    fn write_sql(&self, w: &mut SqlWriter) {
        match self {
            SetExpr::Select(select) => select.write_sql(w),
            SetExpr::SetOperation {
                op,
                all,
                left,
                right,
            } => {
                left.write_sql(w);
                w.keyword(op.as_str());
                if *all {
                    w.keyword("ALL");
                }
                right.write_sql(w);
            }
            SetExpr::Query(query) => {
                w.token("(");
                query.write_sql(w);
                w.token(")");
            }
            SetExpr::Values(rows) => write_values(w, rows),
        }
    }
}

fn write_values(w: &mut SqlWriter, rows: &[Vec<Expr>]) {
    w.keyword("VALUES");
    w.write_list(rows.len(), |w, i| {
        let row = &rows[i];
        w.paren_list(row.len(), |w, j| row[j].write_sql(w));
    });
}

impl ToSql for Select {
    fn write_sql(&self, w: &mut SqlWriter) {
        w.keyword("SELECT");
        if self.distinct {
            w.keyword("DISTINCT");
        }
        w.write_list(self.projection.len(), |w, i| self.projection[i].write_sql(w));
        if let Some(from) = &self.from {
            w.keyword("FROM");
            from.write_sql(w);
        }
        if let Some(selection) = &self.selection {
            w.keyword("WHERE");
            selection.write_sql(w);
        }
        if !self.group_by.is_empty() {
            w.keyword("GROUP BY");
            w.write_list(self.group_by.len(), |w, i| self.group_by[i].write_sql(w));
        }
        if let Some(having) = &self.having {
            w.keyword("HAVING");
            having.write_sql(w);
        }
        if !self.windows.is_empty() {
            w.keyword("WINDOW");
            w.write_list(self.windows.len(), |w, i| {
                let def = &self.windows[i];
                w.ident(&def.name);
                w.keyword("AS");
                def.spec.write_sql(w);
            });
        }
    }
}

impl ToSql for SelectItem {
    fn write_sql(&self, w: &mut SqlWriter) {
        match self {
            SelectItem::Expr { expr, alias } => {
                expr.write_sql(w);
                if let Some(alias) = alias {
                    w.keyword("AS");
                    w.ident(alias);
                }
            }
            SelectItem::Wildcard => w.token("*"),
            SelectItem::QualifiedWildcard(relation) => w.token(&format!("{}.*", quote(relation))),
        }
    }
}

impl ToSql for FromClause {
    fn write_sql(&self, w: &mut SqlWriter) {
        self.relation.write_sql(w);
        for join in &self.joins {
            w.keyword(join.join_type.as_str());
            join.relation.write_sql(w);
            w.keyword("ON");
            join.on.write_sql(w);
        }
    }
}

impl ToSql for TableRef {
    fn write_sql(&self, w: &mut SqlWriter) {
        match self {
            TableRef::Table { name, alias } => write_table(w, name, alias.as_deref()),
            TableRef::Subquery { query, alias } => {
                w.token("(");
                query.write_sql(w);
                w.token(")");
                w.keyword("AS");
                w.ident(alias);
            }
        }
    }
}

fn write_table(w: &mut SqlWriter, name: &str, alias: Option<&str>) {
    w.ident(name);
    if let Some(alias) = alias {
        w.keyword("AS");
        w.ident(alias);
    }
}

impl ToSql for OrderByItem {
    fn write_sql(&self, w: &mut SqlWriter) {
        self.expr.write_sql(w);
        match self.asc {
            Some(true) => w.keyword("ASC"),
            Some(false) => w.keyword("DESC"),
            None => {}
        }
        match self.nulls_first {
            Some(true) => w.keyword("NULLS FIRST"),
            Some(false) => w.keyword("NULLS LAST"),
            None => {}
        }
    }
}

impl ToSql for WindowSpec {
    fn write_sql(&self, w: &mut SqlWriter) {
        w.token("(");
        if let Some(base) = &self.base {
            w.ident(base);
        }
        if !self.partition_by.is_empty() {
            w.keyword("PARTITION BY");
            w.write_list(self.partition_by.len(), |w, i| {
                self.partition_by[i].write_sql(w)
            });
        }
        if !self.order_by.is_empty() {
            w.keyword("ORDER BY");
            w.write_list(self.order_by.len(), |w, i| self.order_by[i].write_sql(w));
        }
        w.token(")");
    }
}

impl ToSql for Literal {
    fn write_sql(&self, w: &mut SqlWriter) {
        match self {
            Literal::Null => w.keyword("NULL"),
            Literal::Boolean(true) => w.keyword("TRUE"),
            Literal::Boolean(false) => w.keyword("FALSE"),
            Literal::Integer(n) => w.token(&n.to_string()),
            Literal::String(s) => w.string_literal(s),
        }
    }
}

impl ToSql for FunctionCall {
    fn write_sql(&self, w: &mut SqlWriter) {
        match &self.schema {
            Some(schema) => w.token(&format!("{}.{}", schema, self.name)),
            None => w.token(&self.name),
        }
        w.token("(");
        if self.distinct {
            w.keyword("DISTINCT");
        }
        if self.star {
            w.token("*");
        } else {
            w.write_list(self.args.len(), |w, i| self.args[i].write_sql(w));
        }
        w.token(")");
        if let Some(filter) = &self.filter {
            w.keyword("FILTER");
            w.token("(");
            w.keyword("WHERE");
            filter.write_sql(w);
            w.token(")");
        }
        match &self.over {
            Some(Over::Named(name)) => {
                w.keyword("OVER");
                w.ident(name);
            }
            Some(Over::Spec(spec)) => {
                w.keyword("OVER");
                spec.write_sql(w);
            }
            None => {}
        }
    }
}

impl ToSql for Expr {
    fn write_sql(&self, w: &mut SqlWriter) {
        match self {
            Expr::Column { relation, name } => w.qualified(relation.as_deref(), name),
            Expr::Literal(lit) => lit.write_sql(w),
            Expr::Placeholder(raw) => w.token(raw),
            Expr::Parameter(ordinal) => w.token(&format!("${}", ordinal)),
            Expr::BinaryOp { left, op, right } => {
                left.write_sql(w);
                w.token(op.as_str());
                right.write_sql(w);
            }
            Expr::UnaryOp { op, expr } => {
                w.token(op.as_str());
                expr.write_sql(w);
            }
            Expr::Operator { op, left, right } => {
                if let Some(left) = left {
                    left.write_sql(w);
                }
                w.token(&op.concat());
                right.write_sql(w);
            }
            Expr::Function(call) => call.write_sql(w),
            Expr::IsNull { expr, negated } => {
                expr.write_sql(w);
                w.keyword(if *negated { "IS NOT NULL" } else { "IS NULL" });
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                expr.write_sql(w);
                if *negated {
                    w.keyword("NOT");
                }
                w.keyword("IN");
                w.paren_list(list.len(), |w, i| list[i].write_sql(w));
            }
            Expr::InSubquery {
                expr,
                query,
                negated,
            } => {
                expr.write_sql(w);
                if *negated {
                    w.keyword("NOT");
                }
                w.keyword("IN");
                w.token("(");
                query.write_sql(w);
                w.token(")");
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                expr.write_sql(w);
                if *negated {
                    w.keyword("NOT");
                }
                w.keyword("BETWEEN");
                low.write_sql(w);
                w.keyword("AND");
                high.write_sql(w);
            }
            Expr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
            } => {
                expr.write_sql(w);
                if *negated {
                    w.keyword("NOT");
                }
                w.keyword(if *case_insensitive { "ILIKE" } else { "LIKE" });
                pattern.write_sql(w);
            }
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                w.keyword("CASE");
                if let Some(operand) = operand {
                    operand.write_sql(w);
                }
                for (when, then) in branches {
                    w.keyword("WHEN");
                    when.write_sql(w);
                    w.keyword("THEN");
                    then.write_sql(w);
                }
                if let Some(else_result) = else_result {
                    w.keyword("ELSE");
                    else_result.write_sql(w);
                }
                w.keyword("END");
            }
            Expr::Cast { expr, data_type } => {
                w.keyword("CAST");
                w.token("(");
                expr.write_sql(w);
                w.keyword("AS");
                w.keyword(&data_type.sql_name());
                w.token(")");
            }
            Expr::Subquery(query) => {
                w.token("(");
                query.write_sql(w);
                w.token(")");
            }
            Expr::Exists { query, negated } => {
                if *negated {
                    w.keyword("NOT");
                }
                w.keyword("EXISTS");
                w.token("(");
                query.write_sql(w);
                w.token(")");
            }
            Expr::Nested(inner) => {
                w.token("(");
                inner.write_sql(w);
                w.token(")");
            }
        }
    }
}

fn write_assignments(w: &mut SqlWriter, assignments: &[Assignment]) {
    w.keyword("SET");
    w.write_list(assignments.len(), |w, i| {
        w.ident(&assignments[i].column);
        w.token("=");
        assignments[i].value.write_sql(w);
    });
}

impl ToSql for Insert {
    fn write_sql(&self, w: &mut SqlWriter) {
        w.keyword("INSERT INTO");
        write_table(w, &self.table, self.alias.as_deref());
        if !self.columns.is_empty() {
            w.paren_list(self.columns.len(), |w, i| w.ident(&self.columns[i]));
        }
        match &self.source {
            InsertSource::Values(rows) => write_values(w, rows),
            InsertSource::Query(query) => query.write_sql(w),
        }
        if let Some(conflict) = &self.on_conflict {
            w.keyword("ON CONFLICT");
            if !conflict.target.is_empty() {
                w.paren_list(conflict.target.len(), |w, i| w.ident(&conflict.target[i]));
            }
            match &conflict.action {
                ConflictAction::DoNothing => w.keyword("DO NOTHING"),
                ConflictAction::DoUpdate {
                    assignments,
                    selection,
                } => {
                    w.keyword("DO UPDATE");
                    write_assignments(w, assignments);
                    if let Some(selection) = selection {
                        w.keyword("WHERE");
                        selection.write_sql(w);
                    }
                }
            }
        }
    }
}

impl ToSql for Update {
    fn write_sql(&self, w: &mut SqlWriter) {
        w.keyword("UPDATE");
        write_table(w, &self.table, self.alias.as_deref());
        write_assignments(w, &self.assignments);
        if let Some(from) = &self.from {
            w.keyword("FROM");
            from.write_sql(w);
        }
        if let Some(selection) = &self.selection {
            w.keyword("WHERE");
            selection.write_sql(w);
        }
    }
}

impl ToSql for Delete {
    fn write_sql(&self, w: &mut SqlWriter) {
        w.keyword("DELETE FROM");
        write_table(w, &self.table, self.alias.as_deref());
        if let Some(using) = &self.using {
            w.keyword("USING");
            using.write_sql(w);
        }
        if let Some(selection) = &self.selection {
            w.keyword("WHERE");
            selection.write_sql(w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::Parser;

    fn render(sql: &str) -> String {
        Parser::parse_one(sql).unwrap().to_sql()
    }

    #[test]
    fn test_paren_list_spacing() {
        let names = ["orders", "items"];
        let mut w = SqlWriter::new();
        w.paren_list(names.len(), |w, i| w.ident(names[i]));
        assert_eq!(w.finish(), r#"( "orders" , "items" )"#);
    }

    #[test]
    fn test_empty_and_single_lists() {
        let mut w = SqlWriter::new();
        w.paren_list(0, |_, _| unreachable!());
        assert_eq!(w.as_str(), "( )");

        let mut w = SqlWriter::new();
        w.write_list(1, |w, _| w.ident("only"));
        assert_eq!(w.finish(), r#""only""#);
    }

    #[test]
    fn test_string_literal_escaping() {
        let mut w = SqlWriter::new();
        w.string_literal("it's");
        assert_eq!(w.finish(), "'it''s'");
    }

    #[test]
    fn test_render_select() {
        assert_eq!(
            render("select id, name as n from users u where u.id = 1 order by name desc limit 5"),
            r#"SELECT "id" , "name" AS "n" FROM "users" AS "u" WHERE "u"."id" = 1 ORDER BY "name" DESC LIMIT 5"#
        );
    }

    #[test]
    fn test_render_functions_and_joins() {
        assert_eq!(
            render(
                "SELECT COUNT(*), Sum(DISTINCT o.total) FROM users u \
                 LEFT JOIN orders o ON u.id = o.user_id GROUP BY u.id HAVING count(*) > 1"
            ),
            r#"SELECT count ( * ) , sum ( DISTINCT "o"."total" ) FROM "users" AS "u" LEFT JOIN "orders" AS "o" ON "u"."id" = "o"."user_id" GROUP BY "u"."id" HAVING count ( * ) > 1"#
        );
    }

    #[test]
    fn test_render_preserves_parentheses() {
        assert_eq!(
            render("SELECT (a + b) * 2 FROM t WHERE NOT (a = 1 OR b IS NULL)"),
            r#"SELECT ( "a" + "b" ) * 2 FROM "t" WHERE NOT ( "a" = 1 OR "b" IS NULL )"#
        );
    }

    #[test]
    fn test_render_writes() {
        assert_eq!(
            render("insert into t (a, b) values (1, 'x'), (2, null) on conflict (a) do nothing"),
            r#"INSERT INTO "t" ( "a" , "b" ) VALUES ( 1 , 'x' ) , ( 2 , NULL ) ON CONFLICT ( "a" ) DO NOTHING"#
        );
        assert_eq!(
            render("update t set a = a + 1 from u where t.id = u.id"),
            r#"UPDATE "t" SET "a" = "a" + 1 FROM "u" WHERE "t"."id" = "u"."id""#
        );
        assert_eq!(
            render("delete from t where id in (select id from u)"),
            r#"DELETE FROM "t" WHERE "id" IN ( SELECT "id" FROM "u" )"#
        );
    }

    #[test]
    fn test_render_window_and_cast() {
        assert_eq!(
            render(
                "SELECT rank() OVER (PARTITION BY a ORDER BY b), CAST(a AS bigint) FROM t"
            ),
            r#"SELECT rank ( ) OVER ( PARTITION BY "a" ORDER BY "b" ) , CAST ( "a" AS BIGINT ) FROM "t""#
        );
    }

    #[test]
    fn test_render_is_stable() {
        let sql = "WITH x AS (SELECT a FROM t) SELECT * FROM x UNION ALL SELECT b FROM u";
        let first = render(sql);
        assert_eq!(first, render(sql));
        // Rendering is a fixed point
        assert_eq!(render(&first), first);
    }
}
