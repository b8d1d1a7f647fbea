//! Checks that formatter output is SQL the target engine would accept.

use sqlparser::parser::Parser;

use super::dialect::Dialect;

/// Panics unless `sql` parses as exactly one statement under `dialect`.
#[track_caller]
pub fn assert_reparses(sql: &str, dialect: Dialect) {
    match Parser::parse_sql(&*dialect.parser_dialect(), sql) {
        Ok(statements) => assert_eq!(statements.len(), 1, "{} statements in: {}", statements.len(), sql),
        Err(e) => panic!("{} rejects {}: {}", dialect, sql, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_dialect_quoting() {
        assert_reparses("SELECT \"id\" FROM \"users\"", Dialect::Postgres);
        assert_reparses("SELECT `id` FROM `users` LIMIT 18446744073709551615 OFFSET 2", Dialect::MySql);
        assert_reparses("SELECT `id` FROM `users` LIMIT -1 OFFSET 2", Dialect::Sqlite);
    }

    #[test]
    #[should_panic(expected = "rejects")]
    fn test_rejects_garbage() {
        assert_reparses("SELEC * FORM users", Dialect::Generic);
    }
}
