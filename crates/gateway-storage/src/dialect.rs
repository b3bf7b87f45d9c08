/// Portable-SQL seam between `ConfigStore`/session and memory DAOs and the
/// concrete database. The core only ever emits placeholders, quoted
/// identifiers and a current-time function through this trait, so a
/// Postgres or MySQL `Dialect` could be added later without touching any
/// SQL-building code elsewhere in this crate (spec §6's "three backends"
/// requirement). Only the embedded SQLite dialect ships a concrete
/// implementation in this repository — see DESIGN.md for why server
/// dialects are not fabricated here.
pub trait Dialect: Send + Sync {
    /// Positional placeholder for the `n`-th (1-indexed) bound parameter.
    fn placeholder(&self, n: usize) -> String;

    /// Quotes an identifier (table/column name) for safe interpolation into
    /// generated SQL.
    fn quote_ident(&self, ident: &str) -> String;

    /// SQL expression for "now" in this dialect's native representation.
    fn current_time_fn(&self) -> &'static str;

    /// Name of the clause used to atomically insert-or-replace a row keyed
    /// by a unique constraint. SQLite and MySQL spell this differently from
    /// Postgres (`ON CONFLICT ... DO UPDATE`).
    fn upsert_conflict_clause(&self) -> &'static str;
}

/// The only dialect this repository ships a concrete binding for: the
/// embedded, file-based backend (`rusqlite`/`tokio-rusqlite`), per spec §6.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn placeholder(&self, n: usize) -> String {
        format!("?{n}")
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn current_time_fn(&self) -> &'static str {
        "strftime('%Y-%m-%dT%H:%M:%fZ','now')"
    }

    fn upsert_conflict_clause(&self) -> &'static str {
        "ON CONFLICT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_dialect_placeholders_are_one_indexed() {
        let d = SqliteDialect;
        assert_eq!(d.placeholder(1), "?1");
        assert_eq!(d.placeholder(3), "?3");
    }

    #[test]
    fn sqlite_dialect_quotes_and_escapes_identifiers() {
        let d = SqliteDialect;
        assert_eq!(d.quote_ident("provider_configs"), "\"provider_configs\"");
        assert_eq!(d.quote_ident("weird\"name"), "\"weird\"\"name\"");
    }
}
