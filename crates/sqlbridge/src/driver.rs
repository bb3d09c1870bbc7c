//! Supported drivers and their SQL dialect.

use crate::error::{BridgeError, BridgeResult};
use crate::value::{self, Value};
use std::fmt;

/// A database driver the crate knows how to build SQL for.
///
/// Each variant selects the dialect the query builder renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    /// MySQL / MariaDB (backtick identifiers, `?` placeholders).
    MySql,
}

impl Driver {
    /// Every driver this build can emit SQL for.
    pub const ALL: &'static [Driver] = &[Driver::MySql];

    /// Parse a driver tag such as `"mysql"`.
    pub fn from_tag(tag: &str) -> BridgeResult<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Driver::MySql),
            other => Err(BridgeError::config(format!(
                "Invalid driver or driver not supported: '{other}'. Known drivers: {}",
                join_tags(Self::ALL)
            ))),
        }
    }

    /// The tag used in connection strings.
    pub fn tag(self) -> &'static str {
        match self {
            Driver::MySql => "mysql",
        }
    }

    /// Quote a (possibly dotted) identifier.
    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            Driver::MySql => ident
                .split('.')
                .map(|part| format!("`{}`", part.replace('`', "``")))
                .collect::<Vec<_>>()
                .join("."),
        }
    }

    /// Quote `table` when it is a plain (possibly dotted) identifier; pass
    /// aliases, joins and already quoted references through unchanged.
    pub fn quote_table_ref(self, table: &str) -> String {
        let plain = table.split('.').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        });
        if plain {
            self.quote_ident(table)
        } else {
            table.to_string()
        }
    }

    /// Render a value as a literal of this dialect.
    pub fn literal(self, value: &Value) -> String {
        match self {
            Driver::MySql => value::render_literal(value),
        }
    }

    /// Substitute bound values into `sql` as literals.
    pub fn substitute(self, sql: &str, values: &[Value]) -> String {
        match self {
            Driver::MySql => value::substitute_placeholders(sql, values),
        }
    }

    /// Key a SELECT result by its text and values. Distinct value lists
    /// always give distinct keys.
    pub fn cache_key(self, sql: &str, values: &[Value]) -> String {
        match self {
            Driver::MySql => value::cache_key(sql, values),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

pub(crate) fn join_tags(drivers: &[Driver]) -> String {
    if drivers.is_empty() {
        return "(none)".to_string();
    }
    drivers
        .iter()
        .map(|d| d.tag())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tags() {
        assert_eq!(Driver::from_tag("mysql").unwrap(), Driver::MySql);
        assert_eq!(Driver::from_tag(" MySQL ").unwrap(), Driver::MySql);
        assert!(Driver::from_tag("oracle").unwrap_err().is_config());
    }

    #[test]
    fn quotes_identifiers_per_segment() {
        let d = Driver::MySql;
        assert_eq!(d.quote_ident("users"), "`users`");
        assert_eq!(d.quote_ident("app.users"), "`app`.`users`");
        assert_eq!(d.quote_ident("we`ird"), "`we``ird`");
    }

    #[test]
    fn quotes_only_plain_table_references() {
        let d = Driver::MySql;
        assert_eq!(d.quote_table_ref("users"), "`users`");
        assert_eq!(d.quote_table_ref("app.users"), "`app`.`users`");
        assert_eq!(d.quote_table_ref("users u"), "users u");
        assert_eq!(
            d.quote_table_ref("users JOIN roles ON roles.id = users.role_id"),
            "users JOIN roles ON roles.id = users.role_id"
        );
        assert_eq!(d.quote_table_ref("`app`.`users`"), "`app`.`users`");
    }
}
