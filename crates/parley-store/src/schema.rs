/// SQL DDL for the message log.
///
/// One untyped append-only table, created if absent at startup. There is no
/// version table and no migration machinery; the table shape is fixed.
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    ip TEXT,
    content TEXT,
    sender TEXT
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
