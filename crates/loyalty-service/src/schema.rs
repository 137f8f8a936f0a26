//! Table definitions, applied idempotently at startup

pub const CREATE_CUSTOMERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id TEXT    NOT NULL UNIQUE,
    name        TEXT    NOT NULL,
    phone       TEXT    NOT NULL UNIQUE,
    email       TEXT    NOT NULL UNIQUE,
    points      INTEGER NOT NULL DEFAULT 0 CHECK (points >= 0)
)
"#;

pub const CREATE_PURCHASES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS purchases (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id   TEXT    NOT NULL REFERENCES customers (customer_id),
    amount_minor  INTEGER NOT NULL CHECK (amount_minor > 0),
    points_earned INTEGER NOT NULL CHECK (points_earned >= 0),
    created_at    TEXT    NOT NULL
)
"#;

pub const CREATE_PURCHASES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_purchases_customer_created
    ON purchases (customer_id, created_at)
"#;

pub const ALL: [&str; 3] = [
    CREATE_CUSTOMERS_TABLE,
    CREATE_PURCHASES_TABLE,
    CREATE_PURCHASES_INDEX,
];
