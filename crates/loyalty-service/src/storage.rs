//! SQLite storage for customers and purchases

use crate::models::{Customer, Dashboard, NewCustomer, Purchase, PurchaseReceipt};
use crate::schema;
use chrono::Utc;
use loyalty_common::{Amount, CustomerId, DuplicateField, Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempts at a write transaction before giving up with a conflict
pub const MAX_WRITE_ATTEMPTS: usize = 5;

/// How long a writer waits for the database lock before reporting a conflict
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Storage backend for customers and purchases
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open (creating if needed) the database and apply the schema
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(classify)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        // Every connection to an in-memory database is its own database
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(classify)?;

        info!("Connected to database at {}", database_url);

        let storage = Self::from_pool(pool);
        storage.init().await?;
        Ok(storage)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they don't exist
    pub async fn init(&self) -> Result<()> {
        for statement in schema::ALL {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(classify)?;
        }
        Ok(())
    }

    /// Register a new customer and return the assigned identifier.
    ///
    /// The identifier is `count + 1` read inside the inserting transaction. A
    /// concurrent registration that took the same identifier makes the insert
    /// hit the UNIQUE constraint, in which case the whole transaction is retried.
    pub async fn register_customer(&self, customer: &NewCustomer) -> Result<CustomerId> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            match self.try_register(customer).await {
                Err(Error::DuplicateCustomer {
                    field: DuplicateField::CustomerId,
                })
                | Err(Error::TransactionConflict) => {
                    warn!(
                        "Identifier allocation conflict (attempt {}/{}), retrying",
                        attempt, MAX_WRITE_ATTEMPTS
                    );
                }
                other => return other,
            }
        }

        Err(Error::TransactionConflict)
    }

    async fn try_register(&self, customer: &NewCustomer) -> Result<CustomerId> {
        let mut tx = self.begin_write().await?;

        if let Some(field) = find_conflict(&mut tx, customer).await? {
            debug!("Registration rejected, {} already in use", field);
            return Err(Error::DuplicateCustomer { field });
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&mut *tx)
            .await
            .map_err(classify)?;
        let customer_id = CustomerId::from_sequence(count as u64 + 1)?;

        sqlx::query(
            "INSERT INTO customers (customer_id, name, phone, email, points) \
             VALUES (?, ?, ?, ?, 0)",
        )
        .bind(customer_id.as_str())
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(&customer.email)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;

        info!("Registered customer: {}", customer_id);
        Ok(customer_id)
    }

    /// Record a purchase and credit its points in one transaction
    pub async fn record_purchase(
        &self,
        customer_id: &CustomerId,
        amount: Amount,
    ) -> Result<PurchaseReceipt> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            match self.try_record_purchase(customer_id, amount).await {
                Err(Error::TransactionConflict) => {
                    warn!(
                        "Purchase for {} hit a write conflict (attempt {}/{}), retrying",
                        customer_id, attempt, MAX_WRITE_ATTEMPTS
                    );
                }
                other => return other,
            }
        }

        Err(Error::TransactionConflict)
    }

    async fn try_record_purchase(
        &self,
        customer_id: &CustomerId,
        amount: Amount,
    ) -> Result<PurchaseReceipt> {
        let mut tx = self.begin_write().await?;

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM customers WHERE customer_id = ?")
                .bind(customer_id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(classify)?;
        if exists.is_none() {
            return Err(Error::CustomerNotFound(customer_id.to_string()));
        }

        let points = amount.points();

        sqlx::query(
            "INSERT INTO purchases (customer_id, amount_minor, points_earned, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(customer_id.as_str())
        .bind(amount.minor())
        .bind(points)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        let total_points: i64 = sqlx::query_scalar(
            "UPDATE customers SET points = points + ? WHERE customer_id = ? RETURNING points",
        )
        .bind(points)
        .bind(customer_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;

        info!(
            "Purchase of {} for {}: +{} points, total {}",
            amount, customer_id, points, total_points
        );

        Ok(PurchaseReceipt {
            points_added: points,
            total_points,
        })
    }

    /// Start a transaction that takes the write lock up front, so concurrent
    /// writers wait out the busy timeout instead of failing on lock upgrade
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(classify)
    }

    /// Get a customer by business identifier
    pub async fn find_customer(&self, customer_id: &CustomerId) -> Result<Option<Customer>> {
        let mut conn = self.pool.acquire().await.map_err(classify)?;
        fetch_customer(&mut conn, customer_id).await
    }

    /// Customer profile plus purchases, oldest first
    pub async fn dashboard(&self, customer_id: &CustomerId) -> Result<Dashboard> {
        // Read both in one transaction so the balance matches the listed purchases
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let customer = fetch_customer(&mut tx, customer_id)
            .await?
            .ok_or_else(|| Error::CustomerNotFound(customer_id.to_string()))?;

        let purchases: Vec<Purchase> = sqlx::query_as(
            "SELECT id, customer_id, amount_minor, points_earned, created_at \
             FROM purchases WHERE customer_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(customer_id.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;

        debug!(
            "Loaded dashboard for {} with {} purchases",
            customer_id,
            purchases.len()
        );

        Ok(Dashboard {
            customer,
            purchases,
        })
    }

    /// Total number of registered customers
    pub async fn count_customers(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await
            .map_err(classify)
    }

    /// Total number of recorded purchases
    pub async fn count_purchases(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM purchases")
            .fetch_one(&self.pool)
            .await
            .map_err(classify)
    }
}

async fn fetch_customer(
    conn: &mut SqliteConnection,
    customer_id: &CustomerId,
) -> Result<Option<Customer>> {
    sqlx::query_as(
        "SELECT id, customer_id, name, phone, email, points \
         FROM customers WHERE customer_id = ?",
    )
    .bind(customer_id.as_str())
    .fetch_optional(conn)
    .await
    .map_err(classify)
}

/// Which unique field of `customer` is already taken, phone checked first
async fn find_conflict(
    conn: &mut SqliteConnection,
    customer: &NewCustomer,
) -> Result<Option<DuplicateField>> {
    let phone_taken: i64 =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM customers WHERE phone = ?)")
            .bind(&customer.phone)
            .fetch_one(&mut *conn)
            .await
            .map_err(classify)?;
    if phone_taken != 0 {
        return Ok(Some(DuplicateField::Phone));
    }

    let email_taken: i64 =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM customers WHERE email = ?)")
            .bind(&customer.email)
            .fetch_one(&mut *conn)
            .await
            .map_err(classify)?;
    if email_taken != 0 {
        return Ok(Some(DuplicateField::Email));
    }

    Ok(None)
}

/// Map a store error onto the domain error kinds
fn classify(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let message = db.message();
            let field = if message.contains("customers.phone") {
                DuplicateField::Phone
            } else if message.contains("customers.email") {
                DuplicateField::Email
            } else {
                DuplicateField::CustomerId
            };
            return Error::DuplicateCustomer { field };
        }

        // Extended result codes keep the primary code in the low byte
        let primary = db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| code & 0xff);
        if matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED)) {
            return Error::TransactionConflict;
        }
    }

    Error::Storage(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn get_test_storage() -> Storage {
        Storage::connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory database")
    }

    /// File-backed database so the pool really hands out parallel connections
    async fn get_file_storage() -> (TempDir, Storage) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("loyalty.db").display()
        );
        let storage = Storage::connect(&url)
            .await
            .expect("Failed to open file database");
        (dir, storage)
    }

    fn customer(n: u32) -> NewCustomer {
        NewCustomer::new(
            &format!("Customer {n}"),
            &format!("555-{n:04}"),
            &format!("customer{n}@example.com"),
        )
        .unwrap()
    }

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_identifiers_are_sequential() {
        let storage = get_test_storage().await;

        for n in 1..=12 {
            let id = storage.register_customer(&customer(n)).await.unwrap();
            assert_eq!(id, CustomerId::from_sequence(n as u64).unwrap());
        }

        assert_eq!(storage.count_customers().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_new_customer_starts_with_zero_points() {
        let storage = get_test_storage().await;
        let id = storage.register_customer(&customer(1)).await.unwrap();

        let stored = storage.find_customer(&id).await.unwrap().unwrap();
        assert_eq!(stored.points, 0);
        assert_eq!(stored.name, "Customer 1");
    }

    #[tokio::test]
    async fn test_duplicate_phone_or_email_rejected() {
        let storage = get_test_storage().await;
        storage.register_customer(&customer(1)).await.unwrap();

        let same_phone = NewCustomer::new("Other", "555-0001", "other@example.com").unwrap();
        let err = storage.register_customer(&same_phone).await.unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateCustomer {
                field: DuplicateField::Phone
            }
        ));

        let same_email = NewCustomer::new("Other", "555-9999", "customer1@example.com").unwrap();
        let err = storage.register_customer(&same_email).await.unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateCustomer {
                field: DuplicateField::Email
            }
        ));

        assert_eq!(storage.count_customers().await.unwrap(), 1);

        // The rejected attempts must not consume identifiers
        let next = storage.register_customer(&customer(2)).await.unwrap();
        assert_eq!(next.as_str(), "TNM00002");
    }

    #[tokio::test]
    async fn test_purchase_accrues_floor_of_amount() {
        let storage = get_test_storage().await;
        let id = storage.register_customer(&customer(1)).await.unwrap();

        let amounts = ["19.99", "5.50", "0.99", "100", "42.01"];
        let mut expected_total = 0;
        for a in amounts {
            let receipt = storage.record_purchase(&id, amount(a)).await.unwrap();
            expected_total += amount(a).points();
            assert_eq!(receipt.points_added, amount(a).points());
            assert_eq!(receipt.total_points, expected_total);
        }

        let dashboard = storage.dashboard(&id).await.unwrap();
        assert_eq!(dashboard.customer.points, 19 + 5 + 100 + 42);
        assert_eq!(dashboard.purchases.len(), amounts.len());
        for (purchase, a) in dashboard.purchases.iter().zip(amounts) {
            assert_eq!(purchase.amount, amount(a));
            assert_eq!(purchase.points_earned, amount(a).points());
        }
    }

    #[tokio::test]
    async fn test_purchase_for_unknown_customer_changes_nothing() {
        let storage = get_test_storage().await;
        let known = storage.register_customer(&customer(1)).await.unwrap();
        let unknown = CustomerId::parse("TNM00099").unwrap();

        let err = storage
            .record_purchase(&unknown, amount("10.00"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CustomerNotFound(id) if id == "TNM00099"));

        assert_eq!(storage.count_purchases().await.unwrap(), 0);
        let dashboard = storage.dashboard(&known).await.unwrap();
        assert_eq!(dashboard.customer.points, 0);
    }

    #[tokio::test]
    async fn test_dashboard_without_purchases() {
        let storage = get_test_storage().await;
        let id = storage.register_customer(&customer(1)).await.unwrap();

        let dashboard = storage.dashboard(&id).await.unwrap();
        assert!(dashboard.purchases.is_empty());
        assert_eq!(dashboard.customer.points, 0);
        assert_eq!(dashboard.customer.customer_id, id);
    }

    #[tokio::test]
    async fn test_dashboard_unknown_customer() {
        let storage = get_test_storage().await;
        let err = storage
            .dashboard(&CustomerId::parse("TNM00001").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CustomerNotFound(_)));
    }

    #[tokio::test]
    async fn test_alice_scenario() {
        let storage = get_test_storage().await;
        let alice = NewCustomer::new("Alice", "555-0001", "alice@example.com").unwrap();

        let id = storage.register_customer(&alice).await.unwrap();
        assert_eq!(id.as_str(), "TNM00001");

        let first = storage.record_purchase(&id, amount("19.99")).await.unwrap();
        assert_eq!(first.points_added, 19);
        assert_eq!(first.total_points, 19);

        let second = storage.record_purchase(&id, amount("5.50")).await.unwrap();
        assert_eq!(second.points_added, 5);
        assert_eq!(second.total_points, 24);

        let dashboard = storage.dashboard(&id).await.unwrap();
        assert_eq!(dashboard.purchases.len(), 2);
        assert_eq!(dashboard.customer.points, 24);
        assert_eq!(dashboard.purchases[0].amount, amount("19.99"));
        assert_eq!(dashboard.purchases[1].amount, amount("5.50"));
    }

    #[tokio::test]
    async fn test_dashboard_is_idempotent() {
        let storage = get_test_storage().await;
        let id = storage.register_customer(&customer(1)).await.unwrap();
        storage.record_purchase(&id, amount("12.34")).await.unwrap();
        storage.record_purchase(&id, amount("7")).await.unwrap();

        let first = storage.dashboard(&id).await.unwrap();
        let second = storage.dashboard(&id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_purchases_do_not_lose_points() {
        let (_dir, storage) = get_file_storage().await;
        let storage = Arc::new(storage);
        let id = storage.register_customer(&customer(1)).await.unwrap();

        let handles: Vec<_> = (1..=40)
            .map(|n| {
                let storage = Arc::clone(&storage);
                let id = id.clone();
                tokio::spawn(async move {
                    storage
                        .record_purchase(&id, Amount::from_minor(n * 100 + 50).unwrap())
                        .await
                })
            })
            .collect();

        let mut credited = 0;
        for handle in handles {
            let receipt = handle
                .await
                .unwrap()
                .expect("every concurrent purchase should commit");
            credited += receipt.points_added;
        }

        let expected: i64 = (1..=40).sum();
        assert_eq!(credited, expected);

        let dashboard = storage.dashboard(&id).await.unwrap();
        assert_eq!(dashboard.purchases.len(), 40);
        assert_eq!(dashboard.customer.points, expected);
        assert_eq!(storage.count_purchases().await.unwrap(), 40);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_registrations_get_distinct_identifiers() {
        let (_dir, storage) = get_file_storage().await;
        let storage = Arc::new(storage);

        let handles: Vec<_> = (1..=16)
            .map(|n| {
                let storage = Arc::clone(&storage);
                tokio::spawn(async move { storage.register_customer(&customer(n)).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(
                handle
                    .await
                    .unwrap()
                    .expect("every concurrent registration should commit"),
            );
        }
        ids.sort();

        let expected: Vec<_> = (1..=16)
            .map(|n| CustomerId::from_sequence(n).unwrap())
            .collect();
        assert_eq!(ids, expected);
        assert_eq!(storage.count_customers().await.unwrap(), 16);
    }
}
