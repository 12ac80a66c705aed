use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{
    Pool, Row, Sqlite,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow, SqliteSynchronous},
};
use uuid::Uuid;

use crate::domain::{
    Book, BookFilter, Customer, InventorySummary, LowStockEntry, OrderDetail, OrderItemDetail,
    OrderLine, OrderReceipt, OrderStatus, PriceChange, RestockOutcome,
};
use crate::error::ToolError;
use crate::seed;
use crate::session::{DEFAULT_TITLE, Message, Role, Session, SessionSummary, ToolCallRecord};

const BUSY_ATTEMPTS: u32 = 5;
const BUSY_BACKOFF_MS: u64 = 50;

#[derive(Clone)]
pub struct LibraryStore {
    pool: Pool<Sqlite>,
}

impl LibraryStore {
    pub async fn initialize(database_url: Option<String>) -> anyhow::Result<Self> {
        let url = match database_url {
            Some(u) => u,
            None => resolve_default_db_url()?,
        };
        let options = url
            .parse::<SqliteConnectOptions>()?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .foreign_keys(true);
        let pool = Pool::<Sqlite>::connect_with(options).await?;
        // busy_timeout via PRAGMA
        sqlx::query("PRAGMA busy_timeout = 5000;").execute(&pool).await?;
        // apply migrations, then seed an empty database
        sqlx::migrate!("./migrations").run(&pool).await?;
        if seed::apply_if_empty(&pool).await? {
            tracing::info!("seeded library catalog");
        }
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn find_books(&self, filter: &BookFilter) -> Result<Vec<Book>, ToolError> {
        let mut sql = String::from(
            "SELECT isbn, title, author, price_cents, stock, created_at FROM books WHERE 1=1",
        );
        if filter.title.is_some() {
            sql.push_str(" AND title LIKE ?");
        }
        if filter.author.is_some() {
            sql.push_str(" AND author LIKE ?");
        }
        if filter.min_price_cents.is_some() {
            sql.push_str(" AND price_cents >= ?");
        }
        if filter.max_price_cents.is_some() {
            sql.push_str(" AND price_cents <= ?");
        }
        if filter.min_stock.is_some() {
            sql.push_str(" AND stock >= ?");
        }
        sql.push_str(" ORDER BY title ASC");

        let mut q = sqlx::query(&sql);
        if let Some(t) = &filter.title {
            q = q.bind(format!("%{}%", t));
        }
        if let Some(a) = &filter.author {
            q = q.bind(format!("%{}%", a));
        }
        if let Some(p) = filter.min_price_cents {
            q = q.bind(p);
        }
        if let Some(p) = filter.max_price_cents {
            q = q.bind(p);
        }
        if let Some(s) = filter.min_stock {
            q = q.bind(s);
        }
        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(book_from_row).collect())
    }

    pub async fn list_books(&self) -> Result<Vec<Book>, ToolError> {
        self.find_books(&BookFilter::default()).await
    }

    #[cfg(test)]
    pub async fn get_book(&self, isbn: &str) -> Result<Option<Book>, ToolError> {
        let row = sqlx::query(
            "SELECT isbn, title, author, price_cents, stock, created_at FROM books WHERE isbn = ?1",
        )
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(book_from_row))
    }

    pub async fn create_order(
        &self,
        customer_id: i64,
        lines: &[OrderLine],
    ) -> Result<OrderReceipt, ToolError> {
        if lines.is_empty() {
            return Err(ToolError::validation("an order needs at least one item"));
        }
        for line in lines {
            if line.quantity <= 0 {
                return Err(ToolError::validation(format!(
                    "quantity for {} must be positive",
                    line.isbn
                )));
            }
        }
        retry_busy("create_order", || self.create_order_tx(customer_id, lines)).await
    }

    async fn create_order_tx(
        &self,
        customer_id: i64,
        lines: &[OrderLine],
    ) -> Result<OrderReceipt, ToolError> {
        let mut tx = self.pool.begin().await?;
        let customer = sqlx::query("SELECT name FROM customers WHERE id = ?1")
            .bind(customer_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(customer) = customer else {
            return Err(ToolError::validation(format!(
                "unknown customer id {}",
                customer_id
            )));
        };
        let customer_name: String = customer.get("name");

        let mut items = Vec::with_capacity(lines.len());
        let mut total_cents = 0i64;
        for line in lines {
            // The guard in the WHERE clause is what keeps stock from going
            // negative under concurrent orders.
            let dec =
                sqlx::query("UPDATE books SET stock = stock - ?2 WHERE isbn = ?1 AND stock >= ?2")
                    .bind(&line.isbn)
                    .bind(line.quantity)
                    .execute(&mut *tx)
                    .await?;
            if dec.rows_affected() == 0 {
                let book = sqlx::query("SELECT title, stock FROM books WHERE isbn = ?1")
                    .bind(&line.isbn)
                    .fetch_optional(&mut *tx)
                    .await?;
                return Err(match book {
                    Some(b) => ToolError::Conflict {
                        title: b.get("title"),
                        requested: line.quantity,
                        available: b.get("stock"),
                    },
                    None => ToolError::validation(format!("unknown isbn {}", line.isbn)),
                });
            }
            let book = sqlx::query("SELECT title, author, price_cents FROM books WHERE isbn = ?1")
                .bind(&line.isbn)
                .fetch_one(&mut *tx)
                .await?;
            let unit_price_cents: i64 = book.get("price_cents");
            total_cents = unit_price_cents
                .checked_mul(line.quantity)
                .and_then(|line_total| total_cents.checked_add(line_total))
                .ok_or_else(|| {
                    ToolError::validation(format!("order total for {} is out of range", line.isbn))
                })?;
            items.push(OrderItemDetail {
                isbn: line.isbn.clone(),
                title: book.get("title"),
                author: book.get("author"),
                quantity: line.quantity,
                unit_price_cents,
            });
        }

        let res = sqlx::query(
            "INSERT INTO orders (customer_id, status, total_cents, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(customer_id)
        .bind(OrderStatus::Completed.as_str())
        .bind(total_cents)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        let order_id = res.last_insert_rowid();
        for item in &items {
            sqlx::query(
                "INSERT INTO order_items (order_id, book_isbn, quantity, unit_price_cents) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(order_id)
            .bind(&item.isbn)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(OrderReceipt {
            order_id,
            customer_id,
            customer_name,
            status: OrderStatus::Completed,
            total_cents,
            items,
        })
    }

    pub async fn restock_book(
        &self,
        isbn: &str,
        quantity: i64,
    ) -> Result<RestockOutcome, ToolError> {
        if quantity <= 0 {
            return Err(ToolError::validation("restock quantity must be positive"));
        }
        retry_busy("restock_book", || self.restock_tx(isbn, quantity)).await
    }

    async fn restock_tx(&self, isbn: &str, quantity: i64) -> Result<RestockOutcome, ToolError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT title, stock FROM books WHERE isbn = ?1")
            .bind(isbn)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(ToolError::validation(format!("unknown isbn {}", isbn)));
        };
        let previous_stock: i64 = row.get("stock");
        let Some(new_stock) = previous_stock.checked_add(quantity) else {
            return Err(ToolError::validation("restock would push stock out of range"));
        };
        sqlx::query("UPDATE books SET stock = stock + ?2 WHERE isbn = ?1")
            .bind(isbn)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(RestockOutcome {
            isbn: isbn.to_string(),
            title: row.get("title"),
            previous_stock,
            new_stock,
        })
    }

    pub async fn update_price(
        &self,
        isbn: &str,
        new_price_cents: i64,
    ) -> Result<PriceChange, ToolError> {
        if new_price_cents < 0 {
            return Err(ToolError::validation("price must not be negative"));
        }
        retry_busy("update_price", || self.update_price_tx(isbn, new_price_cents)).await
    }

    async fn update_price_tx(
        &self,
        isbn: &str,
        new_price_cents: i64,
    ) -> Result<PriceChange, ToolError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT title, price_cents FROM books WHERE isbn = ?1")
            .bind(isbn)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(ToolError::validation(format!("unknown isbn {}", isbn)));
        };
        sqlx::query("UPDATE books SET price_cents = ?2 WHERE isbn = ?1")
            .bind(isbn)
            .bind(new_price_cents)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(PriceChange {
            isbn: isbn.to_string(),
            title: row.get("title"),
            old_price_cents: row.get("price_cents"),
            new_price_cents,
        })
    }

    pub async fn order_detail(&self, order_id: i64) -> Result<Option<OrderDetail>, ToolError> {
        let row = sqlx::query(
            "SELECT o.id, o.customer_id, o.status, o.total_cents, o.created_at, c.name, c.email \
             FROM orders o JOIN customers c ON c.id = o.customer_id WHERE o.id = ?1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(r) = row else { return Ok(None) };
        let items = self.order_items(order_id).await?;
        Ok(Some(order_from_row(&r, items)))
    }

    pub async fn list_orders(&self) -> Result<Vec<OrderDetail>, ToolError> {
        let rows = sqlx::query(
            "SELECT o.id, o.customer_id, o.status, o.total_cents, o.created_at, c.name, c.email \
             FROM orders o JOIN customers c ON c.id = o.customer_id ORDER BY o.id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut orders = Vec::with_capacity(rows.len());
        for r in &rows {
            let id: i64 = r.get("id");
            let items = self.order_items(id).await?;
            orders.push(order_from_row(r, items));
        }
        Ok(orders)
    }

    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderItemDetail>, ToolError> {
        let rows = sqlx::query(
            "SELECT i.book_isbn, i.quantity, i.unit_price_cents, b.title, b.author \
             FROM order_items i JOIN books b ON b.isbn = i.book_isbn \
             WHERE i.order_id = ?1 ORDER BY i.id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| OrderItemDetail {
                isbn: r.get("book_isbn"),
                title: r.get("title"),
                author: r.get("author"),
                quantity: r.get("quantity"),
                unit_price_cents: r.get("unit_price_cents"),
            })
            .collect())
    }

    pub async fn inventory_summary(
        &self,
        low_stock_threshold: i64,
    ) -> Result<InventorySummary, ToolError> {
        let agg = sqlx::query(
            "SELECT COUNT(*) AS titles, COALESCE(SUM(stock), 0) AS total_stock, \
             COALESCE(SUM(price_cents * stock), 0) AS total_value, \
             COALESCE(SUM(price_cents), 0) AS price_sum FROM books",
        )
        .fetch_one(&self.pool)
        .await?;
        let titles: i64 = agg.get("titles");
        let price_sum: i64 = agg.get("price_sum");
        let average_price_cents = if titles > 0 {
            (price_sum + titles / 2) / titles
        } else {
            0
        };
        let low_rows = sqlx::query(
            "SELECT isbn, title, stock FROM books WHERE stock < ?1 ORDER BY stock ASC, title ASC",
        )
        .bind(low_stock_threshold)
        .fetch_all(&self.pool)
        .await?;
        Ok(InventorySummary {
            titles,
            total_stock: agg.get("total_stock"),
            total_value_cents: agg.get("total_value"),
            average_price_cents,
            low_stock_threshold,
            low_stock: low_rows
                .iter()
                .map(|r| LowStockEntry {
                    isbn: r.get("isbn"),
                    title: r.get("title"),
                    stock: r.get("stock"),
                })
                .collect(),
        })
    }

    pub async fn list_customers(&self) -> Result<Vec<Customer>, ToolError> {
        let rows = sqlx::query("SELECT id, name, email, created_at FROM customers ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| Customer {
                id: r.get("id"),
                name: r.get("name"),
                email: r.get("email"),
                created_at: parse_timestamp(r.get("created_at")),
            })
            .collect())
    }

    pub async fn low_stock_count(&self, threshold: i64) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS c FROM books WHERE stock < ?1")
            .bind(threshold)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("c"))
    }

    pub async fn ensure_session(&self, id: Option<Uuid>) -> anyhow::Result<Uuid> {
        let id = id.unwrap_or_else(Uuid::new_v4);
        sqlx::query("INSERT OR IGNORE INTO sessions (id, title, created_at) VALUES (?1, ?2, ?3)")
            .bind(id.to_string())
            .bind(DEFAULT_TITLE)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn create_session(&self, title: Option<String>) -> anyhow::Result<Session> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let title = title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        sqlx::query("INSERT INTO sessions (id, title, created_at) VALUES (?1, ?2, ?3)")
            .bind(id.to_string())
            .bind(&title)
            .bind(created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(Session {
            id,
            title,
            created_at,
        })
    }

    pub async fn session_exists(&self, id: Uuid) -> anyhow::Result<bool> {
        let row = sqlx::query("SELECT 1 AS one FROM sessions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn list_sessions(&self) -> anyhow::Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            "SELECT s.id, s.title, s.created_at, \
             (SELECT content FROM messages m WHERE m.session_id = s.id ORDER BY m.id DESC LIMIT 1) AS last_message, \
             COALESCE((SELECT m.created_at FROM messages m WHERE m.session_id = s.id ORDER BY m.id DESC LIMIT 1), s.created_at) AS last_activity \
             FROM sessions s ORDER BY last_activity DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        let summaries = rows
            .into_iter()
            .filter_map(|r| {
                let id_str: String = r.get("id");
                let id = Uuid::parse_str(&id_str).ok()?;
                Some(SessionSummary {
                    id,
                    title: r.get("title"),
                    created_at: parse_timestamp(r.get("created_at")),
                    last_message: r.get("last_message"),
                    last_activity: parse_timestamp(r.get("last_activity")),
                })
            })
            .collect();
        Ok(summaries)
    }

    pub async fn set_title_if_default(&self, id: Uuid, title: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE sessions SET title = ?1 WHERE id = ?2 AND title = ?3")
            .bind(title)
            .bind(id.to_string())
            .bind(DEFAULT_TITLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn append_message(
        &self,
        session_id: Uuid,
        role: Role,
        content: &str,
    ) -> anyhow::Result<i64> {
        let res = sqlx::query(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(session_id.to_string())
        .bind(role.as_str())
        .bind(content)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn recent_messages(&self, session_id: Uuid, limit: i64) -> anyhow::Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, created_at FROM messages \
             WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )
        .bind(session_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        let mut messages: Vec<Message> = rows.iter().map(message_from_row).collect();
        messages.reverse();
        Ok(messages)
    }

    pub async fn session_messages(&self, session_id: Uuid) -> anyhow::Result<Option<Vec<Message>>> {
        if !self.session_exists(session_id).await? {
            return Ok(None);
        }
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, created_at FROM messages \
             WHERE session_id = ?1 ORDER BY id ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(Some(rows.iter().map(message_from_row).collect()))
    }

    pub async fn append_tool_call(
        &self,
        session_id: Uuid,
        message_id: i64,
        tool_name: &str,
        input_args: &Value,
        output: &Value,
        success: bool,
    ) -> anyhow::Result<i64> {
        let res = sqlx::query(
            "INSERT INTO tool_calls (session_id, message_id, tool_name, input_args, output, success, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(session_id.to_string())
        .bind(message_id)
        .bind(tool_name)
        .bind(input_args.to_string())
        .bind(output.to_string())
        .bind(success)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn session_tool_calls(
        &self,
        session_id: Uuid,
    ) -> anyhow::Result<Option<Vec<ToolCallRecord>>> {
        if !self.session_exists(session_id).await? {
            return Ok(None);
        }
        let rows = sqlx::query(
            "SELECT id, session_id, message_id, tool_name, input_args, output, success, created_at \
             FROM tool_calls WHERE session_id = ?1 ORDER BY id ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        let calls = rows
            .iter()
            .map(|r| {
                let id_str: String = r.get("session_id");
                ToolCallRecord {
                    id: r.get("id"),
                    session_id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
                    message_id: r.get("message_id"),
                    tool_name: r.get("tool_name"),
                    input_args: parse_json_column(r.get("input_args")),
                    output: parse_json_column(r.get("output")),
                    success: r.get("success"),
                    created_at: parse_timestamp(r.get("created_at")),
                }
            })
            .collect();
        Ok(Some(calls))
    }

    pub async fn table_counts(&self) -> anyhow::Result<TableCounts> {
        Ok(TableCounts {
            books: self.count("books").await?,
            customers: self.count("customers").await?,
            orders: self.count("orders").await?,
            order_items: self.count("order_items").await?,
            sessions: self.count("sessions").await?,
            messages: self.count("messages").await?,
            tool_calls: self.count("tool_calls").await?,
        })
    }

    async fn count(&self, table: &str) -> anyhow::Result<i64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS c FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("c"))
    }

    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TableCounts {
    pub books: i64,
    pub customers: i64,
    pub orders: i64,
    pub order_items: i64,
    pub sessions: i64,
    pub messages: i64,
    pub tool_calls: i64,
}

async fn retry_busy<T, Fut>(op: &'static str, mut run: impl FnMut() -> Fut) -> Result<T, ToolError>
where
    Fut: std::future::Future<Output = Result<T, ToolError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match run().await {
            Err(ToolError::Store(e)) if is_busy(&e) => {
                attempt += 1;
                if attempt >= BUSY_ATTEMPTS {
                    return Err(ToolError::Busy { op: op.to_string() });
                }
                tracing::warn!(op, attempt, "sqlite busy, backing off");
                tokio::time::sleep(std::time::Duration::from_millis(
                    BUSY_BACKOFF_MS * attempt as u64,
                ))
                .await;
            }
            other => return other,
        }
    }
}

fn is_busy(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            matches!(
                db.code().as_deref(),
                Some("5") | Some("6") | Some("261") | Some("517")
            ) || db.message().contains("database is locked")
        }
        _ => false,
    }
}

fn resolve_default_db_url() -> anyhow::Result<String> {
    let base = std::env::var("XDG_DATA_HOME")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            PathBuf::from(home).join(".local").join("share")
        });
    let dir = base.join("front_desk");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("library.db");
    Ok(format!("sqlite://{}", path.to_string_lossy()))
}

fn parse_timestamp(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_json_column(s: String) -> Value {
    serde_json::from_str(&s).unwrap_or(Value::Null)
}

fn book_from_row(r: &SqliteRow) -> Book {
    Book {
        isbn: r.get("isbn"),
        title: r.get("title"),
        author: r.get("author"),
        price_cents: r.get("price_cents"),
        stock: r.get("stock"),
        created_at: parse_timestamp(r.get("created_at")),
    }
}

fn message_from_row(r: &SqliteRow) -> Message {
    let session_str: String = r.get("session_id");
    let role_str: String = r.get("role");
    Message {
        id: r.get("id"),
        session_id: Uuid::parse_str(&session_str).unwrap_or_else(|_| Uuid::nil()),
        role: Role::parse(&role_str).unwrap_or(Role::User),
        content: r.get("content"),
        created_at: parse_timestamp(r.get("created_at")),
    }
}

fn order_from_row(r: &SqliteRow, items: Vec<OrderItemDetail>) -> OrderDetail {
    let status_str: String = r.get("status");
    OrderDetail {
        id: r.get("id"),
        customer_id: r.get("customer_id"),
        customer_name: r.get("name"),
        customer_email: r.get("email"),
        status: OrderStatus::parse(&status_str).unwrap_or(OrderStatus::Pending),
        total_cents: r.get("total_cents"),
        created_at: parse_timestamp(r.get("created_at")),
        items,
    }
}
