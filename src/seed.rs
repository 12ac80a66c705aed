use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

// (isbn, title, author, price in cents, catalog stock before seed orders)
const BOOKS: &[(&str, &str, &str, i64, i64)] = &[
    (
        "9780134685991",
        "Clean Code: A Handbook of Agile Software Craftsmanship",
        "Robert C. Martin",
        4749,
        25,
    ),
    (
        "9780201633610",
        "Design Patterns: Elements of Reusable Object-Oriented Software",
        "Erich Gamma, Richard Helm, Ralph Johnson, John Vlissides",
        5499,
        18,
    ),
    (
        "9780135957059",
        "The Pragmatic Programmer: Your Journey to Mastery",
        "David Thomas, Andrew Hunt",
        4250,
        32,
    ),
    (
        "9780321125217",
        "Domain-Driven Design: Tackling Complexity in the Heart of Software",
        "Eric Evans",
        5675,
        12,
    ),
    (
        "9780134757599",
        "Clean Architecture: A Craftsman's Guide to Software Structure and Design",
        "Robert C. Martin",
        4999,
        22,
    ),
    (
        "9780134494166",
        "Accelerate: The Science of Lean Software and DevOps",
        "Nicole Forsgren, Jez Humble, Gene Kim",
        3995,
        15,
    ),
    (
        "9780136554828",
        "Site Reliability Engineering: How Google Runs Production Systems",
        "Betsy Beyer, Chris Jones, Jennifer Petoff, Niall Richard Murphy",
        5125,
        8,
    ),
    (
        "9780132350884",
        "Working Effectively with Legacy Code",
        "Michael Feathers",
        4500,
        20,
    ),
    (
        "9780321942067",
        "Continuous Delivery: Reliable Software Releases through Build, Test, and Deployment Automation",
        "Jez Humble, David Farley",
        5299,
        14,
    ),
    (
        "9780137054899",
        "The Clean Coder: A Code of Conduct for Professional Programmers",
        "Robert C. Martin",
        3895,
        28,
    ),
];

const CUSTOMERS: &[(&str, &str)] = &[
    ("Alice Johnson", "alice.johnson@email.com"),
    ("Bob Smith", "bob.smith@email.com"),
    ("Carol Davis", "carol.davis@email.com"),
    ("David Wilson", "david.wilson@email.com"),
    ("Eva Brown", "eva.brown@email.com"),
    ("Frank Miller", "frank.miller@email.com"),
];

// Historical orders: (customer_id, lines). Totals and stock adjustments are
// derived from the lines so the books always reconcile with the orders.
const ORDERS: &[(i64, &[(&str, i64)])] = &[
    (1, &[("9780134685991", 3)]),
    (2, &[("9780201633610", 1)]),
    (3, &[("9780135957059", 3)]),
    (4, &[("9780321125217", 1)]),
];

fn book_price(isbn: &str) -> anyhow::Result<i64> {
    BOOKS
        .iter()
        .find(|b| b.0 == isbn)
        .map(|b| b.3)
        .ok_or_else(|| anyhow::anyhow!("seed references unknown isbn {}", isbn))
}

pub async fn apply_if_empty(pool: &Pool<Sqlite>) -> anyhow::Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS c FROM books")
        .fetch_one(pool)
        .await?;
    let existing: i64 = row.get("c");
    if existing > 0 {
        return Ok(false);
    }

    let mut tx = pool.begin().await?;
    let now = Utc::now().to_rfc3339();
    for &(isbn, title, author, price_cents, stock) in BOOKS {
        sqlx::query(
            "INSERT INTO books (isbn, title, author, price_cents, stock, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(isbn)
        .bind(title)
        .bind(author)
        .bind(price_cents)
        .bind(stock)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }
    for &(name, email) in CUSTOMERS {
        sqlx::query("INSERT INTO customers (name, email, created_at) VALUES (?1, ?2, ?3)")
            .bind(name)
            .bind(email)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
    }
    for &(customer_id, lines) in ORDERS {
        let mut total_cents = 0i64;
        for &(isbn, quantity) in lines {
            total_cents += book_price(isbn)? * quantity;
        }
        let res = sqlx::query(
            "INSERT INTO orders (customer_id, status, total_cents, created_at) VALUES (?1, 'pending', ?2, ?3)",
        )
        .bind(customer_id)
        .bind(total_cents)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        let order_id = res.last_insert_rowid();
        for &(isbn, quantity) in lines {
            sqlx::query(
                "INSERT INTO order_items (order_id, book_isbn, quantity, unit_price_cents) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(order_id)
            .bind(isbn)
            .bind(quantity)
            .bind(book_price(isbn)?)
            .execute(&mut *tx)
            .await?;
            let dec = sqlx::query("UPDATE books SET stock = stock - ?2 WHERE isbn = ?1 AND stock >= ?2")
                .bind(isbn)
                .bind(quantity)
                .execute(&mut *tx)
                .await?;
            if dec.rows_affected() != 1 {
                anyhow::bail!("seed stock underflow for {}", isbn);
            }
        }
    }
    tx.commit().await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_orders_reference_known_books() {
        for &(_, lines) in ORDERS {
            assert!(!lines.is_empty());
            for &(isbn, quantity) in lines {
                assert!(quantity > 0);
                assert!(book_price(isbn).is_ok());
            }
        }
    }

    #[test]
    fn first_seed_order_is_three_clean_codes() {
        let total: i64 = ORDERS[0]
            .1
            .iter()
            .map(|&(isbn, q)| book_price(isbn).unwrap() * q)
            .sum();
        assert_eq!(total, 14247);
    }

    #[test]
    fn catalog_has_ten_titles_and_six_customers() {
        assert_eq!(BOOKS.len(), 10);
        assert_eq!(CUSTOMERS.len(), 6);
    }
}
