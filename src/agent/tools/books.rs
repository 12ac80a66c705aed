use serde::Deserialize;
use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolResult, parse_args};
use crate::domain::{BookFilter, dollars_to_cents};
use crate::error::ToolError;

pub struct FindBooksTool;

#[derive(Debug, Deserialize)]
struct FindBooksArgs {
    title: Option<String>,
    author: Option<String>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    min_stock: Option<i64>,
}

impl Tool for FindBooksTool {
    fn name(&self) -> &'static str {
        "find_books"
    }

    fn description(&self) -> &'static str {
        "Search the catalog by title, author, price range, or minimum stock; filters combine"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "substring of the title"},
                "author": {"type": "string", "description": "substring of the author"},
                "min_price": {"type": "number", "description": "lowest price in dollars"},
                "max_price": {"type": "number", "description": "highest price in dollars"},
                "min_stock": {"type": "integer", "description": "minimum copies in stock"}
            }
        })
    }

    fn run<'a>(
        &'a self,
        ctx: ToolContext<'a>,
        args: Value,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ToolResult, ToolError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let args: FindBooksArgs = parse_args(args)?;
            let filter = BookFilter {
                title: args.title.filter(|s| !s.trim().is_empty()),
                author: args.author.filter(|s| !s.trim().is_empty()),
                min_price_cents: args.min_price.map(dollars_to_cents).transpose()?,
                max_price_cents: args.max_price.map(dollars_to_cents).transpose()?,
                min_stock: args.min_stock,
            };
            let books = ctx.store.find_books(&filter).await?;
            let summary = match books.len() {
                0 => "no books matched".to_string(),
                1 => format!("found 1 book: {}", books[0].title),
                n => format!("found {} books", n),
            };
            Ok(ToolResult {
                summary,
                data: Some(json!({ "books": books })),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LibraryStore;
    use tempfile::tempdir;

    async fn store() -> (LibraryStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").to_string_lossy());
        (LibraryStore::initialize(Some(url)).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn restocked_book_shows_new_stock_but_same_price() {
        let (store, _dir) = store().await;
        store.restock_book("9780135957059", 10).await.unwrap();

        let ctx = ToolContext { store: &store, low_stock_threshold: 15 };
        let res = FindBooksTool
            .run(ctx, json!({"author": "Hunt"}))
            .await
            .unwrap();
        assert!(res.summary.contains("found 1 book"));
        let books = res.data.unwrap()["books"].as_array().unwrap().clone();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0]["title"], "The Pragmatic Programmer: Your Journey to Mastery");
        assert_eq!(books[0]["author"], "David Thomas, Andrew Hunt");
        assert_eq!(books[0]["stock"], 39);
        assert_eq!(books[0]["price"].as_f64().unwrap(), 42.50);
    }

    #[tokio::test]
    async fn price_band_filter() {
        let (store, _dir) = store().await;
        let ctx = ToolContext { store: &store, low_stock_threshold: 15 };
        let res = FindBooksTool
            .run(ctx, json!({"min_price": 50.0, "max_price": 53.0}))
            .await
            .unwrap();
        let books = res.data.unwrap()["books"].as_array().unwrap().clone();
        // Design Patterns 54.99 is out; SRE 51.25 and Continuous Delivery 52.99 are in
        assert_eq!(books.len(), 2);
    }

    #[tokio::test]
    async fn empty_match_is_a_success() {
        let (store, _dir) = store().await;
        let ctx = ToolContext { store: &store, low_stock_threshold: 15 };
        let res = FindBooksTool
            .run(ctx, json!({"title": "knitting"}))
            .await
            .unwrap();
        assert_eq!(res.summary, "no books matched");
        assert!(res.data.unwrap()["books"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_args_are_rejected_before_querying() {
        let (store, _dir) = store().await;
        let ctx = ToolContext { store: &store, low_stock_threshold: 15 };
        let err = FindBooksTool
            .run(ctx, json!({"min_price": "cheap"}))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ToolError::Validation(_)));

        let ctx = ToolContext { store: &store, low_stock_threshold: 15 };
        let err = FindBooksTool
            .run(ctx, json!({"min_price": -4.0}))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ToolError::Validation(_)));
    }
}
