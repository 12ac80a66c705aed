use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolResult};
use crate::error::ToolError;

pub struct ListCustomersTool;

impl Tool for ListCustomersTool {
    fn name(&self) -> &'static str {
        "list_customers"
    }

    fn description(&self) -> &'static str {
        "List every registered customer with id, name, and email"
    }

    fn args_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn run<'a>(
        &'a self,
        ctx: ToolContext<'a>,
        _args: Value,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ToolResult, ToolError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let customers = ctx.store.list_customers().await?;
            Ok(ToolResult {
                summary: format!("{} customers", customers.len()),
                data: Some(json!({ "customers": customers })),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LibraryStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lists_seeded_customers_in_id_order() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").to_string_lossy());
        let store = LibraryStore::initialize(Some(url)).await.unwrap();

        let ctx = ToolContext { store: &store, low_stock_threshold: 15 };
        let res = ListCustomersTool.run(ctx, json!({})).await.unwrap();
        assert_eq!(res.summary, "6 customers");
        let customers = res.data.unwrap()["customers"].as_array().unwrap().clone();
        assert_eq!(customers.len(), 6);
        assert_eq!(customers[0]["name"], "Alice Johnson");
        assert_eq!(customers[0]["email"], "alice.johnson@email.com");
        assert_eq!(customers[5]["name"], "Frank Miller");
    }
}
