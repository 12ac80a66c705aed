use serde::Deserialize;
use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolResult, parse_args};
use crate::domain::{dollars_to_cents, format_dollars};
use crate::error::ToolError;

pub struct RestockBookTool;
pub struct UpdatePriceTool;
pub struct InventorySummaryTool;

#[derive(Debug, Deserialize)]
struct RestockArgs {
    isbn: String,
    quantity: i64,
}

impl Tool for RestockBookTool {
    fn name(&self) -> &'static str {
        "restock_book"
    }

    fn description(&self) -> &'static str {
        "Add copies of an existing title to stock"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "isbn": {"type": "string"},
                "quantity": {"type": "integer", "minimum": 1}
            },
            "required": ["isbn", "quantity"]
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
            let args: RestockArgs = parse_args(args)?;
            let outcome = ctx.store.restock_book(&args.isbn, args.quantity).await?;
            let summary = format!(
                "restocked {}: {} -> {}",
                outcome.isbn, outcome.previous_stock, outcome.new_stock
            );
            Ok(ToolResult {
                summary,
                data: Some(json!({ "restock": outcome })),
            })
        })
    }
}

#[derive(Debug, Deserialize)]
struct UpdatePriceArgs {
    isbn: String,
    new_price: f64,
}

impl Tool for UpdatePriceTool {
    fn name(&self) -> &'static str {
        "update_price"
    }

    fn description(&self) -> &'static str {
        "Set a title's price in dollars; existing orders keep their old price"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "isbn": {"type": "string"},
                "new_price": {"type": "number", "minimum": 0}
            },
            "required": ["isbn", "new_price"]
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
            let args: UpdatePriceArgs = parse_args(args)?;
            let cents = dollars_to_cents(args.new_price)?;
            let change = ctx.store.update_price(&args.isbn, cents).await?;
            let summary = format!(
                "price updated for {}: {} -> {}",
                change.isbn,
                format_dollars(change.old_price_cents),
                format_dollars(change.new_price_cents)
            );
            Ok(ToolResult {
                summary,
                data: Some(json!({ "price": change })),
            })
        })
    }
}

impl Tool for InventorySummaryTool {
    fn name(&self) -> &'static str {
        "inventory_summary"
    }

    fn description(&self) -> &'static str {
        "Report title count, copies in stock, stock value, average price, and titles running low"
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
            let summary = ctx.store.inventory_summary(ctx.low_stock_threshold).await?;
            let text = format!(
                "{} titles, {} copies in stock worth {}, {} below the stock threshold",
                summary.titles,
                summary.total_stock,
                format_dollars(summary.total_value_cents),
                summary.low_stock.len()
            );
            Ok(ToolResult {
                summary: text,
                data: Some(json!({ "inventory": summary })),
            })
        })
    }
}
