use serde::Deserialize;
use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolResult, parse_args};
use crate::domain::{OrderLine, format_dollars};
use crate::error::ToolError;

pub struct CreateOrderTool;
pub struct OrderStatusTool;

#[derive(Debug, Deserialize)]
struct CreateOrderArgs {
    customer_id: i64,
    items: Vec<OrderLine>,
}

impl Tool for CreateOrderTool {
    fn name(&self) -> &'static str {
        "create_order"
    }

    fn description(&self) -> &'static str {
        "Place an order for a customer; all lines succeed or the whole order is rejected"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "customer_id": {"type": "integer"},
                "items": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "isbn": {"type": "string"},
                            "quantity": {"type": "integer", "minimum": 1}
                        },
                        "required": ["isbn", "quantity"]
                    }
                }
            },
            "required": ["customer_id", "items"]
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
            let args: CreateOrderArgs = parse_args(args)?;
            let receipt = ctx.store.create_order(args.customer_id, &args.items).await?;
            let units: i64 = receipt.items.iter().map(|i| i.quantity).sum();
            let summary = format!(
                "order {} created for {}: {} copies, total {}",
                receipt.order_id,
                receipt.customer_name,
                units,
                format_dollars(receipt.total_cents)
            );
            Ok(ToolResult {
                summary,
                data: Some(json!({ "order": receipt })),
            })
        })
    }
}

#[derive(Debug, Deserialize)]
struct OrderStatusArgs {
    order_id: i64,
}

impl Tool for OrderStatusTool {
    fn name(&self) -> &'static str {
        "order_status"
    }

    fn description(&self) -> &'static str {
        "Look up an order: status, purchaser, lines, and total"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "order_id": {"type": "integer"}
            },
            "required": ["order_id"]
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
            let args: OrderStatusArgs = parse_args(args)?;
            let detail = ctx
                .store
                .order_detail(args.order_id)
                .await?
                .ok_or_else(|| {
                    ToolError::validation(format!("unknown order id {}", args.order_id))
                })?;
            let summary = format!(
                "order {} ({}) for {}, total {}",
                detail.id,
                detail.status.as_str(),
                detail.customer_name,
                format_dollars(detail.total_cents)
            );
            Ok(ToolResult {
                summary,
                data: Some(json!({ "order": detail })),
            })
        })
    }
}
