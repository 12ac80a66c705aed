use serde_json::Value;

use crate::error::ToolError;
use crate::storage::LibraryStore;

pub mod books;
pub mod customers;
pub mod inventory;
pub mod knowledge;
pub mod orders;

pub struct ToolContext<'a> {
    pub store: &'a LibraryStore,
    pub low_stock_threshold: i64,
}

pub struct ToolResult {
    pub summary: String,
    pub data: Option<Value>,
}

pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn args_schema(&self) -> Value;
    fn run<'a>(
        &'a self,
        ctx: ToolContext<'a>,
        args: Value,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ToolResult, ToolError>> + Send + 'a>,
    >;
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub args: Value,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutedCall {
    pub tool_name: String,
    pub input_args: Value,
    pub output: Value,
    pub success: bool,
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn with_default_tools() -> Self {
        let mut r = Self::new();
        r.register(Box::new(books::FindBooksTool));
        r.register(Box::new(orders::CreateOrderTool));
        r.register(Box::new(inventory::RestockBookTool));
        r.register(Box::new(inventory::UpdatePriceTool));
        r.register(Box::new(orders::OrderStatusTool));
        r.register(Box::new(inventory::InventorySummaryTool));
        r.register(Box::new(customers::ListCustomersTool));
        r.register(Box::new(knowledge::SearchKnowledgeBaseTool));
        r
    }

    pub fn register(&mut self, t: Box<dyn Tool>) {
        self.tools.push(t);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().map(|b| b.as_ref()).find(|t| t.name() == name)
    }

    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name().into(),
                description: t.description().into(),
                args: t.args_schema(),
            })
            .collect()
    }
}

pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::validation(format!("invalid arguments: {}", e)))
}
