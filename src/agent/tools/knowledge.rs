use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolResult, parse_args};
use crate::error::ToolError;

pub struct SearchKnowledgeBaseTool;

const MAX_RESULTS: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "you", "your", "how", "what", "can", "does", "with", "this", "that",
    "are", "about",
];

// Help desk passages bundled into the binary; no database behind this tool.
const CORPUS: &[(&str, &str)] = &[
    (
        "placing orders",
        "To place an order, give the customer id plus the ISBN and quantity of every title. \
         The order is confirmed immediately and stock is taken at purchase time. If any line \
         cannot be filled the whole order is rejected and nothing is charged.",
    ),
    (
        "restocking",
        "Restocking adds copies of an existing title. Provide the ISBN and a positive \
         quantity; the previous and new stock levels are reported back.",
    ),
    (
        "changing prices",
        "Price updates apply to future orders only. Orders already placed keep the price \
         that was current when they were made.",
    ),
    (
        "inventory reports",
        "The inventory summary covers distinct titles, copies in stock, total stock value, \
         average price, and every title running low so restocks can be planned.",
    ),
    (
        "finding books",
        "Books can be searched by title fragment, author fragment, price range, or minimum \
         stock, and the filters combine.",
    ),
    (
        "order lookup",
        "Looking up an order shows its status, the purchaser, each line with its unit price, \
         and the order total.",
    ),
    (
        "customers",
        "The customer directory lists every registered customer with their email address. \
         New customers are registered by the back office, not through chat.",
    ),
    (
        "assistant abilities",
        "The assistant can search the catalog, place and look up orders, restock titles, \
         change prices, summarize inventory, and list customers.",
    ),
];

fn query_tokens(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn passage_score(tokens: &[String], topic: &str, body: &str) -> usize {
    let text = format!("{} {}", topic, body).to_lowercase();
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .collect();
    tokens
        .iter()
        .filter(|t| words.iter().any(|w| w.starts_with(t.as_str()) || t.starts_with(w)))
        .count()
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

impl Tool for SearchKnowledgeBaseTool {
    fn name(&self) -> &'static str {
        "search_knowledge_base"
    }

    fn description(&self) -> &'static str {
        "Search the built-in help passages about what the assistant can do and how ordering works"
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"}
            },
            "required": ["query"]
        })
    }

    fn run<'a>(
        &'a self,
        _ctx: ToolContext<'a>,
        args: Value,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ToolResult, ToolError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let args: SearchArgs = parse_args(args)?;
            if args.query.trim().is_empty() {
                return Err(ToolError::validation("query must not be empty"));
            }
            let tokens = query_tokens(&args.query);
            let mut scored: Vec<(usize, &str, &str)> = CORPUS
                .iter()
                .map(|&(topic, body)| (passage_score(&tokens, topic, body), topic, body))
                .filter(|(score, _, _)| *score > 0)
                .collect();
            scored.sort_by(|a, b| b.0.cmp(&a.0));
            scored.truncate(MAX_RESULTS);

            let results: Vec<Value> = scored
                .iter()
                .map(|(score, topic, body)| {
                    json!({"topic": topic, "content": body, "score": score})
                })
                .collect();
            let summary = match results.len() {
                0 => "no passages matched".to_string(),
                1 => "1 passage matched".to_string(),
                n => format!("{} passages matched", n),
            };
            Ok(ToolResult {
                summary,
                data: Some(json!({"query": args.query, "results": results})),
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

    #[test]
    fn tokens_drop_noise_words() {
        let toks = query_tokens("How can I restock a book?");
        assert!(toks.contains(&"restock".to_string()));
        assert!(toks.contains(&"book".to_string()));
        assert!(!toks.contains(&"how".to_string()));
    }

    #[test]
    fn prefix_matching_bridges_word_forms() {
        let toks = vec!["restock".to_string()];
        assert!(passage_score(&toks, "restocking", "Restocking adds copies.") > 0);
    }

    #[tokio::test]
    async fn restock_question_finds_the_restocking_passage() {
        let (s, _dir) = store().await;
        let ctx = ToolContext { store: &s, low_stock_threshold: 15 };
        let res = SearchKnowledgeBaseTool
            .run(ctx, json!({"query": "how do I restock a title?"}))
            .await
            .unwrap();
        let data = res.data.unwrap();
        let results = data["results"].as_array().unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= MAX_RESULTS);
        assert!(results.iter().any(|r| r["topic"] == "restocking"));
    }

    #[tokio::test]
    async fn unrelated_query_is_an_empty_success() {
        let (s, _dir) = store().await;
        let ctx = ToolContext { store: &s, low_stock_threshold: 15 };
        let res = SearchKnowledgeBaseTool
            .run(ctx, json!({"query": "zeppelin maintenance schedule"}))
            .await
            .unwrap();
        assert_eq!(res.summary, "no passages matched");
        assert!(res.data.unwrap()["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let (s, _dir) = store().await;
        let ctx = ToolContext { store: &s, low_stock_threshold: 15 };
        let err = SearchKnowledgeBaseTool
            .run(ctx, json!({"query": "   "}))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ToolError::Validation(_)));
    }
}
