use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::agent::planner::Planner;
use crate::agent::tools::{ExecutedCall, ToolContext, ToolRegistry};
use crate::error::PlanError;
use crate::session::{Message, Role, title_from_message};
use crate::storage::LibraryStore;

// sent in place of a model reply when planning or narration fails
pub const FALLBACK_REPLY: &str =
    "Sorry, I ran into a problem handling that request. Please try again.";

const HISTORY_WINDOW: i64 = 10;

pub struct ChatEngine {
    store: LibraryStore,
    planner: Arc<dyn Planner>,
    registry: Arc<ToolRegistry>,
    low_stock_threshold: i64,
}

pub struct TurnOutcome {
    pub session_id: Uuid,
    pub reply: Message,
    pub tool_calls: Vec<ExecutedCall>,
}

impl ChatEngine {
    pub fn new(
        store: LibraryStore,
        planner: Arc<dyn Planner>,
        registry: Arc<ToolRegistry>,
        low_stock_threshold: i64,
    ) -> Self {
        Self {
            store,
            planner,
            registry,
            low_stock_threshold,
        }
    }

    pub async fn handle_turn(
        &self,
        session_id: Option<Uuid>,
        user_text: &str,
    ) -> anyhow::Result<TurnOutcome> {
        let session_id = self.store.ensure_session(session_id).await?;
        // history is read before the new message so the planner sees the
        // conversation as it stood when the customer typed
        let history = self.store.recent_messages(session_id, HISTORY_WINDOW).await?;
        let user_message_id = self
            .store
            .append_message(session_id, Role::User, user_text)
            .await?;
        self.store
            .set_title_if_default(session_id, &title_from_message(user_text))
            .await?;

        let catalog = self.registry.catalog();
        let plan = match self.planner.plan(user_text, &history, &catalog).await {
            Ok(plan) => plan,
            Err(PlanError::Unparseable { raw }) => {
                tracing::error!(session = %session_id, raw = %raw, "model plan was unusable");
                return self.finish(session_id, FALLBACK_REPLY.into(), Vec::new()).await;
            }
            Err(e) => {
                tracing::error!(session = %session_id, error = %e, "planning failed");
                return self.finish(session_id, FALLBACK_REPLY.into(), Vec::new()).await;
            }
        };
        tracing::info!(session = %session_id, steps = plan.len(), "executing plan");

        let mut trace: Vec<ExecutedCall> = Vec::new();
        for step in plan {
            let executed = match self.registry.get(&step.tool) {
                Some(tool) => {
                    let ctx = ToolContext {
                        store: &self.store,
                        low_stock_threshold: self.low_stock_threshold,
                    };
                    match tool.run(ctx, step.args.clone()).await {
                        Ok(result) => ExecutedCall {
                            tool_name: step.tool,
                            input_args: step.args,
                            output: json!({ "summary": result.summary, "data": result.data }),
                            success: true,
                        },
                        Err(e) => {
                            tracing::warn!(session = %session_id, tool = %step.tool, error = %e, "tool call failed");
                            ExecutedCall {
                                tool_name: step.tool,
                                input_args: step.args,
                                output: json!({ "error": e.to_string(), "kind": e.class() }),
                                success: false,
                            }
                        }
                    }
                }
                None => {
                    tracing::warn!(session = %session_id, tool = %step.tool, "plan named an unknown tool");
                    ExecutedCall {
                        tool_name: step.tool.clone(),
                        input_args: step.args,
                        output: json!({
                            "error": format!("unknown tool: {}", step.tool),
                            "kind": "validation",
                        }),
                        success: false,
                    }
                }
            };
            // each call is persisted before the next one runs
            self.store
                .append_tool_call(
                    session_id,
                    user_message_id,
                    &executed.tool_name,
                    &executed.input_args,
                    &executed.output,
                    executed.success,
                )
                .await?;
            let failed = !executed.success;
            trace.push(executed);
            if failed {
                break;
            }
        }

        match self.planner.narrate(user_text, &trace).await {
            Ok(reply) => self.finish(session_id, reply, trace).await,
            Err(e) => {
                tracing::error!(session = %session_id, error = %e, "narration failed");
                self.finish(session_id, FALLBACK_REPLY.into(), trace).await
            }
        }
    }

    async fn finish(
        &self,
        session_id: Uuid,
        reply: String,
        trace: Vec<ExecutedCall>,
    ) -> anyhow::Result<TurnOutcome> {
        let reply_id = self
            .store
            .append_message(session_id, Role::Assistant, &reply)
            .await?;
        Ok(TurnOutcome {
            session_id,
            reply: Message {
                id: reply_id,
                session_id,
                role: Role::Assistant,
                content: reply,
                created_at: Utc::now(),
            },
            tool_calls: trace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::planner::PlannedCall;
    use crate::agent::planner::testing::ScriptedPlanner;
    use tempfile::tempdir;

    async fn engine_with(planner: ScriptedPlanner) -> (ChatEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").to_string_lossy());
        let store = LibraryStore::initialize(Some(url)).await.unwrap();
        let engine = ChatEngine::new(
            store,
            Arc::new(planner),
            Arc::new(ToolRegistry::with_default_tools()),
            15,
        );
        (engine, dir)
    }

    fn call(tool: &str, args: serde_json::Value) -> PlannedCall {
        PlannedCall {
            tool: tool.into(),
            args,
        }
    }

    #[tokio::test]
    async fn full_turn_persists_messages_and_calls() {
        let planner = ScriptedPlanner::returning(
            vec![call("inventory_summary", json!({}))],
            "We have plenty in stock.",
        );
        let (engine, _dir) = engine_with(planner).await;

        let outcome = engine.handle_turn(None, "how is the inventory?").await.unwrap();
        assert_eq!(outcome.reply.content, "We have plenty in stock.");
        assert_eq!(outcome.reply.role, Role::Assistant);
        assert_eq!(outcome.tool_calls.len(), 1);
        assert!(outcome.tool_calls[0].success);

        let messages = engine
            .store
            .session_messages(outcome.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "how is the inventory?");
        assert_eq!(messages[1].role, Role::Assistant);

        let calls = engine
            .store
            .session_tool_calls(outcome.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "inventory_summary");
        assert!(calls[0].success);
        // the call is attributed to the user message that triggered it
        assert_eq!(calls[0].message_id, messages[0].id);

        let sessions = engine.store.list_sessions().await.unwrap();
        assert_eq!(sessions[0].title, "how is the inventory?");
    }

    #[tokio::test]
    async fn failing_step_halts_the_plan_but_keeps_the_trace() {
        // Site Reliability Engineering has 8 copies; asking for 9 must fail
        // and the third step must never run.
        let planner = ScriptedPlanner::returning(
            vec![
                call("find_books", json!({"author": "Hunt"})),
                call(
                    "create_order",
                    json!({"customer_id": 1, "items": [{"isbn": "9780136554828", "quantity": 9}]}),
                ),
                call("list_customers", json!({})),
            ],
            "That did not work out.",
        );
        let (engine, _dir) = engine_with(planner).await;

        let outcome = engine.handle_turn(None, "order nine SRE books").await.unwrap();
        assert_eq!(outcome.tool_calls.len(), 2);
        assert!(outcome.tool_calls[0].success);
        assert!(!outcome.tool_calls[1].success);
        assert_eq!(outcome.tool_calls[1].output["kind"], "conflict");

        let calls = engine
            .store
            .session_tool_calls(outcome.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(calls.len(), 2);
        assert!(!calls[1].success);

        // the failed order must not have touched the stock
        let book = engine.store.get_book("9780136554828").await.unwrap().unwrap();
        assert_eq!(book.stock, 8);
    }

    #[tokio::test]
    async fn planner_failure_yields_the_fallback_reply() {
        let mut planner = ScriptedPlanner::returning(vec![], "unused");
        planner.fail_plan = true;
        let (engine, _dir) = engine_with(planner).await;

        let outcome = engine.handle_turn(None, "hello there").await.unwrap();
        assert_eq!(outcome.reply.content, FALLBACK_REPLY);
        assert!(outcome.tool_calls.is_empty());

        // the user message and the apology are still logged
        let messages = engine
            .store
            .session_messages(outcome.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, FALLBACK_REPLY);
        let calls = engine
            .store
            .session_tool_calls(outcome.session_id)
            .await
            .unwrap()
            .unwrap();
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn narrator_failure_still_logs_the_executed_calls() {
        let mut planner =
            ScriptedPlanner::returning(vec![call("list_customers", json!({}))], "unused");
        planner.fail_narrate = true;
        let (engine, _dir) = engine_with(planner).await;

        let outcome = engine.handle_turn(None, "who buys from us?").await.unwrap();
        assert_eq!(outcome.reply.content, FALLBACK_REPLY);
        assert_eq!(outcome.tool_calls.len(), 1);
        assert!(outcome.tool_calls[0].success);

        let calls = engine
            .store
            .session_tool_calls(outcome.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(calls.len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_recorded_as_a_failed_call() {
        let planner = ScriptedPlanner::returning(
            vec![call("time_travel", json!({"year": 1999})), call("list_customers", json!({}))],
            "I cannot do that.",
        );
        let (engine, _dir) = engine_with(planner).await;

        let outcome = engine.handle_turn(None, "take me back").await.unwrap();
        assert_eq!(outcome.tool_calls.len(), 1);
        assert!(!outcome.tool_calls[0].success);
        assert_eq!(outcome.tool_calls[0].output["kind"], "validation");
        assert!(
            outcome.tool_calls[0].output["error"]
                .as_str()
                .unwrap()
                .contains("unknown tool")
        );
        assert_eq!(outcome.reply.content, "I cannot do that.");
    }

    #[tokio::test]
    async fn empty_plan_goes_straight_to_narration() {
        let planner = ScriptedPlanner::returning(vec![], "Hello! How can I help?");
        let (engine, _dir) = engine_with(planner).await;

        let outcome = engine.handle_turn(None, "good morning").await.unwrap();
        assert!(outcome.tool_calls.is_empty());
        assert_eq!(outcome.reply.content, "Hello! How can I help?");
    }

    #[tokio::test]
    async fn second_turn_reuses_the_session_and_keeps_the_title() {
        let planner = ScriptedPlanner::returning(vec![], "Noted.");
        let (engine, _dir) = engine_with(planner).await;

        let first = engine
            .handle_turn(None, "please check whether you carry anything about refactoring")
            .await
            .unwrap();
        let second = engine
            .handle_turn(Some(first.session_id), "and about testing?")
            .await
            .unwrap();
        assert_eq!(first.session_id, second.session_id);

        let messages = engine
            .store
            .session_messages(first.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(messages.len(), 4);

        // title came from the first message and stays put
        let sessions = engine.store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title, "please check whether you carry...");
    }
}
