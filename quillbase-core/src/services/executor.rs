// services/executor.rs
// Plan executor
//
// Runs physical plans against collection contexts. One mailbox, one plan
// at a time: operations on a collection are linearized here.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Receiver};

use crate::collection::CollectionContext;
use crate::cursor::{Cursor, SubCursor};
use crate::error::ErrorCode;
use crate::expr::field_to_pointer;
use crate::log_trace;
use crate::operators::OperatorContext;
use crate::plan::{create_physical_plan, LogicalPlan, SortStep};
use crate::statement::Parameters;

use super::message::{Address, ExecutorMsg, MemoryStorageMsg, SessionId};

fn execute(
    session: &SessionId,
    plan: &LogicalPlan,
    parameters: Parameters,
    context: Arc<CollectionContext>,
) -> Cursor {
    if context.is_dropped() {
        return Cursor::with_error(ErrorCode::CollectionDropped, "collection dropped");
    }
    let mut physical = match create_physical_plan(&context, plan) {
        Ok(physical) => physical,
        Err(code) => return Cursor::with_error(code, "plan not executable"),
    };
    let trace = physical.trace();
    let ctx = OperatorContext {
        collection: Arc::clone(&context),
        parameters,
    };
    let code = physical.root.execute(&ctx);
    if !code.is_success() {
        return Cursor::with_error(code, code.as_str());
    }
    let mut documents = physical
        .root
        .output()
        .map(|data| data.documents().to_vec())
        .unwrap_or_default();
    if let Some(SortStep { key, ascending }) = &physical.sort {
        let pointer = field_to_pointer(key);
        documents.sort_by(|a, b| {
            let ordering = a.compare(&pointer, b, &pointer);
            if *ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    }

    let sub_cursor = Arc::new(SubCursor::with_documents(context.name().clone(), documents));
    // reads keep their cursor open until the session closes it
    if matches!(plan, LogicalPlan::Aggregate { .. }) {
        context.register_cursor(session.clone(), Arc::clone(&sub_cursor));
    }
    let mut cursor = Cursor::success();
    cursor.push(sub_cursor);
    cursor.set_plan_trace(trace);
    cursor
}

pub fn spawn() -> (Address<ExecutorMsg>, JoinHandle<()>) {
    let (sender, receiver): (Address<ExecutorMsg>, Receiver<ExecutorMsg>) = unbounded();
    let handle = std::thread::Builder::new()
        .name("quill-executor".to_string())
        .spawn(move || {
            while let Ok(message) = receiver.recv() {
                match message {
                    ExecutorMsg::ExecutePlan {
                        session,
                        plan,
                        parameters,
                        context,
                        sender,
                    } => {
                        log_trace!("executor: plan for {}, session {}", context.name(), session);
                        let cursor = execute(&session, &plan, parameters, context);
                        let _ = sender.send(MemoryStorageMsg::ExecutePlanFinish { session, cursor });
                    }
                    ExecutorMsg::Shutdown => break,
                }
            }
        })
        .expect("spawn executor thread");
    (sender, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::expr::{CompareKind, Expr};
    use crate::operators::Limit;
    use crate::plan::PlanStep;
    use crate::statement::CollectionName;
    use crate::value::ScalarValue;

    fn context_with(n: i64) -> Arc<CollectionContext> {
        let context = CollectionContext::new(CollectionName::new("db", "coll"));
        let mut storage = context.storage().write();
        for i in 0..n {
            storage.insert(
                Document::from_json(&format!(r#"{{"_id": "{:024}", "count": {}}}"#, i, i))
                    .unwrap(),
            );
        }
        drop(storage);
        context
    }

    #[test]
    fn test_execute_find_plan() {
        let context = context_with(50);
        let mut parameters = Parameters::default();
        parameters.add(1, ScalarValue::Int(40));
        let plan = LogicalPlan::Aggregate {
            name: context.name().clone(),
            steps: vec![PlanStep::Match {
                expr: Some(Expr::compare(CompareKind::Gt, "count", 1)),
            }],
            limit: Limit::unlimited(),
        };
        let session = SessionId::new();
        let cursor = execute(&session, &plan, parameters, Arc::clone(&context));
        assert!(cursor.is_success());
        assert_eq!(cursor.size(), 9);
        // the read registered its cursor under the session
        assert_eq!(context.open_cursors(), 1);
        assert!(context.close_cursor(&session));
    }

    #[test]
    fn test_execute_against_dropped_collection() {
        let context = context_with(1);
        context.drop_collection();
        let plan = LogicalPlan::Aggregate {
            name: context.name().clone(),
            steps: Vec::new(),
            limit: Limit::unlimited(),
        };
        let cursor = execute(&SessionId::new(), &plan, Parameters::default(), context);
        assert_eq!(cursor.error_code(), ErrorCode::CollectionDropped);
    }

    #[test]
    fn test_sort_applied_to_output() {
        let context = context_with(5);
        let plan = LogicalPlan::Aggregate {
            name: context.name().clone(),
            steps: vec![PlanStep::Sort(SortStep {
                key: "count".into(),
                ascending: false,
            })],
            limit: Limit::unlimited(),
        };
        let cursor = execute(&SessionId::new(), &plan, Parameters::default(), context);
        let first = cursor.first().unwrap();
        assert_eq!(first.get_long("/count"), Some(4));
    }
}
