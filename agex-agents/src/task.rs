//! `Task<In, Out>`: the host-facing handle `Agent::task` hands back, built
//! from `@agent.task(primer)` in `original_source/agex/agent/task.py`. Two
//! entry points instead of Python's single function-with-a-`.stream`-
//! attribute trick: `invoke` runs the loop to completion and decodes the
//! result, `stream` runs it the same way but returns the events it
//! produced for incremental inspection.

use crate::agent::Agent;
use crate::dispatch::{run_task_loop, start_task};
use crate::validation::{validate, TypeSpec, TypeSpecOf};
use agex_core::{ErrorEvent, Event, EventKind, TaskError, Value};
use agex_storage::{base_store, MemoryBackend, State, StoreKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

/// A bound task: an agent, a name, an opening primer, and the structural
/// shape its decoded result must match. `In`/`Out` exist only at the host
/// boundary — nothing about the sandboxed language sees them.
pub struct Task<In, Out> {
    agent: Arc<Agent>,
    name: String,
    primer: String,
    out_spec: TypeSpec,
    _marker: PhantomData<fn(In) -> Out>,
}

impl Agent {
    /// Builds a `Task` bound to this agent. `name` identifies the task in
    /// events and logs; `primer` is the opening instruction shown to the
    /// model before its first turn.
    pub fn task<In, Out>(self: &Arc<Agent>, name: impl Into<String>, primer: impl Into<String>) -> Task<In, Out>
    where
        In: Serialize,
        Out: DeserializeOwned + TypeSpecOf,
    {
        Task {
            agent: self.clone(),
            name: name.into(),
            primer: primer.into(),
            out_spec: Out::type_spec(),
            _marker: PhantomData,
        }
    }
}

impl<In, Out> Task<In, Out>
where
    In: Serialize,
    Out: DeserializeOwned,
{
    /// Resolves the root state per the state-ownership rules (SPEC_FULL.md
    /// §4.5): a caller-supplied store is used as-is, `None` gets a fresh
    /// transient one that the loop never commits.
    fn prepare(&self, args: In, state: Option<Rc<dyn State>>) -> Result<Rc<dyn State>, TaskError> {
        let root = state.unwrap_or_else(|| base_store(StoreKind::Transient, Box::new(MemoryBackend::new())));
        let json = serde_json::to_value(&args)
            .map_err(|e| TaskError::Fail(format!("task arguments could not be serialized: {e}")))?;
        let inputs = Value::from_json(json);
        start_task(&self.agent, &*root, &self.name, inputs, &self.primer)
            .map_err(|e| TaskError::Fail(format!("failed to start task: {e}")))?;
        Ok(root)
    }

    /// Runs the task loop to completion and decodes its result into `Out`,
    /// validating the decoded value's shape first.
    pub fn invoke(&self, args: In, state: Option<Rc<dyn State>>) -> Result<Out, TaskError>
    where
        Out: TypeSpecOf,
    {
        let root = self.prepare(args, state)?;
        let value = run_task_loop(&self.agent, root, |_event| {})?;
        validate(&value, &self.out_spec, &self.agent.config.limits)
            .map_err(|e| TaskError::Fail(format!("task result failed validation: {e}")))?;
        let json = value.to_json();
        serde_json::from_value(json).map_err(|e| TaskError::Fail(format!("task result could not be decoded: {e}")))
    }

    /// Runs the task loop to completion, returning every event it produced
    /// in order. A deliberate simplification over true incremental
    /// streaming: the loop already has to run synchronously end-to-end (an
    /// LLM call blocks the calling thread regardless), so there is nothing
    /// to gain from suspending between iterations — only from handing the
    /// caller the full trace once it's available.
    pub fn stream(&self, args: In, state: Option<Rc<dyn State>>) -> impl Iterator<Item = Event> {
        let mut events = Vec::new();
        match self.prepare(args, state) {
            Ok(root) => {
                let result = run_task_loop(&self.agent, root, |event| events.push(event));
                if let Err(err) = result {
                    events.push(Event::new(
                        self.agent.name.clone(),
                        None,
                        EventKind::Error(ErrorEvent { error: err.to_string(), recoverable: false }),
                    ));
                }
            }
            Err(err) => {
                events.push(Event::new(
                    self.agent.name.clone(),
                    None,
                    EventKind::Error(ErrorEvent { error: err.to_string(), recoverable: false }),
                ));
            }
        }
        events.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentBuilder;
    use agex_llm::LlmClient;
    use agex_test_utils::{math_fixture, DummyLlmClient};
    use serde::Deserialize;

    #[derive(Serialize)]
    struct SqrtArgs {
        x: f64,
    }

    #[derive(Deserialize, Debug, PartialEq)]
    struct SqrtResult {
        answer: f64,
    }
    impl TypeSpecOf for SqrtResult {
        fn type_spec() -> TypeSpec {
            TypeSpec::Any
        }
    }

    fn build_agent(responses: Vec<&str>) -> Arc<Agent> {
        let mut builder = AgentBuilder::new(
            format!("task-tests-{}", uuid::Uuid::now_v7()),
            "computes square roots",
        );
        let mut throwaway_natives = agex_dsl::eval::NativeRegistry::new();
        math_fixture(builder.policy_mut(), &mut throwaway_natives);
        builder
            .with_natives(move || {
                let mut n = agex_dsl::eval::NativeRegistry::new();
                let mut dummy_policy = agex_policy::Policy::new("");
                math_fixture(&mut dummy_policy, &mut n);
                n
            })
            .with_llm(Arc::new(DummyLlmClient::with_responses(responses.into_iter().map(String::from).collect())) as Arc<dyn LlmClient + Send + Sync>)
            .build_and_register()
            .unwrap()
    }

    #[test]
    fn invoke_decodes_a_successful_result() {
        let agent = build_agent(vec!["task_success({'answer': math.sqrt(inputs['x'])})"]);
        let task: Task<SqrtArgs, SqrtResult> = agent.task("sqrt", "compute a square root");
        let out = task.invoke(SqrtArgs { x: 9.0 }, None).unwrap();
        assert!((out.answer - 3.0).abs() < 1e-9);
    }

    #[test]
    fn invoke_raises_task_fail() {
        let agent = build_agent(vec!["task_fail('cannot do it')"]);
        let task: Task<SqrtArgs, SqrtResult> = agent.task("sqrt", "compute a square root");
        let err = task.invoke(SqrtArgs { x: 9.0 }, None).unwrap_err();
        assert!(matches!(err, TaskError::Fail(_)));
    }

    #[test]
    fn stream_collects_every_event() {
        let agent = build_agent(vec!["task_success(1)"]);
        let task: Task<SqrtArgs, Value> = agent.task("sqrt", "compute a square root");
        let events: Vec<Event> = task.stream(SqrtArgs { x: 4.0 }, None).collect();
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::Action(_))));
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::Success(_))));
    }
}
