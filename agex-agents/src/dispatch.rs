//! The think→act task loop (SPEC_FULL.md §4.5) and the sub-agent dispatch
//! hook that drives it recursively from inside the evaluator.
//!
//! `run_task_loop` is top-level-agnostic: it always returns
//! `Result<Value, TaskError>`, whether it was called for a host-level
//! `Task::invoke` or for an in-sandbox `@agent.task(...)` call. The two
//! call sites (`task::Task::invoke`, `Agent`'s own `TaskDispatcher` impl
//! below) are what differ — one raises `TaskError` straight to its caller,
//! the other folds it into a stdout line in the parent's live evaluation.

use crate::agent::Agent;
use agex_core::{
    ActionEvent, ClarifyEvent, ContinueEvent, ErrorEvent, Event, EventKind, FailEvent, Message, OrderedValue, Role,
    StateError, SuccessEvent, TaskError, TaskStartEvent, Value, ValueMap,
};
use agex_dsl::ast::Params;
use agex_dsl::{
    evaluate, parse, Env, EvalCtx, RunOutcome, RuntimeValue, Scanner, Signal, TaskDispatcher, TaskMarker, TaskOutcome,
    UserFunction,
};
use agex_context::{render_context_message, render_system_message};
use agex_llm::CompletionOptions;
use agex_storage::{child_namespace, State};
use indexmap::IndexMap;
use std::rc::Rc;

/// Binds `inputs` as the reserved task-start variable and records the
/// opening `TaskStartEvent`/user message every loop iteration's context
/// message builds on (SPEC_FULL.md §4.5 "Pre-invocation").
pub fn start_task(agent: &Agent, state: &dyn State, task_name: &str, inputs: Value, primer: &str) -> Result<(), StateError> {
    state.set("inputs", inputs.clone())?;
    let message = if primer.trim().is_empty() {
        format!("Begin task '{task_name}'.")
    } else {
        primer.to_string()
    };
    agex_events::append_event(
        state,
        &Event::new(
            agent.name.clone(),
            None,
            EventKind::TaskStart(TaskStartEvent {
                task_name: task_name.to_string(),
                inputs,
                message: message.clone(),
            }),
        ),
    )?;
    agex_events::append_message(state, &Message::text(Role::User, message))
}

/// Runs the bounded think→act loop to completion against `state`, which
/// must already carry the `inputs` binding `start_task` wrote. `on_event`
/// is called for every event as it's produced — `Task::stream` uses it to
/// collect a replay buffer; a plain `Task::invoke` passes a no-op.
pub fn run_task_loop(agent: &Agent, state: Rc<dyn State>, mut on_event: impl FnMut(Event)) -> Result<Value, TaskError> {
    let system_message = render_system_message(&agent.policy);
    let natives = agent.natives();
    let counter = agex_context::token_counter_for_model(agent.llm.model());
    let opts = CompletionOptions {
        temperature: Some(agent.config.llm.temperature),
        max_tokens: Some(agent.config.llm.max_tokens),
        top_p: Some(agent.config.llm.top_p),
    };

    let mut pending_stdout: Vec<String> = Vec::new();

    for iteration in 0..agent.config.limits.max_iterations {
        tracing::debug!(agent = %agent.name, iteration, "task loop iteration starting");

        let mut messages_list = vec![Message::text(Role::System, system_message.clone())];
        messages_list.extend(agex_events::messages(&*state));

        let response = agent.llm.complete_blocking(&messages_list, &opts).map_err(|e| {
            tracing::warn!(agent = %agent.name, iteration, error = %e, "llm call failed");
            TaskError::Llm(e)
        })?;

        agex_events::append_message(
            &*state,
            &Message::text(Role::Assistant, format!("{}\n\n```python\n{}\n```", response.thinking, response.code)),
        )
        .map_err(|e| TaskError::Fail(format!("failed to record assistant turn: {e}")))?;

        let action_event = Event::new(
            agent.name.clone(),
            None,
            EventKind::Action(ActionEvent { thinking: response.thinking.clone(), code: response.code.clone() }),
        );
        let _ = agex_events::append_event(&*state, &action_event);
        on_event(action_event);

        let run_result = run_code(agent, &natives, &response.code, state.clone());
        let mut stdout_lines = std::mem::take(&mut pending_stdout);

        match run_result {
            Ok(RunOutcome { outcome, stdout }) => {
                stdout_lines.extend(stdout);
                match outcome {
                    TaskOutcome::Success(v) => {
                        let value = v
                            .to_value()
                            .map_err(|reason| TaskError::Fail(format!("task result is not serializable: {reason}")))?;
                        let success_event =
                            Event::new(agent.name.clone(), None, EventKind::Success(SuccessEvent { result: value.clone() }));
                        let _ = agex_events::append_event(&*state, &success_event);
                        on_event(success_event);
                        return Ok(value);
                    }
                    TaskOutcome::Fail(message) => {
                        let fail_event =
                            Event::new(agent.name.clone(), None, EventKind::Fail(FailEvent { message: message.clone() }));
                        let _ = agex_events::append_event(&*state, &fail_event);
                        on_event(fail_event);
                        return Err(TaskError::Fail(message));
                    }
                    TaskOutcome::Clarify(message) => {
                        let clarify_event = Event::new(
                            agent.name.clone(),
                            None,
                            EventKind::Clarify(ClarifyEvent { message: message.clone() }),
                        );
                        let _ = agex_events::append_event(&*state, &clarify_event);
                        on_event(clarify_event);
                        return Err(TaskError::Clarify(message));
                    }
                    TaskOutcome::Continue(message) => {
                        let continue_event = Event::new(
                            agent.name.clone(),
                            None,
                            EventKind::Continue(ContinueEvent { message: message.clone() }),
                        );
                        let _ = agex_events::append_event(&*state, &continue_event);
                        on_event(continue_event);
                    }
                    TaskOutcome::Completed => {}
                }
            }
            Err(eval_err) => {
                stdout_lines.push(format!("Evaluation error: {eval_err}"));
                let error_event = Event::new(
                    agent.name.clone(),
                    None,
                    EventKind::Error(ErrorEvent { error: eval_err.to_string(), recoverable: true }),
                );
                let _ = agex_events::append_event(&*state, &error_event);
                on_event(error_event);
            }
        }

        let diffs = state.diffs();
        let rendered = render_context_message(&diffs, &stdout_lines, agent.config.token_budget as usize, counter.as_ref());
        agex_events::append_message(&*state, &Message::text(Role::User, rendered))
            .map_err(|e| TaskError::Fail(format!("failed to record context message: {e}")))?;

        if state.owns_snapshot() {
            let result = state.snapshot();
            tracing::debug!(agent = %agent.name, iteration, commit = %result.commit_hash, "state snapshotted");
            if !result.unsaved_keys.is_empty() {
                pending_stdout.push(format!(
                    "Warning: the following keys could not be saved to the state store: {}",
                    result.unsaved_keys.join(", ")
                ));
            }
        }
    }

    tracing::warn!(agent = %agent.name, max_iterations = agent.config.limits.max_iterations, "task loop exhausted its iteration budget");
    Err(TaskError::Timeout { max_iterations: agent.config.limits.max_iterations })
}

fn run_code(
    agent: &Agent,
    natives: &agex_dsl::eval::NativeRegistry,
    code: &str,
    state: Rc<dyn State>,
) -> Result<RunOutcome, agex_core::EvalError> {
    let tokens = Scanner::new(code).tokenize()?;
    let program = parse(tokens)?;
    let env = Env::root(state.clone());
    let mut ctx = EvalCtx::new(&agent.policy, natives, code, &agent.config.limits, state).with_dispatcher(agent);
    evaluate(&program.body, &env, &mut ctx)
}

/// Best-effort positional/keyword binding of a sub-agent call's arguments
/// into the `inputs` record the spawned task loop reads — the same shape
/// `Task::invoke`'s host-side callers build, just assembled from runtime
/// values already inside the sandbox instead of a serialized `In`.
fn bind_call_inputs(params: &Params, args: &[RuntimeValue], kwargs: &IndexMap<String, RuntimeValue>) -> Result<Value, String> {
    let mut map = ValueMap::default();
    for (i, p) in params.positional.iter().enumerate() {
        if let Some(v) = args.get(i).cloned().or_else(|| kwargs.get(&p.name).cloned()) {
            map.0.insert(OrderedValue(Value::Str(p.name.clone())), v.to_value()?);
        }
    }
    for p in &params.kwonly {
        if let Some(v) = kwargs.get(&p.name) {
            map.0.insert(OrderedValue(Value::Str(p.name.clone())), v.to_value()?);
        }
    }
    Ok(Value::dict(map))
}

impl TaskDispatcher for Agent {
    fn dispatch(
        &self,
        func: &Rc<UserFunction>,
        args: Vec<RuntimeValue>,
        kwargs: IndexMap<String, RuntimeValue>,
        span: agex_core::Span,
        ctx: &mut EvalCtx,
    ) -> Result<RuntimeValue, Signal> {
        let sub_name = func.task_marker.as_ref().and_then(|m: &TaskMarker| m.state_arg.clone()).unwrap_or_else(|| func.name.clone());

        let inputs_value = bind_call_inputs(&func.params, &args, &kwargs)
            .map_err(|reason| Signal::Error(agex_core::EvalError::NotSerializable { span, key: "inputs".into(), reason }))?;

        let child_state = child_namespace(ctx.state.clone(), &sub_name)
            .map_err(|e| Signal::Error(agex_core::EvalError::Value { span, message: e.to_string() }))?;

        start_task(self, &*child_state, &sub_name, inputs_value, "")
            .map_err(|e| Signal::Error(agex_core::EvalError::Value { span, message: e.to_string() }))?;

        match run_task_loop(self, child_state, |_event| {}) {
            Ok(value) => Ok(RuntimeValue::from_value(value)),
            Err(TaskError::Fail(message)) => {
                ctx.stdout.push(format!("Sub-agent '{sub_name}' failed: {message}"));
                Ok(RuntimeValue::none())
            }
            Err(TaskError::Clarify(message)) => {
                ctx.stdout.push(format!("Sub-agent '{sub_name}' needs clarification: {message}"));
                Ok(RuntimeValue::none())
            }
            Err(TaskError::Timeout { max_iterations }) => {
                ctx.stdout
                    .push(format!("Sub-agent '{sub_name}' did not finish within {max_iterations} iterations"));
                Ok(RuntimeValue::none())
            }
            Err(TaskError::Llm(e)) => {
                ctx.stdout.push(format!("Sub-agent '{sub_name}' could not reach its model: {e}"));
                Ok(RuntimeValue::none())
            }
        }
    }
}
