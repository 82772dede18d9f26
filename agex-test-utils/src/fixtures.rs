//! Small Policy/NativeRegistry fixtures for sandbox and task-loop tests:
//! a recursive `math` module (mirrors `agex_policy::namespace`'s own
//! `math_module` test fixture) and a stateful `counter` instance, so tests
//! exercising module attribute access or live host objects don't each
//! redeclare the same registrations.

use agex_core::Value;
use agex_dsl::eval::value::{NativeFunction, RuntimeValue};
use agex_dsl::eval::Signal;
use agex_policy::{
    CandidateKind, CandidateMember, FunctionNamespace, InstanceNamespace, MemberSpec, ModuleNamespace, Pattern,
    Policy, Signature, StaticHostModule, Visibility,
};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

fn native_value_err(message: impl Into<String>) -> Signal {
    Signal::Error(agex_core::EvalError::Value {
        span: agex_core::Span::default(),
        message: message.into(),
    })
}

fn arg_f64(args: &[RuntimeValue], i: usize) -> Result<f64, Signal> {
    match args.get(i) {
        Some(RuntimeValue::Data(Value::Int(n))) => Ok(*n as f64),
        Some(RuntimeValue::Data(Value::Float(f))) => Ok(*f),
        _ => Err(native_value_err(format!("expected a numeric argument at position {i}"))),
    }
}

/// Registers a `math` module exposing `sqrt`, `pow`, and the constant
/// `pi`, matching the shape `agex_policy::namespace`'s own test fixture
/// uses for scenario coverage (spec.md Testable Property / Scenario S1,
/// "reading a registered module's constant and calling its function").
pub fn math_fixture(policy: &mut Policy, natives: &mut agex_dsl::eval::NativeRegistry) {
    policy.register_module(ModuleNamespace {
        name: "math".into(),
        host: Arc::new(StaticHostModule {
            candidates: vec![
                CandidateMember {
                    name: "sqrt".into(),
                    kind: CandidateKind::Function(Signature {
                        params: vec!["x".into()],
                        return_type: Some("float".into()),
                    }),
                },
                CandidateMember {
                    name: "pow".into(),
                    kind: CandidateKind::Function(Signature {
                        params: vec!["base".into(), "exp".into()],
                        return_type: Some("float".into()),
                    }),
                },
                CandidateMember {
                    name: "pi".into(),
                    kind: CandidateKind::Constant,
                },
            ],
        }),
        include: Pattern::All,
        exclude: Pattern::None,
        overrides: Default::default(),
        recursive: true,
        visibility: Visibility::High,
        docstring: Some("A minimal math module fixture.".into()),
    });

    natives.register(
        "math.sqrt",
        NativeFunction {
            name: "math.sqrt".into(),
            call: Rc::new(|args, _kwargs, _span, _ctx| {
                let x = arg_f64(args, 0)?;
                Ok(RuntimeValue::Data(Value::Float(x.sqrt())))
            }),
        },
    );
    natives.register(
        "math.pow",
        NativeFunction {
            name: "math.pow".into(),
            call: Rc::new(|args, _kwargs, _span, _ctx| {
                let base = arg_f64(args, 0)?;
                let exp = arg_f64(args, 1)?;
                Ok(RuntimeValue::Data(Value::Float(base.powf(exp))))
            }),
        },
    );
    natives.register(
        "math.pi",
        NativeFunction {
            name: "math.pi".into(),
            call: Rc::new(|_args, _kwargs, _span, _ctx| Ok(RuntimeValue::Data(Value::Float(std::f64::consts::PI)))),
        },
    );
}

/// Registers a live `counter` instance with `increment()`/`value()`
/// methods backed by a shared `Rc<Cell<i64>>`, returned to the caller so
/// a test can observe the mutation from outside the sandbox (spec.md
/// Scenario S4, "a registered host instance carries state across
/// iterations").
pub fn counter_fixture(policy: &mut Policy, natives: &mut agex_dsl::eval::NativeRegistry) -> Rc<Cell<i64>> {
    let count = Rc::new(Cell::new(0i64));

    policy.register_instance(InstanceNamespace {
        name: "counter".into(),
        include: Pattern::All,
        exclude: Pattern::None,
        members: [
            (
                "increment".to_string(),
                FunctionNamespace {
                    name: "counter.increment".into(),
                    signature: Signature {
                        params: vec![],
                        return_type: Some("int".into()),
                    },
                    spec: MemberSpec::new(Visibility::High),
                },
            ),
            (
                "value".to_string(),
                FunctionNamespace {
                    name: "counter.value".into(),
                    signature: Signature {
                        params: vec![],
                        return_type: Some("int".into()),
                    },
                    spec: MemberSpec::new(Visibility::High),
                },
            ),
        ]
        .into_iter()
        .collect(),
        overrides: Default::default(),
        exception_mappings: Default::default(),
    });

    let inc_count = Rc::clone(&count);
    natives.register(
        "counter.increment",
        NativeFunction {
            name: "counter.increment".into(),
            call: Rc::new(move |_args, _kwargs, _span, _ctx| {
                inc_count.set(inc_count.get() + 1);
                Ok(RuntimeValue::Data(Value::Int(inc_count.get())))
            }),
        },
    );
    let read_count = Rc::clone(&count);
    natives.register(
        "counter.value",
        NativeFunction {
            name: "counter.value".into(),
            call: Rc::new(move |_args, _kwargs, _span, _ctx| Ok(RuntimeValue::Data(Value::Int(read_count.get())))),
        },
    );

    count
}
