use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use rhai::{Engine, EvalAltResult, ImmutableString, Position, Scope, AST, INT};

use crate::error::FieldError;
use crate::events::FieldEvent;
use crate::map::self_switches::SelfSwitches;
use crate::map::GameMap;

use super::invoker::{self, EventTarget};
use super::{InterpreterContext, InterpreterEnv};

const MAX_OPERATIONS: u64 = 1_000_000;

#[derive(Debug, Clone, Copy)]
pub(crate) struct ScriptCall {
    pub caller_depth: u32,
    pub max_depth: u32,
    pub event_id: u32,
}

/// World state lent to the engine for the duration of one script command.
struct ScriptSession {
    map: GameMap,
    self_switches: SelfSwitches,
    call: ScriptCall,
    /// The most recent successful call. A later call replaces an earlier one.
    child: Option<InterpreterContext>,
    overflow: Option<FieldError>,
    events: Vec<FieldEvent>,
}

type Bridge = Rc<RefCell<Option<ScriptSession>>>;

pub(crate) struct ScriptRunner {
    engine: Engine,
    bridge: Bridge,
    ast_cache: HashMap<String, AST>,
}

impl ScriptRunner {
    pub fn new() -> Self {
        let bridge: Bridge = Rc::new(RefCell::new(None));
        let mut engine = Engine::new();
        engine.set_fast_operators(true);
        engine.set_max_operations(MAX_OPERATIONS);
        register_api(&mut engine, &bridge);
        Self { engine, bridge, ast_cache: HashMap::new() }
    }

    /// Evaluates one SCRIPT command. Returns the event it called, if any.
    pub fn run(
        &mut self,
        source: &str,
        call: ScriptCall,
        env: &mut InterpreterEnv<'_>,
    ) -> Result<Option<InterpreterContext>, FieldError> {
        let event_id = call.event_id;
        if !self.ast_cache.contains_key(source) {
            let ast = self
                .engine
                .compile(source)
                .map_err(|err| FieldError::Script { event_id, message: err.to_string() })?;
            self.ast_cache.insert(source.to_string(), ast);
        }
        let Some(ast) = self.ast_cache.get(source) else {
            return Ok(None);
        };

        *self.bridge.borrow_mut() = Some(ScriptSession {
            map: mem::take(env.map),
            self_switches: mem::take(env.self_switches),
            call,
            child: None,
            overflow: None,
            events: Vec::new(),
        });
        let result = self.engine.run_ast_with_scope(&mut Scope::new(), ast);
        let session = self.bridge.borrow_mut().take();
        let Some(session) = session else {
            return Err(FieldError::Script { event_id, message: "script session was lost".into() });
        };
        *env.map = session.map;
        *env.self_switches = session.self_switches;
        env.events.extend(session.events);

        if let Some(overflow) = session.overflow {
            return Err(overflow);
        }
        result.map_err(|err| FieldError::Script { event_id, message: err.to_string() })?;
        Ok(session.child)
    }
}

fn runtime_error(message: String) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(message.into(), Position::NONE).into()
}

fn call(bridge: &Bridge, target: EventTarget<'_>) -> Result<bool, Box<EvalAltResult>> {
    let mut guard = bridge.borrow_mut();
    let Some(session) = guard.as_mut() else {
        return Ok(false);
    };
    match invoker::prepare_call(&session.map, target, session.call.caller_depth, session.call.max_depth) {
        Ok(Some(child)) => {
            if let Some(replaced) = session.child.replace(child) {
                tracing::debug!(
                    target: "field::script",
                    event_id = replaced.event_id(),
                    "later call_event replaces the pending child"
                );
            }
            Ok(true)
        }
        Ok(None) => Ok(false),
        Err(err) => {
            let message = err.to_string();
            session.overflow = Some(err);
            Err(runtime_error(message))
        }
    }
}

fn with_session<T>(bridge: &Bridge, fallback: T, f: impl FnOnce(&mut ScriptSession) -> T) -> T {
    match bridge.borrow_mut().as_mut() {
        Some(session) => f(session),
        None => fallback,
    }
}

fn register_api(engine: &mut Engine, bridge: &Bridge) {
    let session = Rc::clone(bridge);
    engine.register_fn("call_event", move |name: ImmutableString| call(&session, EventTarget::Name(&name)));

    let session = Rc::clone(bridge);
    engine.register_fn("call_event_by_id", move |id: INT| match u32::try_from(id) {
        Ok(id) => call(&session, EventTarget::Id(id)),
        Err(_) => Ok(false),
    });

    let session = Rc::clone(bridge);
    engine.register_fn("can_call_event", move |name: ImmutableString| {
        with_session(&session, false, |s| invoker::can_call(&s.map, EventTarget::Name(&name)))
    });

    let session = Rc::clone(bridge);
    engine.register_fn("can_call_event_by_id", move |id: INT| {
        let Ok(id) = u32::try_from(id) else {
            return false;
        };
        with_session(&session, false, |s| invoker::can_call(&s.map, EventTarget::Id(id)))
    });

    let session = Rc::clone(bridge);
    engine.register_fn("get_others_self_switch", move |name: ImmutableString, switch: ImmutableString| {
        with_session(&session, false, |s| invoker::get_self_switch(&s.map, &s.self_switches, &name, &switch))
    });

    let session = Rc::clone(bridge);
    engine.register_fn(
        "set_others_self_switch",
        move |name: ImmutableString, switch: ImmutableString, value: bool| {
            with_session(&session, (), |s| {
                let event_id = invoker::set_self_switch(&mut s.map, &mut s.self_switches, &name, &switch, value);
                s.events.push(FieldEvent::SelfSwitchChanged {
                    map_id: s.map.map_id(),
                    event_id,
                    switch: switch.to_string(),
                    value,
                });
            })
        },
    );

    let session = Rc::clone(bridge);
    engine.register_fn("event_id", move || with_session(&session, 0, |s| INT::from(s.call.event_id)));

    let session = Rc::clone(bridge);
    engine.register_fn("log", move |message: ImmutableString| {
        with_session(&session, (), |s| {
            tracing::info!(target: "field::script", event_id = s.call.event_id, "{message}");
            s.events.push(FieldEvent::ScriptLog { event_id: s.call.event_id, message: message.to_string() });
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataTables, Tileset};
    use crate::events::EventBus;
    use crate::interpreter::TransferRequest;
    use crate::map::event::{opcode, Instruction, MapEvent};
    use serde_json::json;

    fn runnable(id: u32, name: &str) -> MapEvent {
        MapEvent::with_list(id, name, vec![Instruction::new(opcode::WAIT, vec![json!(1)]), Instruction::end()])
    }

    struct Fixture {
        map: GameMap,
        tables: DataTables,
        switches: SelfSwitches,
        bus: EventBus,
        transfer: Option<TransferRequest>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut map = GameMap::new(2, 8, 8, Tileset::default());
            map.insert_event(runnable(1, "Caller"));
            map.insert_event(runnable(5, "Door"));
            map.insert_event(runnable(6, "Lamp"));
            Self {
                map,
                tables: DataTables::default(),
                switches: SelfSwitches::new(),
                bus: EventBus::default(),
                transfer: None,
            }
        }

        fn run(
            &mut self,
            runner: &mut ScriptRunner,
            source: &str,
            depth: u32,
        ) -> Result<Option<InterpreterContext>, FieldError> {
            let mut env = InterpreterEnv {
                map: &mut self.map,
                tables: &self.tables,
                self_switches: &mut self.switches,
                events: &mut self.bus,
                transfer: &mut self.transfer,
            };
            runner.run(source, ScriptCall { caller_depth: depth, max_depth: 100, event_id: 1 }, &mut env)
        }
    }

    #[test]
    fn world_state_is_returned_after_the_script() {
        let mut fixture = Fixture::new();
        let mut runner = ScriptRunner::new();
        fixture.run(&mut runner, r#"set_others_self_switch("Door", "A", true);"#, 0).expect("script");
        assert_eq!(fixture.map.event_count(), 3);
        assert!(fixture.switches.get(2, Some(5), "A"));
        assert!(fixture.map.need_refresh);
        assert!(matches!(fixture.bus.drain().as_slice(), [FieldEvent::SelfSwitchChanged { event_id: Some(5), .. }]));
    }

    #[test]
    fn last_successful_call_becomes_the_child() {
        let mut fixture = Fixture::new();
        let mut runner = ScriptRunner::new();
        let child = fixture
            .run(&mut runner, r#"call_event("Door"); call_event_by_id(6); call_event("Missing");"#, 4)
            .expect("script")
            .expect("child");
        assert_eq!(child.event_id(), 6);
        assert_eq!(child.depth(), 5);

        let none = fixture.run(&mut runner, r#"call_event("Missing");"#, 0).expect("script");
        assert!(none.is_none());
    }

    #[test]
    fn query_functions_see_the_lent_map() {
        let mut fixture = Fixture::new();
        let mut runner = ScriptRunner::new();
        let source = r#"
            if !can_call_event("Door") || can_call_event("Nobody") || !can_call_event_by_id(6) {
                throw "unexpected";
            }
            if get_others_self_switch("Door", "A") { throw "switch should be off"; }
            log("checked " + event_id());
        "#;
        fixture.run(&mut runner, source, 0).expect("script");
        assert_eq!(
            fixture.bus.drain(),
            vec![FieldEvent::ScriptLog { event_id: 1, message: "checked 1".into() }]
        );
    }

    #[test]
    fn overflow_aborts_and_keeps_the_world() {
        let mut fixture = Fixture::new();
        let mut runner = ScriptRunner::new();
        let err = fixture.run(&mut runner, r#"call_event("Door"); log("unreachable");"#, 100).unwrap_err();
        assert!(matches!(err, FieldError::RecursionOverflow { depth: 101, limit: 100 }));
        assert_eq!(fixture.map.event_count(), 3);
        assert!(fixture.bus.is_empty());
    }

    #[test]
    fn syntax_errors_surface_as_script_errors() {
        let mut fixture = Fixture::new();
        let mut runner = ScriptRunner::new();
        let err = fixture.run(&mut runner, "call_event(", 0).unwrap_err();
        assert!(matches!(err, FieldError::Script { event_id: 1, .. }));
        assert_eq!(fixture.map.event_count(), 3);
    }
}
