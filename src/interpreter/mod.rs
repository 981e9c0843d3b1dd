//! Event command interpreter.
//!
//! An `Interpreter` owns a stack of `InterpreterContext`s. The bottom frame is the event that
//! started running; every `call_event` or common event pushes a child one level deeper, and the
//! top frame is the only one that executes. When a child runs off the end of its list it is
//! popped and the caller resumes within the same tick.

pub mod invoker;
mod script;

use std::rc::Rc;

use smallvec::SmallVec;

use crate::config::InterpreterConfig;
use crate::data::{CommonEvent, DataTables};
use crate::error::FieldError;
use crate::events::{EventBus, FieldEvent};
use crate::map::event::{opcode, Instruction, MapEvent};
use crate::map::self_switches::SelfSwitches;
use crate::map::{Direction, GameMap};

use invoker::EventTarget;
use script::{ScriptCall, ScriptRunner};

/// Where a context's instruction list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSource {
    MapEvent { map_id: u32, event_id: u32 },
    CommonEvent { id: u32 },
    /// Bound to nothing: host-supplied lists and frames that outlived a map change.
    Detached,
}

#[derive(Debug, Clone)]
pub struct InterpreterContext {
    depth: u32,
    source: ContextSource,
    /// Event the commands act on behalf of. Common events inherit their caller's; 0 means none.
    event_id: u32,
    list: Rc<[Instruction]>,
    cursor: usize,
    wait_count: u32,
}

impl InterpreterContext {
    pub(crate) fn for_event(depth: u32, map_id: u32, event: &MapEvent) -> Option<Self> {
        let list = event.list()?;
        Some(Self {
            depth,
            source: ContextSource::MapEvent { map_id, event_id: event.id },
            event_id: event.id,
            list: Rc::from(list),
            cursor: 0,
            wait_count: 0,
        })
    }

    fn for_common(depth: u32, common: &CommonEvent, event_id: u32) -> Self {
        Self {
            depth,
            source: ContextSource::CommonEvent { id: common.id },
            event_id,
            list: Rc::from(common.list.as_slice()),
            cursor: 0,
            wait_count: 0,
        }
    }

    fn detached(depth: u32, list: Vec<Instruction>, event_id: u32) -> Self {
        Self { depth, source: ContextSource::Detached, event_id, list: Rc::from(list), cursor: 0, wait_count: 0 }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn source(&self) -> ContextSource {
        self.source
    }

    pub fn event_id(&self) -> u32 {
        self.event_id
    }

    pub fn list(&self) -> &[Instruction] {
        &self.list
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn wait_count(&self) -> u32 {
        self.wait_count
    }
}

/// Player transfer requested by a command; applied by the runtime after the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub map_id: u32,
    pub x: i32,
    pub y: i32,
    pub direction: Option<Direction>,
}

/// State commands read and write while a tick runs.
pub struct InterpreterEnv<'a> {
    pub map: &'a mut GameMap,
    pub tables: &'a DataTables,
    pub self_switches: &'a mut SelfSwitches,
    pub events: &'a mut EventBus,
    pub transfer: &'a mut Option<TransferRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was running.
    Idle,
    /// The top frame is counting down a wait.
    Waiting,
    /// Stopped early: command budget spent or a transfer is pending.
    Yielded,
    /// The last frame completed during this tick.
    Finished,
}

enum Flow {
    Continue,
    Yield,
}

pub struct Interpreter {
    base_depth: u32,
    max_depth: u32,
    commands_per_tick: u32,
    frames: SmallVec<[InterpreterContext; 4]>,
    scripts: ScriptRunner,
}

impl Interpreter {
    pub fn new(base_depth: u32, config: &InterpreterConfig) -> Self {
        Self {
            base_depth,
            max_depth: config.max_depth,
            commands_per_tick: config.commands_per_tick.max(1),
            frames: SmallVec::new(),
            scripts: ScriptRunner::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn frames(&self) -> &[InterpreterContext] {
        &self.frames
    }

    /// Depth of the frame currently executing, or the base depth when idle.
    pub fn depth(&self) -> u32 {
        self.frames.last().map_or(self.base_depth, InterpreterContext::depth)
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Starts `event_id`'s active page. Does nothing while another event is running or when the
    /// event has nothing executable.
    pub fn setup_event(&mut self, map: &GameMap, event_id: u32) -> bool {
        if self.is_running() {
            return false;
        }
        let Some(event) = map.event_by_id(event_id).filter(|event| event.is_executable()) else {
            return false;
        };
        match InterpreterContext::for_event(self.base_depth, map.map_id(), event) {
            Some(context) => {
                tracing::debug!(target: "field::interpreter", map_id = map.map_id(), event_id, "event started");
                self.frames.push(context);
                true
            }
            None => false,
        }
    }

    /// Runs an arbitrary list on behalf of `event_id` (0 for none).
    pub fn setup_list(&mut self, list: Vec<Instruction>, event_id: u32) -> bool {
        if self.is_running() {
            return false;
        }
        self.frames.push(InterpreterContext::detached(self.base_depth, list, event_id));
        true
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Pushes a child running `target`'s active page. The child executes before the current
    /// frame resumes. `Ok(false)` when the target is absent or has nothing to run.
    pub fn call(&mut self, map: &GameMap, target: EventTarget<'_>) -> Result<bool, FieldError> {
        match invoker::prepare_call(map, target, self.depth(), self.max_depth)? {
            Some(child) => {
                tracing::debug!(
                    target: "field::interpreter",
                    depth = child.depth,
                    event_id = child.event_id,
                    "call_event pushed child"
                );
                self.frames.push(child);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn call_by_name(&mut self, map: &GameMap, name: &str) -> Result<bool, FieldError> {
        self.call(map, EventTarget::Name(name))
    }

    pub fn call_by_id(&mut self, map: &GameMap, id: u32) -> Result<bool, FieldError> {
        self.call(map, EventTarget::Id(id))
    }

    /// Advances the stack by one frame's worth of work.
    pub fn update(&mut self, env: &mut InterpreterEnv<'_>) -> Result<TickOutcome, FieldError> {
        if self.frames.is_empty() {
            return Ok(TickOutcome::Idle);
        }
        self.revalidate(env.map);
        let mut executed = 0u32;
        loop {
            let Some(top) = self.frames.last_mut() else {
                return Ok(TickOutcome::Finished);
            };
            if top.wait_count > 0 {
                top.wait_count -= 1;
                return Ok(TickOutcome::Waiting);
            }
            if executed >= self.commands_per_tick {
                return Ok(TickOutcome::Yielded);
            }
            let Some(instruction) = top.list.get(top.cursor).cloned() else {
                self.pop_frame("list ended");
                continue;
            };
            top.cursor += 1;
            executed += 1;
            if let Flow::Yield = self.execute(&instruction, env)? {
                return Ok(TickOutcome::Yielded);
            }
        }
    }

    /// Drops frames whose owning event has been erased or removed, along with everything they
    /// called. Frames from a previous map keep running without an owner.
    fn revalidate(&mut self, map: &GameMap) {
        let mut cut = None;
        for (index, frame) in self.frames.iter_mut().enumerate() {
            let ContextSource::MapEvent { map_id, event_id } = frame.source else {
                continue;
            };
            if map_id != map.map_id() {
                frame.source = ContextSource::Detached;
                frame.event_id = 0;
                continue;
            }
            if !map.event_by_id(event_id).is_some_and(|event| !event.erased) {
                cut = Some((index, event_id));
                break;
            }
        }
        if let Some((index, event_id)) = cut {
            let invalid = FieldError::InvalidTarget { map_id: map.map_id(), event_id };
            tracing::debug!(
                target: "field::interpreter",
                dropped = self.frames.len() - index,
                "cancelling frames: {invalid}"
            );
            self.frames.truncate(index);
        }
    }

    fn pop_frame(&mut self, reason: &str) {
        if let Some(frame) = self.frames.pop() {
            tracing::trace!(target: "field::interpreter", depth = frame.depth, event_id = frame.event_id, "{reason}");
        }
    }

    fn execute(&mut self, instruction: &Instruction, env: &mut InterpreterEnv<'_>) -> Result<Flow, FieldError> {
        let Some(top) = self.frames.last() else {
            return Ok(Flow::Continue);
        };
        let depth = top.depth;
        let event_id = top.event_id;
        match instruction.code {
            opcode::END => {
                if instruction.indent == 0 {
                    self.pop_frame("end of list");
                }
            }
            opcode::COMMENT | opcode::COMMENT_CONTINUED => {}
            opcode::WAIT => {
                let frames = instruction.int_param(0).unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32;
                if let Some(top) = self.frames.last_mut() {
                    top.wait_count = frames;
                }
            }
            opcode::EXIT_EVENT => self.pop_frame("exit event"),
            opcode::CALL_COMMON_EVENT => {
                let id = instruction.int_param(0).unwrap_or(0);
                let common = u32::try_from(id).ok().and_then(|id| env.tables.common_event(id));
                match common {
                    Some(common) => {
                        let child_depth = depth + 1;
                        if child_depth > self.max_depth {
                            return Err(FieldError::RecursionOverflow { depth: child_depth, limit: self.max_depth });
                        }
                        self.frames.push(InterpreterContext::for_common(child_depth, common, event_id));
                    }
                    None => {
                        tracing::debug!(target: "field::interpreter", common_event = id, "unknown common event");
                    }
                }
            }
            opcode::CONTROL_SELF_SWITCH => {
                if event_id > 0 {
                    if let Some(switch) = instruction.str_param(0) {
                        // 0 turns the switch on, anything else turns it off.
                        let value = instruction.int_param(1).unwrap_or(0) == 0;
                        let map_id = env.map.map_id();
                        env.self_switches.set(map_id, Some(event_id), switch, value);
                        env.events.push(FieldEvent::SelfSwitchChanged {
                            map_id,
                            event_id: Some(event_id),
                            switch: switch.to_string(),
                            value,
                        });
                    }
                }
                env.map.need_refresh = true;
            }
            opcode::TRANSFER_PLAYER => {
                let request = TransferRequest {
                    map_id: instruction.int_param(1).and_then(|id| u32::try_from(id).ok()).unwrap_or(0),
                    x: instruction.int_param(2).unwrap_or(0) as i32,
                    y: instruction.int_param(3).unwrap_or(0) as i32,
                    direction: instruction.int_param(4).and_then(Direction::from_code),
                };
                if instruction.int_param(0).unwrap_or(0) != 0 || request.map_id == 0 {
                    tracing::warn!(target: "field::interpreter", event_id, "unsupported transfer designation");
                    return Ok(Flow::Continue);
                }
                *env.transfer = Some(request);
                return Ok(Flow::Yield);
            }
            opcode::SCRIPT => {
                let source = self.collect_script(instruction);
                let call = ScriptCall { caller_depth: depth, max_depth: self.max_depth, event_id };
                if let Some(child) = self.scripts.run(&source, call, env)? {
                    self.frames.push(child);
                }
            }
            // Continuation lines are consumed by their SCRIPT head; a stray one does nothing.
            opcode::SCRIPT_CONTINUED => {}
            code => {
                tracing::trace!(target: "field::interpreter", code, "unsupported command skipped");
            }
        }
        Ok(Flow::Continue)
    }

    /// Joins a SCRIPT head with its continuation lines and moves the cursor past them.
    fn collect_script(&mut self, head: &Instruction) -> String {
        let mut source = head.str_param(0).unwrap_or_default().to_string();
        if let Some(top) = self.frames.last_mut() {
            while let Some(next) = top.list.get(top.cursor).filter(|next| next.code == opcode::SCRIPT_CONTINUED) {
                source.push('\n');
                source.push_str(next.str_param(0).unwrap_or_default());
                top.cursor += 1;
            }
        }
        source
    }
}
