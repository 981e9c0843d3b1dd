use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::bitmap_cache::{BitmapCache, BitmapLoader, NullBitmapLoader};
use crate::cli::CliOverrides;
use crate::config::FieldConfig;
use crate::data::{self, DataSource, FsDataSource, WorldSnapshot};
use crate::debug::DebugMode;
use crate::events::{EventBus, FieldEvent};
use crate::input::{Input, InputButton};
use crate::interpreter::invoker::EventInvoker;
use crate::interpreter::{Interpreter, InterpreterEnv, TickOutcome, TransferRequest};
use crate::map::player::Player;
use crate::map::self_switches::SelfSwitches;
use crate::map::{Direction, GameMap};
use crate::overlay::backend::{HeadlessBackend, OverlayBackend};
use crate::overlay::CollisionOverlay;
use crate::plugins::{FieldContext, FieldPlugin, PluginManager};
use crate::reload::ReloadWatcher;
use crate::scene::{ActiveScene, MapScene, SceneKind};

const DEFAULT_CONFIG_PATH: &str = "config/field.json";
const INPUT_CONFIG_PATH: &str = "config/input.json";
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Runs a headless field session for `cli.frames()` frames, logging every host event.
pub fn run_with_overrides(cli: &CliOverrides) -> Result<()> {
    let config_path = cli.config_path().map(|path| path.as_path()).unwrap_or(Path::new(DEFAULT_CONFIG_PATH));
    let mut config = FieldConfig::load_or_default(config_path);
    let overrides = cli.config_overrides();
    if !overrides.is_empty() {
        tracing::info!(target: "field::cli", fields = ?overrides.applied_fields(), "applying CLI overrides");
        config.apply_overrides(&overrides);
    }
    let working_dir = std::env::current_dir().context("resolve working directory")?;
    let debug = DebugMode::detect(&config.debug, &working_dir);
    let source = Box::new(FsDataSource::new(config.data.root.clone()));
    let mut runtime = FieldRuntime::new(config, source, Box::new(NullBitmapLoader::default()), debug)?
        .with_default_plugins(HeadlessBackend::new())?;

    let mut input = Input::from_config(INPUT_CONFIG_PATH);
    for _ in 0..cli.frames() {
        let outcome = runtime.update(&input);
        for event in runtime.drain_events() {
            tracing::info!(target: "field::session", frame = runtime.frame_count(), "{event}");
        }
        outcome?;
        input.clear_frame();
        thread::sleep(FRAME_INTERVAL);
    }
    tracing::info!(target: "field::session", frames = runtime.frame_count(), "field session finished");
    Ok(())
}

/// Owns a field session: the world, the map interpreter and the registered plugins.
pub struct FieldRuntime {
    ctx: FieldContext,
    plugins: PluginManager,
    interpreter: Interpreter,
    pending_transfer: Option<TransferRequest>,
    frame: u64,
}

impl FieldRuntime {
    /// Loads the starting map and places the player on it.
    pub fn new(
        config: FieldConfig,
        source: Box<dyn DataSource>,
        loader: Box<dyn BitmapLoader>,
        debug: DebugMode,
    ) -> Result<Self> {
        let switches = SelfSwitches::new();
        let start_map = config.data.start_map;
        let snapshot = WorldSnapshot::load(&*source, start_map, &switches)
            .with_context(|| format!("load starting map {start_map}"))?;
        let player = Player::at(config.data.start_x, config.data.start_y);
        let mut bitmaps = BitmapCache::new(loader);
        let scene = MapScene::build(&snapshot, &player, &mut bitmaps)?;
        let interpreter = Interpreter::new(0, &config.interpreter);
        let mut ctx = FieldContext {
            config,
            source,
            snapshot,
            self_switches: switches,
            player,
            scene: ActiveScene::Map(scene),
            bitmaps,
            events: EventBus::default(),
            debug,
            data_generation: 0,
        };
        ctx.center_on_player();
        let debug_enabled = ctx.debug.enabled();
        tracing::info!(
            target: "field::runtime",
            map_id = start_map,
            events = ctx.snapshot.map.event_count(),
            debug = debug_enabled,
            "field session started"
        );
        Ok(Self { ctx, plugins: PluginManager::default(), interpreter, pending_transfer: None, frame: 0 })
    }

    /// Registers the reload watcher and the collision overlay drawing through `backend`.
    pub fn with_default_plugins<B: OverlayBackend + 'static>(mut self, backend: B) -> Result<Self> {
        let marker = self.ctx.config.data.marker_kind();
        let watcher = ReloadWatcher::new(&self.ctx.config.reload, marker);
        self.register_plugin(Box::new(watcher))?;
        let overlay = CollisionOverlay::new(&self.ctx.config.overlay, self.ctx.config.screen, backend);
        self.register_plugin(Box::new(overlay))?;
        Ok(self)
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn FieldPlugin>) -> Result<()> {
        self.plugins.register(plugin, &mut self.ctx)
    }

    pub fn plugin<T: FieldPlugin + 'static>(&self) -> Option<&T> {
        self.plugins.get::<T>()
    }

    pub fn plugin_mut<T: FieldPlugin + 'static>(&mut self) -> Option<&mut T> {
        self.plugins.get_mut::<T>()
    }

    pub fn context(&self) -> &FieldContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut FieldContext {
        &mut self.ctx
    }

    pub fn map(&self) -> &GameMap {
        &self.ctx.snapshot.map
    }

    pub fn player(&self) -> &Player {
        &self.ctx.player
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn drain_events(&mut self) -> Vec<FieldEvent> {
        self.ctx.events.drain()
    }

    /// Host-side access to the cross-event calls scripts use.
    pub fn invoker(&mut self) -> EventInvoker<'_> {
        EventInvoker::new(
            &mut self.interpreter,
            &mut self.ctx.snapshot.map,
            &mut self.ctx.self_switches,
            &mut self.ctx.events,
        )
    }

    pub fn start_event(&mut self, event_id: u32) -> bool {
        self.interpreter.setup_event(&self.ctx.snapshot.map, event_id)
    }

    /// Switches the active scene. Entering the map builds a fresh map scene.
    pub fn set_scene(&mut self, kind: SceneKind) -> Result<()> {
        self.ctx.scene = match kind {
            SceneKind::Map => {
                ActiveScene::Map(MapScene::build(&self.ctx.snapshot, &self.ctx.player, &mut self.ctx.bitmaps)?)
            }
            other => ActiveScene::Other(other),
        };
        tracing::debug!(target: "field::runtime", scene = kind.label(), "scene changed");
        Ok(())
    }

    /// One frame: plugins, page refresh, the map interpreter, player movement and any transfer
    /// the interpreter asked for. Fatal errors stop the frame and are returned.
    pub fn update(&mut self, input: &Input) -> Result<TickOutcome> {
        self.frame += 1;
        self.plugins.update(&mut self.ctx, input)?;
        if !self.ctx.scene.is_map() {
            return Ok(TickOutcome::Idle);
        }
        self.refresh_if_needed();

        let outcome = self.run_interpreter()?;
        self.refresh_if_needed();

        if !self.interpreter.is_running() && self.pending_transfer.is_none() {
            self.update_player(input);
        }
        if let Some(request) = self.pending_transfer.take() {
            self.transfer_player(request.map_id, request.x, request.y)?;
            if let Some(direction) = request.direction {
                self.ctx.player.direction = direction;
            }
        }
        Ok(outcome)
    }

    fn run_interpreter(&mut self) -> Result<TickOutcome> {
        let snapshot = &mut self.ctx.snapshot;
        let mut env = InterpreterEnv {
            map: &mut snapshot.map,
            tables: &snapshot.tables,
            self_switches: &mut self.ctx.self_switches,
            events: &mut self.ctx.events,
            transfer: &mut self.pending_transfer,
        };
        match self.interpreter.update(&mut env) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::error!(target: "field::interpreter", "interpreter halted: {err}");
                self.interpreter.clear();
                Err(err.into())
            }
        }
    }

    fn refresh_if_needed(&mut self) {
        if self.ctx.snapshot.map.need_refresh {
            self.ctx.snapshot.map.refresh(&self.ctx.self_switches);
        }
    }

    fn update_player(&mut self, input: &Input) {
        let walk_through = self.ctx.debug.enabled() && input.press(InputButton::Cancel);
        let pressed = [
            (InputButton::Down, Direction::Down),
            (InputButton::Left, Direction::Left),
            (InputButton::Right, Direction::Right),
            (InputButton::Up, Direction::Up),
        ]
        .into_iter()
        .find(|(button, _)| input.press(*button))
        .map(|(_, direction)| direction);
        if let Some(direction) = pressed {
            if self.ctx.player.move_straight(&self.ctx.snapshot.map, direction, walk_through) {
                self.ctx.center_on_player();
            }
        }
        if input.trigger(InputButton::Confirm) {
            if let Some(event_id) = self.event_in_front() {
                self.start_event(event_id);
            }
        }
    }

    /// Event on the tile the player faces, or else on the player's own tile.
    fn event_in_front(&self) -> Option<u32> {
        let (x, y) = self.ctx.player.position();
        let (dx, dy) = self.ctx.player.direction.offset();
        let map = &self.ctx.snapshot.map;
        let at = |tx: i32, ty: i32| {
            map.events().find(|event| event.x == tx && event.y == ty && event.is_executable()).map(|event| event.id)
        };
        at(x + dx, y + dy).or_else(|| at(x, y))
    }

    /// Moves the player to `map_id`. Plugins see the transfer before the new map loads.
    pub fn transfer_player(&mut self, map_id: u32, x: i32, y: i32) -> Result<()> {
        let from = self.ctx.map_id();
        self.plugins.on_transfer(&mut self.ctx, from, map_id)?;
        if map_id != from {
            let map_data = data::load_map(&*self.ctx.source, map_id)?;
            let tables = &self.ctx.snapshot.tables;
            let map = GameMap::setup(map_id, map_data, tables, &self.ctx.self_switches);
            self.ctx.snapshot.map = map;
        }
        self.ctx.player.moveto(x, y);
        self.ctx.center_on_player();
        if self.ctx.scene.is_map() {
            self.set_scene(SceneKind::Map)?;
        }
        self.ctx.emit(FieldEvent::MapTransferred { from, to: map_id, x, y });
        tracing::info!(target: "field::runtime", from, to = map_id, x, y, "player transferred");
        Ok(())
    }
}
