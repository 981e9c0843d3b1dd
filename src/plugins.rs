use std::any::Any;

use anyhow::Result;

use crate::bitmap_cache::BitmapCache;
use crate::config::FieldConfig;
use crate::data::{DataSource, WorldSnapshot};
use crate::debug::DebugMode;
use crate::error::FieldError;
use crate::events::{EventBus, FieldEvent};
use crate::input::Input;
use crate::map::player::Player;
use crate::map::self_switches::SelfSwitches;
use crate::scene::ActiveScene;

/// Everything a field session owns. Built once by the runtime and lent to plugins each frame.
pub struct FieldContext {
    pub config: FieldConfig,
    pub source: Box<dyn DataSource>,
    pub snapshot: WorldSnapshot,
    pub self_switches: SelfSwitches,
    pub player: Player,
    pub scene: ActiveScene,
    pub bitmaps: BitmapCache,
    pub events: EventBus,
    pub debug: DebugMode,
    /// Bumped every time a reload swaps in a new snapshot.
    pub data_generation: u64,
}

impl FieldContext {
    pub fn map_id(&self) -> u32 {
        self.snapshot.map.map_id()
    }

    pub fn emit(&mut self, event: FieldEvent) {
        tracing::debug!(target: "field::events", "{event}");
        self.events.push(event);
    }

    /// Scrolls the map so the player sits in the middle of the screen.
    pub fn center_on_player(&mut self) {
        let (x, y) = self.player.position();
        self.snapshot.map.center_on(x, y, self.config.screen);
    }
}

/// Per-frame extension point. Hosts compose behavior by registering plugins instead of wrapping
/// runtime methods.
pub trait FieldPlugin: Any {
    fn name(&self) -> &'static str;

    fn build(&mut self, _ctx: &mut FieldContext) -> Result<()> {
        Ok(())
    }

    fn update(&mut self, _ctx: &mut FieldContext, _input: &Input) -> Result<()> {
        Ok(())
    }

    /// Runs before the player leaves `from` for `to`, while the old map is still loaded.
    fn on_transfer(&mut self, _ctx: &mut FieldContext, _from: u32, _to: u32) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<Box<dyn FieldPlugin>>,
}

impl PluginManager {
    pub fn register(&mut self, mut plugin: Box<dyn FieldPlugin>, ctx: &mut FieldContext) -> Result<()> {
        plugin.build(ctx)?;
        tracing::debug!(target: "field::plugins", plugin = plugin.name(), "registered");
        self.plugins.push(plugin);
        Ok(())
    }

    /// Runs every plugin. Recoverable failures are logged and skipped; the first failure carrying a
    /// fatal `FieldError` is returned once the remaining plugins have run.
    pub fn update(&mut self, ctx: &mut FieldContext, input: &Input) -> Result<()> {
        let mut fatal = None;
        for plugin in &mut self.plugins {
            if let Err(err) = plugin.update(ctx, input) {
                record_failure(plugin.name(), "update", err, &mut fatal);
            }
        }
        fatal.map_or(Ok(()), Err)
    }

    pub fn on_transfer(&mut self, ctx: &mut FieldContext, from: u32, to: u32) -> Result<()> {
        let mut fatal = None;
        for plugin in &mut self.plugins {
            if let Err(err) = plugin.on_transfer(ctx, from, to) {
                record_failure(plugin.name(), "on_transfer", err, &mut fatal);
            }
        }
        fatal.map_or(Ok(()), Err)
    }

    pub fn get<T: FieldPlugin + 'static>(&self) -> Option<&T> {
        self.plugins.iter().find_map(|plugin| plugin.as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T: FieldPlugin + 'static>(&mut self) -> Option<&mut T> {
        self.plugins.iter_mut().find_map(|plugin| plugin.as_any_mut().downcast_mut::<T>())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }
}

fn record_failure(name: &str, hook: &str, err: anyhow::Error, fatal: &mut Option<anyhow::Error>) {
    let is_fatal = err.downcast_ref::<FieldError>().is_some_and(FieldError::is_fatal);
    if is_fatal {
        tracing::error!(target: "field::plugins", plugin = name, "{hook} failed: {err:#}");
        if fatal.is_none() {
            *fatal = Some(err);
        }
    } else {
        tracing::warn!(target: "field::plugins", plugin = name, "{hook} failed: {err:#}");
    }
}
