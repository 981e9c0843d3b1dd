//! Live data reload.
//!
//! The editor saves by rewriting several table files one after another, with no transaction
//! around them. The watcher keys off one marker table's modification time, waits a short grace
//! delay once it moves, and then loads a complete new `WorldSnapshot` next to the running one.
//! When fingerprint confirmation is on, the data set is hashed before and after the load and a
//! mismatch throws the new snapshot away and retries on the next tick. Nothing in the running
//! world is touched until the new snapshot and its scene are fully built.

use std::any::Any;
use std::thread;
use std::time::SystemTime;

use anyhow::Result;

use crate::config::ReloadConfig;
use crate::data::{self, TableKind, WorldSnapshot};
use crate::error::FieldError;
use crate::events::FieldEvent;
use crate::input::Input;
use crate::plugins::{FieldContext, FieldPlugin};
use crate::scene::{ActiveScene, MapScene};
use crate::watch::ChangeProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Idle,
    Reloading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Unchanged,
    /// A change was seen but the active scene is not the map.
    Deferred,
    /// The data set moved while loading; retried next tick.
    Rejected,
    Committed,
}

pub struct ReloadWatcher {
    config: ReloadConfig,
    marker: TableKind,
    state: ReloadState,
    baseline: Option<SystemTime>,
    /// Modification time whose load failed; not retried until the file moves again.
    failed: Option<SystemTime>,
    retry: bool,
    probe: ChangeProbe,
    reloads: u32,
}

impl ReloadWatcher {
    pub fn new(config: &ReloadConfig, marker: TableKind) -> Self {
        Self {
            config: config.clone(),
            marker,
            state: ReloadState::Idle,
            baseline: None,
            failed: None,
            retry: false,
            probe: ChangeProbe::Poll,
            reloads: 0,
        }
    }

    pub fn state(&self) -> ReloadState {
        self.state
    }

    pub fn baseline(&self) -> Option<SystemTime> {
        self.baseline
    }

    pub fn reload_count(&self) -> u32 {
        self.reloads
    }

    pub fn uses_notify(&self) -> bool {
        self.probe.is_notify()
    }

    /// Records the marker's current modification time as the baseline.
    pub fn arm(&mut self, ctx: &FieldContext) -> Result<()> {
        let path = ctx.source.table_path(self.marker);
        self.baseline = Some(ctx.source.modified(&path)?);
        self.failed = None;
        self.retry = false;
        tracing::debug!(target: "field::reload", marker = %path.display(), "reload watcher armed");
        Ok(())
    }

    pub fn tick(&mut self, ctx: &mut FieldContext) -> Result<ReloadOutcome> {
        if !self.config.enabled {
            return Ok(ReloadOutcome::Unchanged);
        }
        let probed = self.probe.should_stat();
        if !probed && !self.retry {
            return Ok(ReloadOutcome::Unchanged);
        }
        let path = ctx.source.table_path(self.marker);
        let modified = match ctx.source.modified(&path) {
            Ok(modified) => modified,
            Err(err) => {
                // Usually the editor replacing the file; look again next tick.
                tracing::debug!(target: "field::reload", "marker stat failed: {err:#}");
                self.retry = true;
                return Ok(ReloadOutcome::Unchanged);
            }
        };
        let Some(baseline) = self.baseline else {
            self.baseline = Some(modified);
            self.retry = false;
            return Ok(ReloadOutcome::Unchanged);
        };
        if modified == baseline || Some(modified) == self.failed {
            self.retry = false;
            return Ok(ReloadOutcome::Unchanged);
        }
        if !ctx.scene.is_map() {
            self.retry = true;
            return Ok(ReloadOutcome::Deferred);
        }

        self.state = ReloadState::Reloading;
        let result = self.reload(ctx, modified);
        self.state = ReloadState::Idle;
        result
    }

    fn reload(&mut self, ctx: &mut FieldContext, modified: SystemTime) -> Result<ReloadOutcome> {
        let grace = self.config.grace();
        tracing::info!(target: "field::reload", "data change detected; reloading after {grace:?}");
        thread::sleep(grace);

        let map_id = ctx.map_id();
        let before = if self.config.confirm_fingerprint {
            match data::fingerprint(&*ctx.source, map_id) {
                Ok(hash) => Some(hash),
                Err(err) => return Ok(self.reject(ctx, format!("data set unreadable: {err:#}"))),
            }
        } else {
            None
        };

        let snapshot = match WorldSnapshot::load(&*ctx.source, map_id, &ctx.self_switches) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.failed = Some(modified);
                self.retry = false;
                ctx.emit(FieldEvent::ReloadRejected { reason: err.to_string() });
                tracing::error!(target: "field::reload", "reload aborted, keeping current data: {err}");
                return Err(err.into());
            }
        };

        if let Some(before) = before {
            match data::fingerprint(&*ctx.source, map_id) {
                Ok(after) if after == before => {}
                Ok(_) => return Ok(self.reject(ctx, "data changed while loading".to_string())),
                Err(err) => return Ok(self.reject(ctx, format!("data set unreadable: {err:#}"))),
            }
        }

        if let Err(err) = self.commit(ctx, snapshot) {
            let path = ctx.source.map_path(map_id);
            let err = FieldError::ReloadCorruption { table: "Scene", path, source: err };
            self.failed = Some(modified);
            self.retry = false;
            ctx.emit(FieldEvent::ReloadRejected { reason: err.to_string() });
            tracing::error!(target: "field::reload", "scene rebuild failed, keeping current data: {err:#}");
            return Err(err.into());
        }
        self.baseline = Some(modified);
        self.failed = None;
        self.retry = false;
        self.reloads += 1;
        ctx.emit(FieldEvent::ReloadCommitted { map_id });
        tracing::info!(target: "field::reload", map_id, reloads = self.reloads, "reload committed");
        Ok(ReloadOutcome::Committed)
    }

    /// Builds the new scene against the new snapshot, then swaps both in.
    fn commit(&mut self, ctx: &mut FieldContext, mut snapshot: WorldSnapshot) -> Result<()> {
        ctx.bitmaps.clear();
        let (x, y) = ctx.player.position();
        snapshot.map.center_on(x, y, ctx.config.screen);
        let scene = MapScene::build(&snapshot, &ctx.player, &mut ctx.bitmaps)?;
        ctx.snapshot = snapshot;
        ctx.scene = ActiveScene::Map(scene);
        ctx.data_generation += 1;
        Ok(())
    }

    fn reject(&mut self, ctx: &mut FieldContext, reason: String) -> ReloadOutcome {
        tracing::warn!(target: "field::reload", "reload discarded: {reason}");
        ctx.emit(FieldEvent::ReloadRejected { reason });
        self.retry = true;
        ReloadOutcome::Rejected
    }
}

impl FieldPlugin for ReloadWatcher {
    fn name(&self) -> &'static str {
        "reload_watcher"
    }

    fn build(&mut self, ctx: &mut FieldContext) -> Result<()> {
        self.probe = ChangeProbe::for_mode(self.config.watch_mode, &*ctx.source);
        if let Err(err) = self.arm(ctx) {
            // Armed lazily on the first successful stat.
            tracing::warn!(target: "field::reload", "could not read marker table: {err:#}");
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut FieldContext, _input: &Input) -> Result<()> {
        self.tick(ctx).map(|_| ())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
