use anyhow::{anyhow, Context, Result};
use kestrel_field::data::{FsDataSource, WorldSnapshot};
use kestrel_field::map::player::Player;
use kestrel_field::map::self_switches::SelfSwitches;
use kestrel_field::overlay::grid::{compute_grid, PlayerPassability};
use serde_json::json;
use std::env;
use std::path::PathBuf;
use std::process;

struct CliOptions {
    data: PathBuf,
    map_id: u32,
    player: (i32, i32),
    json: bool,
    show_help: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("collision_dump error: {err:?}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_cli_args(&args)?;
    if options.show_help {
        print_usage();
        return Ok(());
    }
    let source = FsDataSource::new(options.data.clone());
    let snapshot = WorldSnapshot::load(&source, options.map_id, &SelfSwitches::new())
        .with_context(|| format!("load map {} from {}", options.map_id, options.data.display()))?;
    let mut player = Player::at(options.player.0, options.player.1);
    let grid = compute_grid(&snapshot.map, &mut player, &mut PlayerPassability)?;
    if options.json {
        let report = json!({
            "map_id": options.map_id,
            "width": grid.width(),
            "height": grid.height(),
            "blocked_tiles": grid.blocked_tiles(),
            "cells": grid.cells(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", grid.to_text());
        println!("map {}: {} blocked tiles", options.map_id, grid.blocked_tiles());
    }
    Ok(())
}

fn parse_cli_args(args: &[String]) -> Result<CliOptions> {
    let mut options =
        CliOptions { data: PathBuf::from("Data"), map_id: 1, player: (-1, -1), json: false, show_help: false };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => options.show_help = true,
            "--json" => options.json = true,
            "--data" => {
                let value = iter.next().ok_or_else(|| anyhow!("Expected a value after '--data'"))?;
                options.data = PathBuf::from(value);
            }
            "--map" => {
                let value = iter.next().ok_or_else(|| anyhow!("Expected a value after '--map'"))?;
                options.map_id = value.parse().with_context(|| format!("Invalid map id '{value}'"))?;
            }
            "--player" => {
                let value = iter.next().ok_or_else(|| anyhow!("Expected a value after '--player'"))?;
                let (x, y) = value.split_once(',').ok_or_else(|| anyhow!("Expected --player X,Y"))?;
                options.player = (
                    x.trim().parse().with_context(|| format!("Invalid x '{x}'"))?,
                    y.trim().parse().with_context(|| format!("Invalid y '{y}'"))?,
                );
            }
            other => return Err(anyhow!("Unknown argument '{other}'")),
        }
    }
    Ok(options)
}

fn print_usage() {
    println!("Usage: collision_dump [--data DIR] [--map ID] [--player X,Y] [--json]");
    println!("Prints the blocked-direction mask of every tile. '.' is open; otherwise a hex digit");
    println!("with bits down=1 left=2 right=4 up=8.");
}
