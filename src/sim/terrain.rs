//! Arena terrain
//!
//! The gameplay core only asks the world four things: is this point solid, where
//! can things stand, where may avatars spawn, and how far down is "fell off the
//! map". [`Terrain`] is that narrow interface; [`ArenaLayout`] is the tile-grid
//! implementation used by sessions and tests.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// World queries consumed by the simulation.
pub trait Terrain {
    /// Whether `point` lies inside a solid tile.
    fn is_solid(&self, point: Vec2) -> bool;
    /// Positions directly above a tile with nothing on top of it.
    fn surface_positions(&self) -> &[Vec2];
    /// Avatar spawn locations in map order.
    fn spawn_points(&self) -> &[Vec2];
    /// Avatars below this height die.
    fn kill_y(&self) -> f32;
    /// Whether `point` is still inside the playable volume.
    fn contains(&self, point: Vec2) -> bool;
}

/// Tile names the layout knows how to place.
pub const KNOWN_TILES: &[&str] = &["Grass", "Dirt", "Stone", "Brick", "Wood"];

/// A named tile at an integer grid position, as stored in layout files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TilePlacement {
    pub tile: String,
    pub position: IVec2,
}

/// Serialized arena description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaDefinition {
    pub name: String,
    pub tiles: Vec<TilePlacement>,
    pub spawn_points: Vec<Vec2>,
}

/// Unit-tile arena with precomputed surfaces and bounds.
#[derive(Debug, Clone)]
pub struct ArenaLayout {
    pub name: String,
    tiles: HashSet<IVec2>,
    surfaces: Vec<Vec2>,
    spawn_points: Vec<Vec2>,
    kill_y: f32,
    min: Vec2,
    max: Vec2,
}

/// Horizontal slack outside the outermost tiles before something counts as off-map.
const BOUNDS_MARGIN_X: f32 = 12.0;
/// Headroom above the highest tile before something counts as off-map.
const BOUNDS_MARGIN_TOP: f32 = 30.0;

impl ArenaLayout {
    /// Build a layout from tile positions. Surface cells keep tile order.
    pub fn from_tiles(
        name: impl Into<String>,
        tiles: &[IVec2],
        spawn_points: Vec<Vec2>,
        kill_y_margin: f32,
    ) -> Self {
        let set: HashSet<IVec2> = tiles.iter().copied().collect();

        let mut seen = HashSet::new();
        let surfaces = tiles
            .iter()
            .map(|tile| *tile + IVec2::Y)
            .filter(|above| !set.contains(above) && seen.insert(*above))
            .map(|above| above.as_vec2())
            .collect();

        let lowest = tiles.iter().map(|t| t.y).min().unwrap_or(0).min(0) as f32;
        let highest = tiles.iter().map(|t| t.y).max().unwrap_or(0) as f32;
        let left = tiles.iter().map(|t| t.x).min().unwrap_or(0) as f32;
        let right = tiles.iter().map(|t| t.x).max().unwrap_or(0) as f32;
        let kill_y = lowest - kill_y_margin;

        Self {
            name: name.into(),
            tiles: set,
            surfaces,
            spawn_points,
            kill_y,
            min: Vec2::new(left - BOUNDS_MARGIN_X, kill_y - 1.0),
            max: Vec2::new(right + BOUNDS_MARGIN_X, highest + BOUNDS_MARGIN_TOP),
        }
    }

    /// Build a layout from a serialized definition. Unknown tile names are
    /// reported and left out of the map.
    pub fn from_definition(definition: &ArenaDefinition, kill_y_margin: f32) -> Self {
        let tiles: Vec<IVec2> = definition
            .tiles
            .iter()
            .filter(|placement| {
                let known = KNOWN_TILES.contains(&placement.tile.as_str());
                if !known {
                    error!(
                        "Arena '{}': tile '{}' at {:?} cannot be found, skipping",
                        definition.name, placement.tile, placement.position
                    );
                }
                known
            })
            .map(|placement| placement.position)
            .collect();

        Self::from_tiles(
            definition.name.clone(),
            &tiles,
            definition.spawn_points.clone(),
            kill_y_margin,
        )
    }

    /// Parse a RON arena definition.
    pub fn from_ron_str(contents: &str, kill_y_margin: f32) -> Result<Self, String> {
        let definition: ArenaDefinition =
            ron::from_str(contents).map_err(|e| format!("Failed to parse arena: {}", e))?;
        Ok(Self::from_definition(&definition, kill_y_margin))
    }

    /// Built-in arena by name.
    pub fn preset(name: &str, kill_y_margin: f32) -> Option<Self> {
        let (tiles, spawns) = match name {
            "Platform" => platform_preset(),
            "Islands" => islands_preset(),
            "Temple" => temple_preset(),
            _ => return None,
        };
        Some(Self::from_tiles(name, &tiles, spawns, kill_y_margin))
    }

    /// Names accepted by [`ArenaLayout::preset`].
    pub fn preset_names() -> &'static [&'static str] {
        &["Platform", "Islands", "Temple"]
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}

impl Terrain for ArenaLayout {
    fn is_solid(&self, point: Vec2) -> bool {
        let cell = IVec2::new(point.x.round() as i32, point.y.round() as i32);
        self.tiles.contains(&cell)
    }

    fn surface_positions(&self) -> &[Vec2] {
        &self.surfaces
    }

    fn spawn_points(&self) -> &[Vec2] {
        &self.spawn_points
    }

    fn kill_y(&self) -> f32 {
        self.kill_y
    }

    fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }
}

fn row(y: i32, from: i32, to: i32) -> impl Iterator<Item = IVec2> {
    (from..=to).map(move |x| IVec2::new(x, y))
}

/// One long floor with a raised ledge at each end.
fn platform_preset() -> (Vec<IVec2>, Vec<Vec2>) {
    let tiles = row(0, -10, 10).chain(row(1, -10, -8)).chain(row(1, 8, 10)).collect();
    let spawns = vec![
        Vec2::new(-6.0, 1.0),
        Vec2::new(6.0, 1.0),
        Vec2::new(-2.0, 1.0),
        Vec2::new(2.0, 1.0),
    ];
    (tiles, spawns)
}

/// Three floating islands with gaps to fall through.
fn islands_preset() -> (Vec<IVec2>, Vec<Vec2>) {
    let tiles = row(0, -12, -6)
        .chain(row(2, -2, 2))
        .chain(row(0, 6, 12))
        .chain(row(5, -8, -5))
        .chain(row(5, 5, 8))
        .collect();
    let spawns = vec![
        Vec2::new(-9.0, 1.0),
        Vec2::new(9.0, 1.0),
        Vec2::new(-6.0, 6.0),
        Vec2::new(6.0, 6.0),
    ];
    (tiles, spawns)
}

/// Stepped floor under a central tower.
fn temple_preset() -> (Vec<IVec2>, Vec<Vec2>) {
    let tiles = row(-2, -12, 12)
        .chain(row(-1, -9, 9))
        .chain(row(0, -6, 6))
        .chain((1..=4).map(|y| IVec2::new(0, y)))
        .chain(row(4, -3, 3).filter(|t| t.x != 0))
        .collect();
    let spawns = vec![
        Vec2::new(-11.0, -1.0),
        Vec2::new(11.0, -1.0),
        Vec2::new(-4.0, 1.0),
        Vec2::new(4.0, 1.0),
    ];
    (tiles, spawns)
}
