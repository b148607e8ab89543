//! Map Registry
//!
//! Static arena layouts: bounds, spawn points, obstacle boxes and pickup pad
//! templates. Maps never change once built; selecting a map only swaps which
//! one the world reads from.

use serde::Serialize;

use crate::core::vec3::Vec3;
use crate::game::weapon::PowerWeaponKind;

/// Identifier of the map used when nothing else is selected.
pub const DEFAULT_MAP_ID: &str = "arena";

/// Horizontal play area.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl Bounds {
    /// Clamp a coordinate pair into the play area.
    #[inline]
    pub fn clamp(&self, x: f32, z: f32) -> (f32, f32) {
        (x.clamp(self.min_x, self.max_x), z.clamp(self.min_z, self.max_z))
    }

    /// Check whether a point lies inside the play area.
    #[inline]
    pub fn contains(&self, x: f32, z: f32) -> bool {
        x >= self.min_x && x <= self.max_x && z >= self.min_z && z <= self.max_z
    }
}

/// Static axis-aligned box. `w` spans X, `d` spans Z.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Obstacle {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
    pub h: f32,
    pub d: f32,
}

impl Obstacle {
    const fn new(x: f32, y: f32, z: f32, w: f32, h: f32, d: f32) -> Self {
        Self { x, y, z, w, h, d }
    }

    /// Check whether a floor point is inside this box grown by `radius`.
    ///
    /// Edges count as inside.
    #[inline]
    pub fn contains_inflated(&self, x: f32, z: f32, radius: f32) -> bool {
        let half_w = self.w / 2.0 + radius;
        let half_d = self.d / 2.0 + radius;
        x >= self.x - half_w && x <= self.x + half_w && z >= self.z - half_d && z <= self.z + half_d
    }
}

/// Pickup pad template placed by a map.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PadTemplate {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PowerWeaponKind,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// A complete arena layout.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Map {
    pub id: String,
    pub label: String,
    pub bounds: Bounds,
    pub spawn_points: Vec<Vec3>,
    pub obstacles: Vec<Obstacle>,
    pub pickup_pads: Vec<PadTemplate>,
}

impl Map {
    /// Check a floor point against every obstacle grown by `radius`.
    pub fn collides(&self, x: f32, z: f32, radius: f32) -> bool {
        self.obstacles.iter().any(|o| o.contains_inflated(x, z, radius))
    }
}

/// Rejected map lists.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("map registry needs at least one map")]
    Empty,

    #[error("duplicate map id: {0}")]
    DuplicateId(String),
}

/// All maps known to the server, in a fixed order.
#[derive(Clone, Debug)]
pub struct MapRegistry {
    maps: Vec<Map>,
}

impl MapRegistry {
    /// Registry with the built-in maps.
    pub fn builtin() -> Self {
        Self { maps: vec![arena(), mansion()] }
    }

    /// Registry from an explicit map list. The first map is the fallback.
    pub fn from_maps(maps: Vec<Map>) -> Result<Self, MapError> {
        if maps.is_empty() {
            return Err(MapError::Empty);
        }
        for (i, map) in maps.iter().enumerate() {
            if maps[..i].iter().any(|m| m.id == map.id) {
                return Err(MapError::DuplicateId(map.id.clone()));
            }
        }
        Ok(Self { maps })
    }

    /// Look up a map by id.
    pub fn get(&self, id: &str) -> Option<&Map> {
        self.maps.iter().find(|m| m.id == id)
    }

    /// Look up a map by id, falling back to the first registered map.
    pub fn get_or_default(&self, id: &str) -> &Map {
        self.get(id).unwrap_or(&self.maps[0])
    }

    /// Known map ids.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.maps.iter().map(|m| m.id.as_str())
    }
}

impl Default for MapRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn pad(id: &str, x: f32, z: f32) -> PadTemplate {
    PadTemplate { id: id.to_string(), kind: PowerWeaponKind::Minigun, x, y: 1.8, z }
}

fn spawn(x: f32, z: f32) -> Vec3 {
    Vec3::new(x, 1.8, z)
}

/// Small open arena with three blocks.
fn arena() -> Map {
    Map {
        id: "arena".to_string(),
        label: "Arena (Default)".to_string(),
        bounds: Bounds { min_x: -25.0, max_x: 25.0, min_z: -25.0, max_z: 25.0 },
        spawn_points: vec![spawn(-10.0, -10.0), spawn(10.0, -10.0), spawn(0.0, 12.0)],
        obstacles: vec![
            Obstacle::new(0.0, 1.5, 0.0, 3.0, 3.0, 3.0),
            Obstacle::new(-8.0, 1.0, 6.0, 4.0, 2.0, 6.0),
            Obstacle::new(10.0, 1.5, -6.0, 6.0, 3.0, 3.0),
        ],
        pickup_pads: vec![pad("pad_mg_1", 0.0, 0.0), pad("pad_mg_2", -12.0, 10.0)],
    }
}

/// Walled compound: gate, courtyard, door choke, interior.
fn mansion() -> Map {
    Map {
        id: "mansion".to_string(),
        label: "Mansion (CS style)".to_string(),
        bounds: Bounds { min_x: -25.0, max_x: 25.0, min_z: -25.0, max_z: 25.0 },
        // Gate spawns sit just past the inflated north wall edge. The west
        // courtyard spawn stays clear of the pool rim.
        spawn_points: vec![
            spawn(-3.5, -24.85),
            spawn(3.5, -24.85),
            spawn(-1.5, -24.3),
            spawn(1.5, -24.3),
            spawn(-13.0, -10.0),
            spawn(10.0, -10.0),
            spawn(-6.0, 14.0),
            spawn(6.0, 14.0),
            spawn(0.0, 21.0),
        ],
        obstacles: vec![
            // Perimeter with the north gate gap
            Obstacle::new(-14.5, 0.0, -23.0, 19.0, 4.6, 2.0),
            Obstacle::new(14.5, 0.0, -23.0, 19.0, 4.6, 2.0),
            Obstacle::new(-23.0, 0.0, 0.0, 2.0, 4.6, 46.0),
            Obstacle::new(23.0, 0.0, 0.0, 2.0, 4.6, 46.0),
            Obstacle::new(0.0, 0.0, 23.0, 46.0, 4.6, 2.0),
            // Drained pool rims
            Obstacle::new(-11.0, 0.0, -14.0, 1.0, 1.15, 9.0),
            Obstacle::new(-5.0, 0.0, -14.0, 1.0, 1.15, 9.0),
            // Courtyard cover
            Obstacle::new(0.0, 0.0, -12.0, 3.0, 1.15, 1.0),
            Obstacle::new(-6.0, 0.0, -12.0, 2.4, 1.15, 1.0),
            // Facade and door choke
            Obstacle::new(-9.5, 0.0, -6.0, 11.0, 4.6, 2.0),
            Obstacle::new(9.5, 0.0, -6.0, 11.0, 4.6, 2.0),
            Obstacle::new(-1.7, 0.0, -6.0, 1.2, 4.6, 2.2),
            Obstacle::new(1.7, 0.0, -6.0, 1.2, 4.6, 2.2),
            // Interior back wall
            Obstacle::new(0.0, 0.0, 10.5, 22.0, 4.6, 2.0),
            // Jump props
            Obstacle::new(-2.0, 0.0, -18.0, 2.4, 1.15, 2.4),
            Obstacle::new(2.0, 0.0, -18.0, 2.4, 1.15, 2.4),
            Obstacle::new(-8.0, 0.0, -11.0, 2.2, 1.15, 2.2),
            Obstacle::new(2.0, 0.0, -9.0, 2.2, 1.15, 2.2),
            // Sniper tower steps, platform, backboard, rail
            Obstacle::new(17.6, 0.0, -17.0, 2.6, 0.95, 2.6),
            Obstacle::new(18.6, 0.0, -15.6, 2.2, 1.20, 2.2),
            Obstacle::new(19.2, 0.0, -13.6, 3.2, 1.55, 3.2),
            Obstacle::new(21.1, 0.0, -13.6, 1.0, 3.6, 4.6),
            Obstacle::new(19.2, 0.0, -11.6, 2.2, 1.0, 0.9),
        ],
        pickup_pads: vec![pad("pad_mg_1", -9.0, 12.0), pad("pad_mg_2", 9.0, 12.0)],
    }
}
