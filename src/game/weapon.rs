//! Weapon Definitions
//!
//! Every weapon is a [`WeaponDef`]: a fire cooldown, an optional magazine and a
//! [`WeaponBehavior`] variant carrying the numbers its resolver needs. The
//! combat engine matches on the behavior, so adding a weapon type is a compile
//! error until it is resolved everywhere.

use serde::{Deserialize, Serialize};

// =============================================================================
// WEAPON IDS
// =============================================================================

/// Weapon identifier as sent by clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    Rifle,
    Shotgun,
    Sniper,
    Fart,
    Rocket,
    Knife,
    GrenadeFrag,
    GrenadeImpact,
    Minigun,
}

impl WeaponKind {
    /// Resolve a client weapon id. Unknown ids resolve to the rifle.
    pub fn from_id(id: &str) -> Self {
        match id {
            "shotgun" => Self::Shotgun,
            "sniper" => Self::Sniper,
            "fart" => Self::Fart,
            "rocket" => Self::Rocket,
            "knife" => Self::Knife,
            "grenade_frag" => Self::GrenadeFrag,
            "grenade_impact" => Self::GrenadeImpact,
            "minigun" => Self::Minigun,
            _ => Self::Rifle,
        }
    }

    /// Wire id.
    pub fn id(self) -> &'static str {
        match self {
            Self::Rifle => "rifle",
            Self::Shotgun => "shotgun",
            Self::Sniper => "sniper",
            Self::Fart => "fart",
            Self::Rocket => "rocket",
            Self::Knife => "knife",
            Self::GrenadeFrag => "grenade_frag",
            Self::GrenadeImpact => "grenade_impact",
            Self::Minigun => "minigun",
        }
    }

    /// Static definition for this weapon.
    pub fn def(self) -> &'static WeaponDef {
        match self {
            Self::Rifle => &RIFLE,
            Self::Shotgun => &SHOTGUN,
            Self::Sniper => &SNIPER,
            Self::Fart => &FART,
            Self::Rocket => &ROCKET,
            Self::Knife => &KNIFE,
            Self::GrenadeFrag => &GRENADE_FRAG,
            Self::GrenadeImpact => &GRENADE_IMPACT,
            Self::Minigun => &MINIGUN,
        }
    }
}

/// Weapons that only exist as pickups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerWeaponKind {
    Minigun,
}

impl PowerWeaponKind {
    /// The weapon this pickup grants.
    pub fn weapon(self) -> WeaponKind {
        match self {
            Self::Minigun => WeaponKind::Minigun,
        }
    }

    /// Ammo granted on pickup.
    pub fn full_ammo(self) -> u32 {
        match self {
            Self::Minigun => MINIGUN_SPEC.ammo,
        }
    }

    /// Wire id.
    pub fn id(self) -> &'static str {
        self.weapon().id()
    }
}

// =============================================================================
// DEFINITIONS
// =============================================================================

/// Linear damage falloff between two distances.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Falloff {
    /// Full damage at or below this distance
    pub near: f32,
    /// Floor damage at or beyond this distance
    pub far: f32,
    /// Multiplier applied at `far`
    pub min_mult: f32,
}

impl Falloff {
    /// Damage after falloff at `dist`. Never below 1.
    pub fn apply(&self, base: i32, dist: f32) -> i32 {
        if dist <= self.near {
            return base;
        }
        let mult = if dist >= self.far {
            self.min_mult
        } else {
            let t = (dist - self.near) / (self.far - self.near);
            1.0 - t * (1.0 - self.min_mult)
        };
        ((base as f32 * mult).round() as i32).max(1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitscanSpec {
    pub range: f32,
    pub damage: i32,
    pub falloff: Falloff,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShotgunSpec {
    pub range: f32,
    pub pellets: u32,
    /// Max yaw jitter per pellet, radians
    pub spread: f32,
    pub pellet_damage: i32,
    pub falloff: Falloff,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SniperSpec {
    pub range: f32,
    pub body_damage: i32,
    pub head_damage: i32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusSpec {
    pub range: f32,
    pub duration_ms: u64,
}

/// Radial damage shape shared by rocket splash.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplashSpec {
    pub radius: f32,
    /// Within this distance the splash deals `full_damage`
    pub full_within: f32,
    pub full_damage: i32,
    pub min_damage: i32,
    /// Splash beyond `full_within` never exceeds this
    pub cap: i32,
}

impl SplashSpec {
    /// Damage at `dist` from the blast, or `None` outside the radius.
    pub fn damage_at(&self, dist: f32) -> Option<i32> {
        if dist > self.radius {
            return None;
        }
        if dist <= self.full_within {
            return Some(self.full_damage);
        }
        let t = (dist - self.full_within) / (self.radius - self.full_within);
        let amount = ((self.full_damage as f32 * (1.0 - t)).round() as i32).max(self.min_damage);
        Some(amount.min(self.cap))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RocketSpec {
    pub range: f32,
    pub direct_damage: i32,
    pub splash: SplashSpec,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeleeSpec {
    pub range: f32,
    /// Minimum facing dot product toward the target
    pub cone_dot: f32,
    /// Attacker counts as behind when the target-facing dot is below this
    pub backstab_dot: f32,
    pub front_damage: i32,
    pub backstab_damage: i32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GrenadeSpec {
    pub fuse_ms: u64,
    /// Detonate on ground contact once armed
    pub impact: bool,
    pub arm_ms: u64,
    pub radius: f32,
    pub max_damage: i32,
    pub min_damage: i32,
    pub bounce: f32,
}

impl GrenadeSpec {
    /// Linear blast damage at `dist`, or `None` when nothing is dealt.
    pub fn damage_at(&self, dist: f32) -> Option<i32> {
        if dist > self.radius {
            return None;
        }
        let t = (dist / self.radius).clamp(0.0, 1.0);
        let amount = (self.max_damage as f32 + (self.min_damage - self.max_damage) as f32 * t).round() as i32;
        (amount > 0).then_some(amount)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinigunSpec {
    pub range: f32,
    pub damage: i32,
    pub heat_per_shot: f32,
    pub cool_per_sec: f32,
    pub overheat_at: f32,
    pub recover_at: f32,
    pub spin_up_per_sec: f32,
    pub spin_down_per_sec: f32,
    pub ammo: u32,
    /// Spin needed before the first round leaves the barrel
    pub min_spin: f32,
}

/// How a weapon resolves when fired.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WeaponBehavior {
    Hitscan(HitscanSpec),
    Shotgun(ShotgunSpec),
    Hitscan3d(SniperSpec),
    Status(StatusSpec),
    Rocket(RocketSpec),
    Melee(MeleeSpec),
    Grenade(GrenadeSpec),
    Minigun(MinigunSpec),
}

/// Complete weapon definition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeaponDef {
    pub kind: WeaponKind,
    pub fire_cd_ms: u64,
    /// Consumes the shared magazine
    pub uses_magazine: bool,
    pub behavior: WeaponBehavior,
}

/// Rifle ray, also used by the debug shot.
pub const RIFLE_HITSCAN: HitscanSpec = HitscanSpec {
    range: 30.0,
    damage: 25,
    falloff: Falloff { near: 5.0, far: 30.0, min_mult: 0.55 },
};

pub const RIFLE: WeaponDef = WeaponDef {
    kind: WeaponKind::Rifle,
    fire_cd_ms: 250,
    uses_magazine: true,
    behavior: WeaponBehavior::Hitscan(RIFLE_HITSCAN),
};

pub const SHOTGUN: WeaponDef = WeaponDef {
    kind: WeaponKind::Shotgun,
    fire_cd_ms: 650,
    uses_magazine: true,
    behavior: WeaponBehavior::Shotgun(ShotgunSpec {
        range: 22.0,
        pellets: 6,
        spread: 0.14,
        pellet_damage: 10,
        falloff: Falloff { near: 3.0, far: 22.0, min_mult: 0.45 },
    }),
};

pub const SNIPER: WeaponDef = WeaponDef {
    kind: WeaponKind::Sniper,
    fire_cd_ms: 1100,
    uses_magazine: true,
    behavior: WeaponBehavior::Hitscan3d(SniperSpec { range: 80.0, body_damage: 50, head_damage: 999 }),
};

pub const FART: WeaponDef = WeaponDef {
    kind: WeaponKind::Fart,
    fire_cd_ms: 450,
    uses_magazine: true,
    behavior: WeaponBehavior::Status(StatusSpec { range: 22.0, duration_ms: 5000 }),
};

pub const ROCKET: WeaponDef = WeaponDef {
    kind: WeaponKind::Rocket,
    fire_cd_ms: 1500,
    uses_magazine: true,
    behavior: WeaponBehavior::Rocket(RocketSpec {
        range: 80.0,
        direct_damage: 999,
        splash: SplashSpec { radius: 6.0, full_within: 2.0, full_damage: 999, min_damage: 10, cap: 90 },
    }),
};

pub const KNIFE: WeaponDef = WeaponDef {
    kind: WeaponKind::Knife,
    fire_cd_ms: 250,
    uses_magazine: false,
    behavior: WeaponBehavior::Melee(MeleeSpec {
        range: 2.2,
        cone_dot: 0.65,
        backstab_dot: -0.35,
        front_damage: 35,
        backstab_damage: 999,
    }),
};

pub const GRENADE_FRAG: WeaponDef = WeaponDef {
    kind: WeaponKind::GrenadeFrag,
    fire_cd_ms: 900,
    uses_magazine: false,
    behavior: WeaponBehavior::Grenade(GrenadeSpec {
        fuse_ms: 1200,
        impact: false,
        arm_ms: 0,
        radius: 6.0,
        max_damage: 100,
        min_damage: 0,
        bounce: 0.55,
    }),
};

pub const GRENADE_IMPACT: WeaponDef = WeaponDef {
    kind: WeaponKind::GrenadeImpact,
    fire_cd_ms: 900,
    uses_magazine: false,
    behavior: WeaponBehavior::Grenade(GrenadeSpec {
        fuse_ms: 2500,
        impact: true,
        arm_ms: 180,
        radius: 4.5,
        max_damage: 110,
        min_damage: 0,
        bounce: 0.35,
    }),
};

pub const MINIGUN_SPEC: MinigunSpec = MinigunSpec {
    range: 38.0,
    damage: 7,
    heat_per_shot: 0.004,
    cool_per_sec: 0.40,
    overheat_at: 1.0,
    recover_at: 0.25,
    spin_up_per_sec: 6.0,
    spin_down_per_sec: 5.0,
    ammo: 450,
    min_spin: 0.2,
};

pub const MINIGUN: WeaponDef = WeaponDef {
    kind: WeaponKind::Minigun,
    fire_cd_ms: 20,
    uses_magazine: false,
    behavior: WeaponBehavior::Minigun(MINIGUN_SPEC),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_id_is_rifle() {
        assert_eq!(WeaponKind::from_id("bazooka"), WeaponKind::Rifle);
        assert_eq!(WeaponKind::from_id(""), WeaponKind::Rifle);
        assert_eq!(WeaponKind::from_id("grenade_impact"), WeaponKind::GrenadeImpact);
    }

    #[test]
    fn test_ids_round_trip() {
        let all = [
            WeaponKind::Rifle,
            WeaponKind::Shotgun,
            WeaponKind::Sniper,
            WeaponKind::Fart,
            WeaponKind::Rocket,
            WeaponKind::Knife,
            WeaponKind::GrenadeFrag,
            WeaponKind::GrenadeImpact,
            WeaponKind::Minigun,
        ];
        for kind in all {
            assert_eq!(WeaponKind::from_id(kind.id()), kind);
            assert_eq!(kind.def().kind, kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.id()));
        }
    }

    #[test]
    fn test_rifle_falloff() {
        let WeaponBehavior::Hitscan(spec) = RIFLE.behavior else {
            panic!("rifle is hitscan");
        };
        assert_eq!(spec.falloff.apply(25, 4.0), 25);
        assert_eq!(spec.falloff.apply(25, 5.0), 25);
        assert_eq!(spec.falloff.apply(25, 35.0), 14);
        let mid = spec.falloff.apply(25, 17.5);
        assert!(mid < 25 && mid > 14);
    }

    #[test]
    fn test_rocket_splash_curve() {
        let WeaponBehavior::Rocket(spec) = ROCKET.behavior else {
            panic!("rocket is rocket");
        };
        assert_eq!(spec.splash.damage_at(1.5), Some(999));
        assert_eq!(spec.splash.damage_at(3.0), Some(90));
        assert_eq!(spec.splash.damage_at(6.0), Some(10));
        assert_eq!(spec.splash.damage_at(6.1), None);
    }

    #[test]
    fn test_grenade_blast_curve() {
        let WeaponBehavior::Grenade(spec) = GRENADE_FRAG.behavior else {
            panic!("frag is grenade");
        };
        assert_eq!(spec.damage_at(0.0), Some(100));
        assert_eq!(spec.damage_at(3.0), Some(50));
        assert_eq!(spec.damage_at(6.0), None);
        assert_eq!(spec.damage_at(7.0), None);
    }

    #[test]
    fn test_magazine_flags() {
        assert!(RIFLE.uses_magazine);
        assert!(!KNIFE.uses_magazine);
        assert!(!MINIGUN.uses_magazine);
        assert_eq!(PowerWeaponKind::Minigun.full_ammo(), 450);
    }
}
