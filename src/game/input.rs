//! Input Frame
//!
//! One client input message after validation at the transport boundary.
//! Values arrive as raw floats; [`PlayerInput::sanitized`] drops anything
//! non-finite and clamps the rest into range before the simulation sees it.

/// Largest accepted frame delta, seconds.
pub const MAX_DT: f32 = 0.2;

/// Delta assumed when the client omits one.
pub const DEFAULT_DT: f32 = 0.05;

/// Pitch limit in either direction, radians.
pub const PITCH_LIMIT: f32 = 1.2;

/// A single player input frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerInput {
    /// Client sequence number (informational)
    pub seq: u64,
    /// Frame delta in seconds
    pub dt: Option<f32>,
    /// Strafe axis, +1 is right
    pub move_x: f32,
    /// Forward axis, +1 is forward
    pub move_z: f32,
    pub yaw: Option<f32>,
    pub pitch: Option<f32>,
    pub shoot: bool,
    pub jump: bool,
    pub sprint: bool,
    /// Selected weapon id
    pub weapon: Option<String>,
    pub auto_reload: Option<bool>,
}

impl PlayerInput {
    /// Frame delta clamped to [0, MAX_DT].
    pub fn frame_dt(&self) -> f32 {
        self.dt.unwrap_or(DEFAULT_DT).clamp(0.0, MAX_DT)
    }

    /// Copy with non-finite values removed and the move vector limited to
    /// unit length.
    pub fn sanitized(&self) -> Self {
        let finite = |v: Option<f32>| v.filter(|x| x.is_finite());
        let axis = |v: f32| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };

        let mut move_x = axis(self.move_x);
        let mut move_z = axis(self.move_z);
        let len = (move_x * move_x + move_z * move_z).sqrt();
        if len > 1.0 {
            move_x /= len;
            move_z /= len;
        }

        Self {
            seq: self.seq,
            dt: finite(self.dt),
            move_x,
            move_z,
            yaw: finite(self.yaw),
            pitch: finite(self.pitch).map(|p| p.clamp(-PITCH_LIMIT, PITCH_LIMIT)),
            shoot: self.shoot,
            jump: self.jump,
            sprint: self.sprint,
            weapon: self.weapon.clone(),
            auto_reload: self.auto_reload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dt_clamp() {
        let mut input = PlayerInput::default();
        assert_eq!(input.frame_dt(), DEFAULT_DT);
        input.dt = Some(5.0);
        assert_eq!(input.frame_dt(), MAX_DT);
        input.dt = Some(-1.0);
        assert_eq!(input.frame_dt(), 0.0);
    }

    #[test]
    fn test_sanitize_drops_non_finite() {
        let input = PlayerInput {
            dt: Some(f32::NAN),
            move_x: f32::INFINITY,
            move_z: 1.0,
            yaw: Some(f32::NAN),
            pitch: Some(3.0),
            ..Default::default()
        };
        let clean = input.sanitized();
        assert_eq!(clean.dt, None);
        assert_eq!(clean.move_x, 0.0);
        assert_eq!(clean.move_z, 1.0);
        assert_eq!(clean.yaw, None);
        assert_eq!(clean.pitch, Some(PITCH_LIMIT));
    }

    #[test]
    fn test_diagonal_is_unit_length() {
        let input = PlayerInput { move_x: 1.0, move_z: 1.0, ..Default::default() }.sanitized();
        let len = (input.move_x * input.move_x + input.move_z * input.move_z).sqrt();
        assert!((len - 1.0).abs() < 1e-5);
    }
}
