//! # Interpolation
//!
//! Smooths ghosts the local peer does not predict. They are rendered a few
//! ticks in the past, between the two received snapshots that bracket the
//! render time.
//!
//! ```text
//!   snapshots:   10        12        13
//!                 │─────────│─────────│
//!   render time:       ▲ 11.5
//!                      └── blend(10, 12, 0.75)
//! ```

use crate::baseline::SnapshotHistory;
use crate::snapshot::GhostState;
use crate::tick::Tick;

/// A point on the tick timeline: whole tick plus fraction of the next.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderTime {
    /// Whole tick.
    pub tick: Tick,
    /// Progress towards the next tick, in `[0, 1)`.
    pub fraction: f32,
}

impl RenderTime {
    /// Creates a render time. `fraction` is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(tick: Tick, fraction: f32) -> Self {
        Self {
            tick,
            fraction: fraction.clamp(0.0, 1.0),
        }
    }

    /// `delay_ticks` behind `latest`.
    #[must_use]
    pub fn behind(latest: Tick, delay_ticks: u32, fraction: f32) -> Self {
        Self::new(latest.wrapping_sub(delay_ticks), fraction)
    }
}

/// Blends two snapshots of the same ghost.
///
/// `factor` is clamped to `[0, 1]`. `None` if the ghost types differ.
#[must_use]
pub fn interpolate(previous: &GhostState, target: &GhostState, factor: f32) -> Option<GhostState> {
    previous.interpolate(target, factor.clamp(0.0, 1.0))
}

/// How far `at` sits between `previous` and `target`, clamped to `[0, 1]`.
///
/// A non-positive span yields 1 (snap to target).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn interpolation_factor(at: RenderTime, previous: Tick, target: Tick) -> f32 {
    let span = target.diff(previous);
    if span <= 0 {
        return 1.0;
    }
    let offset = at.tick.diff(previous) as f32 + at.fraction;
    (offset / span as f32).clamp(0.0, 1.0)
}

/// State of a ghost at `at`, from its received history.
///
/// - Between two snapshots: blended.
/// - Past the newest snapshot: the newest, held (no extrapolation).
/// - Before the oldest snapshot: the oldest.
///
/// `None` only if the history is empty.
#[must_use]
pub fn sample(history: &SnapshotHistory, at: RenderTime) -> Option<GhostState> {
    let mut target: Option<&GhostState> = None;
    for snapshot in history.iter() {
        if !snapshot.tick().is_newer_than(at.tick) {
            let Some(target) = target else {
                return Some(snapshot.clone());
            };
            let factor = interpolation_factor(at, snapshot.tick(), target.tick());
            return interpolate(snapshot, target, factor);
        }
        target = Some(snapshot);
    }
    target.cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{AvatarSnapshot, ChangeMask, ProjectileSnapshot};
    use wraith_shared::{Quaternion, Vec3};

    fn avatar(tick: u32, x: i32) -> GhostState {
        GhostState::Avatar(AvatarSnapshot {
            tick: Tick(tick),
            rotation: 0,
            position: [x, 0, 0],
            mask: ChangeMask::EMPTY,
        })
    }

    fn x_of(state: &GhostState) -> i32 {
        state.as_avatar().map_or(i32::MIN, |a| a.position[0])
    }

    #[test]
    fn test_factor() {
        let at = RenderTime::new(Tick(11), 0.5);
        assert!((interpolation_factor(at, Tick(10), Tick(12)) - 0.75).abs() < 1e-6);
        assert!((interpolation_factor(at, Tick(12), Tick(12)) - 1.0).abs() < 1e-6);
        let before = RenderTime::new(Tick(9), 0.0);
        assert!(interpolation_factor(before, Tick(10), Tick(12)).abs() < 1e-6);
    }

    #[test]
    fn test_factor_across_wrap() {
        let at = RenderTime::new(Tick(0), 0.0);
        let factor = interpolation_factor(at, Tick(u32::MAX), Tick(1));
        assert!((factor - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sample_brackets_render_time() {
        let mut history = SnapshotHistory::new(8);
        history.insert(avatar(10, 0));
        history.insert(avatar(12, 400));
        history.insert(avatar(13, 1000));

        let blended = sample(&history, RenderTime::new(Tick(11), 0.5)).unwrap();
        assert_eq!(x_of(&blended), 300);

        let exact = sample(&history, RenderTime::new(Tick(12), 0.0)).unwrap();
        assert_eq!(x_of(&exact), 400);
    }

    #[test]
    fn test_sample_holds_at_the_ends() {
        let mut history = SnapshotHistory::new(8);
        assert!(sample(&history, RenderTime::new(Tick(5), 0.0)).is_none());

        history.insert(avatar(10, 100));
        history.insert(avatar(12, 300));
        assert_eq!(x_of(&sample(&history, RenderTime::new(Tick(20), 0.5)).unwrap()), 300);
        assert_eq!(x_of(&sample(&history, RenderTime::new(Tick(3), 0.0)).unwrap()), 100);
    }

    #[test]
    fn test_interpolate_rejects_mixed_types() {
        let projectile = GhostState::Projectile(ProjectileSnapshot::new(
            Tick(1),
            Vec3::ZERO,
            Vec3::ZERO,
        ));
        assert!(interpolate(&avatar(1, 0), &projectile, 0.5).is_none());
    }

    #[test]
    fn test_rotation_takes_shortest_arc() {
        let from = GhostState::Avatar(AvatarSnapshot::new(
            Tick(1),
            Vec3::ZERO,
            Quaternion::from_yaw(170f32.to_radians()),
        ));
        let to = GhostState::Avatar(AvatarSnapshot::new(
            Tick(2),
            Vec3::ZERO,
            Quaternion::from_yaw(-170f32.to_radians()),
        ));
        let mid = interpolate(&from, &to, 0.5).unwrap();
        let yaw = mid.as_avatar().unwrap().rotation().yaw().to_degrees();
        // Through 180, not through 0.
        assert!(yaw.abs() > 175.0, "yaw {yaw}");
    }
}
