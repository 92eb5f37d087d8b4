//! Time-based interpolation between authoritative positions

use std::time::{Duration, Instant};

use crate::ws::protocol::ServerMsg;

/// Segments shorter than this are treated as this long
const MIN_SEGMENT: Duration = Duration::from_millis(1);

/// Pose a viewer should draw
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPose {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub color: String,
}

impl Default for RenderedPose {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            size: 0.0,
            color: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Segment {
    start: (f64, f64),
    end: (f64, f64),
    started_at: Instant,
    duration: Duration,
}

impl Segment {
    fn progress(&self, now: Instant) -> f64 {
        let duration = self.duration.max(MIN_SEGMENT);
        // Before the segment start, saturates to zero
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    fn at(&self, now: Instant) -> (f64, f64) {
        let t = self.progress(now);
        (
            self.start.0 + (self.end.0 - self.start.0) * t,
            self.start.1 + (self.end.1 - self.start.1) * t,
        )
    }
}

/// Smooths `game_state_update` snapshots into a continuously sampled pose.
///
/// A new snapshot starts a segment from the pose currently drawn, so a
/// snapshot arriving mid-segment never teleports the entity.
#[derive(Debug, Default)]
pub struct Interpolator {
    segment: Option<Segment>,
    size: f64,
    color: String,
}

impl Interpolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one server message; anything but a state update is ignored.
    /// Returns true when the message was a state update.
    pub fn integrate(&mut self, msg: &ServerMsg, now: Instant) -> bool {
        let ServerMsg::GameStateUpdate {
            entity,
            effective_move_duration_ms,
            ..
        } = msg
        else {
            return false;
        };

        let target = (entity.x, entity.y);
        let duration = duration_from_ms(*effective_move_duration_ms);
        self.size = entity.size;
        self.color.clone_from(&entity.color);

        match &self.segment {
            None => {
                self.segment = Some(Segment {
                    start: target,
                    end: target,
                    started_at: now,
                    duration,
                });
            }
            // Same target at the same pace: let the running segment finish
            Some(current) if current.end == target && current.duration == duration => {}
            Some(current) => {
                let start = current.at(now);
                self.segment = Some(Segment {
                    start,
                    end: target,
                    started_at: now,
                    duration,
                });
            }
        }
        true
    }

    /// Pose to draw at `now`
    pub fn sample(&self, now: Instant) -> RenderedPose {
        let Some(segment) = &self.segment else {
            return RenderedPose::default();
        };
        let (x, y) = segment.at(now);
        RenderedPose {
            x,
            y,
            size: self.size,
            color: self.color.clone(),
        }
    }

    pub fn has_state(&self) -> bool {
        self.segment.is_some()
    }

    /// Forget everything, e.g. after the connection drops
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn duration_from_ms(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_secs_f64(ms / 1000.0)
    } else {
        MIN_SEGMENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{AutoMoveState, Direction, EntityView, WorldView};

    fn update(x: f64, y: f64, duration_ms: f64) -> ServerMsg {
        ServerMsg::GameStateUpdate {
            entity: EntityView {
                x,
                y,
                size: 50.0,
                color: "#e74c3c".to_string(),
            },
            world: WorldView {
                width: 2000.0,
                height: 1500.0,
                grid_size: 50.0,
                canvas_width: 800.0,
                canvas_height: 600.0,
            },
            server_rate: 10.0,
            effective_move_duration_ms: duration_ms,
            auto_move: AutoMoveState {
                active: false,
                direction: Direction::Right,
            },
            last_processed_sequence: 0,
            running: true,
            paused: false,
        }
    }

    fn xy(pose: &RenderedPose) -> (f64, f64) {
        (pose.x, pose.y)
    }

    #[test]
    fn first_snapshot_is_drawn_in_place() {
        let now = Instant::now();
        let mut interp = Interpolator::new();
        assert!(interp.integrate(&update(1025.0, 775.0, 250.0), now));

        let pose = interp.sample(now);
        assert_eq!(xy(&pose), (1025.0, 775.0));
        assert_eq!(pose.size, 50.0);
        assert_eq!(pose.color, "#e74c3c");
    }

    #[test]
    fn segment_endpoints_and_clamping() {
        let t0 = Instant::now();
        let mut interp = Interpolator::new();
        interp.integrate(&update(0.0, 0.0, 100.0), t0);

        let t1 = t0 + Duration::from_millis(200);
        interp.integrate(&update(100.0, 50.0, 100.0), t1);

        assert_eq!(xy(&interp.sample(t1)), (0.0, 0.0));
        assert_eq!(xy(&interp.sample(t1 + Duration::from_millis(100))), (100.0, 50.0));
        assert_eq!(xy(&interp.sample(t1 + Duration::from_secs(5))), (100.0, 50.0));
        // Sampling before the segment began clamps to its start
        assert_eq!(xy(&interp.sample(t0)), (0.0, 0.0));

        let mid = interp.sample(t1 + Duration::from_millis(50));
        assert!((mid.x - 50.0).abs() < 1e-6);
        assert!((mid.y - 25.0).abs() < 1e-6);
    }

    #[test]
    fn mid_segment_snapshot_starts_from_drawn_pose() {
        let t0 = Instant::now();
        let mut interp = Interpolator::new();
        interp.integrate(&update(0.0, 0.0, 100.0), t0);
        interp.integrate(&update(100.0, 0.0, 100.0), t0);

        let halfway = t0 + Duration::from_millis(50);
        let before = interp.sample(halfway);
        interp.integrate(&update(200.0, 0.0, 100.0), halfway);
        let after = interp.sample(halfway);

        assert!((before.x - after.x).abs() < 1e-6);
        let end = interp.sample(halfway + Duration::from_millis(100));
        assert_eq!(end.x, 200.0);
    }

    #[test]
    fn zero_duration_snaps_and_other_messages_are_ignored() {
        let t0 = Instant::now();
        let mut interp = Interpolator::new();
        interp.integrate(&update(0.0, 0.0, 0.0), t0);
        interp.integrate(&update(10.0, 10.0, 0.0), t0);
        assert_eq!(xy(&interp.sample(t0 + Duration::from_millis(1))), (10.0, 10.0));

        assert!(!interp.integrate(&ServerMsg::system("hi"), t0));
    }

    #[test]
    fn reset_returns_default_pose() {
        let now = Instant::now();
        let mut interp = Interpolator::new();
        interp.integrate(&update(5.0, 5.0, 100.0), now);
        interp.reset();
        assert!(!interp.has_state());
        assert_eq!(interp.sample(now), RenderedPose::default());
    }
}
