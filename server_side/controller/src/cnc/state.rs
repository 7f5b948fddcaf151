use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}
impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

/// Whether move words are target coordinates (G90) or offsets from the current position (G91).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateMode {
    Absolute,
    Relative,
}

/// Persistent machine state, mutated only by committed commands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MachineState {
    pub position: Point,
    pub target: Point,
    /// mm/min, never negative.
    pub feed_rate: f64,
    pub mode: CoordinateMode,
}
impl MachineState {
    pub fn new(mode: CoordinateMode, feed_rate: f64) -> Self {
        MachineState {
            position: Point::default(),
            target: Point::default(),
            feed_rate,
            mode,
        }
    }
    /// Called once physical motion to `target` has finished.
    pub fn complete_motion(&mut self) {
        self.position = self.target;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn completing_motion_moves_to_target() {
        let mut state = MachineState::new(CoordinateMode::Absolute, 0.0);
        state.target = Point::new(12.5, 3.0);
        assert_eq!(state.position, Point::default());
        state.complete_motion();
        assert_eq!(state.position, Point::new(12.5, 3.0));
    }

    #[test]
    fn serializes_as_json() {
        let mut state = MachineState::new(CoordinateMode::Relative, 250.0);
        state.target = Point::new(50.0, 10.0);
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "position": { "x": 0.0, "y": 0.0 },
                "target": { "x": 50.0, "y": 10.0 },
                "feed_rate": 250.0,
                "mode": "relative",
            })
        );
        let back: MachineState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
