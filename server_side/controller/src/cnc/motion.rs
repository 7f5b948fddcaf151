use serde::Serialize;

use super::{
    fault::Fault,
    state::{CoordinateMode, MachineState, Point},
};
use crate::config::{MotionConfig, Workspace};

impl Workspace {
    pub fn contains(&self, point: Point) -> bool {
        (0.0..=self.max_x).contains(&point.x) && (0.0..=self.max_y).contains(&point.y)
    }
}

/// A move that has been certified reachable and sized in motor steps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlannedMove {
    pub from: Point,
    pub to: Point,
    pub steps_x: u32,
    pub steps_y: u32,
    pub rapid: bool,
    /// mm/min; not used for rapid moves.
    pub feed_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArcOrientation {
    Clockwise,
    Counterclockwise,
}

/// Center and radius of a G02/G03 arc. Interpolating along it is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArcGeometry {
    pub orientation: ArcOrientation,
    pub start: Point,
    pub target: Point,
    pub center: Point,
    pub radius: f64,
}

fn steps_for(delta: f64, step_resolution: f64) -> u32 {
    (delta.abs() / step_resolution).round() as u32
}

pub struct Motion<'a> {
    config: &'a MotionConfig,
}

impl<'a> Motion<'a> {
    pub fn new(config: &'a MotionConfig) -> Self {
        Motion { config }
    }

    /// Absolute mode takes the word as the target; relative mode adds it to the current position.
    /// An axis with no word in relative mode does not move.
    pub fn resolve_axis(mode: CoordinateMode, current: f64, value: f64, given: bool) -> f64 {
        match mode {
            CoordinateMode::Absolute => value,
            CoordinateMode::Relative if given => current + value,
            CoordinateMode::Relative => current,
        }
    }

    pub fn check_bounds(&self, target: Point) -> Result<(), Fault> {
        if self.config.workspace.contains(target) {
            Ok(())
        } else {
            Err(Fault::CoordinatesOutOfBounds)
        }
    }

    /// Validates `target` against the workspace and, if reachable, records it as the pending
    /// target.
    ///
    /// The current position is left alone; it is committed by [`MachineState::complete_motion`]
    /// once the motion has physically happened.
    pub fn move_to(
        &self,
        state: &mut MachineState,
        target: Point,
        rapid: bool,
    ) -> Result<PlannedMove, Fault> {
        self.check_bounds(target)?;
        state.target = target;
        let resolution = self.config.step_resolution;
        Ok(PlannedMove {
            from: state.position,
            to: target,
            steps_x: steps_for(state.position.x - target.x, resolution),
            steps_y: steps_for(state.position.y - target.y, resolution),
            rapid,
            feed_rate: state.feed_rate,
        })
    }

    /// Center and radius for an arc from the current position, with `(i, j)` as the center offset.
    pub fn arc(
        &self,
        state: &MachineState,
        target: Point,
        i: f64,
        j: f64,
        orientation: ArcOrientation,
    ) -> Result<ArcGeometry, Fault> {
        self.check_bounds(target)?;
        let start = state.position;
        Ok(ArcGeometry {
            orientation,
            start,
            target,
            center: Point::new(start.x + i, start.y + j),
            radius: i.hypot(j),
        })
    }
}
