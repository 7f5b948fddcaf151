pub mod parser;

use serde::Serialize;
use tracing::{debug, warn};

use super::{
    fault::{Fault, FaultSet},
    motion::{ArcGeometry, ArcOrientation, Motion, PlannedMove},
    state::{CoordinateMode, MachineState, Point},
};
use crate::config::MotionConfig;

/// G value used when a line carries no G word.
pub const NO_CODE: i32 = -1;

/// Argument words of one line, with absent words already defaulted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcodeArgs {
    pub x: f64,
    pub y: f64,
    /// Whether X and Y were present; relative moves only offset axes that were named.
    pub x_given: bool,
    pub y_given: bool,
    pub i: f64,
    pub j: f64,
    pub f: f64,
    pub g: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GCommand {
    RapidMove,
    LinearMove,
    ClockwiseArc,
    CounterclockwiseArc,
    AbsoluteMode,
    RelativeMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum CommandOutcome {
    Move(PlannedMove),
    /// Arc geometry was derived but no motion is planned for it.
    ArcDeferred(ArcGeometry),
    ModeSet(CoordinateMode),
}

impl GCommand {
    pub const TABLE: [(i32, GCommand); 6] = [
        (0, GCommand::RapidMove),
        (1, GCommand::LinearMove),
        (2, GCommand::ClockwiseArc),
        (3, GCommand::CounterclockwiseArc),
        (90, GCommand::AbsoluteMode),
        (91, GCommand::RelativeMode),
    ];

    pub fn from_code(code: i32) -> Option<GCommand> {
        GCommand::TABLE
            .iter()
            .find(|(table_code, _)| *table_code == code)
            .map(|(_, command)| *command)
    }

    /// Runs the command against a copy of the state and returns the state it would leave behind.
    pub fn execute(
        self,
        args: &GcodeArgs,
        mut state: MachineState,
        motion: &Motion,
    ) -> Result<(MachineState, CommandOutcome), Fault> {
        let outcome = match self {
            GCommand::RapidMove | GCommand::LinearMove => {
                let target = resolve_target(args, &state);
                let rapid = self == GCommand::RapidMove;
                CommandOutcome::Move(motion.move_to(&mut state, target, rapid)?)
            }
            GCommand::ClockwiseArc | GCommand::CounterclockwiseArc => {
                let orientation = if self == GCommand::ClockwiseArc {
                    ArcOrientation::Clockwise
                } else {
                    ArcOrientation::Counterclockwise
                };
                let target = resolve_target(args, &state);
                let arc = motion.arc(&state, target, args.i, args.j, orientation)?;
                CommandOutcome::ArcDeferred(arc)
            }
            GCommand::AbsoluteMode => {
                state.mode = CoordinateMode::Absolute;
                CommandOutcome::ModeSet(state.mode)
            }
            GCommand::RelativeMode => {
                state.mode = CoordinateMode::Relative;
                CommandOutcome::ModeSet(state.mode)
            }
        };
        Ok((state, outcome))
    }
}

fn resolve_target(args: &GcodeArgs, state: &MachineState) -> Point {
    Point::new(
        Motion::resolve_axis(state.mode, state.position.x, args.x, args.x_given),
        Motion::resolve_axis(state.mode, state.position.y, args.y, args.y_given),
    )
}

fn valid_feed_rate(feed_rate: f64) -> bool {
    feed_rate.is_finite() && feed_rate >= 0.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub args: GcodeArgs,
    pub result: Result<CommandOutcome, FaultSet>,
}

/// Parses one G-code line and runs it.
///
/// The feed rate is applied before the command runs. Every command fault is
/// collected, and `state` is only updated when none were raised.
pub fn interpret(
    payload: &[u8],
    state: &mut MachineState,
    config: &MotionConfig,
) -> Interpretation {
    let args = parser::parse_gcode_args(payload, state);
    let motion = Motion::new(config);
    let mut faults = FaultSet::empty();

    let mut staged = *state;
    if valid_feed_rate(args.f) {
        staged.feed_rate = args.f;
    } else {
        faults.insert(Fault::InvalidFeedRate);
    }

    let executed = match GCommand::from_code(args.g) {
        Some(command) => command.execute(&args, staged, &motion).map_err(FaultSet::from),
        None => Err(FaultSet::from(Fault::UnsupportedGcode)),
    };

    let result = match executed {
        Ok((next, outcome)) if faults.is_empty() => {
            *state = next;
            Ok(outcome)
        }
        Ok(_) => Err(faults),
        Err(command_faults) => Err(faults.union(command_faults)),
    };
    match &result {
        Ok(CommandOutcome::ArcDeferred(arc)) => {
            warn!(?arc, "arc interpolation is not implemented; no motion planned")
        }
        Ok(outcome) => debug!(g = args.g, ?outcome, "g-code executed"),
        Err(faults) => debug!(g = args.g, %faults, "g-code rejected"),
    }
    Interpretation { args, result }
}
