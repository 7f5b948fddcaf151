use tracing::{debug, info, warn};

use super::{
    fault::{Fault, FaultSet},
    gcode::{interpret, CommandOutcome},
    report::{report_lines, ReportLine},
    state::MachineState,
};
use crate::{
    config::{ControllerConfig, MotionConfig},
    link::receiver::{FrameOutcome, FrameReceiver, ReceiveState},
};

#[derive(Debug, Clone, PartialEq)]
pub enum CycleResult {
    Success(CommandOutcome),
    /// The frame failed framing checks and its payload was never looked at.
    BadPackage(FaultSet),
    BadCommand(FaultSet),
}

impl CycleResult {
    pub fn faults(&self) -> FaultSet {
        match self {
            CycleResult::Success(_) => FaultSet::empty(),
            CycleResult::BadPackage(faults) | CycleResult::BadCommand(faults) => *faults,
        }
    }
}

/// Owns the machine state and routes settled frames to the command they select.
pub struct Dispatcher {
    gcode_opcode: u8,
    motion: MotionConfig,
    machine: MachineState,
}

impl Dispatcher {
    pub fn new(config: &ControllerConfig) -> Self {
        let motion = config.motion.clone();
        Dispatcher {
            gcode_opcode: config.link.gcode_opcode,
            machine: MachineState::new(motion.initial_mode, motion.initial_feed_rate),
            motion,
        }
    }

    pub fn machine(&self) -> &MachineState {
        &self.machine
    }

    pub fn dispatch(&mut self, outcome: FrameOutcome) -> CycleResult {
        let result = match outcome {
            FrameOutcome::Faulted(faults) => CycleResult::BadPackage(faults),
            FrameOutcome::Complete(frame) if frame.opcode() == self.gcode_opcode => {
                match interpret(frame.payload(), &mut self.machine, &self.motion).result {
                    Ok(outcome) => CycleResult::Success(outcome),
                    Err(faults) => CycleResult::BadCommand(faults),
                }
            }
            FrameOutcome::Complete(frame) => {
                let header = frame.header();
                debug!(
                    opcode = header.opcode,
                    sequence = header.sequence,
                    address = header.address,
                    "no command registered for opcode"
                );
                CycleResult::BadCommand(Fault::UnknownCommand.into())
            }
        };
        match &result {
            CycleResult::Success(outcome) => info!(?outcome, "cycle complete"),
            CycleResult::BadPackage(faults) => warn!(%faults, "frame rejected"),
            CycleResult::BadCommand(faults) => warn!(%faults, "command rejected"),
        }
        result
    }

    /// Records that the last planned move has physically finished.
    pub fn complete_motion(&mut self) {
        self.machine.complete_motion();
        debug!(position = ?self.machine.position, "motion complete");
    }
}

/// Everything produced by one receive/dispatch cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    pub result: CycleResult,
    pub report: Vec<ReportLine>,
}

/// Single-owner context for the cooperative model: a byte callback feeds
/// [`Controller::on_byte`] and a periodic tick calls [`Controller::poll`].
pub struct Controller {
    receiver: FrameReceiver,
    dispatcher: Dispatcher,
}

impl Controller {
    pub fn new(config: &ControllerConfig) -> Self {
        Controller {
            receiver: FrameReceiver::new(config.link.device_address, config.link.expected_sequence),
            dispatcher: Dispatcher::new(config),
        }
    }

    /// Only touches the receiver. Bytes arriving while a settled frame waits for `poll` are
    /// dropped.
    pub fn on_byte(&mut self, byte: u8) -> ReceiveState {
        self.receiver.push(byte)
    }

    /// Dispatches a settled frame, if there is one, and re-arms the receiver.
    pub fn poll(&mut self) -> Option<Cycle> {
        let outcome = self.receiver.outcome()?;
        let result = self.dispatcher.dispatch(outcome);
        self.receiver.reset();
        Some(Cycle {
            report: report_lines(&result),
            result,
        })
    }

    pub fn machine(&self) -> &MachineState {
        self.dispatcher.machine()
    }

    pub fn complete_motion(&mut self) {
        self.dispatcher.complete_motion()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cnc::state::Point;
    use crate::link::frame::{encode_frame, FrameHeader};

    fn gcode_frame(line: &str) -> Vec<u8> {
        frame_with_opcode(0x50, line)
    }

    fn frame_with_opcode(opcode: u8, line: &str) -> Vec<u8> {
        let header = FrameHeader {
            sequence: 0,
            address: 1,
            opcode,
        };
        encode_frame(header, line.as_bytes()).unwrap()
    }

    fn send(controller: &mut Controller, bytes: &[u8]) -> Option<Cycle> {
        for byte in bytes {
            controller.on_byte(*byte);
        }
        controller.poll()
    }

    #[test]
    fn nothing_to_poll_mid_frame() {
        let mut controller = Controller::new(&ControllerConfig::default());
        let frame = gcode_frame("G90");
        assert_eq!(send(&mut controller, &frame[..4]), None);
        let cycle = send(&mut controller, &frame[4..]).unwrap();
        assert!(matches!(cycle.result, CycleResult::Success(_)));
    }

    #[test]
    fn moves_commit_after_completion() {
        let mut controller = Controller::new(&ControllerConfig::default());
        let cycle = send(&mut controller, &gcode_frame("G00 X50 Y10")).unwrap();
        assert_eq!(cycle.report, vec![ReportLine::RxComplete, ReportLine::CmdComplete]);
        assert_eq!(controller.machine().target, Point::new(50.0, 10.0));
        assert_eq!(controller.machine().position, Point::new(0.0, 0.0));
        controller.complete_motion();
        assert_eq!(controller.machine().position, Point::new(50.0, 10.0));
    }

    #[test]
    fn unknown_opcode_leaves_machine_and_keeps_receiving() {
        let mut controller = Controller::new(&ControllerConfig::default());
        let before = *controller.machine();
        let cycle = send(&mut controller, &frame_with_opcode(0x51, "G00 X50 Y10")).unwrap();
        assert_eq!(cycle.result, CycleResult::BadCommand(Fault::UnknownCommand.into()));
        assert_eq!(
            cycle.report,
            vec![ReportLine::RxComplete, ReportLine::Fault(Fault::UnknownCommand)]
        );
        assert_eq!(*controller.machine(), before);

        let cycle = send(&mut controller, &gcode_frame("G01 X7 Y7")).unwrap();
        assert!(matches!(cycle.result, CycleResult::Success(CommandOutcome::Move(_))));
    }

    #[test]
    fn bad_length_never_reaches_interpreter() {
        for len in [3u8, 254] {
            let mut controller = Controller::new(&ControllerConfig::default());
            let before = *controller.machine();
            let cycle = send(&mut controller, &[0xAC, 0x53, len, 0, 1, 0x50]).unwrap();
            assert_eq!(cycle.result, CycleResult::BadPackage(Fault::BadLength.into()));
            assert_eq!(cycle.report, vec![ReportLine::Fault(Fault::BadLength)]);
            assert_eq!(*controller.machine(), before);
        }
    }

    #[test]
    fn corrupted_frame_is_reported_then_next_frame_accepted() {
        let mut controller = Controller::new(&ControllerConfig::default());
        let mut frame = gcode_frame("G91");
        frame[6] = b'X';
        let cycle = send(&mut controller, &frame).unwrap();
        assert_eq!(cycle.report, vec![ReportLine::Fault(Fault::BadCrc)]);
        assert_eq!(controller.machine().mode, crate::cnc::state::CoordinateMode::Absolute);

        let cycle = send(&mut controller, &gcode_frame("G91")).unwrap();
        assert_eq!(cycle.result.faults(), FaultSet::empty());
        assert_eq!(controller.machine().mode, crate::cnc::state::CoordinateMode::Relative);
    }

    #[test]
    fn out_of_bounds_is_a_command_fault() {
        let mut controller = Controller::new(&ControllerConfig::default());
        let cycle = send(&mut controller, &gcode_frame("G01 X400 Y10")).unwrap();
        assert_eq!(
            cycle.report,
            vec![
                ReportLine::RxComplete,
                ReportLine::Fault(Fault::CoordinatesOutOfBounds)
            ]
        );
        assert_eq!(controller.machine().target, Point::default());
    }

    #[test]
    fn poll_consumes_outcome_once() {
        let mut controller = Controller::new(&ControllerConfig::default());
        assert!(send(&mut controller, &gcode_frame("G90")).is_some());
        assert_eq!(controller.poll(), None);
    }

    #[test]
    fn configured_opcode_routes_gcode() {
        let mut config = ControllerConfig::default();
        config.link.gcode_opcode = 0x10;
        let mut controller = Controller::new(&config);
        let cycle = send(&mut controller, &frame_with_opcode(0x10, "G91")).unwrap();
        assert!(matches!(cycle.result, CycleResult::Success(_)));
        let cycle = send(&mut controller, &gcode_frame("G90")).unwrap();
        assert_eq!(cycle.result, CycleResult::BadCommand(Fault::UnknownCommand.into()));
    }
}
