use std::fmt;

use super::{
    dispatch::CycleResult,
    fault::{Fault, FaultTier},
};

/// One line of the text response channel, without its line ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLine {
    RxComplete,
    CmdComplete,
    Fault(Fault),
}

impl Fault {
    pub fn report_text(self) -> &'static str {
        match self {
            Fault::BadPreamble => "WRONG PREAMB!",
            Fault::FrameTooLarge => "PACKET TOO BIG!",
            Fault::BadLength => "WRONG LEN!",
            Fault::BadSequence => "WRONG SQN!",
            Fault::BadAddress => "WRONG ADDR!",
            Fault::BadCrc => "WRONG CRC!",
            Fault::UnknownCommand => "UNKNOWN COMMAND!",
            Fault::UnsupportedGcode => "UNSUPPORTED GCODE!",
            Fault::CoordinatesOutOfBounds => "WRONG COORDINATES!",
            Fault::InvalidFeedRate => "WRONG FEEDRATE!",
        }
    }
}

impl ReportLine {
    pub fn text(self) -> &'static str {
        match self {
            ReportLine::RxComplete => "RX_COMPLETE!",
            ReportLine::CmdComplete => "CMD_COMPLETE!",
            ReportLine::Fault(fault) => fault.report_text(),
        }
    }

    /// Classifies a received line. Surrounding whitespace, including any line ending, is
    /// ignored.
    pub fn parse(line: &str) -> Option<ReportLine> {
        let line = line.trim();
        [ReportLine::RxComplete, ReportLine::CmdComplete]
            .into_iter()
            .chain(Fault::ALL.into_iter().map(ReportLine::Fault))
            .find(|candidate| candidate.text() == line)
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// The lines sent back for one cycle, in transmission order.
///
/// A frame that failed framing only reports its framing faults; command
/// faults can't be raised for it anyway.
pub fn report_lines(result: &CycleResult) -> Vec<ReportLine> {
    match result {
        CycleResult::BadPackage(faults) => faults
            .of_tier(FaultTier::Framing)
            .iter()
            .map(ReportLine::Fault)
            .collect(),
        CycleResult::BadCommand(faults) => std::iter::once(ReportLine::RxComplete)
            .chain(faults.of_tier(FaultTier::Command).iter().map(ReportLine::Fault))
            .collect(),
        CycleResult::Success(_) => vec![ReportLine::RxComplete, ReportLine::CmdComplete],
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cnc::{fault::FaultSet, gcode::CommandOutcome, state::CoordinateMode};

    #[test]
    fn success_lines() {
        let outcome = CommandOutcome::ModeSet(CoordinateMode::Relative);
        let lines = report_lines(&CycleResult::Success(outcome));
        assert_eq!(lines, vec![ReportLine::RxComplete, ReportLine::CmdComplete]);
        assert_eq!(lines[0].to_string(), "RX_COMPLETE!");
        assert_eq!(lines[1].to_string(), "CMD_COMPLETE!");
    }

    #[test]
    fn framing_faults_are_reported_in_order() {
        let faults: FaultSet = [Fault::BadCrc, Fault::BadPreamble].into_iter().collect();
        let texts: Vec<_> = report_lines(&CycleResult::BadPackage(faults))
            .into_iter()
            .map(ReportLine::text)
            .collect();
        assert_eq!(texts, vec!["WRONG PREAMB!", "WRONG CRC!"]);
    }

    #[test]
    fn command_faults_follow_receive_notice() {
        let faults: FaultSet = [Fault::InvalidFeedRate, Fault::CoordinatesOutOfBounds]
            .into_iter()
            .collect();
        let texts: Vec<_> = report_lines(&CycleResult::BadCommand(faults))
            .into_iter()
            .map(ReportLine::text)
            .collect();
        assert_eq!(texts, vec!["RX_COMPLETE!", "WRONG COORDINATES!", "WRONG FEEDRATE!"]);
    }

    #[test]
    fn parses_every_line() {
        assert_eq!(ReportLine::parse("RX_COMPLETE!\n\r"), Some(ReportLine::RxComplete));
        assert_eq!(ReportLine::parse("\rCMD_COMPLETE!"), Some(ReportLine::CmdComplete));
        for fault in Fault::ALL {
            assert_eq!(ReportLine::parse(fault.report_text()), Some(ReportLine::Fault(fault)));
        }
        assert_eq!(ReportLine::parse("ok"), None);
        assert_eq!(ReportLine::parse(""), None);
    }
}
