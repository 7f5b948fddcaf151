use std::fmt;

use itertools::Itertools;

/// Which stage of a cycle a fault belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultTier {
    /// The frame itself is unusable; its payload is never interpreted.
    Framing,
    /// The frame was intact but the command in it was rejected.
    Command,
}

/// Every fault the controller can raise during one receive/dispatch cycle.
///
/// Declaration order is the order faults are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    BadPreamble,
    FrameTooLarge,
    BadLength,
    BadSequence,
    BadAddress,
    BadCrc,

    UnknownCommand,
    UnsupportedGcode,
    CoordinatesOutOfBounds,
    InvalidFeedRate,
}

impl Fault {
    pub const ALL: [Fault; 10] = [
        Fault::BadPreamble,
        Fault::FrameTooLarge,
        Fault::BadLength,
        Fault::BadSequence,
        Fault::BadAddress,
        Fault::BadCrc,
        Fault::UnknownCommand,
        Fault::UnsupportedGcode,
        Fault::CoordinatesOutOfBounds,
        Fault::InvalidFeedRate,
    ];

    pub fn tier(self) -> FaultTier {
        match self {
            Fault::BadPreamble
            | Fault::FrameTooLarge
            | Fault::BadLength
            | Fault::BadSequence
            | Fault::BadAddress
            | Fault::BadCrc => FaultTier::Framing,
            Fault::UnknownCommand
            | Fault::UnsupportedGcode
            | Fault::CoordinatesOutOfBounds
            | Fault::InvalidFeedRate => FaultTier::Command,
        }
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Fault::BadPreamble => "bad preamble",
            Fault::FrameTooLarge => "frame too large",
            Fault::BadLength => "bad length",
            Fault::BadSequence => "bad sequence number",
            Fault::BadAddress => "bad device address",
            Fault::BadCrc => "bad crc",
            Fault::UnknownCommand => "unknown command",
            Fault::UnsupportedGcode => "unsupported g-code",
            Fault::CoordinatesOutOfBounds => "coordinates out of bounds",
            Fault::InvalidFeedRate => "invalid feed rate",
        };
        f.write_str(text)
    }
}

/// A set of [`Fault`]s stored as a bitset over the closed enum.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultSet(u16);

impl FaultSet {
    pub const fn empty() -> Self {
        FaultSet(0)
    }
    pub fn insert(&mut self, fault: Fault) {
        self.0 |= fault.bit();
    }
    /// Inserts `fault` when `condition` holds; used to re-evaluate checks field by field.
    pub fn set_if(&mut self, fault: Fault, condition: bool) {
        if condition {
            self.insert(fault);
        }
    }
    pub fn contains(&self, fault: Fault) -> bool {
        self.0 & fault.bit() != 0
    }
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
    pub fn union(self, other: FaultSet) -> FaultSet {
        FaultSet(self.0 | other.0)
    }
    /// Faults in report order.
    pub fn iter(&self) -> impl Iterator<Item = Fault> {
        let set = *self;
        Fault::ALL.into_iter().filter(move |fault| set.contains(*fault))
    }
    pub fn of_tier(&self, tier: FaultTier) -> FaultSet {
        self.iter().filter(|fault| fault.tier() == tier).collect()
    }
}

impl From<Fault> for FaultSet {
    fn from(fault: Fault) -> Self {
        let mut set = FaultSet::empty();
        set.insert(fault);
        set
    }
}

impl FromIterator<Fault> for FaultSet {
    fn from_iter<I: IntoIterator<Item = Fault>>(iter: I) -> Self {
        let mut set = FaultSet::empty();
        for fault in iter {
            set.insert(fault);
        }
        set
    }
}

impl fmt::Debug for FaultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for FaultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.iter().format(", "))
    }
}
