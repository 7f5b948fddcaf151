use tracing::trace;

use super::crc::crc8;
use super::frame::{
    frame_len, Frame, ADDRESS_INDEX, FRAME_BUFFER_SIZE, LEN_INDEX, MAX_DECLARED_LEN,
    MAX_FRAME_LEN, MIN_DECLARED_LEN, PREAMBLE, SEQUENCE_INDEX,
};
use crate::cnc::fault::{Fault, FaultSet};

/// Where the receiver stands after the bytes received so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    AwaitingPreamble,
    AwaitingLength,
    AwaitingSequence,
    AwaitingAddress,
    Accumulating(u8),
    Complete,
    Faulted,
}
impl ReceiveState {
    /// Complete and Faulted are settled: no further bytes are taken until reset.
    pub fn is_settled(self) -> bool {
        matches!(self, ReceiveState::Complete | ReceiveState::Faulted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Complete(Frame),
    Faulted(FaultSet),
}

fn valid_declared_len(len: u8) -> bool {
    (MIN_DECLARED_LEN..=MAX_DECLARED_LEN).contains(&len)
}

/// Incremental frame validator, driven one byte at a time.
///
/// Every field check is re-run on each byte once enough bytes are present to
/// evaluate it, so the fault set always describes the whole buffer.
pub struct FrameReceiver {
    buffer: [u8; FRAME_BUFFER_SIZE],
    received: usize,
    expected_sequence: u8,
    device_address: u8,
    faults: FaultSet,
    state: ReceiveState,
}

impl FrameReceiver {
    pub fn new(device_address: u8, expected_sequence: u8) -> Self {
        FrameReceiver {
            buffer: [0; FRAME_BUFFER_SIZE],
            received: 0,
            expected_sequence,
            device_address,
            faults: FaultSet::empty(),
            state: ReceiveState::AwaitingPreamble,
        }
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }
    pub fn faults(&self) -> FaultSet {
        self.faults
    }
    pub fn received(&self) -> &[u8] {
        &self.buffer[..self.received]
    }

    /// Feeds one byte. Bytes offered while settled are ignored.
    pub fn push(&mut self, byte: u8) -> ReceiveState {
        if self.state.is_settled() {
            trace!(byte, "receiver settled, byte ignored");
            return self.state;
        }
        if self.received < FRAME_BUFFER_SIZE {
            self.buffer[self.received] = byte;
        }
        self.received += 1;
        self.faults = self.evaluate();
        self.state = self.next_state();
        trace!(received = self.received, state = ?self.state, "byte received");
        self.state
    }

    fn declared_len(&self) -> Option<u8> {
        (self.received > LEN_INDEX).then(|| self.buffer[LEN_INDEX])
    }

    /// Only a length inside the accepted range can ever complete a frame.
    fn is_complete(&self) -> bool {
        self.declared_len()
            .filter(|len| valid_declared_len(*len))
            .map_or(false, |len| self.received == frame_len(len))
    }

    fn evaluate(&self) -> FaultSet {
        let received = self.received;
        let mut faults = FaultSet::empty();
        // Backstop only: a valid length byte completes the frame by MAX_FRAME_LEN and an
        // invalid one faults on the length byte, so this never fires on its own.
        faults.set_if(Fault::FrameTooLarge, received > MAX_FRAME_LEN);
        faults.set_if(
            Fault::BadPreamble,
            received >= PREAMBLE.len() && self.buffer[..PREAMBLE.len()] != PREAMBLE,
        );
        if let Some(len) = self.declared_len() {
            faults.set_if(Fault::BadLength, !valid_declared_len(len));
        }
        faults.set_if(
            Fault::BadSequence,
            received > SEQUENCE_INDEX && self.buffer[SEQUENCE_INDEX] != self.expected_sequence,
        );
        faults.set_if(
            Fault::BadAddress,
            received > ADDRESS_INDEX && self.buffer[ADDRESS_INDEX] != self.device_address,
        );
        if self.is_complete() {
            let (body, crc) = self.buffer[..received].split_at(received - 1);
            faults.set_if(Fault::BadCrc, crc8(body) != crc[0]);
        }
        faults
    }

    fn next_state(&self) -> ReceiveState {
        if !self.faults.is_empty() {
            return ReceiveState::Faulted;
        }
        if self.is_complete() {
            return ReceiveState::Complete;
        }
        match (self.received, self.declared_len()) {
            (0..=1, _) => ReceiveState::AwaitingPreamble,
            (2, _) => ReceiveState::AwaitingLength,
            (3, _) => ReceiveState::AwaitingSequence,
            (4, _) => ReceiveState::AwaitingAddress,
            (_, Some(len)) => ReceiveState::Accumulating(len),
            (_, None) => ReceiveState::AwaitingLength,
        }
    }

    /// The settled outcome, if any. Stays available until [`FrameReceiver::reset`].
    pub fn outcome(&self) -> Option<FrameOutcome> {
        match self.state {
            ReceiveState::Complete => Some(FrameOutcome::Complete(Frame::from_validated(
                self.received().to_vec(),
            ))),
            ReceiveState::Faulted => Some(FrameOutcome::Faulted(self.faults)),
            _ => None,
        }
    }

    /// Re-arms for a new frame.
    pub fn reset(&mut self) {
        self.received = 0;
        self.faults = FaultSet::empty();
        self.state = ReceiveState::AwaitingPreamble;
    }
}
