use std::{io::ErrorKind, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use tokio::{
    io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf},
    join,
    sync::{mpsc, oneshot},
};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, error, info};

use super::receiver::{FrameOutcome, FrameReceiver};
use crate::{
    cnc::{
        dispatch::{CycleResult, Dispatcher},
        gcode::CommandOutcome,
        motion::PlannedMove,
        report::report_lines,
    },
    config::LinkConfig,
};

/// Opens `path` as 8N1 with no flow control.
pub fn open_serial(
    path: &str,
    baud: u32,
) -> anyhow::Result<(ReadHalf<SerialStream>, WriteHalf<SerialStream>)> {
    let port = tokio_serial::new(path, baud)
        .data_bits(DataBits::Eight)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_millis(30))
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open_native_async()
        .with_context(|| format!("Failed to open serial port {}", path))?;
    Ok(split(port))
}

/// Carries out a planned move on the hardware.
#[async_trait]
pub trait MotionDriver: Send + Sync {
    async fn execute(&self, planned: &PlannedMove) -> anyhow::Result<()>;
}

/// Driver without hardware: logs each move and reports it done immediately.
pub struct LoggingDriver;

#[async_trait]
impl MotionDriver for LoggingDriver {
    async fn execute(&self, planned: &PlannedMove) -> anyhow::Result<()> {
        info!(
            from = ?planned.from,
            to = ?planned.to,
            steps_x = planned.steps_x,
            steps_y = planned.steps_y,
            rapid = planned.rapid,
            feed_rate = planned.feed_rate,
            "executing move"
        );
        Ok(())
    }
}

type Settled = (FrameOutcome, oneshot::Sender<()>);

async fn read_frames<R: AsyncRead + Unpin>(
    reader: R,
    link: &LinkConfig,
    outcomes: mpsc::Sender<Settled>,
) -> anyhow::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut receiver = FrameReceiver::new(link.device_address, link.expected_sequence);
    loop {
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                debug!(pending = receiver.received().len(), "link closed");
                return Ok(());
            }
            Err(err) => return Err(err).context("Failed to read from link"),
        };
        receiver.push(byte);
        let Some(outcome) = receiver.outcome() else {
            continue;
        };
        debug!(?outcome, "frame settled");
        let (rearm, rearmed) = oneshot::channel();
        if outcomes.send((outcome, rearm)).await.is_err() || rearmed.await.is_err() {
            // Dispatch side is gone.
            return Ok(());
        }
        receiver.reset();
    }
}

async fn dispatch_frames<W: AsyncWrite + Unpin, D: MotionDriver>(
    mut writer: W,
    mut dispatcher: Dispatcher,
    driver: &D,
    link: &LinkConfig,
    mut outcomes: mpsc::Receiver<Settled>,
) -> anyhow::Result<Dispatcher> {
    while let Some((outcome, rearm)) = outcomes.recv().await {
        let result = dispatcher.dispatch(outcome);
        for line in report_lines(&result) {
            writer.write_all(line.text().as_bytes()).await?;
            writer.write_all(link.line_ending.as_bytes()).await?;
        }
        writer.flush().await.context("Failed to write report")?;
        if let CycleResult::Success(CommandOutcome::Move(planned)) = &result {
            match driver.execute(planned).await {
                Ok(()) => dispatcher.complete_motion(),
                Err(err) => error!("motion driver failed, position not updated: {:?}", err),
            }
        }
        // The reader may already have stopped at EOF.
        rearm.send(()).ok();
    }
    Ok(dispatcher)
}

/// Serves the framed protocol on a byte stream until the reader reaches EOF.
///
/// The reading side stops after each settled frame and only resumes once the
/// dispatching side has answered it, so at most one frame is in flight.
/// Returns the dispatcher so its final machine state can be inspected.
pub async fn run_link<R, W, D>(
    reader: R,
    writer: W,
    dispatcher: Dispatcher,
    driver: &D,
    link: &LinkConfig,
) -> anyhow::Result<Dispatcher>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    D: MotionDriver,
{
    let (sender, receiver) = mpsc::channel(1);
    let (read_result, dispatch_result) = join!(
        read_frames(reader, link, sender),
        dispatch_frames(writer, dispatcher, driver, link, receiver)
    );
    read_result?;
    dispatch_result
}
