use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use clap_stdin::FileOrStdin;
use cnc_controller::{
    cnc::{
        fault::{Fault, FaultSet},
        report::ReportLine,
    },
    link::{
        connection::open_serial,
        frame::{encode_frame, FrameHeader},
    },
};
use itertools::Itertools;
use serde::Serialize;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    time::timeout,
};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Wrap G-code lines in controller frames, and optionally send them.",
    long_about = None
)]
struct Args {
    /// The G-code file to process.
    #[arg()]
    input: FileOrStdin,

    #[arg(long, default_value_t = 1)]
    address: u8,
    #[arg(long, default_value_t = 0)]
    sequence: u8,
    #[arg(long, default_value_t = 0x50)]
    opcode: u8,

    /// Print the frames as a JSON list instead of one hex line per frame.
    #[arg(long)]
    json: bool,

    /// Send the frames to this serial port instead of printing them.
    #[arg(short, long)]
    port: Option<String>,
    #[arg(short, long, default_value_t = 115200)]
    baud: u32,
    /// How often a frame is resent after a checksum error or no answer.
    #[arg(long, default_value_t = 3)]
    retries: u32,
    /// Milliseconds to wait for an answer.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
}

#[derive(Serialize, Debug)]
struct EncodedLine<'a> {
    line: &'a str,
    frame: String,
}

/// Lines worth sending: blank lines and `(` or `;` comments are dropped.
fn gcode_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('(') && !line.starts_with(';'))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02X}", byte)).join(" ")
}

fn encode_lines<'a>(text: &'a str, header: FrameHeader) -> anyhow::Result<Vec<(&'a str, Vec<u8>)>> {
    gcode_lines(text)
        .enumerate()
        .map(|(index, line)| {
            encode_frame(header, line.as_bytes())
                .map(|frame| (line, frame))
                .with_context(|| format!("Line {} ({:?}) can't be framed", index + 1, line))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Complete,
    Rejected(FaultSet),
    Silent,
}

impl Answer {
    /// A checksum error or a lost answer is worth resending; anything else is final.
    fn is_retryable(self) -> bool {
        match self {
            Answer::Silent => true,
            Answer::Rejected(faults) => faults == FaultSet::from(Fault::BadCrc),
            Answer::Complete => false,
        }
    }
}

/// Quiet period after a fault line before the batch is taken as complete.
const FAULT_SETTLE: Duration = Duration::from_millis(100);

async fn await_answer<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    wait: Duration,
) -> anyhow::Result<Answer> {
    let mut faults = FaultSet::empty();
    loop {
        let window = if faults.is_empty() { wait } else { FAULT_SETTLE };
        let mut line = String::new();
        let read = match timeout(window, reader.read_line(&mut line)).await {
            Err(_elapsed) if faults.is_empty() => return Ok(Answer::Silent),
            Err(_elapsed) => return Ok(Answer::Rejected(faults)),
            Ok(read) => read.context("Failed to read answer")?,
        };
        if read == 0 {
            return Err(anyhow!("Device closed the connection"));
        }
        match ReportLine::parse(&line) {
            Some(ReportLine::CmdComplete) => return Ok(Answer::Complete),
            Some(ReportLine::RxComplete) => debug!("frame received by device"),
            Some(ReportLine::Fault(fault)) => faults.insert(fault),
            None if line.trim().is_empty() => {}
            None => warn!("unexpected line from device: {:?}", line),
        }
    }
}

async fn send_frames<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    reader: R,
    mut writer: W,
    frames: &[(&str, Vec<u8>)],
    retries: u32,
    wait: Duration,
) -> anyhow::Result<()> {
    let mut reader = BufReader::new(reader);
    for (line, frame) in frames {
        let mut attempt = 0;
        loop {
            writer.write_all(frame).await.context("Failed to send frame")?;
            writer.flush().await?;
            let answer = await_answer(&mut reader, wait).await?;
            match answer {
                Answer::Complete => {
                    info!(line, "command complete");
                    break;
                }
                answer if answer.is_retryable() && attempt < retries => {
                    attempt += 1;
                    warn!(line, ?answer, attempt, "resending frame");
                }
                Answer::Rejected(faults) => {
                    return Err(anyhow!("Device rejected {:?}: {}", line, faults))
                }
                _ => {
                    return Err(anyhow!("No answer for {:?} after {} attempts", line, attempt + 1))
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    println!("Running with {:?}", args);
    tracing_subscriber::fmt::init();

    let header = FrameHeader {
        sequence: args.sequence,
        address: args.address,
        opcode: args.opcode,
    };
    let frames = encode_lines(&args.input, header)?;

    match &args.port {
        None if args.json => {
            let lines: Vec<_> = frames
                .iter()
                .map(|(line, frame)| EncodedLine {
                    line: *line,
                    frame: to_hex(frame),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&lines)?);
        }
        None => {
            for (_, frame) in &frames {
                println!("{}", to_hex(frame));
            }
        }
        Some(port) => {
            let (reader, writer) = open_serial(port, args.baud)?;
            let wait = Duration::from_millis(args.timeout_ms);
            send_frames(reader, writer, &frames, args.retries, wait).await?;
            info!(count = frames.len(), "all frames acknowledged");
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::{duplex, split, AsyncReadExt};

    const HEADER: FrameHeader = FrameHeader {
        sequence: 0,
        address: 1,
        opcode: 0x50,
    };

    #[test]
    fn skips_blank_and_comment_lines() {
        let text = "G90\r\n\n  ; setup\n(comment)\n  G00 X50 Y10  \n";
        assert_eq!(gcode_lines(text).collect::<Vec<_>>(), vec!["G90", "G00 X50 Y10"]);
    }

    #[test]
    fn hex_output() {
        let frames = encode_lines("G90\n", HEADER).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(to_hex(&frames[0].1).starts_with("AC 53 07 00 01 50 47 39 30"));
    }

    #[test]
    fn oversized_line_is_an_error() {
        let text = "G".repeat(300);
        assert!(encode_lines(&text, HEADER).is_err());
    }

    #[test]
    fn only_checksum_errors_are_retried() {
        assert!(Answer::Silent.is_retryable());
        assert!(Answer::Rejected(Fault::BadCrc.into()).is_retryable());
        let crc_and_address = [Fault::BadCrc, Fault::BadAddress].into_iter().collect();
        assert!(!Answer::Rejected(crc_and_address).is_retryable());
        assert!(!Answer::Rejected(Fault::CoordinatesOutOfBounds.into()).is_retryable());
        assert!(!Answer::Complete.is_retryable());
    }

    #[tokio::test]
    async fn reads_answers() {
        let (mut device, host) = duplex(1024);
        let mut host = BufReader::new(host);
        device.write_all(b"RX_COMPLETE!\n\rCMD_COMPLETE!\n\r").await.unwrap();
        assert_eq!(
            await_answer(&mut host, Duration::from_millis(500)).await.unwrap(),
            Answer::Complete
        );
        device.write_all(b"\rRX_COMPLETE!\n\rWRONG COORDINATES!\n\r").await.unwrap();
        assert_eq!(
            await_answer(&mut host, Duration::from_millis(500)).await.unwrap(),
            Answer::Rejected(Fault::CoordinatesOutOfBounds.into())
        );
        assert_eq!(
            await_answer(&mut host, Duration::from_millis(50)).await.unwrap(),
            Answer::Silent
        );
    }

    #[tokio::test]
    async fn resends_after_checksum_error() {
        let (device, host) = duplex(1024);
        let (host_read, host_write) = split(host);
        let (mut device_read, mut device_write) = split(device);
        let frames = encode_lines("G91\n", HEADER).unwrap();
        let expected = frames[0].1.clone();
        let (sent, received) = tokio::join!(
            send_frames(host_read, host_write, &frames, 3, Duration::from_millis(500)),
            async move {
                let mut first = vec![0; expected.len()];
                device_read.read_exact(&mut first).await.unwrap();
                device_write.write_all(b"WRONG CRC!\n\r").await.unwrap();
                let mut second = vec![0; expected.len()];
                device_read.read_exact(&mut second).await.unwrap();
                device_write.write_all(b"RX_COMPLETE!\n\rCMD_COMPLETE!\n\r").await.unwrap();
                (first == expected, second == expected)
            }
        );
        sent.unwrap();
        assert_eq!(received, (true, true));
    }

    #[tokio::test]
    async fn gives_up_on_command_faults() {
        let (device, host) = duplex(1024);
        let (host_read, host_write) = split(host);
        let (mut device_read, mut device_write) = split(device);
        let frames = encode_lines("G17\n", HEADER).unwrap();
        let len = frames[0].1.len();
        let (sent, _) = tokio::join!(
            send_frames(host_read, host_write, &frames, 3, Duration::from_millis(500)),
            async move {
                let mut frame = vec![0; len];
                device_read.read_exact(&mut frame).await.unwrap();
                device_write.write_all(b"RX_COMPLETE!\n\rUNSUPPORTED GCODE!\n\r").await.unwrap();
                device_write
            }
        );
        assert!(sent.is_err());
    }
}
