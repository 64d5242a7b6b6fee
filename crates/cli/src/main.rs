// AvrLab - Microcontroller Emulation Lab
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod host;
mod size_limited_writer;
mod summary;

use anyhow::Result;
use avrlab_config::{parse_size, BoardDescriptor, Target};
use avrlab_core::controller::{LabController, LabState};
use avrlab_core::decoder::{avr::instruction_words, decode_avr};
use avrlab_core::memory::ProgramWords;
use avrlab_core::scheduler::FrameScheduler;
use avrlab_core::serial::SerialBridge;
use clap::{Parser, Subcommand};
use host::{LedLogger, StdoutTerminal, TranscriptTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use summary::{sha256_hex, RunSummary};
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EXIT_PASS: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

fn parse_byte_size(s: &str) -> Result<u64, String> {
    parse_size(s).map_err(|e| format!("Invalid size '{}': {}", s, e))
}

#[derive(Parser, Debug)]
#[command(author, version, about = "AvrLab microcontroller emulator", long_about = None)]
struct Cli {
    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run firmware in real time with the serial console on stdin/stdout.
    Run(RunArgs),

    /// Print the program words of a firmware image.
    Dump(DumpArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the firmware (Intel HEX or UF2)
    #[arg(short, long)]
    firmware: PathBuf,

    /// Path to a board descriptor (YAML). Defaults to an Arduino Uno.
    #[arg(short, long)]
    board: Option<PathBuf>,

    /// Stop after this many milliseconds of wall-clock time (default: until Ctrl-C)
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Write a run summary (JSON) when the run ends
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Do not forward stdin to the emulated UART
    #[arg(long)]
    no_stdin: bool,

    /// Also copy serial output to this file
    #[arg(long)]
    serial_log: Option<PathBuf>,

    /// Cap for --serial-log, e.g. "64KiB"
    #[arg(long, default_value = "1MiB", value_parser = parse_byte_size)]
    serial_log_max: u64,
}

#[derive(Parser, Debug)]
struct DumpArgs {
    /// Path to the firmware (Intel HEX or UF2)
    #[arg(short, long)]
    firmware: PathBuf,

    /// Path to a board descriptor (YAML). Defaults to an Arduino Uno.
    #[arg(short, long)]
    board: Option<PathBuf>,

    /// Number of program words to print
    #[arg(short, long, default_value = "64")]
    words: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Dump(args) => dump(args),
    }
}

fn load_board(path: Option<&Path>) -> Result<BoardDescriptor> {
    match path {
        Some(path) => {
            info!("Loading board descriptor: {:?}", path);
            BoardDescriptor::from_file(path)
        }
        None => Ok(BoardDescriptor::arduino_uno()),
    }
}

fn run(args: RunArgs) -> ExitCode {
    let board = match load_board(args.board.as_deref()) {
        Ok(board) => board,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    let code = runtime.block_on(run_lab(board, args));
    // A pending stdin read sits on the blocking pool and would hold up a
    // normal runtime drop.
    runtime.shutdown_background();
    ExitCode::from(code)
}

async fn run_lab(board: BoardDescriptor, args: RunArgs) -> u8 {
    info!("Starting AvrLab on board '{}' ({})", board.name, board.target);

    info!("Loading firmware: {:?}", args.firmware);
    let bytes = match std::fs::read(&args.firmware) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read firmware file {:?}: {}", args.firmware, e);
            return EXIT_CONFIG_ERROR;
        }
    };
    let image = match avrlab_loader::parse_firmware(&args.firmware, &bytes, &board) {
        Ok(image) => image,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_CONFIG_ERROR;
        }
    };
    let firmware_hash = sha256_hex(&bytes);

    let pace = FrameScheduler::for_board(&board).frame_period();
    let led_ids: Vec<String> = board.leds().map(|led| led.id.clone()).collect();
    let mut lab = LabController::new(board, tokio::runtime::Handle::current());
    for id in &led_ids {
        lab.attach_led(id, Arc::new(LedLogger::new(id)));
    }

    let bridge = Arc::new(SerialBridge::attach(
        lab.serial().clone(),
        Box::new(StdoutTerminal),
    ));
    let _transcript = match &args.serial_log {
        Some(path) => match TranscriptTerminal::create(path, args.serial_log_max) {
            Ok(term) => Some(SerialBridge::attach(lab.serial().clone(), Box::new(term))),
            Err(e) => {
                error!("{:#}", e);
                return EXIT_CONFIG_ERROR;
            }
        },
        None => None,
    };

    lab.load_firmware(image);
    lab.run();

    let mut code = EXIT_PASS;
    if lab.state() == LabState::Running {
        let pump = (!args.no_stdin).then(|| spawn_stdin_pump(bridge.clone(), pace * 2));
        wait_for_end(args.duration_ms).await;
        if let Some(pump) = pump {
            pump.abort();
        }
        lab.stop();
    } else {
        for notice in lab.notices() {
            error!("{}", notice);
        }
        code = EXIT_RUNTIME_ERROR;
    }

    let summary = RunSummary::collect(&lab, &args.firmware, firmware_hash);
    info!(
        "Run finished: {} instructions in {} frames ({:.0} IPS), {} decode errors",
        summary.instructions,
        summary.frames,
        summary.instructions_per_second,
        summary.decode_errors
    );
    if let Some(path) = &args.summary {
        match summary.write_to(path) {
            Ok(()) => info!("Wrote run summary to {:?}", path),
            Err(e) => {
                error!("{:#}", e);
                if code == EXIT_PASS {
                    code = EXIT_RUNTIME_ERROR;
                }
            }
        }
    }
    code
}

async fn wait_for_end(duration_ms: Option<u64>) {
    let deadline = async {
        match duration_ms {
            Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = deadline => info!("Run duration elapsed"),
        res = tokio::signal::ctrl_c() => match res {
            Ok(()) => info!("Interrupted"),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        },
    }
}

/// Feeds stdin into the UART one character at a time.
///
/// The emulated UART holds a single received byte, so each character gets
/// `pace` for the firmware to read it before the next one lands.
fn spawn_stdin_pump(bridge: Arc<SerialBridge>, pace: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 256];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => {
                    debug!("stdin closed");
                    break;
                }
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                    let mut utf8 = [0u8; 4];
                    for ch in text.chars() {
                        bridge.on_data(ch.encode_utf8(&mut utf8));
                        tokio::time::sleep(pace).await;
                    }
                }
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    break;
                }
            }
        }
    })
}

fn dump(args: DumpArgs) -> ExitCode {
    let board = match load_board(args.board.as_deref()) {
        Ok(board) => board,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let image = match avrlab_loader::load_firmware(&args.firmware, &board) {
        Ok(image) => image,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let program = ProgramWords::from_image(&image);
    let limit = args.words.min(program.len());
    for line in dump_lines(&program, board.target, limit) {
        println!("{}", line);
    }
    ExitCode::from(EXIT_PASS)
}

/// Formats the first `limit` words, disassembled when the target has an engine.
fn dump_lines(program: &ProgramWords, target: Target, limit: usize) -> Vec<String> {
    let words = &program.as_slice()[..limit.min(program.len())];
    if !target.has_engine() {
        return words
            .chunks(8)
            .enumerate()
            .map(|(row, chunk)| {
                let cells: Vec<String> = chunk.iter().map(|w| format!("{:04x}", w)).collect();
                format!("{:06x}: {}", row * 16, cells.join(" "))
            })
            .collect();
    }

    let mut lines = Vec::new();
    let mut pc = 0usize;
    while pc < words.len() {
        let op = words[pc];
        let len = instruction_words(op) as usize;
        let instr = decode_avr(op, program.fetch(pc as u32 + 1));
        if len == 2 {
            lines.push(format!(
                "{:05x}: {:04x} {:04x}  {:?}",
                pc,
                op,
                program.fetch(pc as u32 + 1),
                instr
            ));
        } else {
            lines.push(format!("{:05x}: {:04x}       {:?}", pc, op, instr));
        }
        pc += len;
    }
    lines
}
