//! Live Scanning Loop
//!
//! Pulls frames from a [`FrameSource`], applies at most one pending user
//! command per frame, otherwise lets the scheduler auto-scan, and prints new
//! results to the terminal. Commands arrive over a channel fed by a stdin
//! reader thread; everything else runs on the calling thread.

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, TryRecvError};
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::capture::frame::CapturedFrame;
use crate::capture::FrameSource;
use crate::pipeline::ResolvedMedicine;
use crate::scanner::{ScanOutcome, ScanScheduler};

const RULE_WIDTH: usize = 50;

/// User command for the live loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCommand {
    /// Scan the current frame now
    Scan,
    /// Forget the last result
    Reset,
    /// Leave the loop
    Quit,
}

impl ScanCommand {
    /// Parse a line of user input (`s`, `r`, `q`, any case)
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "s" | "scan" => Some(Self::Scan),
            "r" | "reset" => Some(Self::Reset),
            "q" | "quit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Spawn a thread turning stdin lines into commands.
///
/// End of input is reported as [`ScanCommand::Quit`].
pub fn spawn_stdin_reader() -> Receiver<ScanCommand> {
    let (tx, rx) = unbounded();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match ScanCommand::parse(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        return;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!("Unknown command '{}' (use s, r or q)", line.trim()),
            }
        }
        let _ = tx.send(ScanCommand::Quit);
    });

    rx
}

/// Whether the loop should keep going after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Quit,
}

/// Sequential live scanner
pub struct ScannerApp<S: FrameSource> {
    source: S,
    scheduler: ScanScheduler,
    commands: Receiver<ScanCommand>,
    auto_scan: bool,
    frame_interval: Duration,
    out: Box<dyn Write>,
}

impl<S: FrameSource> ScannerApp<S> {
    /// Create a loop writing its presentation to `out`
    pub fn new(
        source: S,
        scheduler: ScanScheduler,
        commands: Receiver<ScanCommand>,
        auto_scan: bool,
        max_fps: u32,
        out: Box<dyn Write>,
    ) -> Self {
        Self {
            source,
            scheduler,
            commands,
            auto_scan,
            frame_interval: Duration::from_secs(1) / max_fps.max(1),
            out,
        }
    }

    pub fn scheduler(&self) -> &ScanScheduler {
        &self.scheduler
    }

    /// Run until the feed ends, a read fails, or the user quits
    pub fn run(&mut self) -> Result<()> {
        let auto_interval = self.auto_scan.then(|| self.scheduler.scan_interval());
        print_banner(&mut self.out, auto_interval)?;

        let mut frames = 0u64;
        loop {
            let started = Instant::now();

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("Frame source exhausted");
                    break;
                }
                Err(e) => {
                    error!("Failed to read frame: {:#}", e);
                    break;
                }
            };
            frames += 1;

            if self.handle_frame(&frame, started)? == LoopControl::Quit {
                break;
            }

            let elapsed = started.elapsed();
            if elapsed < self.frame_interval {
                std::thread::sleep(self.frame_interval - elapsed);
            }
        }

        info!("Scanner stopped after {} frame(s)", frames);
        Ok(())
    }

    /// Process one frame: a pending command takes priority over auto-scan
    pub fn handle_frame(&mut self, frame: &CapturedFrame, now: Instant) -> Result<LoopControl> {
        let command = match self.commands.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                debug!("Command channel closed");
                None
            }
        };

        match command {
            Some(ScanCommand::Quit) => {
                info!("Quit requested");
                return Ok(LoopControl::Quit);
            }
            Some(ScanCommand::Reset) => {
                self.scheduler.reset();
                writeln!(self.out, "Detection reset.")?;
                self.print_status(now)?;
            }
            Some(ScanCommand::Scan) => {
                writeln!(self.out, "\nScanning for medicine...")?;
                let outcome = self.scheduler.manual_scan(frame);
                self.report(outcome)?;
                self.print_status(Instant::now())?;
            }
            None if self.auto_scan => {
                if let Some(outcome) = self.scheduler.auto_scan(frame, now) {
                    // Misses are only worth reporting when the user asked
                    if outcome == ScanOutcome::Resolved {
                        self.report(outcome)?;
                    }
                }
            }
            None => {}
        }

        Ok(LoopControl::Continue)
    }

    /// One-line summary of the scheduler after a user command
    fn print_status(&mut self, now: Instant) -> Result<()> {
        let last_scan = match self.scheduler.last_scan_time() {
            Some(at) => format!("{:.1}s ago", now.saturating_duration_since(at).as_secs_f32()),
            None => "never".to_string(),
        };
        writeln!(
            self.out,
            "Status: {} | last scan: {} | catalog: {} medicine(s)",
            self.scheduler.state(),
            last_scan,
            self.scheduler.pipeline().catalog().len()
        )?;
        Ok(())
    }

    fn report(&mut self, outcome: ScanOutcome) -> Result<()> {
        match (outcome, self.scheduler.cached()) {
            (ScanOutcome::Resolved, Some(resolved)) => print_result(&mut self.out, resolved),
            _ => {
                writeln!(self.out, "No medicine detected. Please try again.\n")?;
                Ok(())
            }
        }
    }
}

fn print_banner(out: &mut dyn Write, auto_interval: Option<Duration>) -> Result<()> {
    let rule = "=".repeat(60);
    writeln!(out, "\n{rule}\nPharmaSee - Medicine Scanner\n{rule}")?;
    writeln!(out, "Controls (type a letter, then Enter):")?;
    writeln!(out, "  s - Scan for medicine")?;
    writeln!(out, "  r - Reset detection")?;
    writeln!(out, "  q - Quit")?;
    if let Some(interval) = auto_interval {
        writeln!(out, "Auto-scan every {:.1}s.", interval.as_secs_f32())?;
    }
    writeln!(out, "{rule}\n")?;
    Ok(())
}

/// Print a resolved medicine as a framed block
pub fn print_result(out: &mut dyn Write, resolved: &ResolvedMedicine) -> Result<()> {
    let rule = "-".repeat(RULE_WIDTH);
    writeln!(out, "\n{rule}")?;
    writeln!(out, "{}", resolved.detailed_info())?;
    writeln!(out, "Source: {}", resolved.source)?;
    writeln!(out, "Resolved at: {}", resolved.resolved_at.format("%H:%M:%S"))?;
    writeln!(out, "{rule}\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::pipeline_with;
    use crate::scanner::ScanState;
    use crate::testing::{blank_frame, FakeRecognizer, FakeService};
    use crossbeam_channel::Sender;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    const REPLY: &str = "Type: Analgesic\nUse: Pain relief\nClass: NSAID\nForm: Tablet";

    struct VecSource(VecDeque<Result<CapturedFrame>>);

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
            self.0.pop_front().transpose()
        }
    }

    /// Output sink readable after the app takes ownership
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    fn app(
        frames: Vec<Result<CapturedFrame>>,
        observed: &[(&str, f32)],
        auto_scan: bool,
    ) -> (ScannerApp<VecSource>, Sender<ScanCommand>, SharedBuf) {
        let (pipeline, _) = pipeline_with(
            Box::new(FakeRecognizer::new(observed)),
            FakeService::replying(REPLY),
        );
        let scheduler = ScanScheduler::new(pipeline, Duration::from_secs(2));
        let (tx, rx) = unbounded();
        let buf = SharedBuf::default();
        let app = ScannerApp::new(
            VecSource(frames.into()),
            scheduler,
            rx,
            auto_scan,
            1000,
            Box::new(buf.clone()),
        );
        (app, tx, buf)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ScanCommand::parse("s"), Some(ScanCommand::Scan));
        assert_eq!(ScanCommand::parse(" S \n"), Some(ScanCommand::Scan));
        assert_eq!(ScanCommand::parse("R"), Some(ScanCommand::Reset));
        assert_eq!(ScanCommand::parse("quit"), Some(ScanCommand::Quit));
        assert_eq!(ScanCommand::parse("x"), None);
        assert_eq!(ScanCommand::parse(""), None);
    }

    #[test]
    fn test_manual_scan_prints_result() {
        let (mut app, tx, buf) = app(vec![], &[("Aspirn", 0.6)], false);
        tx.send(ScanCommand::Scan).unwrap();

        let control = app.handle_frame(&blank_frame(), Instant::now()).unwrap();
        assert_eq!(control, LoopControl::Continue);
        assert_eq!(app.scheduler().state(), ScanState::Resolved);

        let text = buf.text();
        assert!(text.contains("Medicine: Aspirin"));
        assert!(text.contains("Source: catalog"));
        assert!(text.contains("Status: resolved | last scan: "));
        assert!(text.contains("catalog: 3 medicine(s)"));
    }

    #[test]
    fn test_manual_miss_is_reported() {
        let (mut app, tx, buf) = app(vec![], &[], false);
        tx.send(ScanCommand::Scan).unwrap();
        app.handle_frame(&blank_frame(), Instant::now()).unwrap();
        assert!(buf.text().contains("No medicine detected"));
    }

    #[test]
    fn test_command_suppresses_auto_scan() {
        let (mut app, tx, buf) = app(vec![], &[("Aspirin", 0.9)], true);
        tx.send(ScanCommand::Reset).unwrap();

        app.handle_frame(&blank_frame(), Instant::now()).unwrap();
        assert!(app.scheduler().last_scan_time().is_none());
        assert_eq!(app.scheduler().state(), ScanState::Idle);
        assert!(buf.text().contains("Status: idle | last scan: never"));
    }

    #[test]
    fn test_auto_scan_when_idle() {
        let (mut app, _tx, _) = app(vec![], &[("Aspirin", 0.9)], true);
        let t0 = Instant::now();
        app.handle_frame(&blank_frame(), t0).unwrap();
        assert_eq!(app.scheduler().last_scan_time(), Some(t0));

        app.handle_frame(&blank_frame(), t0 + Duration::from_millis(100)).unwrap();
        assert_eq!(app.scheduler().last_scan_time(), Some(t0));
    }

    #[test]
    fn test_auto_scan_disabled() {
        let (mut app, _tx, _) = app(vec![], &[("Aspirin", 0.9)], false);
        app.handle_frame(&blank_frame(), Instant::now()).unwrap();
        assert!(app.scheduler().last_scan_time().is_none());
    }

    #[test]
    fn test_run_stops_on_quit() {
        let frames = (0..5).map(|_| Ok(blank_frame())).collect();
        let (mut app, tx, _) = app(frames, &[], false);
        tx.send(ScanCommand::Quit).unwrap();
        app.run().unwrap();
        // Quit is consumed with the first frame, the rest stay unread
        assert_eq!(app.source.0.len(), 4);
    }

    #[test]
    fn test_run_ends_on_read_error() {
        let frames = vec![
            Ok(blank_frame()),
            Err(anyhow::anyhow!("camera unplugged")),
            Ok(blank_frame()),
        ];
        let (mut app, _tx, buf) = app(frames, &[("Ibuprofen", 0.9)], true);
        app.run().unwrap();
        assert_eq!(app.source.0.len(), 1);
        let text = buf.text();
        assert!(text.contains("Auto-scan every 2.0s."));
        assert!(text.contains("Medicine: Ibuprofen"));
    }
}
