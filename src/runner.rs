//! The frame loop: source -> engine -> sink, with commands and stop requests
//! applied between frames only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

use crate::engine::{FrameReport, OccupancyEngine};
use crate::ingest::FrameSource;
use crate::report::RunSummary;
use crate::tuning::Command;
use crate::KernelError;

/// Consumer of per-frame reports.
pub trait StatusSink {
    fn on_frame(&mut self, report: &FrameReport);

    fn on_finish(&mut self, _summary: &RunSummary) {}
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn on_frame(&mut self, _report: &FrameReport) {}
}

impl StatusSink for Vec<FrameReport> {
    fn on_frame(&mut self, report: &FrameReport) {
        self.push(report.clone());
    }
}

/// Sending half, cloned into Ctrl-C handlers and input threads.
#[derive(Clone, Debug)]
pub struct ControlHandle {
    commands: Sender<Command>,
    stop: Arc<AtomicBool>,
}

impl ControlHandle {
    /// Queues a command for the next frame boundary. False once the run has
    /// gone away.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Receiving half, owned by the run loop.
#[derive(Debug)]
pub struct RunControl {
    commands: Receiver<Command>,
    stop: Arc<AtomicBool>,
}

impl RunControl {
    /// Control with no sender attached: no commands, never stopped.
    pub fn detached() -> Self {
        control_channel().1
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn drain(&self) -> Vec<Command> {
        let mut pending = Vec::new();
        loop {
            match self.commands.try_recv() {
                Ok(command) => pending.push(command),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        pending
    }
}

pub fn control_channel() -> (ControlHandle, RunControl) {
    let (tx, rx) = mpsc::channel();
    let stop = Arc::new(AtomicBool::new(false));
    (
        ControlHandle {
            commands: tx,
            stop: stop.clone(),
        },
        RunControl { commands: rx, stop },
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunEnd {
    EndOfStream,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunStats {
    pub frames: u64,
    pub end: RunEnd,
}

impl OccupancyEngine {
    /// Pulls frames from `source` until it ends or a stop is requested,
    /// handing each report to `sink`. `on_finish` runs on both clean
    /// endings; an error ends the run without it.
    pub fn run<S, K>(
        &mut self,
        source: &mut S,
        sink: &mut K,
        control: &RunControl,
    ) -> Result<RunStats, KernelError>
    where
        S: FrameSource + ?Sized,
        K: StatusSink + ?Sized,
    {
        let mut frames = 0u64;
        let end = loop {
            for command in control.drain() {
                self.apply_command(command);
            }
            if control.stop_requested() {
                log::info!("stop requested after {} frames", frames);
                break RunEnd::Stopped;
            }

            let Some(frame) = source.next_frame().map_err(KernelError::FrameRead)? else {
                log::info!("end of stream after {} frames", frames);
                break RunEnd::EndOfStream;
            };
            let report = self.process_frame(&frame)?;
            sink.on_frame(&report);
            frames += 1;
        };

        sink.on_finish(&self.summary());
        Ok(RunStats { frames, end })
    }
}
