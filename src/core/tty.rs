//! Virtual terminal session
//!
//! [`TerminalSession`] takes a free VT for the compositor and puts it into
//! the state a direct-rendering client needs: foreground, raw line
//! discipline, kernel keyboard translation off, graphics console mode and
//! process-managed VT switching. Every change is undone on release, and a
//! failed acquire undoes whatever it had already applied before returning.
//!
//! The VT subsystem is process-global: hold at most one session per process.

use std::fmt;

use bitflags::bitflags;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::console::{Console, ConsoleDevice, ConsoleMode, KeyboardMode, VtMode};
use super::line::LineAttributes;

#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("No free virtual terminal available")]
    NoFreeVt {
        #[source]
        source: Option<Errno>,
    },

    #[error("Could not open /dev/tty{vt}: {source}")]
    OpenFailed {
        vt: u32,
        #[source]
        source: Errno,
    },

    #[error("Failed to switch to vt {vt}: {source}")]
    SwitchFailed {
        vt: u32,
        #[source]
        source: Errno,
    },

    #[error("Could not get terminal attributes: {0}")]
    AttributeQueryFailed(#[source] Errno),

    #[error("Failed to disable keyboard translation: {0}")]
    KeyboardModeFailed(#[source] Errno),

    #[error("Failed to set graphics mode on tty: {0}")]
    GraphicsModeFailed(#[source] Errno),

    #[error("Failed to take control of vt switching: {0}")]
    VtModeFailed(#[source] Errno),
}

pub type Result<T> = std::result::Result<T, AcquireError>;

bitflags! {
    /// Setup stages completed by `acquire`
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Stages: u8 {
        const SWITCHED   = 0b0_0001;
        const RAW_LINE   = 0b0_0010;
        const KEYBOARD   = 0b0_0100;
        const GRAPHICS   = 0b0_1000;
        const VT_PROCESS = 0b1_0000;
    }
}

/// Acquisition options
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    /// Signal the kernel sends for both release and acquire requests
    pub switch_signal: Signal,
    /// Fall back to raw keyboard mode when "off" is refused
    pub keyboard_fallback: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            switch_signal: Signal::SIGUSR1,
            keyboard_fallback: true,
        }
    }
}

/// A restoration step performed on release
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseStep {
    KeyboardMode,
    ConsoleMode,
    LineAttributes,
    VtMode,
    Focus,
}

impl fmt::Display for ReleaseStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self {
            ReleaseStep::KeyboardMode => "restore keyboard mode",
            ReleaseStep::ConsoleMode => "set text mode on tty",
            ReleaseStep::LineAttributes => "restore terminal attributes",
            ReleaseStep::VtMode => "reset vt handling",
            ReleaseStep::Focus => "switch back to starting vt",
        };
        f.write_str(what)
    }
}

/// Outcome of a release: the steps that failed, in the order attempted
#[derive(Debug, Default)]
pub struct ReleaseReport {
    failures: Vec<(ReleaseStep, Errno)>,
}

impl ReleaseReport {
    fn record(&mut self, step: ReleaseStep, result: std::result::Result<(), Errno>) {
        if let Err(errno) = result {
            warn!("Failed to {}: {}", step, errno);
            self.failures.push((step, errno));
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[(ReleaseStep, Errno)] {
        &self.failures
    }
}

/// Reverse action for one applied setup step
#[derive(Debug)]
enum Undo {
    Focus(u32),
    LineAttributes(LineAttributes),
    KeyboardMode(KeyboardMode),
    TextMode,
}

/// Undo actions for the steps applied so far.
///
/// Dropping an armed rollback runs the actions newest first; `disarm` keeps
/// the changes once acquisition has succeeded.
struct Rollback<'a, D: ConsoleDevice> {
    device: &'a D,
    actions: Vec<Undo>,
}

impl<'a, D: ConsoleDevice> Rollback<'a, D> {
    fn new(device: &'a D) -> Self {
        Self {
            device,
            actions: Vec::new(),
        }
    }

    fn push(&mut self, undo: Undo) {
        self.actions.push(undo);
    }

    fn disarm(mut self) {
        self.actions.clear();
    }
}

impl<D: ConsoleDevice> Drop for Rollback<'_, D> {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            debug!("Rolling back {} setup step(s)", self.actions.len());
        }
        while let Some(undo) = self.actions.pop() {
            let result = match &undo {
                Undo::Focus(vt) => self
                    .device
                    .activate(*vt)
                    .and_then(|_| self.device.wait_active(*vt)),
                Undo::LineAttributes(attrs) => self.device.set_line_attributes(attrs),
                Undo::KeyboardMode(mode) => self.device.set_keyboard_mode(*mode),
                Undo::TextMode => self.device.set_console_mode(ConsoleMode::Text),
            };
            if let Err(e) = result {
                warn!("Rollback of {:?} failed: {}", undo, e);
            }
        }
    }
}

/// Exclusive ownership of one virtual terminal
pub struct TerminalSession<D: ConsoleDevice> {
    device: D,
    vt: u32,
    starting_vt: u32,
    saved_keyboard_mode: KeyboardMode,
    saved_attributes: LineAttributes,
    stages: Stages,
    released: bool,
}

impl<D: ConsoleDevice> TerminalSession<D> {
    /// Allocate a free VT and take control of it.
    ///
    /// Either every step succeeds, or the steps already applied are undone in
    /// reverse order and the descriptor is closed before the error returns.
    /// Failing to put the line discipline into raw mode is only logged.
    pub fn acquire<C>(console: &C, options: &SessionOptions) -> Result<Self>
    where
        C: Console<Device = D>,
    {
        let vt = match console.query_free_vt() {
            Ok(Some(vt)) => vt,
            Ok(None) => return Err(AcquireError::NoFreeVt { source: None }),
            Err(e) => return Err(AcquireError::NoFreeVt { source: Some(e) }),
        };
        info!("Using new vt /dev/tty{}", vt);

        let device = console
            .open_vt(vt)
            .map_err(|source| AcquireError::OpenFailed { vt, source })?;

        let starting_vt = match device.active_vt() {
            Ok(active) => active,
            Err(e) => {
                debug!("VT_GETSTATE failed ({}), assuming vt {} is foreground", e, vt);
                vt
            }
        };

        let mut stages = Stages::empty();
        let mut rollback = Rollback::new(&device);

        if starting_vt != vt {
            device
                .activate(vt)
                .map_err(|source| AcquireError::SwitchFailed { vt, source })?;
            rollback.push(Undo::Focus(starting_vt));
            device
                .wait_active(vt)
                .map_err(|source| AcquireError::SwitchFailed { vt, source })?;
            stages |= Stages::SWITCHED;
            debug!("Switched from vt {} to vt {}", starting_vt, vt);
        }

        let saved_attributes = device
            .line_attributes()
            .map_err(AcquireError::AttributeQueryFailed)?;

        match device.set_line_attributes(&saved_attributes.raw()) {
            Ok(()) => stages |= Stages::RAW_LINE,
            Err(e) => warn!("Could not put terminal into raw mode: {}", e),
        }
        rollback.push(Undo::LineAttributes(saved_attributes));

        let saved_keyboard_mode = device
            .keyboard_mode()
            .map_err(AcquireError::KeyboardModeFailed)?;
        let keyboard = disable_keyboard(&device, options.keyboard_fallback)
            .map_err(AcquireError::KeyboardModeFailed)?;
        rollback.push(Undo::KeyboardMode(saved_keyboard_mode));
        stages |= Stages::KEYBOARD;
        debug!("Keyboard mode {:?} -> {:?}", saved_keyboard_mode, keyboard);

        device
            .set_console_mode(ConsoleMode::Graphics)
            .map_err(AcquireError::GraphicsModeFailed)?;
        rollback.push(Undo::TextMode);
        stages |= Stages::GRAPHICS;

        let signal = options.switch_signal as i32;
        device
            .set_vt_mode(VtMode::Process {
                release_signal: signal,
                acquire_signal: signal,
            })
            .map_err(AcquireError::VtModeFailed)?;
        stages |= Stages::VT_PROCESS;

        rollback.disarm();
        info!(
            "Acquired vt {} (was on vt {}), switch signal {}",
            vt, starting_vt, options.switch_signal
        );

        Ok(Self {
            device,
            vt,
            starting_vt,
            saved_keyboard_mode,
            saved_attributes,
            stages,
            released: false,
        })
    }

    /// Hand the terminal back.
    ///
    /// Every restoration step is attempted even when an earlier one fails;
    /// failures are logged and returned, never raised. The descriptor is
    /// closed when the session drops at the end of this call.
    pub fn release(mut self) -> ReleaseReport {
        self.restore()
    }

    fn restore(&mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        if self.released {
            return report;
        }
        self.released = true;

        report.record(
            ReleaseStep::KeyboardMode,
            self.device.set_keyboard_mode(self.saved_keyboard_mode),
        );
        report.record(
            ReleaseStep::ConsoleMode,
            self.device.set_console_mode(ConsoleMode::Text),
        );
        report.record(
            ReleaseStep::LineAttributes,
            self.device.set_line_attributes(&self.saved_attributes),
        );
        report.record(ReleaseStep::VtMode, self.device.set_vt_mode(VtMode::Auto));

        if self.vt != self.starting_vt {
            let start = self.starting_vt;
            report.record(
                ReleaseStep::Focus,
                self.device
                    .activate(start)
                    .and_then(|_| self.device.wait_active(start)),
            );
        }

        info!("Released vt {}", self.vt);
        report
    }

    pub fn vt(&self) -> u32 {
        self.vt
    }

    pub fn starting_vt(&self) -> u32 {
        self.starting_vt
    }

    #[allow(dead_code)]
    pub fn saved_keyboard_mode(&self) -> KeyboardMode {
        self.saved_keyboard_mode
    }

    #[allow(dead_code)]
    pub fn saved_attributes(&self) -> &LineAttributes {
        &self.saved_attributes
    }

    pub fn stages(&self) -> Stages {
        self.stages
    }

    /// True once graphics mode and VT-switch signaling are both ours
    pub fn has_control(&self) -> bool {
        self.stages.contains(Stages::GRAPHICS | Stages::VT_PROCESS)
    }

    /// The open VT descriptor, for whatever drives the display next
    #[allow(dead_code)]
    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: ConsoleDevice> Drop for TerminalSession<D> {
    fn drop(&mut self) {
        if !self.released {
            warn!("Session for vt {} dropped without release, restoring", self.vt);
            self.restore();
        }
    }
}

/// Turn kernel keyboard translation off, or raw if "off" is refused.
fn disable_keyboard<D: ConsoleDevice>(
    device: &D,
    fallback: bool,
) -> std::result::Result<KeyboardMode, Errno> {
    match device.set_keyboard_mode(KeyboardMode::Off) {
        Ok(()) => Ok(KeyboardMode::Off),
        Err(e) if fallback => {
            debug!("K_OFF refused ({}), trying K_RAW", e);
            device.set_keyboard_mode(KeyboardMode::Raw)?;
            Ok(KeyboardMode::Raw)
        }
        Err(e) => Err(e),
    }
}
