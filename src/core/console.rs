//! Console subsystem seam
//!
//! Everything the session needs from the kernel goes through the two traits
//! in this module. [`Console`] covers the host-wide operations (free VT query,
//! opening a VT node) and [`ConsoleDevice`] covers the per-VT mode requests
//! issued on an open descriptor.

use nix::errno::Errno;

use super::line::LineAttributes;

/// Result of a single kernel request
pub type Result<T> = std::result::Result<T, Errno>;

// linux/kd.h keyboard modes
const K_RAW: i32 = 0x00;
const K_XLATE: i32 = 0x01;
const K_MEDIUMRAW: i32 = 0x02;
const K_UNICODE: i32 = 0x03;
const K_OFF: i32 = 0x04;

// linux/kd.h console modes
const KD_TEXT: i32 = 0x00;
const KD_GRAPHICS: i32 = 0x01;

/// Keyboard translation mode (KDGKBMODE / KDSKBMODE)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyboardMode {
    /// Scancodes passed through untranslated
    Raw,
    /// Scancodes translated to characters
    Translated,
    /// Keycodes passed through
    MediumRaw,
    /// Translated to UTF-8
    Unicode,
    /// Keyboard input suppressed
    Off,
    /// A value the kernel reported that we have no name for
    Other(i32),
}

impl KeyboardMode {
    pub fn from_raw(value: i32) -> Self {
        match value {
            K_RAW => KeyboardMode::Raw,
            K_XLATE => KeyboardMode::Translated,
            K_MEDIUMRAW => KeyboardMode::MediumRaw,
            K_UNICODE => KeyboardMode::Unicode,
            K_OFF => KeyboardMode::Off,
            other => KeyboardMode::Other(other),
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            KeyboardMode::Raw => K_RAW,
            KeyboardMode::Translated => K_XLATE,
            KeyboardMode::MediumRaw => K_MEDIUMRAW,
            KeyboardMode::Unicode => K_UNICODE,
            KeyboardMode::Off => K_OFF,
            KeyboardMode::Other(value) => value,
        }
    }
}

/// Console display mode (KDSETMODE)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleMode {
    Text,
    Graphics,
}

impl ConsoleMode {
    pub fn to_raw(self) -> i32 {
        match self {
            ConsoleMode::Text => KD_TEXT,
            ConsoleMode::Graphics => KD_GRAPHICS,
        }
    }
}

/// VT switching ownership (VT_SETMODE)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VtMode {
    /// Kernel handles switch requests on its own
    Auto,
    /// Switch requests are delivered to the owning process as signals
    Process {
        release_signal: i32,
        acquire_signal: i32,
    },
}

/// Host console subsystem
pub trait Console {
    type Device: ConsoleDevice;

    /// Ask the console-management device for the next unallocated VT.
    ///
    /// `Ok(None)` means the query succeeded but every VT is in use.
    fn query_free_vt(&self) -> Result<Option<u32>>;

    /// Open the device node of `vt` for read/write without making it the
    /// controlling terminal. The descriptor is closed when the device drops.
    fn open_vt(&self, vt: u32) -> Result<Self::Device>;
}

/// Mode requests on one open VT descriptor
pub trait ConsoleDevice {
    /// Currently foreground VT
    fn active_vt(&self) -> Result<u32>;
    fn activate(&self, vt: u32) -> Result<()>;
    /// Blocks until `vt` is foreground.
    fn wait_active(&self, vt: u32) -> Result<()>;
    fn line_attributes(&self) -> Result<LineAttributes>;
    /// Applies `attrs` immediately, without draining or flushing.
    fn set_line_attributes(&self, attrs: &LineAttributes) -> Result<()>;
    fn keyboard_mode(&self) -> Result<KeyboardMode>;
    fn set_keyboard_mode(&self, mode: KeyboardMode) -> Result<()>;
    fn set_console_mode(&self, mode: ConsoleMode) -> Result<()>;
    fn set_vt_mode(&self, mode: VtMode) -> Result<()>;
}
