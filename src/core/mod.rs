//! Core virtual terminal control.
//!
//! - **console**: traits over the kernel console subsystem and its mode types
//! - **line**: line-discipline snapshot and raw-mode derivation
//! - **linux**: the real console, driven through VT/KD ioctls and termios
//! - **tty**: `TerminalSession`, acquiring and releasing one VT
//!
//! # Architecture
//!
//! ```text
//! TerminalSession
//! ├── ConsoleDevice (open /dev/ttyN)
//! │   ├── foreground VT (VT_GETSTATE / VT_ACTIVATE / VT_WAITACTIVE)
//! │   ├── LineAttributes (termios)
//! │   ├── KeyboardMode (KDGKBMODE / KDSKBMODE)
//! │   ├── ConsoleMode (KDSETMODE)
//! │   └── VtMode (VT_SETMODE)
//! └── saved state for release
//! ```

pub mod console;
pub mod line;
pub mod linux;
pub mod tty;

#[cfg(test)]
pub mod testing;
