//! Linux console backend
//!
//! Implements the console traits with the `linux/vt.h` and `linux/kd.h`
//! ioctls and termios calls on a VT device node.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;

use nix::errno::Errno;
use nix::libc::{self, c_int};
use nix::sys::termios::{self, SetArg};
use nix::{ioctl_read_bad, ioctl_write_int_bad, ioctl_write_ptr_bad};
use tracing::debug;

use super::console::{Console, ConsoleDevice, ConsoleMode, KeyboardMode, Result, VtMode};
use super::line::LineAttributes;

const KDSETMODE: u16 = 0x4B3A;
const KDGKBMODE: u16 = 0x4B44;
const KDSKBMODE: u16 = 0x4B45;
const VT_OPENQRY: u16 = 0x5600;
const VT_SETMODE: u16 = 0x5602;
const VT_GETSTATE: u16 = 0x5603;
const VT_ACTIVATE: u16 = 0x5606;
const VT_WAITACTIVE: u16 = 0x5607;

const VT_AUTO: i8 = 0x00;
const VT_PROCESS: i8 = 0x01;

/// Console-management device used for allocation queries
const MANAGEMENT_DEVICE: &str = "/dev/tty0";

#[allow(non_camel_case_types, dead_code)]
#[repr(C)]
pub struct vt_mode {
    pub mode: i8,
    pub waitv: i8,
    pub relsig: i16,
    pub acqsig: i16,
    pub frsig: i16,
}

#[allow(non_camel_case_types, dead_code)]
#[repr(C)]
#[derive(Default)]
pub struct vt_stat {
    pub v_active: u16,
    pub v_signal: u16,
    pub v_state: u16,
}

ioctl_read_bad!(vt_openqry, VT_OPENQRY, c_int);
ioctl_read_bad!(vt_getstate, VT_GETSTATE, vt_stat);
ioctl_write_int_bad!(vt_activate, VT_ACTIVATE);
ioctl_write_int_bad!(vt_waitactive, VT_WAITACTIVE);
ioctl_write_ptr_bad!(vt_setmode, VT_SETMODE, vt_mode);
ioctl_read_bad!(kd_get_kb_mode, KDGKBMODE, c_int);
ioctl_write_int_bad!(kd_set_kb_mode, KDSKBMODE);
ioctl_write_int_bad!(kd_set_mode, KDSETMODE);

fn errno_of(err: &io::Error) -> Errno {
    err.raw_os_error().map(Errno::from_raw).unwrap_or(Errno::EIO)
}

fn vt_arg(vt: u32) -> Result<c_int> {
    c_int::try_from(vt).map_err(|_| Errno::EINVAL)
}

/// The real console subsystem
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxConsole;

impl LinuxConsole {
    pub fn new() -> Self {
        Self
    }
}

impl Console for LinuxConsole {
    type Device = LinuxVt;

    fn query_free_vt(&self) -> Result<Option<u32>> {
        // std opens with O_CLOEXEC; the management fd closes when it drops
        let tty0: OwnedFd = OpenOptions::new()
            .write(true)
            .open(MANAGEMENT_DEVICE)
            .map_err(|e| errno_of(&e))?
            .into();

        let mut vt: c_int = -1;
        unsafe { vt_openqry(tty0.as_raw_fd(), &mut vt) }?;
        debug!("VT_OPENQRY returned {}", vt);

        Ok(u32::try_from(vt).ok().filter(|vt| *vt > 0))
    }

    fn open_vt(&self, vt: u32) -> Result<LinuxVt> {
        let path = format!("/dev/tty{}", vt);
        let fd: OwnedFd = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&path)
            .map_err(|e| errno_of(&e))?
            .into();
        debug!("Opened {}", path);

        Ok(LinuxVt { fd })
    }
}

/// An open VT device node
#[derive(Debug)]
pub struct LinuxVt {
    fd: OwnedFd,
}

impl ConsoleDevice for LinuxVt {
    fn active_vt(&self) -> Result<u32> {
        let mut state = vt_stat::default();
        unsafe { vt_getstate(self.fd.as_raw_fd(), &mut state) }?;
        Ok(u32::from(state.v_active))
    }

    fn activate(&self, vt: u32) -> Result<()> {
        unsafe { vt_activate(self.fd.as_raw_fd(), vt_arg(vt)?) }?;
        Ok(())
    }

    fn wait_active(&self, vt: u32) -> Result<()> {
        unsafe { vt_waitactive(self.fd.as_raw_fd(), vt_arg(vt)?) }?;
        Ok(())
    }

    fn line_attributes(&self) -> Result<LineAttributes> {
        let termios = termios::tcgetattr(self.fd.as_fd())?;
        Ok(LineAttributes::from_termios(&termios))
    }

    fn set_line_attributes(&self, attrs: &LineAttributes) -> Result<()> {
        let mut termios = termios::tcgetattr(self.fd.as_fd())?;
        attrs.apply_to(&mut termios);
        termios::tcsetattr(self.fd.as_fd(), SetArg::TCSANOW, &termios)
    }

    fn keyboard_mode(&self) -> Result<KeyboardMode> {
        let mut mode: c_int = 0;
        unsafe { kd_get_kb_mode(self.fd.as_raw_fd(), &mut mode) }?;
        Ok(KeyboardMode::from_raw(mode))
    }

    fn set_keyboard_mode(&self, mode: KeyboardMode) -> Result<()> {
        unsafe { kd_set_kb_mode(self.fd.as_raw_fd(), mode.to_raw()) }?;
        Ok(())
    }

    fn set_console_mode(&self, mode: ConsoleMode) -> Result<()> {
        unsafe { kd_set_mode(self.fd.as_raw_fd(), mode.to_raw()) }?;
        Ok(())
    }

    fn set_vt_mode(&self, mode: VtMode) -> Result<()> {
        let raw = match mode {
            VtMode::Auto => vt_mode {
                mode: VT_AUTO,
                waitv: 0,
                relsig: 0,
                acqsig: 0,
                frsig: 0,
            },
            VtMode::Process {
                release_signal,
                acquire_signal,
            } => vt_mode {
                mode: VT_PROCESS,
                waitv: 0,
                relsig: i16::try_from(release_signal).map_err(|_| Errno::EINVAL)?,
                acqsig: i16::try_from(acquire_signal).map_err(|_| Errno::EINVAL)?,
                frsig: 0,
            },
        };
        unsafe { vt_setmode(self.fd.as_raw_fd(), &raw) }?;
        Ok(())
    }
}
