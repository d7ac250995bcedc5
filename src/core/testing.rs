//! Recording console for tests
//!
//! `FakeConsole` models the kernel state the session touches, records every
//! request in order and fails any request that matches an injected fault.

use std::cell::RefCell;
use std::rc::Rc;

use nix::errno::Errno;

use super::console::{Console, ConsoleDevice, ConsoleMode, KeyboardMode, Result, VtMode};
use super::line::LineAttributes;

/// One request made against the fake kernel
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    QueryFreeVt,
    Open(u32),
    ActiveVt,
    Activate(u32),
    WaitActive(u32),
    GetAttributes,
    SetAttributes(LineAttributes),
    GetKeyboardMode,
    SetKeyboardMode(KeyboardMode),
    SetConsoleMode(ConsoleMode),
    SetVtMode(VtMode),
    Close,
}

/// Kernel-visible state of the fake console
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Kernel {
    pub foreground: u32,
    pub keyboard: KeyboardMode,
    pub console: ConsoleMode,
    pub vt_mode: VtMode,
    pub attributes: LineAttributes,
}

struct Inner {
    free_vt: Option<u32>,
    kernel: Kernel,
    calls: Vec<Call>,
    faults: Vec<Call>,
    open_fds: usize,
}

impl Inner {
    fn request(&mut self, call: Call) -> Result<()> {
        let failed = self.faults.contains(&call);
        self.calls.push(call);
        if failed {
            Err(Errno::EIO)
        } else {
            Ok(())
        }
    }
}

#[derive(Clone)]
pub struct FakeConsole {
    inner: Rc<RefCell<Inner>>,
}

impl FakeConsole {
    /// A console whose next free VT is `free_vt` while `foreground` is shown
    pub fn new(free_vt: Option<u32>, foreground: u32) -> Self {
        let kernel = Kernel {
            foreground,
            keyboard: KeyboardMode::Translated,
            console: ConsoleMode::Text,
            vt_mode: VtMode::Auto,
            attributes: LineAttributes::default(),
        };
        Self {
            inner: Rc::new(RefCell::new(Inner {
                free_vt,
                kernel,
                calls: Vec::new(),
                faults: Vec::new(),
                open_fds: 0,
            })),
        }
    }

    /// Make every request equal to `call` fail with EIO
    pub fn fail_on(&self, call: Call) -> &Self {
        self.inner.borrow_mut().faults.push(call);
        self
    }

    pub fn kernel(&self) -> Kernel {
        self.inner.borrow().kernel.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.borrow().calls.clone()
    }

    /// Calls made after the first occurrence of `marker`
    pub fn calls_after(&self, marker: &Call) -> Vec<Call> {
        let calls = self.calls();
        match calls.iter().position(|c| c == marker) {
            Some(pos) => calls[pos + 1..].to_vec(),
            None => Vec::new(),
        }
    }

    pub fn clear_calls(&self) {
        self.inner.borrow_mut().calls.clear();
    }

    pub fn open_fds(&self) -> usize {
        self.inner.borrow().open_fds
    }
}

impl Console for FakeConsole {
    type Device = FakeVt;

    fn query_free_vt(&self) -> Result<Option<u32>> {
        let mut inner = self.inner.borrow_mut();
        inner.request(Call::QueryFreeVt)?;
        Ok(inner.free_vt)
    }

    fn open_vt(&self, vt: u32) -> Result<FakeVt> {
        let mut inner = self.inner.borrow_mut();
        inner.request(Call::Open(vt))?;
        inner.open_fds += 1;
        Ok(FakeVt {
            inner: Rc::clone(&self.inner),
        })
    }
}

pub struct FakeVt {
    inner: Rc<RefCell<Inner>>,
}

impl ConsoleDevice for FakeVt {
    fn active_vt(&self) -> Result<u32> {
        let mut inner = self.inner.borrow_mut();
        inner.request(Call::ActiveVt)?;
        Ok(inner.kernel.foreground)
    }

    fn activate(&self, vt: u32) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.request(Call::Activate(vt))?;
        inner.kernel.foreground = vt;
        Ok(())
    }

    fn wait_active(&self, vt: u32) -> Result<()> {
        self.inner.borrow_mut().request(Call::WaitActive(vt))
    }

    fn line_attributes(&self) -> Result<LineAttributes> {
        let mut inner = self.inner.borrow_mut();
        inner.request(Call::GetAttributes)?;
        Ok(inner.kernel.attributes)
    }

    fn set_line_attributes(&self, attrs: &LineAttributes) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.request(Call::SetAttributes(*attrs))?;
        inner.kernel.attributes = *attrs;
        Ok(())
    }

    fn keyboard_mode(&self) -> Result<KeyboardMode> {
        let mut inner = self.inner.borrow_mut();
        inner.request(Call::GetKeyboardMode)?;
        Ok(inner.kernel.keyboard)
    }

    fn set_keyboard_mode(&self, mode: KeyboardMode) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.request(Call::SetKeyboardMode(mode))?;
        inner.kernel.keyboard = mode;
        Ok(())
    }

    fn set_console_mode(&self, mode: ConsoleMode) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.request(Call::SetConsoleMode(mode))?;
        inner.kernel.console = mode;
        Ok(())
    }

    fn set_vt_mode(&self, mode: VtMode) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.request(Call::SetVtMode(mode))?;
        inner.kernel.vt_mode = mode;
        Ok(())
    }
}

impl Drop for FakeVt {
    fn drop(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.calls.push(Call::Close);
        inner.open_fds -= 1;
    }
}
