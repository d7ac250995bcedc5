//! Line-discipline attributes
//!
//! A plain-data snapshot of the termios settings the session touches, and the
//! raw-mode derivation applied while the compositor owns the VT.

use nix::sys::termios::{
    ControlFlags, InputFlags, LocalFlags, OutputFlags, SpecialCharacterIndices, Termios,
};

/// Snapshot of a terminal's line discipline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineAttributes {
    pub input: InputFlags,
    pub output: OutputFlags,
    pub control: ControlFlags,
    pub local: LocalFlags,
    /// Minimum bytes for a non-canonical read (VMIN)
    pub min: u8,
    /// Non-canonical read timeout in deciseconds (VTIME)
    pub time: u8,
}

impl Default for LineAttributes {
    /// A cooked terminal: canonical input with echo, signals and output
    /// post-processing enabled.
    fn default() -> Self {
        Self {
            input: InputFlags::ICRNL | InputFlags::IXON | InputFlags::BRKINT,
            output: OutputFlags::OPOST | OutputFlags::ONLCR,
            control: ControlFlags::CS8 | ControlFlags::CREAD,
            local: LocalFlags::ICANON
                | LocalFlags::ECHO
                | LocalFlags::ECHOE
                | LocalFlags::ISIG
                | LocalFlags::IEXTEN,
            min: 1,
            time: 0,
        }
    }
}

impl LineAttributes {
    /// Derive the raw variant of this snapshot.
    ///
    /// Same clearing as `cfmakeraw(3)`: no canonical input, echo, signal
    /// characters or input translation, 8-bit characters, byte-at-a-time
    /// reads. Output post-processing is then switched back on (`OPOST` and
    /// `OCRNL`) so line endings written to the VT still come out right.
    ///
    /// Depends only on `self`, so deriving from the same snapshot always
    /// gives the same result.
    pub fn raw(&self) -> Self {
        let mut raw = *self;

        raw.input.remove(
            InputFlags::IGNBRK
                | InputFlags::BRKINT
                | InputFlags::PARMRK
                | InputFlags::ISTRIP
                | InputFlags::INLCR
                | InputFlags::IGNCR
                | InputFlags::ICRNL
                | InputFlags::IXON,
        );
        raw.output.remove(OutputFlags::OPOST);
        raw.local.remove(
            LocalFlags::ECHO
                | LocalFlags::ECHONL
                | LocalFlags::ICANON
                | LocalFlags::ISIG
                | LocalFlags::IEXTEN,
        );
        raw.control.remove(ControlFlags::CSIZE | ControlFlags::PARENB);
        raw.control.insert(ControlFlags::CS8);
        raw.min = 1;
        raw.time = 0;

        raw.output.insert(OutputFlags::OPOST | OutputFlags::OCRNL);
        raw
    }

    pub fn from_termios(termios: &Termios) -> Self {
        Self {
            input: termios.input_flags,
            output: termios.output_flags,
            control: termios.control_flags,
            local: termios.local_flags,
            min: termios.control_chars[SpecialCharacterIndices::VMIN as usize],
            time: termios.control_chars[SpecialCharacterIndices::VTIME as usize],
        }
    }

    /// Overlay this snapshot onto `termios`, leaving line speed and the other
    /// control characters alone.
    pub fn apply_to(&self, termios: &mut Termios) {
        termios.input_flags = self.input;
        termios.output_flags = self.output;
        termios.control_flags = self.control;
        termios.local_flags = self.local;
        termios.control_chars[SpecialCharacterIndices::VMIN as usize] = self.min;
        termios.control_chars[SpecialCharacterIndices::VTIME as usize] = self.time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_disables_cooked_processing() {
        let raw = LineAttributes::default().raw();

        assert!(!raw.local.contains(LocalFlags::ICANON));
        assert!(!raw.local.contains(LocalFlags::ECHO));
        assert!(!raw.local.contains(LocalFlags::ISIG));
        assert!(!raw.local.contains(LocalFlags::IEXTEN));
        assert!(!raw.input.contains(InputFlags::ICRNL));
        assert!(!raw.input.contains(InputFlags::IXON));
        assert!(raw.control.contains(ControlFlags::CS8));
        assert!(!raw.control.contains(ControlFlags::PARENB));
        assert_eq!((raw.min, raw.time), (1, 0));
    }

    #[test]
    fn test_raw_keeps_output_processing() {
        let raw = LineAttributes::default().raw();
        assert!(raw.output.contains(OutputFlags::OPOST));
        assert!(raw.output.contains(OutputFlags::OCRNL));
        // Untouched output bits from the snapshot survive
        assert!(raw.output.contains(OutputFlags::ONLCR));
    }

    #[test]
    fn test_raw_is_idempotent() {
        let mut snapshot = LineAttributes::default();
        snapshot.input.insert(InputFlags::ISTRIP | InputFlags::INLCR);
        snapshot.control.insert(ControlFlags::PARENB);
        snapshot.time = 5;

        let once = snapshot.raw();
        assert_eq!(once.raw(), once);
        assert_eq!(snapshot.raw(), once);
        // The snapshot itself is not modified
        assert!(snapshot.local.contains(LocalFlags::ICANON));
    }
}
