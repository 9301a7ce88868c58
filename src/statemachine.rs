//! This provides a higher-level interface than the `Cable` trait.  Specifically, it keeps track of
//! the state of the JTAG state machine, and allows setting the state to any desired state.
//! `JtagSM` will get to that state by the most efficient path, based on the current state.
use alloc::vec::Vec;
use alloc::vec;
use bitvec::prelude::*;

use crate::cable::Cable;
use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    Data,
    Instruction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
}

use JtagState::*;

/// Successor of every state, indexed by state, for TMS low and TMS high
const EDGES: [[JtagState; 2]; 16] = [
    [Idle, Reset],            // Reset
    [Idle, SelectDR],         // Idle
    [CaptureDR, SelectIR],    // SelectDR
    [ShiftDR, Exit1DR],       // CaptureDR
    [ShiftDR, Exit1DR],       // ShiftDR
    [PauseDR, UpdateDR],      // Exit1DR
    [PauseDR, Exit2DR],       // PauseDR
    [ShiftDR, UpdateDR],      // Exit2DR
    [Idle, SelectDR],         // UpdateDR
    [CaptureIR, Reset],       // SelectIR
    [ShiftIR, Exit1IR],       // CaptureIR
    [ShiftIR, Exit1IR],       // ShiftIR
    [PauseIR, UpdateIR],      // Exit1IR
    [PauseIR, Exit2IR],       // PauseIR
    [ShiftIR, UpdateIR],      // Exit2IR
    [Idle, SelectDR],         // UpdateIR
];

impl JtagState {
    pub const ALL: [JtagState; 16] = [
        Reset, Idle,
        SelectDR, CaptureDR, ShiftDR, Exit1DR, PauseDR, Exit2DR, UpdateDR,
        SelectIR, CaptureIR, ShiftIR, Exit1IR, PauseIR, Exit2IR, UpdateIR,
    ];

    /// The state the TAP controller moves to on the next TCK edge with the given TMS level
    pub fn next(self, tms: bool) -> JtagState {
        EDGES[self as usize][tms as usize]
    }

    /// The shift state for `reg`
    pub fn shift(reg: Register) -> JtagState {
        match reg {
            Register::Data => ShiftDR,
            Register::Instruction => ShiftIR,
        }
    }
}

#[derive(Clone)]
struct Path {
    path: Vec<bool>,
    state: JtagState,
}

/// Compute the shortest TMS sequence that walks the TAP controller from `from` to `to`.  Ties
/// are broken by preferring TMS low, so the result is always the same for the same inputs.  An
/// empty sequence is returned when `from == to`.
pub fn transition_sequence(from: JtagState, to: JtagState) -> Vec<bool> {
    if from == to {
        return Vec::new();
    }

    let mut seen = [false; 16];
    seen[from as usize] = true;
    let mut paths = vec![Path { path: Vec::new(), state: from }];

    // Every state is reachable from every other within 16 steps, so this always returns
    loop {
        let mut newpaths = Vec::new();

        for p in paths {
            for tms in [false, true] {
                let state = p.state.next(tms);
                if seen[state as usize] {
                    continue;
                }
                seen[state as usize] = true;

                let mut path = p.path.clone();
                path.push(tms);
                if state == to {
                    return path;
                }
                newpaths.push(Path { path, state });
            }
        }

        paths = newpaths;
    }
}

pub struct JtagSM<T> {
    pub cable: T,
    /// `None` after a cable failure, until the next reset
    state: Option<JtagState>,
}

impl<T, U> JtagSM<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Create a JTAG state machine using an existing `Cable`.  The chain is reset and left in
    /// Run-Test/Idle.
    pub fn new(cable: T) -> Result<Self, Error> {
        let mut sm = Self {
            cable,
            state: None,
        };
        sm.mode_reset()?;
        Ok(sm)
    }

    /// The tracked TAP state, or `None` if a cable error left it unknown
    pub fn state(&self) -> Option<JtagState> {
        self.state
    }

    fn current(&self) -> Result<JtagState, Error> {
        self.state.ok_or(Error::Protocol("TAP state unknown after a cable failure; reset required"))
    }

    fn track<R>(&mut self, result: Result<R, crate::error::CableError>) -> Result<R, Error> {
        result.map_err(|e| {
            log::warn!("cable failure, TAP state is now unknown: {}", e);
            self.state = None;
            Error::Cable(e)
        })
    }

    /// Reset the scan chain by driving TMS high for 5 clocks, then drop into Run-Test/Idle
    pub fn mode_reset(&mut self) -> Result<(), Error> {
        log::debug!("resetting TAP controllers");
        let result = self.cable.change_mode(&[true, true, true, true, true, false], true);
        self.track(result)?;
        self.state = Some(Idle);
        Ok(())
    }

    /// Clock a single TMS bit and follow the transition table
    pub fn apply(&mut self, tms: bool) -> Result<(), Error> {
        let state = self.current()?;
        let result = self.cable.clock(tms, true);
        self.track(result)?;
        self.state = Some(state.next(tms));
        Ok(())
    }

    /// Use TMS to get into `state` by the most efficient path
    pub fn change_mode(&mut self, state: JtagState) -> Result<(), Error> {
        let current = self.current()?;
        if current == state {
            return Ok(());
        }

        let path = transition_sequence(current, state);
        log::trace!("path from {:?} to {:?}: {:?}", current, state, path);
        let result = self.cable.change_mode(&path, true);
        self.track(result)?;
        self.state = Some(state);
        Ok(())
    }

    /// Shift `data` into either the instruction or data register, LSB first, and return the bits
    /// shifted out.  The mode will be ShiftIR / ShiftDR afterwards if `exit_after` is false, or
    /// Exit1IR / Exit1DR if it is true.  Leaving `exit_after` false allows building up a register
    /// with several calls.
    pub fn read_write_reg(&mut self, reg: Register, data: &BitSlice<u8, Lsb0>, exit_after: bool) -> Result<BitVec<u8, Lsb0>, Error> {
        let shift = JtagState::shift(reg);
        self.change_mode(shift)?;
        if data.is_empty() {
            return Ok(BitVec::new());
        }

        log::trace!("shift {:?}: {} bits, exit {}", reg, data.len(), exit_after);
        let result = self.cable.shift(data, exit_after);
        let tdo = self.track(result)?;
        if exit_after {
            self.state = Some(shift.next(true));
        }
        Ok(tdo)
    }

    /// Like `read_write_reg`, discarding what was shifted out
    pub fn write_reg(&mut self, reg: Register, data: &BitSlice<u8, Lsb0>, exit_after: bool) -> Result<(), Error> {
        self.read_write_reg(reg, data, exit_after)?;
        Ok(())
    }

    /// Read `bits` from either the instruction or data register while shifting in ones
    pub fn read_reg(&mut self, reg: Register, bits: usize, exit_after: bool) -> Result<BitVec<u8, Lsb0>, Error> {
        let ones = bitvec![u8, Lsb0; 1; bits];
        self.read_write_reg(reg, &ones, exit_after)
    }
}
