//! A software JTAG chain implementing the `Cable` trait, for exercising the protocol layers
//! without hardware.
//!
//! The chain is a list of TAPs ordered from TDI to TDO.  Each one follows the IEEE 1149.1
//! controller exactly: the IR captures `...01`, BYPASS is the all-ones instruction and selects a
//! single-bit register that captures 0, and Test-Logic-Reset selects IDCODE (or BYPASS if the TAP
//! has no IDCODE).  `AlteraTap` additionally models the SLD hub behind the USER0 and USER1
//! instructions, with virtual instances that either loop data back or echo their virtual IR.
//!
//! Every completed scan is recorded so tests can check exactly which bits went out on TDI.
use alloc::string::ToString;
use alloc::vec::Vec;
use bitvec::prelude::*;

use crate::bits;
use crate::cable::Cable;
use crate::error::CableError;
use crate::statemachine::{JtagState, Register};

/// The bits clocked into TDI during one pass through Shift-IR or Shift-DR
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scan {
    pub reg: Register,
    pub tdi: BitVec<u8, Lsb0>,
}

fn shift_through(reg: &mut BitVec<u8, Lsb0>, tdi: bool) -> bool {
    if reg.is_empty() {
        return tdi;
    }
    let out = reg.remove(0);
    reg.push(tdi);
    out
}

fn capture_ir(len: usize) -> BitVec<u8, Lsb0> {
    bits::from_u64(0b01, len)
}

/// A plain IEEE 1149.1 TAP that only knows BYPASS and IDCODE
pub struct GenericTap {
    ir_len: usize,
    idcode: Option<u32>,
    ir: BitVec<u8, Lsb0>,
    dr: BitVec<u8, Lsb0>,
    instruction: u64,
    /// Every instruction latched in Update-IR, in order
    pub history: Vec<u64>,
}

/// IDCODE instruction used by `GenericTap`
pub const GENERIC_IDCODE: u64 = 0b01;

impl GenericTap {
    pub fn new(ir_len: usize, idcode: Option<u32>) -> Self {
        let mut tap = Self {
            ir_len,
            idcode,
            ir: BitVec::new(),
            dr: BitVec::new(),
            instruction: 0,
            history: Vec::new(),
        };
        tap.reset();
        tap
    }

    pub fn ir_len(&self) -> usize {
        self.ir_len
    }

    pub fn instruction(&self) -> u64 {
        self.instruction
    }

    fn reset(&mut self) {
        self.instruction = match self.idcode {
            Some(_) if self.ir_len > 1 => GENERIC_IDCODE,
            _ => bits::mask(self.ir_len),
        };
    }

    fn capture_dr(&mut self) {
        self.dr = match self.idcode {
            Some(id) if self.ir_len > 1 && self.instruction == GENERIC_IDCODE => bits::from_u64(id as u64, 32),
            _ => bitvec![u8, Lsb0; 0; 1],
        };
    }

    fn update_ir(&mut self) {
        self.instruction = bits::to_u64(&self.ir);
        self.history.push(self.instruction);
    }
}

/// How a simulated virtual instance responds to VDR scans
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behaviour {
    /// A `len`-bit data register that captures whatever was last written to it
    Loopback { len: usize },
    /// A data register as wide as the virtual IR that captures the current virtual instruction
    EchoInstruction,
}

pub struct SimInstance {
    ir_width: usize,
    address: u64,
    behaviour: Behaviour,
    /// Current virtual instruction
    pub vir: u64,
    pub vir_history: Vec<u64>,
    /// Value latched by the last VDR update
    pub data: BitVec<u8, Lsb0>,
    pub data_history: Vec<BitVec<u8, Lsb0>>,
}

impl SimInstance {
    pub fn new(ir_width: usize, address: u64, behaviour: Behaviour) -> Self {
        let data = match behaviour {
            Behaviour::Loopback { len } => bitvec![u8, Lsb0; 0; len],
            Behaviour::EchoInstruction => BitVec::new(),
        };
        Self {
            ir_width,
            address,
            behaviour,
            vir: 0,
            vir_history: Vec::new(),
            data,
            data_history: Vec::new(),
        }
    }

    fn capture(&self) -> BitVec<u8, Lsb0> {
        match self.behaviour {
            Behaviour::Loopback { .. } => self.data.clone(),
            Behaviour::EchoInstruction => bits::from_u64(self.vir, self.ir_width),
        }
    }

    fn update(&mut self, value: &BitSlice<u8, Lsb0>) {
        if let Behaviour::Loopback { .. } = self.behaviour {
            self.data = value.to_bitvec();
            self.data_history.push(self.data.clone());
        }
    }
}

/// The SLD hub command that latches the hub's own information register
pub const VIR_CAPTURE: u64 = 0b1011;

pub struct SldHub {
    user1_len: usize,
    pub instances: Vec<SimInstance>,
    selected: Option<usize>,
    /// Number of VIR_CAPTURE commands addressed to the hub
    pub hub_captures: usize,
}

impl SldHub {
    pub fn new(user1_len: usize, instances: Vec<SimInstance>) -> Self {
        Self {
            user1_len,
            instances,
            selected: None,
            hub_captures: 0,
        }
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    fn capture_vir(&self) -> BitVec<u8, Lsb0> {
        let word = match self.selected {
            Some(i) => self.instances[i].address | self.instances[i].vir,
            None => 0,
        };
        bits::from_u64(word, self.user1_len)
    }

    fn update_vir(&mut self, word: u64) {
        if word & !bits::mask(4) == 0 {
            if word == VIR_CAPTURE {
                self.hub_captures += 1;
            }
            return;
        }
        let found = self.instances.iter()
            .position(|inst| word & !bits::mask(inst.ir_width) == inst.address);
        if let Some(i) = found {
            let inst = &mut self.instances[i];
            inst.vir = word & bits::mask(inst.ir_width);
            inst.vir_history.push(inst.vir);
            self.selected = Some(i);
        }
    }
}

/// An Altera FPGA TAP with a virtual JTAG hub behind USER0 / USER1
pub struct AlteraTap {
    ir_len: usize,
    user0: u64,
    user1: u64,
    idcode: u32,
    ir: BitVec<u8, Lsb0>,
    dr: BitVec<u8, Lsb0>,
    instruction: u64,
    pub history: Vec<u64>,
    pub hub: SldHub,
}

/// Altera IDCODE instruction
pub const ALTERA_IDCODE: u64 = 0x006;

impl AlteraTap {
    /// A Cyclone IV style device: 10-bit IR, USER0 = 0x00C, USER1 = 0x00E
    pub fn new(hub: SldHub) -> Self {
        Self::with_ir(10, 0x00C, 0x00E, hub)
    }

    pub fn with_ir(ir_len: usize, user0: u64, user1: u64, hub: SldHub) -> Self {
        Self {
            ir_len,
            user0,
            user1,
            idcode: 0x020F_30DD,
            ir: BitVec::new(),
            dr: BitVec::new(),
            instruction: ALTERA_IDCODE,
            history: Vec::new(),
            hub,
        }
    }

    pub fn instruction(&self) -> u64 {
        self.instruction
    }

    fn reset(&mut self) {
        self.instruction = ALTERA_IDCODE;
    }

    fn capture_dr(&mut self) {
        self.dr = if self.instruction == self.user1 {
            self.hub.capture_vir()
        } else if self.instruction == self.user0 {
            match self.hub.selected {
                Some(i) => self.hub.instances[i].capture(),
                None => bitvec![u8, Lsb0; 0; 1],
            }
        } else if self.instruction == ALTERA_IDCODE {
            bits::from_u64(self.idcode as u64, 32)
        } else {
            bitvec![u8, Lsb0; 0; 1]
        };
    }

    fn update_dr(&mut self) {
        if self.instruction == self.user1 {
            let word = bits::to_u64(&self.dr);
            self.hub.update_vir(word);
        } else if self.instruction == self.user0 {
            if let Some(i) = self.hub.selected {
                let dr = self.dr.clone();
                self.hub.instances[i].update(&dr);
            }
        }
    }

    fn update_ir(&mut self) {
        self.instruction = bits::to_u64(&self.ir);
        self.history.push(self.instruction);
    }
}

pub enum SimDevice {
    Generic(GenericTap),
    Altera(AlteraTap),
}

impl From<GenericTap> for SimDevice {
    fn from(tap: GenericTap) -> Self {
        SimDevice::Generic(tap)
    }
}

impl From<AlteraTap> for SimDevice {
    fn from(tap: AlteraTap) -> Self {
        SimDevice::Altera(tap)
    }
}

impl SimDevice {
    fn ir_len(&self) -> usize {
        match self {
            SimDevice::Generic(t) => t.ir_len,
            SimDevice::Altera(t) => t.ir_len,
        }
    }

    fn ir_mut(&mut self) -> &mut BitVec<u8, Lsb0> {
        match self {
            SimDevice::Generic(t) => &mut t.ir,
            SimDevice::Altera(t) => &mut t.ir,
        }
    }

    fn dr_mut(&mut self) -> &mut BitVec<u8, Lsb0> {
        match self {
            SimDevice::Generic(t) => &mut t.dr,
            SimDevice::Altera(t) => &mut t.dr,
        }
    }

    fn reset(&mut self) {
        match self {
            SimDevice::Generic(t) => t.reset(),
            SimDevice::Altera(t) => t.reset(),
        }
    }

    fn capture(&mut self, reg: Register) {
        match (reg, self) {
            (Register::Instruction, dev) => {
                let len = dev.ir_len();
                *dev.ir_mut() = capture_ir(len);
            }
            (Register::Data, SimDevice::Generic(t)) => t.capture_dr(),
            (Register::Data, SimDevice::Altera(t)) => t.capture_dr(),
        }
    }

    fn update(&mut self, reg: Register) {
        match (reg, self) {
            (Register::Instruction, SimDevice::Generic(t)) => t.update_ir(),
            (Register::Instruction, SimDevice::Altera(t)) => t.update_ir(),
            (Register::Data, SimDevice::Generic(_)) => {}
            (Register::Data, SimDevice::Altera(t)) => t.update_dr(),
        }
    }

    fn shift(&mut self, reg: Register, tdi: bool) -> bool {
        match reg {
            Register::Instruction => shift_through(self.ir_mut(), tdi),
            Register::Data => shift_through(self.dr_mut(), tdi),
        }
    }
}

pub struct SimChain {
    state: JtagState,
    devices: Vec<SimDevice>,
    clocks: usize,
    fail_in: Option<usize>,
    shifting: BitVec<u8, Lsb0>,
    scans: Vec<Scan>,
}

impl Default for SimChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SimChain {
    /// An empty chain, where TDO simply follows TDI during shifts
    pub fn new() -> Self {
        Self {
            state: JtagState::Reset,
            devices: Vec::new(),
            clocks: 0,
            fail_in: None,
            shifting: BitVec::new(),
            scans: Vec::new(),
        }
    }

    /// Append a TAP at the TDO end of the chain
    pub fn push(&mut self, device: impl Into<SimDevice>) -> &mut Self {
        self.devices.push(device.into());
        self
    }

    pub fn devices(&self) -> &[SimDevice] {
        &self.devices
    }

    pub fn generic(&self, index: usize) -> Option<&GenericTap> {
        match self.devices.get(index) {
            Some(SimDevice::Generic(t)) => Some(t),
            _ => None,
        }
    }

    pub fn altera(&self, index: usize) -> Option<&AlteraTap> {
        match self.devices.get(index) {
            Some(SimDevice::Altera(t)) => Some(t),
            _ => None,
        }
    }

    pub fn tap_state(&self) -> JtagState {
        self.state
    }

    /// Number of TCK cycles seen so far
    pub fn clocks(&self) -> usize {
        self.clocks
    }

    pub fn scans(&self) -> &[Scan] {
        &self.scans
    }

    pub fn clear_scans(&mut self) {
        self.scans.clear();
    }

    /// Make the cable fail on the clock after the next `clocks` successful ones
    pub fn fail_after(&mut self, clocks: usize) {
        self.fail_in = Some(clocks);
    }

    pub fn clear_failure(&mut self) {
        self.fail_in = None;
    }

    fn reg_of(state: JtagState) -> Option<Register> {
        match state {
            JtagState::CaptureDR | JtagState::ShiftDR | JtagState::UpdateDR => Some(Register::Data),
            JtagState::CaptureIR | JtagState::ShiftIR | JtagState::UpdateIR => Some(Register::Instruction),
            _ => None,
        }
    }
}

impl Cable for SimChain {
    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, CableError> {
        if let Some(n) = self.fail_in {
            if n == 0 {
                return Err(CableError::Io("simulated cable failure".to_string()));
            }
            self.fail_in = Some(n - 1);
        }
        self.clocks += 1;

        let mut tdo = false;
        let state = self.state;
        match state {
            JtagState::CaptureDR | JtagState::CaptureIR => {
                let reg = Self::reg_of(state).unwrap_or(Register::Data);
                for dev in &mut self.devices {
                    dev.capture(reg);
                }
            }
            JtagState::ShiftDR | JtagState::ShiftIR => {
                let reg = Self::reg_of(state).unwrap_or(Register::Data);
                self.shifting.push(tdi);
                let mut bit = tdi;
                for dev in &mut self.devices {
                    bit = dev.shift(reg, bit);
                }
                tdo = bit;
            }
            _ => {}
        }

        let next = state.next(tms);
        match next {
            JtagState::UpdateDR | JtagState::UpdateIR => {
                let reg = Self::reg_of(next).unwrap_or(Register::Data);
                for dev in &mut self.devices {
                    dev.update(reg);
                }
                let tdi = core::mem::take(&mut self.shifting);
                self.scans.push(Scan { reg, tdi });
            }
            JtagState::Reset => {
                for dev in &mut self.devices {
                    dev.reset();
                }
                self.shifting.clear();
            }
            _ => {}
        }
        self.state = next;
        Ok(tdo)
    }
}
