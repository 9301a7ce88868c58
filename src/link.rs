//! The virtual JTAG protocol.  `VirtualJtagLink` lets the client talk to one virtual instance at
//! a time as if the hub's virtual registers were ordinary JTAG registers, taking care of the
//! USER0 / USER1 indirection and of keeping the other TAPs on the chain in BYPASS.
//!
//! A virtual instruction takes two physical scans: USER1 into the target's IR, then the
//! instance address and instruction into the USER1 data register.  Virtual data takes a USER0
//! IR scan (skipped when USER0 is already loaded) followed by a DR scan of the payload.
use bitvec::prelude::*;

use crate::cable::Cable;
use crate::chain::ChainTopology;
use crate::device::{DeviceRegistry, TopologySource, VirtualInstance};
use crate::error::Error;
use crate::statemachine::{JtagSM, JtagState, Register};

/// Hub command, sent with address 0, that makes the hub latch its information register
pub const VIR_CAPTURE: u32 = 0b1011;

/// Surround `payload` with filler: `after` bits for the TAPs nearest TDO go first, `before`
/// bits for the TAPs nearest TDI go last.
fn pad(payload: &BitSlice<u8, Lsb0>, after: usize, before: usize, fill: bool) -> BitVec<u8, Lsb0> {
    let mut out = BitVec::with_capacity(after + payload.len() + before);
    out.resize(after, fill);
    out.extend_from_bitslice(payload);
    out.resize(after + payload.len() + before, fill);
    out
}

pub struct VirtualJtagLink<T> {
    sm: JtagSM<T>,
    chain: ChainTopology,
    instances: DeviceRegistry,
    /// Instruction currently held by the target's physical IR, if known
    loaded_ir: Option<u32>,
}

impl<T, U> VirtualJtagLink<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Create a link using an existing `JtagSM`, which should be in Run-Test/Idle
    pub fn new(sm: JtagSM<T>, chain: ChainTopology, instances: DeviceRegistry) -> Self {
        Self {
            sm,
            chain,
            instances,
            loaded_ir: None,
        }
    }

    /// Create a link with the topology provided by `source`
    pub fn from_source(sm: JtagSM<T>, source: &dyn TopologySource) -> Result<Self, Error> {
        let (chain, instances) = source.load()?;
        Ok(Self::new(sm, chain, instances))
    }

    pub fn chain(&self) -> &ChainTopology {
        &self.chain
    }

    pub fn instances(&self) -> &DeviceRegistry {
        &self.instances
    }

    /// TAP state as tracked by the state machine, `None` after a cable failure
    pub fn state(&self) -> Option<JtagState> {
        self.sm.state()
    }

    pub fn cable(&self) -> &U {
        &self.sm.cable
    }

    /// Mutable access to the cable.  The cached physical instruction is forgotten, so the next
    /// data scan reloads USER0.  Anything clocked directly leaves the tracked TAP state stale
    /// until `reset`.
    pub fn cable_mut(&mut self) -> &mut U {
        self.loaded_ir = None;
        &mut self.sm.cable
    }

    fn instance(&self, index: usize) -> Result<VirtualInstance, Error> {
        self.instances.get(index).copied().ok_or(Error::OutOfRange {
            index: index as i64,
            count: self.instances.len(),
        })
    }

    /// Reset every TAP on the chain and return to Run-Test/Idle
    pub fn reset(&mut self) -> Result<(), Error> {
        self.loaded_ir = None;
        self.sm.mode_reset()
    }

    /// Count the TAPs on the chain; see `chain::count_devices`.  Every TAP, including the target,
    /// is left in BYPASS.
    pub fn count_devices(&mut self, max: usize) -> Result<usize, Error> {
        self.loaded_ir = None;
        crate::chain::count_devices(&mut self.sm, max)
    }

    /// One complete scan of `reg`, starting from the current state and finishing in Exit1.  The
    /// payload is padded for the TAPs in BYPASS and only the matching window of TDO is returned.
    fn scan(&mut self, reg: Register, payload: &BitSlice<u8, Lsb0>) -> Result<BitVec<u8, Lsb0>, Error> {
        let after = self.chain.pad_after(reg);
        let before = self.chain.pad_before(reg);
        let stream = pad(payload, after, before, true);
        log::trace!("{:?} scan: {} filler + {} payload + {} filler", reg, after, payload.len(), before);

        let tdo = self.sm.read_write_reg(reg, &stream, true)?;
        Ok(tdo[after..after + payload.len()].to_bitvec())
    }

    /// Load `instruction` into the target's physical IR, BYPASS into every other TAP
    fn load_ir(&mut self, instruction: u32) -> Result<(), Error> {
        let ir_len = self.chain.target().ir_len;
        let bits = crate::bits::from_u64(instruction as u64, ir_len);

        self.loaded_ir = None;
        self.scan(Register::Instruction, &bits)?;
        self.loaded_ir = Some(instruction);
        Ok(())
    }

    /// Write a USER1 data word: hub address in the upper bits, virtual instruction below
    fn write_vir_word(&mut self, word: u64, user1_len: usize) -> Result<(), Error> {
        let user1 = self.chain.target().user1;
        self.load_ir(user1)?;

        let bits = crate::bits::from_u64(word, user1_len);
        self.scan(Register::Data, &bits)?;
        self.sm.change_mode(JtagState::Idle)
    }

    /// Shift `instruction` into the virtual IR of instance `index`
    pub fn send_virtual_instruction(&mut self, index: usize, instruction: u32) -> Result<(), Error> {
        let instance = self.instance(index)?;
        let word = instance.vir_word(instruction)?;
        log::debug!("VIR {:#x} -> instance {} (USER1 word {:#x})", instruction, index, word);

        self.write_vir_word(word, instance.user1_len())
    }

    /// Shift `data` through the virtual DR of instance `index`, returning the bits it held.  The
    /// length of `data` must match the data register selected by the instance's current virtual
    /// instruction.
    pub fn send_virtual_data(&mut self, index: usize, data: &BitSlice<u8, Lsb0>) -> Result<BitVec<u8, Lsb0>, Error> {
        self.instance(index)?;
        log::debug!("VDR {} bits -> instance {}", data.len(), index);

        // USER0 first, so that even a bare DR pass only reaches the virtual DR
        let user0 = self.chain.target().user0;
        if self.loaded_ir != Some(user0) {
            self.load_ir(user0)?;
        }

        if data.is_empty() {
            self.sm.change_mode(JtagState::Exit1DR)?;
            self.sm.change_mode(JtagState::Idle)?;
            return Ok(BitVec::new());
        }

        let captured = self.scan(Register::Data, data)?;
        self.sm.change_mode(JtagState::Idle)?;
        Ok(captured)
    }

    /// Send VIR_CAPTURE to the hub itself (address 0)
    pub fn virtual_capture(&mut self) -> Result<(), Error> {
        let user1_len = self.instances.iter()
            .map(|i| i.user1_len())
            .max()
            .unwrap_or(crate::device::HUB_IR_WIDTH);
        log::debug!("VIR_CAPTURE to hub");
        self.write_vir_word(VIR_CAPTURE as u64, user1_len)
    }
}
