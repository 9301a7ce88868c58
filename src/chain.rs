//! Bookkeeping for the physical scan chain around the FPGA that hosts the virtual JTAG hub.
//!
//! The chain runs TDI -> devices "before" -> target -> devices "after" -> TDO.  While the target
//! is being talked to, every other device sits in BYPASS, so it adds its whole IR length to an
//! instruction scan but only a single bit to a data scan.
use alloc::format;
use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cable::Cable;
use crate::error::Error;
use crate::statemachine::{JtagSM, JtagState, Register};

/// The physical TAP of the device hosting the virtual JTAG hub
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetTap {
    /// Instruction register length of the device
    pub ir_len: usize,
    /// Instruction that connects the DR chain to the selected virtual data register
    pub user0: u32,
    /// Instruction that connects the DR chain to the virtual instruction register
    pub user1: u32,
}

impl Default for TargetTap {
    /// Cyclone-class Altera devices
    fn default() -> Self {
        Self {
            ir_len: 10,
            user0: 0x00C,
            user1: 0x00E,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTopology")]
pub struct ChainTopology {
    devices_before: usize,
    devices_after: usize,
    ir_bits_before: usize,
    ir_bits_after: usize,
    target: TargetTap,
}

#[derive(Deserialize)]
struct RawTopology {
    #[serde(default)]
    devices_before: usize,
    #[serde(default)]
    devices_after: usize,
    #[serde(default)]
    ir_bits_before: usize,
    #[serde(default)]
    ir_bits_after: usize,
    #[serde(default)]
    target: TargetTap,
}

impl TryFrom<RawTopology> for ChainTopology {
    type Error = Error;

    fn try_from(raw: RawTopology) -> Result<Self, Error> {
        ChainTopology::new(raw.devices_before, raw.ir_bits_before, raw.devices_after, raw.ir_bits_after)?
            .with_target(raw.target)
    }
}

fn check_side(side: &str, devices: usize, ir_bits: usize) -> Result<(), Error> {
    if ir_bits < devices {
        return Err(Error::Configuration(format!(
            "{} devices {} cannot have only {} IR bits between them", side, devices, ir_bits)));
    }
    if devices == 0 && ir_bits != 0 {
        return Err(Error::Configuration(format!(
            "{} IR bits given with no {} devices", ir_bits, side)));
    }
    Ok(())
}

impl ChainTopology {
    /// A chain with `devices_before` TAPs (IR lengths summing to `ir_bits_before`) between TDI
    /// and the target, and `devices_after` TAPs between the target and TDO.
    pub fn new(devices_before: usize, ir_bits_before: usize, devices_after: usize, ir_bits_after: usize) -> Result<Self, Error> {
        check_side("before", devices_before, ir_bits_before)?;
        check_side("after", devices_after, ir_bits_after)?;
        Ok(Self {
            devices_before,
            devices_after,
            ir_bits_before,
            ir_bits_after,
            target: TargetTap::default(),
        })
    }

    /// The target is the only device on the chain
    pub fn single() -> Self {
        Self::default()
    }

    /// Build from the individual IR lengths of the other devices
    pub fn from_ir_lengths(before: &[usize], after: &[usize]) -> Result<Self, Error> {
        if before.iter().chain(after).any(|&len| len == 0) {
            return Err(Error::Configuration("IR length of 0".into()));
        }
        Self::new(before.len(), before.iter().sum(), after.len(), after.iter().sum())
    }

    pub fn with_target(mut self, target: TargetTap) -> Result<Self, Error> {
        if target.ir_len == 0 || target.ir_len > 32 {
            return Err(Error::Configuration(format!("unsupported target IR length {}", target.ir_len)));
        }
        let limit = crate::bits::mask(target.ir_len);
        if target.user0 as u64 > limit || target.user1 as u64 > limit {
            return Err(Error::Configuration(format!(
                "USER0 {:#x} / USER1 {:#x} do not fit a {}-bit IR", target.user0, target.user1, target.ir_len)));
        }
        self.target = target;
        Ok(self)
    }

    pub fn devices_before(&self) -> usize {
        self.devices_before
    }

    pub fn devices_after(&self) -> usize {
        self.devices_after
    }

    pub fn ir_bits_before(&self) -> usize {
        self.ir_bits_before
    }

    pub fn ir_bits_after(&self) -> usize {
        self.ir_bits_after
    }

    pub fn target(&self) -> &TargetTap {
        &self.target
    }

    /// Filler bits for the devices between TDI and the target.  These are the last bits of a
    /// shift.
    pub fn pad_before(&self, reg: Register) -> usize {
        match reg {
            Register::Instruction => self.ir_bits_before,
            Register::Data => self.devices_before,
        }
    }

    /// Filler bits for the devices between the target and TDO.  These are the first bits of a
    /// shift.
    pub fn pad_after(&self, reg: Register) -> usize {
        match reg {
            Register::Instruction => self.ir_bits_after,
            Register::Data => self.devices_after,
        }
    }

    /// Total length of the IR chain
    pub fn ir_chain_len(&self) -> usize {
        self.ir_bits_before + self.target.ir_len + self.ir_bits_after
    }

    /// Number of TAPs on the chain, which is also the DR chain length with everything in BYPASS
    pub fn device_count(&self) -> usize {
        self.devices_before + 1 + self.devices_after
    }
}

/// Largest `max` accepted by `count_devices`
pub const MAX_COUNTED_DEVICES: usize = 1024;

/// Count the TAPs on the chain.  Every TAP is put into BYPASS by flooding the IR chain with
/// ones, the DR chain is flushed with zeros, and then ones are shifted in until the first one
/// emerges on TDO.  `max` bounds both the flush and the search.  Leaves the chain in
/// Run-Test/Idle with every TAP in BYPASS.
pub fn count_devices<T, U>(sm: &mut JtagSM<T>, max: usize) -> Result<usize, Error>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    if max == 0 || max > MAX_COUNTED_DEVICES {
        return Err(Error::Configuration(format!(
            "device count limit {} outside 1..={}", max, MAX_COUNTED_DEVICES)));
    }
    sm.mode_reset()?;

    // Long enough for any plausible IR chain
    let ones = bitvec![u8, Lsb0; 1; max * 32];
    sm.write_reg(Register::Instruction, &ones, true)?;
    sm.change_mode(JtagState::Idle)?;

    let zeros = bitvec![u8, Lsb0; 0; max];
    sm.write_reg(Register::Data, &zeros, false)?;

    let mut count = None;
    for i in 0..max {
        let tdo = sm.read_write_reg(Register::Data, bits![u8, Lsb0; 1], false)?;
        if tdo[0] {
            count = Some(i);
            break;
        }
    }

    // Leave through Exit1 without disturbing anything else
    sm.read_reg(Register::Data, 1, true)?;
    sm.change_mode(JtagState::Idle)?;

    match count {
        Some(n) => {
            log::debug!("found {} devices on the chain", n);
            Ok(n)
        }
        None => Err(Error::Protocol("no TDO response while counting devices; chain broken or too long")),
    }
}
