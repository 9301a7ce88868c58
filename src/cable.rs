//! Implementations for different JTAG hardware adapters live here.  Hardware adapters should
//! implement the `Cable` trait.  Only `clock` is mandatory; adapters that can batch transfers
//! should also override `change_mode` and `shift`.
use bitvec::prelude::*;

use crate::error::CableError;

pub mod gpio;
pub mod sim;
#[cfg(feature = "std")]
pub mod usbblaster;

pub trait Cable {
    /// Run exactly one TCK cycle with the given TMS and TDI levels, returning the level sampled
    /// on TDO during that cycle.
    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, CableError>;

    /// Clock out a series of TMS values to change the state of the JTAG chain.  `tdi` is the
    /// level held on the TDI line during mode changes.
    fn change_mode(&mut self, tms: &[bool], tdi: bool) -> Result<(), CableError> {
        for &bit in tms {
            self.clock(bit, tdi)?;
        }
        Ok(())
    }

    /// Shift `tdi` into the chain, LSB first, and return the bits sampled on TDO.  Should be
    /// called with state = ShiftIR or ShiftDR.  The state won't change unless `exit_after` is
    /// true, in which case TMS is raised on the final bit and the chain ends in Exit1IR or
    /// Exit1DR.
    fn shift(&mut self, tdi: &BitSlice<u8, Lsb0>, exit_after: bool) -> Result<BitVec<u8, Lsb0>, CableError> {
        let mut tdo = BitVec::with_capacity(tdi.len());
        let last = tdi.len().saturating_sub(1);
        for (i, bit) in tdi.iter().by_vals().enumerate() {
            tdo.push(self.clock(exit_after && i == last, bit)?);
        }
        Ok(tdo)
    }
}

/// Open a cable by name.  Currently only the Altera USB-Blaster is supported as a real adapter.
#[cfg(feature = "std")]
pub fn new_from_string(name: &str) -> Result<alloc::boxed::Box<dyn Cable>, CableError> {
    match name {
        "usbblaster" => Ok(alloc::boxed::Box::new(usbblaster::UsbBlaster::new()?)),
        _ => Err(CableError::NotFound(name.into())),
    }
}
