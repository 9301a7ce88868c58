//! The application-facing object.  `VirtualJtagDevice` validates instance numbers and offers an
//! integer based convenience API over `VirtualJtagLink`.
use bitvec::prelude::*;

use crate::cable::Cable;
use crate::device::TopologySource;
use crate::error::Error;
use crate::link::VirtualJtagLink;
use crate::statemachine::JtagSM;

/// Upper bound on the chain length assumed by `count_number_of_jtag_devices`
pub const MAX_CHAIN_DEVICES: usize = 64;

pub struct VirtualJtagDevice<T> {
    link: VirtualJtagLink<T>,
}

impl<T, U> VirtualJtagDevice<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Reset the chain through `cable` and prepare to talk to the instances described by
    /// `source`
    pub fn open(cable: T, source: &dyn TopologySource) -> Result<Self, Error> {
        let (chain, instances) = source.load()?;
        let sm = JtagSM::new(cable)?;
        log::debug!("{} virtual instances, {} TAPs on the chain", instances.len(), chain.device_count());
        Ok(Self {
            link: VirtualJtagLink::new(sm, chain, instances),
        })
    }

    /// The underlying link, read-only so that resets always go through `reset`
    pub fn link(&self) -> &VirtualJtagLink<T> {
        &self.link
    }

    /// Number of configured virtual instances
    pub fn instance_count(&self) -> usize {
        self.link.instances().len()
    }

    fn check(&self, instance: i64) -> Result<usize, Error> {
        let count = self.instance_count();
        match usize::try_from(instance) {
            Ok(index) if index < count => Ok(index),
            _ => Err(Error::OutOfRange { index: instance, count }),
        }
    }

    pub fn reset(&mut self) -> Result<(), Error> {
        self.link.reset()
    }

    /// Count all TAPs on the physical chain, the target included
    pub fn count_number_of_jtag_devices(&mut self) -> Result<usize, Error> {
        self.link.count_devices(MAX_CHAIN_DEVICES)
    }

    /// Load `instruction` into the virtual IR of `instance`
    pub fn send_vir(&mut self, instruction: u32, instance: i64) -> Result<(), Error> {
        let index = self.check(instance)?;
        self.link.send_virtual_instruction(index, instruction)
    }

    /// Shift the low `bits` bits of `value` through the virtual DR of `instance` and return the
    /// captured bits.  At most 64 bits fit; use `send_vdr_bits` for longer registers.
    pub fn send_vdr(&mut self, value: u64, bits: usize, instance: i64) -> Result<u64, Error> {
        if bits > 64 {
            return Err(Error::Configuration(alloc::format!("{} bit VDR does not fit in a u64", bits)));
        }
        let index = self.check(instance)?;
        let data = crate::bits::from_u64(value, bits);
        let captured = self.link.send_virtual_data(index, &data)?;
        Ok(crate::bits::to_u64(&captured))
    }

    /// Shift `data` through the virtual DR of `instance` and return the captured bits
    pub fn send_vdr_bits(&mut self, data: &BitSlice<u8, Lsb0>, instance: i64) -> Result<BitVec<u8, Lsb0>, Error> {
        let index = self.check(instance)?;
        self.link.send_virtual_data(index, data)
    }
}
