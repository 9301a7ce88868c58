//! This crate talks to Altera Virtual JTAG (`sld_virtual_jtag`) instances inside an FPGA over a
//! JTAG scan chain that may be shared with other devices.  It works at several levels of
//! abstraction.  At the lowest level is a JTAG cable, such as the USB-Blaster.  The Cable trait
//! clocks TMS and TDI and samples TDO, one TCK cycle at a time or in batches.
//!
//! The next higher level of abstraction is the JtagSM, which keeps track of the mode of the
//! TAPs.  You tell it which mode you want (e.g., Reset or Idle) and it gets there with the fewest
//! number of mode changes.  You can also read and write the instruction and data registers.
//!
//! ChainTopology describes the other TAPs on the chain: how many sit between TDI and the FPGA,
//! how many between the FPGA and TDO, and the total length of their instruction registers.
//! VirtualJtagLink uses it to keep those TAPs in BYPASS while it delivers virtual instructions
//! and virtual data to one instance through the hub's USER1 and USER0 instructions.
//!
//! VirtualJtagDevice sits on top and is what most applications want.
//!
//! # Example
//! ```no_run
//! use vjtag::cable;
//! use vjtag::chain::ChainTopology;
//! use vjtag::device::{DeviceRegistry, ExplicitTopology};
//! use vjtag::session::VirtualJtagDevice;
//!
//! # fn main() -> Result<(), vjtag::error::Error> {
//! let cable = cable::new_from_string("usbblaster")?;
//! let topology = ExplicitTopology::new(
//!     ChainTopology::single(),
//!     DeviceRegistry::single(4, 0x10, 5)?,
//! );
//! let mut dev = VirtualJtagDevice::open(cable, &topology)?;
//!
//! dev.send_vir(0b0001, 0)?;
//! let readback = dev.send_vdr(0x8d, 8, 0)?;
//! println!("{:x}", readback);
//! # Ok(())
//! # }
//! ```

#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod bits;
pub mod cable;
pub mod chain;
pub mod device;
pub mod error;
pub mod link;
pub mod session;
pub mod statemachine;
