//! Implement the `Cable` trait for the Altera USB-Blaster and clones.
//!
//! The Blaster's CPLD takes one byte per pin update in bit-bang mode:
//!
//! ```text
//!   7        6       5       4      3      2      1      0
//! shift    read    LED     TDI    nCS    nCE    TMS    TCK
//! ```
//!
//! A byte with bit 7 set instead switches to byte-shift mode for the next `b & 0x3f` bytes, each
//! of which is clocked out on TDI LSB first with TMS held where it was.  With the read bit set,
//! every bit-bang byte returns one byte holding TDO in bit 0, and every shifted byte returns the
//! eight TDO bits it sampled.
use alloc::format;
use alloc::vec::Vec;
use alloc::vec;
use core::time::Duration;

use bitvec::prelude::*;
use libftd2xx::{Ftdi, FtdiCommon};

use crate::cable::Cable;
use crate::error::CableError;

const TCK: u8 = 0x01;
const TMS: u8 = 0x02;
const BASE: u8 = 0x0C;
const TDI: u8 = 0x10;
const READ: u8 = 0x40;
const SHIFT: u8 = 0x80;

/// Largest byte count one byte-shift command can carry
const MAX_SHIFT_BYTES: usize = 0x3f;

enum Reply {
    Bit,
    Byte,
}

pub struct UsbBlaster {
    ft: Ftdi,
    buf: Vec<u8>,
    replies: Vec<Reply>,
}

impl UsbBlaster {
    /// Open the first adapter describing itself as "USB-Blaster"
    pub fn new() -> Result<Self, CableError> {
        Self::with_description("USB-Blaster")
    }

    pub fn with_description(description: &str) -> Result<Self, CableError> {
        #[cfg(unix)]
        libftd2xx::set_vid_pid(0x09fb, 0x6001).map_err(|e| CableError::Io(format!("{:?}", e)))?;

        let mut ft = Ftdi::with_description(description)
            .map_err(|_| CableError::NotFound(description.into()))?;
        ft.purge_all().map_err(|e| CableError::Io(format!("{:?}", e)))?;
        ft.set_latency_timer(Duration::from_millis(2)).map_err(|e| CableError::Io(format!("{:?}", e)))?;
        ft.set_timeouts(Duration::from_millis(50), Duration::from_millis(0))
            .map_err(|e| CableError::Io(format!("{:?}", e)))?;

        Ok(Self {
            ft,
            buf: vec![],
            replies: vec![],
        })
    }

    fn bitbang(&mut self, tms: bool, tdi: bool, read: bool) {
        let mut pins = BASE;
        if tms {
            pins |= TMS;
        }
        if tdi {
            pins |= TDI;
        }
        // TDO is sampled while TCK is low, before the rising edge shifts the chain
        if read {
            self.buf.push(pins | READ);
            self.replies.push(Reply::Bit);
        } else {
            self.buf.push(pins);
        }
        self.buf.push(pins | TCK);
    }

    fn byteshift(&mut self, bytes: &[u8]) {
        // TCK low and TMS low before handing the pins to the shifter
        self.buf.push(BASE);
        for chunk in bytes.chunks(MAX_SHIFT_BYTES) {
            self.buf.push(SHIFT | READ | chunk.len() as u8);
            self.buf.extend_from_slice(chunk);
            self.replies.extend(chunk.iter().map(|_| Reply::Byte));
        }
    }

    /// Send everything queued and collect the TDO bits, in clock order
    fn flush(&mut self) -> Result<BitVec<u8, Lsb0>, CableError> {
        let buf = core::mem::take(&mut self.buf);
        let replies = core::mem::take(&mut self.replies);
        self.ft.write_all(&buf).map_err(|e| CableError::Io(format!("{:?}", e)))?;

        let mut recv = vec![0; replies.len()];
        if !recv.is_empty() {
            self.ft.read_all(&mut recv).map_err(|e| CableError::Io(format!("{:?}", e)))?;
        }

        let mut tdo = BitVec::new();
        for (reply, byte) in replies.iter().zip(recv) {
            match reply {
                Reply::Bit => tdo.push(byte & 1 != 0),
                Reply::Byte => tdo.extend_from_bitslice(byte.view_bits::<Lsb0>()),
            }
        }
        Ok(tdo)
    }
}

impl Cable for UsbBlaster {
    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, CableError> {
        self.bitbang(tms, tdi, true);
        let tdo = self.flush()?;
        tdo.first().map(|b| *b).ok_or(CableError::ShortTransfer { expected: 1, actual: 0 })
    }

    fn change_mode(&mut self, tms: &[bool], tdi: bool) -> Result<(), CableError> {
        for &bit in tms {
            self.bitbang(bit, tdi, false);
        }
        self.flush()?;
        Ok(())
    }

    fn shift(&mut self, tdi: &BitSlice<u8, Lsb0>, exit_after: bool) -> Result<BitVec<u8, Lsb0>, CableError> {
        if tdi.is_empty() {
            return Ok(BitVec::new());
        }

        // The final bit has to be bit-banged when it carries TMS
        let body = if exit_after { tdi.len() - 1 } else { tdi.len() };
        let whole = body / 8 * 8;

        if whole > 0 {
            let bytes: Vec<u8> = tdi[..whole].chunks(8).map(|c| c.load_le::<u8>()).collect();
            self.byteshift(&bytes);
        }
        for bit in tdi[whole..body].iter().by_vals() {
            self.bitbang(false, bit, true);
        }
        if exit_after {
            self.bitbang(true, tdi[body], true);
        }

        let tdo = self.flush()?;
        if tdo.len() != tdi.len() {
            return Err(CableError::ShortTransfer {
                expected: tdi.len(),
                actual: tdo.len(),
            });
        }
        Ok(tdo)
    }
}
