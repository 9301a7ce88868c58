//! Descriptions of the virtual JTAG instances inside the target FPGA, and the strategies for
//! obtaining them together with the chain topology.
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::bits;
use crate::chain::ChainTopology;
use crate::error::Error;

/// Width reserved for the hub's own commands at the bottom of every USER1 word
pub const HUB_IR_WIDTH: usize = 4;

/// One `sld_virtual_jtag` instance.
///
/// A virtual instruction is delivered as a `user1_len`-bit word through USER1.  The
/// instruction occupies the low `ir_width` bits, and `address` is the instance's selector as it
/// appears in that word, so its low `max(ir_width, 4)` bits are always zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInstance")]
pub struct VirtualInstance {
    ir_width: usize,
    address: u64,
    user1_len: usize,
}

#[derive(Deserialize)]
struct RawInstance {
    ir_width: usize,
    address: u64,
    user1_len: usize,
}

impl TryFrom<RawInstance> for VirtualInstance {
    type Error = Error;

    fn try_from(raw: RawInstance) -> Result<Self, Error> {
        VirtualInstance::new(raw.ir_width, raw.address, raw.user1_len)
    }
}

impl Default for VirtualInstance {
    /// A lone instance with a 1-bit IR, as Quartus assigns it by default
    fn default() -> Self {
        Self {
            ir_width: 1,
            address: 0x10,
            user1_len: 5,
        }
    }
}

impl VirtualInstance {
    pub fn new(ir_width: usize, address: u64, user1_len: usize) -> Result<Self, Error> {
        if ir_width == 0 || ir_width > 32 {
            return Err(Error::Configuration(format!("unsupported virtual IR width {}", ir_width)));
        }
        if user1_len > 64 {
            return Err(Error::Configuration(format!("USER1 length {} exceeds 64 bits", user1_len)));
        }
        let vir_len = ir_width.max(HUB_IR_WIDTH);
        if user1_len <= vir_len {
            return Err(Error::Configuration(format!(
                "USER1 length {} leaves no room for an address above a {}-bit VIR", user1_len, vir_len)));
        }
        if address == 0 || address & bits::mask(vir_len) != 0 || address & !bits::mask(user1_len) != 0 {
            return Err(Error::Configuration(format!(
                "address {:#x} must be nonzero and lie in bits {}..{} of the USER1 word",
                address, vir_len, user1_len)));
        }
        Ok(Self {
            ir_width,
            address,
            user1_len,
        })
    }

    pub fn ir_width(&self) -> usize {
        self.ir_width
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn user1_len(&self) -> usize {
        self.user1_len
    }

    /// The USER1 data word selecting this instance and loading `instruction` into its VIR
    pub fn vir_word(&self, instruction: u32) -> Result<u64, Error> {
        if instruction as u64 & !bits::mask(self.ir_width) != 0 {
            return Err(Error::InstructionTooWide {
                instruction,
                width: self.ir_width,
            });
        }
        Ok(self.address | instruction as u64)
    }
}

/// The virtual instances of the target, indexed from 0
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<VirtualInstance>", into = "Vec<VirtualInstance>")]
pub struct DeviceRegistry {
    instances: Vec<VirtualInstance>,
}

impl TryFrom<Vec<VirtualInstance>> for DeviceRegistry {
    type Error = Error;

    fn try_from(instances: Vec<VirtualInstance>) -> Result<Self, Error> {
        if instances.is_empty() {
            return Err(Error::Configuration("no virtual JTAG instances configured".into()));
        }
        Ok(Self { instances })
    }
}

impl From<DeviceRegistry> for Vec<VirtualInstance> {
    fn from(registry: DeviceRegistry) -> Self {
        registry.instances
    }
}

impl From<VirtualInstance> for DeviceRegistry {
    fn from(instance: VirtualInstance) -> Self {
        Self {
            instances: alloc::vec![instance],
        }
    }
}

impl DeviceRegistry {
    /// Build from parallel parameter lists, one entry per instance.  All three lists must be the
    /// same length.
    pub fn from_params(ir_widths: &[usize], addresses: &[u64], user1_lens: &[usize]) -> Result<Self, Error> {
        if ir_widths.len() != addresses.len() || ir_widths.len() != user1_lens.len() {
            return Err(Error::Configuration(format!(
                "virtual JTAG parameter lists differ in length ({} IR widths, {} addresses, {} USER1 lengths)",
                ir_widths.len(), addresses.len(), user1_lens.len())));
        }
        let instances = ir_widths.iter()
            .zip(addresses)
            .zip(user1_lens)
            .map(|((&w, &a), &u)| VirtualInstance::new(w, a, u))
            .collect::<Result<Vec<_>, _>>()?;
        Self::try_from(instances)
    }

    /// A registry holding a single instance
    pub fn single(ir_width: usize, address: u64, user1_len: usize) -> Result<Self, Error> {
        Ok(VirtualInstance::new(ir_width, address, user1_len)?.into())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&VirtualInstance> {
        self.instances.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtualInstance> {
        self.instances.iter()
    }
}

/// A way of obtaining the chain topology and the virtual instances
pub trait TopologySource {
    fn load(&self) -> Result<(ChainTopology, DeviceRegistry), Error>;
}

/// Topology given directly by the application
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplicitTopology {
    #[serde(default)]
    pub chain: ChainTopology,
    pub instances: DeviceRegistry,
}

impl ExplicitTopology {
    pub fn new(chain: ChainTopology, instances: DeviceRegistry) -> Self {
        Self { chain, instances }
    }
}

impl TopologySource for ExplicitTopology {
    fn load(&self) -> Result<(ChainTopology, DeviceRegistry), Error> {
        Ok((self.chain, self.instances.clone()))
    }
}

/// Extracts a topology from the text of a synthesis report
pub trait ReportParser {
    fn parse(&self, report: &str) -> Result<ExplicitTopology, Error>;
}

/// Topology read from a synthesis report by a `ReportParser`
pub struct ReportTopology<P> {
    report: String,
    parser: P,
}

impl<P: ReportParser> ReportTopology<P> {
    pub fn new(report: impl Into<String>, parser: P) -> Self {
        Self {
            report: report.into(),
            parser,
        }
    }
}

impl<P: ReportParser> TopologySource for ReportTopology<P> {
    fn load(&self) -> Result<(ChainTopology, DeviceRegistry), Error> {
        let topology = self.parser.parse(&self.report)?;
        log::debug!("report describes {} virtual instances", topology.instances.len());
        topology.load()
    }
}
