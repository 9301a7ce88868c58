use bitvec::prelude::*;
use proptest::prelude::*;

use vjtag::bits;
use vjtag::cable::sim::{AlteraTap, Behaviour, GenericTap, SimChain, SimInstance, SldHub};
use vjtag::chain::{ChainTopology, TargetTap};
use vjtag::device::{DeviceRegistry, ExplicitTopology, VirtualInstance};
use vjtag::error::Error;
use vjtag::link::VirtualJtagLink;
use vjtag::session::VirtualJtagDevice;
use vjtag::statemachine::{JtagSM, JtagState, Register};

fn build_sim(before: &[usize], after: &[usize], target: AlteraTap) -> SimChain {
    let mut sim = SimChain::new();
    for &len in before {
        sim.push(GenericTap::new(len, Some(0x1000_0001)));
    }
    sim.push(target);
    for &len in after {
        sim.push(GenericTap::new(len, None));
    }
    sim
}

fn loopback_hub() -> SldHub {
    SldHub::new(6, vec![
        SimInstance::new(2, 0x10, Behaviour::Loopback { len: 8 }),
        SimInstance::new(2, 0x20, Behaviour::Loopback { len: 8 }),
    ])
}

fn loopback_registry() -> DeviceRegistry {
    DeviceRegistry::from_params(&[2, 2], &[0x10, 0x20], &[6, 6]).unwrap()
}

/// Every TAP other than the target must only ever have been given BYPASS
fn assert_bypassed(sim: &SimChain, target: usize) {
    for (i, _) in sim.devices().iter().enumerate() {
        if i == target {
            continue;
        }
        let tap = sim.generic(i).unwrap();
        let bypass = bits::mask(tap.ir_len());
        assert!(tap.history.iter().all(|&ir| ir == bypass), "TAP {} saw {:x?}", i, tap.history);
    }
}

#[test]
fn twelve_bit_ir_scan_with_one_device_before() {
    let hub = SldHub::new(5, vec![SimInstance::new(4, 0x10, Behaviour::EchoInstruction)]);
    let mut sim = build_sim(&[8], &[], AlteraTap::with_ir(4, 0xC, 0xE, hub));

    let target = TargetTap { ir_len: 4, user0: 0xC, user1: 0xE };
    let chain = ChainTopology::from_ir_lengths(&[8], &[]).unwrap().with_target(target).unwrap();
    let sm = JtagSM::new(&mut sim).unwrap();
    let mut link = VirtualJtagLink::new(sm, chain, DeviceRegistry::single(4, 0x10, 5).unwrap());

    link.send_virtual_instruction(0, 0b1010).unwrap();
    assert_eq!(link.state(), Some(JtagState::Idle));

    let sim = link.cable();
    let scans = sim.scans();
    assert_eq!(scans.len(), 2);

    let ir = &scans[0];
    assert_eq!(ir.reg, Register::Instruction);
    assert_eq!(ir.tdi.len(), 12);
    assert_eq!(bits::to_u64(&ir.tdi[..4]), 0xE);
    assert!(ir.tdi[4..].all());

    let dr = &scans[1];
    assert_eq!(dr.reg, Register::Data);
    assert_eq!(dr.tdi.len(), 5 + 1);
    assert_eq!(bits::to_u64(&dr.tdi[..5]), 0x10 | 0b1010);

    assert_bypassed(sim, 1);
    assert_eq!(sim.altera(1).unwrap().hub.instances[0].vir, 0b1010);
}

#[test]
fn instruction_reads_back_through_echo_register() {
    let hub = SldHub::new(6, vec![SimInstance::new(3, 0x10, Behaviour::EchoInstruction)]);
    let mut sim = build_sim(&[5], &[6, 4], AlteraTap::new(hub));
    let chain = ChainTopology::from_ir_lengths(&[5], &[6, 4]).unwrap();
    let sm = JtagSM::new(&mut sim).unwrap();
    let mut link = VirtualJtagLink::new(sm, chain, DeviceRegistry::single(3, 0x10, 6).unwrap());

    for instruction in [0b101, 0b010, 0b111] {
        link.send_virtual_instruction(0, instruction).unwrap();
        let readback = link.send_virtual_data(0, bits![u8, Lsb0; 0; 3]).unwrap();
        assert_eq!(bits::to_u64(&readback), instruction as u64);
    }
    assert_bypassed(link.cable(), 1);
}

#[test]
fn data_loops_back_on_the_selected_instance() {
    let mut sim = build_sim(&[], &[], AlteraTap::new(loopback_hub()));
    let sm = JtagSM::new(&mut sim).unwrap();
    let mut link = VirtualJtagLink::new(sm, ChainTopology::single(), loopback_registry());

    link.send_virtual_instruction(1, 0b01).unwrap();
    let first = link.send_virtual_data(1, &bits::from_u64(0x8d, 8)).unwrap();
    assert_eq!(bits::to_u64(&first), 0);
    let second = link.send_virtual_data(1, &bits::from_u64(0x00, 8)).unwrap();
    assert_eq!(bits::to_u64(&second), 0x8d);

    let hub = &link.cable().altera(0).unwrap().hub;
    assert_eq!(hub.selected(), Some(1));
    assert!(hub.instances[0].data_history.is_empty());
    assert_eq!(hub.instances[1].data_history.len(), 2);
}

#[test]
fn user0_is_loaded_once_per_run_of_data_scans() {
    let mut sim = build_sim(&[], &[], AlteraTap::new(loopback_hub()));
    let sm = JtagSM::new(&mut sim).unwrap();
    let mut link = VirtualJtagLink::new(sm, ChainTopology::single(), loopback_registry());

    link.send_virtual_instruction(0, 0).unwrap();
    for _ in 0..3 {
        link.send_virtual_data(0, &bits::from_u64(0x55, 8)).unwrap();
    }
    link.send_virtual_instruction(0, 1).unwrap();
    link.send_virtual_data(0, &bits::from_u64(0x55, 8)).unwrap();

    let history = &link.cable().altera(0).unwrap().history;
    assert_eq!(history, &[0x00E, 0x00C, 0x00E, 0x00C]);
}

#[test]
fn empty_payload_is_a_noop_shift() {
    let mut sim = build_sim(&[4], &[4], AlteraTap::new(loopback_hub()));
    let chain = ChainTopology::from_ir_lengths(&[4], &[4]).unwrap();
    let sm = JtagSM::new(&mut sim).unwrap();
    let mut link = VirtualJtagLink::new(sm, chain, loopback_registry());

    let captured = link.send_virtual_data(0, BitSlice::empty()).unwrap();
    assert!(captured.is_empty());
    assert_eq!(link.state(), Some(JtagState::Idle));
    assert_eq!(link.cable().tap_state(), JtagState::Idle);

    let scans = link.cable().scans();
    assert_eq!(scans.len(), 2);
    assert_eq!(scans[0].reg, Register::Instruction);
    assert_eq!(scans[1].reg, Register::Data);
    assert!(scans[1].tdi.is_empty());
    assert_eq!(link.cable().altera(1).unwrap().history, [0x00C]);
}

#[test]
fn empty_payload_after_instruction_leaves_vir_alone() {
    let mut sim = build_sim(&[], &[], AlteraTap::new(loopback_hub()));
    let sm = JtagSM::new(&mut sim).unwrap();
    let mut link = VirtualJtagLink::new(sm, ChainTopology::single(), loopback_registry());

    link.send_virtual_instruction(0, 0b10).unwrap();
    link.send_virtual_data(0, BitSlice::empty()).unwrap();

    let tap = link.cable().altera(0).unwrap();
    assert_eq!(tap.hub.instances[0].vir_history, [0b10]);
    assert_eq!(tap.hub.instances[0].vir, 0b10);
    assert_eq!(tap.history, [0x00E, 0x00C]);
}

#[test]
fn bad_arguments_touch_nothing() {
    let mut sim = build_sim(&[], &[], AlteraTap::new(loopback_hub()));
    let sm = JtagSM::new(&mut sim).unwrap();
    let mut link = VirtualJtagLink::new(sm, ChainTopology::single(), loopback_registry());
    let clocks = link.cable().clocks();

    assert_eq!(link.send_virtual_instruction(2, 0), Err(Error::OutOfRange { index: 2, count: 2 }));
    assert_eq!(link.send_virtual_instruction(0, 0b100), Err(Error::InstructionTooWide { instruction: 4, width: 2 }));
    assert!(matches!(link.send_virtual_data(2, bits![u8, Lsb0; 1]), Err(Error::OutOfRange { .. })));
    assert_eq!(link.cable().clocks(), clocks);
}

#[test]
fn cable_failure_needs_reset() {
    let mut sim = build_sim(&[], &[], AlteraTap::new(loopback_hub()));
    let sm = JtagSM::new(&mut sim).unwrap();
    let mut link = VirtualJtagLink::new(sm, ChainTopology::single(), loopback_registry());

    link.cable_mut().fail_after(6);
    assert!(matches!(link.send_virtual_instruction(0, 1), Err(Error::Cable(_))));
    assert!(matches!(link.send_virtual_instruction(0, 1), Err(Error::Protocol(_))));

    link.cable_mut().clear_failure();
    link.reset().unwrap();
    link.send_virtual_instruction(0, 1).unwrap();
    assert_eq!(link.cable().altera(0).unwrap().hub.instances[0].vir, 1);
}

#[test]
fn virtual_capture_reaches_the_hub() {
    let mut sim = build_sim(&[], &[], AlteraTap::new(loopback_hub()));
    let sm = JtagSM::new(&mut sim).unwrap();
    let mut link = VirtualJtagLink::new(sm, ChainTopology::single(), loopback_registry());

    link.virtual_capture().unwrap();
    let hub = &link.cable().altera(0).unwrap().hub;
    assert_eq!(hub.hub_captures, 1);
    assert_eq!(hub.selected(), None);
}

fn open_device<'a>(sim: &'a mut SimChain, before: &[usize], after: &[usize]) -> VirtualJtagDevice<&'a mut SimChain> {
    let topology = ExplicitTopology::new(
        ChainTopology::from_ir_lengths(before, after).unwrap(),
        loopback_registry(),
    );
    VirtualJtagDevice::open(sim, &topology).unwrap()
}

#[test]
fn facade_index_boundaries() {
    let mut sim = build_sim(&[], &[], AlteraTap::new(loopback_hub()));
    let mut dev = open_device(&mut sim, &[], &[]);
    let clocks = dev.link().cable().clocks();

    assert_eq!(dev.send_vir(1, 2), Err(Error::OutOfRange { index: 2, count: 2 }));
    assert_eq!(dev.send_vir(1, -1), Err(Error::OutOfRange { index: -1, count: 2 }));
    assert!(matches!(dev.send_vdr(0, 8, 2), Err(Error::OutOfRange { .. })));
    assert!(matches!(dev.send_vdr(0, 8, -1), Err(Error::OutOfRange { .. })));
    assert_eq!(dev.link().cable().clocks(), clocks);

    dev.send_vir(1, 1).unwrap();
    assert_eq!(dev.send_vdr(0xa5, 8, 1).unwrap(), 0);
    assert_eq!(dev.send_vdr(0x00, 8, 1).unwrap(), 0xa5);
}

#[test]
fn facade_reset_is_idempotent() {
    let mut sim = build_sim(&[4], &[], AlteraTap::new(loopback_hub()));
    let mut dev = open_device(&mut sim, &[4], &[]);
    dev.send_vir(1, 0).unwrap();

    for _ in 0..2 {
        let clocks = dev.link().cable().clocks();
        dev.reset().unwrap();
        assert_eq!(dev.link().state(), Some(JtagState::Idle));
        assert_eq!(dev.link().cable().tap_state(), JtagState::Idle);
        assert_eq!(dev.link().cable().clocks() - clocks, 6);
        assert_eq!(dev.link().cable().altera(1).unwrap().instruction(), vjtag::cable::sim::ALTERA_IDCODE);
    }
}

#[test]
fn facade_counts_devices() {
    let mut sim = build_sim(&[4, 6], &[8], AlteraTap::new(loopback_hub()));
    let mut dev = open_device(&mut sim, &[4, 6], &[8]);
    assert_eq!(dev.count_number_of_jtag_devices().unwrap(), 4);
    assert_eq!(dev.link().cable().tap_state(), JtagState::Idle);

    // Counting leaves the target in BYPASS, and the link carries on from there
    dev.send_vir(0, 1).unwrap();
    dev.send_vdr(0x3c, 8, 1).unwrap();
    assert_eq!(dev.send_vdr(0, 8, 1).unwrap(), 0x3c);
    assert_eq!(dev.link().cable().altera(2).unwrap().history, [0x3FF, 0x00E, 0x00C]);
}

#[test]
fn mismatched_parameters_fail_configuration() {
    let err = DeviceRegistry::from_params(&[1, 2], &[0x10, 0x20], &[5]).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(DeviceRegistry::from(VirtualInstance::default()).len(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn data_reaches_target_on_any_chain(before in proptest::collection::vec(1usize..=12, 0..4),
                                        after in proptest::collection::vec(1usize..=12, 0..4),
                                        value in any::<u8>()) {
        let mut sim = build_sim(&before, &after, AlteraTap::new(loopback_hub()));
        let target = before.len();
        let mut dev = open_device(&mut sim, &before, &after);

        dev.send_vir(2, 0).unwrap();
        dev.send_vdr(value as u64, 8, 0).unwrap();
        prop_assert_eq!(dev.send_vdr(0, 8, 0).unwrap(), value as u64);

        let sim = dev.link().cable();
        prop_assert_eq!(sim.altera(target).unwrap().hub.instances[0].vir, 2);
        assert_bypassed(sim, target);
    }
}
