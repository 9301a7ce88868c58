//! Bit-banged JTAG over `embedded-hal` pins
use embedded_hal::{delay::DelayNs, digital::{InputPin, OutputPin, PinState}};

use crate::cable::Cable;
use crate::error::CableError;

pub struct Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    half_period: u32,
    delay: Delay,
    clock: Clk,
    tdi: Tdi,
    tdo: Tdo,
    tms: Tms
}

impl<Clk, Tdi, Tdo, Tms, Delay> Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    pub fn new(freq_khz: u32, clock: Clk, tdi: Tdi, tdo: Tdo, tms: Tms, delay: Delay) -> Gpio<Clk, Tdi, Tdo, Tms, Delay> {
        let period_ns = 1_000_000 / freq_khz.max(1);
        let half_period = period_ns / 2;
        Gpio { half_period, clock, tdi, tdo, tms, delay }
    }
}

impl<Clk, Tdi, Tdo, Tms, Delay> Cable for Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, CableError> {
        // clock starts low
        self.tms.set_state(PinState::from(tms)).map_err(|_| CableError::Pin)?;
        self.tdi.set_state(PinState::from(tdi)).map_err(|_| CableError::Pin)?;
        self.delay.delay_ns(self.half_period);

        // TDO changed on the previous falling edge and is stable until the next one
        let tdo = self.tdo.is_high().map_err(|_| CableError::Pin)?;

        self.clock.set_high().map_err(|_| CableError::Pin)?;
        self.delay.delay_ns(self.half_period);
        self.clock.set_low().map_err(|_| CableError::Pin)?;
        Ok(tdo)
    }
}
