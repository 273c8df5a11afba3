//! GPIO pin driver
//!
//! Only the small slice of GPIO functionality the capture unit needs:
//! turning a pin into an input, with or without the internal pull-up.
//! Where applicable the pins implement the [embedded-hal] digital input
//! traits.
//!
//! [embedded-hal]: https://docs.rs/embedded-hal/latest/embedded_hal/

use core::marker::PhantomData;

use crate::peripherals::port::RegisterBlock;

/// Mode of a pin whose configuration is not (yet) known to the type system.
pub struct Unknown {}

/// Input mode (type state).
pub struct Input<MODE> {
    _mode: PhantomData<MODE>,
}

/// Floating input (type state).
pub struct Floating;

/// Pulled-up input (type state).
pub struct PullUp;

/// A pin of one I/O port, identified by its bit index within the port.
pub struct GpioPin<'d, MODE, const PIN: u8> {
    port: &'d RegisterBlock,
    _mode: PhantomData<MODE>,
}

impl<'d, const PIN: u8> GpioPin<'d, Unknown, PIN> {
    /// Create a handle to pin `PIN` of the given port.
    ///
    /// The caller is responsible for not handing out two handles to the
    /// same physical pin.
    pub fn new(port: &'d RegisterBlock) -> Self {
        Self {
            port,
            _mode: PhantomData,
        }
    }

    /// Configure the pin as a floating input.
    pub fn into_floating_input(self) -> GpioPin<'d, Input<Floating>, PIN> {
        critical_section::with(|_| {
            self.port.ddr.clear_bit(PIN);
            self.port.port.clear_bit(PIN);
        });

        GpioPin {
            port: self.port,
            _mode: PhantomData,
        }
    }

    /// Configure the pin as an input with the internal pull-up enabled.
    pub fn into_pull_up_input(self) -> GpioPin<'d, Input<PullUp>, PIN> {
        critical_section::with(|_| {
            self.port.ddr.clear_bit(PIN);
            self.port.port.set_bit(PIN);
        });

        GpioPin {
            port: self.port,
            _mode: PhantomData,
        }
    }
}

impl<'d, MODE, const PIN: u8> GpioPin<'d, Input<MODE>, PIN> {
    /// The current logic level on the pin.
    pub fn input_state(&self) -> bool {
        self.port.pin.bit_is_set(PIN)
    }
}

#[cfg(feature = "embedded-hal")]
impl<'d, MODE, const PIN: u8> embedded_hal::digital::ErrorType for GpioPin<'d, Input<MODE>, PIN> {
    type Error = core::convert::Infallible;
}

#[cfg(feature = "embedded-hal")]
impl<'d, MODE, const PIN: u8> embedded_hal::digital::InputPin for GpioPin<'d, Input<MODE>, PIN> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.input_state())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.input_state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripherals::port;

    #[test]
    fn floating_input_clears_direction_and_pull_up() {
        let regs = port::RegisterBlock::default();
        regs.ddr.write(0xFF);
        regs.port.write(0xFF);

        let _pin = GpioPin::<Unknown, 6>::new(&regs).into_floating_input();

        assert_eq!(regs.ddr.read(), 0b1011_1111);
        assert_eq!(regs.port.read(), 0b1011_1111);
    }

    #[test]
    fn pull_up_input_sets_data_bit() {
        let regs = port::RegisterBlock::default();
        regs.ddr.write(0b0100_0000);

        let _pin = GpioPin::<Unknown, 6>::new(&regs).into_pull_up_input();

        assert_eq!(regs.ddr.read(), 0);
        assert_eq!(regs.port.read(), 0b0100_0000);
    }

    #[test]
    fn input_state_follows_pin_register() {
        let regs = port::RegisterBlock::default();
        let pin = GpioPin::<Unknown, 6>::new(&regs).into_floating_input();

        assert!(!pin.input_state());
        regs.pin.write(0b0100_0000);
        assert!(pin.input_state());
    }
}
