//! Register-level access to the ATmega16 peripherals used by this crate.
//!
//! The blocks below mirror the data-space layout of the device exactly;
//! the addresses and bit positions are a compatibility contract with the
//! hardware, not something this crate is free to rearrange.

use core::cell::UnsafeCell;
#[cfg(target_arch = "avr")]
use core::ops::Deref;
use core::ptr;

/// A single memory-mapped register.
///
/// All accesses are volatile. `modify` is a plain read-modify-write; when
/// the register is shared with interrupt context, callers wrap it in a
/// critical section.
#[repr(transparent)]
pub struct Reg<T: Copy> {
    value: UnsafeCell<T>,
}

// Register access is volatile and the hardware serializes it; the cell is
// only `UnsafeCell` so shared references can write.
unsafe impl<T: Copy + Send> Sync for Reg<T> {}

impl<T: Copy> Reg<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
        }
    }

    /// Read the current register value.
    #[inline]
    pub fn read(&self) -> T {
        unsafe { ptr::read_volatile(self.value.get()) }
    }

    /// Write a value to the register.
    #[inline]
    pub fn write(&self, value: T) {
        unsafe { ptr::write_volatile(self.value.get(), value) }
    }

    /// Read the register, transform the value, write it back.
    #[inline]
    pub fn modify(&self, f: impl FnOnce(T) -> T) {
        self.write(f(self.read()));
    }
}

impl Reg<u8> {
    /// Set a single bit, preserving the rest of the register.
    #[inline]
    pub fn set_bit(&self, index: u8) {
        self.modify(|r| r | (1 << index));
    }

    /// Clear a single bit, preserving the rest of the register.
    #[inline]
    pub fn clear_bit(&self, index: u8) {
        self.modify(|r| r & !(1 << index));
    }

    /// Is the given bit set?
    #[inline]
    pub fn bit_is_set(&self, index: u8) -> bool {
        self.read() & (1 << index) != 0
    }
}

pub mod tc1 {
    //! Timer/Counter1 registers, data-space base address `0x46`.

    use super::Reg;

    /// The Timer/Counter1 register block.
    ///
    /// The 16-bit registers are little-endian register pairs in hardware
    /// (`ICR1L`/`ICR1H` and friends); the AVR is little-endian, so a plain
    /// `u16` field at the low address reproduces the layout.
    #[repr(C)]
    pub struct RegisterBlock {
        /// Input capture register; latches TCNT1 on a matching edge.
        pub icr1: Reg<u16>,
        /// Output compare register B (unused by the capture unit).
        pub ocr1b: Reg<u16>,
        /// Output compare register A (unused by the capture unit).
        pub ocr1a: Reg<u16>,
        /// The free-running counter.
        pub tcnt1: Reg<u16>,
        /// Control register B: clock select in bits 0..=2, ICES1 in bit 6.
        pub tccr1b: Reg<u8>,
        /// Control register A: FOC1A in bit 3, FOC1B in bit 2.
        pub tccr1a: Reg<u8>,
    }

    impl Default for RegisterBlock {
        /// A block holding the hardware reset values (all zero). Useful
        /// for driving the block through something other than the
        /// memory-mapped peripheral, e.g. a test double.
        fn default() -> Self {
            Self {
                icr1: Reg::new(0),
                ocr1b: Reg::new(0),
                ocr1a: Reg::new(0),
                tcnt1: Reg::new(0),
                tccr1b: Reg::new(0),
                tccr1a: Reg::new(0),
            }
        }
    }
}

pub mod shared {
    //! Interrupt flag/mask registers shared by all three timers,
    //! data-space base address `0x58`.

    use super::Reg;

    /// Pointer to the register block.
    #[cfg(target_arch = "avr")]
    pub const PTR: *const RegisterBlock = 0x58 as *const _;

    /// TIFR and TIMSK.
    #[repr(C)]
    pub struct RegisterBlock {
        /// Timer interrupt flag register; ICF1 is bit 5, write 1 to clear.
        pub tifr: Reg<u8>,
        /// Timer interrupt mask register; TICIE1 is bit 5.
        pub timsk: Reg<u8>,
    }

    impl Default for RegisterBlock {
        /// A block holding the hardware reset values (all zero).
        fn default() -> Self {
            Self {
                tifr: Reg::new(0),
                timsk: Reg::new(0),
            }
        }
    }
}

pub mod port {
    //! General-purpose I/O port registers (PIN/DDR/PORT triple).

    use super::Reg;

    /// One I/O port. PORTD, which carries the ICP1 pin, sits at `0x30`.
    #[repr(C)]
    pub struct RegisterBlock {
        /// Input pins address (read-only in hardware).
        pub pin: Reg<u8>,
        /// Data direction register; 0 = input, 1 = output.
        pub ddr: Reg<u8>,
        /// Data register; for inputs, 1 enables the pull-up.
        pub port: Reg<u8>,
    }

    impl Default for RegisterBlock {
        /// A block holding the hardware reset values (all zero).
        fn default() -> Self {
            Self {
                pin: Reg::new(0),
                ddr: Reg::new(0),
                port: Reg::new(0),
            }
        }
    }
}

/// The Timer/Counter1 peripheral.
#[cfg(target_arch = "avr")]
pub struct TC1 {
    _private: (),
}

#[cfg(target_arch = "avr")]
impl TC1 {
    /// Pointer to the register block.
    pub const PTR: *const tc1::RegisterBlock = 0x46 as *const _;

    /// Unsafely create an instance of this peripheral out of thin air.
    ///
    /// # Safety
    ///
    /// You must ensure that you're only using one instance of this type at
    /// a time.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "avr")]
impl Deref for TC1 {
    type Target = tc1::RegisterBlock;

    fn deref(&self) -> &Self::Target {
        unsafe { &*Self::PTR }
    }
}

/// The I/O port D peripheral, home of the ICP1 capture pin (PD6).
#[cfg(target_arch = "avr")]
pub struct PORTD {
    _private: (),
}

#[cfg(target_arch = "avr")]
impl PORTD {
    /// Pointer to the register block.
    pub const PTR: *const port::RegisterBlock = 0x30 as *const _;

    /// Unsafely create an instance of this peripheral out of thin air.
    ///
    /// # Safety
    ///
    /// You must ensure that you're only using one instance of this type at
    /// a time.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "avr")]
impl Deref for PORTD {
    type Target = port::RegisterBlock;

    fn deref(&self) -> &Self::Target {
        unsafe { &*Self::PTR }
    }
}
