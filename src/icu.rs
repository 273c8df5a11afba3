//! # Input Capture Unit (ICU)
//!
//! ## Overview
//!
//! Timer/Counter1 latches its free-running counter value into ICR1 the
//! moment the configured edge arrives on the ICP1 pin, and raises the
//! `TIMER1 CAPT` interrupt. This driver programs the prescaler and edge
//! polarity, arms the capture interrupt, and forwards every captured edge
//! to a single registered callback.
//!
//! The capture register holds the timestamp of the most recent edge only;
//! a new edge overwrites it. Consumers measuring elapsed time read the
//! capture value from (or right after) the callback and call
//! [`Icu::reset_counter`] so the next capture is directly the elapsed tick
//! count. Alternating the edge polarity from inside the callback via
//! [`Icu::set_edge_detection_type`] measures full pulse widths.
//!
//! ## Example
//!
//! See the crate-level documentation.

use crate::{
    gpio::{Floating, GpioPin, Input, Unknown},
    peripherals::{shared, tc1},
};
#[cfg(target_arch = "avr")]
use crate::peripherals::TC1;

/// Pin index of ICP1 within port D.
pub const ICP1: u8 = 6;

/// FOC1A bit position in TCCR1A.
const FOC1A: u8 = 3;
/// FOC1B bit position in TCCR1A.
const FOC1B: u8 = 2;
/// Edge select bit position in TCCR1B.
const ICES1: u8 = 6;
/// Clock select mask in TCCR1B.
const CS1_MASK: u8 = 0b0000_0111;
/// Capture interrupt enable bit position in TIMSK.
const TICIE1: u8 = 5;
/// Capture interrupt flag bit position in TIFR.
const ICF1: u8 = 5;

/// Edge polarity that triggers a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Edge {
    /// Capture on a high-to-low transition.
    Falling = 0,
    /// Capture on a low-to-high transition.
    Rising  = 1,
}

/// Prescaler selection for Timer/Counter1.
///
/// The discriminant is the CS1\[2:0\] encoding written to TCCR1B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ClockSource {
    /// No clock source; the timer is halted.
    NoClock = 0,
    /// System clock, undivided.
    Div1    = 1,
    /// System clock / 8.
    Div8    = 2,
    /// System clock / 64.
    Div64   = 3,
    /// System clock / 256.
    Div256  = 4,
    /// System clock / 1024.
    Div1024 = 5,
}

impl ClockSource {
    /// The divisor applied to the system clock, or `None` when the timer
    /// is halted.
    pub fn divisor(self) -> Option<u16> {
        match self {
            ClockSource::NoClock => None,
            ClockSource::Div1 => Some(1),
            ClockSource::Div8 => Some(8),
            ClockSource::Div64 => Some(64),
            ClockSource::Div256 => Some(256),
            ClockSource::Div1024 => Some(1024),
        }
    }
}

/// Capture configuration, consumed by [`Icu::new`].
///
/// The hardware registers are the source of truth afterwards; the driver
/// keeps no copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Edge polarity that triggers a capture.
    pub edge: Edge,
    /// Prescaler selection.
    pub clock: ClockSource,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            edge: Edge::Rising,
            clock: ClockSource::Div1,
        }
    }
}

/// Timer peripheral able to drive the input capture unit.
pub trait Instance: crate::private::Sealed {
    /// The Timer/Counter1 register block.
    fn register_block(&self) -> &tc1::RegisterBlock;

    /// The interrupt flag/mask registers shared by all timers.
    fn interrupt_registers(&self) -> &shared::RegisterBlock;
}

#[cfg(target_arch = "avr")]
impl crate::private::Sealed for TC1 {}

#[cfg(target_arch = "avr")]
impl Instance for TC1 {
    #[inline(always)]
    fn register_block(&self) -> &tc1::RegisterBlock {
        self
    }

    #[inline(always)]
    fn interrupt_registers(&self) -> &shared::RegisterBlock {
        unsafe { &*shared::PTR }
    }
}

#[cfg_attr(not(target_arch = "avr"), allow(dead_code))]
mod capture_irq {
    use portable_atomic::{AtomicPtr, Ordering};

    pub(super) static CAPTURE_HANDLER: FnPtr = FnPtr::new();

    pub(super) struct FnPtr(AtomicPtr<()>);

    impl FnPtr {
        pub const fn new() -> Self {
            Self(AtomicPtr::new(core::ptr::null_mut()))
        }

        // A single pointer-sized store; the interrupt never observes a
        // torn handler.
        pub fn store(&self, f: fn()) {
            self.0.store(f as *mut (), Ordering::Relaxed);
        }

        pub fn call(&self) {
            let ptr = self.0.load(Ordering::Relaxed);
            if !ptr.is_null() {
                unsafe { (core::mem::transmute::<*mut (), fn()>(ptr))() };
            }
        }

        #[cfg(test)]
        pub fn is_set(&self) -> bool {
            !self.0.load(Ordering::Relaxed).is_null()
        }
    }

    // One callback invocation per captured edge; an edge arriving while
    // the callback runs stays latched in hardware until this returns.
    pub(super) fn dispatch() {
        CAPTURE_HANDLER.call();
    }

    #[cfg(target_arch = "avr")]
    #[export_name = "__vector_5"]
    pub unsafe extern "avr-interrupt" fn timer1_capt() {
        dispatch();
    }
}

/// Input capture driver for Timer/Counter1.
pub struct Icu<'d, T> {
    timer: T,
    _pin: GpioPin<'d, Input<Floating>, ICP1>,
}

impl<'d, T> Icu<'d, T>
where
    T: Instance,
{
    /// Configure the capture unit and arm the capture interrupt.
    ///
    /// The ICP1 pin becomes a floating input, the timer is forced out of
    /// any PWM mode a previous user may have left behind, the prescaler
    /// and edge polarity are programmed, and counter and capture registers
    /// are zeroed. After this returns, the next matching edge raises the
    /// capture interrupt.
    pub fn new(timer: T, pin: GpioPin<'d, Unknown, ICP1>, config: Config) -> Self {
        // The capture unit samples ICP1 directly; it must be an input.
        let pin = pin.into_floating_input();

        let regs = timer.register_block();

        // Forcing the output compare units puts the timer in normal
        // (non-PWM) mode; in normal mode the bits have no lasting effect.
        regs.tccr1a.set_bit(FOC1A);
        regs.tccr1a.set_bit(FOC1B);

        critical_section::with(|_| {
            regs.tccr1b.modify(|r| (r & !CS1_MASK) | config.clock as u8);
        });
        write_edge_select(regs, config.edge);

        // Count from zero, with no stale capture value.
        regs.tcnt1.write(0);
        regs.icr1.write(0);

        let mut icu = Self { timer, _pin: pin };
        icu.listen();

        debug!(
            "ICU initialized: clock select {}, edge select {}",
            config.clock as u8,
            config.edge as u8
        );

        icu
    }

    /// Select which edge on ICP1 triggers a capture.
    ///
    /// Rewrites only the edge select bit; the clock source and the rest of
    /// the configuration are untouched. Callable at any time, including
    /// from within the capture callback, to alternate edges between
    /// captures.
    pub fn set_edge_detection_type(&mut self, edge: Edge) {
        trace!("edge select {}", edge as u8);
        write_edge_select(self.timer.register_block(), edge);
    }

    /// Register the function called once per captured edge.
    ///
    /// Note that this will replace any previously registered handler. The
    /// handler runs in interrupt context and must not block.
    pub fn set_interrupt_handler(&mut self, handler: fn()) {
        capture_irq::CAPTURE_HANDLER.store(handler);
    }

    /// The counter value latched by the most recent captured edge.
    ///
    /// Meaningful between the capture interrupt and the next edge; a new
    /// edge overwrites it.
    pub fn input_capture_value(&self) -> u16 {
        self.timer.register_block().icr1.read()
    }

    /// Reset the free-running counter to zero.
    ///
    /// The capture register keeps its value, so this can be called right
    /// after consuming a capture to make the next capture an elapsed tick
    /// count.
    pub fn reset_counter(&mut self) {
        self.timer.register_block().tcnt1.write(0);
    }

    /// Enable the capture interrupt.
    pub fn listen(&mut self) {
        critical_section::with(|_| {
            self.timer.interrupt_registers().timsk.set_bit(TICIE1);
        });
    }

    /// Disable the capture interrupt.
    pub fn unlisten(&mut self) {
        critical_section::with(|_| {
            self.timer.interrupt_registers().timsk.clear_bit(TICIE1);
        });
    }

    /// Has an edge been captured since the flag was last cleared?
    ///
    /// The flag clears itself when the capture interrupt runs; this is
    /// mainly useful when polling with the interrupt unlistened.
    pub fn is_interrupt_set(&self) -> bool {
        self.timer.interrupt_registers().tifr.bit_is_set(ICF1)
    }

    /// Clear the capture interrupt flag.
    pub fn clear_interrupt(&mut self) {
        // Write-1-to-clear; writing zeros leaves the other flags alone.
        self.timer.interrupt_registers().tifr.write(1 << ICF1);
    }

    /// Stop all capture activity.
    ///
    /// Zeroes both control registers, the counter and the capture
    /// register, and disables the capture interrupt. The registered
    /// callback and the pin direction are deliberately left in place so a
    /// later [`Icu::new`] resumes capturing without re-registration.
    pub fn deinit(&mut self) {
        let regs = self.timer.register_block();

        regs.tccr1a.write(0);
        regs.tccr1b.write(0);
        regs.tcnt1.write(0);
        regs.icr1.write(0);

        self.unlisten();

        debug!("ICU deinitialized");
    }

    /// Return the raw interface to the underlying timer instance.
    pub fn free(self) -> T {
        self.timer
    }
}

fn write_edge_select(regs: &tc1::RegisterBlock, edge: Edge) {
    critical_section::with(|_| {
        regs.tccr1b
            .modify(|r| (r & !(1 << ICES1)) | ((edge as u8) << ICES1));
    });
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::peripherals::port;

    struct MockTimer {
        timer: tc1::RegisterBlock,
        int: shared::RegisterBlock,
    }

    impl MockTimer {
        fn new() -> Self {
            Self {
                timer: tc1::RegisterBlock::default(),
                int: shared::RegisterBlock::default(),
            }
        }
    }

    impl<'a> crate::private::Sealed for &'a MockTimer {}

    impl<'a> Instance for &'a MockTimer {
        fn register_block(&self) -> &tc1::RegisterBlock {
            &self.timer
        }

        fn interrupt_registers(&self) -> &shared::RegisterBlock {
            &self.int
        }
    }

    fn icu<'a>(
        mock: &'a MockTimer,
        portd: &'a port::RegisterBlock,
        config: Config,
    ) -> Icu<'a, &'a MockTimer> {
        Icu::new(mock, GpioPin::new(portd), config)
    }

    #[test]
    fn init_programs_every_clock_source() {
        for (clock, encoding) in [
            (ClockSource::NoClock, 0),
            (ClockSource::Div1, 1),
            (ClockSource::Div8, 2),
            (ClockSource::Div64, 3),
            (ClockSource::Div256, 4),
            (ClockSource::Div1024, 5),
        ] {
            let mock = MockTimer::new();
            let portd = port::RegisterBlock::default();
            // Left-over waveform/noise-canceler bits must survive.
            mock.timer.tccr1b.write(0b1001_1000);

            let _icu = icu(
                &mock,
                &portd,
                Config {
                    edge: Edge::Rising,
                    clock,
                },
            );

            let tccr1b = mock.timer.tccr1b.read();
            assert_eq!(tccr1b & CS1_MASK, encoding);
            assert_eq!(tccr1b & (1 << ICES1), 1 << ICES1);
            assert_eq!(tccr1b & 0b1001_1000, 0b1001_1000);
        }
    }

    #[test]
    fn init_resets_counters_and_arms_interrupt() {
        let mock = MockTimer::new();
        let portd = port::RegisterBlock::default();
        mock.timer.tcnt1.write(0xBEEF);
        mock.timer.icr1.write(0x1234);
        portd.ddr.write(0xFF);
        // Another timer's interrupt enable must survive.
        mock.int.timsk.write(0b0000_0001);

        let _icu = icu(&mock, &portd, Config::default());

        assert_eq!(mock.timer.tccr1a.read(), (1 << FOC1A) | (1 << FOC1B));
        assert_eq!(mock.timer.tcnt1.read(), 0);
        assert_eq!(mock.timer.icr1.read(), 0);
        assert_eq!(mock.int.timsk.read(), (1 << TICIE1) | 0b0000_0001);
        assert!(!portd.ddr.bit_is_set(ICP1));
    }

    #[test]
    fn edge_select_touches_only_ices1() {
        let mock = MockTimer::new();
        let portd = port::RegisterBlock::default();

        let mut icu = icu(
            &mock,
            &portd,
            Config {
                edge: Edge::Falling,
                clock: ClockSource::Div64,
            },
        );

        let rest = mock.timer.tccr1b.read() & !(1 << ICES1);

        for edge in [Edge::Rising, Edge::Falling, Edge::Rising] {
            icu.set_edge_detection_type(edge);

            let tccr1b = mock.timer.tccr1b.read();
            assert_eq!(tccr1b & (1 << ICES1), (edge as u8) << ICES1);
            assert_eq!(tccr1b & !(1 << ICES1), rest);
        }
    }

    #[test]
    fn reset_counter_leaves_capture_value() {
        let mock = MockTimer::new();
        let portd = port::RegisterBlock::default();

        let mut icu = icu(&mock, &portd, Config::default());

        mock.timer.tcnt1.write(2500);
        mock.timer.icr1.write(1000);

        icu.reset_counter();

        assert_eq!(mock.timer.tcnt1.read(), 0);
        assert_eq!(icu.input_capture_value(), 1000);
    }

    #[test]
    fn listen_unlisten_toggle_only_the_capture_mask() {
        let mock = MockTimer::new();
        let portd = port::RegisterBlock::default();
        mock.int.timsk.write(0b0100_0010);

        let mut icu = icu(&mock, &portd, Config::default());
        assert_eq!(mock.int.timsk.read(), 0b0110_0010);

        icu.unlisten();
        assert_eq!(mock.int.timsk.read(), 0b0100_0010);

        icu.listen();
        assert_eq!(mock.int.timsk.read(), 0b0110_0010);
    }

    #[test]
    fn interrupt_flag_accessors() {
        let mock = MockTimer::new();
        let portd = port::RegisterBlock::default();

        let mut icu = icu(&mock, &portd, Config::default());
        assert!(!icu.is_interrupt_set());

        mock.int.tifr.write((1 << ICF1) | 0b0000_0100);
        assert!(icu.is_interrupt_set());

        // Only a 1 in the ICF1 position may be written; in hardware the
        // other flags are write-1-to-clear too.
        icu.clear_interrupt();
        assert_eq!(mock.int.tifr.read(), 1 << ICF1);
    }

    #[test]
    fn deinit_silences_the_unit() {
        let mock = MockTimer::new();
        let portd = port::RegisterBlock::default();
        mock.int.timsk.write(0b0000_0001);

        let mut icu = icu(
            &mock,
            &portd,
            Config {
                edge: Edge::Rising,
                clock: ClockSource::Div1024,
            },
        );
        mock.timer.tcnt1.write(42);
        mock.timer.icr1.write(7);

        icu.deinit();

        assert_eq!(mock.timer.tccr1a.read(), 0);
        assert_eq!(mock.timer.tccr1b.read(), 0);
        assert_eq!(mock.timer.tcnt1.read(), 0);
        assert_eq!(mock.timer.icr1.read(), 0);
        assert_eq!(mock.int.timsk.read(), 0b0000_0001);
    }

    #[test]
    fn clock_source_divisors() {
        assert_eq!(ClockSource::NoClock.divisor(), None);
        assert_eq!(ClockSource::Div1.divisor(), Some(1));
        assert_eq!(ClockSource::Div8.divisor(), Some(8));
        assert_eq!(ClockSource::Div64.divisor(), Some(64));
        assert_eq!(ClockSource::Div256.divisor(), Some(256));
        assert_eq!(ClockSource::Div1024.divisor(), Some(1024));
    }

    // The handler slot is process-wide, so everything that touches it
    // lives in this one test: dispatch with an empty slot, per-edge
    // invocation, and the slot surviving deinit.
    #[test]
    fn capture_dispatch_lifecycle() {
        static EDGES: AtomicUsize = AtomicUsize::new(0);

        fn on_edge() {
            EDGES.fetch_add(1, Ordering::SeqCst);
        }

        let mock = MockTimer::new();
        let portd = port::RegisterBlock::default();

        // An edge with nothing registered is a no-op.
        assert!(!capture_irq::CAPTURE_HANDLER.is_set());
        capture_irq::dispatch();
        assert_eq!(EDGES.load(Ordering::SeqCst), 0);

        let mut icu = icu(
            &mock,
            &portd,
            Config {
                edge: Edge::Rising,
                clock: ClockSource::Div8,
            },
        );
        icu.set_interrupt_handler(on_edge);

        let tccr1b = mock.timer.tccr1b.read();
        assert_eq!(tccr1b & CS1_MASK, 2);
        assert_eq!(tccr1b & (1 << ICES1), 1 << ICES1);

        // Rising edge with the counter at 1000: hardware latches ICR1,
        // then the interrupt dispatches the callback.
        mock.timer.tcnt1.write(1000);
        mock.timer.icr1.write(1000);
        capture_irq::dispatch();

        assert_eq!(EDGES.load(Ordering::SeqCst), 1);
        assert_eq!(icu.input_capture_value(), 1000);

        icu.reset_counter();
        assert_eq!(mock.timer.tcnt1.read(), 0);
        assert_eq!(icu.input_capture_value(), 1000);

        // One invocation per edge, in edge order.
        capture_irq::dispatch();
        capture_irq::dispatch();
        assert_eq!(EDGES.load(Ordering::SeqCst), 3);

        // Teardown masks the interrupt but keeps the handler registered,
        // so a re-init resumes dispatching without re-registration.
        icu.deinit();
        assert!(!mock.int.timsk.bit_is_set(TICIE1));
        assert!(capture_irq::CAPTURE_HANDLER.is_set());

        drop(icu);
        let portd2 = port::RegisterBlock::default();
        let _icu = icu_reinit(&mock, &portd2);
        capture_irq::dispatch();
        assert_eq!(EDGES.load(Ordering::SeqCst), 4);
    }

    fn icu_reinit<'a>(
        mock: &'a MockTimer,
        portd: &'a port::RegisterBlock,
    ) -> Icu<'a, &'a MockTimer> {
        icu(mock, portd, Config::default())
    }
}
