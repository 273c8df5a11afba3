//! # Bare-metal (`no_std`) input capture driver for the AVR ATmega16
//!
//! ## Overview
//!
//! The 16-bit Timer/Counter1 of the ATmega16 can latch its free-running
//! counter value into the input capture register the moment an edge is
//! detected on the ICP1 pin (PD6), and raise the `TIMER1 CAPT` interrupt.
//! This crate drives that unit: it programs the prescaler and edge
//! polarity, routes the capture interrupt to a registered callback, and
//! exposes the latched timestamp together with the usual counter controls.
//!
//! Typical uses are pulse-width and period measurement: capture one edge,
//! reset the counter, flip the edge polarity from inside the callback and
//! read the next capture as the elapsed tick count.
//!
//! ## Example
//!
//! ```rust,ignore
//! use atmega_icu::{
//!     gpio::GpioPin,
//!     icu::{ClockSource, Config, Edge, Icu},
//!     peripherals::{PORTD, TC1},
//! };
//!
//! fn on_edge() {
//!     // Runs in interrupt context, once per captured edge.
//! }
//!
//! let portd = unsafe { PORTD::steal() };
//! let icp1 = GpioPin::new(&portd);
//!
//! let mut icu = Icu::new(
//!     unsafe { TC1::steal() },
//!     icp1,
//!     Config {
//!         edge: Edge::Rising,
//!         clock: ClockSource::Div8,
//!     },
//! );
//! icu.set_interrupt_handler(on_edge);
//!
//! // ... later, inside or after the callback:
//! let ticks = icu.input_capture_value();
//! icu.reset_counter();
//! ```
//!
//! ## Feature Flags
#![doc = document_features::document_features!()]
#![no_std]
#![cfg_attr(target_arch = "avr", feature(abi_avr_interrupt))]

// MUST be the first module
mod fmt;

pub mod gpio;
pub mod icu;
pub mod peripherals;

pub(crate) mod private {
    pub trait Sealed {}
}
