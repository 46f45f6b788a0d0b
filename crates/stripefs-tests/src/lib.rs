//! StripeFS integration tests.
//!
//! Exercises the request engine end to end over the in-memory job adapter:
//! full request round trips, FIFO serialization of contended objects,
//! failure injection, and property tests over arbitrary completion codes.

pub mod harness;

mod failure_tests;
mod proptest_machine;
mod scheduling_tests;
