//! Intersection Simulation Library
//!
//! A signalized four-way intersection with emergency vehicle preemption,
//! simulated tick by tick without any rendering.

pub mod simulation;
