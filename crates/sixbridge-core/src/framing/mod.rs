//! Serial line framing.

pub mod slip;
