//! Use-case services built on repository ports.

pub mod marketplace;
