//! Wire-protocol engines and the transports underneath them (SPEC_FULL.md §4).
//!
//! Each submodule is grounded on the matching piece of
//! `examples/farlepet-testeq-rs/src/protocol/` where one exists (`onc`/`vxi11` on its
//! `vxi11` module, `tcp_socket`/`vicp`/`serial` on `scpi_tcp.rs`/`scpi_serial.rs`) and
//! built from scratch against the `crate::transport` capability traits where the
//! teacher had no precedent (`hislip`, `usbtmc`, `gpib`).

pub mod framing;
pub mod gpib;
pub mod hislip;
pub mod onc;
pub mod tcp_socket;
pub mod usbtmc;
pub mod vicp;
pub mod vxi11;

#[cfg(feature = "serial")]
pub mod serial;
