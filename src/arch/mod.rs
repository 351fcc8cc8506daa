//! # Architecture Abstraction Layer
//!
//! Exception handlers and core-peripheral setup. Only the Cortex-M4 port
//! exists; the module is compiled for bare-metal ARM targets only, so the
//! rest of the kernel builds and tests on the host.

pub mod cortex_m4;
