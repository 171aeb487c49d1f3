//! Opcode byte assignments (§8: "Use implementation-defined opcode
//! constants ... substitute the engine's chosen values").
//!
//! Three of these — `TIMEOUT`, `LINK_TIMEOUT`, `ASYNC_CANCEL` — are
//! handled by the dispatcher itself rather than through a registered
//! `OpHandler` (see `ring_engine::dispatch`): they drive the Timeout
//! Service, Link Graph, and Cancellation subsystems directly, the same
//! way `IORING_OP_TIMEOUT`/`IORING_OP_ASYNC_CANCEL` are special-cased
//! inside the source rather than routed through a generic fop table.
//! The rest are ordinary pluggable ops implemented in `ring-ops`.

pub const NOP: u8 = 0;
pub const READV: u8 = 1;
pub const WRITEV: u8 = 2;
pub const POLL_ADD: u8 = 3;
pub const TIMEOUT: u8 = 4;
pub const LINK_TIMEOUT: u8 = 5;
pub const ASYNC_CANCEL: u8 = 6;
