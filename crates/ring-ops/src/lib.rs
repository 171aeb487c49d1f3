//! Example `OpHandler` implementations: `NOP`, `READV`, `WRITEV`, and
//! `POLL_ADD`.
//!
//! Nothing in `ring-core`, `ring-rt`, or `ring-engine` depends on this
//! crate — it exists only so the workspace has a buildable op set to
//! exercise the scenarios the engine's dispatch loop is built around
//! (plain completion, `EAGAIN` → poll-arm retry, worker fallback). An
//! embedder is expected to register its own handlers for whatever opcode
//! surface it actually needs; these four are not meant to be a complete
//! I/O vocabulary.
//!
//! `TIMEOUT`, `LINK_TIMEOUT`, and `ASYNC_CANCEL` are deliberately absent
//! here — `ring_engine::dispatch` handles those three opcodes itself
//! (they drive the Timeout Service and Cancellation Registry, not an I/O
//! primitive), so no `OpHandler` is ever looked up for them.
//!
//! `READV`/`WRITEV` read the descriptor's `addr`/`len` pair as a single
//! flat buffer rather than a real `struct iovec` array — genuine
//! scatter/gather marshaling is part of the out-of-scope op surface (§1),
//! so this is a single-buffer stand-in, same spirit as one-entry
//! `readv`/`writev`.

use std::io;

use ring_core::descriptor::SubmissionDescriptor;
use ring_core::error::{EngineError, Result};
use ring_core::op::{IssueStatus, OpCaps, OpHandler, OpTable, PrepareStatus};
use ring_core::request::Request;

/// `prepare`-time state for `READV`/`WRITEV`, stashed in
/// `Request::async_context` since `issue`/`cleanup` never see the
/// descriptor again.
struct BufState {
    addr: u64,
    len: u32,
}

pub struct NopHandler;

impl OpHandler for NopHandler {
    fn caps(&self) -> OpCaps {
        OpCaps::new(0)
    }

    fn prepare(&self, _request: &mut Request, _descriptor: &SubmissionDescriptor) -> PrepareStatus {
        PrepareStatus::Ok
    }

    fn issue(&self, _request: &mut Request, _force_nonblock: bool) -> IssueStatus {
        IssueStatus::Done(0)
    }
}

pub struct ReadvHandler;

impl OpHandler for ReadvHandler {
    fn caps(&self) -> OpCaps {
        OpCaps::new(
            OpCaps::NEEDS_FILE | OpCaps::SUPPORTS_POLL_READABLE | OpCaps::MAY_BLOCK | OpCaps::HASH_BY_FILE,
        )
    }

    fn prepare(&self, request: &mut Request, descriptor: &SubmissionDescriptor) -> PrepareStatus {
        if request.fd < 0 {
            return PrepareStatus::Fail(-libc::EBADF);
        }
        request.async_context = Some(Box::new(BufState { addr: descriptor.addr, len: descriptor.len }));
        PrepareStatus::Ok
    }

    fn issue(&self, request: &mut Request, _force_nonblock: bool) -> IssueStatus {
        let state = request
            .async_context
            .as_ref()
            .and_then(|ctx| ctx.downcast_ref::<BufState>())
            .expect("prepare always populates async_context before issue runs");

        if state.len == 0 {
            return IssueStatus::Done(0);
        }

        let ret = unsafe { libc::read(request.fd, state.addr as *mut libc::c_void, state.len as usize) };
        issue_result(ret)
    }
}

pub struct WritevHandler;

impl OpHandler for WritevHandler {
    fn caps(&self) -> OpCaps {
        OpCaps::new(
            OpCaps::NEEDS_FILE | OpCaps::SUPPORTS_POLL_WRITABLE | OpCaps::MAY_BLOCK | OpCaps::HASH_BY_FILE,
        )
    }

    fn prepare(&self, request: &mut Request, descriptor: &SubmissionDescriptor) -> PrepareStatus {
        if request.fd < 0 {
            return PrepareStatus::Fail(-libc::EBADF);
        }
        request.async_context = Some(Box::new(BufState { addr: descriptor.addr, len: descriptor.len }));
        PrepareStatus::Ok
    }

    fn issue(&self, request: &mut Request, _force_nonblock: bool) -> IssueStatus {
        let state = request
            .async_context
            .as_ref()
            .and_then(|ctx| ctx.downcast_ref::<BufState>())
            .expect("prepare always populates async_context before issue runs");

        if state.len == 0 {
            return IssueStatus::Done(0);
        }

        let ret = unsafe { libc::write(request.fd, state.addr as *const libc::c_void, state.len as usize) };
        issue_result(ret)
    }
}

fn issue_result(ret: isize) -> IssueStatus {
    if ret >= 0 {
        return IssueStatus::Done(ret as i32);
    }
    let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
    if errno == libc::EAGAIN || errno == libc::EWOULDBLOCK {
        IssueStatus::WouldBlock
    } else {
        IssueStatus::Done(-errno)
    }
}

/// Waits for fd readiness with no I/O of its own: the first `issue` call
/// always reports `WouldBlock`, which is exactly what sends the
/// dispatcher down the generic poll-arm path (§4.5); once the readiness
/// poller wakes it and `issue` runs a second time, it reports done. The
/// interest direction is fixed at `SUPPORTS_POLL_READABLE` — watching for
/// writability instead would need a second, distinct opcode, since
/// `OpHandler::caps` is a process-wide, per-opcode property rather than
/// something a single descriptor can vary (§9 "Global state").
pub struct PollAddHandler;

struct PollAddState {
    waited_once: bool,
}

impl OpHandler for PollAddHandler {
    fn caps(&self) -> OpCaps {
        OpCaps::new(OpCaps::SUPPORTS_POLL_READABLE)
    }

    fn prepare(&self, request: &mut Request, _descriptor: &SubmissionDescriptor) -> PrepareStatus {
        if request.fd < 0 {
            return PrepareStatus::Fail(-libc::EBADF);
        }
        request.async_context = Some(Box::new(PollAddState { waited_once: false }));
        PrepareStatus::Ok
    }

    fn issue(&self, request: &mut Request, _force_nonblock: bool) -> IssueStatus {
        let state = request
            .async_context
            .as_mut()
            .and_then(|ctx| ctx.downcast_mut::<PollAddState>())
            .expect("prepare always populates async_context before issue runs");

        if !state.waited_once {
            state.waited_once = true;
            return IssueStatus::WouldBlock;
        }
        IssueStatus::Done(0)
    }
}

/// Maps the four opcodes this crate supplies to their handlers. Built
/// once at engine `SETUP` and never mutated afterward (§9 "Global
/// state").
pub struct StaticOpTable {
    nop: NopHandler,
    readv: ReadvHandler,
    writev: WritevHandler,
    poll_add: PollAddHandler,
}

impl Default for StaticOpTable {
    fn default() -> Self {
        Self { nop: NopHandler, readv: ReadvHandler, writev: WritevHandler, poll_add: PollAddHandler }
    }
}

impl StaticOpTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OpTable for StaticOpTable {
    fn handler(&self, opcode: u8) -> Result<&dyn OpHandler> {
        match opcode {
            ring_core::opcode::NOP => Ok(&self.nop),
            ring_core::opcode::READV => Ok(&self.readv),
            ring_core::opcode::WRITEV => Ok(&self.writev),
            ring_core::opcode::POLL_ADD => Ok(&self.poll_add),
            other => Err(EngineError::Unsupported(other)),
        }
    }

    fn supported_opcodes(&self) -> Vec<u8> {
        vec![
            ring_core::opcode::NOP,
            ring_core::opcode::READV,
            ring_core::opcode::WRITEV,
            ring_core::opcode::POLL_ADD,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring_core::descriptor::{SubmitFlags, UserData};
    use ring_core::request::{RequestId, TaskId};

    fn fresh_request(fd: i32) -> Request {
        let mut r = Request::new(RequestId(0), 0, SubmitFlags::from_bits(0), UserData(1), TaskId(1));
        r.fd = fd;
        r
    }

    #[test]
    fn nop_completes_with_zero() {
        let handler = NopHandler;
        let mut r = fresh_request(-1);
        let desc = SubmissionDescriptor::zeroed();
        assert_eq!(handler.prepare(&mut r, &desc), PrepareStatus::Ok);
        assert_eq!(handler.issue(&mut r, true), IssueStatus::Done(0));
    }

    #[test]
    fn readv_rejects_negative_fd() {
        let handler = ReadvHandler;
        let mut r = fresh_request(-1);
        let desc = SubmissionDescriptor::zeroed();
        assert_eq!(handler.prepare(&mut r, &desc), PrepareStatus::Fail(-libc::EBADF));
    }

    #[test]
    fn poll_add_reports_would_block_then_done() {
        let handler = PollAddHandler;
        let mut r = fresh_request(0);
        let desc = SubmissionDescriptor::zeroed();
        assert_eq!(handler.prepare(&mut r, &desc), PrepareStatus::Ok);
        assert_eq!(handler.issue(&mut r, true), IssueStatus::WouldBlock);
        assert_eq!(handler.issue(&mut r, true), IssueStatus::Done(0));
    }

    #[test]
    fn static_op_table_resolves_known_opcodes() {
        let table = StaticOpTable::new();
        assert!(table.handler(ring_core::opcode::NOP).is_ok());
        assert!(table.handler(ring_core::opcode::READV).is_ok());
        assert!(table.handler(ring_core::opcode::WRITEV).is_ok());
        assert!(table.handler(ring_core::opcode::POLL_ADD).is_ok());
        assert!(table.handler(ring_core::opcode::TIMEOUT).is_err());
    }

    #[test]
    fn probe_lists_exactly_the_four_registered_opcodes() {
        let table = StaticOpTable::new();
        let mut opcodes = table.supported_opcodes();
        opcodes.sort_unstable();
        assert_eq!(
            opcodes,
            vec![ring_core::opcode::NOP, ring_core::opcode::READV, ring_core::opcode::WRITEV, ring_core::opcode::POLL_ADD]
        );
    }
}
