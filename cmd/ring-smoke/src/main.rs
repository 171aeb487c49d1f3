//! Ring Engine End-to-End Smoke Test
//!
//! Exercises the six scenarios from the design's scenario table:
//!   S1 — NOP smoke
//!   S2 — EAGAIN -> POLL retry
//!   S3 — CQ overflow and drain
//!   S4 — Linked chain with failure propagation
//!   S5 — Linked timeout racing its subject
//!   S6 — Cancellation by user_data
//!
//! Run: ./target/release/ring-smoke

use std::sync::Arc;
use std::time::{Duration, Instant};

use ring_core::completion::CompletionEntry;
use ring_core::descriptor::{SubmissionDescriptor, SubmitFlags, UserData};
use ring_core::opcode;

use ring_engine::engine::{EngineDeps, EnterFlags};
use ring_engine::{Engine, EngineConfig};

use ring_rt::notifier::EventFdNotifier;
use ring_rt::poller::UringPoller;
use ring_rt::resource_table::ResourceTable;
use ring_rt::worker::FixedPool;

use ring_ops::StaticOpTable;

/// Files and buffers are never actually exercised by these scenarios
/// (fixed-file/fixed-buffer resolution is a documented scope cut), so the
/// resource table type parameters are arbitrary placeholders.
type TestEngine = Engine<i32, Vec<u8>>;

// ── Test harness (same shape as the gvthread workspace's other cmd/
// smoke tests: a running pass/fail tally, section headers, one-line
// exit code). ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn check(&mut self, name: &str, ok: bool, detail: &str) {
        self.total += 1;
        if ok {
            self.passed += 1;
            println!("  [{:2}] {:<52} PASS", self.total, name);
        } else {
            self.failed += 1;
            println!("  [{:2}] {:<52} FAIL: {}", self.total, name, detail);
        }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!("  Total: {}  Passed: {}  Failed: {}", self.total, self.passed, self.failed);
        println!("{}", LINE);
    }
}

fn setup_engine(config: EngineConfig) -> Arc<TestEngine> {
    let deps = EngineDeps {
        ops: Arc::new(StaticOpTable::new()),
        workers: Arc::new(FixedPool::sized_for_sq(config.sq_entries, 64)),
        poller: Arc::new(UringPoller::new(64).expect("build readiness poller")),
        notifier: Arc::new(EventFdNotifier::create().expect("create eventfd notifier")),
        files: Arc::new(ResourceTable::<i32>::new()),
        buffers: Arc::new(ResourceTable::<Vec<u8>>::new()),
    };
    TestEngine::setup(config, deps).expect("engine setup")
}

fn desc(op: u8, flags: u8, fd: i32, addr: u64, len: u32, off: u64, user_data: u64) -> SubmissionDescriptor {
    let mut d = SubmissionDescriptor::zeroed();
    d.opcode = op;
    d.flags = flags;
    d.fd = fd;
    d.addr = addr;
    d.len = len;
    d.off = off;
    d.user_data = user_data;
    d
}

/// Drive the dispatch loop until `target` completions have been issued or
/// `timeout` elapses. Unlike `Engine::enter`'s own `GETEVENTS` spin (which
/// gives up after a fixed number of busy passes, wrong for a scenario
/// that's waiting on a real wall-clock timer), this sleeps between passes
/// so a 50ms timeout actually gets 50ms of wall time to fire.
fn wait_for_completions(engine: &Arc<TestEngine>, target: u64, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        engine.drive_once();
        if engine.metrics().completions_issued() >= target {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn find(entries: &[CompletionEntry], user_data: u64) -> Option<CompletionEntry> {
    entries.iter().copied().find(|e| e.user_data() == UserData(user_data))
}

fn test_s1_nop(t: &mut TestRunner) {
    t.section("S1 — NOP smoke");

    let engine = setup_engine(EngineConfig::default());
    let task = engine.new_task();

    engine.submit(desc(opcode::NOP, 0, -1, 0, 0, 0, 0xDEAD_BEEF)).expect("submit nop");
    let submitted = engine.enter(1, 1, EnterFlags(EnterFlags::GETEVENTS), task).unwrap_or(0);
    t.check("submit accepted one entry", submitted == 1, &format!("submitted={submitted}"));

    let mut buf = [CompletionEntry::new(UserData::NONE, 0, 0); 4];
    let n = engine.reap(&mut buf);
    t.check("exactly one completion reaped", n == 1, &format!("n={n}"));

    match find(&buf[..n], 0xDEAD_BEEF) {
        Some(entry) => t.check("NOP result is 0", entry.result == 0, &format!("result={}", entry.result)),
        None => t.check("NOP completion present", false, "user_data 0xDEADBEEF not found"),
    }
}

fn test_s2_eagain_then_poll(t: &mut TestRunner) {
    t.section("S2 — EAGAIN -> POLL retry");

    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        t.check("create pipe", false, "pipe() failed");
        return;
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);

    let engine = setup_engine(EngineConfig::default());
    let task = engine.new_task();

    let mut read_buf = [0u8; 1];
    let write_byte = [b'x'];

    engine
        .submit(desc(opcode::READV, 0, read_fd, read_buf.as_mut_ptr() as u64, 1, 0, 1))
        .expect("submit readv");
    engine
        .submit(desc(opcode::WRITEV, 0, write_fd, write_byte.as_ptr() as u64, 1, 0, 2))
        .expect("submit writev");
    engine.enter(2, 0, EnterFlags(0), task).expect("accept batch");

    let completed = wait_for_completions(&engine, 2, Duration::from_secs(2));
    t.check("both ops completed", completed, "timed out waiting for 2 completions");

    let mut buf = [CompletionEntry::new(UserData::NONE, 0, 0); 4];
    let n = engine.reap(&mut buf);
    let readv = find(&buf[..n], 1);
    let writev = find(&buf[..n], 2);

    t.check(
        "readv result is 1 byte",
        readv.map(|e| e.result) == Some(1),
        &format!("readv={:?}", readv.map(|e| e.result)),
    );
    t.check(
        "writev result is 1 byte",
        writev.map(|e| e.result) == Some(1),
        &format!("writev={:?}", writev.map(|e| e.result)),
    );

    unsafe {
        libc::close(read_fd);
        libc::close(write_fd);
    }
}

fn test_s3_cq_overflow(t: &mut TestRunner) {
    t.section("S3 — CQ overflow and drain");

    let config = EngineConfig { cq_entries: 2, ..EngineConfig::default() };
    let engine = setup_engine(config);
    let task = engine.new_task();

    for i in 0..4u64 {
        engine.submit(desc(opcode::NOP, 0, -1, 0, 0, 0, i)).expect("submit nop");
    }
    engine.enter(4, 0, EnterFlags(0), task).expect("accept batch");

    t.check(
        "cq_overflow counter reached 2",
        engine.metrics().cq_overflow() == 2,
        &format!("cq_overflow={}", engine.metrics().cq_overflow()),
    );
    t.check("overflow flag is set", engine.cq_overflow_pending(), "flag not set after 4th NOP");

    let mut first_batch = [CompletionEntry::new(UserData::NONE, 0, 0); 2];
    let n1 = engine.reap(&mut first_batch);
    t.check("first reap drains 2 entries", n1 == 2, &format!("n1={n1}"));

    engine.enter(0, 0, EnterFlags(0), task).expect("drive drain pass");
    t.check("overflow flag clears after drain", !engine.cq_overflow_pending(), "flag still set");

    let mut second_batch = [CompletionEntry::new(UserData::NONE, 0, 0); 2];
    let n2 = engine.reap(&mut second_batch);
    t.check("second reap drains remaining 2 entries", n2 == 2, &format!("n2={n2}"));

    let mut seen: Vec<u64> = first_batch[..n1].iter().chain(second_batch[..n2].iter()).map(|e| e.user_data().0).collect();
    seen.sort();
    t.check("all four user_data values present", seen == vec![0, 1, 2, 3], &format!("{:?}", seen));
}

fn test_s4_linked_chain_failure(t: &mut TestRunner) {
    t.section("S4 — Linked chain with failure propagation");

    let engine = setup_engine(EngineConfig::default());
    let task = engine.new_task();

    // A: WRITEV against an invalid fd, fails at prepare time with EBADF.
    let a = desc(opcode::WRITEV, SubmitFlags::LINK, -1, 0, 0, 0, 10);
    // B: NOP, linked to A, should be cancelled when A fails.
    let b = desc(opcode::NOP, SubmitFlags::LINK, -1, 0, 0, 0, 11);
    // C: NOP, linked to B, should be cancelled transitively.
    let c = desc(opcode::NOP, 0, -1, 0, 0, 0, 12);

    engine.submit(a).expect("submit a");
    engine.submit(b).expect("submit b");
    engine.submit(c).expect("submit c");
    engine.enter(3, 0, EnterFlags(0), task).expect("accept batch");

    let mut buf = [CompletionEntry::new(UserData::NONE, 0, 0); 4];
    let n = engine.reap(&mut buf);
    t.check("all three chain members completed", n == 3, &format!("n={n}"));

    let ra = find(&buf[..n], 10);
    let rb = find(&buf[..n], 11);
    let rc = find(&buf[..n], 12);

    t.check("A fails with EBADF-class error", ra.map(|e| e.result < 0) == Some(true), &format!("{:?}", ra));
    t.check(
        "B cancelled with ECANCELED",
        rb.map(|e| e.result) == Some(-libc::ECANCELED),
        &format!("{:?}", rb),
    );
    t.check(
        "C cancelled with ECANCELED",
        rc.map(|e| e.result) == Some(-libc::ECANCELED),
        &format!("{:?}", rc),
    );
}

fn test_s5_linked_timeout_races_subject(t: &mut TestRunner) {
    t.section("S5 — Linked timeout racing its subject");

    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        t.check("create pipe", false, "pipe() failed");
        return;
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);

    let engine = setup_engine(EngineConfig::default());
    let task = engine.new_task();

    // A: POLL_ADD on a pipe nobody ever writes to — never becomes readable.
    let a = desc(opcode::POLL_ADD, SubmitFlags::LINK, read_fd, 0, 0, 0, 20);
    // B: LINK_TIMEOUT, 50ms relative (off=0 selects the wall-clock branch,
    // addr carries the duration in nanoseconds).
    let b = desc(opcode::LINK_TIMEOUT, 0, -1, 50_000_000, 0, 0, 21);

    engine.submit(a).expect("submit a");
    engine.submit(b).expect("submit b");
    engine.enter(2, 0, EnterFlags(0), task).expect("accept batch");

    let completed = wait_for_completions(&engine, 2, Duration::from_secs(2));
    t.check("both A and its linked timeout completed", completed, "timed out");

    let mut buf = [CompletionEntry::new(UserData::NONE, 0, 0); 4];
    let n = engine.reap(&mut buf);
    let ra = find(&buf[..n], 20);
    let rb = find(&buf[..n], 21);

    t.check(
        "subject cancelled with ECANCELED",
        ra.map(|e| e.result) == Some(-libc::ECANCELED),
        &format!("{:?}", ra),
    );
    t.check(
        "linked timeout fires with ETIME",
        rb.map(|e| e.result) == Some(-libc::ETIME),
        &format!("{:?}", rb),
    );

    unsafe {
        libc::close(read_fd);
        libc::close(write_fd);
    }
}

fn test_s6_cancel_by_user_data(t: &mut TestRunner) {
    t.section("S6 — Cancellation by user_data");

    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        t.check("create pipe", false, "pipe() failed");
        return;
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);

    let engine = setup_engine(EngineConfig::default());
    let task = engine.new_task();

    // A: unsatisfiable POLL_ADD, user_data=7.
    let a = desc(opcode::POLL_ADD, 0, read_fd, 0, 0, 0, 7);
    // B: ASYNC_CANCEL targeting user_data=7 (addr carries the target
    // user_data — a marshaling stand-in, per ring-engine::dispatch).
    let b = desc(opcode::ASYNC_CANCEL, 0, -1, 7, 0, 0, 8);

    engine.submit(a).expect("submit a");
    engine.submit(b).expect("submit b");
    engine.enter(2, 2, EnterFlags(EnterFlags::GETEVENTS), task).expect("accept batch");

    let mut buf = [CompletionEntry::new(UserData::NONE, 0, 0); 4];
    let n = engine.reap(&mut buf);
    let ra = find(&buf[..n], 7);
    let rb = find(&buf[..n], 8);

    t.check(
        "target cancelled with ECANCELED",
        ra.map(|e| e.result) == Some(-libc::ECANCELED),
        &format!("{:?}", ra),
    );
    t.check("ASYNC_CANCEL reports success", rb.map(|e| e.result) == Some(0), &format!("{:?}", rb));

    unsafe {
        libc::close(read_fd);
        libc::close(write_fd);
    }
}

fn main() {
    println!("=== Ring Engine End-to-End Smoke Test ===");

    let mut t = TestRunner::new();

    test_s1_nop(&mut t);
    test_s2_eagain_then_poll(&mut t);
    test_s3_cq_overflow(&mut t);
    test_s4_linked_chain_failure(&mut t);
    test_s5_linked_timeout_races_subject(&mut t);
    test_s6_cancel_by_user_data(&mut t);

    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
