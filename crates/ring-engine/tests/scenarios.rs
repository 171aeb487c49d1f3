//! End-to-end coverage of the six scenarios from the design's scenario
//! table, against a fully wired-up `Engine`. `cmd/ring-smoke` runs the
//! same scenarios as a human-readable report; this is the assertion-based
//! counterpart that CI actually gates on.

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

type TestEngine = Engine<i32, Vec<u8>>;

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

#[test]
fn s1_nop_completes_immediately() {
    let engine = setup_engine(EngineConfig::default());
    let task = engine.new_task();

    engine.submit(desc(opcode::NOP, 0, -1, 0, 0, 0, 0xDEAD_BEEF)).unwrap();
    let submitted = engine.enter(1, 1, EnterFlags(EnterFlags::GETEVENTS), task).unwrap();
    assert_eq!(submitted, 1);

    let mut buf = [CompletionEntry::new(UserData::NONE, 0, 0); 4];
    let n = engine.reap(&mut buf);
    assert_eq!(n, 1);
    assert_eq!(find(&buf[..n], 0xDEAD_BEEF).map(|e| e.result), Some(0));
}

#[test]
fn s2_eagain_resolves_via_poll_arm() {
    let mut fds = [0i32; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    let (read_fd, write_fd) = (fds[0], fds[1]);

    let engine = setup_engine(EngineConfig::default());
    let task = engine.new_task();

    let mut read_buf = [0u8; 1];
    let write_byte = [b'x'];

    engine.submit(desc(opcode::READV, 0, read_fd, read_buf.as_mut_ptr() as u64, 1, 0, 1)).unwrap();
    engine.submit(desc(opcode::WRITEV, 0, write_fd, write_byte.as_ptr() as u64, 1, 0, 2)).unwrap();
    engine.enter(2, 0, EnterFlags(0), task).unwrap();

    assert!(wait_for_completions(&engine, 2, Duration::from_secs(2)));

    let mut buf = [CompletionEntry::new(UserData::NONE, 0, 0); 4];
    let n = engine.reap(&mut buf);
    assert_eq!(find(&buf[..n], 1).map(|e| e.result), Some(1));
    assert_eq!(find(&buf[..n], 2).map(|e| e.result), Some(1));

    unsafe {
        libc::close(read_fd);
        libc::close(write_fd);
    }
}

#[test]
fn s3_cq_overflow_spills_and_drains() {
    let config = EngineConfig { cq_entries: 2, ..EngineConfig::default() };
    let engine = setup_engine(config);
    let task = engine.new_task();

    for i in 0..4u64 {
        engine.submit(desc(opcode::NOP, 0, -1, 0, 0, 0, i)).unwrap();
    }
    engine.enter(4, 0, EnterFlags(0), task).unwrap();

    assert_eq!(engine.metrics().cq_overflow(), 2);
    assert!(engine.cq_overflow_pending());

    let mut first_batch = [CompletionEntry::new(UserData::NONE, 0, 0); 2];
    assert_eq!(engine.reap(&mut first_batch), 2);

    engine.enter(0, 0, EnterFlags(0), task).unwrap();
    assert!(!engine.cq_overflow_pending());

    let mut second_batch = [CompletionEntry::new(UserData::NONE, 0, 0); 2];
    assert_eq!(engine.reap(&mut second_batch), 2);

    let mut seen: Vec<u64> = first_batch.iter().chain(second_batch.iter()).map(|e| e.user_data().0).collect();
    seen.sort();
    assert_eq!(seen, vec![0, 1, 2, 3]);
}

#[test]
fn s4_link_chain_cancels_on_predecessor_failure() {
    let engine = setup_engine(EngineConfig::default());
    let task = engine.new_task();

    let a = desc(opcode::WRITEV, SubmitFlags::LINK, -1, 0, 0, 0, 10);
    let b = desc(opcode::NOP, SubmitFlags::LINK, -1, 0, 0, 0, 11);
    let c = desc(opcode::NOP, 0, -1, 0, 0, 0, 12);

    engine.submit(a).unwrap();
    engine.submit(b).unwrap();
    engine.submit(c).unwrap();
    engine.enter(3, 0, EnterFlags(0), task).unwrap();

    let mut buf = [CompletionEntry::new(UserData::NONE, 0, 0); 4];
    let n = engine.reap(&mut buf);
    assert_eq!(n, 3);

    assert!(find(&buf[..n], 10).map(|e| e.result < 0).unwrap_or(false));
    assert_eq!(find(&buf[..n], 11).map(|e| e.result), Some(-libc::ECANCELED));
    assert_eq!(find(&buf[..n], 12).map(|e| e.result), Some(-libc::ECANCELED));
}

#[test]
fn s5_link_timeout_races_its_subject() {
    let mut fds = [0i32; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    let (read_fd, write_fd) = (fds[0], fds[1]);

    let engine = setup_engine(EngineConfig::default());
    let task = engine.new_task();

    let a = desc(opcode::POLL_ADD, SubmitFlags::LINK, read_fd, 0, 0, 0, 20);
    let b = desc(opcode::LINK_TIMEOUT, 0, -1, 50_000_000, 0, 0, 21);

    engine.submit(a).unwrap();
    engine.submit(b).unwrap();
    engine.enter(2, 0, EnterFlags(0), task).unwrap();

    assert!(wait_for_completions(&engine, 2, Duration::from_secs(2)));

    let mut buf = [CompletionEntry::new(UserData::NONE, 0, 0); 4];
    let n = engine.reap(&mut buf);
    assert_eq!(find(&buf[..n], 20).map(|e| e.result), Some(-libc::ECANCELED));
    assert_eq!(find(&buf[..n], 21).map(|e| e.result), Some(-libc::ETIME));

    unsafe {
        libc::close(read_fd);
        libc::close(write_fd);
    }
}

#[test]
fn register_surface_probe_files_and_personality() {
    let engine = setup_engine(EngineConfig::default());

    let mut opcodes = engine.probe();
    opcodes.sort_unstable();
    assert_eq!(opcodes, vec![opcode::NOP, opcode::READV, opcode::WRITEV, opcode::POLL_ADD]);

    engine.register_files(vec![Some(3), None, Some(5)]).unwrap();
    engine.register_files_update(vec![(1, Some(9))]).unwrap();

    let id = engine.register_personality(0xCAFE).unwrap();
    assert_eq!(engine.personality(id), Some(0xCAFE));
    engine.unregister_personality(id).unwrap();
    assert_eq!(engine.personality(id), None);
    assert!(engine.unregister_personality(id).is_err());
}

#[test]
fn s6_async_cancel_by_user_data() {
    let mut fds = [0i32; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    let (read_fd, write_fd) = (fds[0], fds[1]);

    let engine = setup_engine(EngineConfig::default());
    let task = engine.new_task();

    let a = desc(opcode::POLL_ADD, 0, read_fd, 0, 0, 0, 7);
    let b = desc(opcode::ASYNC_CANCEL, 0, -1, 7, 0, 0, 8);

    engine.submit(a).unwrap();
    engine.submit(b).unwrap();
    engine.enter(2, 2, EnterFlags(EnterFlags::GETEVENTS), task).unwrap();

    let mut buf = [CompletionEntry::new(UserData::NONE, 0, 0); 4];
    let n = engine.reap(&mut buf);
    assert_eq!(find(&buf[..n], 7).map(|e| e.result), Some(-libc::ECANCELED));
    assert_eq!(find(&buf[..n], 8).map(|e| e.result), Some(0));

    unsafe {
        libc::close(read_fd);
        libc::close(write_fd);
    }
}
