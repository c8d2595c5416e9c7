use std::io;
use symfile_core::config::{BlockSize, Config};
use symfile_core::host::{
    DirHost, FixedSeed, HostChannel, HostHandle, RecordingEngine, SeedRef, SeedSource,
};
use symfile_core::naming::ChunkName;
use symfile_core::seed::{dispose, initialize_seed, SeedOutcome};
use symfile_core::symbolize::symbolize_path;
use symfile_core::{Disposition, ErrorKind};

/// Host that counts calls and never serves anything.
#[derive(Default)]
struct CountingHost {
    calls: usize,
}

impl HostChannel for CountingHost {
    fn open(&mut self, _id: &str) -> io::Result<HostHandle> {
        self.calls += 1;
        Err(io::Error::from(io::ErrorKind::NotFound))
    }
    fn read(&mut self, _h: HostHandle, _buf: &mut [u8]) -> io::Result<usize> {
        self.calls += 1;
        Ok(0)
    }
    fn close(&mut self, _h: HostHandle) {
        self.calls += 1;
    }
}

struct PanickingSeed;

impl SeedSource for PanickingSeed {
    fn get_seed(&mut self, _capacity: usize) -> SeedRef {
        panic!("seed must not be queried when fork-server mode is off");
    }
}

#[test]
fn disabled_mode_touches_nothing() {
    let td = tempfile::tempdir().unwrap();
    let cfg = Config { guest_path: td.path().join("input"), ..Config::default() };
    let mut host = CountingHost::default();
    let mut engine = RecordingEngine::new();

    let out = initialize_seed(&cfg, &mut host, &mut PanickingSeed, &mut engine).unwrap();
    assert!(matches!(out, SeedOutcome::Disabled));
    assert_eq!(host.calls, 0);
    assert!(engine.variables.is_empty());
    assert!(!cfg.guest_path.exists());
}

#[test]
fn fork_server_seed_is_copied_and_symbolized() {
    let td = tempfile::tempdir().unwrap();
    let share = td.path().join("share");
    std::fs::create_dir(&share).unwrap();
    let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7) as u8).collect();
    std::fs::write(share.join("seed-0001"), &data).unwrap();

    let cfg = Config {
        fork_server: true,
        guest_path: td.path().join("input"),
        block_size: BlockSize::new(4096).unwrap(),
        ..Config::default()
    };
    let mut host = DirHost::new(&share);
    let mut seeds = FixedSeed::new("seed-0001");
    seeds.should_fork = true;
    let mut engine = RecordingEngine::new();

    let out = initialize_seed(&cfg, &mut host, &mut seeds, &mut engine).unwrap();
    let (seed, transfer, report) = match out {
        SeedOutcome::Symbolized { seed, transfer, report } => (seed, transfer, report),
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert!(seed.should_fork);
    assert_eq!(transfer.bytes, 10_000);
    assert_eq!(report.chunks, 3);
    assert_eq!(std::fs::read(&cfg.guest_path).unwrap(), data);

    let names: Vec<_> = engine.variables.iter().map(|v| ChunkName::parse(&v.name).unwrap()).collect();
    let expected_id = symfile_core::naming::clean_identifier(&cfg.guest_path.to_string_lossy());
    assert!(names.iter().all(|n| n.total == 3 && n.identifier == expected_id));
    assert_eq!(names.iter().map(|n| n.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(seeds.queries, 1);
}

#[test]
fn transfer_failure_is_reported_and_run_continues() {
    let td = tempfile::tempdir().unwrap();
    let cfg = Config { fork_server: true, guest_path: td.path().join("input"), ..Config::default() };
    let mut host = DirHost::new(td.path().join("share"));
    let mut engine = RecordingEngine::new();

    let out =
        initialize_seed(&cfg, &mut host, &mut FixedSeed::new("absent"), &mut engine).unwrap();
    assert_eq!(out.error().map(|e| e.kind()), Some(ErrorKind::TransferOpen));
    assert!(matches!(out, SeedOutcome::TransferFailed { .. }));
    assert!(!engine.is_terminated());
    assert!(engine.variables.is_empty());
    assert!(!cfg.guest_path.exists());
}

#[test]
fn transfer_failure_can_abort() {
    let td = tempfile::tempdir().unwrap();
    let cfg = Config {
        fork_server: true,
        guest_path: td.path().join("input"),
        on_transfer_error: Disposition::Abort,
        ..Config::default()
    };
    let mut host = DirHost::new(td.path());
    let mut engine = RecordingEngine::new();
    let err = initialize_seed(&cfg, &mut host, &mut FixedSeed::new("absent"), &mut engine)
        .unwrap_err();
    assert_eq!(err.code(), 1);
}

#[test]
fn symbolize_errors_terminate_the_state_by_default() {
    let td = tempfile::tempdir().unwrap();
    let cfg = Config::default();
    let mut engine = RecordingEngine::new();

    let err = symbolize_path(
        &td.path().join("gone"),
        "x",
        cfg.block_size,
        &mut engine,
        cfg.short_write,
    )
    .unwrap_err();
    let err = dispose(cfg.disposition(err.kind()), &mut engine, err).unwrap();
    assert_eq!(err.kind(), ErrorKind::Read);
    assert_eq!(engine.terminations.len(), 1);
    assert_eq!(engine.terminations[0].code, ErrorKind::Read.code());
    assert!(engine.terminations[0].message.starts_with("symbfile: could not open"));
}
