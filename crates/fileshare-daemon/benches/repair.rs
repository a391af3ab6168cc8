//! Mirror synchronization benchmarks
//!
//! Benchmarks for measuring:
//! - Full repair over installations of growing size
//! - Incremental sync of one share shared with every user
//! - Store reads under the shared lock
//!
//! Run with: cargo bench --bench repair -p fileshare-daemon

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use fileshare_core::{Layout, ShareItem, UserConfig};
use fileshare_daemon::{MemoryFs, ShareStore, SyncEngine};

const ROOT: &str = "/srv/files";

/// `users` users, each sharing `shares` folders with every other user
fn installation(users: usize, shares: usize) -> (MemoryFs, Vec<UserConfig>) {
    let fs = MemoryFs::new();
    let layout = Layout::new(ROOT);

    let users = (0..users)
        .map(|u| {
            let mut user = UserConfig::new(format!("user{}", u));
            for s in 0..shares {
                let path = format!("projects/p{}", s);
                fs.write_file(&layout.home_dir(&user.username).join(&path).join("readme.txt"))
                    .expect("write fixture");

                let mut share = ShareItem::new(path);
                share.allow_local = true;
                share.assign_hash(&user.username);
                user.shares.push(share);
            }
            user
        })
        .collect();

    (fs, users)
}

/// Benchmark full repair at different installation sizes
fn bench_repair(c: &mut Criterion) {
    let mut group = c.benchmark_group("repair");
    group.sample_size(20);

    for users in [10, 50, 100] {
        let (fs, list) = installation(users, 4);
        let layout = Layout::new(ROOT);
        let engine = SyncEngine::new(&fs, &layout, &list);
        engine.repair();

        // Entries the repair has to verify
        group.throughput(Throughput::Elements((users * (users - 1) * 4) as u64));
        group.bench_with_input(BenchmarkId::new("users", users), &engine, |b, engine| {
            b.iter(|| black_box(engine.repair()))
        });
    }

    group.finish();
}

/// Benchmark re-syncing a single share visible to everyone
fn bench_share_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("share_refresh");

    for users in [10, 100, 500] {
        let (fs, list) = installation(users, 1);
        let layout = Layout::new(ROOT);
        let engine = SyncEngine::new(&fs, &layout, &list);
        let share = &list[0].shares[0];
        engine.sync_share_add(share, &list[0].username);

        group.throughput(Throughput::Elements(users as u64));
        group.bench_with_input(BenchmarkId::new("users", users), &engine, |b, engine| {
            b.iter(|| black_box(engine.sync_share_refresh(share, &list[0].username)))
        });
    }

    group.finish();
}

/// Benchmark lookups through the store
fn bench_store_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_reads");

    let (fs, mut list) = installation(200, 2);
    for (i, user) in list.iter_mut().enumerate() {
        user.ip_auth = vec![format!("10.0.{}.{}", i / 250, i % 250)];
    }
    let config = fileshare_core::GlobalConfig {
        users: list,
        files_path: ROOT.into(),
        ..Default::default()
    };
    let store = ShareStore::open(config, None, fs);
    let hash = store
        .get_user("user150")
        .ok()
        .and_then(|u| u.shares[0].hash().map(str::to_string))
        .expect("fixture share hash");

    group.bench_function("get_user", |b| {
        b.iter(|| black_box(store.get_user(black_box("USER150"))))
    });
    group.bench_function("get_user_by_ip", |b| {
        b.iter(|| black_box(store.get_user_by_ip(black_box("10.0.0.150:51000")).is_ok()))
    });
    group.bench_function("resolve_external", |b| {
        b.iter(|| black_box(store.resolve_external(black_box(&hash)).is_ok()))
    });

    group.finish();
}

criterion_group!(benches, bench_repair, bench_share_refresh, bench_store_reads);
criterion_main!(benches);
