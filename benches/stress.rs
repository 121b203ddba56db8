use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ulid::Ulid;

use deskbook::model::{Amenities, Ms, WorkspaceKind, WorkspaceParams};
use deskbook::org::OrgManager;
use deskbook::sidecar::LogOnly;
use deskbook::{Actor, Engine, EngineError, Role};

const HOUR: Ms = 3_600_000; // 1 hour in ms

fn bench_dir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("deskbook_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).expect("create bench dir");
    dir
}

fn desk(name: &str) -> WorkspaceParams {
    WorkspaceParams {
        name: name.into(),
        location: "bench".into(),
        kind: WorkspaceKind::Desk,
        capacity: 1,
        open_min: 0,
        close_min: 1440,
        hourly_rate_cents: None,
        image_url: None,
        amenities: Amenities::default(),
    }
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential(engine: &Engine, admin: &Actor) {
    let wid = Ulid::new();
    engine
        .create_workspace(admin, wid, desk("seq"))
        .await
        .unwrap();
    let user = Actor::new(Ulid::new(), Role::General);

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let s = (i as Ms) * HOUR;
        let t = Instant::now();
        engine
            .create_booking(&user, wid, s, s + HOUR, None)
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent(engine: Arc<Engine>, admin: &Actor) {
    let n_tasks = 10;
    let n_per_task = 200;

    // One workspace per task so writers never contend on a lock.
    let mut workspaces = Vec::new();
    for i in 0..n_tasks {
        let wid = Ulid::new();
        engine
            .create_workspace(admin, wid, desk(&format!("conc-{i}")))
            .await
            .unwrap();
        workspaces.push(wid);
    }

    let start = Instant::now();
    let mut handles = Vec::new();

    for wid in workspaces {
        let engine = engine.clone();
        let user = Actor::new(Ulid::new(), Role::General);
        handles.push(tokio::spawn(async move {
            for j in 0..n_per_task {
                let s = (j as Ms) * HOUR;
                engine
                    .create_booking(&user, wid, s, s + HOUR, None)
                    .await
                    .unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_read_under_load(engine: Arc<Engine>, admin: &Actor) {
    // Pre-fill a workspace the readers will query.
    let read_wid = Ulid::new();
    engine
        .create_workspace(admin, read_wid, desk("read-target"))
        .await
        .unwrap();
    let filler = Actor::new(Ulid::new(), Role::General);
    for i in 0..200 {
        let s = (i as Ms) * HOUR;
        engine
            .create_booking(&filler, read_wid, s, s + HOUR, None)
            .await
            .unwrap();
    }

    // Writer tasks keep appending on their own workspaces in the background.
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let engine = engine.clone();
        let stop = stop.clone();
        let wid = Ulid::new();
        engine
            .create_workspace(admin, wid, desk(&format!("writer-{w}")))
            .await
            .unwrap();
        writer_handles.push(tokio::spawn(async move {
            let user = Actor::new(Ulid::new(), Role::General);
            let mut i: Ms = 0;
            while !stop.load(Ordering::Relaxed) {
                let s = i * HOUR;
                let _ = engine.create_booking(&user, wid, s, s + HOUR, None).await;
                i += 1;
            }
        }));
    }

    // Reader tasks measure availability latency on the shared workspace.
    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();

    for r in 0..n_readers {
        let engine = engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let s = (((r * reads_per_reader + i) % 400) as Ms) * HOUR;
                let t = Instant::now();
                engine
                    .is_available(read_wid, s, s + HOUR, None)
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("availability query", &mut all_latencies);
}

async fn phase4_contention_storm(engine: Arc<Engine>, admin: &Actor) {
    // Every task fights over the same hourly slots on one workspace; exactly
    // one writer may win each slot, the rest must see Conflict.
    let wid = Ulid::new();
    engine
        .create_workspace(admin, wid, desk("storm"))
        .await
        .unwrap();

    let n_tasks = 50;
    let slots = 10;
    let won = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..n_tasks {
        let engine = engine.clone();
        let won = won.clone();
        let lost = lost.clone();
        let user = Actor::new(Ulid::new(), Role::General);
        handles.push(tokio::spawn(async move {
            for i in 0..slots {
                let s = (i as Ms) * HOUR;
                match engine.create_booking(&user, wid, s, s + HOUR, None).await {
                    Ok(_) => {
                        won.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(EngineError::Conflict(_)) => {
                        lost.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let won = won.load(Ordering::Relaxed);
    let lost = lost.load(Ordering::Relaxed);
    assert_eq!(won, slots, "each slot must be won exactly once");
    println!(
        "  {n_tasks} tasks x {slots} slots: {won} won, {lost} conflicts in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let dir = bench_dir();
    println!("=== deskbook stress benchmark ===");
    println!("data dir: {}\n", dir.display());

    let orgs = OrgManager::new(dir.clone(), u64::MAX, Arc::new(LogOnly));
    let admin = Actor::new(Ulid::new(), Role::Admin);

    println!("[phase 1] sequential write throughput");
    let engine = orgs.get_or_create("bench-seq").unwrap();
    phase1_sequential(&engine, &admin).await;

    println!("\n[phase 2] concurrent write throughput");
    let engine = orgs.get_or_create("bench-conc").unwrap();
    phase2_concurrent(engine, &admin).await;

    println!("\n[phase 3] read latency under write load");
    let engine = orgs.get_or_create("bench-read").unwrap();
    phase3_read_under_load(engine, &admin).await;

    println!("\n[phase 4] contention storm");
    let engine = orgs.get_or_create("bench-storm").unwrap();
    phase4_contention_storm(engine, &admin).await;

    let _ = std::fs::remove_dir_all(&dir);
    println!("\n=== benchmark complete ===");
}
