//! Demo host: worker threads record nested scopes while the main thread
//! plays the render loop, then the published snapshot is printed as an
//! indented tree.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use tracing::info;

static STOP: AtomicBool = AtomicBool::new(false);

fn main() {
    init_tracing();
    init_deadlock_detection();

    framescope::set_enabled(true);
    framescope::mark_thread_primary();

    let workers: Vec<_> = (0..2)
        .map(|i| {
            thread::Builder::new()
                .name(format!("worker-{i}"))
                .spawn(worker_loop)
                .expect("failed to spawn worker")
        })
        .collect();

    for frame in 0..600u32 {
        {
            let _frame = framescope::scope("frame");
            {
                let _simulation = framescope::scope("simulation");
                {
                    let _collision = framescope::scope("collision");
                    thread::sleep(Duration::from_millis(2));
                }
                {
                    let _integration = framescope::scope("integration");
                    thread::sleep(Duration::from_millis(1));
                }
            }
            {
                let _render = framescope::scope("render");
                thread::sleep(Duration::from_millis(4));
            }
        }
        framescope::end_frame();

        if frame % 120 == 119 {
            print_snapshot();
        }
    }

    STOP.store(true, Ordering::Relaxed);
    for worker in workers {
        let _ = worker.join();
    }
    framescope::shutdown();
}

fn worker_loop() {
    while !STOP.load(Ordering::Relaxed) {
        let _job = framescope::scope("background_job");
        {
            let _decode = framescope::scope("asset_decode");
            thread::sleep(Duration::from_millis(2));
        }
        {
            let _upload = framescope::scope("asset_upload");
            thread::sleep(Duration::from_millis(1));
        }
    }
}

fn print_snapshot() {
    let snapshot = framescope::snapshot();
    info!("dropped events so far: {}", snapshot.dropped_events);
    println!("-- primary thread --");
    for row in &snapshot.primary {
        print_row(row);
    }
    println!("-- worker threads --");
    for row in &snapshot.workers {
        print_row(row);
    }
}

fn print_row(row: &framescope::SectionStats) {
    println!(
        "{:indent$}{:<20} {:>8.3} ms  {:>8.3} ms self  {:>5.1}% total  {:>5.1}% parent  {:>8.3} ms peak",
        "",
        row.name,
        row.avg_ms,
        row.avg_self_ms,
        row.total_pct,
        row.parent_pct,
        row.max_ms,
        indent = row.depth * 2,
    );
}

fn init_tracing() {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match tracing_subscriber::EnvFilter::try_new("info") {
            Ok(filter) => filter,
            Err(_) => tracing_subscriber::EnvFilter::new("error"),
        },
    };

    let _ = tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(filter)
        .try_init();
}

fn init_deadlock_detection() {
    #[cfg(debug_assertions)]
    {
        use std::{sync::Once, thread, time::Duration};

        static INIT: Once = Once::new();
        INIT.call_once(|| {
            thread::spawn(|| {
                loop {
                    thread::sleep(Duration::from_secs(10));
                    let deadlocks = parking_lot::deadlock::check_deadlock();
                    if deadlocks.is_empty() {
                        continue;
                    }

                    eprintln!("{} deadlocks detected", deadlocks.len());
                    for (idx, threads) in deadlocks.iter().enumerate() {
                        eprintln!("Deadlock #{}", idx);
                        for thread in threads {
                            eprintln!("Thread Id {:#?}", thread.thread_id());
                            eprintln!("{:?}", thread.backtrace());
                        }
                    }
                }
            });
        });
    }
}
