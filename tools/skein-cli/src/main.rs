///
/// skein CLI - demonstrations of the skein concurrency runtime
///
/// Each command exercises one group of primitives on the global runtime:
/// - skein list: print the operation catalogue
/// - skein periodic: schedule a periodic callback and cancel it after N ticks
/// - skein futures: submit futures and show they finish in submission order
/// - skein locks: increment a shared counter under run_with_lock
/// - skein locals: show that thread-local values are per-thread
///

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use skein_runtime::{Config, Lock, Result, Value, operations, run_locked, run_with_lock, thread_local};
use tracing::{Level, debug, error};

#[derive(Parser)]
#[command(name = "skein")]
#[command(author, version, about = "Thread, lock, and timer utilities", long_about = None)]
struct Cli {
    /// Runtime configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log runtime events at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the runtime operations
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a periodic timer until it has fired a number of times
    Periodic {
        /// Interval between callbacks in milliseconds
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,

        /// Ticks to wait for before cancelling
        #[arg(long, default_value_t = 5)]
        ticks: u64,
    },

    /// Submit futures to the single-worker executor
    Futures {
        /// Number of futures to submit
        #[arg(long, default_value_t = 4)]
        count: u64,
    },

    /// Increment a shared counter from several threads under one lock
    Locks {
        /// Number of threads
        #[arg(long, default_value_t = 4)]
        threads: u64,

        /// Increments per thread
        #[arg(long, default_value_t = 1000)]
        iterations: u64,
    },

    /// Write and read thread-local values from two threads
    Locals,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(level)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    let _shutdown = skein_runtime::init(config)?;

    match cli.command {
        Commands::List { json } => list_operations(json),
        Commands::Periodic { interval_ms, ticks } => periodic(interval_ms, ticks),
        Commands::Futures { count } => futures(count),
        Commands::Locks { threads, iterations } => locks(threads, iterations),
        Commands::Locals => locals(),
    }
}

fn list_operations(json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(operations()).map_err(std::io::Error::from)?;
        println!("{}", text);
        return Ok(());
    }

    let width = operations().iter().map(|op| op.name.len()).max().unwrap_or(0);
    for op in operations() {
        println!("{:<width$}  {}", op.name, op.summary, width = width);
        println!("{:<width$}  {}", "", op.signature, width = width);
    }
    Ok(())
}

fn periodic(interval_ms: u64, ticks: u64) -> Result<()> {
    let fired = Arc::new(skein_runtime::monitor(0u64));
    let counter = Arc::clone(&fired);

    let timer = skein_runtime::schedule_periodic(
        move || {
            let mut count = counter.lock();
            *count += 1;
            println!("tick {}", *count);
            count.notify_all();
        },
        Duration::from_millis(interval_ms),
    )?;

    let mut count = fired.lock();
    while *count < ticks {
        count = skein_runtime::wait_on(count)?;
    }
    drop(count);

    skein_runtime::cancel_periodic(&timer);
    timer.join()?;
    println!(
        "cancelled after {} ticks at {}ms intervals",
        timer.ticks(),
        timer.interval().as_millis()
    );
    Ok(())
}

fn futures(count: u64) -> Result<()> {
    let finished = Arc::new(Mutex::new(Vec::new()));

    let mut pending = Vec::new();
    for index in 0..count {
        let finished = Arc::clone(&finished);
        // later futures sleep less, and still finish later
        let work = Duration::from_millis((count - index) * 10);
        pending.push(skein_runtime::submit_future(move || {
            std::thread::sleep(work);
            run_locked(Some(&*finished), |order| order.push(index))?;
            Ok::<u64, skein_runtime::ConcurrencyError>(index * index)
        })?);
    }

    for (index, future) in pending.into_iter().enumerate() {
        let square = future.get()??;
        println!("future {} -> {}", index, square);
    }

    let order = run_locked(Some(&*finished), |order| order.clone())?;
    println!("completion order: {:?}", order);
    Ok(())
}

fn locks(threads: u64, iterations: u64) -> Result<()> {
    let lock = Lock::new();
    let counter = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();
    for _ in 0..threads {
        let lock = lock.clone();
        let counter = Arc::clone(&counter);
        handles.push(skein_runtime::spawn(move || {
            for _ in 0..iterations {
                let step = run_with_lock(Some(&lock), || {
                    let seen = counter.load(Ordering::SeqCst);
                    std::thread::yield_now();
                    counter.store(seen + 1, Ordering::SeqCst);
                });
                if let Err(e) = step {
                    error!(error = %e, "increment failed");
                    return;
                }
            }
        })?);
    }

    for handle in &handles {
        handle.join()?;
        debug!(thread = handle.name(), "joined");
    }

    let total = counter.load(Ordering::SeqCst);
    println!(
        "{} threads x {} iterations -> counter = {} (expected {})",
        threads,
        iterations,
        total,
        threads * iterations
    );
    Ok(())
}

fn locals() -> Result<()> {
    thread_local::set("request", "main")?;

    let worker = skein_runtime::spawn(|| {
        println!("worker sees before set: {:?}", thread_local::get("request"));
        if let Err(e) = thread_local::set("request", Value::from("worker")) {
            error!(error = %e, "thread_local set failed");
            return;
        }
        println!("worker sees after set:  {:?}", thread_local::get("request"));
        println!("worker has request:     {}", thread_local::has("request"));
    })?;
    worker.join()?;

    println!("main sees:              {:?}", thread_local::get("request"));
    thread_local::delete("request");
    println!("main has after delete:  {}", thread_local::has("request"));
    Ok(())
}
