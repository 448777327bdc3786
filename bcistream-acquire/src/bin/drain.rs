//! Эталонный consumer: подключается к сегменту и семафорам по ключам,
//! вычитывает заполненные страницы и возвращает их producer.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use clap::Parser;
use log::{error, info, warn, LevelFilter};

use bcistream_acquire::{parse_key, DEFAULT_SEM_KEY, DEFAULT_SHM_KEY};

#[derive(Parser, Debug)]
#[command(
    name = "bcistream-drain",
    version = env!("CARGO_PKG_VERSION"),
    about = "Drain EEG sample pages from the shared ring",
    long_about = None,
)]
struct Cli {
    /// Ключ SysV сегмента (десятичный или 0x...)
    #[arg(long, value_parser = parse_key, default_value_t = DEFAULT_SHM_KEY)]
    shm_key: i32,
    /// Ключ набора семафоров (десятичный или 0x...)
    #[arg(long, value_parser = parse_key, default_value_t = DEFAULT_SEM_KEY)]
    sem_key: i32,
    /// Страниц в кольце (как у producer)
    #[arg(long, default_value = "3")]
    pages: usize,
    /// Сэмплов на странице (как у producer)
    #[arg(long, default_value = "256")]
    samples_per_page: usize,
    /// Печатать сэмплы в stdout
    #[arg(long)]
    print: bool,
    /// Интервал вывода статистики (секунды)
    #[arg(long, default_value = "5")]
    stats_interval: u64,
    /// Тихий режим (только ошибки)
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            LevelFilter::Error
        } else {
            LevelFilter::Info
        })
        .format_target(false)
        .format_timestamp_secs()
        .init();

    let stop = Arc::new(AtomicBool::new(false));
    let stop_ctrlc = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if stop_ctrlc.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        warn!("Ctrl+C received, draining posted pages...");
    }) {
        warn!("Failed to set Ctrl+C handler: {e}");
    }

    if let Err(e) = run(&cli, &stop) {
        error!("{e}");
        std::process::exit(1);
    }
}

#[cfg(target_os = "linux")]
fn run(
    cli: &Cli,
    stop: &AtomicBool,
) -> bcistream_acquire::AcquireResult<()> {
    use bcistream_acquire::drain_pages;
    use bcistream_transport::{RingLayout, SysvConsumer, SysvSegment, SysvSemaphores};

    let layout = RingLayout::new(cli.pages, cli.samples_per_page)?;
    let mut consumer = SysvConsumer::new(
        SysvSegment::attach(cli.shm_key, layout.segment_size())?,
        SysvSemaphores::attach(cli.sem_key)?,
        layout,
    )?;

    info!(
        "Draining shm=0x{:08X} sem=0x{:08X} ({} pages × {} samples)",
        cli.shm_key,
        cli.sem_key,
        layout.page_count(),
        layout.samples_per_page()
    );

    let stats_interval = Duration::from_secs(cli.stats_interval);
    let start = Instant::now();
    let mut last_stats = Instant::now();

    let stats = drain_pages(
        &mut consumer,
        stop,
        Duration::from_millis(200),
        |page, stats| {
            if cli.print {
                for s in page {
                    let [a, b, c, d] = s.0;
                    println!("{a} {b} {c} {d}");
                }
            }
            if last_stats.elapsed() >= stats_interval {
                info!(
                    "[ {:.0}s ] pages={} samples={} producer_dropped={}",
                    start.elapsed().as_secs_f64(),
                    stats.pages,
                    stats.samples,
                    stats.producer_dropped
                );
                last_stats = Instant::now();
            }
        },
    )?;

    // сегмент только отсоединяется; удалять его - дело producer
    info!(
        "Drained {} pages ({} samples); producer dropped {} samples",
        stats.pages, stats.samples, stats.producer_dropped
    );
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run(
    _cli: &Cli,
    _stop: &AtomicBool,
) -> bcistream_acquire::AcquireResult<()> {
    Err(bcistream_acquire::AcquireError::Config(
        "bcistream-drain needs SysV IPC (Linux)".to_string(),
    ))
}
