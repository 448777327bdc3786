use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use clap::Parser;
use log::{error, info, warn, LevelFilter};

use bcistream_acquire::{
    create_device, parse_key, AcquireConfig, AcquisitionPipeline, DeviceKind, RingSink,
    TransportKind, DEFAULT_SEM_KEY, DEFAULT_SHM_KEY,
};

#[derive(Parser, Debug)]
#[command(
    name = "bcistream-acquire",
    version = env!("CARGO_PKG_VERSION"),
    about = "Decode EEG headband payloads and stream samples into a shared page ring",
    long_about = None,
)]
struct Cli {
    /// Источник: sim, serial
    #[arg(short, long, default_value = "sim")]
    device: String,
    /// Символьное устройство гарнитуры (для serial), например /dev/rfcomm0
    #[arg(short, long)]
    path: Option<PathBuf>,
    /// Частота сэмплов симулятора, Гц
    #[arg(long, default_value = "256")]
    sim_rate: u32,
    /// Транспорт: sysv, file:<path>
    #[arg(short, long, default_value = "sysv")]
    transport: String,
    /// Ключ SysV сегмента (десятичный или 0x...)
    #[arg(long, value_parser = parse_key, default_value_t = DEFAULT_SHM_KEY)]
    shm_key: i32,
    /// Ключ набора семафоров (десятичный или 0x...)
    #[arg(long, value_parser = parse_key, default_value_t = DEFAULT_SEM_KEY)]
    sem_key: i32,
    /// Страниц в кольце (2-4)
    #[arg(long, default_value = "3")]
    pages: usize,
    /// Сэмплов на странице
    #[arg(long, default_value = "256")]
    samples_per_page: usize,
    /// Удалить SysV сегмент и семафоры при выходе
    #[arg(long)]
    remove_on_exit: bool,
    /// Ограничение захвата (секунды). По умолчанию: до Ctrl+C
    #[arg(short = 'D', long)]
    duration: Option<u64>,
    /// Интервал вывода статистики (секунды)
    #[arg(long, default_value = "5")]
    stats_interval: u64,
    /// Тихий режим (только ошибки)
    #[arg(short, long)]
    quiet: bool,
    /// Подробный вывод (телеметрия, debug)
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.quiet {
        LevelFilter::Error
    } else if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_target(false)
        .format_timestamp_secs()
        .init();

    let device: DeviceKind = match cli.device.parse() {
        Ok(d) => d,
        Err(e) => {
            error!("--device: {e}");
            std::process::exit(1);
        }
    };

    let transport: TransportKind = match cli.transport.parse() {
        Ok(t) => t,
        Err(e) => {
            error!("--transport: {e}");
            std::process::exit(1);
        }
    };

    let config = AcquireConfig {
        device,
        device_path: cli.path.clone(),
        sim_rate_hz: cli.sim_rate,
        transport,
        shm_key: cli.shm_key,
        sem_key: cli.sem_key,
        page_count: cli.pages,
        samples_per_page: cli.samples_per_page,
        remove_on_exit: cli.remove_on_exit,
        duration_secs: cli.duration,
        stats_interval_secs: cli.stats_interval,
    };

    if let Err(e) = config.validate() {
        error!("{e}");
        std::process::exit(1);
    }

    let device = match create_device(&config) {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to open device: {e}");
            std::process::exit(1);
        }
    };

    // сегмент недоступен - фатально только на старте
    let mut sink = match RingSink::open(&config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open transport: {e}");
            std::process::exit(1);
        }
    };

    let (pipeline, metrics) = AcquisitionPipeline::new(config.clone());
    let stop_flag: Arc<AtomicBool> = pipeline.stop_flag();

    let stop_ctrlc = stop_flag.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        if stop_ctrlc.swap(true, Ordering::SeqCst) {
            // Второй Ctrl+C - принудительный выход
            warn!("Force exit");
            std::process::exit(130);
        }
        warn!("Ctrl+C received, stopping after the current read...");
    }) {
        warn!("Failed to set Ctrl+C handler: {e}");
    }

    // Выводим конфигурацию
    let layout = match config.layout() {
        Ok(l) => l,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Device        : {}", config.device);
    if let Some(path) = &config.device_path {
        info!("  Device path   : {}", path.display());
    }
    info!("  Transport     : {}", config.transport);
    info!(
        "  Ring          : {} pages × {} samples ({} B)",
        layout.page_count(),
        layout.samples_per_page(),
        layout.segment_size()
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let session_start = Instant::now();
    let result = pipeline.run(device, &mut sink);

    // Сегмент отсоединяется в любом случае
    if let Err(e) = sink.close() {
        warn!("Failed to close transport: {e}");
    }

    if let Err(e) = result {
        error!("Acquisition failed: {e}");
        std::process::exit(1);
    }

    // --- Итоговая статистика ---
    let summary = metrics.summary(&session_start);
    info!("\n{summary}");

    if summary.samples_dropped > 0 {
        warn!(
            "⚠ {} samples dropped ({:.2}% loss). Consider: more --pages or a faster consumer",
            summary.samples_dropped, summary.drop_rate_pct
        );
    }

    if summary.rejected_payloads + summary.sub_packet_errors > 0 {
        warn!(
            "⚠ {} payloads and {} sub-packets discarded by the decoder",
            summary.rejected_payloads, summary.sub_packet_errors
        );
    }

    info!("✓ Acquisition complete");
}
