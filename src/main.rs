//! `appxunpack`: validates a package and unpacks it into a directory, or
//! lists the entries of its ZIP container.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use appx_unpack::heap::default_heap;
use appx_unpack::package::FOOTPRINT_FILES;
use appx_unpack::{Cli, FileMode, FileStream, Handle, Status, ZipEntry, ZipObject, api};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flags.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.list {
        list_files(Path::new(&cli.package), cli.verbose)?;
        return Ok(ExitCode::SUCCESS);
    }

    let source = PathBuf::from(&cli.package);
    let destination = PathBuf::from(cli.destination.as_deref().unwrap_or("."));
    let (unpack_policy, validation_policy) = (cli.unpack_policy(), cli.validation_policy());
    let status = run_bounded(cli.timeout.map(Duration::from_secs), move || {
        api::unpack_package(
            unpack_policy,
            validation_policy,
            Some(source.as_path()),
            Some(destination.as_path()),
        )
    })?;

    if status.is_ok() {
        if !cli.is_quiet() {
            println!("unpacked {}", cli.package);
        }
        return Ok(ExitCode::SUCCESS);
    }

    if !cli.is_very_quiet() {
        eprintln!("appxunpack: failed with status {status}");
        eprint!("{}", drain_log());
    }
    Ok(ExitCode::FAILURE)
}

/// Run `job` on a blocking thread, giving up after `limit`.
///
/// The runtime is shut down without waiting for the blocking thread, so a
/// timed-out job is abandoned rather than joined.
fn run_bounded<F>(limit: Option<Duration>, job: F) -> Result<Status>
where
    F: FnOnce() -> Status + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start the async runtime")?;

    let outcome = runtime.block_on(async {
        let task = tokio::task::spawn_blocking(job);
        match limit {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .with_context(|| format!("unpack did not finish within {}s", limit.as_secs_f64()))?
                .context("unpack task failed"),
            None => task.await.context("unpack task failed"),
        }
    });
    runtime.shutdown_background();
    outcome
}

/// Fetch and clear the diagnostic log through the boundary.
fn drain_log() -> String {
    let mut text = None;
    let status = api::get_log_text(&default_heap(), &mut text);
    match text {
        Some(buffer) if status.is_ok() => buffer.to_string_lossy(),
        _ => format!("(diagnostic log unavailable: {status})\n"),
    }
}

/// Print the container's entries: bare names, or with `-v` a table that
/// also marks which parts belong to the package footprint.
fn list_files(path: &Path, verbose: bool) -> Result<()> {
    let stream = Handle::from_stream(FileStream::open(path, FileMode::Read)?);
    let container = ZipObject::open(stream)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let entries = container.entries();

    if !verbose {
        entries.iter().for_each(|entry| println!("{}", entry.file_name));
        return Ok(());
    }

    let rule = "-".repeat(78);
    println!(
        "{:>10}  {:>10}  {:>5}  {:<9}  {:<16}  Name",
        "Length", "Packed", "Saved", "Kind", "Modified"
    );
    println!("{rule}");
    for entry in entries {
        let (year, month, day) = entry.mod_date();
        let (hour, minute, _) = entry.mod_time();
        println!(
            "{:>10}  {:>10}  {:>5}  {:<9}  {year:04}-{month:02}-{day:02} {hour:02}:{minute:02}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            saved(entry.compressed_size, entry.uncompressed_size),
            kind(entry),
            entry.file_name
        );
    }

    let files: Vec<&ZipEntry> = entries.iter().filter(|e| !e.is_directory).collect();
    let length: u64 = files.iter().map(|e| e.uncompressed_size).sum();
    let packed: u64 = files.iter().map(|e| e.compressed_size).sum();
    println!("{rule}");
    println!(
        "{length:>10}  {packed:>10}  {:>5}  {} files, {}",
        saved(packed, length),
        files.len(),
        format_size(length)
    );
    Ok(())
}

fn kind(entry: &ZipEntry) -> &'static str {
    if entry.is_directory {
        "directory"
    } else if FOOTPRINT_FILES.contains(&entry.file_name.as_str()) {
        "footprint"
    } else {
        "payload"
    }
}

/// Share of the original size removed by compression.
fn saved(compressed: u64, uncompressed: u64) -> String {
    match uncompressed {
        0 => "0%".to_string(),
        _ => format!("{}%", 100 - compressed.min(uncompressed) * 100 / uncompressed),
    }
}

fn format_size(size: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if size < 1024 {
        return format!("{size} bytes");
    }
    let mut value = size as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
