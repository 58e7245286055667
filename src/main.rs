use std::path::Path;
use std::process::ExitCode;

use cv_interop::config;
use cv_interop::persistence::{AnyArray, load_any};
use cv_interop::{CvContext, logging};

fn print_usage() {
    eprintln!("Usage: cv_interop inspect <storage-file> [name]");
    eprintln!("  Load an array from a storage file and describe it.");
    eprintln!("  Settings are read from ./settings.yaml when present.");
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return if args.is_empty() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        };
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        eprintln!("cv_interop {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let (file, name) = match args.as_slice() {
        [cmd, file] if cmd == "inspect" => (file, None),
        [cmd, file, name] if cmd == "inspect" => (file, Some(name.as_str())),
        _ => {
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let settings = match config::load_settings(Path::new(".")) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ERROR: Failed to load settings: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&settings.log_filter) {
        eprintln!("ERROR: {e}");
        return ExitCode::FAILURE;
    }

    // The shared backend runs the library's initialisers in this process.
    let ctx = match unsafe { CvContext::from_settings(&settings) } {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: Failed to bind native library: {e}");
            return ExitCode::FAILURE;
        }
    };

    let loaded = match load_any(&ctx, Path::new(file), None, name) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("ERROR: Failed to load {file}: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("name: {}", loaded.real_name);
    println!("kind: {}", loaded.value.kind().name());
    match &loaded.value {
        AnyArray::MatND(m) => {
            println!("sizes: {:?}", m.sizes());
            println!("depth: {:?}", m.depth());
            println!("channels: {}", m.channels());
            println!("bytes: {}", m.bytes_allocated().unwrap_or(0));
        }
        AnyArray::Mat(m) => {
            println!("sizes: {:?}", [m.rows(), m.cols()]);
            println!("depth: {:?}", m.depth());
            println!("channels: {}", m.channels());
            println!("bytes: {}", m.bytes_allocated().unwrap_or(0));
        }
    }

    ExitCode::SUCCESS
}
