//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

fn main() {
    if let Err(err) = nodecache_cli::run() {
        eprintln!("nodecache: {err}");
        std::process::exit(1);
    }
}
