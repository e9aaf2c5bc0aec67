use clap::Parser;
use log::{debug, warn, LevelFilter};
use snafu::ErrorCompat;

mod args;
mod osa;

fn main() {
    let args = args::Args::parse();

    if args.verbose {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }
    debug!("main: arguments: {:?}", args);

    if let Err(e) = osa::run(&args) {
        warn!("main: error occured {:?}", e);
        eprintln!("An error occured: {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
