use std::process::ExitCode;

use fluid_adsr::app;
use fluid_adsr::cli::Options;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Ensure all panics are logged properly before crashing.
    std::panic::set_hook(Box::new(|panic_info| {
        let (filename, line) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line()))
            .unwrap_or(("<unknown>", 0));
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic_info.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("<no message>");
        log::error!("CRASH in {}:{}: {}", filename, line, message);
        eprintln!("CRASH in {}:{}: {}", filename, line, message);
    }));

    let options = match Options::try_from_args(std::env::args_os()) {
        Ok(options) => options,
        Err(e) => {
            // Usage errors exit 1; --help and --version exit 0
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    if options.wants_driver_listing() {
        app::print_drivers();
        return ExitCode::SUCCESS;
    }

    match app::run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("[App] {e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
