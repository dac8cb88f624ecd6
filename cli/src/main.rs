use error::Result;
use flexi_logger::{LogSpecification, Logger};
use logweave::opts::{Mode, Opts};

mod error;

fn main() {
    let opts = Opts::load("Log statement compiler for preprocessed C/C++ sources");

    let spec = if opts.verbose {
        LogSpecification::debug()
    } else {
        LogSpecification::info()
    };
    let _logger = Logger::with(spec).start().unwrap();

    match run(&opts) {
        Ok(()) => log::info!("Finished!"),
        Err(err) => {
            log::error!("{err}");
            std::process::exit(1);
        }
    }
}

fn run(opts: &Opts) -> Result<()> {
    match &opts.mode {
        Mode::Process { store, files } => logweave::process_files(&opts.config, store, files)?,
        Mode::Aggregate { output, stores } => logweave::aggregate_stores(&opts.config, stores, output)?,
    }
    Ok(())
}
