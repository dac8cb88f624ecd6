use std::path::PathBuf;

use ustr::{UstrSet, ustr};

use crate::config::{Config, KeyPolicy};

#[derive(Clone, Debug)]
pub enum Mode {
    /// Rewrite preprocessed sources and record their descriptors in a store.
    Process { store: PathBuf, files: Vec<PathBuf> },
    /// Merge stores into the support file of the runtime.
    Aggregate { output: PathBuf, stores: Vec<PathBuf> },
}

#[derive(Clone, Debug)]
pub struct Opts {
    pub config: Config,
    pub verbose: bool,
    pub mode: Mode,
}

impl Opts {
    pub fn load(header: &'static str) -> Self {
        use bpaf::*;

        let log_function = long("log-function")
            .help("Name of the logging function to replace")
            .argument::<String>("NAME")
            .fallback("FAST_LOG".to_owned());
        let format_arg_index = long("format-arg")
            .help("Index of the format string among the log function arguments")
            .argument::<usize>("INDEX")
            .fallback(0);
        let key_by_format = long("key-by-format")
            .help("Share descriptors between call sites with the same format string")
            .switch();
        let ignored_files = long("ignore")
            .help("Logical file whose log statements are left untouched")
            .argument::<String>("FILE")
            .many()
            .map(|files| files.iter().map(|file| ustr(file)).collect::<UstrSet>());
        let support_header = long("support-header")
            .help("Header that has to be included before the first log statement, FastLogger.h by default")
            .argument::<String>("HEADER")
            .optional();
        let no_support_header = long("no-support-header")
            .help("Allow log statements before any support header was included")
            .switch();

        let config = construct!(
            log_function,
            format_arg_index,
            key_by_format,
            ignored_files,
            support_header,
            no_support_header
        )
        .map(
            |(log_function, format_arg_index, key_by_format, ignored_files, support_header, no_support_header)| {
                let defaults = Config::default();
                Config {
                    log_function,
                    format_arg_index,
                    key_policy: if key_by_format {
                        KeyPolicy::FormatString
                    } else {
                        KeyPolicy::Location
                    },
                    ignored_files,
                    support_header: support_header
                        .or(defaults.support_header.clone())
                        .filter(|_| !no_support_header),
                    ..defaults
                }
            },
        );
        let verbose = short('v').long("verbose").help("Enable debug output").switch();

        let store = short('s')
            .long("store")
            .help("Mapping store to update")
            .argument::<PathBuf>("STORE");
        let files = positional::<PathBuf>("FILES").some("expected at least one preprocessed file");
        let process = construct!(Mode::Process { store, files })
            .to_options()
            .descr("Rewrite preprocessed sources")
            .command("process");

        let output = short('o')
            .long("output")
            .help("Support file to write")
            .argument::<PathBuf>("OUTPUT");
        let stores = positional::<PathBuf>("STORES").some("expected at least one mapping store");
        let aggregate = construct!(Mode::Aggregate { output, stores })
            .to_options()
            .descr("Merge mapping stores into a support file")
            .command("aggregate");

        let mode = construct!([process, aggregate]);

        construct!(Opts { config, verbose, mode })
            .to_options()
            .descr(header)
            .run()
    }
}
