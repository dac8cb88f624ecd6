use ustr::UstrSet;

/// How call sites are grouped into log descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPolicy {
    /// One descriptor per format string, file and line.
    #[default]
    Location,
    /// Every call site with the same format string shares a descriptor.
    ///
    /// Clearing a unit drops the descriptors it registered first, so each unit needs a store of its own.
    FormatString,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_function: String,
    /// Index of the format string among the log function arguments.
    pub format_arg_index: usize,
    pub key_policy: KeyPolicy,
    /// Logical files whose log statements are left untouched.
    pub ignored_files: UstrSet,
    /// Header that has to be entered before the first log statement of a unit, the runtime header by default.
    pub support_header: Option<String>,
    pub injected_file: String,
    pub generated_file: String,
    pub output_suffix: String,
    pub runtime: RuntimeNames,
}

impl Default for Config {
    fn default() -> Self {
        let runtime = RuntimeNames::default();
        Self {
            log_function: "FAST_LOG".to_owned(),
            format_arg_index: 0,
            key_policy: KeyPolicy::default(),
            ignored_files: UstrSet::default(),
            support_header: runtime.includes.first().cloned(),
            injected_file: "injectedCode.fake".to_owned(),
            generated_file: "generatedCode.h".to_owned(),
            output_suffix: "i".to_owned(),
            runtime,
        }
    }
}

/// Symbols of the logging runtime referenced by generated code.
#[derive(Debug, Clone)]
pub struct RuntimeNames {
    pub entry: String,
    pub nibble: String,
    pub reserve_alloc: String,
    pub finish_alloc: String,
    pub record_primitive: String,
    pub pack: String,
    pub unpack: String,
    pub timestamp: String,
    pub includes: Vec<String>,
}

impl Default for RuntimeNames {
    fn default() -> Self {
        Self {
            entry: "BufferUtils::UncompressedLogEntry".to_owned(),
            nibble: "BufferUtils::TwoNibbles".to_owned(),
            reserve_alloc: "NanoLog::__internal_reserveAlloc".to_owned(),
            finish_alloc: "NanoLog::__internal_finishAlloc".to_owned(),
            record_primitive: "BufferUtils::recordPrimitive".to_owned(),
            pack: "BufferUtils::pack".to_owned(),
            unpack: "BufferUtils::unpack".to_owned(),
            timestamp: "PerfUtils::Cycles::rdtsc".to_owned(),
            includes: vec!["FastLogger.h".to_owned(), "Packer.h".to_owned()],
        }
    }
}
