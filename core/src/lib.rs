pub mod aggregate;
pub mod codegen;
pub mod config;
pub mod cstring;
pub mod error;
pub mod format;
pub mod ir;
pub mod opts;
pub mod registry;
pub mod scanner;
pub mod statement;
pub mod store;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use config::Config;
use error::Result;
use registry::Registry;
use scanner::Scanner;
use store::MappingStore;
pub use ustr;

/// Rewrites every file into its output path and records the descriptors in the store.
///
/// The store is only written back when all the files were processed successfully.
pub fn process_files(config: &Config, store_path: &Path, files: &[PathBuf]) -> Result<()> {
    let store = MappingStore::load(store_path)?;
    log::info!("Loaded {} descriptor(s) from {}", store.len(), store_path.display());

    let mut registry = Registry::new(config, store);
    for file in files {
        log::info!("Processing {}...", file.display());
        let source = fs::read_to_string(file)?;
        let origin = ustr::ustr(&file.to_string_lossy());
        let rewritten = Scanner::new(&mut registry).rewrite(&source, origin)?;

        let output = output_path(file, &config.output_suffix);
        fs::write(&output, rewritten.source)?;
        log::info!("Replaced {} log statement(s), wrote {}", rewritten.calls, output.display());
    }

    for (signature, count) in registry.store().signatures() {
        log::debug!("({signature}) used {count} time(s)");
    }

    let store = registry.into_store();
    store.save(store_path)?;
    log::info!("Saved {} descriptor(s) to {}", store.len(), store_path.display());
    Ok(())
}

/// Merges the stores and writes the support file.
pub fn aggregate_stores(config: &Config, stores: &[PathBuf], output: &Path) -> Result<()> {
    let descriptors = aggregate::merge_files(stores)?;
    log::info!("Merged {} descriptor(s) from {} store(s)", descriptors.len(), stores.len());

    if let Some(parent) = output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    aggregate::write_support_file(BufWriter::new(File::create(output)?), &config.runtime, &descriptors)?;
    log::info!("Wrote {}", output.display());
    Ok(())
}

/// Appends the suffix to the file name, `test.i` becomes `test.ii`.
pub fn output_path(input: &Path, suffix: &str) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_output_suffix() {
        assert_eq!(output_path(Path::new("build/test.i"), "i"), Path::new("build/test.ii"));
        assert_eq!(output_path(Path::new("main.cc"), ".out"), Path::new("main.cc.out"));
    }
}
