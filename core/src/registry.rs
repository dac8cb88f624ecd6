use std::collections::BTreeSet;
use std::fmt::Write;

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use ustr::Ustr;

use crate::codegen::{self, ArgLayout, Target};
use crate::config::{Config, KeyPolicy};
use crate::error::FormatError;
use crate::format;
use crate::statement::Location;
use crate::store::MappingStore;

/// Identifier of a log descriptor, 0 is never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(pub u32);

impl LogId {
    pub const INVALID: LogId = LogId(0);
}

/// Persisted description of a distinct log statement and its generated code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDescriptor {
    id: LogId,
    format: String,
    filename: Ustr,
    line: u32,
    unit: Ustr,
    symbol: String,
    signature: String,
    declaration: String,
    invocation: String,
    record: String,
    compress: String,
    decompress: String,
}

impl LogDescriptor {
    #[inline]
    pub fn id(&self) -> LogId {
        self.id
    }

    #[inline]
    pub fn format(&self) -> &str {
        &self.format
    }

    #[inline]
    pub fn filename(&self) -> Ustr {
        self.filename
    }

    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    #[inline]
    pub fn unit(&self) -> Ustr {
        self.unit
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Parameter list of the record function, without the format string.
    #[inline]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    #[inline]
    pub fn declaration(&self) -> &str {
        &self.declaration
    }

    #[inline]
    pub fn invocation(&self) -> &str {
        &self.invocation
    }

    #[inline]
    pub fn record(&self) -> &str {
        &self.record
    }

    #[inline]
    pub fn compress(&self) -> &str {
        &self.compress
    }

    #[inline]
    pub fn decompress(&self) -> &str {
        &self.decompress
    }

    pub(crate) fn with_id(self, id: LogId) -> Self {
        Self { id, ..self }
    }
}

/// A log statement found in a compilation unit.
#[derive(Debug, Clone)]
pub struct CallSite<'a> {
    pub format: &'a str,
    pub unit: Ustr,
    pub location: Location,
}

/// What the rewriter needs to replace a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: LogId,
    pub declaration: String,
    pub invocation: String,
    /// Number of dynamic arguments the format string expects.
    pub arity: usize,
}

#[derive(Debug)]
pub struct Registry<'a> {
    config: &'a Config,
    store: MappingStore,
}

impl<'a> Registry<'a> {
    pub fn new(config: &'a Config, store: MappingStore) -> Self {
        Self { config, store }
    }

    /// Returns the record function for the call site, generating code on the first encounter of its key.
    pub fn register(&mut self, site: &CallSite<'_>) -> Result<Registration, FormatError> {
        let types = format::argument_types(site.format)?;
        let layout = ArgLayout::new(&types);
        let signature = layout.signature();
        let symbol = symbol_for(self.config.key_policy, site.format, site.location);

        let count = self.store.count_signature(&signature);
        log::debug!("Signature ({signature}) used {count} time(s)");

        if let Some(desc) = self.store.lookup(&symbol) {
            return Ok(Registration {
                id: desc.id,
                declaration: desc.declaration.clone(),
                invocation: desc.invocation.clone(),
                arity: layout.arity(),
            });
        }

        let id = self.store.allocate_id();
        let filename = site.location.file;
        let target = Target {
            format: site.format,
            symbol: &symbol,
            filename: filename.as_str(),
            line: site.location.line,
        };
        let code = codegen::generate(&self.config.runtime, &layout, &target);
        let declaration = code.record.signature();
        let invocation = code.record.name.clone();

        log::debug!("Registered {id} for \"{}\" at {}", site.format, site.location);

        self.store.insert(LogDescriptor {
            id,
            format: site.format.to_owned(),
            filename,
            line: site.location.line,
            unit: site.unit,
            symbol,
            signature,
            declaration: declaration.clone(),
            invocation: invocation.clone(),
            record: code.record.to_string(),
            compress: code.compress.to_string(),
            decompress: code.decompress.to_string(),
        });

        Ok(Registration {
            id,
            declaration,
            invocation,
            arity: layout.arity(),
        })
    }

    /// Drops every descriptor of the unit so that it can be scanned again from scratch.
    pub fn clear_unit(&mut self, unit: Ustr) {
        let removed = self.store.remove_unit(unit);
        if removed > 0 {
            log::debug!("Cleared {removed} descriptor(s) of {unit}");
        }
    }

    /// Renders the record function definitions for the given descriptors, each preceded by its id declaration.
    pub fn record_definitions(&self, ids: &[LogId]) -> String {
        let ids: BTreeSet<_> = ids.iter().copied().collect();
        let mut out = String::new();
        for desc in ids.into_iter().filter_map(|id| self.store.get(id)) {
            // writing into a String cannot fail
            let _ = writeln!(out, "extern const uint32_t {};", codegen::id_name(&desc.symbol));
            out.push_str("inline ");
            out.push_str(&desc.record);
        }
        out
    }

    #[inline]
    pub fn config(&self) -> &'a Config {
        self.config
    }

    #[inline]
    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    #[inline]
    pub fn into_store(self) -> MappingStore {
        self.store
    }
}

/// Derives the C identifier suffix unique to the descriptor key of a call site.
pub fn symbol_for(policy: KeyPolicy, format: &str, location: Location) -> String {
    let mut symbol = String::from("_");
    mangle_into(&mut symbol, format);
    if policy == KeyPolicy::Location {
        symbol.push_str("__");
        mangle_into(&mut symbol, &location.file);
        symbol.push_str("__");
        let _ = write!(symbol, "{}", location.line);
    }
    symbol
}

fn mangle_into(out: &mut String, text: &str) {
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            let _ = write!(out, "_{:x}_", u32::from(c));
        }
    }
}
