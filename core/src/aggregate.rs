use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::codegen;
use crate::config::RuntimeNames;
use crate::error::{Error, Result};
use crate::ir::{self, Expr, Item};
use crate::registry::{LogDescriptor, LogId};
use crate::store::MappingStore;

const GUARD: &str = "LOGWEAVE_SUPPORT";

/// Merges per-unit stores into a single numbering.
///
/// Stores are visited in order and their descriptors in id order, final ids are assigned densely
/// starting from 1. Descriptors sharing a symbol are emitted once, unless their format strings
/// disagree.
pub fn merge<'s, I>(stores: I) -> Result<Vec<LogDescriptor>>
where
    I: IntoIterator<Item = (&'s Path, &'s MappingStore)>,
{
    let mut seen: HashMap<&str, (&str, &Path)> = HashMap::new();
    let mut merged = vec![];

    for (path, store) in stores {
        for desc in store.descriptors(None) {
            match seen.get(desc.symbol()) {
                Some((format, _)) if *format == desc.format() => {
                    log::debug!("Skipping duplicate {} from {}", desc.symbol(), path.display());
                }
                Some((format, first_store)) => {
                    return Err(Error::ConflictingDescriptor {
                        symbol: desc.symbol().to_owned(),
                        first: (*format).to_owned(),
                        first_store: first_store.to_path_buf(),
                        second: desc.format().to_owned(),
                        second_store: path.to_path_buf(),
                    });
                }
                None => {
                    seen.insert(desc.symbol(), (desc.format(), path));
                    let id = LogId(u32::try_from(merged.len() + 1).unwrap_or(u32::MAX));
                    merged.push(desc.clone().with_id(id));
                }
            }
        }
    }
    Ok(merged)
}

/// Loads and merges the stores at the given paths.
pub fn merge_files(paths: &[PathBuf]) -> Result<Vec<LogDescriptor>> {
    let stores = paths
        .iter()
        .map(|path| MappingStore::load(path))
        .collect::<Result<Vec<_>>>()?;
    merge(paths.iter().map(PathBuf::as_path).zip(&stores))
}

pub fn write_support_file<W: Write>(mut out: W, runtime: &RuntimeNames, descriptors: &[LogDescriptor]) -> Result<()> {
    out.write_all(ir::render(&support_items(runtime, descriptors)).as_bytes())?;
    Ok(())
}

/// Builds the support file consumed by the runtime and the decompressor.
pub fn support_items(runtime: &RuntimeNames, descriptors: &[LogDescriptor]) -> Vec<Item> {
    let directive = Item::Directive;
    let slots = descriptors.len() + 1;

    let mut items = vec![
        directive(format!("ifndef {GUARD}")),
        directive(format!("define {GUARD}")),
        Item::Blank,
    ];
    items.extend(runtime.includes.iter().map(|inc| directive(format!("include \"{inc}\""))));
    items.push(Item::Blank);
    items.extend(
        ["cstdint", "cstdio", "cstring", "fstream", "string"]
            .into_iter()
            .map(|inc| directive(format!("include <{inc}>"))),
    );
    items.extend([
        Item::Blank,
        directive("pragma GCC diagnostic push".to_owned()),
        directive("pragma GCC diagnostic ignored \"-Wunused-function\"".to_owned()),
        directive("pragma GCC diagnostic ignored \"-Wunused-variable\"".to_owned()),
        Item::Blank,
        Item::Comment("Format ids referenced by the record functions".to_owned()),
    ]);

    items.extend(descriptors.iter().map(|desc| Item::Const {
        ty: "uint32_t".to_owned(),
        name: codegen::id_name(desc.symbol()),
        value: Some(Expr::Int(desc.id().0 as usize)),
        external: true,
        comment: Some(format!("{}:{} \"{}\"", desc.filename(), desc.line(), desc.format())),
    }));
    items.push(Item::Blank);

    let functions = descriptors.iter().flat_map(|desc| {
        [
            Item::Verbatim(format!("inline {}", desc.record())),
            Item::Verbatim(desc.compress().to_owned()),
            Item::Verbatim(desc.decompress().to_owned()),
        ]
    });
    items.push(Item::Namespace {
        name: None,
        items: functions.collect(),
    });
    items.push(Item::Blank);

    let table = |decl: String, elements: Vec<Expr>| Item::Array { decl, elements };
    let with_null = |names: Vec<Expr>| -> Vec<Expr> { [Expr::raw("nullptr")].into_iter().chain(names).collect() };

    items.extend([
        table(
            format!("ssize_t (*compressFnArray[{slots}])({}* re, char* out)", runtime.entry),
            with_null(
                descriptors
                    .iter()
                    .map(|desc| Expr::ident(codegen::compress_fn_name(desc.symbol())))
                    .collect(),
            ),
        ),
        Item::Blank,
        table(
            format!("void (*decompressAndPrintFnArray[{slots}])(std::ifstream& in)"),
            with_null(
                descriptors
                    .iter()
                    .map(|desc| Expr::ident(codegen::decompress_fn_name(desc.symbol())))
                    .collect(),
            ),
        ),
        Item::Blank,
        Item::Comment("Format id to original format string".to_owned()),
        table(
            format!("const char* fmtId2Str[{slots}]"),
            with_null(descriptors.iter().map(|desc| Expr::str(desc.format())).collect()),
        ),
        Item::Blank,
        directive("pragma GCC diagnostic pop".to_owned()),
        Item::Blank,
        directive(format!("endif // {GUARD}")),
    ]);

    items
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use ustr::ustr;

    use super::*;
    use crate::config::{Config, KeyPolicy};
    use crate::registry::{CallSite, Registry};
    use crate::statement::Location;

    fn store_with(config: &Config, unit: &str, calls: &[(&str, u32)]) -> MappingStore {
        let mut registry = Registry::new(config, MappingStore::default());
        for &(format, line) in calls {
            registry
                .register(&CallSite {
                    format,
                    unit: ustr(unit),
                    location: Location::new(ustr(unit), line),
                })
                .unwrap();
        }
        registry.into_store()
    }

    #[test]
    fn renumber_colliding_ids() {
        let config = Config::default();
        let a = store_with(&config, "a.cc", &[("one %d", 1), ("two", 2)]);
        let b = store_with(&config, "b.cc", &[("three %s", 5)]);
        assert_eq!(b.get(LogId(1)).unwrap().format(), "three %s");

        let merged = merge([(Path::new("a.json"), &a), (Path::new("b.json"), &b)]).unwrap();
        let summary: Vec<_> = merged.iter().map(|desc| (desc.id(), desc.format())).collect();
        assert_eq!(summary, [(LogId(1), "one %d"), (LogId(2), "two"), (LogId(3), "three %s")]);

        let reversed = merge([(Path::new("b.json"), &b), (Path::new("a.json"), &a)]).unwrap();
        assert_eq!(reversed[0].format(), "three %s");
        assert_eq!(reversed[0].id(), LogId(1));
    }

    #[test]
    fn deduplicate_shared_descriptors() {
        let config = Config {
            key_policy: KeyPolicy::FormatString,
            ..Config::default()
        };
        let a = store_with(&config, "a.cc", &[("shared %d", 1), ("only a", 2)]);
        let b = store_with(&config, "b.cc", &[("shared %d", 9)]);

        let merged = merge([(Path::new("a.json"), &a), (Path::new("b.json"), &b)]).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].unit(), ustr("a.cc"));
    }

    #[test]
    fn clearing_a_unit_keeps_formats_of_other_stores() {
        let config = Config {
            key_policy: KeyPolicy::FormatString,
            ..Config::default()
        };
        let a = store_with(&config, "a.cc", &[("shared %d", 1)]);
        let mut registry = Registry::new(&config, store_with(&config, "b.cc", &[("shared %d", 4)]));
        registry.clear_unit(ustr("b.cc"));
        let b = registry.into_store();
        assert!(b.is_empty());
        assert_eq!(a.len(), 1);

        let merged = merge([(Path::new("a.json"), &a), (Path::new("b.json"), &b)]).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].format(), "shared %d");
        assert_eq!(merged[0].unit(), ustr("a.cc"));
    }

    #[test]
    fn reject_conflicting_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let a = store_with(&config, "a.cc", &[("hello", 1)]);

        let first = dir.path().join("a.json");
        let second = dir.path().join("b.json");
        a.save(&first).unwrap();
        let tampered = serde_json::to_string(&a).unwrap().replace("\"format\":\"hello\"", "\"format\":\"bye\"");
        std::fs::write(&second, tampered).unwrap();

        assert_matches!(
            merge_files(&[first.clone(), second.clone()]),
            Err(Error::ConflictingDescriptor { first: f, second: s, first_store, second_store, .. })
                if f == "hello" && s == "bye" && first_store == first && second_store == second
        );
    }

    #[test]
    fn render_support_file() {
        let config = Config::default();
        let store = store_with(&config, "a.cc", &[("x=%d", 3)]);
        let merged = merge([(Path::new("a.json"), &store)]).unwrap();

        let mut out = vec![];
        write_support_file(&mut out, &config.runtime, &merged).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("#ifndef LOGWEAVE_SUPPORT\n#define LOGWEAVE_SUPPORT\n\n#include \"FastLogger.h\"\n"));
        assert!(text.contains("extern const uint32_t __lw_id_x_3d__25_d__a_2e_cc__3 = 1; // a.cc:3 \"x=%d\"\n"));
        assert!(text.contains("namespace {\ninline void __lw_record_x_3d__25_d__a_2e_cc__3("));
        assert!(text.contains("inline ssize_t compressArgs_x_3d__25_d__a_2e_cc__3("));
        assert!(text.ends_with("#pragma GCC diagnostic pop\n\n#endif // LOGWEAVE_SUPPORT\n"));

        let tables = &text[text.find("ssize_t (*compressFnArray").unwrap()..];
        assert_eq!(
            tables,
            r#"ssize_t (*compressFnArray[2])(BufferUtils::UncompressedLogEntry* re, char* out) = {
    nullptr,
    compressArgs_x_3d__25_d__a_2e_cc__3
};

void (*decompressAndPrintFnArray[2])(std::ifstream& in) = {
    nullptr,
    decompressPrintArgs_x_3d__25_d__a_2e_cc__3
};

// Format id to original format string
const char* fmtId2Str[2] = {
    nullptr,
    "x=%d"
};

#pragma GCC diagnostic pop

#endif // LOGWEAVE_SUPPORT
"#
        );
    }

    #[test]
    fn render_empty_support_file() {
        let items = support_items(&RuntimeNames::default(), &[]);
        let text = ir::render(&items);
        assert!(text.contains("const char* fmtId2Str[1] = {\n    nullptr\n};"));
        assert!(text.contains("namespace {\n} // namespace\n"));
    }
}
