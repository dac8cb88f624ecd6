use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use auto_enums::auto_enum;
use serde::{Deserialize, Serialize};
use ustr::Ustr;

use crate::error::{Error, Result};
use crate::registry::{LogDescriptor, LogId};

/// Persistent state of the registry, shared between invocations through a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingStore {
    descriptors: BTreeMap<LogId, LogDescriptor>,
    keys: BTreeMap<String, LogId>,
    /// Sorted in descending order, the smallest id is reused first.
    free_ids: Vec<LogId>,
    signatures: BTreeMap<String, u32>,
}

impl MappingStore {
    /// Loads a store, a missing file yields an empty one.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No mapping store at {}, starting fresh", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let store: Self =
            serde_json::from_str(&contents).map_err(|err| Error::InvalidStore(path.to_owned(), err))?;
        store
            .validate()
            .map_err(|msg| Error::CorruptStore(path.to_owned(), msg))?;
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let contents =
            serde_json::to_string_pretty(self).map_err(|err| Error::InvalidStore(path.to_owned(), err))?;
        fs::write(path, contents)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), String> {
        if self.descriptors.contains_key(&LogId::INVALID) || self.free_ids.contains(&LogId::INVALID) {
            return Err("id 0 is reserved".to_owned());
        }
        for (id, desc) in &self.descriptors {
            if *id != desc.id() {
                return Err(format!("descriptor {} is stored under {id}", desc.id()));
            }
            if self.keys.get(desc.symbol()) != Some(id) {
                return Err(format!("descriptor {id} is missing from the key index"));
            }
        }
        if let Some((key, id)) = self.keys.iter().find(|(_, id)| !self.descriptors.contains_key(id)) {
            return Err(format!("key {key} points at unknown id {id}"));
        }
        if let Some(id) = self.free_ids.iter().find(|id| self.descriptors.contains_key(id)) {
            return Err(format!("free id {id} is in use"));
        }
        Ok(())
    }

    pub(crate) fn allocate_id(&mut self) -> LogId {
        match self.free_ids.pop() {
            Some(id) => id,
            None => LogId(self.next_id()),
        }
    }

    fn next_id(&self) -> u32 {
        let last = self.descriptors.keys().next_back().map_or(0, |id| id.0);
        last.max(u32::try_from(self.descriptors.len()).unwrap_or(u32::MAX)) + 1
    }

    pub(crate) fn insert(&mut self, desc: LogDescriptor) {
        self.keys.insert(desc.symbol().to_owned(), desc.id());
        self.descriptors.insert(desc.id(), desc);
    }

    pub fn lookup(&self, symbol: &str) -> Option<&LogDescriptor> {
        self.keys.get(symbol).and_then(|id| self.descriptors.get(id))
    }

    pub fn get(&self, id: LogId) -> Option<&LogDescriptor> {
        self.descriptors.get(&id)
    }

    /// Removes the descriptors of a compilation unit and frees their ids.
    pub(crate) fn remove_unit(&mut self, unit: Ustr) -> usize {
        let removed: Vec<_> = self
            .descriptors
            .values()
            .filter(|desc| desc.unit() == unit)
            .map(|desc| (desc.id(), desc.symbol().to_owned()))
            .collect();

        for (id, symbol) in &removed {
            self.descriptors.remove(id);
            self.keys.remove(symbol);
            self.free_ids.push(*id);
        }
        self.free_ids.sort_unstable_by(|a, b| b.cmp(a));
        self.free_ids.dedup();
        removed.len()
    }

    pub(crate) fn count_signature(&mut self, signature: &str) -> u32 {
        let count = self.signatures.entry(signature.to_owned()).or_default();
        *count += 1;
        *count
    }

    pub fn signature_count(&self, signature: &str) -> u32 {
        self.signatures.get(signature).copied().unwrap_or_default()
    }

    pub fn signatures(&self) -> impl Iterator<Item = (&str, u32)> {
        self.signatures.iter().map(|(sig, count)| (sig.as_str(), *count))
    }

    pub fn free_ids(&self) -> &[LogId] {
        &self.free_ids
    }

    /// Descriptors in id order, optionally restricted to a single compilation unit.
    #[auto_enum(Iterator)]
    pub fn descriptors(&self, unit: Option<Ustr>) -> impl Iterator<Item = &LogDescriptor> {
        match unit {
            Some(unit) => self.descriptors.values().filter(move |desc| desc.unit() == unit),
            None => self.descriptors.values(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use ustr::ustr;

    use super::*;
    use crate::config::Config;
    use crate::registry::{CallSite, Registry};
    use crate::statement::Location;

    fn populated() -> MappingStore {
        let config = Config::default();
        let mut registry = Registry::new(&config, MappingStore::default());
        for (format, line) in [("name=%s", 1), ("x=%d y=%lf", 2), ("plain", 3), ("gone", 4)] {
            let unit = if line == 4 { "other.cc" } else { "main.cc" };
            registry
                .register(&CallSite {
                    format,
                    unit: ustr(unit),
                    location: Location::new(ustr("main.cc"), line),
                })
                .unwrap();
        }
        registry.clear_unit(ustr("other.cc"));
        registry.into_store()
    }

    #[test]
    fn round_trip_through_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("mappings.json");

        let store = populated();
        assert_eq!(store.len(), 3);
        assert_eq!(store.free_ids(), [LogId(4)]);

        store.save(&path).unwrap();
        let loaded = MappingStore::load(&path).unwrap();
        assert_eq!(loaded, store);

        loaded.save(&path).unwrap();
        assert_eq!(MappingStore::load(&path).unwrap(), store);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MappingStore::load(&dir.path().join("missing.json")).unwrap();
        assert!(store.is_empty());
        assert_eq!(store, MappingStore::default());
    }

    #[test]
    fn reject_corrupt_stores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(MappingStore::load(&path), Err(Error::InvalidStore(..))));

        fs::write(&path, r#"{"descriptors": {}, "keys": {"_x": 3}, "free_ids": [], "signatures": {}}"#).unwrap();
        assert!(matches!(MappingStore::load(&path), Err(Error::CorruptStore(..))));

        fs::write(&path, r#"{"descriptors": {}, "keys": {}, "free_ids": [0], "signatures": {}}"#).unwrap();
        assert!(matches!(MappingStore::load(&path), Err(Error::CorruptStore(..))));
    }

    #[test]
    fn filter_descriptors_by_unit() {
        let mut store = populated();
        assert_eq!(store.descriptors(None).count(), 3);
        assert_eq!(store.descriptors(Some(ustr("main.cc"))).count(), 3);
        assert_eq!(store.descriptors(Some(ustr("other.cc"))).count(), 0);

        assert_eq!(store.remove_unit(ustr("main.cc")), 3);
        assert_eq!(store.free_ids(), [LogId(4), LogId(3), LogId(2), LogId(1)]);
        assert_eq!(store.allocate_id(), LogId(1));
    }
}
