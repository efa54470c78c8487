//! The flat, colon-namespaced string maps plugins use to talk to each other.
//!
//! [`OptionStore`] is the external configuration surface (populated from ini
//! files, read and written by every plugin phase) plus the inter-plugin
//! communication channel. [`PropertyStore`] and [`CmdlineStore`] are the same
//! shape, used for the install-properties file and the kernel command line
//! respectively. All three are thin `BTreeMap` wrappers: `BTreeMap` rather
//! than `HashMap` so the phase-boundary debug dump below is reproducible
//! key order from one run to the next.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::{anyhow, Result};
use log::debug;

/// A `namespace:name -> value` string map.
#[derive(Debug, Default, Clone)]
pub struct KeyValueStore {
    inner: BTreeMap<String, String>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a value, failing if the key is absent.
    pub fn get(&self, key: &str) -> Result<&str> {
        self.inner
            .get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| anyhow!("option '{}' is not set", key))
    }

    /// Fetch a value, falling back to `default` if the key is absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.inner.get(key).map(|s| s.as_str()).unwrap_or(default)
    }

    pub fn get_opt(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(|s| s.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Store a value, overwriting (and dropping) whatever was there before.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), value.into());
    }

    /// Compose a key from a namespace and a field name, then store a value.
    pub fn put_formatted(&mut self, namespace: &str, name: &str, value: impl Into<String>) {
        let mut key = String::with_capacity(namespace.len() + name.len() + 1);
        let _ = write!(key, "{}:{}", namespace, name);
        self.put(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.inner.remove(key);
    }

    /// Parse a value as whitespace-separated tokens and call `f` with each
    /// token's index and text; stops early if `f` returns `false`.
    pub fn iterate_string_list(&self, key: &str, mut f: impl FnMut(usize, &str) -> bool) -> Result<()> {
        let value = self.get(key)?;
        for (i, tok) in value.split_whitespace().enumerate() {
            if !f(i, tok) {
                break;
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.inner.iter()
    }

    /// Write every key/value pair to the debug log, one line each, for the
    /// phase-boundary dump.
    pub fn dump(&self, label: &str) {
        for (k, v) in &self.inner {
            debug!("[{}] {} = {}", label, k, v);
        }
    }
}

pub type OptionStore = KeyValueStore;
pub type PropertyStore = KeyValueStore;
pub type CmdlineStore = KeyValueStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_is_err() {
        let store = OptionStore::new();
        assert!(store.get("base:install_disk").is_err());
    }

    #[test]
    fn get_or_falls_back() {
        let store = OptionStore::new();
        assert_eq!(store.get_or("base:reboot_target", ""), "");
    }

    #[test]
    fn put_overwrites() {
        let mut store = OptionStore::new();
        store.put("base:install_disk", "sda");
        store.put("base:install_disk", "nvme0n1");
        assert_eq!(store.get("base:install_disk").unwrap(), "nvme0n1");
    }

    #[test]
    fn put_formatted_composes_key() {
        let mut store = OptionStore::new();
        store.put_formatted("partition.boot", "device", "/dev/sda2");
        assert_eq!(store.get("partition.boot:device").unwrap(), "/dev/sda2");
    }

    #[test]
    fn iterate_string_list_short_circuits() {
        let mut store = OptionStore::new();
        store.put("base:partitions", "bootloader boot misc system cache factory data");
        let mut seen = Vec::new();
        store
            .iterate_string_list("base:partitions", |i, tok| {
                seen.push((i, tok.to_owned()));
                tok != "misc"
            })
            .unwrap();
        assert_eq!(
            seen,
            vec![
                (0, "bootloader".to_owned()),
                (1, "boot".to_owned()),
                (2, "misc".to_owned()),
            ]
        );
    }
}
