//! Loading the combined ini configuration into the flat [`OptionStore`], and
//! lifting the `base` and `partition.<name>` sections out of it into typed
//! structs.
//!
//! The ini file's sections and keys flatten directly onto the option
//! store's `section:key` namespacing (`[partition.boot]` + `len` becomes
//! `partition.boot:len`), so loading is a single pass with no intermediate
//! representation. Per-partition structs are then hand-built with
//! `anyhow::Context` on every fallible field, rather than deriving
//! `Deserialize` straight from ini - ini's flat sections don't carry the
//! typed-table structure that would make a derive worthwhile.

use anyhow::{bail, Context, Result};
use ini::Ini;
use log::debug;

use crate::options::OptionStore;
use crate::partition::{parse_flags, PartitionMode, PartitionSpec, PartitionType};

/// Load one or more comma-separated ini file paths and flatten them all
/// into a single [`OptionStore`]. Later files override earlier ones key by
/// key, matching ini's own last-one-wins semantics within a single file.
pub fn load_combined_ini(paths: &str) -> Result<OptionStore> {
    let mut store = OptionStore::new();
    for path in paths.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        debug!("loading configuration from {}", path);
        let ini = Ini::load_from_file(path).with_context(|| format!("failed to load ini file '{}'", path))?;
        for (section, properties) in ini.iter() {
            let section = section.unwrap_or("");
            if section.is_empty() {
                continue;
            }
            for (key, value) in properties.iter() {
                store.put_formatted(section, key, value);
            }
        }
    }
    Ok(store)
}

/// The `[base]` section, lifted out of the option store into typed fields.
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub partitions: Vec<String>,
    pub bootimages: Vec<String>,
    pub reboot_target: String,
    pub interactive_mode: bool,
    pub bootloader: Option<String>,
    pub install_disk: Option<String>,
    pub ota: Option<String>,
    pub disk_bus: Option<String>,
}

impl BaseConfig {
    pub fn from_store(store: &OptionStore) -> Result<Self> {
        let partitions: Vec<String> = store
            .get("base:partitions")
            .context("'base:partitions' must list at least one partition entry")?
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        if partitions.is_empty() {
            bail!("'base:partitions' is empty");
        }
        let bootimages = store
            .get_opt("base:bootimages")
            .map(|v| v.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default();
        let reboot_target = store.get_or("base:reboot_target", "").to_owned();
        let interactive_mode = matches!(store.get_opt("base:interactive_mode"), Some("1" | "true"));
        Ok(BaseConfig {
            partitions,
            bootimages,
            reboot_target,
            interactive_mode,
            bootloader: store.get_opt("base:bootloader").map(str::to_owned),
            install_disk: store.get_opt("base:install_disk").map(str::to_owned),
            ota: store.get_opt("base:ota").map(str::to_owned),
            disk_bus: store.get_opt("base:disk_bus").map(str::to_owned),
        })
    }
}

/// Parse one `[partition.<name>]` section out of the store.
pub fn partition_spec_from_store(store: &OptionStore, name: &str) -> Result<PartitionSpec> {
    let ns = format!("partition.{}", name);
    let get = |field: &str| store.get(&format!("{}:{}", ns, field));

    let ptype = PartitionType::parse(get("type").with_context(|| format!("'{}:type' is required", ns))?)?;
    let len_mib: i64 = get("len")
        .with_context(|| format!("'{}:len' is required", ns))?
        .parse()
        .with_context(|| format!("'{}:len' is not a valid integer", ns))?;
    let mode = PartitionMode::parse(get("mode").with_context(|| format!("'{}:mode' is required", ns))?)?;
    let flags = match store.get_opt(&format!("{}:flags", ns)) {
        Some(tokens) => parse_flags(tokens)?,
        None => 0,
    };

    Ok(PartitionSpec {
        name: name.to_owned(),
        ptype,
        len_mib,
        mode,
        src: store.get_opt(&format!("{}:src", ns)).map(str::to_owned),
        footer: store
            .get_opt(&format!("{}:footer", ns))
            .map(|v| v.parse())
            .transpose()
            .with_context(|| format!("'{}:footer' is not a valid integer", ns))?,
        flags,
        description: store.get_opt(&format!("{}:description", ns)).map(str::to_owned),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> OptionStore {
        let mut store = OptionStore::new();
        store.put("base:partitions", "bootloader boot misc system cache factory data");
        store.put("base:bootimages", "boot");
        store.put("base:interactive_mode", "1");
        store.put("partition.data:type", "ext4");
        store.put("partition.data:len", "-1");
        store.put("partition.data:mode", "format");
        store.put("partition.data:flags", "system");
        store
    }

    #[test]
    fn base_config_parses() {
        let store = sample_store();
        let base = BaseConfig::from_store(&store).unwrap();
        assert_eq!(base.partitions.len(), 7);
        assert!(base.interactive_mode);
        assert_eq!(base.reboot_target, "");
    }

    #[test]
    fn partition_spec_parses_fill_remaining() {
        let store = sample_store();
        let spec = partition_spec_from_store(&store, "data").unwrap();
        assert_eq!(spec.ptype, PartitionType::Ext4);
        assert!(spec.fills_remainder());
        assert_eq!(spec.mode, PartitionMode::Format);
    }

    #[test]
    fn missing_required_field_is_fatal() {
        let mut store = OptionStore::new();
        store.put("partition.boot:type", "boot");
        assert!(partition_spec_from_store(&store, "boot").is_err());
    }
}
