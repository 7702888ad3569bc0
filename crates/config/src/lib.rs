#![forbid(unsafe_code)]

mod correlation;
mod error;
mod inspector;
mod sampling;

pub use correlation::Correlation;
pub use error::Error;
pub use inspector::Inspector;
pub use sampling::Sampling;

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub sampling: Sampling,
    pub correlation: Correlation,
    pub inspector: Inspector,
}

impl Config {
    /// Load configuration from a TOML file. Missing fields are filled with defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml_edit::de::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let toml = toml_edit::ser::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Load configuration from multiple TOML files. Later files override earlier ones.
    pub fn load_multiple<T, U>(paths: U) -> Result<Self, Error>
    where
        T: AsRef<Path>,
        U: IntoIterator<Item = T>,
    {
        let mut merged = toml_edit::DocumentMut::new();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                continue;
            }
            let text = std::fs::read_to_string(path)?;
            let doc: toml_edit::DocumentMut = text.parse()?;
            merge_document(&mut merged, doc);
        }
        let config: Config = toml_edit::de::from_str(&merged.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the detector relies on: ring indices wrap
    /// with a bitmask, and the buffer must hold at least one record.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.inspector.ring_capacity.is_power_of_two() {
            return Err(Error::RingCapacityNotPow2(self.inspector.ring_capacity));
        }
        if self.sampling.buffer_bytes < 64 {
            return Err(Error::BufferTooSmall(self.sampling.buffer_bytes));
        }
        Ok(())
    }
}

fn merge_document(target: &mut toml_edit::DocumentMut, source: toml_edit::DocumentMut) {
    for (key, item) in source.iter() {
        merge_item(
            target.entry(key).or_insert(toml_edit::Item::None),
            item.clone(),
        );
    }
}

fn merge_item(target: &mut toml_edit::Item, source: toml_edit::Item) {
    use toml_edit::Item;
    match (target, source) {
        (Item::Table(target_table), Item::Table(source_table)) => {
            for (key, item) in source_table.iter() {
                merge_item(target_table.entry(key).or_insert(Item::None), item.clone());
            }
        }
        (Item::ArrayOfTables(target_array), Item::ArrayOfTables(source_array)) => {
            for table in source_array.iter() {
                target_array.push(table.clone());
            }
        }
        (target_item, source_item) => {
            *target_item = source_item;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::default();
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();

        assert_eq!(config, loaded);
    }

    #[test]
    fn load_multiple_merges() {
        let dir = tempdir().unwrap();
        let path1 = dir.path().join("a.toml");
        let path2 = dir.path().join("b.toml");

        std::fs::write(
            &path1,
            "[sampling]\nbuffer_bytes = 65536\n[correlation]\nspatial_window_bytes = 32\n",
        )
        .unwrap();
        std::fs::write(&path2, "[inspector]\nidle_delay = 5\n").unwrap();

        let cfg = Config::load_multiple([path1, path2]).unwrap();
        assert_eq!(cfg.sampling.buffer_bytes, 65536);
        assert_eq!(cfg.correlation.spatial_window_bytes, 32);
        assert_eq!(cfg.inspector.idle_delay, Duration::from_millis(5));
        // untouched sections keep their defaults
        assert_eq!(cfg.correlation.temporal_window_cycles, 300);
    }

    proptest! {
        #[test]
        fn valid_configs_survive_a_save_load_cycle(
            buffer_kib in 1usize..4096,
            period in 1u64..64,
            ring_pow in 0u32..16,
            spatial in 1u64..256,
            temporal in 1u64..10_000,
            poll_ms in 1u64..1_000,
        ) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("config.toml");

            let mut config = Config::default();
            config.sampling.buffer_bytes = buffer_kib * 1024;
            config.sampling.period = period;
            config.sampling.poll_interval = Duration::from_millis(poll_ms);
            config.correlation.spatial_window_bytes = spatial;
            config.correlation.temporal_window_cycles = temporal;
            config.inspector.ring_capacity = 1 << ring_pow;

            config.save(&path).unwrap();
            prop_assert_eq!(Config::load(&path).unwrap(), config);
        }

        #[test]
        fn later_files_override_earlier_ones_key_by_key(
            base in 1u64..256,
            overlay in 1u64..256,
        ) {
            let dir = tempdir().unwrap();
            let path1 = dir.path().join("a.toml");
            let path2 = dir.path().join("b.toml");

            std::fs::write(
                &path1,
                format!("[correlation]\nspatial_window_bytes = {base}\ntemporal_window_cycles = 500\n"),
            )
            .unwrap();
            std::fs::write(
                &path2,
                format!("[correlation]\nspatial_window_bytes = {overlay}\n"),
            )
            .unwrap();

            let cfg = Config::load_multiple([path1, path2]).unwrap();
            prop_assert_eq!(cfg.correlation.spatial_window_bytes, overlay);
            prop_assert_eq!(cfg.correlation.temporal_window_cycles, 500);
        }
    }

    #[test]
    fn ring_capacity_must_be_pow2() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[inspector]\nring_capacity = 1000\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, Error::RingCapacityNotPow2(1000)));
    }

    #[test]
    fn tiny_buffer_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[sampling]\nbuffer_bytes = 32\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, Error::BufferTooSmall(32)));
    }
}
