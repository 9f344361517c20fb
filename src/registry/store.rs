//! Device registry implementation
//!
//! The live map is owned by the service thread and mutated without locks.
//! After every mutation the registry publishes two immutable lists (all
//! devices, external input devices) behind a single `RwLock`, so readers on
//! other threads always see one complete generation of the registry.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::cache::MessageCache;
use super::entry::DeviceInfo;
use crate::protocol::{LogicalAddress, PhysicalAddress};

#[derive(Debug, Default)]
struct Published {
    all: Arc<Vec<DeviceInfo>>,
    inputs: Arc<Vec<DeviceInfo>>,
}

/// Thread-safe view of the last published registry state
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    inner: Arc<RwLock<Published>>,
}

impl DeviceSnapshot {
    /// All registered devices, ordered by logical address
    pub fn all(&self) -> Arc<Vec<DeviceInfo>> {
        match self.inner.read() {
            Ok(published) => Arc::clone(&published.all),
            Err(poisoned) => Arc::clone(&poisoned.into_inner().all),
        }
    }

    /// External source-type devices (inputs the TV can switch to)
    pub fn external_sources(&self) -> Arc<Vec<DeviceInfo>> {
        match self.inner.read() {
            Ok(published) => Arc::clone(&published.inputs),
            Err(poisoned) => Arc::clone(&poisoned.into_inner().inputs),
        }
    }

    /// Both lists from the same generation
    pub fn both(&self) -> (Arc<Vec<DeviceInfo>>, Arc<Vec<DeviceInfo>>) {
        let published = match self.inner.read() {
            Ok(published) => published,
            Err(poisoned) => poisoned.into_inner(),
        };
        (Arc::clone(&published.all), Arc::clone(&published.inputs))
    }

    /// Look up one device in the snapshot
    pub fn get(&self, logical_address: LogicalAddress) -> Option<DeviceInfo> {
        self.all()
            .iter()
            .find(|info| info.logical_address == logical_address)
            .cloned()
    }

    pub fn has_audio_system(&self) -> bool {
        self.get(LogicalAddress::AudioSystem).is_some()
    }

    fn publish(&self, all: Vec<DeviceInfo>, inputs: Vec<DeviceInfo>) {
        let published = Published {
            all: Arc::new(all),
            inputs: Arc::new(inputs),
        };
        match self.inner.write() {
            Ok(mut guard) => *guard = published,
            Err(poisoned) => *poisoned.into_inner() = published,
        }
    }
}

/// Authoritative map of CEC devices, keyed by logical address
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<LogicalAddress, DeviceInfo>,

    /// Addresses owned by our own local devices
    local_addresses: Vec<LogicalAddress>,

    /// Incoming message cache, flushed per device on removal
    cache: MessageCache,

    snapshot: DeviceSnapshot,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that publishes into an existing snapshot handle
    pub fn with_snapshot(snapshot: DeviceSnapshot) -> Self {
        Self {
            snapshot,
            ..Self::default()
        }
    }

    /// Handle for cross-thread readers
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot.clone()
    }

    pub fn set_local_addresses(&mut self, addresses: Vec<LogicalAddress>) {
        self.local_addresses = addresses;
        self.publish();
    }

    pub fn is_local_address(&self, address: LogicalAddress) -> bool {
        self.local_addresses.contains(&address)
    }

    /// Insert or replace a record. Returns the replaced record.
    pub fn add_device(&mut self, info: DeviceInfo) -> Option<DeviceInfo> {
        debug!(device = %info, "Registering device");
        let old = self.devices.insert(info.logical_address, info);
        self.publish();
        old
    }

    /// Remove a record and flush its cached messages
    pub fn remove_device(&mut self, logical_address: LogicalAddress) -> Option<DeviceInfo> {
        let removed = self.devices.remove(&logical_address);
        self.cache.flush_messages_from(logical_address);
        self.publish();
        if removed.is_some() {
            debug!(logical = %logical_address, "Removed device");
        }
        removed
    }

    /// Live record. Only valid on the service thread; other threads read the
    /// snapshot.
    pub fn get(&self, logical_address: LogicalAddress) -> Option<&DeviceInfo> {
        self.devices.get(&logical_address)
    }

    pub fn audio_system(&self) -> Option<&DeviceInfo> {
        self.get(LogicalAddress::AudioSystem)
    }

    /// First non-local device at the given physical path
    pub fn find_by_path(&self, path: PhysicalAddress) -> Option<&DeviceInfo> {
        self.devices
            .values()
            .filter(|info| !self.is_local_address(info.logical_address))
            .find(|info| info.physical_address == path)
    }

    /// Whether the registry holds `logical_address` at exactly `path`
    pub fn is_in_device_list(&self, logical_address: LogicalAddress, path: PhysicalAddress) -> bool {
        self.get(logical_address)
            .map(|info| info.physical_address == path)
            .unwrap_or(false)
    }

    /// Copy of the live records, optionally without our own devices
    pub fn device_list(&self, include_local: bool) -> Vec<DeviceInfo> {
        self.devices
            .values()
            .filter(|info| include_local || !self.is_local_address(info.logical_address))
            .cloned()
            .collect()
    }

    pub fn snapshot_all(&self) -> Arc<Vec<DeviceInfo>> {
        self.snapshot.all()
    }

    pub fn snapshot_external_sources(&self) -> Arc<Vec<DeviceInfo>> {
        self.snapshot.external_sources()
    }

    /// Drop every record. Returns the input devices that were published, so
    /// the caller can announce their removal.
    pub fn clear(&mut self) -> Vec<DeviceInfo> {
        let inputs = self.snapshot.external_sources().as_ref().clone();
        self.devices.clear();
        self.publish();
        inputs
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn cache(&self) -> &MessageCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut MessageCache {
        &mut self.cache
    }

    /// Non-local devices of source type. Filters on each record's own
    /// logical address.
    fn input_devices(&self) -> Vec<DeviceInfo> {
        self.devices
            .values()
            .filter(|info| !self.is_local_address(info.logical_address))
            .filter(|info| info.is_source_type())
            .cloned()
            .collect()
    }

    fn publish(&self) {
        let all: Vec<DeviceInfo> = self.devices.values().cloned().collect();
        let inputs = self.input_devices();
        self.snapshot.publish(all, inputs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::opcode;
    use crate::protocol::message::build_set_osd_name;
    use crate::protocol::DeviceType;

    fn device(logical: LogicalAddress, path: PhysicalAddress) -> DeviceInfo {
        DeviceInfo::new(
            logical,
            path,
            Some(path >> 12),
            logical.device_type(),
            0,
            DeviceInfo::default_name(logical),
        )
    }

    #[test]
    fn test_add_replaces_by_logical_address() {
        let mut registry = DeviceRegistry::new();
        assert!(registry
            .add_device(device(LogicalAddress::Playback1, 0x1000))
            .is_none());

        let old = registry.add_device(device(LogicalAddress::Playback1, 0x2000));
        assert_eq!(old.unwrap().physical_address, 0x1000);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot_all().len(), 1);
        assert_eq!(registry.snapshot_all()[0].physical_address, 0x2000);
    }

    #[test]
    fn test_remove_flushes_cache() {
        let mut registry = DeviceRegistry::new();
        registry.add_device(device(LogicalAddress::Playback1, 0x1000));
        registry.cache_mut().cache_message(&build_set_osd_name(
            LogicalAddress::Playback1,
            LogicalAddress::Tv,
            "Player",
        ));

        let removed = registry.remove_device(LogicalAddress::Playback1);
        assert!(removed.is_some());
        assert!(registry.snapshot_all().is_empty());
        assert!(registry
            .cache()
            .get_message(LogicalAddress::Playback1, opcode::SET_OSD_NAME)
            .is_none());
        assert!(registry.remove_device(LogicalAddress::Playback1).is_none());
    }

    #[test]
    fn test_input_devices_and_device_list() {
        let mut registry = DeviceRegistry::new();
        registry.set_local_addresses(vec![LogicalAddress::Tv]);
        registry.add_device(DeviceInfo::new(
            LogicalAddress::Tv,
            0x0000,
            None,
            DeviceType::Tv,
            0,
            "TV",
        ));
        registry.add_device(device(LogicalAddress::Recorder1, 0x2000));
        registry.add_device(device(LogicalAddress::Playback1, 0x3000));
        registry.add_device(device(LogicalAddress::AudioSystem, 0x1000));

        let inputs = registry.snapshot_external_sources();
        let addresses: Vec<_> = inputs.iter().map(|d| d.logical_address).collect();
        assert_eq!(
            addresses,
            vec![LogicalAddress::Recorder1, LogicalAddress::Playback1]
        );

        let all = registry.device_list(true);
        assert_eq!(all.len(), 4);
        assert!(all
            .iter()
            .any(|d| d.logical_address == LogicalAddress::AudioSystem));
        assert_eq!(registry.device_list(false).len(), 3);
    }

    #[test]
    fn test_local_filter_uses_record_address() {
        // Playback local device registered at address 4 sits at index 0
        let mut registry = DeviceRegistry::new();
        registry.set_local_addresses(vec![LogicalAddress::Playback1]);
        registry.add_device(device(LogicalAddress::Playback1, 0x1000));
        registry.add_device(device(LogicalAddress::Playback2, 0x2000));

        let inputs = registry.snapshot_external_sources();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].logical_address, LogicalAddress::Playback2);
    }

    #[test]
    fn test_find_by_path() {
        let mut registry = DeviceRegistry::new();
        registry.add_device(device(LogicalAddress::Playback1, 0x1100));
        assert_eq!(
            registry.find_by_path(0x1100).map(|d| d.logical_address),
            Some(LogicalAddress::Playback1)
        );
        assert!(registry.find_by_path(0x1200).is_none());
        assert!(registry.is_in_device_list(LogicalAddress::Playback1, 0x1100));
        assert!(!registry.is_in_device_list(LogicalAddress::Playback1, 0x1200));
    }

    #[test]
    fn test_clear_returns_published_inputs() {
        let mut registry = DeviceRegistry::new();
        registry.add_device(device(LogicalAddress::Playback1, 0x1000));
        registry.add_device(device(LogicalAddress::AudioSystem, 0x2000));

        let removed = registry.clear();
        assert_eq!(removed.len(), 1);
        assert!(registry.is_empty());
        assert!(registry.snapshot_all().is_empty());
    }

    #[test]
    fn test_snapshot_consistent_under_concurrent_reads() {
        let mut registry = DeviceRegistry::new();
        let snapshot = registry.snapshot();

        let reader = std::thread::spawn(move || {
            for _ in 0..2000 {
                let (all, inputs) = snapshot.both();
                for input in inputs.iter() {
                    assert!(all.contains(input));
                }
                let mut seen: Vec<_> = all.iter().map(|d| d.logical_address).collect();
                seen.dedup();
                assert_eq!(seen.len(), all.len());
            }
        });

        for round in 0..500u16 {
            for logical in [
                LogicalAddress::Recorder1,
                LogicalAddress::Playback1,
                LogicalAddress::Tuner1,
            ] {
                registry.add_device(device(logical, (round % 15 + 1) << 12));
            }
            registry.remove_device(LogicalAddress::Tuner1);
        }

        reader.join().unwrap();
    }
}
