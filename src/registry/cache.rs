//! Cache of the latest informational message per device
//!
//! Device information replies (`<Report Physical Address>`, `<Set OSD Name>`,
//! `<Device Vendor ID>`, `<CEC Version>`) are cached by source and opcode so
//! actions can skip querying what a device already announced.

use std::collections::HashMap;

use crate::protocol::constants::opcode;
use crate::protocol::{CecMessage, LogicalAddress};

const CACHEABLE_OPCODES: [u8; 4] = [
    opcode::REPORT_PHYSICAL_ADDRESS,
    opcode::SET_OSD_NAME,
    opcode::DEVICE_VENDOR_ID,
    opcode::CEC_VERSION,
];

#[derive(Debug, Default)]
pub struct MessageCache {
    messages: HashMap<(LogicalAddress, u8), CecMessage>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the message if its opcode is cacheable
    pub fn cache_message(&mut self, message: &CecMessage) {
        if CACHEABLE_OPCODES.contains(&message.opcode) {
            self.messages
                .insert((message.source, message.opcode), message.clone());
        }
    }

    pub fn get_message(&self, source: LogicalAddress, opcode: u8) -> Option<&CecMessage> {
        self.messages.get(&(source, opcode))
    }

    /// Drop everything cached from one device
    pub fn flush_messages_from(&mut self, source: LogicalAddress) {
        self.messages.retain(|(from, _), _| *from != source);
    }

    pub fn flush_all(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{build_active_source, build_set_osd_name};

    #[test]
    fn test_caches_only_informational_messages() {
        let mut cache = MessageCache::new();
        cache.cache_message(&build_active_source(LogicalAddress::Playback1, 0x1000));
        assert!(cache.is_empty());

        let name = build_set_osd_name(LogicalAddress::Playback1, LogicalAddress::Tv, "Player");
        cache.cache_message(&name);
        assert_eq!(
            cache.get_message(LogicalAddress::Playback1, opcode::SET_OSD_NAME),
            Some(&name)
        );
    }

    #[test]
    fn test_flush() {
        let mut cache = MessageCache::new();
        cache.cache_message(&build_set_osd_name(
            LogicalAddress::Playback1,
            LogicalAddress::Tv,
            "A",
        ));
        cache.cache_message(&build_set_osd_name(
            LogicalAddress::Recorder1,
            LogicalAddress::Tv,
            "B",
        ));

        cache.flush_messages_from(LogicalAddress::Playback1);
        assert_eq!(cache.len(), 1);
        assert!(cache
            .get_message(LogicalAddress::Playback1, opcode::SET_OSD_NAME)
            .is_none());

        cache.flush_all();
        assert!(cache.is_empty());
    }
}
