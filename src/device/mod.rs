//! Local CEC devices hosted by the service
//!
//! A local device owns a logical address on the bus, an action run-list and
//! a message cache. Incoming messages are cached, offered to the running
//! actions, then to the device's own opcode handlers, and finally to the
//! handlers every device type shares.

use tracing::{debug, info};

use crate::action::ActionHost;
use crate::protocol::constants::{abort_reason, opcode};
use crate::protocol::message::{
    build_cec_version, build_device_vendor_id, build_feature_abort,
    build_report_physical_address, build_report_power_status, build_set_osd_name,
};
use crate::protocol::{CecMessage, DeviceType, LogicalAddress, PhysicalAddress};
use crate::registry::{DeviceInfo, MessageCache};
use crate::service::context::ServiceContext;
use crate::service::hal::SendResult;

pub mod playback;
pub mod tv;

pub use playback::PlaybackController;
pub use tv::TvController;

/// Behavior shared by TV and playback devices
pub trait LocalDevice: ActionHost {
    fn context(&self) -> &ServiceContext;

    fn address(&self) -> LogicalAddress;

    fn device_type(&self) -> DeviceType;

    fn message_cache(&mut self) -> &mut MessageCache;

    /// Device specific handlers. Returns false for opcodes it does not handle.
    fn handle_message(&mut self, message: &CecMessage) -> bool;

    fn physical_address(&self) -> PhysicalAddress {
        self.context().physical_address()
    }

    fn send(&self, message: &CecMessage) -> SendResult {
        self.context().send_cec_command(message)
    }

    /// Record describing this device
    fn device_info(&self) -> DeviceInfo {
        let config = self.context().config();
        DeviceInfo::new(
            self.address(),
            self.physical_address(),
            None,
            self.device_type(),
            config.vendor_id,
            config.osd_name.clone(),
        )
    }

    /// Full dispatch path for one incoming message. Returns false when
    /// nobody handled it.
    fn dispatch_message(&mut self, message: &CecMessage) -> bool {
        self.message_cache().cache_message(message);
        if self.dispatch_to_actions(message) {
            return true;
        }
        if self.handle_message(message) {
            return true;
        }
        self.handle_common_message(message)
    }

    /// Requests every device type answers the same way
    fn handle_common_message(&mut self, message: &CecMessage) -> bool {
        let me = self.address();
        match message.opcode {
            opcode::GIVE_PHYSICAL_ADDRESS => {
                self.send(&build_report_physical_address(
                    me,
                    self.physical_address(),
                    self.device_type(),
                ));
                true
            }
            opcode::GIVE_DEVICE_VENDOR_ID => {
                self.send(&build_device_vendor_id(me, self.context().config().vendor_id));
                true
            }
            opcode::GIVE_OSD_NAME => {
                let name = self.context().config().osd_name.clone();
                self.send(&build_set_osd_name(me, message.source, &name));
                true
            }
            opcode::GET_CEC_VERSION => {
                let version = self.context().config().cec_version;
                self.send(&build_cec_version(me, message.source, version));
                true
            }
            opcode::GIVE_DEVICE_POWER_STATUS => {
                let status = self.context().power_status();
                self.send(&build_report_power_status(me, message.source, status));
                true
            }
            opcode::STANDBY => {
                let ctx = self.context();
                if ctx.is_power_on_or_transient() {
                    info!(from = %message.source, "Standby requested over CEC");
                    ctx.mark_standby_message_received();
                    ctx.standby();
                }
                true
            }
            opcode::ABORT => {
                self.send(&build_feature_abort(
                    me,
                    message.source,
                    message.opcode,
                    abort_reason::REFUSED,
                ));
                true
            }
            _ => {
                debug!(%message, "Unhandled message");
                false
            }
        }
    }
}
