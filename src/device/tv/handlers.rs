//! Opcode handlers of the TV

use tracing::{debug, info, warn};

use super::TvController;
use crate::action::audio::SystemAudio;
use crate::action::routing::RoutingControl;
use crate::action::{ActionHost, Callback, TvAction, TvActionKind};
use crate::device::LocalDevice;
use crate::protocol::address::is_affecting_active_routing_path;
use crate::protocol::constants::{abort_reason, opcode};
use crate::protocol::message::{build_active_source, build_feature_abort, build_set_menu_language};
use crate::protocol::{CecMessage, RecordResult};
use crate::routing::ActiveSource;

/// `<Set System Audio Mode>` / `<System Audio Mode Status>` operand
fn system_audio_status_param(message: &CecMessage) -> bool {
    message.param(0) == Some(1)
}

impl TvController {
    /// Returns false for opcodes the TV does not handle itself
    pub(super) fn handle_tv_message(&mut self, message: &CecMessage) -> bool {
        match message.opcode {
            opcode::ACTIVE_SOURCE => self.handle_active_source(message),
            opcode::INACTIVE_SOURCE => self.handle_inactive_source(message),
            opcode::REQUEST_ACTIVE_SOURCE => self.handle_request_active_source(),
            opcode::GET_MENU_LANGUAGE => self.handle_get_menu_language(message),
            opcode::REPORT_PHYSICAL_ADDRESS => self.handle_report_physical_address(message),
            opcode::ROUTING_CHANGE => self.handle_routing_change(message),
            opcode::REPORT_AUDIO_STATUS => self.handle_report_audio_status(message),
            opcode::TEXT_VIEW_ON | opcode::IMAGE_VIEW_ON => self.handle_text_view_on(),
            opcode::SET_OSD_NAME => self.handle_set_osd_name(message),
            opcode::INITIATE_ARC => self.handle_initiate_arc(message),
            opcode::TERMINATE_ARC => self.handle_terminate_arc(message),
            opcode::SET_SYSTEM_AUDIO_MODE => self.handle_set_system_audio_mode(message),
            opcode::SYSTEM_AUDIO_MODE_STATUS => self.handle_system_audio_mode_status(message),
            opcode::RECORD_TV_SCREEN => self.handle_record_tv_screen(message),
            _ => false,
        }
    }

    fn handle_active_source(&mut self, message: &CecMessage) -> bool {
        let Some(path) = message.physical_address() else {
            return true;
        };
        if self.registry.get(message.source).is_none() {
            self.handle_new_device_at_tail(path);
        } else {
            self.process_active_source(ActiveSource::new(message.source, path));
        }
        true
    }

    fn handle_inactive_source(&mut self, message: &CecMessage) -> bool {
        let from_active = self
            .routing
            .active_source()
            .map(|source| source.logical_address == message.source)
            .unwrap_or(false);
        if !from_active || self.ctx.is_prohibit_mode() {
            return true;
        }
        let Some(prev_port) = self.routing.prev_port_id() else {
            return true;
        };
        let Some(inactive) = self.registry.get(message.source) else {
            return true;
        };
        if self.ports().path_to_port_id(inactive.physical_address) == Some(prev_port) {
            return true;
        }
        info!(port_id = prev_port, "Falling back to the previous port");
        self.do_manual_port_switching(prev_port, Callback::none());
        self.routing.invalidate_prev_port();
        true
    }

    fn handle_request_active_source(&mut self) -> bool {
        let is_active = self
            .routing
            .active_source()
            .map(|source| source.logical_address == self.address)
            .unwrap_or(false);
        if is_active {
            self.send(&build_active_source(self.address, self.routing.active_path()));
        }
        true
    }

    fn handle_get_menu_language(&mut self, message: &CecMessage) -> bool {
        let language = self.ctx.config().menu_language.clone();
        match build_set_menu_language(self.address, &language) {
            Some(reply) => {
                self.send(&reply);
            }
            None => warn!(%message, language, "Cannot answer <Get Menu Language>"),
        }
        true
    }

    fn handle_report_physical_address(&mut self, message: &CecMessage) -> bool {
        if self.has_action(TvActionKind::DeviceDiscovery) {
            debug!(%message, "Ignoring <Report Physical Address> during device discovery");
            return true;
        }
        let Some(path) = message.physical_address() else {
            return true;
        };
        if !self.registry.is_in_device_list(message.source, path) {
            self.handle_new_device_at_tail(path);
        }
        self.start_new_device_action(ActiveSource::new(message.source, path));
        true
    }

    fn handle_routing_change(&mut self, message: &CecMessage) -> bool {
        let (Some(current_path), Some(new_path)) = (message.param_u16(0), message.param_u16(2))
        else {
            return true;
        };
        if is_affecting_active_routing_path(self.routing.active_path(), current_path) {
            self.routing.invalidate_active_source();
            self.remove_action(TvActionKind::RoutingControl);
            self.add_and_start_action(TvAction::RoutingControl(RoutingControl::new(
                new_path,
                true,
                Callback::none(),
            )));
        }
        true
    }

    fn handle_report_audio_status(&mut self, message: &CecMessage) -> bool {
        let Some(status) = message.param(0) else {
            return true;
        };
        self.set_audio_status(status & 0x80 != 0, i32::from(status & 0x7F));
        true
    }

    fn handle_text_view_on(&mut self) -> bool {
        if self.ctx.is_power_standby_or_transient() && self.auto_wakeup {
            info!("Waking up on <Text View On>");
            self.ctx.wake_up();
        }
        true
    }

    fn handle_set_osd_name(&mut self, message: &CecMessage) -> bool {
        let Some(info) = self.registry.get(message.source) else {
            warn!(%message, "No device record for <Set OSD Name>");
            return true;
        };
        let Some(name) = message.ascii_params() else {
            warn!(%message, "Undecodable <Set OSD Name>");
            return true;
        };
        if info.display_name == name {
            debug!(%message, "Ignoring <Set OSD Name> with the same name");
            return true;
        }
        let updated = info.with_display_name(name);
        self.add_cec_device(updated);
        true
    }

    fn handle_initiate_arc(&mut self, message: &CecMessage) -> bool {
        self.remove_action(TvActionKind::RequestArcInitiation);
        self.start_arc_transmission(message.source, true);
        true
    }

    fn handle_terminate_arc(&mut self, message: &CecMessage) -> bool {
        self.remove_action(TvActionKind::RequestArcTermination);
        self.start_arc_transmission(message.source, false);
        true
    }

    fn handle_set_system_audio_mode(&mut self, message: &CecMessage) -> bool {
        if !self.is_message_for_system_audio(message) {
            return false;
        }
        let on = system_audio_status_param(message);
        self.add_and_start_action(TvAction::SystemAudioFromAvr(SystemAudio::from_avr(
            message.source,
            on,
            Callback::none(),
        )));
        true
    }

    fn handle_system_audio_mode_status(&mut self, message: &CecMessage) -> bool {
        if !self.is_message_for_system_audio(message) {
            return false;
        }
        self.set_system_audio_mode(system_audio_status_param(message), true);
        true
    }

    fn handle_record_tv_screen(&mut self, message: &CecMessage) -> bool {
        if let Some(recorder) = self.running_one_touch_recorder() {
            if recorder != message.source {
                self.announce_record_result(RecordResult::PreviousRecordingInProgress);
            }
            self.send(&build_feature_abort(
                self.address,
                message.source,
                message.opcode,
                abort_reason::CANNOT_PROVIDE_SOURCE,
            ));
            return true;
        }

        let recorder = message.source;
        let source = self.ctx.request_record_source(recorder);
        self.start_one_touch_record(recorder, source);
        true
    }
}
