//! Active source, input switching and routing control

use tracing::{debug, info, warn};

use super::TvController;
use crate::action::discovery::NewDevice;
use crate::action::key::SendKey;
use crate::action::routing::{DeviceSelect, RoutingControl};
use crate::action::{ActionHost, Callback, Step, TvAction, TvActionKind};
use crate::device::LocalDevice;
use crate::event::CecEvent;
use crate::protocol::address::{format_path, is_tail_of_active_path};
use crate::protocol::message::{build_active_source, build_routing_change};
use crate::protocol::{ControlResult, LogicalAddress, PhysicalAddress, PortId};
use crate::registry::DeviceInfo;
use crate::routing::ActiveSource;

impl TvController {
    /// Select a device as the TV input. The TV's own address selects the
    /// internal source.
    pub fn device_select(&mut self, target: LogicalAddress, mut callback: Callback) {
        if target == self.address {
            self.handle_select_internal_source();
            // Always succeeds, even with CEC control off
            let path = self.physical_address();
            self.routing.set_active_source(ActiveSource::new(target, path));
            self.routing.set_active_path(path);
            callback.invoke(ControlResult::Success);
            return;
        }
        if !self.ctx.is_control_enabled() {
            if let Some(info) = self.registry.get(target) {
                let source = ActiveSource::new(info.logical_address, info.physical_address);
                self.routing.set_active_source(source);
            }
            callback.invoke(ControlResult::IncorrectMode);
            return;
        }
        let Some(info) = self.registry.get(target).cloned() else {
            callback.invoke(ControlResult::TargetNotAvailable);
            return;
        };
        self.remove_action(TvActionKind::DeviceSelect);
        self.add_and_start_action(TvAction::DeviceSelect(DeviceSelect::new(info, callback)));
    }

    fn handle_select_internal_source(&mut self) {
        let is_active = self
            .routing
            .active_source()
            .map(|source| source.logical_address == self.address)
            .unwrap_or(false);
        if self.ctx.is_control_enabled() && !is_active {
            let path = self.physical_address();
            self.update_active_source(ActiveSource::new(self.address, path));
            self.send(&build_active_source(self.address, path));
        }
    }

    /// Record a new active source; remembers the fallback port when the
    /// source sits behind the active port
    pub fn update_active_source(&mut self, source: ActiveSource) {
        let known_remote = source.logical_address != self.address
            && self.registry.get(source.logical_address).is_some();
        if self.routing.update_active_source(source, known_remote) {
            debug!(
                logical = %source.logical_address,
                path = %format_path(source.physical_address),
                "Active source updated"
            );
        }
    }

    /// Switch the routed path after an automatic change
    pub fn update_active_input(&mut self, path: PhysicalAddress, notify: bool) {
        if !self.routing.update_active_input(path) {
            return;
        }
        if notify {
            let info = self
                .routing
                .active_source()
                .and_then(|source| self.registry.get(source.logical_address).cloned())
                .unwrap_or_else(|| {
                    DeviceInfo::placeholder(path, self.ports().path_to_port_id(path))
                });
            self.ctx.announce(CecEvent::InputChanged(info));
        }
    }

    /// Switch to a port after routing control settled. Clears the fallback
    /// port.
    pub fn update_active_port(&mut self, port_id: PortId) {
        if !self.routing.update_active_port(port_id) {
            return;
        }
        let path = self.routing.active_path();
        let info = self
            .registry
            .find_by_path(path)
            .cloned()
            .unwrap_or_else(|| DeviceInfo::placeholder(path, Some(port_id)));
        self.ctx.announce(CecEvent::InputChanged(info));
    }

    /// Port selection requested by the user
    pub fn do_manual_port_switching(&mut self, port_id: PortId, mut callback: Callback) {
        if !self.ports().is_valid_port_id(port_id) {
            callback.invoke(ControlResult::IncorrectMode);
            return;
        }
        if Some(port_id) == self.routing.active_port_id() {
            callback.invoke(ControlResult::Success);
            return;
        }
        self.routing.invalidate_active_source();
        if !self.ctx.is_control_enabled() {
            self.update_active_port(port_id);
            callback.invoke(ControlResult::IncorrectMode);
            return;
        }

        let old_path = self.routing.active_path();
        let Some(new_path) = self.ports().port_id_to_path(port_id) else {
            callback.invoke(ControlResult::IncorrectMode);
            return;
        };
        info!(port_id, path = %format_path(new_path), "Manual port switching");
        self.send(&build_routing_change(self.address, old_path, new_path));
        self.remove_action(TvActionKind::RoutingControl);
        self.add_and_start_action(TvAction::RoutingControl(RoutingControl::new(
            new_path, false, callback,
        )));
    }

    /// `<Active Source>` from a registered device
    pub(super) fn process_active_source(&mut self, source: ActiveSource) {
        if self.routing.active_source() == Some(source) {
            return;
        }
        if !self.ctx.is_prohibit_mode() {
            self.update_active_source(source);
            self.update_active_input(source.physical_address, true);
            return;
        }

        // Prohibit mode keeps the current input: reclaim it
        let Some(current) = self.routing.active_source() else {
            warn!(logical = %source.logical_address, "Active source ignored in prohibit mode");
            return;
        };
        if current.logical_address == self.address {
            self.send(&build_active_source(
                current.logical_address,
                current.physical_address,
            ));
        } else {
            self.send(&build_routing_change(
                self.address,
                source.physical_address,
                current.physical_address,
            ));
            self.remove_action(TvActionKind::RoutingControl);
            self.add_and_start_action(TvAction::RoutingControl(RoutingControl::new(
                current.physical_address,
                true,
                Callback::none(),
            )));
        }
    }

    /// A device appeared below the routed branch; route to the port again
    pub(super) fn handle_new_device_at_tail(&mut self, path: PhysicalAddress) {
        if !is_tail_of_active_path(path, self.routing.active_path()) {
            return;
        }
        let Some(new_path) = self
            .routing
            .active_port_id()
            .and_then(|port| self.ports().port_id_to_path(port))
        else {
            return;
        };
        self.remove_action(TvActionKind::RoutingControl);
        self.routing.set_active_path(new_path);
        self.send(&build_routing_change(
            self.address,
            self.routing.active_path(),
            new_path,
        ));
        self.add_and_start_action(TvAction::RoutingControl(RoutingControl::new(
            new_path,
            false,
            Callback::none(),
        )));
    }

    /// A device on the routed branch went away
    pub fn handle_remove_active_routing_path(&mut self, path: PhysicalAddress) {
        if !is_tail_of_active_path(path, self.routing.active_path()) {
            return;
        }
        let Some(new_path) = self
            .routing
            .active_port_id()
            .and_then(|port| self.ports().port_id_to_path(port))
        else {
            return;
        };
        self.remove_action(TvActionKind::RoutingControl);
        self.send(&build_routing_change(
            self.address,
            self.routing.active_path(),
            new_path,
        ));
        self.add_and_start_action(TvAction::RoutingControl(RoutingControl::new(
            new_path,
            true,
            Callback::none(),
        )));
    }

    /// Settle the routing path at power on or after address allocation
    pub fn launch_routing_control(&mut self, from_bootup: bool) {
        match self.routing.active_port_id() {
            Some(port_id) => {
                if from_bootup || self.ctx.is_prohibit_mode() {
                    return;
                }
                let Some(new_path) = self.ports().port_id_to_path(port_id) else {
                    return;
                };
                self.remove_action(TvActionKind::RoutingControl);
                self.routing.set_active_path(new_path);
                self.send(&build_routing_change(
                    self.address,
                    self.routing.active_path(),
                    new_path,
                ));
                self.add_and_start_action(TvAction::RoutingControl(RoutingControl::new(
                    new_path,
                    from_bootup,
                    Callback::none(),
                )));
            }
            None => {
                let path = self.physical_address();
                self.routing.set_active_path(path);
                if !from_bootup {
                    self.send(&build_active_source(self.address, path));
                }
            }
        }
    }

    /// Start a new-device query unless one already runs for the same device
    pub(super) fn start_new_device_action(&mut self, source: ActiveSource) {
        let duplicate = self
            .scheduler_ref()
            .iter_kind(TvActionKind::NewDevice)
            .any(|action| match action {
                TvAction::NewDevice(new_device) => {
                    new_device.is_action_of(source.logical_address, source.physical_address)
                }
                _ => false,
            });
        if duplicate {
            debug!(logical = %source.logical_address, "New device query already running");
            return;
        }
        self.add_and_start_action(TvAction::NewDevice(NewDevice::new(
            source.logical_address,
            source.physical_address,
        )));
    }

    /// Forward a remote key to the active source
    pub fn send_key_event(&mut self, key: u8, pressed: bool) {
        let driven = self.drive_action(TvActionKind::SendKey, |action, tv| match action {
            TvAction::SendKey(send_key) => send_key.process_key_event(tv, key, pressed),
            _ => Step::Continue,
        });
        if driven {
            return;
        }
        if !pressed {
            warn!(key, "Discarding key release without a pending press");
            return;
        }
        let target = self
            .routing
            .active_source()
            .map(|source| source.logical_address)
            .unwrap_or(LogicalAddress::Unregistered);
        self.add_and_start_action(TvAction::SendKey(SendKey::new(target, key)));
    }
}
