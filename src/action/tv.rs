//! Action set of the TV

use super::action_set;
use super::audio::{
    RequestArc, SetArcTransmissionState, SystemAudio, SystemAudioAutoInitiation,
    SystemAudioStatus, VolumeControl,
};
use super::discovery::{DeviceDiscovery, HotplugDetection, NewDevice};
use super::key::SendKey;
use super::record::{OneTouchRecord, TimerRecording};
use super::routing::{DeviceSelect, RoutingControl};
use crate::device::TvController;

action_set! {
    /// Actions run by the TV controller
    TvAction, TvActionKind, TvController {
        DeviceDiscovery(DeviceDiscovery),
        HotplugDetection(HotplugDetection),
        NewDevice(NewDevice),
        DeviceSelect(DeviceSelect),
        RoutingControl(RoutingControl),
        SendKey(SendKey),
        RequestArcInitiation(RequestArc),
        RequestArcTermination(RequestArc),
        SetArcTransmissionState(SetArcTransmissionState),
        SystemAudioFromTv(SystemAudio),
        SystemAudioFromAvr(SystemAudio),
        SystemAudioAutoInitiation(SystemAudioAutoInitiation),
        SystemAudioStatus(SystemAudioStatus),
        VolumeControl(VolumeControl),
        OneTouchRecord(OneTouchRecord),
        TimerRecording(TimerRecording),
    }
}
