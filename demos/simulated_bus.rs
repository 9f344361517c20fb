//! TV service on a simulated CEC bus
//!
//! Run with: cargo run --example simulated_bus
//!
//! A fake Blu-ray player sits behind HDMI port 1 (1.0.0.0) and answers the
//! TV's discovery queries. The demo waits for discovery, prints the device
//! list, then selects the player as the TV input.
//!
//! Set RUST_LOG=hdmi_cec=trace to see every frame.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use hdmi_cec::hal::{AudioSystem, CecTransport, PowerControl, SendResult, SettingsStore};
use hdmi_cec::protocol::constants::opcode;
use hdmi_cec::protocol::message::{
    build_device_vendor_id, build_report_physical_address, build_report_power_status,
    build_set_osd_name,
};
use hdmi_cec::protocol::PowerStatus;
use hdmi_cec::routing::PortInfo;
use hdmi_cec::{CecConfig, CecEvent, CecMessage, CecService, Collaborators, LogicalAddress};

const PLAYER: LogicalAddress = LogicalAddress::Playback1;
const PLAYER_PATH: u16 = 0x1000;

/// Bus with one scripted player; its answers are queued for the service
struct SimulatedBus {
    replies: mpsc::UnboundedSender<Bytes>,
}

impl SimulatedBus {
    fn answer(&self, request: &CecMessage) {
        let reply = match request.opcode {
            opcode::GIVE_PHYSICAL_ADDRESS => Some(build_report_physical_address(
                PLAYER,
                PLAYER_PATH,
                PLAYER.device_type(),
            )),
            opcode::GIVE_OSD_NAME => Some(build_set_osd_name(PLAYER, request.source, "Blu-ray")),
            opcode::GIVE_DEVICE_VENDOR_ID => Some(build_device_vendor_id(PLAYER, 0x00_0CB8)),
            opcode::GIVE_DEVICE_POWER_STATUS => Some(build_report_power_status(
                PLAYER,
                request.source,
                PowerStatus::On,
            )),
            _ => None,
        };
        if let Some(reply) = reply {
            let _ = self.replies.send(reply.encode());
        }
    }
}

impl CecTransport for SimulatedBus {
    fn send_command(&mut self, message: &CecMessage) -> SendResult {
        println!("  bus <- {}", message);
        if message.is_broadcast() {
            return SendResult::Success;
        }
        if message.destination != PLAYER {
            return SendResult::Nack;
        }
        self.answer(message);
        SendResult::Success
    }

    fn poll(&mut self, _source: LogicalAddress, destination: LogicalAddress) -> SendResult {
        if destination == PLAYER {
            SendResult::Success
        } else {
            SendResult::Nack
        }
    }

    fn add_logical_address(&mut self, address: LogicalAddress) {
        println!("  claimed {}", address);
    }

    fn clear_logical_address(&mut self) {
        println!("  released logical addresses");
    }

    fn set_audio_return_channel(&mut self, enabled: bool) {
        println!("  ARC {}", if enabled { "on" } else { "off" });
    }
}

#[derive(Default)]
struct MemorySettings(HashMap<String, bool>);

impl SettingsStore for MemorySettings {
    fn read_bool(&self, key: &str, default: bool) -> bool {
        self.0.get(key).copied().unwrap_or(default)
    }

    fn write_bool(&mut self, key: &str, value: bool) {
        self.0.insert(key.to_string(), value);
    }
}

struct Speakers;

impl AudioSystem for Speakers {
    fn set_system_audio_supported(&mut self, on: bool) {
        println!("  speakers muted: {}", on);
    }

    fn set_arc_connected(&mut self, connected: bool, _name: &str) {
        println!("  ARC output connected: {}", connected);
    }

    fn max_volume(&self) -> i32 {
        100
    }

    fn set_audio_status(&mut self, mute: bool, volume: i32) {
        println!("  volume {} (mute: {})", volume, mute);
    }
}

struct AlwaysOn;

impl PowerControl for AlwaysOn {
    fn power_status(&self) -> PowerStatus {
        PowerStatus::On
    }

    fn wake_up(&mut self) {}

    fn standby(&mut self) {
        println!("  (ignoring standby)");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hdmi_cec=info".parse()?)
                .add_directive("simulated_bus=info".parse()?),
        )
        .init();

    let (replies_tx, mut replies) = mpsc::unbounded_channel();
    let config = CecConfig::default()
        .osd_name("Living Room TV")
        .port(PortInfo::new(1, 0x1000))
        .port(PortInfo::new(2, 0x2000))
        .port(PortInfo::new(3, 0x3000).with_arc())
        .hotplug_poll_interval(Duration::from_secs(60));
    let collaborators = Collaborators::new(
        SimulatedBus { replies: replies_tx },
        MemorySettings::default(),
        Speakers,
        AlwaysOn,
    );

    let (handle, thread) = CecService::spawn(config, collaborators)?;
    let mut events = handle.subscribe();

    // Feed the player's answers back until discovery has registered it
    println!("Discovering devices...");
    let discovered = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            tokio::select! {
                Some(frame) = replies.recv() => handle.receive_frame(frame).await?,
                event = events.recv() => {
                    if let Ok(CecEvent::DeviceAdded(info)) = event {
                        println!("Added {}", info);
                        if info.logical_address == PLAYER {
                            return Ok::<_, hdmi_cec::error::Error>(());
                        }
                    }
                }
            }
        }
    })
    .await;
    if !matches!(discovered, Ok(Ok(()))) {
        eprintln!("Player was not discovered");
    }

    println!();
    println!("Device list:");
    for info in handle.device_list().iter() {
        println!("  {}", info);
    }

    let select = handle.device_select(PLAYER);
    tokio::pin!(select);
    let result = loop {
        tokio::select! {
            result = &mut select => break result?,
            Some(frame) = replies.recv() => handle.receive_frame(frame).await?,
        }
    };
    println!();
    println!("Selecting {}: {:?}", PLAYER, result);

    handle.shutdown().await?;
    tokio::task::spawn_blocking(move || thread.join())
        .await?
        .map_err(|_| "service thread panicked")?;
    Ok(())
}
