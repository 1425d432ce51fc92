//! Line-oriented transmitter backends.
//!
//! Both write one message per publish to any `io::Write` (stdout, a serial port,
//! a pipe into an MQTT client). Session handling and reconnects are the
//! writer's business.

use std::io::Write;

use roode_traits::{Channel, Transmitter};
use serde_json::json;

use crate::error::HwError;

/// Domoticz device indices for each channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomoticzIdx {
    pub room_switch: u32,
    pub people_counter: u32,
    pub threshold: u32,
}

impl DomoticzIdx {
    fn of(&self, channel: Channel) -> u32 {
        match channel {
            Channel::RoomSwitch => self.room_switch,
            Channel::PeopleCounter => self.people_counter,
            Channel::ThresholdReport => self.threshold,
        }
    }
}

/// Domoticz `domoticz/in` JSON payloads, one object per line.
pub struct DomoticzMqtt<W: Write> {
    out: W,
    topic: String,
    idx: DomoticzIdx,
}

impl<W: Write> DomoticzMqtt<W> {
    pub fn new(out: W, topic: impl Into<String>, idx: DomoticzIdx) -> Self {
        Self {
            out,
            topic: topic.into(),
            idx,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn publish(&mut self, payload: serde_json::Value) -> Result<(), HwError> {
        writeln!(self.out, "{payload}")?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> Transmitter for DomoticzMqtt<W> {
    fn presentation(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Domoticz devices are created on the controller side; nothing to announce.
        tracing::debug!(topic = %self.topic, idx = ?self.idx, "domoticz presentation");
        Ok(())
    }

    fn transmit(
        &mut self,
        channel: Channel,
        value: i32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = json!({
            "topic": self.topic,
            "idx": self.idx.of(channel),
            "nvalue": value,
        });
        Ok(self.publish(payload)?)
    }

    fn transmit_labeled(
        &mut self,
        channel: Channel,
        value: i32,
        label: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = json!({
            "topic": self.topic,
            "idx": self.idx.of(channel),
            "nvalue": value,
            "svalue": label,
        });
        Ok(self.publish(payload)?)
    }
}

// MySensors serial API constants.
const CMD_PRESENTATION: u8 = 0;
const CMD_SET: u8 = 1;
const S_BINARY: u8 = 3;
const S_CUSTOM: u8 = 23;
const S_INFO: u8 = 36;
const V_STATUS: u8 = 2;
const V_TEXT: u8 = 47;
const V_CUSTOM: u8 = 48;

/// MySensors serial protocol: `node;child;command;ack;type;payload`.
pub struct MySensorsSerial<W: Write> {
    out: W,
    node_id: u8,
}

impl<W: Write> MySensorsSerial<W> {
    pub fn new(out: W, node_id: u8) -> Self {
        Self { out, node_id }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn child_id(channel: Channel) -> u8 {
        match channel {
            Channel::RoomSwitch => 1,
            Channel::PeopleCounter => 2,
            Channel::ThresholdReport => 3,
        }
    }

    fn line(&mut self, channel: Channel, command: u8, kind: u8, payload: &str) -> Result<(), HwError> {
        writeln!(
            self.out,
            "{};{};{};0;{};{}",
            self.node_id,
            Self::child_id(channel),
            command,
            kind,
            payload
        )?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> Transmitter for MySensorsSerial<W> {
    fn presentation(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for channel in Channel::ALL {
            let kind = match channel {
                Channel::RoomSwitch => S_BINARY,
                Channel::PeopleCounter => S_CUSTOM,
                Channel::ThresholdReport => S_INFO,
            };
            self.line(channel, CMD_PRESENTATION, kind, channel.name())?;
        }
        Ok(())
    }

    fn transmit(
        &mut self,
        channel: Channel,
        value: i32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let kind = match channel {
            Channel::RoomSwitch => V_STATUS,
            Channel::PeopleCounter => V_CUSTOM,
            Channel::ThresholdReport => V_TEXT,
        };
        Ok(self.line(channel, CMD_SET, kind, &value.to_string())?)
    }

    fn transmit_labeled(
        &mut self,
        channel: Channel,
        value: i32,
        label: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match channel {
            // V_TEXT carries the label; numeric channels keep their value.
            Channel::ThresholdReport => Ok(self.line(channel, CMD_SET, V_TEXT, label)?),
            _ => self.transmit(channel, value),
        }
    }
}
