use bytes::Bytes;
use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use tracing::{debug, info};

use crate::absence::{AbsenceWindow, decode_absence, program_absence};
use crate::address::DeviceAddress;
use crate::command::{Command, SwitchState, decode_state};
use crate::config::ProtocolConfig;
use crate::discovery::{self, DeviceFilter};
use crate::error::{Result, WsError};
use crate::frame;
use crate::timer::{
    RepeatMask, TimerSelector, TimerSlot, TimerSlotId, decode_timer_table, local_delta, local_time_of_day,
    program_timer, select,
};
use crate::transport::{Transport, UdpTransport};

/// Controls SWS-A1 style sockets.
///
/// Every operation opens its own UDP endpoint and closes it before
/// returning. The client holds no per-device state, so one client can drive
/// any number of sockets.
pub struct SocketClient<T: Transport = UdpTransport> {
    config: ProtocolConfig,
    transport: T,
    delta: Option<TimeDelta>,
}

impl SocketClient<UdpTransport> {
    /// Client talking to real sockets over UDP
    pub fn new(config: ProtocolConfig) -> Self {
        Self::with_transport(config, UdpTransport)
    }
}

impl Default for SocketClient<UdpTransport> {
    fn default() -> Self {
        Self::new(ProtocolConfig::default())
    }
}

impl<T: Transport> SocketClient<T> {
    pub fn with_transport(config: ProtocolConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            delta: None,
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ProtocolConfig {
        &mut self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Override the socket clock offset used for timers.
    ///
    /// `None` restores the default, the local offset to UTC.
    pub fn set_time_delta(&mut self, delta: Option<TimeDelta>) {
        self.delta = delta;
    }

    pub fn with_time_delta(mut self, delta: TimeDelta) -> Self {
        self.delta = Some(delta);
        self
    }

    /// Offset between the socket clock and local time
    pub fn time_delta(&self) -> TimeDelta {
        self.delta.unwrap_or_else(local_delta)
    }

    /// Frame, send and await the reply to one command
    async fn request(&self, device: &DeviceAddress, command: Command) -> Result<Bytes> {
        debug!("{} -> {:?}", device, command);
        let frame = frame::build_frame(&device.mac, &self.config, &command.body())?;
        self.transport.send_and_receive(&self.config, device.ip, &frame).await
    }

    /// Find every socket answering a broadcast search
    pub async fn find_devices(&self) -> Result<Vec<DeviceAddress>> {
        discovery::search(&self.transport, &self.config, &DeviceFilter::any()).await
    }

    /// Find the first socket matching `filter`, if any answers
    pub async fn find_device(&self, filter: DeviceFilter) -> Result<Option<DeviceAddress>> {
        let devices = discovery::search(&self.transport, &self.config, &filter).await?;
        Ok(devices.into_iter().next())
    }

    pub async fn switch(&self, device: &DeviceAddress, state: SwitchState) -> Result<()> {
        info!("Switching {} {}", device, state);
        self.request(device, Command::Switch(state)).await?;
        Ok(())
    }

    pub async fn switch_state(&self, device: &DeviceAddress) -> Result<SwitchState> {
        let payload = self.request(device, Command::GetState).await?;
        decode_state(&payload)
    }

    /// Switch a 433 MHz slave socket through its Wi-Fi master.
    ///
    /// `slave` is the 3-byte code printed on the slave. Never verified
    /// against real hardware.
    pub async fn switch_slave(&self, device: &DeviceAddress, slave: [u8; 3], state: SwitchState) -> Result<()> {
        info!("Switching slave {} of {} {}", hex::encode(slave), device, state);
        self.request(device, Command::SwitchSlave { slave, state }).await?;
        Ok(())
    }

    /// Read all timer slots and keep the ones `selector` asks for
    pub async fn query_timers(&self, device: &DeviceAddress, selector: TimerSelector) -> Result<Vec<TimerSlot>> {
        let payload = self.request(device, Command::TimerQuery).await?;
        let slots = decode_timer_table(&payload, self.time_delta(), local_time_of_day())?;
        Ok(select(slots, selector))
    }

    pub async fn query_timer(&self, device: &DeviceAddress, slot: TimerSlotId) -> Result<TimerSlot> {
        self.query_timers(device, TimerSelector::Slot(slot))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| WsError::UnexpectedResponse(format!("Timer table has no slot {slot}")))
    }

    /// Slots that are not programmed
    pub async fn free_timer_slots(&self, device: &DeviceAddress) -> Result<Vec<TimerSlotId>> {
        let slots = self.query_timers(device, TimerSelector::Free).await?;
        Ok(slots.into_iter().map(|slot| slot.slot).collect())
    }

    /// Program a timer slot with a local switching time.
    ///
    /// For [`TimerSlotId::Countdown`] `time` is the delay from now and
    /// `active`/`repeat` are ignored.
    pub async fn set_timer(
        &self,
        device: &DeviceAddress,
        slot: TimerSlotId,
        active: bool,
        repeat: RepeatMask,
        time: NaiveTime,
        action: SwitchState,
    ) -> Result<()> {
        info!(
            "Setting timer {} of {}: active={}, repeat={}, time={}, switch={}",
            slot,
            device,
            active,
            repeat,
            time.format("%H:%M"),
            action
        );
        let command = program_timer(slot, active, repeat, time, action, self.time_delta(), local_time_of_day())?;
        self.request(device, command).await?;
        Ok(())
    }

    /// Switch `action` after `duration` (hours and minutes) has passed
    pub async fn set_countdown(&self, device: &DeviceAddress, duration: NaiveTime, action: SwitchState) -> Result<()> {
        self.set_timer(device, TimerSlotId::Countdown, true, RepeatMask::NEVER, duration, action)
            .await
    }

    /// Turn an already programmed regular timer on or off, keeping its schedule.
    pub async fn activate_timer(&self, device: &DeviceAddress, slot: TimerSlotId, active: bool) -> Result<()> {
        if slot.is_countdown() {
            return Err(WsError::InvalidInput(
                "The countdown cannot be activated, set it instead".to_string(),
            ));
        }
        let current = self.query_timer(device, slot).await?;
        let schedule = current
            .schedule
            .ok_or_else(|| WsError::InvalidInput(format!("Timer {slot} is not programmed")))?;
        self.set_timer(device, slot, active, schedule.repeat, schedule.time, schedule.action)
            .await
    }

    pub async fn delete_timer(&self, device: &DeviceAddress, slot: TimerSlotId) -> Result<()> {
        let number = slot.checked_number()?;
        info!("Deleting timer {} of {}", slot, device);
        self.request(device, Command::DeleteTimer { slot: number }).await?;
        Ok(())
    }

    pub async fn query_absence(&self, device: &DeviceAddress) -> Result<AbsenceWindow> {
        let payload = self.request(device, Command::AbsenceQuery).await?;
        decode_absence(&payload)
    }

    /// Program the absence window. Times are local.
    pub async fn set_absence(
        &self,
        device: &DeviceAddress,
        active: bool,
        from: &DateTime<Local>,
        to: &DateTime<Local>,
    ) -> Result<()> {
        let command = program_absence(active, from, to)?;
        info!("Setting absence of {}: active={}, {} - {}", device, active, from, to);
        self.request(device, command).await?;
        Ok(())
    }

    pub async fn delete_absence(&self, device: &DeviceAddress) -> Result<()> {
        info!("Deleting absence window of {}", device);
        self.request(device, Command::DeleteAbsence).await?;
        Ok(())
    }

    /// Check that the socket is reachable
    pub async fn heartbeat(&self, device: &DeviceAddress) -> Result<()> {
        self.request(device, Command::Heartbeat).await?;
        Ok(())
    }
}
