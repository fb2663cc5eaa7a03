//! Bluetooth LE FTMS trainer driver.
//!
//! Discovers a trainer advertising the Fitness Machine Service, subscribes to
//! Indoor Bike Data and the Control Point, and requests control before
//! reporting the connection as established.

use crate::sensors::driver::{EventSender, TrainerDriver};
use crate::sensors::ftms::{
    decode_control_response, decode_indoor_bike_data, encode_control, to_hex, ControlCommand,
    ControlOpcode, ControlResultCode, CONTROL_RESPONSE_CODE, FTMS_CONTROL_POINT_UUID,
    FTMS_SERVICE_UUID, INDOOR_BIKE_DATA_UUID,
};
use crate::sensors::types::{DiscoveredTrainer, SensorError, TrainerEvent, TrainerFault};
use crate::storage::config::SensorSettings;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{Stream, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How often the peripheral list is polled while scanning.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// State shared between the driver and its notification task.
#[derive(Debug, Default)]
pub(crate) struct LinkState {
    connected: AtomicBool,
    control_granted: AtomicBool,
    /// Waiting for the RequestControl acknowledgment
    pending_ack: Mutex<Option<oneshot::Sender<ControlResultCode>>>,
}

/// FTMS trainer over Bluetooth LE.
pub struct BleTrainer {
    settings: SensorSettings,
    events: EventSender,
    name: String,
    adapter: Option<Adapter>,
    peripheral: Option<Peripheral>,
    control_point: Option<Characteristic>,
    subscribed: Vec<Characteristic>,
    link: Arc<LinkState>,
    notifications: Option<JoinHandle<()>>,
}

impl BleTrainer {
    pub fn new(settings: SensorSettings, events: EventSender) -> Self {
        Self {
            settings,
            events,
            name: "FTMS Trainer".to_string(),
            adapter: None,
            peripheral: None,
            control_point: None,
            subscribed: Vec::new(),
            link: Arc::new(LinkState::default()),
            notifications: None,
        }
    }

    async fn establish(&mut self) -> Result<(), SensorError> {
        let limit = self.settings.connection_timeout();
        let adapter = bounded(limit, first_adapter()).await??;
        let (peripheral, trainer) = find_trainer(
            &adapter,
            self.settings.device_id.as_deref(),
            self.settings.discovery_timeout(),
        )
        .await?;
        self.adapter = Some(adapter);

        tracing::info!("Connecting to trainer: {} ({})", trainer.name, trainer.device_id);
        self.name = trainer.name;

        bounded(limit, peripheral.connect())
            .await?
            .map_err(|e| SensorError::ConnectionFailed(e.to_string()))?;
        self.peripheral = Some(peripheral.clone());

        bounded(limit, peripheral.discover_services())
            .await?
            .map_err(|e| SensorError::ConnectionFailed(e.to_string()))?;

        let characteristics = peripheral.characteristics();
        let find = |uuid: Uuid| {
            characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or(SensorError::MissingCharacteristic(uuid))
        };
        let bike_data = find(INDOOR_BIKE_DATA_UUID)?;
        let control_point = find(FTMS_CONTROL_POINT_UUID)?;

        // Take the stream before subscribing so no early frame is missed
        let stream = bounded(limit, peripheral.notifications()).await??;
        self.notifications = Some(tokio::spawn(handle_notifications(
            stream,
            self.link.clone(),
            self.events.clone(),
        )));

        for characteristic in [bike_data, control_point.clone()] {
            bounded(limit, peripheral.subscribe(&characteristic))
                .await?
                .map_err(|e| SensorError::SubscriptionFailed(e.to_string()))?;
            tracing::debug!("Subscribed to characteristic: {}", characteristic.uuid);
            self.subscribed.push(characteristic);
        }

        self.control_point = Some(control_point);
        self.link.connected.store(true, Ordering::SeqCst);

        self.request_control().await
    }

    /// Ask for control and wait for the machine's answer.
    async fn request_control(&self) -> Result<(), SensorError> {
        let (tx, rx) = oneshot::channel();
        *self.link.pending_ack.lock().await = Some(tx);

        self.send_control(ControlCommand::RequestControl).await?;

        let result = tokio::time::timeout(self.settings.control_ack_timeout(), rx)
            .await
            .map_err(|_| SensorError::ControlTimeout)?
            .map_err(|_| SensorError::ConnectionFailed("notification stream closed".to_string()))?;

        if !result.is_success() {
            return Err(SensorError::ControlRejected(result));
        }

        tracing::info!("Control granted by {}", self.name);
        Ok(())
    }

    /// Drop what a link lost underneath us left behind, so a reconnect starts
    /// from a clean slate.
    async fn clear_stale_link(&mut self) {
        let leftovers = self.peripheral.is_some()
            || self.notifications.is_some()
            || !self.subscribed.is_empty();
        if leftovers && !self.is_connected() {
            tracing::debug!("Clearing stale link to {}", self.name);
            self.teardown().await;
        }
    }

    async fn teardown(&mut self) {
        self.link.connected.store(false, Ordering::SeqCst);
        self.link.control_granted.store(false, Ordering::SeqCst);

        if let Some(task) = self.notifications.take() {
            task.abort();
        }
        self.link.pending_ack.lock().await.take();
        self.control_point = None;

        if let Some(peripheral) = self.peripheral.take() {
            let limit = self.settings.connection_timeout();
            for characteristic in self.subscribed.drain(..) {
                match bounded(limit, peripheral.unsubscribe(&characteristic)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!("Unsubscribe from {} failed: {}", characteristic.uuid, e)
                    }
                    Err(e) => tracing::debug!("Unsubscribe from {}: {}", characteristic.uuid, e),
                }
            }
            match bounded(limit, peripheral.disconnect()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Disconnect from {} failed: {}", self.name, e),
                Err(e) => tracing::warn!("Disconnect from {}: {}", self.name, e),
            }
        }
        self.subscribed.clear();
        self.adapter = None;
    }
}

impl TrainerDriver for BleTrainer {
    async fn connect(&mut self) -> Result<(), SensorError> {
        if self.is_connected() {
            return Ok(());
        }
        self.clear_stale_link().await;

        match self.establish().await {
            Ok(()) => {
                tracing::info!("Connected to trainer: {}", self.name);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Trainer connection failed: {}", e);
                self.teardown().await;
                Err(e)
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), SensorError> {
        if self.peripheral.is_none() && self.notifications.is_none() {
            return Ok(());
        }

        tracing::info!("Disconnecting from trainer: {}", self.name);
        self.teardown().await;
        Ok(())
    }

    async fn send_control(&self, command: ControlCommand) -> Result<(), SensorError> {
        if !self.is_connected() {
            return Err(SensorError::NotConnected);
        }
        // Only RequestControl may be written before the machine grants control
        if command != ControlCommand::RequestControl && !self.has_control() {
            return Err(SensorError::ControlNotGranted);
        }
        let (Some(peripheral), Some(control_point)) = (&self.peripheral, &self.control_point)
        else {
            return Err(SensorError::NotConnected);
        };

        let payload = encode_control(&command);
        tracing::debug!("Writing {} [{}]", command.opcode(), to_hex(&payload));

        let write = peripheral.write(control_point, &payload, WriteType::WithResponse);
        match tokio::time::timeout(self.settings.connection_timeout(), write).await {
            Ok(result) => result.map_err(|e| SensorError::WriteFailed(e.to_string())),
            Err(_) => Err(SensorError::WriteFailed(format!(
                "{} write timed out",
                command.opcode()
            ))),
        }
    }

    fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }

    fn has_control(&self) -> bool {
        self.link.control_granted.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Await one link step, giving up once `limit` has passed.
async fn bounded<F: Future>(limit: Duration, step: F) -> Result<F::Output, SensorError> {
    tokio::time::timeout(limit, step)
        .await
        .map_err(|_| SensorError::ConnectionTimeout)
}

/// Get the first BLE adapter.
async fn first_adapter() -> Result<Adapter, SensorError> {
    let manager = Manager::new().await?;
    manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or(SensorError::AdapterNotFound)
}

/// Scan until the wanted trainer (or, without a device id, any FTMS trainer)
/// shows up.
async fn find_trainer(
    adapter: &Adapter,
    device_id: Option<&str>,
    timeout: Duration,
) -> Result<(Peripheral, DiscoveredTrainer), SensorError> {
    tracing::info!("Scanning for FTMS trainers");

    let filter = ScanFilter {
        services: vec![FTMS_SERVICE_UUID],
    };
    bounded(timeout, adapter.start_scan(filter))
        .await?
        .map_err(|e| SensorError::ScanFailed(e.to_string()))?;

    let found = tokio::time::timeout(timeout, async {
        loop {
            for peripheral in adapter.peripherals().await? {
                let Some(trainer) = classify_peripheral(&peripheral).await else {
                    continue;
                };
                let wanted = device_id.map_or(true, |id| trainer.device_id == id);
                if wanted {
                    return Ok::<_, SensorError>((peripheral, trainer));
                }
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        }
    })
    .await;

    if let Err(e) = adapter.stop_scan().await {
        tracing::debug!("Failed to stop scanning: {}", e);
    }

    match found {
        Ok(result) => result,
        Err(_) => Err(SensorError::SensorNotFound(
            device_id.unwrap_or("no FTMS trainer advertising").to_string(),
        )),
    }
}

/// Recognize a peripheral advertising the Fitness Machine Service.
async fn classify_peripheral(peripheral: &Peripheral) -> Option<DiscoveredTrainer> {
    let properties = peripheral.properties().await.ok()??;

    if !properties.services.contains(&FTMS_SERVICE_UUID) {
        return None;
    }

    Some(DiscoveredTrainer {
        device_id: peripheral.id().to_string(),
        name: properties
            .local_name
            .unwrap_or_else(|| "FTMS Trainer".to_string()),
        signal_strength: properties.rssi,
    })
}

/// Handle notifications from a connected trainer.
async fn handle_notifications<S>(mut stream: S, link: Arc<LinkState>, events: EventSender)
where
    S: Stream<Item = ValueNotification> + Unpin,
{
    while let Some(notification) = stream.next().await {
        dispatch_notification(notification.uuid, &notification.value, &link, &events).await;
    }

    // Stream ended - peripheral disconnected
    if link.connected.swap(false, Ordering::SeqCst) {
        link.control_granted.store(false, Ordering::SeqCst);
        tracing::error!("Trainer notification stream ended");
        let _ = events.send(TrainerEvent::Error(TrainerFault::Transport(
            "Trainer disconnected".to_string(),
        )));
    }
}

/// Route one notification by characteristic.
pub(crate) async fn dispatch_notification(
    uuid: Uuid,
    value: &[u8],
    link: &LinkState,
    events: &EventSender,
) {
    if uuid == INDOOR_BIKE_DATA_UUID {
        let sample = decode_indoor_bike_data(value);
        let _ = events.send(TrainerEvent::Telemetry(sample));
    } else if uuid == FTMS_CONTROL_POINT_UUID {
        handle_control_response(value, link, events).await;
    } else {
        tracing::trace!("Ignoring notification from {}", uuid);
    }
}

async fn handle_control_response(value: &[u8], link: &LinkState, events: &EventSender) {
    let response = match decode_control_response(value) {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(frame = %to_hex(value), "Unreadable control point response: {}", e);
            return;
        }
    };

    if response.response_code != CONTROL_RESPONSE_CODE {
        tracing::debug!(
            "Unexpected control point response code 0x{:02X}",
            response.response_code
        );
    }

    if response.answers(ControlOpcode::RequestControl) {
        link.control_granted
            .store(response.result.is_success(), Ordering::SeqCst);
        if let Some(ack) = link.pending_ack.lock().await.take() {
            let _ = ack.send(response.result);
            return;
        }
    }

    if response.result.is_success() {
        tracing::debug!("Control point acknowledged 0x{:02X}", response.request_opcode);
        return;
    }

    let fault = match response.opcode() {
        Some(opcode) => TrainerFault::ControlRejected {
            opcode,
            result: response.result,
        },
        None => TrainerFault::Transport(format!(
            "Response to unknown opcode 0x{:02X}: {}",
            response.request_opcode, response.result
        )),
    };
    tracing::warn!("{}", fault);
    let _ = events.send(TrainerEvent::Error(fault));
}
