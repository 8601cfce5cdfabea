use crate::brain::{BrainFailure, CorrectiveActions};
use crate::brain_fail;
use crate::config::{DeviceId, GatewayConfig, PanelConfig, TemperatureUnit, ZoneConfig};
use crate::io::heaters::HeaterControl;
use crate::io::panel::{PanelState, PanelView, Submode, ThermostatMode};
use crate::io::store::StateStore;
use crate::io::temperatures::{SensorReading, TemperatureManager};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use futures::future::try_join_all;
use log::warn;
use reqwest::Client;
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Selector levels used by the gateway for the mode register.
const LEVEL_OFF: u32 = 0;
const LEVEL_AUTO: u32 = 10;
const LEVEL_FORCED: u32 = 20;

/// Selector levels for the submode register.
const LEVEL_NORMAL: u32 = 10;
const LEVEL_ECONOMY: u32 = 20;

const LAST_UPDATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug)]
pub enum GatewayError {
    Network(reqwest::Error),
    Api(String),
    Malformed(String),
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self {
            GatewayError::Network(e) => write!(f, "Network Error: {}", e),
            GatewayError::Api(e) => write!(f, "Gateway API Error: {}", e),
            GatewayError::Malformed(e) => write!(f, "Malformed Response: {}", e),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Network(e)
    }
}

/// HTTP/JSON client for the home automation gateway. All four IO concerns of
/// the zone (temperatures, heater switches, panel registers, persisted state)
/// go through the gateway's single json endpoint.
#[derive(Clone)]
pub struct GatewayClient {
    base_url: String,
    unit: TemperatureUnit,
    request_timeout: Duration,
    panel: PanelConfig,
    heaters: Vec<DeviceId>,
    client: Client,
}

impl GatewayClient {
    pub fn new(gateway: &GatewayConfig, zone: &ZoneConfig) -> Self {
        Self {
            base_url: format!("http://{}:{}/json.htm", gateway.get_ip(), gateway.get_port()),
            unit: gateway.get_unit(),
            request_timeout: gateway.get_request_timeout(),
            panel: zone.get_panel().clone(),
            heaters: zone.get_heaters().to_vec(),
            client: Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        params: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(params)
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| GatewayError::Malformed(e.to_string()))
    }

    async fn command(&self, params: &[(&str, String)]) -> Result<(), GatewayError> {
        let response: ApiResponse = self.get_json(params).await?;
        if response.status != "OK" {
            return Err(GatewayError::Api(format!(
                "Gateway returned status '{}'",
                response.status
            )));
        }
        Ok(())
    }

    async fn get_device(&self, idx: DeviceId) -> Result<DeviceData, GatewayError> {
        let response: DevicesResponse = self
            .get_json(&[
                ("type", "devices".to_owned()),
                ("rid", idx.to_string()),
            ])
            .await?;
        response
            .result
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Malformed(format!("No device data for idx {}", idx)))
    }

    async fn set_selector_level(&self, idx: DeviceId, level: u32) -> Result<(), GatewayError> {
        self.command(&[
            ("type", "command".to_owned()),
            ("param", "switchlight".to_owned()),
            ("idx", idx.to_string()),
            ("switchcmd", "Set Level".to_owned()),
            ("level", level.to_string()),
        ])
        .await
    }

    async fn update_device_svalue(&self, idx: DeviceId, svalue: String) -> Result<(), GatewayError> {
        self.command(&[
            ("type", "command".to_owned()),
            ("param", "udevice".to_owned()),
            ("idx", idx.to_string()),
            ("nvalue", "0".to_owned()),
            ("svalue", svalue),
        ])
        .await
    }

    async fn flag_timed_out(&self, idx: DeviceId, flag: bool) -> Result<(), GatewayError> {
        self.command(&[
            ("type", "command".to_owned()),
            ("param", "flagtimedout".to_owned()),
            ("idx", idx.to_string()),
            ("flag", flag.to_string()),
        ])
        .await
    }
}

#[async_trait]
impl TemperatureManager for GatewayClient {
    async fn retrieve_readings(&self, sensors: &[DeviceId]) -> Result<Vec<SensorReading>, String> {
        let response: DevicesResponse = self
            .get_json(&[
                ("type", "devices".to_owned()),
                ("filter", "temp".to_owned()),
                ("used", "true".to_owned()),
            ])
            .await
            .map_err(|e| e.to_string())?;

        let mut readings = Vec::new();
        for device in response.result {
            let idx = match device.idx.parse::<u32>() {
                Ok(idx) => DeviceId(idx),
                Err(_) => continue,
            };
            if !sensors.contains(&idx) {
                continue;
            }
            let temp = match device.temp {
                Some(temp) => temp,
                None => {
                    warn!("Device {} is not a temperature sensor", idx);
                    continue;
                }
            };
            match device.last_update.as_deref().map(parse_last_update) {
                Some(Ok(last_update)) => {
                    readings.push(SensorReading::new(idx, temp, last_update));
                }
                Some(Err(err)) => warn!("Skipping sensor {}: bad LastUpdate: {}", idx, err),
                None => warn!("Skipping sensor {}: no LastUpdate field", idx),
            }
        }
        Ok(readings)
    }

    async fn get_timeout_threshold(&self) -> Result<chrono::Duration, String> {
        let response: SettingsResponse = self
            .get_json(&[("type", "command".to_owned()), ("param", "getsettings".to_owned())])
            .await
            .map_err(|e| e.to_string())?;
        Ok(chrono::Duration::minutes(response.sensor_timeout))
    }
}

/// The gateway reports last-update times as naive local timestamps.
fn parse_last_update(s: &str) -> Result<chrono::DateTime<Utc>, String> {
    let naive = NaiveDateTime::parse_from_str(s, LAST_UPDATE_FORMAT)
        .map_err(|e| format!("'{}': {}", s, e))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| format!("'{}' is not a valid local time", s))
}

#[async_trait]
impl HeaterControl for GatewayClient {
    async fn try_get_heaters(&self) -> Result<bool, String> {
        for heater in &self.heaters {
            let device = self.get_device(*heater).await.map_err(|e| e.to_string())?;
            if device.status.as_deref() == Some("On") {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn try_set_heaters(&mut self, on: bool) -> Result<(), BrainFailure> {
        let cmd = if on { "On" } else { "Off" };
        for heater in &self.heaters {
            self.command(&[
                ("type", "command".to_owned()),
                ("param", "switchlight".to_owned()),
                ("idx", heater.to_string()),
                ("switchcmd", cmd.to_owned()),
            ])
            .await
            .map_err(|e| {
                brain_fail!(
                    format!("Failed to switch heater {} {}: {}", heater, cmd, e),
                    CorrectiveActions::unknown_heaters()
                )
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl PanelView for GatewayClient {
    async fn read_panel(&self) -> Result<PanelState, String> {
        // One round-trip per register, dispatched concurrently.
        let devices: [DeviceData; 5] = try_join_all([
            self.get_device(self.panel.get_mode_idx()),
            self.get_device(self.panel.get_submode_idx()),
            self.get_device(self.panel.get_pause_idx()),
            self.get_device(self.panel.get_setpoint_normal_idx()),
            self.get_device(self.panel.get_setpoint_economy_idx()),
        ])
        .await
        .map_err(|e| e.to_string())?
        .try_into()
        .map_err(|_| "Gateway device query came back short".to_owned())?;
        let [mode_device, submode_device, pause_device, normal_device, economy_device] = devices;

        let mode = match mode_device.level {
            Some(LEVEL_OFF) => ThermostatMode::Off,
            Some(LEVEL_AUTO) => ThermostatMode::Auto,
            Some(LEVEL_FORCED) => ThermostatMode::Forced,
            other => return Err(format!("Unrecognised mode selector level {:?}", other)),
        };
        let submode = match submode_device.level {
            Some(LEVEL_NORMAL) | Some(LEVEL_OFF) => Submode::Normal,
            Some(LEVEL_ECONOMY) => Submode::Economy,
            other => return Err(format!("Unrecognised submode selector level {:?}", other)),
        };
        let pause_requested = pause_device.status.as_deref() == Some("On");

        Ok(PanelState {
            mode,
            submode,
            pause_requested,
            setpoint_normal: self.unit.to_celsius(parse_setpoint(&normal_device)?),
            setpoint_economy: self.unit.to_celsius(parse_setpoint(&economy_device)?),
        })
    }

    async fn update_temperature(&self, value: f32) -> Result<(), String> {
        self.update_device_svalue(self.panel.get_temp_display_idx(), format!("{:.1}", value))
            .await
            .map_err(|e| e.to_string())
    }

    async fn set_mode(&self, mode: ThermostatMode) -> Result<(), String> {
        let level = match mode {
            ThermostatMode::Off => LEVEL_OFF,
            ThermostatMode::Auto => LEVEL_AUTO,
            ThermostatMode::Forced => LEVEL_FORCED,
        };
        self.set_selector_level(self.panel.get_mode_idx(), level)
            .await
            .map_err(|e| e.to_string())
    }

    async fn set_register_error(&self, error: bool) -> Result<(), String> {
        self.flag_timed_out(self.panel.get_mode_idx(), error)
            .await
            .map_err(|e| e.to_string())?;
        self.flag_timed_out(self.panel.get_temp_display_idx(), error)
            .await
            .map_err(|e| e.to_string())
    }

    async fn refresh_setpoints(&self) -> Result<(), String> {
        for idx in [
            self.panel.get_setpoint_normal_idx(),
            self.panel.get_setpoint_economy_idx(),
        ] {
            let device = self.get_device(idx).await.map_err(|e| e.to_string())?;
            let svalue = device
                .set_point
                .ok_or_else(|| format!("Device {} has no setpoint to refresh", idx))?;
            self.update_device_svalue(idx, svalue)
                .await
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

fn parse_setpoint(device: &DeviceData) -> Result<f32, String> {
    let raw = device
        .set_point
        .as_deref()
        .ok_or_else(|| format!("Device {} has no SetPoint field", device.idx))?;
    raw.parse::<f32>()
        .map_err(|e| format!("Bad setpoint '{}' on device {}: {}", raw, device.idx, e))
}

#[async_trait]
impl StateStore for GatewayClient {
    async fn load_variable(&self, name: &str) -> Result<Option<String>, String> {
        let response: UserVariablesResponse = self
            .get_json(&[
                ("type", "command".to_owned()),
                ("param", "getuservariables".to_owned()),
            ])
            .await
            .map_err(|e| e.to_string())?;
        Ok(response
            .result
            .into_iter()
            .find(|var| var.name == name)
            .map(|var| var.value))
    }

    async fn save_variable(&self, name: &str, value: &str) -> Result<(), String> {
        let update = self
            .command(&[
                ("type", "command".to_owned()),
                ("param", "updateuservariable".to_owned()),
                ("vname", name.to_owned()),
                ("vtype", "2".to_owned()),
                ("vvalue", value.to_owned()),
            ])
            .await;
        if let Err(GatewayError::Api(_)) = update {
            // Variable probably doesn't exist yet - create it.
            return self
                .command(&[
                    ("type", "command".to_owned()),
                    ("param", "saveuservariable".to_owned()),
                    ("vname", name.to_owned()),
                    ("vtype", "2".to_owned()),
                    ("vvalue", value.to_owned()),
                ])
                .await
                .map_err(|e| e.to_string());
        }
        update.map_err(|e| e.to_string())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ApiResponse {
    status: String,
    #[serde(default)]
    #[allow(dead_code)]
    title: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DevicesResponse {
    #[allow(dead_code)]
    status: String,
    #[serde(default)]
    result: Vec<DeviceData>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceData {
    #[serde(rename = "idx")] // This is not pascal case, unlike every other field.
    idx: String,
    #[serde(default)]
    temp: Option<f32>,
    #[serde(default)]
    last_update: Option<String>,
    #[serde(default)]
    level: Option<u32>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    set_point: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UserVariablesResponse {
    #[serde(default)]
    result: Vec<UserVariable>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct UserVariable {
    name: String,
    value: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct SettingsResponse {
    sensor_timeout: i64,
}
