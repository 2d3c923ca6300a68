//! Session configuration
//!
//! A [`SessionConfig`] starts from defaults, is updated once from the driver
//! parameter list and is then proposed to the master. After the handshake the
//! negotiated [`SessionParams`] are written back into it. Bad option values
//! never abort configuration: the field keeps its default and a
//! [`ConfigWarning`] is logged and returned to the caller.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::constants::*;
use crate::error::{ConfigWarning, Error, Result};
use crate::network::SessionParams;

/// Network mode requested from the master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl NetworkMode {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkMode::Slow => "slow",
            NetworkMode::Normal => "normal",
            NetworkMode::Fast => "fast",
        }
    }

    /// Single-character code used on the wire by most net masters
    pub fn as_char(self) -> char {
        match self {
            NetworkMode::Slow => 's',
            NetworkMode::Normal => 'n',
            NetworkMode::Fast => 'f',
        }
    }
}

impl FromStr for NetworkMode {
    type Err = ConfigWarning;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "normal" => Ok(NetworkMode::Normal),
            "slow" => Ok(NetworkMode::Slow),
            "fast" => Ok(NetworkMode::Fast),
            other => Err(ConfigWarning::UnknownNetworkMode(other.to_string())),
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one slave session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    client_name: String,
    multicast_ip: String,
    udp_port: u16,
    mtu: u32,
    transport_sync: bool,
    send_audio_channels: usize,
    return_audio_channels: usize,
    send_midi_channels: usize,
    return_midi_channels: usize,
    sample_rate: u32,
    period_size: u32,
    slave_sync_mode: bool,
    network_mode: NetworkMode,
}

impl SessionConfig {
    /// Create a configuration with defaults for the given local audio clock.
    pub fn new(sample_rate: u32, period_size: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::Config("sample rate must be positive".into()));
        }
        if period_size == 0 {
            return Err(Error::Config("period size must be positive".into()));
        }

        Ok(Self {
            client_name: truncate_name(&host_name()).to_string(),
            multicast_ip: DEFAULT_MULTICAST_IP.to_string(),
            udp_port: DEFAULT_UDP_PORT,
            mtu: DEFAULT_MTU,
            transport_sync: true,
            send_audio_channels: DEFAULT_AUDIO_CHANNELS,
            return_audio_channels: DEFAULT_AUDIO_CHANNELS,
            send_midi_channels: 0,
            return_midi_channels: 0,
            sample_rate,
            period_size,
            slave_sync_mode: true,
            network_mode: NetworkMode::Normal,
        })
    }

    /// Apply a driver parameter list, in order.
    ///
    /// Returns every fallback that was taken. Each one has already been
    /// logged at warn level.
    pub fn apply_params(&mut self, params: &[DriverParam]) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        for param in params {
            if let Err(warning) = self.apply_param(param) {
                tracing::warn!("{}", warning);
                warnings.push(warning);
            }
        }
        warnings
    }

    fn apply_param(&mut self, param: &DriverParam) -> std::result::Result<(), ConfigWarning> {
        let value = &param.value;
        match param.key {
            ParamKey::MulticastIp => match value.as_text() {
                Some(ip) => self.set_multicast_ip(&ip),
                None => Err(invalid(param, &self.multicast_ip)),
            },
            ParamKey::UdpNetPort => {
                self.udp_port = value
                    .as_i64()
                    .and_then(|v| u16::try_from(v).ok())
                    .ok_or_else(|| invalid(param, self.udp_port))?;
                Ok(())
            }
            ParamKey::Mtu => {
                self.mtu = value
                    .as_i64()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| invalid(param, self.mtu))?;
                Ok(())
            }
            ParamKey::InputPorts => {
                self.send_audio_channels = value
                    .as_i64()
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(|| invalid(param, self.send_audio_channels))?;
                Ok(())
            }
            ParamKey::OutputPorts => {
                self.return_audio_channels = value
                    .as_i64()
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(|| invalid(param, self.return_audio_channels))?;
                Ok(())
            }
            ParamKey::ClientName => match value.as_text() {
                Some(name) => self.set_client_name(&name),
                None => Err(invalid(param, &self.client_name)),
            },
            ParamKey::TransportSync => {
                self.transport_sync = value
                    .as_bool()
                    .ok_or_else(|| invalid(param, u8::from(self.transport_sync)))?;
                Ok(())
            }
            ParamKey::Mode => match value.as_text() {
                Some(mode) => self.set_network_mode_str(&mode),
                None => Err(invalid(param, self.network_mode)),
            },
            // Presence alone turns slave sync mode on, whatever the value.
            ParamKey::SyncMode => {
                self.slave_sync_mode = true;
                Ok(())
            }
        }
    }

    /// Set the multicast address. An address that does not fit the 16-byte
    /// field is replaced by the default.
    pub fn set_multicast_ip(&mut self, ip: &str) -> std::result::Result<(), ConfigWarning> {
        if ip.len() < MULTICAST_IP_SIZE {
            self.multicast_ip = ip.to_string();
            Ok(())
        } else {
            self.multicast_ip = DEFAULT_MULTICAST_IP.to_string();
            Err(ConfigWarning::AddressTooLong {
                value: ip.to_string(),
                default: DEFAULT_MULTICAST_IP.to_string(),
            })
        }
    }

    /// Set the client name, truncating it to the name size the master accepts.
    pub fn set_client_name(&mut self, name: &str) -> std::result::Result<(), ConfigWarning> {
        let truncated = truncate_name(name);
        self.client_name = truncated.to_string();
        if truncated.len() == name.len() {
            Ok(())
        } else {
            Err(ConfigWarning::ClientNameTruncated {
                value: name.to_string(),
                truncated: truncated.to_string(),
            })
        }
    }

    /// Set the network mode from its name; unknown names select `normal`.
    pub fn set_network_mode_str(&mut self, mode: &str) -> std::result::Result<(), ConfigWarning> {
        match mode.parse() {
            Ok(mode) => {
                self.network_mode = mode;
                Ok(())
            }
            Err(warning) => {
                self.network_mode = NetworkMode::Normal;
                Err(warning)
            }
        }
    }

    /// Set the network mode.
    pub fn set_network_mode(&mut self, mode: NetworkMode) {
        self.network_mode = mode;
    }

    /// Set the master's UDP port.
    pub fn set_udp_port(&mut self, port: u16) {
        self.udp_port = port;
    }

    /// Set the MTU proposed to the master, in bytes.
    pub fn set_mtu(&mut self, mtu: u32) {
        self.mtu = mtu;
    }

    /// Set the sent (capture) and returned (playback) audio channel counts.
    pub fn set_audio_channels(&mut self, send: usize, ret: usize) {
        self.send_audio_channels = send;
        self.return_audio_channels = ret;
    }

    /// Follow the master's transport state.
    pub fn set_transport_sync(&mut self, enabled: bool) {
        self.transport_sync = enabled;
    }

    /// Run the slave in sync mode (`true`) or async mode (`false`).
    pub fn set_slave_sync_mode(&mut self, enabled: bool) {
        self.slave_sync_mode = enabled;
    }

    /// Update the period after a buffer size change on the host.
    pub fn set_period_size(&mut self, frames: u32) -> Result<()> {
        if frames == 0 {
            return Err(Error::Config("period size must be positive".into()));
        }
        self.period_size = frames;
        Ok(())
    }

    /// Overwrite the proposal with what the master accepted.
    pub fn apply_negotiated(&mut self, params: &SessionParams) -> Result<()> {
        if params.sample_rate == 0 || params.period_size == 0 {
            return Err(Error::Config(format!(
                "master negotiated an unusable clock: {} Hz, {} frames",
                params.sample_rate, params.period_size
            )));
        }
        if params.send_midi_channels > 0 || params.return_midi_channels > 0 {
            tracing::warn!(
                "Master offers {}/{} MIDI channels, MIDI is not bridged",
                params.send_midi_channels,
                params.return_midi_channels
            );
        }

        self.mtu = params.mtu;
        self.send_audio_channels = params.send_audio_channels;
        self.return_audio_channels = params.return_audio_channels;
        self.sample_rate = params.sample_rate;
        self.period_size = params.period_size;
        self.transport_sync = params.transport_sync;
        self.slave_sync_mode = params.slave_sync_mode;
        self.network_mode = params.network_mode;
        Ok(())
    }

    /// Name the slave announces to the master
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Multicast address of the master
    pub fn multicast_ip(&self) -> &str {
        &self.multicast_ip
    }

    /// UDP port of the master
    pub fn udp_port(&self) -> u16 {
        self.udp_port
    }

    /// MTU in bytes
    pub fn mtu(&self) -> u32 {
        self.mtu
    }

    /// Whether the master's transport state is followed
    pub fn transport_sync(&self) -> bool {
        self.transport_sync
    }

    /// Channels sent by the master, i.e. local capture channels
    pub fn send_audio_channels(&self) -> usize {
        self.send_audio_channels
    }

    /// Channels returned to the master, i.e. local playback channels
    pub fn return_audio_channels(&self) -> usize {
        self.return_audio_channels
    }

    /// Always zero for a proposal; MIDI is not bridged
    pub fn send_midi_channels(&self) -> usize {
        self.send_midi_channels
    }

    /// Always zero for a proposal; MIDI is not bridged
    pub fn return_midi_channels(&self) -> usize {
        self.return_midi_channels
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames per cycle
    pub fn period_size(&self) -> u32 {
        self.period_size
    }

    /// Sync mode when true, async mode when false
    pub fn slave_sync_mode(&self) -> bool {
        self.slave_sync_mode
    }

    /// Network latency mode
    pub fn network_mode(&self) -> NetworkMode {
        self.network_mode
    }
}

/// Result of [`configure`]
#[derive(Debug, Clone)]
pub struct Configured {
    pub config: SessionConfig,
    pub warnings: Vec<ConfigWarning>,
}

/// Build a session configuration from a driver parameter list.
///
/// Fails only when the local clock itself is unusable; every per-option
/// problem is reported in [`Configured::warnings`] instead.
pub fn configure(sample_rate: u32, period_size: u32, params: &[DriverParam]) -> Result<Configured> {
    let mut config = SessionConfig::new(sample_rate, period_size)?;
    let warnings = config.apply_params(params);
    Ok(Configured { config, warnings })
}

/// Driver parameter names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    MulticastIp,
    UdpNetPort,
    Mtu,
    InputPorts,
    OutputPorts,
    ClientName,
    TransportSync,
    Mode,
    SyncMode,
}

impl ParamKey {
    pub const ALL: [ParamKey; 9] = [
        ParamKey::MulticastIp,
        ParamKey::UdpNetPort,
        ParamKey::Mtu,
        ParamKey::InputPorts,
        ParamKey::OutputPorts,
        ParamKey::ClientName,
        ParamKey::TransportSync,
        ParamKey::Mode,
        ParamKey::SyncMode,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ParamKey::MulticastIp => "multicast_ip",
            ParamKey::UdpNetPort => "udp_net_port",
            ParamKey::Mtu => "mtu",
            ParamKey::InputPorts => "input_ports",
            ParamKey::OutputPorts => "output_ports",
            ParamKey::ClientName => "client_name",
            ParamKey::TransportSync => "transport_sync",
            ParamKey::Mode => "mode",
            ParamKey::SyncMode => "sync_mode",
        }
    }

    /// Legacy single-character option
    pub fn short(self) -> char {
        match self {
            ParamKey::MulticastIp => 'a',
            ParamKey::UdpNetPort => 'p',
            ParamKey::Mtu => 'M',
            ParamKey::InputPorts => 'C',
            ParamKey::OutputPorts => 'P',
            ParamKey::ClientName => 'n',
            ParamKey::TransportSync => 't',
            ParamKey::Mode => 'm',
            ParamKey::SyncMode => 'S',
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ParamKey::MulticastIp => "Multicast address",
            ParamKey::UdpNetPort => "UDP port",
            ParamKey::Mtu => "MTU to the master",
            ParamKey::InputPorts => "Number of audio input ports",
            ParamKey::OutputPorts => "Number of audio output ports",
            ParamKey::ClientName => "Name of the client",
            ParamKey::TransportSync => "Sync transport with master's",
            ParamKey::Mode => "Slow, normal or fast mode",
            ParamKey::SyncMode => "Sync mode (same as driver's sync mode)",
        }
    }

    /// Look up a key by long name or short character.
    pub fn lookup(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        let short = match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        };
        Self::ALL
            .into_iter()
            .find(|key| key.name() == name || Some(key.short()) == short)
    }
}

/// Value attached to a driver parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Flag,
}

impl ParamValue {
    fn as_text(&self) -> Option<String> {
        match self {
            ParamValue::Str(s) => Some(s.clone()),
            ParamValue::Int(v) => Some(v.to_string()),
            ParamValue::UInt(v) => Some(v.to_string()),
            ParamValue::Flag => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::UInt(v) => i64::try_from(*v).ok(),
            ParamValue::Str(s) => s.trim().parse().ok(),
            ParamValue::Flag => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Flag => Some(true),
            ParamValue::Int(v) => Some(*v != 0),
            ParamValue::UInt(v) => Some(*v != 0),
            ParamValue::Str(s) => match s.trim() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            },
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::UInt(v) => write!(f, "{}", v),
            ParamValue::Flag => f.write_str("<flag>"),
        }
    }
}

/// One entry of the driver parameter list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverParam {
    pub key: ParamKey,
    pub value: ParamValue,
}

impl DriverParam {
    pub fn new(key: ParamKey, value: ParamValue) -> Self {
        Self { key, value }
    }

    pub fn str(key: ParamKey, value: impl Into<String>) -> Self {
        Self::new(key, ParamValue::Str(value.into()))
    }

    pub fn int(key: ParamKey, value: i64) -> Self {
        Self::new(key, ParamValue::Int(value))
    }

    pub fn flag(key: ParamKey) -> Self {
        Self::new(key, ParamValue::Flag)
    }
}

impl FromStr for DriverParam {
    type Err = Error;

    /// Parses `name=value`, or a bare `name` for flags. Leading dashes are
    /// ignored so `--mtu=1400` and `-M=1400` are accepted too.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().trim_start_matches('-');
        let (name, value) = match s.split_once('=') {
            Some((name, value)) => (name.trim(), ParamValue::Str(value.trim().to_string())),
            None => (s, ParamValue::Flag),
        };
        let key = ParamKey::lookup(name)
            .ok_or_else(|| Error::Config(format!("unknown parameter '{}'", name)))?;
        Ok(Self { key, value })
    }
}

/// Options as stored in the TOML configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterOptions {
    pub multicast_ip: Option<String>,
    pub udp_net_port: Option<i64>,
    pub mtu: Option<i64>,
    pub input_ports: Option<i64>,
    pub output_ports: Option<i64>,
    pub client_name: Option<String>,
    pub transport_sync: Option<u64>,
    pub mode: Option<String>,
    pub sync_mode: bool,
}

impl AdapterOptions {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// `<config dir>/adapter.toml` for the current user
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "net-audio-adapter").map(|dirs| dirs.config_dir().join("adapter.toml"))
    }

    pub fn to_params(&self) -> Vec<DriverParam> {
        let mut params = Vec::new();
        if let Some(ip) = &self.multicast_ip {
            params.push(DriverParam::str(ParamKey::MulticastIp, ip.clone()));
        }
        if let Some(port) = self.udp_net_port {
            params.push(DriverParam::int(ParamKey::UdpNetPort, port));
        }
        if let Some(mtu) = self.mtu {
            params.push(DriverParam::int(ParamKey::Mtu, mtu));
        }
        if let Some(inputs) = self.input_ports {
            params.push(DriverParam::int(ParamKey::InputPorts, inputs));
        }
        if let Some(outputs) = self.output_ports {
            params.push(DriverParam::int(ParamKey::OutputPorts, outputs));
        }
        if let Some(name) = &self.client_name {
            params.push(DriverParam::str(ParamKey::ClientName, name.clone()));
        }
        if let Some(sync) = self.transport_sync {
            params.push(DriverParam::new(ParamKey::TransportSync, ParamValue::UInt(sync)));
        }
        if let Some(mode) = &self.mode {
            params.push(DriverParam::str(ParamKey::Mode, mode.clone()));
        }
        if self.sync_mode {
            params.push(DriverParam::flag(ParamKey::SyncMode));
        }
        params
    }
}

fn invalid(param: &DriverParam, fallback: impl fmt::Display) -> ConfigWarning {
    ConfigWarning::InvalidValue {
        key: param.key.name(),
        value: param.value.to_string(),
        fallback: fallback.to_string(),
    }
}

fn truncate_name(name: &str) -> &str {
    let max = CLIENT_NAME_SIZE - 1;
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "net-adapter".to_string())
}
