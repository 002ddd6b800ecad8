//! One-shot listening-mode commands.
//!
//! In listening mode the firmware answers single-character commands with a
//! short burst of text. [`DeviceConsole`] writes a command, waits for the
//! first idle-delimited batch of output and hands it to a parser.

use std::net::Ipv4Addr;
use std::sync::LazyLock;
use std::time::Duration;

use futures_util::StreamExt;
use log::debug;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use super::conversation::ConversationBuilder;
use crate::channel::{DEFAULT_IDLE_PERIOD, StreamBatcher};
use crate::error::{ChannelError, DriverError, Error, Result, TransportError};

/// How long a command may take to answer unless told otherwise.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

const CLAIM_CODE_PROBE_TIMEOUT: Duration = Duration::from_millis(500);
const CLAIM_CODE_STEP_TIMEOUT: Duration = Duration::from_secs(2);

static DEVICE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Your (core|device) id is\s+(\w+)").expect("valid regex"));
static CELLULAR_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([a-fA-F0-9]{24})\s+").expect("valid regex"));
static IMEI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"IMEI: (\w+)").expect("valid regex"));
static ICCID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ICCID: (\w+)").expect("valid regex"));
static FIRMWARE_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"system firmware version:\s+([\w.]+)").expect("valid regex"));
static MAC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9a-fA-F]{2}:){1,5}([0-9a-fA-F]{2})?").expect("valid regex")
});
static CLAIMED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Device claimed: (\w+)").expect("valid regex"));

/// OUIs of the radio modules whose manufacturing firmware may report a
/// truncated MAC address.
const USI_OUIS: [[&str; 3]; 2] = [["6c", "0b", "84"], ["44", "39", "c4"]];

/// Identity reported by the `i` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub id: String,
    /// Cellular devices only.
    pub imei: Option<String>,
    /// Cellular devices only.
    pub iccid: Option<String>,
}

/// Extract the device identity from `i` output.
pub fn parse_device_id(output: &str) -> Option<DeviceIdentity> {
    if let Some(caps) = DEVICE_ID_RE.captures(output) {
        return Some(DeviceIdentity {
            id: caps[2].to_string(),
            imei: None,
            iccid: None,
        });
    }

    let caps = CELLULAR_ID_RE.captures(output)?;
    let field = |re: &Regex| re.captures(output).map(|c| c[1].to_string());
    Some(DeviceIdentity {
        id: caps[1].to_string(),
        imei: field(&IMEI_RE),
        iccid: field(&ICCID_RE),
    })
}

/// Extract the system firmware version from `v` output.
pub fn parse_firmware_version(output: &str) -> Option<String> {
    FIRMWARE_VERSION_RE
        .captures(output)
        .map(|caps| caps[1].to_string())
}

/// Extract the MAC address from `m` output, lower-cased.
///
/// Manufacturing firmware sometimes drops leading bytes. A short address is
/// left-padded with `00`; if one of its first three bytes then lines up
/// with a known module OUI, that OUI is put back. Short addresses that do
/// not line up are returned as printed.
pub fn parse_mac_address(output: &str) -> Option<String> {
    let mac = MAC_RE.find(output)?.as_str().to_lowercase();
    if mac.len() >= 17 {
        return Some(mac);
    }

    let mut bytes: Vec<&str> = mac.trim_end_matches(':').split(':').collect();
    while bytes.len() < 6 {
        bytes.insert(0, "00");
    }

    for oui in USI_OUIS {
        if (0..oui.len()).rev().any(|i| bytes[i] == oui[i]) {
            let restored: Vec<&str> = oui.iter().copied().chain(bytes[3..].iter().copied()).collect();
            return Some(restored.join(":"));
        }
    }

    Some(mac)
}

/// Antenna selection for the doctor `a` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Antenna {
    Internal,
    External,
}

impl Antenna {
    fn command(self) -> &'static str {
        match self {
            Antenna::Internal => "ai",
            Antenna::External => "ae",
        }
    }
}

/// IP configuration for the doctor `i` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpConfig {
    Dynamic,
    Static {
        device_ip: Ipv4Addr,
        netmask: Ipv4Addr,
        gateway: Ipv4Addr,
        dns: Ipv4Addr,
    },
}

impl IpConfig {
    /// `id`, or `is` followed by the four addresses as 32-bit integers.
    pub fn command(&self) -> String {
        match self {
            IpConfig::Dynamic => "id".to_string(),
            IpConfig::Static {
                device_ip,
                netmask,
                gateway,
                dns,
            } => format!(
                "is{} {} {} {}\n",
                u32::from(*device_ip),
                u32::from(*netmask),
                u32::from(*gateway),
                u32::from(*dns)
            ),
        }
    }
}

/// Command interface to a device in listening mode.
///
/// # Example
///
/// ```rust,no_run
/// use ferriflash::driver::DeviceConsole;
/// use ferriflash::transport::{SerialConfig, SerialTransport};
///
/// # async fn example() -> Result<(), ferriflash::Error> {
/// let port = SerialTransport::open(&SerialConfig::new("/dev/ttyACM0"))?;
/// let mut console = DeviceConsole::new(port);
/// let id = console.device_id().await?;
/// println!("Your device id is {}", id.id);
/// # Ok(())
/// # }
/// ```
pub struct DeviceConsole<P> {
    port: P,
    idle_period: Duration,
    timeout: Duration,
}

impl<P> DeviceConsole<P>
where
    P: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an open port.
    pub fn new(port: P) -> Self {
        Self {
            port,
            idle_period: DEFAULT_IDLE_PERIOD,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Idle period that ends a response (default 250 ms).
    pub fn idle_period(mut self, idle: Duration) -> Self {
        self.idle_period = idle;
        self
    }

    /// Default response timeout (default 5 s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get a mutable reference to the port.
    pub fn get_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Take back the port.
    pub fn into_inner(self) -> P {
        self.port
    }

    /// Write `command` and return the first batch of output.
    pub async fn issue_command(&mut self, command: &str) -> Result<String> {
        self.issue_command_with_timeout(command, self.timeout).await
    }

    /// Like [`issue_command`](Self::issue_command) with an explicit timeout.
    ///
    /// Output arriving after the first batch is not consumed here.
    pub async fn issue_command_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String> {
        debug!("serial command: {:?}", command);
        self.port.write_all(command.as_bytes()).await?;
        self.port.flush().await?;

        let mut batches = StreamBatcher::new(&mut self.port, self.idle_period);
        match tokio::time::timeout(timeout, batches.next()).await {
            Ok(Some(Ok(batch))) => Ok(String::from_utf8_lossy(&batch).into_owned()),
            Ok(Some(Err(e))) => Err(TransportError::Io(e).into()),
            Ok(None) => Err(ChannelError::ClosedEarly.into()),
            Err(_) => Err(ChannelError::Timeout(timeout).into()),
        }
    }

    /// Device id (`i`).
    pub async fn device_id(&mut self) -> Result<DeviceIdentity> {
        let output = self.issue_command("i").await?;
        parse_device_id(&output).ok_or_else(|| unexpected("Unable to find device id in response"))
    }

    /// System firmware version (`v`).
    pub async fn system_firmware_version(&mut self) -> Result<String> {
        let output = self.issue_command("v").await?;
        parse_firmware_version(&output)
            .ok_or_else(|| unexpected("Unable to find system firmware version in response"))
    }

    /// Raw system information (`s`).
    pub async fn system_information(&mut self) -> Result<String> {
        self.issue_command("s").await
    }

    /// Wi-Fi MAC address (`m`).
    pub async fn mac_address(&mut self) -> Result<String> {
        let output = self.issue_command("m").await?;
        parse_mac_address(&output).ok_or_else(|| unexpected("Unable to find mac address in response"))
    }

    /// Whether the firmware accepts claim codes.
    ///
    /// Firmware without claim code support does not answer the `c` probe at
    /// all, so a timeout means `false`.
    pub async fn supports_claim_code(&mut self) -> Result<bool> {
        match self
            .issue_command_with_timeout("c", CLAIM_CODE_PROBE_TIMEOUT)
            .await
        {
            Ok(output) => Ok(CLAIMED_RE.is_match(&output)),
            Err(Error::Channel(ChannelError::Timeout(_))) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Store `claim_code` on the device.
    pub async fn send_claim_code(&mut self, claim_code: &str) -> Result<()> {
        ConversationBuilder::new()
            .idle_period(self.idle_period)
            .command("C")
            .expect("Enter 63-digit claim code: ", CLAIM_CODE_STEP_TIMEOUT)
            .reply(format!("{}\n", claim_code))
            .expect(format!("Claim code set to: {}", claim_code), CLAIM_CODE_STEP_TIMEOUT)
            .finish()
            .build()?
            .run(&mut self.port)
            .await?;
        Ok(())
    }

    /// Select the antenna.
    pub async fn set_antenna(&mut self, antenna: Antenna) -> Result<String> {
        self.issue_command(antenna.command()).await
    }

    /// Select dynamic or static IP configuration.
    pub async fn set_ip_config(&mut self, config: IpConfig) -> Result<String> {
        self.issue_command(&config.command()).await
    }

    /// Set the soft-AP SSID prefix.
    pub async fn set_soft_ap_prefix(&mut self, prefix: &str) -> Result<String> {
        self.issue_command(&format!("p{}\n", prefix)).await
    }

    /// Erase the emulated EEPROM.
    pub async fn clear_eeprom(&mut self) -> Result<String> {
        self.issue_command("e").await
    }

    /// Forget stored Wi-Fi credentials.
    pub async fn clear_wifi(&mut self) -> Result<String> {
        self.issue_command("c").await
    }

    /// Re-enter listening mode.
    pub async fn enter_listen_mode(&mut self) -> Result<String> {
        self.issue_command("l").await
    }
}

fn unexpected(message: &str) -> Error {
    DriverError::UnexpectedResponse {
        message: message.to_string(),
    }
    .into()
}
