use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use interprocess::local_socket::{tokio::Stream, traits::tokio::Stream as _};
use qibla_logic::{Address, Coordinates, Fix, GPS_PROVIDER, SensorStatus};
use qibla_test_shared::{
    PlatformRequest, SessionRequest, TestingRequest, TestingResponse, get_socket_name, prelude::*,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
struct Cli {
    /// Name of the local socket the test daemon is listening on
    socket: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum SensorValue {
    Ok,
    LowAccuracy,
    NoSensor,
}

impl From<SensorValue> for Option<SensorStatus> {
    fn from(value: SensorValue) -> Self {
        match value {
            SensorValue::Ok => None,
            SensorValue::LowAccuracy => Some(SensorStatus::LowAccuracy),
            SensorValue::NoSensor => Some(SensorStatus::NoSensor),
        }
    }
}

#[derive(Subcommand)]
enum PlatformCommand {
    /// Switch a provider on or off
    Provider {
        name: String,
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Set the fix a provider remembers
    LastKnown {
        name: String,
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        long: f64,
        /// Defaults to now
        #[arg(long)]
        timestamp_ms: Option<u64>,
    },
    /// Make a provider forget its last known fix
    ForgetLastKnown { name: String },
    /// Make live update registration fail (or succeed again)
    FailSubscribe {
        #[arg(action = ArgAction::Set)]
        fail: bool,
    },
    /// Deliver a live fix to the active subscription
    Fix {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        long: f64,
        #[arg(long, default_value = GPS_PROVIDER)]
        provider: String,
        /// Defaults to now
        #[arg(long)]
        timestamp_ms: Option<u64>,
    },
    /// Answer place name lookups with this address
    Geocode {
        #[arg(long)]
        locality: Option<String>,
        #[arg(long)]
        sub_admin_area: Option<String>,
        #[arg(long)]
        country: Option<String>,
    },
    /// Make place name lookups fail
    GeocodeFail,
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Grant or revoke location permission
    Permission {
        #[arg(action = ArgAction::Set)]
        granted: bool,
    },
    /// Flip the global location services toggle
    LocationEnabled {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Report a compass heading, omit it to report none
    Heading {
        #[arg(allow_negative_numbers = true)]
        heading: Option<f32>,
    },
    /// Report the heading sensor's condition
    Sensor {
        #[arg(value_enum)]
        status: SensorValue,
    },
    /// Retry location acquisition
    Reactivate,
    /// Print the current snapshot
    Snapshot,
    /// End the session
    Quit,
}

#[derive(Subcommand)]
enum Commands {
    /// Change the simulated platform
    #[command(subcommand)]
    Platform(PlatformCommand),
    /// Feed the compass session
    #[command(subcommand)]
    Session(SessionCommand),
}

fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

fn mk_fix(lat: f64, long: f64, provider: String, timestamp_ms: Option<u64>) -> Fix {
    Fix::new(
        Coordinates { lat, long },
        timestamp_ms.unwrap_or_else(now_ms),
        provider,
    )
}

impl From<PlatformCommand> for PlatformRequest {
    fn from(value: PlatformCommand) -> Self {
        match value {
            PlatformCommand::Provider { name, enabled } => PlatformRequest::SetProviderEnabled {
                provider: name,
                enabled,
            },
            PlatformCommand::LastKnown {
                name,
                lat,
                long,
                timestamp_ms,
            } => PlatformRequest::SetLastKnown {
                fix: Some(mk_fix(lat, long, name.clone(), timestamp_ms)),
                provider: name,
            },
            PlatformCommand::ForgetLastKnown { name } => PlatformRequest::SetLastKnown {
                provider: name,
                fix: None,
            },
            PlatformCommand::FailSubscribe { fail } => PlatformRequest::FailSubscribe(fail),
            PlatformCommand::Fix {
                lat,
                long,
                provider,
                timestamp_ms,
            } => PlatformRequest::PushFix(mk_fix(lat, long, provider, timestamp_ms)),
            PlatformCommand::Geocode {
                locality,
                sub_admin_area,
                country,
            } => PlatformRequest::SetGeocodeResult(Some(Address {
                locality,
                sub_admin_area,
                country_name: country,
            })),
            PlatformCommand::GeocodeFail => PlatformRequest::SetGeocodeResult(None),
        }
    }
}

impl From<SessionCommand> for SessionRequest {
    fn from(value: SessionCommand) -> Self {
        match value {
            SessionCommand::Permission { granted } => SessionRequest::SetPermission(granted),
            SessionCommand::LocationEnabled { enabled } => {
                SessionRequest::SetLocationEnabled(enabled)
            }
            SessionCommand::Heading { heading } => SessionRequest::SetHeading(heading),
            SessionCommand::Sensor { status } => SessionRequest::SetSensorStatus(status.into()),
            SessionCommand::Reactivate => SessionRequest::Reactivate,
            SessionCommand::Snapshot => SessionRequest::GetSnapshot,
            SessionCommand::Quit => SessionRequest::Quit,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let cli = Cli::parse();

    let socket_name = get_socket_name(cli.socket.clone()).context("Failed to get socket name")?;

    let stream = Stream::connect(socket_name)
        .await
        .context("Failed to connect to socket")?;

    let req: TestingRequest = match cli.command {
        Commands::Platform(cmd) => PlatformRequest::from(cmd).into(),
        Commands::Session(cmd) => SessionRequest::from(cmd).into(),
    };

    let mut send = &stream;
    let mut encoded = serde_json::to_vec(&req).context("Failed to encode request")?;
    encoded.push(b'\n');
    send.write_all(&encoded)
        .await
        .context("Failed to send request")?;

    let mut recv = BufReader::new(&stream);
    let mut line = String::new();
    recv.read_line(&mut line)
        .await
        .context("Failed to read response")?;

    let resp: TestingResponse =
        serde_json::from_str(&line).context("Failed to parse response")?;

    if let TestingResponse::Error(why) = resp {
        bail!("Daemon reported an error: {why}");
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&resp).context("Failed to format response")?
    );

    Ok(())
}
