use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use truckroute_api_client::TruckRouteClient;
use truckroute_client_core::config::normalize_base_url;
use truckroute_client_core::{
    ClientConfig, CredentialStore, LoginRequest, LoginRequiredReason, NewTrip, Registration,
    SessionEvent, Trip, TripId, download_current_pdf, load_trip_logs,
};

mod render;

#[derive(Parser)]
#[command(name = "truckroute")]
#[command(about = "Plan truck trips and page through ELD daily logs")]
pub struct TruckRouteCli {
    /// API base URL, e.g. http://localhost:8000/api
    #[arg(long, global = true)]
    pub base_url: Option<String>,
    /// Credentials file to use instead of the default location
    #[arg(long, global = true)]
    pub credentials: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        email: String,
    },
    /// Log in and store the session tokens
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show who the stored session belongs to
    Whoami,
    /// Create, list, and inspect trips
    #[command(subcommand)]
    Trips(TripCommand),
    /// Show the planned route for a trip (latest trip by default)
    Route(TripSelector),
    /// Show one day of a trip's ELD logs
    Logs(DayArgs),
    /// Save one day of a trip's ELD logs as PDF
    Pdf {
        #[command(flatten)]
        day: DayArgs,
        /// Directory to write the PDF into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum TripCommand {
    /// List trips
    List,
    /// Show a single trip
    Show { id: TripId },
    /// Create a trip and plan its route
    Plan {
        #[arg(long)]
        current: String,
        #[arg(long)]
        pickup: String,
        #[arg(long)]
        dropoff: String,
        /// Hours already used in the current cycle
        #[arg(long, default_value_t = 0.0)]
        cycle_hours: f64,
    },
}

#[derive(Args)]
pub struct TripSelector {
    /// Trip id; defaults to the most recent trip
    pub trip: Option<TripId>,
}

#[derive(Args)]
pub struct DayArgs {
    #[command(flatten)]
    pub trip: TripSelector,
    /// Day number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub day: usize,
}

pub fn build_client(cli: &TruckRouteCli) -> Result<TruckRouteClient> {
    let mut config = ClientConfig::from_env().context("resolve TruckRoute config")?;
    if let Some(base_url) = cli.base_url.as_deref() {
        config.base_url = normalize_base_url(base_url).context("--base-url")?;
    }
    if let Some(path) = cli.credentials.clone() {
        config.credentials_path = path;
    }
    tracing::debug!(
        base_url = %config.base_url,
        credentials = %config.credentials_path.display(),
        "Using TruckRoute API"
    );
    let credentials = CredentialStore::from_file(config.credentials_path.clone());
    Ok(TruckRouteClient::new(config, credentials))
}

fn watch_session(client: &TruckRouteClient) {
    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::Refreshed => tracing::debug!("Session refreshed"),
                SessionEvent::LoginRequired { reason } => {
                    let reason = match reason {
                        LoginRequiredReason::MissingRefreshToken => "no refresh token stored",
                        LoginRequiredReason::RefreshFailed => "refresh was rejected",
                    };
                    tracing::warn!(reason, "Session expired; run `truckroute login`");
                }
            }
        }
    });
}

async fn resolve_trip(client: &TruckRouteClient, selector: &TripSelector) -> Result<Trip> {
    if let Some(id) = selector.trip {
        return client
            .get_trip(id)
            .await
            .with_context(|| format!("fetch trip {id}"));
    }
    match client.latest_trip().await.context("list trips")? {
        Some(trip) => Ok(trip),
        None => bail!("no trips yet; create one with `truckroute trips plan`"),
    }
}

pub async fn run(cli: TruckRouteCli) -> Result<()> {
    let client = build_client(&cli)?;
    watch_session(&client);

    match cli.command {
        Commands::Register {
            username,
            password,
            email,
        } => {
            let registration = Registration::new(&username, &password, &email)?;
            let created = client.register(&registration).await.context("register")?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        Commands::Login { username, password } => {
            let request = LoginRequest::new(&username, &password)?;
            client.login(&request).await.context("log in")?;
            println!("Logged in as {}", client.credentials().display_name());
        }
        Commands::Logout => {
            client.logout();
            println!("Logged out");
        }
        Commands::Whoami => {
            if client.credentials().is_authenticated() {
                println!("{}", client.credentials().display_name());
            } else {
                println!("Not logged in");
            }
        }
        Commands::Trips(TripCommand::List) => {
            let trips = client.list_trips().await.context("list trips")?;
            print!("{}", render::trips(&trips));
        }
        Commands::Trips(TripCommand::Show { id }) => {
            let trip = client
                .get_trip(id)
                .await
                .with_context(|| format!("fetch trip {id}"))?;
            print!("{}", render::trips(std::slice::from_ref(&trip)));
            if let Some(route) = trip.route(Utc::now()) {
                print!("{}", render::route(&route));
            }
        }
        Commands::Trips(TripCommand::Plan {
            current,
            pickup,
            dropoff,
            cycle_hours,
        }) => {
            let new_trip = NewTrip {
                current_location: current,
                pickup_location: pickup,
                dropoff_location: dropoff,
                current_cycle_hours: cycle_hours,
            };
            let (trip, planned) = client
                .create_and_plan_trip(&new_trip)
                .await
                .context("plan trip")?;
            println!("Planned trip #{}", trip.id);
            print!("{}", render::route(&planned.route(Utc::now())?));
        }
        Commands::Route(selector) => {
            let trip = resolve_trip(&client, &selector).await?;
            let route = match trip.route(Utc::now()) {
                Some(route) => route,
                None => client
                    .plan_trip(trip.id)
                    .await
                    .with_context(|| format!("plan trip {}", trip.id))?
                    .route(Utc::now())?,
            };
            print!("{}", render::route(&route));
        }
        Commands::Logs(args) => {
            let trip = resolve_trip(&client, &args.trip).await?;
            let mut pager = load_trip_logs(&client, trip.id)
                .await
                .with_context(|| format!("load logs for trip {}", trip.id))?;
            pager.jump_to(args.day.saturating_sub(1));
            print!("{}", render::log_day(&pager));
        }
        Commands::Pdf { day, out } => {
            let trip = resolve_trip(&client, &day.trip).await?;
            let mut pager = load_trip_logs(&client, trip.id)
                .await
                .with_context(|| format!("load logs for trip {}", trip.id))?;
            pager.jump_to(day.day.saturating_sub(1));
            let Some(export) = download_current_pdf(&client, &pager)
                .await
                .context("download log pdf")?
            else {
                bail!("trip {} has no logs", trip.id);
            };
            let path = out.join(&export.file_name);
            std::fs::write(&path, &export.bytes)
                .with_context(|| format!("write {}", path.display()))?;
            println!("Saved {}", path.display());
        }
    }
    Ok(())
}
