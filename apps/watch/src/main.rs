use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{
    http, BookingClient, ClientEvent, ClientOptions, FilterCriteria, PartySizeFilter,
    StatusFilter, ViewProjector,
};
use shared::{
    domain::{Booking, BookingId},
    protocol::{BookingAction, ServerEvent},
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Follow the live booking feed from a terminal")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    server_url: String,
    /// Case-insensitive match on venue, event type, customer or id.
    #[arg(long, default_value = "")]
    search: String,
    /// all, pending, confirmed or declined.
    #[arg(long, default_value = "all")]
    status: StatusFilter,
    /// all, small, medium, large or xlarge.
    #[arg(long, default_value = "all")]
    size: PartySizeFilter,
    /// Print the current bookings over HTTP and exit.
    #[arg(long)]
    once: bool,
    #[arg(long, value_name = "BOOKING_ID", conflicts_with = "decline")]
    confirm: Option<i64>,
    #[arg(long, value_name = "BOOKING_ID")]
    decline: Option<i64>,
}

impl Args {
    fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            search: self.search.clone(),
            status: self.status,
            party_size: self.size,
        }
    }

    fn action(&self) -> Option<(BookingId, BookingAction)> {
        match (self.confirm, self.decline) {
            (Some(id), _) => Some((BookingId(id), BookingAction::Confirm)),
            (None, Some(id)) => Some((BookingId(id), BookingAction::Decline)),
            (None, None) => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    if args.once {
        return print_once(&args).await;
    }

    let client = BookingClient::connect_with(
        &args.server_url,
        ClientOptions {
            criteria: args.criteria(),
            ..ClientOptions::default()
        },
    )
    .await
    .context("failed to connect to booking feed")?;

    match args.action() {
        Some((booking_id, action)) => run_action(&client, booking_id, action).await,
        None => follow(&client).await,
    }
}

async fn print_once(args: &Args) -> Result<()> {
    let http_client = reqwest::Client::new();
    let listing = http::fetch_bookings(&http_client, &args.server_url).await?;
    let stats = http::fetch_stats(&http_client, &args.server_url).await?;

    let mut view = ViewProjector::new();
    view.load_snapshot(listing.bookings, Some(stats.stats));
    view.set_criteria(args.criteria());
    print_view(&view);
    Ok(())
}

async fn run_action(client: &BookingClient, booking_id: BookingId, action: BookingAction) -> Result<()> {
    let mut events = client.subscribe_events();
    client.request_action(booking_id, action).await?;
    info!(booking_id = booking_id.0, action = action.as_str(), "action sent");

    loop {
        match events.recv().await {
            Ok(ClientEvent::Server(ServerEvent::ActionSucceeded { booking_id: id, .. }))
                if id == booking_id =>
            {
                println!("booking #{booking_id}: {} succeeded", action.as_str());
                return Ok(());
            }
            Ok(ClientEvent::Server(ServerEvent::ActionFailed {
                booking_id: id,
                reason,
                ..
            })) if id == booking_id => {
                bail!("booking #{booking_id}: {} failed ({})", action.as_str(), reason.as_str());
            }
            Ok(ClientEvent::ActionTimedOut { booking_id: id, .. }) if id == booking_id => {
                bail!("booking #{booking_id}: no response from server");
            }
            Ok(ClientEvent::Disconnected | ClientEvent::Closed) | Err(RecvError::Closed) => {
                bail!("connection closed before an outcome arrived");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
        }
    }
}

async fn follow(client: &BookingClient) -> Result<()> {
    let mut events = client.subscribe_events();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(ClientEvent::ViewChanged { visible }) => {
                    info!(visible, "view changed");
                    client.view(print_view).await;
                }
                Ok(ClientEvent::Server(ServerEvent::Error(error))) => warn!(%error, "server error"),
                Ok(ClientEvent::Error(message)) => warn!(%message, "client error"),
                Ok(ClientEvent::Disconnected) => warn!("connection lost; reconnecting"),
                Ok(ClientEvent::Reconnected { attempt }) => info!(attempt, "reconnected"),
                Ok(ClientEvent::Closed) | Err(RecvError::Closed) => {
                    bail!("connection to server closed");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
            }
        }
    }
}

fn print_view(view: &ViewProjector) {
    let criteria = view.criteria();
    println!(
        "-- {} of {} bookings (search={:?} status={} size={})",
        view.filtered().len(),
        view.len(),
        criteria.search.trim(),
        criteria.status,
        criteria.party_size
    );
    if let Some(stats) = view.stats() {
        println!(
            "   pending={} confirmed={} declined={} clients={} uptime={}s",
            stats.bookings.pending_bookings,
            stats.bookings.confirmed_bookings,
            stats.bookings.declined_bookings,
            stats.connected_clients,
            stats.server_uptime_secs
        );
    }
    for booking in view.filtered() {
        println!("{}", booking_line(booking));
    }
}

fn booking_line(booking: &Booking) -> String {
    format!(
        "#{:<4} {:<9} {:>4}  {} | {} | {} | {}",
        booking.id.0,
        booking.status.as_str(),
        booking.party_size.0,
        booking.venue_name,
        booking.party_type,
        booking.customer_name,
        booking.time
    )
}
