use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use truckroute_client_core::{LogPager, RouteData, Trip};

const NOT_AVAILABLE: &str = "N/A";

fn clock(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn or_na(value: Option<&str>) -> &str {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(NOT_AVAILABLE)
}

fn number_or_na(value: Option<f64>) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), |value| format!("{value}"))
}

pub fn trips(trips: &[Trip]) -> String {
    if trips.is_empty() {
        return "No trips yet.\n".to_string();
    }
    let mut out = String::new();
    for trip in trips {
        let _ = writeln!(
            out,
            "#{:<5} {} -> {} (from {}, {} cycle hrs used)",
            trip.id,
            trip.pickup_location,
            trip.dropoff_location,
            trip.current_location,
            trip.current_cycle_hours
        );
    }
    out
}

pub fn route(route: &RouteData) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Route: {} mi, ~{} hrs, {} rest stop(s), {} fuel stop(s)",
        route.total_distance,
        route.total_duration_hours,
        route.rest_stops(),
        route.fuel_stops()
    );
    for (index, point) in route.points.iter().enumerate() {
        let _ = write!(
            out,
            "{:>3}. {:<8} {:<28} {}",
            index + 1,
            point.kind.as_str(),
            point.location,
            clock(point.time)
        );
        if let Some(minutes) = point.duration_minutes {
            let _ = write!(out, " ({minutes} min)");
        }
        out.push('\n');
    }
    out
}

pub fn log_day(pager: &LogPager) -> String {
    let Some(sheet) = pager.current_sheet() else {
        return "No logs for this trip.\n".to_string();
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", pager.day_label());
    let summary = &sheet.summary;
    let _ = writeln!(
        out,
        "Driving {} hrs | On duty {} hrs | Off duty {} hrs | Sleeper {} hrs | Cycle remaining {} hrs",
        summary.driving_hours,
        summary.on_duty_hours,
        summary.off_duty_hours,
        summary.sleeper_hours,
        summary.cycle_remaining
    );

    if !sheet.entries.is_empty() {
        out.push_str("\nEntries:\n");
        for entry in &sheet.entries {
            let _ = writeln!(
                out,
                "  {}-{}  {:<9} {}  {}",
                entry.start, entry.end, entry.status, entry.location, entry.notes
            );
        }
    }

    if !sheet.duty_status_changes.is_empty() {
        out.push_str("\nDuty status changes:\n");
        for change in &sheet.duty_status_changes {
            let _ = writeln!(
                out,
                "  {:<9} {} -> {}  {}  odo {}  {}  {} hrs",
                change.display_status(),
                change.start_time,
                or_na(change.end_time.as_deref()),
                change.location,
                number_or_na(change.odometer),
                change.remarks,
                number_or_na(change.duration_hours)
            );
        }
    }

    out.push_str("\nVehicle:\n");
    let _ = writeln!(out, "  Carrier: {}", or_na(sheet.carrier_name.as_deref()));
    let _ = writeln!(out, "  Address: {}", or_na(sheet.carrier_address.as_deref()));
    let _ = writeln!(
        out,
        "  Odometer: {} -> {} ({} mi)",
        number_or_na(sheet.starting_odometer),
        number_or_na(sheet.ending_odometer),
        number_or_na(sheet.total_miles)
    );
    let _ = writeln!(out, "  Signature: {}", or_na(sheet.driver_signature.as_deref()));
    let _ = writeln!(out, "  Notes: {}", or_na(sheet.notes.as_deref()));

    let grid = match pager.current_asset() {
        Some(asset) => format!(
            "{}, {} bytes",
            asset.content_type.as_deref().unwrap_or("application/octet-stream"),
            asset.bytes.len()
        ),
        None => "unavailable".to_string(),
    };
    let _ = writeln!(out, "\nGrid: {grid}");
    out
}
