//! Trip payloads and their mapping into an ordered route.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::decode::{lenient_f64, lenient_opt_f64};
use crate::error::ApiError;

pub type TripId = i64;

const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRouteData {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub distance: f64,
    /// Total driving time in seconds.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStop {
    #[serde(rename = "type")]
    pub category: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_arrival: Option<String>,
    /// Hours.
    #[serde(
        default,
        deserialize_with = "lenient_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripLocations {
    pub current_location: String,
    pub pickup_location: String,
    pub dropoff_location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub current_location: String,
    pub pickup_location: String,
    pub dropoff_location: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub current_cycle_hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_data: Option<RawRouteData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stops: Vec<RawStop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Trip {
    pub fn locations(&self) -> TripLocations {
        TripLocations {
            current_location: self.current_location.clone(),
            pickup_location: self.pickup_location.clone(),
            dropoff_location: self.dropoff_location.clone(),
        }
    }

    /// Route for a trip that already carries its plan, if it has one.
    pub fn route(&self, reference_time: DateTime<Utc>) -> Option<RouteData> {
        let route = self.route_data.as_ref()?;
        Some(map_trip(
            route,
            &self.locations(),
            &self.stops,
            reference_time,
        ))
    }
}

/// Create payload for `POST /trips/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrip {
    pub current_location: String,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub current_cycle_hours: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLocations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropoff_location: Option<String>,
}

/// Response of `POST /trips/{id}/plan/`.
///
/// Locations arrive nested under `trip` or flattened at the top level
/// depending on the backend version; the nested value wins when both exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannedTrip {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip: Option<PlanLocations>,
    #[serde(flatten)]
    pub flat: PlanLocations,
    #[serde(default)]
    pub route_data: RawRouteData,
    #[serde(default)]
    pub stops: Vec<RawStop>,
}

impl PlannedTrip {
    pub fn locations(&self) -> Result<TripLocations, ApiError> {
        let nested = self.trip.as_ref();
        let pick = |select: fn(&PlanLocations) -> Option<&String>| {
            nested
                .and_then(select)
                .or_else(|| select(&self.flat))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let pickup_location = pick(|locations| locations.pickup_location.as_ref())
            .ok_or_else(|| missing_field("pickup_location"))?;
        let dropoff_location = pick(|locations| locations.dropoff_location.as_ref())
            .ok_or_else(|| missing_field("dropoff_location"))?;
        let current_location =
            pick(|locations| locations.current_location.as_ref()).unwrap_or_default();

        Ok(TripLocations {
            current_location,
            pickup_location,
            dropoff_location,
        })
    }

    pub fn route(&self, reference_time: DateTime<Utc>) -> Result<RouteData, ApiError> {
        let locations = self.locations()?;
        Ok(map_trip(
            &self.route_data,
            &locations,
            &self.stops,
            reference_time,
        ))
    }
}

fn missing_field(field: &str) -> ApiError {
    ApiError::network(format!("malformed response body: plan has no {field}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePointKind {
    Pickup,
    Dropoff,
    Rest,
    Fuel,
    /// A stop category this client does not know yet, lower-cased.
    Other(String),
}

impl RoutePointKind {
    pub fn from_category(category: &str) -> Self {
        let normalized = category.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pickup" => Self::Pickup,
            "dropoff" => Self::Dropoff,
            "rest" => Self::Rest,
            "fuel" => Self::Fuel,
            _ => Self::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pickup => "pickup",
            Self::Dropoff => "dropoff",
            Self::Rest => "rest",
            Self::Fuel => "fuel",
            Self::Other(category) => category,
        }
    }
}

impl std::fmt::Display for RoutePointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// The backend does not geocode stops yet.
    pub const UNKNOWN: Self = Self { lat: 0.0, lng: 0.0 };

    pub fn is_known(&self) -> bool {
        *self != Self::UNKNOWN
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutePoint {
    pub kind: RoutePointKind,
    pub location: String,
    pub coordinates: Coordinates,
    pub time: DateTime<Utc>,
    pub duration_minutes: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteData {
    pub points: Vec<RoutePoint>,
    pub total_distance: f64,
    pub total_duration_hours: f64,
}

impl RouteData {
    pub fn rest_stops(&self) -> usize {
        self.count_kind(&RoutePointKind::Rest)
    }

    pub fn fuel_stops(&self) -> usize {
        self.count_kind(&RoutePointKind::Fuel)
    }

    pub fn departure(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|point| point.time)
    }

    pub fn arrival(&self) -> Option<DateTime<Utc>> {
        self.points.last().map(|point| point.time)
    }

    fn count_kind(&self, kind: &RoutePointKind) -> usize {
        self.points
            .iter()
            .filter(|point| &point.kind == kind)
            .count()
    }
}

/// Builds the ordered route: pickup, every stop in backend order, dropoff.
pub fn map_trip(
    route: &RawRouteData,
    locations: &TripLocations,
    stops: &[RawStop],
    reference_time: DateTime<Utc>,
) -> RouteData {
    let mut points = Vec::with_capacity(stops.len() + 2);
    points.push(RoutePoint {
        kind: RoutePointKind::Pickup,
        location: locations.pickup_location.clone(),
        coordinates: Coordinates::UNKNOWN,
        time: reference_time,
        duration_minutes: None,
    });

    points.extend(stops.iter().map(|stop| RoutePoint {
        kind: RoutePointKind::from_category(&stop.category),
        location: stop.location.clone(),
        coordinates: Coordinates::UNKNOWN,
        time: stop
            .planned_arrival
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(reference_time),
        duration_minutes: stop
            .duration
            .filter(|hours| *hours > 0.0)
            .map(|hours| hours * MINUTES_PER_HOUR),
    }));

    points.push(RoutePoint {
        kind: RoutePointKind::Dropoff,
        location: locations.dropoff_location.clone(),
        coordinates: Coordinates::UNKNOWN,
        time: reference_time + seconds_delta(route.duration),
        duration_minutes: None,
    });

    RouteData {
        points,
        total_distance: route.distance,
        total_duration_hours: (route.duration / SECONDS_PER_HOUR).round(),
    }
}

fn seconds_delta(seconds: f64) -> TimeDelta {
    if !seconds.is_finite() || seconds <= 0.0 {
        return TimeDelta::zero();
    }
    TimeDelta::try_milliseconds((seconds * 1000.0).round() as i64).unwrap_or(TimeDelta::zero())
}

/// Accepts RFC 3339 timestamps and naive `YYYY-MM-DDTHH:MM:SS` as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0)
            .single()
            .expect("valid reference time")
    }

    fn chicago_to_dallas() -> (RawRouteData, TripLocations, Vec<RawStop>) {
        let route = RawRouteData {
            distance: 967.4,
            duration: 52_200.0,
        };
        let locations = TripLocations {
            current_location: "Gary, IN".to_string(),
            pickup_location: "Chicago, IL".to_string(),
            dropoff_location: "Dallas, TX".to_string(),
        };
        let stops = vec![
            RawStop {
                category: "REST".to_string(),
                location: "Springfield, IL".to_string(),
                planned_arrival: Some("2026-03-02T11:30:00Z".to_string()),
                duration: Some(0.5),
            },
            RawStop {
                category: "fuel".to_string(),
                location: "Tulsa, OK".to_string(),
                planned_arrival: None,
                duration: Some(0.25),
            },
        ];
        (route, locations, stops)
    }

    #[test]
    fn maps_pickup_stops_and_dropoff_in_order() {
        let (route, locations, stops) = chicago_to_dallas();
        let mapped = map_trip(&route, &locations, &stops, reference());

        let summary = mapped
            .points
            .iter()
            .map(|point| {
                (
                    point.kind.clone(),
                    point.location.as_str(),
                    point.duration_minutes,
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                (RoutePointKind::Pickup, "Chicago, IL", None),
                (RoutePointKind::Rest, "Springfield, IL", Some(30.0)),
                (RoutePointKind::Fuel, "Tulsa, OK", Some(15.0)),
                (RoutePointKind::Dropoff, "Dallas, TX", None),
            ]
        );
        assert!((mapped.total_distance - 967.4).abs() < f64::EPSILON);
        assert!((mapped.total_duration_hours - 15.0).abs() < f64::EPSILON);
        assert_eq!(mapped.rest_stops(), 1);
        assert_eq!(mapped.fuel_stops(), 1);
    }

    #[test]
    fn point_times_follow_reference_and_planned_arrivals() {
        let (route, locations, stops) = chicago_to_dallas();
        let mapped = map_trip(&route, &locations, &stops, reference());

        assert_eq!(mapped.departure(), Some(reference()));
        assert_eq!(
            mapped.points[1].time,
            Utc.with_ymd_and_hms(2026, 3, 2, 11, 30, 0)
                .single()
                .expect("valid time")
        );
        assert_eq!(mapped.points[2].time, reference());
        assert_eq!(
            mapped.arrival(),
            Some(reference() + TimeDelta::seconds(52_200))
        );
        assert!(mapped.points.iter().all(|point| !point.coordinates.is_known()));
    }

    #[test]
    fn point_count_is_stops_plus_two() {
        let (route, locations, _) = chicago_to_dallas();
        for count in [0_usize, 1, 7] {
            let stops = (0..count)
                .map(|index| RawStop {
                    category: if index % 2 == 0 { "rest" } else { "fuel" }.to_string(),
                    location: format!("Stop {index}"),
                    planned_arrival: None,
                    duration: None,
                })
                .collect::<Vec<_>>();
            let mapped = map_trip(&route, &locations, &stops, reference());
            assert_eq!(mapped.points.len(), count + 2);
            assert_eq!(mapped.points[0].kind, RoutePointKind::Pickup);
            assert_eq!(
                mapped.points.last().map(|point| point.kind.clone()),
                Some(RoutePointKind::Dropoff)
            );
        }
    }

    #[test]
    fn zero_or_missing_stop_duration_is_omitted() {
        let (route, locations, mut stops) = chicago_to_dallas();
        stops[0].duration = Some(0.0);
        stops[1].duration = None;
        let mapped = map_trip(&route, &locations, &stops, reference());
        assert_eq!(mapped.points[1].duration_minutes, None);
        assert_eq!(mapped.points[2].duration_minutes, None);
    }

    #[test]
    fn unknown_stop_category_is_kept_lowercased() {
        assert_eq!(
            RoutePointKind::from_category(" Weigh_Station "),
            RoutePointKind::Other("weigh_station".to_string())
        );
        assert_eq!(RoutePointKind::from_category("Fuel"), RoutePointKind::Fuel);
    }

    #[test]
    fn nested_and_flat_plan_payloads_map_identically() {
        let nested: PlannedTrip = serde_json::from_str(
            r#"{
                "trip": {"id": 4, "current_location": "Gary, IN", "pickup_location": "Chicago, IL", "dropoff_location": "Dallas, TX"},
                "route_data": {"distance": 967.4, "duration": 52200},
                "stops": [{"type": "rest", "location": "Springfield, IL", "duration": "0.5"}]
            }"#,
        )
        .expect("nested plan");
        let flat: PlannedTrip = serde_json::from_str(
            r#"{
                "id": 4,
                "current_location": "Gary, IN",
                "pickup_location": "Chicago, IL",
                "dropoff_location": "Dallas, TX",
                "route_data": {"distance": "967.4", "duration": 52200.0},
                "stops": [{"type": "rest", "location": "Springfield, IL", "duration": 0.5}]
            }"#,
        )
        .expect("flat plan");

        let nested_route = nested.route(reference()).expect("nested route");
        let flat_route = flat.route(reference()).expect("flat route");
        assert_eq!(nested_route, flat_route);
        assert_eq!(nested_route.points.len(), 3);
        assert_eq!(nested_route.points[1].duration_minutes, Some(30.0));
    }

    #[test]
    fn plan_without_locations_is_a_malformed_response() {
        let plan: PlannedTrip =
            serde_json::from_str(r#"{"route_data": {"distance": 1, "duration": 1}}"#)
                .expect("plan");
        assert!(matches!(
            plan.route(reference()),
            Err(ApiError::Network { .. })
        ));
    }

    #[test]
    fn trip_decodes_decimal_cycle_hours() {
        let trip: Trip = serde_json::from_str(
            r#"{"id": 9, "current_location": "A", "pickup_location": "B", "dropoff_location": "C", "current_cycle_hours": "12.50"}"#,
        )
        .expect("trip");
        assert!((trip.current_cycle_hours - 12.5).abs() < f64::EPSILON);
        assert!(trip.route(reference()).is_none());
    }

    #[test]
    fn parses_naive_and_offset_timestamps() {
        let expected = Utc
            .with_ymd_and_hms(2026, 3, 2, 14, 0, 0)
            .single()
            .expect("valid time");
        assert_eq!(parse_timestamp("2026-03-02T14:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-02T09:00:00-05:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-02T14:00:00"), Some(expected));
        assert_eq!(parse_timestamp("later today"), None);
    }
}
