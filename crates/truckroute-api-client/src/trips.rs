use reqwest::Method;
use serde_json::json;
use truckroute_client_core::{
    ApiError, AuthRequirement, NewTrip, PlannedTrip, RequestClass, Trip, TripId,
};

use crate::client::TruckRouteClient;

impl TruckRouteClient {
    pub fn trips_path() -> &'static str {
        "/trips/"
    }

    pub fn trip_path(trip_id: TripId) -> String {
        format!("/trips/{trip_id}/")
    }

    pub fn trip_plan_path(trip_id: TripId) -> String {
        format!("/trips/{trip_id}/plan/")
    }

    pub async fn create_trip(&self, trip: &NewTrip) -> Result<Trip, ApiError> {
        self.send_json(
            Method::POST,
            Self::trips_path(),
            trip,
            RequestClass::Standard,
            AuthRequirement::AccessToken,
        )
        .await
    }

    pub async fn list_trips(&self) -> Result<Vec<Trip>, ApiError> {
        self.get_list(Self::trips_path()).await
    }

    pub async fn get_trip(&self, trip_id: TripId) -> Result<Trip, ApiError> {
        self.get_json(&Self::trip_path(trip_id)).await
    }

    /// Asks the backend to compute the route and stops for an existing trip.
    pub async fn plan_trip(&self, trip_id: TripId) -> Result<PlannedTrip, ApiError> {
        self.send_json(
            Method::POST,
            &Self::trip_plan_path(trip_id),
            &json!({}),
            RequestClass::Standard,
            AuthRequirement::AccessToken,
        )
        .await
    }

    /// Creates a trip and plans it right away.
    pub async fn create_and_plan_trip(
        &self,
        trip: &NewTrip,
    ) -> Result<(Trip, PlannedTrip), ApiError> {
        let created = self.create_trip(trip).await?;
        let planned = self.plan_trip(created.id).await?;
        tracing::info!(trip_id = created.id, stops = planned.stops.len(), "Trip planned");
        Ok((created, planned))
    }

    /// The most recently created trip: the last entry the backend lists.
    pub async fn latest_trip(&self) -> Result<Option<Trip>, ApiError> {
        Ok(self.list_trips().await?.pop())
    }
}
