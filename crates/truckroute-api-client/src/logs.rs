use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde_json::json;
use truckroute_client_core::{
    ApiError, AuthRequirement, DutyStatusRecord, LogAsset, LogId, LogSheet, LogSheetDraft,
    LogSource, RequestClass, TripId,
};

use crate::client::{TruckRouteClient, encode_body};

impl TruckRouteClient {
    pub fn logs_path() -> &'static str {
        "/logs/"
    }

    pub fn generate_logs_path() -> &'static str {
        "/logs/generate_logs/"
    }

    pub fn log_path(log_id: LogId) -> String {
        format!("/logs/{log_id}/")
    }

    pub fn log_grid_path(log_id: LogId) -> String {
        format!("/logs/{log_id}/grid/")
    }

    pub fn log_pdf_path(log_id: LogId) -> String {
        format!("/logs/{log_id}/pdf/")
    }

    pub fn duty_statuses_path() -> &'static str {
        "/duty-status/"
    }

    pub fn duty_status_path(record_id: i64) -> String {
        format!("/duty-status/{record_id}/")
    }

    /// Idempotent; the backend keeps existing sheets for the trip.
    pub async fn generate_logs(&self, trip_id: TripId) -> Result<(), ApiError> {
        let body = encode_body(&json!({ "trip": trip_id }))?;
        let request = self.prepare(
            Method::POST,
            Self::generate_logs_path(),
            Some(body),
            RequestClass::Standard,
        );
        self.execute(request, AuthRequirement::AccessToken)
            .await?
            .error_for_status()
            .map(|_| ())
    }

    pub async fn list_logs(&self) -> Result<Vec<LogSheet>, ApiError> {
        self.get_list(Self::logs_path()).await
    }

    pub async fn get_log(&self, log_id: LogId) -> Result<LogSheet, ApiError> {
        self.get_json(&Self::log_path(log_id)).await
    }

    pub async fn log_grid(&self, log_id: LogId) -> Result<LogAsset, ApiError> {
        self.get_asset(&Self::log_grid_path(log_id), log_id).await
    }

    pub async fn log_pdf(&self, log_id: LogId) -> Result<LogAsset, ApiError> {
        self.get_asset(&Self::log_pdf_path(log_id), log_id).await
    }

    pub async fn create_log(&self, draft: &LogSheetDraft) -> Result<LogSheet, ApiError> {
        self.write_json(Method::POST, Self::logs_path(), draft).await
    }

    pub async fn update_log(
        &self,
        log_id: LogId,
        draft: &LogSheetDraft,
    ) -> Result<LogSheet, ApiError> {
        self.write_json(Method::PUT, &Self::log_path(log_id), draft)
            .await
    }

    /// Sends only the fields present in `patch`.
    pub async fn partial_update_log<P>(
        &self,
        log_id: LogId,
        patch: &P,
    ) -> Result<LogSheet, ApiError>
    where
        P: Serialize + ?Sized,
    {
        self.write_json(Method::PATCH, &Self::log_path(log_id), patch)
            .await
    }

    pub async fn delete_log(&self, log_id: LogId) -> Result<(), ApiError> {
        self.delete(&Self::log_path(log_id)).await
    }

    pub async fn list_duty_statuses(&self) -> Result<Vec<DutyStatusRecord>, ApiError> {
        self.get_list(Self::duty_statuses_path()).await
    }

    pub async fn create_duty_status(
        &self,
        record: &DutyStatusRecord,
    ) -> Result<DutyStatusRecord, ApiError> {
        self.write_json(Method::POST, Self::duty_statuses_path(), record)
            .await
    }

    pub async fn get_duty_status(&self, record_id: i64) -> Result<DutyStatusRecord, ApiError> {
        self.get_json(&Self::duty_status_path(record_id)).await
    }

    pub async fn update_duty_status(
        &self,
        record_id: i64,
        record: &DutyStatusRecord,
    ) -> Result<DutyStatusRecord, ApiError> {
        self.write_json(Method::PUT, &Self::duty_status_path(record_id), record)
            .await
    }

    pub async fn partial_update_duty_status<P>(
        &self,
        record_id: i64,
        patch: &P,
    ) -> Result<DutyStatusRecord, ApiError>
    where
        P: Serialize + ?Sized,
    {
        self.write_json(Method::PATCH, &Self::duty_status_path(record_id), patch)
            .await
    }

    pub async fn delete_duty_status(&self, record_id: i64) -> Result<(), ApiError> {
        self.delete(&Self::duty_status_path(record_id)).await
    }

    async fn write_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        self.send_json(
            method,
            path,
            body,
            RequestClass::Standard,
            AuthRequirement::AccessToken,
        )
        .await
    }
}

#[async_trait]
impl LogSource for TruckRouteClient {
    async fn generate_logs(&self, trip_id: TripId) -> Result<(), ApiError> {
        TruckRouteClient::generate_logs(self, trip_id).await
    }

    async fn list_logs(&self) -> Result<Vec<LogSheet>, ApiError> {
        TruckRouteClient::list_logs(self).await
    }

    async fn log_grid(&self, log_id: LogId) -> Result<LogAsset, ApiError> {
        TruckRouteClient::log_grid(self, log_id).await
    }

    async fn log_pdf(&self, log_id: LogId) -> Result<LogAsset, ApiError> {
        TruckRouteClient::log_pdf(self, log_id).await
    }
}
