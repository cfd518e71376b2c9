//! Daily log sheets, duty-status records, and the per-trip day pager.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::decode::{lenient_f64, lenient_opt_f64};
use crate::error::ApiError;
use crate::route::TripId;

pub type LogId = i64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DutyStatusChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_display: Option<String>,
    #[serde(default)]
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub odometer: Option<f64>,
    #[serde(default)]
    pub remarks: String,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub duration_hours: Option<f64>,
}

impl DutyStatusChange {
    pub fn display_status(&self) -> &str {
        self.status_display
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .unwrap_or(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DutyStatus {
    Driving,
    OnDuty,
    OffDuty,
    Sleeper,
    /// A status code this client does not recognize, kept as sent.
    Other(String),
}

impl DutyStatus {
    /// Accepts wire codes (`on_duty`) and display labels ("On Duty", "Sleeper Berth").
    pub fn parse(raw: &str) -> Self {
        let normalized = raw
            .trim()
            .to_ascii_lowercase()
            .replace(['-', ' '], "_");
        match normalized.as_str() {
            "driving" | "d" => Self::Driving,
            "on_duty" | "on" | "on_duty_not_driving" => Self::OnDuty,
            "off_duty" | "off" => Self::OffDuty,
            "sleeper" | "sleeper_berth" | "sb" => Self::Sleeper,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Driving => "driving",
            Self::OnDuty => "on_duty",
            Self::OffDuty => "off_duty",
            Self::Sleeper => "sleeper",
            Self::Other(code) => code,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Driving => "Driving",
            Self::OnDuty => "On Duty",
            Self::OffDuty => "Off Duty",
            Self::Sleeper => "Sleeper",
            Self::Other(code) => code,
        }
    }
}

impl From<String> for DutyStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<DutyStatus> for String {
    fn from(status: DutyStatus) -> Self {
        match status {
            DutyStatus::Other(code) => code,
            known => known.code().to_string(),
        }
    }
}

impl std::fmt::Display for DutyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Hours totals for one day. Older backends send these in camelCase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogSummary {
    #[serde(default, alias = "drivingHours", deserialize_with = "lenient_f64")]
    pub driving_hours: f64,
    #[serde(default, alias = "onDutyHours", deserialize_with = "lenient_f64")]
    pub on_duty_hours: f64,
    #[serde(default, alias = "offDutyHours", deserialize_with = "lenient_f64")]
    pub off_duty_hours: f64,
    #[serde(default, alias = "sleeperHours", deserialize_with = "lenient_f64")]
    pub sleeper_hours: f64,
    #[serde(default, alias = "cycleRemaining", deserialize_with = "lenient_f64")]
    pub cycle_remaining: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSheet {
    pub id: LogId,
    pub trip: TripId,
    pub date: String,
    #[serde(default)]
    pub entries: Vec<LogEntry>,
    #[serde(default)]
    pub duty_status_changes: Vec<DutyStatusChange>,
    #[serde(flatten)]
    pub summary: LogSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_address: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub starting_odometer: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub ending_odometer: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_miles: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Body for creating or replacing a log sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogSheetDraft {
    pub trip: TripId,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_odometer: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending_odometer: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A row of the `/duty-status/` resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DutyStatusRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(alias = "log")]
    pub log_sheet: LogId,
    pub status: DutyStatus,
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(
        default,
        deserialize_with = "lenient_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub odometer: Option<f64>,
    #[serde(default)]
    pub remarks: String,
}

/// A rendered per-day asset: the grid image or the PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogAsset {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfExport {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl PdfExport {
    pub fn for_sheet(sheet: &LogSheet, asset: LogAsset) -> Self {
        Self {
            file_name: pdf_file_name(&sheet.date),
            bytes: asset.bytes,
        }
    }
}

pub fn pdf_file_name(date: &str) -> String {
    let date = date.trim().replace(['/', '\\', ' '], "-");
    format!("eld-log-{date}.pdf")
}

#[async_trait]
pub trait LogSource: Send + Sync {
    /// Safe to call when the trip already has logs.
    async fn generate_logs(&self, trip_id: TripId) -> Result<(), ApiError>;
    async fn list_logs(&self) -> Result<Vec<LogSheet>, ApiError>;
    async fn log_grid(&self, log_id: LogId) -> Result<LogAsset, ApiError>;
    async fn log_pdf(&self, log_id: LogId) -> Result<LogAsset, ApiError>;
}

/// Day-by-day view over one trip's log sheets.
///
/// `assets` always has one slot per sheet; a slot is `None` when its grid
/// could not be fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogPager {
    sheets: Vec<LogSheet>,
    assets: Vec<Option<LogAsset>>,
    current: usize,
}

impl LogPager {
    pub fn new(sheets: Vec<LogSheet>, mut assets: Vec<Option<LogAsset>>) -> Self {
        assets.resize(sheets.len(), None);
        Self {
            sheets,
            assets,
            current: 0,
        }
    }

    pub fn sheets(&self) -> &[LogSheet] {
        &self.sheets
    }

    pub fn assets(&self) -> &[Option<LogAsset>] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn current_day_index(&self) -> usize {
        self.current
    }

    pub fn current_sheet(&self) -> Option<&LogSheet> {
        self.sheets.get(self.current)
    }

    pub fn current_asset(&self) -> Option<&LogAsset> {
        self.assets.get(self.current).and_then(Option::as_ref)
    }

    pub fn has_previous(&self) -> bool {
        self.current > 0
    }

    pub fn has_next(&self) -> bool {
        self.current + 1 < self.sheets.len()
    }

    pub fn previous_day(&mut self) -> usize {
        self.current = self.current.saturating_sub(1);
        self.current
    }

    pub fn next_day(&mut self) -> usize {
        if self.has_next() {
            self.current += 1;
        }
        self.current
    }

    /// Moves to a zero-based day, clamped to the last sheet.
    pub fn jump_to(&mut self, day: usize) -> usize {
        self.current = day.min(self.sheets.len().saturating_sub(1));
        self.current
    }

    pub fn day_label(&self) -> String {
        match self.current_sheet() {
            Some(sheet) => format!(
                "Day {} of {} - {}",
                self.current + 1,
                self.sheets.len(),
                sheet.date
            ),
            None => "No logs".to_string(),
        }
    }
}

/// Generates, lists, and filters a trip's sheets, then fetches every grid concurrently.
pub async fn load_trip_logs<S>(source: &S, trip_id: TripId) -> Result<LogPager, ApiError>
where
    S: LogSource + ?Sized,
{
    source.generate_logs(trip_id).await?;
    let sheets = source
        .list_logs()
        .await?
        .into_iter()
        .filter(|sheet| sheet.trip == trip_id)
        .collect::<Vec<_>>();

    let assets = join_all(sheets.iter().map(|sheet| async move {
        match source.log_grid(sheet.id).await {
            Ok(asset) => Some(asset),
            Err(error) => {
                tracing::warn!(error = %error, log_id = sheet.id, "Log grid unavailable");
                None
            }
        }
    }))
    .await;

    let missing = assets.iter().filter(|asset| asset.is_none()).count();
    tracing::debug!(trip_id, sheets = sheets.len(), missing, "Loaded trip logs");
    Ok(LogPager::new(sheets, assets))
}

/// Fetches the PDF for the displayed day; `None` when the trip has no sheets.
pub async fn download_current_pdf<S>(
    source: &S,
    pager: &LogPager,
) -> Result<Option<PdfExport>, ApiError>
where
    S: LogSource + ?Sized,
{
    let Some(sheet) = pager.current_sheet() else {
        return Ok(None);
    };
    let asset = source.log_pdf(sheet.id).await?;
    Ok(Some(PdfExport::for_sheet(sheet, asset)))
}
