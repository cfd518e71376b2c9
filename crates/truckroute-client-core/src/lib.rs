#![cfg_attr(test, allow(clippy::expect_used, clippy::panic))]

pub mod auth;
pub mod config;
pub mod credentials;
mod decode;
pub mod error;
pub mod logs;
pub mod refresh;
pub mod route;
pub mod transport;

pub use auth::{LoginRequest, Registration, TokenPair};
pub use config::{ClientConfig, RequestClass, TimeoutPolicy};
pub use credentials::{
    CredentialPersistence, CredentialStore, Credentials, FileCredentialPersistence,
    MemoryPersistence, TokenDecodeError, Username, decode_username,
};
pub use error::{ApiError, AuthInputError};
pub use logs::{
    DutyStatus, DutyStatusChange, DutyStatusRecord, LogAsset, LogEntry, LogId, LogPager,
    LogSheet, LogSheetDraft, LogSource, LogSummary, PdfExport, download_current_pdf,
    load_trip_logs,
};
pub use refresh::{
    LoginRequiredReason, RefreshCoordinator, RefreshPhase, RefreshedTokens, SessionEvent,
    TokenRefresher,
};
pub use route::{
    Coordinates, NewTrip, PlannedTrip, RawRouteData, RawStop, RouteData, RoutePoint,
    RoutePointKind, Trip, TripId, TripLocations, map_trip,
};
pub use transport::{AuthRequirement, HttpReply, ReplayFn};
