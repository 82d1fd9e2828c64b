//! Attendance endpoints.
//!
//! Workers read and write only their own records. Managers and owners read
//! everyone's, with worker names resolved.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    Json,
};

use super::auth::AuthUser;
use super::routes::AppState;
use super::store::store_error;
use crate::model::{AttendanceEntry, AttendanceRange, AttendanceRecord, AttendanceReport, AttendanceStats};
use crate::util::non_blank;

/// `GET /api/attendance?startDate&endDate`
pub async fn list_attendance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(range): Query<AttendanceRange>,
) -> Result<Json<AttendanceReport>, (StatusCode, String)> {
    if range.end_date < range.start_date {
        return Err((
            StatusCode::BAD_REQUEST,
            "endDate is before startDate".to_string(),
        ));
    }
    let worker = (!user.role.can_review()).then_some(user.id);
    let records = state
        .store
        .list_attendance(worker, range.start_date, range.end_date)
        .await
        .map_err(store_error)?;
    let statistics = AttendanceStats::from_records(&records);
    Ok(Json(AttendanceReport {
        records,
        statistics,
    }))
}

/// `POST /api/attendance` - upsert the caller's record for `date`.
///
/// The store checks the merged record, so a clock-out earlier than the stored
/// clock-in is a 400.
pub async fn record_attendance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(mut entry): Json<AttendanceEntry>,
) -> Result<Json<AttendanceRecord>, (StatusCode, String)> {
    entry.notes = non_blank(entry.notes.as_deref());

    let record = state
        .store
        .upsert_attendance(user.id, &entry)
        .await
        .map_err(store_error)?;
    tracing::debug!(
        "Attendance for {} on {}: in={:?} out={:?}",
        user.name,
        record.date,
        record.clock_in,
        record.clock_out
    );
    Ok(Json(record))
}
