//! Daily attendance records.
//!
//! One record per (worker, date). A record with `clock_in` set and
//! `clock_out` unset means the worker is currently clocked in.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    #[default]
    Present,
    Absent,
    HalfDay,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::HalfDay => "half_day",
            AttendanceStatus::Late => "late",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "half_day" => Some(AttendanceStatus::HalfDay),
            "late" => Some(AttendanceStatus::Late),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub worker_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub clock_in: Option<NaiveTime>,
    #[serde(default)]
    pub clock_out: Option<NaiveTime>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AttendanceRecord {
    pub fn is_clocked_in(&self) -> bool {
        self.clock_in.is_some() && self.clock_out.is_none()
    }
}

/// Aggregates over a set of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceStats {
    pub total_records: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub half_day: usize,
    pub clocked_in: usize,
}

impl AttendanceStats {
    pub fn from_records(records: &[AttendanceRecord]) -> Self {
        let mut stats = AttendanceStats {
            total_records: records.len(),
            ..Default::default()
        };
        for record in records {
            match record.status {
                AttendanceStatus::Present => stats.present += 1,
                AttendanceStatus::Absent => stats.absent += 1,
                AttendanceStatus::Late => stats.late += 1,
                AttendanceStatus::HalfDay => stats.half_day += 1,
            }
            if record.is_clocked_in() {
                stats.clocked_in += 1;
            }
        }
        stats
    }
}

/// Response of `GET /api/attendance`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceReport {
    pub records: Vec<AttendanceRecord>,
    pub statistics: AttendanceStats,
}

/// Body of `POST /api/attendance`, upserted by (worker, date).
///
/// An unset clock-in keeps the stored one. A clock-in starts a new shift and
/// clears the stored clock-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_in: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_out: Option<NaiveTime>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Query of `GET /api/attendance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(worker_id: i64, status: AttendanceStatus, clock_in: Option<&str>, clock_out: Option<&str>) -> AttendanceRecord {
        AttendanceRecord {
            id: worker_id,
            worker_id,
            worker_name: None,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            status,
            clock_in: clock_in.map(|t| t.parse().unwrap()),
            clock_out: clock_out.map(|t| t.parse().unwrap()),
            notes: None,
        }
    }

    #[test]
    fn stats_count_statuses_and_open_shifts() {
        let records = vec![
            record(1, AttendanceStatus::Present, Some("08:00:00"), None),
            record(2, AttendanceStatus::Present, Some("07:30:00"), Some("16:00:00")),
            record(3, AttendanceStatus::Late, Some("09:10:00"), None),
            record(4, AttendanceStatus::Absent, None, None),
        ];
        let stats = AttendanceStats::from_records(&records);
        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.present, 2);
        assert_eq!(stats.late, 1);
        assert_eq!(stats.absent, 1);
        assert_eq!(stats.half_day, 0);
        assert_eq!(stats.clocked_in, 2);
    }

    #[test]
    fn entry_serializes_camel_case_and_skips_unset_clock() {
        let entry = AttendanceEntry {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            status: AttendanceStatus::Present,
            clock_in: Some("08:00:00".parse().unwrap()),
            clock_out: None,
            notes: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["clockIn"], "08:00:00");
        assert!(json.get("clockOut").is_none());
        assert_eq!(json["date"], "2024-05-01");
    }

    #[test]
    fn record_decodes_server_times() {
        let rec: AttendanceRecord = serde_json::from_str(
            r#"{"id":1,"worker_id":7,"date":"2024-05-01","status":"half_day","clock_in":"08:00:00","clock_out":null}"#,
        )
        .unwrap();
        assert!(rec.is_clocked_in());
        assert_eq!(rec.status, AttendanceStatus::HalfDay);
    }
}
