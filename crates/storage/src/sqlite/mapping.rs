use portal_core::model::{CompletionStatus, CourseId, CourseRecord, PackageId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} out of range")))
}

pub(crate) fn parse_status(s: &str) -> Result<CompletionStatus, StorageError> {
    match s {
        "NOT_STARTED" => Ok(CompletionStatus::NotStarted),
        "IN_PROGRESS" => Ok(CompletionStatus::InProgress),
        "COMPLETED" => Ok(CompletionStatus::Completed),
        _ => Err(StorageError::Serialization(format!("invalid status: {s}"))),
    }
}

pub(crate) fn map_course_row(row: &SqliteRow) -> Result<CourseRecord, StorageError> {
    let progress: i64 = row.try_get("progress").map_err(ser)?;
    let progress = u8::try_from(progress)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or_else(|| StorageError::Serialization(format!("invalid progress: {progress}")))?;

    Ok(CourseRecord {
        id: CourseId::new(row.try_get::<String, _>("id").map_err(ser)?),
        title: row.try_get("title").map_err(ser)?,
        scorm_package_id: row
            .try_get::<Option<String>, _>("scorm_package_id")
            .map_err(ser)?
            .map(PackageId::new),
        status: parse_status(&row.try_get::<String, _>("status").map_err(ser)?)?,
        progress,
        completed_modules: i64_to_u32(
            "completed_modules",
            row.try_get("completed_modules").map_err(ser)?,
        )?,
        total_modules: i64_to_u32("total_modules", row.try_get("total_modules").map_err(ser)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_wire_names() {
        for status in [
            CompletionStatus::NotStarted,
            CompletionStatus::InProgress,
            CompletionStatus::Completed,
        ] {
            assert_eq!(parse_status(status.as_wire()).unwrap(), status);
        }
        assert!(parse_status("DONE").is_err());
    }
}
