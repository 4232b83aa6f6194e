use crate::index::normalize_subjects;
use crate::model::{EntryId, Teacher, TimetableEntry, TimetableEntryDraft};
use crate::sync::{
    EntriesCallback, Hub, PersistenceError, Subscription, TeachersCallback, TimetableStore,
};
use rusqlite::{params, Connection};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRecord {
    #[serde(flatten)]
    pub teacher: Teacher,
    pub approved: bool,
}

/// Workspace-backed store scoped to one curriculum track.
pub struct SqliteStore {
    conn: Connection,
    curriculum: String,
    hub: Hub,
}

impl SqliteStore {
    pub fn new(conn: Connection, curriculum: impl Into<String>) -> Self {
        Self {
            conn,
            curriculum: curriculum.into(),
            hub: Hub::default(),
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn curriculum(&self) -> &str {
        &self.curriculum
    }

    pub fn entries_snapshot(&self) -> Result<Vec<TimetableEntry>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, day, time, grade, subject, teacher_id, curriculum
             FROM timetable_entries
             WHERE curriculum = ?",
        )?;
        let rows = stmt
            .query_map([&self.curriculum], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, day, time, grade, subject, teacher_id, curriculum) in rows {
            let bad = |e: crate::model::ParseError| {
                PersistenceError::Backend(format!("corrupt entry {}: {}", id, e))
            };
            out.push(TimetableEntry {
                day: day.parse().map_err(bad)?,
                time: time.parse().map_err(bad)?,
                grade: grade.parse().map_err(bad)?,
                id: EntryId(id.clone()),
                subject,
                teacher_id,
                curriculum,
            });
        }
        out.sort_by(|a, b| a.listing_key().cmp(&b.listing_key()).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    pub fn teacher_records(&self, include_pending: bool) -> Result<Vec<TeacherRecord>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, subjects_json, approved
             FROM teachers
             WHERE approved = 1 OR ?
             ORDER BY name, id",
        )?;
        let rows = stmt
            .query_map([include_pending], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name, subjects_json, approved)| {
                let subjects: Vec<String> = serde_json::from_str(&subjects_json).map_err(|e| {
                    PersistenceError::Backend(format!("corrupt subjects for teacher {}: {}", id, e))
                })?;
                Ok(TeacherRecord {
                    teacher: Teacher {
                        id,
                        name,
                        subjects: normalize_subjects(&subjects),
                    },
                    approved: approved != 0,
                })
            })
            .collect()
    }

    /// The approved-teacher snapshot pushed to subscribers.
    pub fn teachers_snapshot(&self) -> Result<Vec<Teacher>, PersistenceError> {
        Ok(self
            .teacher_records(false)?
            .into_iter()
            .map(|r| r.teacher)
            .collect())
    }

    /// Inserts or replaces a teacher application. Returns the teacher id.
    pub fn upsert_teacher(
        &self,
        id: Option<&str>,
        name: &str,
        subjects: &[String],
        approved: bool,
    ) -> Result<String, PersistenceError> {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let subjects_json = serde_json::to_string(&normalize_subjects(subjects))
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO teachers(id, name, subjects_json, approved, updated_at)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               subjects_json = excluded.subjects_json,
               approved = excluded.approved,
               updated_at = excluded.updated_at",
            params![id, name, subjects_json, approved, now_rfc3339()],
        )?;
        tracing::info!(teacher_id = %id, approved, "teacher record written");
        self.publish_teachers();
        Ok(id)
    }

    /// Entries already assigned to the teacher are left in place.
    pub fn remove_teacher(&self, id: &str) -> Result<bool, PersistenceError> {
        let n = self.conn.execute("DELETE FROM teachers WHERE id = ?", [id])?;
        if n > 0 {
            tracing::info!(teacher_id = %id, "teacher record removed");
            self.publish_teachers();
        }
        Ok(n > 0)
    }

    fn publish_entries(&self) {
        match self.entries_snapshot() {
            Ok(snapshot) => {
                tracing::debug!(count = snapshot.len(), "publishing entry snapshot");
                self.hub.notify_entries(&snapshot, None);
            }
            Err(e) => tracing::warn!(error = %e, "entry snapshot unavailable after write"),
        }
    }

    fn publish_teachers(&self) {
        match self.teachers_snapshot() {
            Ok(snapshot) => {
                tracing::debug!(count = snapshot.len(), "publishing teacher snapshot");
                self.hub.notify_teachers(&snapshot, None);
            }
            Err(e) => tracing::warn!(error = %e, "teacher snapshot unavailable after write"),
        }
    }
}

impl TimetableStore for SqliteStore {
    fn subscribe_entries(&self, on_change: EntriesCallback) -> Result<Subscription, PersistenceError> {
        let snapshot = self.entries_snapshot()?;
        let sub = self.hub.add_entries(on_change);
        self.hub.notify_entries(&snapshot, Some(&sub));
        Ok(sub)
    }

    fn subscribe_teachers(&self, on_change: TeachersCallback) -> Result<Subscription, PersistenceError> {
        let snapshot = self.teachers_snapshot()?;
        let sub = self.hub.add_teachers(on_change);
        self.hub.notify_teachers(&snapshot, Some(&sub));
        Ok(sub)
    }

    fn create_entry(&self, draft: &TimetableEntryDraft) -> Result<EntryId, PersistenceError> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO timetable_entries(id, curriculum, day, time, grade, subject, teacher_id, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    draft.curriculum,
                    draft.day.as_str(),
                    draft.time.to_string(),
                    draft.grade.label(),
                    draft.subject,
                    draft.teacher_id,
                    now_rfc3339(),
                ],
            )
            .map_err(|e| {
                tracing::error!(error = %e, "timetable entry insert failed");
                PersistenceError::from(e)
            })?;
        tracing::info!(
            entry_id = %id,
            day = %draft.day,
            time = %draft.time,
            grade = %draft.grade,
            subject = %draft.subject,
            teacher_id = %draft.teacher_id,
            "timetable entry created"
        );
        self.publish_entries();
        Ok(EntryId(id))
    }

    fn delete_entry(&self, id: &EntryId) -> Result<(), PersistenceError> {
        let n = self.conn.execute(
            "DELETE FROM timetable_entries WHERE id = ? AND curriculum = ?",
            [&id.0, &self.curriculum],
        )?;
        if n == 0 {
            tracing::warn!(entry_id = %id, "delete of missing timetable entry");
            return Err(PersistenceError::NotFound(id.clone()));
        }
        tracing::info!(entry_id = %id, "timetable entry deleted");
        self.publish_entries();
        Ok(())
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
