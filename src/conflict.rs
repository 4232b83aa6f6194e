//! Admission checks for new timetable entries.
//!
//! Checks run in a fixed order and the first failure wins, so the same input
//! always yields the same reason:
//! 1. every field is present,
//! 2. the `(day, time, grade, subject)` slot is free,
//! 3. the teacher is free at `(day, time)`, except for the Stage 4 / Stage 5
//!    co-teaching pair.
//!
//! Validation runs against the caller's snapshot only. Two schedulers working
//! from stale snapshots can both be admitted; nothing here closes that window.

use crate::index::SubjectIndex;
use crate::model::{Candidate, Day, Field, Grade, SlotTime, TimetableEntry, TimetableEntryDraft};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("selection is incomplete (missing: {})", field_list(.missing))]
    IncompleteSelection { missing: Vec<Field> },

    #[error("{} {} {} {} is already scheduled", .existing.day, .existing.time, .existing.grade, .existing.subject)]
    SlotAlreadyScheduled { existing: TimetableEntry },

    #[error("teacher {} already teaches {} {} on {} {}", .existing.teacher_id, .existing.grade, .existing.subject, .existing.day, .existing.time)]
    TeacherDoubleBooked { existing: TimetableEntry },

    #[error("teacher {teacher_id} is not eligible to teach {subject}")]
    TeacherNotEligible { teacher_id: String, subject: String },
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::IncompleteSelection { .. } => "incomplete_selection",
            Rejection::SlotAlreadyScheduled { .. } => "slot_already_scheduled",
            Rejection::TeacherDoubleBooked { .. } => "teacher_double_booked",
            Rejection::TeacherNotEligible { .. } => "teacher_not_eligible",
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            Rejection::IncompleteSelection { missing } => json!({
                "missing": missing.iter().map(|f| f.as_str()).collect::<Vec<_>>()
            }),
            Rejection::SlotAlreadyScheduled { existing }
            | Rejection::TeacherDoubleBooked { existing } => json!({
                "conflict": serde_json::to_value(existing).unwrap_or_default()
            }),
            Rejection::TeacherNotEligible {
                teacher_id,
                subject,
            } => json!({ "teacherId": teacher_id, "subject": subject }),
        }
    }
}

fn field_list(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A candidate that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledSlot {
    pub day: Day,
    pub time: SlotTime,
    pub grade: Grade,
    pub subject: String,
    pub teacher_id: String,
}

impl ScheduledSlot {
    pub fn into_draft(self, curriculum: &str) -> TimetableEntryDraft {
        TimetableEntryDraft {
            day: self.day,
            time: self.time,
            grade: self.grade,
            subject: self.subject,
            teacher_id: self.teacher_id,
            curriculum: curriculum.to_string(),
        }
    }
}

/// True only for the unordered pair {Stage 4, Stage 5}.
pub fn is_co_teaching_pair(a: Grade, b: Grade) -> bool {
    matches!(
        (a, b),
        (Grade::Stage4, Grade::Stage5) | (Grade::Stage5, Grade::Stage4)
    )
}

pub fn validate(
    candidate: &Candidate,
    existing: &[TimetableEntry],
) -> Result<ScheduledSlot, Rejection> {
    let slot = complete(candidate)?;

    if let Some(hit) = existing.iter().find(|e| {
        e.day == slot.day && e.time == slot.time && e.grade == slot.grade && e.subject == slot.subject
    }) {
        return Err(Rejection::SlotAlreadyScheduled {
            existing: hit.clone(),
        });
    }

    if let Some(hit) = existing.iter().find(|e| {
        e.day == slot.day
            && e.time == slot.time
            && e.teacher_id == slot.teacher_id
            && !is_co_teaching_pair(slot.grade, e.grade)
    }) {
        return Err(Rejection::TeacherDoubleBooked {
            existing: hit.clone(),
        });
    }

    Ok(slot)
}

/// [`validate`] followed by the subject eligibility check against `index`.
pub fn validate_assignment(
    candidate: &Candidate,
    existing: &[TimetableEntry],
    index: &SubjectIndex,
) -> Result<ScheduledSlot, Rejection> {
    let slot = validate(candidate, existing)?;
    if !index.is_eligible(&slot.teacher_id, &slot.subject) {
        return Err(Rejection::TeacherNotEligible {
            teacher_id: slot.teacher_id,
            subject: slot.subject,
        });
    }
    Ok(slot)
}

fn complete(candidate: &Candidate) -> Result<ScheduledSlot, Rejection> {
    let missing = candidate.missing_fields();
    match (
        candidate.day,
        candidate.time,
        candidate.grade,
        candidate.subject.as_deref(),
        candidate.teacher_id.as_deref(),
    ) {
        (Some(day), Some(time), Some(grade), Some(subject), Some(teacher_id)) if missing.is_empty() => {
            Ok(ScheduledSlot {
                day,
                time,
                grade,
                subject: subject.trim().to_string(),
                teacher_id: teacher_id.trim().to_string(),
            })
        }
        _ => Err(Rejection::IncompleteSelection { missing }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryId, Teacher};
    use pretty_assertions::assert_eq;

    fn at(hh_mm: &str) -> SlotTime {
        hh_mm.parse().unwrap()
    }

    fn candidate(day: Day, time: &str, grade: Grade, subject: &str, teacher: &str) -> Candidate {
        Candidate {
            day: Some(day),
            time: Some(at(time)),
            grade: Some(grade),
            subject: Some(subject.into()),
            teacher_id: Some(teacher.into()),
        }
    }

    /// Admits `c` into `entries` the way a successful store write would.
    fn admit(entries: &mut Vec<TimetableEntry>, c: &Candidate) -> Result<(), Rejection> {
        let slot = validate(c, entries)?;
        let id = EntryId(format!("e{}", entries.len() + 1));
        entries.push(slot.into_draft("cambridge").into_entry(id));
        Ok(())
    }

    #[test]
    fn duplicate_submission_is_rejected_second_time() {
        let mut entries = Vec::new();
        let c = candidate(Day::Monday, "09:00", Grade::Stage1, "Mathematics", "T");
        admit(&mut entries, &c).expect("first accepted");
        let err = admit(&mut entries, &c).unwrap_err();
        assert_eq!(err.code(), "slot_already_scheduled");
        match err {
            Rejection::SlotAlreadyScheduled { existing } => assert_eq!(existing.id, EntryId("e1".into())),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn teacher_cannot_be_in_two_grades_at_once() {
        let mut entries = Vec::new();
        admit(
            &mut entries,
            &candidate(Day::Monday, "09:00", Grade::Stage1, "Mathematics", "T"),
        )
        .unwrap();
        let err = validate(
            &candidate(Day::Monday, "09:00", Grade::Stage2, "English", "T"),
            &entries,
        )
        .unwrap_err();
        assert_eq!(err.code(), "teacher_double_booked");
    }

    #[test]
    fn stage_four_and_five_may_share_a_teacher_in_either_order() {
        for (first, second) in [(Grade::Stage4, Grade::Stage5), (Grade::Stage5, Grade::Stage4)] {
            let mut entries = Vec::new();
            admit(&mut entries, &candidate(Day::Monday, "09:00", first, "Science", "T")).unwrap();
            let res = validate(&candidate(Day::Monday, "09:00", second, "Science", "T"), &entries);
            assert!(res.is_ok(), "{first} then {second}: {res:?}");
        }
    }

    #[test]
    fn other_adjacent_grades_are_not_exempt() {
        let mut entries = Vec::new();
        admit(&mut entries, &candidate(Day::Monday, "09:00", Grade::Stage3, "Math", "T")).unwrap();
        let err = validate(&candidate(Day::Monday, "09:00", Grade::Stage4, "Math", "T"), &entries)
            .unwrap_err();
        assert_eq!(err.code(), "teacher_double_booked");

        assert!(!is_co_teaching_pair(Grade::Stage5, Grade::Stage6));
        assert!(!is_co_teaching_pair(Grade::Stage4, Grade::Stage4));
        assert!(is_co_teaching_pair(Grade::Stage5, Grade::Stage4));
    }

    #[test]
    fn co_teaching_does_not_excuse_a_third_grade() {
        let mut entries = Vec::new();
        admit(&mut entries, &candidate(Day::Monday, "09:00", Grade::Stage4, "Science", "T")).unwrap();
        admit(&mut entries, &candidate(Day::Monday, "09:00", Grade::Stage5, "Science", "T")).unwrap();
        let err = validate(&candidate(Day::Monday, "09:00", Grade::Stage6, "Science", "T"), &entries)
            .unwrap_err();
        assert_eq!(err.code(), "teacher_double_booked");
    }

    #[test]
    fn incomplete_candidate_never_reaches_the_slot_scan() {
        let mut entries = Vec::new();
        let full = candidate(Day::Monday, "09:00", Grade::Stage1, "Mathematics", "T");
        admit(&mut entries, &full).unwrap();

        let mut partial = full.clone();
        partial.teacher_id = None;
        let err = validate(&partial, &entries).unwrap_err();
        assert_eq!(
            err,
            Rejection::IncompleteSelection {
                missing: vec![Field::TeacherId]
            }
        );

        let err = validate(&Candidate::default(), &entries).unwrap_err();
        assert_eq!(err.code(), "incomplete_selection");
        assert_eq!(err.details()["missing"].as_array().map(|a| a.len()), Some(5));
    }

    #[test]
    fn duplicate_slot_is_reported_before_teacher_clash() {
        let mut entries = Vec::new();
        admit(&mut entries, &candidate(Day::Monday, "09:00", Grade::Stage1, "Math", "A")).unwrap();
        let err = validate(&candidate(Day::Monday, "09:00", Grade::Stage1, "Math", "A"), &entries)
            .unwrap_err();
        assert_eq!(err.code(), "slot_already_scheduled");
    }

    #[test]
    fn canonical_tuesday_scenario() {
        let mut entries = Vec::new();
        let english = candidate(Day::Tuesday, "10:00", Grade::Stage1, "English", "A");
        assert!(admit(&mut entries, &english).is_ok());
        assert_eq!(
            admit(&mut entries, &english).unwrap_err().code(),
            "slot_already_scheduled"
        );
        let science = candidate(Day::Tuesday, "10:00", Grade::Stage4, "Science", "A");
        assert_eq!(
            admit(&mut entries, &science).unwrap_err().code(),
            "teacher_double_booked"
        );
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn assignment_requires_subject_eligibility() {
        let index = SubjectIndex::build(&[Teacher {
            id: "A".into(),
            name: "Amal".into(),
            subjects: vec!["English".into()],
        }]);
        let ok = candidate(Day::Friday, "08:00", Grade::Stage2, "English", "A");
        assert!(validate_assignment(&ok, &[], &index).is_ok());

        let bad = candidate(Day::Friday, "08:00", Grade::Stage2, "Art", "A");
        let err = validate_assignment(&bad, &[], &index).unwrap_err();
        assert_eq!(err.code(), "teacher_not_eligible");
        assert_eq!(err.details()["subject"], "Art");
    }

    #[test]
    fn conflict_details_carry_the_existing_entry() {
        let mut entries = Vec::new();
        admit(&mut entries, &candidate(Day::Monday, "09:00", Grade::Stage1, "Math", "T")).unwrap();
        let err = validate(&candidate(Day::Monday, "09:00", Grade::Stage2, "Art", "T"), &entries)
            .unwrap_err();
        let d = err.details();
        assert_eq!(d["conflict"]["id"], "e1");
        assert_eq!(d["conflict"]["grade"], "Stage 1");
        assert!(err.to_string().contains("Stage 1"));
    }
}
