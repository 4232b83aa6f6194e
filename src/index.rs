//! Subject and teacher eligibility tables derived from a teacher snapshot.

use crate::model::Teacher;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct SubjectIndex {
    teachers: Vec<Teacher>,
    subjects: BTreeSet<String>,
}

impl SubjectIndex {
    /// Rebuilds the tables from scratch. Teacher order is kept as delivered.
    pub fn build(teachers: &[Teacher]) -> Self {
        let teachers: Vec<Teacher> = teachers
            .iter()
            .map(|t| Teacher {
                id: t.id.clone(),
                name: t.name.clone(),
                subjects: normalize_subjects(&t.subjects),
            })
            .collect();
        let subjects = teachers
            .iter()
            .flat_map(|t| t.subjects.iter().cloned())
            .collect();
        Self { teachers, subjects }
    }

    pub fn subjects_offered(&self) -> Vec<&str> {
        self.subjects.iter().map(String::as_str).collect()
    }

    pub fn teachers_for(&self, subject: &str) -> Vec<&Teacher> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Vec::new();
        }
        self.teachers
            .iter()
            .filter(|t| t.subjects.iter().any(|s| s == subject))
            .collect()
    }

    pub fn subjects_for(&self, teacher_id: &str) -> Vec<&str> {
        self.teacher(teacher_id)
            .map(|t| t.subjects.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn teacher(&self, teacher_id: &str) -> Option<&Teacher> {
        self.teachers.iter().find(|t| t.id == teacher_id)
    }

    pub fn is_eligible(&self, teacher_id: &str, subject: &str) -> bool {
        let subject = subject.trim();
        self.teacher(teacher_id)
            .is_some_and(|t| t.subjects.iter().any(|s| s == subject))
    }
}

/// Trimmed, sorted, duplicate-free, blanks dropped.
pub fn normalize_subjects(subjects: &[String]) -> Vec<String> {
    subjects
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
