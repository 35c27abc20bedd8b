use crate::model::{parse_timestamp, Evaluation, Grade, Subject};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "notas.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            teacher TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            passing_grade REAL NOT NULL DEFAULT 4.0,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    // Exam rule columns arrived after the first schema.
    ensure_subjects_exam_columns(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_owner ON subjects(owner_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluations(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            name TEXT NOT NULL,
            weight REAL NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(subject_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluations_subject ON evaluations(subject_id, idx)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            evaluation_name TEXT NOT NULL,
            value REAL NOT NULL,
            weight REAL NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(subject_id, evaluation_name)
        )",
        [],
    )?;
    ensure_grades_note(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_subject ON grades(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_subjects_exam_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "subjects", "has_exam")? {
        conn.execute(
            "ALTER TABLE subjects ADD COLUMN has_exam INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !table_has_column(conn, "subjects", "exam_weight")? {
        conn.execute("ALTER TABLE subjects ADD COLUMN exam_weight REAL", [])?;
    }
    if !table_has_column(conn, "subjects", "exam_threshold")? {
        conn.execute("ALTER TABLE subjects ADD COLUMN exam_threshold REAL", [])?;
    }
    Ok(())
}

fn ensure_grades_note(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "grades", "note")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE grades ADD COLUMN note TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn subject_owner(conn: &Connection, subject_id: &str) -> anyhow::Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT owner_id FROM subjects WHERE id = ?",
            [subject_id],
            |r| r.get(0),
        )
        .optional()?)
}

pub fn list_subject_ids(conn: &Connection, owner_id: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT id FROM subjects WHERE owner_id = ? ORDER BY name, created_at")?;
    let ids = stmt
        .query_map([owner_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Reads one subject with its plan and grades as an owned snapshot.
pub fn load_subject(conn: &Connection, subject_id: &str) -> anyhow::Result<Option<Subject>> {
    let row = conn
        .query_row(
            "SELECT owner_id, name, teacher, description, passing_grade,
                    has_exam, exam_weight, exam_threshold
             FROM subjects
             WHERE id = ?",
            [subject_id],
            |r| {
                let mut s = Subject::new(r.get::<_, String>(1)?);
                s.id = subject_id.to_string();
                s.owner_id = r.get(0)?;
                s.teacher = r.get(2)?;
                s.description = r.get(3)?;
                s.passing_grade = r.get(4)?;
                s.has_exam = r.get::<_, i64>(5)? != 0;
                s.exam_weight = r.get(6)?;
                s.exam_threshold = r.get(7)?;
                Ok(s)
            },
        )
        .optional()?;
    let Some(mut subject) = row else {
        return Ok(None);
    };

    let mut eval_stmt = conn.prepare(
        "SELECT name, weight FROM evaluations WHERE subject_id = ? ORDER BY idx",
    )?;
    subject.evaluations = eval_stmt
        .query_map([subject_id], |r| {
            Ok(Evaluation {
                name: r.get(0)?,
                weight: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut grade_stmt = conn.prepare(
        "SELECT id, evaluation_name, value, weight, note, created_at
         FROM grades
         WHERE subject_id = ?
         ORDER BY created_at",
    )?;
    subject.grades = grade_stmt
        .query_map([subject_id], |r| {
            let created_at: String = r.get(5)?;
            Ok(Grade {
                id: Some(r.get(0)?),
                evaluation_name: r.get(1)?,
                value: r.get(2)?,
                weight: r.get(3)?,
                note: r.get(4)?,
                created_at: parse_timestamp(&created_at),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(subject))
}
