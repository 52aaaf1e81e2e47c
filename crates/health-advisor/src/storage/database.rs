//! SQLite storage for subjects, their health records and recommendations

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;

use super::HealthStore;
use crate::error::{Error, Result};
use crate::types::{
    DietEntry, Gender, LabResult, LabStatus, Medication, NewRecommendation, Priority,
    Recommendation, RecommendationType, RecommendationUpdate, Subject, DISCLAIMER,
};

const RECOMMENDATION_COLUMNS: &str = "id, subject_id, recommendation_type, priority, title, \
     description, detailed_explanation, supplement_name, suggested_dosage, frequency, \
     foods_to_include, foods_to_avoid, triggered_by_lab_id, triggered_by_medication_id, \
     model_used, confidence_score, is_active, is_acknowledged, acknowledged_at, user_rating, \
     user_feedback, is_followed, disclaimer, created_at, updated_at, expires_at";

/// SQLite-backed health store
pub struct SqliteHealthStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHealthStore {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::database(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::database(format!("Failed to open in-memory database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::database(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS subjects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                date_of_birth TEXT NOT NULL,
                gender TEXT,
                medical_conditions TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_subjects_owner ON subjects(owner_id);

            CREATE TABLE IF NOT EXISTS medications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id INTEGER NOT NULL REFERENCES subjects(id),
                name TEXT NOT NULL,
                dosage TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_medications_subject ON medications(subject_id);

            CREATE TABLE IF NOT EXISTS lab_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id INTEGER NOT NULL REFERENCES subjects(id),
                test_name TEXT NOT NULL,
                value REAL,
                unit TEXT,
                reference_range_low REAL,
                reference_range_high REAL,
                status TEXT NOT NULL,
                test_date TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_lab_results_subject_date
                ON lab_results(subject_id, test_date);

            CREATE TABLE IF NOT EXISTS diet_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id INTEGER NOT NULL REFERENCES subjects(id),
                food_name TEXT NOT NULL,
                entry_date TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_diet_entries_subject_date
                ON diet_entries(subject_id, entry_date);

            CREATE TABLE IF NOT EXISTS recommendations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id INTEGER NOT NULL REFERENCES subjects(id),
                recommendation_type TEXT NOT NULL,
                priority TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                detailed_explanation TEXT,
                supplement_name TEXT,
                suggested_dosage TEXT,
                frequency TEXT,
                foods_to_include TEXT NOT NULL DEFAULT '[]',
                foods_to_avoid TEXT NOT NULL DEFAULT '[]',
                triggered_by_lab_id INTEGER,
                triggered_by_medication_id INTEGER,
                model_used TEXT NOT NULL,
                confidence_score REAL,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_acknowledged INTEGER NOT NULL DEFAULT 0,
                acknowledged_at TEXT,
                user_rating INTEGER,
                user_feedback TEXT,
                is_followed INTEGER,
                disclaimer TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                expires_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_recommendations_subject
                ON recommendations(subject_id, is_active);
        "#,
        )
        .map_err(|e| Error::database(format!("Failed to run migrations: {}", e)))?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    // ==================== Seeding ====================

    /// Insert a subject and return its id
    pub fn insert_subject(&self, subject: &Subject) -> Result<i64> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO subjects (owner_id, first_name, last_name, date_of_birth, gender, medical_conditions)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                subject.owner_id,
                subject.first_name,
                subject.last_name,
                subject.date_of_birth.format("%Y-%m-%d").to_string(),
                subject.gender.map(|g| g.as_str()),
                subject.medical_conditions,
            ],
        )
        .map_err(|e| Error::database(format!("Failed to insert subject: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Insert a medication and return its id
    pub fn insert_medication(&self, medication: &Medication) -> Result<i64> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO medications (subject_id, name, dosage, is_active) VALUES (?1, ?2, ?3, ?4)",
            params![
                medication.subject_id,
                medication.name,
                medication.dosage,
                medication.is_active,
            ],
        )
        .map_err(|e| Error::database(format!("Failed to insert medication: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Insert a lab result and return its id
    pub fn insert_lab_result(&self, lab: &LabResult) -> Result<i64> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO lab_results (
                subject_id, test_name, value, unit, reference_range_low,
                reference_range_high, status, test_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                lab.subject_id,
                lab.test_name,
                lab.value,
                lab.unit,
                lab.reference_range_low,
                lab.reference_range_high,
                lab.status.as_str(),
                timestamp(&lab.test_date),
            ],
        )
        .map_err(|e| Error::database(format!("Failed to insert lab result: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Insert a diet entry and return its id
    pub fn insert_diet_entry(&self, entry: &DietEntry) -> Result<i64> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO diet_entries (subject_id, food_name, entry_date) VALUES (?1, ?2, ?3)",
            params![entry.subject_id, entry.food_name, timestamp(&entry.entry_date)],
        )
        .map_err(|e| Error::database(format!("Failed to insert diet entry: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }
}

impl HealthStore for SqliteHealthStore {
    fn load_subject(&self, subject_id: i64, owner_id: i64) -> Result<Option<Subject>> {
        let conn = self.conn.lock();

        conn.query_row(
            r#"
            SELECT id, owner_id, first_name, last_name, date_of_birth, gender, medical_conditions
            FROM subjects WHERE id = ?1 AND owner_id = ?2
            "#,
            params![subject_id, owner_id],
            row_to_subject,
        )
        .optional()
        .map_err(|e| Error::database(format!("Failed to load subject: {}", e)))
    }

    fn list_active_medications(&self, subject_id: i64) -> Result<Vec<Medication>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, subject_id, name, dosage, is_active FROM medications
                WHERE subject_id = ?1 AND is_active = 1
                ORDER BY id
                "#,
            )
            .map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let medications = stmt
            .query_map(params![subject_id], row_to_medication)
            .map_err(|e| Error::database(format!("Failed to list medications: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(medications)
    }

    fn list_labs_by_status(
        &self,
        subject_id: i64,
        statuses: &[LabStatus],
        limit: Option<usize>,
    ) -> Result<Vec<LabResult>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (0..statuses.len()).map(|i| format!("?{}", i + 2)).collect();
        let mut sql = format!(
            r#"
            SELECT id, subject_id, test_name, value, unit, reference_range_low,
                   reference_range_high, status, test_date
            FROM lab_results
            WHERE subject_id = ?1 AND status IN ({})
            ORDER BY test_date DESC, id DESC
            "#,
            placeholders.join(", ")
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut values = vec![Value::Integer(subject_id)];
        values.extend(statuses.iter().map(|s| Value::Text(s.as_str().to_string())));

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let labs = stmt
            .query_map(params_from_iter(values.iter()), row_to_lab_result)
            .map_err(|e| Error::database(format!("Failed to list lab results: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(labs)
    }

    fn list_recent_diet_entries(&self, subject_id: i64, limit: usize) -> Result<Vec<DietEntry>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, subject_id, food_name, entry_date FROM diet_entries
                WHERE subject_id = ?1
                ORDER BY entry_date DESC, id DESC
                LIMIT ?2
                "#,
            )
            .map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let entries = stmt
            .query_map(params![subject_id, limit as i64], row_to_diet_entry)
            .map_err(|e| Error::database(format!("Failed to list diet entries: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    fn insert_recommendations(&self, batch: &[NewRecommendation]) -> Result<Vec<Recommendation>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.lock();
        // Match stored precision
        let now = Utc::now().trunc_subsecs(6);

        let tx = conn
            .transaction()
            .map_err(|e| Error::database(format!("Failed to begin transaction: {}", e)))?;

        let mut stored = Vec::with_capacity(batch.len());
        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT INTO recommendations (
                        subject_id, recommendation_type, priority, title, description,
                        detailed_explanation, supplement_name, suggested_dosage, frequency,
                        foods_to_include, foods_to_avoid, triggered_by_lab_id,
                        triggered_by_medication_id, model_used, confidence_score,
                        disclaimer, created_at, updated_at, expires_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                    "#,
                )
                .map_err(|e| Error::database(format!("Failed to prepare statement: {}", e)))?;

            for rec in batch {
                let id = stmt
                    .insert(params![
                        rec.subject_id,
                        rec.recommendation_type.as_str(),
                        rec.priority.as_str(),
                        rec.title,
                        rec.description,
                        rec.detailed_explanation,
                        rec.supplement_name,
                        rec.suggested_dosage,
                        rec.frequency,
                        serde_json::to_string(&rec.foods_to_include)?,
                        serde_json::to_string(&rec.foods_to_avoid)?,
                        rec.triggered_by_lab_id,
                        rec.triggered_by_medication_id,
                        rec.model_used,
                        rec.confidence_score,
                        DISCLAIMER,
                        timestamp(&now),
                        timestamp(&now),
                        rec.expires_at.as_ref().map(timestamp),
                    ])
                    .map_err(|e| Error::database(format!("Failed to insert recommendation: {}", e)))?;

                stored.push(persisted(id, rec.clone(), now));
            }
        }

        tx.commit()
            .map_err(|e| Error::database(format!("Failed to commit transaction: {}", e)))?;

        Ok(stored)
    }

    fn get_recommendation(&self, id: i64) -> Result<Option<Recommendation>> {
        let conn = self.conn.lock();
        query_recommendation(&conn, id)
    }

    fn list_recommendations(
        &self,
        subject_id: i64,
        active_only: bool,
    ) -> Result<Vec<Recommendation>> {
        let conn = self.conn.lock();

        let sql = format!(
            r#"
            SELECT {} FROM recommendations
            WHERE subject_id = ?1 AND (?2 = 0 OR is_active = 1)
            ORDER BY CASE priority
                WHEN 'high' THEN 0
                WHEN 'medium' THEN 1
                WHEN 'low' THEN 2
                ELSE 3
            END, created_at DESC, id DESC
            "#,
            RECOMMENDATION_COLUMNS
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let recommendations = stmt
            .query_map(params![subject_id, active_only], row_to_recommendation)
            .map_err(|e| Error::database(format!("Failed to list recommendations: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(recommendations)
    }

    fn update_recommendation(
        &self,
        id: i64,
        update: &RecommendationUpdate,
    ) -> Result<Option<Recommendation>> {
        let conn = self.conn.lock();

        let count = conn
            .execute(
                r#"
                UPDATE recommendations SET
                    is_active = COALESCE(?2, is_active),
                    is_acknowledged = COALESCE(?3, is_acknowledged),
                    acknowledged_at = COALESCE(?4, acknowledged_at),
                    user_rating = COALESCE(?5, user_rating),
                    user_feedback = COALESCE(?6, user_feedback),
                    is_followed = COALESCE(?7, is_followed),
                    updated_at = ?8
                WHERE id = ?1
                "#,
                params![
                    id,
                    update.is_active,
                    update.is_acknowledged,
                    update.acknowledged_at.as_ref().map(timestamp),
                    update.user_rating,
                    update.user_feedback,
                    update.is_followed,
                    timestamp(&update.updated_at),
                ],
            )
            .map_err(|e| Error::database(format!("Failed to update recommendation: {}", e)))?;

        if count == 0 {
            return Ok(None);
        }

        query_recommendation(&conn, id)
    }
}

// ==================== Row Mapping ====================

fn query_recommendation(conn: &Connection, id: i64) -> Result<Option<Recommendation>> {
    let sql = format!("SELECT {} FROM recommendations WHERE id = ?1", RECOMMENDATION_COLUMNS);

    conn.query_row(&sql, params![id], row_to_recommendation)
        .optional()
        .map_err(|e| Error::database(format!("Failed to get recommendation: {}", e)))
}

/// Stored form of a freshly inserted recommendation
fn persisted(id: i64, rec: NewRecommendation, now: DateTime<Utc>) -> Recommendation {
    Recommendation {
        id,
        subject_id: rec.subject_id,
        recommendation_type: rec.recommendation_type,
        priority: rec.priority,
        title: rec.title,
        description: rec.description,
        detailed_explanation: rec.detailed_explanation,
        supplement_name: rec.supplement_name,
        suggested_dosage: rec.suggested_dosage,
        frequency: rec.frequency,
        foods_to_include: rec.foods_to_include,
        foods_to_avoid: rec.foods_to_avoid,
        triggered_by_lab_id: rec.triggered_by_lab_id,
        triggered_by_medication_id: rec.triggered_by_medication_id,
        model_used: rec.model_used,
        confidence_score: rec.confidence_score,
        is_active: true,
        is_acknowledged: false,
        acknowledged_at: None,
        user_rating: None,
        user_feedback: None,
        is_followed: None,
        disclaimer: DISCLAIMER.to_string(),
        created_at: now,
        updated_at: now,
        expires_at: rec.expires_at,
    }
}

/// Fixed-width UTC timestamps so text order matches time order
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_timestamp(idx: usize, s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_timestamp(idx, &s)).transpose()
}

fn parse_food_list(idx: usize, s: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_subject(row: &Row) -> rusqlite::Result<Subject> {
    let dob: String = row.get(4)?;
    let gender: Option<String> = row.get(5)?;

    Ok(Subject {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        date_of_birth: NaiveDate::parse_from_str(&dob, "%Y-%m-%d")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        gender: gender.as_deref().and_then(Gender::parse),
        medical_conditions: row.get(6)?,
    })
}

fn row_to_medication(row: &Row) -> rusqlite::Result<Medication> {
    Ok(Medication {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        name: row.get(2)?,
        dosage: row.get(3)?,
        is_active: row.get(4)?,
    })
}

fn row_to_lab_result(row: &Row) -> rusqlite::Result<LabResult> {
    let status: String = row.get(7)?;
    let test_date: String = row.get(8)?;

    Ok(LabResult {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        test_name: row.get(2)?,
        value: row.get(3)?,
        unit: row.get(4)?,
        reference_range_low: row.get(5)?,
        reference_range_high: row.get(6)?,
        status: LabStatus::parse(&status),
        test_date: parse_timestamp(8, &test_date)?,
    })
}

fn row_to_diet_entry(row: &Row) -> rusqlite::Result<DietEntry> {
    let entry_date: String = row.get(3)?;

    Ok(DietEntry {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        food_name: row.get(2)?,
        entry_date: parse_timestamp(3, &entry_date)?,
    })
}

fn row_to_recommendation(row: &Row) -> rusqlite::Result<Recommendation> {
    let recommendation_type: String = row.get(2)?;
    let priority: String = row.get(3)?;
    let foods_to_include: String = row.get(10)?;
    let foods_to_avoid: String = row.get(11)?;
    let acknowledged_at: Option<String> = row.get(18)?;
    let created_at: String = row.get(23)?;
    let updated_at: String = row.get(24)?;
    let expires_at: Option<String> = row.get(25)?;

    Ok(Recommendation {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        recommendation_type: RecommendationType::from_label(&recommendation_type),
        priority: Priority::from_label(&priority),
        title: row.get(4)?,
        description: row.get(5)?,
        detailed_explanation: row.get(6)?,
        supplement_name: row.get(7)?,
        suggested_dosage: row.get(8)?,
        frequency: row.get(9)?,
        foods_to_include: parse_food_list(10, &foods_to_include)?,
        foods_to_avoid: parse_food_list(11, &foods_to_avoid)?,
        triggered_by_lab_id: row.get(12)?,
        triggered_by_medication_id: row.get(13)?,
        model_used: row.get(14)?,
        confidence_score: row.get(15)?,
        is_active: row.get(16)?,
        is_acknowledged: row.get(17)?,
        acknowledged_at: parse_optional_timestamp(18, acknowledged_at)?,
        user_rating: row.get(19)?,
        user_feedback: row.get(20)?,
        is_followed: row.get(21)?,
        disclaimer: row.get(22)?,
        created_at: parse_timestamp(23, &created_at)?,
        updated_at: parse_timestamp(24, &updated_at)?,
        expires_at: parse_optional_timestamp(25, expires_at)?,
    })
}
