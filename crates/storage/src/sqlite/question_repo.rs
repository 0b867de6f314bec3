use qbank_core::model::{Question, QuestionFilters, QuestionId, TagSlug};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{map_question_row, question_id_from_i64, ser, u64_to_i64},
};
use crate::repository::{CandidateQuestion, QuestionRepository, StorageError};

const QUESTION_COLUMNS: &str =
    "id, slug, stem_md, explanation_md, difficulty, status, choices, created_at";

impl SqliteRepository {
    async fn tags_for(&self, id: QuestionId) -> Result<Vec<TagSlug>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT tag_slug FROM question_tags
            WHERE question_id = ?1
            ORDER BY tag_slug ASC
            ",
        )
        .bind(u64_to_i64("question_id", id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut tags = Vec::with_capacity(rows.len());
        for row in rows {
            let slug: String = row.try_get("tag_slug").map_err(ser)?;
            tags.push(TagSlug::new(slug).map_err(ser)?);
        }
        Ok(tags)
    }

    async fn fetch_question(
        &self,
        id: QuestionId,
        published_only: bool,
    ) -> Result<Option<Question>, StorageError> {
        let sql = if published_only {
            format!(
                "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1 AND status = 'published'"
            )
        } else {
            format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1")
        };

        let row = sqlx::query(&sql)
            .bind(u64_to_i64("question_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let tags = self.tags_for(id).await?;
        Ok(Some(map_question_row(&row, tags)?))
    }
}

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let choices_json = serde_json::to_string(question.choices()).map_err(ser)?;
        let id = u64_to_i64("question_id", question.id().value())?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO questions (
                id, slug, stem_md, explanation_md, difficulty, status, choices, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                -- keep created_at from the original insert
                slug = excluded.slug,
                stem_md = excluded.stem_md,
                explanation_md = excluded.explanation_md,
                difficulty = excluded.difficulty,
                status = excluded.status,
                choices = excluded.choices
            ",
        )
        .bind(id)
        .bind(question.slug())
        .bind(question.stem_md())
        .bind(question.explanation_md())
        .bind(question.difficulty().as_str())
        .bind(question.status().as_str())
        .bind(choices_json)
        .bind(question.created_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query("DELETE FROM question_tags WHERE question_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for tag in question.tags() {
            sqlx::query("INSERT INTO question_tags (question_id, tag_slug) VALUES (?1, ?2)")
                .bind(id)
                .bind(tag.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        self.fetch_question(id, false).await
    }

    async fn get_published(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        self.fetch_question(id, true).await
    }

    async fn list_published_candidates(
        &self,
        filters: &QuestionFilters,
    ) -> Result<Vec<CandidateQuestion>, StorageError> {
        let mut sql = String::from(
            r"
            SELECT q.id, q.created_at FROM questions q
            WHERE q.status = 'published'
            ",
        );
        let mut next_param = 1;

        if !filters.difficulties.is_empty() {
            sql.push_str("AND q.difficulty IN (");
            for i in 0..filters.difficulties.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push('?');
                sql.push_str(&(next_param + i).to_string());
            }
            sql.push_str(")\n");
            next_param += filters.difficulties.len();
        }

        if !filters.tags.is_empty() {
            sql.push_str(
                "AND EXISTS (SELECT 1 FROM question_tags t WHERE t.question_id = q.id AND t.tag_slug IN (",
            );
            for i in 0..filters.tags.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push('?');
                sql.push_str(&(next_param + i).to_string());
            }
            sql.push_str("))\n");
        }

        sql.push_str("ORDER BY q.id ASC");

        let mut query = sqlx::query(&sql);
        for difficulty in &filters.difficulties {
            query = query.bind(difficulty.as_str());
        }
        for tag in &filters.tags {
            query = query.bind(tag.as_str());
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            candidates.push(CandidateQuestion {
                id: question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
                created_at: row.try_get("created_at").map_err(ser)?,
            });
        }
        Ok(candidates)
    }
}
