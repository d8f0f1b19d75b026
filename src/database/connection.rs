#![allow(async_fn_in_trait)]

use std::error::Error;

use sqlx::postgres::PgPool;

use super::quiz::{ActivePoll, Question, QuestionDraft, TargetChat, UserScore};

pub type StoreResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

pub struct Connection {
    pool: PgPool,
}

impl Connection {
    pub async fn connect(connection_string: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(connection_string).await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> StoreResult<()> {
        log::debug!("Applying migrations");
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }
}

/// Pending questions, drained oldest first.
pub trait QuestionQueue {
    async fn enqueue_questions(&self, drafts: Vec<QuestionDraft>) -> StoreResult<Vec<i64>>;

    /// Ascending by id. `None` means no limit.
    async fn oldest_questions(&self, limit: Option<usize>) -> StoreResult<Vec<Question>>;

    /// Returns whether a row was removed; deleting a missing id is a no-op.
    async fn delete_question(&self, id: i64) -> StoreResult<bool>;

    async fn clear_questions(&self) -> StoreResult<u64>;

    async fn count_questions(&self) -> StoreResult<u64>;
}

pub trait TargetRegistry {
    /// Returns `true` when the chat was not registered before.
    async fn add_target(&self, target: TargetChat) -> StoreResult<bool>;

    /// In registration order.
    async fn list_targets(&self) -> StoreResult<Vec<TargetChat>>;

    async fn remove_target(&self, chat_id: i64) -> StoreResult<bool>;

    async fn count_targets(&self) -> StoreResult<u64>;
}

pub trait PollLedger {
    async fn record_poll(&self, poll: ActivePoll) -> StoreResult<()>;

    async fn retrieve_poll(&self, poll_id: &str) -> StoreResult<Option<ActivePoll>>;

    /// Keeps the `keep` most recently recorded polls.
    async fn prune_polls(&self, keep: usize) -> StoreResult<u64>;
}

pub trait Scoreboard {
    async fn record_response(
        &self,
        user_id: u64,
        display_name: &str,
        correct: bool,
    ) -> StoreResult<UserScore>;

    async fn retrieve_score(&self, user_id: u64) -> StoreResult<Option<UserScore>>;
}

type QuestionRow = (i64, String, Vec<String>, i32, Option<String>);
type ScoreRow = (String, i32, i32);

fn question_from_row((id, prompt, options, correct_index, explanation): QuestionRow) -> StoreResult<Question> {
    let correct_index = usize::try_from(correct_index)?;
    if correct_index >= options.len() {
        return Err(format!("question {} has correct index {} outside its options", id, correct_index).into());
    }
    Ok(Question::retrieve(
        id,
        QuestionDraft::new(prompt, options, correct_index, explanation),
    ))
}

fn score_from_row((display_name, correct, total): ScoreRow) -> StoreResult<UserScore> {
    Ok(UserScore::retrieve(
        display_name,
        u32::try_from(correct)?,
        u32::try_from(total)?,
    ))
}

impl QuestionQueue for Connection {
    async fn enqueue_questions(&self, drafts: Vec<QuestionDraft>) -> StoreResult<Vec<i64>> {
        log::debug!("Creating transaction");
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO questions (prompt, options, correct_index, explanation) VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .bind(draft.prompt())
            .bind(draft.options())
            .bind(i32::try_from(draft.correct_index())?)
            .bind(draft.explanation())
            .fetch_one(&mut *tx)
            .await?;
            log::debug!("Queued question {} with id {}", draft.prompt(), id);
            ids.push(id);
        }

        log::debug!("Closing transaction");
        tx.commit().await?;

        Ok(ids)
    }

    async fn oldest_questions(&self, limit: Option<usize>) -> StoreResult<Vec<Question>> {
        let limit = match limit {
            Some(limit) => Some(i64::try_from(limit)?),
            None => None,
        };
        let rows: Vec<QuestionRow> = sqlx::query_as(
            "SELECT id, prompt, options, correct_index, explanation FROM questions ORDER BY id ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(question_from_row).collect()
    }

    async fn delete_question(&self, id: i64) -> StoreResult<bool> {
        let deleted = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(deleted.rows_affected() > 0)
    }

    async fn clear_questions(&self) -> StoreResult<u64> {
        let deleted = sqlx::query("DELETE FROM questions")
            .execute(&self.pool)
            .await?;

        Ok(deleted.rows_affected())
    }

    async fn count_questions(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions")
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(count)?)
    }
}

impl TargetRegistry for Connection {
    async fn add_target(&self, target: TargetChat) -> StoreResult<bool> {
        let inserted = sqlx::query(
            "INSERT INTO target_chats (chat_id, title) VALUES ($1, $2) ON CONFLICT (chat_id) DO NOTHING",
        )
        .bind(target.chat_id())
        .bind(target.title())
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            return Ok(true);
        }

        if let Some(title) = target.title() {
            sqlx::query("UPDATE target_chats SET title = $1 WHERE chat_id = $2")
                .bind(title)
                .bind(target.chat_id())
                .execute(&self.pool)
                .await?;
        }

        Ok(false)
    }

    async fn list_targets(&self) -> StoreResult<Vec<TargetChat>> {
        let rows: Vec<(i64, Option<String>)> =
            sqlx::query_as("SELECT chat_id, title FROM target_chats ORDER BY seq ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(chat_id, title)| TargetChat::new(chat_id, title))
            .collect())
    }

    async fn remove_target(&self, chat_id: i64) -> StoreResult<bool> {
        let deleted = sqlx::query("DELETE FROM target_chats WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(deleted.rows_affected() > 0)
    }

    async fn count_targets(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM target_chats")
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(count)?)
    }
}

impl PollLedger for Connection {
    async fn record_poll(&self, poll: ActivePoll) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO active_polls (poll_id, correct_index) VALUES ($1, $2) ON CONFLICT (poll_id) DO NOTHING",
        )
        .bind(poll.poll_id())
        .bind(i32::try_from(poll.correct_index())?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn retrieve_poll(&self, poll_id: &str) -> StoreResult<Option<ActivePoll>> {
        let row: Option<(String, i32)> =
            sqlx::query_as("SELECT poll_id, correct_index FROM active_polls WHERE poll_id = $1")
                .bind(poll_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((poll_id, correct_index)) => {
                Ok(Some(ActivePoll::new(poll_id, usize::try_from(correct_index)?)))
            }
            None => Ok(None),
        }
    }

    async fn prune_polls(&self, keep: usize) -> StoreResult<u64> {
        let deleted = sqlx::query(
            "DELETE FROM active_polls WHERE seq NOT IN (SELECT seq FROM active_polls ORDER BY seq DESC LIMIT $1)",
        )
        .bind(i64::try_from(keep)?)
        .execute(&self.pool)
        .await?;

        Ok(deleted.rows_affected())
    }
}

impl Scoreboard for Connection {
    async fn record_response(
        &self,
        user_id: u64,
        display_name: &str,
        correct: bool,
    ) -> StoreResult<UserScore> {
        let row: ScoreRow = sqlx::query_as(
            "INSERT INTO user_scores (user_id, display_name, correct_count, total_count) VALUES ($1, $2, $3, 1) \
             ON CONFLICT (user_id) DO UPDATE SET display_name = EXCLUDED.display_name, \
             correct_count = user_scores.correct_count + EXCLUDED.correct_count, \
             total_count = user_scores.total_count + 1 \
             RETURNING display_name, correct_count, total_count",
        )
        .bind(i64::try_from(user_id)?)
        .bind(display_name)
        .bind(i32::from(correct))
        .fetch_one(&self.pool)
        .await?;

        score_from_row(row)
    }

    async fn retrieve_score(&self, user_id: u64) -> StoreResult<Option<UserScore>> {
        let row: Option<ScoreRow> = sqlx::query_as(
            "SELECT display_name, correct_count, total_count FROM user_scores WHERE user_id = $1",
        )
        .bind(i64::try_from(user_id)?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(score_from_row).transpose()
    }
}
