use std::sync::Arc;

use teloxide::types::{PollAnswer, Update, User};
use tracing::instrument;

use crate::{
    database::{
        connection::{PollLedger, Scoreboard, StoreResult},
        quiz::UserScore,
    },
    HandlerResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreOutcome {
    /// Pruned or foreign poll.
    UnknownPoll,
    Retracted,
    Recorded { correct: bool, score: UserScore },
}

pub async fn score_answer<S: PollLedger + Scoreboard>(
    store: &S,
    poll_id: &str,
    user_id: u64,
    display_name: &str,
    choice: Option<usize>,
) -> StoreResult<ScoreOutcome> {
    let Some(poll) = store.retrieve_poll(poll_id).await? else {
        return Ok(ScoreOutcome::UnknownPoll);
    };
    let Some(choice) = choice else {
        return Ok(ScoreOutcome::Retracted);
    };

    let correct = choice == poll.correct_index();
    let score = store.record_response(user_id, display_name, correct).await?;

    Ok(ScoreOutcome::Recorded { correct, score })
}

/// Reply to a user asking for their own score.
pub(crate) async fn score_reply<S: Scoreboard>(store: &S, user_id: u64, anonymous: bool) -> String {
    if anonymous {
        return "Scores are not tracked: quizzes are posted anonymously.".to_owned();
    }

    match store.retrieve_score(user_id).await {
        Ok(Some(score)) => format!("🏆 {}", score),
        Ok(None) => "You have not answered any quiz yet.".to_owned(),
        Err(e) => {
            log::error!("Database error: {:?}", e);
            "⚠️ Your score is unavailable right now.".to_owned()
        }
    }
}

pub(crate) fn display_name(user: &User) -> String {
    match &user.username {
        Some(username) => format!("@{}", username),
        None => user.full_name(),
    }
}

#[instrument(level = "debug", skip_all)]
pub(crate) async fn receive_poll_answer<S: PollLedger + Scoreboard>(
    update: Update,
    answer: PollAnswer,
    store: Arc<S>,
) -> HandlerResult {
    let Some(user) = update.from() else {
        return Ok(());
    };
    let poll_id = answer.poll_id.to_string();
    let choice = answer.option_ids.first().map(|&option| option as usize);

    match score_answer(&*store, &poll_id, user.id.0, &display_name(user), choice).await? {
        ScoreOutcome::Recorded { correct, score } => {
            log::info!(
                "{} answered poll {} ({}), now {}/{}",
                score.display_name(),
                poll_id,
                if correct { "correct" } else { "wrong" },
                score.correct_count(),
                score.total_count()
            );
        }
        other => log::debug!("Ignoring answer to poll {}: {:?}", poll_id, other),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{memory::MemoryStore, quiz::ActivePoll};

    async fn store_with_poll(correct_index: usize) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .record_poll(ActivePoll::new("poll", correct_index))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn matching_choice_counts_as_correct() {
        let store = store_with_poll(2).await;

        let outcome = score_answer(&store, "poll", 1, "Ann", Some(2)).await.unwrap();

        let ScoreOutcome::Recorded { correct, score } = outcome else {
            panic!("expected a recorded answer, got {:?}", outcome);
        };
        assert!(correct);
        assert_eq!(score.correct_count(), 1);
        assert_eq!(score.total_count(), 1);
    }

    #[tokio::test]
    async fn other_choice_only_counts_the_attempt() {
        let store = store_with_poll(2).await;

        score_answer(&store, "poll", 1, "Ann", Some(2)).await.unwrap();
        score_answer(&store, "poll", 1, "Ann", Some(0)).await.unwrap();

        let score = store.retrieve_score(1).await.unwrap().unwrap();
        assert_eq!(score.correct_count(), 1);
        assert_eq!(score.total_count(), 2);
    }

    #[tokio::test]
    async fn unknown_poll_is_a_no_op() {
        let store = store_with_poll(0).await;

        let outcome = score_answer(&store, "elsewhere", 1, "Ann", Some(0)).await.unwrap();

        assert_eq!(outcome, ScoreOutcome::UnknownPoll);
        assert!(store.retrieve_score(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn score_reply_depends_on_poll_visibility() {
        let store = store_with_poll(0).await;
        score_answer(&store, "poll", 1, "Ann", Some(0)).await.unwrap();

        assert_eq!(score_reply(&store, 1, false).await, "🏆 Ann: 1/1 correct");
        assert_eq!(score_reply(&store, 2, false).await, "You have not answered any quiz yet.");
        assert!(score_reply(&store, 1, true).await.contains("not tracked"));
    }

    #[tokio::test]
    async fn retracted_vote_is_not_counted() {
        let store = store_with_poll(0).await;

        let outcome = score_answer(&store, "poll", 1, "Ann", None).await.unwrap();

        assert_eq!(outcome, ScoreOutcome::Retracted);
        assert!(store.retrieve_score(1).await.unwrap().is_none());
    }
}
