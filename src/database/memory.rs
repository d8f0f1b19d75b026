use std::collections::{BTreeMap, HashMap, VecDeque};

use tokio::sync::Mutex;

use super::connection::{PollLedger, QuestionQueue, Scoreboard, StoreResult, TargetRegistry};
use super::quiz::{ActivePoll, Question, QuestionDraft, TargetChat, UserScore};

/// Process-local storage. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    last_id: i64,
    questions: BTreeMap<i64, Question>,
    targets: Vec<TargetChat>,
    polls: HashMap<String, ActivePoll>,
    poll_order: VecDeque<String>,
    scores: HashMap<u64, UserScore>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QuestionQueue for MemoryStore {
    async fn enqueue_questions(&self, drafts: Vec<QuestionDraft>) -> StoreResult<Vec<i64>> {
        let mut state = self.inner.lock().await;
        let mut ids = Vec::with_capacity(drafts.len());

        for draft in drafts {
            state.last_id += 1;
            let id = state.last_id;
            state.questions.insert(id, Question::retrieve(id, draft));
            ids.push(id);
        }

        Ok(ids)
    }

    async fn oldest_questions(&self, limit: Option<usize>) -> StoreResult<Vec<Question>> {
        let state = self.inner.lock().await;
        let limit = limit.unwrap_or(usize::MAX);

        Ok(state.questions.values().take(limit).cloned().collect())
    }

    async fn delete_question(&self, id: i64) -> StoreResult<bool> {
        Ok(self.inner.lock().await.questions.remove(&id).is_some())
    }

    async fn clear_questions(&self) -> StoreResult<u64> {
        let mut state = self.inner.lock().await;
        let cleared = state.questions.len() as u64;
        state.questions.clear();

        Ok(cleared)
    }

    async fn count_questions(&self) -> StoreResult<u64> {
        Ok(self.inner.lock().await.questions.len() as u64)
    }
}

impl TargetRegistry for MemoryStore {
    async fn add_target(&self, target: TargetChat) -> StoreResult<bool> {
        let mut state = self.inner.lock().await;

        match state
            .targets
            .iter_mut()
            .find(|known| known.chat_id() == target.chat_id())
        {
            Some(known) => {
                if target.title().is_some() {
                    *known = target;
                }
                Ok(false)
            }
            None => {
                state.targets.push(target);
                Ok(true)
            }
        }
    }

    async fn list_targets(&self) -> StoreResult<Vec<TargetChat>> {
        Ok(self.inner.lock().await.targets.clone())
    }

    async fn remove_target(&self, chat_id: i64) -> StoreResult<bool> {
        let mut state = self.inner.lock().await;
        let before = state.targets.len();
        state.targets.retain(|target| target.chat_id() != chat_id);

        Ok(state.targets.len() < before)
    }

    async fn count_targets(&self) -> StoreResult<u64> {
        Ok(self.inner.lock().await.targets.len() as u64)
    }
}

impl PollLedger for MemoryStore {
    async fn record_poll(&self, poll: ActivePoll) -> StoreResult<()> {
        let mut state = self.inner.lock().await;

        if !state.polls.contains_key(poll.poll_id()) {
            state.poll_order.push_back(poll.poll_id().to_owned());
            state.polls.insert(poll.poll_id().to_owned(), poll);
        }

        Ok(())
    }

    async fn retrieve_poll(&self, poll_id: &str) -> StoreResult<Option<ActivePoll>> {
        Ok(self.inner.lock().await.polls.get(poll_id).cloned())
    }

    async fn prune_polls(&self, keep: usize) -> StoreResult<u64> {
        let mut state = self.inner.lock().await;
        let mut pruned = 0;

        while state.poll_order.len() > keep {
            if let Some(oldest) = state.poll_order.pop_front() {
                state.polls.remove(&oldest);
                pruned += 1;
            }
        }

        Ok(pruned)
    }
}

impl Scoreboard for MemoryStore {
    async fn record_response(
        &self,
        user_id: u64,
        display_name: &str,
        correct: bool,
    ) -> StoreResult<UserScore> {
        let mut state = self.inner.lock().await;
        let score = state
            .scores
            .entry(user_id)
            .and_modify(|score| score.count_response(display_name.to_owned(), correct))
            .or_insert_with(|| UserScore::first_response(display_name.to_owned(), correct));

        Ok(score.clone())
    }

    async fn retrieve_score(&self, user_id: u64) -> StoreResult<Option<UserScore>> {
        Ok(self.inner.lock().await.scores.get(&user_id).cloned())
    }
}
