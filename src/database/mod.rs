use connection::{
    Connection, PollLedger, QuestionQueue, Scoreboard, StoreResult, TargetRegistry,
};
use memory::MemoryStore;
use quiz::{ActivePoll, Question, QuestionDraft, TargetChat, UserScore};

pub mod connection;
pub mod memory;
pub mod quiz;

/// The backend chosen at startup.
pub enum Storage {
    Postgres(Connection),
    Memory(MemoryStore),
}

macro_rules! delegate {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            Storage::Postgres($store) => $call.await,
            Storage::Memory($store) => $call.await,
        }
    };
}

impl QuestionQueue for Storage {
    async fn enqueue_questions(&self, drafts: Vec<QuestionDraft>) -> StoreResult<Vec<i64>> {
        delegate!(self, store => store.enqueue_questions(drafts))
    }

    async fn oldest_questions(&self, limit: Option<usize>) -> StoreResult<Vec<Question>> {
        delegate!(self, store => store.oldest_questions(limit))
    }

    async fn delete_question(&self, id: i64) -> StoreResult<bool> {
        delegate!(self, store => store.delete_question(id))
    }

    async fn clear_questions(&self) -> StoreResult<u64> {
        delegate!(self, store => store.clear_questions())
    }

    async fn count_questions(&self) -> StoreResult<u64> {
        delegate!(self, store => store.count_questions())
    }
}

impl TargetRegistry for Storage {
    async fn add_target(&self, target: TargetChat) -> StoreResult<bool> {
        delegate!(self, store => store.add_target(target))
    }

    async fn list_targets(&self) -> StoreResult<Vec<TargetChat>> {
        delegate!(self, store => store.list_targets())
    }

    async fn remove_target(&self, chat_id: i64) -> StoreResult<bool> {
        delegate!(self, store => store.remove_target(chat_id))
    }

    async fn count_targets(&self) -> StoreResult<u64> {
        delegate!(self, store => store.count_targets())
    }
}

impl PollLedger for Storage {
    async fn record_poll(&self, poll: ActivePoll) -> StoreResult<()> {
        delegate!(self, store => store.record_poll(poll))
    }

    async fn retrieve_poll(&self, poll_id: &str) -> StoreResult<Option<ActivePoll>> {
        delegate!(self, store => store.retrieve_poll(poll_id))
    }

    async fn prune_polls(&self, keep: usize) -> StoreResult<u64> {
        delegate!(self, store => store.prune_polls(keep))
    }
}

impl Scoreboard for Storage {
    async fn record_response(
        &self,
        user_id: u64,
        display_name: &str,
        correct: bool,
    ) -> StoreResult<UserScore> {
        delegate!(self, store => store.record_response(user_id, display_name, correct))
    }

    async fn retrieve_score(&self, user_id: u64) -> StoreResult<Option<UserScore>> {
        delegate!(self, store => store.retrieve_score(user_id))
    }
}
