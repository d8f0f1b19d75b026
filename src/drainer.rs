//! Publishes queued questions to every registered chat and retires them.
//!
//! A question is deleted once at least one chat received it. There is no in-flight
//! marker: a crash between publishing and deleting re-sends that question on the
//! next run.

use std::time::Duration;

use tokio::time::sleep;
use tracing::instrument;

use crate::{
    database::{
        connection::{PollLedger, QuestionQueue, StoreResult, TargetRegistry},
        quiz::{ActivePoll, Question, TargetChat},
    },
    publisher::QuizTransport,
};

#[derive(Debug, Clone)]
pub struct DrainSettings {
    /// Pause between two published questions.
    pub pause: Duration,
    /// Every that many questions the pause is `long_pause` instead; 0 disables it.
    pub long_pause_every: usize,
    pub long_pause: Duration,
    pub max_per_run: Option<usize>,
    /// 0 disables progress reports.
    pub progress_every: usize,
    /// Anonymous quizzes get no answer updates, so they are not scored.
    pub anonymous: bool,
    pub poll_retention: usize,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            pause: Duration::from_secs(3),
            long_pause_every: 20,
            long_pause: Duration::from_secs(15),
            max_per_run: None,
            progress_every: 10,
            anonymous: true,
            poll_retention: 5000,
        }
    }
}

/// Result of fanning one question out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub published: Vec<i64>,
    pub failed: Vec<(i64, String)>,
}

impl Delivery {
    pub fn is_drained(&self) -> bool {
        !self.published.is_empty()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainSummary {
    pub attempted: usize,
    pub drained: usize,
    pub failed_deliveries: usize,
    pub remaining: u64,
}

impl DrainSummary {
    /// Questions that every target rejected and which stay queued.
    pub fn kept(&self) -> usize {
        self.attempted - self.drained
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    EmptyQueue,
    NoTargets,
    Completed(DrainSummary),
}

pub struct Drainer<'a, S, T> {
    store: &'a S,
    transport: &'a T,
    settings: &'a DrainSettings,
    report_to: Option<i64>,
}

impl<'a, S, T> Drainer<'a, S, T>
where
    S: QuestionQueue + TargetRegistry + PollLedger,
    T: QuizTransport,
{
    pub fn new(store: &'a S, transport: &'a T, settings: &'a DrainSettings) -> Self {
        Self {
            store,
            transport,
            settings,
            report_to: None,
        }
    }

    /// Chat that receives delivery failures and progress.
    pub fn report_to(mut self, chat_id: i64) -> Self {
        self.report_to = Some(chat_id);
        self
    }

    /// Sends `question` to each target, then deletes it if any send succeeded.
    #[instrument(level = "debug", skip_all, fields(question = question.id()))]
    pub async fn publish_one(
        &self,
        question: &Question,
        targets: &[TargetChat],
    ) -> StoreResult<Delivery> {
        let mut delivery = Delivery::default();

        for target in targets {
            match self
                .transport
                .publish_quiz(target.chat_id(), question, self.settings.anonymous)
                .await
            {
                Ok(poll_id) => {
                    log::info!(
                        "Question {} published to {} as poll {}",
                        question.id(),
                        target.chat_id(),
                        poll_id
                    );
                    // Telegram reports no answers for anonymous polls.
                    if !self.settings.anonymous {
                        let poll = ActivePoll::new(poll_id, question.correct_index());
                        if let Err(e) = self.store.record_poll(poll).await {
                            log::warn!("Failed to remember poll of question {}: {}", question.id(), e);
                        }
                    }
                    delivery.published.push(target.chat_id());
                }
                Err(e) => {
                    log::warn!(
                        "Question {} could not be sent to {}: {}",
                        question.id(),
                        target,
                        e
                    );
                    self.report(format!(
                        "⚠️ Question #{} could not be sent to {}: {}",
                        question.id(),
                        target,
                        e
                    ))
                    .await;
                    delivery.failed.push((target.chat_id(), e.to_string()));
                }
            }
        }

        if delivery.is_drained() {
            self.store.delete_question(question.id()).await?;
        } else {
            log::warn!("Question {} reached no chat and stays queued", question.id());
        }

        Ok(delivery)
    }

    /// Drains the oldest queued question.
    #[instrument(level = "info", skip_all)]
    pub async fn send_next(&self) -> StoreResult<DrainOutcome> {
        let Some(question) = self.store.oldest_questions(Some(1)).await?.into_iter().next() else {
            return Ok(DrainOutcome::EmptyQueue);
        };
        let targets = self.store.list_targets().await?;
        if targets.is_empty() {
            return Ok(DrainOutcome::NoTargets);
        }

        let delivery = self.publish_one(&question, &targets).await?;

        Ok(DrainOutcome::Completed(DrainSummary {
            attempted: 1,
            drained: usize::from(delivery.is_drained()),
            failed_deliveries: delivery.failed.len(),
            remaining: self.store.count_questions().await?,
        }))
    }

    /// Drains every queued question oldest first, up to `max_per_run`, pacing between them.
    #[instrument(level = "info", skip_all)]
    pub async fn send_all(&self) -> StoreResult<DrainOutcome> {
        let questions = self.store.oldest_questions(self.settings.max_per_run).await?;
        if questions.is_empty() {
            return Ok(DrainOutcome::EmptyQueue);
        }
        let targets = self.store.list_targets().await?;
        if targets.is_empty() {
            return Ok(DrainOutcome::NoTargets);
        }

        let total = questions.len();
        let mut summary = DrainSummary::default();
        log::info!("Sending {} questions to {} chats", total, targets.len());

        for (i, question) in questions.iter().enumerate() {
            if i > 0 {
                sleep(self.pause_after(i)).await;
            }

            let delivery = self.publish_one(question, &targets).await?;
            summary.attempted += 1;
            summary.drained += usize::from(delivery.is_drained());
            summary.failed_deliveries += delivery.failed.len();

            let sent = i + 1;
            if self.settings.progress_every > 0
                && sent % self.settings.progress_every == 0
                && sent < total
            {
                self.report(format!("📤 Sent {} of {}", sent, total)).await;
            }
        }

        let pruned = self.store.prune_polls(self.settings.poll_retention).await?;
        if pruned > 0 {
            log::debug!("Pruned {} old polls", pruned);
        }

        summary.remaining = self.store.count_questions().await?;
        Ok(DrainOutcome::Completed(summary))
    }

    fn pause_after(&self, sent: usize) -> Duration {
        let every = self.settings.long_pause_every;
        if every > 0 && sent % every == 0 {
            self.settings.long_pause
        } else {
            self.settings.pause
        }
    }

    async fn report(&self, text: String) {
        let Some(chat_id) = self.report_to else {
            return;
        };
        if let Err(e) = self.transport.notify(chat_id, &text).await {
            log::warn!("Failed to report to {}: {}", chat_id, e);
        }
    }
}
