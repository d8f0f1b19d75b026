//! Admin actions. Commands and control panel buttons both end up here.

use std::{fmt, sync::Arc};

use teloxide::{
    dispatching::dialogue::GetChatId,
    payloads::{AnswerCallbackQuerySetters, EditMessageTextSetters, SendMessageSetters},
    prelude::Requester,
    types::{CallbackQuery, ChatId, InlineKeyboardMarkup, Message},
    Bot,
};
use tracing::instrument;

use crate::{
    config::Config,
    database::{
        connection::{PollLedger, QuestionQueue, StoreResult, TargetRegistry},
        quiz::TargetChat,
    },
    drainer::{DrainOutcome, Drainer},
    keyboard::{clear_confirm_keyboard, panel_keyboard, targets_keyboard, PanelAction},
    publisher::{QuizTransport, TelegramTransport},
    state::PanelState,
    HandlerResult, PanelDialogue,
};

/// Text plus optional inline keyboard sent back to the admin.
#[derive(Debug)]
pub(crate) struct Reply {
    text: String,
    markup: Option<InlineKeyboardMarkup>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: None,
        }
    }

    fn with_markup(mut self, markup: InlineKeyboardMarkup) -> Self {
        self.markup = Some(markup);
        self
    }
}

/// Sends the reply, or the failure reason when the action failed.
pub(crate) async fn deliver(
    bot: &Bot,
    chat_id: ChatId,
    action: &str,
    result: StoreResult<Reply>,
) -> HandlerResult {
    match result {
        Ok(reply) => {
            let request = bot.send_message(chat_id, reply.text);
            match reply.markup {
                Some(markup) => request.reply_markup(markup).await?,
                None => request.await?,
            };
        }
        Err(e) => {
            log::error!("{} failed: {:?}", action, e);
            bot.send_message(chat_id, format!("⚠️ {} failed: {}", action, e))
                .await?;
        }
    }

    Ok(())
}

pub(crate) fn stats_text(questions: u64, targets: u64) -> String {
    format!(
        "📊 Queued questions: {}\n🎯 Target chats: {}",
        questions, targets
    )
}

pub(crate) fn describe_outcome(outcome: &DrainOutcome) -> String {
    match outcome {
        DrainOutcome::EmptyQueue => "❌ Nothing to send: the queue is empty.".to_owned(),
        DrainOutcome::NoTargets => {
            "❌ Nothing to send: no target chats are registered. Use /addchat or /addchatid."
                .to_owned()
        }
        DrainOutcome::Completed(summary) => {
            let mut text = format!(
                "✅ Sent {} of {} questions.",
                summary.drained, summary.attempted
            );
            if summary.failed_deliveries > 0 {
                text.push_str(&format!(
                    "\n⚠️ {} deliveries failed.",
                    summary.failed_deliveries
                ));
            }
            if summary.kept() > 0 {
                text.push_str(&format!(
                    "\n↩️ {} questions reached no chat and stay queued.",
                    summary.kept()
                ));
            }
            text.push_str(&format!("\n📊 Remaining in queue: {}", summary.remaining));
            text
        }
    }
}

pub(crate) async fn panel<S: QuestionQueue + TargetRegistry>(store: &S) -> StoreResult<Reply> {
    let text = stats_text(store.count_questions().await?, store.count_targets().await?);
    Ok(Reply::text(format!("🛠️ Admin panel\n\n{}", text)).with_markup(panel_keyboard()))
}

pub(crate) async fn stats<S: QuestionQueue + TargetRegistry>(store: &S) -> StoreResult<Reply> {
    Ok(Reply::text(stats_text(
        store.count_questions().await?,
        store.count_targets().await?,
    )))
}

pub(crate) async fn peek<S: QuestionQueue>(store: &S) -> StoreResult<Reply> {
    match store.oldest_questions(Some(1)).await?.into_iter().next() {
        Some(question) => Ok(Reply::text(format!("👀 Next question {}", question))),
        None => Ok(Reply::text("📭 The queue is empty.")),
    }
}

pub(crate) async fn send_one<S, T>(
    store: &S,
    transport: &T,
    config: &Config,
    admin_chat: ChatId,
) -> StoreResult<Reply>
where
    S: QuestionQueue + TargetRegistry + PollLedger,
    T: QuizTransport,
{
    let outcome = Drainer::new(store, transport, &config.drain)
        .report_to(admin_chat.0)
        .send_next()
        .await?;

    Ok(Reply::text(describe_outcome(&outcome)))
}

pub(crate) async fn send_all<S, T>(
    store: &S,
    transport: &T,
    config: &Config,
    admin_chat: ChatId,
) -> StoreResult<Reply>
where
    S: QuestionQueue + TargetRegistry + PollLedger,
    T: QuizTransport,
{
    let drainer = Drainer::new(store, transport, &config.drain).report_to(admin_chat.0);

    let queued = store.count_questions().await?;
    if queued > 0 && store.count_targets().await? > 0 {
        let planned = config
            .drain
            .max_per_run
            .map_or(queued, |cap| queued.min(cap as u64));
        if let Err(e) = transport
            .notify(admin_chat.0, &format!("📢 Sending {} questions…", planned))
            .await
        {
            log::warn!("Failed to announce the run to {}: {}", admin_chat.0, e);
        }
    }

    let outcome = drainer.send_all().await?;
    Ok(Reply::text(describe_outcome(&outcome)))
}

pub(crate) fn confirm_clear() -> Reply {
    Reply::text("🗑️ Delete every queued question?").with_markup(clear_confirm_keyboard())
}

pub(crate) async fn clear<S: QuestionQueue>(store: &S) -> StoreResult<Reply> {
    let cleared = store.clear_questions().await?;
    Ok(Reply::text(format!("🗑️ Deleted {} queued questions.", cleared)))
}

pub(crate) async fn list_targets<S: TargetRegistry>(store: &S) -> StoreResult<Reply> {
    let targets = store.list_targets().await?;
    if targets.is_empty() {
        return Ok(Reply::text(
            "🎯 No target chats yet. Send /addchat in a group or /addchatid <id>.",
        ));
    }

    let mut text = format!("🎯 Target chats ({}):", targets.len());
    for target in &targets {
        text.push_str(&format!("\n• {}", target));
    }
    text.push_str("\n\nPress a chat to remove it.");

    Ok(Reply::text(text).with_markup(targets_keyboard(&targets)))
}

pub(crate) async fn remove_target<S: TargetRegistry>(store: &S, chat_id: i64) -> StoreResult<Reply> {
    if store.remove_target(chat_id).await? {
        Ok(Reply::text(format!("✅ Chat {} removed from targets.", chat_id)))
    } else {
        Ok(Reply::text(format!("❌ Chat {} is not a target.", chat_id)))
    }
}

pub(crate) async fn register_target<S: TargetRegistry>(
    store: &S,
    target: TargetChat,
) -> StoreResult<Reply> {
    let label = target.to_string();
    if store.add_target(target).await? {
        Ok(Reply::text(format!("✅ {} will receive quizzes.", label)))
    } else {
        Ok(Reply::text(format!("ℹ️ {} is already a target.", label)))
    }
}

/// Registers a chat the admin is not in, looking its title up first.
pub(crate) async fn register_target_by_id<S, T>(
    store: &S,
    transport: &T,
    chat_id: i64,
) -> StoreResult<Reply>
where
    S: TargetRegistry,
    T: QuizTransport,
{
    let title = match transport.chat_title(chat_id).await {
        Ok(title) => title,
        Err(e) => {
            log::warn!("Could not look up chat {}: {}", chat_id, e);
            None
        }
    };

    register_target(store, TargetChat::new(chat_id, title)).await
}

/// A failed edit is logged; the caller then sends the panel as a new message.
fn edited_in_place<T, E: fmt::Display>(edited: Result<T, E>) -> bool {
    match edited {
        Ok(_) => true,
        Err(e) => {
            log::debug!("Panel not refreshed in place: {}", e);
            false
        }
    }
}

#[instrument(level = "info", skip(bot, dialogue, store, config))]
pub(crate) async fn handle_callback<S>(
    bot: Bot,
    q: CallbackQuery,
    dialogue: PanelDialogue,
    store: Arc<S>,
    config: Arc<Config>,
) -> HandlerResult
where
    S: QuestionQueue + TargetRegistry + PollLedger,
{
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(chat_id) = q.chat_id() else {
        return Ok(());
    };
    let Some(action) = q.data.as_deref().and_then(PanelAction::parse) else {
        log::warn!("Unknown callback data {:?}", q.data);
        return Ok(());
    };
    log::info!("Admin {} pressed {:?}", q.from.id, action);

    let transport = TelegramTransport::new(bot.clone());
    let store = &*store;

    match action {
        PanelAction::Refresh => {
            let reply = panel(store).await;
            if let (Ok(reply), Some(message)) = (&reply, &q.message) {
                let edited = bot
                    .edit_message_text(chat_id, message.id(), reply.text.clone())
                    .reply_markup(panel_keyboard())
                    .await;
                if edited_in_place(edited) {
                    return Ok(());
                }
            }
            deliver(&bot, chat_id, "Refresh", reply).await?;
        }
        PanelAction::SendOne => {
            let reply = send_one(store, &transport, &config, chat_id).await;
            deliver(&bot, chat_id, "Sending", reply).await?;
        }
        PanelAction::SendAll => {
            let reply = send_all(store, &transport, &config, chat_id).await;
            deliver(&bot, chat_id, "Sending", reply).await?;
        }
        PanelAction::Clear => deliver(&bot, chat_id, "Clearing", Ok(confirm_clear())).await?,
        PanelAction::ConfirmClear => {
            let reply = clear(store).await;
            deliver(&bot, chat_id, "Clearing", reply).await?;
        }
        PanelAction::CancelClear => {
            deliver(&bot, chat_id, "Clearing", Ok(Reply::text("👌 Nothing was deleted."))).await?;
        }
        PanelAction::ListTargets => {
            let reply = list_targets(store).await;
            deliver(&bot, chat_id, "Listing targets", reply).await?;
        }
        PanelAction::AddTargetById => {
            dialogue.update(PanelState::AwaitingChatId).await?;
            bot.send_message(
                chat_id,
                "Send the numeric chat id (channels look like -1001234567890), or /cancel.",
            )
            .await?;
        }
        PanelAction::RemoveTarget(target) => {
            let reply = remove_target(store, target).await;
            deliver(&bot, chat_id, "Removing target", reply).await?;
        }
    }

    Ok(())
}

#[instrument(level = "info", skip(bot))]
pub(crate) async fn refuse_callback(bot: Bot, q: CallbackQuery) -> HandlerResult {
    log::info!("Ignoring panel button from non-admin {}", q.from.id);
    bot.answer_callback_query(q.id.clone()).text("❌ Not authorized.").await?;
    Ok(())
}

#[instrument(level = "info", skip(bot, dialogue, store))]
pub(crate) async fn receive_chat_id<S: TargetRegistry>(
    bot: Bot,
    msg: Message,
    dialogue: PanelDialogue,
    store: Arc<S>,
) -> HandlerResult {
    match msg.text().map(str::trim).map(str::parse::<i64>) {
        Some(Ok(chat_id)) => {
            let transport = TelegramTransport::new(bot.clone());
            let reply = register_target_by_id(&*store, &transport, chat_id).await;
            dialogue.update(PanelState::Idle).await?;
            deliver(&bot, msg.chat.id, "Registering chat", reply).await?;
        }
        _ => {
            bot.send_message(
                msg.chat.id,
                "Invalid chat id. Send a number like -1001234567890, or /cancel.",
            )
            .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::sync::Mutex;

    use super::*;
    use crate::{
        database::{
            memory::MemoryStore,
            quiz::{Question, QuestionDraft},
        },
        drainer::DrainSummary,
        publisher::TransportError,
    };

    #[derive(Default)]
    struct RecordingTransport {
        notes: Mutex<Vec<String>>,
    }

    impl QuizTransport for RecordingTransport {
        async fn publish_quiz(
            &self,
            chat_id: i64,
            question: &Question,
            _anonymous: bool,
        ) -> Result<String, TransportError> {
            Ok(format!("poll-{}-{}", chat_id, question.id()))
        }

        async fn notify(&self, _chat_id: i64, text: &str) -> Result<(), TransportError> {
            self.notes.lock().await.push(text.to_owned());
            Ok(())
        }

        async fn chat_title(&self, _chat_id: i64) -> Result<Option<String>, TransportError> {
            Ok(None)
        }
    }

    fn quick_config() -> Config {
        Config::from_lookup(|key| match key {
            "BOT_TOKEN" => Some("token".to_owned()),
            "ADMIN_ID" => Some("1".to_owned()),
            "SEND_DELAY_SECS" | "LONG_PAUSE_SECS" => Some("0".to_owned()),
            _ => None,
        })
        .unwrap()
    }

    async fn store_with_questions(count: usize) -> MemoryStore {
        let store = MemoryStore::new();
        let draft = QuestionDraft::new("q".into(), vec!["a".into(), "b".into()], 0, None);
        store.enqueue_questions(vec![draft; count]).await.unwrap();
        store
    }

    struct KnownChats;

    impl QuizTransport for KnownChats {
        async fn publish_quiz(
            &self,
            _chat_id: i64,
            _question: &Question,
            _anonymous: bool,
        ) -> Result<String, TransportError> {
            Err("not used".into())
        }

        async fn notify(&self, _chat_id: i64, _text: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn chat_title(&self, chat_id: i64) -> Result<Option<String>, TransportError> {
            match chat_id {
                -1 => Ok(Some("Quiz channel".to_owned())),
                _ => Err("chat not found".into()),
            }
        }
    }

    #[test]
    fn outcome_text_mentions_kept_questions() {
        let text = describe_outcome(&DrainOutcome::Completed(DrainSummary {
            attempted: 3,
            drained: 2,
            failed_deliveries: 4,
            remaining: 1,
        }));

        assert!(text.starts_with("✅ Sent 2 of 3 questions."));
        assert!(text.contains("4 deliveries failed"));
        assert!(text.contains("1 questions reached no chat"));
        assert!(text.ends_with("Remaining in queue: 1"));
    }

    #[test]
    fn no_op_outcomes_give_a_reason() {
        assert!(describe_outcome(&DrainOutcome::EmptyQueue).contains("queue is empty"));
        assert!(describe_outcome(&DrainOutcome::NoTargets).contains("no target chats"));
    }

    #[tokio::test]
    async fn registration_by_id_uses_the_looked_up_title() {
        let store = MemoryStore::new();

        let reply = register_target_by_id(&store, &KnownChats, -1).await.unwrap();
        assert_eq!(reply.text, "✅ Quiz channel (-1) will receive quizzes.");

        let reply = register_target_by_id(&store, &KnownChats, -2).await.unwrap();
        assert_eq!(reply.text, "✅ -2 will receive quizzes.");

        let reply = register_target_by_id(&store, &KnownChats, -1).await.unwrap();
        assert!(reply.text.contains("already a target"));
        assert_eq!(store.count_targets().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn target_listing_and_removal() {
        let store = MemoryStore::new();
        assert!(list_targets(&store).await.unwrap().markup.is_none());

        store.add_target(TargetChat::new(-5, Some("Group".into()))).await.unwrap();
        let reply = list_targets(&store).await.unwrap();
        assert!(reply.text.contains("• Group (-5)"));
        assert!(reply.markup.is_some());

        assert!(remove_target(&store, -5).await.unwrap().text.starts_with("✅"));
        assert!(remove_target(&store, -5).await.unwrap().text.starts_with("❌"));
    }

    #[tokio::test]
    async fn send_all_without_targets_announces_nothing() {
        let store = store_with_questions(2).await;
        let transport = RecordingTransport::default();

        let reply = send_all(&store, &transport, &quick_config(), ChatId(1))
            .await
            .unwrap();

        assert!(reply.text.contains("no target chats"));
        assert!(transport.notes.lock().await.is_empty());
        assert_eq!(store.count_questions().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn send_all_announces_the_planned_run() {
        let store = store_with_questions(2).await;
        store.add_target(TargetChat::new(-1, None)).await.unwrap();
        let transport = RecordingTransport::default();

        let reply = send_all(&store, &transport, &quick_config(), ChatId(1))
            .await
            .unwrap();

        assert_eq!(transport.notes.lock().await[0], "📢 Sending 2 questions…");
        assert!(reply.text.starts_with("✅ Sent 2 of 2 questions."));
    }

    #[test]
    fn failed_refresh_falls_back_to_a_new_message() {
        assert!(edited_in_place::<(), &str>(Ok(())));
        assert!(!edited_in_place::<(), &str>(Err("message is not modified")));
    }

    #[tokio::test]
    async fn clearing_reports_the_count() {
        let store = store_with_questions(2).await;

        assert_eq!(clear(&store).await.unwrap().text, "🗑️ Deleted 2 queued questions.");
        assert_eq!(peek(&store).await.unwrap().text, "📭 The queue is empty.");
    }
}
