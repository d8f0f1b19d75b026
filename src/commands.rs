use std::sync::Arc;

use teloxide::{
    prelude::Requester,
    types::{Chat, Message, Update},
    utils::command::BotCommands,
    Bot,
};
use tracing::instrument;

use crate::{
    config::Config,
    database::{
        connection::{PollLedger, QuestionQueue, Scoreboard, TargetRegistry},
        quiz::TargetChat,
    },
    panel::{self, deliver},
    publisher::TelegramTransport,
    scoring,
    state::PanelState,
    HandlerResult, PanelDialogue,
};

#[derive(Debug, Clone, BotCommands)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "open the admin panel.")]
    Start,
    #[command(description = "display help.")]
    Help,
    #[command(description = "register this chat as a quiz target.")]
    AddChat,
    #[command(description = "register a chat by id, e.g. /addchatid -1001234567890.")]
    AddChatId(i64),
    #[command(description = "list target chats.")]
    Chats,
    #[command(description = "stop sending to a chat, e.g. /removechat -1001234567890.")]
    RemoveChat(i64),
    #[command(description = "show queue and target counts.")]
    Stats,
    #[command(description = "show the next queued question.")]
    Peek,
    #[command(description = "send the next question to every target.")]
    SendOne,
    #[command(description = "send every queued question.")]
    SendAll,
    #[command(description = "delete all queued questions.")]
    Clear,
    #[command(description = "show your quiz score.")]
    MyScore,
    #[command(description = "cancel the current input.")]
    Cancel,
}

/// Label stored with a chat registered from inside it.
fn chat_title(chat: &Chat) -> Option<String> {
    chat.title()
        .or_else(|| chat.username())
        .or_else(|| chat.first_name())
        .map(str::to_owned)
}

pub(crate) async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        format!(
            "{}\n\nUpload a .txt file with blocks like:\nQ: What is 2+2?\nA) 3\nB) 4\nAns: 2\nExp: Basic arithmetic.\n---",
            Command::descriptions()
        ),
    )
    .await?;
    Ok(())
}

#[instrument(level = "info", skip(bot, dialogue, store))]
pub(crate) async fn start<S: QuestionQueue + TargetRegistry>(
    bot: Bot,
    msg: Message,
    dialogue: PanelDialogue,
    store: Arc<S>,
) -> HandlerResult {
    dialogue.update(PanelState::Idle).await?;
    deliver(&bot, msg.chat.id, "Opening the panel", panel::panel(&*store).await).await
}

#[instrument(level = "info", skip(bot))]
pub(crate) async fn refuse(bot: Bot, msg: Message) -> HandlerResult {
    log::info!("Refusing /start from non-admin in chat {}", msg.chat.id);
    bot.send_message(msg.chat.id, "❌ This bot is for administrators only.")
        .await?;
    Ok(())
}

pub(crate) async fn cancel(bot: Bot, msg: Message, dialogue: PanelDialogue) -> HandlerResult {
    dialogue.update(PanelState::Idle).await?;
    bot.send_message(msg.chat.id, "Cancelled.").await?;
    Ok(())
}

#[instrument(level = "info", skip(bot, store))]
pub(crate) async fn add_chat<S: TargetRegistry>(
    bot: Bot,
    msg: Message,
    store: Arc<S>,
) -> HandlerResult {
    let target = TargetChat::new(msg.chat.id.0, chat_title(&msg.chat));
    let reply = panel::register_target(&*store, target).await;
    deliver(&bot, msg.chat.id, "Registering chat", reply).await
}

#[instrument(level = "info", skip(bot, store))]
pub(crate) async fn add_chat_id<S: TargetRegistry>(
    bot: Bot,
    msg: Message,
    store: Arc<S>,
    chat_id: i64,
) -> HandlerResult {
    let transport = TelegramTransport::new(bot.clone());
    let reply = panel::register_target_by_id(&*store, &transport, chat_id).await;
    deliver(&bot, msg.chat.id, "Registering chat", reply).await
}

pub(crate) async fn chats<S: TargetRegistry>(bot: Bot, msg: Message, store: Arc<S>) -> HandlerResult {
    deliver(&bot, msg.chat.id, "Listing targets", panel::list_targets(&*store).await).await
}

#[instrument(level = "info", skip(bot, store))]
pub(crate) async fn remove_chat<S: TargetRegistry>(
    bot: Bot,
    msg: Message,
    store: Arc<S>,
    chat_id: i64,
) -> HandlerResult {
    let reply = panel::remove_target(&*store, chat_id).await;
    deliver(&bot, msg.chat.id, "Removing target", reply).await
}

pub(crate) async fn stats<S: QuestionQueue + TargetRegistry>(
    bot: Bot,
    msg: Message,
    store: Arc<S>,
) -> HandlerResult {
    deliver(&bot, msg.chat.id, "Counting", panel::stats(&*store).await).await
}

pub(crate) async fn peek<S: QuestionQueue>(bot: Bot, msg: Message, store: Arc<S>) -> HandlerResult {
    deliver(&bot, msg.chat.id, "Peeking", panel::peek(&*store).await).await
}

#[instrument(level = "info", skip(bot, store, config))]
pub(crate) async fn send_one<S: QuestionQueue + TargetRegistry + PollLedger>(
    bot: Bot,
    msg: Message,
    store: Arc<S>,
    config: Arc<Config>,
) -> HandlerResult {
    let transport = TelegramTransport::new(bot.clone());
    let reply = panel::send_one(&*store, &transport, &config, msg.chat.id).await;
    deliver(&bot, msg.chat.id, "Sending", reply).await
}

#[instrument(level = "info", skip(bot, store, config))]
pub(crate) async fn send_all<S: QuestionQueue + TargetRegistry + PollLedger>(
    bot: Bot,
    msg: Message,
    store: Arc<S>,
    config: Arc<Config>,
) -> HandlerResult {
    let transport = TelegramTransport::new(bot.clone());
    let reply = panel::send_all(&*store, &transport, &config, msg.chat.id).await;
    deliver(&bot, msg.chat.id, "Sending", reply).await
}

pub(crate) async fn clear(bot: Bot, msg: Message) -> HandlerResult {
    deliver(&bot, msg.chat.id, "Clearing", Ok(panel::confirm_clear())).await
}

#[instrument(level = "info", skip(bot, update, store, config))]
pub(crate) async fn my_score<S: Scoreboard>(
    bot: Bot,
    msg: Message,
    update: Update,
    store: Arc<S>,
    config: Arc<Config>,
) -> HandlerResult {
    let Some(user) = update.from() else {
        return Ok(());
    };

    let text = scoring::score_reply(&*store, user.id.0, config.drain.anonymous).await;
    bot.send_message(msg.chat.id, text).await?;

    Ok(())
}

#[instrument(level = "info", skip(bot))]
pub(crate) async fn invalid_input(bot: Bot, msg: Message) -> HandlerResult {
    log::info!("Unhandled admin input {:?} in chat {}", msg.text(), msg.chat.id);
    bot.send_message(
        msg.chat.id,
        "Unable to handle the message. Send a .txt file of questions or enter /help to see usages.",
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_with_arguments() {
        assert!(matches!(
            Command::parse("/addchatid -1001234567890", "quizbot"),
            Ok(Command::AddChatId(-1001234567890))
        ));
        assert!(matches!(
            Command::parse("/removechat 42", "quizbot"),
            Ok(Command::RemoveChat(42))
        ));
        assert!(matches!(Command::parse("/sendall", "quizbot"), Ok(Command::SendAll)));
        assert!(Command::parse("/addchatid channel", "quizbot").is_err());
    }
}
