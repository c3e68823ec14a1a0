use crate::access::{AccessPolicy, Bootstrap};
use crate::action::Action;
use crate::config::Config;
use crate::error::{HandlerError, HandlerResult};
use crate::flow::{Prompt, Reply, Registrar};
use crate::model::CatalogEntry;
use crate::registration::{Input, Media, PhotoVariant, Rejection, Signal, Step};
use crate::search::{self, Delivery, Lookup, Preview, ResultCard};
use crate::storage::Catalog;
use moka::future::Cache;
use std::{sync::Arc, time::Duration};
use teloxide::{
    dispatching::{DefaultKey, UpdateFilterExt, UpdateHandler},
    prelude::*,
    types::{
        CallbackQuery, ChatId, FileId, InlineKeyboardButton, InlineKeyboardMarkup, InlineQuery,
        InlineQueryResult, InlineQueryResultArticle, InlineQueryResultCachedPhoto, InputFile,
        InputMessageContent, InputMessageContentText, MessageId, ParseMode,
    },
    utils::command::BotCommands,
};
use url::Url;

/// Сколько записей показывать в /list и в поиске текстом.
const LIST_LIMIT: usize = 20;

/* ====== Состояние бота ====== */
pub struct App {
    pub registrar: Registrar,
    pub catalog: Arc<dyn Catalog>,
    pub policy: Arc<AccessPolicy>,
    pub settings: Settings,
    pub controls: Controls,
}

/// Последнее сообщение анкеты с живыми кнопками, по чатам.
/// Новый ответ анкеты снимает кнопки со старого, как бы ни пришёл ввод: текстом, кнопкой или /cancel.
#[derive(Clone)]
pub struct Controls {
    last: Cache<i64, MessageId>,
}

impl Controls {
    pub fn new(idle: Duration) -> Self {
        Self { last: Cache::builder().time_to_idle(idle).build() }
    }

    async fn remember(&self, chat: ChatId, message: MessageId) {
        self.last.insert(chat.0, message).await;
    }

    async fn take(&self, chat: ChatId) -> Option<MessageId> {
        self.last.remove(&chat.0).await
    }

    async fn is_tracked(&self, chat: ChatId, message: MessageId) -> bool {
        self.last.get(&chat.0).await == Some(message)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub inline_limit: usize,
    pub inline_cache_secs: u32,
    pub protect_content: bool,
    /// База для ссылок /thumb; только в webhook-режиме, когда сервер виден снаружи.
    pub thumb_base: Option<Url>,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            inline_limit: config.inline_limit,
            inline_cache_secs: config.inline_cache_secs,
            protect_content: config.protect_content,
            thumb_base: config.public_url.clone(),
        }
    }
}

/* ====== Команды ====== */
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Команды:")]
enum Command {
    #[command(description = "начать")]
    Start(String),
    #[command(description = "добавить аниме (админ)")]
    Add,
    #[command(description = "последние добавленные (админ)")]
    List,
    #[command(description = "отменить добавление")]
    Cancel,
    #[command(description = "стать первым админом")]
    Admin,
    #[command(description = "помощь")]
    Help,
}

pub fn schema() -> UpdateHandler<HandlerError> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .branch(dptree::entry().filter_command::<Command>().endpoint(on_command))
                .branch(dptree::endpoint(on_message)),
        )
        .branch(Update::filter_callback_query().endpoint(on_callback))
        .branch(Update::filter_inline_query().endpoint(on_inline_query))
}

pub fn dispatcher(bot: Bot, app: Arc<App>) -> Dispatcher<Bot, HandlerError, DefaultKey> {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![app])
        .default_handler(|upd| async move {
            tracing::trace!(update = ?upd.id, "unhandled update");
        })
        .error_handler(LoggingErrorHandler::with_custom_text("Error in update handler"))
        .enable_ctrlc_handler()
        .build()
}

/* ====== Команды ====== */
async fn on_command(bot: Bot, msg: Message, cmd: Command, app: Arc<App>) -> HandlerResult {
    let chat = msg.chat.id;
    let Some(user) = msg.from.as_ref().map(|u| u.id.0) else { return Ok(()); };
    let is_admin = app.policy.is_authorized(user).await;

    match cmd {
        Command::Help => {
            bot.send_message(chat, Command::descriptions().to_string()).await?;
        }
        Command::Start(payload) => match search::parse_deep_link(&payload) {
            Some(id) => match search::lookup(app.catalog.as_ref(), id).await {
                Lookup::Found(entry) => deliver(&bot, chat, &entry, app.settings.protect_content).await?,
                Lookup::NotFound => {
                    bot.send_message(chat, "❌ Аниме не найдено.").await?;
                }
                Lookup::Unavailable => {
                    bot.send_message(chat, "⚠️ Каталог временно недоступен, попробуйте позже.").await?;
                }
            },
            None if is_admin => {
                bot.send_message(chat, "👋 Привет, админ! Выберите действие:")
                    .reply_markup(keyboard_admin_menu())
                    .await?;
            }
            None => {
                bot.send_message(chat, "👋 Привет! Ищите аниме через кнопку ниже или в любом чате через @бота.")
                    .reply_markup(keyboard_search())
                    .await?;
            }
        },
        Command::Add => {
            let reply = app.registrar.start(chat.0, user).await;
            send_reply(&bot, &app, chat, reply).await?;
        }
        Command::Cancel => match app.registrar.cancel(chat.0, user).await {
            Reply::NoSession => {
                bot.send_message(chat, "Нечего отменять.").await?;
            }
            reply => send_reply(&bot, &app, chat, reply).await?,
        },
        Command::List => {
            if !is_admin {
                send_reply(&bot, &app, chat, Reply::Unauthorized).await?;
                return Ok(());
            }
            let list = app.catalog.list_recent(LIST_LIMIT).await?;
            send_list_view(&bot, chat, &list, "<b>Последние добавленные:</b>").await?;
        }
        Command::Admin => {
            let text = match app.policy.bootstrap(user).await {
                Ok(Bootstrap::Granted) => "✅ Теперь вы админ.",
                Ok(Bootstrap::AlreadyAdmin) => "Вы уже админ.",
                Ok(Bootstrap::Closed) => "😿 Админ уже назначен.",
                Err(e) => {
                    tracing::error!(error = %e, user, "admin bootstrap failed");
                    "⚠️ Не удалось сохранить, попробуйте позже."
                }
            };
            bot.send_message(chat, text).await?;
        }
    }
    Ok(())
}

/* ====== Сообщения: шаги анкеты или поиск текстом ====== */
async fn on_message(bot: Bot, msg: Message, app: Arc<App>) -> HandlerResult {
    let Some(user) = msg.from.as_ref().map(|u| u.id.0) else { return Ok(()); };
    let input = message_input(&msg);

    match app.registrar.handle(msg.chat.id.0, user, input).await {
        Reply::NoSession => {
            // вне анкеты текст в личке = поиск
            if let (true, Some(query)) = (msg.chat.is_private(), msg.text()) {
                let found = search::search(app.catalog.as_ref(), query, LIST_LIMIT).await;
                if found.is_empty() {
                    bot.send_message(msg.chat.id, "Ничего не нашёл 😕").await?;
                } else {
                    send_list_view(&bot, msg.chat.id, &found, "<b>Нашлось:</b>").await?;
                }
            }
        }
        // в группе остальные участники пишут не боту
        Reply::Unauthorized if !msg.chat.is_private() => {}
        reply => send_reply(&bot, &app, msg.chat.id, reply).await?,
    }
    Ok(())
}

/// Стикеры, голосовые, гео и прочее идут в анкету как `Unsupported`: шаг отвечает подсказкой.
fn message_input(msg: &Message) -> Input {
    if let Some(video) = msg.video() {
        return Input::Media(Media::Video { file_id: video.file.id.to_string() });
    }
    if let Some(doc) = msg.document() {
        return Input::Media(Media::Document {
            file_id: doc.file.id.to_string(),
            mime_type: doc.mime_type.as_ref().map(ToString::to_string),
        });
    }
    if let Some(sizes) = msg.photo() {
        let variants = sizes
            .iter()
            .map(|p| PhotoVariant { file_id: p.file.id.to_string(), width: p.width, height: p.height })
            .collect();
        return Input::Media(Media::Photo(variants));
    }
    match msg.text() {
        Some(t) => Input::Text(t.to_string()),
        None => Input::Unsupported,
    }
}

/* ====== Callback-кнопки ====== */
async fn on_callback(bot: Bot, q: CallbackQuery, app: Arc<App>) -> HandlerResult {
    let Some(action) = q.data.as_deref().and_then(Action::decode) else {
        answer_cb(&bot, &q, "Неизвестное действие").await?;
        return Ok(());
    };
    let user = q.from.id.0;
    let origin = q.message.as_ref().map(|m| (m.chat().id, m.id()));

    match action {
        Action::Watch(id) => {
            // из инлайн-сообщения чата нет: шлём в личку нажавшему
            let chat = origin.map(|(chat, _)| chat).unwrap_or(ChatId(user as i64));
            match search::lookup(app.catalog.as_ref(), id).await {
                Lookup::Found(entry) => {
                    if let Err(e) = deliver(&bot, chat, &entry, app.settings.protect_content).await {
                        tracing::warn!(error = %e, user, %id, "delivery failed");
                        answer_cb(&bot, &q, "Не получилось отправить. Откройте бота и нажмите /start").await?;
                        return Ok(());
                    }
                    answer_cb(&bot, &q, "Отправил").await?;
                }
                Lookup::NotFound => answer_cb(&bot, &q, "❌ Аниме не найдено").await?,
                Lookup::Unavailable => answer_cb(&bot, &q, "⚠️ Каталог временно недоступен").await?,
            }
        }
        Action::StartRegistration => {
            let Some((chat, _)) = origin else {
                answer_cb(&bot, &q, "Откройте бота, чтобы добавить аниме").await?;
                return Ok(());
            };
            answer_cb(&bot, &q, "").await?;
            let reply = app.registrar.start(chat.0, user).await;
            send_reply(&bot, &app, chat, reply).await?;
        }
        Action::Flow(signal) => {
            let Some((chat, message_id)) = origin else {
                answer_cb(&bot, &q, "Анкета не найдена").await?;
                return Ok(());
            };
            let reply = app.registrar.handle(chat.0, user, Input::Signal(signal)).await;
            match &reply {
                Reply::NoSession => {
                    answer_cb(&bot, &q, "Анкета не найдена или устарела").await?;
                    return Ok(());
                }
                Reply::Unauthorized => {
                    answer_cb(&bot, &q, "😿 Только для админов").await?;
                    return Ok(());
                }
                Reply::Prompt(Prompt { rejection: Some(Rejection::NotOwner), .. }) => {
                    answer_cb(&bot, &q, rejection_text(Rejection::NotOwner)).await?;
                    return Ok(());
                }
                Reply::Prompt(Prompt { rejection: Some(reason), .. }) => {
                    answer_cb(&bot, &q, rejection_text(*reason)).await?;
                }
                _ => {
                    answer_cb(&bot, &q, "").await?;
                    // нажатое сообщение не последнее: send_reply его не увидит
                    if !app.controls.is_tracked(chat, message_id).await {
                        clear_buttons(&bot, chat, message_id).await;
                    }
                }
            }
            send_reply(&bot, &app, chat, reply).await?;
        }
    }
    Ok(())
}

/* ====== Инлайн-поиск ====== */
async fn on_inline_query(bot: Bot, q: InlineQuery, app: Arc<App>) -> HandlerResult {
    let found = search::search(app.catalog.as_ref(), &q.query, app.settings.inline_limit).await;
    let results: Vec<InlineQueryResult> = found
        .iter()
        .map(|e| inline_result(search::render_card(e, app.settings.thumb_base.as_ref())))
        .collect();
    tracing::debug!(query = %q.query, results = results.len(), "inline query");
    bot.answer_inline_query(q.id, results)
        .cache_time(app.settings.inline_cache_secs)
        .await?;
    Ok(())
}

fn inline_result(card: ResultCard) -> InlineQueryResult {
    let kb = keyboard_watch(card.action);
    match card.preview {
        Preview::CachedPhoto(file_id) => InlineQueryResult::CachedPhoto(
            InlineQueryResultCachedPhoto::new(card.id, FileId(file_id))
                .title(card.title)
                .description(card.description)
                .caption(card.caption_html)
                .parse_mode(ParseMode::Html)
                .reply_markup(kb),
        ),
        preview => {
            let content = InputMessageContent::Text(
                InputMessageContentText::new(card.caption_html).parse_mode(ParseMode::Html),
            );
            let mut article = InlineQueryResultArticle::new(card.id, card.title, content)
                .description(card.description)
                .reply_markup(kb);
            if let Preview::Thumbnail(url) = preview {
                article = article.thumbnail_url(url);
            }
            InlineQueryResult::Article(article)
        }
    }
}

/* ====== Ответы анкеты ====== */
async fn send_reply(bot: &Bot, app: &App, chat: ChatId, reply: Reply) -> HandlerResult {
    if retires_controls(&reply) {
        if let Some(stale) = app.controls.take(chat).await {
            clear_buttons(bot, chat, stale).await;
        }
    }
    match reply {
        Reply::Prompt(Prompt { rejection: Some(Rejection::NotOwner), .. }) => {
            bot.send_message(chat, rejection_text(Rejection::NotOwner)).await?;
        }
        Reply::Prompt(prompt) => {
            let sent = bot
                .send_message(chat, prompt_text(&prompt))
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard_prompt(&prompt))
                .await?;
            app.controls.remember(chat, sent.id).await;
        }
        Reply::Saved(entry) => {
            let text = format!(
                "✅ Аниме сохранено: <b>{}</b>\nID: {} (ссылка: /start {})",
                search::html_escape(&entry.name),
                entry.id,
                search::deep_link_payload(entry.id),
            );
            bot.send_message(chat, text).parse_mode(ParseMode::Html).await?;
        }
        Reply::Cancelled => {
            bot.send_message(chat, "❌ Добавление отменено.").await?;
        }
        Reply::Unauthorized => {
            bot.send_message(chat, "😿 Извините, это только для админов.").await?;
        }
        Reply::Conflict => {
            bot.send_message(chat, "Анкета изменилась, повторите последний шаг.").await?;
        }
        Reply::Failed => {
            bot.send_message(chat, "⚠️ Не удалось сохранить аниме, добавление прервано. Попробуйте /add ещё раз.")
                .await?;
        }
        Reply::NoSession => {}
    }
    Ok(())
}

/// Ответы, после которых прежние кнопки анкеты устарели.
/// Чужой ввод и конфликт их не трогают: анкета владельца продолжается.
fn retires_controls(reply: &Reply) -> bool {
    match reply {
        Reply::Prompt(p) => p.rejection != Some(Rejection::NotOwner),
        Reply::Saved(_) | Reply::Cancelled | Reply::Failed => true,
        Reply::Unauthorized | Reply::NoSession | Reply::Conflict => false,
    }
}

async fn clear_buttons(bot: &Bot, chat: ChatId, message: MessageId) {
    if let Err(e) = bot.edit_message_reply_markup(chat, message).await {
        tracing::debug!(error = %e, "failed to clear buttons");
    }
}

fn step_question(step: Step) -> &'static str {
    match step {
        Step::AwaitingVideo => "🎥 Пришлите видео аниме:",
        Step::AwaitingName => "📝 Введите название аниме:",
        Step::AwaitingEpisodeCount => "📺 Сколько серий? (0 — неизвестно)",
        Step::AwaitingPoster => "🖼️ Пришлите постер (картинку) или нажмите «Пропустить»:",
        Step::AwaitingSeason => "📆 Номер сезона, если есть (например: 2), или skip:",
        Step::Confirm => "Всё верно?",
    }
}

fn step_label(step: Step) -> &'static str {
    match step {
        Step::AwaitingVideo => "Видео",
        Step::AwaitingName => "Название",
        Step::AwaitingEpisodeCount => "Серии",
        Step::AwaitingPoster => "Постер",
        Step::AwaitingSeason => "Сезон",
        Step::Confirm => "Подтверждение",
    }
}

fn rejection_text(reason: Rejection) -> &'static str {
    match reason {
        Rejection::NotOwner => "⛔ Эту анкету заполняет другой админ.",
        Rejection::ExpectedVideo => "❌ Пожалуйста, пришлите видео.",
        Rejection::EmptyName => "❌ Название не может быть пустым.",
        Rejection::ExpectedNumber => "❌ Только число!",
        Rejection::ExpectedPhoto => "❌ Пришлите картинку или пропустите шаг.",
        Rejection::ExpectedSeason => "❌ Сезон — это число или skip.",
        Rejection::ExpectedConfirmation => "Подтвердите или отмените.",
        Rejection::CannotSkip => "Этот шаг нельзя пропустить.",
        Rejection::CannotGoBack => "Это первый шаг.",
        Rejection::EditDisabled => "Редактирование выключено.",
        Rejection::NotAvailable => "Эта кнопка сейчас не работает.",
        Rejection::MissingName => "❌ Не хватает названия.",
    }
}

fn prompt_text(prompt: &Prompt) -> String {
    let mut out = String::new();
    if let Some(reason) = prompt.rejection {
        out.push_str(rejection_text(reason));
        out.push_str("\n\n");
    }
    if prompt.step == Step::Confirm {
        let d = &prompt.draft;
        let mark = |present: bool| if present { "✅" } else { "—" };
        out.push_str(&format!(
            "📌 <b>Название:</b> {}\n📆 <b>Сезон:</b> {}\n🎞️ <b>Серий:</b> {}\n🎥 <b>Видео:</b> {}\n🖼️ <b>Постер:</b> {}\n\n",
            search::html_escape(d.name.as_deref().unwrap_or("")),
            d.season.map(|s| s.to_string()).unwrap_or_else(|| "нет".into()),
            d.episode_count.unwrap_or(0),
            mark(d.video.is_some()),
            mark(d.poster.is_some()),
        ));
    }
    out.push_str(step_question(prompt.step));
    out
}

/* ====== Кнопки ====== */

fn button(text: impl Into<String>, action: Action) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, action.encode())
}

fn keyboard_prompt(prompt: &Prompt) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if prompt.step == Step::Confirm {
        rows.push(vec![button("✅ Сохранить", Action::Flow(Signal::Confirm))]);
        if prompt.allow_edit {
            // по 3 в строке
            let edits: Vec<_> = prompt
                .order
                .steps()
                .iter()
                .map(|s| button(format!("✏️ {}", step_label(*s)), Action::Flow(Signal::Edit(*s))))
                .collect();
            rows.extend(edits.chunks(3).map(<[_]>::to_vec));
        }
    } else if prompt.step.is_skippable() {
        rows.push(vec![button("⏭ Пропустить", Action::Flow(Signal::Skip))]);
    }
    let mut last = Vec::new();
    if prompt.can_go_back {
        last.push(button("⬅️ Назад", Action::Flow(Signal::Back)));
    }
    last.push(button("❌ Отмена", Action::Flow(Signal::Cancel)));
    rows.push(last);
    InlineKeyboardMarkup::new(rows)
}

fn keyboard_admin_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button("➕ Новое аниме", Action::StartRegistration)],
        vec![InlineKeyboardButton::switch_inline_query_current_chat("🔍 Поиск аниме", "")],
    ])
}

fn keyboard_search() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::switch_inline_query_current_chat(
        "🔍 Поиск аниме",
        "",
    )]])
}

fn keyboard_watch(action: Action) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("🎥 Смотреть", action)]])
}

/* ====== Вспомогательные ====== */

async fn send_list_view(bot: &Bot, chat: ChatId, list: &[CatalogEntry], title: &str) -> Result<(), teloxide::RequestError> {
    if list.is_empty() {
        bot.send_message(chat, "Каталог пока пуст.").await?;
        return Ok(());
    }
    let lines: Vec<String> = list.iter().map(|e| search::html_escape(&search::summary_line(e))).collect();
    let txt = format!("{}\n{}", title, lines.join("\n"));
    let rows: Vec<_> = list
        .iter()
        .map(|e| vec![button(format!("🎬 {}", search::clip(&e.name, 40)), Action::Watch(e.id))])
        .collect();
    bot.send_message(chat, txt)
        .parse_mode(ParseMode::Html)
        .reply_markup(InlineKeyboardMarkup::new(rows))
        .await?;
    Ok(())
}

async fn deliver(bot: &Bot, chat: ChatId, entry: &CatalogEntry, protect: bool) -> Result<(), teloxide::RequestError> {
    for part in search::delivery(entry) {
        match part {
            Delivery::Photo { file_id, caption_html } => {
                bot.send_photo(chat, InputFile::file_id(FileId(file_id)))
                    .caption(caption_html)
                    .parse_mode(ParseMode::Html)
                    .protect_content(protect)
                    .await?;
            }
            Delivery::Caption(caption_html) => {
                bot.send_message(chat, caption_html)
                    .parse_mode(ParseMode::Html)
                    .protect_content(protect)
                    .await?;
            }
            Delivery::Video(file_id) => {
                bot.send_video(chat, InputFile::file_id(FileId(file_id)))
                    .protect_content(protect)
                    .await?;
            }
            Delivery::VideoUnavailable => {
                bot.send_message(chat, "🎥 Видео пока недоступно.").await?;
            }
        }
    }
    Ok(())
}

async fn answer_cb(bot: &Bot, q: &CallbackQuery, text: &str) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone())
        .text(text)
        .show_alert(false)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::{Draft, StepOrder};
    use teloxide::types::InlineKeyboardButtonKind;

    fn prompt(step: Step, can_go_back: bool, allow_edit: bool) -> Prompt {
        Prompt {
            step,
            draft: Draft::default(),
            rejection: None,
            can_go_back,
            allow_edit,
            order: StepOrder::VideoFirst,
        }
    }

    fn callbacks(kb: &InlineKeyboardMarkup) -> Vec<String> {
        kb.inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn first_step_has_only_cancel() {
        assert_eq!(callbacks(&keyboard_prompt(&prompt(Step::AwaitingVideo, false, true))), ["cancel"]);
    }

    #[test]
    fn skippable_steps_offer_skip_and_back() {
        assert_eq!(
            callbacks(&keyboard_prompt(&prompt(Step::AwaitingPoster, true, true))),
            ["skip", "back", "cancel"]
        );
    }

    #[test]
    fn confirm_offers_edit_only_when_enabled() {
        let with_edit = callbacks(&keyboard_prompt(&prompt(Step::Confirm, true, true)));
        assert_eq!(with_edit.first().map(String::as_str), Some("confirm"));
        assert!(with_edit.contains(&"edit:episodes".to_string()));
        assert_eq!(with_edit.len(), 1 + 5 + 2);

        let without = callbacks(&keyboard_prompt(&prompt(Step::Confirm, true, false)));
        assert_eq!(without, ["confirm", "back", "cancel"]);
    }

    #[test]
    fn confirm_text_shows_draft() {
        let mut p = prompt(Step::Confirm, true, true);
        p.draft = Draft {
            name: Some("<Naruto>".into()),
            season: None,
            episode_count: Some(220),
            poster: None,
            video: Some("v".into()),
        };
        p.rejection = Some(Rejection::ExpectedConfirmation);
        let text = prompt_text(&p);
        assert!(text.starts_with("Подтвердите или отмените."));
        assert!(text.contains("&lt;Naruto&gt;"));
        assert!(text.contains("<b>Сезон:</b> нет"));
        assert!(text.contains("<b>Серий:</b> 220"));
    }

    #[test]
    fn inline_result_kind_follows_preview() {
        let card = |preview| ResultCard {
            id: "1".into(),
            title: "Naruto".into(),
            description: "Сезон: — | Серий: 12".into(),
            caption_html: "<b>Naruto</b>".into(),
            preview,
            action: Action::Watch(crate::model::EntryId(1)),
        };
        assert!(matches!(inline_result(card(Preview::None)), InlineQueryResult::Article(_)));
        assert!(matches!(
            inline_result(card(Preview::CachedPhoto("AgAC".into()))),
            InlineQueryResult::CachedPhoto(_)
        ));
        let thumb = Url::parse("https://bot.example.com/thumb?file_id=AgAC").unwrap();
        match inline_result(card(Preview::Thumbnail(thumb.clone()))) {
            InlineQueryResult::Article(a) => assert_eq!(a.thumbnail_url, Some(thumb)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn commands_parse_deep_link_payload() {
        let cmd = Command::parse("/start anime_5", "bot").unwrap();
        assert!(matches!(cmd, Command::Start(p) if p == "anime_5"));
    }

    #[test]
    fn finished_or_advanced_form_retires_old_buttons() {
        let mut p = prompt(Step::AwaitingName, true, true);
        assert!(retires_controls(&Reply::Prompt(p.clone())));
        assert!(retires_controls(&Reply::Cancelled));
        assert!(retires_controls(&Reply::Failed));

        // чужой ввод и гонка не трогают анкету владельца
        p.rejection = Some(Rejection::NotOwner);
        assert!(!retires_controls(&Reply::Prompt(p)));
        assert!(!retires_controls(&Reply::Unauthorized));
        assert!(!retires_controls(&Reply::Conflict));
    }

    #[tokio::test]
    async fn controls_track_last_prompt_per_chat() {
        let controls = Controls::new(Duration::from_secs(60));
        let (chat, other) = (ChatId(1), ChatId(2));
        controls.remember(chat, MessageId(10)).await;
        controls.remember(chat, MessageId(11)).await;
        controls.remember(other, MessageId(5)).await;

        assert!(controls.is_tracked(chat, MessageId(11)).await);
        assert!(!controls.is_tracked(chat, MessageId(10)).await);
        assert_eq!(controls.take(chat).await, Some(MessageId(11)));
        assert_eq!(controls.take(chat).await, None);
        assert_eq!(controls.take(other).await, Some(MessageId(5)));
    }
}
