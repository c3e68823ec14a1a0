//! Пошаговая анкета добавления аниме.
//!
//! Машина состояний чистая: [`Session::apply`] только меняет черновик и шаг
//! и возвращает [`Transition`]. Отправка сообщений и сохранение в каталог
//! делаются снаружи, в `flow`.

use crate::model::NewEntry;

/// Шаги анкеты. `Confirm` — предфинальный: дальше либо сохранение, либо отмена.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    AwaitingVideo,
    AwaitingName,
    AwaitingEpisodeCount,
    AwaitingPoster,
    AwaitingSeason,
    Confirm,
}

impl Step {
    /// Короткое имя для callback-данных (`edit:<name>`).
    pub fn as_str(self) -> &'static str {
        match self {
            Step::AwaitingVideo => "video",
            Step::AwaitingName => "name",
            Step::AwaitingEpisodeCount => "episodes",
            Step::AwaitingPoster => "poster",
            Step::AwaitingSeason => "season",
            Step::Confirm => "confirm",
        }
    }

    pub fn parse(s: &str) -> Option<Step> {
        Some(match s {
            "video" => Step::AwaitingVideo,
            "name" => Step::AwaitingName,
            "episodes" => Step::AwaitingEpisodeCount,
            "poster" => Step::AwaitingPoster,
            "season" => Step::AwaitingSeason,
            "confirm" => Step::Confirm,
            _ => return None,
        })
    }

    pub fn is_skippable(self) -> bool {
        matches!(self, Step::AwaitingPoster | Step::AwaitingSeason)
    }
}

/// Порядок полей. Конфигурируется, на инварианты не влияет.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepOrder {
    #[default]
    VideoFirst,
    PosterFirst,
}

impl StepOrder {
    pub fn steps(self) -> &'static [Step] {
        match self {
            StepOrder::VideoFirst => &[
                Step::AwaitingVideo,
                Step::AwaitingName,
                Step::AwaitingEpisodeCount,
                Step::AwaitingPoster,
                Step::AwaitingSeason,
            ],
            StepOrder::PosterFirst => &[
                Step::AwaitingVideo,
                Step::AwaitingName,
                Step::AwaitingPoster,
                Step::AwaitingEpisodeCount,
                Step::AwaitingSeason,
            ],
        }
    }

    pub fn first(self) -> Step {
        self.steps()[0]
    }

    fn position(self, step: Step) -> Option<usize> {
        self.steps().iter().position(|s| *s == step)
    }

    fn next(self, step: Step) -> Step {
        match self.position(step) {
            Some(i) => self.steps().get(i + 1).copied().unwrap_or(Step::Confirm),
            None => Step::Confirm,
        }
    }

    fn previous(self, step: Step) -> Option<Step> {
        match step {
            Step::Confirm => self.steps().last().copied(),
            _ => self.position(step).and_then(|i| i.checked_sub(1)).map(|i| self.steps()[i]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub name: Option<String>,
    pub season: Option<u32>,
    pub episode_count: Option<u32>,
    pub poster: Option<String>,
    pub video: Option<String>,
}

impl Draft {
    fn to_new_entry(&self) -> Option<NewEntry> {
        Some(NewEntry {
            name: self.name.clone()?,
            season: self.season,
            episode_count: self.episode_count.unwrap_or(0),
            poster: self.poster.clone(),
            video: self.video.clone(),
        })
    }
}

/// Один вариант размера фото.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoVariant {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Media {
    Video { file_id: String },
    Document { file_id: String, mime_type: Option<String> },
    Photo(Vec<PhotoVariant>),
}

impl Media {
    /// Видео — это явное видео или файл с mime `video/*`.
    fn video_file_id(&self) -> Option<&str> {
        match self {
            Media::Video { file_id } => Some(file_id),
            Media::Document { file_id, mime_type: Some(mime) } if mime.starts_with("video") => {
                Some(file_id)
            }
            _ => None,
        }
    }

    /// Самый крупный вариант фото.
    fn best_photo_file_id(&self) -> Option<&str> {
        match self {
            Media::Photo(variants) => variants
                .iter()
                .max_by_key(|v| u64::from(v.width) * u64::from(v.height))
                .map(|v| v.file_id.as_str()),
            _ => None,
        }
    }
}

/// Управляющие сигналы анкеты (кнопки).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Skip,
    Back,
    Cancel,
    Confirm,
    Edit(Step),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Text(String),
    Media(Media),
    Signal(Signal),
    /// Стикер, голосовое, гео и прочее, что анкета не разбирает.
    Unsupported,
}

/// Почему ввод не принят. Шаг и черновик при этом не меняются.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotOwner,
    ExpectedVideo,
    EmptyName,
    ExpectedNumber,
    ExpectedPhoto,
    ExpectedSeason,
    ExpectedConfirmation,
    CannotSkip,
    CannotGoBack,
    EditDisabled,
    /// Кнопка не относится к текущему шагу.
    NotAvailable,
    MissingName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Ввод принят, ждём следующий шаг.
    Moved(Step),
    Rejected(Rejection),
    Completed(NewEntry),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub owner: u64,
    pub step: Step,
    pub draft: Draft,
    /// Растёт на каждом принятом изменении; нужен для compare-and-swap в хранилище сессий.
    pub revision: u64,
    order: StepOrder,
    allow_edit: bool,
    // шаг открыт через Edit: после ввода возвращаемся сразу к Confirm
    editing: bool,
}

const CONFIRM_PHRASES: &[&str] = &["yes", "ok", "confirm", "да", "сохранить"];
const CANCEL_PHRASES: &[&str] = &["cancel", "no", "нет", "отмена"];

impl Session {
    pub fn new(owner: u64, order: StepOrder, allow_edit: bool) -> Self {
        Self {
            owner,
            step: order.first(),
            draft: Draft::default(),
            revision: 0,
            order,
            allow_edit,
            editing: false,
        }
    }

    pub fn order(&self) -> StepOrder {
        self.order
    }

    pub fn allow_edit(&self) -> bool {
        self.allow_edit
    }

    pub fn can_go_back(&self) -> bool {
        self.order.previous(self.step).is_some()
    }

    pub fn apply(&mut self, sender: u64, input: Input) -> Transition {
        if sender != self.owner {
            return Transition::Rejected(Rejection::NotOwner);
        }
        let result = match input {
            Input::Signal(Signal::Cancel) => return Transition::Cancelled,
            Input::Signal(Signal::Back) => self.back(),
            Input::Signal(signal) if self.step == Step::Confirm => self.on_confirm_signal(signal),
            Input::Text(text) if self.step == Step::Confirm => self.on_confirm_text(&text),
            input => self.fill(input),
        };
        if !matches!(result, Transition::Rejected(_)) {
            self.revision += 1;
        }
        result
    }

    fn back(&mut self) -> Transition {
        match self.order.previous(self.step) {
            Some(prev) => {
                self.step = prev;
                self.editing = false;
                Transition::Moved(prev)
            }
            None => Transition::Rejected(Rejection::CannotGoBack),
        }
    }

    fn on_confirm_signal(&mut self, signal: Signal) -> Transition {
        match signal {
            Signal::Confirm => self.complete(),
            Signal::Edit(_) if !self.allow_edit => Transition::Rejected(Rejection::EditDisabled),
            Signal::Edit(step) if self.order.position(step).is_some() => {
                self.step = step;
                self.editing = true;
                Transition::Moved(step)
            }
            Signal::Skip => Transition::Rejected(Rejection::CannotSkip),
            _ => Transition::Rejected(Rejection::ExpectedConfirmation),
        }
    }

    fn on_confirm_text(&mut self, text: &str) -> Transition {
        let phrase = text.trim().to_lowercase();
        if CONFIRM_PHRASES.contains(&phrase.as_str()) {
            self.complete()
        } else if CANCEL_PHRASES.contains(&phrase.as_str()) {
            Transition::Cancelled
        } else {
            Transition::Rejected(Rejection::ExpectedConfirmation)
        }
    }

    fn complete(&self) -> Transition {
        match self.draft.to_new_entry() {
            Some(entry) => Transition::Completed(entry),
            None => Transition::Rejected(Rejection::MissingName),
        }
    }

    fn fill(&mut self, input: Input) -> Transition {
        let skip = matches!(input, Input::Signal(Signal::Skip));
        if let Input::Signal(signal) = &input {
            if !(skip && self.step.is_skippable()) {
                return Transition::Rejected(match signal {
                    Signal::Skip => Rejection::CannotSkip,
                    _ => Rejection::NotAvailable,
                });
            }
        }

        match self.step {
            Step::AwaitingVideo => match &input {
                Input::Media(media) => match media.video_file_id() {
                    Some(id) => self.draft.video = Some(id.to_owned()),
                    None => return Transition::Rejected(Rejection::ExpectedVideo),
                },
                _ => return Transition::Rejected(Rejection::ExpectedVideo),
            },
            Step::AwaitingName => match &input {
                Input::Text(text) if !text.trim().is_empty() => {
                    self.draft.name = Some(text.trim().to_owned())
                }
                _ => return Transition::Rejected(Rejection::EmptyName),
            },
            Step::AwaitingEpisodeCount => match &input {
                Input::Text(text) => match text.trim().parse::<u32>() {
                    Ok(n) => self.draft.episode_count = Some(n),
                    Err(_) => return Transition::Rejected(Rejection::ExpectedNumber),
                },
                _ => return Transition::Rejected(Rejection::ExpectedNumber),
            },
            Step::AwaitingPoster => match &input {
                _ if skip => self.draft.poster = None,
                Input::Media(media) => match media.best_photo_file_id() {
                    Some(id) => self.draft.poster = Some(id.to_owned()),
                    None => return Transition::Rejected(Rejection::ExpectedPhoto),
                },
                _ => return Transition::Rejected(Rejection::ExpectedPhoto),
            },
            Step::AwaitingSeason => match &input {
                _ if skip => self.draft.season = None,
                Input::Text(text) if text.trim().eq_ignore_ascii_case("skip") => {
                    self.draft.season = None
                }
                Input::Text(text) => match text.trim().parse::<u32>() {
                    Ok(n) => self.draft.season = Some(n),
                    Err(_) => return Transition::Rejected(Rejection::ExpectedSeason),
                },
                _ => return Transition::Rejected(Rejection::ExpectedSeason),
            },
            Step::Confirm => return Transition::Rejected(Rejection::ExpectedConfirmation),
        }

        self.step = if self.editing { Step::Confirm } else { self.order.next(self.step) };
        self.editing = false;
        Transition::Moved(self.step)
    }
}
