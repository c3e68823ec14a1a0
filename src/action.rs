use crate::model::EntryId;
use crate::registration::{Signal, Step};

/* ====== Callback-кнопки ======
   add          — начать анкету
   skip | back | cancel | confirm
   edit:<шаг>   — вернуться к полю из подтверждения
   watch:<id>   — прислать аниме в личку
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StartRegistration,
    Flow(Signal),
    Watch(EntryId),
}

impl Action {
    pub fn encode(self) -> String {
        match self {
            Action::StartRegistration => "add".to_string(),
            Action::Flow(Signal::Skip) => "skip".to_string(),
            Action::Flow(Signal::Back) => "back".to_string(),
            Action::Flow(Signal::Cancel) => "cancel".to_string(),
            Action::Flow(Signal::Confirm) => "confirm".to_string(),
            Action::Flow(Signal::Edit(step)) => format!("edit:{}", step.as_str()),
            Action::Watch(id) => format!("watch:{}", id),
        }
    }

    pub fn decode(data: &str) -> Option<Action> {
        let (cmd, arg) = match data.split_once(':') {
            Some((cmd, arg)) => (cmd, Some(arg)),
            None => (data, None),
        };
        let action = match (cmd, arg) {
            ("add", None) => Action::StartRegistration,
            ("skip", None) => Action::Flow(Signal::Skip),
            ("back", None) => Action::Flow(Signal::Back),
            ("cancel", None) => Action::Flow(Signal::Cancel),
            ("confirm", None) => Action::Flow(Signal::Confirm),
            ("edit", Some(step)) => Action::Flow(Signal::Edit(Step::parse(step)?)),
            ("watch", Some(id)) => Action::Watch(EntryId(id.parse().ok()?)),
            _ => return None,
        };
        Some(action)
    }
}
