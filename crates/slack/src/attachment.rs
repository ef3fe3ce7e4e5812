use serde::{Deserialize, Serialize};

/// One answered form element.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackField {
    pub identifier: Option<String>,
    pub title: Option<String>,
    pub value: String,
}

impl FeedbackField {
    pub fn new(
        identifier: impl Into<String>,
        title: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self { identifier: Some(identifier.into()), title: Some(title.into()), value: value.into() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPlacement {
    #[default]
    Top,
    Bottom,
}

/// Host-supplied diagnostics (app version, device model, ...) shown around the form fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemField {
    pub identifier: String,
    pub title: String,
    pub value: String,
    pub placement: FieldPlacement,
}

impl SystemField {
    pub fn top(identifier: impl Into<String>, value: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            title: identifier.clone(),
            identifier,
            value: value.into(),
            placement: FieldPlacement::Top,
        }
    }

    pub fn bottom(identifier: impl Into<String>, value: impl Into<String>) -> Self {
        Self { placement: FieldPlacement::Bottom, ..Self::top(identifier, value) }
    }

    fn as_field(&self) -> FeedbackField {
        FeedbackField {
            identifier: Some(self.identifier.clone()),
            title: Some(self.title.clone()),
            value: self.value.clone(),
        }
    }
}

/// Which labels make up a rendered field title.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLabels {
    pub display_id: bool,
    pub display_title: bool,
}

impl Default for FieldLabels {
    fn default() -> Self {
        Self { display_id: true, display_title: false }
    }
}

impl FieldLabels {
    fn render(&self, field: &FeedbackField) -> String {
        let id_text = if self.display_id { field.identifier.as_deref().unwrap_or("") } else { "" };
        let title_text = if self.display_title { field.title.as_deref().unwrap_or("") } else { "" };
        let separator = if self.display_id && self.display_title { ": " } else { "" };
        format!("{id_text}{separator}{title_text}")
    }
}

/// A completed feedback form, ready to be rendered for Slack.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedbackReport {
    pub pretext: String,
    /// Form title; used as the message text in authenticated mode.
    pub title: String,
    pub fields: Vec<FeedbackField>,
    pub system_fields: Vec<SystemField>,
    pub labels: FieldLabels,
}

impl FeedbackReport {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), ..Self::default() }
    }

    pub fn with_pretext(mut self, pretext: impl Into<String>) -> Self {
        self.pretext = pretext.into();
        self
    }

    pub fn with_field(mut self, field: FeedbackField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_system_field(mut self, field: SystemField) -> Self {
        self.system_fields.push(field);
        self
    }

    pub fn with_labels(mut self, labels: FieldLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Top system fields, then the form's own fields, then bottom system fields.
    pub fn ordered_fields(&self) -> Vec<FeedbackField> {
        let placed = |placement: FieldPlacement| {
            self.system_fields
                .iter()
                .filter(move |field| field.placement == placement)
                .map(SystemField::as_field)
        };

        placed(FieldPlacement::Top)
            .chain(self.fields.iter().cloned())
            .chain(placed(FieldPlacement::Bottom))
            .collect()
    }

    pub fn to_attachment(&self) -> SlackAttachment {
        let ordered = self.ordered_fields();
        let fields = ordered
            .iter()
            .map(|field| AttachmentField {
                title: self.labels.render(field),
                value: field.value.clone(),
            })
            .collect();

        let mut fallback = format!("{} \n", self.pretext);
        for field in &ordered {
            let label = field.title.as_deref().or(field.identifier.as_deref()).unwrap_or("No ID");
            fallback.push_str(&format!("{label}: {}\n", field.value));
        }

        SlackAttachment { pretext: self.pretext.clone(), fields, fallback }
    }
}

/// One entry of a Slack message's `attachments` array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackAttachment {
    pub pretext: String,
    pub fields: Vec<AttachmentField>,
    pub fallback: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
}
