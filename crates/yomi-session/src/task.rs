use yomi_types::{Preset, UserId};

/// Who wrote the text a task speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speaker {
    pub id: UserId,
    pub name: String,
}

/// One unit of work for a session worker: ordered text segments spoken with
/// a preset snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechTask {
    segments: Vec<String>,
    preset: Preset,
    speaker: Option<Speaker>,
}

impl SpeechTask {
    /// Builds a task from the non-blank `segments`. Returns `None` when
    /// nothing is left to speak.
    pub fn new<I, S>(segments: I, preset: Preset) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.trim().is_empty())
            .collect();
        if segments.is_empty() {
            return None;
        }
        Some(Self {
            segments,
            preset,
            speaker: None,
        })
    }

    /// Annotates the task with its author. The worker speaks the name
    /// whenever the author differs from the previous annotated task.
    pub fn with_speaker(mut self, id: UserId, name: impl Into<String>) -> Self {
        self.speaker = Some(Speaker {
            id,
            name: name.into(),
        });
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn preset(&self) -> &Preset {
        &self.preset
    }

    pub fn speaker(&self) -> Option<&Speaker> {
        self.speaker.as_ref()
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Preset, Option<Speaker>) {
        (self.segments, self.preset, self.speaker)
    }
}
