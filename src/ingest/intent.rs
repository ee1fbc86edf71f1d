/// What the user wants done with the artifacts in their message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistIntent {
    /// Push the artifact to storage and reply with the outcome.
    Persist,
    /// Forward the artifact to the agent alongside the message.
    Converse,
}

/// Case-insensitive phrases that turn a message into a save request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerPhrases {
    phrases: Vec<String>,
}

impl TriggerPhrases {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// PDFs are only saved on an explicit "save (the) file".
    pub fn pdf_default() -> Self {
        Self::new(["save the file", "save file"])
    }

    /// Repositories also accept a bare "save", which PDFs deliberately do not.
    pub fn repository_default() -> Self {
        Self::new(["save", "save file", "save repo", "save the repo"])
    }

    pub fn classify(&self, message: &str) -> PersistIntent {
        let lower = message.to_lowercase();
        if self.phrases.iter().any(|phrase| lower.contains(phrase.as_str())) {
            PersistIntent::Persist
        } else {
            PersistIntent::Converse
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}
