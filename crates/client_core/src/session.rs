//! Session controller: owns the single "active creation" slot and drives it
//! through Idle / Generating / Presenting.

use std::sync::Arc;

use shared::{
    domain::{default_creation_name, Creation, CreationId},
    error::{AppError, ErrorCode},
};
use storage::{CreationStore, ExampleSource, ImportError, NameLocalizer};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::generation::{FileInput, GenerationError, GenerationService};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Generating { ticket: u64 },
    Presenting(Creation),
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionState),
    HistoryChanged { len: usize },
    Error(AppError),
}

#[derive(Debug, Clone)]
pub enum GenerationJob {
    Create {
        prompt: String,
        file: Option<FileInput>,
    },
    Revise {
        source: Creation,
        instruction: String,
    },
}

/// A generation that has been started but not resolved yet.
#[derive(Debug)]
pub struct PendingGeneration {
    ticket: u64,
    job: GenerationJob,
}

impl PendingGeneration {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub async fn run(&self, generator: &dyn GenerationService) -> Result<String, GenerationError> {
        match &self.job {
            GenerationJob::Create { prompt, file } => generator.generate(prompt, file.as_ref()).await,
            GenerationJob::Revise {
                source,
                instruction,
            } => generator.revise(&source.html, instruction).await,
        }
    }

    fn into_creation(self, html: String) -> Creation {
        match self.job {
            GenerationJob::Create { prompt, file } => {
                let name = default_creation_name(
                    file.as_ref().and_then(|f| f.file_name.as_deref()),
                    &prompt,
                );
                Creation::new(name, html, file.as_ref().map(FileInput::to_data_uri))
            }
            GenerationJob::Revise { source, .. } => source.revised(html),
        }
    }
}

pub fn classify_generation_failure(err: &GenerationError) -> AppError {
    match err {
        GenerationError::MissingCredential => AppError::new(
            ErrorCode::CredentialRequired,
            "Add a generation API key before creating.",
        ),
        err if err.is_authorization_failure() => AppError::new(
            ErrorCode::CredentialRequired,
            format!("The generation service rejected the API key; enter a valid key. ({err})"),
        ),
        err => AppError::new(
            ErrorCode::Remote,
            format!("Generation failed; please try again. ({err})"),
        ),
    }
}

fn import_failure(err: &ImportError) -> AppError {
    AppError::new(ErrorCode::InvalidFormat, err.to_string())
}

/// Only the most recently started generation may claim the active slot. A
/// selection, import or reset also retires the outstanding ticket; a response
/// that arrives for a retired ticket is still added to history.
pub struct SessionController {
    store: CreationStore,
    generator: Arc<dyn GenerationService>,
    state: SessionState,
    next_ticket: u64,
    current_ticket: Option<u64>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(store: CreationStore, generator: Arc<dyn GenerationService>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            generator,
            state: SessionState::Idle,
            next_ticket: 1,
            current_ticket: None,
            events,
        }
    }

    pub async fn initialize(
        &mut self,
        examples: &dyn ExampleSource,
        localizer: &NameLocalizer,
    ) -> &[Creation] {
        let len = self.store.initialize(examples, localizer).await.len();
        self.emit(SessionEvent::HistoryChanged { len });
        self.store.list()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn active(&self) -> Option<&Creation> {
        match &self.state {
            SessionState::Presenting(creation) => Some(creation),
            _ => None,
        }
    }

    pub fn is_generating(&self) -> bool {
        matches!(self.state, SessionState::Generating { .. })
    }

    pub fn history(&self) -> &[Creation] {
        self.store.list()
    }

    pub fn store(&self) -> &CreationStore {
        &self.store
    }

    /// Clears the active slot and hands out a ticket for `job`. Any generation
    /// already in flight keeps running but can no longer claim the slot.
    pub fn start(&mut self, job: GenerationJob) -> PendingGeneration {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        if let Some(superseded) = self.current_ticket.replace(ticket) {
            info!("generation {superseded} superseded by {ticket}");
        }
        self.set_state(SessionState::Generating { ticket });
        PendingGeneration { ticket, job }
    }

    pub async fn resolve(
        &mut self,
        pending: PendingGeneration,
        result: Result<String, GenerationError>,
    ) -> Result<Creation, AppError> {
        let ticket = pending.ticket;
        let is_current = self.current_ticket == Some(ticket);

        match result {
            Ok(html) => {
                let creation = pending.into_creation(html);
                let len = self.store.add(creation.clone()).await.len();
                self.emit(SessionEvent::HistoryChanged { len });

                if is_current {
                    self.current_ticket = None;
                    self.set_state(SessionState::Presenting(creation.clone()));
                } else {
                    info!(
                        "generation {ticket} finished after being superseded; added {} to history only",
                        creation.id
                    );
                }
                Ok(creation)
            }
            Err(err) => {
                let app_error = classify_generation_failure(&err);
                if is_current {
                    warn!("generation {ticket} failed: {err}");
                    self.current_ticket = None;
                    self.set_state(SessionState::Idle);
                    self.emit(SessionEvent::Error(app_error.clone()));
                } else {
                    warn!("superseded generation {ticket} failed: {err}");
                }
                Err(app_error)
            }
        }
    }

    pub async fn create(
        &mut self,
        prompt: impl Into<String>,
        file: Option<FileInput>,
    ) -> Result<Creation, AppError> {
        let pending = self.start(GenerationJob::Create {
            prompt: prompt.into(),
            file,
        });
        let generator = Arc::clone(&self.generator);
        let result = pending.run(generator.as_ref()).await;
        self.resolve(pending, result).await
    }

    /// Revises the active creation. The result is a new record; the source
    /// stays in history unchanged.
    pub async fn revise(&mut self, instruction: impl Into<String>) -> Result<Creation, AppError> {
        let instruction = instruction.into();
        let Some(source) = self.active().cloned() else {
            return Err(self.surface(AppError::new(
                ErrorCode::Validation,
                "There is no active creation to revise.",
            )));
        };
        if instruction.trim().is_empty() {
            return Err(self.surface(AppError::new(
                ErrorCode::Validation,
                "Describe the change you want before revising.",
            )));
        }

        let pending = self.start(GenerationJob::Revise {
            source,
            instruction,
        });
        let generator = Arc::clone(&self.generator);
        let result = pending.run(generator.as_ref()).await;
        self.resolve(pending, result).await
    }

    pub fn select(&mut self, id: &CreationId) -> Result<Creation, AppError> {
        let Some(creation) = self.store.get(id).cloned() else {
            return Err(self.surface(AppError::new(
                ErrorCode::Validation,
                format!("No creation with id {id} in history."),
            )));
        };
        self.current_ticket = None;
        self.set_state(SessionState::Presenting(creation.clone()));
        Ok(creation)
    }

    /// Imports a document and presents it, whether or not it was already in
    /// history.
    pub async fn import(&mut self, raw_json: &str) -> Result<Creation, AppError> {
        match self.store.import(raw_json).await {
            Ok(creation) => {
                let len = self.store.len();
                self.emit(SessionEvent::HistoryChanged { len });
                self.current_ticket = None;
                self.set_state(SessionState::Presenting(creation.clone()));
                Ok(creation)
            }
            Err(err) => Err(self.surface(import_failure(&err))),
        }
    }

    pub fn export(&self, id: &CreationId) -> Result<Vec<u8>, AppError> {
        let Some(creation) = self.store.get(id) else {
            return Err(AppError::new(
                ErrorCode::Validation,
                format!("No creation with id {id} in history."),
            ));
        };
        CreationStore::export(creation)
            .map_err(|err| AppError::new(ErrorCode::Internal, format!("{err:#}")))
    }

    pub async fn delete(&mut self, id: &CreationId) -> &[Creation] {
        let len = self.store.remove(id).await.len();
        self.emit(SessionEvent::HistoryChanged { len });
        if self.active().is_some_and(|active| &active.id == id) {
            self.set_state(SessionState::Idle);
        }
        self.store.list()
    }

    pub fn reset(&mut self) {
        self.current_ticket = None;
        self.set_state(SessionState::Idle);
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state.clone();
        self.emit(SessionEvent::StateChanged(state));
    }

    fn surface(&self, error: AppError) -> AppError {
        self.emit(SessionEvent::Error(error.clone()));
        error
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
