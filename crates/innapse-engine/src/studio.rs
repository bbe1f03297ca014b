use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Instant;

use innapse_contracts::config::{
    AspectRatio, Configuration, CreateFunction, CreateStyle, EditFunction, ImageRef, ImageSlot,
    Mode,
};
use innapse_contracts::events::{EventPayload, EventWriter, SessionEvent};
use innapse_contracts::history::{History, HistoryEntry};
use innapse_contracts::preferences::Theme;
use innapse_contracts::prompt::{resolve, GenerationRequest, ValidationError};
use innapse_contracts::storage::LocalStorage;
use serde_json::{json, Value};

use crate::client::{GeneratedPayload, GenerationClient, GenerationError};
use crate::export::{write_download, DownloadFormat};

pub const STORAGE_FILE_NAME: &str = "storage.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Placeholder,
    Loading,
    Image,
}

/// The image on display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Configuration that produced the image; `None` when it was promoted
    /// from history.
    pub configuration: Option<Configuration>,
    pub variation: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Please generate an image first to create a variation.")]
    NoPriorGeneration,
    #[error("A generation is already in progress.")]
    GenerationInFlight,
    #[error("That generation is no longer pending.")]
    StaleGeneration,
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("History has no entry #{}.", .0 + 1)]
    UnknownHistoryEntry(usize),
    #[error("History entry #{} could not be read.", .0 + 1)]
    UnreadableHistoryEntry(usize),
    #[error("There is no image to download yet.")]
    NothingToDownload,
    #[error("Download failed: {0:#}")]
    Download(#[source] anyhow::Error),
}

/// A generation that has been validated and started but not yet answered.
///
/// Hand it back to [`Studio::complete_generation`] with the client's result,
/// or to [`Studio::cancel_generation`]. Dropping it abandons the attempt and
/// the studio falls back to what was displayed before.
#[derive(Debug)]
#[must_use = "a pending generation must be completed or cancelled"]
pub struct PendingGeneration {
    request: GenerationRequest,
    configuration: Configuration,
    variation: bool,
    ticket: Arc<()>,
    started: Instant,
}

impl PendingGeneration {
    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    pub fn is_variation(&self) -> bool {
        self.variation
    }
}

/// The studio side of a [`PendingGeneration`]. The ticket dies with the
/// token, which is how an abandoned attempt is noticed.
struct InFlight {
    ticket: Weak<()>,
    variation: bool,
}

impl InFlight {
    fn is_live(&self) -> bool {
        self.ticket.strong_count() > 0
    }

    fn owns(&self, pending: &PendingGeneration) -> bool {
        Weak::ptr_eq(&self.ticket, &Arc::downgrade(&pending.ticket))
    }
}

/// All session state, mutated only through one method per user action.
///
/// While a generation is pending, `current` still holds the image shown
/// before it. That image is hidden behind the loading state and doubles as
/// the comparison baseline for variations.
pub struct Studio {
    config: Configuration,
    view: ViewState,
    current: Option<DisplayedImage>,
    last_config: Option<Configuration>,
    in_flight: Option<InFlight>,
    history: History,
    theme: Theme,
    message: Option<String>,
    storage: LocalStorage,
    events: EventWriter,
}

impl Studio {
    /// Opens a session over the storage file in `data_dir`, restoring history
    /// and theme.
    pub fn open(data_dir: &Path, events: EventWriter) -> Self {
        let mut storage = LocalStorage::new(data_dir.join(STORAGE_FILE_NAME));
        let history = History::load(&mut storage);
        let theme = Theme::load(&mut storage, Theme::detect_default());
        let studio = Self {
            config: Configuration::default(),
            view: ViewState::Placeholder,
            current: None,
            last_config: None,
            in_flight: None,
            history,
            theme,
            message: None,
            storage,
            events,
        };
        studio.record_event(
            SessionEvent::SessionStarted,
            json!({
                "storage": studio.storage.path().to_string_lossy(),
                "history_len": studio.history.len(),
                "theme": studio.theme.as_str(),
            }),
        );
        studio
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn view_state(&self) -> ViewState {
        if self.view == ViewState::Loading && !self.is_generating() {
            return self.resting_view();
        }
        self.view
    }

    pub fn current_image(&self) -> Option<&DisplayedImage> {
        if self.is_generating() {
            return None;
        }
        self.current.as_ref()
    }

    /// Image shown before the running variation, kept for side-by-side
    /// comparison until the variation resolves.
    pub fn comparison_image(&self) -> Option<&DisplayedImage> {
        match &self.in_flight {
            Some(flight) if flight.is_live() && flight.variation => self.current.as_ref(),
            _ => None,
        }
    }

    pub fn last_successful_configuration(&self) -> Option<&Configuration> {
        self.last_config.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_generating(&self) -> bool {
        self.in_flight.as_ref().is_some_and(InFlight::is_live)
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.config.prompt = prompt.into();
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.config.mode = mode;
    }

    pub fn set_create_function(&mut self, function: CreateFunction) {
        self.config.create_function = function;
    }

    pub fn set_edit_function(&mut self, function: EditFunction) {
        self.config.edit_function = function;
    }

    pub fn set_aspect_ratio(&mut self, ratio: AspectRatio) {
        self.config.aspect_ratio = ratio;
    }

    pub fn toggle_style(&mut self, style: CreateStyle) {
        self.config.toggle_style(style);
    }

    pub fn set_image(&mut self, slot: ImageSlot, image: Option<ImageRef>) {
        if let Some(released) = self.config.set_image(slot, image) {
            log::debug!("released image {} from slot {}", released.preview(), slot.number());
        }
    }

    pub fn clear_images(&mut self) {
        self.config.clear_images();
    }

    pub fn dismiss_message(&mut self) {
        self.message = None;
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.set_theme(self.theme.toggled())
    }

    pub fn set_theme(&mut self, theme: Theme) -> Theme {
        self.theme = theme;
        if let Err(err) = self.theme.save(&mut self.storage) {
            log::warn!("failed to persist theme: {err:#}");
        }
        self.record_event(
            SessionEvent::ThemeChanged,
            json!({ "theme": self.theme.as_str() }),
        );
        self.theme
    }

    /// Validates the live configuration (or, for a variation, the last
    /// successful one) and switches the view to loading.
    ///
    /// Nothing changes when this fails, apart from the notification message.
    pub fn begin_generation(&mut self, variation: bool) -> Result<PendingGeneration, StudioError> {
        self.settle_abandoned();
        if self.is_generating() {
            return Err(StudioError::GenerationInFlight);
        }
        let configuration = if variation {
            match self.last_config.clone() {
                Some(configuration) => configuration,
                None => return Err(self.reject(StudioError::NoPriorGeneration)),
            }
        } else {
            self.config.clone()
        };
        let request = match resolve(&configuration) {
            Ok(request) => request,
            Err(err) => {
                self.record_event(
                    SessionEvent::ValidationFailed,
                    json!({ "code": err.code(), "variation": variation }),
                );
                return Err(self.reject(err.into()));
            }
        };

        let ticket = Arc::new(());
        self.in_flight = Some(InFlight {
            ticket: Arc::downgrade(&ticket),
            variation,
        });
        self.view = ViewState::Loading;

        let mut payload = request.summary();
        payload.insert("variation".to_string(), Value::Bool(variation));
        self.record_event(SessionEvent::GenerationStarted, Value::Object(payload));

        Ok(PendingGeneration {
            request,
            configuration,
            variation,
            ticket,
            started: Instant::now(),
        })
    }

    /// Applies the outcome of a pending generation.
    ///
    /// Success shows the new image and records it in history; only fresh
    /// generations become the replay source for variations. Failure puts
    /// back whatever was displayed before the attempt.
    pub fn complete_generation(
        &mut self,
        pending: PendingGeneration,
        result: Result<GeneratedPayload, GenerationError>,
    ) -> Result<(), StudioError> {
        if !self.in_flight.as_ref().is_some_and(|flight| flight.owns(&pending)) {
            return Err(StudioError::StaleGeneration);
        }
        self.in_flight = None;
        let elapsed_ms = pending.started.elapsed().as_millis() as u64;

        match result {
            Ok(payload) => {
                self.history
                    .record(HistoryEntry::from_image(&payload.mime_type, &payload.bytes));
                self.persist_history();
                self.record_event(
                    SessionEvent::GenerationSucceeded,
                    json!({
                        "variation": pending.variation,
                        "mime_type": payload.mime_type,
                        "bytes": payload.bytes.len(),
                        "elapsed_ms": elapsed_ms,
                        "history_len": self.history.len(),
                    }),
                );
                if !pending.variation {
                    self.last_config = Some(pending.configuration.clone());
                }
                self.current = Some(DisplayedImage {
                    bytes: payload.bytes,
                    mime_type: payload.mime_type,
                    configuration: Some(pending.configuration),
                    variation: pending.variation,
                });
                self.view = ViewState::Image;
                Ok(())
            }
            Err(err) => {
                log::warn!("generation failed: {err}");
                self.record_event(
                    SessionEvent::GenerationFailed,
                    json!({
                        "variation": pending.variation,
                        "error": err.to_string(),
                        "elapsed_ms": elapsed_ms,
                    }),
                );
                self.view = self.resting_view();
                Err(self.reject(err.into()))
            }
        }
    }

    /// Abandons a pending generation without an outcome and shows whatever
    /// was displayed before it started.
    pub fn cancel_generation(&mut self, pending: PendingGeneration) {
        if self.in_flight.as_ref().is_some_and(|flight| flight.owns(&pending)) {
            log::debug!("generation cancelled after {:?}", pending.started.elapsed());
            self.in_flight = None;
            self.view = self.resting_view();
        }
    }

    pub fn generate(&mut self, client: &dyn GenerationClient) -> Result<(), StudioError> {
        let pending = self.begin_generation(false)?;
        let result = client.generate(pending.request());
        self.complete_generation(pending, result)
    }

    pub fn generate_variation(&mut self, client: &dyn GenerationClient) -> Result<(), StudioError> {
        let pending = self.begin_generation(true)?;
        let result = client.generate(pending.request());
        self.complete_generation(pending, result)
    }

    /// Loads history entry `index` into slot 1 for further editing and shows
    /// it.
    pub fn select_history(&mut self, index: usize) -> Result<(), StudioError> {
        self.settle_abandoned();
        if self.is_generating() {
            return Err(StudioError::GenerationInFlight);
        }
        let Some(entry) = self.history.get(index) else {
            return Err(self.reject(StudioError::UnknownHistoryEntry(index)));
        };
        let short_id = entry.short_id();
        let image = match entry.to_image_ref(format!("history #{}", index + 1)) {
            Ok(image) => image,
            Err(err) => {
                log::warn!("history entry {index} unreadable: {err:#}");
                return Err(self.reject(StudioError::UnreadableHistoryEntry(index)));
            }
        };

        self.current = Some(DisplayedImage {
            bytes: image.bytes().to_vec(),
            mime_type: image.mime_type().to_string(),
            configuration: None,
            variation: false,
        });
        self.config.image1 = Some(image);
        self.config.image2 = None;
        self.config.image3 = None;
        self.config.mode = Mode::Edit;
        self.config.edit_function = EditFunction::AddRemove;
        self.config.prompt.clear();
        self.view = ViewState::Image;

        self.record_event(
            SessionEvent::HistorySelected,
            json!({ "index": index, "entry": short_id }),
        );
        Ok(())
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        self.persist_history();
    }

    /// Writes the current image to `target` (a file, or a directory to
    /// receive the default file name).
    pub fn download(
        &mut self,
        format: DownloadFormat,
        target: &Path,
    ) -> Result<PathBuf, StudioError> {
        self.settle_abandoned();
        let Some(current) = self.current_image() else {
            return Err(self.reject(StudioError::NothingToDownload));
        };
        match write_download(&current.bytes, format, target) {
            Ok(path) => {
                self.record_event(
                    SessionEvent::ImageDownloaded,
                    json!({
                        "format": format.extension(),
                        "path": path.to_string_lossy(),
                    }),
                );
                Ok(path)
            }
            Err(err) => Err(self.reject(StudioError::Download(err))),
        }
    }

    fn resting_view(&self) -> ViewState {
        if self.current.is_some() {
            ViewState::Image
        } else {
            ViewState::Placeholder
        }
    }

    /// Clears the pending slot when its token was dropped without being
    /// completed or cancelled.
    fn settle_abandoned(&mut self) {
        if self.in_flight.as_ref().is_some_and(|flight| !flight.is_live()) {
            log::warn!("pending generation was dropped without an outcome");
            self.in_flight = None;
            self.view = self.resting_view();
        }
    }

    fn reject(&mut self, err: StudioError) -> StudioError {
        self.message = Some(err.to_string());
        err
    }

    fn persist_history(&mut self) {
        if let Err(err) = self.history.save(&mut self.storage) {
            log::warn!("failed to persist history: {err:#}");
        }
    }

    fn record_event(&self, event: SessionEvent, payload: Value) {
        let payload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        if let Err(err) = self.events.emit(event, payload) {
            log::warn!("failed to write {} event: {err:#}", event.as_str());
        }
    }
}
