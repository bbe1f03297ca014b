use std::collections::BTreeMap;

use innapse_contracts::prompt::GenerationRequest;

use crate::dryrun::DryrunClient;
use crate::google::GoogleClient;

/// One image returned by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("{provider} API key not set (GEMINI_API_KEY, GOOGLE_API_KEY or API_KEY)")]
    MissingApiKey { provider: String },
    #[error("{provider} did not return image data for {kind}.")]
    NoImage { provider: String, kind: String },
    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },
}

/// Boundary to the external image service.
///
/// Requests with reference images are edits; requests without are pure
/// generations sized by the aspect ratio. Exactly one image or an error
/// comes back, and nothing is retried.
pub trait GenerationClient {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedPayload, GenerationError>;
}

#[derive(Default)]
pub struct ClientRegistry {
    clients: BTreeMap<String, Box<dyn GenerationClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: GenerationClient + 'static>(&mut self, client: C) {
        self.clients
            .insert(client.name().to_string(), Box::new(client));
    }

    pub fn get(&self, name: &str) -> Option<&dyn GenerationClient> {
        self.clients.get(name).map(|client| client.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }
}

pub fn default_client_registry() -> ClientRegistry {
    let mut clients = ClientRegistry::new();
    clients.register(DryrunClient::new());
    clients.register(GoogleClient::from_env());
    clients
}
