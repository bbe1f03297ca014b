pub mod client;
pub mod dryrun;
pub mod export;
pub mod google;
pub mod studio;

pub use client::{
    default_client_registry, ClientRegistry, GeneratedPayload, GenerationClient, GenerationError,
};
pub use dryrun::DryrunClient;
pub use export::{encode_for_download, write_download, DownloadFormat};
pub use google::GoogleClient;
pub use studio::{DisplayedImage, PendingGeneration, Studio, StudioError, ViewState};
