//! Turns a [`Configuration`] into the single request sent to the image
//! service.

use serde_json::{json, Map, Value};

use crate::config::{
    ActiveFunction, AspectRatio, Configuration, CreateFunction, CreateStyle, EditFunction,
    ImageRef, ImageSlot,
};

pub const HOUSE_STYLE_PREFIX: &str = "Innapse.AI Style — high sharpness, balanced contrast. ";

pub const FUSION_INSTRUCTION: &str = "Create a new image by fusing the provided reference images, enhancing face details, lighting, and background. ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please write your idea in the prompt!")]
    MissingPrompt,
    #[error("Please upload at least one image for Fusion Mode.")]
    MissingFusionImages,
    #[error("Please select two images for Compose function.")]
    MissingComposeImages,
    #[error("Please select an image to edit.")]
    MissingEditImage,
}

impl ValidationError {
    pub fn code(self) -> &'static str {
        match self {
            ValidationError::MissingPrompt => "missing_prompt",
            ValidationError::MissingFusionImages => "missing_fusion_images",
            ValidationError::MissingComposeImages => "missing_compose_images",
            ValidationError::MissingEditImage => "missing_edit_image",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Text-only generation sized by the aspect ratio.
    Generate,
    /// Prompt plus reference images; geometry follows the references.
    Edit,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Generate => "generate",
            RequestKind::Edit => "edit",
        }
    }
}

/// A fully resolved request: final prompt text, ordered reference images
/// and the requested aspect ratio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub images: Vec<ImageRef>,
    pub aspect_ratio: AspectRatio,
}

impl GenerationRequest {
    pub fn kind(&self) -> RequestKind {
        if self.images.is_empty() {
            RequestKind::Generate
        } else {
            RequestKind::Edit
        }
    }

    pub fn summary(&self) -> Map<String, Value> {
        json!({
            "kind": self.kind().as_str(),
            "prompt": self.prompt,
            "aspect_ratio": self.aspect_ratio.as_str(),
            "images": self
                .images
                .iter()
                .map(|image| image.preview().to_string())
                .collect::<Vec<String>>(),
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }
}

pub fn style_phrase(style: CreateStyle) -> &'static str {
    match style {
        CreateStyle::Cinematic => "cinematic style",
        CreateStyle::EightK => "8k resolution, ultra detailed",
        CreateStyle::Realistic => "photorealistic, hyper-realism",
        CreateStyle::Illustration => "illustration style, digital art",
    }
}

pub fn resolve(config: &Configuration) -> Result<GenerationRequest, ValidationError> {
    if config.prompt.trim().is_empty() {
        return Err(ValidationError::MissingPrompt);
    }

    let (prompt, images) = match config.active_function() {
        ActiveFunction::Create(CreateFunction::Free) => {
            let suffix = config
                .style
                .map(|style| format!(", {}", style_phrase(style)))
                .unwrap_or_default();
            (
                format!("{HOUSE_STYLE_PREFIX}{}{suffix}", config.prompt),
                Vec::new(),
            )
        }
        ActiveFunction::Create(CreateFunction::Fusion) => {
            let images = ImageSlot::ALL
                .iter()
                .filter_map(|slot| config.image(*slot).cloned())
                .collect::<Vec<ImageRef>>();
            if images.is_empty() {
                return Err(ValidationError::MissingFusionImages);
            }
            (format!("{FUSION_INSTRUCTION}{}.", config.prompt), images)
        }
        ActiveFunction::Edit(EditFunction::Compose) => {
            let (Some(first), Some(second)) = (config.image1.clone(), config.image2.clone())
            else {
                return Err(ValidationError::MissingComposeImages);
            };
            (config.prompt.clone(), vec![first, second])
        }
        ActiveFunction::Edit(
            EditFunction::AddRemove | EditFunction::Style | EditFunction::Retouch,
        ) => {
            let Some(first) = config.image1.clone() else {
                return Err(ValidationError::MissingEditImage);
            };
            (config.prompt.clone(), vec![first])
        }
    };

    Ok(GenerationRequest {
        prompt,
        images,
        aspect_ratio: config.aspect_ratio,
    })
}

#[cfg(test)]
mod tests {
    use crate::config::Mode;

    use super::*;

    fn image(name: &str) -> ImageRef {
        ImageRef::from_bytes(name.as_bytes().to_vec(), "image/png", name)
    }

    fn config(prompt: &str, mode: Mode) -> Configuration {
        Configuration {
            prompt: prompt.to_string(),
            mode,
            ..Configuration::default()
        }
    }

    fn previews(request: &GenerationRequest) -> Vec<&str> {
        request.images.iter().map(ImageRef::preview).collect()
    }

    #[test]
    fn blank_prompt_fails_for_every_function() {
        let mut combos = Vec::new();
        for function in CreateFunction::ALL {
            let mut cfg = config(" \t\n", Mode::Create);
            cfg.create_function = function;
            combos.push(cfg);
        }
        for function in EditFunction::ALL {
            let mut cfg = config("", Mode::Edit);
            cfg.edit_function = function;
            combos.push(cfg);
        }
        for mut cfg in combos {
            cfg.image1 = Some(image("a"));
            cfg.image2 = Some(image("b"));
            assert_eq!(resolve(&cfg), Err(ValidationError::MissingPrompt));
        }
    }

    #[test]
    fn free_creation_adds_house_prefix_and_style_suffix() {
        let mut cfg = config("a cat", Mode::Create);
        cfg.style = Some(CreateStyle::Cinematic);
        cfg.aspect_ratio = AspectRatio::Landscape;
        let request = resolve(&cfg).unwrap();
        assert_eq!(
            request.prompt,
            "Innapse.AI Style — high sharpness, balanced contrast. a cat, cinematic style"
        );
        assert!(request.images.is_empty());
        assert_eq!(request.kind(), RequestKind::Generate);
        assert_eq!(request.aspect_ratio, AspectRatio::Landscape);
    }

    #[test]
    fn free_creation_without_style_has_no_suffix() {
        let request = resolve(&config("  a dog ", Mode::Create)).unwrap();
        assert_eq!(request.prompt, format!("{HOUSE_STYLE_PREFIX}  a dog "));
    }

    #[test]
    fn free_creation_ignores_uploaded_images() {
        let mut cfg = config("a cat", Mode::Create);
        cfg.image1 = Some(image("a"));
        assert!(resolve(&cfg).unwrap().images.is_empty());
    }

    #[test]
    fn every_style_has_a_phrase() {
        for style in CreateStyle::ALL {
            let mut cfg = config("x", Mode::Create);
            cfg.style = Some(style);
            let request = resolve(&cfg).unwrap();
            assert!(request.prompt.ends_with(&format!("x, {}", style_phrase(style))));
        }
    }

    #[test]
    fn fusion_requires_an_image() {
        let mut cfg = config("blend", Mode::Create);
        cfg.create_function = CreateFunction::Fusion;
        assert_eq!(resolve(&cfg), Err(ValidationError::MissingFusionImages));
    }

    #[test]
    fn fusion_keeps_slot_order_and_skips_empty_slots() {
        let mut cfg = config("two faces", Mode::Create);
        cfg.create_function = CreateFunction::Fusion;
        cfg.image2 = Some(image("second"));
        let request = resolve(&cfg).unwrap();
        assert_eq!(previews(&request), vec!["second"]);
        assert_eq!(
            request.prompt,
            format!("{FUSION_INSTRUCTION}two faces.")
        );

        cfg.image3 = Some(image("third"));
        cfg.image1 = Some(image("first"));
        let request = resolve(&cfg).unwrap();
        assert_eq!(previews(&request), vec!["first", "second", "third"]);
        assert_eq!(request.kind(), RequestKind::Edit);
    }

    #[test]
    fn fusion_ignores_style() {
        let mut cfg = config("mix", Mode::Create);
        cfg.create_function = CreateFunction::Fusion;
        cfg.style = Some(CreateStyle::Realistic);
        cfg.image1 = Some(image("a"));
        let request = resolve(&cfg).unwrap();
        assert!(!request.prompt.contains("photorealistic"));
    }

    #[test]
    fn compose_requires_both_slots() {
        let mut cfg = config("put them together", Mode::Edit);
        cfg.edit_function = EditFunction::Compose;
        cfg.image1 = Some(image("a"));
        assert_eq!(resolve(&cfg), Err(ValidationError::MissingComposeImages));

        cfg.image1 = None;
        cfg.image2 = Some(image("b"));
        assert_eq!(resolve(&cfg), Err(ValidationError::MissingComposeImages));

        cfg.image1 = Some(image("a"));
        cfg.image3 = Some(image("c"));
        let request = resolve(&cfg).unwrap();
        assert_eq!(request.prompt, "put them together");
        assert_eq!(previews(&request), vec!["a", "b"]);
    }

    #[test]
    fn single_image_edits_require_slot_one() {
        for function in [
            EditFunction::AddRemove,
            EditFunction::Style,
            EditFunction::Retouch,
        ] {
            let mut cfg = config("remove the hat", Mode::Edit);
            cfg.edit_function = function;
            cfg.image2 = Some(image("b"));
            assert_eq!(resolve(&cfg), Err(ValidationError::MissingEditImage));

            cfg.image1 = Some(image("a"));
            let request = resolve(&cfg).unwrap();
            assert_eq!(request.prompt, "remove the hat");
            assert_eq!(previews(&request), vec!["a"]);
        }
    }

    #[test]
    fn edit_prompt_is_not_augmented_by_style() {
        let mut cfg = config("retouch skin", Mode::Edit);
        cfg.edit_function = EditFunction::Retouch;
        cfg.style = Some(CreateStyle::EightK);
        cfg.image1 = Some(image("a"));
        assert_eq!(resolve(&cfg).unwrap().prompt, "retouch skin");
    }

    #[test]
    fn validation_messages_and_codes() {
        assert_eq!(
            ValidationError::MissingPrompt.to_string(),
            "Please write your idea in the prompt!"
        );
        assert_eq!(
            ValidationError::MissingComposeImages.code(),
            "missing_compose_images"
        );
    }
}
