use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::image_ref::ImageRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    Create,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreateFunction {
    #[default]
    Free,
    #[serde(rename = "fusion-mode")]
    Fusion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditFunction {
    #[default]
    AddRemove,
    Style,
    Retouch,
    Compose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreateStyle {
    Cinematic,
    #[serde(rename = "8k")]
    EightK,
    Realistic,
    Illustration,
}

/// The function that is live for the current mode. Only one of the create
/// or edit paths can be active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveFunction {
    Create(CreateFunction),
    Edit(EditFunction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    First,
    Second,
    Third,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Create, Mode::Edit];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Create => "create",
            Mode::Edit => "edit",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Create => "Create",
            Mode::Edit => "Edit",
        }
    }
}

impl CreateFunction {
    pub const ALL: [CreateFunction; 2] = [CreateFunction::Free, CreateFunction::Fusion];

    pub fn as_str(self) -> &'static str {
        match self {
            CreateFunction::Free => "free",
            CreateFunction::Fusion => "fusion-mode",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CreateFunction::Free => "Free Creation",
            CreateFunction::Fusion => "Fusion Mode",
        }
    }
}

impl EditFunction {
    pub const ALL: [EditFunction; 4] = [
        EditFunction::AddRemove,
        EditFunction::Style,
        EditFunction::Retouch,
        EditFunction::Compose,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EditFunction::AddRemove => "add-remove",
            EditFunction::Style => "style",
            EditFunction::Retouch => "retouch",
            EditFunction::Compose => "compose",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EditFunction::AddRemove => "Add/Remove",
            EditFunction::Style => "Stylize",
            EditFunction::Retouch => "Retouch",
            EditFunction::Compose => "Compose",
        }
    }
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 3] = [
        AspectRatio::Square,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }

    /// Width and height units of the ratio.
    pub fn units(self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Landscape => (16, 9),
            AspectRatio::Portrait => (9, 16),
        }
    }
}

impl CreateStyle {
    pub const ALL: [CreateStyle; 4] = [
        CreateStyle::Cinematic,
        CreateStyle::EightK,
        CreateStyle::Realistic,
        CreateStyle::Illustration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CreateStyle::Cinematic => "cinematic",
            CreateStyle::EightK => "8k",
            CreateStyle::Realistic => "realistic",
            CreateStyle::Illustration => "illustration",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CreateStyle::Cinematic => "Cinematic",
            CreateStyle::EightK => "8K",
            CreateStyle::Realistic => "Realistic",
            CreateStyle::Illustration => "Illustration",
        }
    }
}

impl ImageSlot {
    pub const ALL: [ImageSlot; 3] = [ImageSlot::First, ImageSlot::Second, ImageSlot::Third];

    pub fn number(self) -> u8 {
        match self {
            ImageSlot::First => 1,
            ImageSlot::Second => 2,
            ImageSlot::Third => 3,
        }
    }
}

fn normalize_token(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .replace(['_', ' '], "-")
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match normalize_token(raw).as_str() {
            "create" | "new" => Ok(Mode::Create),
            "edit" => Ok(Mode::Edit),
            _ => Err(format!("Unknown mode '{}'. Expected create or edit.", raw.trim())),
        }
    }
}

impl FromStr for CreateFunction {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match normalize_token(raw).as_str() {
            "free" | "free-creation" => Ok(CreateFunction::Free),
            "fusion" | "fusion-mode" => Ok(CreateFunction::Fusion),
            _ => Err(format!(
                "Unknown create function '{}'. Expected free or fusion.",
                raw.trim()
            )),
        }
    }
}

impl FromStr for EditFunction {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match normalize_token(raw).as_str() {
            "add-remove" | "addremove" | "add/remove" => Ok(EditFunction::AddRemove),
            "style" | "stylize" => Ok(EditFunction::Style),
            "retouch" => Ok(EditFunction::Retouch),
            "compose" => Ok(EditFunction::Compose),
            _ => Err(format!(
                "Unknown edit function '{}'. Expected add-remove, style, retouch or compose.",
                raw.trim()
            )),
        }
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match normalize_token(raw).replace('/', ":").as_str() {
            "1:1" | "square" => Ok(AspectRatio::Square),
            "16:9" | "landscape" | "wide" => Ok(AspectRatio::Landscape),
            "9:16" | "portrait" | "tall" => Ok(AspectRatio::Portrait),
            _ => Err(format!(
                "Unknown aspect ratio '{}'. Expected 1:1, 16:9 or 9:16.",
                raw.trim()
            )),
        }
    }
}

impl FromStr for CreateStyle {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match normalize_token(raw).as_str() {
            "cinematic" => Ok(CreateStyle::Cinematic),
            "8k" | "eight-k" => Ok(CreateStyle::EightK),
            "realistic" => Ok(CreateStyle::Realistic),
            "illustration" => Ok(CreateStyle::Illustration),
            _ => Err(format!(
                "Unknown style '{}'. Expected cinematic, 8k, realistic or illustration.",
                raw.trim()
            )),
        }
    }
}

impl FromStr for ImageSlot {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match normalize_token(raw).trim_start_matches("image") {
            "1" => Ok(ImageSlot::First),
            "2" => Ok(ImageSlot::Second),
            "3" => Ok(ImageSlot::Third),
            _ => Err(format!("Unknown image slot '{}'. Expected 1, 2 or 3.", raw.trim())),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ActiveFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveFunction::Create(function) => f.write_str(function.label()),
            ActiveFunction::Edit(function) => f.write_str(function.label()),
        }
    }
}

/// Everything the user has selected for the next generation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Configuration {
    pub prompt: String,
    pub mode: Mode,
    pub create_function: CreateFunction,
    pub edit_function: EditFunction,
    pub aspect_ratio: AspectRatio,
    pub style: Option<CreateStyle>,
    pub image1: Option<ImageRef>,
    pub image2: Option<ImageRef>,
    pub image3: Option<ImageRef>,
}

impl Configuration {
    pub fn active_function(&self) -> ActiveFunction {
        match self.mode {
            Mode::Create => ActiveFunction::Create(self.create_function),
            Mode::Edit => ActiveFunction::Edit(self.edit_function),
        }
    }

    pub fn image(&self, slot: ImageSlot) -> Option<&ImageRef> {
        match slot {
            ImageSlot::First => self.image1.as_ref(),
            ImageSlot::Second => self.image2.as_ref(),
            ImageSlot::Third => self.image3.as_ref(),
        }
    }

    /// Puts `image` into `slot` and hands back whatever was there before.
    pub fn set_image(&mut self, slot: ImageSlot, image: Option<ImageRef>) -> Option<ImageRef> {
        let target = match slot {
            ImageSlot::First => &mut self.image1,
            ImageSlot::Second => &mut self.image2,
            ImageSlot::Third => &mut self.image3,
        };
        std::mem::replace(target, image)
    }

    pub fn clear_images(&mut self) {
        self.image1 = None;
        self.image2 = None;
        self.image3 = None;
    }

    pub fn has_any_image(&self) -> bool {
        ImageSlot::ALL.iter().any(|slot| self.image(*slot).is_some())
    }

    /// Selecting the style that is already active switches styles off.
    pub fn toggle_style(&mut self, style: CreateStyle) {
        self.style = if self.style == Some(style) {
            None
        } else {
            Some(style)
        };
    }

    /// Only text-only generation is sized by the aspect ratio. Edits and
    /// fusion with references take their geometry from the input images.
    pub fn aspect_ratio_applies(&self) -> bool {
        match self.active_function() {
            ActiveFunction::Create(CreateFunction::Free) => true,
            ActiveFunction::Create(CreateFunction::Fusion) => !self.has_any_image(),
            ActiveFunction::Edit(_) => false,
        }
    }

    /// Event-log friendly snapshot. Image bytes are reduced to previews.
    pub fn summary(&self) -> Map<String, Value> {
        let images = ImageSlot::ALL
            .iter()
            .map(|slot| {
                self.image(*slot)
                    .map(|image| Value::String(image.preview().to_string()))
                    .unwrap_or(Value::Null)
            })
            .collect::<Vec<Value>>();
        let function = match self.active_function() {
            ActiveFunction::Create(function) => function.as_str(),
            ActiveFunction::Edit(function) => function.as_str(),
        };
        json!({
            "prompt": self.prompt,
            "mode": self.mode.as_str(),
            "function": function,
            "aspect_ratio": self.aspect_ratio.as_str(),
            "style": self.style.map(CreateStyle::as_str),
            "images": images,
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }
}
