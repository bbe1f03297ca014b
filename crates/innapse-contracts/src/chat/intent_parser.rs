use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, DOWNLOAD_COMMAND, IMAGE_SLOT_COMMANDS, NO_ARG_COMMANDS, PROMPT_COMMAND,
    RAW_ARG_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    parse_path_args(arg).join(" ")
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let remainder = &slash_tail[command_len..];
            let arg = remainder.trim();

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent
                    .command_args
                    .insert("value".to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if let Some((_, slot)) = IMAGE_SLOT_COMMANDS
                .iter()
                .find(|(name, _)| *name == command)
            {
                let mut intent = Intent::new("set_image", text);
                intent
                    .command_args
                    .insert("slot".to_string(), Value::Number((*slot).into()));
                intent.command_args.insert(
                    "path".to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return intent;
            }

            if command == PROMPT_COMMAND.command {
                let mut intent = Intent::new(PROMPT_COMMAND.action, text);
                intent.prompt = Some(arg.to_string());
                return intent;
            }

            if command == DOWNLOAD_COMMAND.command {
                let mut intent = Intent::new(DOWNLOAD_COMMAND.action, text);
                let mut parts = parse_path_args(arg).into_iter();
                let format = parts.next().unwrap_or_else(|| "png".to_string());
                let path = parts.collect::<Vec<String>>().join(" ");
                intent
                    .command_args
                    .insert("format".to_string(), Value::String(format));
                intent.command_args.insert(
                    "path".to_string(),
                    if path.is_empty() {
                        Value::Null
                    } else {
                        Value::String(path)
                    },
                );
                return intent;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("generate", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}
