#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole argument string is passed through as `value`.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "mode",
        action: "set_mode",
    },
    CommandSpec {
        command: "function",
        action: "set_function",
    },
    CommandSpec {
        command: "style",
        action: "toggle_style",
    },
    CommandSpec {
        command: "ratio",
        action: "set_aspect_ratio",
    },
    CommandSpec {
        command: "select",
        action: "select_history",
    },
    CommandSpec {
        command: "clear",
        action: "clear_image",
    },
];

pub(crate) const IMAGE_SLOT_COMMANDS: &[(&str, u8)] = &[("image1", 1), ("image2", 2), ("image3", 3)];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "variation",
        action: "variation",
    },
    CommandSpec {
        command: "history",
        action: "list_history",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "theme",
        action: "toggle_theme",
    },
    CommandSpec {
        command: "ok",
        action: "dismiss",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub(crate) const PROMPT_COMMAND: CommandSpec = CommandSpec {
    command: "prompt",
    action: "set_prompt",
};

pub(crate) const DOWNLOAD_COMMAND: CommandSpec = CommandSpec {
    command: "download",
    action: "download",
};

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/mode",
    "/function",
    "/style",
    "/ratio",
    "/prompt",
    "/image1",
    "/image2",
    "/image3",
    "/clear",
    "/generate",
    "/variation",
    "/history",
    "/select",
    "/download",
    "/theme",
    "/status",
    "/ok",
    "/help",
    "/quit",
];
