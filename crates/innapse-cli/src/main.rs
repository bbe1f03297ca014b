use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use innapse_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use innapse_contracts::config::{
    ActiveFunction, AspectRatio, CreateFunction, CreateStyle, EditFunction, ImageRef, ImageSlot,
    Mode,
};
use innapse_contracts::events::EventWriter;
use innapse_contracts::history::History;
use innapse_contracts::preferences::Theme;
use innapse_engine::{
    default_client_registry, write_download, ClientRegistry, DownloadFormat, GenerationClient,
    Studio, ViewState,
};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "innapse", version, about = "Innapse.AI image studio")]
struct Cli {
    /// Directory holding storage.json, events and previews.
    #[arg(long, global = true, env = "INNAPSE_HOME")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, env = "INNAPSE_PROVIDER", default_value = "google")]
    provider: String,
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat,
    Generate(GenerateArgs),
    History {
        #[command(subcommand)]
        action: HistoryCommand,
    },
    Theme(ThemeArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    mode: Option<Mode>,
    /// free, fusion, add-remove, style, retouch or compose.
    #[arg(long)]
    function: Option<String>,
    #[arg(long)]
    style: Option<CreateStyle>,
    #[arg(long)]
    ratio: Option<AspectRatio>,
    /// Reference image, repeatable up to three times in slot order.
    #[arg(long = "image")]
    images: Vec<PathBuf>,
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    List,
    /// Writes entry <INDEX> (1 = newest) to <PATH>.
    Export { index: usize, path: PathBuf },
    Clear,
}

#[derive(Debug, Parser)]
struct ThemeArgs {
    /// light, dark or toggle; prints the current theme when omitted.
    value: Option<String>,
}

struct Session {
    data_dir: PathBuf,
    events_path: PathBuf,
    provider: String,
}

impl Session {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let data_dir = match cli.data_dir.clone() {
            Some(dir) => dir,
            None => dirs::data_dir()
                .map(|dir| dir.join("innapse"))
                .context("no data directory available; pass --data-dir")?,
        };
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let events_path = cli
            .events
            .clone()
            .unwrap_or_else(|| data_dir.join("events.jsonl"));
        Ok(Self {
            data_dir,
            events_path,
            provider: cli.provider.clone(),
        })
    }

    fn open_studio(&self) -> Studio {
        Studio::open(
            &self.data_dir,
            EventWriter::for_new_session(self.events_path.clone()),
        )
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("innapse error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let session = Session::from_cli(&cli)?;
    log::debug!("data dir {}", session.data_dir.display());
    match cli.command {
        Command::Chat => {
            run_chat(&session)?;
            Ok(0)
        }
        Command::Generate(args) => run_generate(&session, args),
        Command::History { action } => run_history(&session, action),
        Command::Theme(args) => run_theme(&session, args),
    }
}

fn client_for<'a>(registry: &'a ClientRegistry, name: &str) -> Result<&'a dyn GenerationClient> {
    match registry.get(name) {
        Some(client) => Ok(client),
        None => bail!(
            "unknown provider '{name}' (available: {})",
            registry.names().join(", ")
        ),
    }
}

fn run_chat(session: &Session) -> Result<()> {
    let registry = default_client_registry();
    let client = client_for(&registry, &session.provider)?;
    let mut studio = session.open_studio();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    println!(
        "Innapse chat started ({} client). Type /help for commands.",
        client.name()
    );

    loop {
        print!("{}> {}", accent(studio.theme()), RESET);
        stdout.flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        match handle_intent(&mut studio, client, &session.data_dir, &intent, &mut stdout)? {
            ChatFlow::Continue => {}
            ChatFlow::Quit => break,
        }
    }
    Ok(())
}

const RESET: &str = "\x1b[0m";

fn accent(theme: Theme) -> &'static str {
    match theme {
        Theme::Light => "\x1b[34m",
        Theme::Dark => "\x1b[36m",
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ChatFlow {
    Continue,
    Quit,
}

fn handle_intent(
    studio: &mut Studio,
    client: &dyn GenerationClient,
    data_dir: &Path,
    intent: &Intent,
    out: &mut impl Write,
) -> Result<ChatFlow> {
    match intent.action.as_str() {
        "noop" => {}
        "quit" => return Ok(ChatFlow::Quit),
        "help" => writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?,
        "set_prompt" => {
            studio.set_prompt(intent.prompt.clone().unwrap_or_default());
            writeln!(out, "Prompt set.")?;
        }
        "set_mode" => match intent.arg_str("value").map(str::parse::<Mode>) {
            Some(Ok(mode)) => {
                studio.set_mode(mode);
                writeln!(out, "Mode: {} ({})", mode.label(), studio.configuration().active_function())?;
            }
            Some(Err(message)) => writeln!(out, "{message}")?,
            None => writeln!(out, "/mode requires create or edit")?,
        },
        "set_function" => match intent.arg_str("value") {
            Some(raw) => match apply_function(studio, raw) {
                Ok(function) => writeln!(out, "Function: {function}")?,
                Err(message) => writeln!(out, "{message}")?,
            },
            None => writeln!(out, "/function requires a name")?,
        },
        "toggle_style" => match intent.arg_str("value").map(str::parse::<CreateStyle>) {
            Some(Ok(style)) => {
                studio.toggle_style(style);
                match studio.configuration().style {
                    Some(active) => writeln!(out, "Style: {}", active.label())?,
                    None => writeln!(out, "Style cleared.")?,
                }
            }
            Some(Err(message)) => writeln!(out, "{message}")?,
            None => writeln!(out, "/style requires cinematic, 8k, realistic or illustration")?,
        },
        "set_aspect_ratio" => match intent.arg_str("value").map(str::parse::<AspectRatio>) {
            Some(Ok(ratio)) => {
                studio.set_aspect_ratio(ratio);
                writeln!(out, "Aspect ratio: {ratio}")?;
                if !studio.configuration().aspect_ratio_applies() {
                    writeln!(out, "(Ignored here: the reference images set the geometry.)")?;
                }
            }
            Some(Err(message)) => writeln!(out, "{message}")?,
            None => writeln!(out, "/ratio requires 1:1, 16:9 or 9:16")?,
        },
        "set_image" => {
            let slot = intent
                .command_args
                .get("slot")
                .and_then(Value::as_u64)
                .and_then(|number| number.to_string().parse::<ImageSlot>().ok());
            let Some(slot) = slot else {
                writeln!(out, "Unknown image slot.")?;
                return Ok(ChatFlow::Continue);
            };
            let Some(path) = intent.arg_str("path") else {
                writeln!(out, "/image{} requires a path", slot.number())?;
                return Ok(ChatFlow::Continue);
            };
            match ImageRef::from_path(Path::new(path)) {
                Ok(image) => {
                    writeln!(out, "Image {} set to {}", slot.number(), image.preview())?;
                    studio.set_image(slot, Some(image));
                }
                Err(err) => writeln!(out, "Could not load image: {err:#}")?,
            }
        }
        "clear_image" => match intent.arg_str("value") {
            None | Some("all") => {
                studio.clear_images();
                writeln!(out, "All images cleared.")?;
            }
            Some(raw) => match raw.parse::<ImageSlot>() {
                Ok(slot) => {
                    studio.set_image(slot, None);
                    writeln!(out, "Image {} cleared.", slot.number())?;
                }
                Err(message) => writeln!(out, "{message}")?,
            },
        },
        "generate" => {
            if let Some(prompt) = intent.prompt.as_deref() {
                studio.set_prompt(prompt);
            }
            let result = studio.generate(client);
            report_generation(studio, data_dir, result.is_ok(), out)?;
        }
        "variation" => {
            let result = studio.generate_variation(client);
            report_generation(studio, data_dir, result.is_ok(), out)?;
        }
        "list_history" => print_history(studio.history(), out)?,
        "select_history" => {
            let index = intent
                .arg_str("value")
                .and_then(|raw| raw.parse::<usize>().ok())
                .filter(|number| *number >= 1);
            let Some(number) = index else {
                writeln!(out, "/select requires an entry number (1 = newest)")?;
                return Ok(ChatFlow::Continue);
            };
            match studio.select_history(number - 1) {
                Ok(()) => {
                    writeln!(out, "Loaded history #{number} into image 1 for editing.")?;
                    write_preview_line(studio, data_dir, out)?;
                }
                Err(err) => writeln!(out, "! {err}")?,
            }
        }
        "download" => {
            let format = match intent
                .arg_str("format")
                .unwrap_or("png")
                .parse::<DownloadFormat>()
            {
                Ok(format) => format,
                Err(message) => {
                    writeln!(out, "{message}")?;
                    return Ok(ChatFlow::Continue);
                }
            };
            let target = intent.arg_str("path").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
            match studio.download(format, &target) {
                Ok(path) => writeln!(out, "Saved {}", path.display())?,
                Err(err) => writeln!(out, "! {err}")?,
            }
        }
        "toggle_theme" => {
            let theme = studio.toggle_theme();
            writeln!(out, "{}Theme: {theme}{RESET}", accent(theme))?;
        }
        "status" => print_status(studio, out)?,
        "dismiss" => {
            studio.dismiss_message();
            writeln!(out, "OK")?;
        }
        "unknown" => {
            let command = intent.arg_str("command").unwrap_or_default();
            writeln!(out, "Unknown command: /{command}. Type /help for commands.")?;
        }
        other => log::warn!("unhandled chat action {other}"),
    }
    Ok(ChatFlow::Continue)
}

/// Applies a function name, switching mode to the one that owns it.
fn apply_function(studio: &mut Studio, raw: &str) -> Result<ActiveFunction, String> {
    if let Ok(function) = raw.parse::<CreateFunction>() {
        studio.set_mode(Mode::Create);
        studio.set_create_function(function);
    } else if let Ok(function) = raw.parse::<EditFunction>() {
        studio.set_mode(Mode::Edit);
        studio.set_edit_function(function);
    } else {
        return Err(format!(
            "Unknown function '{}'. Expected free, fusion, add-remove, style, retouch or compose.",
            raw.trim()
        ));
    }
    Ok(studio.configuration().active_function())
}

fn report_generation(
    studio: &Studio,
    data_dir: &Path,
    succeeded: bool,
    out: &mut impl Write,
) -> Result<()> {
    if succeeded {
        write_preview_line(studio, data_dir, out)?;
        return Ok(());
    }
    if let Some(message) = studio.message() {
        writeln!(out, "! {message}")?;
    }
    if studio.view_state() == ViewState::Image {
        writeln!(out, "Previous image kept.")?;
    }
    Ok(())
}

fn write_preview_line(studio: &Studio, data_dir: &Path, out: &mut impl Write) -> Result<()> {
    let Some(image) = studio.current_image() else {
        return Ok(());
    };
    let path = data_dir.join(format!("preview.{}", preview_extension(&image.mime_type)));
    fs::write(&path, &image.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    let label = if image.variation { "Variation" } else { "Image" };
    writeln!(
        out,
        "{label} ready: {} ({} bytes, {} in history)",
        path.display(),
        image.bytes.len(),
        studio.history().len()
    )?;
    Ok(())
}

fn preview_extension(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

fn print_history(history: &History, out: &mut impl Write) -> Result<()> {
    if history.is_empty() {
        writeln!(out, "History is empty.")?;
        return Ok(());
    }
    for (index, entry) in history.entries().iter().enumerate() {
        let detail = entry
            .decode()
            .map(|(mime_type, bytes)| format!("{mime_type}, {} bytes", bytes.len()))
            .unwrap_or_else(|| "unreadable".to_string());
        writeln!(out, "{:>2}. {} ({detail})", index + 1, entry.short_id())?;
    }
    Ok(())
}

fn print_status(studio: &Studio, out: &mut impl Write) -> Result<()> {
    let config = studio.configuration();
    writeln!(out, "Mode: {} / {}", config.mode.label(), config.active_function())?;
    writeln!(out, "Prompt: {}", if config.prompt.is_empty() { "(empty)" } else { config.prompt.as_str() })?;
    writeln!(
        out,
        "Style: {}",
        config.style.map(CreateStyle::label).unwrap_or("none")
    )?;
    let ratio_note = if config.aspect_ratio_applies() { "" } else { " (ignored)" };
    writeln!(out, "Aspect ratio: {}{ratio_note}", config.aspect_ratio)?;
    for slot in ImageSlot::ALL {
        let preview = config.image(slot).map(ImageRef::preview).unwrap_or("-");
        writeln!(out, "Image {}: {preview}", slot.number())?;
    }
    let view = match studio.view_state() {
        ViewState::Placeholder => "placeholder",
        ViewState::Loading => "loading",
        ViewState::Image => "image",
    };
    writeln!(out, "View: {view}; history: {}; theme: {}", studio.history().len(), studio.theme())?;
    if studio.last_successful_configuration().is_some() {
        writeln!(out, "Variation available.")?;
    }
    if let Some(message) = studio.message() {
        writeln!(out, "Notice: {message} (/ok to dismiss)")?;
    }
    Ok(())
}

fn run_generate(session: &Session, args: GenerateArgs) -> Result<i32> {
    if args.images.len() > ImageSlot::ALL.len() {
        bail!("at most {} --image values are accepted", ImageSlot::ALL.len());
    }
    let registry = default_client_registry();
    let client = client_for(&registry, &session.provider)?;
    let mut studio = session.open_studio();

    studio.set_prompt(args.prompt);
    if let Some(mode) = args.mode {
        studio.set_mode(mode);
    }
    if let Some(function) = args.function.as_deref() {
        apply_function(&mut studio, function).map_err(anyhow::Error::msg)?;
    }
    if let Some(style) = args.style {
        studio.toggle_style(style);
    }
    if let Some(ratio) = args.ratio {
        studio.set_aspect_ratio(ratio);
    }
    for (slot, path) in ImageSlot::ALL.into_iter().zip(args.images.iter()) {
        studio.set_image(slot, Some(ImageRef::from_path(path)?));
    }

    studio.generate(client)?;
    let format = DownloadFormat::from_path(&args.out);
    let written = studio.download(format, &args.out)?;
    println!("{}", written.display());
    Ok(0)
}

fn run_history(session: &Session, action: HistoryCommand) -> Result<i32> {
    match action {
        HistoryCommand::List => {
            let studio = session.open_studio();
            print_history(studio.history(), &mut io::stdout())?;
        }
        HistoryCommand::Export { index, path } => {
            let studio = session.open_studio();
            let Some(entry) = index.checked_sub(1).and_then(|i| studio.history().get(i)) else {
                bail!("history has no entry #{index}");
            };
            let Some((_, bytes)) = entry.decode() else {
                bail!("history entry #{index} could not be read");
            };
            let written = write_download(&bytes, DownloadFormat::from_path(&path), &path)?;
            println!("{}", written.display());
        }
        HistoryCommand::Clear => {
            let mut studio = session.open_studio();
            studio.clear_history();
            println!("History cleared.");
        }
    }
    Ok(0)
}

fn run_theme(session: &Session, args: ThemeArgs) -> Result<i32> {
    let mut studio = session.open_studio();
    let theme = match args.value.as_deref().map(str::trim) {
        None => studio.theme(),
        Some("toggle") => studio.toggle_theme(),
        Some(raw) => {
            let theme = raw.parse::<Theme>().map_err(anyhow::Error::msg)?;
            studio.set_theme(theme)
        }
    };
    println!("{theme}");
    Ok(0)
}
