use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use core_types::{MemoryAttachment, MemoryAttachmentStore, MemoryPreferences, MessageId, keys};
use images::{ImagePipeline, PipelineConfig};
use mimalloc::MiMalloc;
use net::{HttpTransport, NetConfig};
use sanitize::SanitizeOptions;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const USAGE: &str = "Usage: mailview [OPTIONS] FILE

Renders an HTML mail body (FILE, or - for stdin). Without a mode option the
sanitized markup is printed.

Modes:
--text              Plain-text rendering with > quote markers
--preview           One-line preview
--strip             Only remove scripts and tracking pixels
--inline OWNER      Inline cid: images from --attachments DIR
--images            Resolve every image and report its state
--outline           Print the tree of the sanitized markup

Options:
--show-quotes       Keep quoted text when sanitizing
--attachments DIR   Directory whose files are the message parts, named by content id
--width PX          Display width for image scaling (default: 1080)
-h, --help          Show this help

Environment:
MAILVIEW_CACHE_DIR  Image cache directory
MAILVIEW_PARANOID   Set to 0 to keep tracking pixels
";

const OWNER_DEFAULT: MessageId = 1;
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Sanitize,
    Text,
    Preview,
    Strip,
    Inline(MessageId),
    Images,
    Outline,
}

struct Args {
    mode: Mode,
    show_quotes: bool,
    attachments: Option<PathBuf>,
    width: u32,
    input: Option<String>,
}

fn parse_args() -> Result<Option<Args>, String> {
    let mut args = Args {
        mode: Mode::Sanitize,
        show_quotes: false,
        attachments: None,
        width: 1080,
        input: None,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--text" => args.mode = Mode::Text,
            "--preview" => args.mode = Mode::Preview,
            "--strip" => args.mode = Mode::Strip,
            "--images" => args.mode = Mode::Images,
            "--outline" => args.mode = Mode::Outline,
            "--show-quotes" => args.show_quotes = true,
            "--inline" => {
                let owner = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or("--inline needs a numeric message id")?;
                args.mode = Mode::Inline(owner);
            }
            "--attachments" => {
                let dir = it.next().ok_or("--attachments needs a directory")?;
                args.attachments = Some(PathBuf::from(dir));
            }
            "--width" => {
                args.width = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or("--width needs a pixel count")?;
            }
            "-h" | "--help" => return Ok(None),
            _ if arg.starts_with("--") => return Err(format!("unknown option {arg}")),
            _ => args.input = Some(arg),
        }
    }
    Ok(Some(args))
}

fn read_input(path: Option<&str>) -> io::Result<String> {
    match path {
        None | Some("-") => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        Some(path) => {
            let bytes = fs::read(path)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

fn preferences_from_env() -> MemoryPreferences {
    let mut prefs = MemoryPreferences::new();
    if let Ok(value) = std::env::var("MAILVIEW_PARANOID") {
        let paranoid = !matches!(value.trim(), "0" | "false" | "no" | "off");
        prefs.set_bool(keys::PARANOID, paranoid);
    }
    prefs
}

fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Every regular file in `dir` becomes a part of `owner`, keyed by its file
/// name.
fn load_attachments(owner: MessageId, dir: Option<&Path>) -> io::Result<MemoryAttachmentStore> {
    let mut store = MemoryAttachmentStore::new();
    let Some(dir) = dir else {
        return Ok(store);
    };
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(cid) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let part = MemoryAttachment::new(media_type_for(&path), fs::read(&path)?);
        store.insert(owner, cid, part);
    }
    log::debug!("loaded {} attachments from {}", store.len(), dir.display());
    Ok(store)
}

fn report_images(
    html: &str,
    args: &Args,
    prefs: MemoryPreferences,
    store: MemoryAttachmentStore,
) -> Result<(), Box<dyn Error>> {
    let doc = html::parse_document(html);
    let srcs = html::dom_utils::collect_img_srcs(&doc);

    let mut config = PipelineConfig::default();
    if let Ok(dir) = std::env::var("MAILVIEW_CACHE_DIR") {
        config.cache_dir = PathBuf::from(dir);
    }
    config.metrics.width_px = args.width;
    let transport = HttpTransport::new(&NetConfig::default())?;
    let pool = rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("mailview-img-{i}"))
        .build()?;
    let mut pipeline = ImagePipeline::new(
        config,
        Arc::new(prefs),
        Arc::new(store),
        Arc::new(transport),
        Arc::new(pool),
    );

    let mut pending = 0usize;
    for src in &srcs {
        let resolution = pipeline.resolve(src, OWNER_DEFAULT, true, args.width);
        match resolution.request {
            Some(request) => {
                pending += 1;
                println!("#{request} {:?} {src}", resolution.state);
            }
            None => println!("{:?} {src}", resolution.state),
        }
    }
    while pending > 0 {
        let Some(done) = pipeline.wait_completion(FETCH_TIMEOUT) else {
            log::warn!("gave up waiting for {pending} images");
            break;
        };
        pending -= 1;
        let size = done
            .image
            .image()
            .map(|img| format!(" {}x{}", img.width(), img.height()))
            .unwrap_or_default();
        println!("#{} {:?}{size} {}", done.request, done.state, done.locator);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => {
            eprint!("{USAGE}");
            return Ok(());
        }
        Err(msg) => {
            eprintln!("{msg}\n");
            eprint!("{USAGE}");
            std::process::exit(2);
        }
    };

    let input = read_input(args.input.as_deref())?;
    let prefs = preferences_from_env();
    let opts = SanitizeOptions::from_prefs(&prefs, args.show_quotes);

    match args.mode {
        Mode::Sanitize => println!("{}", sanitize::sanitize(&input, &opts)),
        Mode::Text => print!("{}", text::get_text(&input)),
        Mode::Preview => println!("{}", text::get_preview(Some(&input)).unwrap_or_default()),
        Mode::Strip => println!("{}", sanitize::remove_tracking_with_prefs(&input, &prefs)),
        Mode::Inline(owner) => {
            let store = load_attachments(owner, args.attachments.as_deref())?;
            println!("{}", images::inline_embedded(owner, &input, &store)?);
        }
        Mode::Images => {
            let store = load_attachments(OWNER_DEFAULT, args.attachments.as_deref())?;
            report_images(&input, &args, prefs, store)?;
        }
        Mode::Outline => {
            let clean = sanitize::sanitize(&input, &opts);
            let doc = html::parse_document(&clean);
            let start = doc.body().unwrap_or(doc.root());
            for line in html::dom_utils::outline_from_dom(&doc, start, 500) {
                println!("{line}");
            }
        }
    }
    Ok(())
}
