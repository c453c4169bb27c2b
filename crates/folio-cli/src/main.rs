use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use folio_common::{AttachmentUpload, Config, DocumentId, DocumentStore, HttpStore};
use folio_sync::{ChangePoller, Edit, SaveOutcome, SessionView, SyncSession};
use miette::{IntoDiagnostic, Result};
use mime_sniffer::MimeTypeSniffer;
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

#[derive(Parser)]
#[command(version, about = "Folio - edit server documents with debounced autosave", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Document service endpoint
    #[arg(long, global = true, env = "FOLIO_ENDPOINT")]
    endpoint: Option<Url>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a document and print its id
    New {
        #[arg(long)]
        title: Option<String>,

        /// Initial content
        #[arg(long)]
        content: Option<String>,
    },
    /// Print a document
    Show { id: String },
    /// Delete a document
    Delete { id: String },
    /// Attach a file to a document
    Attach { id: String, file: PathBuf },
    /// Edit a document interactively
    ///
    /// Plain lines are appended to the content. Commands:
    /// :title <text>, :pin, :unpin, :save, :refresh, :discard,
    /// :attach <path>, :status, :quit
    Edit { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette();
    let _ = dotenvy::dotenv();
    folio_common::telemetry::init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    tracing::debug!(endpoint = %config.endpoint, "loaded config");

    let store = HttpStore::new(config.endpoint.clone())?;
    let session = SyncSession::new(store, config.sync.clone());

    match cli.command {
        Commands::New { title, content } => {
            let view = session.create_document().await?;
            if let Some(title) = title {
                session.edit(Edit::Title(title));
            }
            if let Some(content) = content {
                session.edit(Edit::Content(content));
            }
            if let SaveOutcome::Failed(message) = session.save_now().await {
                return Err(miette::miette!("document created but initial save failed: {message}"));
            }
            if let Some(id) = view.document_id {
                println!("{id}");
            }
        }
        Commands::Show { id } => {
            let doc = session.store().fetch(&DocumentId::from(id)).await?;
            println!("{}{}", doc.title, if doc.pinned { " [pinned]" } else { "" });
            println!("revision {}  updated {}", doc.revision, doc.updated_at);
            for attachment in doc.attachments() {
                println!(
                    "  attachment {} ({}) {}",
                    attachment.filename,
                    attachment.content_type,
                    attachment.url.as_deref().unwrap_or("-")
                );
            }
            println!();
            println!("{}", doc.content());
        }
        Commands::Delete { id } => {
            session.open(id).await?;
            session.delete_document().await?;
            println!("deleted");
        }
        Commands::Attach { id, file } => {
            session.open(id).await?;
            let block = session.upload_attachment(read_upload(&file)?).await?;
            println!("{}", block.url.as_deref().unwrap_or(block.reference.as_str()));
        }
        Commands::Edit { id } => {
            edit(&session, id, config.sync.poll_interval).await?;
        }
    }

    Ok(())
}

async fn edit(session: &SyncSession<HttpStore>, id: String, poll_interval: Duration) -> Result<()> {
    let view = session.open(id).await?;
    println!("{}", view.draft.title);
    println!("{}", view.draft.content);

    let poller = ChangePoller::spawn(session, poll_interval);
    let mut updates = session.subscribe();
    let printer = tokio::spawn(async move {
        let mut last = None;
        while updates.changed().await.is_ok() {
            let line = status_line(&updates.borrow_and_update());
            if last.as_ref() != Some(&line) {
                eprintln!("[{line}]");
                last = Some(line);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.into_diagnostic()? {
        let (command, arg) = match line.strip_prefix(':') {
            Some(rest) => rest.split_once(' ').unwrap_or((rest, "")),
            None => {
                let mut content = session.view().draft.content;
                if !content.is_empty() {
                    content.push('\n');
                }
                content.push_str(&line);
                session.edit(Edit::Content(content));
                continue;
            }
        };

        match command {
            "title" => {
                session.edit(Edit::title(arg));
            }
            "pin" => {
                session.edit(Edit::Pinned(true));
            }
            "unpin" => {
                session.edit(Edit::Pinned(false));
            }
            "save" => report_save(session.save_now().await),
            "refresh" => poller.notify_focus(),
            "discard" => {
                let view = session.discard_and_reload().await?;
                println!("{}", view.draft.content);
            }
            "attach" => match read_upload(Path::new(arg)) {
                Ok(upload) => {
                    // Attachment failures are scoped to the attachment.
                    if let Err(e) = session.upload_attachment(upload).await {
                        eprintln!("{:?}", miette::Report::new(e));
                    }
                }
                Err(e) => eprintln!("{e:?}"),
            },
            "status" => println!("{}", status_line(&session.view())),
            "quit" | "q" => break,
            other => eprintln!("unknown command :{other}"),
        }
    }

    if session.is_dirty() {
        report_save(session.save_now().await);
    }
    session.close();
    drop(poller);
    printer.abort();
    Ok(())
}

fn report_save(outcome: SaveOutcome) {
    match outcome {
        SaveOutcome::Saved(revision) => tracing::info!(%revision, "saved"),
        SaveOutcome::Skipped(reason) => tracing::debug!(?reason, "save skipped"),
        SaveOutcome::Failed(message) => eprintln!("save failed: {message}"),
        SaveOutcome::Stale => {}
    }
}

fn status_line(view: &SessionView) -> String {
    let mut line = view.status_text.unwrap_or(view.status.as_str()).to_string();
    for attachment in view.attachments.iter().filter(|a| a.pending) {
        line.push_str(&format!(", uploading {}", attachment.block.filename));
    }
    if let Some(error) = &view.attachment_error {
        line.push_str(&format!(", attachment failed: {error}"));
    }
    line
}

fn read_upload(path: &Path) -> Result<AttachmentUpload> {
    let data = Bytes::from(std::fs::read(path).into_diagnostic()?);
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| miette::miette!("not a file: {}", path.display()))?;
    let content_type = data
        .sniff_mime_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    Ok(AttachmentUpload::new(filename, content_type, data))
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("folio")
        .join("config.kdl")
}

fn init_miette() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))
    .expect("couldn't set the miette hook");
    miette::set_panic_hook();
}
