pub mod api;
pub mod config;
pub mod store;
pub mod view;

use anyhow::{anyhow, Context, Result};
use api::{health, ApiClient};
use config::AppConfig;
use std::io::Write;
use std::path::PathBuf;
use store::models::Role;
use store::{ChatStore, PdfFile};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use view::chat::{spawn_history_load, spawn_query, ChatPanel, PanelEvent};
use view::viewer::ViewerState;

/// Terminal front-end: uploads `pdf` (or reopens the most recent document)
/// and chats about it line by line on stdin.
pub async fn run(config: AppConfig, pdf: Option<PathBuf>) -> Result<()> {
    let api = ApiClient::new(&config)?;
    let store = ChatStore::new(api);

    match health::check_server_connection(store.api()).await {
        Ok(status) => info!(%status, "backend reachable"),
        Err(e) => warn!("backend health check failed: {}", e),
    }

    let document_id = match pdf {
        Some(path) => {
            let file = PdfFile::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            store.upload_pdf(file).await.context("upload failed")?
        }
        None => {
            let chats = store.get_chat_documents().await?;
            let latest = chats
                .first()
                .ok_or_else(|| anyhow!("no documents yet; pass a PDF to upload"))?;
            store.select_chat(&latest.id);
            latest.id.clone()
        }
    };

    let viewer = ViewerState::open(store.pdf_info());
    println!("── {} ({}) ──", viewer.title(), viewer.file_url());

    let mut panel = ChatPanel::new();
    let generation = panel.open_document(document_id.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    spawn_history_load(store.clone(), document_id, generation, tx.clone());
    if let Some(event) = rx.recv().await {
        panel.apply(event);
    }
    for msg in panel.messages() {
        print_message(msg.role, &msg.content);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let pending = match panel.begin_send(&line) {
            Ok(pending) => pending,
            Err(e) => {
                if !line.trim().is_empty() {
                    eprintln!("{}", e);
                }
                prompt()?;
                continue;
            }
        };
        let placeholder_id = pending.placeholder_id.clone();
        let handle = spawn_query(store.clone(), pending, tx.clone());

        print!("assistant> ");
        while let Some(event) = rx.recv().await {
            match &event {
                PanelEvent::Chunk { text, .. } => {
                    print!("{}", text);
                    std::io::stdout().flush()?;
                }
                PanelEvent::Completed { .. } => println!(),
                PanelEvent::Failed { .. } | PanelEvent::SetupFailed { .. } => println!(),
                PanelEvent::HistoryLoaded { .. } => {}
            }
            let last = matches!(
                &event,
                PanelEvent::Completed { placeholder_id: id }
                    | PanelEvent::Failed { placeholder_id: id, .. }
                    | PanelEvent::SetupFailed { placeholder_id: id, .. }
                    if *id == placeholder_id
            );
            panel.apply(event);
            if last {
                break;
            }
        }
        handle.join().await;

        // show the fallback text when nothing was streamed
        if let Some(reply) = panel.messages().iter().find(|m| m.id == placeholder_id) {
            if reply.content == view::chat::FALLBACK_REPLY {
                print_message(Role::Assistant, &reply.content);
            }
        }
        prompt()?;
    }

    panel.teardown();
    Ok(())
}

fn print_message(role: Role, content: &str) {
    match role {
        Role::User => println!("you> {}", content),
        Role::Assistant => println!("assistant> {}", content),
    }
}

fn prompt() -> Result<()> {
    print!("you> ");
    std::io::stdout().flush()?;
    Ok(())
}
