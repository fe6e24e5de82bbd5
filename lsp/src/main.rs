//! mdspell Language Server Protocol implementation.
//!
//! Keeps settings and open documents in memory, debounces edits per document,
//! sends normalized text to the checker and publishes positioned diagnostics
//! with replace / ignore code actions.

mod checker;
mod debounce;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use mdspell_core::{language_name, Diagnostic as CoreDiagnostic, Settings, Severity, Speller};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing_subscriber::EnvFilter;

use crate::checker::{AtdChecker, Checker};
use crate::debounce::{Debouncer, Ticket, DEFAULT_DELAY};

const SOURCE: &str = "mdspell";
const ADD_TO_IGNORE_LIST: &str = "mdspell.addToIgnoreList";
const CHANGE_LANGUAGE: &str = "mdspell.changeLanguage";
const TOGGLE: &str = "mdspell.toggle";

/// Document state cached by the server.
struct DocumentState {
    content: String,
    version: i32,
    kind: String,
}

/// What a finished check pass does to the document's published diagnostics.
#[derive(Debug, PartialEq)]
enum PassOutcome {
    Publish {
        version: i32,
        diagnostics: Vec<Diagnostic>,
    },
    /// The checker failed; whatever was published last stays.
    Keep,
    /// A newer edit, close or toggle superseded the pass.
    Stale,
}

/// Attached to every published diagnostic so code actions need no re-parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixData {
    matched_text: String,
    suggestions: Vec<String>,
}

struct Session {
    client: Client,
    checker: Arc<dyn Checker>,
    speller: RwLock<Arc<Speller>>,
    documents: DashMap<Url, DocumentState>,
    debouncer: Debouncer<Url>,
    workspace_root: RwLock<Option<PathBuf>>,
    config_path: RwLock<Option<PathBuf>>,
    enabled: AtomicBool,
}

impl Session {
    async fn settings_path(&self) -> Option<PathBuf> {
        if let Some(configured) = self.config_path.read().await.clone() {
            return Some(configured);
        }
        self.workspace_root
            .read()
            .await
            .as_deref()
            .map(Settings::path_in)
    }

    async fn set_config_path(&self, raw: &str) {
        if raw.trim().is_empty() {
            *self.config_path.write().await = None;
            return;
        }
        let configured = PathBuf::from(raw);
        if configured.is_absolute() {
            *self.config_path.write().await = Some(configured);
        } else if let Some(root) = self.workspace_root.read().await.clone() {
            *self.config_path.write().await = Some(root.join(configured));
        }
    }

    async fn reload_settings(&self) {
        let settings = match self.settings_path().await {
            Some(path) => match Settings::load(&path) {
                Ok(settings) => {
                    self.client
                        .log_message(
                            MessageType::INFO,
                            format!("mdspell settings loaded: {}", path.display()),
                        )
                        .await;
                    settings
                }
                Err(err) => {
                    tracing::warn!(%err, "falling back to default settings");
                    self.client
                        .log_message(MessageType::ERROR, format!("{err}; using defaults"))
                        .await;
                    Settings::default()
                }
            },
            None => Settings::default(),
        };

        let speller = Speller::new(settings);
        for err in speller.config_errors() {
            self.client
                .log_message(MessageType::WARNING, format!("mdspell: {err}"))
                .await;
        }
        *self.speller.write().await = Arc::new(speller);
    }

    /// Build new settings, persist them, then swap them in before re-checking.
    async fn update_settings<F>(self: &Arc<Self>, edit: F) -> anyhow::Result<bool>
    where
        F: FnOnce(&mut Settings) -> std::result::Result<bool, mdspell_core::Error>,
    {
        let path = self.settings_path().await;
        let mut current = self.speller.write().await;
        let mut settings = current.settings().clone();
        if !edit(&mut settings)? {
            return Ok(false);
        }
        match &path {
            Some(path) => settings.save(path)?,
            None => tracing::info!("no workspace open; settings change kept in memory"),
        }
        *current = Arc::new(Speller::new(settings));
        drop(current);

        self.schedule_all().await;
        Ok(true)
    }

    async fn is_settings_file(&self, uri: &Url) -> bool {
        let Ok(path) = uri.to_file_path() else {
            return false;
        };
        self.settings_path().await.is_some_and(|p| p == path)
    }

    fn open_uris(&self) -> Vec<Url> {
        self.documents.iter().map(|e| e.key().clone()).collect()
    }

    async fn schedule(self: &Arc<Self>, uri: Url) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        let Some(kind) = self.documents.get(&uri).map(|doc| doc.kind.clone()) else {
            return;
        };
        if !self.speller.read().await.is_applicable(&kind) {
            // settings may have dropped this kind since the last pass
            self.debouncer.bump(&uri);
            self.client.publish_diagnostics(uri, vec![], None).await;
            return;
        }
        let ticket = self.debouncer.bump(&uri);
        let session = Arc::clone(self);
        tokio::spawn(async move { session.run_pass(ticket).await });
    }

    async fn schedule_all(self: &Arc<Self>) {
        for uri in self.open_uris() {
            self.schedule(uri).await;
        }
    }

    async fn run_pass(&self, ticket: Ticket<Url>) {
        let Some(_pass) = self.debouncer.settle(&ticket).await else {
            return;
        };
        if let PassOutcome::Publish {
            version,
            diagnostics,
        } = self.check_pass(&ticket).await
        {
            self.client
                .publish_diagnostics(ticket.key, diagnostics, Some(version))
                .await;
        }
    }

    /// Run the checker for a settled ticket and decide what to publish.
    async fn check_pass(&self, ticket: &Ticket<Url>) -> PassOutcome {
        let Some((text, version)) = self
            .documents
            .get(&ticket.key)
            .map(|doc| (doc.content.clone(), doc.version))
        else {
            return PassOutcome::Stale;
        };

        let speller = self.speller.read().await.clone();
        let normalized = speller.normalize(&text);
        let matches = match self
            .checker
            .check(&speller.settings().language, &normalized)
            .await
        {
            Ok(matches) => matches,
            Err(err) => {
                tracing::warn!(uri = %ticket.key, %err, "check failed");
                self.client
                    .log_message(MessageType::WARNING, format!("mdspell: {err}"))
                    .await;
                return PassOutcome::Keep;
            }
        };

        if !self.debouncer.is_current(ticket) || !self.enabled.load(Ordering::SeqCst) {
            tracing::debug!(uri = %ticket.key, "discarding stale result");
            return PassOutcome::Stale;
        }

        let diagnostics = speller
            .diagnose(&normalized, &matches)
            .iter()
            .filter_map(|d| to_lsp_diagnostic(d, &text))
            .collect();
        PassOutcome::Publish {
            version,
            diagnostics,
        }
    }

    async fn toggle(self: &Arc<Self>) {
        let enabled = !self.enabled.fetch_xor(true, Ordering::SeqCst);
        let language = self.speller.read().await.settings().language.clone();
        if enabled {
            self.schedule_all().await;
        } else {
            for uri in self.open_uris() {
                // invalidates any pass still waiting on the checker
                self.debouncer.bump(&uri);
                self.client.publish_diagnostics(uri, vec![], None).await;
            }
        }
        let state = if enabled { "enabled" } else { "disabled" };
        self.client
            .show_message(
                MessageType::INFO,
                format!("Spell {state} [{language}]"),
            )
            .await;
    }
}

/// Line/char column to an LSP position, counting UTF-16 units on that line.
fn char_position(text: &str, line: usize, column: usize) -> Position {
    let line_text = text.split('\n').nth(line).unwrap_or("");
    let character: usize = line_text.chars().take(column).map(char::len_utf16).sum();
    Position {
        line: line as u32,
        character: character as u32,
    }
}

/// Text covered by a single-line range, `None` if the range is out of date.
fn range_text(text: &str, range: &Range) -> Option<String> {
    if range.start.line != range.end.line {
        return None;
    }
    let line_text = text.split('\n').nth(range.start.line as usize)?;
    let (start, end) = (range.start.character as usize, range.end.character as usize);
    let mut unit = 0usize;
    let mut out = String::new();
    for ch in line_text.chars() {
        if unit >= end {
            break;
        }
        if unit >= start {
            out.push(ch);
        }
        unit += ch.len_utf16();
    }
    (unit >= end).then_some(out)
}

fn lsp_severity(severity: Severity) -> Option<DiagnosticSeverity> {
    match severity {
        Severity::Error => Some(DiagnosticSeverity::ERROR),
        Severity::Warning => Some(DiagnosticSeverity::WARNING),
        Severity::Information => Some(DiagnosticSeverity::INFORMATION),
        Severity::Hint => Some(DiagnosticSeverity::HINT),
        Severity::Disable => None,
    }
}

/// Convert a core diagnostic to an LSP diagnostic.
fn to_lsp_diagnostic(diag: &CoreDiagnostic, text: &str) -> Option<Diagnostic> {
    let problem = &diag.problem;
    let range = Range {
        start: char_position(text, problem.start_line, problem.start_column),
        end: char_position(text, problem.end_line, problem.end_column),
    };
    let data = FixData {
        matched_text: problem.matched_text.clone(),
        suggestions: problem.suggestions.clone(),
    };

    Some(Diagnostic {
        range,
        severity: Some(lsp_severity(diag.severity)?),
        code: Some(NumberOrString::String(problem.category.clone())),
        code_description: None,
        source: Some(SOURCE.to_string()),
        message: problem.message.clone(),
        related_information: None,
        tags: None,
        data: serde_json::to_value(data).ok(),
    })
}

/// Replace actions for each suggestion plus one ignore-list command.
fn fix_actions(uri: &Url, text: &str, diag: &Diagnostic) -> Vec<CodeActionOrCommand> {
    if diag.source.as_deref() != Some(SOURCE) {
        return vec![];
    }
    let Some(data) = diag
        .data
        .clone()
        .and_then(|value| serde_json::from_value::<FixData>(value).ok())
    else {
        return vec![];
    };

    let mut actions = Vec::new();
    if range_text(text, &diag.range).as_deref() == Some(data.matched_text.as_str()) {
        for suggestion in &data.suggestions {
            let mut changes = HashMap::new();
            changes.insert(
                uri.clone(),
                vec![TextEdit {
                    range: diag.range,
                    new_text: suggestion.clone(),
                }],
            );
            actions.push(CodeActionOrCommand::CodeAction(CodeAction {
                title: format!("Replace with '{suggestion}'"),
                kind: Some(CodeActionKind::QUICKFIX),
                diagnostics: Some(vec![diag.clone()]),
                edit: Some(WorkspaceEdit {
                    changes: Some(changes),
                    ..Default::default()
                }),
                is_preferred: Some(actions.is_empty()),
                ..Default::default()
            }));
        }
    }

    let title = format!("Add '{}' to ignore list", data.matched_text);
    actions.push(CodeActionOrCommand::CodeAction(CodeAction {
        title: title.clone(),
        kind: Some(CodeActionKind::QUICKFIX),
        diagnostics: Some(vec![diag.clone()]),
        command: Some(Command {
            title,
            command: ADD_TO_IGNORE_LIST.to_string(),
            arguments: Some(vec![Value::String(data.matched_text)]),
        }),
        ..Default::default()
    }));
    actions
}

fn string_argument(params: &ExecuteCommandParams) -> Option<String> {
    params
        .arguments
        .first()
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// mdspell Language Server backend.
struct Backend {
    session: Arc<Session>,
}

impl Backend {
    fn new(client: Client, checker: Arc<dyn Checker>) -> Self {
        Self {
            session: Arc::new(Session {
                client,
                checker,
                speller: RwLock::new(Arc::new(Speller::default())),
                documents: DashMap::new(),
                debouncer: Debouncer::new(DEFAULT_DELAY),
                workspace_root: RwLock::new(None),
                config_path: RwLock::new(None),
                enabled: AtomicBool::new(true),
            }),
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let session = &self.session;
        if let Some(root_uri) = params.root_uri.or_else(|| {
            params
                .workspace_folders
                .as_ref()
                .and_then(|folders| folders.first().map(|f| f.uri.clone()))
        }) {
            if let Ok(path) = root_uri.to_file_path() {
                *session.workspace_root.write().await = Some(path);
            }
        }

        if let Some(Value::Object(map)) = params.initialization_options {
            if let Some(Value::String(config_path)) = map.get("configPath") {
                session.set_config_path(config_path).await;
            }
        }

        session.reload_settings().await;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(false),
                        })),
                        ..Default::default()
                    },
                )),
                code_action_provider: Some(CodeActionProviderCapability::Options(
                    CodeActionOptions {
                        code_action_kinds: Some(vec![CodeActionKind::QUICKFIX]),
                        work_done_progress_options: WorkDoneProgressOptions {
                            work_done_progress: None,
                        },
                        resolve_provider: Some(false),
                    },
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![
                        ADD_TO_IGNORE_LIST.to_string(),
                        CHANGE_LANGUAGE.to_string(),
                        TOGGLE.to_string(),
                    ],
                    work_done_progress_options: WorkDoneProgressOptions {
                        work_done_progress: None,
                    },
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "mdspell Language Server".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        self.session
            .client
            .log_message(MessageType::INFO, "mdspell LSP initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        self.session.documents.insert(
            doc.uri.clone(),
            DocumentState {
                content: doc.text,
                version: doc.version,
                kind: doc.language_id,
            },
        );
        self.session.schedule(doc.uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;

        // With FULL sync, we get the complete new content
        if let Some(change) = params.content_changes.into_iter().last() {
            if let Some(mut doc) = self.session.documents.get_mut(&uri) {
                doc.content = change.text;
                doc.version = version;
            }
        }
        self.session.schedule(uri).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        if self.session.is_settings_file(&uri).await {
            self.session.reload_settings().await;
            self.session.schedule_all().await;
        } else {
            self.session.schedule(uri).await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.session.documents.remove(&uri);
        self.session.debouncer.forget(&uri);
        self.session
            .client
            .publish_diagnostics(uri, vec![], None)
            .await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        if let Value::Object(map) = params.settings {
            if let Some(Value::String(config_path)) = map.get("configPath") {
                self.session.set_config_path(config_path).await;
            }
        }
        self.session.reload_settings().await;
        self.session.schedule_all().await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let mut should_reload = false;
        for change in &params.changes {
            if self.session.is_settings_file(&change.uri).await {
                should_reload = true;
                break;
            }
        }
        if !should_reload {
            return;
        }
        self.session.reload_settings().await;
        self.session.schedule_all().await;
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let uri = &params.text_document.uri;
        let Some(text) = self
            .session
            .documents
            .get(uri)
            .map(|doc| doc.content.clone())
        else {
            return Ok(None);
        };

        let actions: Vec<CodeActionOrCommand> = params
            .context
            .diagnostics
            .iter()
            .flat_map(|diag| fix_actions(uri, &text, diag))
            .collect();

        if actions.is_empty() {
            Ok(None)
        } else {
            Ok(Some(actions))
        }
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        let session = &self.session;
        match params.command.as_str() {
            ADD_TO_IGNORE_LIST => {
                let Some(word) = string_argument(&params) else {
                    return Ok(None);
                };
                if let Err(err) = session
                    .update_settings(|settings| Ok(settings.add_ignore_word(&word)))
                    .await
                {
                    session
                        .client
                        .log_message(MessageType::ERROR, format!("Failed to save settings: {err:#}"))
                        .await;
                }
            }
            CHANGE_LANGUAGE => {
                let Some(code) = string_argument(&params) else {
                    return Ok(None);
                };
                match session
                    .update_settings(|settings| settings.set_language(&code))
                    .await
                {
                    Ok(_) => {
                        session
                            .client
                            .show_message(
                                MessageType::INFO,
                                format!("Checking in {}", language_name(&code)),
                            )
                            .await;
                    }
                    Err(err) => {
                        session
                            .client
                            .show_message(MessageType::ERROR, format!("{err:#}"))
                            .await;
                    }
                }
            }
            TOGGLE => session.toggle().await,
            other => {
                tracing::debug!(command = other, "unknown command");
            }
        }
        Ok(None)
    }
}

#[tokio::main]
async fn main() {
    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("MDSPELL_LOG")
                .unwrap_or_else(|_| EnvFilter::new("mdspell_lsp=info,mdspell_core=warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) =
        LspService::new(|client| Backend::new(client, Arc::new(AtdChecker::new())));
    Server::new(stdin, stdout, socket).serve(service).await;
}
