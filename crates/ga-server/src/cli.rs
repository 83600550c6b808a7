//! CLI (Command Line Interface) mode
//!
//! Provides an interactive REPL over the local record store.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use ga_core::query::{GroupList, PageBody};
use ga_core::{Config, EmailPage, EmailQuery, MailSourceProvider, QueryEngine, RecordStore, SortBy};
use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, Completer, DefaultHinter, Emacs, KeyCode, KeyModifiers, Keybindings,
    MenuBuilder, Prompt, Reedline, ReedlineEvent, ReedlineMenu, Signal, Suggestion,
};
use tracing::info;

use crate::report::truncate;

/// Available commands for autocomplete display
const COMMANDS: &[(&str, &str)] = &[
    ("/sync", "新着メールを同期"),
    ("/senders", "送信者ランキング [件数]"),
    ("/domains", "ドメインランキング [件数]"),
    ("/emails", "メール一覧 [ページ] [date|sender_frequency|domain_frequency]"),
    ("/search", "送信者・件名で検索 <テキスト>"),
    ("/help", "ヘルプを表示"),
    ("/exit", "プログラムを終了"),
];

/// Entries per page in CLI listings
const CLI_PAGE_SIZE: u32 = 20;

/// Command completer for reedline
#[derive(Clone)]
pub struct CommandCompleter {
    commands: Vec<(&'static str, &'static str)>,
}

impl CommandCompleter {
    pub fn new() -> Self {
        Self {
            commands: COMMANDS.to_vec(),
        }
    }
}

impl Default for CommandCompleter {
    fn default() -> Self {
        Self::new()
    }
}

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        // 行頭が / で始まる場合のみ候補を表示
        if !line.starts_with('/') {
            return Vec::new();
        }

        self.commands
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(line))
            .map(|(cmd, desc)| Suggestion {
                value: cmd.to_string(),
                description: Some(desc.to_string()),
                extra: None,
                span: reedline::Span::new(0, pos),
                append_whitespace: true,
                style: None,
            })
            .collect()
    }
}

/// Custom prompt with colored styling
struct ColoredPrompt {
    style: Style,
}

impl ColoredPrompt {
    fn new() -> Self {
        Self {
            style: Color::Cyan.bold(),
        }
    }
}

impl Prompt for ColoredPrompt {
    fn render_prompt_left(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.style.paint("mail> ").to_string())
    }

    fn render_prompt_right(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: reedline::PromptEditMode) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: reedline::PromptHistorySearch,
    ) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }
}

/// Parsed REPL command
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Sync,
    Senders(Option<usize>),
    Domains(Option<usize>),
    Emails { page: u32, sort_by: SortBy },
    Search(String),
    Help,
    Exit,
}

/// Parse one input line. `Err` carries the message shown to the user.
fn parse_command(input: &str) -> Result<Command, String> {
    let mut parts = input.split_whitespace();
    let name = parts.next().unwrap_or_default().to_lowercase();

    match name.as_str() {
        "/sync" => Ok(Command::Sync),
        "/senders" | "/domains" => {
            let top_n = match parts.next() {
                Some(raw) => Some(
                    raw.parse::<usize>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| format!("件数は正の整数で指定してください: {}", raw))?,
                ),
                None => None,
            };
            if name == "/senders" {
                Ok(Command::Senders(top_n))
            } else {
                Ok(Command::Domains(top_n))
            }
        }
        "/emails" => {
            let mut page = 1;
            let mut sort_by = SortBy::Date;
            for arg in parts {
                if let Ok(n) = arg.parse::<u32>() {
                    page = n.max(1);
                } else {
                    sort_by = arg.parse().map_err(|e: ga_core::Error| e.to_string())?;
                }
            }
            Ok(Command::Emails { page, sort_by })
        }
        "/search" => {
            let text = input
                .trim_start()
                .split_once(char::is_whitespace)
                .map(|(_, rest)| rest.trim())
                .unwrap_or_default();
            if text.is_empty() {
                Err("使い方: /search <テキスト>".to_string())
            } else {
                Ok(Command::Search(text.to_string()))
            }
        }
        "/help" | "/?" => Ok(Command::Help),
        "/exit" | "/quit" | "/q" => Ok(Command::Exit),
        _ => Err(format!(
            "不明なコマンド: {}。/help でコマンド一覧を確認してください。",
            input
        )),
    }
}

/// Run CLI interactive mode
pub async fn run_cli(
    config: Config,
    store: Arc<RecordStore>,
    provider: Arc<dyn MailSourceProvider>,
) -> anyhow::Result<()> {
    info!("Starting CLI mode with {} stored records", store.count()?);

    // Welcome message
    print_welcome();

    // Setup keybindings
    let mut keybindings = default_keybindings();

    // Trigger completion on '/' key
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Char('/'),
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );

    let menu = Box::new(
        ColumnarMenu::default()
            .with_name("command_menu")
            .with_columns(1)
            .with_column_width(Some(60))
            .with_only_buffer_difference(false),
    );

    let hinter = DefaultHinter::default().with_style(Style::new().dimmed());

    let mut line_editor = Reedline::create()
        .with_completer(Box::new(CommandCompleter::new()))
        .with_menu(ReedlineMenu::EngineCompleter(menu))
        .with_hinter(Box::new(hinter))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    let prompt = ColoredPrompt::new();

    loop {
        let signal = line_editor.read_line(&prompt);

        match signal {
            Ok(Signal::Success(line)) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                let command = match parse_command(input) {
                    Ok(command) => command,
                    Err(msg) => {
                        eprintln!("\n❓ {}\n", msg);
                        continue;
                    }
                };

                if command == Command::Exit {
                    println!("\n👋 さようなら！\n");
                    break;
                }

                if let Err(e) = execute(command, &config, &store, provider.as_ref()).await {
                    eprintln!("\n❌ エラー: {}\n", e);
                }
            }
            Ok(Signal::CtrlC) => {
                println!("^C");
                continue;
            }
            Ok(Signal::CtrlD) => {
                println!("\n👋 さようなら！\n");
                break;
            }
            Err(err) => {
                eprintln!("\n❌ エラー: {}\n", err);
                break;
            }
        }
    }

    Ok(())
}

async fn execute(
    command: Command,
    config: &Config,
    store: &RecordStore,
    provider: &dyn MailSourceProvider,
) -> anyhow::Result<()> {
    let engine = QueryEngine::new(store);

    match command {
        Command::Sync => {
            println!("\n⏳ 同期中... (Ctrl+C で中断)");
            match crate::run_sync(store, provider, config).await? {
                Some(report) => println!("✅ {}\n", report.message()),
                None => println!("⚠️ 同期を中断しました\n"),
            }
        }
        Command::Senders(top_n) => {
            let analytics = engine.analytics(top_n.unwrap_or(config.analytics.top_n))?;
            println!();
            for (i, sender) in analytics.top_senders.iter().enumerate() {
                println!(
                    "{:>3}. {:>6}  {} {}",
                    i + 1,
                    sender.count,
                    sender.email,
                    Style::new().dimmed().paint(&sender.name)
                );
            }
            println!();
        }
        Command::Domains(top_n) => {
            let analytics = engine.analytics(top_n.unwrap_or(config.analytics.top_n))?;
            println!();
            for (i, domain) in analytics.top_domains.iter().enumerate() {
                println!("{:>3}. {:>6}  {}", i + 1, domain.count, domain.domain);
            }
            println!();
        }
        Command::Emails { page, sort_by } => {
            let query = EmailQuery::new(sort_by).with_page(page, CLI_PAGE_SIZE);
            print_page(&engine.query(&query)?);
        }
        Command::Search(text) => {
            let query = EmailQuery::new(SortBy::Date)
                .with_page(1, CLI_PAGE_SIZE)
                .with_search(text);
            print_page(&engine.query(&query)?);
        }
        Command::Help => print_help(),
        Command::Exit => {}
    }

    Ok(())
}

fn format_date(date: Option<DateTime<FixedOffset>>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".repeat(16))
}

/// Print one page of a listing
fn print_page(page: &EmailPage) {
    println!();
    match &page.body {
        PageBody::Emails(emails) => {
            for email in emails {
                println!(
                    "{}  {:<40}  {}",
                    format_date(email.record.received_date),
                    truncate(&email.record.sender_email, 40),
                    email.record.subject.as_deref().unwrap_or("(no subject)")
                );
            }
        }
        PageBody::Results(GroupList::Senders(groups)) => {
            for group in groups {
                println!(
                    "{:>6}  {}  {} {}",
                    group.count,
                    format_date(group.latest_date),
                    group.sender_email,
                    Style::new().dimmed().paint(&group.sender_name)
                );
            }
        }
        PageBody::Results(GroupList::Domains(groups)) => {
            for group in groups {
                println!(
                    "{:>6}  {}  {}",
                    group.count,
                    format_date(group.latest_date),
                    group.sender_domain
                );
            }
        }
    }

    let pages = (page.total as u32).div_ceil(page.page_size).max(1);
    println!(
        "{}",
        Style::new().dimmed().paint(format!(
            "\n{} / {} ページ (全 {} 件, {})\n",
            page.page, pages, page.total, page.sort_by
        ))
    );
}

/// Default keybindings for reedline
fn default_keybindings() -> Keybindings {
    let mut keybindings = Keybindings::new();
    // Tab key triggers completion
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Submit);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Esc, ReedlineEvent::Esc);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('c'), ReedlineEvent::CtrlC);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('d'), ReedlineEvent::CtrlD);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Up, ReedlineEvent::Up);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Down, ReedlineEvent::Down);
    keybindings
}

/// Print welcome message
fn print_welcome() {
    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║          📬 gmail-analyzer CLI - 対話モード                ║");
    println!("╠════════════════════════════════════════════════════════════╣");
    println!("║  コマンド: /sync, /senders, /domains, /emails, /search     ║");
    println!("║  / を入力するとコマンド候補が表示されます                   ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
}

/// Print help message
fn print_help() {
    println!();
    println!("📖 利用可能なコマンド:");
    for (cmd, desc) in COMMANDS {
        println!("  {} - {}", cmd, desc);
    }
    println!();
    println!("💡 ヒント: / から入力するとコマンド候補が表示されます");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completer_filters_by_prefix() {
        let mut completer = CommandCompleter::new();

        let suggestions = completer.complete("/s", 2);
        let values: Vec<&str> = suggestions.iter().map(|s| s.value.as_str()).collect();
        assert_eq!(values, vec!["/sync", "/senders", "/search"]);

        assert!(completer.complete("sync", 4).is_empty());
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("/sync"), Ok(Command::Sync));
        assert_eq!(parse_command("/HELP"), Ok(Command::Help));
        assert_eq!(parse_command("/quit"), Ok(Command::Exit));
        assert!(parse_command("/unknown").is_err());
    }

    #[test]
    fn test_parse_rankings() {
        assert_eq!(parse_command("/senders"), Ok(Command::Senders(None)));
        assert_eq!(parse_command("/domains 5"), Ok(Command::Domains(Some(5))));
        assert!(parse_command("/senders 0").is_err());
        assert!(parse_command("/domains many").is_err());
    }

    #[test]
    fn test_parse_emails_arguments() {
        assert_eq!(
            parse_command("/emails"),
            Ok(Command::Emails {
                page: 1,
                sort_by: SortBy::Date
            })
        );
        assert_eq!(
            parse_command("/emails 3 domain_frequency"),
            Ok(Command::Emails {
                page: 3,
                sort_by: SortBy::DomainFrequency
            })
        );
        assert_eq!(
            parse_command("/emails sender_frequency"),
            Ok(Command::Emails {
                page: 1,
                sort_by: SortBy::SenderFrequency
            })
        );
        assert!(parse_command("/emails 2 size").is_err());
    }

    #[test]
    fn test_parse_search_keeps_spaces() {
        assert_eq!(
            parse_command("/search  weekly   report "),
            Ok(Command::Search("weekly   report".to_string()))
        );
        assert!(parse_command("/search").is_err());
        assert!(parse_command("/search   ").is_err());
    }
}
