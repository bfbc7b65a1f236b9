use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use insight_folio_lib::render::live::write_document;
use insight_folio_lib::render::{LiveRenderer, PlainText, PresentationTarget};
use insight_folio_lib::utils::text::single_line_preview;
use insight_folio_lib::{
    FolioConfig, MistakeDraft, MistakeFilters, MistakeService, ReviewSession,
};

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about,
    long_about = "错题本：记录、筛选、复习与导出。",
    arg_required_else_help = true
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a mistake record
    Add {
        #[clap(flatten)]
        fields: DraftArgs,
        /// Question image to copy into the data directory
        #[clap(long)]
        image: Option<PathBuf>,
    },
    /// Show one record
    Show {
        id: i64,
        /// Include answer and mistake reason
        #[clap(short, long)]
        answer: bool,
        /// Write a standalone KaTeX HTML page into this directory
        #[clap(long)]
        html: Option<PathBuf>,
    },
    /// List records, newest first
    List {
        #[clap(flatten)]
        filters: FilterArgs,
        #[clap(long)]
        json: bool,
    },
    /// Update a record; omitted fields keep their value
    Update {
        id: i64,
        #[clap(long)]
        subject: Option<String>,
        #[clap(long)]
        grade: Option<String>,
        #[clap(long)]
        semester: Option<String>,
        #[clap(long)]
        question: Option<String>,
        #[clap(long)]
        answer: Option<String>,
        #[clap(long)]
        reason: Option<String>,
        #[clap(long)]
        image: Option<PathBuf>,
    },
    /// Delete a record and its image
    Delete { id: i64 },
    /// Review a random sample in the terminal
    Review {
        #[clap(short, long, default_value_t = 10)]
        count: i64,
        #[clap(flatten)]
        filters: FilterArgs,
        /// Also write the current page as HTML into this directory
        #[clap(long)]
        html: Option<PathBuf>,
    },
    /// Export records to a DOCX document
    Export {
        #[clap(short, long)]
        output: PathBuf,
        #[clap(flatten)]
        filters: FilterArgs,
    },
    /// Database statistics
    Stats,
}

#[derive(Args, Debug)]
struct DraftArgs {
    #[clap(long)]
    subject: String,
    #[clap(long)]
    grade: String,
    #[clap(long)]
    semester: String,
    /// Question text; `$...$` marks formulas
    #[clap(long)]
    question: String,
    #[clap(long)]
    answer: Option<String>,
    #[clap(long)]
    reason: Option<String>,
}

#[derive(Args, Debug)]
struct FilterArgs {
    #[clap(long)]
    subject: Option<String>,
    #[clap(long)]
    grade: Option<String>,
    #[clap(long)]
    semester: Option<String>,
    /// Substring of the question text
    #[clap(long)]
    keyword: Option<String>,
}

impl From<FilterArgs> for MistakeFilters {
    fn from(args: FilterArgs) -> Self {
        MistakeFilters {
            subject: args.subject,
            grade: args.grade,
            semester: args.semester,
            question_desc: args.keyword,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();
    let cli = Cli::parse();
    let cfg = FolioConfig::from_env_and_file()?;
    let service = MistakeService::from_config(&cfg)?;

    match cli.command {
        Command::Add { fields, image } => {
            let draft = MistakeDraft {
                subject: fields.subject,
                grade: fields.grade,
                semester: fields.semester,
                question_desc: fields.question,
                question_image: None,
                correct_answer: fields.answer,
                mistake_reason: fields.reason,
            };
            let id = service.add_with_image(draft, image.as_deref()).await?;
            println!("{}", id);
        }
        Command::Show { id, answer, html } => {
            let record = service
                .store()
                .get_by_id(id)?
                .with_context(|| format!("mistake {} not found", id))?;
            print!("{}", PlainText { show_answer: answer }.render(&record));
            if let Some(dir) = html {
                let renderer = LiveRenderer::from_dir(&cfg.katex_dir)?;
                let path = write_document(&dir, &record, &renderer.render(&record, answer))?;
                println!("{}", path.display());
            }
        }
        Command::List { filters, json } => {
            let records = service.store().list(&filters.into())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for r in &records {
                    println!(
                        "{:>5}  {}  {} / {} / {}  {}",
                        r.id,
                        r.record_date,
                        r.subject,
                        r.grade,
                        r.semester,
                        single_line_preview(&r.question_desc, 40)
                    );
                }
            }
        }
        Command::Update {
            id,
            subject,
            grade,
            semester,
            question,
            answer,
            reason,
            image,
        } => {
            let current = service
                .store()
                .get_by_id(id)?
                .with_context(|| format!("mistake {} not found", id))?;
            let mut draft = current.to_draft();
            draft.subject = subject.unwrap_or(draft.subject);
            draft.grade = grade.unwrap_or(draft.grade);
            draft.semester = semester.unwrap_or(draft.semester);
            draft.question_desc = question.unwrap_or(draft.question_desc);
            if answer.is_some() {
                draft.correct_answer = answer;
            }
            if reason.is_some() {
                draft.mistake_reason = reason;
            }
            let outcome = service
                .update_with_image(id, draft, image.as_deref())
                .await?;
            report_failures(&outcome.failures);
        }
        Command::Delete { id } => {
            let outcome = service.delete_with_assets(id)?;
            report_failures(&outcome.failures);
            if !outcome.value {
                println!("mistake {} does not exist", id);
            }
        }
        Command::Review {
            count,
            filters,
            html,
        } => {
            let records = service.store().sample_random(count, &filters.into())?;
            let renderer = match html {
                Some(_) => Some(LiveRenderer::from_dir(&cfg.katex_dir)?),
                None => None,
            };
            run_review(ReviewSession::new(records), renderer.as_ref(), html)?;
        }
        Command::Export { output, filters } => {
            let outcome = service.export_filtered(&filters.into(), output).await?;
            report_failures(&outcome.failures);
            println!("{}", serde_json::to_string_pretty(&outcome.value)?);
        }
        Command::Stats => {
            let stats = service.store().statistics()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}

fn report_failures(failures: &[insight_folio_lib::ContainedFailure]) {
    for failure in failures {
        warn!("[CLI] {}", failure);
    }
}

/// 回车显示答案，再回车下一题；输入 q 退出
fn run_review(
    mut session: ReviewSession,
    renderer: Option<&LiveRenderer>,
    html_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    if session.is_empty() {
        bail!("no mistakes match the filters");
    }
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut stdout = io::stdout();

    while let Some(record) = session.current().cloned() {
        let plain = PlainText {
            show_answer: session.answer_shown(),
        };
        writeln!(stdout, "\n[{}]", session.progress())?;
        write!(stdout, "{}", plain.present(std::slice::from_ref(&record))?)?;
        if let (Some(renderer), Some(dir)) = (renderer, html_dir.as_deref()) {
            let path = write_document(dir, &record, &session.render_current(renderer))?;
            writeln!(stdout, "HTML: {}", path.display())?;
        }
        stdout.flush()?;

        let Some(line) = lines.next().transpose()? else {
            break;
        };
        if line.trim().eq_ignore_ascii_case("q") {
            return Ok(());
        }
        if session.answer_shown() {
            session.advance();
        } else {
            session.reveal_answer();
        }
    }

    if session.is_finished() {
        println!("复习完成！");
    }
    Ok(())
}
